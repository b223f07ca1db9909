//! End-to-end reciprocal scenarios: encrypt → (normalize) → invert → decrypt

use std::thread;

use ckks_inverse::{
    goldschmidt_inverse, newton_inverse, normalize, random_ciphertext, CkksContext, CkksParams, DecryptingObserver,
    Encryption, HeError, Silent,
};
use rand::rngs::StdRng;
use rand::SeedableRng;

fn decrypt_first(ctx: &CkksContext, keys: &ckks_inverse::KeyPair, ct: &ckks_inverse::Ciphertext) -> f64 {
    ctx.decrypt(&keys.secret_key, ct).unwrap()[0]
}

#[test]
fn test_scenario_newton_one_and_a_half() {
    let ctx = CkksContext::with_seed(CkksParams::with_depth(12), 100).unwrap();
    let keys = ctx.keygen();
    let b = ctx.encrypt(&keys.public_key, &[1.5]).unwrap();

    let inv = newton_inverse(&ctx, &b, 0.4, 5, &mut Silent).unwrap();
    assert_eq!(inv.iterations, 5);
    assert!(!inv.truncated());
    let result = decrypt_first(&ctx, &keys, &inv.value);
    assert!((result - 0.6667).abs() < 1e-3, "got {}", result);
}

#[test]
fn test_scenario_newton_under_default_depth() {
    // the default depth-7 context only fits two refinements
    let ctx = CkksContext::with_seed(CkksParams::default(), 101).unwrap();
    let keys = ctx.keygen();
    let b = ctx.encrypt(&keys.public_key, &[1.5]).unwrap();

    let mut obs = DecryptingObserver::new(&ctx, &keys.secret_key);
    let inv = newton_inverse(&ctx, &b, 0.4, 5, &mut obs).unwrap();
    assert_eq!(inv.iterations, 2);
    assert!(matches!(inv.stopped_by, Some(HeError::DepthExceeded { .. })));
    assert_eq!(obs.trace.len(), 2);

    let result = decrypt_first(&ctx, &keys, &inv.value);
    assert!((result - 0.6667).abs() < 1e-3, "got {}", result);
}

#[test]
fn test_scenario_goldschmidt_one_and_a_half() {
    let ctx = CkksContext::with_seed(CkksParams::default(), 102).unwrap();
    let keys = ctx.keygen();
    let cx = ctx.encrypt(&keys.public_key, &[1.5]).unwrap();

    let inv = goldschmidt_inverse(&ctx, &cx, 5, &mut Silent).unwrap();
    assert_eq!(inv.iterations, 5);
    let result = decrypt_first(&ctx, &keys, &inv.value);
    assert!((result - 0.6667).abs() < 1e-3, "got {}", result);
}

#[test]
fn test_scenario_normalize_five() {
    let n = normalize(5.0).unwrap();
    assert_eq!((n.value, n.factor), (1.25, 4.0));
}

#[test]
fn test_scenario_normalize_boundary() {
    let n = normalize(2.0).unwrap();
    assert!((n.value - 1.25).abs() < 1e-15);
    assert!((n.factor - 1.6).abs() < 1e-15);
}

#[test]
fn test_normalized_goldschmidt_recovers_reciprocal() {
    let ctx = CkksContext::with_seed(CkksParams::default(), 103).unwrap();
    let keys = ctx.keygen();

    for x in [-12.5, 2.0, 5.0, 37.0, 300.0] {
        let n = normalize(x).unwrap();
        let ct = ctx.encrypt(&keys.public_key, &[n.value]).unwrap();
        let inv = goldschmidt_inverse(&ctx, &ct, 6, &mut Silent).unwrap();
        let recovered = n.restore_reciprocal(decrypt_first(&ctx, &keys, &inv.value));
        assert!((recovered - 1.0 / x).abs() < 1e-4 / x.abs(), "x = {} gave {}", x, recovered);
    }
}

#[test]
fn test_factory_levels_feed_inverters() {
    let ctx = CkksContext::with_seed(CkksParams::default(), 104).unwrap();
    let keys = ctx.keygen();
    let mut rng = StdRng::seed_from_u64(5);

    // a level-3 input leaves room for only three goldschmidt iterations
    let ct = random_ciphertext(&ctx, &keys.public_key, 0.5, 1.0, 8, 3, &mut rng).unwrap();
    assert_eq!(ct.level(), 3);
    let inv = goldschmidt_inverse(&ctx, &ct, 5, &mut Silent).unwrap();
    assert_eq!(inv.iterations, 3);
    assert_eq!(inv.value.level(), 7);
    assert!(inv.truncated());
}

#[test]
fn test_concurrent_inversions_share_one_context() {
    let ctx = CkksContext::with_seed(CkksParams::with_depth(12), 105).unwrap();
    let keys = ctx.keygen();
    let inputs = [0.6, 0.9, 1.2, 1.5, 1.8];

    let results: Vec<(f64, f64)> = thread::scope(|s| {
        let handles: Vec<_> = inputs
            .iter()
            .map(|&x| {
                let (ctx, keys) = (&ctx, &keys);
                s.spawn(move || {
                    let ct = ctx.encrypt(&keys.public_key, &[x]).unwrap();
                    let newton = newton_inverse(ctx, &ct, 1.0, 5, &mut Silent).unwrap();
                    (x, decrypt_first(ctx, keys, &newton.value))
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for (x, r) in results {
        assert!((r - 1.0 / x).abs() < 1e-5, "x = {} gave {}", x, r);
    }
}
