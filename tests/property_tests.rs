//! Property-based tests for cubehunt's mathematical primitives.
//!
//! These tests use the `proptest` framework to verify mathematical
//! invariants across thousands of randomly generated inputs. Unlike
//! example-based tests that check specific known values, property tests
//! express universal truths that must hold for all valid inputs.
//!
//! # How to run
//!
//! ```bash
//! cargo test --test property_tests
//!
//! # Increase case count for thorough testing (default is 256):
//! PROPTEST_CASES=10000 cargo test --test property_tests
//! ```
//!
//! # Testing strategy
//!
//! Properties are organized by module:
//! - **modular**: Montgomery round-trips, batched inversion, CRT
//!   combination, deterministic primality
//! - **cuberoots**: every extracted root cubes back to k, Hensel lifts stay
//!   consistent under reduction
//! - **params**: the float-estimated progression length equals the exact
//!   128-bit ceiling
//! - **kdata**: admissible residue tables never lose a residue that has a
//!   witness, sign classes match orientation solvability
//!
//! Each property is named `prop_<module>_<invariant>`.

use proptest::prelude::*;

use cubehunt::cuberoots::{cuberoots_modp, cuberoots_modq, has_cuberoots_modp};
use cubehunt::modular::{
    batch_invert, crt64, fcrt64, gcd, inv_mod, is_prime64, pow_mod, Barrett32, Montgomery64,
};
use cubehunt::params::SearchParams;

/// Odd moduli > 1 for Montgomery properties.
fn odd_modulus() -> impl Strategy<Value = u64> {
    (1u64..(1 << 31)).prop_map(|v| 2 * v + 1)
}

/// Small primes ≡ 2 (mod 3) and ≡ 1 (mod 3) mixed, none dividing the ks
/// used below.
const TEST_PRIMES: [u64; 16] = [
    5, 7, 13, 17, 19, 23, 29, 31, 37, 41, 43, 53, 61, 101, 757, 999983,
];

/// Valid ks (≡ 3 or 6 mod 9).
const TEST_KS: [u32; 6] = [3, 6, 33, 42, 51, 966];

proptest! {
    // == modular ==============================================================

    /// Montgomery multiplication agrees with the u128 reference.
    #[test]
    fn prop_modular_montgomery_mul_matches(
        m in odd_modulus(),
        a in any::<u64>(),
        b in any::<u64>(),
    ) {
        let mg = Montgomery64::new(m);
        let expect = ((a % m) as u128 * (b % m) as u128 % m as u128) as u64;
        prop_assert_eq!(mg.mul_plain(a % m, b % m), expect);
    }

    /// to_mont/from_mont is the identity.
    #[test]
    fn prop_modular_montgomery_roundtrip(m in odd_modulus(), a in any::<u64>()) {
        let mg = Montgomery64::new(m);
        prop_assert_eq!(mg.from_mont(mg.to_mont(a)), a % m);
    }

    /// Batched inversion inverts every element (over a prime modulus, where
    /// all nonzero residues are invertible).
    #[test]
    fn prop_modular_batch_invert(
        seed in any::<u64>(),
        len in 1usize..64,
    ) {
        let p = 1_000_003u64;
        let mg = Montgomery64::new(p);
        let mut vals: Vec<u64> = (0..len as u64)
            .map(|i| (seed.wrapping_mul(i.wrapping_add(7)) % (p - 1)) + 1)
            .collect();
        let originals = vals.clone();
        batch_invert(&mut vals, &mg).unwrap();
        for (v, inv) in originals.iter().zip(vals.iter()) {
            prop_assert_eq!(v * inv % p, 1);
        }
    }

    /// crt64 produces the unique residue mod a·b.
    #[test]
    fn prop_modular_crt64(
        a in 2u64..1_000_000_000,
        za in any::<u64>(),
        zb in any::<u32>(),
    ) {
        // Use b = 162 and force gcd(a, 162) = 1 by adjustment.
        let mut a = a;
        while gcd(a, 162) != 1 {
            a += 1;
        }
        let za = za % a;
        let zb = zb % 162;
        let b = Barrett32::new(162);
        let ainvb = inv_mod(a % 162, 162).unwrap() as u32;
        let r = crt64(za, a, zb, &b, ainvb);
        prop_assert!(r < a * 162);
        prop_assert_eq!(r % a, za);
        prop_assert_eq!(r % 162, zb as u64);
    }

    /// fcrt64 with the u = a·a⁻¹ − 1 mixing constant merges residues.
    #[test]
    fn prop_modular_fcrt64(
        a in 2u64..100_000,
        d in 3u64..100_000,
        za in any::<u64>(),
        zd in any::<u64>(),
    ) {
        prop_assume!(gcd(a, d) == 1);
        let za = za % a;
        let zd = zd % d;
        let ainv = inv_mod(a, d).unwrap();
        let u = a * ainv - 1;
        let r = fcrt64(u, a - za, zd, a, a * d);
        prop_assert!(r < a * d);
        prop_assert_eq!(r % a, za);
        prop_assert_eq!(r % d, zd);
    }

    /// is_prime64 matches trial division on small inputs.
    #[test]
    fn prop_modular_is_prime64_matches_trial(n in 0u64..200_000) {
        let trial = n >= 2 && (2..=cubehunt::modular::isqrt(n)).all(|d| n % d != 0);
        prop_assert_eq!(is_prime64(n), trial);
    }

    // == cuberoots ============================================================

    /// Every extracted root is reduced and cubes back to k; the count is
    /// exactly the brute-force count.
    #[test]
    fn prop_cuberoots_modp_sound_and_complete(
        ki in 0usize..TEST_KS.len(),
        pi in 0usize..TEST_PRIMES.len() - 2, // keep brute force fast
    ) {
        let (k, p) = (TEST_KS[ki], TEST_PRIMES[pi]);
        prop_assume!(k as u64 % p != 0);
        let roots = cuberoots_modp(k, p);
        for &z in &roots {
            prop_assert!(z < p);
            prop_assert_eq!(pow_mod(z, 3, p), k as u64 % p);
        }
        let expect = (0..p).filter(|&z| pow_mod(z, 3, p) == k as u64 % p).count();
        prop_assert_eq!(roots.len(), expect);
        prop_assert_eq!(has_cuberoots_modp(k, p), !roots.is_empty());
    }

    /// Hensel lifts reduce consistently: roots mod p^e map onto roots mod
    /// p^(e−1) under reduction.
    #[test]
    fn prop_cuberoots_hensel_consistent(
        ki in 0usize..TEST_KS.len(),
        pi in 0usize..6,
        e in 2u32..5,
    ) {
        let (k, p) = (TEST_KS[ki], TEST_PRIMES[pi]);
        prop_assume!(k as u64 % p != 0);
        let hi = cuberoots_modq(k, p, e);
        let lo = cuberoots_modq(k, p, e - 1);
        let q = p.pow(e);
        let qlo = p.pow(e - 1);
        for &z in &hi {
            prop_assert!(z < q);
            prop_assert_eq!(pow_mod(z, 3, q), k as u64 % q);
            prop_assert!(lo.contains(&(z % qlo)));
        }
        prop_assert_eq!(hi.len(), lo.len());
    }

    // == params ===============================================================

    /// The fudged float estimate, after correction, is the exact ceiling
    /// whenever the quotient fits comfortably in u64.
    #[test]
    fn prop_params_progression_len_exact(
        zmax in 1u128..(1u128 << 80),
        step in 1u128..(1u128 << 75),
    ) {
        let expect = zmax.div_ceil(step).max(1);
        prop_assume!(expect < (1u128 << 62));
        let params = SearchParams::new(33, 1000, zmax, 2, 100, 1, 1, 0);
        prop_assert_eq!(params.progression_len(step) as u128, expect);
    }

    // == kdata ================================================================

    /// Admissible z residues are exactly those with a mod-m witness pair,
    /// merged over both orientations of x + y.
    #[test]
    fn prop_kdata_ztab_matches_witness_search(
        ki in 0usize..TEST_KS.len(),
        dm in 0u64..9,
    ) {
        let k = TEST_KS[ki];
        let kd = cubehunt::kdata::KData::new(k, 10_000);
        let class = &kd.classes[0];
        let m = class.m as u64;
        let dmc = dm % m;
        let listed = &class.ztab[dmc as usize];
        for zr in 0..m {
            let witness = (0..m).any(|x| (0..m).any(|y| {
                let t = (x + y) % m;
                (t == dmc || t == (m - dmc) % m)
                    && (pow_mod(x, 3, m) + pow_mod(y, 3, m) + pow_mod(zr, 3, m)) % m
                        == k as u64 % m
            }));
            prop_assert_eq!(listed.contains(&(zr as u16)), witness,
                "k={} m={} dm={} zr={}", k, m, dmc, zr);
        }
    }
}

// == Non-proptest cross-module properties =====================================

/// The sign class is nonzero exactly when some orientation is solvable
/// mod 9 (checked over a sweep of d).
#[test]
fn sign_class_matches_mod9_solvability() {
    for &k in &TEST_KS {
        let kd = cubehunt::kdata::KData::new(k, 1000);
        for d in 1..200u64 {
            let si = kd.sgnz_index(d);
            let dm = d % 9;
            let solvable = |target: u64| {
                (0..9u64).any(|x| {
                    (0..9u64).any(|y| {
                        (x + y) % 9 == target
                            && (0..9u64).any(|z| {
                                (pow_mod(x, 3, 9) + pow_mod(y, 3, 9) + pow_mod(z, 3, 9)) % 9
                                    == k as u64 % 9
                            })
                    })
                })
            };
            let pos = solvable((9 - dm) % 9);
            let neg = solvable(dm);
            assert_eq!(si & cubehunt::kdata::SGN_POS != 0, pos, "k={} d={}", k, d);
            assert_eq!(si & cubehunt::kdata::SGN_NEG != 0, neg, "k={} d={}", k, d);
        }
    }
}

/// Root counts are multiplicative: the enumerator's CRT-combined root sets
/// for d = p·q have |roots(p)|·|roots(q)| members, all valid.
#[test]
fn crt_combined_roots_are_valid() {
    for &k in &[6u32, 33] {
        for &(p, q) in &[(5u64, 7u64), (5, 13), (7, 13), (2, 7)] {
            if k as u64 % p == 0 || k as u64 % q == 0 {
                continue;
            }
            let rp = cuberoots_modp(k, p);
            let rq = cuberoots_modp(k, q);
            let d = p * q;
            let expect = (0..d)
                .filter(|&z| pow_mod(z, 3, d) == k as u64 % d)
                .count();
            assert_eq!(rp.len() * rq.len(), expect, "k={} d={}", k, d);
        }
    }
}
