//! # Dispatch — Per-d Strategy Selection
//!
//! Every admissible d reaching this layer is the product of a part coprime
//! to k (built by the enumerator) and an optional unitary divisor of k.
//! `prockd` fans one coprime modulus out over all admissible k-divisors;
//! `procd`/`procd_coprime` then choose among the three progression checks:
//!
//! | condition | strategy |
//! |---|---|
//! | l ≤ ZSHORT or l·ca ≤ ZFEW, and a·b > zmax | `check_one` |
//! | l ≤ ZSHORT or l·ca ≤ ZFEW, and a·b ≤ zmax | `check_few` with n = l |
//! | otherwise | `check_lift` |
//!
//! where l = ⌈zmax/(a·b)⌉ and ca is the number of parallel cube roots. The
//! l·ca ≤ ZFEW alternative lowers the break-even for lifting as roots
//! multiply (ZFEW = 2⁴·ZSHORT).
//!
//! `procd_bigprime` is the stripped path for prime d beyond bpmin, where the
//! caller has already computed the progression length and lifting is never
//! worth it.

use crate::cuberoots::verify_roots;
use crate::params::{ZFEW, ZSHORT};
use crate::zcheck::ZCheck;
use crate::Engine;

impl<'a> Engine<'a> {
    /// Process d together with every admissible divisor of k
    /// (automatically coprime to d).
    pub fn prockd(&self, d: u64, zd: &[u64], checker: &mut dyn ZCheck) {
        self.procd_coprime(d, zd, checker);
        for ki in 1..self.kdata.kdtab.len() {
            if d > self.kdata.kdmax[ki] {
                break;
            }
            self.procd(ki, d, zd, checker);
        }
    }

    /// Process d = a·kdtab[ki].d for a coprime to k.
    pub fn procd(&self, ki: usize, a: u64, za: &[u64], checker: &mut dyn ZCheck) {
        debug_assert!(verify_roots(za, a, self.params.k));
        debug_assert!(ki >= 1 && ki < self.kdata.kdtab.len() && a <= self.kdata.kdmax[ki]);

        let kd = &self.kdata.kdtab[ki];
        let d = a * kd.d;
        let ca = za.len() as u64;
        if !self.reporter.report_d(d, ca * kd.n as u64) {
            return;
        }

        let si = self.kdata.sgnz_index(d);
        let b = self.kdata.progression_modulus(ki, d, si);
        let step = a as u128 * b as u128;
        let l = self.params.progression_len(step);
        if l <= ZSHORT || l * ca <= ZFEW {
            if let Some(base) = self.kdata.progression_base(ki, a, d, si) {
                debug_assert_eq!(base.b, b);
                if step > self.params.zmax {
                    checker.check_one(d, si, a, za, base.b, &base.zb, base.ainvb, &base.binv);
                } else {
                    checker.check_few(d, si, a, za, base.b, &base.zb, base.ainvb, &base.binv, l);
                }
            }
        } else {
            checker.check_lift(d, si, ki, a, za);
        }
        self.reporter.profile_checkpoint();
    }

    /// Process d coprime to k.
    pub fn procd_coprime(&self, d: u64, z: &[u64], checker: &mut dyn ZCheck) {
        debug_assert!(verify_roots(z, d, self.params.k));

        let c = z.len() as u64;
        if !self.reporter.report_d(d, c) {
            return;
        }

        let si = self.kdata.sgnz_index(d);
        let b = self.kdata.progression_modulus(0, d, si);
        let step = d as u128 * b as u128;
        let l = self.params.progression_len(step);
        if l <= ZSHORT || l * c <= ZFEW {
            if let Some(base) = self.kdata.progression_base(0, d, d, si) {
                debug_assert_eq!(base.b, b);
                if step > self.params.zmax {
                    checker.check_one(d, si, d, z, base.b, &base.zb, base.ainvb, &base.binv);
                } else {
                    checker.check_few(d, si, d, z, base.b, &base.zb, base.ainvb, &base.binv, l);
                }
            }
        } else {
            checker.check_lift(d, si, 0, d, z);
        }
        self.reporter.profile_checkpoint();
    }

    /// Large prime d ≥ bpmin: the caller supplies the class index mi and the
    /// progression length l, cached across consecutive primes.
    pub fn procd_bigprime(
        &self,
        d: u64,
        z: &[u64],
        si: u32,
        mi: usize,
        l: u64,
        checker: &mut dyn ZCheck,
    ) {
        debug_assert!(mi < 4 && self.kdata.km[mi] > 0);
        debug_assert!(verify_roots(z, d, self.params.k));

        if !self.reporter.report_d(d, z.len() as u64) {
            return;
        }

        let binv = self.kdata.kminv[mi];
        let b = self.kdata.km[mi];
        let db = binv.reduce(d) as usize;
        let zb: Vec<u32> = self.kdata.kmztab[mi][db].iter().map(|&v| v as u32).collect();
        if zb.is_empty() {
            self.reporter.profile_checkpoint();
            return;
        }
        let dinvb = self.kdata.kmitab[mi][db];
        debug_assert_ne!(dinvb, 0);

        if l == 1 {
            checker.check_one(d, si, d, z, b, &zb, dinvb, &binv);
        } else {
            checker.check_few(d, si, d, z, b, &zb, dinvb, &binv, l);
        }
        self.reporter.profile_checkpoint();
    }
}
