//! # Enumerate — Admissible-Modulus Extension
//!
//! Two cooperating routines grow a modulus d (whose cube roots of k are in
//! hand) by admissible cofactors, CRT-lifting the roots as they go. Every
//! emitted (d·c, roots) pair lands in the dispatcher via `prockd`.
//!
//! - `enum_cd` serves d ≥ cdmin: every possible cofactor is in the
//!   precomputed table, so the walk is a downward scan of `cdtab` filtered
//!   by the prime bound. Cofactors above sdmax need d⁻¹ mod c, which is
//!   deferred into IBATCH-sized queues and resolved with one batched
//!   inversion; cofactors within sdtab read both roots and inverses straight
//!   from the tables.
//! - `enum_d` serves smaller d: it walks (prime index, exponent) pairs over
//!   the cached primes strictly below its prime bound, batches the modular
//!   inverses the same way, emits each extension, and recurses into the
//!   extension (switching to `enum_cd` once the product crosses cdmin).
//!
//! The root scratch is threaded down the recursion by splitting: a child
//! level writes after its parent's roots, which keeps the whole recursion
//! inside one CUBEROOT_BUFSIZE allocation.
//!
//! Root combination uses the fcrt64 form: with u = c·(c⁻¹ mod d) − 1 the
//! combination of ζ_c and ζ_d costs one multiply and one reduction.

use crate::cuberoots::verify_roots;
use crate::modular::{batch_invert, fcrt64, Montgomery64};
use crate::params::IBATCH;
use crate::zcheck::ZCheck;
use crate::Engine;

impl<'a> Engine<'a> {
    /// Extend d (≥ cdmin, smallest prime factor bound p) by every admissible
    /// cofactor in the cache, emitting each product through `prockd`.
    pub fn enum_cd(
        &self,
        d: u64,
        p: u64,
        zd: &[u64],
        scratch: &mut [u64],
        checker: &mut dyn ZCheck,
    ) {
        debug_assert!(d >= self.tables.cdmin);
        debug_assert!(verify_roots(zd, d, self.params.k));
        let dmax = self.params.dmax;
        let Some(start) = self.tables.cd_entry(p, dmax / d) else {
            return;
        };

        // Inversions are only needed on the batch path, which d ≥ sdmin
        // never takes.
        let mg = if d < self.tables.sdmin {
            Some(Montgomery64::new(d))
        } else {
            None
        };

        let mut queue: Vec<usize> = Vec::with_capacity(IBATCH);
        let mut invs: Vec<u64> = Vec::with_capacity(IBATCH);
        let mut idx = start;
        loop {
            if idx == 0 || queue.len() == IBATCH {
                if queue.is_empty() && idx == 0 {
                    return;
                }
                if !queue.is_empty() {
                    let mg = mg.as_ref().expect("batch path requires d < sdmin");
                    invs.clear();
                    invs.extend(queue.iter().map(|&qi| self.tables.cdtab[qi].d));
                    batch_invert(&mut invs, mg).expect("cofactors are coprime to d");
                    for (&qi, &cinv) in queue.iter().zip(invs.iter()) {
                        let e = self.tables.cdtab[qi];
                        let c = e.d;
                        let u = c * cinv - 1;
                        let cd = c * d;
                        let mut s = 0usize;
                        for &zc in self.tables.cd_roots(&e) {
                            let nzc = c - zc;
                            for &z in zd {
                                scratch[s] = fcrt64(u, nzc, z, c, cd);
                                s += 1;
                            }
                        }
                        self.prockd(cd, &scratch[..s], checker);
                    }
                    queue.clear();
                }
                if idx == 0 {
                    return;
                }
            }
            let e = self.tables.cdtab[idx];
            debug_assert!(e.d <= dmax / d);
            debug_assert!(e.p < p);
            if e.sdpi != usize::MAX {
                // Small cofactor: roots and inverse both precomputed.
                let y = &self.tables.sdtab[e.sdpi];
                debug_assert_eq!(y.d, e.d);
                let dinv_c = self.tables.sd_inv(y, d);
                let mut s = 0usize;
                for &z in zd {
                    for &zc in self.tables.sd_roots(y) {
                        scratch[s] = crate::modular::crt64(z, d, zc as u32, &y.dinv, dinv_c);
                        s += 1;
                    }
                }
                self.prockd(d * y.d, &scratch[..s], checker);
            } else {
                queue.push(idx);
            }
            idx = self.tables.next_cd_entry(idx, p);
        }
    }

    /// Recursively extend d (< cdmin, smallest prime factor bound p) by
    /// powers of cached primes strictly below p.
    pub fn enum_d(
        &self,
        d: u64,
        p: u64,
        zd: &[u64],
        scratch: &mut [u64],
        checker: &mut dyn ZCheck,
    ) {
        if d >= self.tables.cdmin {
            self.enum_cd(d, p, zd, scratch, checker);
            return;
        }
        debug_assert!(verify_roots(zd, d, self.params.k));
        let dmax = self.params.dmax;
        let Some(mut pi) = self.tables.pimax(p, d, dmax) else {
            return;
        };
        let mg = Montgomery64::new(d);

        let mut queue: Vec<(u64, usize, u32)> = Vec::with_capacity(IBATCH);
        let mut invs: Vec<u64> = Vec::with_capacity(IBATCH);
        let mut q = self.tables.cptab[pi].p;
        let mut e = 1u32;
        let mut exhausted = false;
        loop {
            if exhausted || queue.len() == IBATCH {
                if queue.is_empty() {
                    return;
                }
                invs.clear();
                invs.extend(queue.iter().map(|&(qv, _, _)| qv));
                batch_invert(&mut invs, &mg).expect("prime powers are coprime to d");
                for (&(qv, qpi, qe), &qinv) in queue.iter().zip(invs.iter()) {
                    let u = qv * qinv - 1;
                    let qd = qv * d;
                    let qroots = self.tables.roots_mod_power(self.params.k, qpi, qe);
                    let mut s = 0usize;
                    for &zq in &qroots {
                        let nzq = qv - zq;
                        for &z in zd {
                            scratch[s] = fcrt64(u, nzq, z, qv, qd);
                            s += 1;
                        }
                    }
                    let (used, rest) = scratch.split_at_mut(s);
                    self.prockd(qd, used, checker);
                    let next_p = self.tables.cptab[qpi].p;
                    if qd >= self.tables.cdmin {
                        self.enum_cd(qd, next_p, used, rest, checker);
                    } else {
                        self.enum_d(qd, next_p, used, rest, checker);
                    }
                }
                if exhausted {
                    return;
                }
                queue.clear();
            }
            debug_assert!(q <= dmax / d);
            queue.push((q, pi, e));
            // Advance to the next power, dropping to the next smaller prime
            // when the product would overflow dmax.
            let pr = self.tables.cptab[pi].p;
            if q > dmax / d / pr {
                if pi == 0 {
                    exhausted = true;
                } else {
                    pi -= 1;
                    q = self.tables.cptab[pi].p;
                    e = 1;
                    if q > dmax / d {
                        exhausted = true;
                    }
                }
            } else {
                q *= pr;
                e += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cuberoots::{cuberoots_modp, cuberoots_modq, CubeTables};
    use crate::kdata::KData;
    use crate::modular::Barrett32;
    use crate::params::{Scratch, SearchParams};
    use crate::report::{Phase, Reporter};
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    struct SinkChecker;

    impl ZCheck for SinkChecker {
        fn check_one(
            &mut self,
            _d: u64,
            _si: u32,
            _a: u64,
            _za: &[u64],
            _b: u32,
            _zb: &[u32],
            _ainvb: u32,
            _binv: &Barrett32,
        ) {
        }
        fn check_few(
            &mut self,
            _d: u64,
            _si: u32,
            _a: u64,
            _za: &[u64],
            _b: u32,
            _zb: &[u32],
            _ainvb: u32,
            _binv: &Barrett32,
            _n: u64,
        ) {
        }
        fn check_lift(&mut self, _d: u64, _si: u32, _ki: usize, _a: u64, _za: &[u64]) {}
    }

    /// Collects every (d, root count) pair handed to report_d.
    struct CollectingReporter {
        seen: Mutex<BTreeMap<u64, Vec<u64>>>,
    }

    impl CollectingReporter {
        fn new() -> Self {
            CollectingReporter {
                seen: Mutex::new(BTreeMap::new()),
            }
        }
    }

    impl Reporter for CollectingReporter {
        fn report_start(&self) -> u64 {
            0
        }
        fn report_p(&self, _p: u64) -> bool {
            true
        }
        fn report_c(&self, _n: u32) -> bool {
            true
        }
        fn report_d(&self, d: u64, n: u64) -> bool {
            self.seen.lock().unwrap().entry(d).or_default().push(n);
            true
        }
        fn report_phase(&self, _phase: Phase) -> bool {
            true
        }
        fn report_job_start(&self, _job: usize) {}
        fn report_job_end(&self, _job: usize) {}
        fn report_solution(&self, _x: &str, _y: &str, _z: &str) {}
        fn report_end(&self, _ok: bool) {}
        fn report_comparisons(&self, _p: u64, _c: u64, _d: u64, _r: u64) {}
        fn profile_checkpoint(&self) {}
        fn profiling(&self) -> bool {
            false
        }
        fn reporting(&self) -> bool {
            true
        }
    }

    struct Fixture {
        params: SearchParams,
        kdata: KData,
        tables: CubeTables,
        reporter: CollectingReporter,
    }

    impl Fixture {
        fn new(k: u32, dmax: u64, zmax: u128) -> Self {
            Fixture {
                params: SearchParams::new(k, dmax, zmax, 2, dmax, 1, 1, 0),
                kdata: KData::new(k, dmax),
                tables: CubeTables::build(k, dmax),
                reporter: CollectingReporter::new(),
            }
        }

        fn engine(&self) -> Engine<'_> {
            Engine::new(&self.params, &self.kdata, &self.tables, &self.reporter)
        }

        /// The coprime-to-k moduli the reporter saw (k-divisor multiples
        /// filtered out).
        fn coprime_ds(&self) -> Vec<u64> {
            self.seen_ds()
                .into_iter()
                .filter(|&d| crate::modular::gcd(d, self.params.k as u64) == 1)
                .collect()
        }

        fn seen_ds(&self) -> Vec<u64> {
            self.reporter.seen.lock().unwrap().keys().copied().collect()
        }
    }

    /// Brute-force reference: the admissible d ≤ dmax, coprime to k, with
    /// largest prime factor exactly p.
    fn reference_ds(k: u32, dmax: u64, p: u64) -> Vec<u64> {
        let mut out = Vec::new();
        'outer: for d in 2..=dmax {
            let mut n = d;
            let mut largest = 0u64;
            let mut q = 2u64;
            while q * q <= n {
                if n % q == 0 {
                    largest = q;
                    if k as u64 % q == 0 || !crate::cuberoots::has_cuberoots_modp(k, q) {
                        continue 'outer;
                    }
                    while n % q == 0 {
                        n /= q;
                    }
                }
                q += 1;
            }
            if n > 1 {
                largest = largest.max(n);
                if k as u64 % n == 0 || !crate::cuberoots::has_cuberoots_modp(k, n) {
                    continue;
                }
            }
            if largest == p {
                out.push(d);
            }
        }
        out
    }

    /// Drive the enumerator exactly like the cached phase does for prime p.
    fn run_for_prime(fx: &Fixture, p: u64) {
        let engine = fx.engine();
        let mut scratch = Scratch::new();
        let mut checker = SinkChecker;
        let k = fx.params.k;
        let dmax = fx.params.dmax;
        let mut i = 1u32;
        let mut q = p;
        while q <= dmax / p {
            q *= p;
            i += 1;
        }
        let z = cuberoots_modq(k, p, i);
        let mut pp = p;
        loop {
            let zz: Vec<u64> = z.iter().map(|&v| v % pp).collect();
            engine.prockd(pp, &zz, &mut checker);
            engine.enum_d(pp, p, &zz, &mut scratch.roots, &mut checker);
            if pp == q {
                break;
            }
            pp *= p;
        }
    }

    #[test]
    fn enumerator_matches_brute_force_for_k6() {
        // Each admissible d ≤ dmax with largest prime p must be visited
        // exactly once when the driver loop for p runs.
        let fx = Fixture::new(6, 2000, 1_000_000);
        for p in [5u64, 7, 11, 17] {
            run_for_prime(&fx, p);
        }
        let mut expect: Vec<u64> = Vec::new();
        for p in [5u64, 7, 11, 17] {
            expect.extend(reference_ds(6, 2000, p));
        }
        expect.sort_unstable();
        assert_eq!(fx.coprime_ds(), expect);
    }

    #[test]
    fn enumerator_visits_each_d_exactly_once() {
        let fx = Fixture::new(33, 5000, 1_000_000);
        for p in [2u64, 5, 13, 17, 29] {
            run_for_prime(&fx, p);
        }
        let seen = fx.reporter.seen.lock().unwrap();
        for (d, counts) in seen.iter() {
            assert_eq!(counts.len(), 1, "d={} visited {} times", d, counts.len());
        }
    }

    #[test]
    fn enumerator_root_counts_are_products() {
        // Root count for d = product over prime powers of per-power counts.
        let fx = Fixture::new(6, 5000, 1_000_000);
        run_for_prime(&fx, 7);
        let seen = fx.reporter.seen.lock().unwrap();
        // d = 35 = 5·7: one root mod 5, three mod 7 → 3 progressions.
        assert_eq!(seen.get(&35).unwrap(), &vec![3]);
        // d = 49: three roots mod 49.
        assert_eq!(seen.get(&49).unwrap(), &vec![3]);
        // d = 245 = 5·49: still 3.
        assert_eq!(seen.get(&245).unwrap(), &vec![3]);
    }

    /// Brute-force reference for extensions of a prime p: p·c for every
    /// admissible c ≤ dmax/p whose primes are all < p.
    fn reference_extensions(k: u32, dmax: u64, p: u64) -> Vec<u64> {
        let mut out = Vec::new();
        'outer: for c in 2..=dmax / p {
            let mut n = c;
            let mut q = 2u64;
            while q * q <= n {
                if n % q == 0 {
                    if q >= p || k as u64 % q == 0 || !crate::cuberoots::has_cuberoots_modp(k, q) {
                        continue 'outer;
                    }
                    while n % q == 0 {
                        n /= q;
                    }
                }
                q += 1;
            }
            if n > 1 && (n >= p || k as u64 % n == 0 || !crate::cuberoots::has_cuberoots_modp(k, n))
            {
                continue;
            }
            out.push(p * c);
        }
        out.sort_unstable();
        out
    }

    #[test]
    fn enum_cd_handles_prime_above_cdmin() {
        // dmax = 10⁶ → cdmin ≈ 10³: a prime just above cdmin exercises the
        // cofactor-table walk directly.
        let fx = Fixture::new(6, 1_000_000, 1_000_000);
        let engine = fx.engine();
        let mut scratch = Scratch::new();
        let mut checker = SinkChecker;
        let p = 1013u64; // prime ≡ 2 (mod 3): always admissible
        assert!(p >= fx.tables.cdmin);
        let za = cuberoots_modp(6, p);
        engine.prockd(p, &za, &mut checker);
        engine.enum_cd(p, p, &za, &mut scratch.roots, &mut checker);
        let mut got = fx.coprime_ds();
        got.retain(|&d| d != p);
        assert_eq!(got, reference_extensions(6, 1_000_000, p));
    }

    #[test]
    fn batch_path_agrees_with_small_path() {
        // dmax > 2^20 puts cofactors on both sides of sdmax, so the batched
        // inversion path and the small-table path both run; the union must
        // match brute force.
        let fx = Fixture::new(33, 3_000_000, 1_000_000);
        assert!(fx.tables.sdmax < fx.tables.cdmax);
        let engine = fx.engine();
        let mut scratch = Scratch::new();
        let mut checker = SinkChecker;
        let p = 503u64; // prime ≡ 2 (mod 3)
        let za = cuberoots_modp(33, p);
        assert_eq!(za.len(), 1);
        engine.enum_d(p, p, &za, &mut scratch.roots, &mut checker);
        let mut got = fx.coprime_ds();
        got.retain(|&d| d != p);
        assert_eq!(got, reference_extensions(33, 3_000_000, p));
    }
}
