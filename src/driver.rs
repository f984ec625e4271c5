//! # Driver — Six-Phase Worker Loop and Supervisor
//!
//! Each worker pulls primes from the shared pipe and routes them through six
//! phases, advancing monotonically as p grows. Each phase applies strictly
//! more cache knowledge than the last, so the dispatch path keeps
//! simplifying:
//!
//! 1. **Cached** (p ≤ cpmax): roots of all prime powers are precomputed;
//!    every power p^e ≤ dmax is seeded into the full enumerator.
//! 2. **Uncached** (p < cdmin): roots of k mod p computed on the fly,
//!    cofactor prime powers still cached.
//! 3. **Cocached** (p < sdmin): every admissible cofactor is in the cofactor
//!    table; the table walk replaces the recursive enumerator.
//! 4. **Near-prime** (p < pdmin): cofactors come with precomputed inverse
//!    tables, so the walk is a flat scan of `sdtab`.
//! 5. **Prime** (p < bpmin): d = p, nothing to enumerate.
//! 6. **Big-prime** (p ≤ pmax): d = p with the progression length cached
//!    across consecutive primes, recomputed only when p crosses the cached
//!    validity bound. For k² ≡ 4 (mod 7) a second (l₇, modulus·7) track
//!    serves the primes that force z ≡ 0 (mod 7); its validity bound
//!    deliberately reuses the default-track length, matching the original
//!    behavior (see the regression test).
//!
//! `process_subprimes` replaces the loop when the largest prime factor is
//! pinned to p0: the pipe then carries the second-largest prime, everything
//! is cached, and roots are joined with the precomputed table of inverses
//! mod p0.
//!
//! The supervisor validates nothing (the CLI already has), runs precompute,
//! sweeps the |z| ≤ TINY_ZMAX candidates the kernel excludes (scoped to this
//! shard's prime range and gated through `report_d` like every other d), and
//! scales out with one feeder thread plus N scoped workers. A worker panic
//! raises the stop flag, which drains every sibling through the pipe
//! sentinel; the failure is reported after join.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use anyhow::{bail, Result};
use rug::Integer;

use crate::cuberoots::{cuberoots_modp, CubeTables};
use crate::kdata::KData;
use crate::modular::{crt64, inverse_table_prime, Barrett32};
use crate::params::{Scratch, SearchParams, ZSHORT};
use crate::pipe::{self, PipeReader};
use crate::report::{LogReporter, Phase, Reporter};
use crate::zcheck::{SolutionChecker, ZCheck};
use crate::Engine;

/// Largest power q = p^i with q·p ≤ bound. Returns (q, i).
fn largest_power(p: u64, bound: u64) -> (u64, u32) {
    let mut q = p;
    let mut i = 1u32;
    while q <= bound / p {
        q *= p;
        i += 1;
    }
    (q, i)
}

impl<'a> Engine<'a> {
    /// The per-worker loop: process every prime this worker draws.
    pub fn process_primes(&self, pipe: &PipeReader, scratch: &mut Scratch, checker: &mut dyn ZCheck) {
        let pmax = pipe.end;
        let k = self.params.k;
        let dmax = self.params.dmax;
        let t = self.tables;
        let mut p = pipe.read();
        if p > pmax {
            return;
        }

        // Phase 1: cached primes. Roots mod p^e come from the tables, and
        // every cofactor prime power is guaranteed cached for the
        // enumerator.
        if p <= t.cpmax {
            while p <= t.cpmax && p <= pmax {
                if self.reporter.report_p(p) {
                    let pi = t.prime_index_at_least(p);
                    // Misses happen when k has no cube roots mod p or p | k.
                    if pi < t.cptab.len() && t.cptab[pi].p == p {
                        let (q, i) = largest_power(p, dmax);
                        let z = t.roots_mod_power(k, pi, i);
                        debug_assert!(!z.is_empty());
                        if self.reporter.report_c(z.len() as u32) {
                            let mut pp = p;
                            loop {
                                let zz: Vec<u64> = z.iter().map(|&v| v % pp).collect();
                                self.prockd(pp, &zz, checker);
                                self.enum_d(pp, p, &zz, &mut scratch.roots, checker);
                                if pp == q {
                                    break;
                                }
                                pp *= p;
                            }
                        }
                    }
                }
                p = pipe.read();
            }
        }
        if !self.reporter.report_phase(Phase::Cached) {
            return;
        }
        if p > pmax {
            return;
        }

        // From here on d is a prime p > √dmax times a √dmax-smooth cofactor.
        debug_assert!(p > t.cpmax);

        // Phase 2: p and its own roots are uncached; cofactors still are.
        while p < t.cdmin && p <= pmax {
            if self.reporter.report_p(p) {
                if k as u64 % p != 0 {
                    let z = cuberoots_modp(k, p);
                    if !z.is_empty() && self.reporter.report_c(z.len() as u32) {
                        self.prockd(p, &z, checker);
                        self.enum_d(p, p, &z, &mut scratch.roots, checker);
                    }
                }
            }
            p = pipe.read();
        }
        self.reporter.report_phase(Phase::Uncached);
        if p > pmax {
            return;
        }

        // Phase 3: every possible cofactor is in the cofactor cache.
        while p < t.sdmin && p <= pmax {
            if self.reporter.report_p(p) {
                let z = cuberoots_modp(k, p);
                if !z.is_empty() && self.reporter.report_c(z.len() as u32) {
                    self.prockd(p, &z, checker);
                    self.enum_cd(p, p, &z, &mut scratch.roots, checker);
                }
            }
            p = pipe.read();
        }
        self.reporter.report_phase(Phase::Cocached);
        if p > pmax {
            return;
        }

        // Phase 4: cofactors additionally carry inverse tables; the walk is
        // a flat scan shrinking as p grows.
        let mut sd_top = t.sdtab.len();
        while p < self.pdmin && p <= pmax {
            if self.reporter.report_p(p) {
                let z = cuberoots_modp(k, p);
                if !z.is_empty() && self.reporter.report_c(z.len() as u32) {
                    self.prockd(p, &z, checker);
                    while sd_top > 0
                        && p as u128 * t.sdtab[sd_top - 1].d as u128 > dmax as u128
                    {
                        sd_top -= 1;
                    }
                    for x in t.sdtab[..sd_top].iter().rev() {
                        let pinv = t.sd_inv(x, p);
                        let mut s = 0usize;
                        for &zi in &z {
                            for &zc in t.sd_roots(x) {
                                scratch.roots[s] = crt64(zi, p, zc as u32, &x.dinv, pinv);
                                s += 1;
                            }
                        }
                        self.prockd(p * x.d, &scratch.roots[..s], checker);
                    }
                }
            }
            p = pipe.read();
        }
        self.reporter.report_phase(Phase::NearPrime);
        if p > pmax {
            return;
        }

        // Phase 5: d = p, no cofactor fits.
        while p < self.bpmin && p <= pmax {
            if self.reporter.report_p(p) {
                let z = cuberoots_modp(k, p);
                if !z.is_empty() && self.reporter.report_c(z.len() as u32) {
                    self.procd_coprime(p, &z, checker);
                }
            }
            p = pipe.read();
        }
        self.reporter.report_phase(Phase::Prime);
        if p > pmax {
            return;
        }

        // Phase 6: d = p and progressions are short enough that lifting is
        // off the table; the length is cached across primes.
        let kd = self.kdata;
        let mi = (k & 1) as usize;
        let m = kd.km[mi] as u64;
        let mut l = self.params.progression_len(p as u128 * m as u128);
        let mut lpmax = self.params.len_valid_until(m, l);

        if kd.two_track_mod7() {
            let mi7 = mi + 2;
            let m7 = kd.km[mi7] as u64;
            let mut l7 = self.params.progression_len(p as u128 * m7 as u128);
            // The validity bound of the 7-track reuses the default-track
            // length; kept as-is to match the original scan behavior.
            let mut lpmax7 = self.params.len_valid_until(m7, l);
            while p <= pmax {
                if self.reporter.report_p(p) {
                    let z = cuberoots_modp(k, p);
                    if !z.is_empty() && self.reporter.report_c(z.len() as u32) {
                        let si = kd.sgnz_index(p);
                        if kd.one_z_mod7(p, si) {
                            if p > lpmax7 {
                                l7 = self.params.progression_len(p as u128 * m7 as u128);
                                lpmax7 = self.params.len_valid_until(m7, l);
                            }
                            self.procd_bigprime(p, &z, si, mi7, l7, checker);
                        } else {
                            if p > lpmax {
                                l = self.params.progression_len(p as u128 * m as u128);
                                lpmax = self.params.len_valid_until(m, l);
                            }
                            debug_assert!(l <= ZSHORT);
                            self.procd_bigprime(p, &z, si, mi, l, checker);
                        }
                    }
                }
                p = pipe.read();
            }
        } else {
            while p <= pmax {
                if self.reporter.report_p(p) {
                    let z = cuberoots_modp(k, p);
                    if !z.is_empty() && self.reporter.report_c(z.len() as u32) {
                        let si = kd.sgnz_index(p);
                        if p > lpmax {
                            l = self.params.progression_len(p as u128 * m as u128);
                            lpmax = self.params.len_valid_until(m, l);
                        }
                        debug_assert!(l <= ZSHORT);
                        self.procd_bigprime(p, &z, si, mi, l, checker);
                    }
                }
                p = pipe.read();
            }
        }
        self.reporter.report_phase(Phase::BigPrime);

        debug_assert!(p > pmax);
    }

    /// Worker loop when the largest prime factor is pinned to p0 and the
    /// pipe carries the second-largest prime.
    pub fn process_subprimes(
        &self,
        p0: u64,
        itabp0: &[u32],
        pipe: &PipeReader,
        scratch: &mut Scratch,
        checker: &mut dyn ZCheck,
    ) {
        let t = self.tables;
        let k = self.params.k;
        let dmax = self.params.dmax;
        let pipe_end = pipe.end;
        debug_assert!(pipe_end <= p0 && p0 <= t.cpmax);

        let pi0 = t.prime_index_at_least(p0);
        if pi0 >= t.cptab.len() || t.cptab[pi0].p != p0 {
            tracing::warn!(p0, "nothing to do: p0 is not an admissible prime");
            return;
        }
        let dmax0 = dmax / p0;
        let p0b = Barrett32::new(p0 as u32);
        let z0: Vec<u64> = t.cptab[pi0].roots.iter().map(|&z| z % p0).collect();

        let pmax = if pipe_end == p0 { p0 - 1 } else { pipe_end };
        let mut p = pipe.read();
        while p <= pmax && p < p0 {
            if self.reporter.report_p(p) {
                let pi = t.prime_index_at_least(p);
                if pi < t.cptab.len() && t.cptab[pi].p == p {
                    let (q, i) = largest_power(p, dmax0);
                    let z = t.roots_mod_power(k, pi, i);
                    let mut pp = p;
                    loop {
                        let zz: Vec<u64> = z.iter().map(|&v| v % pp).collect();
                        let qinv = itabp0[p0b.reduce(pp) as usize];
                        let mut s = 0usize;
                        for &zi in &zz {
                            for &z0j in &z0 {
                                scratch.roots[s] = crt64(zi, pp, z0j as u32, &p0b, qinv);
                                s += 1;
                            }
                        }
                        let (used, rest) = scratch.roots.split_at_mut(s);
                        self.prockd(pp * p0, used, checker);
                        self.enum_d(pp * p0, p, used, rest, checker);
                        if pp == q {
                            break;
                        }
                        pp *= p;
                    }
                }
            }
            p = pipe.read();
        }

        // If p0 itself pops out of the pipe, handle d = p0^e as well. The
        // e = 1 enumeration was already covered by the loop above.
        if p == p0 {
            if !self.reporter.report_p(p0) {
                return;
            }
            let (q, i) = largest_power(p0, dmax);
            let z = t.roots_mod_power(k, pi0, i);
            if !self.reporter.report_c(z.len() as u32) {
                return;
            }
            let mut pp = p0;
            loop {
                let zz: Vec<u64> = z.iter().map(|&v| v % pp).collect();
                self.prockd(pp, &zz, checker);
                if pp > p0 {
                    self.enum_d(pp, p0, &zz, &mut scratch.roots, checker);
                }
                if pp == q {
                    break;
                }
                pp *= p0;
            }
        }
    }
}

/// Largest prime factor of n, or 0 for n ≤ 1.
fn largest_prime_factor(mut n: u64) -> u64 {
    let mut largest = 0u64;
    let mut q = 2u64;
    while q * q <= n {
        while n % q == 0 {
            largest = q;
            n /= q;
        }
        q += 1;
    }
    if n > 1 {
        largest = n;
    }
    largest
}

/// Candidates with |z| ≤ TINY_ZMAX are excluded from the progression kernel
/// (their sign orientation is inverted relative to the tables), so the
/// supervisor tests them directly: for each tiny z, every divisor d of
/// k − z³. The kernel/sweep split partitions the candidates, so no (d, z)
/// pair is ever tested twice.
///
/// The sweep honors the same scoping as the enumerator: a divisor is only
/// tested on the shard whose [pmin, pmax] contains its largest prime
/// factor, so disjoint shard ranges neither overlap nor double-report. Each
/// tested divisor goes through `report_d` first, which applies the options
/// mask and the counters exactly as the dispatcher does.
fn tiny_sweep(params: &SearchParams, reporter: &dyn Reporter, checker: &mut SolutionChecker<'_>) {
    for w in 0..=crate::params::TINY_ZMAX as i64 {
        for sgn in [1i64, -1] {
            if w == 0 && sgn < 0 {
                continue;
            }
            let z = sgn * w;
            let v = params.k as i64 - z * z * z;
            if v == 0 {
                continue;
            }
            let av = v.unsigned_abs();
            for d in 1..=av {
                if av % d != 0 || d > params.dmax {
                    continue;
                }
                let lp = largest_prime_factor(d);
                if lp < params.pmin || lp > params.pmax {
                    continue;
                }
                if !reporter.report_d(d, 1) {
                    continue;
                }
                checker.test_candidate(d, Integer::from(z));
            }
        }
    }
}

/// Spawn the feeder and worker threads and run the search over
/// [start_pmin, pmax]. Any worker panic aborts the siblings and surfaces as
/// an error after join.
pub fn run_workers(
    engine: &Engine<'_>,
    start_pmin: u64,
    itabp0: Option<&[u32]>,
    stop: Arc<AtomicBool>,
) -> Result<()> {
    let params = engine.params;
    let (readers, mut feeder) = pipe::create(
        start_pmin,
        params.pmax,
        params.workers,
        Arc::clone(&stop),
    );
    let failed = AtomicBool::new(false);

    thread::scope(|s| {
        // The feeder must own its half so the channel hangs up the moment it
        // finishes; a lingering sender would leave readers blocked forever.
        s.spawn(move || {
            while feeder.feed() {}
        });
        for (job, reader) in readers.into_iter().enumerate() {
            let stop = Arc::clone(&stop);
            let failed = &failed;
            s.spawn(move || {
                engine.reporter.report_job_start(job);
                let outcome = catch_unwind(AssertUnwindSafe(|| {
                    let mut scratch = Scratch::new();
                    let mut checker =
                        SolutionChecker::new(engine.params, engine.kdata, engine.reporter);
                    match itabp0 {
                        Some(tab) => engine.process_subprimes(
                            params.p0,
                            tab,
                            &reader,
                            &mut scratch,
                            &mut checker,
                        ),
                        None => engine.process_primes(&reader, &mut scratch, &mut checker),
                    }
                }));
                if outcome.is_err() {
                    failed.store(true, Ordering::Relaxed);
                    stop.store(true, Ordering::Relaxed);
                }
                engine.reporter.report_job_end(job);
            });
        }
    });

    if failed.load(Ordering::Relaxed) {
        bail!("a worker aborted; search state is incomplete");
    }
    Ok(())
}

/// Expected counter values passed on the command line for comparison.
#[derive(Clone, Copy, Debug, Default)]
pub struct ExpectedCounts {
    pub pcnt: u64,
    pub ccnt: u64,
    pub dcnt: u64,
    pub rcnt: u64,
}

/// Full search: precompute, banner, resume, spawn, compare, report.
pub fn run_search(
    params: SearchParams,
    checkpoint_path: Option<PathBuf>,
    profiling: bool,
    expected: Option<ExpectedCounts>,
) -> Result<()> {
    let stop = Arc::new(AtomicBool::new(false));
    let reporter = LogReporter::new(
        params.clone(),
        checkpoint_path,
        Arc::clone(&stop),
        profiling,
    );

    let start_pmin = reporter.report_start();

    let kdata = KData::new(params.k, params.dmax);
    let tables = CubeTables::build(params.k, params.dmax);
    let engine = Engine::new(&params, &kdata, &tables, &reporter);
    if reporter.reporting() {
        println!(
            "LIMITS:pmin={}:pmax={}:dmax={}:zmax={}:cpmax={}:cdmax={}:cdmin={}:sdmin={}:pdmin={}:bpmin={}",
            params.pmin,
            params.pmax,
            params.dmax,
            params.zmax,
            tables.cpmax,
            tables.cdmax,
            tables.cdmin,
            tables.sdmin,
            engine.pdmin,
            engine.bpmin
        );
    }

    let itabp0 = if params.p0 > 1 {
        Some(inverse_table_prime(params.p0))
    } else {
        None
    };

    // Fresh unpinned runs only: a resumed run already swept, and pinned
    // (P0xQ) sub-shards leave the tiny range to the plain shard that owns
    // those primes.
    if params.p0 == 1 && start_pmin <= params.pmin {
        let mut checker = SolutionChecker::new(&params, &kdata, &reporter);
        tiny_sweep(&params, &reporter, &mut checker);
    }

    if !reporter.report_phase(Phase::Precompute) {
        reporter.report_end(true);
        return Ok(());
    }

    let result = run_workers(&engine, start_pmin, itabp0.as_deref(), stop);
    match result {
        Ok(()) => {
            reporter.report_end(true);
            if let Some(e) = expected {
                reporter.report_comparisons(e.pcnt, e.ccnt, e.dcnt, e.rcnt);
            }
            Ok(())
        }
        Err(err) => {
            reporter.report_end(false);
            Err(err)
        }
    }
}
