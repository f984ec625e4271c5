//! # Report — Progress Counters, Banners, and Resume Control
//!
//! The reporter sits between the engine and the outside world. Every worker
//! calls it for each prime (`report_p`), each root set (`report_c`), each
//! admissible d (`report_d`), and each phase boundary (`report_phase`). The
//! boolean returns steer the caller:
//!
//! - `false` from `report_p`/`report_c`/`report_d` means "skip the rest of
//!   the work for this scope" — used by the options mask, which truncates
//!   the per-prime pipeline after prime counting (1), root counting (2), or
//!   d enumeration (3).
//! - `false` from `report_phase` means the checkpoint already covers this
//!   run; the supervisor ends cleanly without spawning workers.
//!
//! Counters are atomics updated lock-free from every worker; the phase
//! boundary writes a checkpoint keyed on the highest prime reported so far.
//!
//! ## Profiling
//!
//! With profiling enabled the run is single-worker and `profile_checkpoint`
//! raises the shared stop flag once enough per-d samples have been
//! collected, which drains the pipe and ends the run.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use crate::checkpoint::{self, Checkpoint};
use crate::params::SearchParams;

/// The six driver phases plus the precompute marker, in execution order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u32)]
pub enum Phase {
    Precompute = 0,
    Cached = 1,
    Uncached = 2,
    Cocached = 3,
    NearPrime = 4,
    Prime = 5,
    BigPrime = 6,
}

impl Phase {
    pub fn id(self) -> u32 {
        self as u32
    }
}

/// Contract between the engine and the reporting/checkpoint layer.
pub trait Reporter: Sync {
    /// Called once before precompute; returns the resume point start_pmin.
    fn report_start(&self) -> u64;
    /// Per prime pulled from the pipe. False truncates this prime's work.
    fn report_p(&self, p: u64) -> bool;
    /// Per root set computed. False truncates this prime's work.
    fn report_c(&self, n: u32) -> bool;
    /// Per admissible d (n = progression count). False skips the z checks.
    fn report_d(&self, d: u64, n: u64) -> bool;
    /// Per phase boundary. False short-circuits the run.
    fn report_phase(&self, phase: Phase) -> bool;
    fn report_job_start(&self, job: usize);
    fn report_job_end(&self, job: usize);
    /// A verified solution x³ + y³ + z³ = k.
    fn report_solution(&self, x: &str, y: &str, z: &str);
    fn report_end(&self, ok: bool);
    /// Compare observed counters against expectations from the CLI.
    fn report_comparisons(&self, pcnt: u64, ccnt: u64, dcnt: u64, rcnt: u64);
    /// Called after every dispatched d; ends a profiling run once saturated.
    fn profile_checkpoint(&self);
    fn profiling(&self) -> bool;
    fn reporting(&self) -> bool;
}

/// Counter snapshot, used by tests and the comparison report.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Counts {
    pub pcnt: u64,
    pub ccnt: u64,
    pub dcnt: u64,
    pub rcnt: u64,
}

/// Production reporter: tracing output, atomic counters, checkpoint files.
pub struct LogReporter {
    params: SearchParams,
    checkpoint_path: Option<PathBuf>,
    stop: Arc<AtomicBool>,
    profiling: bool,
    pcnt: AtomicU64,
    ccnt: AtomicU64,
    dcnt: AtomicU64,
    rcnt: AtomicU64,
    max_p: AtomicU64,
    phase_done: AtomicU32,
    profile_samples: AtomicU64,
    resume_complete: AtomicBool,
}

/// Profiling stops after this many dispatched d.
const PROFILE_SAMPLE_TARGET: u64 = 1 << 22;

impl LogReporter {
    pub fn new(
        params: SearchParams,
        checkpoint_path: Option<PathBuf>,
        stop: Arc<AtomicBool>,
        profiling: bool,
    ) -> Self {
        LogReporter {
            params,
            checkpoint_path,
            stop,
            profiling,
            pcnt: AtomicU64::new(0),
            ccnt: AtomicU64::new(0),
            dcnt: AtomicU64::new(0),
            rcnt: AtomicU64::new(0),
            max_p: AtomicU64::new(0),
            phase_done: AtomicU32::new(0),
            profile_samples: AtomicU64::new(0),
            resume_complete: AtomicBool::new(false),
        }
    }

    pub fn counts(&self) -> Counts {
        Counts {
            pcnt: self.pcnt.load(Ordering::Relaxed),
            ccnt: self.ccnt.load(Ordering::Relaxed),
            dcnt: self.dcnt.load(Ordering::Relaxed),
            rcnt: self.rcnt.load(Ordering::Relaxed),
        }
    }

    fn snapshot(&self, phase: u32) -> Checkpoint {
        let c = self.counts();
        Checkpoint {
            k: self.params.k,
            p0: self.params.p0,
            pmin: self.params.pmin,
            pmax: self.params.pmax,
            dmax: self.params.dmax,
            zmax: self.params.zmax.to_string(),
            next_pmin: self.max_p.load(Ordering::Relaxed) + 1,
            phase,
            pcnt: c.pcnt,
            ccnt: c.ccnt,
            dcnt: c.dcnt,
            rcnt: c.rcnt,
        }
    }

    /// Options-mask stage: 0 means unrestricted.
    fn stage_allows(&self, stage: u32) -> bool {
        let o = self.params.options;
        o == 0 || o > stage
    }
}

impl Reporter for LogReporter {
    fn report_start(&self) -> u64 {
        let p = &self.params;
        println!(
            "START:{}:k={}:p0={}:pmin={}:pmax={}:dmax={}:zmax={}:n={}:opts={}",
            chrono::Utc::now().format("%Y-%m-%d %H:%M:%S"),
            p.k,
            p.p0,
            p.pmin,
            p.pmax,
            p.dmax,
            p.zmax,
            p.workers,
            p.options
        );
        if let Some(path) = &self.checkpoint_path {
            if let Some(cp) = checkpoint::load(path) {
                if cp.matches(p.k, p.p0, p.pmin, p.pmax, p.dmax, p.zmax) {
                    if cp.complete() {
                        tracing::info!("checkpoint already covers [pmin,pmax], nothing to do");
                        self.resume_complete.store(true, Ordering::Relaxed);
                    } else {
                        tracing::info!(next_pmin = cp.next_pmin, "resuming from checkpoint");
                    }
                    self.pcnt.store(cp.pcnt, Ordering::Relaxed);
                    self.ccnt.store(cp.ccnt, Ordering::Relaxed);
                    self.dcnt.store(cp.dcnt, Ordering::Relaxed);
                    self.rcnt.store(cp.rcnt, Ordering::Relaxed);
                    self.max_p.store(cp.next_pmin.saturating_sub(1), Ordering::Relaxed);
                    return cp.next_pmin.max(p.pmin);
                }
                tracing::warn!("checkpoint does not match this search, starting fresh");
            }
        }
        p.pmin
    }

    fn report_p(&self, p: u64) -> bool {
        self.pcnt.fetch_add(1, Ordering::Relaxed);
        self.max_p.fetch_max(p, Ordering::Relaxed);
        self.stage_allows(1)
    }

    fn report_c(&self, n: u32) -> bool {
        self.ccnt.fetch_add(n as u64, Ordering::Relaxed);
        self.stage_allows(2)
    }

    fn report_d(&self, _d: u64, n: u64) -> bool {
        self.dcnt.fetch_add(1, Ordering::Relaxed);
        self.rcnt.fetch_add(n, Ordering::Relaxed);
        self.stage_allows(3)
    }

    fn report_phase(&self, phase: Phase) -> bool {
        if self.resume_complete.load(Ordering::Relaxed) {
            return false;
        }
        self.phase_done.fetch_max(phase.id(), Ordering::Relaxed);
        if let Some(path) = &self.checkpoint_path {
            if let Err(err) = checkpoint::save(path, &self.snapshot(phase.id())) {
                tracing::warn!(%err, "checkpoint save failed");
            }
        }
        tracing::info!(phase = ?phase, "phase boundary");
        true
    }

    fn report_job_start(&self, job: usize) {
        tracing::debug!(job, "worker start");
    }

    fn report_job_end(&self, job: usize) {
        tracing::debug!(job, "worker end");
    }

    fn report_solution(&self, x: &str, y: &str, z: &str) {
        println!("SOLUTION:k={}:x={}:y={}:z={}", self.params.k, x, y, z);
        tracing::info!(k = self.params.k, x, y, z, "solution found");
    }

    fn report_end(&self, ok: bool) {
        if ok && !self.resume_complete.load(Ordering::Relaxed) {
            // Mark the whole range covered so a rerun short-circuits.
            self.max_p.fetch_max(self.params.pmax, Ordering::Relaxed);
            if let Some(path) = &self.checkpoint_path {
                if let Err(err) = checkpoint::save(path, &self.snapshot(Phase::BigPrime.id())) {
                    tracing::warn!(%err, "final checkpoint save failed");
                }
            }
        }
        let c = self.counts();
        println!(
            "{}:{}:k={}:pcnt={}:ccnt={}:dcnt={}:rcnt={}",
            if ok { "END" } else { "FAILED" },
            chrono::Utc::now().format("%Y-%m-%d %H:%M:%S"),
            self.params.k,
            c.pcnt,
            c.ccnt,
            c.dcnt,
            c.rcnt
        );
    }

    fn report_comparisons(&self, pcnt: u64, ccnt: u64, dcnt: u64, rcnt: u64) {
        let c = self.counts();
        for (name, want, got) in [
            ("pcnt", pcnt, c.pcnt),
            ("ccnt", ccnt, c.ccnt),
            ("dcnt", dcnt, c.dcnt),
            ("rcnt", rcnt, c.rcnt),
        ] {
            if want != 0 && want != got {
                println!("MISMATCH:{}:expected={}:observed={}", name, want, got);
            }
        }
    }

    fn profile_checkpoint(&self) {
        if !self.profiling {
            return;
        }
        let n = self.profile_samples.fetch_add(1, Ordering::Relaxed);
        if n >= PROFILE_SAMPLE_TARGET {
            self.stop.store(true, Ordering::Relaxed);
        }
    }

    fn profiling(&self) -> bool {
        self.profiling
    }

    fn reporting(&self) -> bool {
        !self.profiling
    }
}
