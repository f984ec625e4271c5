//! # Cubehunt — Core Library
//!
//! Parallel search for integer solutions of x³ + y³ + z³ = k, for small
//! positive k ≡ 3 or 6 (mod 9), in the Heath-Brown–Lehmer–Roth
//! parametrization: every admissible modulus d ≤ dmax is enumerated together
//! with the cube roots of k mod d, and the arithmetic progressions of
//! candidate z with |z| ≤ zmax they induce are checked for exact solutions.
//!
//! ## Module Organization
//!
//! **Engine modules** (the search itself):
//! - [`enumerate`] — the d-enumerator: recursive/iterative extension of d by
//!   admissible prime powers, CRT-lifting cube roots as it goes
//! - [`dispatch`] — the per-d dispatcher: combines d with divisors of k and
//!   picks one of three progression-check strategies
//! - [`driver`] — the six-phase per-worker loop, the pinned-prime variant,
//!   and the supervisor
//! - [`zcheck`] — progression checking and exact big-integer candidate tests
//!
//! **Infrastructure modules**:
//! - [`modular`] — Montgomery/Barrett arithmetic, batched inversion, CRT
//! - [`sieve`] — wheel-30 and segmented prime generation
//! - [`pipe`] — the single-producer multi-consumer prime stream
//! - [`cuberoots`] — cube-root extraction and the precomputed caches
//! - [`kdata`] — per-k admissibility tables and sign classes
//! - [`params`], [`report`], [`checkpoint`] — frozen bounds, reporting,
//!   resumable state
//!
//! ## Design
//!
//! All shared state is immutable after precompute: workers borrow
//! [`params::SearchParams`], [`kdata::KData`] and [`cuberoots::CubeTables`]
//! through an [`Engine`] and own their mutable scratch. The only blocking
//! point is the prime pipe.

pub mod checkpoint;
pub mod cuberoots;
pub mod dispatch;
pub mod driver;
pub mod enumerate;
pub mod kdata;
pub mod modular;
pub mod params;
pub mod pipe;
pub mod report;
pub mod sieve;
pub mod zcheck;

use cuberoots::CubeTables;
use kdata::KData;
use params::SearchParams;
use report::Reporter;

/// Read-only view of everything a worker needs: frozen bounds, k tables,
/// root caches, the reporter, and the derived phase thresholds.
pub struct Engine<'a> {
    pub params: &'a SearchParams,
    pub kdata: &'a KData,
    pub tables: &'a CubeTables,
    pub reporter: &'a dyn Reporter,
    /// d ≥ pdmin with largest prime p ≥ pdmin must be prime (no cofactor,
    /// not even a divisor of k, fits under dmax).
    pub pdmin: u64,
    /// p ≥ bpmin: d = p and the progressions are short enough that lifting
    /// never pays.
    pub bpmin: u64,
}

impl<'a> Engine<'a> {
    pub fn new(
        params: &'a SearchParams,
        kdata: &'a KData,
        tables: &'a CubeTables,
        reporter: &'a dyn Reporter,
    ) -> Self {
        let smallest_cofactor = tables
            .cptab
            .first()
            .map(|e| e.p)
            .unwrap_or(u64::MAX)
            .min(kdata.kdmin);
        let mut pdmin = 1 + params.dmax / smallest_cofactor.max(2);
        if pdmin <= params.k as u64 {
            pdmin = params.k as u64 + 1;
        }
        let mut bpmin = params.progression_len((kdata.km[1] as u64 * params::ZSHORT) as u128);
        if bpmin <= 7 {
            bpmin = 11;
        }
        Engine {
            params,
            kdata,
            tables,
            reporter,
            pdmin,
            bpmin,
        }
    }
}
