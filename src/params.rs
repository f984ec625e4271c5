//! # Params — Immutable Search Bounds and Policy Constants
//!
//! `SearchParams` freezes everything the workers need after argument
//! validation: the target k, the modulus bound dmax, the 128-bit z bound and
//! its fudged floating-point image, the prime range, and the worker count.
//! Constructed once by the supervisor and shared by reference into every
//! worker thread; never mutated afterwards.
//!
//! ## Fudged z bound
//!
//! Progression lengths are ⌈zmax / step⌉ for 128-bit zmax and 64-to-128-bit
//! steps. The quotient is first estimated in f64 from an image of zmax that
//! is deliberately nudged up by more than the 53-bit mantissa can lose
//! (zmax + (zmax >> 50) + 1), then corrected against exact 128-bit products.
//! The estimate can only err high, so the correction loop walks downward a
//! bounded number of steps.

/// Largest supported k.
pub const MAXK: u32 = 1000;

/// Queue size for batched modular inversion in the enumerator.
pub const IBATCH: usize = 256;

/// CRT root scratch capacity: 1 + 3 + 3² + … + 3¹⁰. The root count of k mod
/// any admissible d < 2^63 coprime to k is at most 3¹⁰, and the enumerator
/// recursion stacks at most one level per distinct prime.
pub const CUBEROOT_BUFSIZE: usize = 88573;

/// Longest progression still checked term by term.
pub const ZSHORT: u64 = 16;

/// Cap on progression length × parallel root count for the term-by-term
/// path; equals 2⁴·ZSHORT so the break-even shrinks as roots multiply.
pub const ZFEW: u64 = 256;

/// zmax must fit in this many bits.
pub const ZMAXBITS: u32 = 80;

/// Per-worker z scratch buffers hold 2^ZBUFBITS entries.
pub const ZBUFBITS: u32 = 16;

/// Per-worker progression bitmaps hold 2^BMBITS bits.
pub const BMBITS: u32 = 20;

/// Largest |z| with z³ ≤ MAXK (⌊∛1000⌋). Positive z below this bound invert
/// the sign of k − z³ and with it the x + y orientation the progression
/// tables assume, so the kernel skips all |z| ≤ TINY_ZMAX and the supervisor
/// sweeps them directly instead. The two sides partition the candidates, so
/// nothing is tested twice.
pub const TINY_ZMAX: u64 = 10;

/// Compile-time ceiling on dmax.
pub const DMAX: u64 = (1u64 << 63) - 1;

/// zmax / dmax must be at least this (≈ 1/(2^(1/3) − 1)) for full coverage.
pub const ZMIN_RATIO: f64 = 3.847322101863072639;

/// k is searchable iff it is in range and ≡ 3 or 6 (mod 9).
pub fn good_k(k: u32) -> bool {
    (1..=MAXK).contains(&k) && matches!(k % 9, 3 | 6)
}

/// Bounds and knobs fixed for the lifetime of a search.
#[derive(Clone, Debug)]
pub struct SearchParams {
    pub k: u32,
    pub dmax: u64,
    pub zmax: u128,
    /// Fudged f64 image of zmax, always ≥ the true value.
    zmax_f: f64,
    pub pmin: u64,
    pub pmax: u64,
    /// Pinned largest prime factor, or 1 when unpinned.
    pub p0: u64,
    pub workers: usize,
    pub options: u32,
}

impl SearchParams {
    pub fn new(
        k: u32,
        dmax: u64,
        zmax: u128,
        pmin: u64,
        pmax: u64,
        p0: u64,
        workers: usize,
        options: u32,
    ) -> Self {
        let zmax_f = (zmax + (zmax >> 50) + 1) as f64;
        debug_assert!(zmax_f >= zmax as f64);
        SearchParams {
            k,
            dmax,
            zmax,
            zmax_f,
            pmin,
            pmax,
            p0,
            workers,
            options,
        }
    }

    /// ⌈zmax / step⌉: f64 estimate from the fudged bound, corrected exactly.
    /// Returns at least 1; saturates at u64::MAX for quotients too large to
    /// matter (anything that big goes down the lifting path regardless).
    pub fn progression_len(&self, step: u128) -> u64 {
        debug_assert!(step > 0);
        if step > self.zmax {
            return 1;
        }
        let est = self.zmax_f / step as f64;
        if est >= u64::MAX as f64 / 2.0 {
            return u64::MAX;
        }
        let mut l = est.ceil() as u64;
        l = l.max(1);
        while (l as u128 - 1) * step >= self.zmax {
            l -= 1;
        }
        while (l as u128) * step < self.zmax {
            l += 1;
        }
        l
    }

    /// Recompute boundary for a cached progression length: ⌈zmax/(m·(l−1))⌉,
    /// capped at pmax. The big-prime driver keeps using the cached `l` until
    /// p crosses this; near the boundary the cached value may run one high,
    /// which the checker tolerates (every term is bounds-checked against
    /// zmax anyway).
    pub fn len_valid_until(&self, m: u64, l: u64) -> u64 {
        if l <= 1 {
            return self.pmax;
        }
        if (l as u128 - 1) * m as u128 * self.pmax as u128 <= self.zmax {
            return self.pmax;
        }
        let est = self.zmax_f / (m as f64 * (l - 1) as f64);
        if est >= u64::MAX as f64 / 2.0 {
            return self.pmax;
        }
        let mut p = est.ceil() as u64;
        p = p.max(1);
        while (p as u128 - 1) * m as u128 * (l as u128 - 1) >= self.zmax {
            p -= 1;
        }
        while (p as u128) * m as u128 * (l as u128 - 1) < self.zmax {
            p += 1;
        }
        p.min(self.pmax)
    }
}

/// Per-worker scratch, created after spawn and dropped on worker exit.
pub struct Scratch {
    /// CRT-lifted cube root workspace shared down the enumerator recursion.
    pub roots: Vec<u64>,
}

impl Scratch {
    pub fn new() -> Self {
        Scratch {
            roots: vec![0u64; CUBEROOT_BUFSIZE],
        }
    }
}

impl Default for Scratch {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(zmax: u128) -> SearchParams {
        SearchParams::new(33, 10_000, zmax, 2, 100, 1, 1, 0)
    }

    #[test]
    fn good_k_filter() {
        assert!(good_k(3));
        assert!(good_k(6));
        assert!(good_k(33));
        assert!(good_k(42));
        assert!(good_k(975));
        assert!(!good_k(0));
        assert!(!good_k(4));
        assert!(!good_k(9));
        assert!(!good_k(1001));
    }

    #[test]
    fn good_k_mod_nine_exact() {
        for k in 1..=100u32 {
            assert_eq!(good_k(k), matches!(k % 9, 3 | 6), "k={}", k);
        }
    }

    #[test]
    fn progression_len_exact_ceiling() {
        let p = params(1_000_000);
        for step in [1u128, 7, 999_999, 1_000_000, 1_000_001, 3_000_000] {
            let expect = (1_000_000u128).div_ceil(step).max(1) as u64;
            assert_eq!(p.progression_len(step), expect, "step={}", step);
        }
    }

    #[test]
    fn progression_len_huge_zmax() {
        let zmax = (1u128 << ZMAXBITS) - 3;
        let p = params(zmax);
        for step in [1u128 << 40, (1u128 << 62) + 12345, zmax - 1, zmax, zmax + 1] {
            let expect = zmax.div_ceil(step).max(1) as u64;
            assert_eq!(p.progression_len(step), expect, "step={}", step);
        }
    }

    #[test]
    fn len_valid_until_boundary() {
        let zmax = 10_000_000_000u128;
        let mut p = params(zmax);
        p.pmax = 1 << 40;
        let m = 18u64;
        let q = 40_000_000u64;
        let l = p.progression_len(q as u128 * m as u128);
        assert!(l > 1);
        let until = p.len_valid_until(m, l);
        // Exact last p where the length is still l.
        let exact = ((zmax - 1) / (m as u128 * (l as u128 - 1))) as u64;
        assert_eq!(p.progression_len(exact as u128 * m as u128), l);
        assert!(p.progression_len((exact + 1) as u128 * m as u128) < l);
        // The cached boundary is the ceiling form: exact or one past it.
        assert!(until == exact || until == exact + 1, "until={} exact={}", until, exact);
    }
}
