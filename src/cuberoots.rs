//! # Cuberoots — Root Extraction and Precomputed Caches
//!
//! Cube roots of k modulo primes, prime powers, and smooth cofactors.
//!
//! ## Root extraction
//!
//! - p ≡ 2 (mod 3): cubing permutes the units, so the unique root is
//!   k^((2p−1)/3) mod p.
//! - p ≡ 1 (mod 3): k is a cubic residue iff k^((p−1)/3) ≡ 1. Roots come
//!   from the Adleman–Manders–Miller method: split p − 1 = 3^s·t, take a
//!   first approximation k^(3⁻¹ mod t), then correct inside the 3-Sylow
//!   subgroup by a Pohlig–Hellman discrete log base a non-residue power.
//!   The two conjugate roots follow by the primitive cube root of unity.
//! - Prime powers by Hensel lifting: 3z² is invertible mod p for every
//!   cached prime (p ∤ 3k), so each root lifts uniquely.
//!
//! ## Caches
//!
//! - `cptab`: the admissible primes up to cpmax ≥ √dmax (p ∤ k with roots),
//!   each with its roots modulo the largest power below the cache cap.
//! - `cdtab`/`cdroots`: every admissible smooth cofactor ≤ cdmax, sorted
//!   ascending, tagged with its largest prime so the enumerator can walk
//!   the table downward skipping entries outside its prime bound.
//! - `sdtab`/`sdroots`/`sdinvs`: the cofactors ≤ sdmax additionally carry a
//!   full inverse table (one u32 per residue), letting the hot paths skip
//!   even the batched inversion.
//!
//! Table construction is parallelized with rayon across cached primes.
//!
//! ## References
//!
//! - Adleman, Manders, Miller, "On taking roots in finite fields",
//!   FOCS 1977.
//! - Cohen, "A Course in Computational Algebraic Number Theory", §1.5
//!   (Hensel lifting).

use rayon::prelude::*;

use crate::modular::{inv_mod, isqrt, mont_pow, Barrett32, Montgomery64};

/// Largest cached cofactor (before the √dmax clamp).
const CDMAX_CAP: u64 = 1 << 18;

/// Largest cofactor that also gets a per-residue inverse table.
const SDMAX_CAP: u64 = 1 << 10;

/// Cached prime-power modulus cap.
const CQ_CAP: u64 = 1 << 40;

/// Cube roots of k mod p for prime p with p ∤ 3k. At most three.
pub fn cuberoots_modp(k: u32, p: u64) -> Vec<u64> {
    debug_assert!(p >= 2 && k as u64 % p != 0);
    if p == 2 {
        return vec![1];
    }
    if p % 3 == 2 {
        let e = (2 * p - 1) / 3;
        return vec![crate::modular::pow_mod(k as u64, e, p)];
    }

    // p ≡ 1 (mod 3): AMM with a Pohlig–Hellman correction.
    let mg = Montgomery64::new(p);
    let a = mg.to_mont(k as u64 % p);
    let one = mg.one();

    let cubic_residue_exp = (p - 1) / 3;
    if mont_pow(&mg, a, cubic_residue_exp) != one {
        return vec![];
    }

    let mut t = p - 1;
    let mut s = 0u32;
    while t % 3 == 0 {
        t /= 3;
        s += 1;
    }

    // Non-residue c gives the Sylow generator b = c^t and ω = b^(3^(s−1)).
    let mut c = 2u64;
    let b = loop {
        let cm = mg.to_mont(c % p);
        if c % p != 0 && mont_pow(&mg, cm, cubic_residue_exp) != one {
            break mont_pow(&mg, cm, t);
        }
        c += 1;
    };
    let omega = mont_pow(&mg, b, pow3(s - 1));

    // First approximation: x³ = a · E with E in the Sylow subgroup.
    let m3 = if t == 1 { 0 } else { inv_mod(3, t).unwrap_or(0) };
    let x0 = mont_pow(&mg, a, m3);
    let a_inv = mont_pow(&mg, a, p - 2);
    let e_elt = mg.mul(mg.mul(mg.mul(x0, x0), x0), a_inv);

    // Discrete log of E base b in the cyclic group of order 3^s.
    let mut acc = 0u64;
    let b_inv = mont_pow(&mg, b, p - 2);
    for i in 0..s {
        let v = mg.mul(e_elt, mont_pow(&mg, b_inv, acc));
        let probe = mont_pow(&mg, v, pow3(s - 1 - i));
        let digit = if probe == one {
            0
        } else if probe == omega {
            1
        } else {
            debug_assert_eq!(probe, mont_pow(&mg, omega, 2));
            2
        };
        acc += digit * pow3(i);
    }
    debug_assert_eq!(acc % 3, 0, "E must be a cube in the Sylow subgroup");

    let x = mg.mul(x0, mont_pow(&mg, b, pow3(s) - acc / 3));
    let r0 = mg.from_mont(x);
    let r1 = mg.from_mont(mg.mul(x, omega));
    let r2 = mg.from_mont(mg.mul(x, mg.mul(omega, omega)));
    let mut roots = vec![r0, r1, r2];
    roots.sort_unstable();
    roots
}

fn pow3(e: u32) -> u64 {
    3u64.pow(e)
}

/// True iff k has a cube root mod prime p (p ∤ k).
pub fn has_cuberoots_modp(k: u32, p: u64) -> bool {
    if p < 3 || p % 3 == 2 {
        return true;
    }
    crate::modular::pow_mod(k as u64, (p - 1) / 3, p) == 1
}

fn cube_mod_u128(z: u64, m: u64) -> u64 {
    let z2 = (z as u128 * z as u128 % m as u128) as u64;
    (z2 as u128 * z as u128 % m as u128) as u64
}

/// Cube roots of k mod p^e by Hensel lifting from the roots mod p.
/// Requires p ∤ 3k and p^e < 2^63.
pub fn cuberoots_modq(k: u32, p: u64, e: u32) -> Vec<u64> {
    let base = cuberoots_modp(k, p);
    base.into_iter()
        .map(|mut z| {
            let mut m = p;
            for _ in 1..e {
                let m_next = m * p;
                let z3 = cube_mod_u128(z, m_next);
                let diff = ((k as u64 % m_next) + m_next - z3) % m_next;
                debug_assert_eq!(diff % m, 0);
                let t0 = diff / m;
                let deriv = (3 * (z as u128 * z as u128 % p as u128) % p as u128) as u64;
                let t = t0 % p * inv_mod(deriv, p).unwrap_or(0) % p;
                z += m * t;
                m = m_next;
            }
            z
        })
        .collect()
}

/// Debug helper: every root is reduced and cubes to k.
pub fn verify_roots(roots: &[u64], d: u64, k: u32) -> bool {
    roots
        .iter()
        .all(|&z| z < d && cube_mod_u128(z, d) == k as u64 % d)
}

/// One cached prime with its roots modulo the top cached power.
pub struct CachedPrime {
    pub p: u64,
    /// Highest cached exponent; q_top = p^emax ≤ cq cap.
    pub emax: u32,
    pub q_top: u64,
    /// Roots mod q_top (1 or 3 of them).
    pub roots: Vec<u64>,
}

/// One cached smooth cofactor.
#[derive(Clone, Copy)]
pub struct CdEntry {
    pub d: u64,
    /// Largest prime factor, for the enumerator's descending walk.
    pub p: u64,
    pub n: u32,
    /// Offset into `cdroots`.
    pub r: usize,
    /// Index into `sdtab` when d ≤ sdmax, else usize::MAX.
    pub sdpi: usize,
}

/// A small cofactor with a full inverse table.
pub struct SdEntry {
    pub d: u64,
    pub dinv: Barrett32,
    pub n: u32,
    /// Offset into `sdroots`.
    pub r: usize,
    /// Offset into `sdinvs`; the table has d entries.
    pub i: usize,
}

/// All precomputed root tables plus the regime thresholds derived from them.
pub struct CubeTables {
    pub cptab: Vec<CachedPrime>,
    pub cdtab: Vec<CdEntry>,
    pub cdroots: Vec<u64>,
    pub sdtab: Vec<SdEntry>,
    pub sdroots: Vec<u64>,
    pub sdinvs: Vec<u32>,
    /// Cached-prime regime boundary, ≥ ⌊√dmax⌋.
    pub cpmax: u64,
    pub cdmax: u64,
    pub sdmax: u64,
    /// d ≥ cdmin: every admissible cofactor of d is in cdtab.
    pub cdmin: u64,
    /// d ≥ sdmin: every admissible cofactor of d is in sdtab.
    pub sdmin: u64,
}

impl CubeTables {
    pub fn build(k: u32, dmax: u64) -> Self {
        let cpmax = isqrt(dmax).max(2);
        let cq_cap = CQ_CAP.min(dmax);

        let cptab: Vec<CachedPrime> = crate::sieve::primes_up_to(cpmax)
            .into_par_iter()
            .filter(|&p| k as u64 % p != 0 && has_cuberoots_modp(k, p))
            .map(|p| {
                let mut emax = 1u32;
                let mut q_top = p;
                while q_top <= cq_cap / p {
                    q_top *= p;
                    emax += 1;
                }
                CachedPrime {
                    p,
                    emax,
                    q_top,
                    roots: cuberoots_modq(k, p, emax),
                }
            })
            .collect();

        let cdmax = CDMAX_CAP.min(isqrt(dmax)).max(1);
        let sdmax = SDMAX_CAP.min(cdmax);

        // Every admissible smooth cofactor ≤ cdmax by descending-prime DFS;
        // roots CRT-combined as the product grows.
        let mut raw: Vec<(u64, u64, Vec<u64>)> = Vec::new();
        let mut stack_roots: Vec<u64> = vec![0];
        collect_cofactors(&cptab, cptab.len(), 1, 0, &mut stack_roots, cdmax, &mut raw);
        raw.sort_unstable_by_key(|(d, _, _)| *d);

        let mut cdtab = vec![CdEntry {
            d: 0,
            p: 0,
            n: 0,
            r: 0,
            sdpi: usize::MAX,
        }];
        let mut cdroots = Vec::new();
        let mut sdtab: Vec<SdEntry> = Vec::new();
        let mut sdroots = Vec::new();
        let mut sdinvs: Vec<u32> = Vec::new();
        for (d, p, roots) in raw {
            let sdpi = if d <= sdmax {
                let i = sdinvs.len();
                sdinvs.extend((0..d).map(|r| inv_mod(r, d).unwrap_or(0) as u32));
                sdtab.push(SdEntry {
                    d,
                    dinv: Barrett32::new(d as u32),
                    n: roots.len() as u32,
                    r: sdroots.len(),
                    i,
                });
                sdroots.extend_from_slice(&roots);
                sdtab.len() - 1
            } else {
                usize::MAX
            };
            cdtab.push(CdEntry {
                d,
                p,
                n: roots.len() as u32,
                r: cdroots.len(),
                sdpi,
            });
            cdroots.extend_from_slice(&roots);
        }

        let cdmin = dmax / cdmax + 1;
        let sdmin = dmax / sdmax + 1;

        CubeTables {
            cptab,
            cdtab,
            cdroots,
            sdtab,
            sdroots,
            sdinvs,
            cpmax,
            cdmax,
            sdmax,
            cdmin,
            sdmin,
        }
    }

    /// First cptab index with prime ≥ p, or cptab.len().
    pub fn prime_index_at_least(&self, p: u64) -> usize {
        self.cptab.partition_point(|e| e.p < p)
    }

    /// Largest cptab index whose prime q satisfies q < plimit and d·q ≤ dmax.
    pub fn pimax(&self, plimit: u64, d: u64, dmax: u64) -> Option<usize> {
        let bound = plimit.min(dmax / d + 1);
        let idx = self.cptab.partition_point(|e| e.p < bound);
        if idx == 0 {
            None
        } else {
            Some(idx - 1)
        }
    }

    /// Roots of k mod cptab[pi].p^e, from cache when the exponent is cached,
    /// else recomputed by lifting.
    pub fn roots_mod_power(&self, k: u32, pi: usize, e: u32) -> Vec<u64> {
        let entry = &self.cptab[pi];
        if e <= entry.emax {
            let mut q = entry.p;
            for _ in 1..e {
                q *= entry.p;
            }
            if e == entry.emax {
                return entry.roots.clone();
            }
            return entry.roots.iter().map(|&z| z % q).collect();
        }
        cuberoots_modq(k, entry.p, e)
    }

    pub fn cached_e(&self, pi: usize) -> u32 {
        self.cptab[pi].emax
    }

    /// Entry index for the cofactor walk: the largest entry with d ≤ bound
    /// and largest prime < plimit, or None. Walking proceeds downward with
    /// `next_cd_entry`, ending at the index-0 sentinel.
    pub fn cd_entry(&self, plimit: u64, bound: u64) -> Option<usize> {
        let mut idx = self.cdtab.partition_point(|e| e.d <= bound) - 1;
        while idx > 0 && self.cdtab[idx].p >= plimit {
            idx -= 1;
        }
        if idx == 0 {
            None
        } else {
            Some(idx)
        }
    }

    /// Previous admissible entry in the downward walk (largest prime < plimit).
    /// Index 0 is the sentinel and means the walk is over.
    pub fn next_cd_entry(&self, mut idx: usize, plimit: u64) -> usize {
        debug_assert!(idx > 0);
        idx -= 1;
        while idx > 0 && self.cdtab[idx].p >= plimit {
            idx -= 1;
        }
        idx
    }

    pub fn cd_roots(&self, e: &CdEntry) -> &[u64] {
        &self.cdroots[e.r..e.r + e.n as usize]
    }

    pub fn sd_roots(&self, e: &SdEntry) -> &[u64] {
        &self.sdroots[e.r..e.r + e.n as usize]
    }

    /// Inverse of x mod sd entry's modulus from the per-residue table.
    #[inline]
    pub fn sd_inv(&self, e: &SdEntry, x: u64) -> u32 {
        self.sdinvs[e.i + e.dinv.reduce(x) as usize]
    }
}

/// DFS over cached primes in descending index order, extending the current
/// product c (whose roots live in `roots`) by powers of strictly smaller
/// primes. Records every product in (1, cdmax].
fn collect_cofactors(
    cptab: &[CachedPrime],
    idx_limit: usize,
    c: u64,
    lp: u64,
    roots: &mut Vec<u64>,
    cdmax: u64,
    out: &mut Vec<(u64, u64, Vec<u64>)>,
) {
    for pi in (0..idx_limit).rev() {
        let q = cptab[pi].p;
        if c > cdmax / q {
            continue;
        }
        let mut qe = q;
        loop {
            let d = c * qe;
            // The cofactor cap never exceeds the power-cache cap, so the
            // cached top-power roots always cover qe.
            let qroots: Vec<u64> = cptab[pi].roots.iter().map(|&z| z % qe).collect();
            let mut combined = Vec::with_capacity(roots.len().max(1) * qroots.len());
            if c == 1 {
                combined.extend_from_slice(&qroots);
            } else {
                let cinv_q = inv_mod(c % qe, qe).unwrap_or(0);
                for &zc in roots.iter() {
                    for &zq in &qroots {
                        // CRT: result ≡ zc (mod c), ≡ zq (mod qe).
                        let diff = (zq + qe - zc % qe) % qe;
                        let t = (diff as u128 * cinv_q as u128 % qe as u128) as u64;
                        combined.push(zc + c * t);
                    }
                }
            }
            out.push((d, lp.max(q), combined.clone()));
            let saved = std::mem::replace(roots, combined);
            collect_cofactors(cptab, pi, d, lp.max(q), roots, cdmax, out);
            *roots = saved;
            if c * qe > cdmax / q {
                break;
            }
            qe *= q;
        }
    }
}
