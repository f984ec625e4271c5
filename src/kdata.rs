//! # Kdata — Per-k Admissibility Tables
//!
//! Everything about k that can be frozen before the search starts:
//!
//! - **Unitary divisors of k** (`kdtab`): the d-part dividing k is always a
//!   unitary divisor d' (for each prime q | k, v_q(d') is 0 or v_q(k)). Each
//!   entry carries the cube-root count of k mod d' and a class index.
//! - **Residue classes**: admissible z residues modulo a small class modulus
//!   m, keyed by d mod m. m is 162 for k = 3 (the mod-81 constraint is
//!   classical for that k, doubled for parity), 18 for even k, 9 otherwise.
//! - **Coprime-path tables** (`km`, `kmztab`, `kmitab`, `kminv`): the four
//!   runtime moduli b used when gcd(d, k) = 1, indexed by
//!   mi = (k odd ∧ d odd) + 2·(one-z-mod-7). Layout of the Barrett contexts
//!   is fixed as [m, 2m, 7m, 14m]; callers index it as 2·(b7>1) + b2 − 1.
//! - **Sign classes** (`sgnz_index`): two bits per d mod 9 saying whether the
//!   positive-z and negative-z progressions can carry solutions.
//! - **One-z-mod-7** (`one_z_mod7`): for k ≡ ±2 (mod 7), whether d forces
//!   z ≡ 0 (mod 7), which multiplies the progression modulus by 7.
//!
//! ## Construction
//!
//! All residue tables are built by exhaustive witness search at the class
//! modulus M: a z residue zr is admissible for d residue dm iff there exist
//! x, y mod M with x + y ≡ ±dm and x³ + y³ + zr³ ≡ k (mod M). The two
//! orientations of x + y correspond to the two signs of z (for z < 0 the
//! cofactor (k − z³)/(x² − xy + y²) is positive, so x + y = +d; for large
//! positive z it is −d). A residue is excluded only when no witnesses exist,
//! so no integer solution is ever lost to these filters.

use crate::modular::{inv_mod, Barrett32};

/// One admissible divisor of k.
#[derive(Clone, Debug)]
pub struct KDivisor {
    pub d: u64,
    /// Number of cube roots of k mod d.
    pub n: u32,
    /// Index into the class table.
    pub fi: usize,
}

/// Residue-class record used on the k-divisor path.
pub struct ResidueClass {
    pub m: u32,
    pub mb: Barrett32,
    /// Admissible z residues mod m, keyed by d mod m (both signs merged).
    pub ztab: Vec<Vec<u16>>,
    /// Inverse of each unit residue mod m (0 for non-units).
    pub itab: Vec<u32>,
    /// Barrett contexts for m, 2m, 7m, 14m. The layout is load-bearing:
    /// callers select 2·(b7>1) + b2 − 1.
    pub minv: [Barrett32; 4],
}

/// Admissibility data for one k, immutable after construction.
pub struct KData {
    pub k: u32,
    pub kdtab: Vec<KDivisor>,
    /// kdmax[ki] = dmax / kdtab[ki].d.
    pub kdmax: Vec<u64>,
    pub classes: Vec<ResidueClass>,
    /// Coprime-path moduli by mi = (k odd ∧ d odd) + 2·(one-z-mod-7).
    pub km: [u32; 4],
    pub kminv: [Barrett32; 4],
    /// Admissible z residues mod km[mi], keyed by d mod km[mi].
    pub kmztab: [Vec<Vec<u16>>; 4],
    /// Inverses mod km[mi] (0 for non-units).
    pub kmitab: [Vec<u32>; 4],
    /// Two sign bits per d mod 9.
    sgn: [u8; 9],
    /// Per sign and d mod 7: (solutions exist, all force z ≡ 0 mod 7).
    /// Present only when k² ≡ 4 (mod 7).
    onez7: Option<[[(bool, bool); 7]; 2]>,
    /// Auxiliary primes for progression lifting.
    pub aux: Vec<AuxPrime>,
    /// Smallest unitary divisor of k above 1 (the smallest k-part a modulus
    /// can gain).
    pub kdmin: u64,
}

/// Admissible signed-z residues modulo a small auxiliary prime, one bitmask
/// per (sign, d mod r). Used to lift long progressions before checking.
pub struct AuxPrime {
    pub r: u32,
    /// masks[sign][d mod r], bit zr set iff z ≡ zr (mod r) can occur.
    /// Sign 0 is the positive-z orientation (x + y ≡ −d), sign 1 negative.
    pub masks: [Vec<u64>; 2],
}

/// Progression tables for one (k-divisor, d) pair after the runtime lifts:
/// the candidate z satisfy z ≡ za (mod a) and z ≡ zb (mod b) for zb in `zb`.
pub struct ProgressionBase {
    pub b: u32,
    pub binv: Barrett32,
    pub zb: Vec<u32>,
    /// a⁻¹ mod b.
    pub ainvb: u32,
}

/// Positive-z progression admissible.
pub const SGN_POS: u32 = 1;
/// Negative-z progression admissible.
pub const SGN_NEG: u32 = 2;

fn cube_mod(x: u64, m: u64) -> u64 {
    x * x % m * x % m
}

/// For each residue t mod m, the set of values x³ + y³ mod m over pairs with
/// x + y ≡ t. Returned as bitsets (m ≤ 1134 keeps them tiny).
fn cube_sum_sets(m: u32) -> Vec<Vec<bool>> {
    let m = m as u64;
    let mut sets = vec![vec![false; m as usize]; m as usize];
    for x in 0..m {
        let x3 = cube_mod(x, m);
        for y in 0..m {
            let t = (x + y) % m;
            let s = (x3 + cube_mod(y, m)) % m;
            sets[t as usize][s as usize] = true;
        }
    }
    sets
}

/// Admissible z residues mod m keyed by d mod m, merged over both signs.
fn witness_ztab(k: u32, m: u32) -> Vec<Vec<u16>> {
    let sets = cube_sum_sets(m);
    let mu = m as u64;
    (0..mu)
        .map(|dm| {
            let neg_dm = (mu - dm) % mu;
            (0..mu)
                .filter(|&zr| {
                    let need = ((k as u64 % mu) + mu - cube_mod(zr, mu)) % mu;
                    sets[dm as usize][need as usize] || sets[neg_dm as usize][need as usize]
                })
                .map(|zr| zr as u16)
                .collect()
        })
        .collect()
}

fn inverse_table(m: u32) -> Vec<u32> {
    (0..m as u64)
        .map(|r| inv_mod(r, m as u64).unwrap_or(0) as u32)
        .collect()
}

fn build_class(k: u32, m: u32) -> ResidueClass {
    ResidueClass {
        m,
        mb: Barrett32::new(m),
        ztab: witness_ztab(k, m),
        itab: inverse_table(m),
        minv: [
            Barrett32::new(m),
            Barrett32::new(2 * m),
            Barrett32::new(7 * m),
            Barrett32::new(14 * m),
        ],
    }
}

/// Unitary divisors of k, ascending, 1 first.
fn unitary_divisors(k: u32) -> Vec<u64> {
    let mut factors = Vec::new();
    let mut n = k as u64;
    let mut q = 2u64;
    while q * q <= n {
        if n % q == 0 {
            let mut pe = 1u64;
            while n % q == 0 {
                n /= q;
                pe *= q;
            }
            factors.push(pe);
        }
        q += 1;
    }
    if n > 1 {
        factors.push(n);
    }
    let mut divs = vec![1u64];
    for pe in factors {
        let len = divs.len();
        for i in 0..len {
            divs.push(divs[i] * pe);
        }
    }
    divs.sort_unstable();
    divs
}

fn count_cube_roots_small(k: u32, d: u64) -> u32 {
    (0..d).filter(|&z| cube_mod(z, d) == k as u64 % d).count() as u32
}

impl KData {
    pub fn new(k: u32, dmax: u64) -> Self {
        debug_assert!(crate::params::good_k(k));

        let m_base: u32 = if k == 3 {
            81
        } else if k % 2 == 0 {
            18
        } else {
            9
        };
        // The class modulus folds in the parity lift for odd k so that the
        // k-divisor path sees b ∈ {9,18,63,126} (or 162 for k = 3) after its
        // runtime lifts; the coprime path indexes the four variants directly.
        let km: [u32; 4] = if k % 2 == 0 {
            [m_base, m_base, 7 * m_base, 7 * m_base]
        } else {
            [m_base, 2 * m_base, 7 * m_base, 14 * m_base]
        };

        let classes = vec![build_class(k, m_base)];

        let kdtab: Vec<KDivisor> = unitary_divisors(k)
            .into_iter()
            .map(|d| KDivisor {
                d,
                n: count_cube_roots_small(k, d),
                fi: 0,
            })
            .collect();
        let kdmax: Vec<u64> = kdtab.iter().map(|e| dmax / e.d).collect();

        let kminv = [
            Barrett32::new(km[0]),
            Barrett32::new(km[1]),
            Barrett32::new(km[2]),
            Barrett32::new(km[3]),
        ];
        let kmztab = [
            witness_ztab(k, km[0]),
            witness_ztab(k, km[1]),
            witness_ztab(k, km[2]),
            witness_ztab(k, km[3]),
        ];
        let kmitab = [
            inverse_table(km[0]),
            inverse_table(km[1]),
            inverse_table(km[2]),
            inverse_table(km[3]),
        ];

        // Sign bits from mod-9 solvability per orientation of x + y.
        let sets9 = cube_sum_sets(9);
        let mut sgn = [0u8; 9];
        for dm in 0..9u64 {
            let mut bits = 0u8;
            for zr in 0..9u64 {
                let need = ((k as u64 % 9) + 9 - cube_mod(zr, 9)) % 9;
                if sets9[((9 - dm) % 9) as usize][need as usize] {
                    bits |= SGN_POS as u8;
                }
                if sets9[dm as usize][need as usize] {
                    bits |= SGN_NEG as u8;
                }
            }
            sgn[dm as usize] = bits;
        }

        let onez7 = if (k as u64 * k as u64) % 7 == 4 {
            let mut tab = [[(false, false); 7]; 2];
            for (si, tab_s) in tab.iter_mut().enumerate() {
                // si 0: z > 0 so x + y ≡ −d; si 1: z < 0 so x + y ≡ +d.
                for dm in 0..7u64 {
                    let target = if si == 0 { (7 - dm) % 7 } else { dm };
                    let mut exists = false;
                    let mut forced = true;
                    for x in 0..7u64 {
                        for y in 0..7u64 {
                            if (x + y) % 7 != target {
                                continue;
                            }
                            for z in 0..7u64 {
                                let s = (cube_mod(x, 7) + cube_mod(y, 7) + cube_mod(z, 7)) % 7;
                                if s == k as u64 % 7 {
                                    exists = true;
                                    if z != 0 {
                                        forced = false;
                                    }
                                }
                            }
                        }
                    }
                    tab_s[dm as usize] = (exists, forced);
                }
            }
            Some(tab)
        } else {
            None
        };

        // Lifting only pays on primes ≡ 1 (mod 3), where the cubic character
        // kills about two thirds of the residues; the bitmask bound keeps
        // r < 64.
        let aux = [7u32, 13, 19, 31, 37, 43, 61]
            .iter()
            .filter(|&&r| k % r != 0)
            .map(|&r| {
                let sets = cube_sum_sets(r);
                let ru = r as u64;
                let mut masks = [vec![0u64; r as usize], vec![0u64; r as usize]];
                for (si, mask_s) in masks.iter_mut().enumerate() {
                    for dm in 0..ru {
                        let target = if si == 0 { (ru - dm) % ru } else { dm };
                        let mut bits = 0u64;
                        for zr in 0..ru {
                            let need = ((k as u64 % ru) + ru - cube_mod(zr, ru)) % ru;
                            if sets[target as usize][need as usize] {
                                bits |= 1 << zr;
                            }
                        }
                        mask_s[dm as usize] = bits;
                    }
                }
                AuxPrime { r, masks }
            })
            .collect();

        let kdmin = kdtab.get(1).map(|e| e.d).unwrap_or(u64::MAX);

        KData {
            k,
            kdtab,
            kdmax,
            classes,
            km,
            kminv,
            kmztab,
            kmitab,
            sgn,
            onez7,
            aux,
            kdmin,
        }
    }

    /// The progression modulus b alone, without materializing the z-residue
    /// tables. The dispatcher needs b to size progressions before deciding
    /// whether the tables are worth building at all.
    pub fn progression_modulus(&self, ki: usize, d: u64, si: u32) -> u32 {
        let one7 = self.one_z_mod7(d, si);
        let b7: u32 = if one7 { 7 } else { 1 };
        if ki == 0 {
            let mi = ((self.k & 1) & d as u32 & 1) as usize + if one7 { 2 } else { 0 };
            return self.km[mi];
        }
        let m = self.classes[self.kdtab[ki].fi].m;
        let b2: u32 = 1 + (m & 1 & d as u32);
        m * b2 * b7
    }

    /// Progression tables for the coprime path (ki = 0, a = d) or a k-divisor
    /// path (ki ≥ 1, d = a·kdtab[ki].d), with the parity and mod-7 lifts
    /// applied. Returns None when no z residue is admissible for this d.
    pub fn progression_base(&self, ki: usize, a: u64, d: u64, si: u32) -> Option<ProgressionBase> {
        let one7 = self.one_z_mod7(d, si);
        if ki == 0 {
            debug_assert_eq!(a, d);
            let mi = ((self.k & 1) & d as u32 & 1) as usize + if one7 { 2 } else { 0 };
            let b = self.km[mi];
            let binv = self.kminv[mi];
            let db = binv.reduce(d) as usize;
            let zb: Vec<u32> = self.kmztab[mi][db].iter().map(|&z| z as u32).collect();
            if zb.is_empty() {
                return None;
            }
            let ainvb = self.kmitab[mi][db];
            debug_assert_ne!(ainvb, 0);
            return Some(ProgressionBase { b, binv, zb, ainvb });
        }

        let class = &self.classes[self.kdtab[ki].fi];
        let m = class.m;
        let dm = class.mb.reduce(d) as usize;
        let mut zb: Vec<u32> = class.ztab[dm].iter().map(|&z| z as u32).collect();
        if zb.is_empty() {
            return None;
        }
        let b2: u32 = 1 + (m & 1 & d as u32);
        let b7: u32 = if one7 { 7 } else { 1 };
        let b = m * b2 * b7;
        let mut ainvb = class.itab[class.mb.reduce(a) as usize];
        debug_assert_ne!(ainvb, 0);
        if b2 > 1 {
            // Lift to the even z representative mod 2m and keep a⁻¹ odd.
            for z in zb.iter_mut() {
                if *z & 1 == 1 {
                    *z += m;
                }
            }
            if ainvb & 1 == 0 {
                ainvb += m;
            }
        }
        if b7 > 1 {
            let b2m = b2 * m;
            for z in zb.iter_mut() {
                *z = Self::crt7(*z, b2m, 0);
            }
            ainvb = Self::crt7(ainvb, b2m, Self::inv7(a));
        }
        let binv = class.minv[(2 * (b7 > 1) as usize + b2 as usize) - 1];
        debug_assert_eq!(binv.m, b);
        Some(ProgressionBase { b, binv, zb, ainvb })
    }

    /// True iff k ≡ ±2 (mod 7), i.e. the big-prime driver needs the second
    /// (l₇, 7·b) track.
    pub fn two_track_mod7(&self) -> bool {
        self.onez7.is_some()
    }

    /// Two-bit sign class of d: which of the ±z progressions can carry
    /// solutions, from the mod-9 tables.
    #[inline]
    pub fn sgnz_index(&self, d: u64) -> u32 {
        self.sgn[(d % 9) as usize] as u32
    }

    /// True iff every admissible orientation of d forces z ≡ 0 (mod 7).
    /// Always false unless k ≡ ±2 (mod 7).
    pub fn one_z_mod7(&self, d: u64, si: u32) -> bool {
        let Some(tab) = &self.onez7 else {
            return false;
        };
        let dm = (d % 7) as usize;
        let mut any = false;
        if si & SGN_POS != 0 {
            let (exists, forced) = tab[0][dm];
            if exists {
                if !forced {
                    return false;
                }
                any = true;
            }
        }
        if si & SGN_NEG != 0 {
            let (exists, forced) = tab[1][dm];
            if exists {
                if !forced {
                    return false;
                }
                any = true;
            }
        }
        any
    }

    /// CRT lift of residue z mod m to residue t mod 7, result mod 7m.
    /// Requires gcd(m, 7) = 1.
    pub fn crt7(z: u32, m: u32, t: u32) -> u32 {
        let minv7 = inv_mod(m as u64 % 7, 7).unwrap_or(0) as u32;
        let diff = (t + 7 - z % 7) % 7;
        z + m * (diff * minv7 % 7)
    }

    /// Inverse of a mod 7 (a not divisible by 7).
    pub fn inv7(a: u64) -> u32 {
        inv_mod(a % 7, 7).unwrap_or(0) as u32
    }
}
