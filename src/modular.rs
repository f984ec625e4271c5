//! # Modular — Fixed-Modulus Arithmetic Primitives
//!
//! Low-level modular arithmetic shared by every stage of the search:
//!
//! 1. **Montgomery multiplication** (`Montgomery64`) — replaces u128 division
//!    (35–90 cycles) with multiply+shift (4–6 cycles) for repeated arithmetic
//!    with a fixed odd modulus. Works for any odd modulus, prime or not.
//! 2. **Batched modular inversion** (`batch_invert`) — inverts a whole slice
//!    with one extended-gcd inversion plus 3(n−1) multiplications, amortizing
//!    the inverse to roughly one multiplication per element. The enumerator
//!    queues up to `IBATCH` cofactors and drains them through this.
//! 3. **Barrett reduction** (`Barrett32`) — division-free reduction and CRT
//!    for the small residue moduli (9..1134) used by the progression tables.
//! 4. **CRT combiners** — `fcrt64` merges a root mod d with a root mod a into
//!    a root mod a·d from a precomputed inverse, `crt64` is the Barrett
//!    two-modulus form.
//! 5. **Deterministic primality** (`is_prime64`) via fixed Miller–Rabin
//!    witness sets, and `pow_mod` with u128 intermediates.
//!
//! ## Algorithm: Montgomery Multiplication
//!
//! For a fixed odd modulus n, Montgomery form represents a as ā = a·R mod n
//! where R = 2^64. Multiplication becomes REDC(ā·b̄) = (ā·b̄ + m·n) >> 64 with
//! m = (ā·b̄ mod R) · (−n⁻¹ mod R); no division by n is ever performed.
//!
//! ## References
//!
//! - Peter L. Montgomery, "Modular Multiplication Without Trial Division",
//!   Mathematics of Computation, 44(170):519–521, 1985.
//! - Paul Barrett, "Implementing the Rivest Shamir and Adleman Public Key
//!   Encryption Algorithm on a Standard Digital Signal Processor", 1986.
//! - Deterministic MR witnesses: <http://miller-rabin.appspot.com/>

/// Modular exponentiation: base^exp mod modulus, u128 intermediates.
pub fn pow_mod(mut base: u64, mut exp: u64, modulus: u64) -> u64 {
    if modulus == 1 {
        return 0;
    }
    let mut result: u64 = 1;
    base %= modulus;
    while exp > 0 {
        if exp & 1 == 1 {
            result = (result as u128 * base as u128 % modulus as u128) as u64;
        }
        exp >>= 1;
        base = (base as u128 * base as u128 % modulus as u128) as u64;
    }
    result
}

/// Greatest common divisor.
pub fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let t = b;
        b = a % b;
        a = t;
    }
    a
}

/// Modular inverse by extended Euclid. Works for any modulus m > 1 with
/// gcd(a, m) = 1; returns None otherwise. Unlike a Fermat-style inverse this
/// does not require m prime, which matters because the enumerator inverts
/// cofactors modulo composite d.
pub fn inv_mod(a: u64, m: u64) -> Option<u64> {
    let (mut old_r, mut r) = (a as i128 % m as i128, m as i128);
    let (mut old_s, mut s) = (1i128, 0i128);
    while r != 0 {
        let q = old_r / r;
        let t = old_r - q * r;
        old_r = r;
        r = t;
        let t = old_s - q * s;
        old_s = s;
        s = t;
    }
    if old_r != 1 {
        return None;
    }
    let mut inv = old_s % m as i128;
    if inv < 0 {
        inv += m as i128;
    }
    Some(inv as u64)
}

/// Integer square root: largest r with r² ≤ n.
pub fn isqrt(n: u64) -> u64 {
    if n == 0 {
        return 0;
    }
    let mut r = (n as f64).sqrt() as u64;
    while r > 0 && r.checked_mul(r).map_or(true, |rr| rr > n) {
        r -= 1;
    }
    while (r + 1).checked_mul(r + 1).map_or(false, |rr| rr <= n) {
        r += 1;
    }
    r
}

/// Montgomery multiplication context for a fixed odd modulus.
///
/// All arithmetic is performed in Montgomery form: ā = a·R mod n, R = 2^64.
/// The modulus may be composite (the enumerator uses composite d freely).
#[derive(Clone, Copy, Debug)]
pub struct Montgomery64 {
    /// The modulus (odd, > 1).
    pub n: u64,
    /// -n⁻¹ mod 2^64 (Hensel lifting).
    n_prime: u64,
    /// R mod n (Montgomery form of 1).
    r_mod_n: u64,
    /// R² mod n (conversion into Montgomery form).
    r2_mod_n: u64,
}

impl Montgomery64 {
    pub fn new(n: u64) -> Self {
        debug_assert!(n > 1 && n & 1 == 1, "Montgomery requires odd modulus > 1");

        // Hensel lifting: n⁻¹ mod 2^64 in 6 doublings of precision.
        let mut inv: u64 = 1;
        for _ in 0..6 {
            inv = inv.wrapping_mul(2u64.wrapping_sub(n.wrapping_mul(inv)));
        }
        let n_prime = inv.wrapping_neg();

        let r_mod_n = ((1u128 << 64) % n as u128) as u64;
        let r2_mod_n = ((r_mod_n as u128 * r_mod_n as u128) % n as u128) as u64;

        Montgomery64 {
            n,
            n_prime,
            r_mod_n,
            r2_mod_n,
        }
    }

    /// Convert into Montgomery form: ā = a·R mod n.
    #[inline]
    pub fn to_mont(&self, a: u64) -> u64 {
        self.mul(a % self.n, self.r2_mod_n)
    }

    /// Convert out of Montgomery form.
    #[inline]
    pub fn from_mont(&self, a: u64) -> u64 {
        self.reduce(a as u128)
    }

    /// REDC: t·R⁻¹ mod n.
    #[inline]
    fn reduce(&self, t: u128) -> u64 {
        let m = (t as u64).wrapping_mul(self.n_prime);
        let u = t + (m as u128) * (self.n as u128);
        let result = (u >> 64) as u64;
        if result >= self.n {
            result - self.n
        } else {
            result
        }
    }

    /// Montgomery multiplication: a·b·R⁻¹ mod n.
    #[inline]
    pub fn mul(&self, a: u64, b: u64) -> u64 {
        self.reduce((a as u128) * (b as u128))
    }

    /// Plain product of two ordinary residues, routed through Montgomery form.
    #[inline]
    pub fn mul_plain(&self, a: u64, b: u64) -> u64 {
        self.from_mont(self.mul(self.to_mont(a), self.to_mont(b)))
    }

    /// The Montgomery form of 1.
    #[inline]
    pub fn one(&self) -> u64 {
        self.r_mod_n
    }
}

/// Invert every element of `vals` modulo `mg.n` in place.
///
/// Montgomery's trick: one prefix-product pass, a single extended-gcd
/// inversion of the running product, and a back-substitution pass. Elements
/// are ordinary residues (not Montgomery form); every element must be
/// coprime to the modulus, which the enumerator guarantees by construction
/// (appended cofactors share no prime with d).
pub fn batch_invert(vals: &mut [u64], mg: &Montgomery64) -> Option<()> {
    if vals.is_empty() {
        return Some(());
    }
    let mut prefix = Vec::with_capacity(vals.len());
    let mut acc = mg.one();
    for &v in vals.iter() {
        prefix.push(acc);
        acc = mg.mul(acc, mg.to_mont(v));
    }
    // acc = (v0·v1·…·vk)·R mod n; invert the plain product once.
    let mut inv_acc = mg.to_mont(inv_mod(mg.from_mont(acc), mg.n)?);
    for i in (0..vals.len()).rev() {
        let v = mg.to_mont(vals[i]);
        vals[i] = mg.from_mont(mg.mul(inv_acc, prefix[i]));
        inv_acc = mg.mul(inv_acc, v);
    }
    Some(())
}

/// Merge a root mod d with a root mod a into a root mod a·d.
///
/// `u` is the precomputed mixing constant a·(a⁻¹ mod d) − 1, which is
/// ≡ −1 (mod a) and ≡ 0 (mod d). `nza` is a − za for the target residue za
/// mod a, `zd` the residue mod d, `ad` the combined modulus. The result r
/// satisfies r ≡ za (mod a) and r ≡ zd (mod d).
#[inline]
pub fn fcrt64(u: u64, nza: u64, zd: u64, a: u64, ad: u64) -> u64 {
    let t = (zd + nza) % a;
    (((zd as u128) + (u as u128) * (t as u128)) % (ad as u128)) as u64
}

/// Barrett reduction context for a 32-bit modulus.
///
/// Precomputes ⌊2^64 / m⌋ so that reduction of a 64-bit value is two
/// multiplies and a correction, with no hardware division on the hot path.
#[derive(Clone, Copy, Debug)]
pub struct Barrett32 {
    pub m: u32,
    inv: u64,
}

impl Barrett32 {
    pub fn new(m: u32) -> Self {
        debug_assert!(m > 1);
        Barrett32 {
            m,
            inv: (u64::MAX / m as u64).wrapping_add(1),
        }
    }

    /// x mod m for 64-bit x.
    #[inline]
    pub fn reduce(&self, x: u64) -> u32 {
        let q = ((self.inv as u128 * x as u128) >> 64) as u64;
        let mut r = x.wrapping_sub(q.wrapping_mul(self.m as u64));
        // One correction step suffices for this precomputation.
        if r >= self.m as u64 {
            r = r.wrapping_sub(self.m as u64);
        }
        if r >= self.m as u64 {
            r = r.wrapping_sub(self.m as u64);
        }
        debug_assert_eq!(r, x % self.m as u64);
        r as u32
    }

    /// a·b mod m for residues a, b < m.
    #[inline]
    pub fn mul(&self, a: u32, b: u32) -> u32 {
        self.reduce(a as u64 * b as u64)
    }
}

/// CRT combine r ≡ za (mod a), r ≡ zb (mod b) for a 64-bit modulus a and a
/// small modulus b with precomputed ainvb = a⁻¹ mod b.
///
/// Returns the unique residue in [0, a·b).
#[inline]
pub fn crt64(za: u64, a: u64, zb: u32, b: &Barrett32, ainvb: u32) -> u64 {
    let za_b = b.reduce(za);
    let diff = if zb >= za_b { zb - za_b } else { zb + b.m - za_b };
    let t = b.mul(diff, ainvb);
    za + a * t as u64
}

/// Deterministic Miller–Rabin for u64.
///
/// Witness sets per range from the Jaeschke/Sinclair tables; no BPSW or
/// random rounds needed below 2^64.
pub fn is_prime64(n: u64) -> bool {
    if n < 2 {
        return false;
    }
    for &p in &[2u64, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37] {
        if n % p == 0 {
            return n == p;
        }
    }
    let mut d = n - 1;
    let mut s = 0u32;
    while d & 1 == 0 {
        d >>= 1;
        s += 1;
    }
    let witnesses: &[u64] = if n < 3_215_031_751 {
        &[2, 3, 5, 7]
    } else {
        &[2, 325, 9375, 28178, 450775, 9780504, 1795265022]
    };
    let mg = Montgomery64::new(n);
    let one = mg.one();
    let neg_one = n - one;
    'witness: for &a in witnesses {
        let a = a % n;
        if a == 0 {
            continue;
        }
        let mut x = mont_pow(&mg, mg.to_mont(a), d);
        if x == one || x == neg_one {
            continue;
        }
        for _ in 1..s {
            x = mg.mul(x, x);
            if x == neg_one {
                continue 'witness;
            }
        }
        return false;
    }
    true
}

/// Montgomery-form exponentiation (base already in Montgomery form).
pub fn mont_pow(mg: &Montgomery64, base: u64, mut exp: u64) -> u64 {
    let mut result = mg.one();
    let mut b = base;
    while exp > 0 {
        if exp & 1 == 1 {
            result = mg.mul(result, b);
        }
        exp >>= 1;
        if exp > 0 {
            b = mg.mul(b, b);
        }
    }
    result
}

/// Inverse of every residue 1..p modulo a prime p < 2^32, by the linear
/// recurrence inv[i] = −⌊p/i⌋·inv[p mod i]. Index 0 holds 0.
pub fn inverse_table_prime(p: u64) -> Vec<u32> {
    debug_assert!(p < 1 << 32);
    let mut inv = vec![0u32; p as usize];
    if p > 1 {
        inv[1] = 1;
        for i in 2..p {
            let v = (p / i) * inv[(p % i) as usize] as u64 % p;
            inv[i as usize] = (p - v) as u32;
        }
    }
    inv
}

/// Smallest prime strictly greater than n (n + 1 if that is prime).
pub fn next_prime(n: u64) -> u64 {
    let mut c = n + 1;
    if c <= 2 {
        return 2;
    }
    if c & 1 == 0 {
        c += 1;
    }
    while !is_prime64(c) {
        c += 2;
    }
    c
}
