//! # CLI — Argument Validation and Supervisor Launch
//!
//! Turns the positional arguments into a validated `SearchParams`, applying
//! every precondition before any precompute runs:
//!
//! - k ∈ [1,1000] with k ≡ 3 or 6 (mod 9)
//! - dmax ≤ DMAX, p0 ≤ √dmax, p0·pmax ≤ dmax ≤ zmax, zmax ≤ 2^80
//! - the `P0xQ` pinned form requires matching prefixes, Q' ≤ P0, P0 ≥ 2,
//!   P0 ∤ k, and no options/profiling
//! - zmax should be at least ≈3.8473·dmax (the dmax/(2^(1/3)−1) coverage
//!   bound); smaller values warn, and abort unless options are set
//!
//! A plain pmin = pmax = p ≤ √dmax with more than one worker switches to the
//! pinned-prime form automatically (second-largest primes from 2).
//!
//! Failures print `ERROR:` to stderr and exit 255.

use std::path::PathBuf;
use std::process::ExitCode;

use cubehunt::driver::{run_search, ExpectedCounts};
use cubehunt::modular::{is_prime64, isqrt};
use cubehunt::params::{self, SearchParams, DMAX, ZMAXBITS, ZMIN_RATIO};

fn fail(msg: String) -> ExitCode {
    eprintln!("ERROR: {}", msg);
    ExitCode::from(255)
}

/// Parse a decimal u128 (zmax can exceed u64).
fn parse_u128(s: &str) -> Option<u128> {
    s.parse::<u128>().ok()
}

/// Split a `P0xQ` argument into (p0, q); None when there is no `x`.
fn parse_pinned(s: &str) -> Option<(u64, u64)> {
    let (p0, q) = s.split_once('x')?;
    Some((p0.parse().ok()?, q.parse().ok()?))
}

#[allow(clippy::too_many_arguments)]
pub fn run(
    n: usize,
    k: u32,
    pmin_arg: &str,
    pmax_arg: &str,
    dmax: u64,
    zmax_arg: &str,
    rest: &[String],
    checkpoint: Option<PathBuf>,
    profile: bool,
) -> ExitCode {
    let mut workers = n;
    if profile && workers != 1 {
        eprintln!("Setting workers to 1 for profiling.");
        workers = 1;
    }
    if workers == 0 {
        workers = std::thread::available_parallelism()
            .map(|v| v.get())
            .unwrap_or(1);
        println!("Using {} workers.", workers);
    }

    if !params::good_k(k) {
        return fail(format!(
            "k={} must be a positive integer <= 1000 congruent to 3 or 6 mod 9",
            k
        ));
    }

    if dmax > DMAX {
        return fail(format!("dmax = {} cannot exceed DMAX = {}", dmax, DMAX));
    }

    // Options value and expected counters trail the positional bounds.
    let options = rest
        .first()
        .and_then(|s| s.parse::<u32>().ok())
        .unwrap_or(0);
    if options > 6 {
        return fail(format!("options = {} must be between 0 and 6", options));
    }
    let mut expected = ExpectedCounts::default();
    let mut have_expected = false;
    for arg in rest {
        for (prefix, slot) in [
            ("pcnt=", &mut expected.pcnt),
            ("ccnt=", &mut expected.ccnt),
            ("dcnt=", &mut expected.dcnt),
            ("rcnt=", &mut expected.rcnt),
        ] {
            if let Some(v) = arg.strip_prefix(prefix).and_then(|v| v.parse().ok()) {
                *slot = v;
                have_expected = true;
            }
        }
    }

    let (p0, mut pmin, pmax): (u64, u64, u64);
    if let Some((q0, qmin)) = parse_pinned(pmin_arg) {
        let Some((q0b, qmax)) = parse_pinned(pmax_arg) else {
            return fail(format!(
                "pmax={} not valid for pmin={} (if pmin=p0xq we require pmax=p0xr with r>=q)",
                pmax_arg, pmin_arg
            ));
        };
        if q0 != q0b {
            return fail(format!(
                "pmax={} not valid for pmin={} (if pmin=p0xq we require pmax=p0xr with r>=q)",
                pmax_arg, pmin_arg
            ));
        }
        if q0 < 2 {
            return fail(format!("p0={} must be at least 2", q0));
        }
        p0 = q0;
        pmin = qmin;
        pmax = qmax;
        if pmax > p0 {
            return fail(format!(
                "we must have pmax={}x{} <= {}x{}",
                p0, pmax, p0, p0
            ));
        }
        if profile || options != 0 {
            return fail(format!(
                "profiling and options are not permitted for pmin={}x{} pmax={}x{}",
                p0, pmin, p0, pmax
            ));
        }
    } else {
        let Some(lo) = pmin_arg.parse::<u64>().ok() else {
            return fail(format!("invalid pmin: {}", pmin_arg));
        };
        let Some(hi) = pmax_arg.parse::<u64>().ok() else {
            return fail(format!("invalid pmax: {}", pmax_arg));
        };
        pmin = lo;
        pmax = hi;
        if workers > 1 && pmin == pmax && pmax <= isqrt(dmax) {
            p0 = pmin;
            pmin = 2;
        } else {
            p0 = 1;
        }
    }

    if p0 > 1 && !is_prime64(p0) {
        eprintln!("WARNING: p0={} is not prime", p0);
    }
    if p0 > 1 && p0 % 3 == 1 && !cubehunt::cuberoots::has_cuberoots_modp(k, p0) {
        eprintln!("WARNING: there are no cuberoots of k={} mod p0={}", k, p0);
    }
    if p0 > 1 && k as u64 % p0 == 0 {
        return fail(format!(
            "p0={} divides k={}, this case is not currently supported",
            p0, k
        ));
    }
    if pmin < 2 {
        pmin = 2;
    }
    if pmax < pmin {
        return fail(format!(
            "we must have pmin={} <= pmax={} and pmax > 1",
            pmin, pmax
        ));
    }

    let Some(zmax) = parse_u128(zmax_arg) else {
        return fail(format!("invalid zmax: {}", zmax_arg));
    };
    if zmax == 0 || 128 - zmax.leading_zeros() > ZMAXBITS {
        return fail(format!("zmax = {} cannot exceed 2^{}", zmax_arg, ZMAXBITS));
    }

    if p0 > isqrt(dmax) {
        return fail(format!(
            "we must have p0={} <= sqrt(dmax)={}",
            p0,
            isqrt(dmax)
        ));
    }
    if (p0 as u128) * (pmax as u128) > dmax as u128 || (dmax as u128) > zmax {
        return fail(format!(
            "we must have pmin={} <= pmax={} <= dmax={} <= zmax={}",
            pmin, pmax, dmax, zmax
        ));
    }
    let zmin = ZMIN_RATIO * dmax as f64;
    if zmin > zmax as f64 {
        eprintln!(
            "WARNING: for dmax={} we have zmin={:.0} > zmax={}, you should increase zmax or decrease dmax",
            dmax, zmin, zmax
        );
        if options == 0 {
            return ExitCode::from(255);
        }
    }

    let params = SearchParams::new(k, dmax, zmax, pmin, pmax, p0, workers, options);
    match run_search(
        params,
        checkpoint,
        profile,
        if have_expected { Some(expected) } else { None },
    ) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("ERROR: {}", err);
            ExitCode::from(255)
        }
    }
}
