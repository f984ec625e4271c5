//! # Main — CLI Entry Point
//!
//! Parses the positional search interface and hands off to the supervisor:
//!
//! ```text
//! cubehunt n k pmin pmax dmax zmax [options] [pcnt=..] [ccnt=..] [dcnt=..] [rcnt=..]
//! ```
//!
//! - `n` — worker threads (0 = all logical cores)
//! - `k` — target constant, 1..=1000, ≡ 3 or 6 (mod 9)
//! - `pmin`, `pmax` — prime range, or both `P0xQ` to pin the largest prime
//!   factor to P0 and range the second largest
//! - `dmax` — modulus bound (< 2^63)
//! - `zmax` — |z| bound (≤ 2^80, parsed as 128-bit)
//! - `options` — 0..=6, truncates the per-prime pipeline for counting runs
//! - trailing `pcnt=`/`ccnt=`/`dcnt=`/`rcnt=` — expected totals to compare
//!
//! Validation failures print an `ERROR:` diagnostic and exit 255; a worker
//! failure exits 255 after the failure banner.

mod cli;

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "cubehunt", about = "Search for integer solutions of x³ + y³ + z³ = k")]
struct Cli {
    /// Worker threads (0 = autodetect)
    n: usize,

    /// Target constant k (must be ≡ 3 or 6 mod 9)
    k: u32,

    /// Smallest prime to process, or P0xQ to pin the largest prime factor
    pmin: String,

    /// Largest prime to process, or P0xQ' matching pmin
    pmax: String,

    /// Bound on the modulus d
    dmax: u64,

    /// Bound on |z| (up to 2^80)
    zmax: String,

    /// Optional options value followed by expected counters (pcnt=… etc.)
    rest: Vec<String>,

    /// Path to checkpoint file for resumable runs
    #[arg(long, default_value = "cubehunt.checkpoint")]
    checkpoint: PathBuf,

    /// Disable checkpointing entirely
    #[arg(long)]
    no_checkpoint: bool,

    /// Single-worker profiling run (stops after enough samples)
    #[arg(long)]
    profile: bool,
}

fn main() -> ExitCode {
    // LOG_FORMAT=json selects structured output for fleet runs.
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    if log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_target(false)
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .init();
    }

    let args = Cli::parse();
    cli::run(
        args.n,
        args.k,
        &args.pmin,
        &args.pmax,
        args.dmax,
        &args.zmax,
        &args.rest,
        if args.no_checkpoint {
            None
        } else {
            Some(args.checkpoint)
        },
        args.profile,
    )
}
