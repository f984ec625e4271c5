//! CLI integration tests for the `cubehunt` binary.
//!
//! These tests exercise the command-line interface using `assert_cmd`, which
//! spawns the compiled binary as a subprocess and asserts on exit code,
//! stdout, and stderr. Two tiers:
//!
//! - **Validation tests**: every precondition from the argument contract
//!   must produce an `ERROR:` diagnostic and exit code 255 without starting
//!   a search.
//! - **Search tests**: tiny full runs (small dmax/zmax, a handful of
//!   primes) that verify the banner protocol, solution reporting, the
//!   checkpoint resume short-circuit, and the counter comparison output.
//!
//! # How to run
//!
//! ```bash
//! cargo test --test cli_tests
//! ```
//!
//! All runs here complete in well under a second; the search bounds are
//! deliberately minuscule.

use assert_cmd::Command;
use predicates::prelude::*;

fn cubehunt() -> Command {
    Command::cargo_bin("cubehunt").unwrap()
}

// == Help and Argument Validation ==============================================
// Exit code 255 (the C-style -1) for every violated precondition, with a
// diagnostic on stderr.
// ==============================================================================

#[test]
fn help_shows_positional_contract() {
    cubehunt().arg("--help").assert().success().stdout(
        predicate::str::contains("pmin")
            .and(predicate::str::contains("pmax"))
            .and(predicate::str::contains("dmax"))
            .and(predicate::str::contains("zmax")),
    );
}

#[test]
fn rejects_bad_k_mod_nine() {
    cubehunt()
        .args(["1", "4", "2", "100", "1000", "10000", "--no-checkpoint"])
        .assert()
        .code(255)
        .stderr(predicate::str::contains("3 or 6 mod 9"));
}

#[test]
fn rejects_k_zero_and_large_k() {
    cubehunt()
        .args(["1", "0", "2", "100", "1000", "10000", "--no-checkpoint"])
        .assert()
        .code(255);
    cubehunt()
        .args(["1", "1002", "2", "100", "1000", "10000", "--no-checkpoint"])
        .assert()
        .code(255);
}

#[test]
fn rejects_inverted_prime_range() {
    cubehunt()
        .args(["1", "33", "100", "2", "1000", "10000", "--no-checkpoint"])
        .assert()
        .code(255)
        .stderr(predicate::str::contains("pmin"));
}

#[test]
fn rejects_dmax_above_zmax() {
    cubehunt()
        .args(["1", "33", "2", "100", "10000", "5000", "--no-checkpoint"])
        .assert()
        .code(255)
        .stderr(predicate::str::contains("zmax"));
}

#[test]
fn rejects_pmax_above_dmax() {
    cubehunt()
        .args(["1", "33", "2", "20000", "10000", "100000", "--no-checkpoint"])
        .assert()
        .code(255);
}

#[test]
fn rejects_mismatched_pinned_prefixes() {
    cubehunt()
        .args(["2", "33", "5x7", "7x11", "1000", "10000", "--no-checkpoint"])
        .assert()
        .code(255)
        .stderr(predicate::str::contains("p0"));
}

#[test]
fn rejects_pinned_second_range_above_p0() {
    // q' must stay ≤ p0.
    cubehunt()
        .args(["2", "33", "5x2", "5x11", "1000", "10000", "--no-checkpoint"])
        .assert()
        .code(255);
}

#[test]
fn rejects_p0_dividing_k() {
    cubehunt()
        .args(["2", "33", "11x2", "11x5", "100000", "1000000", "--no-checkpoint"])
        .assert()
        .code(255)
        .stderr(predicate::str::contains("divides"));
}

#[test]
fn rejects_p0_above_sqrt_dmax() {
    cubehunt()
        .args(["2", "33", "97x2", "97x5", "1000", "10000", "--no-checkpoint"])
        .assert()
        .code(255)
        .stderr(predicate::str::contains("sqrt"));
}

#[test]
fn rejects_low_zmax_without_options() {
    // zmax below ≈3.8473·dmax warns, and fails when no options are given.
    cubehunt()
        .args(["1", "33", "2", "100", "10000", "20000", "--no-checkpoint"])
        .assert()
        .code(255)
        .stderr(predicate::str::contains("WARNING"));
}

#[test]
fn low_zmax_with_options_proceeds() {
    cubehunt()
        .args(["1", "33", "2", "100", "10000", "20000", "1", "--no-checkpoint"])
        .assert()
        .success()
        .stdout(predicate::str::contains("END"));
}

// == Search Runs ===============================================================
// Tiny but complete searches: banners, solutions, counters, resume.
// ==============================================================================

#[test]
fn tiny_search_emits_banners_and_exits_zero() {
    cubehunt()
        .args(["1", "33", "2", "50", "500", "10000", "--no-checkpoint"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("START:")
                .and(predicate::str::contains("LIMITS:"))
                .and(predicate::str::contains("END:")),
        );
}

#[test]
fn finds_classical_solution_for_k6() {
    // 6 = 2³ + (−1)³ + (−1)³ surfaces from the tiny-z sweep.
    cubehunt()
        .args(["1", "6", "2", "20", "100", "1000", "--no-checkpoint"])
        .assert()
        .success()
        .stdout(predicate::str::contains("SOLUTION:k=6"));
}

#[test]
fn finds_solutions_for_k3() {
    cubehunt()
        .args(["2", "3", "2", "20", "100", "1000", "--no-checkpoint"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("x=1:y=1:z=1")
                .and(predicate::str::contains("x=4:y=4:z=-5")),
        );
}

#[test]
fn pinned_prime_form_runs() {
    // Largest prime factor pinned to 7 for k = 6; second-largest from 5.
    cubehunt()
        .args(["2", "6", "7x5", "7x7", "1000", "100000", "--no-checkpoint"])
        .assert()
        .success()
        .stdout(predicate::str::contains("END:"));
}

#[test]
fn counter_comparison_reports_mismatch() {
    cubehunt()
        .args([
            "1",
            "33",
            "2",
            "50",
            "500",
            "10000",
            "0",
            "pcnt=999999",
            "--no-checkpoint",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("MISMATCH:pcnt"));
}

#[test]
fn checkpoint_resume_short_circuits() {
    let dir = tempfile::tempdir().unwrap();
    let cp = dir.path().join("cubehunt.checkpoint");
    let cp_arg = cp.to_str().unwrap().to_string();

    // First run completes and records the checkpoint.
    cubehunt()
        .args(["1", "33", "2", "50", "500", "10000", "--checkpoint", &cp_arg])
        .assert()
        .success();
    assert!(cp.exists());

    // Second run sees a complete checkpoint and exits cleanly without
    // re-running the phases.
    cubehunt()
        .args(["1", "33", "2", "50", "500", "10000", "--checkpoint", &cp_arg])
        .assert()
        .success()
        .stdout(predicate::str::contains("END:"));
}

#[test]
fn worker_count_autodetects() {
    cubehunt()
        .args(["0", "33", "2", "30", "300", "10000", "--no-checkpoint"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Using"));
}
