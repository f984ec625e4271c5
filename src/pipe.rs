//! # Pipe — Single-Producer Multi-Consumer Prime Stream
//!
//! A bounded stream of the primes in [start, end], fed by one dedicated
//! feeder thread (the only caller of the sieve) and drained by N worker
//! threads. Delivery contract:
//!
//! - Primes are delivered in ascending order across the union of workers.
//! - Each prime goes to exactly one worker; a single worker sees a subset
//!   with gaps and must tolerate that.
//! - `read` returns [`END_OF_PRIMES`] once the stream is exhausted or the
//!   shared stop flag has been raised; it may block while the feeder runs.
//!
//! Backpressure comes from the bounded channel: `feed` blocks while the
//! buffer is full, so the feeder never races ahead by more than the channel
//! capacity. Cancellation: any worker that fails raises the stop flag; the
//! feeder notices between batches and hangs up, which drains every sibling
//! with [`END_OF_PRIMES`].

use crossbeam_channel::{bounded, Receiver, SendTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::sieve::PrimeRange;

/// Sentinel returned by `read` after the last prime.
pub const END_OF_PRIMES: u64 = u64::MAX;

/// Primes handed from the sieve to the channel per `feed` call.
const FEED_BATCH: usize = 512;

/// Channel capacity per worker.
const PER_WORKER_DEPTH: usize = 1024;

/// Consumer half: one per worker thread.
pub struct PipeReader {
    rx: Receiver<u64>,
    stop: Arc<AtomicBool>,
    /// Upper end of the prime range, used by the driver for phase exits.
    pub end: u64,
}

impl PipeReader {
    /// Next prime for this worker, or [`END_OF_PRIMES`].
    pub fn read(&self) -> u64 {
        if self.stop.load(Ordering::Relaxed) {
            return END_OF_PRIMES;
        }
        self.rx.recv().unwrap_or(END_OF_PRIMES)
    }
}

/// Producer half: owned by the feeder thread.
pub struct PipeFeeder {
    tx: Sender<u64>,
    primes: PrimeRange,
    stop: Arc<AtomicBool>,
}

impl PipeFeeder {
    /// Push the next batch into the channel, blocking while it is full.
    /// Returns false when the range is exhausted or the stop flag is up,
    /// after which the feeder should be dropped to hang up the channel.
    pub fn feed(&mut self) -> bool {
        for _ in 0..FEED_BATCH {
            if self.stop.load(Ordering::Relaxed) {
                return false;
            }
            match self.primes.next() {
                Some(mut p) => loop {
                    // Bounded waits so a raised stop flag is never missed
                    // while blocked on a full channel.
                    match self.tx.send_timeout(p, Duration::from_millis(20)) {
                        Ok(()) => break,
                        Err(SendTimeoutError::Timeout(v)) => {
                            if self.stop.load(Ordering::Relaxed) {
                                return false;
                            }
                            p = v;
                        }
                        Err(SendTimeoutError::Disconnected(_)) => return false,
                    }
                },
                None => return false,
            }
        }
        true
    }
}

/// Build the pipe for primes in [start, end] and `nworkers` consumers.
/// Returns one reader per worker plus the feeder half.
pub fn create(
    start: u64,
    end: u64,
    nworkers: usize,
    stop: Arc<AtomicBool>,
) -> (Vec<PipeReader>, PipeFeeder) {
    let (tx, rx) = bounded(nworkers.max(1) * PER_WORKER_DEPTH);
    let readers = (0..nworkers.max(1))
        .map(|_| PipeReader {
            rx: rx.clone(),
            stop: Arc::clone(&stop),
            end,
        })
        .collect();
    let feeder = PipeFeeder {
        tx,
        primes: PrimeRange::new(start, end),
        stop,
    };
    (readers, feeder)
}
