//! # Checkpoint — Resumable Search State Persistence
//!
//! Saves and loads search progress as JSON with SHA-256 integrity
//! verification and generational backups. The checkpoint records the bounds
//! it was taken under plus the resume point and counters, so a restarted run
//! can both validate that it matches and pick up where the last one stopped.
//!
//! ## Atomic Writes
//!
//! Checkpoint files are written atomically: write to a temp file, then
//! rename. This prevents corruption from mid-write crashes or power loss.
//!
//! ## Integrity
//!
//! A SHA-256 hash is stored alongside the JSON data. On load the hash is
//! verified; corrupted checkpoints are skipped in favor of the most recent
//! valid generation (up to 3 generations kept).

use anyhow::Result;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

/// Number of backup generations to keep.
const GENERATIONS: usize = 3;

/// Search state at a phase boundary.
#[derive(Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub k: u32,
    pub p0: u64,
    pub pmin: u64,
    pub pmax: u64,
    pub dmax: u64,
    /// zmax as a decimal string (u128 has no portable JSON encoding).
    pub zmax: String,
    /// First prime not yet fully processed.
    pub next_pmin: u64,
    /// Highest phase id completed.
    pub phase: u32,
    pub pcnt: u64,
    pub ccnt: u64,
    pub dcnt: u64,
    pub rcnt: u64,
}

impl Checkpoint {
    /// True iff this checkpoint belongs to the same search.
    pub fn matches(&self, k: u32, p0: u64, pmin: u64, pmax: u64, dmax: u64, zmax: u128) -> bool {
        self.k == k
            && self.p0 == p0
            && self.pmin == pmin
            && self.pmax == pmax
            && self.dmax == dmax
            && self.zmax == zmax.to_string()
    }

    /// True iff the recorded state already covers the whole prime range.
    pub fn complete(&self) -> bool {
        self.next_pmin > self.pmax
    }
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    checksum: String,
    data: serde_json::Value,
}

fn sha256_hex(data: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn generation_path(base: &Path, gen: usize) -> PathBuf {
    if gen == 0 {
        base.to_path_buf()
    } else {
        let mut p = base.as_os_str().to_os_string();
        p.push(format!(".{}", gen));
        PathBuf::from(p)
    }
}

/// Save with integrity checksum and rotating generations
/// (current → .1 → .2, oldest discarded). The write itself is atomic.
pub fn save(path: &Path, checkpoint: &Checkpoint) -> Result<()> {
    for gen in (1..GENERATIONS).rev() {
        let src = generation_path(path, gen - 1);
        let dst = generation_path(path, gen);
        if src.exists() {
            let _ = fs::rename(&src, &dst);
        }
    }

    let data = serde_json::to_value(checkpoint)?;
    let data_str = serde_json::to_string_pretty(&data)?;
    let envelope = Envelope {
        checksum: sha256_hex(&data_str),
        data,
    };
    let json = serde_json::to_string_pretty(&envelope)?;

    let tmp = path.with_extension("tmp");
    fs::write(&tmp, &json)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Load the newest valid checkpoint, falling back on corruption.
pub fn load(path: &Path) -> Option<Checkpoint> {
    for gen in 0..GENERATIONS {
        let p = generation_path(path, gen);
        if let Some(cp) = load_single(&p) {
            if gen > 0 {
                tracing::warn!(
                    "recovered checkpoint from generation {} ({})",
                    gen,
                    p.display()
                );
            }
            return Some(cp);
        }
    }
    None
}

fn load_single(path: &Path) -> Option<Checkpoint> {
    let raw = fs::read_to_string(path).ok()?;
    let envelope: Envelope = serde_json::from_str(&raw).ok()?;
    let data_str = serde_json::to_string_pretty(&envelope.data).ok()?;
    if sha256_hex(&data_str) != envelope.checksum {
        tracing::warn!("checkpoint integrity check failed: {}", path.display());
        return None;
    }
    serde_json::from_value(envelope.data).ok()
}

/// Remove the checkpoint and all generations.
pub fn clear(path: &Path) {
    for gen in 0..GENERATIONS {
        let _ = fs::remove_file(generation_path(path, gen));
    }
    let _ = fs::remove_file(path.with_extension("tmp"));
}
