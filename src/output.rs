// src/output.rs
//
// Versioned output schemas and deterministic file writing.
//
// Required outputs of the batch harness:
// - mc_summary.json: small, stable summary for CI comparison
// - scenario_echo.yaml: the configuration used for the run
// - optional CSV of per-seed rows
//
// Field ordering is guaranteed by struct definition + serde (no maps),
// writes are atomic (temp file + rename), and every summary carries a
// determinism checksum so two runs with one seed are diffable by hash.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use crate::node::{Matrix, Role};
use crate::summary::PointEstimate;

/// mc_summary.json schema version. Increment on breaking changes.
pub const OUTPUT_SCHEMA_VERSION: u32 = 1;

/// Hex encoding without an extra dependency.
pub fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{:02x}", b));
    }
    out
}

/// sha256 determinism checksum over a result's metadata and the bit
/// pattern of every cell, in row-major order.
pub fn result_checksum(nsv: usize, nsu: usize, role: Role, data: &Matrix) -> String {
    let mut hasher = Sha256::new();
    hasher.update((nsv as u64).to_le_bytes());
    hasher.update((nsu as u64).to_le_bytes());
    hasher.update(role.as_str().as_bytes());
    for v in data.as_slice() {
        hasher.update(v.to_bits().to_le_bytes());
    }
    hex_encode(&hasher.finalize())
}

/// Write a file atomically (temp file + rename).
pub fn atomic_write(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let parent = path.parent().unwrap_or(Path::new("."));
    let temp_name = format!(
        ".tmp_{}_{}",
        std::process::id(),
        path.file_name()
            .map(|s| s.to_string_lossy())
            .unwrap_or_default()
    );
    let temp_path = parent.join(&temp_name);

    let mut file = File::create(&temp_path)?;
    file.write_all(data)?;
    file.sync_all()?;
    fs::rename(&temp_path, path)?;
    Ok(())
}

// ============================================================================
// mc_summary.json structures
// ============================================================================

/// Harness configuration echoed into the summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McConfig {
    pub scenario_id: String,
    pub seeds: usize,
    pub base_seed: u64,
    pub nsv: usize,
    pub nsu: usize,
    pub precision: String,
}

/// Per-seed record: point estimates plus the self-consistency verdicts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McRunRecord {
    pub run: usize,
    pub seed: u64,
    /// Determinism checksum of the full-matrix result.
    pub checksum: String,
    /// Two independent full-matrix evaluations were value-identical.
    pub full_matrix_identical: bool,
    /// Cut-loop per-iteration means matched the full-matrix columns.
    pub cut_loop_consistent: bool,
    pub mean_dose: PointEstimate,
    pub median_dose: PointEstimate,
}

/// Simple statistics without percentiles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimpleStats {
    pub mean: f64,
    pub std_pop: f64,
    pub min: f64,
    pub max: f64,
}

impl SimpleStats {
    pub fn from_online(stats: &crate::summary::OnlineStats) -> Self {
        Self {
            mean: stats.mean(),
            std_pop: stats.stddev_population(),
            min: stats.min(),
            max: stats.max(),
        }
    }
}

/// Aggregate statistics across all seeds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McAggregateStats {
    /// Spread of the per-seed mean-dose point estimates.
    pub mean_dose: SimpleStats,
    /// Spread of the per-seed median-dose point estimates.
    pub median_dose: SimpleStats,
    /// Number of seeds where every self-consistency check passed.
    pub consistent_runs: usize,
}

/// Complete mc_summary.json (versioned schema).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McSummary {
    pub schema_version: u32,
    pub exposim_version: String,
    pub config: McConfig,
    pub runs: Vec<McRunRecord>,
    pub aggregate: McAggregateStats,
}

impl McSummary {
    /// Serialize and atomically write to `path`.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .context("Failed to serialize mc_summary.json")?;
        atomic_write(path, json.as_bytes())
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }
}
