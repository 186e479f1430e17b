//! Persistence layer.
//!
//! The fingerprint memory is saved to a JSON file after each successful
//! cycle so cool-downs survive restarts. Emitted recommendations go to the
//! SQLite ledger in [`history`].

pub mod history;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::path::Path;
use tracing::{debug, info};

use crate::engine::dedup::FingerprintMemory;
use crate::types::ValuebetsError;

/// Default memory file path.
const DEFAULT_MEMORY_FILE: &str = "valuebets_memory.json";

/// Save the fingerprint memory to a JSON file.
pub fn save_memory(memory: &FingerprintMemory, path: Option<&str>) -> Result<()> {
    let path = path.unwrap_or(DEFAULT_MEMORY_FILE);
    let json = serde_json::to_string_pretty(memory)
        .context("Failed to serialise fingerprint memory")?;

    std::fs::write(path, &json)
        .context(format!("Failed to write memory to {path}"))?;

    debug!(path, entries = memory.len(), "Memory saved");
    Ok(())
}

/// Load the fingerprint memory, dropping entries already expired at `now`.
/// Returns an empty memory if the file doesn't exist (fresh start).
pub fn load_memory(path: Option<&str>, now: DateTime<Utc>) -> Result<FingerprintMemory> {
    let path = path.unwrap_or(DEFAULT_MEMORY_FILE);

    if !Path::new(path).exists() {
        info!(path, "No saved memory found, starting fresh");
        return Ok(FingerprintMemory::new());
    }

    let json = std::fs::read_to_string(path)
        .context(format!("Failed to read memory from {path}"))?;

    let mut memory: FingerprintMemory = serde_json::from_str(&json)
        .map_err(|e| ValuebetsError::Storage(format!("Failed to parse memory from {path}: {e}")))?;
    let expired = memory.purge_expired(now);

    info!(path, entries = memory.len(), expired, "Memory loaded from disk");

    Ok(memory)
}

/// Delete the memory file (for testing or reset).
pub fn delete_memory(path: Option<&str>) -> Result<()> {
    let path = path.unwrap_or(DEFAULT_MEMORY_FILE);
    if Path::new(path).exists() {
        std::fs::remove_file(path)
            .context(format!("Failed to delete memory file {path}"))?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
