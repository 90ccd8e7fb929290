//! Persisted execution state.
//!
//! Two artifacts survive the process: an append-only JSON-lines file of
//! [`ExecutionRecord`]s (one line per terminal cycle, never rewritten)
//! and a stuck-position marker the operator must remove explicitly before
//! the engine will trade again.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use tracing::info;

use crate::domain::{ExecutionRecord, StuckMarker};
use crate::error::{Error, Result};

pub struct ExecutionLedger {
    executions_path: PathBuf,
    stuck_marker_path: PathBuf,
}

impl ExecutionLedger {
    /// # Errors
    ///
    /// Fails if a parent directory cannot be created.
    pub fn open(executions_path: PathBuf, stuck_marker_path: PathBuf) -> Result<Self> {
        for path in [&executions_path, &stuck_marker_path] {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)?;
                }
            }
        }
        Ok(Self {
            executions_path,
            stuck_marker_path,
        })
    }

    /// Append one terminal cycle record.
    pub fn append(&self, record: &ExecutionRecord) -> Result<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.executions_path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    /// Read back all records (operator tooling and tests).
    pub fn records(&self) -> Result<Vec<ExecutionRecord>> {
        if !self.executions_path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.executions_path)?;
        let mut records = Vec::new();
        for line in content.lines().filter(|l| !l.trim().is_empty()) {
            records.push(serde_json::from_str(line)?);
        }
        Ok(records)
    }

    /// Persist the stuck marker. Refuses to overwrite an existing one so
    /// the first diagnosis is never lost.
    pub fn set_stuck(&self, marker: &StuckMarker) -> Result<()> {
        if self.stuck_marker_path.exists() {
            return Err(Error::StuckPosition {
                venue: marker.venue.clone(),
                reason: "stuck marker already present".into(),
            });
        }
        let json = serde_json::to_string_pretty(marker)?;
        fs::write(&self.stuck_marker_path, json)?;
        info!(path = %self.stuck_marker_path.display(), "stuck marker persisted");
        Ok(())
    }

    /// Current stuck marker, if one is set.
    pub fn stuck_marker(&self) -> Result<Option<StuckMarker>> {
        if !self.stuck_marker_path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.stuck_marker_path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    /// Remove the marker after manual reconciliation.
    pub fn clear_stuck(&self) -> Result<()> {
        if self.stuck_marker_path.exists() {
            fs::remove_file(&self.stuck_marker_path)?;
        }
        Ok(())
    }
}
