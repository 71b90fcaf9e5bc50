//! Batch report snapshot and append-only run history.
use super::WorkspacePaths;
use crate::util::write_json_atomic;
use crate::workflow::BatchReport;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;

pub const HISTORY_SCHEMA_VERSION: u32 = 1;

/// One line of `edit/history.jsonl`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub schema_version: u32,
    pub started_at_epoch_ms: u64,
    pub finished_at_epoch_ms: u64,
    pub step: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Write the latest batch report snapshot.
pub fn write_report(paths: &WorkspacePaths, report: &BatchReport) -> Result<()> {
    write_json_atomic(&paths.report_path(), report)
}

/// Append a history entry as JSONL.
pub fn append_history(paths: &WorkspacePaths, entry: &HistoryEntry) -> Result<()> {
    let path = paths.history_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("create edit dir")?;
    }
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("open {}", path.display()))?;
    let line = serde_json::to_string(entry).context("serialize history entry")?;
    file.write_all(line.as_bytes())
        .with_context(|| format!("write {}", path.display()))?;
    file.write_all(b"\n")
        .with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_appends_one_line_per_entry() {
        let temp = tempfile::tempdir().unwrap();
        let paths = WorkspacePaths::new(temp.path().to_path_buf());
        for step in ["run", "run"] {
            append_history(
                &paths,
                &HistoryEntry {
                    schema_version: HISTORY_SCHEMA_VERSION,
                    started_at_epoch_ms: 1,
                    finished_at_epoch_ms: 2,
                    step: step.to_string(),
                    success: true,
                    message: None,
                },
            )
            .unwrap();
        }
        let text = fs::read_to_string(paths.history_path()).unwrap();
        assert_eq!(text.lines().count(), 2);
        let first: HistoryEntry = serde_json::from_str(text.lines().next().unwrap()).unwrap();
        assert_eq!(first.step, "run");
    }
}
