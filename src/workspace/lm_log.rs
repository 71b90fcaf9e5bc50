//! Per-call LM audit log.
//!
//! Every gateway call is appended to `edit/lm_log.jsonl` as one JSON line:
//!
//! ```jsonl
//! {"schema_version":1,"ts":1707900000000,"call":1,"duration_ms":4200,"outcome":"success",...}
//! ```
use super::WorkspacePaths;
use crate::util::{now_epoch_ms, truncate_string};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::time::Instant;

pub const LM_LOG_SCHEMA_VERSION: u32 = 1;

const PROMPT_PREVIEW_BYTES: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LmOutcome {
    Success,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LmLogEntry {
    pub schema_version: u32,
    /// Epoch milliseconds when the entry was finished.
    pub ts: u64,
    /// Call number within one process (1-indexed).
    pub call: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub duration_ms: u64,
    pub outcome: LmOutcome,
    /// Truncated answer on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_preview: Option<String>,
}

/// Times one call and produces its log entry.
pub struct LmLogBuilder {
    start: Instant,
    call: u32,
    model: Option<String>,
    prompt_preview: Option<String>,
}

impl LmLogBuilder {
    pub fn new(call: u32, model: Option<&str>) -> Self {
        Self {
            start: Instant::now(),
            call,
            model: model.map(str::to_string),
            prompt_preview: None,
        }
    }

    pub fn with_prompt_preview(mut self, prompt: &str) -> Self {
        self.prompt_preview = Some(truncate_string(prompt, PROMPT_PREVIEW_BYTES));
        self
    }

    pub fn success(self, summary: impl Into<String>) -> LmLogEntry {
        self.build(LmOutcome::Success, Some(summary.into()), None)
    }

    pub fn failed(self, error: impl Into<String>) -> LmLogEntry {
        self.build(LmOutcome::Failed, None, Some(error.into()))
    }

    fn build(self, outcome: LmOutcome, summary: Option<String>, error: Option<String>) -> LmLogEntry {
        LmLogEntry {
            schema_version: LM_LOG_SCHEMA_VERSION,
            ts: now_epoch_ms(),
            call: self.call,
            model: self.model,
            duration_ms: self.start.elapsed().as_millis() as u64,
            outcome,
            summary,
            error,
            prompt_preview: self.prompt_preview,
        }
    }
}

/// Append an LM log entry to the log file.
pub fn append_lm_log(paths: &WorkspacePaths, entry: &LmLogEntry) -> Result<()> {
    let log_path = paths.lm_log_path();
    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent).context("create edit directory for lm_log")?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("open lm_log for append: {}", log_path.display()))?;
    let line = serde_json::to_string(entry).context("serialize lm_log entry")?;
    writeln!(file, "{}", line).context("write lm_log entry")?;
    Ok(())
}

/// Load all entries, skipping corrupt lines.
pub fn load_lm_log(paths: &WorkspacePaths) -> Result<Vec<LmLogEntry>> {
    let log_path = paths.lm_log_path();
    if !log_path.exists() {
        return Ok(Vec::new());
    }
    let file =
        File::open(&log_path).with_context(|| format!("open lm_log: {}", log_path.display()))?;
    let mut entries = Vec::new();
    for (line_num, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("read line {} of lm_log", line_num + 1))?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<LmLogEntry>(&line) {
            Ok(entry) => entries.push(entry),
            Err(err) => {
                tracing::warn!(line = line_num + 1, error = %err, "skip corrupt lm_log entry");
            }
        }
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_and_load_skip_corrupt_lines() {
        let temp = tempfile::tempdir().unwrap();
        let paths = WorkspacePaths::new(temp.path().to_path_buf());

        let first = LmLogBuilder::new(1, Some("small"))
            .with_prompt_preview("Summarise Hello World")
            .success("Five word summary here");
        append_lm_log(&paths, &first).unwrap();
        fs::OpenOptions::new()
            .append(true)
            .open(paths.lm_log_path())
            .unwrap()
            .write_all(b"{not json\n")
            .unwrap();
        let second = LmLogBuilder::new(2, None).failed("timed out");
        append_lm_log(&paths, &second).unwrap();

        let entries = load_lm_log(&paths).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].outcome, LmOutcome::Success);
        assert_eq!(entries[0].model.as_deref(), Some("small"));
        assert_eq!(entries[1].call, 2);
        assert_eq!(entries[1].error.as_deref(), Some("timed out"));
    }

    #[test]
    fn long_prompts_are_previewed() {
        let prompt = "x".repeat(2000);
        let entry = LmLogBuilder::new(1, None)
            .with_prompt_preview(&prompt)
            .success("ok");
        let preview = entry.prompt_preview.unwrap();
        assert!(preview.len() < 600);
        assert!(preview.ends_with("..."));
    }

    #[test]
    fn missing_log_is_empty() {
        let temp = tempfile::tempdir().unwrap();
        let paths = WorkspacePaths::new(temp.path().to_path_buf());
        assert!(load_lm_log(&paths).unwrap().is_empty());
    }
}
