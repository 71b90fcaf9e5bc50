//! Edit workspace layout.
//!
//! A workspace holds the content store under `records/` and all workflow
//! artifacts under `edit/`. Centralizing path construction keeps file access
//! consistent across commands.
use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};

pub mod config;
pub mod history;
pub mod lm_log;

/// Typed paths into a workspace.
#[derive(Debug, Clone)]
pub struct WorkspacePaths {
    root: PathBuf,
}

impl WorkspacePaths {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Return the `records/` directory holding one JSON file per class.
    pub fn records_dir(&self) -> PathBuf {
        self.root.join("records")
    }

    /// Return the `edit/` directory path.
    pub fn edit_dir(&self) -> PathBuf {
        self.root.join("edit")
    }

    /// Return the `edit/config.json` path.
    pub fn config_path(&self) -> PathBuf {
        self.edit_dir().join("config.json")
    }

    /// Return the `edit/instructions.json` path.
    pub fn instructions_path(&self) -> PathBuf {
        self.edit_dir().join("instructions.json")
    }

    /// Return the `edit/tasks.json` path.
    pub fn tasks_path(&self) -> PathBuf {
        self.edit_dir().join("tasks.json")
    }

    /// Return the `edit/report.json` path.
    pub fn report_path(&self) -> PathBuf {
        self.edit_dir().join("report.json")
    }

    /// Return the `edit/history.jsonl` path.
    pub fn history_path(&self) -> PathBuf {
        self.edit_dir().join("history.jsonl")
    }

    /// Return the `edit/lm_log.jsonl` path.
    pub fn lm_log_path(&self) -> PathBuf {
        self.edit_dir().join("lm_log.jsonl")
    }
}

/// Resolve the workspace root: explicit flag, else the per-user data dir.
pub fn resolve_root(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    let data_dir = dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .ok_or_else(|| anyhow!("cannot determine home directory; pass --workspace"))?;
    Ok(data_dir.join("pedit"))
}
