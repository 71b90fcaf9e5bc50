//! Workspace status summary.
use super::EditContext;
use crate::cli::StatusArgs;
use crate::ledger::Ledger;
use crate::workflow::BatchReport;
use crate::workspace::lm_log::{load_lm_log, LmOutcome};
use crate::workspace::WorkspacePaths;
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Serialize)]
struct StatusSummary {
    workspace: PathBuf,
    config_present: bool,
    classes: Vec<String>,
    instructions: BTreeMap<&'static str, usize>,
    tasks: BTreeMap<&'static str, usize>,
    lm_calls: usize,
    lm_failures: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_run: Option<BatchReport>,
}

pub fn run_status(root: PathBuf, args: StatusArgs) -> Result<()> {
    let ctx = EditContext::load(root)?;
    let summary = summarize(&ctx)?;
    if args.json {
        let text = serde_json::to_string_pretty(&summary).context("serialize status")?;
        println!("{text}");
        return Ok(());
    }
    println!("workspace: {}", summary.workspace.display());
    if !summary.config_present {
        println!("config: missing (run `pedit init`)");
    }
    println!("classes: {}", summary.classes.join(", "));
    println!("instructions: {}", format_counts(&summary.instructions));
    println!("tasks: {}", format_counts(&summary.tasks));
    println!(
        "lm calls: {} ({} failed)",
        summary.lm_calls, summary.lm_failures
    );
    if let Some(report) = summary.last_run.as_ref() {
        println!(
            "last run: answered {}, written back {}, {} failure(s)",
            report.answered,
            report.written_back,
            report.failures.len()
        );
    }
    Ok(())
}

fn summarize(ctx: &EditContext) -> Result<StatusSummary> {
    let lm_log = load_lm_log(&ctx.paths)?;
    let lm_failures = lm_log
        .iter()
        .filter(|entry| entry.outcome == LmOutcome::Failed)
        .count();
    Ok(StatusSummary {
        workspace: ctx.paths.root().to_path_buf(),
        config_present: ctx.paths.config_path().is_file(),
        classes: ctx.store.class_names(),
        instructions: instruction_counts(&ctx.ledger),
        tasks: task_counts(&ctx.ledger),
        lm_calls: lm_log.len(),
        lm_failures,
        last_run: load_report(&ctx.paths)?,
    })
}

fn instruction_counts(ledger: &Ledger) -> BTreeMap<&'static str, usize> {
    let mut counts = BTreeMap::new();
    for instruction in ledger.instructions() {
        *counts.entry(instruction.status()).or_default() += 1;
    }
    counts
}

fn task_counts(ledger: &Ledger) -> BTreeMap<&'static str, usize> {
    let mut counts = BTreeMap::new();
    for task in ledger.tasks() {
        *counts.entry(task.state().as_str()).or_default() += 1;
    }
    counts
}

fn load_report(paths: &WorkspacePaths) -> Result<Option<BatchReport>> {
    let path = paths.report_path();
    if !path.is_file() {
        return Ok(None);
    }
    let bytes = fs::read(&path).with_context(|| format!("read {}", path.display()))?;
    match serde_json::from_slice(&bytes) {
        Ok(report) => Ok(Some(report)),
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "ignoring unreadable report");
            Ok(None)
        }
    }
}

fn format_counts(counts: &BTreeMap<&'static str, usize>) -> String {
    if counts.is_empty() {
        return "none".to_string();
    }
    counts
        .iter()
        .map(|(name, count)| format!("{count} {name}"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::NewInstruction;

    #[test]
    fn counts_group_by_status_and_state() {
        let mut ledger = Ledger::in_memory();
        let id = ledger.insert_instruction(NewInstruction {
            title: "t".to_string(),
            description: "$Title".to_string(),
            target_class: "Article".to_string(),
            ..NewInstruction::default()
        });
        ledger.instruction_mut(id).unwrap().ready_to_process = true;
        ledger.upsert_task(id, 1, false).unwrap();
        let (started, _) = ledger.upsert_task(id, 2, false).unwrap();
        ledger.task_mut(started).unwrap().begin(String::new()).unwrap();

        assert_eq!(instruction_counts(&ledger).get("ready"), Some(&1));
        let tasks = task_counts(&ledger);
        assert_eq!(tasks.get("pending"), Some(&1));
        assert_eq!(tasks.get("started"), Some(&1));
        assert_eq!(format_counts(&tasks), "1 pending, 1 started");
    }
}
