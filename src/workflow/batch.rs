//! One end-to-end sweep over the ledger.
//!
//! Phases run in a fixed order and each finishes its whole selection before
//! the next starts: reconcile, answer, write back, purge, reconcile again.
use super::context::RunContext;
use super::fanout::{purge, reconcile};
use super::process::{process_task, ProcessOutcome};
use super::write_back::{write_back, WriteBackOutcome};
use crate::error::{workflow_error, WorkflowError};
use crate::gateway::PromptGateway;
use crate::ledger::{InstructionId, Ledger, TaskId};
use crate::store::ContentStore;
use crate::util::now_epoch_ms;
use anyhow::Result;
use serde::{Deserialize, Serialize};

pub const BATCH_REPORT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFailure {
    /// Unset for failures that concern the whole instruction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
    pub instruction_id: InstructionId,
    pub phase: String,
    pub error: String,
}

/// Counts per phase, persisted as `edit/report.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub schema_version: u32,
    pub started_at_epoch_ms: u64,
    pub finished_at_epoch_ms: u64,
    pub reconciled: usize,
    pub created: usize,
    pub answered: usize,
    /// Tasks deleted because their instruction or record went away.
    pub removed: usize,
    /// Tasks skipped after reaching the attempt limit.
    pub exhausted: usize,
    pub written_back: usize,
    pub purged: usize,
    pub completed_instructions: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<TaskFailure>,
}

impl BatchReport {
    /// True when work was attempted and none of it succeeded.
    pub fn all_failed(&self) -> bool {
        !self.failures.is_empty() && self.answered == 0 && self.written_back == 0
    }
}

/// Run one batch sweep.
///
/// `connect` builds the gateway and is only called when there are tasks to
/// send, so reconciliation and write-back work without a configured LM.
/// Configuration errors abort the run. Any other error is recorded in the
/// report against its task, or its instruction when reconciling, and the
/// sweep continues.
pub fn run_batch<S, G, F>(
    ledger: &mut Ledger,
    store: &mut S,
    connect: F,
    ctx: &mut RunContext,
) -> Result<BatchReport>
where
    S: ContentStore + ?Sized,
    G: PromptGateway,
    F: FnOnce() -> Result<G>,
{
    let mut report = BatchReport {
        schema_version: BATCH_REPORT_SCHEMA_VERSION,
        started_at_epoch_ms: now_epoch_ms(),
        ..BatchReport::default()
    };

    reconcile_open(ledger, &*store, &mut report, true);
    ledger.checkpoint()?;

    let pending = sendable_tasks(ledger, ctx.max_attempts(), &mut report);
    if !pending.is_empty() {
        let gateway = connect()?;
        for task_id in pending {
            let instruction_id = ledger.task(task_id)?.instruction_id;
            match process_task(ledger, &*store, &gateway, ctx, task_id) {
                Ok(ProcessOutcome::Answered(_)) => report.answered += 1,
                Ok(ProcessOutcome::Removed) => report.removed += 1,
                Err(err) if is_configuration(&err) => return Err(err),
                Err(err) => {
                    record_failure(&mut report, Some(task_id), instruction_id, "answer", &err)
                }
            }
        }
    }

    for task_id in writable_tasks(ledger) {
        let instruction_id = ledger.task(task_id)?.instruction_id;
        match write_back(ledger, store, ctx, task_id) {
            Ok(WriteBackOutcome::Written { .. }) => report.written_back += 1,
            Ok(WriteBackOutcome::Removed) => report.removed += 1,
            Err(err) => {
                record_failure(&mut report, Some(task_id), instruction_id, "write_back", &err)
            }
        }
    }

    let cancelled: Vec<InstructionId> = ledger
        .instructions()
        .filter(|instruction| instruction.cancelled)
        .map(|instruction| instruction.id)
        .collect();
    for instruction_id in cancelled {
        report.purged += purge(ledger, instruction_id)?;
    }
    ledger.checkpoint()?;

    reconcile_open(ledger, &*store, &mut report, false);
    ledger.checkpoint()?;

    report.finished_at_epoch_ms = now_epoch_ms();
    tracing::info!(
        reconciled = report.reconciled,
        created = report.created,
        answered = report.answered,
        written_back = report.written_back,
        purged = report.purged,
        failures = report.failures.len(),
        "batch complete"
    );
    Ok(report)
}

/// Reconcile every open instruction; one failing instruction is reported
/// and skipped.
fn reconcile_open<S: ContentStore + ?Sized>(
    ledger: &mut Ledger,
    store: &S,
    report: &mut BatchReport,
    count_reconciled: bool,
) {
    for instruction_id in open_instructions(ledger) {
        match reconcile(ledger, store, instruction_id) {
            Ok(outcome) => {
                report.reconciled += usize::from(count_reconciled);
                report.created += outcome.created;
                report.completed_instructions += usize::from(outcome.completed);
            }
            Err(err) => record_failure(report, None, instruction_id, "reconcile", &err),
        }
    }
}

fn open_instructions(ledger: &Ledger) -> Vec<InstructionId> {
    ledger
        .instructions()
        .filter(|instruction| instruction.can_progress())
        .map(|instruction| instruction.id)
        .collect()
}

/// Unanswered real tasks of ready instructions still under the attempt cap.
fn sendable_tasks(ledger: &Ledger, max_attempts: u32, report: &mut BatchReport) -> Vec<TaskId> {
    let mut selected = Vec::new();
    for task in ledger.tasks() {
        if task.is_test || task.completed {
            continue;
        }
        let ready = ledger
            .instruction(task.instruction_id)
            .is_ok_and(|instruction| instruction.ready_to_process && instruction.can_progress());
        if !ready {
            continue;
        }
        if task.attempts >= max_attempts {
            tracing::debug!(task_id = task.id, attempts = task.attempts, "attempt limit reached");
            report.exhausted += 1;
            continue;
        }
        selected.push(task.id);
    }
    selected
}

/// Accepted tasks with a target field that have not been applied yet.
fn writable_tasks(ledger: &Ledger) -> Vec<TaskId> {
    ledger
        .tasks()
        .filter(|task| task.awaits_write_back())
        .filter(|task| {
            ledger
                .instruction(task.instruction_id)
                .is_ok_and(|instruction| instruction.target_field().is_some())
        })
        .map(|task| task.id)
        .collect()
}

fn is_configuration(err: &anyhow::Error) -> bool {
    matches!(workflow_error(err), Some(WorkflowError::Configuration(_)))
}

fn record_failure(
    report: &mut BatchReport,
    task_id: Option<TaskId>,
    instruction_id: InstructionId,
    phase: &str,
    err: &anyhow::Error,
) {
    tracing::warn!(
        task_id,
        instruction_id,
        phase,
        error = %format!("{err:#}"),
        "batch step failed"
    );
    report.failures.push(TaskFailure {
        task_id,
        instruction_id,
        phase: phase.to_string(),
        error: format!("{err:#}"),
    });
}

#[cfg(test)]
#[path = "batch_tests.rs"]
mod tests;
