//! Apply accepted answers to the original records.
use super::context::RunContext;
use crate::codec::{human_to_native, relation};
use crate::error::{workflow_error, WorkflowError};
use crate::ledger::{Ledger, TaskId};
use crate::schema::{FieldKind, NativeValue};
use crate::store::ContentStore;
use anyhow::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteBackOutcome {
    Written { republished: bool },
    /// The record no longer exists; the task was deleted.
    Removed,
}

/// Decode an accepted answer into the target field and save the record.
///
/// Only tasks that are accepted, not yet written back, and not test runs
/// qualify. A record that was published with no unsaved draft changes is
/// published again after the save; a dirty draft is saved but left
/// unpublished. An answer that does not decode for the field is recorded
/// on the task, which then shows as failed until it is rejected.
pub fn write_back<S: ContentStore + ?Sized>(
    ledger: &mut Ledger,
    store: &mut S,
    ctx: &mut RunContext,
    task_id: TaskId,
) -> Result<WriteBackOutcome> {
    let task = ledger.task(task_id)?.clone();
    if !task.awaits_write_back() {
        return Err(WorkflowError::invalid_task(
            task_id,
            format!("cannot write back in state {}", task.state()),
        )
        .into());
    }
    let instruction = ledger.instruction(task.instruction_id)?.clone();
    let Some(field) = instruction.target_field() else {
        return Err(WorkflowError::invalid_task(
            task_id,
            "whole-record instructions have no field to write",
        )
        .into());
    };
    let class = instruction.target_class.as_str();
    let Some(mut record) = store.load(class, task.record_id)? else {
        tracing::warn!(task_id, class, record_id = task.record_id, "record not found; removing task");
        ledger.remove_task(task_id);
        ledger.checkpoint()?;
        return Ok(WriteBackOutcome::Removed);
    };

    let published = store.is_published(&record)?;
    let dirty = store.has_unsaved_draft_changes(&record)?.unwrap_or(false);
    let republish = published && !dirty;

    let kind = record.schema().require_field(field)?.clone();
    let answer = task.after.as_deref().unwrap_or_default();
    let applied =
        decode_answer(&*store, ctx, &kind, answer).and_then(|value| record.set(field, value));
    if let Err(err) = applied {
        if matches!(workflow_error(&err), Some(WorkflowError::Validation(_))) {
            tracing::warn!(task_id, error = %format!("{err:#}"), "answer cannot be written back");
            ledger
                .task_mut(task_id)?
                .record_write_back_failure(format!("{err:#}"))?;
            ledger.checkpoint()?;
        }
        return Err(err);
    }
    store.save(&record)?;
    if republish {
        store.publish(&record)?;
    }
    ctx.invalidate(class);

    ledger.task_mut(task_id)?.mark_written_back()?;
    ledger.checkpoint()?;
    tracing::info!(
        task_id,
        instruction_id = instruction.id,
        record_id = task.record_id,
        republished = republish,
        "answer written back"
    );
    Ok(WriteBackOutcome::Written {
        republished: republish,
    })
}

fn decode_answer<S: ContentStore + ?Sized>(
    store: &S,
    ctx: &mut RunContext,
    kind: &FieldKind,
    answer: &str,
) -> Result<NativeValue> {
    match kind.related_class() {
        Some(related) => relation::decode(kind, answer, ctx.candidates(store, related)?),
        None => human_to_native(kind, answer),
    }
}

#[cfg(test)]
#[path = "write_back_tests.rs"]
mod tests;
