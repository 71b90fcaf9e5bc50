//! Pending → Started → Answered for a single task.
use super::context::RunContext;
use crate::codec::native_to_human;
use crate::codec::relation::{self, Candidate};
use crate::error::{is_record_not_found, workflow_error, WorkflowError};
use crate::gateway::PromptGateway;
use crate::ledger::{InstructionId, Ledger, TaskId};
use crate::prompt::{compose, hydrate};
use crate::schema::{FieldKind, Record, RecordId};
use crate::store::ContentStore;
use anyhow::Result;
use std::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The gateway answered; the raw answer is stored on the task.
    Answered(String),
    /// The task could no longer be serviced and was deleted.
    Removed,
}

/// Send one task's prompt and record the answer.
///
/// Tasks of cancelled or completed instructions, and tasks whose record is
/// gone, are deleted instead of sent. The task is checkpointed as started
/// before the gateway call. A gateway error is recorded on the task and
/// returned; a configuration error instead restores the task as it was.
pub fn process_task<S, G>(
    ledger: &mut Ledger,
    store: &S,
    gateway: &G,
    ctx: &mut RunContext,
    task_id: TaskId,
) -> Result<ProcessOutcome>
where
    S: ContentStore + ?Sized,
    G: PromptGateway + ?Sized,
{
    let task = ledger.task(task_id)?.clone();
    let instruction = ledger.instruction(task.instruction_id)?.clone();
    if !instruction.can_progress() {
        tracing::info!(
            task_id,
            instruction_id = instruction.id,
            status = instruction.status(),
            "removing task of an instruction that can no longer progress"
        );
        return remove(ledger, task_id);
    }
    if task.completed {
        return Err(WorkflowError::invalid_task(task_id, "already answered").into());
    }

    let class = instruction.target_class.as_str();
    let Some(record) = store.load(class, task.record_id)? else {
        return remove_missing(ledger, task_id, class, task.record_id);
    };
    let kind = instruction
        .target_field()
        .map(|field| record.schema().require_field(field).cloned())
        .transpose()?;
    let candidates: Option<Vec<Candidate>> = match kind.as_ref().and_then(FieldKind::related_class) {
        Some(related) => Some(ctx.candidates(store, related)?.to_vec()),
        None => None,
    };
    let before = snapshot(&record, instruction.target_field(), candidates.as_deref())?;
    let hydrated = match hydrate(
        store,
        &instruction.description,
        class,
        task.record_id,
        candidates.as_deref(),
    ) {
        Ok(hydrated) => hydrated,
        Err(err) if is_record_not_found(&err) => {
            return remove_missing(ledger, task_id, class, task.record_id);
        }
        Err(err) => return Err(err),
    };
    let prompt = compose(&hydrated, kind.as_ref());

    ledger.task_mut(task_id)?.begin(before)?;
    ledger.checkpoint()?;

    let _span = tracing::info_span!("task", task_id, instruction_id = instruction.id).entered();
    let start = Instant::now();
    match gateway.ask(&prompt, ctx.model()) {
        Ok(answer) => {
            tracing::info!(
                task_id,
                instruction_id = instruction.id,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "task answered"
            );
            ledger.task_mut(task_id)?.record_answer(answer.clone())?;
            ledger.checkpoint()?;
            Ok(ProcessOutcome::Answered(answer))
        }
        Err(err) if matches!(workflow_error(&err), Some(WorkflowError::Configuration(_))) => {
            *ledger.task_mut(task_id)? = task;
            ledger.checkpoint()?;
            Err(err)
        }
        Err(err) => {
            tracing::warn!(
                task_id,
                instruction_id = instruction.id,
                error = %format!("{err:#}"),
                "task failed"
            );
            ledger.task_mut(task_id)?.record_failure(format!("{err:#}"))?;
            ledger.checkpoint()?;
            Err(err)
        }
    }
}

/// Run an instruction once against one record as a test task.
///
/// Works for draft instructions. A previous test task for the same record is
/// replaced. Returns the test task id and the raw answer.
pub fn run_test_task<S, G>(
    ledger: &mut Ledger,
    store: &S,
    gateway: &G,
    ctx: &mut RunContext,
    instruction_id: InstructionId,
    record_id: RecordId,
) -> Result<(TaskId, String)>
where
    S: ContentStore + ?Sized,
    G: PromptGateway + ?Sized,
{
    let instruction = ledger.instruction(instruction_id)?;
    if !instruction.can_progress() {
        return Err(WorkflowError::invalid_instruction(
            instruction_id,
            format!("cannot test a {} instruction", instruction.status()),
        )
        .into());
    }
    let class = instruction.target_class.clone();
    if store.load(&class, record_id)?.is_none() {
        return Err(WorkflowError::RecordNotFound {
            class,
            id: record_id,
        }
        .into());
    }
    if let Some(previous) = ledger.find_task(instruction_id, record_id, true) {
        ledger.remove_task(previous);
    }
    let (task_id, _) = ledger.upsert_task(instruction_id, record_id, true)?;
    ledger.checkpoint()?;
    match process_task(ledger, store, gateway, ctx, task_id)? {
        ProcessOutcome::Answered(answer) => Ok((task_id, answer)),
        ProcessOutcome::Removed => Err(WorkflowError::invalid_task(
            task_id,
            "test task was removed before it could run",
        )
        .into()),
    }
}

/// Text form of the target field's current value.
///
/// Whole-record instructions snapshot the record title.
fn snapshot(record: &Record, field: Option<&str>, candidates: Option<&[Candidate]>) -> Result<String> {
    let Some(field) = field else {
        return Ok(record.title());
    };
    let value = record.get(field)?;
    Ok(match candidates {
        Some(candidates) => relation::describe(value, candidates),
        None => native_to_human(value),
    })
}

fn remove(ledger: &mut Ledger, task_id: TaskId) -> Result<ProcessOutcome> {
    ledger.remove_task(task_id);
    ledger.checkpoint()?;
    Ok(ProcessOutcome::Removed)
}

fn remove_missing(
    ledger: &mut Ledger,
    task_id: TaskId,
    class: &str,
    record_id: RecordId,
) -> Result<ProcessOutcome> {
    tracing::warn!(task_id, class, record_id, "record not found; removing task");
    remove(ledger, task_id)
}

#[cfg(test)]
#[path = "process_tests.rs"]
mod tests;
