use crate::error::WorkflowError;
use crate::ledger::{Decision, Ledger, TaskId};
use anyhow::Result;

/// Record a human accept/reject verdict on an answered task.
pub fn review(ledger: &mut Ledger, task_id: TaskId, decision: Decision) -> Result<()> {
    let instruction_id = ledger.task(task_id)?.instruction_id;
    let instruction = ledger.instruction(instruction_id)?;
    if !instruction.can_progress() {
        return Err(WorkflowError::invalid_instruction(
            instruction_id,
            format!("cannot review tasks of a {} instruction", instruction.status()),
        )
        .into());
    }
    ledger.task_mut(task_id)?.review(decision)?;
    ledger.checkpoint()?;
    tracing::info!(task_id, instruction_id, ?decision, "task reviewed");
    Ok(())
}
