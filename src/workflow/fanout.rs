//! Instruction fanout and completion tracking.
use crate::ledger::{InstructionId, Ledger};
use crate::store::ContentStore;
use anyhow::Result;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub created: usize,
    pub purged: usize,
    /// Set when this call moved the instruction to completed.
    pub completed: bool,
}

/// Bring an instruction's task set in line with its flags.
///
/// A ready instruction gets one task per record of its target class; tasks
/// that already exist are left untouched. A cancelled instruction loses all
/// of its tasks. Completion is evaluated last. The caller checkpoints.
pub fn reconcile<S: ContentStore + ?Sized>(
    ledger: &mut Ledger,
    store: &S,
    instruction_id: InstructionId,
) -> Result<ReconcileOutcome> {
    let instruction = ledger.instruction(instruction_id)?.clone();
    let mut outcome = ReconcileOutcome::default();
    if instruction.cancelled {
        outcome.purged = purge(ledger, instruction_id)?;
        return Ok(outcome);
    }
    if instruction.completed {
        return Ok(outcome);
    }
    if instruction.ready_to_process {
        for record_id in store.list_identifiers(&instruction.target_class)? {
            let (_, created) = ledger.upsert_task(instruction_id, record_id, false)?;
            if created {
                outcome.created += 1;
            }
        }
        if outcome.created > 0 {
            tracing::info!(
                instruction_id,
                created = outcome.created,
                "fanout created tasks"
            );
        }
    }

    let whole_record = instruction.target_field().is_none();
    let settled = {
        let real_tasks: Vec<_> = ledger
            .tasks_for(instruction_id)
            .filter(|task| !task.is_test)
            .collect();
        !real_tasks.is_empty()
            && real_tasks
                .iter()
                .all(|task| task.is_terminal() || (whole_record && task.accepted))
    };
    if settled {
        ledger.instruction_mut(instruction_id)?.completed = true;
        outcome.completed = true;
        tracing::info!(instruction_id, "instruction completed");
    }
    Ok(outcome)
}

/// Delete every task of a cancelled instruction and clear its ready flag.
pub fn purge(ledger: &mut Ledger, instruction_id: InstructionId) -> Result<usize> {
    ledger.instruction_mut(instruction_id)?.ready_to_process = false;
    let purged = ledger.remove_tasks_where(|task| task.instruction_id == instruction_id);
    if purged > 0 {
        tracing::info!(instruction_id, purged, "purged tasks");
    }
    Ok(purged)
}
