//! Operator-facing instruction lifecycle: create, edit, ready, cancel, delete.
use super::fanout::{purge, reconcile, ReconcileOutcome};
use crate::error::WorkflowError;
use crate::ledger::{Instruction, InstructionId, Ledger, NewInstruction};
use crate::prompt::RESERVED_PLACEHOLDERS;
use crate::store::ContentStore;
use crate::template::Template;
use anyhow::Result;

/// Partial update; `None` leaves the attribute unchanged.
#[derive(Debug, Clone, Default)]
pub struct InstructionEdit {
    pub title: Option<String>,
    pub description: Option<String>,
    pub target_class: Option<String>,
    pub target_field: Option<String>,
    pub author: Option<String>,
}

impl InstructionEdit {
    fn retargets(&self, current: &Instruction) -> bool {
        let class_changed = self
            .target_class
            .as_deref()
            .is_some_and(|class| class != current.target_class);
        let field_changed = self
            .target_field
            .as_deref()
            .is_some_and(|field| field.trim() != current.target_field.trim());
        class_changed || field_changed
    }
}

/// Validate and store a new draft instruction.
pub fn create<S: ContentStore + ?Sized>(
    ledger: &mut Ledger,
    store: &S,
    draft: NewInstruction,
) -> Result<InstructionId> {
    validate(
        store,
        &draft.title,
        &draft.description,
        &draft.target_class,
        &draft.target_field,
    )?;
    let id = ledger.insert_instruction(draft);
    ledger.checkpoint()?;
    tracing::info!(instruction_id = id, "instruction created");
    Ok(id)
}

/// Apply `changes` to a non-completed instruction.
///
/// Retargeting is refused once tasks exist. A ready instruction is
/// reconciled after the edit.
pub fn edit<S: ContentStore + ?Sized>(
    ledger: &mut Ledger,
    store: &S,
    id: InstructionId,
    changes: InstructionEdit,
) -> Result<ReconcileOutcome> {
    let current = ledger.instruction(id)?.clone();
    if current.completed {
        return Err(WorkflowError::invalid_instruction(id, "completed instructions are immutable").into());
    }
    if changes.retargets(&current) && ledger.tasks_for(id).next().is_some() {
        return Err(WorkflowError::invalid_instruction(
            id,
            "target class or field cannot change once tasks exist",
        )
        .into());
    }
    let mut updated = current;
    if let Some(title) = changes.title {
        updated.title = title;
    }
    if let Some(description) = changes.description {
        updated.description = description;
    }
    if let Some(target_class) = changes.target_class {
        updated.target_class = target_class;
    }
    if let Some(target_field) = changes.target_field {
        updated.target_field = target_field.trim().to_string();
    }
    if let Some(author) = changes.author {
        updated.author = Some(author);
    }
    validate(
        store,
        &updated.title,
        &updated.description,
        &updated.target_class,
        &updated.target_field,
    )?;
    *ledger.instruction_mut(id)? = updated;
    let outcome = reconcile(ledger, store, id)?;
    ledger.checkpoint()?;
    tracing::info!(instruction_id = id, "instruction edited");
    Ok(outcome)
}

/// Move a draft instruction to ready and fan it out.
pub fn mark_ready<S: ContentStore + ?Sized>(
    ledger: &mut Ledger,
    store: &S,
    id: InstructionId,
) -> Result<ReconcileOutcome> {
    let instruction = ledger.instruction(id)?.clone();
    if !instruction.can_progress() {
        return Err(WorkflowError::invalid_instruction(
            id,
            format!("cannot mark a {} instruction ready", instruction.status()),
        )
        .into());
    }
    validate(
        store,
        &instruction.title,
        &instruction.description,
        &instruction.target_class,
        &instruction.target_field,
    )?;
    ledger.instruction_mut(id)?.ready_to_process = true;
    let outcome = reconcile(ledger, store, id)?;
    ledger.checkpoint()?;
    tracing::info!(instruction_id = id, created = outcome.created, "instruction ready");
    Ok(outcome)
}

/// Cancel a non-completed instruction and delete all of its tasks.
pub fn cancel(ledger: &mut Ledger, id: InstructionId) -> Result<usize> {
    let instruction = ledger.instruction_mut(id)?;
    if instruction.completed {
        return Err(WorkflowError::invalid_instruction(id, "completed instructions cannot be cancelled").into());
    }
    instruction.cancelled = true;
    let purged = purge(ledger, id)?;
    ledger.checkpoint()?;
    tracing::info!(instruction_id = id, purged, "instruction cancelled");
    Ok(purged)
}

/// Remove an instruction and its tasks from the ledger.
pub fn delete(ledger: &mut Ledger, id: InstructionId) -> Result<usize> {
    let removed = ledger.remove_instruction(id)?;
    ledger.checkpoint()?;
    tracing::info!(instruction_id = id, removed_tasks = removed, "instruction deleted");
    Ok(removed)
}

fn validate<S: ContentStore + ?Sized>(
    store: &S,
    title: &str,
    description: &str,
    target_class: &str,
    target_field: &str,
) -> Result<()> {
    if title.trim().is_empty() {
        return Err(WorkflowError::Validation("instruction title is empty".to_string()).into());
    }
    let schema = store.schema(target_class).ok_or_else(|| {
        WorkflowError::Validation(format!("unknown target class {target_class:?}"))
    })?;
    let field = target_field.trim();
    if !field.is_empty() {
        schema.require_field(field)?;
    }
    Template::parse(description)?.check(store, schema, RESERVED_PLACEHOLDERS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::workflow_error;
    use crate::test_support::sample_store;

    fn draft(field: &str, description: &str) -> NewInstruction {
        NewInstruction {
            title: "Summaries".to_string(),
            description: description.to_string(),
            target_class: "Article".to_string(),
            target_field: field.to_string(),
            author: Some("editor".to_string()),
        }
    }

    fn is_validation(err: &anyhow::Error) -> bool {
        matches!(
            workflow_error(err),
            Some(WorkflowError::Validation(_)) | Some(WorkflowError::Template { .. })
        )
    }

    #[test]
    fn create_rejects_unknown_targets_and_placeholders() {
        let store = sample_store();
        let mut ledger = Ledger::in_memory();

        let mut unknown_class = draft("Summary", "$Title");
        unknown_class.target_class = "Page".to_string();
        assert!(is_validation(&create(&mut ledger, &store, unknown_class).unwrap_err()));
        assert!(is_validation(
            &create(&mut ledger, &store, draft("Subtitle", "$Title")).unwrap_err()
        ));
        assert!(is_validation(
            &create(&mut ledger, &store, draft("Summary", "$Headline")).unwrap_err()
        ));
        assert!(is_validation(
            &create(&mut ledger, &store, draft("Summary", "<% if $Title %>open")).unwrap_err()
        ));
        assert_eq!(ledger.instructions().count(), 0);

        let id = create(
            &mut ledger,
            &store,
            draft("Author", "Pick an author for $Title:\n$CandidateList"),
        )
        .unwrap();
        assert_eq!(ledger.instruction(id).unwrap().status(), "draft");
        assert_eq!(ledger.tasks().count(), 0);
    }

    #[test]
    fn ready_fans_out_and_cancel_cascades() {
        let store = sample_store();
        let mut ledger = Ledger::in_memory();
        let id = create(&mut ledger, &store, draft("Summary", "Summarise $Title")).unwrap();

        let outcome = mark_ready(&mut ledger, &store, id).unwrap();
        assert_eq!(outcome.created, 3);
        assert!(ledger.instruction(id).unwrap().ready_to_process);

        assert_eq!(cancel(&mut ledger, id).unwrap(), 3);
        let instruction = ledger.instruction(id).unwrap();
        assert!(instruction.cancelled && !instruction.ready_to_process);
        assert_eq!(ledger.tasks_for(id).count(), 0);
        assert!(mark_ready(&mut ledger, &store, id).is_err());
    }

    #[test]
    fn completed_instructions_are_immutable() {
        let store = sample_store();
        let mut ledger = Ledger::in_memory();
        let id = create(&mut ledger, &store, draft("Summary", "Summarise $Title")).unwrap();
        ledger.instruction_mut(id).unwrap().completed = true;

        let err = edit(
            &mut ledger,
            &store,
            id,
            InstructionEdit {
                title: Some("Renamed".to_string()),
                ..InstructionEdit::default()
            },
        )
        .unwrap_err();
        assert!(matches!(
            workflow_error(&err),
            Some(WorkflowError::InvalidTransition { .. })
        ));
        assert!(cancel(&mut ledger, id).is_err());
        let instruction = ledger.instruction(id).unwrap();
        assert!(!instruction.cancelled);
        assert_eq!(instruction.title, "Summaries");
    }

    #[test]
    fn retargeting_is_refused_once_tasks_exist() {
        let store = sample_store();
        let mut ledger = Ledger::in_memory();
        let id = create(&mut ledger, &store, draft("Summary", "Summarise $Title")).unwrap();

        edit(
            &mut ledger,
            &store,
            id,
            InstructionEdit {
                target_field: Some("Body".to_string()),
                ..InstructionEdit::default()
            },
        )
        .unwrap();
        mark_ready(&mut ledger, &store, id).unwrap();

        let retarget = InstructionEdit {
            target_field: Some("Summary".to_string()),
            ..InstructionEdit::default()
        };
        assert!(edit(&mut ledger, &store, id, retarget).is_err());

        let reword = InstructionEdit {
            description: Some("Rewrite the body of $Title".to_string()),
            ..InstructionEdit::default()
        };
        let outcome = edit(&mut ledger, &store, id, reword).unwrap();
        assert_eq!(outcome.created, 0);
        assert_eq!(ledger.tasks_for(id).count(), 3);
    }

    #[test]
    fn delete_removes_instruction_and_tasks() {
        let store = sample_store();
        let mut ledger = Ledger::in_memory();
        let id = create(&mut ledger, &store, draft("Summary", "$Title")).unwrap();
        mark_ready(&mut ledger, &store, id).unwrap();
        assert_eq!(delete(&mut ledger, id).unwrap(), 3);
        assert!(ledger.instruction(id).is_err());
        assert_eq!(ledger.tasks().count(), 0);
    }
}
