//! Typed failure categories for the editing workflow.
//!
//! Plumbing errors (I/O, JSON) travel as plain `anyhow` errors with context.
//! The variants here are the ones callers branch on, so they are raised as
//! `WorkflowError` and recovered with `anyhow::Error::downcast_ref`.
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkflowError {
    /// No usable gateway credentials, command, or model could be resolved.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An instruction references a class or field the store does not know.
    #[error("validation error: {0}")]
    Validation(String),

    /// Template syntax could not be parsed.
    #[error("template error at byte {offset}: {message}")]
    Template { offset: usize, message: String },

    /// The prompt gateway call failed or timed out.
    #[error("provider error: {0}")]
    Provider(String),

    /// The target record disappeared out from under a task.
    #[error("record {class}#{id} not found")]
    RecordNotFound { class: String, id: u64 },

    /// A state-machine move that the current state does not allow.
    #[error("invalid transition for {entity}: {message}")]
    InvalidTransition { entity: String, message: String },
}

impl WorkflowError {
    pub fn invalid_task(task_id: u64, message: impl Into<String>) -> Self {
        WorkflowError::InvalidTransition {
            entity: format!("task {task_id}"),
            message: message.into(),
        }
    }

    pub fn invalid_instruction(instruction_id: u64, message: impl Into<String>) -> Self {
        WorkflowError::InvalidTransition {
            entity: format!("instruction {instruction_id}"),
            message: message.into(),
        }
    }
}

/// Return the workflow category of an error chain, if it carries one.
pub fn workflow_error(err: &anyhow::Error) -> Option<&WorkflowError> {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<WorkflowError>())
}

/// True when the error chain bottoms out in a missing record.
pub fn is_record_not_found(err: &anyhow::Error) -> bool {
    matches!(
        workflow_error(err),
        Some(WorkflowError::RecordNotFound { .. })
    )
}
