//! Instruction and task records plus the task state machine.
//!
//! Task state is stored as the flag set operators see in the JSON files;
//! [`TaskState`] is derived from the flags and every mutation goes through a
//! transition method that checks the flags it depends on.
use crate::error::WorkflowError;
use crate::schema::RecordId;
use crate::util::now_epoch_ms;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

pub type InstructionId = u64;
pub type TaskId = u64;

/// An editing intent applied to every record of one class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    pub id: InstructionId,
    pub title: String,
    /// Prompt template, see the `template` module for the syntax.
    pub description: String,
    pub target_class: String,
    /// Empty for whole-record instructions.
    #[serde(default)]
    pub target_field: String,
    #[serde(default)]
    pub ready_to_process: bool,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub cancelled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default)]
    pub created_at_epoch_ms: u64,
}

impl Instruction {
    pub fn target_field(&self) -> Option<&str> {
        let field = self.target_field.trim();
        (!field.is_empty()).then_some(field)
    }

    /// Whether tasks of this instruction may still be sent or reviewed.
    pub fn can_progress(&self) -> bool {
        !self.completed && !self.cancelled
    }

    pub fn status(&self) -> &'static str {
        if self.completed {
            "completed"
        } else if self.cancelled {
            "cancelled"
        } else if self.ready_to_process {
            "ready"
        } else {
            "draft"
        }
    }
}

/// Human verdict on an answered task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Accept,
    Reject,
}

/// Position of a task in its lifecycle, derived from the stored flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Started,
    Failed,
    Answered,
    Accepted,
    Rejected,
    WrittenBack,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Pending => "pending",
            TaskState::Started => "started",
            TaskState::Failed => "failed",
            TaskState::Answered => "answered",
            TaskState::Accepted => "accepted",
            TaskState::Rejected => "rejected",
            TaskState::WrittenBack => "written_back",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One instruction applied to one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub instruction_id: InstructionId,
    pub record_id: RecordId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,
    #[serde(default)]
    pub started: bool,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub accepted: bool,
    #[serde(default)]
    pub rejected: bool,
    #[serde(default)]
    pub original_updated: bool,
    #[serde(default)]
    pub is_test: bool,
    /// Prompts sent for this task, including failed ones.
    #[serde(default)]
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default)]
    pub created_at_epoch_ms: u64,
    #[serde(default)]
    pub updated_at_epoch_ms: u64,
}

impl Task {
    pub fn new(
        id: TaskId,
        instruction_id: InstructionId,
        record_id: RecordId,
        is_test: bool,
    ) -> Self {
        let now = now_epoch_ms();
        Task {
            id,
            instruction_id,
            record_id,
            before: None,
            after: None,
            started: false,
            completed: false,
            accepted: false,
            rejected: false,
            original_updated: false,
            is_test,
            attempts: 0,
            last_error: None,
            created_at_epoch_ms: now,
            updated_at_epoch_ms: now,
        }
    }

    pub fn state(&self) -> TaskState {
        if self.original_updated {
            TaskState::WrittenBack
        } else if self.rejected {
            TaskState::Rejected
        } else if self.accepted && self.last_error.is_some() {
            TaskState::Failed
        } else if self.accepted {
            TaskState::Accepted
        } else if self.completed {
            TaskState::Answered
        } else if self.last_error.is_some() {
            TaskState::Failed
        } else if self.started {
            TaskState::Started
        } else {
            TaskState::Pending
        }
    }

    /// Rejected and written-back tasks never move again.
    pub fn is_terminal(&self) -> bool {
        self.rejected || self.original_updated
    }

    /// Snapshot the current value and mark the prompt as sent.
    pub fn begin(&mut self, before: String) -> Result<()> {
        if self.completed {
            return Err(WorkflowError::invalid_task(self.id, "already answered").into());
        }
        self.before = Some(before);
        self.started = true;
        self.attempts += 1;
        self.last_error = None;
        self.touch();
        Ok(())
    }

    pub fn record_answer(&mut self, after: String) -> Result<()> {
        if !self.started || self.completed {
            return Err(WorkflowError::invalid_task(
                self.id,
                format!("cannot record an answer in state {}", self.state()),
            )
            .into());
        }
        self.after = Some(after);
        self.completed = true;
        self.touch();
        Ok(())
    }

    pub fn record_failure(&mut self, error: String) -> Result<()> {
        if !self.started || self.completed {
            return Err(WorkflowError::invalid_task(
                self.id,
                format!("cannot record a failure in state {}", self.state()),
            )
            .into());
        }
        self.last_error = Some(error);
        self.touch();
        Ok(())
    }

    /// Set exactly one of `accepted` / `rejected` on an answered task.
    ///
    /// An accepted answer whose write-back failed may still be rejected.
    pub fn review(&mut self, decision: Decision) -> Result<()> {
        let failed_write_back = self.write_back_failed() && decision == Decision::Reject;
        if self.state() != TaskState::Answered && !failed_write_back {
            return Err(WorkflowError::invalid_task(
                self.id,
                format!("only answered tasks can be reviewed (state {})", self.state()),
            )
            .into());
        }
        match decision {
            Decision::Accept => self.accepted = true,
            Decision::Reject => {
                self.accepted = false;
                self.rejected = true;
            }
        }
        self.touch();
        Ok(())
    }

    /// Accepted, not yet applied, not failed, and not a test run.
    pub fn awaits_write_back(&self) -> bool {
        self.accepted && !self.original_updated && !self.is_test && self.last_error.is_none()
    }

    pub fn write_back_failed(&self) -> bool {
        self.accepted && !self.original_updated && self.last_error.is_some()
    }

    /// Park an accepted answer that cannot be applied to its record.
    pub fn record_write_back_failure(&mut self, error: String) -> Result<()> {
        if !self.awaits_write_back() {
            return Err(WorkflowError::invalid_task(
                self.id,
                format!("cannot record a write-back failure in state {}", self.state()),
            )
            .into());
        }
        self.last_error = Some(error);
        self.touch();
        Ok(())
    }

    pub fn mark_written_back(&mut self) -> Result<()> {
        if !self.awaits_write_back() {
            return Err(WorkflowError::invalid_task(
                self.id,
                format!("cannot write back in state {}", self.state()),
            )
            .into());
        }
        self.original_updated = true;
        self.touch();
        Ok(())
    }

    fn touch(&mut self) {
        self.updated_at_epoch_ms = now_epoch_ms();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_walks_every_state() {
        let mut task = Task::new(1, 1, 10, false);
        assert_eq!(task.state(), TaskState::Pending);
        task.begin("old".to_string()).unwrap();
        assert_eq!(task.state(), TaskState::Started);
        task.record_answer("new".to_string()).unwrap();
        assert_eq!(task.state(), TaskState::Answered);
        task.review(Decision::Accept).unwrap();
        assert_eq!(task.state(), TaskState::Accepted);
        task.mark_written_back().unwrap();
        assert_eq!(task.state(), TaskState::WrittenBack);
        assert!(task.is_terminal());
    }

    #[test]
    fn review_is_exclusive_and_single_shot() {
        let mut task = Task::new(1, 1, 10, false);
        assert!(task.review(Decision::Accept).is_err());
        task.begin(String::new()).unwrap();
        task.record_answer("x".to_string()).unwrap();
        task.review(Decision::Reject).unwrap();
        assert!(task.review(Decision::Accept).is_err());
        assert!(task.rejected && !task.accepted);
        assert!(task.mark_written_back().is_err());
    }

    #[test]
    fn failure_is_distinct_from_never_attempted() {
        let mut task = Task::new(1, 1, 10, false);
        assert!(task.record_failure("boom".to_string()).is_err());
        task.begin(String::new()).unwrap();
        task.record_failure("boom".to_string()).unwrap();
        assert_eq!(task.state(), TaskState::Failed);
        assert_eq!(task.attempts, 1);

        task.begin(String::new()).unwrap();
        assert_eq!(task.state(), TaskState::Started);
        assert_eq!(task.attempts, 2);
    }

    #[test]
    fn written_back_only_once_and_never_for_tests() {
        let mut task = Task::new(1, 1, 10, true);
        task.begin(String::new()).unwrap();
        task.record_answer("x".to_string()).unwrap();
        task.review(Decision::Accept).unwrap();
        assert!(task.mark_written_back().is_err());

        let mut task = Task::new(2, 1, 10, false);
        task.begin(String::new()).unwrap();
        task.record_answer("x".to_string()).unwrap();
        task.review(Decision::Accept).unwrap();
        task.mark_written_back().unwrap();
        assert!(task.mark_written_back().is_err());
    }

    #[test]
    fn failed_write_back_is_parked_until_rejected() {
        let mut task = Task::new(1, 1, 10, false);
        task.begin(String::new()).unwrap();
        task.record_answer("lots".to_string()).unwrap();
        assert!(task.record_write_back_failure("bad".to_string()).is_err());
        task.review(Decision::Accept).unwrap();
        task.record_write_back_failure("not an integer".to_string()).unwrap();

        assert_eq!(task.state(), TaskState::Failed);
        assert!(!task.awaits_write_back());
        assert!(task.mark_written_back().is_err());
        assert!(task.review(Decision::Accept).is_err());

        task.review(Decision::Reject).unwrap();
        assert_eq!(task.state(), TaskState::Rejected);
        assert!(task.rejected && !task.accepted);
        assert!(task.is_terminal());
    }

    #[test]
    fn instruction_status_reflects_flags() {
        let mut instruction = Instruction {
            id: 1,
            title: "t".to_string(),
            description: String::new(),
            target_class: "Article".to_string(),
            target_field: "  ".to_string(),
            ready_to_process: false,
            completed: false,
            cancelled: false,
            author: None,
            created_at_epoch_ms: 0,
        };
        assert_eq!(instruction.target_field(), None);
        assert_eq!(instruction.status(), "draft");
        instruction.ready_to_process = true;
        assert_eq!(instruction.status(), "ready");
        instruction.cancelled = true;
        assert!(!instruction.can_progress());
        assert_eq!(instruction.status(), "cancelled");
    }
}
