//! Persisted instructions and tasks.
//!
//! The ledger is loaded once per command, mutated in memory, and written back
//! with [`Ledger::checkpoint`]. Each collection is its own JSON file, written
//! atomically so an interrupted run leaves the previous checkpoint intact.
use crate::error::WorkflowError;
use crate::schema::RecordId;
use crate::util::{now_epoch_ms, write_json_atomic};
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

mod model;

pub use model::{Decision, Instruction, InstructionId, Task, TaskId, TaskState};

pub const LEDGER_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct InstructionsFile {
    schema_version: u32,
    next_id: InstructionId,
    instructions: Vec<Instruction>,
}

#[derive(Debug, Serialize, Deserialize)]
struct TasksFile {
    schema_version: u32,
    next_id: TaskId,
    tasks: Vec<Task>,
}

/// Fields an operator supplies when creating an instruction.
#[derive(Debug, Clone, Default)]
pub struct NewInstruction {
    pub title: String,
    pub description: String,
    pub target_class: String,
    pub target_field: String,
    pub author: Option<String>,
}

#[derive(Debug, Clone)]
struct LedgerPaths {
    instructions: PathBuf,
    tasks: PathBuf,
}

#[derive(Debug)]
pub struct Ledger {
    paths: Option<LedgerPaths>,
    instructions: BTreeMap<InstructionId, Instruction>,
    tasks: BTreeMap<TaskId, Task>,
    next_instruction_id: InstructionId,
    next_task_id: TaskId,
    checkpoints: usize,
}

impl Ledger {
    /// Load both collections; missing files start empty.
    pub fn open(instructions_path: &Path, tasks_path: &Path) -> Result<Self> {
        let mut ledger = Ledger::empty(Some(LedgerPaths {
            instructions: instructions_path.to_path_buf(),
            tasks: tasks_path.to_path_buf(),
        }));
        if instructions_path.is_file() {
            let file: InstructionsFile = read_json(instructions_path)?;
            check_schema(file.schema_version, instructions_path)?;
            ledger.next_instruction_id = file.next_id;
            for instruction in file.instructions {
                ledger.next_instruction_id = ledger.next_instruction_id.max(instruction.id + 1);
                ledger.instructions.insert(instruction.id, instruction);
            }
        }
        if tasks_path.is_file() {
            let file: TasksFile = read_json(tasks_path)?;
            check_schema(file.schema_version, tasks_path)?;
            ledger.next_task_id = file.next_id;
            for task in file.tasks {
                if !ledger.instructions.contains_key(&task.instruction_id) {
                    tracing::warn!(
                        task_id = task.id,
                        instruction_id = task.instruction_id,
                        "dropping task whose instruction no longer exists"
                    );
                    continue;
                }
                ledger.next_task_id = ledger.next_task_id.max(task.id + 1);
                ledger.tasks.insert(task.id, task);
            }
        }
        Ok(ledger)
    }

    /// Ledger that never touches disk.
    #[cfg(test)]
    pub fn in_memory() -> Self {
        Ledger::empty(None)
    }

    fn empty(paths: Option<LedgerPaths>) -> Self {
        Ledger {
            paths,
            instructions: BTreeMap::new(),
            tasks: BTreeMap::new(),
            next_instruction_id: 1,
            next_task_id: 1,
            checkpoints: 0,
        }
    }

    /// Persist both collections.
    pub fn checkpoint(&mut self) -> Result<()> {
        self.checkpoints += 1;
        tracing::debug!(
            checkpoint = self.checkpoints,
            instructions = self.instructions.len(),
            tasks = self.tasks.len(),
            "ledger checkpoint"
        );
        let Some(paths) = self.paths.as_ref() else {
            return Ok(());
        };
        write_json_atomic(
            &paths.instructions,
            &InstructionsFile {
                schema_version: LEDGER_SCHEMA_VERSION,
                next_id: self.next_instruction_id,
                instructions: self.instructions.values().cloned().collect(),
            },
        )?;
        write_json_atomic(
            &paths.tasks,
            &TasksFile {
                schema_version: LEDGER_SCHEMA_VERSION,
                next_id: self.next_task_id,
                tasks: self.tasks.values().cloned().collect(),
            },
        )
    }

    #[cfg(test)]
    pub fn checkpoint_count(&self) -> usize {
        self.checkpoints
    }

    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> {
        self.instructions.values()
    }

    pub fn instruction(&self, id: InstructionId) -> Result<&Instruction> {
        self.instructions
            .get(&id)
            .ok_or_else(|| unknown("instruction", id))
    }

    pub fn instruction_mut(&mut self, id: InstructionId) -> Result<&mut Instruction> {
        self.instructions
            .get_mut(&id)
            .ok_or_else(|| unknown("instruction", id))
    }

    pub fn insert_instruction(&mut self, draft: NewInstruction) -> InstructionId {
        let id = self.next_instruction_id;
        self.next_instruction_id += 1;
        self.instructions.insert(
            id,
            Instruction {
                id,
                title: draft.title,
                description: draft.description,
                target_class: draft.target_class,
                target_field: draft.target_field,
                ready_to_process: false,
                completed: false,
                cancelled: false,
                author: draft.author,
                created_at_epoch_ms: now_epoch_ms(),
            },
        );
        id
    }

    /// Remove an instruction and every task that belongs to it.
    pub fn remove_instruction(&mut self, id: InstructionId) -> Result<usize> {
        self.instructions
            .remove(&id)
            .ok_or_else(|| unknown("instruction", id))?;
        Ok(self.remove_tasks_where(|task| task.instruction_id == id))
    }

    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    pub fn tasks_for(&self, instruction_id: InstructionId) -> impl Iterator<Item = &Task> {
        self.tasks
            .values()
            .filter(move |task| task.instruction_id == instruction_id)
    }

    pub fn task(&self, id: TaskId) -> Result<&Task> {
        self.tasks.get(&id).ok_or_else(|| unknown("task", id))
    }

    pub fn task_mut(&mut self, id: TaskId) -> Result<&mut Task> {
        self.tasks.get_mut(&id).ok_or_else(|| unknown("task", id))
    }

    /// Task for the (instruction, record, is_test) key, if any.
    pub fn find_task(
        &self,
        instruction_id: InstructionId,
        record_id: RecordId,
        is_test: bool,
    ) -> Option<TaskId> {
        self.tasks
            .values()
            .find(|task| {
                task.instruction_id == instruction_id
                    && task.record_id == record_id
                    && task.is_test == is_test
            })
            .map(|task| task.id)
    }

    /// Create the task for a key unless one exists. Returns (id, created).
    pub fn upsert_task(
        &mut self,
        instruction_id: InstructionId,
        record_id: RecordId,
        is_test: bool,
    ) -> Result<(TaskId, bool)> {
        self.instruction(instruction_id)?;
        if let Some(existing) = self.find_task(instruction_id, record_id, is_test) {
            return Ok((existing, false));
        }
        let id = self.next_task_id;
        self.next_task_id += 1;
        self.tasks
            .insert(id, Task::new(id, instruction_id, record_id, is_test));
        Ok((id, true))
    }

    pub fn remove_task(&mut self, id: TaskId) -> Option<Task> {
        self.tasks.remove(&id)
    }

    pub fn remove_tasks_where<F>(&mut self, mut predicate: F) -> usize
    where
        F: FnMut(&Task) -> bool,
    {
        let before = self.tasks.len();
        self.tasks.retain(|_, task| !predicate(task));
        before - self.tasks.len()
    }
}

fn unknown(entity: &str, id: u64) -> anyhow::Error {
    WorkflowError::Validation(format!("unknown {entity} {id}")).into()
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = fs::read(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("parse {}", path.display()))
}

fn check_schema(version: u32, path: &Path) -> Result<()> {
    if version != LEDGER_SCHEMA_VERSION {
        return Err(anyhow!(
            "unsupported schema_version {version} in {}",
            path.display()
        ));
    }
    Ok(())
}
