//! Instruction fanout, task processing, review, and write-back.
//!
//! Every operation takes the ledger and content store explicitly and
//! checkpoints the ledger after each state change, so an interrupted run
//! resumes from the last persisted transition.
mod batch;
mod context;
mod fanout;
mod instruction;
mod process;
mod review;
mod write_back;

pub use batch::{run_batch, BatchReport};
pub use context::RunContext;
pub use instruction::{cancel, create, delete, edit, mark_ready, InstructionEdit};
pub use process::run_test_task;
pub use review::review;
