//! CLI argument parsing for the edit workflow.
//!
//! Each subcommand maps to one workflow operation; the CLI holds no policy
//! of its own.
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Root CLI entrypoint.
#[derive(Parser, Debug)]
#[command(
    name = "pedit",
    version,
    about = "LM-assisted bulk editing of content records with human review",
    after_help = "Commands:\n  init                          Create edit/config.json in the workspace\n  instruction add|edit|ready    Manage editing instructions\n  task list                     Show tasks and their state\n  review accept|reject <task>   Record a review decision\n  run                           One batch sweep: fanout, answer, write back, purge\n  ask <prompt>                  Send one prompt, bypassing the workflow\n  status                        Summarize instructions, tasks, and LM calls\n\nExamples:\n  pedit --workspace ./site init --lm 'llm -m small'\n  pedit --workspace ./site instruction add --title Summaries --class Article --field Summary --description 'Summarise $Title in five words'\n  pedit --workspace ./site instruction ready 1\n  pedit --workspace ./site run\n  pedit --workspace ./site review accept 3",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    /// Workspace holding records/ and edit/ (defaults to the user data dir)
    #[arg(long, value_name = "DIR", global = true)]
    pub workspace: Option<PathBuf>,

    /// Log workflow progress to stderr
    #[arg(long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Init(InitArgs),
    #[command(subcommand)]
    Instruction(InstructionCommand),
    #[command(subcommand)]
    Task(TaskCommand),
    #[command(subcommand)]
    Review(ReviewCommand),
    Run(RunArgs),
    Ask(AskArgs),
    Status(StatusArgs),
}

#[derive(Parser, Debug)]
#[command(about = "Create edit/config.json")]
pub struct InitArgs {
    /// Overwrite an existing config.json
    #[arg(long)]
    pub force: bool,

    /// LM command to store in the config
    #[arg(long, value_name = "CMD")]
    pub lm: Option<String>,

    /// Default model name passed to the LM
    #[arg(long, value_name = "NAME")]
    pub model: Option<String>,
}

/// Instruction lifecycle commands.
#[derive(Subcommand, Debug)]
#[command(about = "Manage editing instructions")]
pub enum InstructionCommand {
    /// Create a draft instruction
    Add(InstructionAddArgs),
    /// Change a non-completed instruction
    Edit(InstructionEditArgs),
    /// Mark an instruction ready and fan it out into tasks
    Ready(InstructionIdArgs),
    /// Cancel an instruction and delete its tasks
    Cancel(InstructionIdArgs),
    /// Delete an instruction and its tasks
    Delete(InstructionIdArgs),
    /// List instructions
    List(ListArgs),
    /// Run an instruction against a single record without writing back
    Test(InstructionTestArgs),
}

/// Template text given inline or read from a file.
#[derive(Args, Debug, Clone)]
pub struct DescriptionArgs {
    /// Prompt template ($Field, <% if %>, <% loop %>)
    #[arg(long, value_name = "TEMPLATE", conflicts_with = "description_file")]
    pub description: Option<String>,

    /// Read the prompt template from a file
    #[arg(long, value_name = "PATH")]
    pub description_file: Option<PathBuf>,
}

#[derive(Parser, Debug)]
pub struct InstructionAddArgs {
    #[arg(long)]
    pub title: String,

    /// Record class the instruction applies to
    #[arg(long, value_name = "CLASS")]
    pub class: String,

    /// Target field; omit for a whole-record instruction
    #[arg(long, value_name = "FIELD", default_value = "")]
    pub field: String,

    #[command(flatten)]
    pub description: DescriptionArgs,

    #[arg(long)]
    pub author: Option<String>,
}

#[derive(Parser, Debug)]
pub struct InstructionEditArgs {
    pub id: u64,

    #[arg(long)]
    pub title: Option<String>,

    #[arg(long, value_name = "CLASS")]
    pub class: Option<String>,

    #[arg(long, value_name = "FIELD")]
    pub field: Option<String>,

    #[command(flatten)]
    pub description: DescriptionArgs,

    #[arg(long)]
    pub author: Option<String>,
}

#[derive(Parser, Debug)]
pub struct InstructionIdArgs {
    pub id: u64,
}

#[derive(Parser, Debug)]
pub struct InstructionTestArgs {
    pub id: u64,

    /// Record identifier to run against
    #[arg(long, value_name = "ID")]
    pub record: u64,

    /// Override the configured LM command
    #[arg(long, value_name = "CMD")]
    pub lm: Option<String>,
}

#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Emit machine-readable JSON output
    #[arg(long)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
#[command(about = "Inspect tasks")]
pub enum TaskCommand {
    /// List tasks, optionally filtered
    List(TaskListArgs),
}

#[derive(Parser, Debug)]
pub struct TaskListArgs {
    /// Only tasks of this instruction
    #[arg(long, value_name = "ID")]
    pub instruction: Option<u64>,

    /// Only tasks in this state
    #[arg(long, value_enum)]
    pub state: Option<TaskStateArg>,

    /// Emit machine-readable JSON output
    #[arg(long)]
    pub json: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
#[value(rename_all = "snake_case")]
pub enum TaskStateArg {
    Pending,
    Started,
    Failed,
    Answered,
    Accepted,
    Rejected,
    WrittenBack,
}

#[derive(Subcommand, Debug)]
#[command(about = "Accept or reject answered tasks")]
pub enum ReviewCommand {
    Accept(ReviewArgs),
    Reject(ReviewArgs),
}

#[derive(Parser, Debug)]
pub struct ReviewArgs {
    pub task_id: u64,
}

#[derive(Parser, Debug)]
#[command(about = "Run one batch sweep")]
pub struct RunArgs {
    /// Override the configured LM command
    #[arg(long, value_name = "CMD")]
    pub lm: Option<String>,

    /// Print the batch report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
#[command(about = "Send one prompt to the LM and print the answer")]
pub struct AskArgs {
    /// Prompt text; words are joined with spaces
    #[arg(required = true, num_args = 1..)]
    pub prompt: Vec<String>,

    /// Override the configured LM command
    #[arg(long, value_name = "CMD")]
    pub lm: Option<String>,

    /// Override the configured model
    #[arg(long, value_name = "NAME")]
    pub model: Option<String>,
}

#[derive(Parser, Debug)]
#[command(about = "Summarize instructions, tasks, and LM calls")]
pub struct StatusArgs {
    /// Emit machine-readable JSON output
    #[arg(long)]
    pub json: bool,
}
