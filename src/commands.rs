//! Command handlers behind the CLI.
//!
//! Each handler loads the workspace, runs one workflow operation, and prints
//! a short human summary (or JSON when asked).
use crate::cli::{
    AskArgs, DescriptionArgs, InitArgs, InstructionAddArgs, InstructionCommand,
    InstructionEditArgs, ReviewCommand, RunArgs, TaskCommand, TaskListArgs, TaskStateArg,
};
use crate::gateway::{self, AuditedGateway, PromptGateway};
use crate::ledger::{Decision, Ledger, NewInstruction, Task, TaskState};
use crate::store::FileStore;
use crate::util::{now_epoch_ms, truncate_string};
use crate::workflow::{self, BatchReport, InstructionEdit, RunContext};
use crate::workspace::config::{self, EditConfig, GatewaySettings};
use crate::workspace::history::{self, HistoryEntry, HISTORY_SCHEMA_VERSION};
use crate::workspace::WorkspacePaths;
use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

mod status;

pub use status::run_status;

const ANSWER_PREVIEW_BYTES: usize = 60;

/// Loaded workspace state shared by the handlers.
struct EditContext {
    paths: WorkspacePaths,
    config: EditConfig,
    ledger: Ledger,
    store: FileStore,
}

impl EditContext {
    fn load(root: PathBuf) -> Result<Self> {
        let paths = WorkspacePaths::new(root);
        let config = config::load_config(&paths)?;
        let ledger = Ledger::open(&paths.instructions_path(), &paths.tasks_path())?;
        let store = FileStore::open(&paths.records_dir())?;
        Ok(Self {
            paths,
            config,
            ledger,
            store,
        })
    }

    fn run_context(&self) -> RunContext {
        RunContext::new(&self.config)
    }
}

/// Build the audited gateway for this invocation.
fn connect(
    paths: &WorkspacePaths,
    config: &EditConfig,
    lm: Option<&str>,
) -> Result<AuditedGateway<Box<dyn PromptGateway>>> {
    let settings = config.resolved_gateway(lm);
    let inner = gateway::from_settings(&settings, config.timeout())?;
    Ok(AuditedGateway::new(inner, paths.clone()))
}

pub fn run_init(root: PathBuf, args: InitArgs) -> Result<()> {
    let paths = WorkspacePaths::new(root);
    let config_path = paths.config_path();
    if config_path.is_file() && !args.force {
        return Err(anyhow!(
            "config already exists at {} (use --force to overwrite)",
            config_path.display()
        ));
    }
    let mut config = config::default_config();
    if let Some(command) = args.lm {
        config.gateway = GatewaySettings::Command { command };
    }
    config.model = args.model;
    config::validate_config(&config)?;
    fs::create_dir_all(paths.records_dir())
        .with_context(|| format!("create {}", paths.records_dir().display()))?;
    config::write_config(&paths, &config)?;
    println!("wrote {}", config_path.display());
    Ok(())
}

pub fn run_instruction(root: PathBuf, command: InstructionCommand) -> Result<()> {
    let mut ctx = EditContext::load(root)?;
    match command {
        InstructionCommand::Add(args) => add_instruction(&mut ctx, args),
        InstructionCommand::Edit(args) => edit_instruction(&mut ctx, args),
        InstructionCommand::Ready(args) => {
            let outcome = workflow::mark_ready(&mut ctx.ledger, &ctx.store, args.id)?;
            println!(
                "instruction {} ready: {} task(s) created",
                args.id, outcome.created
            );
            Ok(())
        }
        InstructionCommand::Cancel(args) => {
            let purged = workflow::cancel(&mut ctx.ledger, args.id)?;
            println!("instruction {} cancelled: {purged} task(s) deleted", args.id);
            Ok(())
        }
        InstructionCommand::Delete(args) => {
            let removed = workflow::delete(&mut ctx.ledger, args.id)?;
            println!("instruction {} deleted with {removed} task(s)", args.id);
            Ok(())
        }
        InstructionCommand::List(args) => {
            let instructions: Vec<_> = ctx.ledger.instructions().collect();
            if args.json {
                let text = serde_json::to_string_pretty(&instructions)
                    .context("serialize instructions")?;
                println!("{text}");
                return Ok(());
            }
            for instruction in instructions {
                let target = instruction.target_field().unwrap_or("*");
                let tasks = ctx.ledger.tasks_for(instruction.id).count();
                println!(
                    "{}\t{}\t{}.{}\t{} task(s)\t{}",
                    instruction.id,
                    instruction.status(),
                    instruction.target_class,
                    target,
                    tasks,
                    instruction.title
                );
            }
            Ok(())
        }
        InstructionCommand::Test(args) => {
            let gateway = connect(&ctx.paths, &ctx.config, args.lm.as_deref())?;
            let mut run_ctx = ctx.run_context();
            let (task_id, answer) = workflow::run_test_task(
                &mut ctx.ledger,
                &ctx.store,
                &gateway,
                &mut run_ctx,
                args.id,
                args.record,
            )?;
            println!("test task {task_id}:");
            println!("{answer}");
            Ok(())
        }
    }
}

fn add_instruction(ctx: &mut EditContext, args: InstructionAddArgs) -> Result<()> {
    let description = read_description(&args.description)?
        .ok_or_else(|| anyhow!("provide --description or --description-file"))?;
    let id = workflow::create(
        &mut ctx.ledger,
        &ctx.store,
        NewInstruction {
            title: args.title,
            description,
            target_class: args.class,
            target_field: args.field.trim().to_string(),
            author: args.author,
        },
    )?;
    println!("created instruction {id}");
    Ok(())
}

fn edit_instruction(ctx: &mut EditContext, args: InstructionEditArgs) -> Result<()> {
    let changes = InstructionEdit {
        title: args.title,
        description: read_description(&args.description)?,
        target_class: args.class,
        target_field: args.field,
        author: args.author,
    };
    let outcome = workflow::edit(&mut ctx.ledger, &ctx.store, args.id, changes)?;
    println!("updated instruction {}", args.id);
    if outcome.created > 0 {
        println!("{} task(s) created", outcome.created);
    }
    Ok(())
}

fn read_description(args: &DescriptionArgs) -> Result<Option<String>> {
    if let Some(path) = args.description_file.as_deref() {
        return read_template_file(path).map(Some);
    }
    Ok(args.description.clone())
}

fn read_template_file(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("read template {}", path.display()))
}

pub fn run_task(root: PathBuf, command: TaskCommand) -> Result<()> {
    let ctx = EditContext::load(root)?;
    match command {
        TaskCommand::List(args) => list_tasks(&ctx, &args),
    }
}

#[derive(serde::Serialize)]
struct TaskView<'a> {
    #[serde(flatten)]
    task: &'a Task,
    state: TaskState,
}

fn list_tasks(ctx: &EditContext, args: &TaskListArgs) -> Result<()> {
    let wanted = args.state.map(task_state);
    let tasks: Vec<TaskView<'_>> = ctx
        .ledger
        .tasks()
        .filter(|task| args.instruction.is_none_or(|id| task.instruction_id == id))
        .map(|task| TaskView {
            task,
            state: task.state(),
        })
        .filter(|view| wanted.is_none_or(|state| view.state == state))
        .collect();
    if args.json {
        let text = serde_json::to_string_pretty(&tasks).context("serialize tasks")?;
        println!("{text}");
        return Ok(());
    }
    for view in tasks {
        let task = view.task;
        let answer = task
            .after
            .as_deref()
            .map(|after| truncate_string(after.trim(), ANSWER_PREVIEW_BYTES).replace('\n', " "))
            .unwrap_or_default();
        let test = if task.is_test { " (test)" } else { "" };
        println!(
            "{}\t{}{}\tinstruction {}\trecord {}\t{}",
            task.id, view.state, test, task.instruction_id, task.record_id, answer
        );
    }
    Ok(())
}

fn task_state(arg: TaskStateArg) -> TaskState {
    match arg {
        TaskStateArg::Pending => TaskState::Pending,
        TaskStateArg::Started => TaskState::Started,
        TaskStateArg::Failed => TaskState::Failed,
        TaskStateArg::Answered => TaskState::Answered,
        TaskStateArg::Accepted => TaskState::Accepted,
        TaskStateArg::Rejected => TaskState::Rejected,
        TaskStateArg::WrittenBack => TaskState::WrittenBack,
    }
}

pub fn run_review(root: PathBuf, command: ReviewCommand) -> Result<()> {
    let mut ctx = EditContext::load(root)?;
    let (task_id, decision) = match command {
        ReviewCommand::Accept(args) => (args.task_id, Decision::Accept),
        ReviewCommand::Reject(args) => (args.task_id, Decision::Reject),
    };
    workflow::review(&mut ctx.ledger, task_id, decision)?;
    let verb = match decision {
        Decision::Accept => "accepted",
        Decision::Reject => "rejected",
    };
    println!("task {task_id} {verb}");
    Ok(())
}

/// One batch sweep; the report and a history line are written either way.
pub fn run_batch(root: PathBuf, args: RunArgs) -> Result<()> {
    let started = now_epoch_ms();
    let mut ctx = EditContext::load(root)?;
    let mut run_ctx = ctx.run_context();
    let lm = args.lm.as_deref();
    let result = workflow::run_batch(
        &mut ctx.ledger,
        &mut ctx.store,
        || connect(&ctx.paths, &ctx.config, lm),
        &mut run_ctx,
    );
    let report = match result {
        Ok(report) => report,
        Err(err) => {
            record_history(&ctx.paths, started, false, Some(format!("{err:#}")))?;
            return Err(err);
        }
    };
    history::write_report(&ctx.paths, &report)?;
    let all_failed = report.all_failed();
    let message = (!report.failures.is_empty())
        .then(|| format!("{} task(s) failed", report.failures.len()));
    record_history(&ctx.paths, started, !all_failed, message)?;

    if args.json {
        let text = serde_json::to_string_pretty(&report).context("serialize batch report")?;
        println!("{text}");
    } else {
        print_report(&report);
    }
    if all_failed {
        return Err(anyhow!(
            "every attempted task failed (see {})",
            ctx.paths.report_path().display()
        ));
    }
    Ok(())
}

fn record_history(
    paths: &WorkspacePaths,
    started: u64,
    success: bool,
    message: Option<String>,
) -> Result<()> {
    history::append_history(
        paths,
        &HistoryEntry {
            schema_version: HISTORY_SCHEMA_VERSION,
            started_at_epoch_ms: started,
            finished_at_epoch_ms: now_epoch_ms(),
            step: "run".to_string(),
            success,
            message,
        },
    )
}

fn print_report(report: &BatchReport) {
    println!(
        "reconciled {} instruction(s), created {} task(s)",
        report.reconciled, report.created
    );
    println!(
        "answered {}, written back {}, purged {}, removed {}",
        report.answered, report.written_back, report.purged, report.removed
    );
    if report.exhausted > 0 {
        println!("skipped {} task(s) at the attempt limit", report.exhausted);
    }
    if report.completed_instructions > 0 {
        println!("completed {} instruction(s)", report.completed_instructions);
    }
    for failure in &report.failures {
        match failure.task_id {
            Some(task_id) => println!(
                "failed task {task_id} ({}): {}",
                failure.phase, failure.error
            ),
            None => println!(
                "failed instruction {} ({}): {}",
                failure.instruction_id, failure.phase, failure.error
            ),
        }
    }
}

/// Ad-hoc connectivity check; never touches the ledger.
pub fn run_ask(root: PathBuf, args: AskArgs) -> Result<()> {
    let paths = WorkspacePaths::new(root);
    let config = config::load_config(&paths)?;
    let gateway = connect(&paths, &config, args.lm.as_deref())?;
    let model = args.model.as_deref().or(config.model.as_deref());
    let answer = gateway.ask(&args.prompt.join(" "), model)?;
    println!("{answer}");
    Ok(())
}
