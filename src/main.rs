use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod cli;
mod codec;
mod commands;
mod error;
mod gateway;
mod ledger;
mod prompt;
mod schema;
mod store;
mod template;
#[cfg(test)]
mod test_support;
mod util;
mod workflow;
mod workspace;

use cli::{Command, RootArgs};

const LOG_ENV: &str = "PEDIT_LOG";

fn main() -> Result<()> {
    let args = RootArgs::parse();
    init_tracing(args.verbose);

    let root = workspace::resolve_root(args.workspace.as_deref())?;
    match args.command {
        Command::Init(init) => commands::run_init(root, init),
        Command::Instruction(command) => commands::run_instruction(root, command),
        Command::Task(command) => commands::run_task(root, command),
        Command::Review(command) => commands::run_review(root, command),
        Command::Run(run) => commands::run_batch(root, run),
        Command::Ask(ask) => commands::run_ask(root, ask),
        Command::Status(status) => commands::run_status(root, status),
    }
}

/// Structured logs go to stderr; stdout is reserved for command output.
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .without_time()
                .with_writer(std::io::stderr),
        )
        .try_init();
}
