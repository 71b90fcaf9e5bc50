//! Local LM command adapter.
//!
//! The prompt is written to the command's stdin and stdout is the answer.
//! Arguments may carry `{model}` (replaced with the requested model) and
//! `{prompt}` (prompt passed as an argument instead of on stdin).

use super::PromptGateway;
use crate::error::WorkflowError;
use anyhow::{anyhow, Context, Result};
use std::io::{Read, Write};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const MODEL_PLACEHOLDER: &str = "{model}";
const PROMPT_PLACEHOLDER: &str = "{prompt}";
const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone)]
pub struct CommandGateway {
    argv: Vec<String>,
    timeout: Duration,
}

impl CommandGateway {
    /// Parse `command` with shell-words and make sure the program exists.
    pub fn new(command: &str, timeout: Duration) -> Result<Self> {
        let argv = shell_words::split(command).map_err(|err| {
            WorkflowError::Configuration(format!("parse LM command {command:?}: {err}"))
        })?;
        let Some(program) = argv.first() else {
            return Err(WorkflowError::Configuration("LM command is empty".to_string()).into());
        };
        which::which(program).map_err(|err| {
            WorkflowError::Configuration(format!("LM command {program:?} not found: {err}"))
        })?;
        Ok(CommandGateway { argv, timeout })
    }

    fn build_argv(&self, prompt: &str, model: Option<&str>) -> Result<(Vec<String>, bool)> {
        let mut argv = self.argv.clone();
        let mut prompt_in_args = false;
        for arg in &mut argv {
            if arg.contains(MODEL_PLACEHOLDER) {
                let model = model.ok_or_else(|| {
                    WorkflowError::Configuration(
                        "LM command uses {model} but no model is configured".to_string(),
                    )
                })?;
                *arg = arg.replace(MODEL_PLACEHOLDER, model);
            }
            if arg == PROMPT_PLACEHOLDER {
                *arg = prompt.to_string();
                prompt_in_args = true;
            }
        }
        Ok((argv, prompt_in_args))
    }
}

impl PromptGateway for CommandGateway {
    fn ask(&self, prompt: &str, model: Option<&str>) -> Result<String> {
        let (argv, prompt_in_args) = self.build_argv(prompt, model)?;
        let start = Instant::now();
        let mut child = Command::new(&argv[0])
            .args(&argv[1..])
            .stdin(if prompt_in_args {
                Stdio::null()
            } else {
                Stdio::piped()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("spawn LM command: {}", argv[0]))?;

        let writer = child.stdin.take().map(|mut stdin| {
            let bytes = prompt.as_bytes().to_vec();
            thread::spawn(move || stdin.write_all(&bytes))
        });
        let stdout = spawn_reader(child.stdout.take());
        let stderr = spawn_reader(child.stderr.take());

        let status = wait_with_deadline(&mut child, start + self.timeout)?;
        let elapsed_ms = start.elapsed().as_millis();
        let Some(status) = status else {
            return Err(WorkflowError::Provider(format!(
                "LM command timed out after {}s",
                self.timeout.as_secs()
            ))
            .into());
        };

        if let Some(writer) = writer {
            let written = writer
                .join()
                .map_err(|_| anyhow!("prompt writer thread panicked"))?;
            if let Err(err) = written {
                tracing::debug!(error = %err, "LM command closed stdin early");
            }
        }
        let stdout = join_reader(stdout)?;
        let stderr = join_reader(stderr)?;

        tracing::info!(
            elapsed_ms,
            prompt_bytes = prompt.len(),
            response_bytes = stdout.len(),
            "lm invoke complete"
        );

        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr);
            return Err(WorkflowError::Provider(format!(
                "LM command failed with status {}: {}",
                status,
                stderr.trim()
            ))
            .into());
        }

        let answer = String::from_utf8(stdout).context("decode LM stdout as UTF-8")?;
        Ok(answer.trim().to_string())
    }
}

type Reader = Option<thread::JoinHandle<std::io::Result<Vec<u8>>>>;

fn spawn_reader<R: Read + Send + 'static>(source: Option<R>) -> Reader {
    source.map(|mut source| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            source.read_to_end(&mut buf)?;
            Ok(buf)
        })
    })
}

fn join_reader(reader: Reader) -> Result<Vec<u8>> {
    match reader {
        Some(handle) => handle
            .join()
            .map_err(|_| anyhow!("LM output reader thread panicked"))?
            .context("read LM output"),
        None => Ok(Vec::new()),
    }
}

/// Poll until the child exits; kill it and return `None` past the deadline.
fn wait_with_deadline(
    child: &mut Child,
    deadline: Instant,
) -> Result<Option<std::process::ExitStatus>> {
    loop {
        if let Some(status) = child.try_wait().context("wait for LM command")? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            if let Err(err) = child.kill() {
                tracing::warn!(error = %err, "failed to kill timed out LM command");
            }
            child.wait().context("reap timed out LM command")?;
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}
