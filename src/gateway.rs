//! Prompt execution gateway.
//!
//! The workflow only needs "send this literal prompt, get literal text back".
//! Two adapters are provided: a local command that reads the prompt on stdin
//! (any LM CLI works), and an OpenAI-compatible chat-completions endpoint.
//! Both enforce a hard timeout so one stuck call cannot stall a batch.
use crate::util::truncate_string;
use crate::workspace::config::GatewaySettings;
use crate::workspace::lm_log::{append_lm_log, LmLogBuilder};
use crate::workspace::WorkspacePaths;
use anyhow::Result;
use std::cell::Cell;
use std::time::Duration;

mod command;
mod http;

pub use command::CommandGateway;
pub use http::HttpGateway;

/// Literal prompt in, literal answer out.
pub trait PromptGateway {
    /// Fails with `WorkflowError::Provider` on transport or provider errors.
    fn ask(&self, prompt: &str, model: Option<&str>) -> Result<String>;
}

impl<G: PromptGateway + ?Sized> PromptGateway for &G {
    fn ask(&self, prompt: &str, model: Option<&str>) -> Result<String> {
        (**self).ask(prompt, model)
    }
}

impl<G: PromptGateway + ?Sized> PromptGateway for Box<G> {
    fn ask(&self, prompt: &str, model: Option<&str>) -> Result<String> {
        (**self).ask(prompt, model)
    }
}

/// Build the configured adapter, failing with `WorkflowError::Configuration`
/// when credentials or the command cannot be resolved.
pub fn from_settings(settings: &GatewaySettings, timeout: Duration) -> Result<Box<dyn PromptGateway>> {
    match settings {
        GatewaySettings::Command { command } => {
            Ok(Box::new(CommandGateway::new(command, timeout)?))
        }
        GatewaySettings::Http {
            endpoint,
            api_key_env,
        } => Ok(Box::new(HttpGateway::new(endpoint, api_key_env, timeout)?)),
    }
}

/// Gateway wrapper that appends every call to `edit/lm_log.jsonl`.
pub struct AuditedGateway<G> {
    inner: G,
    paths: WorkspacePaths,
    calls: Cell<u32>,
}

impl<G: PromptGateway> AuditedGateway<G> {
    pub fn new(inner: G, paths: WorkspacePaths) -> Self {
        AuditedGateway {
            inner,
            paths,
            calls: Cell::new(0),
        }
    }
}

impl<G: PromptGateway> PromptGateway for AuditedGateway<G> {
    fn ask(&self, prompt: &str, model: Option<&str>) -> Result<String> {
        let call = self.calls.get() + 1;
        self.calls.set(call);
        let builder = LmLogBuilder::new(call, model).with_prompt_preview(prompt);
        let result = self.inner.ask(prompt, model);
        let entry = match &result {
            Ok(answer) => builder.success(truncate_string(answer, 200)),
            Err(err) => builder.failed(format!("{err:#}")),
        };
        if let Err(err) = append_lm_log(&self.paths, &entry) {
            tracing::warn!(error = %err, "failed to append lm_log entry");
        }
        result
    }
}
