//! Completion capability used by classification passes.
//!
//! The [`Completion`] trait decouples the classifier from the model backend.
//! [`CommandCompletion`] pipes a rendered prompt into an external command
//! (currently `codex exec` by default); tests use scripted completions that
//! return predetermined responses without spawning processes.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use minijinja::{Environment, context};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::core::extract::message_text;
use crate::core::types::{ContentPart, Message, Model, StopReason};
use crate::io::config::BackendConfig;
use crate::io::process::{ProcessRequest, run_process};

const COMMAND_REQUEST_TEMPLATE: &str = include_str!("prompts/command_request.md");

pub const ENV_PROVIDER: &str = "TURNGUARD_PROVIDER";
pub const ENV_MODEL: &str = "TURNGUARD_MODEL";
pub const ENV_API_KEY: &str = "TURNGUARD_API_KEY";
pub const ENV_MAX_TOKENS: &str = "TURNGUARD_MAX_TOKENS";

/// Prompt for one completion call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub system_prompt: Option<String>,
    pub messages: Vec<Message>,
}

/// Credentials and limits for one completion call.
#[derive(Clone, PartialEq, Eq)]
pub struct CompletionOptions {
    pub api_key: String,
    pub max_tokens: Option<u32>,
}

impl std::fmt::Debug for CompletionOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionOptions")
            .field("api_key", &"<redacted>")
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

/// Model output for one completion call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionResponse {
    pub stop_reason: StopReason,
    pub content: Vec<ContentPart>,
}

impl CompletionResponse {
    /// Successful response carrying a single text part.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            stop_reason: StopReason::Normal,
            content: vec![ContentPart::text(text)],
        }
    }

    /// Concatenation of all text parts, in order.
    pub fn output_text(&self) -> String {
        self.content
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text { text } => Some(text.as_str()),
                ContentPart::Other => None,
            })
            .collect()
    }
}

/// Abstraction over completion backends.
///
/// Implementations own their timeouts: a call must eventually return, either
/// a response or an error.
#[async_trait]
pub trait Completion: Send + Sync {
    async fn complete(
        &self,
        model: &Model,
        request: &CompletionRequest,
        options: &CompletionOptions,
    ) -> Result<CompletionResponse>;
}

#[async_trait]
impl<T: Completion + ?Sized> Completion for Arc<T> {
    async fn complete(
        &self,
        model: &Model,
        request: &CompletionRequest,
        options: &CompletionOptions,
    ) -> Result<CompletionResponse> {
        (**self).complete(model, request, options).await
    }
}

#[derive(Debug, Serialize)]
struct RenderedMessage {
    role: &'static str,
    text: String,
}

impl RenderedMessage {
    fn from_message(message: &Message) -> Option<Self> {
        let role = match message {
            Message::User { .. } => "user",
            Message::Assistant { .. } => "assistant",
            Message::ToolResult { .. } => "tool result",
            Message::Other => return None,
        };
        Some(Self {
            role,
            text: message_text(message),
        })
    }
}

/// Completion backend that runs an external command per call.
///
/// The system prompt and messages are rendered into one plain-text prompt on
/// stdin. The model, provider, API key, and token limit are exported to the
/// child as `TURNGUARD_*` environment variables. Stdout is the model output.
pub struct CommandCompletion {
    backend: BackendConfig,
    env: Environment<'static>,
}

impl CommandCompletion {
    pub fn new(backend: BackendConfig) -> Self {
        let mut env = Environment::new();
        env.add_template("command_request", COMMAND_REQUEST_TEMPLATE)
            .expect("command request template should be valid");
        Self { backend, env }
    }

    /// Render the stdin prompt for `request`.
    pub fn render_prompt(&self, request: &CompletionRequest) -> Result<String> {
        let messages: Vec<RenderedMessage> = request
            .messages
            .iter()
            .filter_map(RenderedMessage::from_message)
            .collect();
        let template = self.env.get_template("command_request")?;
        let rendered = template.render(context! {
            system_prompt => request.system_prompt.as_deref().map(str::trim).filter(|s| !s.is_empty()),
            messages => messages,
        })?;
        Ok(rendered)
    }

    fn process_request(
        &self,
        model: &Model,
        prompt: String,
        options: &CompletionOptions,
    ) -> ProcessRequest {
        let mut env = vec![
            (ENV_PROVIDER.to_string(), model.provider.clone()),
            (ENV_MODEL.to_string(), model.id.clone()),
            (ENV_API_KEY.to_string(), options.api_key.clone()),
        ];
        if let Some(max_tokens) = options.max_tokens {
            env.push((ENV_MAX_TOKENS.to_string(), max_tokens.to_string()));
        }
        ProcessRequest {
            argv: self.backend.command.clone(),
            env,
            stdin: prompt.into_bytes(),
            timeout: Duration::from_secs(self.backend.timeout_secs),
            output_limit_bytes: self.backend.output_limit_bytes,
        }
    }
}

#[async_trait]
impl Completion for CommandCompletion {
    #[instrument(skip_all, fields(model = %model, timeout_secs = self.backend.timeout_secs))]
    async fn complete(
        &self,
        model: &Model,
        request: &CompletionRequest,
        options: &CompletionOptions,
    ) -> Result<CompletionResponse> {
        let prompt = self
            .render_prompt(request)
            .context("render completion prompt")?;
        debug!(prompt_bytes = prompt.len(), "rendered completion prompt");
        let process = self.process_request(model, prompt, options);
        let timeout = process.timeout;

        info!("starting completion command");
        let output = tokio::task::spawn_blocking(move || run_process(&process))
            .await
            .context("join completion command")?
            .context("run completion command")?;

        if output.timed_out {
            warn!(timeout_secs = timeout.as_secs(), "completion command timed out");
            return Err(anyhow!("completion command timed out after {timeout:?}"));
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "completion command failed");
            return Err(anyhow!(
                "completion command failed with status {:?}: {}",
                output.status.code(),
                output.stderr_lossy().trim()
            ));
        }

        debug!(
            stdout_bytes = output.stdout.len(),
            "completion command completed"
        );
        Ok(CompletionResponse::text(output.stdout_lossy()))
    }
}
