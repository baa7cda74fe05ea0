//! Test-only helpers: transcript builders and scripted collaborators.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use tokio::sync::Notify;

use crate::core::types::{ContentPart, Message, MessageContent, Model, StopReason};
use crate::host::{FollowUp, FollowUpOptions, Host, NotifyLevel};
use crate::io::completion::{
    Completion, CompletionOptions, CompletionRequest, CompletionResponse,
};
use crate::io::models::ModelResolver;

pub const TEST_API_KEY: &str = "sk-test";

/// User message with plain-string content.
pub fn user(text: &str) -> Message {
    Message::user(text)
}

/// Assistant message with one text part and a normal stop reason.
pub fn assistant(text: &str) -> Message {
    assistant_with_stop(text, StopReason::Normal)
}

pub fn assistant_with_stop(text: &str, stop_reason: StopReason) -> Message {
    Message::Assistant {
        content: MessageContent::Parts(vec![ContentPart::text(text)]),
        stop_reason,
    }
}

/// Assistant message carrying only a tool call (no text).
pub fn tool_call() -> Message {
    Message::Assistant {
        content: MessageContent::Parts(vec![ContentPart::Other]),
        stop_reason: StopReason::Other,
    }
}

pub fn tool_result(tool_name: &str, is_error: bool) -> Message {
    Message::ToolResult {
        content: MessageContent::Text("output".to_string()),
        tool_name: tool_name.to_string(),
        is_error,
    }
}

/// Model the test hosts report as active.
pub fn active_model() -> Model {
    Model::new("anthropic", "claude-sonnet-4-5")
}

/// Rendezvous that parks a scripted completion mid-call.
///
/// The completion signals `entered` and then waits for `release`, letting a
/// test interleave input events while classification is in flight.
#[derive(Debug, Default)]
pub struct CompletionGate {
    entered: Notify,
    release: Notify,
}

impl CompletionGate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Wait until a completion call is parked on this gate.
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    /// Let the parked completion call return.
    pub fn release(&self) {
        self.release.notify_one();
    }

    async fn park(&self) {
        self.entered.notify_one();
        self.release.notified().await;
    }
}

/// A completion call observed by [`ScriptedCompletion`].
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub model: Model,
    pub request: CompletionRequest,
    pub options: CompletionOptions,
}

impl RecordedCall {
    /// Text of the single user message carrying the context window.
    pub fn context(&self) -> String {
        self.request
            .messages
            .iter()
            .map(crate::core::extract::message_text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Completion returning predetermined responses in order.
///
/// Running out of responses is an error, which the classifier treats like any
/// other backend failure.
pub struct ScriptedCompletion {
    responses: Mutex<VecDeque<Result<CompletionResponse>>>,
    calls: Mutex<Vec<RecordedCall>>,
    gate: Option<Arc<CompletionGate>>,
}

impl ScriptedCompletion {
    pub fn new(responses: Vec<Result<CompletionResponse>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            calls: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    /// Successful text responses, one per label.
    pub fn labels(labels: &[&str]) -> Self {
        Self::new(
            labels
                .iter()
                .map(|label| Ok(CompletionResponse::text(*label)))
                .collect(),
        )
    }

    /// Park every call on `gate` before responding.
    pub fn with_gate(mut self, gate: Arc<CompletionGate>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().expect("calls lock").len()
    }
}

#[async_trait]
impl Completion for ScriptedCompletion {
    async fn complete(
        &self,
        model: &Model,
        request: &CompletionRequest,
        options: &CompletionOptions,
    ) -> Result<CompletionResponse> {
        self.calls.lock().expect("calls lock").push(RecordedCall {
            model: model.clone(),
            request: request.clone(),
            options: options.clone(),
        });
        if let Some(gate) = &self.gate {
            gate.park().await;
        }
        self.responses
            .lock()
            .expect("responses lock")
            .pop_front()
            .unwrap_or_else(|| Err(anyhow!("no more scripted responses")))
    }
}

/// Resolver over a fixed model list with one key for every model.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    models: Vec<Model>,
    api_key: Option<String>,
}

impl StaticResolver {
    /// Knows the default classifier model and returns [`TEST_API_KEY`].
    pub fn with_key() -> Self {
        Self {
            models: vec![Model::new("anthropic", "claude-haiku-4-5")],
            api_key: Some(TEST_API_KEY.to_string()),
        }
    }

    /// Knows no models and has no credentials.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn models(mut self, models: Vec<Model>) -> Self {
        self.models = models;
        self
    }
}

impl ModelResolver for StaticResolver {
    fn find_model(&self, provider: &str, id: &str) -> Option<Model> {
        self.models
            .iter()
            .find(|model| model.provider == provider && model.id == id)
            .cloned()
    }

    fn api_key(&self, _model: &Model) -> Option<String> {
        self.api_key.clone()
    }
}

/// Host whose idleness and pending state tests can flip at any time.
pub struct RecordingHost {
    idle: AtomicBool,
    pending: AtomicBool,
    active_model: Mutex<Option<Model>>,
    follow_ups: Mutex<Vec<FollowUp>>,
    notifications: Mutex<Vec<(String, NotifyLevel)>>,
}

impl Default for RecordingHost {
    fn default() -> Self {
        Self {
            idle: AtomicBool::new(true),
            pending: AtomicBool::new(false),
            active_model: Mutex::new(Some(active_model())),
            follow_ups: Mutex::new(Vec::new()),
            notifications: Mutex::new(Vec::new()),
        }
    }
}

impl RecordingHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_idle(&self, idle: bool) {
        self.idle.store(idle, Ordering::SeqCst);
    }

    pub fn set_pending(&self, pending: bool) {
        self.pending.store(pending, Ordering::SeqCst);
    }

    pub fn set_active_model(&self, model: Option<Model>) {
        *self.active_model.lock().expect("model lock") = model;
    }

    pub fn follow_ups(&self) -> Vec<FollowUp> {
        self.follow_ups.lock().expect("follow-ups lock").clone()
    }

    pub fn notifications(&self) -> Vec<(String, NotifyLevel)> {
        self.notifications.lock().expect("notifications lock").clone()
    }
}

impl Host for RecordingHost {
    fn is_idle(&self) -> bool {
        self.idle.load(Ordering::SeqCst)
    }

    fn has_pending_messages(&self) -> bool {
        self.pending.load(Ordering::SeqCst)
    }

    fn active_model(&self) -> Option<Model> {
        self.active_model.lock().expect("model lock").clone()
    }

    fn enqueue_follow_up(&self, content: &str, options: FollowUpOptions) {
        self.follow_ups
            .lock()
            .expect("follow-ups lock")
            .push(FollowUp {
                content: content.to_string(),
                options,
            });
    }

    fn notify(&self, text: &str, level: NotifyLevel) {
        self.notifications
            .lock()
            .expect("notifications lock")
            .push((text.to_string(), level));
    }
}
