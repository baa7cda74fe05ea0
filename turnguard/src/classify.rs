//! Classifier client: one model round-trip per classification pass.
//!
//! Every failure path resolves to [`Classification::Done`]. A classifier
//! malfunction must never leave the controller nudging, so nothing here
//! returns an error.

use tracing::{debug, info, instrument, warn};

use crate::core::classifier::{CLASSIFIER_SYSTEM_PROMPT, parse_classification};
use crate::core::types::{Classification, Message, Model};
use crate::io::completion::{Completion, CompletionOptions, CompletionRequest};
use crate::io::config::ClassifierConfig;
use crate::io::models::ModelResolver;

pub struct ClassifierClient<C, R> {
    completion: C,
    resolver: R,
    config: ClassifierConfig,
}

impl<C: Completion, R: ModelResolver> ClassifierClient<C, R> {
    pub fn new(completion: C, resolver: R, config: ClassifierConfig) -> Self {
        Self {
            completion,
            resolver,
            config,
        }
    }

    /// Pick the model for a pass.
    ///
    /// The configured classifier model is preferred when the conversation
    /// already runs on its provider and the registry knows it; otherwise the
    /// conversation's own model is used.
    pub fn select_model(&self, active: Option<&Model>) -> Option<Model> {
        match active {
            Some(active) if active.provider == self.config.provider => self
                .resolver
                .find_model(&self.config.provider, &self.config.model)
                .or_else(|| Some(active.clone())),
            Some(active) => Some(active.clone()),
            None => None,
        }
    }

    /// Classify one context window.
    #[instrument(skip_all, fields(context_bytes = context.len()))]
    pub async fn classify(&self, context: &str, active: Option<&Model>) -> Classification {
        let Some(model) = self.select_model(active) else {
            warn!("no model available for classification, assuming done");
            return Classification::Done;
        };
        let Some(api_key) = self.resolver.api_key(&model) else {
            warn!(%model, "no credential for classifier model, assuming done");
            return Classification::Done;
        };

        let request = CompletionRequest {
            system_prompt: Some(CLASSIFIER_SYSTEM_PROMPT.to_string()),
            messages: vec![Message::user(context)],
        };
        let options = CompletionOptions {
            api_key,
            max_tokens: Some(self.config.max_tokens),
        };

        debug!(%model, "requesting classification");
        let response = match self.completion.complete(&model, &request, &options).await {
            Ok(response) => response,
            Err(err) => {
                warn!(%model, err = %format!("{err:#}"), "classification failed, assuming done");
                return Classification::Done;
            }
        };
        if response.stop_reason.is_failure() {
            warn!(%model, stop_reason = ?response.stop_reason, "classification did not complete, assuming done");
            return Classification::Done;
        }

        let classification = parse_classification(&response.output_text());
        info!(%model, %classification, "classified turn");
        classification
    }
}
