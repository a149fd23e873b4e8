//! Planning Oracle Client
//!
//! Formats the ordered request (system directive, prior turns, new user
//! message) for an OpenAI-compatible completion endpoint running in planner
//! mode, and hands back the completion text verbatim.

use crate::session::{Role, Turn};
use async_openai::{Client, config::OpenAIConfig, error::OpenAIError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

pub const DEFAULT_API_BASE: &str = "https://api.asi1.ai/v1";
pub const DEFAULT_MODEL: &str = "asi1";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Extra time the HTTP layer allows beyond the oracle timeout, so the outer
/// deadline is the one that reports.
const HTTP_TIMEOUT_GRACE: Duration = Duration::from_secs(5);

/// The oracle's reply, passed through without structural validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanReply {
    pub text: String,
}

/// The planning endpoint could not produce a reply.
///
/// Every variant belongs to the same failure class: the caller reports it to
/// the user once and does not retry.
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("Planning oracle timed out after {0:?}")]
    Timeout(Duration),
    /// Network failure, non-success status, or a body that does not parse.
    #[error("Planning oracle request failed: {0}")]
    Request(#[from] OpenAIError),
    #[error("Planning oracle returned no completion text")]
    EmptyCompletion,
    #[error("Planning oracle client could not be built: {0}")]
    Setup(#[from] reqwest::Error),
}

/// Anything that can turn a conversation into the next planner reply.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PlanningOracle: Send + Sync {
    /// Requests one completion for `history` followed by `new_message`.
    async fn plan(
        &self,
        system_prompt: &str,
        history: &[Turn],
        new_message: &str,
    ) -> Result<PlanReply, OracleError>;
}

/// A role-tagged message as sent to the completion endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OracleMessage {
    pub role: &'static str,
    pub content: String,
}

impl OracleMessage {
    fn new(role: &'static str, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Builds the ordered payload `[system, ...history, user]`.
pub fn build_messages(system_prompt: &str, history: &[Turn], new_message: &str) -> Vec<OracleMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(OracleMessage::new("system", system_prompt));
    messages.extend(history.iter().map(|turn| {
        let role = match turn.role {
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        OracleMessage::new(role, turn.content.clone())
    }));
    messages.push(OracleMessage::new("user", new_message));
    messages
}

/// Connection and sampling settings for [`OpenAICompatibleOracle`].
#[derive(Debug, Clone)]
pub struct OracleSettings {
    pub api_base: String,
    pub api_key: String,
    pub model: String,
    pub timeout: Duration,
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
    pub presence_penalty: f32,
    pub frequency_penalty: f32,
}

impl OracleSettings {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            temperature: 0.4,
            top_p: 0.9,
            max_tokens: 2000,
            presence_penalty: 0.1,
            frequency_penalty: 0.1,
        }
    }
}

/// Chat completion request with the planner-mode extensions.
#[derive(Debug, Serialize)]
struct PlannerRequest<'a> {
    model: &'a str,
    messages: Vec<OracleMessage>,
    temperature: f32,
    top_p: f32,
    max_tokens: u32,
    presence_penalty: f32,
    frequency_penalty: f32,
    stream: bool,
    planner_mode: bool,
    web_search: bool,
}

impl<'a> PlannerRequest<'a> {
    fn new(settings: &'a OracleSettings, messages: Vec<OracleMessage>) -> Self {
        Self {
            model: &settings.model,
            messages,
            temperature: settings.temperature,
            top_p: settings.top_p,
            max_tokens: settings.max_tokens,
            presence_penalty: settings.presence_penalty,
            frequency_penalty: settings.frequency_penalty,
            stream: false,
            planner_mode: true,
            web_search: false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct PlannerCompletion {
    #[serde(default)]
    choices: Vec<PlannerChoice>,
}

#[derive(Debug, Deserialize)]
struct PlannerChoice {
    message: PlannerChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct PlannerChoiceMessage {
    content: Option<String>,
}

impl PlannerCompletion {
    fn into_reply(self) -> Result<PlanReply, OracleError> {
        self.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.is_empty())
            .map(|text| PlanReply { text })
            .ok_or(OracleError::EmptyCompletion)
    }
}

/// A [`PlanningOracle`] backed by any OpenAI-compatible chat completion API.
pub struct OpenAICompatibleOracle {
    client: Client<OpenAIConfig>,
    settings: OracleSettings,
}

impl OpenAICompatibleOracle {
    /// Creates a client whose HTTP layer backs up the oracle timeout.
    ///
    /// The library's rate-limit backoff is disabled so a failed call surfaces
    /// immediately instead of being re-sent.
    pub fn new(settings: OracleSettings) -> Result<Self, OracleError> {
        let config = OpenAIConfig::new()
            .with_api_key(&settings.api_key)
            .with_api_base(&settings.api_base);
        let http_client = reqwest::Client::builder()
            .timeout(settings.timeout + HTTP_TIMEOUT_GRACE)
            .build()?;
        let no_retry = backoff::ExponentialBackoffBuilder::new()
            .with_max_elapsed_time(Some(Duration::ZERO))
            .build();
        let client = Client::with_config(config)
            .with_http_client(http_client)
            .with_backoff(no_retry);
        Ok(Self { client, settings })
    }

}

#[async_trait]
impl PlanningOracle for OpenAICompatibleOracle {
    #[instrument(skip_all, fields(model = %self.settings.model, history_len = history.len()))]
    async fn plan(
        &self,
        system_prompt: &str,
        history: &[Turn],
        new_message: &str,
    ) -> Result<PlanReply, OracleError> {
        let messages = build_messages(system_prompt, history, new_message);
        let request = PlannerRequest::new(&self.settings, messages);
        debug!(messages = request.messages.len(), "Sending planner request");

        let completion: PlannerCompletion = tokio::time::timeout(
            self.settings.timeout,
            self.client.chat().create_byot(request),
        )
        .await
        .map_err(|_| OracleError::Timeout(self.settings.timeout))?
        .map_err(|e| match e {
            OpenAIError::Reqwest(ref inner) if inner.is_timeout() => {
                OracleError::Timeout(self.settings.timeout)
            }
            other => OracleError::Request(other),
        })?;

        let reply = completion.into_reply()?;
        debug!(reply_len = reply.text.len(), "Planner reply received");
        Ok(reply)
    }
}
