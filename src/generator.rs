use async_trait::async_trait;
use log::{debug, warn};
use thiserror::Error;

use crate::models::{
    ChatMessage, CompletionEnvelope, CompletionRequest, ErrorReply, Question, Role,
    MISSING_CREDENTIAL,
};
use crate::parser::{self, ParseError};

pub const RANDOM_TOPIC: &str = "random";

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("completion service has no credential configured")]
    UpstreamAuth,

    #[error("completion service failed with status {status}: {message}")]
    UpstreamApi { status: u16, message: String },

    #[error("completion response carried no message content")]
    MalformedEnvelope,

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("completion request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("generation task stopped: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl GenerationError {
    pub fn is_parse_error(&self) -> bool {
        matches!(self, GenerationError::Parse(_))
    }

    pub fn user_message(&self) -> String {
        match self {
            GenerationError::UpstreamAuth => {
                "The question service is not configured. Please contact the operator.".into()
            }
            GenerationError::UpstreamApi { message, .. } => format!(
                "Failed to generate questions ({}). Please try again.",
                message
            ),
            _ => "Failed to generate questions. Please try again.".into(),
        }
    }
}

/// Something that turns a chat conversation into the assistant's reply text.
#[async_trait]
pub trait Completion: Send + Sync + 'static {
    async fn complete(&self, request: CompletionRequest) -> Result<String, GenerationError>;
}

#[async_trait]
impl<T: Completion + ?Sized> Completion for std::sync::Arc<T> {
    async fn complete(&self, request: CompletionRequest) -> Result<String, GenerationError> {
        (**self).complete(request).await
    }
}

#[derive(Clone, Debug)]
pub struct ProxyClient {
    http: reqwest::Client,
    endpoint: String,
}

impl ProxyClient {
    pub fn new(endpoint: impl Into<String>) -> ProxyClient {
        ProxyClient {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl Completion for ProxyClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, GenerationError> {
        let response = self.http.post(&self.endpoint).json(&request).send().await?;
        let status = response.status();

        if !status.is_success() {
            let reply = response.json::<ErrorReply>().await.ok();

            return Err(match reply {
                Some(reply) if reply.error == MISSING_CREDENTIAL => GenerationError::UpstreamAuth,
                Some(reply) => GenerationError::UpstreamApi {
                    status: status.as_u16(),
                    message: reply.error,
                },
                None => GenerationError::UpstreamApi {
                    status: status.as_u16(),
                    message: status.canonical_reason().unwrap_or("unknown error").into(),
                },
            });
        }

        let envelope: CompletionEnvelope = response
            .json()
            .await
            .map_err(|_err| GenerationError::MalformedEnvelope)?;

        envelope
            .into_text()
            .ok_or(GenerationError::MalformedEnvelope)
    }
}

pub struct QuestionGenerator<C> {
    completion: C,
    system_prompt: String,
}

impl<C: Completion> QuestionGenerator<C> {
    pub fn new(completion: C, system_prompt: impl Into<String>) -> QuestionGenerator<C> {
        QuestionGenerator {
            completion,
            system_prompt: system_prompt.into(),
        }
    }

    pub fn prompt(subject_label: &str, level_label: &str, topic: &str) -> String {
        let topic = match topic.trim() {
            "" => RANDOM_TOPIC,
            topic => topic,
        };

        format!(
            "Subject: {}\nLevel: {}\nTopic: {}\n\nGenerate one question matching the conditions above.",
            subject_label, level_label, topic
        )
    }

    pub fn request(&self, subject_label: &str, level_label: &str, topic: &str) -> CompletionRequest {
        CompletionRequest {
            messages: vec![ChatMessage::new(
                Role::User,
                Self::prompt(subject_label, level_label, topic),
            )],
            system: Some(self.system_prompt.clone()),
        }
    }

    /// Asks the model for one question. Every call is independent; nothing is
    /// cached or retried.
    pub async fn generate(
        &self,
        subject_label: &str,
        level_label: &str,
        topic: &str,
    ) -> Result<Question, GenerationError> {
        let request = self.request(subject_label, level_label, topic);
        debug!("requesting question: {} / {}", subject_label, level_label);

        let text = self.completion.complete(request).await.map_err(|err| {
            warn!("completion failed: {}", err);
            err
        })?;

        parser::parse(&text).map_err(|err| {
            warn!("could not parse generated question ({}), raw output: {:?}", err, text);
            GenerationError::from(err)
        })
    }
}
