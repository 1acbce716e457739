use log::{error, info, warn};
use serde::Serialize;
use serde_json::Value;
use std::{convert::Infallible, sync::Arc};
use thiserror::Error;
use warp::{
    http::{Method, StatusCode},
    hyper::body::Bytes,
    reply::{self, Reply, Response},
};

use crate::config::ServerConfig;
use crate::models::{
    Catalog, ChatMessage, CompletionRequest, ErrorReply, LevelInfo, Subject, MISSING_CREDENTIAL,
};

const UPSTREAM_ERROR: &str = "Upstream API Error";
const SERVER_CRASH: &str = "Server Crash";
const INVALID_BODY: &str = "Invalid request body";

#[derive(Clone, Debug)]
pub struct Upstream {
    http: reqwest::Client,
    url: String,
    model: String,
    api_key: Option<String>,
}

#[derive(Debug, Error)]
enum ForwardError {
    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    #[error("upstream sent an undecodable body: {0}")]
    Envelope(serde_json::Error),
}

#[derive(Debug, Serialize)]
struct UpstreamRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

impl Upstream {
    pub fn new(
        url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
    ) -> Upstream {
        Upstream {
            http: reqwest::Client::new(),
            url: url.into(),
            model: model.into(),
            api_key: api_key.filter(|key| !key.trim().is_empty()),
        }
    }

    pub fn from_config(config: &ServerConfig) -> Upstream {
        Upstream::new(
            config.upstream_url.clone(),
            config.upstream_model.clone(),
            config.api_key.clone(),
        )
    }

    pub fn has_credential(&self) -> bool {
        self.api_key.is_some()
    }

    async fn forward(&self, api_key: &str, request: CompletionRequest) -> Result<Response, ForwardError> {
        let body = UpstreamRequest {
            model: &self.model,
            messages: request.into_messages(),
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let response = self
            .http
            .post(&self.url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;

        if !status.is_success() {
            let (message, details) = match serde_json::from_slice::<Value>(&body) {
                Ok(data) => (provider_message(&data).to_owned(), data),
                Err(_err) => (
                    UPSTREAM_ERROR.to_owned(),
                    Value::String(String::from_utf8_lossy(&body).into_owned()),
                ),
            };
            warn!("upstream answered {}: {}", status, message);

            let status = StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
            return Ok(error_reply(status, &message, Some(details)));
        }

        let data: Value = serde_json::from_slice(&body).map_err(ForwardError::Envelope)?;

        info!("upstream completion succeeded");
        Ok(reply::json(&data).into_response())
    }
}

pub async fn generate(method: Method, body: Bytes, upstream: Upstream) -> Result<Response, Infallible> {
    if method != Method::POST {
        return Ok(StatusCode::METHOD_NOT_ALLOWED.into_response());
    }

    let api_key = match upstream.api_key.as_deref() {
        Some(api_key) => api_key,
        None => {
            error!("refusing completion request: no API key configured");
            return Ok(error_reply(
                StatusCode::INTERNAL_SERVER_ERROR,
                MISSING_CREDENTIAL,
                None,
            ));
        }
    };

    let request: CompletionRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(err) => {
            warn!("bad completion request: {}", err);
            return Ok(error_reply(
                StatusCode::BAD_REQUEST,
                INVALID_BODY,
                Some(Value::String(err.to_string())),
            ));
        }
    };

    info!(
        "forwarding completion request with {} message(s)",
        request.messages.len()
    );

    match upstream.forward(api_key, request).await {
        Ok(response) => Ok(response),
        Err(err) => {
            error!("completion forwarding crashed: {}", err);
            Ok(error_reply(
                StatusCode::INTERNAL_SERVER_ERROR,
                SERVER_CRASH,
                Some(Value::String(err.to_string())),
            ))
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct CatalogReply<'a> {
    subjects: &'a [Subject],
    levels: &'a [LevelInfo],
    question_counts: &'a [usize],
    default_question_count: usize,
    time_limit: u32,
}

pub fn catalog(catalog: Arc<Catalog>) -> impl Reply {
    reply::json(&CatalogReply {
        subjects: &catalog.subject,
        levels: &catalog.level,
        question_counts: &catalog.question_counts,
        default_question_count: catalog.default_question_count,
        time_limit: catalog.time_limit,
    })
}

/// Error text from a provider body: `{"error": {"message": ..}}` or
/// `{"error": ".."}`.
fn provider_message(data: &Value) -> &str {
    data.get("error")
        .and_then(|error| {
            error
                .get("message")
                .and_then(Value::as_str)
                .or_else(|| error.as_str())
        })
        .unwrap_or(UPSTREAM_ERROR)
}

fn error_reply(status: StatusCode, error: &str, details: Option<Value>) -> Response {
    let reply = ErrorReply {
        error: error.into(),
        details,
    };

    reply::with_status(reply::json(&reply), status).into_response()
}
