//! Client for the OpenAI-compatible model backend

use async_trait::async_trait;
use axum::body::Bytes;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::config::ModelConfig;
use crate::error::ProxyError;

/// Headers that describe a single connection and must not be forwarded
pub const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "content-length",
];

/// A backend reply, kept raw so it can be relayed unchanged
#[derive(Debug, Clone)]
pub struct BackendResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl BackendResponse {
    /// Parse the body as JSON, if it is JSON
    pub fn json(&self) -> Option<Value> {
        serde_json::from_slice(&self.body).ok()
    }

    /// Build a JSON response (used by tests and synthesized replies)
    pub fn from_json(status: StatusCode, body: &Value) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Self {
            status,
            headers,
            body: Bytes::from(body.to_string()),
        }
    }
}

/// An arbitrary request relayed to the backend
#[derive(Debug, Clone)]
pub struct ForwardRequest {
    pub method: Method,
    /// Path without the leading slash
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Tool call from a model response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub r#type: String,
    #[serde(default)]
    pub index: Option<i32>,
    pub function: FunctionCall,
}

/// Function call details
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    #[serde(default)]
    pub name: String,
    /// Arguments can arrive as either a JSON string or a raw JSON object
    #[serde(default, deserialize_with = "deserialize_arguments")]
    pub arguments: String,
}

/// Deserialize arguments that may be a JSON string or a JSON object/map.
/// Some backends return arguments as a raw object instead of a
/// stringified JSON object.
fn deserialize_arguments<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::String(s) => Ok(s),
        Value::Null => Ok(String::new()),
        other => Ok(other.to_string()),
    }
}

/// The calls to the model backend the proxy makes
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// `POST /v1/chat/completions` with the given body
    async fn chat_completions(&self, body: &Value) -> Result<BackendResponse, ProxyError>;

    /// `GET /v1/models`
    async fn list_models(&self) -> Result<BackendResponse, ProxyError>;

    /// Relay any other request
    async fn forward(&self, request: ForwardRequest) -> Result<BackendResponse, ProxyError>;
}

/// HTTP client for the model backend
#[derive(Clone)]
pub struct BackendClient {
    client: Arc<Client>,
    base_url: String,
    api_key: String,
}

impl BackendClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Result<Self, ProxyError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client: Arc::new(client),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    pub fn from_config(config: &ModelConfig) -> Result<Self, ProxyError> {
        Self::new(&config.endpoint, &config.api_key, config.request_timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.api_key.is_empty() {
            request
        } else {
            request.bearer_auth(&self.api_key)
        }
    }

    async fn collect(response: reqwest::Response) -> Result<BackendResponse, ProxyError> {
        let status = response.status();
        let headers = strip_hop_by_hop(response.headers());
        let body = response.bytes().await?;
        Ok(BackendResponse {
            status,
            headers,
            body,
        })
    }
}

#[async_trait]
impl ChatBackend for BackendClient {
    async fn chat_completions(&self, body: &Value) -> Result<BackendResponse, ProxyError> {
        let url = self.url("v1/chat/completions");
        tracing::debug!(url = %url, "Sending chat completion");

        let response = self
            .authorize(self.client.post(&url))
            .json(body)
            .send()
            .await?;
        Self::collect(response).await
    }

    async fn list_models(&self) -> Result<BackendResponse, ProxyError> {
        let response = self
            .authorize(self.client.get(self.url("v1/models")))
            .send()
            .await?;
        Self::collect(response).await
    }

    async fn forward(&self, request: ForwardRequest) -> Result<BackendResponse, ProxyError> {
        let mut url = self.url(&request.path);
        if let Some(query) = request.query.as_deref().filter(|q| !q.is_empty()) {
            url.push('?');
            url.push_str(query);
        }
        tracing::debug!(method = %request.method, url = %url, "Forwarding request");

        let mut headers = strip_hop_by_hop(&request.headers);
        headers.remove(header::HOST);
        headers.remove(header::AUTHORIZATION);

        let response = self
            .authorize(self.client.request(request.method, &url))
            .headers(headers)
            .body(request.body)
            .send()
            .await?;
        Self::collect(response).await
    }
}

/// Copy a header map without connection-scoped headers
pub fn strip_hop_by_hop(headers: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if !is_hop_by_hop(name) {
            out.append(name.clone(), value.clone());
        }
    }
    out
}

fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP_HEADERS.contains(&name.as_str())
}
