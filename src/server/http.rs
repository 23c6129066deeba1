//! HTTP handlers for the proxy surface

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};

use crate::agent::llm::{BackendResponse, ForwardRequest};
use crate::error::ProxyError;
use crate::server::ServerState;

/// `POST /v1/chat/completions`
pub async fn chat_completions_handler(State(state): State<ServerState>, body: Bytes) -> Response {
    let request: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, "Rejected malformed chat request");
            return error_response(&ProxyError::InvalidRequest(format!("Invalid JSON body: {}", e)));
        }
    };

    match state.orchestrator.handle(request).await {
        Ok(reply) => relay(reply),
        Err(e) => {
            tracing::error!(error = %e, "Chat completion failed");
            error_response(&e)
        }
    }
}

/// `GET /v1/models`, with a synthesized listing if the backend is down
pub async fn list_models_handler(State(state): State<ServerState>) -> Response {
    match state.backend.list_models().await {
        Ok(reply) => relay(reply),
        Err(e) => {
            tracing::warn!(error = %e, "Backend model listing failed, using fallback");
            (StatusCode::OK, Json(fallback_models(&state.config.model.model_name))).into_response()
        }
    }
}

/// `GET /health`
pub async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": "tool-proxy",
        "version": crate::VERSION,
    }))
}

/// Everything else is relayed to the backend as-is
pub async fn passthrough_handler(
    State(state): State<ServerState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = ForwardRequest {
        method,
        path: uri.path().trim_start_matches('/').to_string(),
        query: uri.query().map(str::to_string),
        headers,
        body,
    };

    match state.backend.forward(request).await {
        Ok(reply) => relay(reply),
        Err(e) => {
            tracing::error!(error = %e, path = %uri.path(), "Passthrough failed");
            error_response(&e)
        }
    }
}

/// Turn a backend reply into a response with the same status, headers and body
pub fn relay(reply: BackendResponse) -> Response {
    let mut response = Response::new(Body::from(reply.body));
    *response.status_mut() = reply.status;
    *response.headers_mut() = reply.headers;
    response
}

/// OpenAI-style error envelope
pub fn error_response(error: &ProxyError) -> Response {
    let (status, message) = match error {
        ProxyError::UpstreamUnavailable(e) => (StatusCode::BAD_GATEWAY, format!("Proxy error: {}", e)),
        ProxyError::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
    };

    (
        status,
        Json(json!({
            "error": {
                "message": message,
                "type": error.error_type(),
            }
        })),
    )
        .into_response()
}

fn fallback_models(model_name: &str) -> Value {
    json!({
        "object": "list",
        "data": [{
            "id": model_name,
            "object": "model",
            "created": chrono::Utc::now().timestamp(),
            "owned_by": "tool-proxy",
        }]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_models_shape() {
        let listing = fallback_models("qwen3");
        assert_eq!(listing["object"], "list");
        assert_eq!(listing["data"][0]["id"], "qwen3");
        assert_eq!(listing["data"][0]["object"], "model");
        assert!(listing["data"][0]["created"].as_i64().unwrap() > 0);
    }

    #[test]
    fn test_invalid_request_envelope() {
        let response = error_response(&ProxyError::InvalidRequest("bad".into()));
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_relay_keeps_status_and_headers() {
        let reply = BackendResponse::from_json(StatusCode::CREATED, &json!({ "a": 1 }));
        let response = relay(reply);
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()["content-type"], "application/json");
    }
}
