//! Single-round tool-call orchestration
//!
//! One request goes through at most one resolve-execute-resume cycle:
//! forward, run any tool calls the model asked for, then send exactly one
//! follow-up with tools stripped and relay that reply.

use serde_json::{json, Map, Value};
use std::fmt;
use std::sync::Arc;

use crate::agent::llm::{BackendResponse, ChatBackend, ToolCall};
use crate::agent::tools::{ToolContext, ToolResult};
use crate::error::{ProxyError, ToolError};

/// Where a request is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Forwarding,
    AwaitingModelReply,
    NoToolCalls,
    HasToolCalls,
    ExecutingTools,
    AppendingResults,
    FollowUpForwarding,
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Forwarding => "forwarding",
            Phase::AwaitingModelReply => "awaiting_model_reply",
            Phase::NoToolCalls => "no_tool_calls",
            Phase::HasToolCalls => "has_tool_calls",
            Phase::ExecutingTools => "executing_tools",
            Phase::AppendingResults => "appending_results",
            Phase::FollowUpForwarding => "follow_up_forwarding",
            Phase::Done => "done",
        };
        f.write_str(name)
    }
}

/// A tool call that ran, with the result sent back to the model
#[derive(Debug, Clone)]
pub struct ExecutedCall {
    pub id: String,
    pub name: String,
    pub result: ToolResult,
}

impl ExecutedCall {
    /// The `role: tool` message carrying this result
    pub fn to_message(&self) -> Value {
        json!({
            "role": "tool",
            "tool_call_id": self.id,
            "name": self.name,
            "content": self.result.to_content(),
        })
    }
}

/// Drives chat completions through the tool round
#[derive(Clone)]
pub struct Orchestrator {
    backend: Arc<dyn ChatBackend>,
    tools: ToolContext,
}

impl Orchestrator {
    pub fn new(backend: Arc<dyn ChatBackend>, tools: ToolContext) -> Self {
        Self { backend, tools }
    }

    pub fn backend(&self) -> &Arc<dyn ChatBackend> {
        &self.backend
    }

    pub fn tools(&self) -> &ToolContext {
        &self.tools
    }

    /// Handle one chat completion request body
    pub async fn handle(&self, mut request: Value) -> Result<BackendResponse, ProxyError> {
        let body = request.as_object_mut().ok_or_else(|| {
            ProxyError::InvalidRequest("request body must be a JSON object".to_string())
        })?;

        if needs_catalog(body) {
            let catalog = self.tools.tools_json();
            tracing::debug!(count = catalog.len(), "Injecting tool catalog");
            body.insert("tools".to_string(), Value::Array(catalog));
        }

        self.enter(Phase::Forwarding);
        let reply = self.backend.chat_completions(&request).await?;
        self.enter(Phase::AwaitingModelReply);

        let Some((assistant, calls)) = requested_tool_calls(&reply) else {
            self.enter(Phase::NoToolCalls);
            self.enter(Phase::Done);
            return Ok(reply);
        };
        self.enter(Phase::HasToolCalls);
        tracing::info!(count = calls.len(), "Model requested tool calls");

        self.enter(Phase::ExecutingTools);
        let mut executed = Vec::with_capacity(calls.len());
        for raw in calls {
            executed.push(self.execute_call(raw).await);
        }

        self.enter(Phase::AppendingResults);
        let body = request.as_object_mut().ok_or_else(|| {
            ProxyError::InvalidRequest("request body must be a JSON object".to_string())
        })?;
        append_results(body, assistant, &executed)?;
        body.remove("tools");
        body.remove("tool_choice");

        self.enter(Phase::FollowUpForwarding);
        let follow_up = self.backend.chat_completions(&request).await?;
        self.enter(Phase::Done);
        Ok(follow_up)
    }

    async fn execute_call(&self, raw: Value) -> ExecutedCall {
        let id = raw
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let raw_name = raw
            .pointer("/function/name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        match serde_json::from_value::<ToolCall>(raw) {
            Ok(call) => {
                let result = self
                    .tools
                    .execute(&call.function.name, &call.function.arguments)
                    .await;
                ExecutedCall {
                    id,
                    name: call.function.name,
                    result,
                }
            }
            Err(e) => {
                tracing::warn!(id = %id, error = %e, "Malformed tool call");
                ExecutedCall {
                    id,
                    name: raw_name,
                    result: ToolResult::failure(&ToolError::InvalidArguments(format!(
                        "malformed tool call: {}",
                        e
                    ))),
                }
            }
        }
    }

    fn enter(&self, phase: Phase) {
        tracing::debug!(%phase, "Orchestrator phase");
    }
}

fn needs_catalog(body: &Map<String, Value>) -> bool {
    match body.get("tools") {
        None | Some(Value::Null) => true,
        Some(Value::Array(tools)) => tools.is_empty(),
        Some(_) => false,
    }
}

/// The first choice's assistant message and its tool calls, if any.
///
/// Only successful JSON replies are inspected.
fn requested_tool_calls(reply: &BackendResponse) -> Option<(Value, Vec<Value>)> {
    if !reply.status.is_success() {
        return None;
    }
    let json = reply.json()?;
    let message = json.get("choices")?.get(0)?.get("message")?;
    let calls = message.get("tool_calls")?.as_array()?;
    if calls.is_empty() {
        return None;
    }
    Some((message.clone(), calls.clone()))
}

fn append_results(
    body: &mut Map<String, Value>,
    assistant: Value,
    executed: &[ExecutedCall],
) -> Result<(), ProxyError> {
    let messages = body
        .entry("messages")
        .or_insert_with(|| Value::Array(Vec::new()));
    let Value::Array(messages) = messages else {
        return Err(ProxyError::InvalidRequest(
            "messages must be an array".to_string(),
        ));
    };

    messages.push(assistant);
    messages.extend(executed.iter().map(ExecutedCall::to_message));
    Ok(())
}
