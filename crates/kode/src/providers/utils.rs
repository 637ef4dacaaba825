use anyhow::{anyhow, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{json, Value};
use std::collections::HashSet;

use crate::errors::AgentError;
use crate::models::message::{Message, MessageContent};
use crate::models::role::Role;
use crate::models::tool::{Tool, ToolCall};

lazy_static! {
    static ref VALID_TOOL_NAME: Regex = Regex::new(r"^[a-zA-Z0-9_-]{1,64}$").unwrap();
}

/// Convert internal messages to Anthropic content blocks.
///
/// Tool requests that failed to parse never reached the API as `tool_use` blocks, so both
/// they and their responses are sent as plain text to keep ids paired.
pub fn messages_to_anthropic_spec(messages: &[Message]) -> Vec<Value> {
    let mut unpaired: HashSet<&str> = HashSet::new();
    let mut spec = Vec::new();

    for message in messages {
        let mut blocks = Vec::new();
        for content in &message.content {
            match content {
                MessageContent::Text(text) => {
                    if !text.text.is_empty() {
                        blocks.push(json!({"type": "text", "text": text.text}));
                    }
                }
                MessageContent::ToolRequest(request) => match &request.tool_call {
                    Ok(tool_call) => blocks.push(json!({
                        "type": "tool_use",
                        "id": request.id,
                        "name": tool_call.name,
                        "input": tool_call.arguments,
                    })),
                    Err(e) => {
                        unpaired.insert(request.id.as_str());
                        blocks.push(json!({
                            "type": "text",
                            "text": format!("Invalid tool request {}: {}", request.id, e),
                        }));
                    }
                },
                MessageContent::ToolResponse(response) => {
                    if unpaired.contains(response.id.as_str()) {
                        blocks.push(json!({"type": "text", "text": response.text()}));
                    } else {
                        blocks.push(json!({
                            "type": "tool_result",
                            "tool_use_id": response.id,
                            "content": response.text(),
                            "is_error": response.is_error(),
                        }));
                    }
                }
            }
        }

        if !blocks.is_empty() {
            spec.push(json!({"role": message.role, "content": blocks}));
        }
    }

    spec
}

/// Convert internal tools to Anthropic's tool specification
pub fn tools_to_anthropic_spec(tools: &[Tool]) -> Result<Vec<Value>> {
    let mut tool_names = HashSet::new();
    let mut result = Vec::new();

    for tool in tools {
        if !tool_names.insert(&tool.name) {
            return Err(anyhow!("Duplicate tool name: {}", tool.name));
        }
        result.push(json!({
            "name": tool.name,
            "description": tool.description,
            "input_schema": tool.input_schema,
        }));
    }

    Ok(result)
}

/// Convert an Anthropic messages response to an assistant message
pub fn anthropic_response_to_message(response: &Value) -> Result<Message> {
    let blocks = response
        .get("content")
        .and_then(|c| c.as_array())
        .ok_or_else(|| anyhow!("Invalid response format from Anthropic API: missing content"))?;

    let mut content = Vec::new();
    for block in blocks {
        match block.get("type").and_then(|t| t.as_str()) {
            Some("text") => {
                let text = block.get("text").and_then(|t| t.as_str()).unwrap_or_default();
                content.push(MessageContent::text(text));
            }
            Some("tool_use") => {
                let id = block
                    .get("id")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                let name = block.get("name").and_then(|v| v.as_str()).unwrap_or_default();
                let input = block.get("input").cloned().unwrap_or_else(|| json!({}));

                let tool_call = if !is_valid_tool_name(name) {
                    Err(AgentError::ToolNotFound(format!(
                        "The provided tool name '{}' had invalid characters, it must match [a-zA-Z0-9_-]+",
                        name
                    )))
                } else if !input.is_object() {
                    Err(AgentError::InvalidArgument(format!(
                        "Tool input for id {} must be an object",
                        id
                    )))
                } else {
                    Ok(ToolCall::new(name, input))
                };
                content.push(MessageContent::tool_request(id, tool_call));
            }
            other => {
                tracing::debug!(block_type = ?other, "skipping unsupported content block");
            }
        }
    }

    Ok(Message {
        role: Role::Assistant,
        created: chrono::Utc::now().timestamp(),
        content,
    })
}

fn is_valid_tool_name(name: &str) -> bool {
    VALID_TOOL_NAME.is_match(name)
}
