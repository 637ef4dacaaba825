use async_trait::async_trait;
use indoc::indoc;
use serde_json::json;
use std::sync::Arc;

use crate::errors::{AgentError, AgentResult};
use crate::models::content::Content;
use crate::models::tool::{Tool, ToolCall};
use crate::systems::System;
use crate::todo::TodoLedger;

pub const TODO_WRITE_TOOL_NAME: &str = "TodoWrite";

/// Exposes a shared [`TodoLedger`] to the model through the `TodoWrite` tool
pub struct TodoSystem {
    tools: Vec<Tool>,
    ledger: Arc<TodoLedger>,
}

impl TodoSystem {
    pub fn new(ledger: Arc<TodoLedger>) -> Self {
        let todo_write = Tool::new(
            TODO_WRITE_TOOL_NAME,
            "Update the shared todo list.",
            json!({
                "type": "object",
                "required": ["items"],
                "properties": {
                    "items": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "required": ["content", "activeForm", "status"],
                            "properties": {
                                "id": {"type": "string"},
                                "content": {"type": "string"},
                                "activeForm": {"type": "string"},
                                "status": {
                                    "type": "string",
                                    "enum": ["pending", "in_progress", "completed"]
                                }
                            }
                        }
                    }
                }
            }),
        );
        Self {
            tools: vec![todo_write],
            ledger,
        }
    }

    pub fn ledger(&self) -> &Arc<TodoLedger> {
        &self.ledger
    }

    fn todo_write(&self, tool_call: &ToolCall) -> AgentResult<Vec<Content>> {
        let items = tool_call
            .arguments
            .get("items")
            .cloned()
            .unwrap_or_else(|| json!([]));
        let view = self.ledger.update(&items)?;
        let stats = self.ledger.stats();
        Ok(vec![Content::text(format!(
            "{}\n\n({}/{} completed)",
            view, stats.completed, stats.total
        ))])
    }
}

#[async_trait]
impl System for TodoSystem {
    fn name(&self) -> &str {
        "TodoSystem"
    }

    fn description(&self) -> &str {
        "A shared todo list for tracking multi-step work"
    }

    fn instructions(&self) -> &str {
        indoc! {"
            Keep the list short and current. Mark exactly one item in_progress while you work on it
            and mark items completed as soon as they are done."}
    }

    fn tools(&self) -> &[Tool] {
        &self.tools
    }

    async fn call(&self, tool_call: ToolCall) -> AgentResult<Vec<Content>> {
        match tool_call.name.as_str() {
            TODO_WRITE_TOOL_NAME => self.todo_write(&tool_call),
            _ => Err(AgentError::ToolNotFound(tool_call.name)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(contents: &[Content]) -> &str {
        contents[0].as_text().unwrap()
    }

    #[tokio::test]
    async fn test_todo_write_scenario() {
        let system = TodoSystem::new(Arc::new(TodoLedger::new()));

        let first = system
            .call(ToolCall::new(
                TODO_WRITE_TOOL_NAME,
                json!({"items": [{"content": "a", "activeForm": "Doing a", "status": "pending"}]}),
            ))
            .await
            .unwrap();
        assert_eq!(text(&first), "[ ] a\n\n(0/1 completed)");

        let second = system
            .call(ToolCall::new(
                TODO_WRITE_TOOL_NAME,
                json!({"items": [{"id": "1", "content": "a", "activeForm": "Doing a", "status": "completed"}]}),
            ))
            .await
            .unwrap();
        assert_eq!(text(&second), "[x] a\n\n(1/1 completed)");
        assert_eq!(system.ledger().stats().completed, 1);
    }

    #[tokio::test]
    async fn test_todo_write_validation_error() {
        let system = TodoSystem::new(Arc::new(TodoLedger::new()));
        let error = system
            .call(ToolCall::new(
                TODO_WRITE_TOOL_NAME,
                json!({"items": [{"content": "a", "activeForm": ""}]}),
            ))
            .await
            .unwrap_err();
        assert!(matches!(error, AgentError::Validation(_)));
    }
}
