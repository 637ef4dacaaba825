use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;
use std::sync::Mutex;
use strum_macros::{Display, EnumString};

use crate::errors::{AgentError, AgentResult};

/// Upper bound on the number of items a ledger can hold
pub const MAX_TODOS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum TodoStatus {
    Pending,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoItem {
    pub id: String,
    pub content: String,
    pub status: TodoStatus,
    pub active_form: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TodoStats {
    pub total: usize,
    pub completed: usize,
    pub in_progress: usize,
}

/// An ordered todo list shared by every agent of a session.
///
/// The only way to change it is [`TodoLedger::update`], which validates a whole batch and
/// swaps it in under the lock, so readers either see the previous list or the new one.
#[derive(Debug, Default)]
pub struct TodoLedger {
    items: Mutex<Vec<TodoItem>>,
}

impl TodoLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the ledger with `raw_items` and return the rendered view
    pub fn update(&self, raw_items: &Value) -> AgentResult<String> {
        let cleaned = validate(raw_items)?;
        let mut items = self.lock();
        *items = cleaned;
        Ok(render_items(&items))
    }

    pub fn render(&self) -> String {
        render_items(&self.lock())
    }

    pub fn stats(&self) -> TodoStats {
        let items = self.lock();
        TodoStats {
            total: items.len(),
            completed: items
                .iter()
                .filter(|t| t.status == TodoStatus::Completed)
                .count(),
            in_progress: items
                .iter()
                .filter(|t| t.status == TodoStatus::InProgress)
                .count(),
        }
    }

    pub fn items(&self) -> Vec<TodoItem> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<TodoItem>> {
        self.items.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn validate(raw_items: &Value) -> AgentResult<Vec<TodoItem>> {
    let raw_items = raw_items
        .as_array()
        .ok_or_else(|| AgentError::Validation("Todo items must be a list".into()))?;

    let mut cleaned: Vec<TodoItem> = Vec::with_capacity(raw_items.len());
    let mut in_progress = 0;
    for (i, raw) in raw_items.iter().enumerate() {
        let raw = raw
            .as_object()
            .ok_or_else(|| AgentError::Validation("Each todo must be an object".into()))?;

        let id = match raw.get("id") {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => (i + 1).to_string(),
        };
        if cleaned.iter().any(|t| t.id == id) {
            return Err(AgentError::Validation(format!("Duplicate todo id: {}", id)));
        }

        let content = string_field(raw.get("content"));
        if content.is_empty() {
            return Err(AgentError::Validation("Todo content cannot be empty".into()));
        }

        let status_raw = string_field(raw.get("status"));
        let status = if status_raw.is_empty() {
            TodoStatus::Pending
        } else {
            TodoStatus::from_str(&status_raw)
                .map_err(|_| AgentError::Validation(format!("Invalid status: {}", status_raw)))?
        };
        if status == TodoStatus::InProgress {
            in_progress += 1;
        }

        let active_form = string_field(raw.get("activeForm"));
        if active_form.is_empty() {
            return Err(AgentError::Validation("activeForm cannot be empty".into()));
        }

        cleaned.push(TodoItem {
            id,
            content,
            status,
            active_form,
        });
        if cleaned.len() > MAX_TODOS {
            return Err(AgentError::Validation(format!("Max {} todos", MAX_TODOS)));
        }
    }

    if in_progress > 1 {
        return Err(AgentError::Validation(
            "Only one task can be in_progress".into(),
        ));
    }
    Ok(cleaned)
}

fn string_field(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string().trim().to_string(),
    }
}

fn render_items(items: &[TodoItem]) -> String {
    if items.is_empty() {
        return "[ ] No todos".to_string();
    }
    items
        .iter()
        .map(|t| {
            let mark = if t.status == TodoStatus::Completed {
                "[x]"
            } else {
                "[ ]"
            };
            format!("{} {}", mark, t.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
