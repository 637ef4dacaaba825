use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while running the agent loop or one of its tools.
///
/// Everything except `ModelQuery` is caught at the tool dispatch boundary and handed back to
/// the model as an error tool response, which is why the type is serializable.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum AgentError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Path escapes workspace: {0}")]
    PathEscape(String),

    #[error("Blocked dangerous command: {0}")]
    Blocked(String),

    #[error("Command timed out after {0}ms")]
    Timeout(u64),

    #[error("Unknown agent type: {name}. Available: {available:?}")]
    UnknownAgentType {
        name: String,
        available: Vec<String>,
    },

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Sub-agent depth limit of {0} reached")]
    DepthLimit(usize),

    #[error("Tool execution failed: {0}")]
    ExecutionError(String),

    #[error("Model query failed: {0}")]
    ModelQuery(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type AgentResult<T> = Result<T, AgentError>;

impl From<std::io::Error> for AgentError {
    fn from(err: std::io::Error) -> Self {
        AgentError::ExecutionError(err.to_string())
    }
}
