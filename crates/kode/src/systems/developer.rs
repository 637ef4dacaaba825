use async_trait::async_trait;
use indoc::indoc;
use serde_json::{json, Value};
use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

use crate::errors::{AgentError, AgentResult};
use crate::models::content::Content;
use crate::models::tool::{Tool, ToolCall};
use crate::process_store;
use crate::systems::System;
use crate::truncation::{clamp_text, MAX_TOOL_RESULT_CHARS};

pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
pub const MIN_TIMEOUT_MS: u64 = 1_000;
pub const MAX_TIMEOUT_MS: u64 = 120_000;

// A substring heuristic that catches obvious accidents. It is not a security boundary: any
// of these is trivially bypassed by quoting, variables or another binary.
const DENIED_SUBSTRINGS: [&str; 4] = ["rm -rf /", "shutdown", "reboot", "sudo "];

/// Shell and file tools confined to one workspace root
pub struct DeveloperSystem {
    tools: Vec<Tool>,
    root: PathBuf,
    max_result_chars: usize,
    default_timeout_ms: u64,
}

impl DeveloperSystem {
    pub fn new(root: impl AsRef<Path>) -> AgentResult<Self> {
        let root = root.as_ref().canonicalize().map_err(|e| {
            AgentError::InvalidArgument(format!(
                "Workspace '{}' is not accessible: {}",
                root.as_ref().display(),
                e
            ))
        })?;

        let bash_tool = Tool::new(
            "bash",
            "Execute a shell command in the workspace.",
            json!({
                "type": "object",
                "required": ["command"],
                "properties": {
                    "command": {"type": "string", "description": "Shell command"},
                    "timeout_ms": {
                        "type": "integer",
                        "minimum": MIN_TIMEOUT_MS,
                        "maximum": MAX_TIMEOUT_MS
                    }
                }
            }),
        );

        let read_tool = Tool::new(
            "read_file",
            "Read a UTF-8 text file.",
            json!({
                "type": "object",
                "required": ["path"],
                "properties": {
                    "path": {"type": "string"},
                    "start_line": {"type": "integer", "minimum": 1},
                    "end_line": {"type": "integer"}
                }
            }),
        );

        let write_tool = Tool::new(
            "write_file",
            "Create or overwrite a UTF-8 text file.",
            json!({
                "type": "object",
                "required": ["path", "content"],
                "properties": {
                    "path": {"type": "string"},
                    "content": {"type": "string"},
                    "mode": {"type": "string", "enum": ["overwrite", "append"]}
                }
            }),
        );

        let edit_tool = Tool::new(
            "edit_text",
            "Small, precise text edits (replace/insert/delete_range).",
            json!({
                "type": "object",
                "required": ["path", "action"],
                "properties": {
                    "path": {"type": "string"},
                    "action": {"type": "string", "enum": ["replace", "insert", "delete_range"]},
                    "find": {"type": "string"},
                    "replace": {"type": "string"},
                    "insert_after": {"type": "integer"},
                    "new_text": {"type": "string"},
                    "range": {
                        "type": "array",
                        "items": {"type": "integer"},
                        "minItems": 2,
                        "maxItems": 2
                    }
                }
            }),
        );

        Ok(Self {
            tools: vec![bash_tool, read_tool, write_tool, edit_tool],
            root,
            max_result_chars: MAX_TOOL_RESULT_CHARS,
            default_timeout_ms: DEFAULT_TIMEOUT_MS,
        })
    }

    pub fn with_max_result_chars(mut self, max_result_chars: usize) -> Self {
        self.max_result_chars = max_result_chars;
        self
    }

    pub fn with_default_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.default_timeout_ms = timeout_ms.clamp(MIN_TIMEOUT_MS, MAX_TIMEOUT_MS);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `path_str` against the workspace root, refusing anything that lands outside.
    ///
    /// `..` is resolved lexically first so a missing target still fails. The nearest existing
    /// ancestor is then canonicalized and the missing tail re-appended, so symlinks anywhere on
    /// the path cannot point out of the root.
    pub fn resolve_path(&self, path_str: &str) -> AgentResult<PathBuf> {
        let escape = || AgentError::PathEscape(path_str.to_string());
        let joined = self.root.join(path_str);

        let mut normalized = PathBuf::new();
        for component in joined.components() {
            match component {
                Component::ParentDir => {
                    if !normalized.pop() {
                        return Err(escape());
                    }
                }
                Component::CurDir => {}
                other => normalized.push(other.as_os_str()),
            }
        }
        if !normalized.starts_with(&self.root) {
            return Err(escape());
        }

        let mut tail = Vec::new();
        let mut existing = normalized.as_path();
        let mut resolved = loop {
            match existing.canonicalize() {
                Ok(canonical) => break canonical,
                Err(_) => {
                    // present on disk but unresolvable: a dangling or looping symlink
                    if existing.symlink_metadata().is_ok() {
                        return Err(escape());
                    }
                    tail.push(existing.file_name().ok_or_else(escape)?);
                    existing = existing.parent().ok_or_else(escape)?;
                }
            }
        };
        for name in tail.iter().rev() {
            resolved.push(name);
        }
        if !resolved.starts_with(&self.root) {
            return Err(escape());
        }
        Ok(resolved)
    }

    fn display_path<'a>(&self, path: &'a Path) -> std::path::Display<'a> {
        path.strip_prefix(&self.root).unwrap_or(path).display()
    }

    async fn bash(&self, params: &Value) -> AgentResult<String> {
        let command = params.get("command").and_then(|v| v.as_str()).unwrap_or("");
        if command.trim().is_empty() {
            return Err(AgentError::InvalidArgument("missing command".into()));
        }
        if let Some(denied) = DENIED_SUBSTRINGS.iter().find(|d| command.contains(*d)) {
            tracing::warn!(command, denied, "refusing deny-listed command");
            return Err(AgentError::Blocked(command.to_string()));
        }
        let timeout_ms = params
            .get("timeout_ms")
            .and_then(|v| v.as_u64())
            .unwrap_or(self.default_timeout_ms)
            .clamp(MIN_TIMEOUT_MS, MAX_TIMEOUT_MS);

        let mut child = Command::new("bash")
            .arg("-c")
            .arg(command)
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AgentError::ExecutionError(format!("Failed to spawn bash: {}", e)))?;

        let pid = child.id();
        if let Some(pid) = pid {
            process_store::store_process(pid);
        }
        tracing::debug!(command, timeout_ms, ?pid, "running shell command");

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let run = async {
            let (out, err, status) =
                tokio::join!(read_all(stdout), read_all(stderr), child.wait());
            Ok::<_, std::io::Error>((out?, err?, status?))
        };
        let outcome = tokio::time::timeout(Duration::from_millis(timeout_ms), run).await;

        let (out, err, status) = match outcome {
            Ok(result) => {
                if let Some(pid) = pid {
                    process_store::remove_process(pid);
                }
                result?
            }
            Err(_) => {
                // Kill the whole tree while the shell is still its root, then reap.
                if let Some(pid) = pid {
                    process_store::kill_process(pid);
                }
                let _ = child.kill().await;
                return Err(AgentError::Timeout(timeout_ms));
            }
        };
        tracing::debug!(command, code = ?status.code(), "shell command finished");

        let combined = format!(
            "{}\n{}",
            String::from_utf8_lossy(&out),
            String::from_utf8_lossy(&err)
        );
        let combined = combined.trim();
        if combined.is_empty() {
            return Ok("(no output)".to_string());
        }
        Ok(clamp_text(combined, self.max_result_chars))
    }

    async fn read_file(&self, params: &Value) -> AgentResult<String> {
        let path_str = require_str(params, "path")?;
        let path = self.resolve_path(path_str)?;
        let text = tokio::fs::read_to_string(&path).await.map_err(|e| {
            AgentError::ExecutionError(format!("Failed to read '{}': {}", path_str, e))
        })?;

        let lines: Vec<&str> = text.split('\n').collect();
        let len = lines.len() as i64;
        let start = match params.get("start_line").and_then(|v| v.as_i64()) {
            None | Some(0) => 0,
            Some(n) => n.saturating_sub(1).max(0),
        };
        let end = match params.get("end_line").and_then(|v| v.as_i64()) {
            None | Some(0) => len,
            Some(n) if n < 0 => len,
            Some(n) => n.min(len),
        };
        let start = start.min(end) as usize;
        let end = end as usize;

        Ok(clamp_text(&lines[start..end].join("\n"), self.max_result_chars))
    }

    async fn write_file(&self, params: &Value) -> AgentResult<String> {
        let path = self.resolve_path(require_str(params, "path")?)?;
        let content = require_str(params, "content")?;
        let append = match params.get("mode").and_then(|v| v.as_str()) {
            None | Some("overwrite") => false,
            Some("append") => true,
            Some(other) => {
                return Err(AgentError::InvalidArgument(format!(
                    "unknown mode: {}",
                    other
                )))
            }
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        if append && path.exists() {
            let mut file = tokio::fs::OpenOptions::new()
                .append(true)
                .open(&path)
                .await?;
            file.write_all(content.as_bytes()).await?;
            file.flush().await?;
        } else {
            tokio::fs::write(&path, content).await?;
        }

        Ok(format!(
            "wrote {} bytes to {}",
            content.len(),
            self.display_path(&path)
        ))
    }

    async fn edit_text(&self, params: &Value) -> AgentResult<String> {
        let path_str = require_str(params, "path")?;
        let path = self.resolve_path(path_str)?;
        let action = require_str(params, "action")?;
        let text = tokio::fs::read_to_string(&path).await.map_err(|e| {
            AgentError::ExecutionError(format!("Failed to read '{}': {}", path_str, e))
        })?;

        let (updated, summary) = match action {
            "replace" => {
                let find = params.get("find").and_then(|v| v.as_str()).unwrap_or("");
                if find.is_empty() {
                    return Err(AgentError::InvalidArgument("missing find".into()));
                }
                let replace = params.get("replace").and_then(|v| v.as_str()).unwrap_or("");
                let count = text.matches(find).count();
                (
                    text.replace(find, replace),
                    format!("replaced {} occurrence(s) in {}", count, self.display_path(&path)),
                )
            }
            "insert" => {
                let insert_after = params.get("insert_after").and_then(|v| v.as_i64());
                let new_text = params.get("new_text").and_then(|v| v.as_str()).unwrap_or("");
                let mut rows: Vec<&str> = if text.is_empty() {
                    Vec::new()
                } else {
                    text.split('\n').collect()
                };
                // A trailing newline yields an empty last row; keep inserts above it.
                let line_count = if text.ends_with('\n') {
                    rows.len() - 1
                } else {
                    rows.len()
                };
                let position = insert_after.unwrap_or(-1).clamp(0, line_count as i64) as usize;
                rows.insert(position, new_text);
                (
                    rows.join("\n"),
                    format!("inserted after line {}", position),
                )
            }
            "delete_range" => {
                let (from, to) = parse_range(params.get("range"))?;
                let mut rows: Vec<&str> = text.split('\n').collect();
                let from = from.min(rows.len());
                let to = to.min(rows.len());
                rows.drain(from..to);
                (rows.join("\n"), format!("deleted lines {}-{}", from, to))
            }
            other => {
                return Err(AgentError::InvalidArgument(format!(
                    "unknown action: {}",
                    other
                )))
            }
        };

        if updated != text {
            tokio::fs::write(&path, updated).await?;
        }
        Ok(summary)
    }
}

fn require_str<'a>(params: &'a Value, key: &str) -> AgentResult<&'a str> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| AgentError::InvalidArgument(format!("Missing '{}' parameter", key)))
}

fn parse_range(range: Option<&Value>) -> AgentResult<(usize, usize)> {
    let invalid = || {
        AgentError::InvalidArgument("range must be exactly two non-negative integers".into())
    };
    let values = range.and_then(|v| v.as_array()).ok_or_else(invalid)?;
    if values.len() != 2 {
        return Err(invalid());
    }
    let from = values[0].as_u64().ok_or_else(invalid)? as usize;
    let to = values[1].as_u64().ok_or_else(invalid)? as usize;
    if from > to {
        return Err(AgentError::InvalidArgument(format!(
            "range start {} is after end {}",
            from, to
        )));
    }
    Ok((from, to))
}

async fn read_all<R: AsyncRead + Unpin>(reader: Option<R>) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut reader) = reader {
        reader.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

#[async_trait]
impl System for DeveloperSystem {
    fn name(&self) -> &str {
        "DeveloperSystem"
    }

    fn description(&self) -> &str {
        "Shell execution and file reading, writing and editing inside the workspace"
    }

    fn instructions(&self) -> &str {
        indoc! {"
            All paths are relative to the workspace root and must stay inside it.
            Prefer read_file over cat and edit_text over rewriting whole files.
            Shell commands run with a timeout; long output is truncated."}
    }

    fn tools(&self) -> &[Tool] {
        &self.tools
    }

    async fn call(&self, tool_call: ToolCall) -> AgentResult<Vec<Content>> {
        let params = &tool_call.arguments;
        let text = match tool_call.name.as_str() {
            "bash" => self.bash(params).await?,
            "read_file" => self.read_file(params).await?,
            "write_file" => self.write_file(params).await?,
            "edit_text" => self.edit_text(params).await?,
            _ => return Err(AgentError::ToolNotFound(tool_call.name)),
        };
        Ok(vec![Content::text(text)])
    }
}
