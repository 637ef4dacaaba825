//! The `Task` tool: spawning a sub-agent with its own history, tools and reporter.
//!
//! A child runs the same loop as its parent, but starts from a history holding only the
//! task prompt, sees only the tools its type allows and reports tool activity through a
//! [`ProgressReporter`] instead of the transcript. The parent only ever sees the child's
//! final text.
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

use crate::agent::{Agent, Invocation, OutputMode};
use crate::errors::{AgentError, AgentResult};
use crate::models::message::Message;
use crate::models::role::Role;
use crate::models::tool::{Tool, ToolCall};
use crate::progress::ProgressReporter;
use crate::prompt_template::load_prompt_file;
use crate::registry::{AgentRegistry, TASK_TOOL_NAME};

pub const DEFAULT_DESCRIPTION: &str = "subtask";
pub const NO_TEXT_RESULT: &str = "(subagent returned no text)";

#[derive(Serialize)]
struct SubagentPromptContext<'a> {
    agent_type: &'a str,
    workdir: String,
    system_prompt: &'a str,
}

/// The `Task` tool, advertising the registered agent types
pub fn task_tool(registry: &AgentRegistry) -> Tool {
    Tool::new(
        TASK_TOOL_NAME,
        format!(
            "Spawn a subagent for a focused subtask.\n\nAgent types:\n{}",
            registry.descriptions()
        ),
        json!({
            "type": "object",
            "required": ["description", "prompt", "subagent_type"],
            "properties": {
                "description": {"type": "string", "description": "Short task name (3-5 words)"},
                "prompt": {"type": "string", "description": "Detailed instructions"},
                "subagent_type": {"type": "string", "enum": registry.names()}
            }
        }),
    )
}

/// Parse a `Task` call and run the requested sub-agent
pub(crate) async fn dispatch_task(
    agent: &Agent,
    call: &ToolCall,
    parent: &Invocation,
) -> AgentResult<String> {
    let agent_type = call
        .str_arg("subagent_type")
        .ok_or_else(|| AgentError::InvalidArgument("Missing 'subagent_type' parameter".into()))?;
    let prompt = call.str_arg("prompt").unwrap_or_default();
    let description = call
        .str_arg("description")
        .filter(|d| !d.trim().is_empty())
        .unwrap_or(DEFAULT_DESCRIPTION);
    spawn(agent, agent_type, prompt, description, parent).await
}

/// Run a sub-agent of `agent_type` on `prompt` one level below `parent` and return its
/// final text.
///
/// Type and depth are checked before anything is shown or queried. The child's reporter is
/// finished when this future completes or is dropped.
pub async fn spawn(
    agent: &Agent,
    agent_type: &str,
    prompt: &str,
    description: &str,
    parent: &Invocation,
) -> AgentResult<String> {
    let registry = agent.registry();
    let spec = registry
        .get(agent_type)
        .ok_or_else(|| AgentError::UnknownAgentType {
            name: agent_type.to_string(),
            available: registry.names(),
        })?;

    let max_depth = agent.config().max_depth;
    if parent.depth >= max_depth {
        return Err(AgentError::DepthLimit(max_depth));
    }
    let depth = parent.depth + 1;

    let system_prompt = load_prompt_file(
        "subagent.md",
        &SubagentPromptContext {
            agent_type,
            workdir: agent.config().workdir.display().to_string(),
            system_prompt: &spec.system_prompt,
        },
    )
    .map_err(|e| AgentError::Internal(e.to_string()))?;

    let mut tools = registry.tools_for(agent_type, &agent.system_tools());
    if spec.allowed_tools.permits(TASK_TOOL_NAME) && depth < max_depth {
        tools.push(task_tool(registry));
    }

    let header = format!("{}: {}", agent_type, description);
    match &parent.mode {
        OutputMode::Interactive => {
            parent
                .sink
                .tool(parent.depth, TASK_TOOL_NAME, Some(&header), None)
        }
        OutputMode::Silent(reporter) => reporter.update(TASK_TOOL_NAME, Some(&header)),
    }
    tracing::info!(agent_type, description, depth, "spawning subagent");
    let reporter = Arc::new(ProgressReporter::new(
        agent_type,
        description,
        parent.sink.clone(),
    ));
    let _finish = FinishGuard {
        reporter: reporter.clone(),
        parent,
    };

    let invocation = Invocation {
        depth,
        system_prompt,
        tools,
        sink: parent.sink.clone(),
        mode: OutputMode::Silent(reporter),
    };
    let history = agent
        .run(vec![Message::user().with_text(prompt)], &invocation)
        .await?;

    Ok(final_text(&history))
}

/// The last non-empty text of the latest assistant message that has any
pub fn final_text(history: &[Message]) -> String {
    history
        .iter()
        .rev()
        .filter(|message| message.role == Role::Assistant)
        .find_map(|message| message.last_text())
        .map(str::to_string)
        .unwrap_or_else(|| NO_TEXT_RESULT.to_string())
}

struct FinishGuard<'a> {
    reporter: Arc<ProgressReporter>,
    parent: &'a Invocation,
}

impl Drop for FinishGuard<'_> {
    fn drop(&mut self) {
        let summary = self.reporter.finish();
        tracing::info!(agent_type = self.reporter.agent_type(), %summary, "subagent finished");
        match &self.parent.mode {
            OutputMode::Interactive => self.parent.sink.summary(self.parent.depth, &summary),
            OutputMode::Silent(_) => {
                tracing::debug!(
                    description = self.reporter.description(),
                    "nested subagent summary kept out of the transcript"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentConfig;
    use crate::providers::mock::MockProvider;
    use crate::registry::{AgentTypeSpec, AllowedTools};
    use crate::sink::recording::RecordingSink;
    use serde_json::{json, Value};
    use tempfile::TempDir;

    fn setup(provider: Arc<MockProvider>, max_depth: usize) -> (TempDir, Agent) {
        let dir = tempfile::tempdir().unwrap();
        let config = AgentConfig {
            workdir: dir.path().to_path_buf(),
            max_depth,
            ..AgentConfig::default()
        };
        let agent = Agent::with_builtin_systems(provider, config).unwrap();
        (dir, agent)
    }

    fn task_request(agent_type: &str, prompt: &str) -> Message {
        Message::assistant().with_tool_request(
            "task_1",
            Ok(ToolCall::new(
                TASK_TOOL_NAME,
                json!({"subagent_type": agent_type, "prompt": prompt, "description": "look around"}),
            )),
        )
    }

    fn tool_result(message: &Message) -> AgentResult<String> {
        let response = message.content[0].as_tool_response().unwrap();
        response.tool_result.clone().map(|_| response.text())
    }

    fn top_level(agent: &Agent, sink: Arc<RecordingSink>) -> Invocation {
        Invocation {
            depth: 0,
            system_prompt: "top".to_string(),
            tools: agent.base_tools(),
            sink,
            mode: OutputMode::Interactive,
        }
    }

    #[tokio::test]
    async fn test_subagent_runs_in_isolation() {
        let provider = Arc::new(MockProvider::new(vec![
            task_request("explore", "find the config loader"),
            Message::assistant().with_text("It lives in src/config.rs"),
            Message::assistant().with_text("All done"),
        ]));
        let (_dir, agent) = setup(provider.clone(), 1);
        let sink = Arc::new(RecordingSink::default());

        let history = vec![
            Message::user().with_text("earlier question"),
            Message::assistant().with_text("earlier answer"),
            Message::user().with_text("where is the config loaded?"),
        ];
        let history = agent.reply(history, sink.clone()).await.unwrap();

        let calls = provider.calls();
        assert_eq!(calls.len(), 3);

        let child = &calls[1];
        assert_eq!(child.messages.len(), 1);
        assert_eq!(child.messages[0].text(), "find the config loader");
        assert!(child
            .system
            .starts_with("You are a explore subagent operating in "));
        assert!(child.system.contains("You are an exploration agent."));
        assert_eq!(child.tools, vec!["bash", "read_file"]);

        assert_eq!(tool_result(&history[4]).unwrap(), "It lives in src/config.rs");
        assert_eq!(history.last().unwrap().text(), "All done");

        let events = sink.events();
        assert!(events.contains(&"tool[0]: Task(explore: look around)".to_string()));
        assert!(events.contains(&"clear_status".to_string()));
        assert!(events
            .iter()
            .any(|e| e.starts_with("summary[0]: completed: 0 tool calls in ")));
        // the child's text never reaches the transcript
        assert!(!events.iter().any(|e| e.contains("src/config.rs")));
    }

    #[tokio::test]
    async fn test_unknown_type_fails_before_querying() {
        let provider = Arc::new(MockProvider::new(vec![
            task_request("wizard", "do magic"),
            Message::assistant().with_text("ok"),
        ]));
        let (_dir, agent) = setup(provider.clone(), 1);
        let sink = Arc::new(RecordingSink::default());

        let history = agent
            .reply(vec![Message::user().with_text("go")], sink.clone())
            .await
            .unwrap();

        assert_eq!(provider.calls().len(), 2);
        assert_eq!(
            tool_result(&history[2]),
            Err(AgentError::UnknownAgentType {
                name: "wizard".into(),
                available: vec!["explore".into(), "code".into(), "plan".into()],
            })
        );
        assert!(!sink.events().iter().any(|e| e.starts_with("summary")));
    }

    #[tokio::test]
    async fn test_depth_limit() {
        let provider = Arc::new(MockProvider::new(vec![]));
        let (_dir, agent) = setup(provider.clone(), 1);
        let sink = Arc::new(RecordingSink::default());
        let reporter = Arc::new(ProgressReporter::new("code", "nested", sink.clone()));
        let parent = Invocation {
            depth: 1,
            system_prompt: "sub".to_string(),
            tools: agent.system_tools(),
            sink: sink.clone(),
            mode: OutputMode::Silent(reporter),
        };

        let error = spawn(&agent, "code", "go deeper", "nested", &parent)
            .await
            .unwrap_err();
        assert_eq!(error, AgentError::DepthLimit(1));
        assert!(provider.calls().is_empty());
        assert!(sink.events().is_empty());
    }

    #[tokio::test]
    async fn test_task_tool_offered_to_children_below_max_depth() {
        let provider = Arc::new(MockProvider::new(vec![
            Message::assistant().with_text("code child"),
            Message::assistant().with_text("explore child"),
        ]));
        let (_dir, agent) = setup(provider.clone(), 2);
        let sink = Arc::new(RecordingSink::default());
        let parent = top_level(&agent, sink);

        spawn(&agent, "code", "implement", "impl", &parent).await.unwrap();
        spawn(&agent, "explore", "look", "look", &parent).await.unwrap();

        let calls = provider.calls();
        assert_eq!(
            calls[0].tools,
            vec!["bash", "read_file", "write_file", "edit_text", "TodoWrite", "Task"]
        );
        assert_eq!(calls[1].tools, vec!["bash", "read_file"]);
    }

    #[tokio::test]
    async fn test_reporter_finished_when_child_fails() {
        let provider = Arc::new(MockProvider::scripted(vec![
            Ok(task_request("plan", "make a plan")),
            Err("connection reset"),
            Ok(Message::assistant().with_text("recovered")),
        ]));
        let (_dir, agent) = setup(provider, 1);
        let sink = Arc::new(RecordingSink::default());

        let history = agent
            .reply(vec![Message::user().with_text("plan it")], sink.clone())
            .await
            .unwrap();

        assert_eq!(
            tool_result(&history[2]),
            Err(AgentError::ModelQuery("connection reset".into()))
        );
        let events = sink.events();
        assert_eq!(
            events.iter().filter(|e| e.as_str() == "clear_status").count(),
            1
        );
        assert!(events.iter().any(|e| e.starts_with("summary[0]: completed: ")));
        assert_eq!(history.last().unwrap().text(), "recovered");
    }

    #[tokio::test]
    async fn test_child_tool_use_goes_to_status_line() {
        let provider = Arc::new(MockProvider::new(vec![
            Message::assistant()
                .with_tool_request("1", Ok(ToolCall::new("bash", json!({"command": "echo hi"})))),
            Message::assistant().with_text("saw hi"),
        ]));
        let (_dir, agent) = setup(provider, 1);
        let sink = Arc::new(RecordingSink::default());
        let parent = top_level(&agent, sink.clone());

        let text = spawn(&agent, "explore", "say hi", "greet", &parent)
            .await
            .unwrap();

        assert_eq!(text, "saw hi");
        let events = sink.events();
        assert_eq!(events[0], "tool[0]: Task(explore: greet)");
        assert!(events[1].starts_with("status: | Bash(echo hi) (+1 tool uses"));
        assert_eq!(events[2], "clear_status");
        assert!(events[3].starts_with("summary[0]: completed: 1 tool calls in "));
        assert_eq!(events.len(), 4);
    }

    #[tokio::test]
    async fn test_silent_child_without_text_returns_placeholder() {
        let provider = Arc::new(MockProvider::new(vec![]));
        let (_dir, agent) = setup(provider, 1);
        let parent = top_level(&agent, Arc::new(RecordingSink::default()));

        let text = spawn(&agent, "code", "do nothing", "noop", &parent)
            .await
            .unwrap();
        assert_eq!(text, NO_TEXT_RESULT);
    }

    #[tokio::test]
    async fn test_registered_type_is_spawnable() {
        let provider = Arc::new(MockProvider::new(vec![
            Message::assistant().with_text("reviewed")
        ]));
        let (_dir, agent) = setup(provider.clone(), 1);
        let mut registry = AgentRegistry::builtin();
        registry.register(AgentTypeSpec::new(
            "review",
            "Reviews diffs",
            AllowedTools::only(["read_file"]),
            "You review code.",
        ));
        let agent = agent.with_registry(registry);
        let parent = top_level(&agent, Arc::new(RecordingSink::default()));

        let schema: Value = parent
            .tools
            .iter()
            .find(|t| t.name == TASK_TOOL_NAME)
            .unwrap()
            .input_schema
            .clone();
        assert_eq!(
            schema["properties"]["subagent_type"]["enum"],
            json!(["explore", "code", "plan", "review"])
        );

        let text = spawn(&agent, "review", "check", "review", &parent)
            .await
            .unwrap();
        assert_eq!(text, "reviewed");
        assert_eq!(provider.calls()[0].tools, vec!["read_file"]);
    }

    #[test]
    fn test_final_text_scans_back_to_latest_text() {
        let history = vec![
            Message::user().with_text("prompt"),
            Message::assistant().with_text("first answer"),
            Message::user().with_text("ignored user text"),
            Message::assistant()
                .with_text("   ")
                .with_tool_request("1", Ok(ToolCall::new("bash", json!({"command": "ls"})))),
        ];
        assert_eq!(final_text(&history), "first answer");
        assert_eq!(final_text(&history[..1]), NO_TEXT_RESULT);
    }
}
