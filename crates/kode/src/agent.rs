use futures::future::BoxFuture;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

use crate::errors::{AgentError, AgentResult};
use crate::models::content::Content;
use crate::models::message::{Message, ToolRequest};
use crate::models::tool::{Tool, ToolCall};
use crate::progress::ProgressReporter;
use crate::prompt_template::load_prompt_file;
use crate::providers::base::Provider;
use crate::registry::{AgentRegistry, TASK_TOOL_NAME};
use crate::sink::Sink;
use crate::subagent;
use crate::systems::developer::DEFAULT_TIMEOUT_MS;
use crate::systems::{DeveloperSystem, System, TodoSystem};
use crate::todo::TodoLedger;
use crate::truncation::{clamp_text, MAX_TOOL_RESULT_CHARS};

/// Length of the tool result preview shown in interactive mode
const PREVIEW_CHARS: usize = 500;

#[derive(Clone, Debug, Serialize)]
struct SystemInfo {
    name: String,
    description: String,
    instructions: String,
}

impl SystemInfo {
    fn new(name: &str, description: &str, instructions: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            instructions: instructions.to_string(),
        }
    }
}

#[derive(Serialize)]
struct SystemPromptContext {
    workdir: String,
    systems: Vec<SystemInfo>,
    agent_types: String,
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub workdir: PathBuf,
    /// How many levels of sub-agents may be nested below the top-level agent
    pub max_depth: usize,
    pub max_tool_result_chars: usize,
    pub bash_timeout_ms: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            workdir: PathBuf::from("."),
            max_depth: 1,
            max_tool_result_chars: MAX_TOOL_RESULT_CHARS,
            bash_timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

/// Where one invocation of the loop sends its output
pub enum OutputMode {
    /// Text, tool lines and the busy indicator go to the sink
    Interactive,
    /// Only tool activity is recorded, through the sub-agent's reporter
    Silent(Arc<ProgressReporter>),
}

/// Everything one run of the loop needs besides the agent itself
pub struct Invocation {
    pub depth: usize,
    pub system_prompt: String,
    pub tools: Vec<Tool>,
    pub sink: Arc<dyn Sink>,
    pub mode: OutputMode,
}

impl Invocation {
    pub fn is_silent(&self) -> bool {
        matches!(self.mode, OutputMode::Silent(_))
    }

    pub fn permits(&self, tool_name: &str) -> bool {
        self.tools.iter().any(|t| t.name == tool_name)
    }
}

struct BusyGuard<'a> {
    sink: Option<&'a dyn Sink>,
}

impl<'a> BusyGuard<'a> {
    fn show(invocation: &'a Invocation) -> Self {
        if invocation.is_silent() {
            return Self { sink: None };
        }
        invocation.sink.show_busy(invocation.depth);
        Self {
            sink: Some(invocation.sink.as_ref()),
        }
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        if let Some(sink) = self.sink {
            sink.hide_busy();
        }
    }
}

/// Agent integrates a foundational LLM with the systems it needs to pilot
pub struct Agent {
    systems: Vec<Box<dyn System>>,
    provider: Arc<dyn Provider>,
    registry: AgentRegistry,
    config: AgentConfig,
}

impl Agent {
    /// Create a new Agent with the specified provider and no systems
    pub fn new(provider: Arc<dyn Provider>, config: AgentConfig) -> Self {
        Self {
            systems: Vec::new(),
            provider,
            registry: AgentRegistry::builtin(),
            config,
        }
    }

    /// An agent with the developer tools and a fresh todo ledger
    pub fn with_builtin_systems(
        provider: Arc<dyn Provider>,
        config: AgentConfig,
    ) -> AgentResult<Self> {
        let developer = DeveloperSystem::new(&config.workdir)?
            .with_max_result_chars(config.max_tool_result_chars)
            .with_default_timeout_ms(config.bash_timeout_ms);
        let mut agent = Self::new(provider, config);
        agent.add_system(Box::new(developer));
        agent.add_system(Box::new(TodoSystem::new(Arc::new(TodoLedger::new()))));
        Ok(agent)
    }

    /// Add a system to the agent
    pub fn add_system(&mut self, system: Box<dyn System>) {
        self.systems.push(system);
    }

    pub fn with_registry(mut self, registry: AgentRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Tools of every system, without the spawn tool
    pub fn system_tools(&self) -> Vec<Tool> {
        self.systems
            .iter()
            .flat_map(|system| system.tools().iter().cloned())
            .collect()
    }

    /// The top-level tool set: every system tool, plus `Task` when nesting is allowed
    pub fn base_tools(&self) -> Vec<Tool> {
        let mut tools = self.system_tools();
        if self.config.max_depth > 0 {
            tools.push(subagent::task_tool(&self.registry));
        }
        tools
    }

    pub fn system_prompt(&self) -> AgentResult<String> {
        let context = SystemPromptContext {
            workdir: self.config.workdir.display().to_string(),
            systems: self
                .systems
                .iter()
                .map(|system| {
                    SystemInfo::new(system.name(), system.description(), system.instructions())
                })
                .collect(),
            agent_types: self.registry.descriptions(),
        };
        load_prompt_file("system.md", &context).map_err(|e| AgentError::Internal(e.to_string()))
    }

    /// Run one top-level turn on `messages`, rendering through `sink`, and return the
    /// extended history
    pub async fn reply(
        &self,
        messages: Vec<Message>,
        sink: Arc<dyn Sink>,
    ) -> AgentResult<Vec<Message>> {
        let invocation = Invocation {
            depth: 0,
            system_prompt: self.system_prompt()?,
            tools: self.base_tools(),
            sink,
            mode: OutputMode::Interactive,
        };
        self.run(messages, &invocation).await
    }

    /// Query the model and execute its tool requests until it answers without any.
    ///
    /// Boxed because sub-agents re-enter it through the `Task` tool.
    pub fn run<'a>(
        &'a self,
        mut messages: Vec<Message>,
        invocation: &'a Invocation,
    ) -> BoxFuture<'a, AgentResult<Vec<Message>>> {
        Box::pin(async move {
            loop {
                let response = self.query(&messages, invocation).await?;

                if !invocation.is_silent() {
                    for text in response.content.iter().filter_map(|c| c.as_text()) {
                        if !text.trim().is_empty() {
                            invocation.sink.text(invocation.depth, text);
                        }
                    }
                }

                let requests: Vec<ToolRequest> =
                    response.tool_requests().into_iter().cloned().collect();
                messages.push(response);
                if requests.is_empty() {
                    return Ok(messages);
                }

                let mut tool_responses = Message::user();
                for request in &requests {
                    let output = self.dispatch(request, invocation).await;
                    tool_responses = tool_responses.with_tool_response(request.id.clone(), output);
                }
                messages.push(tool_responses);
            }
        })
    }

    async fn query(&self, messages: &[Message], invocation: &Invocation) -> AgentResult<Message> {
        tracing::debug!(
            depth = invocation.depth,
            messages = messages.len(),
            tools = invocation.tools.len(),
            "querying model"
        );
        let _busy = BusyGuard::show(invocation);
        let (response, usage) = self
            .provider
            .complete(&invocation.system_prompt, messages, &invocation.tools)
            .await
            .map_err(|e| AgentError::ModelQuery(e.to_string()))?;
        tracing::debug!(
            depth = invocation.depth,
            input_tokens = ?usage.input_tokens,
            output_tokens = ?usage.output_tokens,
            "model responded"
        );
        Ok(response)
    }

    /// Execute one tool request and report it; failures become the returned error
    async fn dispatch(
        &self,
        request: &ToolRequest,
        invocation: &Invocation,
    ) -> AgentResult<Vec<Content>> {
        let call = request.tool_call.clone()?;
        let (label, arg) = tool_label(&call);
        tracing::debug!(depth = invocation.depth, tool = %call.name, id = %request.id, "dispatching tool");

        let result = self.dispatch_call(call, invocation).await;

        match (&result, &invocation.mode) {
            // the dispatcher already announced the sub-agent and its summary
            (Ok(_), _) if label == TASK_TOOL_NAME => {}
            (Ok(contents), OutputMode::Interactive) => {
                let text = contents
                    .iter()
                    .filter_map(|c| c.as_text())
                    .collect::<Vec<_>>()
                    .join("\n");
                let preview = clamp_text(&text, PREVIEW_CHARS);
                invocation
                    .sink
                    .tool(invocation.depth, &label, arg.as_deref(), Some(&preview));
            }
            (Ok(_), OutputMode::Silent(reporter)) => reporter.update(&label, arg.as_deref()),
            (Err(e), OutputMode::Interactive) => {
                let message = format!("ERROR: {}", e);
                invocation
                    .sink
                    .tool(invocation.depth, &label, arg.as_deref(), Some(&message));
            }
            (Err(e), OutputMode::Silent(reporter)) => {
                reporter.update(&label, Some(&format!("ERROR: {}", e)))
            }
        }
        result
    }

    async fn dispatch_call(
        &self,
        call: ToolCall,
        invocation: &Invocation,
    ) -> AgentResult<Vec<Content>> {
        if !invocation.permits(&call.name) {
            tracing::warn!(depth = invocation.depth, tool = %call.name, "rejecting tool outside the invocation's tool set");
            return Err(AgentError::ToolNotFound(call.name));
        }

        if call.name == TASK_TOOL_NAME {
            let text = subagent::dispatch_task(self, &call, invocation).await?;
            return Ok(vec![Content::text(text)]);
        }

        let system = self
            .systems
            .iter()
            .find(|system| system.tools().iter().any(|t| t.name == call.name))
            .ok_or_else(|| AgentError::ToolNotFound(call.name.clone()))?;
        system.call(call).await
    }
}

/// Display name and argument summary for a tool call
pub fn tool_label(call: &ToolCall) -> (String, Option<String>) {
    let arg = |key: &str| call.str_arg(key).map(str::to_string);
    match call.name.as_str() {
        "bash" => ("Bash".to_string(), arg("command")),
        "read_file" => ("Read".to_string(), arg("path")),
        "write_file" => ("Write".to_string(), arg("path")),
        "edit_text" => (
            "Edit".to_string(),
            Some(format!(
                "{} {}",
                call.str_arg("action").unwrap_or_default(),
                call.str_arg("path").unwrap_or_default()
            )),
        ),
        TASK_TOOL_NAME => (
            TASK_TOOL_NAME.to_string(),
            Some(format!(
                "{}: {}",
                call.str_arg("subagent_type").unwrap_or_default(),
                call.str_arg("description").unwrap_or(subagent::DEFAULT_DESCRIPTION)
            )),
        ),
        other => (other.to_string(), None),
    }
}
