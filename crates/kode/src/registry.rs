use indoc::indoc;
use serde::Serialize;

use crate::models::tool::Tool;

/// Name of the tool that spawns sub-agents
pub const TASK_TOOL_NAME: &str = "Task";

/// Which tools an agent type may use
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum AllowedTools {
    /// Every base tool
    All,
    /// Only the named tools
    Only(Vec<String>),
}

impl AllowedTools {
    pub fn only<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        AllowedTools::Only(names.into_iter().map(Into::into).collect())
    }

    pub fn permits(&self, tool_name: &str) -> bool {
        match self {
            AllowedTools::All => true,
            AllowedTools::Only(names) => names.iter().any(|n| n == tool_name),
        }
    }
}

/// A named bundle of system prompt and tool permissions for sub-agents
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentTypeSpec {
    pub name: String,
    pub description: String,
    pub allowed_tools: AllowedTools,
    pub system_prompt: String,
}

impl AgentTypeSpec {
    pub fn new<N, D, P>(name: N, description: D, allowed_tools: AllowedTools, system_prompt: P) -> Self
    where
        N: Into<String>,
        D: Into<String>,
        P: Into<String>,
    {
        Self {
            name: name.into(),
            description: description.into(),
            allowed_tools,
            system_prompt: system_prompt.into(),
        }
    }

    /// `- name: description (Tools: ...)`, as listed to the model
    pub fn summary_line(&self) -> String {
        let tools = match &self.allowed_tools {
            AllowedTools::All => "All tools".to_string(),
            AllowedTools::Only(names) => names.join(", "),
        };
        format!("- {}: {} (Tools: {})", self.name, self.description, tools)
    }
}

/// The catalog of agent types a parent may delegate to
#[derive(Debug, Clone)]
pub struct AgentRegistry {
    types: Vec<AgentTypeSpec>,
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl AgentRegistry {
    pub fn empty() -> Self {
        Self { types: Vec::new() }
    }

    /// The explore, code and plan agents
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(AgentTypeSpec::new(
            "explore",
            "Fast read-only agent for exploring codebases, finding files, and searching code",
            AllowedTools::only(["bash", "read_file"]),
            indoc! {"
                You are an exploration agent. Your job is to quickly search and understand code.
                Rules:
                - Only use read-only operations (bash for grep/find/ls, read_file)
                - Never modify files
                - Return a concise, structured summary of findings
                - Focus on answering the specific question asked"},
        ));
        registry.register(AgentTypeSpec::new(
            "code",
            "Full-featured coding agent for implementing features, fixing bugs, and refactoring",
            AllowedTools::All,
            indoc! {"
                You are a coding agent. Implement the requested changes efficiently.
                Rules:
                - Make minimal, focused changes
                - Test your changes when possible
                - Report what was changed concisely"},
        ));
        registry.register(AgentTypeSpec::new(
            "plan",
            "Planning agent for designing implementation strategies before coding",
            AllowedTools::only(["bash", "read_file"]),
            indoc! {"
                You are a planning agent. Analyze the codebase and design implementation plans.
                Rules:
                - Read relevant files to understand the codebase
                - Output a numbered step-by-step plan
                - Identify key files that need changes
                - Do NOT make any changes yourself"},
        ));
        registry
    }

    /// Add an agent type, replacing any existing type with the same name
    pub fn register(&mut self, spec: AgentTypeSpec) {
        if let Some(existing) = self.types.iter_mut().find(|t| t.name == spec.name) {
            *existing = spec;
        } else {
            self.types.push(spec);
        }
    }

    pub fn get(&self, name: &str) -> Option<&AgentTypeSpec> {
        self.types.iter().find(|t| t.name == name)
    }

    pub fn names(&self) -> Vec<String> {
        self.types.iter().map(|t| t.name.clone()).collect()
    }

    pub fn types(&self) -> &[AgentTypeSpec] {
        &self.types
    }

    /// One summary line per agent type
    pub fn descriptions(&self) -> String {
        self.types
            .iter()
            .map(AgentTypeSpec::summary_line)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Filter `base` down to what `agent_type` may use.
    ///
    /// Unknown types get the whole base set, and the spawn tool is never part of the result;
    /// whether a child may spawn again is decided by the depth policy in the dispatcher.
    pub fn tools_for(&self, agent_type: &str, base: &[Tool]) -> Vec<Tool> {
        let base = base.iter().filter(|t| t.name != TASK_TOOL_NAME);
        match self.get(agent_type).map(|spec| &spec.allowed_tools) {
            None | Some(AllowedTools::All) => base.cloned().collect(),
            Some(allowed) => base.filter(|t| allowed.permits(&t.name)).cloned().collect(),
        }
    }
}
