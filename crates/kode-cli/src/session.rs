use anyhow::Result;
use std::sync::Arc;

use crate::prompt::{InputType, Prompt};
use kode::agent::Agent;
use kode::errors::AgentError;
use kode::models::message::Message;
use kode::process_store;
use kode::sink::Sink;

/// How one user turn ended
#[derive(Debug)]
enum Turn {
    Completed,
    Interrupted,
    Failed(AgentError),
}

pub struct Session<'a> {
    agent: Agent,
    prompt: Box<dyn Prompt + 'a>,
    sink: Arc<dyn Sink>,
    messages: Vec<Message>,
}

impl<'a> Session<'a> {
    pub fn new(agent: Agent, prompt: Box<dyn Prompt + 'a>, sink: Arc<dyn Sink>) -> Self {
        Session {
            agent,
            prompt,
            sink,
            messages: Vec::new(),
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub async fn start(&mut self) -> Result<()> {
        self.setup_session();

        loop {
            let input = self.prompt.get_input()?;
            match input.input_type {
                InputType::Message => {
                    if let Some(content) = input.content {
                        match self.process_message(content).await {
                            Turn::Completed => {}
                            Turn::Interrupted => self.prompt.render_info(
                                "Interrupt: resetting conversation to before the last sent message",
                            ),
                            Turn::Failed(e) => self.prompt.render_error(&format!("Error: {}", e)),
                        }
                    }
                }
                InputType::Exit => break,
                InputType::AskAgain => continue,
            }
        }

        self.prompt.close();
        Ok(())
    }

    /// Run a single message without asking for further input
    pub async fn headless_start(&mut self, initial_message: String) -> Result<()> {
        match self.process_message(initial_message).await {
            Turn::Completed => Ok(()),
            Turn::Interrupted => Err(anyhow::anyhow!("Interrupted")),
            Turn::Failed(e) => Err(e.into()),
        }
    }

    /// Send `content` to the agent. The history only changes when the reply completes, so an
    /// error or Ctrl-C leaves it as it was before the message.
    async fn process_message(&mut self, content: String) -> Turn {
        let mut pending = self.messages.clone();
        pending.push(Message::user().with_text(content));

        let outcome = tokio::select! {
            result = self.agent.reply(pending, self.sink.clone()) => Some(result),
            _ = tokio::signal::ctrl_c() => None,
        };

        match outcome {
            Some(Ok(history)) => {
                self.messages = history;
                Turn::Completed
            }
            Some(Err(e)) => {
                tracing::warn!(error = %e, "reply failed");
                Turn::Failed(e)
            }
            None => {
                process_store::kill_processes();
                Turn::Interrupted
            }
        }
    }

    fn setup_session(&self) {
        let config = self.agent.config();
        self.prompt
            .render_info(&format!("Workspace: {}", config.workdir.display()));
        self.prompt.render_info(&format!(
            "Agent types: {}",
            self.agent.registry().names().join(", ")
        ));
        self.prompt.render_info("Type \"exit\" to quit, /help for commands.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::{parse_input, Input};
    use anyhow::anyhow;
    use async_trait::async_trait;
    use kode::agent::AgentConfig;
    use kode::models::tool::{Tool, ToolCall};
    use kode::providers::base::{Provider, Usage};
    use kode::sink::NullSink;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct ScriptedProvider {
        responses: Mutex<VecDeque<Result<Message, String>>>,
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        async fn complete(
            &self,
            _system: &str,
            _messages: &[Message],
            _tools: &[Tool],
        ) -> anyhow::Result<(Message, Usage)> {
            match self.responses.lock().unwrap().pop_front() {
                Some(Ok(message)) => Ok((message, Usage::default())),
                Some(Err(e)) => Err(anyhow!(e)),
                None => Ok((Message::assistant().with_text("(nothing left)"), Usage::default())),
            }
        }
    }

    #[derive(Clone, Default)]
    struct ScriptedPrompt {
        lines: Arc<Mutex<VecDeque<Option<String>>>>,
        errors: Arc<Mutex<Vec<String>>>,
    }

    impl ScriptedPrompt {
        fn new(lines: &[Option<&str>]) -> Self {
            ScriptedPrompt {
                lines: Arc::new(Mutex::new(
                    lines.iter().map(|l| l.map(str::to_string)).collect(),
                )),
                errors: Arc::default(),
            }
        }
    }

    impl Prompt for ScriptedPrompt {
        fn get_input(&mut self) -> Result<Input> {
            let line = self.lines.lock().unwrap().pop_front().flatten();
            Ok(parse_input(line.as_deref()))
        }

        fn render_info(&self, _message: &str) {}

        fn render_error(&self, message: &str) {
            self.errors.lock().unwrap().push(message.to_string());
        }
    }

    fn agent(responses: Vec<Result<Message, &str>>) -> (TempDir, Agent) {
        let dir = tempfile::tempdir().unwrap();
        let provider = ScriptedProvider {
            responses: Mutex::new(
                responses
                    .into_iter()
                    .map(|r| r.map_err(str::to_string))
                    .collect(),
            ),
        };
        let config = AgentConfig {
            workdir: dir.path().to_path_buf(),
            ..AgentConfig::default()
        };
        let agent = Agent::with_builtin_systems(Arc::new(provider), config).unwrap();
        (dir, agent)
    }

    #[tokio::test]
    async fn test_session_ends_on_exit_word() {
        let (_dir, agent) = agent(vec![Ok(Message::assistant().with_text("Hello!"))]);
        let prompt = ScriptedPrompt::new(&[Some("hi"), Some("quit"), Some("never sent")]);
        let mut session = Session::new(agent, Box::new(prompt.clone()), Arc::new(NullSink));

        session.start().await.unwrap();

        assert_eq!(session.messages().len(), 2);
        assert_eq!(session.messages()[1].text(), "Hello!");
        assert_eq!(prompt.lines.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_error_is_reported_and_history_rolled_back() {
        let (_dir, agent) = agent(vec![
            Err("overloaded"),
            Ok(Message::assistant().with_text("second try")),
        ]);
        let prompt = ScriptedPrompt::new(&[Some("first"), Some("second"), None]);
        let mut session = Session::new(agent, Box::new(prompt.clone()), Arc::new(NullSink));

        session.start().await.unwrap();

        let errors = prompt.errors.lock().unwrap().clone();
        assert_eq!(errors, vec!["Error: Model query failed: overloaded"]);
        let messages = session.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].text(), "second");
        assert_eq!(messages[1].text(), "second try");
    }

    #[tokio::test]
    async fn test_history_carries_across_turns() {
        let (dir, agent) = agent(vec![
            Ok(Message::assistant().with_tool_request(
                "1",
                Ok(ToolCall::new("write_file", json!({"path": "notes.md", "content": "# Notes"}))),
            )),
            Ok(Message::assistant().with_text("Wrote notes.md")),
            Ok(Message::assistant().with_text("It has a heading")),
        ]);
        let prompt = ScriptedPrompt::new(&[Some("write notes"), Some("what is in it?"), Some("")]);
        let mut session = Session::new(agent, Box::new(prompt), Arc::new(NullSink));

        session.start().await.unwrap();

        assert_eq!(session.messages().len(), 6);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("notes.md")).unwrap(),
            "# Notes"
        );
    }

    #[tokio::test]
    async fn test_headless_run_propagates_errors() {
        let (_dir, agent) = agent(vec![Err("bad api key")]);
        let mut session = Session::new(
            agent,
            Box::new(ScriptedPrompt::default()),
            Arc::new(NullSink),
        );

        let err = session
            .headless_start("do it".to_string())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("bad api key"));
        assert!(session.messages().is_empty());
    }
}
