use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::sink::Sink;

const MAX_TOOL_LABEL: usize = 40;

#[derive(Debug, Default)]
struct ProgressState {
    tool_calls: Vec<String>,
    finished: bool,
}

/// Tracks the tool calls of one running sub-agent and keeps a single status line up to date.
pub struct ProgressReporter {
    agent_type: String,
    description: String,
    sink: Arc<dyn Sink>,
    start: Instant,
    state: Mutex<ProgressState>,
}

impl ProgressReporter {
    pub fn new(agent_type: &str, description: &str, sink: Arc<dyn Sink>) -> Self {
        Self {
            agent_type: agent_type.to_string(),
            description: description.to_string(),
            sink,
            start: Instant::now(),
            state: Mutex::new(ProgressState::default()),
        }
    }

    pub fn agent_type(&self) -> &str {
        &self.agent_type
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Record a tool call and redraw the status line
    pub fn update(&self, tool_name: &str, tool_arg: Option<&str>) {
        let display = match tool_arg {
            Some(arg) if !arg.is_empty() => format!("{}({})", tool_name, arg),
            _ => tool_name.to_string(),
        };
        let line = {
            let mut state = self.lock();
            state.tool_calls.push(display);
            self.status_line(&state)
        };
        self.sink.status(&line);
    }

    pub fn tool_calls(&self) -> Vec<String> {
        self.lock().tool_calls.clone()
    }

    /// Clear the status line and return the summary. Later calls return the same summary
    /// without touching the sink again.
    pub fn finish(&self) -> String {
        let (count, first) = {
            let mut state = self.lock();
            let first = !state.finished;
            state.finished = true;
            (state.tool_calls.len(), first)
        };
        if first {
            self.sink.clear_status();
        }
        format!(
            "completed: {} tool calls in {:.1}s",
            count,
            self.start.elapsed().as_secs_f64()
        )
    }

    fn status_line(&self, state: &ProgressState) -> String {
        let last = state
            .tool_calls
            .last()
            .map(String::as_str)
            .unwrap_or("starting...");
        let last = if last.chars().count() > MAX_TOOL_LABEL {
            let cut: String = last.chars().take(MAX_TOOL_LABEL - 3).collect();
            format!("{}...", cut)
        } else {
            last.to_string()
        };
        format!(
            "| {} (+{} tool uses, {:.1}s)",
            last,
            state.tool_calls.len(),
            self.start.elapsed().as_secs_f64()
        )
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ProgressState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::recording::RecordingSink;

    #[test]
    fn test_update_renders_collapsing_line() {
        let sink = Arc::new(RecordingSink::default());
        let reporter = ProgressReporter::new("explore", "scan repo", sink.clone());

        reporter.update("Bash", Some("ls"));
        reporter.update("Read", None);

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert!(events[0].starts_with("status: | Bash(ls) (+1 tool uses,"));
        assert!(events[1].starts_with("status: | Read (+2 tool uses,"));
        assert_eq!(reporter.tool_calls(), vec!["Bash(ls)", "Read"]);
    }

    #[test]
    fn test_long_tool_label_is_truncated() {
        let sink = Arc::new(RecordingSink::default());
        let reporter = ProgressReporter::new("explore", "scan", sink.clone());
        reporter.update("Bash", Some(&"x".repeat(100)));

        let event = &sink.events()[0];
        let label = event
            .trim_start_matches("status: | ")
            .split(" (+")
            .next()
            .unwrap();
        assert_eq!(label.chars().count(), MAX_TOOL_LABEL);
        assert!(label.ends_with("..."));
    }

    #[test]
    fn test_finish_clears_once() {
        let sink = Arc::new(RecordingSink::default());
        let reporter = ProgressReporter::new("code", "fix bug", sink.clone());
        reporter.update("Write", Some("a.txt"));

        let summary = reporter.finish();
        assert!(summary.starts_with("completed: 1 tool calls in "));
        assert!(summary.ends_with('s'));
        reporter.finish();

        let clears = sink
            .events()
            .iter()
            .filter(|e| e.as_str() == "clear_status")
            .count();
        assert_eq!(clears, 1);
    }
}
