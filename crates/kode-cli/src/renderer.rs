use bat::WrappingMode;
use cliclack::spinner;
use console::{style, Term};
use kode::sink::Sink;
use std::sync::Mutex;

const THEME: &str = "zenburn";

/// Renders the transcript to the terminal: markdown through bat, tool lines with console
/// styling, a cliclack spinner while waiting on the model and a rewritable status line for
/// running sub-agents.
pub struct TerminalSink {
    spinner: Mutex<Option<cliclack::ProgressBar>>,
    term: Term,
}

impl Default for TerminalSink {
    fn default() -> Self {
        Self::new()
    }
}

impl TerminalSink {
    pub fn new() -> Self {
        TerminalSink {
            spinner: Mutex::new(None),
            term: Term::stdout(),
        }
    }
}

fn indent(depth: usize) -> String {
    "  ".repeat(depth)
}

fn print_markdown(content: &str) {
    let printed = bat::PrettyPrinter::new()
        .input(bat::Input::from_bytes(content.as_bytes()))
        .theme(THEME)
        .language("Markdown")
        .wrapping_mode(WrappingMode::Character)
        .print();
    if printed.is_err() {
        println!("{}", content);
    }
}

impl Sink for TerminalSink {
    fn text(&self, depth: usize, text: &str) {
        if depth == 0 {
            print_markdown(text);
            println!();
        } else {
            let prefix = indent(depth);
            for line in text.lines() {
                println!("{}{}", prefix, line);
            }
        }
    }

    fn tool(&self, depth: usize, name: &str, arg: Option<&str>, preview: Option<&str>) {
        let prefix = indent(depth);
        let body = match arg {
            Some(arg) if !arg.is_empty() => format!("{}({})...", name, arg),
            _ => name.to_string(),
        };
        println!("{}{}", prefix, style(format!("@ {}", body)).cyan().bold());
        if let Some(preview) = preview {
            let mut lines = preview.lines().peekable();
            if lines.peek().is_none() {
                println!("{}  {}", prefix, style("|").dim());
            }
            for line in lines {
                println!("{}  {} {}", prefix, style("|").dim(), line);
            }
        }
    }

    fn status(&self, line: &str) {
        let _ = self.term.clear_line();
        let _ = self.term.write_str(&style(line).dim().to_string());
    }

    fn clear_status(&self) {
        let _ = self.term.clear_line();
    }

    fn summary(&self, depth: usize, line: &str) {
        println!("{}  {} {}", indent(depth), style("|").dim(), style(line).green());
    }

    fn show_busy(&self, depth: usize) {
        let progress = spinner();
        progress.start(format!("{}Agent thinking...", indent(depth)));
        let mut slot = self.spinner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = slot.replace(progress) {
            previous.stop("");
        }
    }

    fn hide_busy(&self) {
        let mut slot = self.spinner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(progress) = slot.take() {
            progress.stop("");
        }
    }
}
