use anyhow::Result;
use console::style;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use super::{parse_input, Input, InputType, Prompt};

const PROMPT: &str = "\x1b[1m\x1b[38;5;30mUser >> \x1b[0m";

pub struct RustylinePrompt {
    editor: DefaultEditor,
}

impl RustylinePrompt {
    pub fn new() -> Result<Self> {
        Ok(RustylinePrompt {
            editor: DefaultEditor::new()?,
        })
    }
}

/// Map one readline result to an input. Ctrl+C at the prompt only discards the line.
fn input_from_readline(line: Result<String, ReadlineError>) -> Input {
    match line {
        Ok(line) => parse_input(Some(&line)),
        Err(ReadlineError::Interrupted) => Input::ask_again(),
        Err(ReadlineError::Eof) => Input::exit(),
        Err(e) => {
            eprintln!("Input error: {}", e);
            Input::exit()
        }
    }
}

fn print_help() {
    println!("Commands:");
    println!("exit | quit | q - Exit the session (an empty line or Ctrl+D also exits)");
    println!("/? | /help - Display this help message");
    println!("Ctrl+C - Interrupt the agent (resets the interaction to before the interrupted request)");
}

impl Prompt for RustylinePrompt {
    fn get_input(&mut self) -> Result<Input> {
        let input = input_from_readline(self.editor.readline(PROMPT));
        match input.input_type {
            InputType::AskAgain => print_help(),
            InputType::Message => {
                if let Some(content) = &input.content {
                    let _ = self.editor.add_history_entry(content.as_str());
                }
            }
            InputType::Exit => {}
        }
        Ok(input)
    }

    fn render_info(&self, message: &str) {
        println!("{}", style(message).dim());
    }

    fn render_error(&self, message: &str) {
        println!("{}", style(message).red());
    }

    fn close(&self) {
        println!("{}", style("Goodbye.").dim());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ctrl_c_at_prompt_asks_again() {
        assert_eq!(
            input_from_readline(Err(ReadlineError::Interrupted)),
            Input::ask_again()
        );
    }

    #[test]
    fn test_eof_and_lines() {
        assert_eq!(input_from_readline(Err(ReadlineError::Eof)), Input::exit());
        assert_eq!(
            input_from_readline(Ok("fix the build".to_string())),
            Input::message("fix the build")
        );
        assert_eq!(input_from_readline(Ok("/help".to_string())), Input::ask_again());
    }
}
