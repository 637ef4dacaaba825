use anyhow::Result;

pub mod rustyline;

pub trait Prompt {
    fn get_input(&mut self) -> Result<Input>;
    /// A line of session information, outside the transcript
    fn render_info(&self, message: &str);
    fn render_error(&self, message: &str);
    fn close(&self) {}
}

#[derive(Debug, PartialEq, Eq)]
pub struct Input {
    pub input_type: InputType,
    pub content: Option<String>, // Optional content as sometimes the user may be issuing a command eg. (Exit)
}

#[derive(Debug, PartialEq, Eq)]
pub enum InputType {
    AskAgain, // Ask the user for input again. Control flow command.
    Message,  // User sent a message
    Exit,     // User wants to exit the session
}

impl Input {
    pub fn exit() -> Self {
        Input {
            input_type: InputType::Exit,
            content: None,
        }
    }

    pub fn ask_again() -> Self {
        Input {
            input_type: InputType::AskAgain,
            content: None,
        }
    }

    pub fn message<S: Into<String>>(content: S) -> Self {
        Input {
            input_type: InputType::Message,
            content: Some(content.into()),
        }
    }
}

/// Interpret one line read from the user; `None` is end of input
pub fn parse_input(line: Option<&str>) -> Input {
    let Some(line) = line else {
        return Input::exit();
    };
    let text = line.trim();
    if text.is_empty() {
        return Input::exit();
    }
    match text.to_ascii_lowercase().as_str() {
        "exit" | "quit" | "q" | "/exit" | "/quit" => Input::exit(),
        "/?" | "/help" => Input::ask_again(),
        _ => Input::message(text),
    }
}
