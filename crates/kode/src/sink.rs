//! Where an agent invocation sends what the user should see.
//!
//! The loop never prints directly. Interactive invocations call into a [`Sink`] for text,
//! tool lines and the busy indicator; silent (sub-agent) invocations route tool activity to
//! their [`ProgressReporter`](crate::progress::ProgressReporter), which in turn draws its
//! single status line through the same sink.

pub trait Sink: Send + Sync {
    /// Assistant text produced at nesting `depth`
    fn text(&self, depth: usize, text: &str);

    /// A tool was invoked. `preview` is a shortened copy of its result, when there is one.
    fn tool(&self, depth: usize, name: &str, arg: Option<&str>, preview: Option<&str>);

    /// Replace the current status line
    fn status(&self, line: &str);

    /// Erase the current status line
    fn clear_status(&self);

    /// One-line summary of a finished sub-agent
    fn summary(&self, depth: usize, line: &str);

    /// Waiting on the model
    fn show_busy(&self, depth: usize);

    fn hide_busy(&self);
}

/// A sink that drops everything, for headless embedding
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl Sink for NullSink {
    fn text(&self, _depth: usize, _text: &str) {}
    fn tool(&self, _depth: usize, _name: &str, _arg: Option<&str>, _preview: Option<&str>) {}
    fn status(&self, _line: &str) {}
    fn clear_status(&self) {}
    fn summary(&self, _depth: usize, _line: &str) {}
    fn show_busy(&self, _depth: usize) {}
    fn hide_busy(&self) {}
}

#[cfg(test)]
pub mod recording {
    use super::Sink;
    use std::sync::Mutex;

    /// Records every sink call as a readable event string
    #[derive(Default)]
    pub struct RecordingSink {
        events: Mutex<Vec<String>>,
    }

    impl RecordingSink {
        pub fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }

        fn push(&self, event: String) {
            self.events.lock().unwrap().push(event);
        }
    }

    impl Sink for RecordingSink {
        fn text(&self, depth: usize, text: &str) {
            self.push(format!("text[{}]: {}", depth, text));
        }

        fn tool(&self, depth: usize, name: &str, arg: Option<&str>, _preview: Option<&str>) {
            self.push(format!("tool[{}]: {}({})", depth, name, arg.unwrap_or("")));
        }

        fn status(&self, line: &str) {
            self.push(format!("status: {}", line));
        }

        fn clear_status(&self) {
            self.push("clear_status".to_string());
        }

        fn summary(&self, depth: usize, line: &str) {
            self.push(format!("summary[{}]: {}", depth, line));
        }

        fn show_busy(&self, depth: usize) {
            self.push(format!("busy[{}]", depth));
        }

        fn hide_busy(&self) {
            self.push("idle".to_string());
        }
    }
}
