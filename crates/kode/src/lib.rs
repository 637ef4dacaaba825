pub mod agent;
pub mod errors;
pub mod models;
pub mod process_store;
pub mod progress;
pub mod prompt_template;
pub mod providers;
pub mod registry;
pub mod sink;
pub mod subagent;
pub mod systems;
pub mod todo;
pub mod truncation;
