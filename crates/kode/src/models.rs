//! These models represent the objects passed around by the agent loop
//!
//! Provider wire formats (the Anthropic messages API today) are converted into these structs
//! as soon as a response arrives and converted back right before a request leaves, so the
//! loop, the tool systems and the sub-agent dispatcher only ever match on the closed enums
//! defined here.
pub mod content;
pub mod message;
pub mod role;
pub mod tool;
