//! Per-caller profile and conversation history.

pub mod models;
pub mod service;

pub use models::ConversationEntry;
pub use service::{NewProfile, UserContextService};
