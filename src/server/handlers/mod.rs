pub mod chat;

pub use chat::{chat_content, chat_history, orch_agent};
