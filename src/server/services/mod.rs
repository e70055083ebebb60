pub mod agent;
pub mod formatter;
pub mod transcript;

pub use agent::AgentService;
pub use formatter::format_reply;
pub use transcript::{ChatPair, TranscriptStore};
