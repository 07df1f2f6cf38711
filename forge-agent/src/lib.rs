//! Tool-call detection and per-turn agent orchestration layered over a
//! `forge-generate` conversation session.

pub mod orchestrator;
pub mod tool_call;

pub use orchestrator::{chat_turn, Retrieval, ToolExecutor};
pub use tool_call::{ToolCallParser, ToolCallRecord, ToolCallStatus};
