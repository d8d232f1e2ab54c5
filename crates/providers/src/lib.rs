//! LLM provider adapters.
//!
//! [`LlmProvider`] is the single seam the engine talks through; the
//! Anthropic adapter is the production implementation and the scripted
//! provider drives the test suite deterministically.

pub mod anthropic;
pub mod scripted;
pub mod sse;
pub mod tokens;
pub mod traits;

pub use anthropic::AnthropicProvider;
pub use scripted::ScriptedProvider;
pub use traits::{ChatRequest, ChatResponse, LlmProvider};
