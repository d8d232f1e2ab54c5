//! Shared domain types for Fiscus: errors, config, chat messages, tools,
//! task records, thread context, and LLM stream events.

pub mod chat;
pub mod config;
pub mod context;
pub mod error;
pub mod stream;
pub mod task;
pub mod tool;

pub use error::{Error, Result};
