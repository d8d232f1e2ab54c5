//! HTTP endpoints (everything that is not the WebSocket).

pub mod callback;
pub mod jobs;
