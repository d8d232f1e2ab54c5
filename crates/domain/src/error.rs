/// Shared error type used across all Fiscus crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("auth: {0}")]
    Auth(String),

    #[error("context load: {0}")]
    ContextLoad(String),

    #[error("LLM {provider}: {message}")]
    Llm { provider: String, message: String },

    #[error("tool handler: {0}")]
    ToolHandler(String),

    #[error("dispatch: {0}")]
    Dispatch(String),

    #[error("callback routing: {0}")]
    CallbackRouting(String),

    #[error("store: {0}")]
    Store(String),

    #[error("config: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
