#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[cfg(feature = "backend")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{operation} failed{}: {detail}", status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Backend {
        operation: &'static str,
        status: Option<u16>,
        detail: String,
    },
    #[error("Token error: {0}")]
    Token(String),
    #[error("Invalid colour: {0}")]
    InvalidColor(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Missing permission: {0}")]
    Forbidden(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Storage error: {0}")]
    Storage(String),
}
