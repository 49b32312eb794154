use thiserror::Error;

#[derive(Error, Debug)]
pub enum FinderError {
    #[error("Transport error fetching {url}: {reason}")]
    Transport { url: String, reason: String },
    #[error("HTTP status {status} fetching {url}")]
    HttpStatus { url: String, status: u16 },
    #[error("Document at {url} exceeds {limit} bytes")]
    DocumentTooLarge { url: String, limit: usize },
    #[error("Manifest decode error: {0}")]
    Decode(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Inventory error: {0}")]
    Inventory(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, FinderError>;
