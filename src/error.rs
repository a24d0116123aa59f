use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlanetError {
    #[error("HTTP error: {0}")]
    Fetch(#[from] reqwest::Error),

    #[error("Feed parsing error: {0}")]
    FeedParse(String),

    #[error("Entry has neither a published nor an updated date")]
    MissingDate,

    #[error("Entry has no title")]
    MissingTitle,

    #[error("Entry has no link")]
    MissingLink,

    #[error("Store {path} is unreadable: {reason}")]
    StoreCorrupt { path: PathBuf, reason: String },

    #[error("Failed to persist {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PlanetError>;
