use thiserror::Error;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing required column: {0}")]
    MissingColumn(String),

    #[error("Invalid number in column '{column}' at row {row}: {value:?}")]
    InvalidNumber {
        column: &'static str,
        row: usize,
        value: String,
    },

    #[error("Geocoding failed for '{query}': {message}")]
    Geocode { query: String, message: String },

    #[error("Dataset fetch failed: {message}")]
    Fetch { message: String },

    #[error("Upload failed: {message}")]
    Upload { message: String },

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl EtlError {
    pub fn config(msg: impl Into<String>) -> Self {
        EtlError::Config(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, EtlError>;
