use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Client error: {0}")]
    Client(#[from] ClientError),

    #[error("Page error: {0}")]
    Page(#[from] PageError),

    #[error("Scraping error: {0}")]
    Scraper(#[from] ScraperError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Generator error: {0}")]
    Generator(#[from] GeneratorError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Request error: {0}")]
    Request(#[from] rquest::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Missing required configuration: {0}")]
    MissingField(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Failed to build client: {0}")]
    BuildError(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Response error {status_code}")]
    ResponseError { status_code: u16, message: String },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

#[derive(Error, Debug)]
pub enum PageError {
    #[error("Timed out after {waited:?} waiting for {selector}")]
    Timeout { selector: String, waited: Duration },

    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("Invalid selector: {0}")]
    Selector(String),

    #[error("Browser driver error: {0}")]
    Driver(String),

    #[error("Page source already closed")]
    Closed,
}

#[derive(Error, Debug)]
pub enum ScraperError {
    #[error("Failed to parse HTML: {0}")]
    ParseError(String),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Uniqueness conflict: {0}")]
    Conflict(String),
}

impl StoreError {
    /// Classifies a raw SQLite error, separating constraint violations so the
    /// save loop can run a repair pass before retrying.
    pub fn classify(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, msg)
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                StoreError::Conflict(msg.clone().unwrap_or_else(|| e.to_string()))
            }
            _ => StoreError::Sqlite(err),
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

#[derive(Error, Debug)]
pub enum GeneratorError {
    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Upstream failure: {0}")]
    Upstream(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Gave up after {attempts} rate-limited attempts")]
    RetriesExhausted { attempts: u32 },
}

pub type Result<T> = std::result::Result<T, AppError>;
