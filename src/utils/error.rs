use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Parsing error: {message}")]
    Parse { message: String },

    #[error("Plugin error: {plugin_type}: {message}")]
    Plugin { plugin_type: String, message: String },

    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("LLM API error ({status}): {message}")]
    Llm { status: u16, message: String },

    #[error("Scraping error: {0}")]
    Scraping(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Already tracked: {url}")]
    AlreadyTracked { url: String },

    #[error("Not found: {resource}")]
    NotFound { resource: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(format!("{}", err))
    }
}

impl AppError {
    /// Whether a retry of the same request could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            AppError::Llm { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
