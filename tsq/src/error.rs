use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Environment not found: {0}")]
    EnvironmentNotFound(u64),

    #[error("Resolver error: {0}")]
    Resolver(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Backend returned {status}: {body}")]
    Backend { status: u16, body: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The backend returned a column that was never requested.
    #[error("Unexpected column '{column}' in response (expected one of {expected:?})")]
    UnexpectedColumn {
        column: String,
        expected: Vec<String>,
    },

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// Short error kind, used as a structured logging field
    pub fn kind(&self) -> &'static str {
        match self {
            Error::EnvironmentNotFound(_) => "environment_not_found",
            Error::Resolver(_) => "resolver",
            Error::Http(_) => "http",
            Error::Backend { .. } => "backend",
            Error::Json(_) => "json",
            Error::InvalidResponse(_) => "invalid_response",
            Error::UnexpectedColumn { .. } => "unexpected_column",
            Error::Config(_) => "config",
            Error::Io(_) => "io",
            Error::Toml(_) => "toml",
            Error::Yaml(_) => "yaml",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
