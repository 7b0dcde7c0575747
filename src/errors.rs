use thiserror::Error;

#[derive(Debug, Error)]
pub enum TapCrewError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Reasoning service error: {0}")]
    Reasoning(String),

    #[error("Device control error: {0}")]
    Device(String),

    #[error("Perception error: {0}")]
    Perception(String),

    #[error("Script execution error: {0}")]
    Script(String),

    #[error("Missing required context for {agent}: {missing}")]
    MissingContext { agent: String, missing: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("TOML deserialize error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

impl TapCrewError {
    /// Precondition violation raised by a worker whose required entry kinds
    /// are absent from the log. Converted to an `error` entry by the
    /// dispatch loop, never propagated out of a cycle.
    pub fn missing_context(agent: impl Into<String>, missing: impl Into<String>) -> Self {
        Self::MissingContext {
            agent: agent.into(),
            missing: missing.into(),
        }
    }
}

pub type TapCrewResult<T> = Result<T, TapCrewError>;
