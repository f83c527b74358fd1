//! Error types for jobqueue.

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Record store errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Mail source errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Authentication failed for channel {name}")]
    AuthFailed { name: String },

    #[error("Rate limited on channel {name}")]
    RateLimited { name: String },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Invalid message format: {0}")]
    InvalidMessage(String),

    #[error("Failed to decode message body: {0}")]
    Decode(String),
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },
}

/// Ingestion pipeline errors.
///
/// `Fetch` stops scheduling for the run; `ContentRead`, `Classification` and
/// `Persistence` end a single item's pipeline and never leave it.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Mail fetch failed: {0}")]
    Fetch(ChannelError),

    #[error("Content read failed: {0}")]
    ContentRead(ChannelError),

    #[error("Classification failed: {0}")]
    Classification(#[from] LlmError),

    #[error("Persistence failed: {0}")]
    Persistence(#[from] DatabaseError),

    #[error("Run task ended abnormally: {0}")]
    RunAborted(String),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
