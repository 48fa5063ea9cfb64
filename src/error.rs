use thiserror::Error;

/// Errors raised while setting up instrumentation.
///
/// The measurement hot path (`click`, `observe_error`, `release`) never
/// produces these: a broken metrics backend degrades to missing telemetry.
/// Only startup concerns are fallible.
#[derive(Error, Debug)]
pub enum CursorError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Failed to initialize metrics: {0}")]
    MetricsInit(String),

    #[error("Global instrumentation is already installed")]
    AlreadyInstalled,
}

/// Convenience type alias for Results with CursorError.
pub type CursorResult<T> = Result<T, CursorError>;
