use thiserror::Error;

/// Errors surfaced by document and view operations.
///
/// Construction-time failures (`Configuration`) abort the schema that produced
/// them. Everything else aborts only the current call and leaves prior state intact.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StateError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Illegal state: {0}")]
    IllegalState(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Record source error: {0}")]
    RecordSource(String),
}

impl StateError {
    pub fn not_found(what: impl Into<String>) -> Self {
        StateError::NotFound(what.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        StateError::Validation(message.into())
    }

    pub fn illegal_state(message: impl Into<String>) -> Self {
        StateError::IllegalState(message.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        StateError::Configuration(message.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StateError::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, StateError>;
