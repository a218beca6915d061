use thiserror::Error;

pub type LiyaqaResult<T> = Result<T, LiyaqaError>;

#[derive(Error, Debug)]
pub enum LiyaqaError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    InvalidState(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl LiyaqaError {
    pub fn not_found(entity: &str, id: impl std::fmt::Display) -> Self {
        Self::NotFound(format!("{entity} not found: {id}"))
    }

    /// Stable machine-readable code used in API error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Validation(_) => "validation_failed",
            Self::Conflict(_) => "conflict",
            Self::InvalidState(_) => "invalid_state",
            Self::Unauthorized(_) => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::Config(_) => "config_error",
            Self::Serialization(_) => "serialization_error",
            Self::Internal(_) => "internal_error",
        }
    }
}

impl From<config::ConfigError> for LiyaqaError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

/// Returns a `Validation` error unless `cond` holds.
pub fn ensure(cond: bool, message: impl Into<String>) -> LiyaqaResult<()> {
    if cond {
        Ok(())
    } else {
        Err(LiyaqaError::Validation(message.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message() {
        let err = LiyaqaError::not_found("Campaign", "abc");
        assert_eq!(err.to_string(), "Campaign not found: abc");
        assert_eq!(err.code(), "not_found");
    }

    #[test]
    fn test_ensure() {
        assert!(ensure(true, "never").is_ok());
        let err = ensure(false, "name must not be blank").unwrap_err();
        assert!(matches!(err, LiyaqaError::Validation(ref m) if m == "name must not be blank"));
    }
}
