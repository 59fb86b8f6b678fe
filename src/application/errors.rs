// Error taxonomy with an explicit HTTP status mapping
use thiserror::Error;

/// Failure at the BI client boundary.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request to BI platform failed: {0}")]
    Transport(String),
    #[error("BI platform returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("failed to decode BI platform response: {0}")]
    Decode(String),
}

/// Failure of a workflow operation. Partial-batch degradations are not
/// errors; they are logged and collapse to empty/zero results per item.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Upstream(String),
}

impl ServiceError {
    pub fn status(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::NotFound(_) => 404,
            Self::Upstream(_) => 500,
        }
    }

    /// Prefix the message with caller context, keeping the error kind.
    pub fn with_context(self, context: &str) -> Self {
        let message = format!("{context}: {self}");
        match self {
            Self::Validation(_) => Self::Validation(message),
            Self::NotFound(_) => Self::NotFound(message),
            Self::Upstream(_) => Self::Upstream(message),
        }
    }
}

impl From<ClientError> for ServiceError {
    fn from(err: ClientError) -> Self {
        Self::Upstream(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_is_stable() {
        assert_eq!(ServiceError::Validation("x".into()).status(), 400);
        assert_eq!(ServiceError::NotFound("x".into()).status(), 404);
        assert_eq!(ServiceError::Upstream("x".into()).status(), 500);
    }

    #[test]
    fn context_wrapping_keeps_the_kind() {
        let err = ServiceError::NotFound("folder \"a\" not found".into())
            .with_context("failed to locate dashboard \"Report\"");
        assert_eq!(err.status(), 404);
        assert_eq!(
            err.to_string(),
            "failed to locate dashboard \"Report\": folder \"a\" not found"
        );
    }
}
