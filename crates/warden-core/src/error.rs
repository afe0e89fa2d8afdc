use thiserror::Error;

#[derive(Debug, Error)]
pub enum WardenError {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("invalid label '{0}'")]
    InvalidLabel(String),

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("invalid repository '{0}': expected owner/repo")]
    InvalidRepo(String),

    #[error("issue {0} has no assignees")]
    NoAssignees(String),

    #[error("no assignment event found for {0}")]
    NoAssignmentEvent(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("tracker API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("tracking store error: {0}")]
    TrackingDb(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Coarse classification used by callers to decide between skip, no-op and abort.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed label, date or config: treated as insufficient data.
    Validation,
    /// Missing assignees or assignment history: the issue is skipped.
    NotFound,
    /// Network or API failure: aborts the current issue or repository only.
    ExternalApi,
    Storage,
}

impl WardenError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WardenError::Validation(_)
            | WardenError::InvalidLabel(_)
            | WardenError::InvalidTimestamp(_)
            | WardenError::InvalidRepo(_)
            | WardenError::Yaml(_)
            | WardenError::Json(_) => ErrorKind::Validation,
            WardenError::NoAssignees(_)
            | WardenError::NoAssignmentEvent(_)
            | WardenError::NotFound(_) => ErrorKind::NotFound,
            WardenError::Api { .. } | WardenError::Http(_) => ErrorKind::ExternalApi,
            WardenError::TrackingDb(_) | WardenError::Io(_) => ErrorKind::Storage,
        }
    }

    /// True when the error means "not enough data to act" rather than a failure.
    pub fn is_insufficient_data(&self) -> bool {
        matches!(self.kind(), ErrorKind::Validation | ErrorKind::NotFound)
    }
}

pub type Result<T> = std::result::Result<T, WardenError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_errors_are_external() {
        let err = WardenError::Api {
            status: 502,
            message: "bad gateway".into(),
        };
        assert_eq!(err.kind(), ErrorKind::ExternalApi);
        assert!(!err.is_insufficient_data());
        assert_eq!(err.to_string(), "tracker API error: 502 - bad gateway");
    }

    #[test]
    fn missing_data_is_not_a_failure() {
        assert!(WardenError::NoAssignees("o/r#1".into()).is_insufficient_data());
        assert!(WardenError::InvalidLabel("Time: <x".into()).is_insufficient_data());
    }
}
