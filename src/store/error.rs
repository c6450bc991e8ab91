use reqwest::StatusCode;
use thiserror::Error;

/// Errors from the remote store.
///
/// Not-found is kept distinct from genuine failures so callers can render
/// an empty/placeholder state instead of an error. [`is_transient`] carries
/// the store's transient-vs-permanent distinction upward; the service never
/// retries on its own.
///
/// [`is_transient`]: StoreError::is_transient
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no entry found for id {id}")]
    NotFound { id: String },

    #[error("store request failed during {context}: {source}")]
    Upstream {
        context: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("store returned {status} during {context}")]
    Status { context: String, status: StatusCode },
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        match self {
            Self::NotFound { .. } => false,
            Self::Upstream { source, .. } => source.is_timeout() || source.is_connect(),
            Self::Status { status, .. } => status.is_server_error(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_is_permanent() {
        let err = StoreError::NotFound {
            id: "abc".to_string(),
        };
        assert!(!err.is_transient());
    }

    #[test]
    fn test_server_status_is_transient() {
        let err = StoreError::Status {
            context: "list_children".to_string(),
            status: StatusCode::BAD_GATEWAY,
        };
        assert!(err.is_transient());
    }

    #[test]
    fn test_client_status_is_permanent() {
        let err = StoreError::Status {
            context: "list_children".to_string(),
            status: StatusCode::FORBIDDEN,
        };
        assert!(!err.is_transient());
    }
}
