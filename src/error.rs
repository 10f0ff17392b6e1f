use std::time::Duration;

use crate::wire::QueryError;

#[derive(Debug, thiserror::Error)]
pub enum TrinoError {
    #[error("transport error: {0}")]
    Transport(reqwest::Error),
    #[error("http error {status}: {body}")]
    Http { status: u16, body: String },
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("query failed: {}", .0.message)]
    Server(Box<QueryError>),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("statement timed out after {0:?}")]
    Timeout(Duration),
    #[error("statement canceled")]
    Canceled,
    #[error("usage error: {0}")]
    Usage(String),
    #[error("{} errors while streaming results: {}", .0.len(), format_aggregate(.0))]
    Aggregate(Vec<TrinoError>),
}

impl TrinoError {
    pub(crate) fn server(error: QueryError) -> Self {
        Self::Server(Box::new(error))
    }

    /// Server-side error payload, if this is a [`TrinoError::Server`].
    pub fn query_error(&self) -> Option<&QueryError> {
        match self {
            Self::Server(error) => Some(error),
            _ => None,
        }
    }

    /// True when this error, or any error inside an aggregate, is a timeout.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::Aggregate(inner) => inner.iter().any(TrinoError::is_timeout),
            _ => false,
        }
    }

    /// True when this error, or any error inside an aggregate, is a cancellation.
    pub fn is_canceled(&self) -> bool {
        match self {
            Self::Canceled => true,
            Self::Aggregate(inner) => inner.iter().any(TrinoError::is_canceled),
            _ => false,
        }
    }

    /// Inner errors of an aggregate, or a one-element view of `self`.
    pub fn causes(&self) -> &[TrinoError] {
        match self {
            Self::Aggregate(inner) => inner,
            _ => std::slice::from_ref(self),
        }
    }
}

fn format_aggregate(errors: &[TrinoError]) -> String {
    errors
        .iter()
        .map(|error| error.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::TrinoError;
    use std::time::Duration;

    #[test]
    fn aggregate_preserves_timeout_kind() {
        let err = TrinoError::Aggregate(vec![
            TrinoError::Canceled,
            TrinoError::Timeout(Duration::from_secs(10)),
        ]);
        assert!(err.is_timeout());
        assert!(err.is_canceled());
        assert_eq!(err.causes().len(), 2);
    }

    #[test]
    fn plain_error_is_its_own_cause() {
        let err = TrinoError::Decode("bad value".to_owned());
        assert_eq!(err.causes().len(), 1);
        assert!(!err.is_timeout());
    }
}
