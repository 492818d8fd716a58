use thiserror::Error;

/// Unified error type for the commitflow runtime.
///
/// Retryability is a property of the variant, decided once at the collaborator
/// boundary that produced the failure. Nothing in the crate inspects error
/// message text to decide whether to retry.
#[derive(Debug, Error)]
pub enum Error {
    /// Transient infrastructure failure: network reset, timeout, throttled or
    /// unavailable backend. Retryable.
    #[error("transient failure: {message}")]
    Transient {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Malformed or unauthorized request. Surfaced immediately, never retried.
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    /// Terminal wrapper produced by the retry executor after all attempts
    /// failed (or zero attempts were permitted).
    #[error("operation '{label}' failed after {attempts} attempt(s)")]
    RetryExhausted {
        label: String,
        attempts: u32,
        #[source]
        source: Option<Box<Error>>,
    },

    /// Credential payload was fetched but is missing a required field.
    #[error("credential payload missing required field '{field}'")]
    IncompleteCredential { field: &'static str },

    /// The credential store call itself failed.
    #[error("credential fetch failed for key '{key}'")]
    CredentialFetchFailed {
        key: String,
        #[source]
        source: Box<Error>,
    },

    /// A source-control step failed. Retryability is decided by the git
    /// collaborator from the step and exit status.
    #[error("source-control failure: {message}")]
    Scm { message: String, retryable: bool },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    pub fn transient(msg: impl Into<String>) -> Self {
        Error::Transient {
            message: msg.into(),
            source: None,
        }
    }

    pub fn transient_with_source(
        msg: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Error::Transient {
            message: msg.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Error::InvalidRequest {
            message: msg.into(),
        }
    }

    pub fn scm(msg: impl Into<String>, retryable: bool) -> Self {
        Error::Scm {
            message: msg.into(),
            retryable,
        }
    }

    /// Whether the retry executor may re-invoke the failed operation.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Transient { .. } => true,
            Error::Scm { retryable, .. } => *retryable,
            // I/O is treated as environmental (disk pressure, fs races).
            Error::Io(_) => true,
            Error::InvalidRequest { .. }
            | Error::RetryExhausted { .. }
            | Error::IncompleteCredential { .. }
            | Error::CredentialFetchFailed { .. }
            | Error::Serialization(_) => false,
        }
    }

    /// Attempt count carried by a `RetryExhausted` error, if this is one.
    pub fn exhausted_attempts(&self) -> Option<u32> {
        match self {
            Error::RetryExhausted { attempts, .. } => Some(*attempts),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_is_retryable() {
        assert!(Error::transient("connection reset").is_retryable());
        assert!(Error::transient_with_source(
            "timeout",
            std::io::Error::new(std::io::ErrorKind::TimedOut, "deadline")
        )
        .is_retryable());
    }

    #[test]
    fn test_permanent_variants_not_retryable() {
        assert!(!Error::invalid_request("missing field").is_retryable());
        assert!(!Error::IncompleteCredential { field: "token" }.is_retryable());
        assert!(!Error::CredentialFetchFailed {
            key: "prod/deploy".into(),
            source: Box::new(Error::transient("throttled")),
        }
        .is_retryable());
    }

    #[test]
    fn test_scm_carries_own_retryability() {
        assert!(Error::scm("push rejected: network", true).is_retryable());
        assert!(!Error::scm("bad identity config", false).is_retryable());
    }

    #[test]
    fn test_exhausted_attempts_accessor() {
        let err = Error::RetryExhausted {
            label: "push".into(),
            attempts: 3,
            source: Some(Box::new(Error::transient("reset"))),
        };
        assert_eq!(err.exhausted_attempts(), Some(3));
        assert!(!err.is_retryable());
        assert!(Error::transient("x").exhausted_attempts().is_none());
    }

    #[test]
    fn test_display_includes_label_and_attempts() {
        let err = Error::RetryExhausted {
            label: "scm_sequence".into(),
            attempts: 2,
            source: None,
        };
        let msg = err.to_string();
        assert!(msg.contains("scm_sequence"));
        assert!(msg.contains('2'));
    }
}
