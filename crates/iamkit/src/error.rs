//! Error types for IAM operations.
//!
//! Provider failures are classified into four kinds at this boundary so that
//! reconciliation code never has to inspect AWS error codes. Each variant keeps
//! the original code and message for user feedback.

use thiserror::Error;

/// The four error kinds visible to reconciliation code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The entity does not exist
    NotFound,
    /// The entity already exists
    AlreadyExists,
    /// An account quota or per-entity limit was hit
    LimitExceeded,
    /// Any other provider failure
    Provider,
}

impl ErrorKind {
    /// Get a user-friendly description of this error kind.
    pub fn description(&self) -> &'static str {
        match self {
            Self::NotFound => "Entity not found",
            Self::AlreadyExists => "Entity already exists",
            Self::LimitExceeded => "Limit exceeded",
            Self::Provider => "Provider error",
        }
    }
}

/// AWS error codes that map to [`ErrorKind::NotFound`].
const NOT_FOUND_CODES: &[&str] = &["NoSuchEntity", "NoSuchEntityException"];

/// AWS error codes that map to [`ErrorKind::AlreadyExists`].
const ALREADY_EXISTS_CODES: &[&str] = &["EntityAlreadyExists", "EntityAlreadyExistsException"];

/// AWS error codes that map to [`ErrorKind::LimitExceeded`].
const LIMIT_EXCEEDED_CODES: &[&str] = &["LimitExceeded", "LimitExceededException"];

/// Provider codes worth retrying after a backoff.
const RETRYABLE_CODES: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "RequestLimitExceeded",
    "ServiceFailure",
    "ServiceUnavailable",
    "RequestTimeout",
];

/// Errors that can occur during IAM operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Entity does not exist
    #[error("not found: {message}")]
    NotFound {
        /// Provider message describing the missing entity
        message: String,
    },

    /// Entity already exists
    #[error("already exists: {message}")]
    AlreadyExists {
        /// Provider message describing the existing entity
        message: String,
    },

    /// Quota or per-entity limit reached
    #[error("limit exceeded: {message}")]
    LimitExceeded {
        /// Provider message describing the limit
        message: String,
    },

    /// Any other error reported by the provider
    #[error("provider error ({code}): {message}")]
    Provider {
        /// Provider error code, e.g. `AccessDenied`
        code: String,
        /// Provider message
        message: String,
    },

    /// The provider CLI could not be run
    #[error("command failed: {message}")]
    CommandFailed {
        /// Description of what command failed
        message: String,
        /// Standard error output from the failed command
        stderr: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Build an error from an AWS error code and message.
    pub fn from_code(code: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        if NOT_FOUND_CODES.contains(&code) {
            Error::NotFound { message }
        } else if ALREADY_EXISTS_CODES.contains(&code) {
            Error::AlreadyExists { message }
        } else if LIMIT_EXCEEDED_CODES.contains(&code) {
            Error::LimitExceeded { message }
        } else {
            Error::Provider {
                code: code.to_string(),
                message,
            }
        }
    }

    /// Create an error from `aws` CLI stderr.
    ///
    /// The CLI reports service errors as
    /// `An error occurred (<Code>) when calling the <Op> operation: <message>`.
    /// Anything else is a failure of the command itself.
    pub fn from_cli_output(stderr: &str) -> Self {
        let stderr = stderr.trim();
        if let Some(rest) = stderr
            .find("An error occurred (")
            .map(|idx| &stderr[idx + "An error occurred (".len()..])
            && let Some(end) = rest.find(')')
        {
            let code = &rest[..end];
            let message = rest[end + 1..]
                .split_once(": ")
                .map(|(_, m)| m)
                .unwrap_or(rest[end + 1..].trim());
            return Self::from_code(code, message.trim());
        }

        Error::CommandFailed {
            message: "aws command failed".to_string(),
            stderr: stderr.to_string(),
        }
    }

    /// Get the error kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            Error::LimitExceeded { .. } => ErrorKind::LimitExceeded,
            _ => ErrorKind::Provider,
        }
    }

    /// Whether this error is `NotFound`.
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Whether this error is `AlreadyExists`.
    pub fn is_already_exists(&self) -> bool {
        self.kind() == ErrorKind::AlreadyExists
    }

    /// Whether this error is `LimitExceeded`.
    pub fn is_limit_exceeded(&self) -> bool {
        self.kind() == ErrorKind::LimitExceeded
    }

    /// Whether this error is typically transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Provider { code, .. } => RETRYABLE_CODES.contains(&code.as_str()),
            Error::Io(_) => true,
            _ => false,
        }
    }
}

/// Result type for IAM operations.
pub type Result<T> = std::result::Result<T, Error>;
