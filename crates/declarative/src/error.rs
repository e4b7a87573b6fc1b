//! Errors raised by the reconciliation driver.

use crate::types::Phase;
use thiserror::Error;

/// Errors from [`crate::executor`].
///
/// The resource's own error is kept as the source, unmodified.
#[derive(Debug, Error)]
pub enum Error<E>
where
    E: std::error::Error + 'static,
{
    /// A phase returned an error
    #[error("{phase} phase of {resource} failed")]
    Phase {
        resource: String,
        phase: Phase,
        #[source]
        source: E,
    },

    /// Passes kept applying changes without ever observing a match
    #[error("{resource} did not converge after {passes} passes")]
    NotConverged { resource: String, passes: u32 },
}

impl<E> Error<E>
where
    E: std::error::Error + 'static,
{
    /// The resource error, when the failure came from a phase
    pub fn resource_error(&self) -> Option<&E> {
        match self {
            Error::Phase { source, .. } => Some(source),
            Error::NotConverged { .. } => None,
        }
    }

    /// The failing phase, when the failure came from a phase
    pub fn phase(&self) -> Option<Phase> {
        match self {
            Error::Phase { phase, .. } => Some(*phase),
            Error::NotConverged { .. } => None,
        }
    }
}

/// Result type for driver operations.
pub type Result<T, E> = std::result::Result<T, Error<E>>;
