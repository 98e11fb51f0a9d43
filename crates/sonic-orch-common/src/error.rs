//! Error taxonomy shared by every manager.
//!
//! | Class | Meaning | Policy |
//! |---|---|---|
//! | [`OrchError::ResourceFault`] | driver create/set failed | propagated to the delta's caller |
//! | [`RemoveOutcome::AlreadyGone`] | remove raced with another remover | treated as success |
//! | [`OrchError::PreconditionViolation`] | inconsistent internal state | fatal, stops the agent |
//! | [`crate::Discrepancy`] | warm-boot hardware differs from intent | recorded, never raised |

use sonic_sai::{SaiError, SaiResult};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrchError {
    /// A driver call failed for a reason other than not-found.
    #[error("{context}: {source}")]
    ResourceFault {
        context: String,
        #[source]
        source: SaiError,
    },

    /// Internal state is inconsistent. Not recoverable.
    #[error("precondition violated: {0}")]
    PreconditionViolation(String),

    /// A request named an object the agent does not know.
    #[error("unknown {0}")]
    UnknownHandle(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl OrchError {
    pub fn resource(context: impl Into<String>, source: SaiError) -> Self {
        OrchError::ResourceFault {
            context: context.into(),
            source,
        }
    }

    pub fn precondition(msg: impl Into<String>) -> Self {
        OrchError::PreconditionViolation(msg.into())
    }

    pub fn unknown(what: impl Into<String>) -> Self {
        OrchError::UnknownHandle(what.into())
    }

    /// True for errors that must stop the control-plane loop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, OrchError::PreconditionViolation(_))
    }
}

pub type OrchResult<T> = Result<T, OrchError>;

/// How a driver remove ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed,
    /// The object was already absent. Expected when two paths race.
    AlreadyGone,
}

/// Classifies the result of a driver remove.
///
/// Not-found is success; anything else is a resource fault.
pub fn classify_remove(
    result: SaiResult<()>,
    context: impl FnOnce() -> String,
) -> OrchResult<RemoveOutcome> {
    match result {
        Ok(()) => Ok(RemoveOutcome::Removed),
        Err(e) if e.is_not_found() => {
            tracing::info!(context = %context(), "remove raced, object already gone");
            Ok(RemoveOutcome::AlreadyGone)
        }
        Err(e) => Err(OrchError::resource(context(), e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sonic_sai::{SaiObjectType, SaiStatus};

    #[test]
    fn test_classify_remove() {
        assert_eq!(
            classify_remove(Ok(()), || "x".into()),
            Ok(RemoveOutcome::Removed)
        );
        assert_eq!(
            classify_remove(Err(SaiError::not_found(9)), || "x".into()),
            Ok(RemoveOutcome::AlreadyGone)
        );

        let err = classify_remove(
            Err(SaiError::from_status(
                "remove",
                SaiObjectType::LagMember,
                SaiStatus::Failure,
            )),
            || "remove member".into(),
        )
        .unwrap_err();
        assert!(matches!(err, OrchError::ResourceFault { .. }));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_precondition_is_fatal() {
        assert!(OrchError::precondition("dependency not resolved").is_fatal());
        assert!(!OrchError::unknown("port 3").is_fatal());
    }
}
