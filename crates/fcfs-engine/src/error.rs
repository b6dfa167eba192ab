use thiserror::Error;

/// Everything the claim engine can report, as a closed sum. HTTP handlers map
/// variants to status codes at the boundary; nothing downstream parses
/// message strings.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{0}")]
    Validation(String),

    /// Also covers cross-tenant access: a slot owned by another tenant is
    /// indistinguishable from one that does not exist.
    #[error("resource not found")]
    NotFound,

    #[error("slot is already claimed")]
    AlreadyClaimed,

    #[error("slot has no claim to cancel")]
    SlotNotClaimed,

    #[error("claim is already cancelled")]
    AlreadyCancelled,

    #[error("slot is already completed")]
    AlreadyCompleted,

    /// The cancel conditional update lost a race; the caller may retry.
    #[error("cancel failed due to a concurrent update")]
    CancelFailed,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl EngineError {
    /// Stable machine-readable code, as surfaced in error response bodies.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "VALIDATION",
            EngineError::NotFound => "NOT_FOUND",
            EngineError::AlreadyClaimed => "ALREADY_CLAIMED",
            EngineError::SlotNotClaimed => "SLOT_NOT_CLAIMED",
            EngineError::AlreadyCancelled => "ALREADY_CANCELLED",
            EngineError::AlreadyCompleted => "ALREADY_COMPLETED",
            EngineError::CancelFailed => "CANCEL_FAILED",
            EngineError::Internal(_) => "INTERNAL",
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(EngineError::NotFound.code(), "NOT_FOUND");
        assert_eq!(EngineError::AlreadyClaimed.code(), "ALREADY_CLAIMED");
        assert_eq!(EngineError::CancelFailed.code(), "CANCEL_FAILED");
        assert_eq!(
            EngineError::Validation("bad".into()).code(),
            "VALIDATION"
        );
        assert_eq!(
            EngineError::Internal(anyhow::anyhow!("boom")).code(),
            "INTERNAL"
        );
    }
}
