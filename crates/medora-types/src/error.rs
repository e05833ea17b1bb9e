use thiserror::Error;

/// Failure taxonomy shared by the socket gateway and the HTTP surface.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsultError {
    /// Appointment or consultation session does not exist.
    #[error("consultation not found")]
    NotFound,

    /// Caller is not a participant of the referenced appointment.
    #[error("not authorized for this consultation")]
    Unauthorized,

    /// The session was ended and has not been rejoined since.
    #[error("consultation session is not active")]
    InactiveSession,

    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// Persistence or transport failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ConsultError {
    /// Stable machine-readable code sent in `operation-error` frames.
    pub fn reason(&self) -> &'static str {
        match self {
            ConsultError::NotFound => "not-found",
            ConsultError::Unauthorized => "unauthorized",
            ConsultError::InactiveSession => "inactive-session",
            ConsultError::InvalidMessage(_) => "invalid-message",
            ConsultError::Internal(_) => "internal-error",
        }
    }

    pub fn internal(err: impl std::fmt::Display) -> Self {
        ConsultError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reasons_are_stable() {
        assert_eq!(ConsultError::NotFound.reason(), "not-found");
        assert_eq!(ConsultError::Unauthorized.reason(), "unauthorized");
        assert_eq!(ConsultError::InactiveSession.reason(), "inactive-session");
        assert_eq!(ConsultError::InvalidMessage("x".into()).reason(), "invalid-message");
        assert_eq!(ConsultError::internal("disk full").reason(), "internal-error");
    }
}
