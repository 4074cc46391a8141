use std::fmt;

/// Errors returned by the patient flow core.
///
/// The first group (validation through invalid state) are domain rejections: they are
/// recoverable, carry a specific human-readable reason, and should be shown to the staff member
/// who attempted the action. The remaining variants are infrastructure failures that callers may
/// retry with backoff (see [`FlowError::is_transient`]).
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("cannot {action} {entity} {id}: not allowed while it is {from}")]
    InvalidTransition {
        entity: &'static str,
        id: String,
        from: String,
        action: String,
    },

    #[error("{entity} {id} is already {actual} (another user changed it while you expected {expected}); refresh and try again")]
    StaleState {
        entity: &'static str,
        id: String,
        expected: String,
        actual: String,
    },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("locked: {0}")]
    LockedState(String),

    #[error("{entity} {id} is {status} and can no longer be changed")]
    InvalidState {
        entity: &'static str,
        id: String,
        status: String,
    },

    #[error("invalid identifier: {0}")]
    Identifier(#[from] flow_uuid::UuidError),
    #[error("invalid value: {0}")]
    Type(#[from] flow_types::TypeError),

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
    #[error("corrupt state: {0}")]
    Corrupt(String),
    #[error("failed to read snapshot: {0}")]
    SnapshotRead(std::io::Error),
    #[error("failed to write snapshot: {0}")]
    SnapshotWrite(std::io::Error),
    #[error("failed to serialize snapshot: {0}")]
    Serialization(serde_json::Error),
    #[error("failed to deserialize snapshot: {0}")]
    Deserialization(serde_json::Error),
}

/// Coarse classification of a [`FlowError`], used by API layers to pick a response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    InvalidTransition,
    StaleState,
    NotFound,
    LockedState,
    InvalidState,
    Storage,
    /// Unreadable snapshot or poisoned in-process state; retrying does not help.
    Corrupt,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::InvalidTransition => "invalid_transition",
            ErrorKind::StaleState => "stale_state",
            ErrorKind::NotFound => "not_found",
            ErrorKind::LockedState => "locked_state",
            ErrorKind::InvalidState => "invalid_state",
            ErrorKind::Storage => "storage",
            ErrorKind::Corrupt => "corrupt",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FlowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FlowError::Validation(_) | FlowError::Identifier(_) | FlowError::Type(_) => {
                ErrorKind::Validation
            }
            FlowError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            FlowError::StaleState { .. } => ErrorKind::StaleState,
            FlowError::NotFound { .. } => ErrorKind::NotFound,
            FlowError::LockedState(_) => ErrorKind::LockedState,
            FlowError::InvalidState { .. } => ErrorKind::InvalidState,
            FlowError::StorageUnavailable(_)
            | FlowError::SnapshotRead(_)
            | FlowError::SnapshotWrite(_) => ErrorKind::Storage,
            FlowError::Corrupt(_)
            | FlowError::Serialization(_)
            | FlowError::Deserialization(_) => ErrorKind::Corrupt,
        }
    }

    /// Returns true for storage I/O failures that a caller may retry with backoff.
    ///
    /// Domain rejections and corrupt state are never transient: retrying them unchanged yields
    /// the same answer.
    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Storage
    }

    pub(crate) fn not_found(entity: &'static str, id: impl fmt::Display) -> Self {
        FlowError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub(crate) fn stale(
        entity: &'static str,
        id: impl fmt::Display,
        expected: impl fmt::Display,
        actual: impl fmt::Display,
    ) -> Self {
        FlowError::StaleState {
            entity,
            id: id.to_string(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    pub(crate) fn invalid_transition(
        entity: &'static str,
        id: impl fmt::Display,
        from: impl fmt::Display,
        action: impl fmt::Display,
    ) -> Self {
        FlowError::InvalidTransition {
            entity,
            id: id.to_string(),
            from: from.to_string(),
            action: action.to_string(),
        }
    }

    pub(crate) fn invalid_state(
        entity: &'static str,
        id: impl fmt::Display,
        status: impl fmt::Display,
    ) -> Self {
        FlowError::InvalidState {
            entity,
            id: id.to_string(),
            status: status.to_string(),
        }
    }
}

pub type FlowResult<T> = std::result::Result<T, FlowError>;
