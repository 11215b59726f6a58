//! Domain error taxonomy.
use thiserror::Error;

use crate::store::StoreError;

/// Kind of record that was looked up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    User,
    Party,
    Member,
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordKind::User => write!(f, "user"),
            RecordKind::Party => write!(f, "party"),
            RecordKind::Member => write!(f, "party member"),
        }
    }
}

/// Coarse classification callers use to decide how to surface an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Capacity,
    InvalidState,
    Transient,
    Internal,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{kind} {id} not found")]
    NotFound { kind: RecordKind, id: String },
    #[error("party {party_id} is full ({capacity} members)")]
    PartyFull { party_id: String, capacity: u32 },
    #[error("a booster is already active until {ends_at}")]
    BoosterAlreadyActive { ends_at: String },
    #[error("saved booster {index} is no longer available")]
    BoosterUnavailable { index: usize },
    #[error("saved booster {index} expired at {expired_at}")]
    BoosterExpired { index: usize, expired_at: String },
    #[error("failed to decode {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode {path}: {source}")]
    Encode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl EngineError {
    #[must_use]
    pub fn not_found(kind: RecordKind, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::PartyFull { .. } => ErrorKind::Capacity,
            Self::BoosterAlreadyActive { .. }
            | Self::BoosterUnavailable { .. }
            | Self::BoosterExpired { .. } => ErrorKind::InvalidState,
            Self::Store(err) if err.is_transient() => ErrorKind::Transient,
            Self::Decode { .. } | Self::Encode { .. } | Self::Store(_) => ErrorKind::Internal,
        }
    }
}
