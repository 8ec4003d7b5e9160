use crate::types::{ChannelId, CollectiveKind, ReplicaId};

pub type Result<T> = std::result::Result<T, LockstepError>;

#[derive(Debug, thiserror::Error)]
pub enum LockstepError {
    #[error("invalid replica group configuration for {kind}: {reason}")]
    InvalidGroupConfiguration {
        kind: CollectiveKind,
        reason: String,
    },

    #[error("shape mismatch in {context}: expected {expected}, got {actual}")]
    ShapeMismatch {
        context: String,
        expected: String,
        actual: String,
    },

    #[error(
        "rendezvous for '{descriptor}' (channel {channel:?}, instance {seq}) timed out after {timeout_ms}ms: replica {replica} still waiting on replica {missing}"
    )]
    RendezvousTimeout {
        descriptor: String,
        channel: Option<ChannelId>,
        seq: u64,
        replica: ReplicaId,
        missing: ReplicaId,
        timeout_ms: u64,
    },

    /// `replica` is `None` when the violation is found before execution.
    #[error(
        "async protocol violation{}: {reason}",
        .replica.map(|r| format!(" on replica {r}")).unwrap_or_default()
    )]
    AsyncProtocolViolation {
        replica: Option<ReplicaId>,
        reason: String,
    },

    #[error("invalid descriptor '{name}': {reason}")]
    InvalidDescriptor { name: String, reason: String },

    #[error("invalid program: {0}")]
    InvalidProgram(String),

    #[error("program text could not be parsed: {0}")]
    Parse(String),

    #[error("transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("replica {replica} task panicked: {reason}")]
    ReplicaPanicked { replica: ReplicaId, reason: String },
}

impl LockstepError {
    /// Create a `Transport` error with just a message.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport {
            message: msg.into(),
            source: None,
        }
    }

    /// Create a `Transport` error with a message and a source error.
    pub fn transport_with_source(
        msg: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Transport {
            message: msg.into(),
            source: Some(Box::new(source)),
        }
    }

    pub(crate) fn shape_mismatch(
        context: impl Into<String>,
        expected: impl std::fmt::Display,
        actual: impl std::fmt::Display,
    ) -> Self {
        Self::ShapeMismatch {
            context: context.into(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    pub(crate) fn invalid_group(kind: CollectiveKind, reason: impl Into<String>) -> Self {
        Self::InvalidGroupConfiguration {
            kind,
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for LockstepError {
    fn from(e: serde_json::Error) -> Self {
        Self::Parse(e.to_string())
    }
}
