//! Error types for character playback

use serde::{Deserialize, Serialize};

use crate::data::ClipId;

/// Failure reported by the decode/compute backend.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("backend error {code}: {message}")]
pub struct BackendError {
    pub code: i32,
    pub message: String,
}

impl BackendError {
    pub const DECODE: i32 = 1;
    pub const UNSUPPORTED_VERSION: i32 = 2;
    pub const NULL_HANDLE: i32 = 3;
    pub const NOT_PLAYING: i32 = 4;
    pub const BUFFER_SIZE: i32 = 5;

    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn null_handle(what: &str) -> Self {
        Self::new(Self::NULL_HANDLE, format!("{what} handle is null"))
    }
}

/// Error type for every fallible character operation.
///
/// `Display` is the diagnostic string hosts log or surface.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum FaceError {
    /// Rig or clip bytes missing, corrupt, or rejected by the backend decoder
    #[error("Load failed: {reason}")]
    Load { reason: String },

    /// Clip cannot be played against the loaded rig
    #[error("Animation {clip} is incompatible with the loaded rig")]
    IncompatibleAnimation { clip: ClipId },

    /// Bad seek position or clip bounds
    #[error("Invalid range: {reason}")]
    InvalidRange { reason: String },

    /// Operation needs a loaded rig
    #[error("Character is not loaded")]
    NotLoaded,

    /// Requested transition is a no-op for the current state
    #[error("Character is already {state}")]
    AlreadyInState { state: String },

    /// Operation needs a current clip
    #[error("No animation is currently active")]
    NoActiveClip,

    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl FaceError {
    pub fn load(reason: impl Into<String>) -> Self {
        Self::Load {
            reason: reason.into(),
        }
    }

    pub fn invalid_range(reason: impl Into<String>) -> Self {
        Self::InvalidRange {
            reason: reason.into(),
        }
    }

    /// Every playback error leaves the character usable.
    #[inline]
    pub fn is_recoverable(&self) -> bool {
        true
    }

    /// Get error category for logging
    #[inline]
    pub fn category(&self) -> &'static str {
        match self {
            Self::Load { .. } => "load",
            Self::IncompatibleAnimation { .. } => "compatibility",
            Self::InvalidRange { .. } => "validation",
            Self::NotLoaded | Self::AlreadyInState { .. } | Self::NoActiveClip => "state",
            Self::Backend(_) => "backend",
        }
    }
}

impl From<serde_json::Error> for FaceError {
    fn from(err: serde_json::Error) -> Self {
        Self::Load {
            reason: err.to_string(),
        }
    }
}
