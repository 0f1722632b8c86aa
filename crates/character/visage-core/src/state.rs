use serde::{Deserialize, Serialize};

/// Playback state of a character
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlaybackState {
    /// No rig loaded
    #[default]
    Unloaded,
    /// Rig loaded, no clip active
    Stopped,
    Playing,
    Paused,
}

impl PlaybackState {
    #[inline]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Unloaded => "unloaded",
            Self::Stopped => "stopped",
            Self::Playing => "playing",
            Self::Paused => "paused",
        }
    }

    #[inline]
    pub fn is_loaded(&self) -> bool {
        !matches!(self, Self::Unloaded)
    }

    #[inline]
    pub fn is_playing(&self) -> bool {
        matches!(self, Self::Playing)
    }

    #[inline]
    pub fn is_paused(&self) -> bool {
        matches!(self, Self::Paused)
    }

    /// Playing or paused; a clip is current.
    #[inline]
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Playing | Self::Paused)
    }
}

/// Transient playback bookkeeping for the current clip.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaybackSession {
    pub state: PlaybackState,
    /// Seconds into the current clip.
    pub progress: f32,
    pub duration: f32,
    /// Clip-local time the clip starts at.
    pub clip_start: f32,
    pub looping: bool,
    /// Total time ticked since load.
    pub current_time: f32,
    /// Bone transforms need recomputing.
    pub dirty: bool,
}

impl PlaybackSession {
    pub fn loaded() -> Self {
        Self {
            state: PlaybackState::Stopped,
            dirty: true,
            ..Self::default()
        }
    }

    /// Clip-local evaluation time for the current progress.
    #[inline]
    pub fn clip_time(&self) -> f32 {
        self.clip_start + self.progress
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_predicates() {
        assert!(!PlaybackState::Unloaded.is_loaded());
        assert!(PlaybackState::Stopped.is_loaded());
        assert!(PlaybackState::Paused.is_active());
        assert!(!PlaybackState::Stopped.is_active());
        assert_eq!(PlaybackState::Playing.name(), "playing");
    }

    #[test]
    fn test_clip_time_offsets_by_start() {
        let session = PlaybackSession {
            clip_start: 0.5,
            progress: 0.25,
            ..PlaybackSession::loaded()
        };
        assert_eq!(session.clip_time(), 0.75);
        assert_eq!(session.state, PlaybackState::Stopped);
    }
}
