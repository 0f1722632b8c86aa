//! Character events and synchronous listener dispatch.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::data::ClipId;

/// Events raised by a character while it is driven.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum CharacterEvent {
    PlaybackStarted {
        clip: ClipId,
    },
    PlaybackPaused {
        clip: ClipId,
    },
    PlaybackStopped {
        clip: ClipId,
    },
    /// The clip crossed its voice start and the audio channel was asked to play.
    AudioStartRequested {
        clip: ClipId,
        started: bool,
        sink: Option<String>,
    },
    /// Payload event authored into the clip.
    AnimationEvent {
        channel: usize,
        channel_time: f32,
        event_time: f32,
        payload: String,
    },
    IncompatibleAnimationRequested {
        clip: ClipId,
    },
}

impl CharacterEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::PlaybackStarted { .. } => "playback_started",
            Self::PlaybackPaused { .. } => "playback_paused",
            Self::PlaybackStopped { .. } => "playback_stopped",
            Self::AudioStartRequested { .. } => "audio_start_requested",
            Self::AnimationEvent { .. } => "animation_event",
            Self::IncompatibleAnimationRequested { .. } => "incompatible_animation_requested",
        }
    }
}

pub trait CharacterListener {
    fn on_event(&mut self, event: &CharacterEvent);
}

impl<F: FnMut(&CharacterEvent)> CharacterListener for F {
    fn on_event(&mut self, event: &CharacterEvent) {
        self(event)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u32);

/// Registered listeners, called in subscription order.
#[derive(Default)]
pub struct Listeners {
    next: u32,
    entries: Vec<(ListenerId, Box<dyn CharacterListener>)>,
}

impl Listeners {
    pub fn subscribe<L: CharacterListener + 'static>(&mut self, listener: L) -> ListenerId {
        let id = ListenerId(self.next);
        self.next += 1;
        self.entries.push((id, Box::new(listener)));
        id
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(existing, _)| *existing != id);
        self.entries.len() != before
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dispatch(&mut self, event: &CharacterEvent) {
        for (_, listener) in &mut self.entries {
            listener.on_event(event);
        }
    }
}

impl fmt::Debug for Listeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listeners")
            .field("count", &self.entries.len())
            .finish()
    }
}
