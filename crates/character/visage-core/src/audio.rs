//! Voice-audio channel contract and the stock implementations.
//!
//! The character only talks to [`AudioSync`]. [`VoiceAudio`] drives a host
//! audio component through [`VoiceSink`]; [`SilentAudio`] is used when the
//! host supplies nothing.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::data::ClipData;

/// Fade applied when pausing with `fade_out`.
pub const FADE_OUT_SECONDS: f32 = 0.05;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AudioState {
    #[default]
    Stopped,
    Paused,
    Playing,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AudioChannelState {
    pub state: AudioState,
    /// Seconds into the voice asset.
    pub progress: f32,
    /// Start the clip's voice automatically when the clip asks for it.
    pub auto_play: bool,
}

impl Default for AudioChannelState {
    fn default() -> Self {
        Self {
            state: AudioState::Stopped,
            progress: 0.0,
            auto_play: true,
        }
    }
}

/// Audio channel kept in sync with a character's clip.
///
/// `play`/`pause`/`resume`/`stop` return false only on a genuine failure;
/// having nothing to play counts as success.
pub trait AudioSync: fmt::Debug {
    fn channel(&self) -> &AudioChannelState;
    fn channel_mut(&mut self) -> &mut AudioChannelState;

    /// Resolve the clip's voice asset and reset to Stopped.
    fn prepare(&mut self, clip: &ClipData);
    fn play(&mut self, position: f32) -> bool;
    fn pause(&mut self, fade_out: bool) -> bool;
    fn resume(&mut self) -> bool;
    fn stop(&mut self, force: bool) -> bool;

    /// Name of the host component audio plays on, if any.
    fn sink_name(&self) -> Option<String> {
        None
    }

    fn tick(&mut self, dt: f32) {
        if self.is_playing() {
            self.channel_mut().progress += dt;
        }
    }

    fn is_playing(&self) -> bool {
        self.channel().state == AudioState::Playing
    }

    fn is_paused(&self) -> bool {
        self.channel().state == AudioState::Paused
    }

    fn is_stopped(&self) -> bool {
        self.channel().state == AudioState::Stopped
    }

    fn is_playing_or_paused(&self) -> bool {
        !self.is_stopped()
    }

    fn current_progress(&self) -> f32 {
        self.channel().progress
    }

    fn is_auto_play(&self) -> bool {
        self.channel().auto_play
    }

    fn set_auto_play(&mut self, auto_play: bool) {
        self.channel_mut().auto_play = auto_play;
    }
}

/// Adapter for characters without a voice. Every call succeeds.
#[derive(Debug, Default, Clone)]
pub struct SilentAudio {
    channel: AudioChannelState,
}

impl AudioSync for SilentAudio {
    fn channel(&self) -> &AudioChannelState {
        &self.channel
    }

    fn channel_mut(&mut self) -> &mut AudioChannelState {
        &mut self.channel
    }

    fn prepare(&mut self, _clip: &ClipData) {
        self.channel.state = AudioState::Stopped;
        self.channel.progress = 0.0;
    }

    fn play(&mut self, _position: f32) -> bool {
        true
    }

    fn pause(&mut self, _fade_out: bool) -> bool {
        true
    }

    fn resume(&mut self) -> bool {
        true
    }

    fn stop(&mut self, _force: bool) -> bool {
        self.channel.state = AudioState::Stopped;
        self.channel.progress = 0.0;
        true
    }
}

/// Host audio component a [`VoiceAudio`] plays through.
pub trait VoiceSink: fmt::Debug {
    fn name(&self) -> &str;
    /// Load a voice asset, returning its duration in seconds.
    fn load(&mut self, asset: &str) -> Option<f32>;
    fn prefetch(&mut self, _asset: &str) {}
    /// Start `asset` at `position`; returns whether it is now playing.
    fn start(&mut self, asset: &str, position: f32) -> bool;
    fn stop(&mut self);
    fn fade_out(&mut self, seconds: f32);
}

/// Reference adapter: plays the clip's voice asset on a [`VoiceSink`].
#[derive(Debug, Default)]
pub struct VoiceAudio {
    channel: AudioChannelState,
    sink: Option<Box<dyn VoiceSink>>,
    voice: Option<String>,
}

impl VoiceAudio {
    pub fn new(sink: Box<dyn VoiceSink>) -> Self {
        Self {
            sink: Some(sink),
            ..Self::default()
        }
    }

    pub fn set_sink(&mut self, sink: Option<Box<dyn VoiceSink>>) {
        self.sink = sink;
    }

    /// Voice asset resolved by the last `prepare`.
    pub fn voice(&self) -> Option<&str> {
        self.voice.as_deref()
    }
}

impl AudioSync for VoiceAudio {
    fn channel(&self) -> &AudioChannelState {
        &self.channel
    }

    fn channel_mut(&mut self) -> &mut AudioChannelState {
        &mut self.channel
    }

    fn prepare(&mut self, clip: &ClipData) {
        self.voice = if self.channel.auto_play {
            clip.voice.clone()
        } else {
            None
        };
        if let (Some(voice), Some(sink)) = (self.voice.as_deref(), self.sink.as_mut()) {
            sink.prefetch(voice);
        }
        self.channel.state = AudioState::Stopped;
        self.channel.progress = 0.0;
    }

    fn play(&mut self, position: f32) -> bool {
        let Some(voice) = self.voice.as_deref().filter(|_| self.channel.auto_play) else {
            return true;
        };
        let Some(sink) = self.sink.as_mut() else {
            log::error!("cannot play voice '{voice}': no audio sink");
            return false;
        };
        let Some(duration) = sink.load(voice) else {
            log::error!("cannot play voice '{voice}': asset failed to load");
            return false;
        };
        self.channel.progress = position.clamp(0.0, duration.max(0.0));
        let started = sink.start(voice, self.channel.progress);
        self.channel.state = if started {
            AudioState::Playing
        } else {
            AudioState::Stopped
        };
        started
    }

    fn pause(&mut self, fade_out: bool) -> bool {
        if !self.is_playing() {
            return true;
        }
        let Some(sink) = self.sink.as_mut() else {
            return false;
        };
        if fade_out {
            sink.fade_out(FADE_OUT_SECONDS);
        } else {
            sink.stop();
        }
        self.channel.state = AudioState::Paused;
        true
    }

    fn resume(&mut self) -> bool {
        if !self.is_paused() {
            return true;
        }
        let (Some(voice), Some(sink)) = (self.voice.as_deref(), self.sink.as_mut()) else {
            return false;
        };
        let started = sink.start(voice, self.channel.progress);
        if started {
            self.channel.state = AudioState::Playing;
        }
        started
    }

    fn stop(&mut self, force: bool) -> bool {
        if !self.is_playing_or_paused() && !force {
            return true;
        }
        self.channel.progress = 0.0;
        self.channel.state = AudioState::Stopped;
        match self.sink.as_mut() {
            Some(sink) => {
                sink.stop();
                true
            }
            None => false,
        }
    }

    fn sink_name(&self) -> Option<String> {
        self.sink.as_ref().map(|s| s.name().to_string())
    }
}
