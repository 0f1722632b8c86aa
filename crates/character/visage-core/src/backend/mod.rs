//! Decode/compute backend contract.
//!
//! A backend turns compiled rig and clip blobs into opaque handles and
//! evaluates them. The character never looks inside the handles; it only
//! drives them through [`Backend`] via the evaluator.

pub mod alloc;
pub mod reference;

use std::fmt;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::data::ClipBounds;
use crate::error::BackendError;
use crate::space::RawXform;

pub use alloc::{CountingAllocator, HandleAllocator, HandleKind, OwnedHandle, SystemAllocator};
pub use reference::ReferenceBackend;

bitflags! {
    /// Per-channel flags reported after each processed frame.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct ChannelFlags: u32 {
        /// A clip is bound to the channel.
        const ACTIVE = 1;
        /// The clip's voice start was crossed this frame.
        const START_AUDIO = 1 << 1;
        /// Frame time is at or past the clip end.
        const ENDED = 1 << 2;
    }
}

/// A payload event crossed during a processed frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FiredEvent {
    pub channel: usize,
    /// Time within the channel, relative to the clip start.
    pub channel_time: f32,
    /// Authored event time.
    pub event_time: f32,
    pub payload: String,
}

/// Decoded value plus the backend's non-fatal legacy-format warning.
#[derive(Debug)]
pub struct Decoded<T> {
    pub value: T,
    pub legacy_format: bool,
}

/// Opaque decode/compute engine.
///
/// Each actor has exactly one playback channel. `process_frame` evaluates
/// the bound clip at a clip-local time and stores results in the frame
/// state; the query methods read them back.
pub trait Backend: fmt::Debug {
    type Actor: fmt::Debug;
    type BoneSet: fmt::Debug;
    type Frame: fmt::Debug;
    type Anim: fmt::Debug;

    fn create_actor(&self, bytes: &[u8]) -> Result<Decoded<Self::Actor>, BackendError>;
    fn create_bone_set(&self, bytes: &[u8]) -> Result<Self::BoneSet, BackendError>;
    fn create_frame_state(&self, actor: &Self::Actor) -> Result<Self::Frame, BackendError>;
    fn create_anim(&self, bytes: &[u8]) -> Result<Self::Anim, BackendError>;

    fn anim_bounds(&self, anim: &Self::Anim) -> Result<ClipBounds, BackendError>;
    /// Clip-local time at which the clip's voice starts, if it has one.
    fn anim_audio_start(&self, _anim: &Self::Anim) -> Option<f32> {
        None
    }
    fn is_compatible(&self, actor: &Self::Actor, anim: &Self::Anim) -> bool;

    /// Bind `anim` to the actor's channel and rewind its event cursor.
    fn play(&self, actor: &mut Self::Actor, anim: &Self::Anim) -> Result<(), BackendError>;
    fn stop(&self, actor: &mut Self::Actor) -> Result<(), BackendError>;
    fn pause(&self, actor: &mut Self::Actor, time: f32) -> Result<(), BackendError>;
    fn resume(&self, actor: &mut Self::Actor, time: f32) -> Result<(), BackendError>;

    /// Evaluate the channel at `time`. With `emit_events` false the frame
    /// still reports flags but records no events and leaves the cursor alone.
    /// Without `anim` the frame is cleared to zero track values.
    fn process_frame(
        &self,
        actor: &mut Self::Actor,
        anim: Option<&Self::Anim>,
        frame: &mut Self::Frame,
        time: f32,
        emit_events: bool,
    ) -> Result<(), BackendError>;

    fn channel_flags(&self, frame: &Self::Frame) -> ChannelFlags;
    fn take_events(&self, frame: &mut Self::Frame) -> Vec<FiredEvent>;

    fn track_ids(&self, actor: &Self::Actor) -> Vec<u64>;
    /// Copy the last processed track values; `out` is aligned with `track_ids`.
    fn read_track_values(&self, frame: &Self::Frame, out: &mut [f32]) -> Result<(), BackendError>;

    fn bone_ids(&self, bones: &Self::BoneSet) -> Vec<u64>;
    /// Compute local bone transforms for the last processed frame; `out` is
    /// aligned with `bone_ids`.
    fn calc_bone_xforms(
        &self,
        bones: &Self::BoneSet,
        actor: &Self::Actor,
        frame: &Self::Frame,
        out: &mut [RawXform],
    ) -> Result<(), BackendError>;
}
