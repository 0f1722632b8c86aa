//! Visage Core (engine-agnostic)
//!
//! Per-character facial animation playback. A [`Character`] decodes a
//! compiled facial rig through a pluggable [`Backend`], plays compiled clips
//! against it, distributes track values to host morph targets and material
//! parameters, produces bone transforms in host convention, and keeps a voice
//! audio channel in step with the clip.

pub mod audio;
pub mod backend;
pub mod channels;
pub mod character;
pub mod config;
pub mod data;
pub mod error;
pub mod evaluator;
pub mod events;
pub mod host;
pub mod space;
pub mod state;

// Re-exports for consumers (adapters)
pub use audio::{AudioChannelState, AudioState, AudioSync, SilentAudio, VoiceAudio, VoiceSink};
pub use backend::{
    Backend, ChannelFlags, CountingAllocator, FiredEvent, HandleAllocator, HandleKind,
    OwnedHandle, ReferenceBackend, SystemAllocator,
};
pub use channels::{ChannelMapper, MaterialBinding, MorphBinding};
pub use character::Character;
pub use config::{BlendMode, Config};
pub use data::{name_id, ClipBounds, ClipData, ClipId, RigData};
pub use error::{BackendError, FaceError};
pub use evaluator::{ClipHandle, Evaluator, FrameOutput, RigStore};
pub use events::{CharacterEvent, CharacterListener, ListenerId};
pub use host::{HostMesh, MeshRef};
pub use space::{BoneBinding, BoneTransform, RawXform, Transform};
pub use state::{PlaybackSession, PlaybackState};
