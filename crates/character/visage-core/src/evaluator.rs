//! Engine-agnostic wrapper over a [`Backend`].
//!
//! The evaluator builds [`RigStore`] and [`ClipHandle`] values, drives the
//! backend's playback channel and pulls results back out. All backend
//! handles are [`OwnedHandle`]s registered with the evaluator's allocator.

use std::sync::Arc;

use crate::backend::{
    Backend, ChannelFlags, FiredEvent, HandleAllocator, HandleKind, OwnedHandle, ReferenceBackend,
    SystemAllocator,
};
use crate::data::{ClipBounds, ClipData, ClipId, RigData};
use crate::error::{BackendError, FaceError};
use crate::space::{compensate_front_axis, to_host_space, RawXform, Transform};

/// Decoded rig for one character plus the backend handles derived from it.
#[derive(Debug)]
pub struct RigStore<B: Backend> {
    actor: OwnedHandle<B::Actor>,
    frame: OwnedHandle<B::Frame>,
    bones: Option<OwnedHandle<B::BoneSet>>,
    track_ids: Vec<u64>,
    bone_ids: Vec<u64>,
    track_values: Vec<f32>,
    raw_bones: Vec<RawXform>,
    legacy_format: bool,
}

impl<B: Backend> RigStore<B> {
    pub fn track_ids(&self) -> &[u64] {
        &self.track_ids
    }

    /// Bone ids in rig (transform index) order.
    pub fn bone_ids(&self) -> &[u64] {
        &self.bone_ids
    }

    /// Track values of the last evaluated frame, aligned with `track_ids`.
    pub fn track_values(&self) -> &[f32] {
        &self.track_values
    }

    pub fn has_bones(&self) -> bool {
        self.bones.as_ref().is_some_and(|b| !b.is_null())
    }

    /// The backend decoded the actor from an outdated format.
    pub fn legacy_format(&self) -> bool {
        self.legacy_format
    }

    pub fn is_null(&self) -> bool {
        self.actor.is_null()
    }

    /// Release every backend handle. Safe to call repeatedly.
    pub fn destroy(&mut self) {
        if let Some(bones) = self.bones.as_mut() {
            bones.destroy();
        }
        self.frame.destroy();
        self.actor.destroy();
    }
}

/// An instantiated clip, ready to be bound to a rig's channel.
#[derive(Debug)]
pub struct ClipHandle<B: Backend> {
    anim: OwnedHandle<B::Anim>,
    id: ClipId,
    bounds: ClipBounds,
    audio_start: Option<f32>,
}

impl<B: Backend> ClipHandle<B> {
    pub fn id(&self) -> &ClipId {
        &self.id
    }

    pub fn bounds(&self) -> ClipBounds {
        self.bounds
    }

    pub fn duration(&self) -> f32 {
        self.bounds.duration()
    }

    /// Clip-local time of the voice start.
    pub fn audio_start(&self) -> Option<f32> {
        self.audio_start
    }

    pub fn is_null(&self) -> bool {
        self.anim.is_null()
    }

    pub fn destroy(&mut self) {
        self.anim.destroy();
    }
}

/// Result of one processed frame. Track values are read from the rig store.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameOutput {
    pub flags: ChannelFlags,
    pub events: Vec<FiredEvent>,
}

impl FrameOutput {
    #[inline]
    pub fn start_audio(&self) -> bool {
        self.flags.contains(ChannelFlags::START_AUDIO)
    }
}

#[derive(Debug)]
pub struct Evaluator<B: Backend = ReferenceBackend> {
    backend: B,
    allocator: Arc<dyn HandleAllocator>,
}

impl<B: Backend + Default> Default for Evaluator<B> {
    fn default() -> Self {
        Self::new(B::default())
    }
}

fn load_err(e: BackendError) -> FaceError {
    FaceError::load(e.to_string())
}

impl<B: Backend> Evaluator<B> {
    pub fn new(backend: B) -> Self {
        Self::with_allocator(backend, Arc::new(SystemAllocator))
    }

    pub fn with_allocator(backend: B, allocator: Arc<dyn HandleAllocator>) -> Self {
        Self { backend, allocator }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn own<T>(&self, value: T, kind: HandleKind) -> OwnedHandle<T> {
        OwnedHandle::new(value, kind, self.allocator.clone())
    }

    /// Decode a rig into backend handles.
    pub fn load(&self, rig: &RigData) -> Result<RigStore<B>, FaceError> {
        if !rig.is_valid() {
            return Err(FaceError::load("actor bytes are empty"));
        }
        let bones = match rig.bone_bytes() {
            Some(bytes) => {
                let set = self.backend.create_bone_set(bytes).map_err(load_err)?;
                Some(self.own(set, HandleKind::BoneSet))
            }
            None => None,
        };
        let decoded = self.backend.create_actor(&rig.actor_bytes).map_err(load_err)?;
        if decoded.legacy_format {
            log::warn!("rig was compiled with an outdated format; recompile it");
        }
        let actor = self.own(decoded.value, HandleKind::Actor);
        let frame = actor
            .get()
            .ok_or_else(|| BackendError::null_handle("actor"))
            .and_then(|a| self.backend.create_frame_state(a))
            .map_err(load_err)?;
        let frame = self.own(frame, HandleKind::FrameState);

        let track_ids = actor
            .get()
            .map(|a| self.backend.track_ids(a))
            .unwrap_or_default();
        let bone_ids = bones
            .as_ref()
            .and_then(|b| b.get())
            .map(|b| self.backend.bone_ids(b))
            .unwrap_or_default();

        Ok(RigStore {
            track_values: vec![0.0; track_ids.len()],
            raw_bones: vec![RawXform::IDENTITY; bone_ids.len()],
            actor,
            frame,
            bones,
            track_ids,
            bone_ids,
            legacy_format: decoded.legacy_format,
        })
    }

    /// Decode a clip. Compatibility is not checked here.
    pub fn instantiate_clip(&self, clip: &ClipData) -> Result<ClipHandle<B>, FaceError> {
        if clip.bytes.is_empty() {
            return Err(FaceError::load(format!("clip {} has no data", clip.id)));
        }
        let anim = self.backend.create_anim(&clip.bytes).map_err(load_err)?;
        let bounds = self.backend.anim_bounds(&anim)?;
        if clip.bounds.is_some_and(|cached| cached != bounds) {
            log::debug!("cached bounds of {} differ from the compiled clip", clip.id);
        }
        let audio_start = self.backend.anim_audio_start(&anim);
        Ok(ClipHandle {
            anim: self.own(anim, HandleKind::Anim),
            id: clip.id.clone(),
            bounds,
            audio_start,
        })
    }

    pub fn check_compatible(&self, rig: &RigStore<B>, clip: &ClipHandle<B>) -> bool {
        match (rig.actor.get(), clip.anim.get()) {
            (Some(actor), Some(anim)) => self.backend.is_compatible(actor, anim),
            _ => false,
        }
    }

    /// Bind `clip` to the rig's channel, rewinding the event cursor.
    pub fn start(&self, rig: &mut RigStore<B>, clip: &ClipHandle<B>) -> Result<(), FaceError> {
        let anim = clip.anim.get().ok_or_else(|| BackendError::null_handle("clip"))?;
        let actor = rig
            .actor
            .get_mut()
            .ok_or_else(|| BackendError::null_handle("actor"))?;
        Ok(self.backend.play(actor, anim)?)
    }

    pub fn stop(&self, rig: &mut RigStore<B>) -> Result<(), FaceError> {
        let actor = rig
            .actor
            .get_mut()
            .ok_or_else(|| BackendError::null_handle("actor"))?;
        Ok(self.backend.stop(actor)?)
    }

    pub fn pause(&self, rig: &mut RigStore<B>, time: f32) -> Result<(), FaceError> {
        let actor = rig
            .actor
            .get_mut()
            .ok_or_else(|| BackendError::null_handle("actor"))?;
        Ok(self.backend.pause(actor, time)?)
    }

    pub fn resume(&self, rig: &mut RigStore<B>, time: f32) -> Result<(), FaceError> {
        let actor = rig
            .actor
            .get_mut()
            .ok_or_else(|| BackendError::null_handle("actor"))?;
        Ok(self.backend.resume(actor, time)?)
    }

    fn process(
        &self,
        rig: &mut RigStore<B>,
        clip: Option<&ClipHandle<B>>,
        time: f32,
        emit_events: bool,
    ) -> Result<FrameOutput, FaceError> {
        let anim = clip.and_then(|c| c.anim.get());
        let (Some(actor), Some(frame)) = (rig.actor.get_mut(), rig.frame.get_mut()) else {
            return Err(BackendError::null_handle("rig").into());
        };
        self.backend
            .process_frame(actor, anim, frame, time, emit_events)?;
        let flags = self.backend.channel_flags(frame);
        let events = self.backend.take_events(frame);
        self.backend.read_track_values(frame, &mut rig.track_values)?;
        Ok(FrameOutput { flags, events })
    }

    /// Evaluate the clip at clip-local time `time`.
    pub fn advance_to(
        &self,
        rig: &mut RigStore<B>,
        clip: &ClipHandle<B>,
        time: f32,
    ) -> Result<FrameOutput, FaceError> {
        self.process(rig, Some(clip), time, true)
    }

    /// Process one frame with no clip bound, returning every track to zero
    /// so bones fall back to their rest pose.
    pub fn clear_frame(&self, rig: &mut RigStore<B>) -> Result<(), FaceError> {
        self.process(rig, None, 0.0, false).map(drop)
    }

    /// Evaluate at `time` after a freshly started channel.
    ///
    /// First evaluates the clip start with events suppressed and folds its
    /// voice-start flag into the result, so a seek past the start still
    /// reports that audio should begin.
    pub fn seek_to(
        &self,
        rig: &mut RigStore<B>,
        clip: &ClipHandle<B>,
        time: f32,
    ) -> Result<FrameOutput, FaceError> {
        let scan = self.process(rig, Some(clip), clip.bounds.start, false)?;
        let mut out = self.process(rig, Some(clip), time, true)?;
        out.flags |= scan.flags & ChannelFlags::START_AUDIO;
        Ok(out)
    }

    /// Host-space local transforms for every rig bone, in rig order.
    pub fn compute_bone_transforms(
        &self,
        rig: &mut RigStore<B>,
        compensate_axis: bool,
        out: &mut Vec<Transform>,
    ) -> Result<(), FaceError> {
        out.clear();
        let Some(bones) = rig.bones.as_ref().and_then(|b| b.get()) else {
            return Ok(());
        };
        let (Some(actor), Some(frame)) = (rig.actor.get(), rig.frame.get()) else {
            return Err(BackendError::null_handle("rig").into());
        };
        self.backend
            .calc_bone_xforms(bones, actor, frame, &mut rig.raw_bones)?;
        out.extend(rig.raw_bones.iter().map(|raw| {
            let t = to_host_space(raw);
            if compensate_axis {
                compensate_front_axis(&t)
            } else {
                t
            }
        }));
        Ok(())
    }

    /// Release a handle. A no-op on an already released one.
    pub fn destroy<T>(&self, handle: &mut OwnedHandle<T>) {
        handle.destroy();
    }
}
