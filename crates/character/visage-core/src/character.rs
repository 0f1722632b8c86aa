//! The character playback state machine.
//!
//! A [`Character`] owns one evaluator, one channel mapper and one audio
//! adapter. Hosts load a rig once, drive playback with
//! `play`/`pause`/`resume`/`stop`/`jump_to`, and call `tick` once per frame
//! while playing. Bone transforms are recomputed lazily on request.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use crate::audio::{AudioSync, SilentAudio};
use crate::backend::{Backend, FiredEvent, HandleAllocator, ReferenceBackend};
use crate::channels::ChannelMapper;
use crate::config::{BlendMode, Config};
use crate::data::{ClipBounds, ClipData, ClipId, RigData};
use crate::error::FaceError;
use crate::evaluator::{ClipHandle, Evaluator, FrameOutput, RigStore};
use crate::events::{CharacterEvent, CharacterListener, ListenerId, Listeners};
use crate::host::{HostMesh, MeshRef};
use crate::space::{bind_bones, BoneBinding, BoneTransform, Transform};
use crate::state::{PlaybackSession, PlaybackState};

#[derive(Debug)]
pub struct Character<B: Backend = ReferenceBackend> {
    evaluator: Evaluator<B>,
    config: Config,
    rig_data: Option<Arc<RigData>>,
    rig: Option<RigStore<B>>,
    clip: Option<ClipHandle<B>>,
    session: PlaybackSession,
    channels: ChannelMapper,
    bone_bindings: Vec<BoneBinding>,
    /// Rig bone names in transform order; `None` for ids missing from the id table.
    bone_names: Vec<Option<String>>,
    rig_bones: Vec<Transform>,
    bone_transforms: Vec<BoneTransform>,
    audio: Box<dyn AudioSync>,
    mesh: MeshRef,
    listeners: Listeners,
}

impl Default for Character<ReferenceBackend> {
    fn default() -> Self {
        Self::new(ReferenceBackend)
    }
}

impl<B: Backend> Character<B> {
    pub fn new(backend: B) -> Self {
        Self::with_evaluator(Evaluator::new(backend))
    }

    /// Character whose backend handles are registered with `allocator`.
    pub fn with_allocator(backend: B, allocator: Arc<dyn HandleAllocator>) -> Self {
        Self::with_evaluator(Evaluator::with_allocator(backend, allocator))
    }

    pub fn with_evaluator(evaluator: Evaluator<B>) -> Self {
        Self {
            evaluator,
            config: Config::default(),
            rig_data: None,
            rig: None,
            clip: None,
            session: PlaybackSession::default(),
            channels: ChannelMapper::default(),
            bone_bindings: Vec::new(),
            bone_names: Vec::new(),
            rig_bones: Vec::new(),
            bone_transforms: Vec::new(),
            audio: Box::new(SilentAudio::default()),
            mesh: MeshRef::default(),
            listeners: Listeners::default(),
        }
    }

    /// Attach the host mesh. Bindings are built from it on the next `load`.
    pub fn set_host_mesh<M: HostMesh + 'static>(&mut self, mesh: &Rc<RefCell<M>>) {
        self.mesh = MeshRef::new(mesh);
    }

    pub fn clear_host_mesh(&mut self) {
        self.mesh = MeshRef::default();
    }

    pub fn set_audio(&mut self, audio: Box<dyn AudioSync>) {
        self.audio = audio;
    }

    pub fn audio(&self) -> &dyn AudioSync {
        self.audio.as_ref()
    }

    pub fn audio_mut(&mut self) -> &mut dyn AudioSync {
        self.audio.as_mut()
    }

    pub fn subscribe<L: CharacterListener + 'static>(&mut self, listener: L) -> ListenerId {
        self.listeners.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.listeners.unsubscribe(id)
    }

    // ---------- lifecycle ----------

    /// Load a rig, replacing anything previously loaded.
    ///
    /// On failure the character is left fully reset.
    pub fn load(&mut self, rig: Arc<RigData>, config: Config) -> Result<(), FaceError> {
        self.reset();
        if let Err(err) = self.try_load(rig, config) {
            log::error!("failed to load character: {err}");
            self.reset();
            return Err(err);
        }
        Ok(())
    }

    fn try_load(&mut self, rig: Arc<RigData>, config: Config) -> Result<(), FaceError> {
        let store = self.evaluator.load(&rig)?;

        let bone_names: Vec<Option<String>> = store
            .bone_ids()
            .iter()
            .map(|id| {
                let name = rig.name_of(*id).map(str::to_owned);
                if name.is_none() {
                    log::warn!("unknown bone id {id}");
                }
                name
            })
            .collect();

        let (channels, bone_bindings) = self
            .mesh
            .with(|mesh| {
                let channels = ChannelMapper::build(store.track_ids(), &rig.id_table, mesh, &config);
                let named = bone_names
                    .iter()
                    .enumerate()
                    .filter_map(|(i, name)| name.as_deref().map(|n| (i, n)));
                (channels, bind_bones(named, mesh))
            })
            .unwrap_or_default();

        self.rig_bones = Vec::with_capacity(bone_names.len());
        self.bone_transforms = Vec::with_capacity(bone_bindings.len());
        self.bone_names = bone_names;
        self.channels = channels;
        self.bone_bindings = bone_bindings;
        self.rig = Some(store);
        self.rig_data = Some(rig);
        self.config = config;
        self.session = PlaybackSession::loaded();
        log::debug!("character loaded");
        Ok(())
    }

    /// Tear everything down: stop, release every backend handle, drop bindings.
    pub fn reset(&mut self) {
        self.stop(false);
        if let Some(mut clip) = self.clip.take() {
            clip.destroy();
        }
        if let Some(mut rig) = self.rig.take() {
            rig.destroy();
        }
        self.rig_data = None;
        self.channels.clear();
        self.bone_bindings.clear();
        self.bone_names.clear();
        self.rig_bones.clear();
        self.bone_transforms.clear();
        self.session = PlaybackSession::default();
    }

    // ---------- playback ----------

    /// Start `clip` from the beginning.
    ///
    /// Replaying the clip that is already current reuses its handle. A clip
    /// that fails the compatibility or bounds check leaves playback untouched.
    pub fn play(&mut self, clip: &ClipData, looping: bool) -> Result<(), FaceError> {
        let Some(rig) = self.rig.as_ref() else {
            log::error!("cannot play {}: character is not loaded", clip.id);
            return Err(FaceError::NotLoaded);
        };
        if !clip.is_valid() {
            return Err(FaceError::load(format!("clip '{}' has no data", clip.id)));
        }

        let same_clip = self.session.state.is_active()
            && self.clip.as_ref().is_some_and(|c| *c.id() == clip.id);

        if same_clip {
            let duration = self.clip.as_ref().map_or(0.0, ClipHandle::duration);
            check_duration(&clip.id, duration)?;
            self.audio.stop(false);
        } else {
            let candidate = self.evaluator.instantiate_clip(clip)?;
            if !self.evaluator.check_compatible(rig, &candidate) {
                drop(candidate);
                log::error!("{} is incompatible with the loaded rig", clip.id);
                self.listeners
                    .dispatch(&CharacterEvent::IncompatibleAnimationRequested {
                        clip: clip.id.clone(),
                    });
                return Err(FaceError::IncompatibleAnimation {
                    clip: clip.id.clone(),
                });
            }
            check_duration(&clip.id, candidate.duration())?;
            if let Some(current) = self.current_clip().filter(|_| self.session.state.is_active()) {
                log::warn!("stopping {current} to play {}", clip.id);
                self.stop(false);
            }
            self.clip = Some(candidate);
        }

        let bounds = self.clip.as_ref().map(ClipHandle::bounds).unwrap_or_default();
        self.session.progress = 0.0;
        self.session.duration = bounds.duration();
        self.session.clip_start = bounds.start;
        // Evaluate the first frame right away so a pause or bone query before
        // the next tick does not show the previous clip's pose.
        let first = match self.start_channel().and_then(|()| self.evaluate()) {
            Ok(out) => out,
            Err(err) => {
                self.clip = None;
                self.session = PlaybackSession::loaded();
                return Err(err);
            }
        };
        self.audio.prepare(clip);
        self.session.looping = looping;
        self.session.state = PlaybackState::Playing;
        self.session.dirty = true;
        self.distribute();
        log::debug!("playing {}", clip.id);
        self.listeners.dispatch(&CharacterEvent::PlaybackStarted {
            clip: clip.id.clone(),
        });
        self.dispatch_fired(&first.events);
        if first.start_audio() {
            self.start_audio(0.0);
        }
        Ok(())
    }

    /// Stop and restart the backend channel for the current clip.
    fn start_channel(&mut self) -> Result<(), FaceError> {
        let Some(rig) = self.rig.as_mut() else {
            return Err(FaceError::NotLoaded);
        };
        let Some(clip) = self.clip.as_ref() else {
            return Err(FaceError::NoActiveClip);
        };
        self.evaluator.stop(rig)?;
        self.evaluator.start(rig, clip)
    }

    /// Rewind the current clip to its start without reloading it.
    pub fn restart(&mut self) -> Result<(), FaceError> {
        self.start_channel()?;
        self.session.progress = 0.0;
        self.session.dirty = true;
        Ok(())
    }

    pub fn pause(&mut self, fade_out: bool) -> Result<(), FaceError> {
        let Some(rig) = self.rig.as_mut() else {
            return Err(FaceError::NotLoaded);
        };
        if self.session.state.is_playing() {
            self.evaluator.pause(rig, self.session.clip_time())?;
            self.session.state = PlaybackState::Paused;
        }
        self.audio.pause(fade_out);
        if let Some(clip) = self.clip.as_ref().filter(|_| self.session.state.is_active()) {
            self.listeners.dispatch(&CharacterEvent::PlaybackPaused {
                clip: clip.id().clone(),
            });
        }
        Ok(())
    }

    pub fn resume(&mut self) -> Result<(), FaceError> {
        let Some(rig) = self.rig.as_mut() else {
            return Err(FaceError::NotLoaded);
        };
        match self.session.state {
            PlaybackState::Playing => Err(FaceError::AlreadyInState {
                state: PlaybackState::Playing.name().to_string(),
            }),
            PlaybackState::Paused => {
                self.evaluator.resume(rig, self.session.clip_time())?;
                self.session.state = PlaybackState::Playing;
                self.audio.resume();
                Ok(())
            }
            _ => Err(FaceError::NoActiveClip),
        }
    }

    /// Stop playback and release the current clip. Always safe to call.
    ///
    /// `enforce` forwards a forced stop to the audio channel even when
    /// nothing is playing.
    pub fn stop(&mut self, enforce: bool) {
        let was_active = self.session.state.is_active();
        if let Some(rig) = self.rig.as_mut() {
            if was_active {
                if let Err(err) = self.evaluator.stop(rig) {
                    log::warn!("backend stop failed: {err}");
                }
                // Next bone update starts from the rest pose.
                if let Err(err) = self.evaluator.clear_frame(rig) {
                    log::warn!("failed to clear frame after stop: {err}");
                }
            }
            let channels = &self.channels;
            self.mesh.with(|mesh| channels.reset_material_defaults(mesh));
            self.session.state = PlaybackState::Stopped;
            self.session.dirty = true;
        }
        let stopped = self.clip.take().map(|mut clip| {
            clip.destroy();
            clip.id().clone()
        });
        self.session.progress = 0.0;
        if self.rig.is_some() || enforce {
            self.audio.stop(enforce);
        }
        if let Some(clip) = stopped.filter(|_| was_active) {
            log::debug!("stopped {clip}");
            self.listeners
                .dispatch(&CharacterEvent::PlaybackStopped { clip });
        }
    }

    /// Jump to `position` seconds into the current clip and keep playing.
    ///
    /// Looping clips wrap positions past the end; otherwise they are rejected.
    pub fn jump_to(&mut self, position: f32, pause_after: bool) -> Result<(), FaceError> {
        if self.rig.is_none() {
            return Err(FaceError::NotLoaded);
        }
        if self.clip.is_none() || !self.session.state.is_active() {
            return Err(FaceError::NoActiveClip);
        }
        let duration = self.session.duration;
        if !(position >= 0.0) || (!self.session.looping && position > duration) {
            return Err(FaceError::invalid_range(format!(
                "position {position} outside [0, {duration}]"
            )));
        }
        let target = if position > duration {
            position % duration
        } else {
            position
        };

        self.start_channel()?;
        self.session.state = PlaybackState::Playing;
        let time = self.session.clip_start + target;
        let out = {
            let (Some(rig), Some(clip)) = (self.rig.as_mut(), self.clip.as_ref()) else {
                return Err(FaceError::NoActiveClip);
            };
            self.evaluator.seek_to(rig, clip, time)?
        };
        self.session.progress = target;
        self.session.dirty = true;
        self.distribute();
        self.dispatch_fired(&out.events);

        if out.start_audio() {
            self.start_audio(time);
        } else {
            self.audio.stop(false);
        }
        if pause_after {
            self.pause(true)?;
        }
        Ok(())
    }

    /// Advance playback by `dt` seconds. Ignored unless playing.
    pub fn tick(&mut self, dt: f32) -> Result<(), FaceError> {
        if !self.session.state.is_playing() {
            if dt > 0.0 {
                log::debug!("tick ignored while {}", self.session.state.name());
            }
            return Ok(());
        }
        self.session.current_time += dt;
        self.session.progress += dt;

        let mut finished = false;
        let mut audio_position = 0.0;
        if dt > 0.0 && self.session.progress >= self.session.duration {
            if self.session.looping {
                let wrapped = self.session.progress % self.session.duration;
                self.finish_pass()?;
                self.restart()?;
                self.session.progress = wrapped;
                audio_position = self.voice_offset();
            } else {
                self.session.progress = self.session.duration;
                finished = true;
            }
        }

        let out = self.evaluate()?;
        self.distribute();
        self.session.dirty = true;
        self.dispatch_fired(&out.events);
        if out.start_audio() {
            self.start_audio(audio_position);
        }
        self.audio.tick(dt);

        if finished {
            self.stop(false);
        }
        Ok(())
    }

    /// Evaluate the end of a looping pass so events and a voice start in
    /// its last interval fire before the channel rewinds.
    fn finish_pass(&mut self) -> Result<(), FaceError> {
        self.session.progress = self.session.duration;
        let out = self.evaluate()?;
        self.dispatch_fired(&out.events);
        if out.start_audio() {
            self.start_audio(0.0);
        }
        Ok(())
    }

    /// Seconds into the voice matching the current clip time.
    fn voice_offset(&self) -> f32 {
        self.clip
            .as_ref()
            .and_then(ClipHandle::audio_start)
            .map_or(0.0, |start| (self.session.clip_time() - start).max(0.0))
    }

    fn evaluate(&mut self) -> Result<FrameOutput, FaceError> {
        let time = self.session.clip_time();
        let (Some(rig), Some(clip)) = (self.rig.as_mut(), self.clip.as_ref()) else {
            return Err(FaceError::NoActiveClip);
        };
        self.evaluator.advance_to(rig, clip, time)
    }

    fn distribute(&self) {
        if let Some(rig) = self.rig.as_ref() {
            let channels = &self.channels;
            self.mesh
                .with(|mesh| channels.distribute(rig.track_values(), mesh));
        }
    }

    fn dispatch_fired(&mut self, events: &[FiredEvent]) {
        if self.config.ignore_events {
            return;
        }
        for e in events {
            self.listeners.dispatch(&CharacterEvent::AnimationEvent {
                channel: e.channel,
                channel_time: e.channel_time,
                event_time: e.event_time,
                payload: e.payload.clone(),
            });
        }
    }

    fn start_audio(&mut self, position: f32) {
        let Some(clip) = self.current_clip().cloned() else {
            return;
        };
        let started = self.audio.play(position);
        if !started {
            log::warn!("audio for {clip} failed to start");
        }
        let sink = self.audio.sink_name();
        self.listeners.dispatch(&CharacterEvent::AudioStartRequested {
            clip,
            started,
            sink,
        });
    }

    // ---------- bone output ----------

    /// Host bone transforms for the current frame, sorted by host bone index.
    ///
    /// Recomputed only when playback changed since the last call and
    /// `update_if_dirty` is set.
    pub fn bone_transforms(&mut self, update_if_dirty: bool) -> Result<&[BoneTransform], FaceError> {
        if update_if_dirty && self.session.dirty {
            self.update_bone_transforms()?;
        }
        Ok(&self.bone_transforms)
    }

    /// Host-space transforms in rig bone order, before skeleton binding.
    pub fn rig_bone_transforms(&mut self) -> Result<&[Transform], FaceError> {
        if self.session.dirty {
            self.update_bone_transforms()?;
        }
        Ok(&self.rig_bones)
    }

    fn update_bone_transforms(&mut self) -> Result<(), FaceError> {
        self.bone_transforms.clear();
        let Some(rig) = self.rig.as_mut() else {
            self.rig_bones.clear();
            return Ok(());
        };
        self.evaluator
            .compute_bone_transforms(rig, self.config.compensate_axis, &mut self.rig_bones)?;
        for binding in &self.bone_bindings {
            let Some(t) = self.rig_bones.get(binding.transform_index) else {
                continue;
            };
            let transform = match self.config.blend_mode {
                BlendMode::Replace => *t,
                BlendMode::Additive => binding.to_additive(t),
            };
            self.bone_transforms.push(BoneTransform {
                bone_index: binding.bone_index,
                transform,
            });
        }
        self.session.dirty = false;
        Ok(())
    }

    // ---------- queries ----------

    /// Whether `clip` decodes and is compatible with the loaded rig.
    pub fn can_play(&self, clip: &ClipData) -> bool {
        let Some(rig) = self.rig.as_ref() else {
            return false;
        };
        self.evaluator
            .instantiate_clip(clip)
            .map(|candidate| self.evaluator.check_compatible(rig, &candidate))
            .unwrap_or(false)
    }

    /// Clip bounds as reported by the backend.
    pub fn clip_bounds(&self, clip: &ClipData) -> Result<ClipBounds, FaceError> {
        self.evaluator.instantiate_clip(clip).map(|candidate| candidate.bounds())
    }

    pub fn state(&self) -> PlaybackState {
        self.session.state
    }

    pub fn session(&self) -> &PlaybackSession {
        &self.session
    }

    pub fn is_loaded(&self) -> bool {
        self.rig.is_some()
    }

    pub fn is_playing(&self) -> bool {
        self.session.state.is_playing()
    }

    pub fn is_paused(&self) -> bool {
        self.session.state.is_paused()
    }

    pub fn is_stopped(&self) -> bool {
        self.session.state == PlaybackState::Stopped
    }

    pub fn is_looping(&self) -> bool {
        self.session.looping
    }

    /// Playing or paused, optionally on a specific clip.
    pub fn is_playing_or_paused(&self, clip: Option<&ClipId>) -> bool {
        self.session.state.is_active()
            && clip.map_or(true, |id| self.current_clip() == Some(id))
    }

    pub fn is_playing_audio(&self) -> bool {
        self.audio.is_playing()
    }

    pub fn progress(&self) -> f32 {
        self.session.progress
    }

    pub fn duration(&self) -> f32 {
        self.session.duration
    }

    pub fn current_time(&self) -> f32 {
        self.session.current_time
    }

    pub fn current_clip(&self) -> Option<&ClipId> {
        self.clip.as_ref().map(ClipHandle::id)
    }

    /// The loaded rig data.
    pub fn data(&self) -> Option<&Arc<RigData>> {
        self.rig_data.as_ref()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn channels(&self) -> &ChannelMapper {
        &self.channels
    }

    pub fn bone_bindings(&self) -> &[BoneBinding] {
        &self.bone_bindings
    }

    pub fn legacy_format(&self) -> bool {
        self.rig.as_ref().is_some_and(RigStore::legacy_format)
    }

    /// Names of rig bones found in the id table, in rig order.
    pub fn bone_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.bone_names.iter().filter_map(|n| n.as_deref())
    }

    /// Index into `rig_bone_transforms` for a bone name.
    pub fn bone_transform_index(&self, name: &str) -> Option<usize> {
        let id = self.rig_data.as_ref()?.id_of(name)?;
        self.rig.as_ref()?.bone_ids().iter().position(|b| *b == id)
    }

    pub fn set_auto_play_sound(&mut self, auto_play: bool) {
        self.audio.set_auto_play(auto_play);
    }

    pub fn is_auto_play_sound(&self) -> bool {
        self.audio.is_auto_play()
    }
}

fn check_duration(clip: &ClipId, duration: f32) -> Result<(), FaceError> {
    if duration > 0.0 {
        Ok(())
    } else {
        log::error!("{clip} has non-positive duration {duration}");
        Err(FaceError::invalid_range(format!(
            "clip {clip} has non-positive duration {duration}"
        )))
    }
}
