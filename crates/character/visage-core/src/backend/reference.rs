//! Reference backend over a JSON "compiled" blob format.
//!
//! Actor, bone-set and clip blobs are serde documents. Curves are sampled
//! linearly; bone poses blend per-track pose deltas onto a rest pose.
//! Events and the voice start are raised when the evaluated time crosses
//! them, tracked by a per-channel cursor.

use hashbrown::HashMap;
use nalgebra::{Quaternion, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use super::{Backend, ChannelFlags, Decoded, FiredEvent};
use crate::data::ClipBounds;
use crate::error::BackendError;
use crate::space::RawXform;

/// Current blob format version. Older actors load with a legacy warning.
pub const FORMAT_VERSION: u32 = 2;

fn identity_rotation() -> [f32; 4] {
    [1.0, 0.0, 0.0, 0.0]
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompiledActor {
    pub version: u32,
    #[serde(default)]
    pub name: String,
    /// Track ids in channel order.
    pub tracks: Vec<u64>,
}

/// Pose delta a track applies to a bone at weight 1. Rotation is `[w, x, y, z]`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompiledBoneLink {
    pub track: u64,
    #[serde(default)]
    pub translation: [f32; 3],
    #[serde(default = "identity_rotation")]
    pub rotation: [f32; 4],
    #[serde(default)]
    pub scale: [f32; 3],
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompiledBone {
    pub id: u64,
    #[serde(default)]
    pub rest: RawXform,
    #[serde(default)]
    pub links: Vec<CompiledBoneLink>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompiledBoneSet {
    pub version: u32,
    pub bones: Vec<CompiledBone>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompiledCurve {
    pub track: u64,
    /// `[time, value]` keys.
    pub keys: Vec<[f32; 2]>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompiledEvent {
    pub time: f32,
    pub payload: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompiledClip {
    pub version: u32,
    /// Actor name the clip was compiled against, if pinned.
    #[serde(default)]
    pub actor: Option<String>,
    pub start: f32,
    pub end: f32,
    #[serde(default)]
    pub curves: Vec<CompiledCurve>,
    #[serde(default)]
    pub audio_start: Option<f32>,
    #[serde(default)]
    pub events: Vec<CompiledEvent>,
}

macro_rules! impl_to_bytes {
    ($($ty:ty),*) => {$(
        impl $ty {
            pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
                serde_json::to_vec(self)
            }
        }
    )*};
}

impl_to_bytes!(CompiledActor, CompiledBoneSet, CompiledClip);

#[derive(Debug, Default)]
struct Channel {
    bound: bool,
    paused_at: Option<f32>,
    /// Last time events were emitted for; `None` right after `play`.
    cursor: Option<f32>,
}

#[derive(Debug)]
pub struct RefActor {
    name: String,
    tracks: Vec<u64>,
    index: HashMap<u64, usize>,
    channel: Channel,
}

#[derive(Debug)]
pub struct RefBoneSet {
    bones: Vec<CompiledBone>,
}

#[derive(Debug)]
pub struct RefFrame {
    flags: ChannelFlags,
    values: Vec<f32>,
    events: Vec<FiredEvent>,
}

#[derive(Debug)]
pub struct RefAnim {
    clip: CompiledClip,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ReferenceBackend;

fn decode<T: for<'de> Deserialize<'de>>(bytes: &[u8], what: &str) -> Result<T, BackendError> {
    serde_json::from_slice(bytes)
        .map_err(|e| BackendError::new(BackendError::DECODE, format!("{what}: {e}")))
}

fn check_version(version: u32, what: &str) -> Result<(), BackendError> {
    if version > FORMAT_VERSION {
        return Err(BackendError::new(
            BackendError::UNSUPPORTED_VERSION,
            format!("{what} format version {version} is newer than {FORMAT_VERSION}"),
        ));
    }
    Ok(())
}

fn sample(keys: &[[f32; 2]], t: f32) -> f32 {
    let (Some(first), Some(last)) = (keys.first(), keys.last()) else {
        return 0.0;
    };
    if t <= first[0] {
        return first[1];
    }
    if t >= last[0] {
        return last[1];
    }
    for pair in keys.windows(2) {
        let ([t0, v0], [t1, v1]) = (pair[0], pair[1]);
        if t <= t1 {
            let span = t1 - t0;
            if span <= f32::EPSILON {
                return v1;
            }
            return v0 + (v1 - v0) * ((t - t0) / span);
        }
    }
    last[1]
}

fn quat_wxyz(q: [f32; 4]) -> UnitQuaternion<f32> {
    UnitQuaternion::new_normalize(Quaternion::new(q[0], q[1], q[2], q[3]))
}

impl Backend for ReferenceBackend {
    type Actor = RefActor;
    type BoneSet = RefBoneSet;
    type Frame = RefFrame;
    type Anim = RefAnim;

    fn create_actor(&self, bytes: &[u8]) -> Result<Decoded<RefActor>, BackendError> {
        let actor: CompiledActor = decode(bytes, "actor")?;
        check_version(actor.version, "actor")?;
        let index = actor
            .tracks
            .iter()
            .enumerate()
            .map(|(i, id)| (*id, i))
            .collect();
        Ok(Decoded {
            legacy_format: actor.version < FORMAT_VERSION,
            value: RefActor {
                name: actor.name,
                tracks: actor.tracks,
                index,
                channel: Channel::default(),
            },
        })
    }

    fn create_bone_set(&self, bytes: &[u8]) -> Result<RefBoneSet, BackendError> {
        let set: CompiledBoneSet = decode(bytes, "bone set")?;
        check_version(set.version, "bone set")?;
        Ok(RefBoneSet { bones: set.bones })
    }

    fn create_frame_state(&self, actor: &RefActor) -> Result<RefFrame, BackendError> {
        Ok(RefFrame {
            flags: ChannelFlags::empty(),
            values: vec![0.0; actor.tracks.len()],
            events: Vec::new(),
        })
    }

    fn create_anim(&self, bytes: &[u8]) -> Result<RefAnim, BackendError> {
        let mut clip: CompiledClip = decode(bytes, "clip")?;
        check_version(clip.version, "clip")?;
        for curve in &mut clip.curves {
            curve.keys.sort_by(|a, b| a[0].total_cmp(&b[0]));
        }
        clip.events.sort_by(|a, b| a.time.total_cmp(&b.time));
        Ok(RefAnim { clip })
    }

    fn anim_bounds(&self, anim: &RefAnim) -> Result<ClipBounds, BackendError> {
        Ok(ClipBounds::new(anim.clip.start, anim.clip.end))
    }

    fn anim_audio_start(&self, anim: &RefAnim) -> Option<f32> {
        anim.clip.audio_start
    }

    fn is_compatible(&self, actor: &RefActor, anim: &RefAnim) -> bool {
        let actor_matches = anim
            .clip
            .actor
            .as_ref()
            .map_or(true, |name| *name == actor.name);
        actor_matches
            && anim
                .clip
                .curves
                .iter()
                .all(|c| actor.index.contains_key(&c.track))
    }

    fn play(&self, actor: &mut RefActor, _anim: &RefAnim) -> Result<(), BackendError> {
        actor.channel = Channel {
            bound: true,
            ..Channel::default()
        };
        Ok(())
    }

    fn stop(&self, actor: &mut RefActor) -> Result<(), BackendError> {
        actor.channel = Channel::default();
        Ok(())
    }

    fn pause(&self, actor: &mut RefActor, time: f32) -> Result<(), BackendError> {
        if !actor.channel.bound {
            return Err(BackendError::new(
                BackendError::NOT_PLAYING,
                "pause on an idle channel",
            ));
        }
        actor.channel.paused_at = Some(time);
        Ok(())
    }

    fn resume(&self, actor: &mut RefActor, _time: f32) -> Result<(), BackendError> {
        if !actor.channel.bound {
            return Err(BackendError::new(
                BackendError::NOT_PLAYING,
                "resume on an idle channel",
            ));
        }
        actor.channel.paused_at = None;
        Ok(())
    }

    fn process_frame(
        &self,
        actor: &mut RefActor,
        anim: Option<&RefAnim>,
        frame: &mut RefFrame,
        time: f32,
        emit_events: bool,
    ) -> Result<(), BackendError> {
        frame.values.iter_mut().for_each(|v| *v = 0.0);
        frame.events.clear();
        frame.flags = ChannelFlags::empty();

        let Some(anim) = anim.filter(|_| actor.channel.bound) else {
            return Ok(());
        };
        let clip = &anim.clip;
        let sample_time = actor.channel.paused_at.unwrap_or(time);
        for curve in &clip.curves {
            if let Some(&i) = actor.index.get(&curve.track) {
                frame.values[i] = sample(&curve.keys, sample_time);
            }
        }
        frame.flags |= ChannelFlags::ACTIVE;
        if sample_time >= clip.end {
            frame.flags |= ChannelFlags::ENDED;
        }
        if actor.channel.paused_at.is_some() {
            return Ok(());
        }

        let cursor = actor.channel.cursor;
        let crossed = |at: f32| at <= time && cursor.map_or(true, |c| at > c);
        if clip.audio_start.is_some_and(crossed) {
            frame.flags |= ChannelFlags::START_AUDIO;
        }
        if emit_events {
            frame.events.extend(clip.events.iter().filter(|e| crossed(e.time)).map(|e| {
                FiredEvent {
                    channel: 0,
                    channel_time: time - clip.start,
                    event_time: e.time,
                    payload: e.payload.clone(),
                }
            }));
            actor.channel.cursor = Some(time);
        }
        Ok(())
    }

    fn channel_flags(&self, frame: &RefFrame) -> ChannelFlags {
        frame.flags
    }

    fn take_events(&self, frame: &mut RefFrame) -> Vec<FiredEvent> {
        std::mem::take(&mut frame.events)
    }

    fn track_ids(&self, actor: &RefActor) -> Vec<u64> {
        actor.tracks.clone()
    }

    fn read_track_values(&self, frame: &RefFrame, out: &mut [f32]) -> Result<(), BackendError> {
        if out.len() != frame.values.len() {
            return Err(BackendError::new(
                BackendError::BUFFER_SIZE,
                format!("expected {} track slots, got {}", frame.values.len(), out.len()),
            ));
        }
        out.copy_from_slice(&frame.values);
        Ok(())
    }

    fn bone_ids(&self, bones: &RefBoneSet) -> Vec<u64> {
        bones.bones.iter().map(|b| b.id).collect()
    }

    fn calc_bone_xforms(
        &self,
        bones: &RefBoneSet,
        actor: &RefActor,
        frame: &RefFrame,
        out: &mut [RawXform],
    ) -> Result<(), BackendError> {
        if out.len() != bones.bones.len() {
            return Err(BackendError::new(
                BackendError::BUFFER_SIZE,
                format!("expected {} bone slots, got {}", bones.bones.len(), out.len()),
            ));
        }
        for (bone, slot) in bones.bones.iter().zip(out.iter_mut()) {
            let mut translation = Vector3::from(bone.rest.translation);
            let mut scale = Vector3::from(bone.rest.scale);
            let mut rotation = quat_wxyz(bone.rest.rotation);
            for link in &bone.links {
                let weight = actor
                    .index
                    .get(&link.track)
                    .map_or(0.0, |&i| frame.values[i]);
                if weight == 0.0 {
                    continue;
                }
                translation += Vector3::from(link.translation) * weight;
                scale += Vector3::from(link.scale) * weight;
                let delta = quat_wxyz(link.rotation).scaled_axis() * weight;
                rotation *= UnitQuaternion::from_scaled_axis(delta);
            }
            let q = rotation.quaternion();
            *slot = RawXform {
                rotation: [q.w, q.i, q.j, q.k],
                translation: translation.into(),
                scale: scale.into(),
            };
        }
        Ok(())
    }
}
