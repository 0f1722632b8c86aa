//! Shared rigs, clips and recording test doubles for visage tests.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{anyhow, Context, Result};
use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use visage_core::backend::reference::{
    CompiledActor, CompiledBone, CompiledBoneLink, CompiledBoneSet, CompiledClip, CompiledCurve,
    CompiledEvent, FORMAT_VERSION,
};
use visage_core::{
    name_id, AudioChannelState, AudioState, AudioSync, Backend, Character, CharacterEvent,
    ClipBounds, ClipData, ClipId, HostMesh, RawXform, RigData, Transform, VoiceSink,
};

static MANIFEST: Lazy<Manifest> = Lazy::new(|| {
    let raw = include_str!("../../../../fixtures/manifest.json");
    serde_json::from_str(raw).expect("fixtures manifest should parse")
});

#[derive(Debug, Deserialize)]
struct Manifest {
    rigs: HashMap<String, String>,
    clips: HashMap<String, String>,
}

fn fixtures_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../../fixtures")
}

fn load_json<T: DeserializeOwned>(rel: &str) -> Result<T> {
    let path = fixtures_root().join(rel);
    let text = fs::read_to_string(&path)
        .with_context(|| format!("failed to read fixture at {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("failed to parse JSON fixture {rel}"))
}

fn lookup<'a>(map: &'a HashMap<String, String>, kind: &str, name: &str) -> Result<&'a str> {
    map.get(name)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("unknown {kind} fixture '{name}'"))
}

pub mod rigs {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct RigFixture {
        actor: CompiledActor,
        #[serde(default)]
        bones: Option<CompiledBoneSet>,
        ids: HashMap<u64, String>,
    }

    pub fn keys() -> Vec<String> {
        MANIFEST.rigs.keys().cloned().collect()
    }

    pub fn load(name: &str) -> Result<RigData> {
        let fixture: RigFixture = load_json(lookup(&MANIFEST.rigs, "rig", name)?)?;
        let bone_bytes = fixture.bones.map(|b| b.to_bytes()).transpose()?;
        Ok(RigData::new(
            fixture.actor.to_bytes()?,
            bone_bytes,
            fixture.ids.into_iter().collect(),
        ))
    }
}

pub mod clips {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct ClipFixture {
        group: String,
        name: String,
        #[serde(default)]
        voice: Option<String>,
        clip: CompiledClip,
    }

    pub fn keys() -> Vec<String> {
        MANIFEST.clips.keys().cloned().collect()
    }

    pub fn load(name: &str) -> Result<ClipData> {
        let fixture: ClipFixture = load_json(lookup(&MANIFEST.clips, "clip", name)?)?;
        let mut clip = ClipData::new(
            ClipId::new(fixture.group, fixture.name),
            fixture.clip.to_bytes()?,
        )
        .with_bounds(ClipBounds::new(fixture.clip.start, fixture.clip.end));
        clip.voice = fixture.voice;
        Ok(clip)
    }
}

// ---------- builders ----------

/// Builds reference-format rig data with ids derived from names.
#[derive(Debug, Clone)]
pub struct RigBuilder {
    name: String,
    version: u32,
    tracks: Vec<String>,
    bones: Vec<(String, CompiledBone)>,
}

impl RigBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            version: FORMAT_VERSION,
            tracks: Vec::new(),
            bones: Vec::new(),
        }
    }

    pub fn version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    pub fn tracks(mut self, names: &[&str]) -> Self {
        self.tracks.extend(names.iter().map(|n| n.to_string()));
        self
    }

    pub fn bone(mut self, name: &str, rest: RawXform) -> Self {
        self.bones.push((
            name.to_string(),
            CompiledBone {
                id: name_id(name),
                rest,
                links: Vec::new(),
            },
        ));
        self
    }

    /// Make `track` translate `bone` by `translation` at full weight.
    pub fn link(mut self, bone: &str, track: &str, translation: [f32; 3]) -> Self {
        if let Some((_, b)) = self.bones.iter_mut().find(|(n, _)| n == bone) {
            b.links.push(CompiledBoneLink {
                track: name_id(track),
                translation,
                rotation: [1.0, 0.0, 0.0, 0.0],
                scale: [0.0; 3],
            });
        }
        self
    }

    pub fn build(self) -> RigData {
        let actor = CompiledActor {
            version: self.version,
            name: self.name,
            tracks: self.tracks.iter().map(|t| name_id(t)).collect(),
        };
        let bone_bytes = (!self.bones.is_empty()).then(|| {
            CompiledBoneSet {
                version: FORMAT_VERSION,
                bones: self.bones.iter().map(|(_, b)| b.clone()).collect(),
            }
            .to_bytes()
            .expect("compiled bone set should serialize")
        });
        let id_table = self
            .tracks
            .iter()
            .chain(self.bones.iter().map(|(n, _)| n))
            .map(|n| (name_id(n), n.clone()))
            .collect();
        let actor_bytes = actor
            .to_bytes()
            .expect("compiled actor should serialize");
        RigData::new(actor_bytes, bone_bytes, id_table)
    }
}

/// Builds reference-format clip data.
#[derive(Debug, Clone)]
pub struct ClipBuilder {
    id: ClipId,
    clip: CompiledClip,
    voice: Option<String>,
}

impl ClipBuilder {
    pub fn new(group: &str, name: &str) -> Self {
        Self {
            id: ClipId::new(group, name),
            clip: CompiledClip {
                version: FORMAT_VERSION,
                actor: None,
                start: 0.0,
                end: 1.0,
                curves: Vec::new(),
                audio_start: None,
                events: Vec::new(),
            },
            voice: None,
        }
    }

    pub fn bounds(mut self, start: f32, end: f32) -> Self {
        self.clip.start = start;
        self.clip.end = end;
        self
    }

    pub fn actor(mut self, actor: &str) -> Self {
        self.clip.actor = Some(actor.to_string());
        self
    }

    pub fn curve(mut self, track: &str, keys: &[(f32, f32)]) -> Self {
        self.clip.curves.push(CompiledCurve {
            track: name_id(track),
            keys: keys.iter().map(|(t, v)| [*t, *v]).collect(),
        });
        self
    }

    pub fn audio_at(mut self, time: f32) -> Self {
        self.clip.audio_start = Some(time);
        self
    }

    pub fn event(mut self, time: f32, payload: &str) -> Self {
        self.clip.events.push(CompiledEvent {
            time,
            payload: payload.to_string(),
        });
        self
    }

    pub fn voice(mut self, asset: &str) -> Self {
        self.voice = Some(asset.to_string());
        self
    }

    pub fn build(self) -> ClipData {
        let bytes = self
            .clip
            .to_bytes()
            .expect("compiled clip should serialize");
        let mut data = ClipData::new(self.id, bytes)
            .with_bounds(ClipBounds::new(self.clip.start, self.clip.end));
        data.voice = self.voice;
        data
    }
}

// ---------- host mesh ----------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaterialParam {
    pub default: f32,
    pub value: f32,
}

/// In-memory host mesh with morph targets, materials and a skeleton.
#[derive(Debug, Default)]
pub struct TestMesh {
    pub morphs: HashMap<String, f32>,
    pub materials: Vec<HashMap<String, MaterialParam>>,
    pub skeleton: Vec<(String, Transform)>,
    pub morph_writes: usize,
}

impl TestMesh {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_morphs(mut self, names: &[&str]) -> Self {
        for name in names {
            self.morphs.insert(name.to_string(), 0.0);
        }
        self
    }

    /// Add a material exposing `(name, default)` scalar parameters.
    pub fn with_material(mut self, params: &[(&str, f32)]) -> Self {
        self.materials.push(
            params
                .iter()
                .map(|(n, d)| {
                    (
                        n.to_string(),
                        MaterialParam {
                            default: *d,
                            value: *d,
                        },
                    )
                })
                .collect(),
        );
        self
    }

    pub fn with_bone(mut self, name: &str, reference: Transform) -> Self {
        self.skeleton.push((name.to_string(), reference));
        self
    }

    pub fn shared(self) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(self))
    }

    pub fn morph(&self, name: &str) -> Option<f32> {
        self.morphs.get(name).copied()
    }

    pub fn material_value(&self, material: usize, name: &str) -> Option<f32> {
        self.materials.get(material)?.get(name).map(|p| p.value)
    }
}

impl HostMesh for TestMesh {
    fn has_morph_target(&self, name: &str) -> bool {
        self.morphs.contains_key(name)
    }

    fn set_morph_target(&mut self, name: &str, weight: f32) {
        self.morph_writes += 1;
        self.morphs.insert(name.to_string(), weight);
    }

    fn material_count(&self) -> usize {
        self.materials.len()
    }

    fn has_material_scalar(&self, material: usize, name: &str) -> bool {
        self.materials
            .get(material)
            .is_some_and(|m| m.contains_key(name))
    }

    fn material_scalar_default(&self, material: usize, name: &str) -> Option<f32> {
        self.materials.get(material)?.get(name).map(|p| p.default)
    }

    fn set_material_scalar(&mut self, material: usize, name: &str, value: f32) {
        if let Some(p) = self
            .materials
            .get_mut(material)
            .and_then(|m| m.get_mut(name))
        {
            p.value = value;
        }
    }

    fn bone_index(&self, name: &str) -> Option<usize> {
        self.skeleton.iter().position(|(n, _)| n == name)
    }

    fn reference_pose(&self, bone: usize) -> Option<Transform> {
        self.skeleton.get(bone).map(|(_, t)| *t)
    }
}

// ---------- audio ----------

#[derive(Debug, Clone, PartialEq)]
pub enum AudioCall {
    Prepare(ClipId),
    Play(f32),
    Pause(bool),
    Resume,
    Stop(bool),
}

/// Shared view of the calls an audio double received.
#[derive(Debug, Clone, Default)]
pub struct AudioLog(Rc<RefCell<Vec<AudioCall>>>);

impl AudioLog {
    pub fn calls(&self) -> Vec<AudioCall> {
        self.0.borrow().clone()
    }

    pub fn plays(&self) -> Vec<f32> {
        self.0
            .borrow()
            .iter()
            .filter_map(|c| match c {
                AudioCall::Play(p) => Some(*p),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }

    fn push(&self, call: AudioCall) {
        self.0.borrow_mut().push(call);
    }
}

/// Audio adapter that records every call and always has a voice to play.
#[derive(Debug, Default)]
pub struct RecordingAudio {
    channel: AudioChannelState,
    log: AudioLog,
    /// Make `play` report failure.
    pub fail_play: bool,
}

impl RecordingAudio {
    pub fn new() -> (Self, AudioLog) {
        let audio = Self::default();
        let log = audio.log.clone();
        (audio, log)
    }
}

impl AudioSync for RecordingAudio {
    fn channel(&self) -> &AudioChannelState {
        &self.channel
    }

    fn channel_mut(&mut self) -> &mut AudioChannelState {
        &mut self.channel
    }

    fn prepare(&mut self, clip: &ClipData) {
        self.log.push(AudioCall::Prepare(clip.id.clone()));
        self.channel.state = AudioState::Stopped;
    }

    fn play(&mut self, position: f32) -> bool {
        self.log.push(AudioCall::Play(position));
        if self.fail_play {
            return false;
        }
        self.channel.progress = position;
        self.channel.state = AudioState::Playing;
        true
    }

    fn pause(&mut self, fade_out: bool) -> bool {
        self.log.push(AudioCall::Pause(fade_out));
        if self.is_playing() {
            self.channel.state = AudioState::Paused;
        }
        true
    }

    fn resume(&mut self) -> bool {
        self.log.push(AudioCall::Resume);
        if self.is_paused() {
            self.channel.state = AudioState::Playing;
        }
        true
    }

    fn stop(&mut self, force: bool) -> bool {
        self.log.push(AudioCall::Stop(force));
        self.channel.state = AudioState::Stopped;
        self.channel.progress = 0.0;
        true
    }

    fn sink_name(&self) -> Option<String> {
        Some("recording".to_string())
    }
}

/// Voice sink that records start/stop calls.
#[derive(Debug)]
pub struct RecordingSink {
    pub name: String,
    /// Duration reported for every asset; `None` simulates a failed load.
    pub duration: Option<f32>,
    pub log: Rc<RefCell<Vec<String>>>,
}

impl RecordingSink {
    pub fn new(name: &str, duration: Option<f32>) -> (Self, Rc<RefCell<Vec<String>>>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        (
            Self {
                name: name.to_string(),
                duration,
                log: log.clone(),
            },
            log,
        )
    }
}

impl VoiceSink for RecordingSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn load(&mut self, _asset: &str) -> Option<f32> {
        self.duration
    }

    fn start(&mut self, asset: &str, position: f32) -> bool {
        self.log.borrow_mut().push(format!("start {asset} @{position}"));
        true
    }

    fn stop(&mut self) {
        self.log.borrow_mut().push("stop".to_string());
    }

    fn fade_out(&mut self, _seconds: f32) {
        self.log.borrow_mut().push("fade".to_string());
    }
}

// ---------- events ----------

/// Collects every event a character dispatches.
#[derive(Debug, Clone, Default)]
pub struct EventLog(Rc<RefCell<Vec<CharacterEvent>>>);

impl EventLog {
    pub fn attach<B: Backend>(character: &mut Character<B>) -> Self {
        let log = Self::default();
        let sink = log.0.clone();
        character.subscribe(move |e: &CharacterEvent| sink.borrow_mut().push(e.clone()));
        log
    }

    pub fn events(&self) -> Vec<CharacterEvent> {
        self.0.borrow().clone()
    }

    pub fn count(&self, name: &str) -> usize {
        self.0.borrow().iter().filter(|e| e.name() == name).count()
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_fixtures_load() {
        for key in rigs::keys() {
            let rig = rigs::load(&key).unwrap();
            assert!(rig.is_valid());
        }
        for key in clips::keys() {
            let clip = clips::load(&key).unwrap();
            assert!(clip.is_valid());
        }
        assert!(rigs::load("missing").is_err());
    }

    #[test]
    fn test_builders_share_name_ids() {
        let rig = RigBuilder::new("r").tracks(&["A"]).bone("jaw", RawXform::IDENTITY).build();
        assert_eq!(rig.id_of("A"), Some(name_id("A")));
        assert_eq!(rig.id_of("jaw"), Some(name_id("jaw")));
        assert!(rig.bone_bytes().is_some());

        let clip = ClipBuilder::new("g", "c").bounds(0.0, 2.0).build();
        assert_eq!(clip.bounds, Some(ClipBounds::new(0.0, 2.0)));
    }
}
