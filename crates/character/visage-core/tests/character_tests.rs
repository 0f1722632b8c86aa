use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use visage_core::{
    AudioSync, BlendMode, Character, CharacterEvent, ClipBounds, ClipId, Config, CountingAllocator,
    FaceError, HandleKind, PlaybackState, ReferenceBackend, RigData, Transform, VoiceAudio,
};
use visage_test_fixtures::{
    clips, rigs, AudioCall, AudioLog, ClipBuilder, EventLog, RecordingAudio, RecordingSink,
    RigBuilder, TestMesh,
};

fn approx(a: f32, b: f32, eps: f32) {
    assert!((a - b).abs() <= eps, "left={a} right={b} eps={eps}");
}

struct Harness {
    character: Character,
    mesh: Rc<RefCell<TestMesh>>,
    events: EventLog,
    audio: AudioLog,
    counter: Arc<CountingAllocator>,
}

fn slade_mesh() -> Rc<RefCell<TestMesh>> {
    TestMesh::new()
        .with_morphs(&["A", "B", "jaw_open"])
        .with_material(&[("blush", 0.25)])
        .with_material(&[("gloss", 1.0), ("blush", 0.1)])
        .with_bone(
            "jaw",
            Transform::new([0.0, -1.5, 0.0], [0.0, 0.0, 0.0, 1.0], [1.0; 3]),
        )
        .with_bone("head", Transform::IDENTITY)
        .shared()
}

fn harness(config: Config) -> Harness {
    let counter = Arc::new(CountingAllocator::new());
    let mut character = Character::with_allocator(ReferenceBackend, counter.clone());
    let mesh = slade_mesh();
    character.set_host_mesh(&mesh);
    let (audio, log) = RecordingAudio::new();
    character.set_audio(Box::new(audio));
    let events = EventLog::attach(&mut character);
    character
        .load(Arc::new(rigs::load("slade").unwrap()), config)
        .unwrap();
    Harness {
        character,
        mesh,
        events,
        audio: log,
        counter,
    }
}

/// it should hand back the exact rig data it was loaded with
#[test]
fn load_round_trips_rig_data() {
    let rig = Arc::new(rigs::load("slade").unwrap());
    let mut character = Character::default();
    character.load(rig.clone(), Config::default()).unwrap();
    assert_eq!(character.data().map(|d| d.as_ref()), Some(rig.as_ref()));
    assert_eq!(character.state(), PlaybackState::Stopped);
    assert!(character.is_loaded());
    assert!(!character.legacy_format());
}

/// it should leave the character fully reset when a load fails
#[test]
fn failed_load_resets_everything() {
    let mut h = harness(Config::default());
    let clip = clips::load("hello").unwrap();
    h.character.play(&clip, false).unwrap();
    assert!(h.counter.live_total() > 0);

    let err = h
        .character
        .load(Arc::new(RigData::default()), Config::default())
        .unwrap_err();
    assert!(matches!(err, FaceError::Load { .. }));
    assert_eq!(h.character.state(), PlaybackState::Unloaded);
    assert!(h.character.data().is_none());
    assert_eq!(h.counter.live_total(), 0);

    let garbage = RigData::new(b"not a rig".to_vec(), None, Default::default());
    assert!(h.character.load(Arc::new(garbage), Config::default()).is_err());
    assert!(!h.character.is_loaded());
}

/// it should accept legacy rigs with a warning marker
#[test]
fn legacy_rig_loads() {
    let rig = RigBuilder::new("old").version(1).tracks(&["A"]).build();
    let mut character = Character::default();
    character.load(Arc::new(rig), Config::default()).unwrap();
    assert!(character.legacy_format());
}

/// it should bind morphs first, then material parameters, and skip unknown names
#[test]
fn load_builds_channel_bindings() {
    let h = harness(Config::default());
    let morphs: Vec<&str> = h
        .character
        .channels()
        .morphs()
        .iter()
        .map(|b| b.name.as_str())
        .collect();
    assert_eq!(morphs, ["A", "B", "jaw_open"]);
    let materials: Vec<&str> = h
        .character
        .channels()
        .materials()
        .iter()
        .map(|b| b.name.as_str())
        .collect();
    assert_eq!(materials, ["blush"]);

    let h = harness(Config {
        disable_material_parameters: true,
        ..Config::default()
    });
    assert!(h.character.channels().materials().is_empty());
}

/// it should play to the end, stop once, keep morphs and restore materials
#[test]
fn scenario_play_to_end_without_loop() {
    let mut h = harness(Config::default());
    let clip = clips::load("hello").unwrap();
    h.character.play(&clip, false).unwrap();
    assert_eq!(h.events.count("playback_started"), 1);

    h.character.tick(1.0).unwrap();
    approx(h.character.progress(), 1.0, 1e-6);
    assert_eq!(h.character.state(), PlaybackState::Playing);
    {
        let mesh = h.mesh.borrow();
        approx(mesh.morph("A").unwrap(), 0.5, 1e-6);
        approx(mesh.morph("B").unwrap(), 0.5, 1e-6);
        approx(mesh.material_value(0, "blush").unwrap(), 0.75, 1e-6);
        approx(mesh.material_value(1, "blush").unwrap(), 0.75, 1e-6);
        approx(mesh.material_value(1, "gloss").unwrap(), 1.0, 1e-6);
    }

    h.character.tick(1.0).unwrap();
    assert_eq!(h.character.state(), PlaybackState::Stopped);
    assert_eq!(h.character.progress(), 0.0);
    assert_eq!(h.character.current_clip(), None);
    assert_eq!(h.events.count("playback_stopped"), 1);
    {
        let mesh = h.mesh.borrow();
        approx(mesh.morph("A").unwrap(), 1.0, 1e-6);
        approx(mesh.morph("B").unwrap(), 0.0, 1e-6);
        approx(mesh.material_value(0, "blush").unwrap(), 0.25, 1e-6);
        approx(mesh.material_value(1, "blush").unwrap(), 0.1, 1e-6);
    }

    // further ticks and stops are no-ops
    h.character.tick(1.0).unwrap();
    h.character.stop(false);
    assert_eq!(h.events.count("playback_stopped"), 1);
    assert_eq!(h.counter.live(HandleKind::Anim), 0);
}

/// it should wrap a looping clip by modulo and never stop
#[test]
fn scenario_loop_wraps_progress() {
    let mut h = harness(Config::default());
    let clip = clips::load("blink-loop").unwrap();
    h.character.play(&clip, true).unwrap();
    assert!(h.character.is_looping());

    h.character.tick(1.5).unwrap();
    approx(h.character.progress(), 0.5, 1e-6);
    assert_eq!(h.character.state(), PlaybackState::Playing);

    // 1.5 + 0.75 + 0.75 + 1.0 = 4 * 1.0 + 0.0
    for dt in [0.75, 0.75, 1.0] {
        h.character.tick(dt).unwrap();
        assert_eq!(h.character.state(), PlaybackState::Playing);
    }
    approx(h.character.progress(), 0.0, 1e-5);

    h.character.tick(3.25).unwrap();
    approx(h.character.progress(), 0.25, 1e-5);
    assert_eq!(h.events.count("playback_stopped"), 0);
    approx(h.character.current_time(), 7.25, 1e-5);
}

fn payloads(events: &EventLog) -> Vec<String> {
    events
        .events()
        .into_iter()
        .filter_map(|e| match e {
            CharacterEvent::AnimationEvent { payload, .. } => Some(payload),
            _ => None,
        })
        .collect()
}

/// it should raise end-of-pass events and the voice start on every loop
#[test]
fn loop_fires_events_every_pass() {
    let mut h = harness(Config::default());
    let clip = ClipBuilder::new("idle", "breath")
        .bounds(0.0, 1.0)
        .curve("A", &[(0.0, 0.0), (1.0, 1.0)])
        .audio_at(0.0)
        .event(0.0, "inhale")
        .event(0.95, "exhale")
        .build();
    h.character.play(&clip, true).unwrap();
    for _ in 0..12 {
        h.character.tick(0.25).unwrap();
    }

    assert_eq!(
        payloads(&h.events),
        ["inhale", "exhale", "inhale", "exhale", "inhale", "exhale", "inhale"]
    );
    assert_eq!(h.events.count("audio_start_requested"), 4);
    assert_eq!(h.audio.plays(), [0.0; 4]);
    assert_eq!(h.events.count("playback_stopped"), 0);
}

/// it should restart the voice in step with the wrapped clip time
#[test]
fn loop_wrap_keeps_voice_in_step() {
    let mut h = harness(Config::default());
    let clip = ClipBuilder::new("idle", "hum")
        .bounds(0.0, 1.0)
        .curve("A", &[(0.0, 0.0), (1.0, 1.0)])
        .audio_at(0.0)
        .build();
    h.character.play(&clip, true).unwrap();
    h.character.tick(0.75).unwrap();
    h.character.tick(0.5).unwrap();
    approx(h.character.progress(), 0.25, 1e-6);
    assert_eq!(h.audio.plays(), [0.0, 0.25]);
}

/// it should return bones to the rest pose when playback stops
#[test]
fn stop_restores_rest_pose() {
    let mut h = harness(Config::default());
    let rest = h.character.rig_bone_transforms().unwrap().to_vec();
    let rest_bound = h.character.bone_transforms(true).unwrap().to_vec();

    h.character
        .play(&clips::load("hello").unwrap(), false)
        .unwrap();
    h.character.tick(0.5).unwrap();
    assert_ne!(h.character.rig_bone_transforms().unwrap().to_vec(), rest);

    h.character.stop(false);
    assert_eq!(h.character.rig_bone_transforms().unwrap().to_vec(), rest);
    assert_eq!(h.character.bone_transforms(true).unwrap().to_vec(), rest_bound);
}

/// it should show the first frame of a clip as soon as it is played
#[test]
fn play_evaluates_first_frame() {
    let mut h = harness(Config::default());
    let rest = h.character.bone_transforms(true).unwrap().to_vec();
    let hello = clips::load("hello").unwrap();

    h.character.play(&hello, false).unwrap();
    // B starts at 1 before any tick
    approx(h.mesh.borrow().morph("B").unwrap(), 1.0, 1e-6);
    h.character.tick(1.5).unwrap();
    assert_ne!(h.character.bone_transforms(true).unwrap().to_vec(), rest);

    // replaying keeps the channel but must drop the old pose immediately
    h.character.play(&hello, false).unwrap();
    h.character.pause(false).unwrap();
    assert_eq!(h.character.bone_transforms(true).unwrap().to_vec(), rest);

    let still = ClipBuilder::new("idle", "still").bounds(0.0, 1.0).build();
    h.character.play(&still, false).unwrap();
    h.character.pause(false).unwrap();
    assert_eq!(h.character.bone_transforms(true).unwrap().to_vec(), rest);
}

/// it should raise an event at the clip start exactly once
#[test]
fn start_event_fires_once() {
    let mut h = harness(Config::default());
    let clip = ClipBuilder::new("vo", "open")
        .bounds(0.0, 1.0)
        .curve("A", &[(0.0, 0.0), (1.0, 1.0)])
        .event(0.0, "open")
        .build();
    h.character.play(&clip, false).unwrap();
    assert_eq!(payloads(&h.events), ["open"]);
    h.character.tick(0.25).unwrap();
    h.character.tick(0.25).unwrap();
    assert_eq!(payloads(&h.events), ["open"]);
}

/// it should produce identical bone output after restarting the same clip
#[test]
fn restart_is_deterministic() {
    let clip = clips::load("hello").unwrap();

    let mut a = harness(Config::default());
    a.character.play(&clip, false).unwrap();
    a.character.tick(0.5).unwrap();
    let first = a.character.bone_transforms(true).unwrap().to_vec();

    let mut b = harness(Config::default());
    b.character.play(&clip, false).unwrap();
    b.character.stop(false);
    b.character.play(&clip, false).unwrap();
    b.character.tick(0.5).unwrap();
    let second = b.character.bone_transforms(true).unwrap().to_vec();

    assert!(!first.is_empty());
    assert_eq!(first, second);
}

/// it should convert bones into host space and sort them by host index
#[test]
fn bone_transforms_use_host_convention() {
    let mut h = harness(Config::default());
    let clip = clips::load("hello").unwrap();
    h.character.play(&clip, false).unwrap();
    h.character.tick(0.5).unwrap();

    let bones = h.character.bone_transforms(true).unwrap().to_vec();
    assert_eq!(bones.len(), 2);
    assert_eq!(bones[0].bone_index, 0);
    assert_eq!(bones[1].bone_index, 1);

    let jaw = bones[0].transform;
    approx(jaw.translation[1], -1.5, 1e-6);
    approx(jaw.translation[2], -0.5, 1e-6);
    // half of a 45 degree turn about X
    approx(jaw.rotation[0], 0.19509, 1e-4);
    approx(jaw.rotation[3], 0.98079, 1e-4);

    let head = bones[1].transform;
    approx(head.translation[1], -2.0, 1e-6);
}

/// it should only recompute bone output when playback changed
#[test]
fn bone_transforms_are_cached_until_dirty() {
    let mut h = harness(Config::default());
    let clip = clips::load("hello").unwrap();
    h.character.play(&clip, false).unwrap();
    h.character.tick(0.5).unwrap();
    assert!(h.character.session().dirty);
    let first = h.character.bone_transforms(true).unwrap().to_vec();
    assert!(!h.character.session().dirty);

    h.character.tick(0.5).unwrap();
    let stale = h.character.bone_transforms(false).unwrap().to_vec();
    assert_eq!(stale, first);
    let fresh = h.character.bone_transforms(true).unwrap().to_vec();
    assert_ne!(fresh, first);
}

/// it should emit offsets from the reference pose in additive mode
#[test]
fn additive_mode_outputs_reference_offsets() {
    let mut h = harness(Config {
        blend_mode: BlendMode::Additive,
        ..Config::default()
    });
    let clip = clips::load("hello").unwrap();
    h.character.play(&clip, false).unwrap();
    h.character.tick(0.5).unwrap();
    let jaw = h.character.bone_transforms(true).unwrap()[0].transform;
    approx(jaw.translation[1], 0.0, 1e-6);
    approx(jaw.translation[2], -0.5, 1e-6);
    approx(jaw.scale[0], 0.0, 1e-6);
}

/// it should rotate output by -90 degrees about Z when compensating the front axis
#[test]
fn compensate_axis_rotates_rig_bones() {
    let mut h = harness(Config {
        compensate_axis: true,
        ..Config::default()
    });
    let clip = clips::load("hello").unwrap();
    h.character.play(&clip, false).unwrap();
    h.character.tick(0.5).unwrap();
    let head = h.character.bone_transform_index("head").unwrap();
    let t = h.character.rig_bone_transforms().unwrap()[head];
    approx(t.translation[0], -2.0, 1e-5);
    approx(t.translation[1], 0.0, 1e-5);
}

/// it should expose named bones and their transform indices
#[test]
fn bone_names_and_indices() {
    let h = harness(Config::default());
    let names: Vec<&str> = h.character.bone_names().collect();
    assert_eq!(names, ["rig:jaw", "head"]);
    assert_eq!(h.character.bone_transform_index("rig:jaw"), Some(0));
    assert_eq!(h.character.bone_transform_index("head"), Some(1));
    assert_eq!(h.character.bone_transform_index("nose"), None);
    // "rig:jaw" binds to host "jaw" once the namespace is stripped
    assert_eq!(h.character.bone_bindings().len(), 2);
}

/// it should treat stop as idempotent and safe before load
#[test]
fn stop_is_idempotent() {
    let mut character = Character::default();
    let (audio, log) = RecordingAudio::new();
    character.set_audio(Box::new(audio));
    let events = EventLog::attach(&mut character);
    character.stop(false);
    character.stop(false);
    assert!(log.calls().is_empty());
    character.stop(true);
    assert_eq!(log.calls(), [AudioCall::Stop(true)]);
    assert!(events.events().is_empty());

    let mut h = harness(Config::default());
    let clip = clips::load("hello").unwrap();
    h.character.play(&clip, false).unwrap();
    h.character.stop(false);
    h.character.stop(false);
    assert_eq!(h.events.count("playback_stopped"), 1);
}

/// it should reject an incompatible clip without disturbing current playback
#[test]
fn incompatible_clip_keeps_session() {
    let mut h = harness(Config::default());
    let hello = clips::load("hello").unwrap();
    h.character.play(&hello, false).unwrap();
    h.character.tick(0.5).unwrap();
    assert_eq!(h.counter.total(HandleKind::Anim), 1);

    let foreign = clips::load("foreign").unwrap();
    let err = h.character.play(&foreign, false).unwrap_err();
    assert_eq!(
        err,
        FaceError::IncompatibleAnimation {
            clip: foreign.id.clone()
        }
    );
    assert_eq!(h.character.state(), PlaybackState::Playing);
    assert_eq!(h.character.current_clip(), Some(&hello.id));
    approx(h.character.progress(), 0.5, 1e-6);
    assert_eq!(h.events.count("incompatible_animation_requested"), 1);
    assert_eq!(h.events.count("playback_stopped"), 0);
    assert_eq!(h.counter.total(HandleKind::Anim), 2);
    assert_eq!(h.counter.live(HandleKind::Anim), 1);

    assert!(h.character.can_play(&hello));
    assert!(!h.character.can_play(&foreign));
    assert_eq!(h.counter.live(HandleKind::Anim), 1);
}

/// it should reject clips with non-positive duration before touching state
#[test]
fn zero_duration_clip_rejected() {
    let mut h = harness(Config::default());
    let hello = clips::load("hello").unwrap();
    h.character.play(&hello, false).unwrap();
    let flat = ClipBuilder::new("vo", "flat").bounds(1.0, 1.0).build();
    let err = h.character.play(&flat, false).unwrap_err();
    assert!(matches!(err, FaceError::InvalidRange { .. }));
    assert_eq!(h.character.current_clip(), Some(&hello.id));
    assert_eq!(h.counter.live(HandleKind::Anim), 1);
}

/// it should refuse to play before a rig is loaded
#[test]
fn play_requires_load() {
    let mut character = Character::default();
    let events = EventLog::attach(&mut character);
    let err = character
        .play(&clips::load("hello").unwrap(), false)
        .unwrap_err();
    assert_eq!(err, FaceError::NotLoaded);
    assert!(events.events().is_empty());
    assert_eq!(character.pause(false), Err(FaceError::NotLoaded));
    assert_eq!(character.resume(), Err(FaceError::NotLoaded));
    assert_eq!(character.jump_to(0.0, false), Err(FaceError::NotLoaded));
}

/// it should reuse the live clip handle when replaying the same clip
#[test]
fn scenario_replay_same_clip_reuses_handle() {
    let mut h = harness(Config::default());
    let clip = clips::load("hello").unwrap();
    h.character.play(&clip, false).unwrap();
    h.character.tick(0.5).unwrap();
    h.character.play(&clip, false).unwrap();

    assert_eq!(h.counter.total(HandleKind::Anim), 1);
    assert_eq!(h.counter.live(HandleKind::Anim), 1);
    assert_eq!(h.character.progress(), 0.0);
    assert_eq!(h.character.state(), PlaybackState::Playing);
    assert_eq!(h.events.count("playback_started"), 2);
    assert_eq!(h.events.count("playback_stopped"), 0);
}

/// it should stop the previous clip when switching to another one
#[test]
fn switching_clips_stops_previous() {
    let mut h = harness(Config::default());
    h.character
        .play(&clips::load("hello").unwrap(), false)
        .unwrap();
    let blink = clips::load("blink-loop").unwrap();
    h.character.play(&blink, true).unwrap();
    assert_eq!(h.character.current_clip(), Some(&blink.id));
    assert_eq!(h.events.count("playback_stopped"), 1);
    assert_eq!(h.counter.live(HandleKind::Anim), 1);
    assert!(h.character.is_playing_or_paused(Some(&blink.id)));
    assert!(!h.character.is_playing_or_paused(Some(&ClipId::new("vo", "hello"))));
}

/// it should start audio exactly once when jumping past the voice start
#[test]
fn scenario_jump_into_voiced_clip() {
    let mut h = harness(Config::default());
    let clip = clips::load("hello").unwrap();
    h.character.play(&clip, false).unwrap();
    h.audio.clear();
    h.events.clear();

    h.character.jump_to(0.5, false).unwrap();
    assert_eq!(h.audio.plays(), [0.5]);
    approx(h.character.progress(), 0.5, 1e-6);
    assert_eq!(h.character.state(), PlaybackState::Playing);
    assert_eq!(h.events.count("audio_start_requested"), 1);
    assert!(h.events.events().contains(&CharacterEvent::AudioStartRequested {
        clip: clip.id.clone(),
        started: true,
        sink: Some("recording".into()),
    }));
    // the blink at 0.5 is raised once by the jump
    assert_eq!(h.events.count("animation_event"), 1);

    h.character.tick(0.25).unwrap();
    assert_eq!(h.audio.plays(), [0.5]);
    assert_eq!(h.events.count("animation_event"), 1);
}

/// it should defer audio when jumping before a late voice start
#[test]
fn jump_before_late_voice_waits_for_tick() {
    let mut h = harness(Config::default());
    let clip = ClipBuilder::new("vo", "late")
        .bounds(0.0, 2.0)
        .curve("A", &[(0.0, 0.0), (2.0, 1.0)])
        .audio_at(1.0)
        .build();
    h.character.play(&clip, false).unwrap();
    h.character.jump_to(0.5, false).unwrap();
    assert!(h.audio.plays().is_empty());
    assert!(h.audio.calls().contains(&AudioCall::Stop(false)));

    h.character.tick(0.75).unwrap();
    assert_eq!(h.audio.plays(), [0.0]);
}

/// it should validate jump targets against the clip range
#[test]
fn jump_range_checks() {
    let mut h = harness(Config::default());
    assert_eq!(h.character.jump_to(0.5, false), Err(FaceError::NoActiveClip));

    let hello = clips::load("hello").unwrap();
    h.character.play(&hello, false).unwrap();
    h.character.tick(0.25).unwrap();
    for bad in [-0.1, 2.5, f32::NAN] {
        let err = h.character.jump_to(bad, false).unwrap_err();
        assert!(matches!(err, FaceError::InvalidRange { .. }));
    }
    approx(h.character.progress(), 0.25, 1e-6);

    let blink = clips::load("blink-loop").unwrap();
    h.character.play(&blink, true).unwrap();
    h.character.jump_to(2.25, false).unwrap();
    approx(h.character.progress(), 0.25, 1e-6);
}

/// it should land paused when asked to
#[test]
fn jump_and_pause() {
    let mut h = harness(Config::default());
    let hello = clips::load("hello").unwrap();
    h.character.play(&hello, false).unwrap();
    h.character.jump_to(1.0, true).unwrap();
    assert_eq!(h.character.state(), PlaybackState::Paused);
    approx(h.mesh.borrow().morph("jaw_open").unwrap(), 1.0, 1e-6);
    assert!(h.audio.calls().contains(&AudioCall::Pause(true)));
    assert_eq!(h.events.count("playback_paused"), 1);
}

/// it should pause, ignore ticks while paused and resume where it left off
#[test]
fn pause_and_resume() {
    let mut h = harness(Config::default());
    let hello = clips::load("hello").unwrap();
    h.character.play(&hello, false).unwrap();
    h.character.tick(0.5).unwrap();

    h.character.pause(false).unwrap();
    assert!(h.character.is_paused());
    assert_eq!(h.events.count("playback_paused"), 1);
    h.character.tick(1.0).unwrap();
    approx(h.character.progress(), 0.5, 1e-6);

    h.character.resume().unwrap();
    assert!(h.character.is_playing());
    assert_eq!(
        h.character.resume(),
        Err(FaceError::AlreadyInState {
            state: "playing".into()
        })
    );
    h.character.tick(0.5).unwrap();
    approx(h.character.progress(), 1.0, 1e-6);
    approx(h.mesh.borrow().morph("A").unwrap(), 0.5, 1e-6);

    h.character.stop(false);
    assert_eq!(h.character.resume(), Err(FaceError::NoActiveClip));
    // pausing while stopped is tolerated and silent
    h.character.pause(false).unwrap();
    assert_eq!(h.events.count("playback_paused"), 1);
}

/// it should forward in-clip events unless configured to ignore them
#[test]
fn animation_events_dispatch() {
    let mut h = harness(Config::default());
    let hello = clips::load("hello").unwrap();
    h.character.play(&hello, false).unwrap();
    h.character.tick(1.0).unwrap();
    let fired: Vec<CharacterEvent> = h
        .events
        .events()
        .into_iter()
        .filter(|e| e.name() == "animation_event")
        .collect();
    assert_eq!(
        fired,
        [CharacterEvent::AnimationEvent {
            channel: 0,
            channel_time: 1.0,
            event_time: 0.5,
            payload: "blink".into(),
        }]
    );
    // play already crossed the voice start
    assert_eq!(h.audio.plays(), [0.0]);
    assert_eq!(h.events.count("audio_start_requested"), 1);

    let mut quiet = harness(Config {
        ignore_events: true,
        ..Config::default()
    });
    quiet.character.play(&hello, false).unwrap();
    quiet.character.tick(1.0).unwrap();
    assert_eq!(quiet.events.count("animation_event"), 0);
    assert_eq!(quiet.events.count("audio_start_requested"), 1);
}

/// it should release every backend handle on reset
#[test]
fn reset_releases_handles() {
    let mut h = harness(Config::default());
    h.character
        .play(&clips::load("hello").unwrap(), false)
        .unwrap();
    for kind in HandleKind::ALL {
        assert_eq!(h.counter.live(kind), 1, "{kind:?}");
    }
    h.character.reset();
    assert_eq!(h.counter.live_total(), 0);
    assert_eq!(h.character.state(), PlaybackState::Unloaded);
    assert!(h.character.channels().is_empty());

    let h = harness(Config::default());
    drop(h.character);
    assert_eq!(h.counter.live_total(), 0);
}

/// it should keep working after the host mesh goes away
#[test]
fn dropped_mesh_is_tolerated() {
    let mut h = harness(Config::default());
    h.character
        .play(&clips::load("hello").unwrap(), false)
        .unwrap();
    drop(h.mesh);
    h.character.tick(0.5).unwrap();
    h.character.stop(false);
    assert_eq!(h.character.state(), PlaybackState::Stopped);
}

/// it should drive a voice sink through the reference audio adapter
#[test]
fn voice_audio_follows_playback() {
    let mut h = harness(Config::default());
    let (sink, log) = RecordingSink::new("mouth", Some(3.0));
    h.character.set_audio(Box::new(VoiceAudio::new(Box::new(sink))));
    assert!(h.character.is_auto_play_sound());

    let hello = clips::load("hello").unwrap();
    h.character.play(&hello, false).unwrap();
    h.character.tick(0.25).unwrap();
    assert!(h.character.is_playing_audio());
    approx(h.character.audio().current_progress(), 0.25, 1e-6);

    h.character.pause(true).unwrap();
    assert!(h.character.audio().is_paused());
    h.character.resume().unwrap();
    h.character.stop(false);
    assert_eq!(
        log.borrow().as_slice(),
        [
            "start vo/hello.wav @0",
            "fade",
            "start vo/hello.wav @0.25",
            "stop"
        ]
    );
    assert!(h
        .events
        .events()
        .contains(&CharacterEvent::AudioStartRequested {
            clip: hello.id.clone(),
            started: true,
            sink: Some("mouth".into()),
        }));
}

/// it should skip the voice when auto-play is off
#[test]
fn auto_play_off_keeps_voice_silent() {
    let mut h = harness(Config::default());
    let (sink, log) = RecordingSink::new("mouth", Some(3.0));
    h.character.set_audio(Box::new(VoiceAudio::new(Box::new(sink))));
    h.character.set_auto_play_sound(false);

    h.character
        .play(&clips::load("hello").unwrap(), false)
        .unwrap();
    h.character.tick(0.25).unwrap();
    assert!(!h.character.is_playing_audio());
    assert!(log.borrow().is_empty());
    // nothing to play still counts as a successful start
    assert!(h.events.events().iter().any(|e| matches!(
        e,
        CharacterEvent::AudioStartRequested { started: true, .. }
    )));
}

/// it should report clip bounds from the backend
#[test]
fn clip_bounds_query() {
    let character = Character::default();
    let bounds = character
        .clip_bounds(&clips::load("hello").unwrap())
        .unwrap();
    assert_eq!(bounds, ClipBounds::new(0.0, 2.0));
    assert!(!character.can_play(&clips::load("hello").unwrap()));
}
