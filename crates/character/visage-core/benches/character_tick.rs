//! Benchmarks for per-frame character playback.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use visage_core::{Character, Config, RawXform, Transform};
use visage_test_fixtures::{ClipBuilder, RigBuilder, TestMesh};

fn bench_character_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("character_tick");

    for tracks in [8usize, 64, 256] {
        let names: Vec<String> = (0..tracks).map(|i| format!("track_{i}")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();

        let mut rig = RigBuilder::new("bench").tracks(&refs);
        let mut mesh = TestMesh::new().with_morphs(&refs);
        for (i, name) in refs.iter().enumerate().take(16) {
            let bone = format!("bone_{i}");
            rig = rig
                .bone(&bone, RawXform::IDENTITY)
                .link(&bone, name, [0.0, 0.1, 0.0]);
            mesh = mesh.with_bone(&bone, Transform::IDENTITY);
        }
        let mesh = mesh.shared();

        let clip = refs
            .iter()
            .fold(ClipBuilder::new("bench", "loop").bounds(0.0, 4.0), |clip, name| {
                clip.curve(name, &[(0.0, 0.0), (2.0, 1.0), (4.0, 0.0)])
            })
            .build();

        let mut character = Character::default();
        character.set_host_mesh(&mesh);
        character
            .load(Arc::new(rig.build()), Config::default())
            .expect("bench rig should load");
        character.play(&clip, true).expect("bench clip should play");

        group.bench_with_input(BenchmarkId::from_parameter(tracks), &tracks, |b, _| {
            b.iter(|| {
                character.tick(black_box(1.0 / 60.0)).expect("tick");
                black_box(character.bone_transforms(true).expect("bones").len());
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_character_tick);
criterion_main!(benches);
