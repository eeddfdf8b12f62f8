//! Collision resolution over a crowd of capsules standing on the arena.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use glam::Vec3;

use framesync::collision::{resolve_collisions, CollisionScope};
use framesync::{PlayerId, SimulationConfig, World};

/// Players packed on a grid tight enough that neighbours overlap.
fn crowd(count: u32) -> World {
    let mut world = World::new();
    world.spawn_arena();
    let side = (count as f32).sqrt().ceil() as u32;
    for i in 0..count {
        let id = world.allocate_id();
        let position = Vec3::new((i % side) as f32 * 7.0, -0.5, (i / side) as f32 * 7.0);
        world.spawn_player(id, PlayerId(i + 1), position);
    }
    world
}

fn bench_resolution(c: &mut Criterion) {
    let config = SimulationConfig::default();
    let mut group = c.benchmark_group("resolve_collisions");

    for count in [4u32, 16, 64] {
        let world = crowd(count);
        group.bench_with_input(BenchmarkId::new("all", count), &world, |b, world| {
            b.iter(|| {
                let mut world = world.clone();
                black_box(resolve_collisions(&mut world, CollisionScope::All, &config))
            })
        });
    }

    let world = crowd(64);
    let target = world.player_entity(PlayerId(1));
    if let Some(target) = target {
        group.bench_function("only_one_of_64", |b| {
            b.iter(|| {
                let mut world = world.clone();
                black_box(resolve_collisions(&mut world, CollisionScope::Only(target), &config))
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_resolution);
criterion_main!(benches);
