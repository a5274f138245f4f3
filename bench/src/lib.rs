//! Shared scaffolding for the runtime benchmarks.
//!
//! Builds representative worlds - a canvas-ish schema with positions,
//! sizes and a synced shape component - and populates them with
//! deterministic pseudo-random data so runs are comparable.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use weft_ecs::component::{ComponentDef, ComponentId, Data, FieldDef, ScalarKind};
use weft_ecs::world::{World, WorldConfig};

/// A prepared benchmark world and its component ids.
pub struct BenchWorld {
    pub world: World,
    pub pos: ComponentId,
    pub size: ComponentId,
    pub velocity: ComponentId,
}

/// Build a world with a canvas-ish schema and `entities` populated
/// entities, plus headroom for churn. Roughly half carry `Velocity`.
pub fn populated_world(entities: u32, seed: u64) -> BenchWorld {
    let mut builder = World::builder(WorldConfig {
        max_entities: entities + 1024,
        event_capacity: (entities * 8).max(1024),
    });
    let pos = builder.component(
        ComponentDef::new("Pos")
            .field(FieldDef::f32("x"))
            .field(FieldDef::f32("y")),
    );
    let size = builder.component(
        ComponentDef::new("Size").field(FieldDef::tuple("extent", ScalarKind::F32, 2)),
    );
    let velocity = builder.component(
        ComponentDef::new("Velocity")
            .field(FieldDef::f32("dx"))
            .field(FieldDef::f32("dy")),
    );
    let world = builder.build();

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    for _ in 0..entities {
        let entity = world.create_entity().expect("bench world sized for its entities");
        world.add_component(
            entity,
            pos,
            Some(
                &Data::new()
                    .set("x", rng.gen_range(-1000.0f32..1000.0))
                    .set("y", rng.gen_range(-1000.0f32..1000.0)),
            ),
        );
        world.add_component(
            entity,
            size,
            Some(&Data::new().set(
                "extent",
                vec![rng.gen_range(1.0f64..64.0), rng.gen_range(1.0f64..64.0)],
            )),
        );
        if rng.gen_bool(0.5) {
            world.add_component(
                entity,
                velocity,
                Some(
                    &Data::new()
                        .set("dx", rng.gen_range(-5.0f32..5.0))
                        .set("dy", rng.gen_range(-5.0f32..5.0)),
                ),
            );
        }
    }

    BenchWorld {
        world,
        pos,
        size,
        velocity,
    }
}
