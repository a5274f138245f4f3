//! A data-oriented entity-component-system runtime for interactive canvas
//! and simulation applications.
//!
//! The runtime provides dense columnar storage of strongly-typed
//! components indexed by entity id, reactive queries that observe entity
//! lifecycle and per-component mutation, and a scheduler that executes
//! systems on the main thread and on worker threads via shared memory.
//!
//! # Subsystems
//!
//! ```text
//! entity     ─ fixed-capacity concurrent id pool + shared component bitset
//! event      ─ lock-free ring of ADDED / REMOVED / CHANGED transitions
//! component  ─ runtime schemas, SoA field stores, singleton stores
//! query      ─ reactive current / added / removed / changed views
//! system     ─ system descriptors (main-thread fn or worker dispatch)
//! worker     ─ replica threads sharing the runtime's memory regions
//! schedule   ─ phase-ordered, priority-sorted tick execution
//! store      ─ StoreAdapter boundary for persistence / sync
//! world      ─ construction, registries, the Context operation surface
//! ```
//!
//! # Quick start
//!
//! ```rust,ignore
//! use weft_ecs::prelude::*;
//!
//! let mut builder = World::builder(WorldConfig::default());
//! let pos = builder.component(
//!     ComponentDef::new("Pos")
//!         .field(FieldDef::f32("x"))
//!         .field(FieldDef::f32("y")),
//! );
//! let world = builder.build();
//!
//! let mut schedule = Schedule::new();
//! let mut movers = world.query(Descriptor::new().with(&[pos]));
//! schedule.add_system("drift", Phase::Update, 0, move |ctx| {
//!     let store = ctx.store(pos);
//!     for entity in movers.current(ctx) {
//!         let x = store.read(entity).f32("x");
//!         store.write(entity).set_f32("x", x + 1.0);
//!     }
//!     Ok(())
//! });
//!
//! schedule.tick(&world)?;
//! ```

pub mod component;
pub mod entity;
pub mod error;
pub mod event;
pub mod query;
pub mod schedule;
pub mod store;
pub mod system;
pub mod worker;
pub mod world;

/// The common imports for building against the runtime.
pub mod prelude {
    pub use crate::component::{
        ComponentDef, ComponentId, Data, FieldDef, FieldKind, ScalarKind, SingletonDef,
        SingletonId, SyncMode, Value,
    };
    pub use crate::entity::EntityId;
    pub use crate::error::EcsError;
    pub use crate::query::{Descriptor, Query};
    pub use crate::schedule::{Phase, Schedule};
    pub use crate::store::StoreAdapter;
    pub use crate::worker::{WorkerContext, WorkerModule};
    pub use crate::world::{Context, World, WorldConfig};
}
