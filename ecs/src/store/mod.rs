//! External store adapters: the persistence / sync boundary.
//!
//! The runtime persists nothing itself. Instead, a caller-supplied
//! [`StoreAdapter`] is notified of lifecycle transitions for components
//! and singletons that opted into syncing (via
//! [`SyncMode`](crate::component::SyncMode) on their definitions), and is
//! given two hooks at tick boundaries:
//!
//! - `flush_changes(ctx)` at the start of a tick - the adapter may call
//!   `create_entity` / `add_component` / `remove_entity` through the
//!   context to reflect external changes (CRDT updates, undo) into the
//!   world.
//! - `commit()` at the end of a tick - the adapter may coalesce and
//!   persist. A tick that fails never reaches `commit`, so a correct
//!   adapter never persists partial tick results.
//!
//! This is deliberately a narrow push interface: the runtime drives the
//! adapter from its own ring consumer, and does not expose a general
//! observable.
//!
//! # Stable identity
//!
//! Notifications carry a `stable_id` - the UUID read from the component's
//! designated `id` field (a `Str` field named `id`, by convention). It is
//! the identity used for cross-process synchronisation and is decoupled
//! from the runtime's local entity id; components without an `id` field
//! fall back to the entity id rendered as a string. Because component
//! removal clears only the presence bit and leaves the backing row
//! intact, the stable id is still readable when the removal notification
//! fires.

use std::sync::Arc;

use fixedbitset::FixedBitSet;

use crate::component::{ComponentDef, Data, SingletonDef, SingletonStore, Store, SyncMode};
use crate::entity::{EntityBuffer, EntityId};
use crate::event::{Kind, Ring};
use crate::world::Context;

/// A caller-supplied sink for lifecycle transitions of synced components.
pub trait StoreAdapter {
    /// One-time registration of the world's schema, invoked when the
    /// adapter is attached.
    fn initialize(&mut self, components: &[ComponentDef], singletons: &[SingletonDef]) {
        let _ = (components, singletons);
    }

    /// A synced component appeared on an entity this tick.
    fn on_component_added(&mut self, def: &ComponentDef, stable_id: &str, entity: EntityId, data: &Data);

    /// A synced component's fields changed this tick. At most one
    /// notification per component instance per tick; `data` is the
    /// end-of-tick snapshot.
    fn on_component_updated(&mut self, def: &ComponentDef, stable_id: &str, data: &Data);

    /// A synced component left an entity (detached, or its entity was
    /// deleted) this tick.
    fn on_component_removed(&mut self, def: &ComponentDef, stable_id: &str);

    /// A synced singleton's fields changed this tick. Coalesced to one
    /// notification per singleton per tick.
    fn on_singleton_updated(&mut self, def: &SingletonDef, data: &Data);

    /// End-of-tick commit point; may coalesce.
    fn commit(&mut self) {}

    /// Start-of-tick inbound flush; the adapter may mutate the world
    /// through `ctx`.
    fn flush_changes(&mut self, ctx: &Context<'_>) {
        let _ = ctx;
    }
}

/// The runtime's ring consumer that feeds adapters at tick boundaries.
///
/// Tracks, per synced component, which entity instances the adapters have
/// been told about, so bit-flip events translate into added / updated /
/// removed notifications exactly once each per tick.
pub(crate) struct SyncDriver {
    cursor: u32,
    known: Vec<FixedBitSet>,
}

impl SyncDriver {
    pub(crate) fn new(component_count: usize, max_entities: u32) -> Self {
        Self {
            cursor: 0,
            known: (0..component_count)
                .map(|_| FixedBitSet::with_capacity(max_entities as usize + 1))
                .collect(),
        }
    }

    /// Translate ring events since the last drive into adapter
    /// notifications, then commit every adapter.
    pub(crate) fn drive(
        &mut self,
        ring: &Ring,
        buffer: &EntityBuffer,
        stores: &[Arc<Store>],
        singletons: &[Arc<SingletonStore>],
        max_entities: u32,
        adapters: &mut [Box<dyn StoreAdapter>],
    ) {
        let to = ring.cursor();
        if adapters.is_empty() {
            self.cursor = to;
            return;
        }

        let mut updated: Vec<FixedBitSet> = stores
            .iter()
            .map(|_| FixedBitSet::with_capacity(max_entities as usize + 1))
            .collect();
        let mut singleton_touched = FixedBitSet::with_capacity(singletons.len().max(1));

        for event in ring.range(self.cursor, to) {
            match event.kind {
                Kind::Changed if event.entity.raw() > max_entities => {
                    let sid = (event.entity.raw() - max_entities - 1) as usize;
                    if sid < singletons.len() && singletons[sid].def().sync_mode() != SyncMode::None
                    {
                        singleton_touched.insert(sid);
                    }
                }
                Kind::Changed => {
                    let component = event.component as usize;
                    if component >= stores.len() {
                        continue;
                    }
                    let store = &stores[component];
                    if store.def().sync_mode() == SyncMode::None {
                        continue;
                    }
                    let entity = event.entity;
                    let index = entity.index();
                    if buffer.has(entity, event.component) {
                        if !self.known[component].contains(index) {
                            self.known[component].insert(index);
                            updated[component].insert(index);
                            let stable = stable_id(store, entity);
                            let data = store.snapshot(entity);
                            for adapter in adapters.iter_mut() {
                                adapter.on_component_added(store.def(), &stable, entity, &data);
                            }
                        } else if !updated[component].contains(index) {
                            updated[component].insert(index);
                            let stable = stable_id(store, entity);
                            let data = store.snapshot(entity);
                            for adapter in adapters.iter_mut() {
                                adapter.on_component_updated(store.def(), &stable, &data);
                            }
                        }
                    } else if self.known[component].contains(index) {
                        self.known[component].set(index, false);
                        let stable = stable_id(store, entity);
                        for adapter in adapters.iter_mut() {
                            adapter.on_component_removed(store.def(), &stable);
                        }
                    }
                }
                Kind::Removed => {
                    let entity = event.entity;
                    for (component, store) in stores.iter().enumerate() {
                        if store.def().sync_mode() == SyncMode::None {
                            continue;
                        }
                        if self.known[component].contains(entity.index()) {
                            self.known[component].set(entity.index(), false);
                            let stable = stable_id(store, entity);
                            for adapter in adapters.iter_mut() {
                                adapter.on_component_removed(store.def(), &stable);
                            }
                        }
                    }
                }
                Kind::Added => {}
            }
        }

        for sid in singleton_touched.ones() {
            let store = &singletons[sid];
            let data = store.snapshot();
            for adapter in adapters.iter_mut() {
                adapter.on_singleton_updated(store.def(), &data);
            }
        }

        self.cursor = to;

        for adapter in adapters.iter_mut() {
            adapter.commit();
        }
    }
}

/// The cross-process identity for a component instance: its `id` field if
/// the schema declares one, the entity id otherwise.
fn stable_id(store: &Store, entity: EntityId) -> String {
    match store.def().stable_id_field() {
        Some(_) => store.read(entity).string("id"),
        None => entity.raw().to_string(),
    }
}
