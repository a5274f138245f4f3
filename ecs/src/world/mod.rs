//! The World: the container every other subsystem hangs off.
//!
//! A `World` owns the entity pool, the entity buffer, the event ring, one
//! store per registered component and one per singleton. It is built in
//! two steps - definitions are registered on a [`WorldBuilder`] and frozen
//! by `build()` - after which the schema is immutable, matching the
//! runtime's no-dynamic-schema contract.
//!
//! # Architecture
//!
//! ```text
//! WorldBuilder ──build()──► World
//!   ├── Pool            shared entity id free list
//!   ├── EntityBuffer    shared component bitset + liveness
//!   ├── Ring            shared event log
//!   ├── Vec<Store>      one SoA store per component
//!   ├── Vec<SingletonStore>
//!   └── adapters        StoreAdapter sinks driven at tick boundaries
//! ```
//!
//! Systems never hold the `World` directly; they receive a [`Context`],
//! a thin handle exposing the operation surface (entity lifecycle,
//! component access, singleton access, queries). All shared state is
//! interior-mutable with atomic discipline, so the context is a plain
//! shared reference.
//!
//! The built-in `Frame` singleton (`tick: u32`) is registered first in
//! every world; the scheduler advances it at the start of each tick.

use std::cell::RefCell;
use std::sync::Arc;

use dashmap::DashMap;

use crate::component::{
    ComponentDef, ComponentId, Data, FieldDef, MAX_COMPONENTS, SingletonDef, SingletonId,
    SingletonStore, Store,
};
use crate::entity::{EntityBuffer, EntityId, Pool};
use crate::error::EcsError;
use crate::event::Ring;
use crate::query::{Descriptor, Query};
use crate::store::{StoreAdapter, SyncDriver};
use crate::worker::WorkerContext;

/// The name of the built-in frame-counter singleton.
pub const FRAME_SINGLETON: &str = "Frame";

/// Capacities fixed at world construction.
#[derive(Debug, Clone, Copy)]
pub struct WorldConfig {
    /// Entity pool capacity; ids run `1..=max_entities`.
    pub max_entities: u32,
    /// Event ring capacity; bounds the resync window for lagging queries
    /// and must cover a tick's worth of sync traffic.
    pub event_capacity: u32,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            max_entities: 4096,
            event_capacity: 4096,
        }
    }
}

/// Collects component and singleton definitions before the world is
/// frozen.
pub struct WorldBuilder {
    config: WorldConfig,
    components: Vec<ComponentDef>,
    singletons: Vec<SingletonDef>,
}

impl WorldBuilder {
    fn new(config: WorldConfig) -> Self {
        let mut builder = Self {
            config,
            components: Vec::new(),
            singletons: Vec::new(),
        };
        // Built-in frame counter, always singleton id 0.
        builder.singleton(SingletonDef::new(FRAME_SINGLETON).field(FieldDef::u32("tick")));
        builder
    }

    /// Register a component definition; returns its id. Ids are assigned
    /// in registration order.
    pub fn component(&mut self, def: ComponentDef) -> ComponentId {
        assert!(
            self.components.len() < MAX_COMPONENTS,
            "component limit ({}) exceeded",
            MAX_COMPONENTS
        );
        assert!(
            !self.components.iter().any(|d| d.name() == def.name()),
            "duplicate component '{}'",
            def.name()
        );
        let id = ComponentId::from_raw(self.components.len() as u8);
        self.components.push(def);
        id
    }

    /// Register a singleton definition; returns its id.
    pub fn singleton(&mut self, def: SingletonDef) -> SingletonId {
        assert!(
            self.singletons.len() < MAX_COMPONENTS,
            "singleton limit ({}) exceeded",
            MAX_COMPONENTS
        );
        assert!(
            !self.singletons.iter().any(|d| d.name() == def.name()),
            "duplicate singleton '{}'",
            def.name()
        );
        let id = SingletonId::from_raw(self.singletons.len() as u8);
        self.singletons.push(def);
        id
    }

    /// Freeze the schema and allocate every shared region.
    pub fn build(self) -> World {
        let config = self.config;
        let ring = Arc::new(Ring::new(config.event_capacity));
        let buffer = Arc::new(EntityBuffer::new(
            config.max_entities,
            self.components.len() as u32,
            Arc::clone(&ring),
        ));
        let pool = Arc::new(Pool::new(config.max_entities));

        let component_names = DashMap::new();
        let stores: Vec<Arc<Store>> = self
            .components
            .into_iter()
            .enumerate()
            .map(|(index, def)| {
                let id = ComponentId::from_raw(index as u8);
                component_names.insert(def.name().to_string(), id);
                Arc::new(Store::new(
                    def,
                    id,
                    config.max_entities,
                    Arc::clone(&buffer),
                    Arc::clone(&ring),
                ))
            })
            .collect();

        let singleton_names = DashMap::new();
        let singletons: Vec<Arc<SingletonStore>> = self
            .singletons
            .into_iter()
            .enumerate()
            .map(|(index, def)| {
                let id = SingletonId::from_raw(index as u8);
                singleton_names.insert(def.name().to_string(), id);
                Arc::new(SingletonStore::new(
                    def,
                    id,
                    config.max_entities,
                    Arc::clone(&ring),
                ))
            })
            .collect();

        let sync = SyncDriver::new(stores.len(), config.max_entities);
        World {
            config,
            pool,
            buffer,
            ring,
            stores,
            singletons,
            component_names,
            singleton_names,
            frame_id: SingletonId::from_raw(0),
            adapters: RefCell::new(Vec::new()),
            sync: RefCell::new(sync),
        }
    }
}

/// The assembled runtime: shared regions, stores, and adapter plumbing.
pub struct World {
    config: WorldConfig,
    pool: Arc<Pool>,
    buffer: Arc<EntityBuffer>,
    ring: Arc<Ring>,
    stores: Vec<Arc<Store>>,
    singletons: Vec<Arc<SingletonStore>>,
    component_names: DashMap<String, ComponentId>,
    singleton_names: DashMap<String, SingletonId>,
    frame_id: SingletonId,
    adapters: RefCell<Vec<Box<dyn StoreAdapter>>>,
    sync: RefCell<SyncDriver>,
}

impl World {
    /// Start building a world with the given capacities.
    pub fn builder(config: WorldConfig) -> WorldBuilder {
        WorldBuilder::new(config)
    }

    /// The world's capacities.
    #[inline]
    pub fn config(&self) -> WorldConfig {
        self.config
    }

    /// The entity capacity.
    #[inline]
    pub fn max_entities(&self) -> u32 {
        self.config.max_entities
    }

    /// The number of registered components.
    #[inline]
    pub fn component_count(&self) -> usize {
        self.stores.len()
    }

    /// The operation surface handed to systems.
    #[inline]
    pub fn context(&self) -> Context<'_> {
        Context { world: self }
    }

    /// The current frame counter (the value of the `Frame` singleton).
    pub fn frame(&self) -> u32 {
        self.singletons[self.frame_id.index()].read().u32("tick")
    }

    // ==================== Entity lifecycle ====================

    /// Allocate an entity id and mark it alive.
    pub fn create_entity(&self) -> Result<EntityId, EcsError> {
        let id = self.pool.get()?;
        self.buffer.create(id);
        Ok(id)
    }

    /// Allocate `count` entities in one pass. On exhaustion the partial
    /// batch is rolled back and the error returned.
    pub fn create_entities(&self, count: usize) -> Result<Vec<EntityId>, EcsError> {
        let mut ids = Vec::with_capacity(count);
        for _ in 0..count {
            match self.create_entity() {
                Ok(id) => ids.push(id),
                Err(error) => {
                    for id in ids {
                        self.remove_entity(id);
                    }
                    return Err(error);
                }
            }
        }
        Ok(ids)
    }

    /// Delete an entity: clears every component bit, emits one REMOVED
    /// event, returns the id to the pool for reuse.
    pub fn remove_entity(&self, id: EntityId) {
        self.buffer.delete(id);
        self.pool.free(id);
    }

    /// Whether `id` is currently alive.
    #[inline]
    pub fn is_alive(&self, id: EntityId) -> bool {
        self.buffer.is_alive(id)
    }

    // ==================== Components ====================

    /// Resolve a component name to its id.
    pub fn component(&self, name: &str) -> Result<ComponentId, EcsError> {
        self.component_names
            .get(name)
            .map(|entry| *entry)
            .ok_or_else(|| EcsError::ComponentNotRegistered {
                name: name.to_string(),
            })
    }

    /// The backing store for a component id.
    #[inline]
    pub fn store(&self, id: ComponentId) -> &Arc<Store> {
        &self.stores[id.index()]
    }

    /// The backing store for a component name.
    pub fn store_named(&self, name: &str) -> Result<&Arc<Store>, EcsError> {
        Ok(self.store(self.component(name)?))
    }

    /// Attach a component, populating fields from `data` or defaults.
    pub fn add_component(&self, entity: EntityId, component: ComponentId, data: Option<&Data>) {
        self.stores[component.index()].add(entity, data);
    }

    /// Detach a component.
    pub fn remove_component(&self, entity: EntityId, component: ComponentId) {
        self.stores[component.index()].remove(entity);
    }

    /// Whether `entity` currently has `component`.
    #[inline]
    pub fn has_component(&self, entity: EntityId, component: ComponentId) -> bool {
        self.buffer.has(entity, component.raw())
    }

    // ==================== Singletons ====================

    /// Resolve a singleton name to its id.
    pub fn singleton_id(&self, name: &str) -> Result<SingletonId, EcsError> {
        self.singleton_names
            .get(name)
            .map(|entry| *entry)
            .ok_or_else(|| EcsError::ComponentNotRegistered {
                name: name.to_string(),
            })
    }

    /// The store for a singleton id.
    #[inline]
    pub fn singleton(&self, id: SingletonId) -> &Arc<SingletonStore> {
        &self.singletons[id.index()]
    }

    /// The store for a singleton name.
    pub fn singleton_named(&self, name: &str) -> Result<&Arc<SingletonStore>, EcsError> {
        Ok(self.singleton(self.singleton_id(name)?))
    }

    // ==================== Queries ====================

    /// Create a query from a descriptor. The query seeds its membership
    /// from the entity buffer, so a pre-existing world is reported as
    /// `added` on its first observation.
    pub fn query(&self, descriptor: Descriptor) -> Query {
        Query::create(descriptor, &self.ring, &self.buffer)
    }

    // ==================== Adapters / workers ====================

    /// Attach a store adapter. It is initialised with the full schema and
    /// driven at every tick boundary from now on.
    pub fn add_adapter(&self, mut adapter: Box<dyn StoreAdapter>) {
        let components: Vec<ComponentDef> =
            self.stores.iter().map(|s| s.def().clone()).collect();
        let singletons: Vec<SingletonDef> =
            self.singletons.iter().map(|s| s.def().clone()).collect();
        adapter.initialize(&components, &singletons);
        self.adapters.borrow_mut().push(adapter);
    }

    /// The shared-memory bundle handed to each worker replica.
    pub fn worker_context(&self) -> WorkerContext {
        WorkerContext::new(
            Arc::clone(&self.pool),
            Arc::clone(&self.buffer),
            Arc::clone(&self.ring),
            self.stores.clone(),
            self.config.max_entities,
        )
    }

    // ==================== Tick boundaries ====================

    /// Start a tick: advance the frame counter, stamp the ring, flush
    /// adapter changes in.
    pub(crate) fn begin_tick(&self) {
        let next = self.frame().wrapping_add(1);
        self.ring.set_tick(next);
        self.singletons[self.frame_id.index()].write().set("tick", next);

        let mut adapters = self.adapters.borrow_mut();
        if !adapters.is_empty() {
            let ctx = self.context();
            for adapter in adapters.iter_mut() {
                adapter.flush_changes(&ctx);
            }
        }
    }

    /// End a tick: translate ring events into adapter notifications and
    /// commit. Skipped when a system failed the tick.
    pub(crate) fn end_tick(&self) {
        let mut adapters = self.adapters.borrow_mut();
        self.sync.borrow_mut().drive(
            &self.ring,
            &self.buffer,
            &self.stores,
            &self.singletons,
            self.config.max_entities,
            &mut adapters,
        );
    }

    #[inline]
    pub(crate) fn ring(&self) -> &Ring {
        &self.ring
    }

    #[inline]
    pub(crate) fn buffer(&self) -> &EntityBuffer {
        &self.buffer
    }
}

/// The operation surface a system sees: a thin handle over the world.
#[derive(Clone, Copy)]
pub struct Context<'w> {
    world: &'w World,
}

impl<'w> Context<'w> {
    /// Allocate an entity id and mark it alive.
    pub fn create_entity(&self) -> Result<EntityId, EcsError> {
        self.world.create_entity()
    }

    /// Batch entity allocation; rolls back on exhaustion.
    pub fn create_entities(&self, count: usize) -> Result<Vec<EntityId>, EcsError> {
        self.world.create_entities(count)
    }

    /// Delete an entity and recycle its id.
    pub fn remove_entity(&self, id: EntityId) {
        self.world.remove_entity(id);
    }

    /// Whether `id` is currently alive.
    pub fn is_alive(&self, id: EntityId) -> bool {
        self.world.is_alive(id)
    }

    /// Resolve a component name to its id.
    pub fn component(&self, name: &str) -> Result<ComponentId, EcsError> {
        self.world.component(name)
    }

    /// The backing store for a component id.
    pub fn store(&self, id: ComponentId) -> &'w Arc<Store> {
        self.world.store(id)
    }

    /// The backing store for a component name.
    pub fn store_named(&self, name: &str) -> Result<&'w Arc<Store>, EcsError> {
        self.world.store_named(name)
    }

    /// Attach a component.
    pub fn add_component(&self, entity: EntityId, component: ComponentId, data: Option<&Data>) {
        self.world.add_component(entity, component, data);
    }

    /// Detach a component.
    pub fn remove_component(&self, entity: EntityId, component: ComponentId) {
        self.world.remove_component(entity, component);
    }

    /// Whether `entity` has `component`.
    pub fn has_component(&self, entity: EntityId, component: ComponentId) -> bool {
        self.world.has_component(entity, component)
    }

    /// Resolve a singleton name to its id.
    pub fn singleton_id(&self, name: &str) -> Result<SingletonId, EcsError> {
        self.world.singleton_id(name)
    }

    /// The store for a singleton id.
    pub fn singleton(&self, id: SingletonId) -> &'w Arc<SingletonStore> {
        self.world.singleton(id)
    }

    /// The store for a singleton name.
    pub fn singleton_named(&self, name: &str) -> Result<&'w Arc<SingletonStore>, EcsError> {
        self.world.singleton_named(name)
    }

    /// Create a query.
    pub fn query(&self, descriptor: Descriptor) -> Query {
        self.world.query(descriptor)
    }

    /// The current frame counter.
    pub fn frame(&self) -> u32 {
        self.world.frame()
    }

    #[inline]
    pub(crate) fn ring_ref(&self) -> &'w Ring {
        self.world.ring()
    }

    #[inline]
    pub(crate) fn buffer_ref(&self) -> &'w EntityBuffer {
        self.world.buffer()
    }
}
