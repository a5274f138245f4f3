//! Reactive queries over the event ring and entity buffer.
//!
//! A query is built from a closed set of constraints - `with` (must have
//! all), `without` (must have none), `tracking` (observe CHANGED on) -
//! compiled into three component-id bitmasks by [`Descriptor`]. From those
//! masks the engine materialises four result views per tick:
//!
//! | View | Definition |
//! |------|------------|
//! | `current` | alive entities whose buffer bits satisfy include ∧ ¬exclude |
//! | `added` | entities newly satisfying the predicate since the last observation |
//! | `removed` | entities that satisfied it on the prior observation but no longer do |
//! | `changed` | entities whose tracked components mutated, still satisfying the predicate |
//!
//! # Observation model
//!
//! Each [`Query`] owns a monotonic `last_index` into the ring and the
//! membership set from its previous observation. The first view access in
//! a tick consumes ring events since `last_index`, filters candidates
//! through the entity buffer (the authoritative liveness and membership
//! signal), and caches the three reactive sets for the rest of the tick -
//! repeated calls within one tick are idempotent. `current` is never
//! cached: it re-scans the buffer on every call.
//!
//! A query created mid-tick seeds its membership from the entity buffer,
//! so the entire pre-existing world is reported as `added` on first
//! observation. A query whose `last_index` has fallen more than the ring
//! capacity behind observes a resync window: it sees only transitions
//! carried by the most recent `capacity` events and continues from there.
//!
//! # Sharing
//!
//! Query state is single-observer. Systems that consume the same shape of
//! query each hold their own [`Query`] value; handing one query to two
//! systems skews both of their deltas.

use fixedbitset::FixedBitSet;

use crate::component::{ComponentId, MAX_COMPONENTS};
use crate::entity::{EntityBuffer, EntityId};
use crate::event::{Kind, Ring};
use crate::world::Context;

/// A compiled query shape: include / exclude / tracking component masks.
///
/// Built once, fluently, before the query is created; it is a plain value,
/// not a captured closure.
#[derive(Debug, Clone)]
pub struct Descriptor {
    include: FixedBitSet,
    exclude: FixedBitSet,
    tracking: FixedBitSet,
}

impl Default for Descriptor {
    fn default() -> Self {
        Self::new()
    }
}

impl Descriptor {
    /// An empty descriptor: matches every alive entity, tracks nothing.
    pub fn new() -> Self {
        Self {
            include: FixedBitSet::with_capacity(MAX_COMPONENTS),
            exclude: FixedBitSet::with_capacity(MAX_COMPONENTS),
            tracking: FixedBitSet::with_capacity(MAX_COMPONENTS),
        }
    }

    /// Require every listed component. Accumulates across calls.
    pub fn with(mut self, components: &[ComponentId]) -> Self {
        for component in components {
            self.include.insert(component.index());
        }
        self
    }

    /// Forbid every listed component. Accumulates across calls.
    pub fn without(mut self, components: &[ComponentId]) -> Self {
        for component in components {
            self.exclude.insert(component.index());
        }
        self
    }

    /// Track CHANGED events on every listed component. Accumulates across
    /// calls; combine freely with `with` / `without`.
    pub fn tracking(mut self, components: &[ComponentId]) -> Self {
        for component in components {
            self.tracking.insert(component.index());
        }
        self
    }

    /// The include mask.
    #[inline]
    pub fn include(&self) -> &FixedBitSet {
        &self.include
    }

    /// The exclude mask.
    #[inline]
    pub fn exclude(&self) -> &FixedBitSet {
        &self.exclude
    }

    /// The tracking mask.
    #[inline]
    pub fn tracking_mask(&self) -> &FixedBitSet {
        &self.tracking
    }

    /// The union of include and exclude: the components whose CHANGED
    /// events can move an entity across the membership boundary.
    fn structural_mask(&self) -> FixedBitSet {
        let mut mask = self.include.clone();
        mask.union_with(&self.exclude);
        mask
    }
}

/// Reactive query state: a descriptor plus one observer's position in the
/// event stream.
pub struct Query {
    descriptor: Descriptor,
    last_index: u32,
    matched: FixedBitSet,
    fresh: bool,
    observed_tick: Option<u32>,
    added: Vec<EntityId>,
    removed: Vec<EntityId>,
    changed: Vec<EntityId>,
}

impl Query {
    /// Create a query, seeding its membership from the entity buffer so
    /// the pre-existing world is reported as `added` on first observation.
    pub(crate) fn create(descriptor: Descriptor, ring: &Ring, buffer: &EntityBuffer) -> Self {
        let mut matched = FixedBitSet::with_capacity(buffer.max_entities() as usize + 1);
        buffer.for_each_alive(|entity| {
            if buffer.satisfies(entity, &descriptor.include, &descriptor.exclude) {
                matched.insert(entity.index());
            }
        });
        Self {
            descriptor,
            last_index: ring.cursor(),
            matched,
            fresh: true,
            observed_tick: None,
            added: Vec::new(),
            removed: Vec::new(),
            changed: Vec::new(),
        }
    }

    /// The query's descriptor.
    #[inline]
    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    /// The query's position in the ring: advanced to the ring's write
    /// index by each observation.
    #[inline]
    pub fn last_index(&self) -> u32 {
        self.last_index
    }

    /// All alive entities currently satisfying the predicate, ascending.
    ///
    /// Sourced from the entity buffer alone - never the ring - and
    /// re-materialised on every call; cache it if hot.
    pub(crate) fn current_with(&self, buffer: &EntityBuffer) -> Vec<EntityId> {
        let mut out = Vec::new();
        buffer.for_each_alive(|entity| {
            if buffer.satisfies(entity, &self.descriptor.include, &self.descriptor.exclude) {
                out.push(entity);
            }
        });
        out
    }

    /// Entities newly satisfying the predicate since the last observation.
    pub(crate) fn added_with(&mut self, ring: &Ring, buffer: &EntityBuffer, tick: u32) -> Vec<EntityId> {
        self.observe(ring, buffer, tick);
        self.added.clone()
    }

    /// Entities that stopped satisfying the predicate since the last
    /// observation.
    pub(crate) fn removed_with(&mut self, ring: &Ring, buffer: &EntityBuffer, tick: u32) -> Vec<EntityId> {
        self.observe(ring, buffer, tick);
        self.removed.clone()
    }

    /// Entities whose tracked components mutated since the last
    /// observation and that still satisfy the predicate.
    pub(crate) fn changed_with(&mut self, ring: &Ring, buffer: &EntityBuffer, tick: u32) -> Vec<EntityId> {
        self.observe(ring, buffer, tick);
        self.changed.clone()
    }

    /// Consume ring events since `last_index` and rebuild the reactive
    /// sets. Runs once per tick; later calls in the same tick are served
    /// from cache.
    fn observe(&mut self, ring: &Ring, buffer: &EntityBuffer, tick: u32) {
        if self.observed_tick == Some(tick) {
            return;
        }

        let to = ring.cursor();
        let structural = self.descriptor.structural_mask();
        let created = ring.collect_in(self.last_index, to, Kind::Added, None);
        let destroyed = ring.collect_in(self.last_index, to, Kind::Removed, None);
        let shifted = ring.collect_in(self.last_index, to, Kind::Changed, Some(&structural));
        let tracked = if self.descriptor.tracking.count_ones(..) == 0 {
            Vec::new()
        } else {
            ring.collect_in(self.last_index, to, Kind::Changed, Some(&self.descriptor.tracking))
        };

        self.added.clear();
        self.removed.clear();
        self.changed.clear();

        // A brand-new query reports its creation-time membership as added.
        // Entities that stopped matching between creation and now are
        // pruned first: the query never showed them, so it reports
        // neither an add nor a removal.
        if self.fresh {
            let stale: Vec<usize> = self
                .matched
                .ones()
                .filter(|&index| {
                    !buffer.satisfies(
                        EntityId::from_raw(index as u32),
                        &self.descriptor.include,
                        &self.descriptor.exclude,
                    )
                })
                .collect();
            for index in stale {
                self.matched.set(index, false);
            }
            for index in self.matched.ones() {
                self.added.push(EntityId::from_raw(index as u32));
            }
        }

        // Entities that may have gained membership: created, or a
        // structural component changed under them.
        for entity in created.iter().chain(shifted.iter()) {
            let index = entity.index();
            if index >= self.matched.len() {
                continue; // pseudo-entity (singleton) events never match
            }
            if buffer.satisfies(*entity, &self.descriptor.include, &self.descriptor.exclude) {
                if !self.matched.contains(index) {
                    self.matched.insert(index);
                    self.added.push(*entity);
                }
            }
        }

        // Entities that may have lost membership: destroyed, or a
        // structural component changed under them.
        for entity in destroyed.iter().chain(shifted.iter()) {
            let index = entity.index();
            if index >= self.matched.len() {
                continue;
            }
            if !buffer.satisfies(*entity, &self.descriptor.include, &self.descriptor.exclude)
                && self.matched.contains(index)
            {
                self.matched.set(index, false);
                self.removed.push(*entity);
            }
        }

        // Tracked mutations, filtered by current membership.
        let mut in_changed = FixedBitSet::with_capacity(self.matched.len());
        for entity in &tracked {
            let index = entity.index();
            if index < self.matched.len() && self.matched.contains(index) {
                in_changed.insert(index);
                self.changed.push(*entity);
            }
        }
        // On first observation every tracked member counts as changed,
        // including the pre-existing world reported in `added`.
        if self.fresh && self.descriptor.tracking.count_ones(..) > 0 {
            for entity in &self.added {
                if !in_changed.contains(entity.index()) {
                    self.changed.push(*entity);
                }
            }
        }

        self.added.sort_unstable();
        self.removed.sort_unstable();
        self.changed.sort_unstable();

        self.fresh = false;
        self.last_index = to;
        self.observed_tick = Some(tick);
    }
}

/// The context-facing view surface (what systems call).
impl Query {
    /// All alive entities currently satisfying the predicate, ascending.
    /// Re-materialised on every call from the entity buffer alone.
    pub fn current(&self, ctx: &Context<'_>) -> Vec<EntityId> {
        self.current_with(ctx.buffer_ref())
    }

    /// Entities newly satisfying the predicate since the last observation.
    /// Idempotent within a tick.
    pub fn added(&mut self, ctx: &Context<'_>) -> Vec<EntityId> {
        self.added_with(ctx.ring_ref(), ctx.buffer_ref(), ctx.frame())
    }

    /// Entities that stopped satisfying the predicate since the last
    /// observation. Idempotent within a tick.
    pub fn removed(&mut self, ctx: &Context<'_>) -> Vec<EntityId> {
        self.removed_with(ctx.ring_ref(), ctx.buffer_ref(), ctx.frame())
    }

    /// Entities whose tracked components mutated since the last
    /// observation, still satisfying the predicate. Idempotent within a
    /// tick.
    pub fn changed(&mut self, ctx: &Context<'_>) -> Vec<EntityId> {
        self.changed_with(ctx.ring_ref(), ctx.buffer_ref(), ctx.frame())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    // A miniature world: three components (0 = Pos, 1 = Vel, 2 = Hidden)
    // over a small ring and buffer. Component attach/detach is emulated the
    // way the store does it: flip the bit, push CHANGED.
    struct Rig {
        ring: Arc<Ring>,
        buffer: EntityBuffer,
        tick: u32,
    }

    impl Rig {
        fn new(ring_capacity: u32) -> Self {
            let ring = Arc::new(Ring::new(ring_capacity));
            let buffer = EntityBuffer::new(32, 3, Arc::clone(&ring));
            Self { ring, buffer, tick: 1 }
        }

        fn spawn_with(&self, raw: u32, components: &[u8]) -> EntityId {
            let id = EntityId::from_raw(raw);
            self.buffer.create(id);
            for &component in components {
                self.buffer.set(id, component, true);
                self.ring.push(Kind::Changed, id, component);
            }
            id
        }

        fn detach(&self, id: EntityId, component: u8) {
            self.buffer.set(id, component, false);
            self.ring.push(Kind::Changed, id, component);
        }

        fn destroy(&self, id: EntityId) {
            self.buffer.delete(id);
        }

        fn touch(&self, id: EntityId, component: u8) {
            self.ring.push(Kind::Changed, id, component);
        }

        fn next_tick(&mut self) {
            self.tick += 1;
        }
    }

    fn with_pos() -> Descriptor {
        Descriptor::new().with(&[ComponentId::from_raw(0)])
    }

    fn raws(ids: &[EntityId]) -> Vec<u32> {
        ids.iter().map(|e| e.raw()).collect()
    }

    // ==================== current ====================

    #[test]
    fn current_scans_the_buffer() {
        let rig = Rig::new(64);
        rig.spawn_with(1, &[0]);
        rig.spawn_with(2, &[1]);
        rig.spawn_with(3, &[0, 1]);

        let query = Query::create(with_pos(), &rig.ring, &rig.buffer);

        assert_eq!(raws(&query.current_with(&rig.buffer)), vec![1, 3]);
    }

    #[test]
    fn current_is_idempotent_within_a_tick() {
        let rig = Rig::new(64);
        rig.spawn_with(1, &[0]);
        let query = Query::create(with_pos(), &rig.ring, &rig.buffer);

        assert_eq!(query.current_with(&rig.buffer), query.current_with(&rig.buffer));
    }

    #[test]
    fn without_excludes_entities() {
        let rig = Rig::new(64);
        rig.spawn_with(1, &[0]);
        rig.spawn_with(2, &[0, 2]);

        let descriptor = Descriptor::new()
            .with(&[ComponentId::from_raw(0)])
            .without(&[ComponentId::from_raw(2)]);
        let query = Query::create(descriptor, &rig.ring, &rig.buffer);

        assert_eq!(raws(&query.current_with(&rig.buffer)), vec![1]);
    }

    // ==================== added / removed ====================

    #[test]
    fn added_reports_new_members_once() {
        let mut rig = Rig::new(64);
        let mut query = Query::create(with_pos(), &rig.ring, &rig.buffer);

        // Tick 1: three entities gain Pos.
        rig.spawn_with(1, &[0]);
        rig.spawn_with(2, &[0]);
        rig.spawn_with(3, &[0]);
        let added = query.added_with(&rig.ring, &rig.buffer, rig.tick);
        assert_eq!(raws(&added), vec![1, 2, 3]);

        // Tick 2: a stable world adds nothing.
        rig.next_tick();
        let added = query.added_with(&rig.ring, &rig.buffer, rig.tick);
        assert!(added.is_empty());
        assert_eq!(raws(&query.current_with(&rig.buffer)), vec![1, 2, 3]);
    }

    #[test]
    fn removed_reports_destroyed_members() {
        let mut rig = Rig::new(64);
        let mut query = Query::create(with_pos(), &rig.ring, &rig.buffer);
        let e1 = rig.spawn_with(1, &[0]);
        rig.spawn_with(2, &[0]);
        query.added_with(&rig.ring, &rig.buffer, rig.tick);

        rig.next_tick();
        rig.destroy(e1);

        let removed = query.removed_with(&rig.ring, &rig.buffer, rig.tick);
        assert_eq!(raws(&removed), vec![1]);
        assert_eq!(raws(&query.current_with(&rig.buffer)), vec![2]);
    }

    #[test]
    fn detaching_a_required_component_removes_membership() {
        let mut rig = Rig::new(64);
        let mut query = Query::create(with_pos(), &rig.ring, &rig.buffer);
        let e1 = rig.spawn_with(1, &[0]);
        query.added_with(&rig.ring, &rig.buffer, rig.tick);

        rig.next_tick();
        rig.detach(e1, 0);

        assert_eq!(raws(&query.removed_with(&rig.ring, &rig.buffer, rig.tick)), vec![1]);
    }

    #[test]
    fn pre_existing_world_is_added_on_first_observation() {
        let mut rig = Rig::new(64);
        rig.spawn_with(1, &[0]);
        rig.spawn_with(2, &[0]);
        rig.next_tick();

        // Query created after the world was populated.
        let mut query = Query::create(with_pos(), &rig.ring, &rig.buffer);
        let added = query.added_with(&rig.ring, &rig.buffer, rig.tick);

        assert_eq!(raws(&added), vec![1, 2]);
    }

    #[test]
    fn views_are_idempotent_within_a_tick() {
        let mut rig = Rig::new(64);
        let mut query = Query::create(with_pos(), &rig.ring, &rig.buffer);
        rig.spawn_with(1, &[0]);

        let first = query.added_with(&rig.ring, &rig.buffer, rig.tick);
        // More events land mid-tick; the cached observation stands.
        rig.spawn_with(2, &[0]);
        let second = query.added_with(&rig.ring, &rig.buffer, rig.tick);
        assert_eq!(first, second);

        // The next tick picks the stragglers up.
        rig.next_tick();
        let third = query.added_with(&rig.ring, &rig.buffer, rig.tick);
        assert_eq!(raws(&third), vec![2]);
    }

    // ==================== changed ====================

    #[test]
    fn tracking_reports_mutations_of_members() {
        let mut rig = Rig::new(64);
        let descriptor = Descriptor::new()
            .with(&[ComponentId::from_raw(0)])
            .tracking(&[ComponentId::from_raw(0)]);
        let mut query = Query::create(descriptor, &rig.ring, &rig.buffer);

        // Tick 1: two entities gain Pos - both added and changed.
        let e1 = rig.spawn_with(1, &[0]);
        rig.spawn_with(2, &[0]);
        assert_eq!(raws(&query.added_with(&rig.ring, &rig.buffer, rig.tick)), vec![1, 2]);
        let changed = query.changed_with(&rig.ring, &rig.buffer, rig.tick);
        assert!(raws(&changed).contains(&1) && raws(&changed).contains(&2));

        // Tick 2: a field write on e1 only.
        rig.next_tick();
        rig.touch(e1, 0);
        assert_eq!(raws(&query.changed_with(&rig.ring, &rig.buffer, rig.tick)), vec![1]);
        assert!(query.added_with(&rig.ring, &rig.buffer, rig.tick).is_empty());

        // Same tick, second call: idempotent.
        assert_eq!(raws(&query.changed_with(&rig.ring, &rig.buffer, rig.tick)), vec![1]);
    }

    #[test]
    fn untracked_components_do_not_drive_changed() {
        let mut rig = Rig::new(64);
        let descriptor = Descriptor::new()
            .with(&[ComponentId::from_raw(0)])
            .tracking(&[ComponentId::from_raw(0)]);
        let mut query = Query::create(descriptor, &rig.ring, &rig.buffer);
        let e1 = rig.spawn_with(1, &[0, 1]);
        query.changed_with(&rig.ring, &rig.buffer, rig.tick);

        rig.next_tick();
        rig.touch(e1, 1); // component 1 is not tracked

        assert!(query.changed_with(&rig.ring, &rig.buffer, rig.tick).is_empty());
    }

    #[test]
    fn changed_is_empty_without_tracking() {
        let mut rig = Rig::new(64);
        let mut query = Query::create(with_pos(), &rig.ring, &rig.buffer);
        let e1 = rig.spawn_with(1, &[0]);
        query.added_with(&rig.ring, &rig.buffer, rig.tick);

        rig.next_tick();
        rig.touch(e1, 0);

        assert!(query.changed_with(&rig.ring, &rig.buffer, rig.tick).is_empty());
    }

    // ==================== empty / overflow ====================

    #[test]
    fn quiet_world_returns_empty_views() {
        let mut rig = Rig::new(64);
        let mut query = Query::create(with_pos(), &rig.ring, &rig.buffer);

        assert!(query.added_with(&rig.ring, &rig.buffer, rig.tick).is_empty());
        assert!(query.removed_with(&rig.ring, &rig.buffer, rig.tick).is_empty());
        assert!(query.changed_with(&rig.ring, &rig.buffer, rig.tick).is_empty());
        assert!(query.current_with(&rig.buffer).is_empty());
        rig.next_tick();
        assert!(query.added_with(&rig.ring, &rig.buffer, rig.tick).is_empty());
    }

    #[test]
    fn overflow_resyncs_added_to_the_window_but_current_sees_all() {
        // Ring capacity 8; 20 spawn sequences before the first observation.
        let rig = Rig::new(8);
        let mut query = Query::create(with_pos(), &rig.ring, &rig.buffer);

        for raw in 1..=20 {
            rig.spawn_with(raw, &[0]);
        }

        let added = query.added_with(&rig.ring, &rig.buffer, rig.tick);
        // Only entities whose events survive in the window are reported...
        assert!(added.len() <= 8);
        for entity in &added {
            assert!(entity.raw() > 12, "stale entity {:?} escaped the window", entity);
        }
        // ...while current, sourced from the buffer, sees all 20.
        assert_eq!(query.current_with(&rig.buffer).len(), 20);
    }

    #[test]
    fn observation_advances_last_index_to_the_write_point() {
        let mut rig = Rig::new(64);
        let mut query = Query::create(with_pos(), &rig.ring, &rig.buffer);
        rig.spawn_with(1, &[0]);

        query.added_with(&rig.ring, &rig.buffer, rig.tick);
        assert_eq!(query.last_index(), rig.ring.cursor());

        rig.next_tick();
        rig.spawn_with(2, &[0]);
        query.added_with(&rig.ring, &rig.buffer, rig.tick);
        assert_eq!(query.last_index(), rig.ring.cursor());
    }
}
