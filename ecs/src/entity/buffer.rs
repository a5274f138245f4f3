//! Shared per-entity component bitset.
//!
//! The [`EntityBuffer`] is a single shared region holding, for each entity
//! identifier, one bit per registered component: bit `c` is set iff the
//! entity currently has component `c`. It is the sole authoritative answer
//! to `has(entity, component)` and to liveness, and it is safe to consult
//! from worker threads concurrently with main-thread mutation - individual
//! bit flips are atomic, with the event ring providing causal ordering.
//!
//! # Layout
//!
//! Component bits are packed into `words_per_entity` 64-bit words per
//! entity, laid out entity-major so a worker sharing the region indexes it
//! the same way the main thread does. A separate word array carries one
//! "alive" bit per entity.
//!
//! # Event coupling
//!
//! `create` and `delete` push the entity's ADDED / REMOVED event onto the
//! ring themselves, so the REMOVED event is emitted exactly once per
//! deletion. Component bit flips via `set` do *not* push events - the
//! component store owns CHANGED emission, because only it knows which
//! fields were written.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use fixedbitset::FixedBitSet;

use crate::entity::EntityId;
use crate::event::{Kind, Ring};

/// Shared bitset of "which components does entity E have", plus liveness.
pub struct EntityBuffer {
    /// Highest entity id the buffer can hold (ids are `1..=max_entities`).
    max_entities: u32,

    /// Number of registered components.
    component_count: u32,

    /// 64-bit words of component bits per entity.
    words_per_entity: usize,

    /// Component bit words, entity-major: entity `e` owns words
    /// `[e * words_per_entity, (e + 1) * words_per_entity)`.
    bits: Box<[AtomicU64]>,

    /// One alive bit per entity, packed 64 to a word.
    alive: Box<[AtomicU64]>,

    /// The ring ADDED / REMOVED events are pushed onto.
    ring: Arc<Ring>,
}

impl EntityBuffer {
    /// Create a buffer for `max_entities` entities and `component_count`
    /// component bits per entity.
    pub fn new(max_entities: u32, component_count: u32, ring: Arc<Ring>) -> Self {
        let words_per_entity = ((component_count as usize) + 63) / 64;
        let rows = (max_entities as usize) + 1;
        let bit_words = rows * words_per_entity.max(1);
        let alive_words = (rows + 63) / 64;
        Self {
            max_entities,
            component_count,
            words_per_entity: words_per_entity.max(1),
            bits: (0..bit_words).map(|_| AtomicU64::new(0)).collect(),
            alive: (0..alive_words).map(|_| AtomicU64::new(0)).collect(),
            ring,
        }
    }

    /// Highest entity id this buffer tracks.
    #[inline]
    pub fn max_entities(&self) -> u32 {
        self.max_entities
    }

    /// Number of component bits per entity.
    #[inline]
    pub fn component_count(&self) -> u32 {
        self.component_count
    }

    /// Mark `id` alive and emit its ADDED event.
    pub fn create(&self, id: EntityId) {
        debug_assert!(!id.is_invalid() && id.raw() <= self.max_entities);
        let (word, bit) = Self::alive_slot(id);
        self.alive[word].fetch_or(1 << bit, Ordering::AcqRel);
        self.ring.push(Kind::Added, id, 0);
    }

    /// Clear every component bit for `id`, clear its alive flag, and emit
    /// exactly one REMOVED event.
    pub fn delete(&self, id: EntityId) {
        debug_assert!(!id.is_invalid() && id.raw() <= self.max_entities);
        let base = id.index() * self.words_per_entity;
        for offset in 0..self.words_per_entity {
            self.bits[base + offset].store(0, Ordering::Release);
        }
        let (word, bit) = Self::alive_slot(id);
        self.alive[word].fetch_and(!(1 << bit), Ordering::AcqRel);
        self.ring.push(Kind::Removed, id, 0);
    }

    /// Whether `id` currently has component `component`.
    #[inline]
    pub fn has(&self, id: EntityId, component: u8) -> bool {
        let (word, bit) = self.component_slot(id, component);
        self.bits[word].load(Ordering::Acquire) & (1 << bit) != 0
    }

    /// Set or clear the bit for `component` on `id`.
    ///
    /// Returns `true` if the bit transitioned. The caller (the component
    /// store) emits the corresponding CHANGED event on transitions.
    pub fn set(&self, id: EntityId, component: u8, on: bool) -> bool {
        let (word, bit) = self.component_slot(id, component);
        let mask = 1u64 << bit;
        let previous = if on {
            self.bits[word].fetch_or(mask, Ordering::AcqRel)
        } else {
            self.bits[word].fetch_and(!mask, Ordering::AcqRel)
        };
        (previous & mask != 0) != on
    }

    /// Whether `id` is currently alive.
    #[inline]
    pub fn is_alive(&self, id: EntityId) -> bool {
        if id.is_invalid() || id.raw() > self.max_entities {
            return false;
        }
        let (word, bit) = Self::alive_slot(id);
        self.alive[word].load(Ordering::Acquire) & (1 << bit) != 0
    }

    /// Whether `id` is alive and its component bits satisfy
    /// `include ∧ ¬exclude`.
    ///
    /// The masks index by component id and may be shorter than the
    /// registered component count; absent bits are treated as unset.
    pub fn satisfies(&self, id: EntityId, include: &FixedBitSet, exclude: &FixedBitSet) -> bool {
        if !self.is_alive(id) {
            return false;
        }
        let base = id.index() * self.words_per_entity;
        for component in include.ones() {
            let word = base + component / 64;
            if self.bits[word].load(Ordering::Acquire) & (1 << (component % 64)) == 0 {
                return false;
            }
        }
        for component in exclude.ones() {
            let word = base + component / 64;
            if self.bits[word].load(Ordering::Acquire) & (1 << (component % 64)) != 0 {
                return false;
            }
        }
        true
    }

    /// Invoke `f` for every alive entity id, in ascending order.
    pub fn for_each_alive(&self, mut f: impl FnMut(EntityId)) {
        for raw in 1..=self.max_entities {
            let id = EntityId::from_raw(raw);
            if self.is_alive(id) {
                f(id);
            }
        }
    }

    #[inline]
    fn component_slot(&self, id: EntityId, component: u8) -> (usize, u32) {
        debug_assert!((component as u32) < self.component_count.max(1));
        let base = id.index() * self.words_per_entity;
        (base + (component as usize) / 64, (component as u32) % 64)
    }

    #[inline]
    fn alive_slot(id: EntityId) -> (usize, u32) {
        (id.index() / 64, (id.raw() % 64) as u32)
    }
}
