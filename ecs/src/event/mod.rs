//! Lifecycle events for entities and components.
//!
//! Every entity and component transition in the world is recorded as a
//! fixed-width [`Event`] appended to the shared [`Ring`]. Queries consume
//! the ring to materialise their reactive `added` / `removed` / `changed`
//! views, and the store-adapter driver consumes it to notify external
//! persistence layers.
//!
//! # Event kinds
//!
//! - [`Kind::Added`] - an entity was created.
//! - [`Kind::Removed`] - an entity was deleted. Emitted exactly once per
//!   deletion, after every component bit has been cleared.
//! - [`Kind::Changed`] - a component of an entity was attached, mutated, or
//!   detached. The `component` field identifies which one.
//!
//! Events are append-only: once pushed they are never mutated, only
//! overwritten when the ring wraps.

mod ring;

pub use ring::{Ring, RingIter};

use crate::entity::EntityId;

/// The kind of lifecycle transition an event records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Kind {
    /// An entity was created.
    Added = 0,
    /// An entity was deleted.
    Removed = 1,
    /// A component was attached, written, or detached.
    Changed = 2,
}

impl Kind {
    /// Decode a kind from its wire tag. Unknown tags decode as `Changed`;
    /// they can only arise from a torn read of an in-flight slot, which the
    /// ring's window semantics already treat as best-effort.
    #[inline]
    pub(crate) fn from_tag(tag: u8) -> Self {
        match tag {
            0 => Kind::Added,
            1 => Kind::Removed,
            _ => Kind::Changed,
        }
    }
}

/// A single lifecycle transition.
///
/// Packs into 96 bits on the wire: the tick, the subject entity, the kind
/// tag, the component id (meaningful for `Changed` only, zero otherwise)
/// and two reserved padding bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    /// Global tick counter at the time the event was pushed. Retained for
    /// diagnostics; query semantics use ring slot ranges, not ticks.
    pub tick: u32,
    /// The subject entity. Singleton writes use a reserved pseudo-entity id
    /// past the world's entity range.
    pub entity: EntityId,
    /// The transition kind.
    pub kind: Kind,
    /// For `Changed`, the id of the component (or singleton) that mutated.
    pub component: u8,
}

impl Event {
    /// Pack the entity / kind / component triple into one 64-bit word.
    /// Layout: entity in bits 0..32, kind tag in 32..40, component id in
    /// 40..48, reserved in 48..64.
    #[inline]
    pub(crate) fn pack(entity: EntityId, kind: Kind, component: u8) -> u64 {
        (entity.raw() as u64) | ((kind as u64) << 32) | ((component as u64) << 40)
    }

    /// Unpack a 64-bit slot word plus its tick into an event.
    #[inline]
    pub(crate) fn unpack(word: u64, tick: u32) -> Self {
        Self {
            tick,
            entity: EntityId::from_raw(word as u32),
            kind: Kind::from_tag((word >> 32) as u8),
            component: (word >> 40) as u8,
        }
    }
}
