//! Lock-free ring buffer of lifecycle events.
//!
//! The [`Ring`] is the world's durable, per-frame observable log of entity
//! transitions. All threads - main systems and worker replicas alike -
//! append to the same ring; queries and the store-adapter driver read from
//! it by slot index.
//!
//! # Slot reservation
//!
//! `push` reserves the next slot with a single `fetch_add` on a monotone
//! 32-bit cursor and writes the packed event into `slot = index % capacity`.
//! Two pushers can never collide on a slot: the cursor hands each one a
//! distinct index. The cursor itself wraps at `u32::MAX`; all distance
//! computations use wrapping arithmetic, which is sound as long as a reader
//! never falls more than `u32::MAX / 2` events behind - far beyond the
//! window any query ever observes.
//!
//! # Overflow
//!
//! Overflow is silent: when the cursor laps a reader, the reader is deemed
//! to have fallen behind and is resynced to the most recent `capacity`
//! events. Consumers must not depend on observing every historical
//! transition, only the steady-state set.
//!
//! # Visibility
//!
//! Slot payloads are stored with `Release` and loaded with `Acquire`; the
//! cursor is read with `Acquire`. A reader that observes cursor value `c`
//! is guaranteed to see every slot write made before the corresponding
//! reservation, but a slot reserved and not yet written may be observed
//! with its previous contents. Readers are racy by design and bounded by
//! the capacity window; the per-tick consumers in this crate only read
//! slots published before the tick's read point.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use fixedbitset::FixedBitSet;

use crate::entity::EntityId;
use crate::event::{Event, Kind};

/// Fixed-capacity, append-only event log with atomic slot reservation.
pub struct Ring {
    /// Number of slots. Not required to be a power of two.
    capacity: u32,

    /// Monotone count of events ever pushed. The next event lands in
    /// `cursor % capacity`.
    cursor: AtomicU32,

    /// The current global tick, stamped onto pushed events.
    tick: AtomicU32,

    /// Packed event payloads (entity | kind | component).
    slots: Box<[AtomicU64]>,

    /// Tick stamps, parallel to `slots`.
    ticks: Box<[AtomicU32]>,
}

impl Ring {
    /// Create a ring with the given slot capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: u32) -> Self {
        assert!(capacity > 0, "event ring capacity must be non-zero");
        Self {
            capacity,
            cursor: AtomicU32::new(0),
            tick: AtomicU32::new(0),
            slots: (0..capacity).map(|_| AtomicU64::new(0)).collect(),
            ticks: (0..capacity).map(|_| AtomicU32::new(0)).collect(),
        }
    }

    /// The ring's slot capacity.
    #[inline]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// The current write index. Events with indices in `[0, cursor)` have
    /// been reserved; the most recent `capacity` of them are readable.
    #[inline]
    pub fn cursor(&self) -> u32 {
        self.cursor.load(Ordering::Acquire)
    }

    /// Set the global tick stamped onto subsequently pushed events.
    /// Called by the scheduler at the start of each tick.
    #[inline]
    pub fn set_tick(&self, tick: u32) {
        self.tick.store(tick, Ordering::Relaxed);
    }

    /// The tick currently being stamped onto events.
    #[inline]
    pub fn tick(&self) -> u32 {
        self.tick.load(Ordering::Relaxed)
    }

    /// Append an event. Safe to call from any thread; two concurrent
    /// pushers receive distinct slots.
    pub fn push(&self, kind: Kind, entity: EntityId, component: u8) {
        let index = self.cursor.fetch_add(1, Ordering::AcqRel);
        let slot = (index % self.capacity) as usize;
        self.ticks[slot].store(self.tick.load(Ordering::Relaxed), Ordering::Relaxed);
        self.slots[slot].store(Event::pack(entity, kind, component), Ordering::Release);
    }

    /// Iterate events with ring indices in `[from, to)`, oldest first.
    ///
    /// If the span exceeds the ring capacity the caller has fallen behind;
    /// the iterator resyncs to the most recent `capacity` events, starting
    /// from `to - capacity`.
    pub fn range(&self, from: u32, to: u32) -> RingIter<'_> {
        let span = to.wrapping_sub(from);
        let from = if span > self.capacity {
            to.wrapping_sub(self.capacity)
        } else {
            from
        };
        RingIter {
            ring: self,
            next: from,
            end: to,
        }
    }

    /// Collect deduplicated entity ids from events since `last_index`.
    ///
    /// This is the query engine's primary consumer. Events are filtered by
    /// `kind`; for [`Kind::Changed`] an optional component mask restricts
    /// which component ids count. Returns the matching entity ids (in
    /// first-seen order) and the updated index to pass on the next call.
    pub fn collect_entities(
        &self,
        last_index: u32,
        kind: Kind,
        mask: Option<&FixedBitSet>,
    ) -> (Vec<EntityId>, u32) {
        let to = self.cursor();
        let ids = self.collect_in(last_index, to, kind, mask);
        (ids, to)
    }

    /// Collect deduplicated entity ids from events in `[from, to)`.
    ///
    /// `to` must be a cursor value the caller snapshotted; queries use this
    /// to consume several kinds against one consistent read point.
    pub(crate) fn collect_in(
        &self,
        from: u32,
        to: u32,
        kind: Kind,
        mask: Option<&FixedBitSet>,
    ) -> Vec<EntityId> {
        let mut seen = FixedBitSet::new();
        let mut ids = Vec::new();
        for event in self.range(from, to) {
            if event.kind != kind {
                continue;
            }
            if event.kind == Kind::Changed {
                if let Some(mask) = mask {
                    if !mask.contains(event.component as usize) {
                        continue;
                    }
                }
            }
            let bit = event.entity.raw() as usize;
            if seen.len() <= bit {
                seen.grow(bit + 1);
            }
            if !seen.contains(bit) {
                seen.insert(bit);
                ids.push(event.entity);
            }
        }
        ids
    }
}

/// Iterator over a window of ring events, oldest first.
pub struct RingIter<'a> {
    ring: &'a Ring,
    next: u32,
    end: u32,
}

impl Iterator for RingIter<'_> {
    type Item = Event;

    fn next(&mut self) -> Option<Event> {
        if self.next == self.end {
            return None;
        }
        let slot = (self.next % self.ring.capacity) as usize;
        self.next = self.next.wrapping_add(1);
        let word = self.ring.slots[slot].load(Ordering::Acquire);
        let tick = self.ring.ticks[slot].load(Ordering::Relaxed);
        Some(Event::unpack(word, tick))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    fn id(raw: u32) -> EntityId {
        EntityId::from_raw(raw)
    }

    // ==================== Push / Range ====================

    #[test]
    fn push_then_range_returns_events_in_order() {
        let ring = Ring::new(8);

        ring.push(Kind::Added, id(1), 0);
        ring.push(Kind::Changed, id(1), 3);
        ring.push(Kind::Removed, id(1), 0);

        let events: Vec<_> = ring.range(0, ring.cursor()).collect();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].kind, Kind::Added);
        assert_eq!(events[1].kind, Kind::Changed);
        assert_eq!(events[1].component, 3);
        assert_eq!(events[2].kind, Kind::Removed);
    }

    #[test]
    fn events_carry_the_current_tick() {
        let ring = Ring::new(8);

        ring.set_tick(7);
        ring.push(Kind::Added, id(1), 0);

        let event = ring.range(0, ring.cursor()).next().unwrap();
        assert_eq!(event.tick, 7);
    }

    #[test]
    fn range_handles_wrap_around() {
        let ring = Ring::new(4);

        for i in 0..6 {
            ring.push(Kind::Added, id(i + 1), 0);
        }

        // Only the most recent 4 events are still addressable.
        let events: Vec<_> = ring.range(2, 6).collect();
        let ids: Vec<u32> = events.iter().map(|e| e.entity.raw()).collect();
        assert_eq!(ids, vec![3, 4, 5, 6]);
    }

    #[test]
    fn range_resyncs_a_lagging_reader() {
        let ring = Ring::new(4);

        for i in 0..20 {
            ring.push(Kind::Added, id(i + 1), 0);
        }

        // Reader asks from index 0; it is 20 behind and gets the last 4.
        let ids: Vec<u32> = ring.range(0, 20).map(|e| e.entity.raw()).collect();
        assert_eq!(ids, vec![17, 18, 19, 20]);
    }

    #[test]
    fn empty_range_yields_nothing() {
        let ring = Ring::new(4);
        assert_eq!(ring.range(0, 0).count(), 0);
    }

    // ==================== collect_entities ====================

    #[test]
    fn collect_filters_by_kind() {
        let ring = Ring::new(16);

        ring.push(Kind::Added, id(1), 0);
        ring.push(Kind::Changed, id(1), 2);
        ring.push(Kind::Added, id(2), 0);
        ring.push(Kind::Removed, id(1), 0);

        let (added, index) = ring.collect_entities(0, Kind::Added, None);
        assert_eq!(added, vec![id(1), id(2)]);
        assert_eq!(index, 4);

        let (removed, _) = ring.collect_entities(0, Kind::Removed, None);
        assert_eq!(removed, vec![id(1)]);
    }

    #[test]
    fn collect_deduplicates_entities() {
        let ring = Ring::new(16);

        ring.push(Kind::Changed, id(5), 1);
        ring.push(Kind::Changed, id(5), 1);
        ring.push(Kind::Changed, id(5), 2);

        let (changed, _) = ring.collect_entities(0, Kind::Changed, None);
        assert_eq!(changed, vec![id(5)]);
    }

    #[test]
    fn collect_filters_changed_by_component_mask() {
        let ring = Ring::new(16);

        ring.push(Kind::Changed, id(1), 0);
        ring.push(Kind::Changed, id(2), 1);
        ring.push(Kind::Changed, id(3), 2);

        let mut mask = FixedBitSet::with_capacity(3);
        mask.insert(1);

        let (changed, _) = ring.collect_entities(0, Kind::Changed, Some(&mask));
        assert_eq!(changed, vec![id(2)]);
    }

    #[test]
    fn collect_resumes_from_returned_index() {
        let ring = Ring::new(16);

        ring.push(Kind::Added, id(1), 0);
        let (first, index) = ring.collect_entities(0, Kind::Added, None);
        assert_eq!(first, vec![id(1)]);

        ring.push(Kind::Added, id(2), 0);
        let (second, _) = ring.collect_entities(index, Kind::Added, None);
        assert_eq!(second, vec![id(2)]);
    }

    #[test]
    fn collect_after_overflow_sees_only_the_window() {
        // Given a tiny ring that has long since wrapped
        let ring = Ring::new(8);
        for i in 0..20 {
            ring.push(Kind::Added, id(i + 1), 0);
        }

        // When a reader that never caught up collects
        let (ids, index) = ring.collect_entities(0, Kind::Added, None);

        // Then it sees at most the most recent capacity events
        assert_eq!(index, 20);
        assert_eq!(ids.len(), 8);
        for entity in ids {
            assert!(entity.raw() > 12, "stale entity {:?} escaped the window", entity);
        }
    }

    // ==================== Concurrency ====================

    #[test]
    fn concurrent_pushers_never_lose_a_slot() {
        let ring = Arc::new(Ring::new(4096));
        let mut handles = Vec::new();

        for t in 0..4u32 {
            let ring = Arc::clone(&ring);
            handles.push(thread::spawn(move || {
                for i in 0..256u32 {
                    ring.push(Kind::Changed, id(t * 1000 + i + 1), 0);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(ring.cursor(), 1024);
        let (ids, _) = ring.collect_entities(0, Kind::Changed, None);
        assert_eq!(ids.len(), 1024);
    }
}
