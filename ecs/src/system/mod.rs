//! System descriptors.
//!
//! A system is a unit of per-tick work registered with the schedule under
//! a phase and a priority. Two kinds exist:
//!
//! - **Main systems** - a boxed closure from [`Context`] to a result, run
//!   on the main thread. This is the common case.
//! - **Worker systems** - a spawned [`worker::Handle`] whose replicas are
//!   executed in lockstep on their own threads; the scheduler awaits all
//!   replicas before moving on.
//!
//! Priority is an integer: higher runs first within a phase, and ties are
//! broken by registration order, which is stable across runs.

use crate::error::EcsError;
use crate::schedule::Phase;
use crate::worker;
use crate::world::Context;

/// A main-thread system function.
pub type SystemFn = Box<dyn FnMut(&Context<'_>) -> Result<(), EcsError>>;

/// The two execution kinds a system can have.
pub(crate) enum SystemKind {
    /// Runs on the main thread with a [`Context`].
    Main(SystemFn),
    /// Dispatched to worker replicas via the transport.
    Worker(worker::Handle),
}

/// A registered system: name, placement, and its executable kind.
pub struct System {
    pub(crate) name: String,
    pub(crate) phase: Phase,
    pub(crate) priority: i32,
    /// Registration sequence number; the stable tie-breaker.
    pub(crate) order: u32,
    pub(crate) kind: SystemKind,
}

impl System {
    pub(crate) fn main(
        name: impl Into<String>,
        phase: Phase,
        priority: i32,
        order: u32,
        f: SystemFn,
    ) -> Self {
        Self {
            name: name.into(),
            phase,
            priority,
            order,
            kind: SystemKind::Main(f),
        }
    }

    pub(crate) fn worker(
        name: impl Into<String>,
        phase: Phase,
        priority: i32,
        order: u32,
        handle: worker::Handle,
    ) -> Self {
        Self {
            name: name.into(),
            phase,
            priority,
            order,
            kind: SystemKind::Worker(handle),
        }
    }

    /// The system's name, for diagnostics.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The phase this system runs in.
    #[inline]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The system's priority within its phase. Higher runs first.
    #[inline]
    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// The deterministic ordering key: phase, then descending priority,
    /// then registration order.
    #[inline]
    pub(crate) fn sort_key(&self) -> (usize, i64, u32) {
        (self.phase.index(), -(self.priority as i64), self.order)
    }
}
