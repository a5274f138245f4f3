//! Phase-ordered, priority-sorted system execution.
//!
//! The schedule owns every registered system and runs one tick at a time:
//!
//! 1. Advance the frame counter in the Frame singleton (and stamp the
//!    event ring with the new tick).
//! 2. Flush external changes in through the world's store adapters.
//! 3. Run every phase in [`Phase`] order; within a phase, systems run in
//!    priority order (higher first, ties by registration order). Worker
//!    systems block until all replicas reply before the next system runs.
//! 4. Drive adapter notifications and commit at the tick boundary.
//!
//! A failing system fails the tick: later systems do not run and the
//! boundary commit is skipped, so a correct store adapter never persists
//! a partial tick.
//!
//! # Ordering guarantees
//!
//! Within a phase, system order is deterministic given the same
//! registrations. Earlier phases complete before later phases begin; no
//! system of phase `P` overlaps any system of phase `Q ≠ P`. Main-thread
//! systems observe prior main-thread effects immediately; a worker
//! system's writes are visible to every later system in the same tick
//! once its replicas have replied.

use crate::error::EcsError;
use crate::system::{System, SystemFn, SystemKind};
use crate::worker::{self, WorkerFactory};
use crate::world::{Context, World};

/// The closed, ordered set of execution phases.
///
/// Every system runs in exactly one phase; the scheduler visits phases in
/// declaration order each tick. `Input` is reserved for draining host
/// input into the input singletons; `Epilogue` runs after rendering for
/// end-of-frame bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    Input,
    PreCapture,
    Capture,
    PreUpdate,
    Update,
    PostUpdate,
    PreRender,
    Render,
    PostRender,
    Epilogue,
}

impl Phase {
    /// Every phase, in execution order.
    pub const ORDER: [Phase; 10] = [
        Phase::Input,
        Phase::PreCapture,
        Phase::Capture,
        Phase::PreUpdate,
        Phase::Update,
        Phase::PostUpdate,
        Phase::PreRender,
        Phase::Render,
        Phase::PostRender,
        Phase::Epilogue,
    ];

    /// The phase's position in execution order.
    #[inline]
    pub(crate) fn index(&self) -> usize {
        *self as usize
    }

    /// A human-readable name for diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            Phase::Input => "Input",
            Phase::PreCapture => "PreCapture",
            Phase::Capture => "Capture",
            Phase::PreUpdate => "PreUpdate",
            Phase::Update => "Update",
            Phase::PostUpdate => "PostUpdate",
            Phase::PreRender => "PreRender",
            Phase::Render => "Render",
            Phase::PostRender => "PostRender",
            Phase::Epilogue => "Epilogue",
        }
    }
}

/// The schedule: every registered system, executed phase by phase.
#[derive(Default)]
pub struct Schedule {
    systems: Vec<System>,
    next_order: u32,
    sorted: bool,
}

impl Schedule {
    /// An empty schedule.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a main-thread system under a phase and priority.
    ///
    /// Higher priority runs first within the phase; ties run in
    /// registration order.
    pub fn add_system(
        &mut self,
        name: impl Into<String>,
        phase: Phase,
        priority: i32,
        f: impl FnMut(&Context<'_>) -> Result<(), EcsError> + 'static,
    ) {
        let order = self.bump_order();
        self.systems
            .push(System::main(name, phase, priority, order, Box::new(f) as SystemFn));
        self.sorted = false;
    }

    /// Register a worker system: spawn `threads` replicas of the module
    /// produced by `factory`, hand them the world's shared memory regions,
    /// and await their ready replies.
    pub fn add_worker_system(
        &mut self,
        world: &World,
        name: impl Into<String>,
        phase: Phase,
        priority: i32,
        threads: usize,
        factory: &WorkerFactory,
    ) -> Result<(), EcsError> {
        let name = name.into();
        let handle = worker::Handle::spawn(name.clone(), threads, factory, world.worker_context())?;
        let order = self.bump_order();
        self.systems
            .push(System::worker(name, phase, priority, order, handle));
        self.sorted = false;
        Ok(())
    }

    /// The number of registered systems.
    #[inline]
    pub fn len(&self) -> usize {
        self.systems.len()
    }

    /// Whether no systems are registered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }

    /// Run one tick against `world`.
    ///
    /// Returns the first system error, if any; the tick is then abandoned
    /// before the boundary commit.
    pub fn tick(&mut self, world: &World) -> Result<(), EcsError> {
        self.ensure_sorted();

        world.begin_tick();
        let tick = world.frame();
        log::debug!("tick {} ({} systems)", tick, self.systems.len());

        for system in &mut self.systems {
            let result = match &mut system.kind {
                SystemKind::Main(f) => f(&world.context()),
                SystemKind::Worker(handle) => handle.execute(tick),
            };
            if let Err(error) = result {
                log::warn!(
                    "tick {} failed in {} system '{}': {}",
                    tick,
                    system.phase.name(),
                    system.name,
                    error
                );
                return Err(error);
            }
        }

        world.end_tick();
        Ok(())
    }

    fn bump_order(&mut self) -> u32 {
        let order = self.next_order;
        self.next_order += 1;
        order
    }

    fn ensure_sorted(&mut self) {
        if !self.sorted {
            self.systems.sort_by_key(|system| system.sort_key());
            self.sorted = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::world::{World, WorldConfig};

    fn world() -> World {
        World::builder(WorldConfig::default()).build()
    }

    #[test]
    fn phases_are_declared_in_execution_order() {
        for pair in Phase::ORDER.windows(2) {
            assert!(pair[0] < pair[1]);
        }
        assert_eq!(Phase::Input.index(), 0);
        assert_eq!(Phase::Epilogue.index(), 9);
    }

    #[test]
    fn empty_schedule_ticks() {
        let world = world();
        let mut schedule = Schedule::new();

        schedule.tick(&world).unwrap();
        schedule.tick(&world).unwrap();

        assert_eq!(world.frame(), 2);
    }

    #[test]
    fn systems_run_in_phase_order() {
        let world = world();
        let mut schedule = Schedule::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        // Registered out of phase order on purpose.
        let l = Rc::clone(&log);
        schedule.add_system("render", Phase::Render, 0, move |_| {
            l.borrow_mut().push("render");
            Ok(())
        });
        let l = Rc::clone(&log);
        schedule.add_system("update", Phase::Update, 0, move |_| {
            l.borrow_mut().push("update");
            Ok(())
        });
        let l = Rc::clone(&log);
        schedule.add_system("input", Phase::Input, 0, move |_| {
            l.borrow_mut().push("input");
            Ok(())
        });

        schedule.tick(&world).unwrap();

        assert_eq!(*log.borrow(), vec!["input", "update", "render"]);
    }

    #[test]
    fn priority_orders_within_a_phase_with_stable_ties() {
        let world = world();
        let mut schedule = Schedule::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        let l = Rc::clone(&log);
        schedule.add_system("low", Phase::Update, -5, move |_| {
            l.borrow_mut().push("low");
            Ok(())
        });
        let l = Rc::clone(&log);
        schedule.add_system("high", Phase::Update, 10, move |_| {
            l.borrow_mut().push("high");
            Ok(())
        });
        let l = Rc::clone(&log);
        schedule.add_system("tie-a", Phase::Update, 0, move |_| {
            l.borrow_mut().push("tie-a");
            Ok(())
        });
        let l = Rc::clone(&log);
        schedule.add_system("tie-b", Phase::Update, 0, move |_| {
            l.borrow_mut().push("tie-b");
            Ok(())
        });

        schedule.tick(&world).unwrap();

        assert_eq!(*log.borrow(), vec!["high", "tie-a", "tie-b", "low"]);
    }

    #[test]
    fn a_failing_system_fails_the_tick_and_skips_the_rest() {
        let world = world();
        let mut schedule = Schedule::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        let l = Rc::clone(&log);
        schedule.add_system("boom", Phase::Update, 0, move |_| {
            l.borrow_mut().push("boom");
            Err(EcsError::EntityPoolExhausted)
        });
        let l = Rc::clone(&log);
        schedule.add_system("after", Phase::Render, 0, move |_| {
            l.borrow_mut().push("after");
            Ok(())
        });

        let error = schedule.tick(&world).unwrap_err();

        assert_eq!(error, EcsError::EntityPoolExhausted);
        assert_eq!(*log.borrow(), vec!["boom"]);
    }

    #[test]
    fn each_tick_advances_the_frame_singleton() {
        let world = world();
        let mut schedule = Schedule::new();
        let frames = Rc::new(RefCell::new(Vec::new()));

        let f = Rc::clone(&frames);
        schedule.add_system("observe", Phase::Update, 0, move |ctx| {
            f.borrow_mut().push(ctx.frame());
            Ok(())
        });

        schedule.tick(&world).unwrap();
        schedule.tick(&world).unwrap();
        schedule.tick(&world).unwrap();

        assert_eq!(*frames.borrow(), vec![1, 2, 3]);
    }

    #[test]
    fn registration_after_a_tick_keeps_determinism() {
        let world = world();
        let mut schedule = Schedule::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        let l = Rc::clone(&log);
        schedule.add_system("first", Phase::Update, 0, move |_| {
            l.borrow_mut().push("first");
            Ok(())
        });
        schedule.tick(&world).unwrap();
        log.borrow_mut().clear();

        // A later registration with equal priority still runs after the
        // earlier one.
        let l = Rc::clone(&log);
        schedule.add_system("second", Phase::Update, 0, move |_| {
            l.borrow_mut().push("second");
            Ok(())
        });
        schedule.tick(&world).unwrap();

        assert_eq!(*log.borrow(), vec!["first", "second"]);
    }
}
