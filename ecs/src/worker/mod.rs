//! Worker system transport.
//!
//! Worker systems execute on dedicated OS threads that share the runtime's
//! memory regions - the entity pool's free list, the entity buffer's
//! bitset, the event ring, and every registered component store's field
//! columns. All real data moves through that shared memory; the transport
//! itself carries only a one-time init payload and per-tick execute
//! messages over bounded channels.
//!
//! # Protocol
//!
//! ```text
//! scheduler                         replica thread
//!    │  Init(WorkerContext)  ─────────►  │  build context
//!    │  ◄─────────────  Ready            │
//!    │                                   │
//!    │  Execute { tick }  ─────────►     │  module.run(ctx, tick)
//!    │  ◄─────────────  Done / Failed    │
//!    │       ...per tick...              │
//!    │  Shutdown  ─────────►             │  exit loop
//! ```
//!
//! A replica that does not report ready before its first execute fails the
//! tick with [`EcsError::WorkerInitFailure`]; an error reply (or a dead
//! replica thread) fails it with [`EcsError::WorkerExecuteFailure`].
//! The scheduler awaits all replicas of a worker system before advancing
//! to the next system in the phase, which is the runtime's only point of
//! suspension.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{Receiver, Sender, bounded, unbounded};

use crate::component::{ComponentId, Store};
use crate::entity::{EntityBuffer, EntityId, Pool};
use crate::error::EcsError;
use crate::event::Ring;

/// How long a replica may take to acknowledge its init payload.
const READY_TIMEOUT: Duration = Duration::from_secs(5);

/// Code executed by each replica of a worker system.
///
/// The module identifier plus a factory producing boxed instances is the
/// runtime's rendering of "a worker entry point": each replica owns one
/// instance and runs it once per tick against the shared memory handles in
/// its [`WorkerContext`].
pub trait WorkerModule: Send {
    /// Execute one tick. Errors are reported to the scheduler verbatim and
    /// fail the tick.
    fn run(&mut self, ctx: &WorkerContext, tick: u32) -> Result<(), String>;
}

/// A factory producing one [`WorkerModule`] instance per replica.
pub type WorkerFactory = dyn Fn() -> Box<dyn WorkerModule>;

/// The shared-memory handles a replica receives in its init message: the
/// entity pool, entity buffer and event ring regions, plus a map from
/// component name to its id and backing store handle.
#[derive(Clone)]
pub struct WorkerContext {
    pool: Arc<Pool>,
    buffer: Arc<EntityBuffer>,
    ring: Arc<Ring>,
    stores: Vec<Arc<Store>>,
    names: HashMap<String, ComponentId>,
    max_entities: u32,
    replica: usize,
    replicas: usize,
}

impl WorkerContext {
    pub(crate) fn new(
        pool: Arc<Pool>,
        buffer: Arc<EntityBuffer>,
        ring: Arc<Ring>,
        stores: Vec<Arc<Store>>,
        max_entities: u32,
    ) -> Self {
        let names = stores
            .iter()
            .map(|store| (store.name().to_string(), store.id()))
            .collect();
        Self {
            pool,
            buffer,
            ring,
            stores,
            names,
            max_entities,
            replica: 0,
            replicas: 1,
        }
    }

    /// Stamp the per-replica coordinates onto an init payload.
    fn for_replica(mut self, replica: usize, replicas: usize) -> Self {
        self.replica = replica;
        self.replicas = replicas;
        self
    }

    /// This replica's index in `0..replica_count`. Replicas of the same
    /// worker system all walk the same world; partition work by entity id
    /// (e.g. `entity.raw() as usize % replica_count == replica_index`) so
    /// no two replicas write the same rows in one tick.
    #[inline]
    pub fn replica_index(&self) -> usize {
        self.replica
    }

    /// The number of replicas of this worker system.
    #[inline]
    pub fn replica_count(&self) -> usize {
        self.replicas
    }

    /// The entity capacity of the world.
    #[inline]
    pub fn max_entities(&self) -> u32 {
        self.max_entities
    }

    /// The number of registered components.
    #[inline]
    pub fn component_count(&self) -> u32 {
        self.stores.len() as u32
    }

    /// The shared event ring.
    #[inline]
    pub fn ring(&self) -> &Ring {
        &self.ring
    }

    /// The shared entity buffer.
    #[inline]
    pub fn buffer(&self) -> &EntityBuffer {
        &self.buffer
    }

    /// Resolve a component name to its id.
    pub fn component(&self, name: &str) -> Result<ComponentId, EcsError> {
        self.names
            .get(name)
            .copied()
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

    /// Allocate an entity from the shared pool and mark it alive.
    pub fn create_entity(&self) -> Result<EntityId, EcsError> {
        let id = self.pool.get()?;
        self.buffer.create(id);
        Ok(id)
    }

    /// Delete an entity: clears its component bits, emits REMOVED, returns
    /// the id to the shared pool.
    pub fn remove_entity(&self, id: EntityId) {
        self.buffer.delete(id);
        self.pool.free(id);
    }

    /// Whether `id` is currently alive.
    #[inline]
    pub fn is_alive(&self, id: EntityId) -> bool {
        self.buffer.is_alive(id)
    }

    /// Whether `id` currently has `component`.
    #[inline]
    pub fn has_component(&self, id: EntityId, component: ComponentId) -> bool {
        self.buffer.has(id, component.raw())
    }

    /// Invoke `f` for every alive entity that currently has `component`,
    /// ascending. The workhorse iteration for worker modules.
    pub fn for_each_with(&self, component: ComponentId, mut f: impl FnMut(EntityId)) {
        self.buffer.for_each_alive(|entity| {
            if self.buffer.has(entity, component.raw()) {
                f(entity);
            }
        });
    }
}

/// Messages from the scheduler to a replica.
enum ToWorker {
    Init(Box<WorkerContext>),
    Execute { tick: u32 },
    Shutdown,
}

/// Replies from a replica to the scheduler.
enum FromWorker {
    Ready,
    Done,
    Failed(String),
}

/// One spawned replica: its channel pair and join handle.
struct Replica {
    to: Sender<ToWorker>,
    from: Receiver<FromWorker>,
    thread: Option<JoinHandle<()>>,
}

/// A spawned worker system: `threads` replicas sharing the world's memory
/// regions, executed in lockstep by the scheduler.
pub struct Handle {
    name: String,
    replicas: Vec<Replica>,
}

impl Handle {
    /// Spawn `threads` replicas, send each its init payload, and wait for
    /// every replica to report ready.
    pub(crate) fn spawn(
        name: impl Into<String>,
        threads: usize,
        factory: &WorkerFactory,
        ctx: WorkerContext,
    ) -> Result<Self, EcsError> {
        let name = name.into();
        assert!(threads > 0, "worker system '{}' needs at least one replica", name);

        let mut replicas = Vec::with_capacity(threads);
        for index in 0..threads {
            let (to_tx, to_rx) = unbounded::<ToWorker>();
            let (from_tx, from_rx) = bounded::<FromWorker>(1);
            let module = factory();
            let thread = thread::Builder::new()
                .name(format!("{}-{}", name, index))
                .spawn(move || replica_loop(module, to_rx, from_tx))
                .map_err(|e| EcsError::WorkerInitFailure {
                    system: name.clone(),
                    detail: format!("spawn failed: {}", e),
                })?;
            replicas.push(Replica {
                to: to_tx,
                from: from_rx,
                thread: Some(thread),
            });
        }

        let handle = Self { name, replicas };
        handle.initialize(ctx)?;
        Ok(handle)
    }

    /// The worker system's name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The number of replicas.
    #[inline]
    pub fn replica_count(&self) -> usize {
        self.replicas.len()
    }

    /// Send the init payload to every replica and await their ready
    /// replies.
    fn initialize(&self, ctx: WorkerContext) -> Result<(), EcsError> {
        let total = self.replicas.len();
        for (index, replica) in self.replicas.iter().enumerate() {
            let payload = ctx.clone().for_replica(index, total);
            replica
                .to
                .send(ToWorker::Init(Box::new(payload)))
                .map_err(|_| self.init_failure("replica channel closed before init"))?;
        }
        for replica in &self.replicas {
            match replica.from.recv_timeout(READY_TIMEOUT) {
                Ok(FromWorker::Ready) => {}
                Ok(_) => return Err(self.init_failure("unexpected reply to init")),
                Err(_) => return Err(self.init_failure("replica did not report ready")),
            }
        }
        log::debug!("worker system '{}' ready ({} replicas)", self.name, self.replicas.len());
        Ok(())
    }

    /// Execute one tick on every replica and await all completions.
    ///
    /// Worker replicas observe the world as of this call's dispatch; the
    /// channel send/receive pair orders their writes before the reply is
    /// observed, so the next system in the schedule sees them.
    pub(crate) fn execute(&self, tick: u32) -> Result<(), EcsError> {
        for replica in &self.replicas {
            replica
                .to
                .send(ToWorker::Execute { tick })
                .map_err(|_| self.execute_failure("replica channel closed"))?;
        }
        let mut failure: Option<EcsError> = None;
        for replica in &self.replicas {
            match replica.from.recv() {
                Ok(FromWorker::Done) => {}
                Ok(FromWorker::Failed(detail)) => {
                    failure.get_or_insert_with(|| self.execute_failure(&detail));
                }
                Ok(FromWorker::Ready) => {
                    failure.get_or_insert_with(|| self.execute_failure("unexpected ready reply"));
                }
                Err(_) => {
                    failure.get_or_insert_with(|| self.execute_failure("replica died mid-tick"));
                }
            }
        }
        match failure {
            Some(error) => {
                log::warn!("{}", error);
                Err(error)
            }
            None => Ok(()),
        }
    }

    fn init_failure(&self, detail: &str) -> EcsError {
        EcsError::WorkerInitFailure {
            system: self.name.clone(),
            detail: detail.to_string(),
        }
    }

    fn execute_failure(&self, detail: &str) -> EcsError {
        EcsError::WorkerExecuteFailure {
            system: self.name.clone(),
            detail: detail.to_string(),
        }
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        for replica in &self.replicas {
            let _ = replica.to.send(ToWorker::Shutdown);
        }
        for replica in &mut self.replicas {
            if let Some(thread) = replica.thread.take() {
                let _ = thread.join();
            }
        }
    }
}

/// The replica thread body: wait for init, then serve execute messages
/// until shutdown.
fn replica_loop(
    mut module: Box<dyn WorkerModule>,
    rx: Receiver<ToWorker>,
    tx: Sender<FromWorker>,
) {
    let mut ctx: Option<WorkerContext> = None;
    while let Ok(message) = rx.recv() {
        match message {
            ToWorker::Init(payload) => {
                ctx = Some(*payload);
                if tx.send(FromWorker::Ready).is_err() {
                    return;
                }
            }
            ToWorker::Execute { tick } => {
                let reply = match &ctx {
                    Some(ctx) => match module.run(ctx, tick) {
                        Ok(()) => FromWorker::Done,
                        Err(detail) => FromWorker::Failed(detail),
                    },
                    None => FromWorker::Failed("execute before init".to_string()),
                };
                if tx.send(reply).is_err() {
                    return;
                }
            }
            ToWorker::Shutdown => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::component::{ComponentDef, FieldDef};

    fn context() -> (WorkerContext, Arc<Ring>) {
        let ring = Arc::new(Ring::new(256));
        let pool = Arc::new(Pool::new(16));
        let buffer = Arc::new(EntityBuffer::new(16, 1, Arc::clone(&ring)));
        let store = Arc::new(Store::new(
            ComponentDef::new("Pos").field(FieldDef::f32("x")),
            ComponentId::from_raw(0),
            16,
            Arc::clone(&buffer),
            Arc::clone(&ring),
        ));
        (
            WorkerContext::new(pool, buffer, Arc::clone(&ring), vec![store], 16),
            ring,
        )
    }

    struct Bumper;

    impl WorkerModule for Bumper {
        fn run(&mut self, ctx: &WorkerContext, _tick: u32) -> Result<(), String> {
            let pos = ctx.store_named("Pos").map_err(|e| e.to_string())?;
            ctx.for_each_with(pos.id(), |entity| {
                let x = pos.read(entity).f32("x");
                pos.write(entity).set_f32("x", x + 1.0);
            });
            Ok(())
        }
    }

    struct Failing;

    impl WorkerModule for Failing {
        fn run(&mut self, _ctx: &WorkerContext, _tick: u32) -> Result<(), String> {
            Err("deliberate".to_string())
        }
    }

    #[test]
    fn replicas_spawn_and_report_ready() {
        let (ctx, _) = context();

        let handle = Handle::spawn("bump", 3, &|| Box::new(Bumper), ctx).unwrap();

        assert_eq!(handle.replica_count(), 3);
        assert_eq!(handle.name(), "bump");
    }

    #[test]
    fn execute_runs_the_module_against_shared_stores() {
        let (ctx, _) = context();
        let entity = ctx.create_entity().unwrap();
        let pos = ctx.store_named("Pos").unwrap();
        pos.add(entity, None);
        let pos = Arc::clone(pos);

        let handle = Handle::spawn("bump", 1, &|| Box::new(Bumper), ctx).unwrap();
        handle.execute(1).unwrap();
        handle.execute(2).unwrap();

        // Writes made on the worker thread are visible after execute
        // returns: the reply channel orders them before this read.
        assert_eq!(pos.read(entity).f32("x"), 2.0);
    }

    #[test]
    fn module_error_fails_the_execute() {
        let (ctx, _) = context();
        let handle = Handle::spawn("bad", 2, &|| Box::new(Failing), ctx).unwrap();

        let error = handle.execute(1).unwrap_err();
        assert!(matches!(error, EcsError::WorkerExecuteFailure { .. }));
        assert!(error.to_string().contains("deliberate"));
    }

    #[test]
    fn each_replica_gets_its_own_module_instance() {
        static BUILT: AtomicU32 = AtomicU32::new(0);

        struct Counting;
        impl WorkerModule for Counting {
            fn run(&mut self, _ctx: &WorkerContext, _tick: u32) -> Result<(), String> {
                Ok(())
            }
        }

        let (ctx, _) = context();
        let factory = || {
            BUILT.fetch_add(1, Ordering::SeqCst);
            Box::new(Counting) as Box<dyn WorkerModule>
        };
        let handle = Handle::spawn("count", 4, &factory, ctx).unwrap();
        handle.execute(1).unwrap();

        assert_eq!(BUILT.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn workers_can_create_entities_through_the_shared_pool() {
        struct Spawner;
        impl WorkerModule for Spawner {
            fn run(&mut self, ctx: &WorkerContext, _tick: u32) -> Result<(), String> {
                let entity = ctx.create_entity().map_err(|e| e.to_string())?;
                let pos = ctx.store_named("Pos").map_err(|e| e.to_string())?;
                pos.add(entity, None);
                Ok(())
            }
        }

        let (ctx, _) = context();
        let buffer = Arc::clone(&ctx.buffer);
        let handle = Handle::spawn("spawn", 2, &|| Box::new(Spawner), ctx).unwrap();
        handle.execute(1).unwrap();

        let mut alive = 0;
        buffer.for_each_alive(|_| alive += 1);
        assert_eq!(alive, 2);
    }
}
