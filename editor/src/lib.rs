//! The editor layer: phase registry, plugin composition, and the
//! input-to-ECS adapter over the runtime.
//!
//! An [`Editor`] owns a world and a schedule and drives them one tick at
//! a time. It is assembled through an [`EditorBuilder`]:
//!
//! 1. The built-in input singletons (`Mouse`, `Pointer`, `Keyboard`,
//!    `Screen`) are registered before anything else.
//! 2. Plugins install their definitions, systems and adapters in
//!    registration order.
//! 3. `build()` freezes the world, spawns worker systems, and installs
//!    the input-drain system at maximum priority in the `Input` phase -
//!    draining host input is the only main-thread work that phase does.
//!
//! Per tick, the editor advances the frame counter, drains pending host
//! events into the input singletons, runs every phase's systems in
//! priority order, and lets the world's store adapters flush and commit
//! at the boundaries.
//!
//! # Example
//!
//! ```rust,ignore
//! let mut builder = EditorBuilder::new(EditorConfig::default());
//! builder.add_plugin(&ShapesPlugin)?;
//! let mut editor = builder.build()?;
//!
//! loop {
//!     for event in host.poll() {
//!         editor.push_event(event);
//!     }
//!     editor.tick()?;
//! }
//! ```

pub mod input;
mod plugin;

pub use input::{HostEvent, InputSingletons, PointerKind};
pub use plugin::Plugin;
pub use weft_ecs::schedule::Phase;

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use weft_ecs::component::{ComponentDef, ComponentId, SingletonDef, SingletonId};
use weft_ecs::error::EcsError;
use weft_ecs::schedule::Schedule;
use weft_ecs::store::StoreAdapter;
use weft_ecs::system::SystemFn;
use weft_ecs::worker::WorkerModule;
use weft_ecs::world::{Context, World, WorldConfig};

/// Editor construction parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct EditorConfig {
    /// Capacities of the underlying world.
    pub world: WorldConfig,
}

struct PendingSystem {
    name: String,
    phase: Phase,
    priority: i32,
    f: SystemFn,
}

struct PendingWorker {
    name: String,
    phase: Phase,
    priority: i32,
    threads: usize,
    factory: Box<dyn Fn() -> Box<dyn WorkerModule>>,
}

/// Collects definitions, systems, plugins and adapters before the editor
/// is assembled.
pub struct EditorBuilder {
    world: weft_ecs::world::WorldBuilder,
    input: InputSingletons,
    systems: Vec<PendingSystem>,
    workers: Vec<PendingWorker>,
    adapters: Vec<Box<dyn StoreAdapter>>,
}

impl EditorBuilder {
    /// Start building an editor; the input singletons are registered
    /// immediately.
    pub fn new(config: EditorConfig) -> Self {
        let mut world = World::builder(config.world);
        let input = input::register(&mut world);
        Self {
            world,
            input,
            systems: Vec::new(),
            workers: Vec::new(),
            adapters: Vec::new(),
        }
    }

    /// Register a component definition.
    pub fn component(&mut self, def: ComponentDef) -> ComponentId {
        self.world.component(def)
    }

    /// Register a singleton definition.
    pub fn singleton(&mut self, def: SingletonDef) -> SingletonId {
        self.world.singleton(def)
    }

    /// The ids of the built-in input singletons.
    pub fn input(&self) -> &InputSingletons {
        &self.input
    }

    /// Apply a plugin now, in order.
    pub fn add_plugin(&mut self, plugin: &dyn Plugin) -> Result<(), EcsError> {
        log::debug!("installing plugin '{}'", plugin.name());
        plugin.build(self)
    }

    /// Register a main-thread system under a phase and priority.
    pub fn add_system(
        &mut self,
        name: impl Into<String>,
        phase: Phase,
        priority: i32,
        f: impl FnMut(&Context<'_>) -> Result<(), EcsError> + 'static,
    ) {
        self.systems.push(PendingSystem {
            name: name.into(),
            phase,
            priority,
            f: Box::new(f),
        });
    }

    /// Register a worker system; replicas spawn when the editor is built.
    pub fn add_worker_system(
        &mut self,
        name: impl Into<String>,
        phase: Phase,
        priority: i32,
        threads: usize,
        factory: impl Fn() -> Box<dyn WorkerModule> + 'static,
    ) {
        self.workers.push(PendingWorker {
            name: name.into(),
            phase,
            priority,
            threads,
            factory: Box::new(factory),
        });
    }

    /// Attach a store adapter.
    pub fn add_adapter(&mut self, adapter: Box<dyn StoreAdapter>) {
        self.adapters.push(adapter);
    }

    /// Freeze the world, spawn workers, and assemble the editor.
    pub fn build(self) -> Result<Editor, EcsError> {
        let world = self.world.build();

        for adapter in self.adapters {
            world.add_adapter(adapter);
        }

        let events: Rc<RefCell<VecDeque<HostEvent>>> = Rc::new(RefCell::new(VecDeque::new()));
        let mut schedule = Schedule::new();

        // The input drain runs before anything else in the Input phase.
        let queue = Rc::clone(&events);
        let ids = self.input;
        schedule.add_system("input-drain", Phase::Input, i32::MAX, move |ctx| {
            let drained: Vec<HostEvent> = queue.borrow_mut().drain(..).collect();
            input::apply(&drained, ctx, &ids);
            Ok(())
        });

        for pending in self.systems {
            let PendingSystem { name, phase, priority, mut f } = pending;
            schedule.add_system(name, phase, priority, move |ctx| f(ctx));
        }

        for pending in self.workers {
            schedule.add_worker_system(
                &world,
                pending.name,
                pending.phase,
                pending.priority,
                pending.threads,
                pending.factory.as_ref(),
            )?;
        }

        Ok(Editor {
            world,
            schedule,
            events,
            input: self.input,
        })
    }
}

/// A built editor: the world, its schedule, and the host event queue.
pub struct Editor {
    world: World,
    schedule: Schedule,
    events: Rc<RefCell<VecDeque<HostEvent>>>,
    input: InputSingletons,
}

impl Editor {
    /// Queue a host event for the next tick's input drain.
    pub fn push_event(&self, event: HostEvent) {
        self.events.borrow_mut().push_back(event);
    }

    /// Run one tick: frame advance, input drain, all phases, adapter
    /// commit. A failing system fails the tick atomically.
    pub fn tick(&mut self) -> Result<(), EcsError> {
        self.schedule.tick(&self.world)
    }

    /// The underlying world.
    pub fn world(&self) -> &World {
        &self.world
    }

    /// The operation surface, for host-side inspection between ticks.
    pub fn context(&self) -> Context<'_> {
        self.world.context()
    }

    /// The ids of the built-in input singletons.
    pub fn input(&self) -> &InputSingletons {
        &self.input
    }

    /// The current frame counter.
    pub fn frame(&self) -> u32 {
        self.world.frame()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use weft_ecs::component::{ComponentDef, Data, FieldDef};
    use weft_ecs::query::Descriptor;

    use super::*;

    fn editor() -> Editor {
        EditorBuilder::new(EditorConfig::default()).build().unwrap()
    }

    // ==================== Input drain ====================

    #[test]
    fn pointer_motion_lands_in_the_mouse_singleton() {
        let mut editor = editor();
        editor.push_event(HostEvent::PointerMoved {
            x: 10.0,
            y: 20.0,
            pressure: 0.5,
            kind: PointerKind::Pen,
        });

        editor.tick().unwrap();

        let ctx = editor.context();
        let mouse = ctx.singleton(editor.input().mouse);
        assert_eq!(mouse.read().f32("x"), 10.0);
        assert_eq!(mouse.read().f32("y"), 20.0);
        let pointer = ctx.singleton(editor.input().pointer);
        assert_eq!(pointer.read().f32("pressure"), 0.5);
        assert_eq!(pointer.read().enum_tag("kind"), PointerKind::Pen as u32);
    }

    #[test]
    fn buttons_and_active_track_down_up() {
        let mut editor = editor();

        editor.push_event(HostEvent::PointerDown { button: 0 });
        editor.tick().unwrap();
        {
            let ctx = editor.context();
            assert_eq!(ctx.singleton(editor.input().mouse).read().int("buttons"), 1);
            assert!(ctx.singleton(editor.input().pointer).read().boolean("active"));
        }

        editor.push_event(HostEvent::PointerUp { button: 0 });
        editor.tick().unwrap();
        {
            let ctx = editor.context();
            assert_eq!(ctx.singleton(editor.input().mouse).read().int("buttons"), 0);
            assert!(!ctx.singleton(editor.input().pointer).read().boolean("active"));
        }
    }

    #[test]
    fn wheel_deltas_accumulate_then_reset() {
        let mut editor = editor();

        editor.push_event(HostEvent::Wheel { dx: 0.0, dy: 3.0 });
        editor.push_event(HostEvent::Wheel { dx: 1.0, dy: 2.0 });
        editor.tick().unwrap();
        {
            let ctx = editor.context();
            let mouse = ctx.singleton(editor.input().mouse);
            assert_eq!(mouse.read().f32("wheel_dx"), 1.0);
            assert_eq!(mouse.read().f32("wheel_dy"), 5.0);
        }

        // A wheel-quiet tick resets the deltas.
        editor.tick().unwrap();
        {
            let ctx = editor.context();
            let mouse = ctx.singleton(editor.input().mouse);
            assert_eq!(mouse.read().f32("wheel_dy"), 0.0);
        }
    }

    #[test]
    fn keyboard_bitmap_tracks_keys() {
        let mut editor = editor();

        editor.push_event(HostEvent::KeyDown { code: 65 });
        editor.push_event(HostEvent::KeyDown { code: 66 });
        editor.push_event(HostEvent::KeyUp { code: 65 });
        editor.tick().unwrap();

        let ctx = editor.context();
        let pressed = ctx
            .singleton(editor.input().keyboard)
            .read()
            .bytes("pressed");
        assert!(!input::key_is_down(&pressed, 65));
        assert!(input::key_is_down(&pressed, 66));
    }

    #[test]
    fn resize_updates_the_screen_singleton() {
        let mut editor = editor();
        editor.push_event(HostEvent::Resized {
            width: 1920,
            height: 1080,
            dpr: 2.0,
        });

        editor.tick().unwrap();

        let ctx = editor.context();
        let screen = ctx.singleton(editor.input().screen);
        assert_eq!(screen.read().u32("width"), 1920);
        assert_eq!(screen.read().u32("height"), 1080);
        assert_eq!(screen.read().f32("dpr"), 2.0);
    }

    #[test]
    fn events_are_consumed_once() {
        let mut editor = editor();
        editor.push_event(HostEvent::Wheel { dx: 0.0, dy: 1.0 });

        editor.tick().unwrap();
        editor.tick().unwrap();

        let ctx = editor.context();
        assert_eq!(
            ctx.singleton(editor.input().mouse).read().f32("wheel_dy"),
            0.0
        );
    }

    #[test]
    fn input_state_is_readable_from_update_systems_same_tick() {
        let mut builder = EditorBuilder::new(EditorConfig::default());
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let mouse = builder.input().mouse;
        builder.add_system("read-mouse", Phase::Update, 0, move |ctx| {
            sink.borrow_mut().push(ctx.singleton(mouse).read().f32("x"));
            Ok(())
        });
        let mut editor = builder.build().unwrap();

        editor.push_event(HostEvent::PointerMoved {
            x: 42.0,
            y: 0.0,
            pressure: 0.0,
            kind: PointerKind::Mouse,
        });
        editor.tick().unwrap();

        // The Input-phase drain ran before Update in the same tick.
        assert_eq!(*seen.borrow(), vec![42.0]);
    }

    // ==================== Plugins ====================

    struct DotsPlugin {
        spawned: Rc<RefCell<Vec<u32>>>,
    }

    impl Plugin for DotsPlugin {
        fn name(&self) -> &str {
            "dots"
        }

        fn build(&self, editor: &mut EditorBuilder) -> Result<(), EcsError> {
            let dot = editor.component(
                ComponentDef::new("Dot")
                    .field(FieldDef::f32("x"))
                    .field(FieldDef::f32("y")),
            );
            let spawned = Rc::clone(&self.spawned);
            editor.add_system("spawn-dot", Phase::Update, 0, move |ctx| {
                let entity = ctx.create_entity()?;
                ctx.add_component(entity, dot, Some(&Data::new().set("x", 1.0f32)));
                spawned.borrow_mut().push(entity.raw());
                Ok(())
            });
            Ok(())
        }
    }

    #[test]
    fn plugins_install_components_and_systems() {
        let mut builder = EditorBuilder::new(EditorConfig::default());
        let spawned = Rc::new(RefCell::new(Vec::new()));
        builder
            .add_plugin(&DotsPlugin {
                spawned: Rc::clone(&spawned),
            })
            .unwrap();
        let mut editor = builder.build().unwrap();

        editor.tick().unwrap();
        editor.tick().unwrap();

        assert_eq!(spawned.borrow().len(), 2);
        let ctx = editor.context();
        let dot = ctx.component("Dot").unwrap();
        let mut query = ctx.query(Descriptor::new().with(&[dot]));
        assert_eq!(query.current(&ctx).len(), 2);
        // Both spawns are visible as `added` to a late-created query.
        assert_eq!(query.added(&ctx).len(), 2);
    }

    #[test]
    fn frame_advances_per_tick() {
        let mut editor = editor();
        assert_eq!(editor.frame(), 0);

        editor.tick().unwrap();
        editor.tick().unwrap();
        editor.tick().unwrap();

        assert_eq!(editor.frame(), 3);
    }
}
