//! A headless canvas demo: dots drift under a worker-integrated velocity,
//! a pointer drag spawns more of them, and a store adapter narrates the
//! document changes it would persist.
//!
//! Run with `cargo run --example drifting_dots`.

use weft_ecs::component::{ComponentDef, ComponentId, Data, FieldDef, SyncMode};
use weft_ecs::entity::EntityId;
use weft_ecs::error::EcsError;
use weft_ecs::query::Descriptor;
use weft_ecs::store::StoreAdapter;
use weft_ecs::worker::{WorkerContext, WorkerModule};

use weft_editor::{Editor, EditorBuilder, EditorConfig, HostEvent, Phase, Plugin, PointerKind};

const TICKS: u32 = 60;
const WORKER_THREADS: usize = 2;

/// Integrates `Dot` positions by their velocities on worker threads.
struct Integrate;

impl WorkerModule for Integrate {
    fn run(&mut self, ctx: &WorkerContext, _tick: u32) -> Result<(), String> {
        let dot = ctx.store_named("Dot").map_err(|e| e.to_string())?;
        ctx.for_each_with(dot.id(), |entity| {
            // Replicas partition rows so no cell is written twice per tick.
            if entity.raw() as usize % ctx.replica_count() != ctx.replica_index() {
                return;
            }
            let view = dot.read(entity);
            let (x, y) = (view.f32("x"), view.f32("y"));
            let (dx, dy) = (view.f32("dx"), view.f32("dy"));
            let write = dot.write(entity);
            write.set_f32("x", x + dx);
            write.set_f32("y", y + dy);
        });
        Ok(())
    }
}

/// Prints what a persistence layer would store.
struct NarratingAdapter {
    commits: u32,
}

impl StoreAdapter for NarratingAdapter {
    fn on_component_added(
        &mut self,
        def: &ComponentDef,
        stable_id: &str,
        _entity: EntityId,
        _data: &Data,
    ) {
        println!("  sync: + {} {}", def.name(), stable_id);
    }

    fn on_component_updated(&mut self, _def: &ComponentDef, _stable_id: &str, _data: &Data) {}

    fn on_component_removed(&mut self, def: &ComponentDef, stable_id: &str) {
        println!("  sync: - {} {}", def.name(), stable_id);
    }

    fn on_singleton_updated(&mut self, def: &weft_ecs::component::SingletonDef, _data: &Data) {
        println!("  sync: ~ {}", def.name());
    }

    fn commit(&mut self) {
        self.commits += 1;
    }
}

impl Drop for NarratingAdapter {
    fn drop(&mut self) {
        println!("adapter committed {} ticks", self.commits);
    }
}

struct DotsPlugin;

impl DotsPlugin {
    fn spawn_dot(ctx: &weft_ecs::world::Context<'_>, dot: ComponentId, x: f32, y: f32) {
        let entity = ctx.create_entity().expect("dot capacity");
        let stable = format!("dot-{}", entity.raw());
        ctx.add_component(
            entity,
            dot,
            Some(
                &Data::new()
                    .set("id", stable)
                    .set("x", x)
                    .set("y", y)
                    .set("dx", (entity.raw() % 5) as f32 - 2.0)
                    .set("dy", (entity.raw() % 3) as f32 - 1.0),
            ),
        );
    }
}

impl Plugin for DotsPlugin {
    fn name(&self) -> &str {
        "dots"
    }

    fn build(&self, editor: &mut EditorBuilder) -> Result<(), EcsError> {
        let dot = editor.component(
            ComponentDef::new("Dot")
                .field(FieldDef::string("id", 24))
                .field(FieldDef::f32("x"))
                .field(FieldDef::f32("y"))
                .field(FieldDef::f32("dx"))
                .field(FieldDef::f32("dy"))
                .sync(SyncMode::Document),
        );
        let mouse = editor.input().mouse;

        // A pointer press stamps a new dot at the cursor.
        editor.add_system("spawn-on-press", Phase::Update, 10, move |ctx| {
            let mouse = ctx.singleton(mouse).read();
            if mouse.int("buttons") != 0 {
                Self::spawn_dot(ctx, dot, mouse.f32("x"), mouse.f32("y"));
            }
            Ok(())
        });

        // Dots that drift off the canvas are culled.
        let mut live = None;
        editor.add_system("cull-strays", Phase::PostUpdate, 0, move |ctx| {
            let query = live.get_or_insert_with(|| ctx.query(Descriptor::new().with(&[dot])));
            let screen = ctx.singleton_named("Screen")?.read();
            let (w, h) = (screen.u32("width") as f32, screen.u32("height") as f32);
            let store = ctx.store(dot);
            for entity in query.current(ctx) {
                let view = store.read(entity);
                let (x, y) = (view.f32("x"), view.f32("y"));
                if x < 0.0 || x > w || y < 0.0 || y > h {
                    ctx.remove_entity(entity);
                }
            }
            Ok(())
        });

        editor.add_worker_system("integrate", Phase::Update, 0, WORKER_THREADS, || {
            Box::new(Integrate)
        });
        editor.add_adapter(Box::new(NarratingAdapter { commits: 0 }));
        Ok(())
    }
}

fn seed(editor: &Editor) {
    let ctx = editor.context();
    let dot = ctx.component("Dot").expect("Dot registered");
    for i in 0..8 {
        DotsPlugin::spawn_dot(&ctx, dot, 100.0 + i as f32 * 40.0, 240.0);
    }
}

fn main() -> Result<(), EcsError> {
    let mut builder = EditorBuilder::new(EditorConfig::default());
    builder.add_plugin(&DotsPlugin)?;
    let mut editor = builder.build()?;

    editor.push_event(HostEvent::Resized {
        width: 640,
        height: 480,
        dpr: 1.0,
    });
    seed(&editor);

    for tick in 0..TICKS {
        // A short drag across the middle of the canvas.
        if (10..14).contains(&tick) {
            editor.push_event(HostEvent::PointerMoved {
                x: 320.0 + tick as f32 * 4.0,
                y: 240.0,
                pressure: 0.7,
                kind: PointerKind::Pen,
            });
        }
        if tick == 10 {
            editor.push_event(HostEvent::PointerDown { button: 0 });
        }
        if tick == 14 {
            editor.push_event(HostEvent::PointerUp { button: 0 });
        }

        editor.tick()?;
    }

    let ctx = editor.context();
    let dot = ctx.component("Dot")?;
    let query = ctx.query(Descriptor::new().with(&[dot]));
    let store = ctx.store(dot);
    println!("after {} ticks, {} dots remain:", TICKS, query.current(&ctx).len());
    for entity in query.current(&ctx) {
        let view = store.read(entity);
        println!(
            "  {} at ({:.1}, {:.1})",
            view.string("id"),
            view.f32("x"),
            view.f32("y")
        );
    }
    Ok(())
}
