//! Host input conversion.
//!
//! Hosts feed raw UI signals to the editor as [`HostEvent`] values between
//! ticks. At the start of each tick - and only there - the editor drains
//! the queue into the built-in input singletons (`Mouse`, `Pointer`,
//! `Keyboard`, `Screen`), so every system, whatever its phase, observes
//! one coherent input state per tick. The singletons' CHANGED events flow
//! through the ring like any other write, which is what makes input
//! reactive without a dedicated observer interface.
//!
//! # Singletons
//!
//! | Name | Fields |
//! |------|--------|
//! | `Mouse` | `x`, `y`, `buttons` (bitmask), `wheel_dx`, `wheel_dy`, `over_canvas` |
//! | `Pointer` | `x`, `y`, `pressure`, `kind` (mouse/pen/touch), `active` |
//! | `Keyboard` | `pressed` (256-bit key bitmap), `modifiers` |
//! | `Screen` | `width`, `height`, `dpr` |
//!
//! Wheel deltas accumulate across the events of one tick and reset to
//! zero on the next quiet tick, so a system reading `wheel_dy` sees this
//! tick's scroll and nothing stale.

use weft_ecs::component::{FieldDef, SingletonDef, SingletonId};
use weft_ecs::world::{Context, WorldBuilder};

/// The pointing device class reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum PointerKind {
    Mouse = 0,
    Pen = 1,
    Touch = 2,
}

/// A raw host UI signal, queued between ticks.
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    /// The pointer moved to canvas coordinates `(x, y)`.
    PointerMoved {
        x: f32,
        y: f32,
        pressure: f32,
        kind: PointerKind,
    },
    /// A pointer button went down (0 = primary).
    PointerDown { button: u8 },
    /// A pointer button came up.
    PointerUp { button: u8 },
    /// The pointer entered the canvas.
    PointerEntered,
    /// The pointer left the canvas.
    PointerLeft,
    /// Wheel / scroll delta.
    Wheel { dx: f32, dy: f32 },
    /// A key went down (host scan/key code, 0..=255).
    KeyDown { code: u8 },
    /// A key came up.
    KeyUp { code: u8 },
    /// The modifier bitmask changed.
    ModifiersChanged { modifiers: u8 },
    /// The host surface was resized.
    Resized { width: u32, height: u32, dpr: f32 },
}

/// The ids of the built-in input singletons.
#[derive(Debug, Clone, Copy)]
pub struct InputSingletons {
    pub mouse: SingletonId,
    pub pointer: SingletonId,
    pub keyboard: SingletonId,
    pub screen: SingletonId,
}

/// Register the input singletons on a world under construction.
pub(crate) fn register(builder: &mut WorldBuilder) -> InputSingletons {
    let mouse = builder.singleton(
        SingletonDef::new("Mouse")
            .field(FieldDef::f32("x"))
            .field(FieldDef::f32("y"))
            .field(FieldDef::u8("buttons"))
            .field(FieldDef::f32("wheel_dx"))
            .field(FieldDef::f32("wheel_dy"))
            .field(FieldDef::boolean("over_canvas")),
    );
    let pointer = builder.singleton(
        SingletonDef::new("Pointer")
            .field(FieldDef::f32("x"))
            .field(FieldDef::f32("y"))
            .field(FieldDef::f32("pressure"))
            .field(FieldDef::enumeration(
                "kind",
                vec![
                    PointerKind::Mouse as u32,
                    PointerKind::Pen as u32,
                    PointerKind::Touch as u32,
                ],
            ))
            .field(FieldDef::boolean("active")),
    );
    let keyboard = builder.singleton(
        SingletonDef::new("Keyboard")
            .field(FieldDef::bytes("pressed", 32))
            .field(FieldDef::u8("modifiers")),
    );
    let screen = builder.singleton(
        SingletonDef::new("Screen")
            .field(FieldDef::u32("width"))
            .field(FieldDef::u32("height"))
            .field(FieldDef::f32("dpr").default(1.0f32)),
    );
    InputSingletons {
        mouse,
        pointer,
        keyboard,
        screen,
    }
}

/// Drain one tick's worth of host events into the input singletons.
pub(crate) fn apply(events: &[HostEvent], ctx: &Context<'_>, ids: &InputSingletons) {
    let mouse = ctx.singleton(ids.mouse);
    let pointer = ctx.singleton(ids.pointer);
    let keyboard = ctx.singleton(ids.keyboard);
    let screen = ctx.singleton(ids.screen);

    let mut wheel_dx = 0.0f32;
    let mut wheel_dy = 0.0f32;
    let mut wheeled = false;

    for event in events {
        match event {
            HostEvent::PointerMoved { x, y, pressure, kind } => {
                mouse.write().set("x", *x);
                mouse.write().set("y", *y);
                pointer.write().set("x", *x);
                pointer.write().set("y", *y);
                pointer.write().set("pressure", *pressure);
                pointer.write().set("kind", *kind as u32);
            }
            HostEvent::PointerDown { button } => {
                let buttons = mouse.read().int("buttons") as u8 | (1 << (button % 8));
                mouse.write().set("buttons", buttons);
                pointer.write().set("active", true);
            }
            HostEvent::PointerUp { button } => {
                let buttons = mouse.read().int("buttons") as u8 & !(1 << (button % 8));
                mouse.write().set("buttons", buttons);
                if buttons == 0 {
                    pointer.write().set("active", false);
                }
            }
            HostEvent::PointerEntered => {
                mouse.write().set("over_canvas", true);
            }
            HostEvent::PointerLeft => {
                mouse.write().set("over_canvas", false);
            }
            HostEvent::Wheel { dx, dy } => {
                wheel_dx += dx;
                wheel_dy += dy;
                wheeled = true;
            }
            HostEvent::KeyDown { code } => {
                let mut pressed = keyboard.read().bytes("pressed");
                pressed[(*code as usize) / 8] |= 1 << (code % 8);
                keyboard.write().set("pressed", pressed);
            }
            HostEvent::KeyUp { code } => {
                let mut pressed = keyboard.read().bytes("pressed");
                pressed[(*code as usize) / 8] &= !(1 << (code % 8));
                keyboard.write().set("pressed", pressed);
            }
            HostEvent::ModifiersChanged { modifiers } => {
                keyboard.write().set("modifiers", *modifiers);
            }
            HostEvent::Resized { width, height, dpr } => {
                screen.write().set("width", *width);
                screen.write().set("height", *height);
                screen.write().set("dpr", *dpr);
            }
        }
    }

    // This tick's accumulated wheel delta, or a reset after a wheel-quiet
    // tick so nothing stale lingers.
    if wheeled {
        mouse.write().set("wheel_dx", wheel_dx);
        mouse.write().set("wheel_dy", wheel_dy);
    } else if mouse.read().f32("wheel_dx") != 0.0 || mouse.read().f32("wheel_dy") != 0.0 {
        mouse.write().set("wheel_dx", 0.0f32);
        mouse.write().set("wheel_dy", 0.0f32);
    }
}

/// Test whether `code` is down in a `Keyboard::pressed` bitmap.
pub fn key_is_down(pressed: &[u8], code: u8) -> bool {
    pressed
        .get((code as usize) / 8)
        .is_some_and(|byte| byte & (1 << (code % 8)) != 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_bitmap_helper() {
        let mut pressed = vec![0u8; 32];
        pressed[2] = 0b0000_0100; // code 18

        assert!(key_is_down(&pressed, 18));
        assert!(!key_is_down(&pressed, 17));
        assert!(!key_is_down(&pressed, 255));
    }
}
