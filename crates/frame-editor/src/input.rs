//! Platform-neutral input events.
//!
//! Hosts translate their native pointer/keyboard events into `InputEvent`
//! values. Pointer coordinates are already in world space.

use serde::{Deserialize, Serialize};

/// Modifier keys held during an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Modifiers {
    pub shift: bool,
    /// Ctrl on Windows/Linux, ⌘ on macOS.
    pub ctrl_or_cmd: bool,
    pub alt: bool,
    /// Space held (temporary pan).
    pub space: bool,
}

impl Modifiers {
    pub const NONE: Modifiers = Modifiers {
        shift: false,
        ctrl_or_cmd: false,
        alt: false,
        space: false,
    };

    pub const SHIFT: Modifiers = Modifiers {
        shift: true,
        ..Modifiers::NONE
    };

    pub const ALT: Modifiers = Modifiers {
        alt: true,
        ..Modifiers::NONE
    };

    pub const CMD: Modifiers = Modifiers {
        ctrl_or_cmd: true,
        ..Modifiers::NONE
    };
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InputEvent {
    PointerDown { x: f32, y: f32, modifiers: Modifiers },
    PointerMove { x: f32, y: f32, modifiers: Modifiers },
    PointerUp { x: f32, y: f32, modifiers: Modifiers },
    /// `key` is the DOM `KeyboardEvent.key` spelling (`"z"`, `"Escape"`, `"ArrowLeft"`).
    KeyDown { key: String, modifiers: Modifiers },
    KeyUp { key: String, modifiers: Modifiers },
}

impl InputEvent {
    pub fn modifiers(&self) -> Modifiers {
        match self {
            InputEvent::PointerDown { modifiers, .. }
            | InputEvent::PointerMove { modifiers, .. }
            | InputEvent::PointerUp { modifiers, .. }
            | InputEvent::KeyDown { modifiers, .. }
            | InputEvent::KeyUp { modifiers, .. } => *modifiers,
        }
    }
}
