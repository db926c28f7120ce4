//! Action filters applied to each step's batch.
//!
//! [`EventFilter::Delta`] reduces a batch to the minimum set of actions that
//! describes how pointer and keyboard state changed from the start to the
//! end of the step, which is closer to what an agent could produce (e.g. at
//! most one pointer movement per step).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::input::{Action, KeyEvent, KeyEventType, MouseButton, MouseEvent, MouseEventType};

// ---------------------------------------------------------------------------
// EventFilterKind
// ---------------------------------------------------------------------------

/// Configured filter variant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventFilterKind {
    /// Pass actions through unchanged.
    #[default]
    None,
    /// Emit only the net change per step.
    Delta,
}

// ---------------------------------------------------------------------------
// EventFilter
// ---------------------------------------------------------------------------

/// Stateful action filter. One instance lives for one episode.
#[derive(Debug, Clone)]
pub enum EventFilter {
    None,
    Delta(DeltaState),
}

impl EventFilter {
    /// Build a filter for a fresh episode on a `width` x `height` surface.
    pub fn new(kind: EventFilterKind, width: u32, height: u32) -> Self {
        match kind {
            EventFilterKind::None => Self::None,
            EventFilterKind::Delta => Self::Delta(DeltaState::centered(width, height)),
        }
    }

    /// Filter one step's batch.
    pub fn apply(&mut self, actions: Vec<Action>) -> Vec<Action> {
        match self {
            Self::None => actions,
            Self::Delta(state) => state.reduce(actions),
        }
    }
}

// ---------------------------------------------------------------------------
// DeltaState
// ---------------------------------------------------------------------------

/// Pointer and keyboard state tracked by the delta filter.
#[derive(Debug, Clone)]
pub struct DeltaState {
    mouse_x: i32,
    mouse_y: i32,
    mouse_pressed: bool,
    keys_pressed: BTreeMap<String, bool>,
}

impl DeltaState {
    /// Pointer at the centre of the surface, nothing pressed.
    pub fn centered(width: u32, height: u32) -> Self {
        Self {
            mouse_x: i32::try_from(width / 2).unwrap_or(i32::MAX),
            mouse_y: i32::try_from(height / 2).unwrap_or(i32::MAX),
            mouse_pressed: false,
            keys_pressed: BTreeMap::new(),
        }
    }

    /// Current pointer position.
    pub const fn pointer(&self) -> (i32, i32) {
        (self.mouse_x, self.mouse_y)
    }

    /// Whether the primary button is held.
    pub const fn pointer_pressed(&self) -> bool {
        self.mouse_pressed
    }

    /// Whether the key with this code is held.
    pub fn key_pressed(&self, code: &str) -> bool {
        self.keys_pressed.get(code).copied().unwrap_or(false)
    }

    fn reduce(&mut self, actions: Vec<Action>) -> Vec<Action> {
        let (mut new_x, mut new_y, mut new_pressed) =
            (self.mouse_x, self.mouse_y, self.mouse_pressed);
        // Last observed event per key code, with its final pressed state.
        let mut key_changes: BTreeMap<String, (bool, KeyEvent)> = BTreeMap::new();

        for action in actions {
            match action {
                Action::MouseEvent(evt) => {
                    new_x = evt.x;
                    new_y = evt.y;
                    match evt.kind {
                        MouseEventType::MousePressed => new_pressed = true,
                        MouseEventType::MouseReleased => new_pressed = false,
                        MouseEventType::MouseMoved => {}
                    }
                }
                Action::KeyEvent(evt) => {
                    let pressed = evt.kind == KeyEventType::KeyDown;
                    key_changes.insert(evt.code.clone(), (pressed, evt));
                }
            }
        }

        let mut out = Vec::new();
        if (new_x, new_y) != (self.mouse_x, self.mouse_y) {
            self.mouse_x = new_x;
            self.mouse_y = new_y;
            out.push(Action::MouseEvent(MouseEvent {
                kind: MouseEventType::MouseMoved,
                x: new_x,
                y: new_y,
                button: self.mouse_pressed.then_some(MouseButton::Left),
                click_count: 0,
            }));
        }
        if new_pressed != self.mouse_pressed {
            self.mouse_pressed = new_pressed;
            out.push(Action::MouseEvent(MouseEvent {
                kind: if new_pressed {
                    MouseEventType::MousePressed
                } else {
                    MouseEventType::MouseReleased
                },
                x: new_x,
                y: new_y,
                button: Some(MouseButton::Left),
                click_count: 1,
            }));
        }

        for (code, (pressed, mut evt)) in key_changes {
            if pressed != self.key_pressed(&code) {
                self.keys_pressed.insert(code, pressed);
                evt.kind = if pressed {
                    KeyEventType::KeyDown
                } else {
                    KeyEventType::KeyUp
                };
                out.push(Action::KeyEvent(evt));
            }
        }

        out
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
