//! Input-event normalization.
//!
//! UI toolkits hand over raw pointer and keyboard events ([`RawInputEvent`]).
//! Before a step they are converted into the environment's action vocabulary
//! ([`Action`]): pointer events from the primary button and key events without
//! modifier keys. Everything else is dropped.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Raw events
// ---------------------------------------------------------------------------

/// Pointer event kind as reported by the UI toolkit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointerKind {
    Down,
    Up,
    Move,
}

/// Key event kind as reported by the UI toolkit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyKind {
    Down,
    Up,
}

/// A raw input event captured from the display surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawInputEvent {
    Pointer {
        kind: PointerKind,
        /// X offset relative to the observation surface.
        offset_x: i32,
        /// Y offset relative to the observation surface.
        offset_y: i32,
        /// Button index; `0` is the primary button.
        button: u8,
        /// Click count.
        detail: u32,
    },
    Key {
        kind: KeyKind,
        /// Key value, e.g. `"a"` or `"ArrowLeft"`.
        key: String,
        /// Physical key code, e.g. `"KeyA"`.
        code: String,
        /// Legacy key identifier, e.g. `"U+0041"`.
        key_identifier: String,
        /// Legacy numeric key code.
        key_code: u32,
        shift: bool,
        ctrl: bool,
        alt: bool,
        meta: bool,
    },
}

impl RawInputEvent {
    /// Primary-button pointer event with no click count.
    pub const fn pointer(kind: PointerKind, offset_x: i32, offset_y: i32) -> Self {
        Self::Pointer {
            kind,
            offset_x,
            offset_y,
            button: 0,
            detail: 0,
        }
    }

    /// Unmodified key event.
    pub fn key(kind: KeyKind, key: impl Into<String>, code: impl Into<String>, key_code: u32) -> Self {
        Self::Key {
            kind,
            key: key.into(),
            code: code.into(),
            key_identifier: String::new(),
            key_code,
            shift: false,
            ctrl: false,
            alt: false,
            meta: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

/// Mouse action type on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MouseEventType {
    MousePressed,
    MouseReleased,
    MouseMoved,
}

/// Mouse button on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MouseButton {
    Left,
}

/// Keyboard action type on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum KeyEventType {
    KeyDown,
    KeyUp,
}

/// A pointer action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MouseEvent {
    #[serde(rename = "type")]
    pub kind: MouseEventType,
    pub x: i32,
    pub y: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub button: Option<MouseButton>,
    #[serde(default)]
    pub click_count: u32,
}

/// A keyboard action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyEvent {
    #[serde(rename = "type")]
    pub kind: KeyEventType,
    pub text: String,
    pub unmodified_text: String,
    pub key_identifier: String,
    pub code: String,
    pub key: String,
    pub windows_virtual_key_code: u32,
    pub native_virtual_key_code: u32,
}

/// One entry of a step request's `actions` list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Action {
    MouseEvent(MouseEvent),
    KeyEvent(KeyEvent),
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// Convert raw UI events into environment actions, preserving order.
pub fn actions_for_events(events: &[RawInputEvent]) -> Vec<Action> {
    events.iter().filter_map(action_for_event).collect()
}

/// Convert one raw event, or `None` if it is filtered out.
pub fn action_for_event(event: &RawInputEvent) -> Option<Action> {
    match event {
        RawInputEvent::Pointer {
            kind,
            offset_x,
            offset_y,
            button,
            detail,
        } => {
            if *button != 0 {
                return None;
            }
            let kind = match kind {
                PointerKind::Down => MouseEventType::MousePressed,
                PointerKind::Up => MouseEventType::MouseReleased,
                PointerKind::Move => MouseEventType::MouseMoved,
            };
            Some(Action::MouseEvent(MouseEvent {
                kind,
                x: *offset_x,
                y: *offset_y,
                button: Some(MouseButton::Left),
                click_count: *detail,
            }))
        }
        RawInputEvent::Key {
            kind,
            key,
            code,
            key_identifier,
            key_code,
            shift,
            ctrl,
            alt,
            meta,
        } => {
            if *shift || *ctrl || *alt || *meta {
                return None;
            }
            let text = if key.chars().count() == 1 {
                key.clone()
            } else {
                String::new()
            };
            Some(Action::KeyEvent(KeyEvent {
                kind: match kind {
                    KeyKind::Down => KeyEventType::KeyDown,
                    KeyKind::Up => KeyEventType::KeyUp,
                },
                unmodified_text: text.clone(),
                text,
                key_identifier: key_identifier.clone(),
                code: code.clone(),
                key: key.clone(),
                windows_virtual_key_code: *key_code,
                native_virtual_key_code: *key_code,
            }))
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
