//! Recorded event model and its text serialization.
//!
//! Events carry a `time` offset (seconds since recording start, serialized
//! as f64) and a tagged payload. The on-disk form is a JSON array of
//! `{"type": ..., ..., "time": ...}` objects; unknown `type` values are
//! tolerated at load time (see `storage`).

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::time::Duration;

/// A named macro log - an ordered, implicitly time-sorted event sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedMacro {
    pub name: String,
    pub events: Vec<MacroEvent>,
}

impl RecordedMacro {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            events: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Single recorded event: payload plus offset from recording start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacroEvent {
    #[serde(flatten)]
    pub kind: EventKind,
    /// Seconds since recording start. Non-decreasing within a log.
    #[serde(rename = "time", with = "time_secs")]
    pub t: Duration,
}

impl MacroEvent {
    pub fn new(kind: EventKind, t: Duration) -> Self {
        Self { kind, t }
    }
}

/// Event payload - closed sum, exhaustively matched at dispatch time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    KeyPress {
        key: Key,
    },
    KeyRelease {
        key: Key,
    },
    MouseClick {
        x: i32,
        y: i32,
        button: Button,
        pressed: bool,
    },
    MouseScroll {
        x: i32,
        y: i32,
        dx: i32,
        dy: i32,
    },
    /// Gated action: dispatched only if the detector confirms the template
    /// and/or text pattern on a fresh screenshot.
    Conditional {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        template: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pattern: Option<String>,
        event: Box<EventKind>,
    },
}

/// The known discriminator values, used by tolerant loading.
pub const KNOWN_EVENT_TYPES: &[&str] = &[
    "key_press",
    "key_release",
    "mouse_click",
    "mouse_scroll",
    "conditional",
];

/// Pointer button.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Button {
    Left,
    Right,
    Middle,
    /// Fallback for serialized button names we do not know.
    Other(String),
}

impl Button {
    /// Text form, `"Button.<name>"`.
    pub fn token(&self) -> String {
        match self {
            Button::Left => "Button.left".to_string(),
            Button::Right => "Button.right".to_string(),
            Button::Middle => "Button.middle".to_string(),
            Button::Other(s) => s.clone(),
        }
    }

    /// Inverse of [`Button::token`]; unknown names become `Other`.
    pub fn parse(s: &str) -> Self {
        match s {
            "Button.left" => Button::Left,
            "Button.right" => Button::Right,
            "Button.middle" => Button::Middle,
            other => Button::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Button {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.token())
    }
}

impl Serialize for Button {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.token())
    }
}

impl<'de> Deserialize<'de> for Button {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Button::parse(&s))
    }
}

/// A key: literal character, a named special key, or a best-effort fallback
/// kept verbatim so logs written by other tools still round-trip.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Char(char),
    Named(NamedKey),
    Other(String),
}

impl Key {
    /// Text form: special keys as `"Key.<name>"`, literals single-quoted.
    pub fn token(&self) -> String {
        match self {
            Key::Char(c) => format!("'{}'", c),
            Key::Named(n) => format!("Key.{}", n.name()),
            Key::Other(s) => s.clone(),
        }
    }

    /// Inverse of [`Key::token`]. Never fails: an unrecognized special-key
    /// name or odd literal falls back to `Key::Other` with the input kept
    /// verbatim.
    pub fn parse(s: &str) -> Self {
        if let Some(name) = s.strip_prefix("Key.") {
            return match NamedKey::from_name(name) {
                Some(n) => Key::Named(n),
                None => Key::Other(s.to_string()),
            };
        }
        // Quoted literal, e.g. "'a'".
        let mut chars = s.chars();
        if let (Some('\''), Some(c), Some('\''), None) =
            (chars.next(), chars.next(), chars.next(), chars.next())
        {
            return Key::Char(c);
        }
        // Bare single character is accepted as a literal too.
        let mut chars = s.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            return Key::Char(c);
        }
        Key::Other(s.to_string())
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.token())
    }
}

impl Serialize for Key {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.token())
    }
}

impl<'de> Deserialize<'de> for Key {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Key::parse(&s))
    }
}

/// Fixed enumeration of special keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NamedKey {
    Alt,
    AltGr,
    AltR,
    Backspace,
    CapsLock,
    Cmd,
    CmdR,
    Ctrl,
    CtrlR,
    Delete,
    Down,
    End,
    Enter,
    Esc,
    F1,
    F2,
    F3,
    F4,
    F5,
    F6,
    F7,
    F8,
    F9,
    F10,
    F11,
    F12,
    Home,
    Insert,
    Left,
    Menu,
    NumLock,
    PageDown,
    PageUp,
    Pause,
    PrintScreen,
    Right,
    ScrollLock,
    Shift,
    ShiftR,
    Space,
    Tab,
    Up,
}

impl NamedKey {
    pub fn name(&self) -> &'static str {
        match self {
            NamedKey::Alt => "alt",
            NamedKey::AltGr => "alt_gr",
            NamedKey::AltR => "alt_r",
            NamedKey::Backspace => "backspace",
            NamedKey::CapsLock => "caps_lock",
            NamedKey::Cmd => "cmd",
            NamedKey::CmdR => "cmd_r",
            NamedKey::Ctrl => "ctrl",
            NamedKey::CtrlR => "ctrl_r",
            NamedKey::Delete => "delete",
            NamedKey::Down => "down",
            NamedKey::End => "end",
            NamedKey::Enter => "enter",
            NamedKey::Esc => "esc",
            NamedKey::F1 => "f1",
            NamedKey::F2 => "f2",
            NamedKey::F3 => "f3",
            NamedKey::F4 => "f4",
            NamedKey::F5 => "f5",
            NamedKey::F6 => "f6",
            NamedKey::F7 => "f7",
            NamedKey::F8 => "f8",
            NamedKey::F9 => "f9",
            NamedKey::F10 => "f10",
            NamedKey::F11 => "f11",
            NamedKey::F12 => "f12",
            NamedKey::Home => "home",
            NamedKey::Insert => "insert",
            NamedKey::Left => "left",
            NamedKey::Menu => "menu",
            NamedKey::NumLock => "num_lock",
            NamedKey::PageDown => "page_down",
            NamedKey::PageUp => "page_up",
            NamedKey::Pause => "pause",
            NamedKey::PrintScreen => "print_screen",
            NamedKey::Right => "right",
            NamedKey::ScrollLock => "scroll_lock",
            NamedKey::Shift => "shift",
            NamedKey::ShiftR => "shift_r",
            NamedKey::Space => "space",
            NamedKey::Tab => "tab",
            NamedKey::Up => "up",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let k = match name {
            "alt" => NamedKey::Alt,
            "alt_gr" => NamedKey::AltGr,
            "alt_r" => NamedKey::AltR,
            "backspace" => NamedKey::Backspace,
            "caps_lock" => NamedKey::CapsLock,
            "cmd" => NamedKey::Cmd,
            "cmd_r" => NamedKey::CmdR,
            "ctrl" => NamedKey::Ctrl,
            "ctrl_r" => NamedKey::CtrlR,
            "delete" => NamedKey::Delete,
            "down" => NamedKey::Down,
            "end" => NamedKey::End,
            "enter" => NamedKey::Enter,
            "esc" => NamedKey::Esc,
            "f1" => NamedKey::F1,
            "f2" => NamedKey::F2,
            "f3" => NamedKey::F3,
            "f4" => NamedKey::F4,
            "f5" => NamedKey::F5,
            "f6" => NamedKey::F6,
            "f7" => NamedKey::F7,
            "f8" => NamedKey::F8,
            "f9" => NamedKey::F9,
            "f10" => NamedKey::F10,
            "f11" => NamedKey::F11,
            "f12" => NamedKey::F12,
            "home" => NamedKey::Home,
            "insert" => NamedKey::Insert,
            "left" => NamedKey::Left,
            "menu" => NamedKey::Menu,
            "num_lock" => NamedKey::NumLock,
            "page_down" => NamedKey::PageDown,
            "page_up" => NamedKey::PageUp,
            "pause" => NamedKey::Pause,
            "print_screen" => NamedKey::PrintScreen,
            "right" => NamedKey::Right,
            "scroll_lock" => NamedKey::ScrollLock,
            "shift" => NamedKey::Shift,
            "shift_r" => NamedKey::ShiftR,
            "space" => NamedKey::Space,
            "tab" => NamedKey::Tab,
            "up" => NamedKey::Up,
            _ => return None,
        };
        Some(k)
    }
}

mod time_secs {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        // Rejects negative, non-finite and Duration-overflowing values.
        Duration::try_from_secs_f64(secs)
            .map_err(|_| D::Error::custom(format!("invalid event time: {}", secs)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_named() -> Vec<NamedKey> {
        use NamedKey::*;
        vec![
            Alt, AltGr, AltR, Backspace, CapsLock, Cmd, CmdR, Ctrl, CtrlR, Delete, Down, End,
            Enter, Esc, F1, F2, F3, F4, F5, F6, F7, F8, F9, F10, F11, F12, Home, Insert, Left,
            Menu, NumLock, PageDown, PageUp, Pause, PrintScreen, Right, ScrollLock, Shift, ShiftR,
            Space, Tab, Up,
        ]
    }

    #[test]
    fn named_keys_round_trip() {
        for n in all_named() {
            let k = Key::Named(n);
            assert_eq!(Key::parse(&k.token()), k, "token {}", k.token());
        }
    }

    #[test]
    fn literal_keys_round_trip() {
        for c in ['a', 'Z', '7', '%', 'é'] {
            let k = Key::Char(c);
            assert_eq!(Key::parse(&k.token()), k);
        }
    }

    #[test]
    fn unknown_special_key_falls_back_verbatim() {
        let k = Key::parse("Key.hyper_mega");
        assert_eq!(k, Key::Other("Key.hyper_mega".to_string()));
        // And stays stable through another round.
        assert_eq!(Key::parse(&k.token()), k);
    }

    #[test]
    fn bare_character_is_a_literal() {
        assert_eq!(Key::parse("x"), Key::Char('x'));
    }

    #[test]
    fn button_round_trip() {
        for b in [Button::Left, Button::Right, Button::Middle] {
            assert_eq!(Button::parse(&b.token()), b);
        }
        assert_eq!(
            Button::parse("Button.x2"),
            Button::Other("Button.x2".to_string())
        );
    }

    #[test]
    fn event_json_shape_matches_log_format() {
        let ev = MacroEvent::new(
            EventKind::KeyPress {
                key: Key::Named(NamedKey::Shift),
            },
            Duration::from_millis(500),
        );
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "key_press");
        assert_eq!(json["key"], "Key.shift");
        assert_eq!(json["time"], 0.5);

        let back: MacroEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, ev);
    }

    #[test]
    fn click_event_round_trips() {
        let ev = MacroEvent::new(
            EventKind::MouseClick {
                x: 120,
                y: -4,
                button: Button::Left,
                pressed: true,
            },
            Duration::from_secs_f64(1.25),
        );
        let s = serde_json::to_string(&ev).unwrap();
        let back: MacroEvent = serde_json::from_str(&s).unwrap();
        assert_eq!(back, ev);
    }

    #[test]
    fn conditional_event_round_trips() {
        let ev = MacroEvent::new(
            EventKind::Conditional {
                template: Some("attack_button".to_string()),
                pattern: None,
                event: Box::new(EventKind::MouseClick {
                    x: 10,
                    y: 20,
                    button: Button::Left,
                    pressed: true,
                }),
            },
            Duration::from_secs(2),
        );
        let s = serde_json::to_string(&ev).unwrap();
        let back: MacroEvent = serde_json::from_str(&s).unwrap();
        assert_eq!(back, ev);
    }

    #[test]
    fn negative_time_is_rejected() {
        let r: Result<MacroEvent, _> =
            serde_json::from_str(r#"{"type":"key_press","key":"'a'","time":-1.0}"#);
        assert!(r.is_err());
    }

    #[test]
    fn overflowing_time_is_rejected() {
        // Well-formed float, but beyond what a Duration can hold.
        let r: Result<MacroEvent, _> =
            serde_json::from_str(r#"{"type":"key_press","key":"'a'","time":1e300}"#);
        assert!(r.is_err());
    }
}
