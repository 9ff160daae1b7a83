//! macOS capture via CGEventTap and injection via CGEventPost.

use crate::backend::InputBackend;
use crate::error::{Error, Result};
use crate::events::{Button, EventKind, Key, MacroEvent, NamedKey};
use crate::killswitch::{AbortHook, CancelToken};
use crate::recorder::PermissionStatus;
use crate::window::{Region, WindowInfo, WindowProvider};
use crossbeam_channel::{bounded, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use cidre::cg::event::access as cg_access;
use cidre::{cf, cg};

// Raw FFI for CGEventPost (not exposed by cidre)
#[link(name = "CoreGraphics", kind = "framework")]
extern "C" {
    fn CGEventPost(tap: u32, event: *const std::ffi::c_void);
}

const HID_EVENT_TAP: u32 = 0;

fn post_event(event: &cg::Event) {
    unsafe {
        CGEventPost(HID_EVENT_TAP, event as *const _ as *const std::ffi::c_void);
    }
}

pub fn check_permissions() -> PermissionStatus {
    PermissionStatus {
        input_monitoring: cg_access::listen_preflight(),
    }
}

/// Prompt the user for the Input Monitoring permission.
pub fn request_permissions() -> PermissionStatus {
    PermissionStatus {
        input_monitoring: cg_access::listen_request(),
    }
}

// ============================================================================
// Capture
// ============================================================================

struct TapState {
    tx: Sender<MacroEvent>,
    t0: Instant,
}

/// Install the keyboard + pointer event tap on its own thread. Fails with
/// `CaptureUnavailable` before any thread state is kept if the tap cannot
/// be created.
pub fn spawn_capture(
    tx: Sender<MacroEvent>,
    stop: Arc<AtomicBool>,
    t0: Instant,
) -> Result<Vec<thread::JoinHandle<()>>> {
    if !cg_access::listen_preflight() {
        return Err(Error::capture_unavailable(
            "Input Monitoring permission not granted",
        ));
    }

    let (ready_tx, ready_rx) = bounded::<bool>(1);
    let handle = thread::spawn(move || {
        run_event_tap(tx, stop, t0, ready_tx);
    });

    match ready_rx.recv_timeout(Duration::from_secs(2)) {
        Ok(true) => Ok(vec![handle]),
        _ => {
            let _ = handle.join();
            Err(Error::capture_unavailable("failed to install event tap"))
        }
    }
}

fn run_event_tap(
    tx: Sender<MacroEvent>,
    stop: Arc<AtomicBool>,
    t0: Instant,
    ready: Sender<bool>,
) {
    let mask = cg::EventType::KEY_DOWN.mask()
        | cg::EventType::KEY_UP.mask()
        | cg::EventType::LEFT_MOUSE_DOWN.mask()
        | cg::EventType::LEFT_MOUSE_UP.mask()
        | cg::EventType::RIGHT_MOUSE_DOWN.mask()
        | cg::EventType::RIGHT_MOUSE_UP.mask()
        | cg::EventType::OHTER_MOUSE_DOWN.mask()
        | cg::EventType::OHTER_MOUSE_UP.mask()
        | cg::EventType::SCROLL_WHEEL.mask();

    let state = Box::leak(Box::new(TapState { tx, t0 }));

    let tap = cg::EventTap::new(
        cg::EventTapLocation::Session,
        cg::EventTapPlacement::TailAppend,
        cg::EventTapOpts::LISTEN_ONLY,
        mask,
        tap_callback,
        state as *mut TapState,
    );

    let Some(tap) = tap else {
        let _ = ready.send(false);
        return;
    };

    let Some(src) = cf::MachPort::run_loop_src(&tap, 0) else {
        let _ = ready.send(false);
        return;
    };

    let rl = cf::RunLoop::current();
    rl.add_src(&src, cf::RunLoopMode::default());
    let _ = ready.send(true);

    while !stop.load(Ordering::Relaxed) {
        cf::RunLoop::run_in_mode(cf::RunLoopMode::default(), 0.05, true);
    }

    rl.remove_src(&src, cf::RunLoopMode::default());
}

extern "C" fn tap_callback(
    _proxy: *mut cg::EventTapProxy,
    event_type: cg::EventType,
    event: &mut cg::Event,
    user_info: *mut TapState,
) -> Option<&cg::Event> {
    let state = unsafe { &*user_info };
    let t = state.t0.elapsed();
    let loc = event.location();
    let x = loc.x as i32;
    let y = loc.y as i32;

    let kind = match event_type {
        cg::EventType::KEY_DOWN | cg::EventType::KEY_UP => {
            let keycode = event.field_i64(cg::EventField::KEYBOARD_EVENT_KEYCODE) as u16;
            let key = keycode_to_key(keycode);
            if event_type == cg::EventType::KEY_DOWN {
                EventKind::KeyPress { key }
            } else {
                EventKind::KeyRelease { key }
            }
        }
        cg::EventType::LEFT_MOUSE_DOWN | cg::EventType::LEFT_MOUSE_UP => EventKind::MouseClick {
            x,
            y,
            button: Button::Left,
            pressed: event_type == cg::EventType::LEFT_MOUSE_DOWN,
        },
        cg::EventType::RIGHT_MOUSE_DOWN | cg::EventType::RIGHT_MOUSE_UP => EventKind::MouseClick {
            x,
            y,
            button: Button::Right,
            pressed: event_type == cg::EventType::RIGHT_MOUSE_DOWN,
        },
        cg::EventType::OHTER_MOUSE_DOWN | cg::EventType::OHTER_MOUSE_UP => EventKind::MouseClick {
            x,
            y,
            button: Button::Middle,
            pressed: event_type == cg::EventType::OHTER_MOUSE_DOWN,
        },
        cg::EventType::SCROLL_WHEEL => {
            let dy = event.field_i64(cg::EventField::SCROLL_WHEEL_EVENT_DELTA_AXIS1) as i32;
            let dx = event.field_i64(cg::EventField::SCROLL_WHEEL_EVENT_DELTA_AXIS2) as i32;
            if dx == 0 && dy == 0 {
                return Some(event);
            }
            EventKind::MouseScroll { x, y, dx, dy }
        }
        _ => return Some(event),
    };

    let _ = state.tx.try_send(MacroEvent::new(kind, t));
    Some(event)
}

// ============================================================================
// Kill-switch hotkey
// ============================================================================

const KEY_ESCAPE: u16 = 53;

/// Dedicated listen-only tap that trips the cancellation token on Escape.
/// Lives for the whole process; dropping it stops the run loop thread.
pub struct HotkeyListener {
    stop: Arc<AtomicBool>,
}

struct HotkeyState {
    token: CancelToken,
    hook: Option<AbortHook>,
}

impl HotkeyListener {
    pub fn spawn(token: CancelToken, hook: Option<AbortHook>) -> Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let stop2 = stop.clone();
        let (ready_tx, ready_rx) = bounded::<bool>(1);

        thread::spawn(move || {
            let state = Box::leak(Box::new(HotkeyState { token, hook }));
            let tap = cg::EventTap::new(
                cg::EventTapLocation::Session,
                cg::EventTapPlacement::TailAppend,
                cg::EventTapOpts::LISTEN_ONLY,
                cg::EventType::KEY_DOWN.mask(),
                hotkey_callback,
                state as *mut HotkeyState,
            );
            let Some(tap) = tap else {
                let _ = ready_tx.send(false);
                return;
            };
            let Some(src) = cf::MachPort::run_loop_src(&tap, 0) else {
                let _ = ready_tx.send(false);
                return;
            };
            let rl = cf::RunLoop::current();
            rl.add_src(&src, cf::RunLoopMode::default());
            let _ = ready_tx.send(true);
            while !stop2.load(Ordering::Relaxed) {
                cf::RunLoop::run_in_mode(cf::RunLoopMode::default(), 0.25, true);
            }
            rl.remove_src(&src, cf::RunLoopMode::default());
        });

        match ready_rx.recv_timeout(Duration::from_secs(2)) {
            Ok(true) => Ok(Self { stop }),
            _ => Err(Error::capture_unavailable(
                "failed to install kill-switch event tap",
            )),
        }
    }
}

impl Drop for HotkeyListener {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

extern "C" fn hotkey_callback(
    _proxy: *mut cg::EventTapProxy,
    event_type: cg::EventType,
    event: &mut cg::Event,
    user_info: *mut HotkeyState,
) -> Option<&cg::Event> {
    if event_type == cg::EventType::KEY_DOWN {
        let keycode = event.field_i64(cg::EventField::KEYBOARD_EVENT_KEYCODE) as u16;
        if keycode == KEY_ESCAPE {
            let state = unsafe { &*user_info };
            state.token.cancel();
            if let Some(hook) = &state.hook {
                hook();
            }
        }
    }
    Some(event)
}

// ============================================================================
// Injection
// ============================================================================

pub fn default_backend() -> Arc<dyn InputBackend> {
    Arc::new(MacBackend)
}

pub struct MacBackend;

impl MacBackend {
    fn key_event(&self, key: &Key, down: bool) -> Result<()> {
        let what = if down { "key down" } else { "key up" };
        let keycode =
            key_to_keycode(key).ok_or_else(|| Error::dispatch_failed(what, key.token()))?;
        let evt = cg::Event::keyboard(None, keycode, down)
            .ok_or_else(|| Error::dispatch_failed(what, "event creation failed"))?;
        post_event(&evt);
        Ok(())
    }

    fn button_event(&self, x: i32, y: i32, button: &Button, down: bool) -> Result<()> {
        let what = if down { "pointer down" } else { "pointer up" };
        let pos = cg::Point {
            x: x as f64,
            y: y as f64,
        };
        let (btn, event_type) = match (button, down) {
            (Button::Left, true) => (cg::MouseButton::Left, cg::EventType::LEFT_MOUSE_DOWN),
            (Button::Left, false) => (cg::MouseButton::Left, cg::EventType::LEFT_MOUSE_UP),
            (Button::Right, true) => (cg::MouseButton::Right, cg::EventType::RIGHT_MOUSE_DOWN),
            (Button::Right, false) => (cg::MouseButton::Right, cg::EventType::RIGHT_MOUSE_UP),
            (Button::Middle, true) => (cg::MouseButton::Center, cg::EventType::OHTER_MOUSE_DOWN),
            (Button::Middle, false) => (cg::MouseButton::Center, cg::EventType::OHTER_MOUSE_UP),
            (Button::Other(name), _) => {
                return Err(Error::dispatch_failed(what, format!("unmapped {}", name)))
            }
        };
        let evt = cg::Event::mouse(None, event_type, pos, btn)
            .ok_or_else(|| Error::dispatch_failed(what, "event creation failed"))?;
        post_event(&evt);
        Ok(())
    }
}

impl InputBackend for MacBackend {
    fn key_down(&self, key: &Key) -> Result<()> {
        self.key_event(key, true)
    }

    fn key_up(&self, key: &Key) -> Result<()> {
        self.key_event(key, false)
    }

    fn pointer_down(&self, x: i32, y: i32, button: &Button) -> Result<()> {
        self.button_event(x, y, button, true)
    }

    fn pointer_up(&self, x: i32, y: i32, button: &Button) -> Result<()> {
        self.button_event(x, y, button, false)
    }

    fn scroll(&self, dy: i32) -> Result<()> {
        // The wheel binding takes unsigned line counts, so the sign of
        // `dy` does not reach the posted event.
        let evt = cg::Event::wheel_2(
            None,
            cg::ScrollEventUnit::Line,
            dy.unsigned_abs(),
            0,
        )
        .ok_or_else(|| Error::dispatch_failed("scroll", "event creation failed"))?;
        post_event(&evt);
        Ok(())
    }
}

// ============================================================================
// Window enumeration
// ============================================================================

// Raw FFI for CGWindowListCopyWindowInfo (not exposed by cidre)
#[link(name = "CoreGraphics", kind = "framework")]
extern "C" {
    fn CGWindowListCopyWindowInfo(
        option: u32,
        relative_to: u32,
    ) -> Option<cidre::arc::R<cf::ArrayOf<cf::DictionaryOf<cf::String, cf::Type>>>>;
}

const ON_SCREEN_ONLY: u32 = 1 << 0;
const EXCLUDE_DESKTOP_ELEMENTS: u32 = 1 << 4;
const NULL_WINDOW_ID: u32 = 0;

pub fn window_provider() -> Option<Arc<dyn WindowProvider>> {
    Some(Arc::new(MacWindowProvider))
}

/// On-screen window titles and bounds from the window server. Window names
/// need the Screen Recording permission; without it the owning application
/// name is reported instead.
pub struct MacWindowProvider;

impl WindowProvider for MacWindowProvider {
    fn list_windows(&self) -> Vec<WindowInfo> {
        let Some(list) = (unsafe {
            CGWindowListCopyWindowInfo(ON_SCREEN_ONLY | EXCLUDE_DESKTOP_ELEMENTS, NULL_WINDOW_ID)
        }) else {
            return Vec::new();
        };

        let mut windows = Vec::new();
        for info in list.iter() {
            let title = dict_string(info, "kCGWindowName")
                .or_else(|| dict_string(info, "kCGWindowOwnerName"));
            let Some(title) = title.filter(|t| !t.is_empty()) else {
                continue;
            };
            let Some(bounds) = dict_bounds(info) else {
                continue;
            };
            windows.push(WindowInfo { title, bounds });
        }
        windows
    }
}

fn dict_string(dict: &cf::DictionaryOf<cf::String, cf::Type>, key: &str) -> Option<String> {
    let key = cf::String::from_str(key);
    let v = dict.get(&key)?;
    if v.get_type_id() == cf::String::type_id() {
        let s: &cf::String = unsafe { std::mem::transmute(v) };
        Some(s.to_string())
    } else {
        None
    }
}

fn dict_bounds(dict: &cf::DictionaryOf<cf::String, cf::Type>) -> Option<Region> {
    let key = cf::String::from_str("kCGWindowBounds");
    let v = dict.get(&key)?;
    if v.get_type_id() != cf::Dictionary::type_id() {
        return None;
    }
    let rect: &cf::DictionaryOf<cf::String, cf::Type> = unsafe { std::mem::transmute(v) };
    Some(Region {
        x: dict_number(rect, "X")?,
        y: dict_number(rect, "Y")?,
        width: dict_number(rect, "Width")?.max(0) as u32,
        height: dict_number(rect, "Height")?.max(0) as u32,
    })
}

fn dict_number(dict: &cf::DictionaryOf<cf::String, cf::Type>, key: &str) -> Option<i32> {
    let key = cf::String::from_str(key);
    let v = dict.get(&key)?;
    if v.get_type_id() == cf::Number::type_id() {
        let n: &cf::Number = unsafe { std::mem::transmute(v) };
        n.to_i32()
    } else {
        None
    }
}

// ============================================================================
// Keycode mapping
// ============================================================================

fn keycode_to_key(keycode: u16) -> Key {
    if let Some(n) = keycode_to_named(keycode) {
        return Key::Named(n);
    }
    if let Some(c) = keycode_to_char(keycode) {
        return Key::Char(c);
    }
    Key::Other(format!("Keycode.{}", keycode))
}

fn key_to_keycode(key: &Key) -> Option<u16> {
    match key {
        Key::Named(n) => named_to_keycode(*n),
        Key::Char(c) => char_to_keycode(*c),
        Key::Other(s) => s.strip_prefix("Keycode.").and_then(|n| n.parse().ok()),
    }
}

fn keycode_to_named(keycode: u16) -> Option<NamedKey> {
    let n = match keycode {
        36 => NamedKey::Enter,
        48 => NamedKey::Tab,
        49 => NamedKey::Space,
        51 => NamedKey::Backspace,
        53 => NamedKey::Esc,
        54 => NamedKey::CmdR,
        55 => NamedKey::Cmd,
        56 => NamedKey::Shift,
        57 => NamedKey::CapsLock,
        58 => NamedKey::Alt,
        59 => NamedKey::Ctrl,
        60 => NamedKey::ShiftR,
        61 => NamedKey::AltR,
        62 => NamedKey::CtrlR,
        96 => NamedKey::F5,
        97 => NamedKey::F6,
        98 => NamedKey::F7,
        99 => NamedKey::F3,
        100 => NamedKey::F8,
        101 => NamedKey::F9,
        103 => NamedKey::F11,
        109 => NamedKey::F10,
        110 => NamedKey::Menu,
        111 => NamedKey::F12,
        114 => NamedKey::Insert,
        115 => NamedKey::Home,
        116 => NamedKey::PageUp,
        117 => NamedKey::Delete,
        118 => NamedKey::F4,
        119 => NamedKey::End,
        120 => NamedKey::F2,
        121 => NamedKey::PageDown,
        122 => NamedKey::F1,
        123 => NamedKey::Left,
        124 => NamedKey::Right,
        125 => NamedKey::Down,
        126 => NamedKey::Up,
        _ => return None,
    };
    Some(n)
}

fn named_to_keycode(n: NamedKey) -> Option<u16> {
    let code = match n {
        NamedKey::Enter => 36,
        NamedKey::Tab => 48,
        NamedKey::Space => 49,
        NamedKey::Backspace => 51,
        NamedKey::Esc => 53,
        NamedKey::CmdR => 54,
        NamedKey::Cmd => 55,
        NamedKey::Shift => 56,
        NamedKey::CapsLock => 57,
        NamedKey::Alt => 58,
        NamedKey::Ctrl => 59,
        NamedKey::ShiftR => 60,
        NamedKey::AltR => 61,
        NamedKey::CtrlR => 62,
        NamedKey::F5 => 96,
        NamedKey::F6 => 97,
        NamedKey::F7 => 98,
        NamedKey::F3 => 99,
        NamedKey::F8 => 100,
        NamedKey::F9 => 101,
        NamedKey::F11 => 103,
        NamedKey::F10 => 109,
        NamedKey::Menu => 110,
        NamedKey::F12 => 111,
        NamedKey::Insert => 114,
        NamedKey::Home => 115,
        NamedKey::PageUp => 116,
        NamedKey::Delete => 117,
        NamedKey::F4 => 118,
        NamedKey::End => 119,
        NamedKey::F2 => 120,
        NamedKey::PageDown => 121,
        NamedKey::F1 => 122,
        NamedKey::Left => 123,
        NamedKey::Right => 124,
        NamedKey::Down => 125,
        NamedKey::Up => 126,
        // No ANSI keycode on this layout.
        NamedKey::AltGr | NamedKey::NumLock | NamedKey::Pause | NamedKey::PrintScreen
        | NamedKey::ScrollLock => return None,
    };
    Some(code)
}

fn keycode_to_char(keycode: u16) -> Option<char> {
    let c = match keycode {
        0 => 'a',
        1 => 's',
        2 => 'd',
        3 => 'f',
        4 => 'h',
        5 => 'g',
        6 => 'z',
        7 => 'x',
        8 => 'c',
        9 => 'v',
        11 => 'b',
        12 => 'q',
        13 => 'w',
        14 => 'e',
        15 => 'r',
        16 => 'y',
        17 => 't',
        18 => '1',
        19 => '2',
        20 => '3',
        21 => '4',
        22 => '6',
        23 => '5',
        24 => '=',
        25 => '9',
        26 => '7',
        27 => '-',
        28 => '8',
        29 => '0',
        30 => ']',
        31 => 'o',
        32 => 'u',
        33 => '[',
        34 => 'i',
        35 => 'p',
        37 => 'l',
        38 => 'j',
        39 => '\'',
        40 => 'k',
        41 => ';',
        42 => '\\',
        43 => ',',
        44 => '/',
        45 => 'n',
        46 => 'm',
        47 => '.',
        50 => '`',
        _ => return None,
    };
    Some(c)
}

fn char_to_keycode(c: char) -> Option<u16> {
    let code = match c.to_ascii_lowercase() {
        'a' => 0,
        's' => 1,
        'd' => 2,
        'f' => 3,
        'h' => 4,
        'g' => 5,
        'z' => 6,
        'x' => 7,
        'c' => 8,
        'v' => 9,
        'b' => 11,
        'q' => 12,
        'w' => 13,
        'e' => 14,
        'r' => 15,
        'y' => 16,
        't' => 17,
        '1' => 18,
        '2' => 19,
        '3' => 20,
        '4' => 21,
        '6' => 22,
        '5' => 23,
        '=' => 24,
        '9' => 25,
        '7' => 26,
        '-' => 27,
        '8' => 28,
        '0' => 29,
        ']' => 30,
        'o' => 31,
        'u' => 32,
        '[' => 33,
        'i' => 34,
        'p' => 35,
        'l' => 37,
        'j' => 38,
        '\'' => 39,
        'k' => 40,
        ';' => 41,
        '\\' => 42,
        ',' => 43,
        '/' => 44,
        'n' => 45,
        'm' => 46,
        '.' => 47,
        '`' => 50,
        ' ' => 49,
        '\n' => 36,
        '\t' => 48,
        _ => return None,
    };
    Some(code)
}
