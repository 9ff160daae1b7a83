//! Fallback for platforms without global input hooks.

use crate::backend::InputBackend;
use crate::error::{Error, Result};
use crate::events::{Button, Key, MacroEvent};
use crate::recorder::PermissionStatus;
use crate::window::WindowProvider;
use crossbeam_channel::Sender;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

pub fn check_permissions() -> PermissionStatus {
    PermissionStatus {
        input_monitoring: false,
    }
}

pub fn request_permissions() -> PermissionStatus {
    check_permissions()
}

pub fn spawn_capture(
    _tx: Sender<MacroEvent>,
    _stop: Arc<AtomicBool>,
    _t0: Instant,
) -> Result<Vec<thread::JoinHandle<()>>> {
    Err(Error::capture_unavailable(
        "global input hooks are not supported on this platform",
    ))
}

pub fn default_backend() -> Arc<dyn InputBackend> {
    Arc::new(NoopBackend)
}

pub fn window_provider() -> Option<Arc<dyn WindowProvider>> {
    None
}

/// Backend stub: every dispatch fails, and the player recovers per event.
pub struct NoopBackend;

impl InputBackend for NoopBackend {
    fn key_down(&self, key: &Key) -> Result<()> {
        Err(Error::dispatch_failed("key down", unsupported(key)))
    }

    fn key_up(&self, key: &Key) -> Result<()> {
        Err(Error::dispatch_failed("key up", unsupported(key)))
    }

    fn pointer_down(&self, _x: i32, _y: i32, button: &Button) -> Result<()> {
        Err(Error::dispatch_failed("pointer down", unsupported(button)))
    }

    fn pointer_up(&self, _x: i32, _y: i32, button: &Button) -> Result<()> {
        Err(Error::dispatch_failed("pointer up", unsupported(button)))
    }

    fn scroll(&self, dy: i32) -> Result<()> {
        Err(Error::dispatch_failed("scroll", unsupported(&dy)))
    }
}

fn unsupported(what: &dyn std::fmt::Display) -> String {
    format!("synthetic input unsupported on this platform ({})", what)
}
