//! Platform-specific input capture and injection.
//!
//! macOS is fully supported via a CGEventTap listener and CGEvent
//! injection. Other platforms get the no-op implementations: capture
//! start fails with `CaptureUnavailable` and every dispatch fails with
//! `DispatchFailed` (recovered per event by the player).

#[cfg(target_os = "macos")]
pub mod macos;

#[cfg(not(target_os = "macos"))]
pub mod noop;

#[cfg(target_os = "macos")]
pub use macos::{
    check_permissions, default_backend, request_permissions, spawn_capture, window_provider,
    HotkeyListener,
};

#[cfg(not(target_os = "macos"))]
pub use noop::{
    check_permissions, default_backend, request_permissions, spawn_capture, window_provider,
};
