//! Synthetic-input backend boundary.

use crate::error::Result;
use crate::events::{Button, Key};

/// Executes key/pointer effects on the OS. Implemented per platform in
/// `platform`; tests substitute a scripted recorder.
pub trait InputBackend: Send + Sync {
    fn key_down(&self, key: &Key) -> Result<()>;
    fn key_up(&self, key: &Key) -> Result<()>;
    fn pointer_down(&self, x: i32, y: i32, button: &Button) -> Result<()>;
    fn pointer_up(&self, x: i32, y: i32, button: &Button) -> Result<()>;
    /// Relative scroll of `dy` units at the current pointer position.
    fn scroll(&self, dy: i32) -> Result<()>;
}
