//! Target-window boundary: title enumeration and screen bounds.

use serde::{Deserialize, Serialize};

/// Rectangular screen region in absolute coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn contains(&self, px: i32, py: i32) -> bool {
        px >= self.x
            && py >= self.y
            && px < self.x + self.width as i32
            && py < self.y + self.height as i32
    }
}

/// A top-level window as seen by the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowInfo {
    pub title: String,
    pub bounds: Region,
}

/// Enumerates top-level windows and resolves a title to screen bounds.
/// Consumed by screenshot cropping and self-click suppression; the engine
/// never implements it itself.
pub trait WindowProvider: Send + Sync {
    fn list_windows(&self) -> Vec<WindowInfo>;

    fn resolve(&self, title: &str) -> Option<Region> {
        self.list_windows()
            .into_iter()
            .find(|w| w.title == title)
            .map(|w| w.bounds)
    }
}
