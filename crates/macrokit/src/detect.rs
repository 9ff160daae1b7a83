//! Screen-content detection boundary.
//!
//! The engine consumes detection (screenshot + template match + OCR) through
//! the [`Detector`] trait and never implements the matching itself. The
//! conditional-playback path in `player` is the only caller.

use crate::error::Result;
use crate::window::Region;
use image::RgbaImage;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

/// App-wide template acceptance threshold.
pub const MATCH_THRESHOLD: f32 = 0.8;

/// Screenshot capture, template matching and OCR, provided by a collaborator.
pub trait Detector: Send + Sync {
    /// Fresh screenshot of a screen region.
    fn screenshot(&self, region: Region) -> Result<RgbaImage>;

    /// Match confidence in `[0, 1]` for a registered template.
    fn match_template(&self, image: &RgbaImage, template: &str) -> Result<f32>;

    /// OCR the image and search for `pattern`; `Some` carries the capture
    /// groups of the first match.
    fn match_text(&self, image: &RgbaImage, pattern: &str) -> Result<Option<Vec<String>>>;
}

/// Name -> template image map, shared-read/exclusive-write.
///
/// Mirrors the on-disk `templates/` folder convention: each image file
/// registers under its lowercased base name.
#[derive(Default)]
pub struct TemplateRegistry {
    templates: RwLock<HashMap<String, RgbaImage>>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, name: impl Into<String>, image: RgbaImage) {
        self.templates.write().insert(name.into(), image);
    }

    pub fn remove(&self, name: &str) -> bool {
        self.templates.write().remove(name).is_some()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.templates.read().contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<RgbaImage> {
        self.templates.read().get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.templates.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Load every readable image in `dir`. Unreadable files are skipped with
    /// a warning. Returns how many templates were registered.
    pub fn load_dir(&self, dir: impl AsRef<Path>) -> Result<usize> {
        let mut loaded = 0;
        for entry in std::fs::read_dir(dir.as_ref())? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match image::open(&path) {
                Ok(img) => {
                    let name = name.to_lowercase();
                    info!(template = %name, "loaded template");
                    self.insert(name, img.to_rgba8());
                    loaded += 1;
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable template");
                }
            }
        }
        Ok(loaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank(w: u32, h: u32) -> RgbaImage {
        RgbaImage::new(w, h)
    }

    #[test]
    fn registry_insert_get_remove() {
        let reg = TemplateRegistry::new();
        assert!(!reg.contains("attack"));
        reg.insert("attack", blank(4, 4));
        assert!(reg.contains("attack"));
        assert_eq!(reg.get("attack").unwrap().dimensions(), (4, 4));
        assert_eq!(reg.names(), vec!["attack".to_string()]);
        assert!(reg.remove("attack"));
        assert!(!reg.remove("attack"));
    }

    #[test]
    fn load_dir_registers_by_lowercased_stem() {
        let dir = tempfile::tempdir().unwrap();
        blank(2, 2).save(dir.path().join("Attack.png")).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not an image").unwrap();

        let reg = TemplateRegistry::new();
        let n = reg.load_dir(dir.path()).unwrap();
        assert_eq!(n, 1);
        assert!(reg.contains("attack"));
    }
}
