//! Macro persistence - one JSON array of event records per file.
//!
//! The format carries a `type` discriminator per record and a float `time`
//! in seconds. Loading is forward-compatible: records with an unknown
//! discriminator are skipped with a warning instead of failing the file.

use crate::error::{Error, Result};
use crate::events::{MacroEvent, RecordedMacro, KNOWN_EVENT_TYPES};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Directory-backed macro store.
pub struct MacroStorage {
    dir: PathBuf,
}

impl MacroStorage {
    pub fn new() -> Result<Self> {
        let home = std::env::var_os("HOME")
            .map(PathBuf::from)
            .ok_or_else(|| Error::invalid_configuration("HOME not set"))?;
        Self::with_dir(home.join(".macrokit"))
    }

    pub fn with_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Save under `<sanitized name>.json`. Writes to a sibling temp file
    /// first and renames into place, so a failed save leaves no partial
    /// file.
    pub fn save(&self, log: &RecordedMacro) -> Result<PathBuf> {
        let path = self.dir.join(format!("{}.json", sanitize(&log.name)));
        let json = serde_json::to_string_pretty(&log.events)?;

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            Error::from(e)
        })?;
        fs::rename(&tmp, &path)?;

        info!(name = %log.name, path = %path.display(), "macro saved");
        Ok(path)
    }

    /// Load a macro by name or file name (with or without the `.json`
    /// extension). The name goes through the same sanitization as `save`,
    /// so a macro loads under the exact name it was saved with. The macro
    /// takes the file's base name.
    pub fn load(&self, file: &str) -> Result<RecordedMacro> {
        let stem = file.strip_suffix(".json").unwrap_or(file);
        load_path(self.dir.join(format!("{}.json", sanitize(stem))))
    }

    /// Saved macro names, sorted.
    pub fn list(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn delete(&self, name: &str) -> Result<()> {
        fs::remove_file(self.dir.join(format!("{}.json", sanitize(name))))?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }
}

/// Load a macro from an arbitrary path, skipping unknown record types.
pub fn load_path(path: impl AsRef<Path>) -> Result<RecordedMacro> {
    let path = path.as_ref();
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("unnamed")
        .to_string();

    let raw = fs::read_to_string(path)?;
    let records: Vec<serde_json::Value> = serde_json::from_str(&raw)?;

    let mut log = RecordedMacro::new(name);
    for record in records {
        let Some(kind) = record.get("type").and_then(|t| t.as_str()) else {
            return Err(Error::parse(format!(
                "record without a type discriminator in {}",
                path.display()
            )));
        };
        if !KNOWN_EVENT_TYPES.contains(&kind) {
            warn!(kind, "skipping record with unknown event type");
            continue;
        }
        let event: MacroEvent = serde_json::from_value(record)?;
        log.events.push(event);
    }
    Ok(log)
}

fn sanitize(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Session-scoped name -> macro map, shared-read/exclusive-write.
#[derive(Default)]
pub struct MacroLibrary {
    macros: RwLock<HashMap<String, Arc<RecordedMacro>>>,
}

impl MacroLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, log: RecordedMacro) -> Arc<RecordedMacro> {
        let log = Arc::new(log);
        self.macros.write().insert(log.name.clone(), log.clone());
        log
    }

    pub fn get(&self, name: &str) -> Option<Arc<RecordedMacro>> {
        self.macros.read().get(name).cloned()
    }

    pub fn remove(&self, name: &str) -> bool {
        self.macros.write().remove(name).is_some()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.macros.read().keys().cloned().collect();
        names.sort();
        names
    }
}
