//! Global input capture into an ordered, timestamped macro log.
//!
//! One keyboard listener and one pointer listener run on capture-owned
//! threads and feed a bounded channel; the handle moves events into the log,
//! filtering out the user's clicks on the tool's own window.

use crate::error::Result;
use crate::events::{EventKind, MacroEvent, RecordedMacro};
use crate::platform;
use crate::window::Region;
use crossbeam_channel::{bounded, Receiver};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tracing::{debug, info};

/// Recorder configuration.
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// The automation tool's own window bounds. Pointer-button events whose
    /// coordinates fall inside are dropped (self-click suppression).
    pub ignore_region: Option<Region>,
    /// Capture channel capacity; callbacks drop events beyond it rather
    /// than block.
    pub max_buffer: usize,
}

impl RecorderConfig {
    pub fn new() -> Self {
        Self {
            ignore_region: None,
            max_buffer: 10_000,
        }
    }
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// OS capture permission state.
#[derive(Debug, Clone)]
pub struct PermissionStatus {
    pub input_monitoring: bool,
}

/// Installs the global listeners and hands out recording sessions.
pub struct MacroRecorder {
    config: RecorderConfig,
}

impl MacroRecorder {
    pub fn new() -> Self {
        Self::with_config(RecorderConfig::new())
    }

    pub fn with_config(config: RecorderConfig) -> Self {
        Self { config }
    }

    pub fn check_permissions(&self) -> PermissionStatus {
        platform::check_permissions()
    }

    /// Arm capture. Fails with `CaptureUnavailable` if the OS hooks cannot
    /// be installed, leaving no partial state behind.
    pub fn start(&self, name: impl Into<String>) -> Result<(RecordedMacro, RecordingHandle)> {
        let log = RecordedMacro::new(name);
        let (tx, rx) = bounded::<MacroEvent>(self.config.max_buffer.max(1));
        let stop = Arc::new(AtomicBool::new(false));
        let t0 = Instant::now();

        let threads = platform::spawn_capture(tx, stop.clone(), t0)?;
        info!(name = %log.name, "recording started");

        Ok((
            log,
            RecordingHandle {
                stop,
                events_rx: rx,
                threads,
                ignore_region: self.config.ignore_region,
            },
        ))
    }
}

impl Default for MacroRecorder {
    fn default() -> Self {
        Self::new()
    }
}

/// Owns one recording session: the stop flag, the capture threads and the
/// channel they feed.
pub struct RecordingHandle {
    stop: Arc<AtomicBool>,
    events_rx: Receiver<MacroEvent>,
    threads: Vec<thread::JoinHandle<()>>,
    ignore_region: Option<Region>,
}

impl RecordingHandle {
    /// Move captured events into the log. Applies self-click suppression
    /// and keeps timestamps non-decreasing across the two listener threads.
    pub fn drain(&self, log: &mut RecordedMacro) {
        while let Ok(ev) = self.events_rx.try_recv() {
            self.append(log, ev);
        }
    }

    /// Uninstall the listeners, collect the remaining events and join the
    /// capture threads.
    pub fn stop(self, log: &mut RecordedMacro) {
        self.stop.store(true, Ordering::SeqCst);
        while let Ok(ev) = self.events_rx.try_recv() {
            self.append(log, ev);
        }
        for t in self.threads {
            let _ = t.join();
        }
        info!(name = %log.name, events = log.len(), "recording stopped");
    }

    pub fn is_running(&self) -> bool {
        !self.stop.load(Ordering::Relaxed)
    }

    fn append(&self, log: &mut RecordedMacro, mut ev: MacroEvent) {
        if !should_record(&ev, self.ignore_region.as_ref()) {
            debug!(?ev, "suppressed self-click");
            return;
        }
        // The keyboard and pointer threads stamp independently; clamp so
        // the log stays non-decreasing in append order.
        if let Some(last) = log.events.last() {
            if ev.t < last.t {
                ev.t = last.t;
            }
        }
        log.events.push(ev);
    }
}

/// Detached session for exercising coordinator state without OS hooks.
#[cfg(test)]
pub(crate) fn test_session(
    name: &str,
) -> (
    RecordedMacro,
    RecordingHandle,
    crossbeam_channel::Sender<MacroEvent>,
) {
    let (tx, rx) = bounded(64);
    (
        RecordedMacro::new(name),
        RecordingHandle {
            stop: Arc::new(AtomicBool::new(false)),
            events_rx: rx,
            threads: Vec::new(),
            ignore_region: None,
        },
        tx,
    )
}

/// Self-click suppression: drop pointer-button events aimed at the tool's
/// own window.
fn should_record(ev: &MacroEvent, ignore: Option<&Region>) -> bool {
    match (&ev.kind, ignore) {
        (EventKind::MouseClick { x, y, .. }, Some(region)) => !region.contains(*x, *y),
        _ => true,
    }
}
