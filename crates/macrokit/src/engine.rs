//! Session coordinator.
//!
//! Owns the recorder state, the at-most-one playback session, the macro
//! library and the template registry, and enforces the exclusivity rules:
//! recording and playback never run together, and starting a new playback
//! first cancels any prior one.

use crate::backend::InputBackend;
use crate::detect::{Detector, TemplateRegistry};
use crate::error::{Error, Result};
use crate::events::RecordedMacro;
use crate::killswitch::CancelToken;
use crate::player::{PlaybackHandle, PlaybackOptions, PlaybackSummary, Player};
use crate::recorder::{MacroRecorder, RecorderConfig, RecordingHandle};
use crate::storage::MacroLibrary;
use crate::window::Region;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Default)]
struct SessionState {
    recording: Option<(RecordedMacro, RecordingHandle)>,
    playback: Option<PlaybackHandle>,
}

pub struct MacroEngine {
    backend: Arc<dyn InputBackend>,
    detector: Option<Arc<dyn Detector>>,
    recorder_config: RecorderConfig,
    library: Arc<MacroLibrary>,
    templates: Arc<TemplateRegistry>,
    cancel: CancelToken,
    state: Mutex<SessionState>,
}

impl MacroEngine {
    pub fn new(backend: Arc<dyn InputBackend>) -> Self {
        Self {
            backend,
            detector: None,
            recorder_config: RecorderConfig::new(),
            library: Arc::new(MacroLibrary::new()),
            templates: Arc::new(TemplateRegistry::new()),
            cancel: CancelToken::new(),
            state: Mutex::new(SessionState::default()),
        }
    }

    pub fn with_detector(mut self, detector: Arc<dyn Detector>) -> Self {
        self.detector = Some(detector);
        self
    }

    pub fn with_recorder_config(mut self, config: RecorderConfig) -> Self {
        self.recorder_config = config;
        self
    }

    /// The shared cancellation token; hand this to the kill switch.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn library(&self) -> &MacroLibrary {
        &self.library
    }

    pub fn templates(&self) -> &TemplateRegistry {
        &self.templates
    }

    /// Arm the recorder. An active playback session is cancelled first;
    /// an active recording is rejected.
    pub fn start_recording(&self, name: impl Into<String>) -> Result<()> {
        let mut state = self.state.lock();
        if state.recording.is_some() {
            return Err(Error::busy("a recording session is already active"));
        }
        if let Some(handle) = state.playback.take() {
            info!("cancelling active playback before recording");
            let _ = handle.stop();
        }

        let recorder = MacroRecorder::with_config(self.recorder_config.clone());
        let session = recorder.start(name)?;
        state.recording = Some(session);
        Ok(())
    }

    /// Disarm the recorder and register the captured log in the library.
    /// Calling with no active recording is a no-op returning `None`.
    pub fn stop_recording(&self) -> Result<Option<Arc<RecordedMacro>>> {
        let mut state = self.state.lock();
        let Some((mut log, handle)) = state.recording.take() else {
            return Ok(None);
        };
        handle.stop(&mut log);
        Ok(Some(self.library.insert(log)))
    }

    /// Events captured so far, draining the capture channel.
    pub fn recorded_so_far(&self) -> Option<usize> {
        let mut state = self.state.lock();
        let (log, handle) = state.recording.as_mut()?;
        handle.drain(log);
        Some(log.len())
    }

    pub fn is_recording(&self) -> bool {
        self.state.lock().recording.is_some()
    }

    /// Start playback of a library macro on a worker thread. Rejected while
    /// recording; an already-running playback session is cancelled and
    /// joined first.
    pub fn play(
        &self,
        name: &str,
        options: PlaybackOptions,
        target: Option<Region>,
    ) -> Result<()> {
        let log = self.library.get(name).ok_or_else(|| {
            Error::invalid_configuration(format!("no macro named '{}'", name))
        })?;
        self.play_log(log, options, target)
    }

    pub fn play_log(
        &self,
        log: Arc<RecordedMacro>,
        options: PlaybackOptions,
        target: Option<Region>,
    ) -> Result<()> {
        let mut state = self.state.lock();
        if state.recording.is_some() {
            return Err(Error::busy("recording in progress; stop it before playback"));
        }
        if let Some(prior) = state.playback.take() {
            info!("cancelling prior playback session");
            let _ = prior.stop();
        }

        let mut player = Player::new(self.backend.clone());
        match (self.detector.clone(), target) {
            (Some(detector), Some(region)) => {
                player = player.with_detector(detector, region);
            }
            (None, Some(_)) => {
                warn!("target window set but no detector configured; conditions will not match");
            }
            _ => {}
        }

        let handle = player.spawn(log, options, self.cancel.clone())?;
        state.playback = Some(handle);
        Ok(())
    }

    /// Cancel and join the active playback session, if any.
    pub fn stop_playback(&self) -> Result<Option<PlaybackSummary>> {
        let handle = self.state.lock().playback.take();
        match handle {
            Some(h) => Ok(Some(h.stop()?)),
            None => Ok(None),
        }
    }

    /// Wait for the active playback session to finish on its own.
    pub fn wait_playback(&self) -> Result<Option<PlaybackSummary>> {
        let handle = self.state.lock().playback.take();
        match handle {
            Some(h) => Ok(Some(h.join()?)),
            None => Ok(None),
        }
    }

    pub fn is_playing(&self) -> bool {
        let mut state = self.state.lock();
        match &state.playback {
            Some(h) if h.is_playing() => true,
            Some(_) => {
                // Worker already exited; reap the handle.
                if let Some(h) = state.playback.take() {
                    let _ = h.join();
                }
                false
            }
            None => false,
        }
    }

    /// Kill-switch path: cancel playback and drop any active recording.
    pub fn abort_all(&self) {
        self.cancel.cancel();
        let mut state = self.state.lock();
        if let Some(h) = state.playback.take() {
            let _ = h.stop();
        }
        if let Some((mut log, handle)) = state.recording.take() {
            handle.stop(&mut log);
            warn!(events = log.len(), "recording aborted by kill switch");
        }
    }
}
