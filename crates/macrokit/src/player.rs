//! Speed-scaled, cancellable replay of a recorded macro.
//!
//! Replays events strictly in recorded order, sleeping the recorded
//! inter-event gap divided by the speed multiplier. Cancellation is
//! cooperative: the token is polled per event (and between repeat passes),
//! so a signal is honored within at most one inter-event sleep.

use crate::backend::InputBackend;
use crate::detect::{Detector, MATCH_THRESHOLD};
use crate::error::{Error, Result};
use crate::events::{EventKind, Key, RecordedMacro};
use crate::killswitch::CancelToken;
use crate::window::Region;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Repeat policy for one playback session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repeat {
    Count(u32),
    Infinite,
}

/// Per-session playback parameters.
#[derive(Debug, Clone, Copy)]
pub struct PlaybackOptions {
    /// Time-scale divisor; 2.0 plays twice as fast. Must be > 0.
    pub speed: f64,
    pub repeat: Repeat,
}

impl Default for PlaybackOptions {
    fn default() -> Self {
        Self {
            speed: 1.0,
            repeat: Repeat::Count(1),
        }
    }
}

impl PlaybackOptions {
    /// Rejects bad parameters before a session starts; playback itself
    /// never re-validates.
    pub fn validate(&self, log: &RecordedMacro) -> Result<()> {
        if !self.speed.is_finite() || self.speed <= 0.0 {
            return Err(Error::invalid_configuration(format!(
                "playback speed must be positive, got {}",
                self.speed
            )));
        }
        if let Repeat::Count(0) = self.repeat {
            return Err(Error::invalid_configuration(
                "repeat count must be at least 1",
            ));
        }
        if log.is_empty() {
            return Err(Error::invalid_configuration(format!(
                "macro '{}' has no events",
                log.name
            )));
        }
        Ok(())
    }
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Cancelled,
}

/// Dispatch counters for one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaybackStats {
    pub keys: usize,
    pub clicks: usize,
    pub scrolls: usize,
    /// Conditional events whose condition was not satisfied.
    pub skipped: usize,
    /// Events whose dispatch failed and was recovered.
    pub failed: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct PlaybackSummary {
    pub outcome: Outcome,
    pub stats: PlaybackStats,
}

/// Replays macro logs against a synthetic-input backend, optionally gating
/// conditional events through a detector aimed at the target window.
pub struct Player {
    backend: Arc<dyn InputBackend>,
    detector: Option<Arc<dyn Detector>>,
    target: Option<Region>,
}

impl Player {
    pub fn new(backend: Arc<dyn InputBackend>) -> Self {
        Self {
            backend,
            detector: None,
            target: None,
        }
    }

    pub fn with_detector(mut self, detector: Arc<dyn Detector>, target: Region) -> Self {
        self.detector = Some(detector);
        self.target = Some(target);
        self
    }

    /// Run the session on the calling thread. Emits exactly one terminal
    /// log line per invocation.
    pub fn run(
        &self,
        log: &RecordedMacro,
        options: &PlaybackOptions,
        token: &CancelToken,
    ) -> Result<PlaybackSummary> {
        options.validate(log)?;
        Ok(self.run_validated(log, options, token))
    }

    /// Run on a dedicated worker thread. Validation errors surface here,
    /// synchronously, before the thread starts.
    pub fn spawn(
        self,
        log: Arc<RecordedMacro>,
        options: PlaybackOptions,
        token: CancelToken,
    ) -> Result<PlaybackHandle> {
        options.validate(&log)?;
        // A stale kill-switch signal from an earlier session must not abort
        // this one before it begins.
        token.reset();

        let playing = Arc::new(AtomicBool::new(true));
        let playing2 = playing.clone();
        let token2 = token.clone();
        let thread = thread::spawn(move || {
            let summary = self.run_validated(&log, &options, &token2);
            playing2.store(false, Ordering::SeqCst);
            summary
        });

        Ok(PlaybackHandle {
            token,
            playing,
            thread,
        })
    }

    fn run_validated(
        &self,
        log: &RecordedMacro,
        options: &PlaybackOptions,
        token: &CancelToken,
    ) -> PlaybackSummary {
        let mut stats = PlaybackStats::default();
        let mut held: Vec<Key> = Vec::new();
        let mut pass = 0u32;

        let outcome = 'session: loop {
            if token.is_cancelled() {
                break Outcome::Cancelled;
            }
            match options.repeat {
                Repeat::Count(n) if pass >= n => break Outcome::Completed,
                _ => {}
            }

            let mut prev = Duration::ZERO;
            for ev in &log.events {
                if token.is_cancelled() {
                    break 'session Outcome::Cancelled;
                }
                let delay = ev.t.saturating_sub(prev).div_f64(options.speed);
                if !delay.is_zero() {
                    thread::sleep(delay);
                }
                // A skipped event still advances the timeline.
                prev = ev.t;
                if token.is_cancelled() {
                    break 'session Outcome::Cancelled;
                }
                self.step(&ev.kind, &mut stats, &mut held);
            }
            pass += 1;
        };

        if outcome == Outcome::Cancelled && !held.is_empty() {
            // Do not leave keys stuck down mid-macro.
            for key in held.drain(..) {
                if let Err(e) = self.backend.key_up(&key) {
                    warn!(key = %key, error = %e, "forced key release failed");
                }
            }
        }

        match outcome {
            Outcome::Completed => info!(name = %log.name, "playback finished"),
            Outcome::Cancelled => info!(name = %log.name, "playback stopped by user"),
        }

        PlaybackSummary { outcome, stats }
    }

    fn step(&self, kind: &EventKind, stats: &mut PlaybackStats, held: &mut Vec<Key>) {
        if let EventKind::Conditional {
            template,
            pattern,
            event,
        } = kind
        {
            if self.condition_holds(template.as_deref(), pattern.as_deref()) {
                self.step(event, stats, held);
            } else {
                stats.skipped += 1;
                debug!(?template, ?pattern, "condition not satisfied, skipping event");
            }
            return;
        }

        let result = match kind {
            EventKind::KeyPress { key } => {
                let r = self.backend.key_down(key);
                if r.is_ok() {
                    stats.keys += 1;
                    if !held.contains(key) {
                        held.push(key.clone());
                    }
                }
                r
            }
            EventKind::KeyRelease { key } => {
                let r = self.backend.key_up(key);
                if r.is_ok() {
                    stats.keys += 1;
                    held.retain(|k| k != key);
                }
                r
            }
            EventKind::MouseClick {
                x,
                y,
                button,
                pressed,
            } => {
                let r = if *pressed {
                    self.backend.pointer_down(*x, *y, button)
                } else {
                    self.backend.pointer_up(*x, *y, button)
                };
                if r.is_ok() {
                    stats.clicks += 1;
                }
                r
            }
            EventKind::MouseScroll { dy, .. } => {
                let r = self.backend.scroll(*dy);
                if r.is_ok() {
                    stats.scrolls += 1;
                }
                r
            }
            EventKind::Conditional { .. } => unreachable!("handled above"),
        };

        // A single bad event never aborts the run.
        if let Err(e) = result {
            stats.failed += 1;
            warn!(error = %e, "event dispatch failed, continuing");
        }
    }

    /// All specified conditions must hold; a detection failure counts as
    /// not satisfied.
    fn condition_holds(&self, template: Option<&str>, pattern: Option<&str>) -> bool {
        let (Some(detector), Some(target)) = (self.detector.as_ref(), self.target) else {
            warn!("conditional event without a configured detector; skipping");
            return false;
        };
        let shot = match detector.screenshot(target) {
            Ok(img) => img,
            Err(e) => {
                warn!(error = %e, "screenshot failed");
                return false;
            }
        };
        if let Some(name) = template {
            match detector.match_template(&shot, name) {
                Ok(confidence) if confidence >= MATCH_THRESHOLD => {}
                Ok(confidence) => {
                    debug!(template = name, confidence, "template below threshold");
                    return false;
                }
                Err(e) => {
                    warn!(template = name, error = %e, "template match failed");
                    return false;
                }
            }
        }
        if let Some(pattern) = pattern {
            match detector.match_text(&shot, pattern) {
                Ok(Some(_)) => {}
                Ok(None) => {
                    debug!(pattern, "text pattern not found");
                    return false;
                }
                Err(e) => {
                    warn!(pattern, error = %e, "text match failed");
                    return false;
                }
            }
        }
        true
    }
}

/// One live playback session on its worker thread.
pub struct PlaybackHandle {
    token: CancelToken,
    playing: Arc<AtomicBool>,
    thread: thread::JoinHandle<PlaybackSummary>,
}

impl PlaybackHandle {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    pub fn join(self) -> Result<PlaybackSummary> {
        self.thread
            .join()
            .map_err(|_| Error::new(crate::error::ErrorCode::Unknown, "playback thread panicked"))
    }

    /// Cancel and wait for the worker to wind down.
    pub fn stop(self) -> Result<PlaybackSummary> {
        self.token.cancel();
        self.join()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Button, MacroEvent, NamedKey};
    use image::RgbaImage;
    use parking_lot::Mutex;
    use std::time::Instant;

    /// Scripted backend that records every dispatch with its offset from
    /// construction time.
    #[derive(Default)]
    struct ScriptedBackend {
        calls: Mutex<Vec<(String, Duration)>>,
        started: Option<Instant>,
        fail_keys: bool,
    }

    impl ScriptedBackend {
        fn timed() -> Self {
            Self {
                started: Some(Instant::now()),
                ..Default::default()
            }
        }

        fn record(&self, what: String) {
            let t = self
                .started
                .map(|s| s.elapsed())
                .unwrap_or(Duration::ZERO);
            self.calls.lock().push((what, t));
        }

        fn names(&self) -> Vec<String> {
            self.calls.lock().iter().map(|(n, _)| n.clone()).collect()
        }

        fn offsets(&self) -> Vec<Duration> {
            self.calls.lock().iter().map(|(_, t)| *t).collect()
        }
    }

    impl InputBackend for ScriptedBackend {
        fn key_down(&self, key: &Key) -> Result<()> {
            if self.fail_keys {
                return Err(Error::dispatch_failed("key down", "unmapped key"));
            }
            self.record(format!("down {}", key));
            Ok(())
        }

        fn key_up(&self, key: &Key) -> Result<()> {
            if self.fail_keys {
                return Err(Error::dispatch_failed("key up", "unmapped key"));
            }
            self.record(format!("up {}", key));
            Ok(())
        }

        fn pointer_down(&self, x: i32, y: i32, button: &Button) -> Result<()> {
            self.record(format!("pdown {} {} {}", x, y, button));
            Ok(())
        }

        fn pointer_up(&self, x: i32, y: i32, button: &Button) -> Result<()> {
            self.record(format!("pup {} {} {}", x, y, button));
            Ok(())
        }

        fn scroll(&self, dy: i32) -> Result<()> {
            self.record(format!("scroll {}", dy));
            Ok(())
        }
    }

    /// Detector with a fixed template confidence and no text matches.
    struct FixedDetector {
        confidence: f32,
    }

    impl Detector for FixedDetector {
        fn screenshot(&self, _region: Region) -> Result<RgbaImage> {
            Ok(RgbaImage::new(8, 8))
        }

        fn match_template(&self, _image: &RgbaImage, _template: &str) -> Result<f32> {
            Ok(self.confidence)
        }

        fn match_text(&self, _image: &RgbaImage, _pattern: &str) -> Result<Option<Vec<String>>> {
            Ok(None)
        }
    }

    fn key_press(k: char, t_ms: u64) -> MacroEvent {
        MacroEvent::new(
            EventKind::KeyPress { key: Key::Char(k) },
            Duration::from_millis(t_ms),
        )
    }

    fn key_release(k: char, t_ms: u64) -> MacroEvent {
        MacroEvent::new(
            EventKind::KeyRelease { key: Key::Char(k) },
            Duration::from_millis(t_ms),
        )
    }

    fn log_of(events: Vec<MacroEvent>) -> RecordedMacro {
        RecordedMacro {
            name: "test".to_string(),
            events,
        }
    }

    fn opts(speed: f64, repeat: Repeat) -> PlaybackOptions {
        PlaybackOptions { speed, repeat }
    }

    #[test]
    fn rejects_bad_configuration_up_front() {
        let backend = Arc::new(ScriptedBackend::default());
        let player = Player::new(backend);
        let log = log_of(vec![key_press('a', 0)]);

        for bad in [0.0, -1.0, f64::NAN] {
            let err = player
                .run(&log, &opts(bad, Repeat::Count(1)), &CancelToken::new())
                .unwrap_err();
            assert_eq!(err.code, crate::error::ErrorCode::InvalidConfiguration);
        }

        let err = player
            .run(&log, &opts(1.0, Repeat::Count(0)), &CancelToken::new())
            .unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::InvalidConfiguration);

        let err = player
            .run(
                &log_of(vec![]),
                &opts(1.0, Repeat::Count(1)),
                &CancelToken::new(),
            )
            .unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::InvalidConfiguration);
    }

    #[test]
    fn reproduces_inter_event_gaps() {
        let backend = Arc::new(ScriptedBackend::timed());
        let player = Player::new(backend.clone());
        let log = log_of(vec![
            key_press('a', 0),
            key_release('a', 80),
            key_press('b', 200),
        ]);

        let summary = player
            .run(&log, &opts(1.0, Repeat::Count(1)), &CancelToken::new())
            .unwrap();
        assert_eq!(summary.outcome, Outcome::Completed);

        let offsets = backend.offsets();
        assert_eq!(offsets.len(), 3);
        // Scheduler tolerance: sleeps only ever overshoot.
        assert!(offsets[0] < Duration::from_millis(40));
        let gap1 = offsets[1] - offsets[0];
        let gap2 = offsets[2] - offsets[1];
        assert!(gap1 >= Duration::from_millis(80) && gap1 < Duration::from_millis(160));
        assert!(gap2 >= Duration::from_millis(120) && gap2 < Duration::from_millis(220));
    }

    #[test]
    fn doubling_speed_halves_the_gaps() {
        let backend = Arc::new(ScriptedBackend::timed());
        let player = Player::new(backend.clone());
        let log = log_of(vec![key_press('a', 0), key_release('a', 160)]);

        player
            .run(&log, &opts(2.0, Repeat::Count(1)), &CancelToken::new())
            .unwrap();

        let offsets = backend.offsets();
        let gap = offsets[1] - offsets[0];
        assert!(gap >= Duration::from_millis(80) && gap < Duration::from_millis(150));
    }

    #[test]
    fn fixed_count_dispatches_every_pass() {
        let backend = Arc::new(ScriptedBackend::default());
        let player = Player::new(backend.clone());
        let log = log_of(vec![key_press('a', 0), key_release('a', 1)]);

        let summary = player
            .run(&log, &opts(1.0, Repeat::Count(3)), &CancelToken::new())
            .unwrap();

        assert_eq!(summary.outcome, Outcome::Completed);
        assert_eq!(summary.stats.keys, 6);
        assert_eq!(backend.names().len(), 6);
    }

    #[test]
    fn infinite_repeat_stops_on_cancellation() {
        let backend = Arc::new(ScriptedBackend::default());
        let player = Player::new(backend);
        let log = log_of(vec![key_press('a', 0), key_release('a', 20)]);
        let token = CancelToken::new();

        let handle = player
            .spawn(Arc::new(log), opts(1.0, Repeat::Infinite), token)
            .unwrap();

        thread::sleep(Duration::from_millis(60));
        let started = Instant::now();
        handle.cancel();
        let summary = handle.join().unwrap();

        assert_eq!(summary.outcome, Outcome::Cancelled);
        // Bounded latency: one inter-event sleep plus slack.
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn cancellation_force_releases_held_keys() {
        let backend = Arc::new(ScriptedBackend::default());
        let player = Player::new(backend.clone());
        // Press with the matching release far enough away that the cancel
        // lands in between.
        let log = log_of(vec![key_press('a', 0), key_release('a', 400)]);
        let token = CancelToken::new();

        let handle = player
            .spawn(Arc::new(log), opts(1.0, Repeat::Count(1)), token)
            .unwrap();
        thread::sleep(Duration::from_millis(50));
        let summary = handle.stop().unwrap();

        assert_eq!(summary.outcome, Outcome::Cancelled);
        assert_eq!(backend.names(), vec!["down 'a'", "up 'a'"]);
    }

    #[test]
    fn unsatisfied_condition_skips_dispatch_but_advances_time() {
        let backend = Arc::new(ScriptedBackend::timed());
        let detector = Arc::new(FixedDetector { confidence: 0.2 });
        let player =
            Player::new(backend.clone()).with_detector(detector, Region::new(0, 0, 100, 100));

        let gated = MacroEvent::new(
            EventKind::Conditional {
                template: Some("attack".to_string()),
                pattern: None,
                event: Box::new(EventKind::MouseClick {
                    x: 5,
                    y: 5,
                    button: Button::Left,
                    pressed: true,
                }),
            },
            Duration::from_millis(100),
        );
        let log = log_of(vec![gated, key_press('x', 150)]);

        let summary = player
            .run(&log, &opts(1.0, Repeat::Count(1)), &CancelToken::new())
            .unwrap();

        assert_eq!(summary.stats.skipped, 1);
        assert_eq!(summary.stats.clicks, 0);
        assert_eq!(summary.stats.keys, 1);
        // The skipped event's timestamp still anchors the next delay: the
        // key lands ~150ms in, not ~50ms.
        let offsets = backend.offsets();
        assert_eq!(offsets.len(), 1);
        assert!(offsets[0] >= Duration::from_millis(150));
    }

    #[test]
    fn satisfied_condition_dispatches_the_inner_event() {
        let backend = Arc::new(ScriptedBackend::default());
        let detector = Arc::new(FixedDetector { confidence: 0.95 });
        let player =
            Player::new(backend.clone()).with_detector(detector, Region::new(0, 0, 100, 100));

        let gated = MacroEvent::new(
            EventKind::Conditional {
                template: Some("attack".to_string()),
                pattern: None,
                event: Box::new(EventKind::MouseClick {
                    x: 5,
                    y: 5,
                    button: Button::Left,
                    pressed: true,
                }),
            },
            Duration::ZERO,
        );
        let summary = player
            .run(
                &log_of(vec![gated]),
                &opts(1.0, Repeat::Count(1)),
                &CancelToken::new(),
            )
            .unwrap();

        assert_eq!(summary.stats.clicks, 1);
        assert_eq!(summary.stats.skipped, 0);
        assert_eq!(backend.names(), vec!["pdown 5 5 Button.left"]);
    }

    #[test]
    fn dispatch_failures_do_not_abort_the_run() {
        let backend = Arc::new(ScriptedBackend {
            fail_keys: true,
            ..Default::default()
        });
        let player = Player::new(backend.clone());
        let log = log_of(vec![
            key_press('a', 0),
            MacroEvent::new(
                EventKind::MouseScroll {
                    x: 0,
                    y: 0,
                    dx: 0,
                    dy: -2,
                },
                Duration::from_millis(1),
            ),
        ]);

        let summary = player
            .run(&log, &opts(1.0, Repeat::Count(1)), &CancelToken::new())
            .unwrap();

        assert_eq!(summary.outcome, Outcome::Completed);
        assert_eq!(summary.stats.failed, 1);
        assert_eq!(summary.stats.scrolls, 1);
        assert_eq!(backend.names(), vec!["scroll -2"]);
    }
}
