//! End-to-end flows: store a macro, load it back, play it through the
//! engine, and cancel it from the kill switch.

use macrokit::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
struct CountingBackend {
    keys: AtomicUsize,
    pointer: AtomicUsize,
    scrolls: AtomicUsize,
}

impl InputBackend for CountingBackend {
    fn key_down(&self, _key: &Key) -> macrokit::Result<()> {
        self.keys.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn key_up(&self, _key: &Key) -> macrokit::Result<()> {
        self.keys.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn pointer_down(&self, _x: i32, _y: i32, _button: &Button) -> macrokit::Result<()> {
        self.pointer.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn pointer_up(&self, _x: i32, _y: i32, _button: &Button) -> macrokit::Result<()> {
        self.pointer.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn scroll(&self, _dy: i32) -> macrokit::Result<()> {
        self.scrolls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

fn sample_log(name: &str) -> RecordedMacro {
    let mut log = RecordedMacro::new(name);
    log.events = vec![
        MacroEvent::new(
            EventKind::KeyPress {
                key: Key::Char('a'),
            },
            ms(0),
        ),
        MacroEvent::new(
            EventKind::KeyRelease {
                key: Key::Char('a'),
            },
            ms(10),
        ),
        MacroEvent::new(
            EventKind::MouseClick {
                x: 40,
                y: 60,
                button: Button::Left,
                pressed: true,
            },
            ms(20),
        ),
        MacroEvent::new(
            EventKind::MouseClick {
                x: 40,
                y: 60,
                button: Button::Left,
                pressed: false,
            },
            ms(30),
        ),
        MacroEvent::new(
            EventKind::MouseScroll {
                x: 40,
                y: 60,
                dx: 0,
                dy: -2,
            },
            ms(40),
        ),
    ];
    log
}

#[test]
fn store_load_and_play_through_the_engine() {
    let dir = tempfile::tempdir().unwrap();
    let storage = MacroStorage::with_dir(dir.path()).unwrap();
    storage.save(&sample_log("smoke")).unwrap();

    let loaded = storage.load("smoke").unwrap();
    assert_eq!(loaded, sample_log("smoke"));

    let backend = Arc::new(CountingBackend::default());
    let engine = MacroEngine::new(backend.clone());
    engine.library().insert(loaded);

    engine
        .play("smoke", PlaybackOptions::default(), None)
        .unwrap();
    let summary = engine.wait_playback().unwrap().unwrap();

    assert_eq!(summary.outcome, macrokit::Outcome::Completed);
    assert_eq!(backend.keys.load(Ordering::SeqCst), 2);
    assert_eq!(backend.pointer.load(Ordering::SeqCst), 2);
    assert_eq!(backend.scrolls.load(Ordering::SeqCst), 1);
}

#[test]
fn kill_switch_cancels_engine_playback() {
    let backend = Arc::new(CountingBackend::default());
    let engine = MacroEngine::new(backend);
    engine.library().insert(sample_log("forever"));

    let kill = KillSwitch::install(engine.cancel_token());

    engine
        .play(
            "forever",
            PlaybackOptions {
                speed: 1.0,
                repeat: Repeat::Infinite,
            },
            None,
        )
        .unwrap();
    assert!(engine.is_playing());

    std::thread::sleep(ms(30));
    kill.engage();

    let summary = engine.wait_playback().unwrap().unwrap();
    assert_eq!(summary.outcome, macrokit::Outcome::Cancelled);
    assert!(!engine.is_playing());
}

#[test]
fn repeat_count_multiplies_dispatches() {
    let backend = Arc::new(CountingBackend::default());
    let engine = MacroEngine::new(backend.clone());
    engine.library().insert(sample_log("thrice"));

    engine
        .play(
            "thrice",
            PlaybackOptions {
                speed: 4.0,
                repeat: Repeat::Count(3),
            },
            None,
        )
        .unwrap();
    let summary = engine.wait_playback().unwrap().unwrap();

    assert_eq!(summary.outcome, macrokit::Outcome::Completed);
    assert_eq!(backend.keys.load(Ordering::SeqCst), 6);
    assert_eq!(backend.pointer.load(Ordering::SeqCst), 6);
    assert_eq!(backend.scrolls.load(Ordering::SeqCst), 3);
}
