//! macrokit CLI

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use macrokit::prelude::*;
use macrokit::platform;
use macrokit::player::Outcome;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mk")]
#[command(about = "macrokit - Record and replay keyboard/mouse macros")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start recording (Ctrl+C to stop)
    Record {
        /// Macro name; defaults to a timestamped name
        #[arg(short, long)]
        name: Option<String>,

        /// Screen region to ignore pointer events in, as X,Y,WIDTH,HEIGHT
        #[arg(long, value_parser = parse_region)]
        ignore_region: Option<Region>,
    },

    /// Play a saved macro
    Play {
        /// Macro file
        file: String,

        /// Playback speed (1.0 = realtime, 2.0 = 2x)
        #[arg(short, long, default_value = "1.0")]
        speed: f64,

        /// Number of passes
        #[arg(short, long, default_value = "1")]
        repeat: u32,

        /// Loop until cancelled (overrides --repeat)
        #[arg(long)]
        infinite: bool,
    },

    /// List saved macros
    List,

    /// Show macro info
    Show {
        /// Macro file
        file: String,

        /// Print every event
        #[arg(long)]
        all: bool,
    },

    /// Delete a macro
    Delete {
        /// Macro file
        file: String,
    },

    /// List on-screen windows
    Windows,

    /// Check permissions
    Permissions {
        /// Request if not granted
        #[arg(long)]
        request: bool,
    },
}

fn parse_region(s: &str) -> Result<Region, String> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    if parts.len() != 4 {
        return Err("expected X,Y,WIDTH,HEIGHT".to_string());
    }
    let num = |i: usize| parts[i].parse().map_err(|_| format!("bad number '{}'", parts[i]));
    Ok(Region {
        x: num(0)?,
        y: num(1)?,
        width: parts[2].parse().map_err(|_| format!("bad number '{}'", parts[2]))?,
        height: parts[3].parse().map_err(|_| format!("bad number '{}'", parts[3]))?,
    })
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Record {
            name,
            ignore_region,
        } => {
            let name = name.unwrap_or_else(|| {
                format!("macro_{}", chrono::Local::now().format("%Y%m%d_%H%M%S"))
            });
            record(&name, ignore_region)?;
        }
        Commands::Play {
            file,
            speed,
            repeat,
            infinite,
        } => {
            play(&file, speed, repeat, infinite)?;
        }
        Commands::List => {
            list()?;
        }
        Commands::Show { file, all } => {
            show(&file, all)?;
        }
        Commands::Delete { file } => {
            delete(&file)?;
        }
        Commands::Windows => {
            windows()?;
        }
        Commands::Permissions { request } => {
            permissions(request)?;
        }
    }

    Ok(())
}

fn record(name: &str, ignore_region: Option<Region>) -> Result<()> {
    let recorder = MacroRecorder::with_config(RecorderConfig {
        ignore_region,
        ..Default::default()
    });

    let perms = recorder.check_permissions();
    if !perms.input_monitoring {
        eprintln!("Input Monitoring permission required.");
        platform::request_permissions();
        return Ok(());
    }

    println!("Recording: {} (Ctrl+C to stop)", name);

    let (mut log, handle) = recorder.start(name)?;

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    let mut count = 0;
    while running.load(Ordering::SeqCst) && handle.is_running() {
        handle.drain(&mut log);
        if log.events.len() != count {
            count = log.events.len();
            print!("\r{} events", count);
            io::stdout().flush()?;
        }
        std::thread::sleep(std::time::Duration::from_millis(50));
    }

    handle.stop(&mut log);
    println!("\n{} events recorded", log.events.len());

    let storage = MacroStorage::new()?;
    let path = storage.save(&log)?;
    println!("Saved: {}", path.display());

    Ok(())
}

fn play(file: &str, speed: f64, repeat: u32, infinite: bool) -> Result<()> {
    let storage = MacroStorage::new()?;
    let log = storage.load(file)?;

    let options = PlaybackOptions {
        speed,
        repeat: if infinite {
            Repeat::Infinite
        } else {
            Repeat::Count(repeat)
        },
    };

    let kill = KillSwitch::install(CancelToken::new());
    let token = kill.token();
    let t = token.clone();
    ctrlc::set_handler(move || {
        t.cancel();
    })?;

    println!(
        "Playing {} ({} events) at {}x speed (Esc or Ctrl+C to stop)...",
        log.name,
        log.events.len(),
        speed
    );
    println!("Starting in 2 seconds...");
    std::thread::sleep(std::time::Duration::from_secs(2));

    let player = Player::new(platform::default_backend());
    let summary = player
        .run(&log, &options, &token)
        .with_context(|| format!("cannot play '{}'", file))?;

    match summary.outcome {
        Outcome::Completed => println!("Done!"),
        Outcome::Cancelled => println!("Stopped."),
    }
    let s = &summary.stats;
    println!(
        "{} keys, {} clicks, {} scrolls, {} skipped, {} failed",
        s.keys, s.clicks, s.scrolls, s.skipped, s.failed
    );

    Ok(())
}

fn list() -> Result<()> {
    let storage = MacroStorage::new()?;
    let files = storage.list()?;

    if files.is_empty() {
        println!("No macros saved.");
    } else {
        for f in files {
            println!("{}", f);
        }
    }

    Ok(())
}

fn show(file: &str, all: bool) -> Result<()> {
    let storage = MacroStorage::new()?;
    let log = storage.load(file)?;

    println!("Name: {}", log.name);
    println!("Events: {}", log.events.len());
    if let Some(last) = log.events.last() {
        println!("Duration: {:.1}s", last.t.as_secs_f64());
    }

    let mut key_presses = 0;
    let mut key_releases = 0;
    let mut clicks = 0;
    let mut scrolls = 0;
    let mut conditionals = 0;

    for e in &log.events {
        match &e.kind {
            EventKind::KeyPress { .. } => key_presses += 1,
            EventKind::KeyRelease { .. } => key_releases += 1,
            EventKind::MouseClick { .. } => clicks += 1,
            EventKind::MouseScroll { .. } => scrolls += 1,
            EventKind::Conditional { .. } => conditionals += 1,
        }
    }

    println!("\nSummary:");
    println!("  Key presses: {}", key_presses);
    println!("  Key releases: {}", key_releases);
    println!("  Clicks: {}", clicks);
    println!("  Scrolls: {}", scrolls);
    println!("  Conditionals: {}", conditionals);

    if all {
        println!("\nEvents:");
        for (i, e) in log.events.iter().enumerate() {
            println!("{}: {:.3}s {:?}", i, e.t.as_secs_f64(), e.kind);
        }
    }

    Ok(())
}

fn delete(file: &str) -> Result<()> {
    let storage = MacroStorage::new()?;
    storage.delete(file)?;
    println!("Deleted: {}", file);
    Ok(())
}

fn windows() -> Result<()> {
    let provider = platform::window_provider()
        .ok_or_else(|| anyhow!("window enumeration is not supported on this platform"))?;

    let windows = provider.list_windows();
    if windows.is_empty() {
        println!("No windows found.");
    } else {
        for w in windows {
            let b = w.bounds;
            println!("{} [{},{} {}x{}]", w.title, b.x, b.y, b.width, b.height);
        }
    }

    Ok(())
}

fn permissions(request: bool) -> Result<()> {
    let perms = if request {
        platform::request_permissions()
    } else {
        platform::check_permissions()
    };

    println!(
        "Input Monitoring: {}",
        if perms.input_monitoring { "OK" } else { "DENIED" }
    );

    if !perms.input_monitoring && !request {
        println!("\nRun with --request to request permissions");
    }

    Ok(())
}
