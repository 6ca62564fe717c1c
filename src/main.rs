#![forbid(unsafe_code)]

mod autofocus;
mod config;
mod constants;
mod detection;
mod engine;
mod error;
mod hotkeys;
mod input;
mod organizer;
mod registry;
mod ticker;
mod types;
mod x11_utils;

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::{Duration, Instant};
use tracing::{error, info, warn, Level as TraceLevel};
use tracing_subscriber::FmtSubscriber;

use config::Settings;
use engine::Engine;
use input::ChordInjector;
use x11_utils::X11Context;

#[derive(Parser, Debug)]
#[command(
    name = "wakfu-l-focus",
    version,
    about = "Turn auto-focus and window cycling for multi-account Wakfu on X11"
)]
struct Args {
    /// Path to the config file (defaults to the user config directory)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log level: trace, debug, info, warn or error (overrides LOG_LEVEL)
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Print the detected Wakfu windows and exit
    #[arg(long)]
    list_windows: bool,

    /// Log chords instead of injecting them on a virtual keyboard
    #[arg(long)]
    dry_run: bool,

    /// Exclude windows of these characters from cycling at startup
    #[arg(long = "disable-character", value_name = "NAME")]
    disable_characters: Vec<String>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Parse log level from flag or environment variable
    let log_level = match args
        .log_level
        .clone()
        .or_else(|| std::env::var("LOG_LEVEL").ok())
        .unwrap_or_else(|| "info".to_string())
        .to_lowercase()
        .as_str()
    {
        "trace" => TraceLevel::TRACE,
        "debug" => TraceLevel::DEBUG,
        "warn" => TraceLevel::WARN,
        "error" => TraceLevel::ERROR,
        _ => TraceLevel::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let ctx = X11Context::new()?;

    if args.list_windows {
        return list_windows(&ctx);
    }

    let mut settings = match &args.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    };
    info!(
        auto_focus = settings.auto_focus,
        mode = %settings.auto_focus_mode,
        organizer = settings.organizer,
        "Loaded settings"
    );

    // The virtual keyboard must exist before the listener threads scan
    // /dev/input, or injected chords would go unheard
    let injector = if args.dry_run {
        info!("Dry run, chord injection disabled");
        ChordInjector::disabled()
    } else {
        match ChordInjector::new() {
            Ok(injector) => injector,
            Err(e) => {
                error!(error = %e, "Failed to create virtual keyboard");
                error!(path = %constants::paths::DEV_UINPUT, "Forced focus needs write access to uinput");
                warn!(continuing = true, "Continuing without chord injection...");
                ChordInjector::disabled()
            }
        }
    };

    // Create channel for hotkey threads -> main loop
    let (hotkey_tx, hotkey_rx) = mpsc::channel();

    // Spawn hotkey listener (optional - skip if permissions denied)
    let _listener_handles = if hotkeys::check_permissions() {
        match hotkeys::spawn_listener(hotkey_tx.clone()) {
            Ok(handles) => {
                info!("Hotkey support enabled");
                Some(handles)
            }
            Err(e) => {
                error!("Failed to start hotkey listener: {}", e);
                hotkeys::print_permission_error();
                None
            }
        }
    } else {
        hotkeys::print_permission_error();
        None
    };

    let shutdown = Arc::new(AtomicBool::new(false));
    let toggle_focus = Arc::new(AtomicBool::new(false));
    let toggle_organizer = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&shutdown))?;
    signal_hook::flag::register(signal_hook::consts::SIGTERM, Arc::clone(&shutdown))?;
    signal_hook::flag::register(signal_hook::consts::SIGUSR1, Arc::clone(&toggle_focus))?;
    signal_hook::flag::register(signal_hook::consts::SIGUSR2, Arc::clone(&toggle_organizer))?;

    let now = Instant::now();
    let mut engine = Engine::new(injector, now);
    engine.initial_scan(&ctx);
    engine.apply_settings(&settings, now);

    for character in &args.disable_characters {
        let pids: Vec<u32> = engine
            .windows()
            .iter()
            .filter(|window| window.character == *character)
            .map(|window| window.pid)
            .collect();
        if pids.is_empty() {
            warn!(character = %character, "No window found for character, nothing to disable");
        }
        for pid in pids {
            engine.set_window_disabled(pid, true);
        }
    }

    info!(mode = engine.mode(), "Engine running (SIGUSR1 toggles auto focus, SIGUSR2 the organizer)");

    loop {
        if shutdown.swap(false, Ordering::Relaxed) {
            info!("Shutdown signal received");
            break;
        }
        if toggle_focus.swap(false, Ordering::Relaxed) {
            let enabled = settings.toggle_auto_focus();
            if enabled {
                engine.start_auto_focus(Instant::now());
            } else {
                engine.stop_auto_focus();
            }
            info!(enabled = enabled, "Auto focus toggled");
        }
        if toggle_organizer.swap(false, Ordering::Relaxed) {
            let enabled = settings.toggle_organizer();
            if enabled {
                engine.start_organizer(Instant::now());
            } else {
                engine.stop_organizer();
            }
            info!(enabled = enabled, "Organizer toggled");
        }

        // Sleep on the chord channel until the next loop is due
        let now = Instant::now();
        let timeout = engine
            .next_deadline()
            .map(|deadline| deadline.saturating_duration_since(now))
            .unwrap_or(Duration::from_millis(constants::scan::INTERVAL_MS));

        match hotkey_rx.recv_timeout(timeout) {
            Ok(chord) => engine.dispatch(&ctx, chord),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                error!("Hotkey channel closed");
                break;
            }
        }

        engine.poll(&ctx, Instant::now());
    }

    engine.shutdown();
    Ok(())
}

fn list_windows(ctx: &X11Context) -> Result<(), Box<dyn std::error::Error>> {
    let windows = x11_utils::scan_game_windows(ctx)?;
    if windows.is_empty() {
        println!("No Wakfu windows found");
        return Ok(());
    }
    for window in &windows {
        println!(
            "pid={} window=0x{:x} character={:?} title={:?}",
            window.pid, window.window, window.character, window.title
        );
    }
    Ok(())
}
