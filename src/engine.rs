//! Engine: owns every moving part and drives them cooperatively
//!
//! All state lives on the main thread. The loop in main polls the
//! engine with the current instant and forwards chords from the
//! keyboard listener threads; nothing in here blocks.

use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::autofocus::AutoFocus;
use crate::config::Settings;
use crate::constants::scan;
use crate::detection::DetectionMode;
use crate::error::EngineError;
use crate::hotkeys::{HotkeyAction, HotkeyTable, KeyChord};
use crate::input::ChordInjector;
use crate::organizer::{CycleDirection, Organizer};
use crate::registry::WindowRegistry;
use crate::ticker::Ticker;
use crate::types::TrackedWindow;
use crate::x11_utils::X11Context;

pub struct Engine {
    registry: WindowRegistry,
    autofocus: AutoFocus,
    organizer: Organizer,
    table: HotkeyTable,
    injector: ChordInjector,
    /// Window scanning runs for the engine's whole lifetime
    scan_ticker: Ticker,
}

impl Engine {
    pub fn new(injector: ChordInjector, now: Instant) -> Self {
        let mut scan_ticker = Ticker::new(Duration::from_millis(scan::INTERVAL_MS));
        scan_ticker.start(now);

        Self {
            registry: WindowRegistry::new(),
            autofocus: AutoFocus::new(),
            organizer: Organizer::new(),
            table: HotkeyTable::new(),
            injector,
            scan_ticker,
        }
    }

    /// Populate the registry before the loop starts
    pub fn initial_scan(&mut self, ctx: &X11Context) {
        if let Err(e) = self.registry.refresh(ctx) {
            warn!(error = %e, "Initial window scan failed");
        }
        info!(count = self.registry.windows().len(), "Initial window scan complete");
    }

    /// Apply persisted settings at startup
    pub fn apply_settings(&mut self, settings: &Settings, now: Instant) {
        if let Err(e) = self.set_mode(&settings.auto_focus_mode) {
            warn!(mode = %settings.auto_focus_mode, error = %e, "Ignoring persisted auto focus mode");
        }
        if let Err(e) = self.update_shortcuts(
            Some(&settings.shortcuts.next_window),
            Some(&settings.shortcuts.previous_window),
        ) {
            warn!(error = %e, "Ignoring persisted shortcuts");
        }
        if settings.auto_focus {
            self.start_auto_focus(now);
        }
        if settings.organizer {
            self.start_organizer(now);
        }
    }

    /// Run every loop whose tick is due
    pub fn poll(&mut self, ctx: &X11Context, now: Instant) {
        if self.scan_ticker.poll(now) {
            if let Err(e) = self.registry.refresh(ctx) {
                // Keep the previous snapshot; the next scan may succeed
                warn!(error = %e, "Window scan failed");
            }
        }

        if self.autofocus.poll(now) {
            let foreground = self.registry.foreground_pid(ctx);
            self.autofocus.run_detection(
                ctx,
                &self.registry,
                foreground,
                &mut self.table,
                &mut self.injector,
            );
        }

        if self.organizer.poll(now) {
            let foreground = self.registry.foreground_pid(ctx);
            self.organizer
                .refresh_active(foreground, &mut self.registry, &mut self.table);
        }
    }

    /// Resolve a chord pressed anywhere on the desktop
    pub fn dispatch(&mut self, ctx: &X11Context, chord: KeyChord) {
        let Some(action) = self.table.lookup(&chord) else {
            return;
        };
        debug!(chord = %chord, action = ?action, "Dispatching hotkey");

        match action {
            HotkeyAction::CycleNext => {
                self.organizer
                    .cycle(ctx, &mut self.registry, CycleDirection::Forward)
            }
            HotkeyAction::CyclePrevious => {
                self.organizer
                    .cycle(ctx, &mut self.registry, CycleDirection::Backward)
            }
            HotkeyAction::FocusWindow(pid) => self.registry.request_focus(ctx, pid),
        }
    }

    /// Earliest instant any loop wants to run
    pub fn next_deadline(&self) -> Option<Instant> {
        [
            self.scan_ticker.next_due(),
            self.autofocus.next_due(),
            self.organizer.next_due(),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    pub fn start_auto_focus(&mut self, now: Instant) {
        self.autofocus.start(now);
    }

    pub fn stop_auto_focus(&mut self) {
        self.autofocus.stop();
    }

    pub fn start_organizer(&mut self, now: Instant) {
        self.organizer.start(now);
    }

    pub fn stop_organizer(&mut self) {
        self.organizer.stop(&mut self.table);
    }

    pub fn set_mode(&mut self, mode: &str) -> Result<(), EngineError> {
        let mode: DetectionMode = mode.parse()?;
        self.autofocus.set_mode(mode, self.registry.windows());
        Ok(())
    }

    pub fn mode(&self) -> &'static str {
        self.autofocus.mode().as_str()
    }

    pub fn update_shortcuts(
        &mut self,
        next: Option<&str>,
        previous: Option<&str>,
    ) -> Result<(), EngineError> {
        self.organizer.update_shortcuts(next, previous, &mut self.table)
    }

    /// Exclude or include a window in shortcut cycling.
    /// Returns false when the pid is not tracked.
    pub fn set_window_disabled(&mut self, pid: u32, disabled: bool) -> bool {
        let known = self.registry.set_disabled(pid, disabled);
        if known {
            info!(pid = pid, disabled = disabled, "Window cycling flag updated");
        } else {
            debug!(pid = pid, "Disable request for untracked pid ignored");
        }
        known
    }

    pub fn windows(&self) -> &[TrackedWindow] {
        self.registry.windows()
    }

    pub fn shutdown(&mut self) {
        self.organizer.stop(&mut self.table);
        self.autofocus.stop();
        self.scan_ticker.stop();
        info!("Engine stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> Engine {
        Engine::new(ChordInjector::disabled(), Instant::now())
    }

    #[test]
    fn test_set_mode_rejects_unknown_mode() {
        let mut engine = engine();
        assert_eq!(engine.mode(), "PIXEL");
        assert!(engine.set_mode("WINDOW_NAME").is_ok());
        assert_eq!(engine.mode(), "WINDOW_NAME");

        let result = engine.set_mode("TURBO");
        assert_eq!(result, Err(EngineError::InvalidMode("TURBO".to_string())));
        // The active mode is untouched by the rejected switch
        assert_eq!(engine.mode(), "WINDOW_NAME");
    }

    #[test]
    fn test_update_shortcuts_propagates_reserved_error() {
        let mut engine = engine();
        let result = engine.update_shortcuts(Some("Control+F11"), None);
        assert!(matches!(result, Err(EngineError::ReservedShortcut(_))));
    }

    #[test]
    fn test_scan_deadline_is_always_armed() {
        let engine = engine();
        assert!(engine.next_deadline().is_some());
    }

    #[test]
    fn test_deadline_tracks_the_earliest_loop() {
        let now = Instant::now();
        let mut engine = Engine::new(ChordInjector::disabled(), now);
        let scan_deadline = engine.next_deadline().unwrap();

        // A loop started later than the scan cannot move the deadline up
        engine.start_auto_focus(now + Duration::from_millis(50));
        assert_eq!(engine.next_deadline(), Some(scan_deadline));
    }

    #[test]
    fn test_set_window_disabled_without_windows() {
        let mut engine = engine();
        assert!(!engine.set_window_disabled(1, true));
        assert!(engine.windows().is_empty());
    }

    #[test]
    fn test_settings_drive_startup_state() {
        let mut engine = engine();
        let mut settings = Settings::default();
        settings.auto_focus = true;
        settings.auto_focus_mode = "WINDOW_NAME".to_string();

        engine.apply_settings(&settings, Instant::now());
        assert_eq!(engine.mode(), "WINDOW_NAME");
        assert!(engine.autofocus.next_due().is_some());
        // Organizer stays off by default
        assert_eq!(engine.organizer.next_due(), None);
    }
}
