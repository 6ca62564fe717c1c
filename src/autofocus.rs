//! Auto focus: watches background windows and pulls focus to the one
//! whose turn has started

use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::constants::scan;
use crate::detection::{DetectionMode, TurnDetector};
use crate::hotkeys::HotkeyTable;
use crate::input::ChordInjector;
use crate::registry::WindowRegistry;
use crate::ticker::Ticker;
use crate::types::{SurfaceProbe, TrackedWindow};

pub struct AutoFocus {
    ticker: Ticker,
    mode: DetectionMode,
    detector: TurnDetector,
    /// Window focused by the previous detection, skipped until another
    /// window takes a turn
    last_focused: Option<u32>,
    /// Window the current combat revolves around
    combat_pid: Option<u32>,
}

impl AutoFocus {
    pub fn new() -> Self {
        Self {
            ticker: Ticker::new(Duration::from_millis(scan::INTERVAL_MS)),
            mode: DetectionMode::default(),
            detector: TurnDetector::for_mode(DetectionMode::default(), &[]),
            last_focused: None,
            combat_pid: None,
        }
    }

    pub fn mode(&self) -> DetectionMode {
        self.mode
    }

    /// Swap detection strategies. Observations collected by the old
    /// strategy are discarded.
    pub fn set_mode(&mut self, mode: DetectionMode, windows: &[TrackedWindow]) {
        self.mode = mode;
        self.detector = TurnDetector::for_mode(mode, windows);
        info!(mode = mode.as_str(), "Auto focus mode set");
    }

    pub fn start(&mut self, now: Instant) {
        self.ticker.start(now);
        info!(mode = self.mode.as_str(), "Auto focus started");
    }

    pub fn stop(&mut self) {
        self.ticker.stop();
        if let Some(pid) = self.combat_pid.take() {
            debug!(pid = pid, "Dropping combat window");
        }
        info!("Auto focus stopped");
    }

    pub fn poll(&mut self, now: Instant) -> bool {
        self.ticker.poll(now)
    }

    pub fn next_due(&self) -> Option<Instant> {
        self.ticker.next_due()
    }

    /// One detection pass over the tracked windows.
    ///
    /// The foreground window and the previously focused window are
    /// skipped; the first remaining window whose turn is detected gets
    /// forced focus, and the pass ends there.
    pub fn run_detection<P: SurfaceProbe>(
        &mut self,
        probe: &P,
        registry: &WindowRegistry,
        foreground_pid: Option<u32>,
        table: &mut HotkeyTable,
        injector: &mut ChordInjector,
    ) {
        let windows = registry.windows();
        if windows.is_empty() {
            return;
        }
        // Only react while the user sits in one of the tracked windows
        let Some(foreground) = foreground_pid else {
            return;
        };

        for window in windows {
            if window.pid == foreground || Some(window.pid) == self.last_focused {
                continue;
            }
            if !self.detector.detect_turn(probe, windows, window) {
                continue;
            }

            info!(
                pid = window.pid,
                character = %window.character,
                "Turn detected, forcing focus"
            );
            self.last_focused = Some(window.pid);
            self.combat_pid = Some(window.pid);
            registry.force_focus(table, injector, window.pid);
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::pixel;
    use crate::hotkeys::{FORCE_FOCUS_CHORD, HotkeyAction};
    use crate::types::{Rgb, TrackedWindow, WindowRect, ZoneCapture, ZoneRect};
    use std::collections::HashMap;
    use x11rb::protocol::xproto::Window;

    /// Probe backed by per-window fill colors instead of a display
    struct FakeProbe {
        fills: HashMap<Window, Rgb>,
    }

    impl FakeProbe {
        fn new(fills: &[(Window, Rgb)]) -> Self {
            Self {
                fills: fills.iter().copied().collect(),
            }
        }
    }

    impl SurfaceProbe for FakeProbe {
        fn window_rect(&self, window: Window) -> Option<WindowRect> {
            self.fills.get(&window).map(|_| WindowRect {
                x: 0,
                y: 0,
                width: 2560,
                height: 1440,
            })
        }

        fn capture_zone(&self, window: Window, zone: ZoneRect) -> Option<ZoneCapture> {
            let fill = self.fills.get(&window)?;
            let pixels = usize::from(zone.width) * usize::from(zone.height);
            let mut data = Vec::with_capacity(pixels * 4);
            for _ in 0..pixels {
                data.extend_from_slice(&[fill.b, fill.g, fill.r, 0]);
            }
            Some(ZoneCapture {
                width: zone.width,
                height: zone.height,
                depth: 24,
                data,
            })
        }
    }

    fn candidate(pid: u32, window: Window, character: &str) -> TrackedWindow {
        TrackedWindow::new(
            pid,
            window,
            format!("{} - WAKFU 1.86", character),
            character.to_string(),
        )
    }

    fn registry_with(candidates: Vec<TrackedWindow>) -> WindowRegistry {
        let mut registry = WindowRegistry::new();
        registry.reconcile(candidates);
        registry
    }

    fn armed_pid(table: &HotkeyTable) -> Option<u32> {
        match table.lookup(&FORCE_FOCUS_CHORD) {
            Some(HotkeyAction::FocusWindow(pid)) => Some(pid),
            _ => None,
        }
    }

    #[test]
    fn test_pixel_turn_on_background_window_forces_focus() {
        let registry = registry_with(vec![candidate(1, 10, "Eni"), candidate(2, 20, "Iop")]);
        let probe = FakeProbe::new(&[
            (10, Rgb::new(200, 200, 200)),
            (20, pixel::TURN_COLORS[0]),
        ]);
        let mut autofocus = AutoFocus::new();
        let mut table = HotkeyTable::new();
        let mut injector = ChordInjector::disabled();

        autofocus.run_detection(&probe, &registry, Some(1), &mut table, &mut injector);
        assert_eq!(armed_pid(&table), Some(2));
    }

    #[test]
    fn test_foreground_window_is_never_scanned() {
        // The foreground window shows the banner but must not trigger
        let registry = registry_with(vec![candidate(1, 10, "Eni")]);
        let probe = FakeProbe::new(&[(10, pixel::TURN_COLORS[0])]);
        let mut autofocus = AutoFocus::new();
        let mut table = HotkeyTable::new();
        let mut injector = ChordInjector::disabled();

        autofocus.run_detection(&probe, &registry, Some(1), &mut table, &mut injector);
        assert_eq!(armed_pid(&table), None);
    }

    #[test]
    fn test_no_tracked_foreground_means_no_detection() {
        let registry = registry_with(vec![candidate(1, 10, "Eni"), candidate(2, 20, "Iop")]);
        let probe = FakeProbe::new(&[
            (10, pixel::TURN_COLORS[0]),
            (20, pixel::TURN_COLORS[0]),
        ]);
        let mut autofocus = AutoFocus::new();
        let mut table = HotkeyTable::new();
        let mut injector = ChordInjector::disabled();

        autofocus.run_detection(&probe, &registry, None, &mut table, &mut injector);
        assert_eq!(armed_pid(&table), None);
    }

    #[test]
    fn test_previous_target_is_skipped_until_another_turn() {
        let registry = registry_with(vec![
            candidate(1, 10, "Eni"),
            candidate(2, 20, "Iop"),
            candidate(3, 30, "Sram"),
        ]);
        let probe = FakeProbe::new(&[
            (10, Rgb::new(200, 200, 200)),
            (20, pixel::TURN_COLORS[0]),
            (30, pixel::TURN_COLORS[0]),
        ]);
        let mut autofocus = AutoFocus::new();
        let mut table = HotkeyTable::new();
        let mut injector = ChordInjector::disabled();

        // First pass lands on pid 2, the first background window in order
        autofocus.run_detection(&probe, &registry, Some(1), &mut table, &mut injector);
        assert_eq!(armed_pid(&table), Some(2));

        // Pid 2 still shows its banner but is debounced; pid 3 wins now
        autofocus.run_detection(&probe, &registry, Some(1), &mut table, &mut injector);
        assert_eq!(armed_pid(&table), Some(3));
    }

    #[test]
    fn test_first_matching_window_ends_the_pass() {
        let registry = registry_with(vec![
            candidate(1, 10, "Eni"),
            candidate(2, 20, "Iop"),
            candidate(3, 30, "Sram"),
        ]);
        let probe = FakeProbe::new(&[
            (10, Rgb::new(200, 200, 200)),
            (20, pixel::TURN_COLORS[0]),
            (30, pixel::TURN_COLORS[0]),
        ]);
        let mut autofocus = AutoFocus::new();
        let mut table = HotkeyTable::new();
        let mut injector = ChordInjector::disabled();

        autofocus.run_detection(&probe, &registry, Some(1), &mut table, &mut injector);
        // Only the first hit is armed even though two windows matched
        assert_eq!(armed_pid(&table), Some(2));
    }

    #[test]
    fn test_forced_window_in_foreground_does_not_retrigger() {
        let registry = registry_with(vec![candidate(1, 10, "Eni"), candidate(2, 20, "Iop")]);
        let probe = FakeProbe::new(&[
            (10, Rgb::new(200, 200, 200)),
            (20, pixel::TURN_COLORS[0]),
        ]);
        let mut autofocus = AutoFocus::new();
        let mut table = HotkeyTable::new();
        let mut injector = ChordInjector::disabled();

        autofocus.run_detection(&probe, &registry, Some(1), &mut table, &mut injector);
        assert_eq!(armed_pid(&table), Some(2));

        // The forced window now holds focus and still shows its banner.
        // A fresh table proves the next pass arms nothing at all
        let mut table = HotkeyTable::new();
        autofocus.run_detection(&probe, &registry, Some(2), &mut table, &mut injector);
        assert_eq!(armed_pid(&table), None);
    }

    #[test]
    fn test_window_name_mode_end_to_end() {
        let mut registry = registry_with(vec![candidate(1, 10, "Eni"), candidate(2, 20, "Iop")]);
        let probe = FakeProbe::new(&[]);
        let mut autofocus = AutoFocus::new();
        let mut table = HotkeyTable::new();
        let mut injector = ChordInjector::disabled();

        autofocus.set_mode(DetectionMode::WindowName, registry.windows());

        // Nothing changed yet
        autofocus.run_detection(&probe, &registry, Some(1), &mut table, &mut injector);
        assert_eq!(armed_pid(&table), None);

        // Pid 2's character label changes between scans
        registry.reconcile(vec![candidate(1, 10, "Eni"), candidate(2, 20, "Osa")]);
        autofocus.run_detection(&probe, &registry, Some(1), &mut table, &mut injector);
        assert_eq!(armed_pid(&table), Some(2));
    }

    #[test]
    fn test_mode_switch_reseeds_from_current_windows() {
        let registry = registry_with(vec![candidate(1, 10, "Eni"), candidate(2, 20, "Iop")]);
        let probe = FakeProbe::new(&[]);
        let mut autofocus = AutoFocus::new();
        let mut table = HotkeyTable::new();
        let mut injector = ChordInjector::disabled();

        autofocus.set_mode(DetectionMode::WindowName, &[]);
        autofocus.set_mode(DetectionMode::WindowName, registry.windows());

        // The second set_mode snapshot already contains both windows,
        // so nothing looks changed
        autofocus.run_detection(&probe, &registry, Some(1), &mut table, &mut injector);
        assert_eq!(armed_pid(&table), None);
    }

    #[test]
    fn test_ticker_gates_the_loop() {
        let mut autofocus = AutoFocus::new();
        let now = Instant::now();
        assert!(!autofocus.poll(now));

        autofocus.start(now);
        assert!(!autofocus.poll(now));
        assert!(autofocus.poll(now + Duration::from_millis(100)));

        autofocus.stop();
        assert!(!autofocus.poll(now + Duration::from_secs(1)));
    }
}
