//! Tracked Wakfu window list, reconciled against the desktop every scan

use anyhow::Result;
use tracing::{debug, info, warn};
use x11rb::protocol::xproto::Window;

use crate::hotkeys::{FORCE_FOCUS_CHORD, HotkeyAction, HotkeyTable};
use crate::input::ChordInjector;
use crate::types::TrackedWindow;
use crate::x11_utils::{self, X11Context};

/// Orders of the tracked set: scan order is newest first, and entries
/// keep their slot for as long as the client lives.
#[derive(Debug, Default)]
pub struct WindowRegistry {
    windows: Vec<TrackedWindow>,
}

impl WindowRegistry {
    pub fn new() -> Self {
        Self {
            windows: Vec::new(),
        }
    }

    pub fn windows(&self) -> &[TrackedWindow] {
        &self.windows
    }

    pub fn contains(&self, pid: u32) -> bool {
        self.windows.iter().any(|window| window.pid == pid)
    }

    /// Scan the desktop and fold the result into the tracked list
    pub fn refresh(&mut self, ctx: &X11Context) -> Result<()> {
        let candidates = x11_utils::scan_game_windows(ctx)?;
        if self.reconcile(candidates) {
            info!(count = self.windows.len(), "Window list changed");
            for window in &self.windows {
                debug!(
                    pid = window.pid,
                    character = %window.character,
                    title = %window.title,
                    "Tracking window"
                );
            }
        }
        Ok(())
    }

    /// Fold a fresh candidate list (newest first) into the tracked list.
    ///
    /// Surviving entries keep their position and their runtime flags;
    /// identity fields are refreshed from the candidate. New windows are
    /// appended in candidate order. Returns whether membership or any
    /// identity field changed.
    pub fn reconcile(&mut self, candidates: Vec<TrackedWindow>) -> bool {
        // Two candidates can carry the same pid while a client rebuilds
        // its frame; the newest one wins
        let mut deduped: Vec<TrackedWindow> = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if deduped.iter().any(|window| window.pid == candidate.pid) {
                debug!(pid = candidate.pid, "Dropping duplicate candidate");
                continue;
            }
            deduped.push(candidate);
        }

        let mut changed = false;
        let mut updated: Vec<TrackedWindow> = Vec::with_capacity(deduped.len());

        for old in &self.windows {
            let Some(candidate) = deduped.iter().find(|window| window.pid == old.pid) else {
                changed = true;
                continue;
            };

            if old.window != candidate.window
                || old.title != candidate.title
                || old.character != candidate.character
                || old.category != candidate.category
            {
                changed = true;
            }

            let mut kept = old.clone();
            kept.window = candidate.window;
            kept.title = candidate.title.clone();
            kept.character = candidate.character.clone();
            kept.category = candidate.category.clone();
            updated.push(kept);
        }

        for candidate in deduped {
            if self.contains(candidate.pid) {
                continue;
            }
            updated.push(candidate);
            changed = true;
        }

        if changed {
            self.windows = updated;
        }

        // A focus request only lives until the scan after it
        for window in &mut self.windows {
            window.pending_activation = false;
        }

        changed
    }

    /// Pid of the tracked window the WM reports as focused
    pub fn foreground_pid(&self, ctx: &X11Context) -> Option<u32> {
        let active = match x11_utils::active_window(ctx) {
            Ok(active) => active?,
            Err(e) => {
                warn!(error = %e, "Failed to resolve active window");
                return None;
            }
        };
        self.windows
            .iter()
            .find(|window| window.window == active)
            .map(|window| window.pid)
    }

    /// Record a focus request for `pid`, clearing any previous one.
    /// Returns the native handle when the request can go to the WM.
    pub fn mark_pending(&mut self, pid: u32) -> Option<Window> {
        if !self.contains(pid) {
            return None;
        }
        let mut handle = None;
        for window in &mut self.windows {
            window.pending_activation = window.pid == pid;
            if window.pid == pid {
                handle = Some(window.window);
            }
        }
        handle
    }

    /// Ask the WM to focus the window owned by `pid`
    pub fn request_focus(&mut self, ctx: &X11Context, pid: u32) {
        let Some(handle) = self.mark_pending(pid) else {
            debug!(pid = pid, "Focus request for untracked pid ignored");
            return;
        };
        if handle == x11rb::NONE {
            debug!(pid = pid, "No usable handle, focus request recorded only");
            return;
        }
        if let Err(e) = x11_utils::activate_window(ctx, handle) {
            warn!(pid = pid, error = %e, "Failed to activate window");
        }
    }

    /// Forced-focus maneuver: arm the reserved chord to focus `pid`,
    /// then synthesize that chord on the virtual keyboard.
    ///
    /// The WM only honors activation backed by recent user input; the
    /// injected chord supplies it, and the listener dispatches the
    /// armed action like any other hotkey.
    pub fn force_focus(&self, table: &mut HotkeyTable, injector: &mut ChordInjector, pid: u32) {
        if !self.contains(pid) {
            debug!(pid = pid, "Forced focus for untracked pid ignored");
            return;
        }

        // Re-arm rather than stack if a previous maneuver is in flight
        table.rebind(FORCE_FOCUS_CHORD, HotkeyAction::FocusWindow(pid));
        info!(pid = pid, chord = %FORCE_FOCUS_CHORD, "Armed forced-focus chord");

        if let Err(e) = injector.press(FORCE_FOCUS_CHORD) {
            warn!(pid = pid, error = %e, "Failed to inject forced-focus chord");
        }
    }

    /// Exclude or include a window in shortcut cycling.
    /// Returns false when the pid is not tracked.
    pub fn set_disabled(&mut self, pid: u32, disabled: bool) -> bool {
        match self.windows.iter_mut().find(|window| window.pid == pid) {
            Some(window) => {
                window.disabled = disabled;
                true
            }
            None => false,
        }
    }

    pub fn clear_active_flags(&mut self) {
        for window in &mut self.windows {
            window.is_active = false;
        }
    }

    pub fn set_active(&mut self, pid: u32) {
        for window in &mut self.windows {
            window.is_active = window.pid == pid;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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

    #[test]
    fn test_first_scan_adopts_candidate_order() {
        let mut registry = WindowRegistry::new();
        let changed = registry.reconcile(vec![candidate(2, 20, "Iop"), candidate(1, 10, "Eni")]);
        assert!(changed);
        let pids: Vec<u32> = registry.windows().iter().map(|w| w.pid).collect();
        assert_eq!(pids, vec![2, 1]);
    }

    #[test]
    fn test_unchanged_scan_reports_no_change() {
        let mut registry = registry_with(vec![candidate(1, 10, "Eni"), candidate(2, 20, "Iop")]);
        let changed = registry.reconcile(vec![candidate(1, 10, "Eni"), candidate(2, 20, "Iop")]);
        assert!(!changed);
    }

    #[test]
    fn test_survivors_keep_position_when_new_window_appears() {
        let mut registry = registry_with(vec![candidate(1, 10, "Eni"), candidate(2, 20, "Iop")]);
        // A new client lands at the front of the scan order
        let changed = registry.reconcile(vec![
            candidate(3, 30, "Sram"),
            candidate(1, 10, "Eni"),
            candidate(2, 20, "Iop"),
        ]);
        assert!(changed);
        let pids: Vec<u32> = registry.windows().iter().map(|w| w.pid).collect();
        assert_eq!(pids, vec![1, 2, 3]);
    }

    #[test]
    fn test_closed_window_is_dropped() {
        let mut registry = registry_with(vec![candidate(1, 10, "Eni"), candidate(2, 20, "Iop")]);
        let changed = registry.reconcile(vec![candidate(2, 20, "Iop")]);
        assert!(changed);
        let pids: Vec<u32> = registry.windows().iter().map(|w| w.pid).collect();
        assert_eq!(pids, vec![2]);
    }

    #[test]
    fn test_title_change_updates_entry_in_place() {
        let mut registry = registry_with(vec![candidate(1, 10, "Eni"), candidate(2, 20, "Iop")]);
        registry.set_disabled(1, true);

        let changed = registry.reconcile(vec![candidate(1, 10, "Osa"), candidate(2, 20, "Iop")]);
        assert!(changed);
        let first = &registry.windows()[0];
        assert_eq!(first.pid, 1);
        assert_eq!(first.character, "Osa");
        // Runtime flags survive the identity refresh
        assert!(first.disabled);
    }

    #[test]
    fn test_window_handle_refresh_counts_as_change() {
        let mut registry = registry_with(vec![candidate(1, 10, "Eni")]);
        let changed = registry.reconcile(vec![candidate(1, 99, "Eni")]);
        assert!(changed);
        assert_eq!(registry.windows()[0].window, 99);
    }

    #[test]
    fn test_duplicate_pid_keeps_newest_candidate() {
        let mut registry = WindowRegistry::new();
        registry.reconcile(vec![candidate(1, 99, "Eni"), candidate(1, 10, "Eni")]);
        assert_eq!(registry.windows().len(), 1);
        assert_eq!(registry.windows()[0].window, 99);
    }

    #[test]
    fn test_refresh_clears_pending_even_without_changes() {
        let mut registry = registry_with(vec![candidate(1, 10, "Eni")]);
        registry.mark_pending(1);
        assert!(registry.windows()[0].pending_activation);

        let changed = registry.reconcile(vec![candidate(1, 10, "Eni")]);
        assert!(!changed);
        assert!(!registry.windows()[0].pending_activation);
    }

    #[test]
    fn test_mark_pending_clears_previous_request() {
        let mut registry = registry_with(vec![candidate(1, 10, "Eni"), candidate(2, 20, "Iop")]);
        registry.mark_pending(1);
        registry.mark_pending(2);
        let pending: Vec<u32> = registry
            .windows()
            .iter()
            .filter(|w| w.pending_activation)
            .map(|w| w.pid)
            .collect();
        assert_eq!(pending, vec![2]);
    }

    #[test]
    fn test_mark_pending_unknown_pid_is_ignored() {
        let mut registry = registry_with(vec![candidate(1, 10, "Eni")]);
        assert_eq!(registry.mark_pending(99), None);
        assert!(!registry.windows()[0].pending_activation);
    }

    #[test]
    fn test_force_focus_arms_reserved_chord() {
        let registry = registry_with(vec![candidate(1, 10, "Eni"), candidate(2, 20, "Iop")]);
        let mut table = HotkeyTable::new();
        let mut injector = ChordInjector::disabled();

        registry.force_focus(&mut table, &mut injector, 2);
        assert_eq!(
            table.lookup(&FORCE_FOCUS_CHORD),
            Some(HotkeyAction::FocusWindow(2))
        );
    }

    #[test]
    fn test_force_focus_rearms_instead_of_stacking() {
        let registry = registry_with(vec![candidate(1, 10, "Eni"), candidate(2, 20, "Iop")]);
        let mut table = HotkeyTable::new();
        let mut injector = ChordInjector::disabled();

        registry.force_focus(&mut table, &mut injector, 1);
        registry.force_focus(&mut table, &mut injector, 2);
        assert_eq!(
            table.lookup(&FORCE_FOCUS_CHORD),
            Some(HotkeyAction::FocusWindow(2))
        );
    }

    #[test]
    fn test_force_focus_untracked_pid_does_not_arm() {
        let registry = registry_with(vec![candidate(1, 10, "Eni")]);
        let mut table = HotkeyTable::new();
        let mut injector = ChordInjector::disabled();

        registry.force_focus(&mut table, &mut injector, 99);
        assert_eq!(table.lookup(&FORCE_FOCUS_CHORD), None);
    }

    #[test]
    fn test_set_disabled_unknown_pid_returns_false() {
        let mut registry = registry_with(vec![candidate(1, 10, "Eni")]);
        assert!(!registry.set_disabled(99, true));
        assert!(registry.set_disabled(1, true));
        assert!(registry.windows()[0].disabled);
    }

    #[test]
    fn test_set_active_is_exclusive() {
        let mut registry = registry_with(vec![candidate(1, 10, "Eni"), candidate(2, 20, "Iop")]);
        registry.set_active(1);
        registry.set_active(2);
        let active: Vec<u32> = registry
            .windows()
            .iter()
            .filter(|w| w.is_active)
            .map(|w| w.pid)
            .collect();
        assert_eq!(active, vec![2]);

        registry.clear_active_flags();
        assert!(registry.windows().iter().all(|w| !w.is_active));
    }
}
