//! Organizer: mirrors the OS foreground into the tracked list and
//! cycles between windows on global shortcuts

use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::constants::scan;
use crate::error::EngineError;
use crate::hotkeys::{
    DEFAULT_NEXT_CHORD, DEFAULT_PREVIOUS_CHORD, FORCE_FOCUS_CHORD, HotkeyAction, HotkeyTable,
    KeyChord,
};
use crate::registry::WindowRegistry;
use crate::ticker::Ticker;
use crate::types::TrackedWindow;
use crate::x11_utils::X11Context;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleDirection {
    Forward,
    Backward,
}

pub struct Organizer {
    ticker: Ticker,
    /// Tracked window last seen in the foreground
    active_pid: Option<u32>,
    next_chord: KeyChord,
    previous_chord: KeyChord,
    /// Whether the table entries for our chords are ours to remove
    bound_next: bool,
    bound_previous: bool,
}

impl Organizer {
    pub fn new() -> Self {
        Self {
            ticker: Ticker::new(Duration::from_millis(scan::INTERVAL_MS)),
            active_pid: None,
            next_chord: DEFAULT_NEXT_CHORD,
            previous_chord: DEFAULT_PREVIOUS_CHORD,
            bound_next: false,
            bound_previous: false,
        }
    }

    pub fn start(&mut self, now: Instant) {
        self.ticker.start(now);
        info!(
            next = %self.next_chord,
            previous = %self.previous_chord,
            "Organizer started"
        );
    }

    pub fn stop(&mut self, table: &mut HotkeyTable) {
        self.ticker.stop();
        self.active_pid = None;
        self.unregister_shortcuts(table);
        info!("Organizer stopped");
    }

    pub fn poll(&mut self, now: Instant) -> bool {
        self.ticker.poll(now)
    }

    pub fn next_due(&self) -> Option<Instant> {
        self.ticker.next_due()
    }

    /// One foreground-mirroring pass.
    ///
    /// The cycling shortcuts are registered only while a tracked window
    /// holds focus, so Tab keeps working normally everywhere else.
    pub fn refresh_active(
        &mut self,
        foreground_pid: Option<u32>,
        registry: &mut WindowRegistry,
        table: &mut HotkeyTable,
    ) {
        if let (Some(active), Some(foreground)) = (self.active_pid, foreground_pid) {
            if active == foreground {
                return;
            }
        }

        registry.clear_active_flags();

        if self.active_pid.is_none() && foreground_pid.is_none() {
            return;
        }

        self.active_pid = foreground_pid;
        match foreground_pid {
            None => {
                debug!("Focus left the tracked windows");
                self.unregister_shortcuts(table);
            }
            Some(pid) => {
                debug!(pid = pid, "Active window changed");
                registry.set_active(pid);
                self.register_shortcuts(table);
            }
        }
    }

    fn register_shortcuts(&mut self, table: &mut HotkeyTable) {
        if !self.bound_next && table.bind(self.next_chord, HotkeyAction::CycleNext) {
            self.bound_next = true;
        }
        if !self.bound_previous && table.bind(self.previous_chord, HotkeyAction::CyclePrevious) {
            self.bound_previous = true;
        }
    }

    /// Remove only the bindings this organizer installed
    fn unregister_shortcuts(&mut self, table: &mut HotkeyTable) {
        if self.bound_next {
            table.unbind(&self.next_chord);
            self.bound_next = false;
        }
        if self.bound_previous {
            table.unbind(&self.previous_chord);
            self.bound_previous = false;
        }
    }

    /// Replace the cycling chords. `None` keeps the current value.
    /// Active bindings move to the new chords in the same call.
    pub fn update_shortcuts(
        &mut self,
        next: Option<&str>,
        previous: Option<&str>,
        table: &mut HotkeyTable,
    ) -> Result<(), EngineError> {
        let next_chord = match next {
            Some(text) => Some(text.parse::<KeyChord>()?),
            None => None,
        };
        let previous_chord = match previous {
            Some(text) => Some(text.parse::<KeyChord>()?),
            None => None,
        };

        for chord in [next_chord, previous_chord].into_iter().flatten() {
            if chord == FORCE_FOCUS_CHORD {
                return Err(EngineError::ReservedShortcut(chord.to_string()));
            }
        }

        let was_bound = self.bound_next || self.bound_previous;
        self.unregister_shortcuts(table);

        if let Some(chord) = next_chord {
            self.next_chord = chord;
        }
        if let Some(chord) = previous_chord {
            self.previous_chord = chord;
        }
        if self.next_chord == self.previous_chord {
            warn!(chord = %self.next_chord, "Next and previous shortcuts are identical");
        }

        if was_bound {
            self.register_shortcuts(table);
        }

        info!(
            next = %self.next_chord,
            previous = %self.previous_chord,
            "Cycling shortcuts updated"
        );
        Ok(())
    }

    /// Move focus from the current foreground window to its neighbour
    pub fn cycle(&self, ctx: &X11Context, registry: &mut WindowRegistry, direction: CycleDirection) {
        let Some(foreground) = registry.foreground_pid(ctx) else {
            debug!("Cycle ignored, no tracked window focused");
            return;
        };
        let windows = registry.windows();
        let Some(start) = windows.iter().position(|window| window.pid == foreground) else {
            return;
        };
        let Some(target) = cycle_target(windows, start, direction) else {
            debug!("No other enabled window to cycle to");
            return;
        };
        let pid = windows[target].pid;
        registry.request_focus(ctx, pid);
    }
}

/// Index of the nearest enabled window from `start` in `direction`,
/// wrapping around the list. The start window itself never qualifies.
pub fn cycle_target(
    windows: &[TrackedWindow],
    start: usize,
    direction: CycleDirection,
) -> Option<usize> {
    if windows.is_empty() || start >= windows.len() {
        return None;
    }

    let mut index = start;
    loop {
        index = match direction {
            CycleDirection::Forward => (index + 1) % windows.len(),
            CycleDirection::Backward => index.checked_sub(1).unwrap_or(windows.len() - 1),
        };
        if index == start {
            return None;
        }
        if !windows[index].disabled {
            return Some(index);
        }
    }
}
