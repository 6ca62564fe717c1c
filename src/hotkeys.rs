use anyhow::{Context, Result};
use evdev::{Device, EventType, InputEventKind, Key};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::mpsc::Sender;
use std::thread;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::constants::{input, paths, permissions};

/// Chord reserved for the forced-focus maneuver. Arming and injection
/// both read this value so the two sides can never drift apart.
pub const FORCE_FOCUS_CHORD: KeyChord = KeyChord {
    control: true,
    alt: false,
    shift: false,
    super_key: false,
    key: Key::KEY_F11,
};

/// Default chord for cycling to the next window
pub const DEFAULT_NEXT_CHORD: KeyChord = KeyChord {
    control: false,
    alt: false,
    shift: false,
    super_key: false,
    key: Key::KEY_TAB,
};

/// Default chord for cycling to the previous window
pub const DEFAULT_PREVIOUS_CHORD: KeyChord = KeyChord {
    control: true,
    alt: false,
    shift: false,
    super_key: false,
    key: Key::KEY_TAB,
};

/// One key plus modifier state, the unit every hotkey is keyed on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyChord {
    pub control: bool,
    pub alt: bool,
    pub shift: bool,
    pub super_key: bool,
    pub key: Key,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChordParseError {
    #[error("empty shortcut")]
    Empty,

    #[error("unknown modifier '{0}' in shortcut")]
    UnknownModifier(String),

    #[error("unknown key '{0}' in shortcut")]
    UnknownKey(String),
}

impl FromStr for KeyChord {
    type Err = ChordParseError;

    /// Parse shortcut strings like "Tab", "Control+Tab" or "Control+F11".
    /// Modifier and key names are case-insensitive.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tokens: Vec<&str> = s.split('+').map(str::trim).collect();
        if tokens.iter().all(|token| token.is_empty()) {
            return Err(ChordParseError::Empty);
        }

        let (key_name, modifiers) = tokens
            .split_last()
            .ok_or(ChordParseError::Empty)?;

        let mut control = false;
        let mut alt = false;
        let mut shift = false;
        let mut super_key = false;

        for modifier in modifiers {
            match modifier.to_ascii_lowercase().as_str() {
                "control" | "ctrl" => control = true,
                "alt" => alt = true,
                "shift" => shift = true,
                "super" | "meta" => super_key = true,
                other => return Err(ChordParseError::UnknownModifier(other.to_string())),
            }
        }

        let key = key_from_name(key_name)
            .ok_or_else(|| ChordParseError::UnknownKey((*key_name).to_string()))?;

        Ok(Self {
            control,
            alt,
            shift,
            super_key,
            key,
        })
    }
}

impl fmt::Display for KeyChord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.control {
            write!(f, "Control+")?;
        }
        if self.alt {
            write!(f, "Alt+")?;
        }
        if self.shift {
            write!(f, "Shift+")?;
        }
        if self.super_key {
            write!(f, "Super+")?;
        }
        match key_name(self.key) {
            Some(name) => write!(f, "{name}"),
            None => write!(f, "{:?}", self.key),
        }
    }
}

/// Key names accepted in shortcut strings. Aliases sit after the
/// canonical name so formatting picks the canonical form.
const KEY_NAMES: &[(&str, Key)] = &[
    ("A", Key::KEY_A),
    ("B", Key::KEY_B),
    ("C", Key::KEY_C),
    ("D", Key::KEY_D),
    ("E", Key::KEY_E),
    ("F", Key::KEY_F),
    ("G", Key::KEY_G),
    ("H", Key::KEY_H),
    ("I", Key::KEY_I),
    ("J", Key::KEY_J),
    ("K", Key::KEY_K),
    ("L", Key::KEY_L),
    ("M", Key::KEY_M),
    ("N", Key::KEY_N),
    ("O", Key::KEY_O),
    ("P", Key::KEY_P),
    ("Q", Key::KEY_Q),
    ("R", Key::KEY_R),
    ("S", Key::KEY_S),
    ("T", Key::KEY_T),
    ("U", Key::KEY_U),
    ("V", Key::KEY_V),
    ("W", Key::KEY_W),
    ("X", Key::KEY_X),
    ("Y", Key::KEY_Y),
    ("Z", Key::KEY_Z),
    ("0", Key::KEY_0),
    ("1", Key::KEY_1),
    ("2", Key::KEY_2),
    ("3", Key::KEY_3),
    ("4", Key::KEY_4),
    ("5", Key::KEY_5),
    ("6", Key::KEY_6),
    ("7", Key::KEY_7),
    ("8", Key::KEY_8),
    ("9", Key::KEY_9),
    ("F1", Key::KEY_F1),
    ("F2", Key::KEY_F2),
    ("F3", Key::KEY_F3),
    ("F4", Key::KEY_F4),
    ("F5", Key::KEY_F5),
    ("F6", Key::KEY_F6),
    ("F7", Key::KEY_F7),
    ("F8", Key::KEY_F8),
    ("F9", Key::KEY_F9),
    ("F10", Key::KEY_F10),
    ("F11", Key::KEY_F11),
    ("F12", Key::KEY_F12),
    ("Tab", Key::KEY_TAB),
    ("Space", Key::KEY_SPACE),
    ("Enter", Key::KEY_ENTER),
    ("Return", Key::KEY_ENTER),
    ("Escape", Key::KEY_ESC),
    ("Esc", Key::KEY_ESC),
    ("Backspace", Key::KEY_BACKSPACE),
    ("Delete", Key::KEY_DELETE),
    ("Insert", Key::KEY_INSERT),
    ("Home", Key::KEY_HOME),
    ("End", Key::KEY_END),
    ("PageUp", Key::KEY_PAGEUP),
    ("PageDown", Key::KEY_PAGEDOWN),
    ("Up", Key::KEY_UP),
    ("Down", Key::KEY_DOWN),
    ("Left", Key::KEY_LEFT),
    ("Right", Key::KEY_RIGHT),
];

fn key_from_name(name: &str) -> Option<Key> {
    KEY_NAMES
        .iter()
        .find(|(candidate, _)| candidate.eq_ignore_ascii_case(name))
        .map(|(_, key)| *key)
}

fn key_name(key: Key) -> Option<&'static str> {
    KEY_NAMES
        .iter()
        .find(|(_, candidate)| *candidate == key)
        .map(|(name, _)| *name)
}

/// What a bound chord does when it fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotkeyAction {
    CycleNext,
    CyclePrevious,
    /// Focus the tracked window owned by this pid
    FocusWindow(u32),
}

/// Active chord-to-action bindings
#[derive(Debug, Default)]
pub struct HotkeyTable {
    bindings: HashMap<KeyChord, HotkeyAction>,
}

impl HotkeyTable {
    pub fn new() -> Self {
        Self {
            bindings: HashMap::new(),
        }
    }

    /// Install a binding unless the chord is already taken.
    /// Returns whether the binding was installed.
    pub fn bind(&mut self, chord: KeyChord, action: HotkeyAction) -> bool {
        if self.bindings.contains_key(&chord) {
            return false;
        }
        self.bindings.insert(chord, action);
        true
    }

    /// Install a binding, replacing whatever held the chord before.
    pub fn rebind(&mut self, chord: KeyChord, action: HotkeyAction) {
        self.bindings.insert(chord, action);
    }

    /// Returns whether the chord was bound.
    pub fn unbind(&mut self, chord: &KeyChord) -> bool {
        self.bindings.remove(chord).is_some()
    }

    pub fn lookup(&self, chord: &KeyChord) -> Option<HotkeyAction> {
        self.bindings.get(chord).copied()
    }
}

/// Find all keyboard devices that support Tab key
fn find_all_keyboard_devices() -> Result<Vec<Device>> {
    info!(path = %paths::DEV_INPUT, "Scanning for keyboard devices...");

    let mut devices = Vec::new();

    for entry in std::fs::read_dir(paths::DEV_INPUT)
        .context(format!("Failed to read {} - are you in the '{}' group?", paths::DEV_INPUT, permissions::INPUT_GROUP))?
    {
        let entry = entry?;
        let path = entry.path();

        // Try to open device
        if let Ok(device) = Device::open(&path) {
            // Check if it has Tab key (indicates keyboard)
            if let Some(keys) = device.supported_keys() {
                if keys.contains(Key::KEY_TAB) {
                    let key_count = keys.iter().count();
                    info!(device_path = %path.display(), name = ?device.name(), key_count = key_count, "Found keyboard device");
                    devices.push(device);
                }
            }
        }
    }

    if devices.is_empty() {
        anyhow::bail!(
            "No keyboard device found. Ensure you're in '{}' group:\n\
             {}\n\
             Then log out and back in.",
            permissions::INPUT_GROUP,
            permissions::ADD_TO_INPUT_GROUP
        )
    }

    info!(count = devices.len(), "Listening on keyboard device(s)");

    Ok(devices)
}

/// Spawn background threads that forward pressed chords from all keyboard devices
pub fn spawn_listener(sender: Sender<KeyChord>) -> Result<Vec<thread::JoinHandle<()>>> {
    let devices = find_all_keyboard_devices()?;
    let mut handles = Vec::new();

    for device in devices {
        let sender = sender.clone();
        let handle = thread::spawn(move || {
            info!(device = ?device.name(), "Hotkey listener started");
            if let Err(e) = listen_for_chords(device, sender) {
                error!(error = %e, "Hotkey listener error");
            }
        });
        handles.push(handle);
    }

    Ok(handles)
}

/// Listen for key presses on a single device and forward them as chords
fn listen_for_chords(mut device: Device, sender: Sender<KeyChord>) -> Result<()> {
    loop {
        // Fetch events (blocks until available)
        let events = device.fetch_events()
            .context("Failed to fetch events")?;

        // Collect presses first; the events iterator must be finished
        // with before the device can be queried for key state
        let mut presses = Vec::new();

        for event in events {
            if event.event_type() != EventType::KEY {
                continue;
            }

            if let InputEventKind::Key(key) = event.kind() {
                debug!(key = ?key, value = event.value(), "Key event");

                if event.value() == input::KEY_PRESS && !is_modifier(key) {
                    presses.push(key);
                }
            }
        }

        // Now resolve each press against the current modifier state.
        // This avoids race conditions from batched events
        for key in presses {
            let key_state = device.get_key_state()
                .context("Failed to get keyboard state")?;

            let chord = KeyChord {
                control: key_state.contains(Key::KEY_LEFTCTRL) || key_state.contains(Key::KEY_RIGHTCTRL),
                alt: key_state.contains(Key::KEY_LEFTALT) || key_state.contains(Key::KEY_RIGHTALT),
                shift: key_state.contains(Key::KEY_LEFTSHIFT) || key_state.contains(Key::KEY_RIGHTSHIFT),
                super_key: key_state.contains(Key::KEY_LEFTMETA) || key_state.contains(Key::KEY_RIGHTMETA),
                key,
            };

            debug!(chord = %chord, "Chord pressed, forwarding");

            sender.send(chord)
                .context("Failed to send chord")?;
        }
    }
}

fn is_modifier(key: Key) -> bool {
    key == Key::KEY_LEFTCTRL
        || key == Key::KEY_RIGHTCTRL
        || key == Key::KEY_LEFTSHIFT
        || key == Key::KEY_RIGHTSHIFT
        || key == Key::KEY_LEFTALT
        || key == Key::KEY_RIGHTALT
        || key == Key::KEY_LEFTMETA
        || key == Key::KEY_RIGHTMETA
}

/// Check if hotkeys are available (user has input group permissions)
pub fn check_permissions() -> bool {
    std::fs::read_dir(paths::DEV_INPUT).is_ok()
}

/// Print helpful error message if permissions missing
pub fn print_permission_error() {
    error!(path = %paths::DEV_INPUT, "Cannot access input devices");
    error!(group = %permissions::INPUT_GROUP, "Hotkeys require group membership");
    error!(command = %permissions::ADD_TO_INPUT_GROUP, "Add user to input group");
    error!("  Then log out and back in");
    warn!(continuing = true, "Continuing without hotkey support...");
}
