//! Kernel-level chord injection through a uinput virtual keyboard
//!
//! Injected chords travel the same path as hardware input, so the
//! in-process listener sees them and the window manager credits the
//! activation that follows to a real user action.

use anyhow::Result;
use evdev::Key;
use std::thread;
use std::time::Duration;
use tracing::{debug, info};

use crate::constants::{injector, input, paths};
use crate::hotkeys::KeyChord;

pub struct ChordInjector {
    device: Option<uinput::Device>,
}

impl ChordInjector {
    /// Create the virtual keyboard. Must happen before keyboard
    /// listeners scan /dev/input or they will miss the new node.
    pub fn new() -> Result<Self> {
        let device = uinput::default()
            .map_err(|e| anyhow::anyhow!("Failed to open {}: {}", paths::DEV_UINPUT, e))?
            .name(injector::DEVICE_NAME)
            .map_err(|e| anyhow::anyhow!("Failed to name virtual keyboard: {}", e))?
            .event(uinput::event::Keyboard::All)
            .map_err(|e| anyhow::anyhow!("Failed to enable keyboard events: {}", e))?
            .create()
            .map_err(|e| anyhow::anyhow!("Failed to create virtual keyboard '{}': {}", injector::DEVICE_NAME, e))?;

        // Give udev time to expose the node under /dev/input
        thread::sleep(Duration::from_millis(injector::SETTLE_MS));

        info!(device = %injector::DEVICE_NAME, "Virtual keyboard created");

        Ok(Self {
            device: Some(device),
        })
    }

    /// Injector that logs chords instead of writing to the kernel
    pub fn disabled() -> Self {
        Self { device: None }
    }

    /// Press and release a chord as one key sequence
    pub fn press(&mut self, chord: KeyChord) -> Result<()> {
        let Some(device) = self.device.as_mut() else {
            info!(chord = %chord, "Chord injection disabled, skipping");
            return Ok(());
        };

        for (key, value) in press_sequence(chord) {
            // Event type 1 is EV_KEY
            device
                .write(1, i32::from(key.code()), value)
                .map_err(|e| anyhow::anyhow!("Failed to write key event for {:?}: {}", key, e))?;
            // EV_SYN / SYN_REPORT flushes the event to readers
            device
                .write(0, 0, 0)
                .map_err(|e| anyhow::anyhow!("Failed to synchronize key event: {}", e))?;
        }

        debug!(chord = %chord, "Injected chord");

        Ok(())
    }
}

/// Key events making up one chord press: modifiers down, key down,
/// key up, modifiers up in reverse order.
fn press_sequence(chord: KeyChord) -> Vec<(Key, i32)> {
    let mut modifiers = Vec::new();
    if chord.control {
        modifiers.push(Key::KEY_LEFTCTRL);
    }
    if chord.alt {
        modifiers.push(Key::KEY_LEFTALT);
    }
    if chord.shift {
        modifiers.push(Key::KEY_LEFTSHIFT);
    }
    if chord.super_key {
        modifiers.push(Key::KEY_LEFTMETA);
    }

    let mut sequence = Vec::with_capacity(modifiers.len() * 2 + 2);
    for modifier in &modifiers {
        sequence.push((*modifier, input::KEY_PRESS));
    }
    sequence.push((chord.key, input::KEY_PRESS));
    sequence.push((chord.key, input::KEY_RELEASE));
    for modifier in modifiers.iter().rev() {
        sequence.push((*modifier, input::KEY_RELEASE));
    }
    sequence
}
