//! Persisted engine settings
//!
//! Stored as TOML under the user config directory. Missing keys are
//! filled with defaults and written back, so the file upgrades itself
//! when new settings appear.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use crate::constants::shortcuts;
use crate::detection::DetectionMode;
use crate::hotkeys::{FORCE_FOCUS_CHORD, KeyChord};

/// Cycling shortcut strings as stored on disk
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShortcutSettings {
    #[serde(default = "default_next_window")]
    pub next_window: String,
    #[serde(default = "default_previous_window")]
    pub previous_window: String,
}

impl Default for ShortcutSettings {
    fn default() -> Self {
        Self {
            next_window: default_next_window(),
            previous_window: default_previous_window(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Start turn detection as soon as the engine comes up
    #[serde(default)]
    pub auto_focus: bool,

    /// Detection strategy, "PIXEL" or "WINDOW_NAME"
    #[serde(default = "default_auto_focus_mode")]
    pub auto_focus_mode: String,

    /// Start foreground mirroring and cycling shortcuts at startup
    #[serde(default)]
    pub organizer: bool,

    #[serde(default)]
    pub shortcuts: ShortcutSettings,

    /// Where this settings file lives, so saves follow a --config override
    #[serde(skip)]
    path: PathBuf,
}

fn default_auto_focus_mode() -> String {
    DetectionMode::default().as_str().to_string()
}

fn default_next_window() -> String {
    shortcuts::NEXT_WINDOW.to_string()
}

fn default_previous_window() -> String {
    shortcuts::PREVIOUS_WINDOW.to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            auto_focus: false,
            auto_focus_mode: default_auto_focus_mode(),
            organizer: false,
            shortcuts: ShortcutSettings::default(),
            path: Settings::default_path(),
        }
    }
}

impl Settings {
    fn default_path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(crate::constants::config::APP_DIR);
        path.push(crate::constants::config::FILENAME);
        path
    }

    pub fn load() -> Self {
        Self::load_from(&Self::default_path())
    }

    /// Load settings, creating the file with defaults when absent.
    ///
    /// A file that fails to parse is left untouched for the user to
    /// fix; starting with silently replaced settings would be worse.
    pub fn load_from(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<Settings>(&contents) {
                Ok(mut settings) => {
                    settings.path = path.to_path_buf();
                    settings.validate();
                    if missing_keys(&contents) {
                        info!(path = %path.display(), "Adding missing settings with defaults");
                        if let Err(e) = settings.save() {
                            error!(error = ?e, "Failed to save upgraded config");
                        }
                    }
                    settings
                }
                Err(e) => {
                    error!(path = %path.display(), error = %e, "Failed to parse config file");
                    error!("Please fix the syntax errors in your config file.");
                    std::process::exit(1);
                }
            },
            Err(_) => {
                info!(path = %path.display(), "No config file found, generating default");
                let mut settings = Settings::default();
                settings.path = path.to_path_buf();
                if let Err(e) = settings.save() {
                    error!(error = ?e, "Failed to save default config");
                }
                settings
            }
        }
    }

    /// Degrade unusable values to defaults instead of refusing to start
    pub fn validate(&mut self) {
        if self.auto_focus_mode.parse::<DetectionMode>().is_err() {
            warn!(mode = %self.auto_focus_mode, "Unknown auto_focus_mode, using default");
            self.auto_focus_mode = default_auto_focus_mode();
        }

        validate_shortcut(&mut self.shortcuts.next_window, "next_window", default_next_window);
        validate_shortcut(
            &mut self.shortcuts.previous_window,
            "previous_window",
            default_previous_window,
        );

        if let (Ok(next), Ok(previous)) = (
            self.shortcuts.next_window.parse::<KeyChord>(),
            self.shortcuts.previous_window.parse::<KeyChord>(),
        ) {
            if next == previous {
                warn!(chord = %next, "next_window and previous_window are the same chord");
            }
        }
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .context(format!("Failed to create config directory: {}", parent.display()))?;
        }

        let contents = toml::to_string_pretty(self)
            .context("Failed to serialize config to TOML")?;

        fs::write(&self.path, contents)
            .context(format!("Failed to write config file to {}", self.path.display()))?;

        Ok(())
    }

    /// Flip and persist; returns the new state
    pub fn toggle_auto_focus(&mut self) -> bool {
        self.auto_focus = !self.auto_focus;
        if let Err(e) = self.save() {
            error!(error = ?e, "Failed to save config");
        }
        self.auto_focus
    }

    /// Flip and persist; returns the new state
    pub fn toggle_organizer(&mut self) -> bool {
        self.organizer = !self.organizer;
        if let Err(e) = self.save() {
            error!(error = ?e, "Failed to save config");
        }
        self.organizer
    }
}

/// Crude but sufficient check for settings the file predates
fn missing_keys(contents: &str) -> bool {
    ["auto_focus =", "auto_focus_mode", "organizer", "next_window", "previous_window"]
        .iter()
        .any(|key| !contents.contains(key))
}

fn validate_shortcut(value: &mut String, name: &str, default: fn() -> String) {
    match value.parse::<KeyChord>() {
        Ok(chord) if chord == FORCE_FOCUS_CHORD => {
            warn!(
                shortcut = %value,
                reserved = %shortcuts::FORCE_FOCUS,
                "{} is reserved for the forced-focus maneuver, using default",
                name
            );
            *value = default();
        }
        Ok(_) => {}
        Err(e) => {
            warn!(shortcut = %value, error = %e, "Invalid {} shortcut, using default", name);
            *value = default();
        }
    }
}
