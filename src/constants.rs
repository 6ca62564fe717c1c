//! Application-wide constants
//!
//! This module contains all magic numbers and string literals used throughout
//! the application, providing a single source of truth for constant values.

/// Scan loop cadence
pub mod scan {
    /// Interval shared by the window scan, detection and organizer loops
    pub const INTERVAL_MS: u64 = 100;
}

/// Wakfu window detection constants
pub mod wakfu {
    /// WM_CLASS carried by Wakfu's AWT frame windows
    pub const WINDOW_CLASS: &str = "sun-awt-X11-XFramePeer";

    /// Separator between character name and the rest of the title
    pub const TITLE_SEPARATOR: &str = " - ";

    /// Marker identifying a client that has no character logged in yet
    pub const TITLE_MARKER: &str = "WAKFU";

    /// Label used for clients without a character name
    pub const FALLBACK_LABEL: &str = "Wakfu";

    /// Classification tag applied to every tracked window
    pub const CATEGORY: &str = "Wakfu";
}

/// Pixel turn-detection constants
pub mod pixel {
    use crate::types::Rgb;

    /// Client width the zone coordinates were measured on
    pub const REFERENCE_WIDTH: i32 = 2560;

    /// Client height the zone coordinates were measured on
    pub const REFERENCE_HEIGHT: i32 = 1440;

    /// Zone origin on the reference layout
    pub const ZONE_X: i32 = 2534;

    /// Zone origin on the reference layout
    pub const ZONE_Y: i32 = 1370;

    /// Zone width in pixels
    pub const ZONE_WIDTH: u16 = 12;

    /// Zone height in pixels
    pub const ZONE_HEIGHT: u16 = 10;

    /// Colors of the "your turn" banner sampled in the zone
    pub const TURN_COLORS: [Rgb; 2] = [Rgb::new(0x1D, 0x20, 0x26), Rgb::new(0x0B, 0x17, 0x1C)];

    /// Maximum color distance still counted as a match (0 = exact)
    pub const COLOR_TOLERANCE: f64 = 0.0;

    /// Share of sampled pixels that must match for a turn
    pub const MATCH_THRESHOLD: f64 = 0.3;
}

/// Default shortcut strings
pub mod shortcuts {
    /// Cycle to the next window
    pub const NEXT_WINDOW: &str = "Tab";

    /// Cycle to the previous window
    pub const PREVIOUS_WINDOW: &str = "Control+Tab";

    /// Reserved for the forced-focus maneuver
    pub const FORCE_FOCUS: &str = "Control+F11";
}

/// Input event constants (from evdev)
pub mod input {
    /// Key press event value
    pub const KEY_PRESS: i32 = 1;

    /// Key release event value
    pub const KEY_RELEASE: i32 = 0;
}

/// Virtual keyboard constants
pub mod injector {
    /// Name the uinput device registers under
    pub const DEVICE_NAME: &str = "wakfu-l-focus-keyboard";

    /// Delay after device creation so listeners can pick up the new node
    pub const SETTLE_MS: u64 = 100;
}

/// Filesystem paths
pub mod paths {
    /// Directory holding raw input device nodes
    pub const DEV_INPUT: &str = "/dev/input";

    /// Kernel interface for virtual input devices
    pub const DEV_UINPUT: &str = "/dev/uinput";
}

/// Permission help strings
pub mod permissions {
    /// Group granting read access to /dev/input
    pub const INPUT_GROUP: &str = "input";

    /// Command to add the current user to the input group
    pub const ADD_TO_INPUT_GROUP: &str = "sudo usermod -aG input $USER";
}

/// Config file location
pub mod config {
    /// Directory under the user config dir
    pub const APP_DIR: &str = "wakfu-l-focus";

    /// Config file name
    pub const FILENAME: &str = "config.toml";
}

/// X11 protocol constants
pub mod x11 {
    /// Source indication for _NET_ACTIVE_WINDOW (2 = pager/direct user action)
    pub const ACTIVE_WINDOW_SOURCE_PAGER: u32 = 2;
}
