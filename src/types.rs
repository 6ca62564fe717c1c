//! Shared data types for window tracking and surface capture

use x11rb::protocol::xproto::Window;

use crate::constants::wakfu;

/// 24-bit color sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// Window geometry in root coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowRect {
    pub x: i16,
    pub y: i16,
    pub width: u16,
    pub height: u16,
}

/// Capture region in window-relative coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoneRect {
    pub x: i16,
    pub y: i16,
    pub width: u16,
    pub height: u16,
}

/// Pixel data captured from a window surface
#[derive(Debug, Clone)]
pub struct ZoneCapture {
    pub width: u16,
    pub height: u16,
    pub depth: u8,
    pub data: Vec<u8>,
}

impl ZoneCapture {
    /// Sample one pixel, `None` when the capture cannot be read at (x, y)
    pub fn pixel(&self, x: u16, y: u16) -> Option<Rgb> {
        if x >= self.width || y >= self.height {
            return None;
        }
        if self.depth != 24 && self.depth != 32 {
            return None;
        }
        let index = (usize::from(y) * usize::from(self.width) + usize::from(x)) * 4;
        let bytes = self.data.get(index..index + 3)?;
        // Z-pixmap pixels are laid out B, G, R, pad
        Some(Rgb::new(bytes[2], bytes[1], bytes[0]))
    }
}

/// Read access to window geometry and surface pixels.
///
/// Implemented by the live X11 connection; tests substitute a fake
/// to drive turn detection without a display server.
pub trait SurfaceProbe {
    fn window_rect(&self, window: Window) -> Option<WindowRect>;
    fn capture_zone(&self, window: Window, zone: ZoneRect) -> Option<ZoneCapture>;
}

/// One tracked Wakfu client window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedWindow {
    /// Process id, the stable identity of an entry
    pub pid: u32,
    /// Native window handle, refreshed on every scan
    pub window: Window,
    pub title: String,
    /// Character name parsed from the title
    pub character: String,
    pub category: String,
    /// Excluded from shortcut cycling when set
    pub disabled: bool,
    /// Mirror of the OS foreground state, maintained by the organizer
    pub is_active: bool,
    /// Focus requested but not yet confirmed by a scan
    pub pending_activation: bool,
}

impl TrackedWindow {
    /// Fresh candidate as produced by a desktop scan
    pub fn new(pid: u32, window: Window, title: String, character: String) -> Self {
        Self {
            pid,
            window,
            title,
            character,
            category: wakfu::CATEGORY.to_string(),
            disabled: false,
            is_active: false,
            pending_activation: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capture_of(colors: &[Rgb], width: u16, height: u16) -> ZoneCapture {
        let mut data = Vec::new();
        for color in colors {
            data.extend_from_slice(&[color.b, color.g, color.r, 0]);
        }
        ZoneCapture {
            width,
            height,
            depth: 24,
            data,
        }
    }

    #[test]
    fn test_pixel_reads_bgr_layout() {
        let capture = capture_of(&[Rgb::new(1, 2, 3), Rgb::new(10, 20, 30)], 2, 1);
        assert_eq!(capture.pixel(0, 0), Some(Rgb::new(1, 2, 3)));
        assert_eq!(capture.pixel(1, 0), Some(Rgb::new(10, 20, 30)));
    }

    #[test]
    fn test_pixel_indexes_row_major() {
        let capture = capture_of(
            &[
                Rgb::new(1, 1, 1),
                Rgb::new(2, 2, 2),
                Rgb::new(3, 3, 3),
                Rgb::new(4, 4, 4),
            ],
            2,
            2,
        );
        assert_eq!(capture.pixel(0, 1), Some(Rgb::new(3, 3, 3)));
        assert_eq!(capture.pixel(1, 1), Some(Rgb::new(4, 4, 4)));
    }

    #[test]
    fn test_pixel_out_of_bounds_is_none() {
        let capture = capture_of(&[Rgb::new(1, 2, 3)], 1, 1);
        assert_eq!(capture.pixel(1, 0), None);
        assert_eq!(capture.pixel(0, 1), None);
    }

    #[test]
    fn test_pixel_unsupported_depth_is_none() {
        let mut capture = capture_of(&[Rgb::new(1, 2, 3)], 1, 1);
        capture.depth = 16;
        assert_eq!(capture.pixel(0, 0), None);
    }

    #[test]
    fn test_pixel_truncated_data_is_none() {
        let mut capture = capture_of(&[Rgb::new(1, 2, 3), Rgb::new(4, 5, 6)], 2, 1);
        capture.data.truncate(5);
        assert_eq!(capture.pixel(1, 0), None);
    }

    #[test]
    fn test_new_candidate_has_clear_flags() {
        let window = TrackedWindow::new(42, 7, "Hero - WAKFU".to_string(), "Hero".to_string());
        assert_eq!(window.category, "Wakfu");
        assert!(!window.disabled);
        assert!(!window.is_active);
        assert!(!window.pending_activation);
    }
}
