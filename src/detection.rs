//! Turn detection strategies
//!
//! Wakfu paints a "your turn" banner in the bottom-right corner of the
//! client. The pixel strategy samples that zone; the window-name
//! strategy watches the character label in the title instead, for
//! setups where surface capture is unreliable.

use std::collections::HashMap;
use std::str::FromStr;
use tracing::debug;

use crate::constants::pixel;
use crate::error::EngineError;
use crate::types::{Rgb, SurfaceProbe, TrackedWindow, ZoneRect};

/// How a window's turn is recognized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DetectionMode {
    #[default]
    Pixel,
    WindowName,
}

impl DetectionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionMode::Pixel => "PIXEL",
            DetectionMode::WindowName => "WINDOW_NAME",
        }
    }
}

impl FromStr for DetectionMode {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PIXEL" => Ok(DetectionMode::Pixel),
            "WINDOW_NAME" => Ok(DetectionMode::WindowName),
            other => Err(EngineError::InvalidMode(other.to_string())),
        }
    }
}

/// Active strategy state. Switching modes rebuilds this from scratch,
/// so no stale observations survive a switch.
pub enum TurnDetector {
    Pixel(PixelTurnDetector),
    WindowName(WindowNameTurnDetector),
}

impl TurnDetector {
    pub fn for_mode(mode: DetectionMode, windows: &[TrackedWindow]) -> Self {
        match mode {
            DetectionMode::Pixel => TurnDetector::Pixel(PixelTurnDetector),
            DetectionMode::WindowName => {
                TurnDetector::WindowName(WindowNameTurnDetector::new(windows))
            }
        }
    }

    /// One observation of `window`. False means "no turn seen this tick",
    /// including every failure to observe.
    pub fn detect_turn<P: SurfaceProbe>(
        &mut self,
        probe: &P,
        windows: &[TrackedWindow],
        window: &TrackedWindow,
    ) -> bool {
        match self {
            TurnDetector::Pixel(detector) => detector.detect_turn(probe, window),
            TurnDetector::WindowName(detector) => detector.detect_turn(windows, window),
        }
    }
}

/// Samples the turn-banner zone of the client surface
pub struct PixelTurnDetector;

impl PixelTurnDetector {
    fn detect_turn<P: SurfaceProbe>(&self, probe: &P, window: &TrackedWindow) -> bool {
        if window.window == x11rb::NONE {
            return false;
        }

        let Some(rect) = probe.window_rect(window.window) else {
            debug!(pid = window.pid, "No window geometry, skipping scan");
            return false;
        };

        let Some(zone) = detection_zone(rect.width, rect.height) else {
            debug!(
                pid = window.pid,
                width = rect.width,
                height = rect.height,
                "Window too small for the detection zone"
            );
            return false;
        };

        let Some(capture) = probe.capture_zone(window.window, zone) else {
            debug!(pid = window.pid, "Zone capture failed, no observation");
            return false;
        };

        let mut samples = Vec::with_capacity(usize::from(zone.width) * usize::from(zone.height));
        for x in 0..zone.width {
            for y in 0..zone.height {
                samples.push(capture.pixel(x, y));
            }
        }

        let zone_area = u32::from(pixel::ZONE_WIDTH) * u32::from(pixel::ZONE_HEIGHT);
        scan_samples(
            samples,
            zone_area,
            &pixel::TURN_COLORS,
            pixel::COLOR_TOLERANCE,
            pixel::MATCH_THRESHOLD,
        )
    }
}

/// Detection zone anchored to the bottom-right corner, positioned from
/// the reference layout and clipped to the window.
fn detection_zone(width: u16, height: u16) -> Option<ZoneRect> {
    let x = i32::from(width) - (pixel::REFERENCE_WIDTH - pixel::ZONE_X);
    let y = i32::from(height) - (pixel::REFERENCE_HEIGHT - pixel::ZONE_Y);

    let x0 = x.max(0);
    let y0 = y.max(0);
    let x1 = (x + i32::from(pixel::ZONE_WIDTH)).min(i32::from(width));
    let y1 = (y + i32::from(pixel::ZONE_HEIGHT)).min(i32::from(height));
    if x0 >= x1 || y0 >= y1 {
        return None;
    }

    Some(ZoneRect {
        x: i16::try_from(x0).ok()?,
        y: i16::try_from(y0).ok()?,
        width: u16::try_from(x1 - x0).ok()?,
        height: u16::try_from(y1 - y0).ok()?,
    })
}

/// Decide whether a sampled zone shows the turn banner.
///
/// Unreadable samples are excluded from the match count and the total.
/// `zone_area` only sizes the early exit; the verdict is the match
/// ratio over readable samples.
pub fn scan_samples<I>(
    samples: I,
    zone_area: u32,
    colors: &[Rgb],
    tolerance: f64,
    threshold: f64,
) -> bool
where
    I: IntoIterator<Item = Option<Rgb>>,
{
    let required = (f64::from(zone_area) * threshold).ceil() as u32;
    let mut matches = 0u32;
    let mut total = 0u32;

    for sample in samples {
        let Some(color) = sample else {
            continue;
        };
        total += 1;
        if colors
            .iter()
            .any(|turn| colors_match(color, *turn, tolerance))
        {
            matches += 1;
            if required > 0 && matches >= required {
                return true;
            }
        }
    }

    if total == 0 {
        return false;
    }
    f64::from(matches) / f64::from(total) >= threshold
}

fn colors_match(a: Rgb, b: Rgb, tolerance: f64) -> bool {
    if tolerance == 0.0 {
        return a == b;
    }
    let dr = f64::from(a.r) - f64::from(b.r);
    let dg = f64::from(a.g) - f64::from(b.g);
    let db = f64::from(a.b) - f64::from(b.b);
    (dr * dr + dg * dg + db * db).sqrt() <= tolerance
}

/// Flags a turn when a window's character label changes between scans
pub struct WindowNameTurnDetector {
    last_labels: HashMap<u32, String>,
}

impl WindowNameTurnDetector {
    pub fn new(windows: &[TrackedWindow]) -> Self {
        Self {
            last_labels: snapshot_labels(windows),
        }
    }

    fn detect_turn(&mut self, windows: &[TrackedWindow], window: &TrackedWindow) -> bool {
        if window.title.is_empty() {
            return false;
        }

        match self.last_labels.get(&window.pid) {
            Some(label) if *label == window.character => false,
            // Unknown windows count as changed. Either way the whole
            // snapshot is replaced, so one change fires exactly once.
            _ => {
                debug!(pid = window.pid, character = %window.character, "Character label changed");
                self.last_labels = snapshot_labels(windows);
                true
            }
        }
    }
}

fn snapshot_labels(windows: &[TrackedWindow]) -> HashMap<u32, String> {
    windows
        .iter()
        .map(|window| (window.pid, window.character.clone()))
        .collect()
}
