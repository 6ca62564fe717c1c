use anyhow::{Context, Result};
use tracing::{debug, info};
use x11rb::connection::Connection;
use x11rb::protocol::xproto::*;
use x11rb::rust_connection::RustConnection;

use crate::constants::{wakfu, x11};
use crate::types::{SurfaceProbe, TrackedWindow, WindowRect, ZoneCapture, ZoneRect};

/// Shared X11 state: connection, root window and pre-cached atoms
pub struct X11Context {
    pub conn: RustConnection,
    pub root: Window,
    pub atoms: CachedAtoms,
}

impl X11Context {
    pub fn new() -> Result<Self> {
        let (conn, screen_num) = x11rb::connect(None).context("Failed to connect to X11 display")?;
        let screen = &conn.setup().roots[screen_num];
        let root = screen.root;

        info!(
            screen = screen_num,
            width = screen.width_in_pixels,
            height = screen.height_in_pixels,
            "Connected to X11"
        );

        let atoms = CachedAtoms::new(&conn)?;

        Ok(Self { conn, root, atoms })
    }
}

/// Pre-cached X11 atoms to avoid repeated roundtrips
pub struct CachedAtoms {
    pub net_wm_pid: Atom,
    pub net_wm_name: Atom,
    pub utf8_string: Atom,
    pub net_client_list: Atom,
    pub net_active_window: Atom,
}

impl CachedAtoms {
    pub fn new(conn: &RustConnection) -> Result<Self> {
        // Do all intern_atom roundtrips once at startup
        Ok(Self {
            net_wm_pid: conn.intern_atom(false, b"_NET_WM_PID")
                .context("Failed to intern _NET_WM_PID atom")?
                .reply()
                .context("Failed to get reply for _NET_WM_PID atom")?
                .atom,
            net_wm_name: conn.intern_atom(false, b"_NET_WM_NAME")
                .context("Failed to intern _NET_WM_NAME atom")?
                .reply()
                .context("Failed to get reply for _NET_WM_NAME atom")?
                .atom,
            utf8_string: conn.intern_atom(false, b"UTF8_STRING")
                .context("Failed to intern UTF8_STRING atom")?
                .reply()
                .context("Failed to get reply for UTF8_STRING atom")?
                .atom,
            net_client_list: conn.intern_atom(false, b"_NET_CLIENT_LIST")
                .context("Failed to intern _NET_CLIENT_LIST atom")?
                .reply()
                .context("Failed to get reply for _NET_CLIENT_LIST atom")?
                .atom,
            net_active_window: conn.intern_atom(false, b"_NET_ACTIVE_WINDOW")
                .context("Failed to intern _NET_ACTIVE_WINDOW atom")?
                .reply()
                .context("Failed to get reply for _NET_ACTIVE_WINDOW atom")?
                .atom,
        })
    }
}

/// Enumerate Wakfu client windows, newest first.
///
/// `_NET_CLIENT_LIST` is ordered oldest to newest; prepending while
/// walking it puts the most recently mapped client at the front.
pub fn scan_game_windows(ctx: &X11Context) -> Result<Vec<TrackedWindow>> {
    let client_list = ctx.conn
        .get_property(
            false,
            ctx.root,
            ctx.atoms.net_client_list,
            AtomEnum::WINDOW,
            0,
            u32::MAX,
        )
        .context("Failed to query _NET_CLIENT_LIST property")?
        .reply()
        .context("Failed to get reply for _NET_CLIENT_LIST query")?;

    let windows: Vec<Window> = client_list
        .value32()
        .map(|values| values.collect())
        .unwrap_or_default();

    let mut candidates = Vec::new();
    for window in windows {
        match classify_window(ctx, window) {
            Ok(Some(tracked)) => candidates.insert(0, tracked),
            Ok(None) => {}
            // One unreadable window must not sink the whole scan
            Err(e) => debug!(window = window, error = %e, "Skipping window"),
        }
    }

    Ok(candidates)
}

/// Build a tracked-window candidate if this is a Wakfu client.
///
/// Clients with a logged-in character title "Name - WAKFU ..." carry the
/// character name; bare launcher windows fall back to a generic label.
/// Anything else is not a game window.
fn classify_window(ctx: &X11Context, window: Window) -> Result<Option<TrackedWindow>> {
    if !window_class_matches(ctx, window)? {
        return Ok(None);
    }

    let Some(pid) = window_pid(ctx, window)? else {
        return Ok(None);
    };
    let Some(title) = window_title(ctx, window)? else {
        return Ok(None);
    };

    let parts: Vec<&str> = title.split(wakfu::TITLE_SEPARATOR).collect();
    if parts.len() > 1 {
        let character = parts[0].to_string();
        return Ok(Some(TrackedWindow::new(pid, window, title, character)));
    }

    if title.contains(wakfu::TITLE_MARKER) {
        return Ok(Some(TrackedWindow::new(
            pid,
            window,
            wakfu::FALLBACK_LABEL.to_string(),
            wakfu::FALLBACK_LABEL.to_string(),
        )));
    }

    Ok(None)
}

fn window_class_matches(ctx: &X11Context, window: Window) -> Result<bool> {
    let class_prop = ctx.conn
        .get_property(false, window, AtomEnum::WM_CLASS, AtomEnum::STRING, 0, 1024)
        .context(format!("Failed to query WM_CLASS property for window {}", window))?
        .reply()
        .context(format!("Failed to get WM_CLASS reply for window {}", window))?;

    // WM_CLASS holds "instance\0class\0"; the AWT frame identifier
    // is the instance part
    let value = String::from_utf8_lossy(&class_prop.value).into_owned();
    Ok(value.split('\0').any(|part| part == wakfu::WINDOW_CLASS))
}

fn window_pid(ctx: &X11Context, window: Window) -> Result<Option<u32>> {
    let pid_prop = ctx.conn
        .get_property(false, window, ctx.atoms.net_wm_pid, AtomEnum::CARDINAL, 0, 1)
        .context(format!("Failed to query _NET_WM_PID property for window {}", window))?
        .reply()
        .context(format!("Failed to get _NET_WM_PID reply for window {}", window))?;

    Ok(pid_prop.value32().and_then(|mut values| values.next()))
}

/// Window title from _NET_WM_NAME, falling back to legacy WM_NAME
fn window_title(ctx: &X11Context, window: Window) -> Result<Option<String>> {
    let name_prop = ctx.conn
        .get_property(false, window, ctx.atoms.net_wm_name, ctx.atoms.utf8_string, 0, 1024)
        .context(format!("Failed to query _NET_WM_NAME property for window {}", window))?
        .reply()
        .context(format!("Failed to get _NET_WM_NAME reply for window {}", window))?;

    if !name_prop.value.is_empty() {
        return Ok(Some(String::from_utf8_lossy(&name_prop.value).into_owned()));
    }

    let name_prop = ctx.conn
        .get_property(false, window, AtomEnum::WM_NAME, AtomEnum::ANY, 0, 1024)
        .context(format!("Failed to query WM_NAME property for window {}", window))?
        .reply()
        .context(format!("Failed to get WM_NAME reply for window {}", window))?;

    if !name_prop.value.is_empty() {
        return Ok(Some(String::from_utf8_lossy(&name_prop.value).into_owned()));
    }

    Ok(None)
}

/// Window currently holding focus according to the window manager
pub fn active_window(ctx: &X11Context) -> Result<Option<Window>> {
    let active_prop = ctx.conn
        .get_property(
            false,
            ctx.root,
            ctx.atoms.net_active_window,
            AtomEnum::WINDOW,
            0,
            1,
        )
        .context("Failed to query _NET_ACTIVE_WINDOW property")?
        .reply()
        .context("Failed to get reply for _NET_ACTIVE_WINDOW query")?;

    Ok(active_prop
        .value32()
        .and_then(|mut values| values.next())
        .filter(|window| *window != x11rb::NONE))
}

/// Activate (focus) an X11 window using _NET_ACTIVE_WINDOW
pub fn activate_window(ctx: &X11Context, window: Window) -> Result<()> {
    // First, raise the window to top of stack
    ctx.conn
        .configure_window(
            window,
            &ConfigureWindowAux::new().stack_mode(StackMode::ABOVE),
        )
        .context(format!("Failed to raise window {} to top of stack", window))?;

    // Send _NET_ACTIVE_WINDOW client message to root window
    let event = ClientMessageEvent {
        response_type: CLIENT_MESSAGE_EVENT,
        format: 32,
        sequence: 0,
        window,
        type_: ctx.atoms.net_active_window,
        data: ClientMessageData::from([
            x11::ACTIVE_WINDOW_SOURCE_PAGER, // Source indication: 2 = pager/direct user action
            x11rb::CURRENT_TIME, // Timestamp (current time)
            0, // Requestor's currently active window (0 = none)
            0,
            0,
        ]),
    };

    ctx.conn
        .send_event(
            false,
            ctx.root,
            EventMask::SUBSTRUCTURE_NOTIFY | EventMask::SUBSTRUCTURE_REDIRECT,
            &event,
        )
        .context(format!("Failed to send _NET_ACTIVE_WINDOW event for window {}", window))?;

    ctx.conn
        .flush()
        .context("Failed to flush X11 connection after window activation")?;
    Ok(())
}

impl SurfaceProbe for X11Context {
    fn window_rect(&self, window: Window) -> Option<WindowRect> {
        let geometry = self.conn.get_geometry(window).ok()?.reply().ok()?;
        let coords = self
            .conn
            .translate_coordinates(window, self.root, 0, 0)
            .ok()?
            .reply()
            .ok()?;

        Some(WindowRect {
            x: coords.dst_x,
            y: coords.dst_y,
            width: geometry.width,
            height: geometry.height,
        })
    }

    fn capture_zone(&self, window: Window, zone: ZoneRect) -> Option<ZoneCapture> {
        if zone.width == 0 || zone.height == 0 {
            return None;
        }

        // Reading the window drawable directly keeps overlapping
        // windows out of the sample
        let image = self
            .conn
            .get_image(
                ImageFormat::Z_PIXMAP,
                window,
                zone.x,
                zone.y,
                zone.width,
                zone.height,
                u32::MAX,
            )
            .ok()?
            .reply()
            .ok()?;

        Some(ZoneCapture {
            width: zone.width,
            height: zone.height,
            depth: image.depth,
            data: image.data,
        })
    }
}
