//! X11 input backend.
//!
//! Reads the pointer with the core `QueryPointer` request. Motion and key taps
//! go through the XTEST extension so the server treats them as device input
//! and resets its idle timer, which a core `WarpPointer` does not do on every
//! server.

use std::env;

use tracing::debug;
use tracing::info;
use x11rb::connection::Connection;
use x11rb::connection::RequestConnection;
use x11rb::protocol::xproto::ConnectionExt as _;
use x11rb::protocol::xproto::KEY_PRESS_EVENT;
use x11rb::protocol::xproto::KEY_RELEASE_EVENT;
use x11rb::protocol::xproto::MOTION_NOTIFY_EVENT;
use x11rb::protocol::xproto::Keycode;
use x11rb::protocol::xproto::Window;
use x11rb::protocol::xtest;
use x11rb::protocol::xtest::ConnectionExt as _;
use x11rb::rust_connection::RustConnection;

use super::BackendError;
use super::InputBackend;
use crate::domain::Point;

/// `Shift_L`: pressing it alone types nothing.
const TAP_KEYSYM: u32 = 0xffe1;

/// X11 input backend bound to the default screen's root window.
pub struct X11Backend {
    conn: RustConnection,
    root: Window,
    tap_keycode: Keycode,
}

impl X11Backend {
    /// Connect to the display named by `$DISPLAY`.
    pub fn connect() -> Result<Self, BackendError> {
        let (conn, screen_num) =
            x11rb::connect(None).map_err(|e| BackendError::ConnectionFailed(e.to_string()))?;

        let setup = conn.setup();
        let Some(screen) = setup.roots.get(screen_num) else {
            return Err(BackendError::ConnectionFailed(format!(
                "invalid screen number {} ({} screens available)",
                screen_num,
                setup.roots.len()
            )));
        };
        let root = screen.root;
        let min_keycode = setup.min_keycode;
        let max_keycode = setup.max_keycode;

        if conn
            .extension_information(xtest::X11_EXTENSION_NAME)
            .map_err(request_failed)?
            .is_none()
        {
            return Err(BackendError::ExtensionMissing(xtest::X11_EXTENSION_NAME));
        }

        let mapping = conn
            .get_keyboard_mapping(min_keycode, max_keycode - min_keycode + 1)
            .map_err(request_failed)?
            .reply()
            .map_err(request_failed)?;
        let tap_keycode = keycode_for(
            &mapping.keysyms,
            mapping.keysyms_per_keycode,
            min_keycode,
            TAP_KEYSYM,
        )
        .ok_or(BackendError::KeyUnavailable)?;

        info!("Connected to X11 display (screen {})", screen_num);
        debug!("Tap key resolved to keycode {}", tap_keycode);

        Ok(Self {
            conn,
            root,
            tap_keycode,
        })
    }

    /// Get diagnostic information about the X11 environment.
    pub fn get_diagnostics() -> Vec<String> {
        let mut diags = Vec::new();

        match env::var("DISPLAY") {
            Ok(v) => diags.push(format!("DISPLAY={v}")),
            Err(_) => diags.push("DISPLAY: NOT SET".to_string()),
        }

        match env::var("XDG_SESSION_TYPE") {
            Ok(v) => diags.push(format!("XDG_SESSION_TYPE={v}")),
            Err(_) => diags.push("XDG_SESSION_TYPE: NOT SET".to_string()),
        }

        diags
    }

    fn fake_input(&self, event_type: u8, detail: u8, x: i16, y: i16) -> Result<(), BackendError> {
        self.conn
            .xtest_fake_input(event_type, detail, x11rb::CURRENT_TIME, self.root, x, y, 0)
            .map_err(request_failed)?
            .check()
            .map_err(request_failed)
    }
}

impl InputBackend for X11Backend {
    fn cursor_position(&self) -> Result<Point, BackendError> {
        let reply = self
            .conn
            .query_pointer(self.root)
            .map_err(request_failed)?
            .reply()
            .map_err(request_failed)?;

        Ok(Point::new(reply.root_x.into(), reply.root_y.into()))
    }

    fn move_cursor(&self, to: Point) -> Result<(), BackendError> {
        let (Ok(x), Ok(y)) = (i16::try_from(to.x), i16::try_from(to.y)) else {
            return Err(BackendError::OutOfRange(to));
        };

        // Detail 0 makes the motion absolute.
        self.fake_input(MOTION_NOTIFY_EVENT, 0, x, y)
    }

    fn tap_key(&self) -> Result<(), BackendError> {
        self.fake_input(KEY_PRESS_EVENT, self.tap_keycode, 0, 0)?;
        self.fake_input(KEY_RELEASE_EVENT, self.tap_keycode, 0, 0)?;
        self.conn.flush().map_err(request_failed)
    }
}

fn request_failed(e: impl std::fmt::Display) -> BackendError {
    BackendError::RequestFailed(e.to_string())
}

/// Find the first keycode whose mapping contains `keysym`.
///
/// `keysyms` is the flat table returned by `GetKeyboardMapping`, with
/// `per_keycode` entries for each keycode starting at `min_keycode`.
fn keycode_for(keysyms: &[u32], per_keycode: u8, min_keycode: Keycode, keysym: u32) -> Option<Keycode> {
    if per_keycode == 0 {
        return None;
    }

    let index = keysyms.iter().position(|&k| k == keysym)?;
    let offset = u8::try_from(index / usize::from(per_keycode)).ok()?;
    min_keycode.checked_add(offset)
}
