//! Input backends.
//!
//! This module provides a generic abstraction over the OS facilities that read
//! the cursor position and inject synthetic input.

mod x11;

use thiserror::Error;
pub use x11::X11Backend;

use crate::domain::Point;

/// Trait for low-level input backends.
///
/// Calls are short synchronous round-trips to the display server; callers on
/// the async runtime may invoke them directly.
pub trait InputBackend: Send + Sync {
    /// Read the current absolute cursor position.
    fn cursor_position(&self) -> Result<Point, BackendError>;

    /// Move the cursor to an absolute position.
    fn move_cursor(&self, to: Point) -> Result<(), BackendError>;

    /// Press and release a single key that has no visible effect.
    fn tap_key(&self) -> Result<(), BackendError>;
}

/// Errors that can occur while talking to the input backend.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Display connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Display request failed: {0}")]
    RequestFailed(String),

    #[error("Required extension not available: {0}")]
    ExtensionMissing(&'static str),

    #[error("No keycode is mapped to the tap key")]
    KeyUnavailable,

    #[error("Coordinate out of range: {0}")]
    OutOfRange(Point),
}
