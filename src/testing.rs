//! Test doubles shared by unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::backend::BackendError;
use crate::backend::InputBackend;
use crate::domain::Point;

/// In-memory backend with a scriptable cursor.
///
/// Reads first drain the script, then follow the drift (when the simulated user
/// is moving) or return the resting cursor.
#[derive(Default)]
pub(crate) struct FakeBackend {
    state: Mutex<FakeState>,
}

#[derive(Default)]
struct FakeState {
    cursor: Point,
    script: VecDeque<Point>,
    user_moving: bool,
    fail_reads: bool,
    moves: Vec<Point>,
    taps: usize,
    reads: usize,
}

impl FakeBackend {
    pub(crate) fn at(cursor: Point) -> Self {
        let backend = Self::default();
        backend.state.lock().unwrap().cursor = cursor;
        backend
    }

    /// Queue positions returned by the next reads, in order.
    pub(crate) fn script(&self, points: impl IntoIterator<Item = Point>) {
        self.state.lock().unwrap().script.extend(points);
    }

    /// Simulate a human continuously dragging the cursor.
    pub(crate) fn set_user_moving(&self, moving: bool) {
        self.state.lock().unwrap().user_moving = moving;
    }

    pub(crate) fn set_failing(&self, failing: bool) {
        self.state.lock().unwrap().fail_reads = failing;
    }

    pub(crate) fn moves(&self) -> Vec<Point> {
        self.state.lock().unwrap().moves.clone()
    }

    pub(crate) fn taps(&self) -> usize {
        self.state.lock().unwrap().taps
    }

    pub(crate) fn reads(&self) -> usize {
        self.state.lock().unwrap().reads
    }
}

impl InputBackend for FakeBackend {
    fn cursor_position(&self) -> Result<Point, BackendError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_reads {
            return Err(BackendError::RequestFailed("display went away".to_string()));
        }

        state.reads += 1;
        if let Some(next) = state.script.pop_front() {
            state.cursor = next;
        } else if state.user_moving {
            state.cursor.x += 1;
        }
        Ok(state.cursor)
    }

    fn move_cursor(&self, to: Point) -> Result<(), BackendError> {
        let mut state = self.state.lock().unwrap();
        state.moves.push(to);
        state.cursor = to;
        Ok(())
    }

    fn tap_key(&self) -> Result<(), BackendError> {
        self.state.lock().unwrap().taps += 1;
        Ok(())
    }
}
