//! Synthetic input execution.
//!
//! A [`MovementExecutor`] turns a dispatched activity into injected input. The
//! backend-driven [`Mover`] traces small closed shapes and backs off as soon as
//! it notices a human on the cursor.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;
use tracing::info;
use tracing::trace;

use crate::backend::BackendError;
use crate::backend::InputBackend;
use crate::domain::Offset;
use crate::domain::Pattern;
use crate::domain::Point;

/// Interpolated warps per edge.
pub const STEPS: u32 = 10;

/// Pause between two warps.
pub const STEP_DELAY: Duration = Duration::from_millis(50);

/// Edge length in pixels.
pub const DISTANCE: i32 = 10;

/// Drift from the expected position still attributed to rounding.
pub const TOLERANCE: i32 = 5;

/// Gap between the two samples of the pre-flight motion check.
const SETTLE_DELAY: Duration = Duration::from_millis(10);

/// Errors reported by a movement attempt.
#[derive(Error, Debug)]
pub enum MovementError {
    #[error("Movement interrupted by user cursor activity")]
    UserInterrupted,

    #[error("User is already moving the cursor")]
    UserAlreadyMoving,

    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl MovementError {
    /// Returns true for outcomes caused by a human on the cursor.
    ///
    /// These are expected at runtime and are not failures of the daemon.
    pub fn is_user_contention(&self) -> bool {
        matches!(self, Self::UserInterrupted | Self::UserAlreadyMoving)
    }
}

/// Duration of one full trace of `pattern`, from its step count and delay.
pub fn estimated_duration(pattern: Pattern) -> Duration {
    STEP_DELAY * (pattern.edges() * STEPS)
}

/// Trait for components that inject activity input.
#[async_trait]
pub trait MovementExecutor: Send + Sync {
    /// How long one [`perform`](Self::perform) of `pattern` takes.
    fn estimated_duration(&self, pattern: Pattern) -> Duration;

    /// Trace `pattern` with the cursor, ending where it started.
    async fn perform(&self, pattern: Pattern) -> Result<(), MovementError>;

    /// Tap a key with no visible effect.
    async fn tap_key(&self) -> Result<(), MovementError>;
}

/// Movement executor driving a real input backend.
pub struct Mover {
    backend: Arc<dyn InputBackend>,
}

impl Mover {
    /// Create a new mover on top of `backend`.
    pub fn new(backend: Arc<dyn InputBackend>) -> Self {
        Self { backend }
    }

    /// Walk one edge in [`STEPS`] warps, checking for user interference first.
    async fn trace_edge(
        &self,
        start: Point,
        end: Point,
        expected: &mut Point,
    ) -> Result<(), MovementError> {
        let steps = i32::try_from(STEPS).unwrap_or(i32::MAX);

        for i in 1..=steps {
            let current = self.backend.cursor_position()?;
            if !current.is_near(*expected, TOLERANCE) {
                debug!("Cursor at {} but expected {}", current, expected);
                return Err(MovementError::UserInterrupted);
            }

            let next = Point::new(
                start.x + (end.x - start.x) * i / steps,
                start.y + (end.y - start.y) * i / steps,
            );
            self.backend.move_cursor(next)?;
            *expected = next;

            tokio::time::sleep(STEP_DELAY).await;
        }

        Ok(())
    }
}

#[async_trait]
impl MovementExecutor for Mover {
    fn estimated_duration(&self, pattern: Pattern) -> Duration {
        estimated_duration(pattern)
    }

    async fn perform(&self, pattern: Pattern) -> Result<(), MovementError> {
        let origin = self.backend.cursor_position()?;

        // Re-check right before injecting: time has passed since the tick.
        tokio::time::sleep(SETTLE_DELAY).await;
        if self.backend.cursor_position()? != origin {
            return Err(MovementError::UserAlreadyMoving);
        }

        trace!("Tracing {} from {}", pattern, origin);

        let mut expected = origin;
        let mut from = Offset::ORIGIN;
        for waypoint in pattern.waypoints(DISTANCE) {
            self.trace_edge(origin.offset(from), origin.offset(waypoint), &mut expected)
                .await?;
            from = waypoint;
        }

        Ok(())
    }

    async fn tap_key(&self) -> Result<(), MovementError> {
        self.backend.tap_key()?;
        Ok(())
    }
}

/// Executor that logs what it would do without touching any device.
#[derive(Debug, Default)]
pub struct DryRunExecutor;

#[async_trait]
impl MovementExecutor for DryRunExecutor {
    fn estimated_duration(&self, pattern: Pattern) -> Duration {
        estimated_duration(pattern)
    }

    async fn perform(&self, pattern: Pattern) -> Result<(), MovementError> {
        info!("[DRY RUN] Would trace a {} with the cursor", pattern);
        Ok(())
    }

    async fn tap_key(&self) -> Result<(), MovementError> {
        info!("[DRY RUN] Would tap a key");
        Ok(())
    }
}
