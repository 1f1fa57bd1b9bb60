//! User activity detection by sampling the input backend.
//!
//! The cursor is polled at a fixed cadence and compared with the previous
//! sample. This is a two-sample edge detector: motion that starts and ends
//! between two samples, or that stopped before the latest sample, reads as
//! "not moving".
//!
//! Motion injected by the daemon itself is not user activity. After each
//! dispatch the scheduler calls [`ActivityWatcher::rebase`] so the next sample
//! is compared against where the injection left the cursor.
//!
//! Keyboard sensing is not implemented yet. `is_user_active` already ORs a
//! typing flag, so a keyboard sampler can be added without touching callers.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use tracing::Span;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::trace;

use crate::backend::BackendError;
use crate::backend::InputBackend;
use crate::domain::Point;

/// Default cadence for cursor sampling.
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_millis(500);

/// Samples live input state to infer whether a human is at the controls.
pub struct ActivityWatcher {
    backend: Arc<dyn InputBackend>,

    sample_interval: Duration,

    /// Cursor moved between the last two samples.
    is_moving: AtomicBool,

    /// Reserved for a keyboard sampler; never set yet.
    is_typing: AtomicBool,

    /// Position the next sample is compared against.
    reference: Mutex<Option<Point>>,

    span: Span,
}

impl ActivityWatcher {
    /// Create a new watcher. Nothing is sampled until [`start`](Self::start).
    pub fn new(backend: Arc<dyn InputBackend>, sample_interval: Duration) -> Self {
        Self {
            backend,
            sample_interval,
            is_moving: AtomicBool::new(false),
            is_typing: AtomicBool::new(false),
            reference: Mutex::new(None),
            span: tracing::info_span!("watcher"),
        }
    }

    /// Check if the user is currently driving any input device.
    ///
    /// Never blocks; reads the flags published by the sampling task.
    pub fn is_user_active(&self) -> bool {
        self.is_moving.load(Ordering::Relaxed) || self.is_typing.load(Ordering::Relaxed)
    }

    /// Take the current cursor position as the new reference and clear the
    /// motion flag.
    ///
    /// Called once synthetic input is done, so the watcher does not report the
    /// daemon's own movement as a human at the controls.
    pub fn rebase(&self) {
        let mut reference = self.reference.lock().unwrap_or_else(PoisonError::into_inner);

        match self.backend.cursor_position() {
            Ok(position) => *reference = Some(position),
            Err(e) => {
                debug!("Failed to read cursor for rebase: {}", e);
                *reference = None;
            }
        }
        self.is_moving.store(false, Ordering::Relaxed);
        trace!("Reference rebased to {:?}", *reference);
    }

    /// Start the background sampling task.
    pub fn start(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }

    /// Sample until cancelled or until the backend fails.
    ///
    /// A read failure ends sampling for good; the last published state is kept.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let span = self.span.clone();
        async move {
            let mut ticker = tokio::time::interval(self.sample_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            info!("Watcher started, sampling every {:?}", self.sample_interval);

            loop {
                tokio::select! {
                    () = cancel.cancelled() => {
                        debug!("Watcher stopped");
                        return;
                    }
                    _ = ticker.tick() => {}
                }

                if let Err(e) = self.sample() {
                    error!("Failed to sample cursor: {}. Watcher stopping.", e);
                    return;
                }
            }
        }
        .instrument(span)
        .await;
    }

    /// Read the cursor once and publish whether it moved since the reference.
    fn sample(&self) -> Result<(), BackendError> {
        let mut reference = self.reference.lock().unwrap_or_else(PoisonError::into_inner);
        let position = self.backend.cursor_position()?;

        // A missing reference is only seeded.
        if let Some(previous) = *reference {
            self.publish_motion(previous != position);
        }
        *reference = Some(position);
        Ok(())
    }

    fn publish_motion(&self, moving: bool) {
        let prev = self.is_moving.swap(moving, Ordering::Relaxed);

        if moving == prev {
            trace!("Cursor moving: {}", moving);
        } else {
            debug!("Cursor moving changed: {} -> {}", prev, moving);
        }
    }
}
