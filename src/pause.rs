//! Pause/resume state machine.
//!
//! The scheduler is either running or paused since a given instant. Only two
//! transitions exist:
//! - `pause(now)`: running -> paused, no-op when already paused
//! - `try_resume(now, ..)`: paused -> running once the user has been idle for
//!   the whole timeout; seeing the user active restarts the window

use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

/// Current scheduling state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PauseState {
    /// Activity ticks are dispatched.
    #[default]
    Running,
    /// Activity ticks are dropped.
    Paused {
        /// Start of the current idle window.
        since: Instant,
    },
}

/// Outcome of a resume check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeDecision {
    /// Nothing to do, the scheduler is running.
    NotPaused,
    /// Idle timeout has not elapsed yet.
    Waiting,
    /// The user is active; the idle window restarted.
    WindowReset,
    /// Back to running.
    Resumed,
}

impl PauseState {
    pub fn is_paused(&self) -> bool {
        matches!(self, Self::Paused { .. })
    }

    /// When the current idle window started, if paused.
    pub fn paused_at(&self) -> Option<Instant> {
        match self {
            Self::Running => None,
            Self::Paused { since } => Some(*since),
        }
    }

    /// Pause at `now`. Returns false (and keeps the original instant) when
    /// already paused.
    pub fn pause(&mut self, now: Instant) -> bool {
        if let Self::Paused { since } = self {
            debug!("Already paused since {:?}", since);
            return false;
        }

        *self = Self::Paused { since: now };
        true
    }

    /// Resume if the user has been inactive for at least `idle_timeout`.
    ///
    /// Idle time is a sliding window: any check that sees the user active
    /// restarts it at `now`, whether or not the timeout had elapsed.
    pub fn try_resume(
        &mut self,
        now: Instant,
        idle_timeout: Duration,
        user_active: bool,
    ) -> ResumeDecision {
        let Self::Paused { since } = *self else {
            return ResumeDecision::NotPaused;
        };

        if user_active {
            debug!("User active while paused, restarting idle window");
            *self = Self::Paused { since: now };
            return ResumeDecision::WindowReset;
        }

        let elapsed = now.saturating_duration_since(since);
        if elapsed < idle_timeout {
            return ResumeDecision::Waiting;
        }

        debug!("User idle for {:?} >= {:?}, resuming", elapsed, idle_timeout);
        *self = Self::Running;
        ResumeDecision::Resumed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IDLE: Duration = Duration::from_secs(10);

    #[test]
    fn test_initial_state_running() {
        let state = PauseState::default();
        assert!(!state.is_paused());
        assert_eq!(state.paused_at(), None);
    }

    #[test]
    fn test_pause_records_instant() {
        let t0 = Instant::now();
        let mut state = PauseState::default();

        assert!(state.pause(t0));
        assert!(state.is_paused());
        assert_eq!(state.paused_at(), Some(t0));
    }

    #[test]
    fn test_pause_is_idempotent() {
        let t0 = Instant::now();
        let mut state = PauseState::default();

        assert!(state.pause(t0));
        assert!(!state.pause(t0 + Duration::from_millis(1)));
        assert_eq!(state.paused_at(), Some(t0));
    }

    #[test]
    fn test_resume_when_running_is_noop() {
        let mut state = PauseState::default();
        let decision = state.try_resume(Instant::now(), IDLE, false);
        assert_eq!(decision, ResumeDecision::NotPaused);
        assert_eq!(state, PauseState::Running);
    }

    #[test]
    fn test_waits_for_full_timeout() {
        let t0 = Instant::now();
        let mut state = PauseState::Paused { since: t0 };

        let decision = state.try_resume(t0 + Duration::from_secs(9), IDLE, false);
        assert_eq!(decision, ResumeDecision::Waiting);
        assert_eq!(state.paused_at(), Some(t0));
    }

    #[test]
    fn test_resumes_at_exact_timeout() {
        let t0 = Instant::now();
        let mut state = PauseState::Paused { since: t0 };

        let decision = state.try_resume(t0 + IDLE, IDLE, false);
        assert_eq!(decision, ResumeDecision::Resumed);
        assert_eq!(state, PauseState::Running);
    }

    #[test]
    fn test_active_user_restarts_window() {
        let t0 = Instant::now();
        let mut state = PauseState::Paused { since: t0 };

        let t1 = t0 + Duration::from_secs(11);
        let decision = state.try_resume(t1, IDLE, true);
        assert_eq!(decision, ResumeDecision::WindowReset);
        assert_eq!(state.paused_at(), Some(t1));

        // The old deadline no longer counts.
        let decision = state.try_resume(t1 + Duration::from_secs(5), IDLE, false);
        assert_eq!(decision, ResumeDecision::Waiting);

        let decision = state.try_resume(t1 + IDLE, IDLE, false);
        assert_eq!(decision, ResumeDecision::Resumed);
    }

    #[test]
    fn test_active_user_before_timeout_restarts_window() {
        let t0 = Instant::now();
        let mut state = PauseState::Paused { since: t0 };

        let t1 = t0 + Duration::from_secs(3);
        let decision = state.try_resume(t1, IDLE, true);
        assert_eq!(decision, ResumeDecision::WindowReset);
        assert_eq!(state.paused_at(), Some(t1));

        let decision = state.try_resume(t0 + IDLE, IDLE, false);
        assert_eq!(decision, ResumeDecision::Waiting);
    }
}
