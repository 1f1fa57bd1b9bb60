//! Activity scheduler.
//!
//! Every enabled activity gets its own timer task forwarding ticks into one
//! channel. A single decision loop consumes those ticks together with the
//! pause-check and resume-check timers, so pause state is only ever written
//! from one place.
//!
//! Dispatch policy for an activity tick:
//! 1. paused: drop the tick (missed intervals are not caught up)
//! 2. user active: drop the tick, pausing first when configured to
//! 3. otherwise hand the activity to the movement executor

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::PoisonError;
use std::sync::RwLock;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use tracing::Span;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::config::Activity;
use crate::config::Behavior;
use crate::config::ConfigError;
use crate::config::Schedule;
use crate::domain::ActivityId;
use crate::domain::Kind;
use crate::domain::Pattern;
use crate::movement::MovementExecutor;
use crate::pause::PauseState;
use crate::pause::ResumeDecision;
use crate::watcher::ActivityWatcher;

/// Cadence of the check that pauses on user activity between ticks.
pub const PAUSE_CHECK_INTERVAL: Duration = Duration::from_millis(500);

/// Cadence of the check that resumes after the idle timeout.
pub const RESUME_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// What a dispatched activity does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Move(Pattern),
    TapKey,
}

/// An activity accepted for arming.
#[derive(Debug)]
struct ArmedActivity {
    action: Action,
    interval: Duration,
    schedule: Option<Schedule>,
}

/// Multiplexes recurring activities and arbitrates the pause state.
pub struct Scheduler {
    behavior: Behavior,
    activities: BTreeMap<ActivityId, ArmedActivity>,
    watcher: Arc<ActivityWatcher>,
    executor: Arc<dyn MovementExecutor>,
    state: RwLock<PauseState>,
    span: Span,
}

impl Scheduler {
    /// Build a scheduler for the enabled `activities`.
    ///
    /// Refuses activities that could not finish before their next tick, mouse
    /// activities without a pattern, and duplicate ids. Disabled activities are
    /// not armed.
    pub fn new(
        behavior: Behavior,
        activities: Vec<Activity>,
        watcher: Arc<ActivityWatcher>,
        executor: Arc<dyn MovementExecutor>,
    ) -> Result<Self, ConfigError> {
        let span = tracing::info_span!("scheduler");
        let mut armed = BTreeMap::new();
        let mut seen = Vec::with_capacity(activities.len());

        for activity in activities {
            let id = activity.id();
            if seen.contains(&id) {
                return Err(ConfigError::DuplicateId(id));
            }
            seen.push(id.clone());

            if !activity.enabled {
                debug!(parent: &span, "Activity '{}' is not enabled", id);
                continue;
            }

            let (action, estimated) = match (activity.kind, activity.pattern) {
                (Kind::Mouse, Some(pattern)) => {
                    (Action::Move(pattern), executor.estimated_duration(pattern))
                }
                (Kind::Mouse, None) => return Err(ConfigError::MissingPattern(id)),
                (Kind::Keyboard, _) => (Action::TapKey, Duration::ZERO),
            };

            let interval = activity.interval();
            if estimated >= interval {
                return Err(ConfigError::DurationExceedsInterval {
                    id,
                    estimated,
                    interval,
                });
            }

            debug!(parent: &span, "Arming activity '{}' every {:?}", id, interval);
            armed.insert(
                id,
                ArmedActivity {
                    action,
                    interval,
                    schedule: activity.schedule,
                },
            );
        }

        Ok(Self {
            behavior,
            activities: armed,
            watcher,
            executor,
            state: RwLock::new(PauseState::default()),
            span,
        })
    }

    /// Snapshot of the current pause state.
    pub fn pause_state(&self) -> PauseState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Ids of the activities that get a timer.
    pub fn armed(&self) -> impl Iterator<Item = &ActivityId> {
        self.activities.keys()
    }

    /// Run until `shutdown` is cancelled.
    ///
    /// Starts the watcher and one timer task per armed activity, then serves
    /// ticks from a single loop. On shutdown every spawned task is cancelled
    /// and joined before returning.
    pub async fn run(&self, shutdown: CancellationToken) {
        let span = self.span.clone();
        self.event_loop(shutdown).instrument(span).await;
    }

    async fn event_loop(&self, shutdown: CancellationToken) {
        let tasks_cancel = shutdown.child_token();
        let mut tasks = JoinSet::new();

        tasks.spawn(self.watcher.clone().run(tasks_cancel.clone()));

        let (tx, mut ticks) = mpsc::channel(self.activities.len().max(1));
        for (id, activity) in &self.activities {
            let timer_span = tracing::debug_span!(parent: &self.span, "timer", activity = %id);
            tasks.spawn(
                forward_ticks(id.clone(), activity.interval, tx.clone(), tasks_cancel.clone())
                    .instrument(timer_span),
            );
        }
        drop(tx);

        let mut pause_check = tokio::time::interval(PAUSE_CHECK_INTERVAL);
        pause_check.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut resume_check = tokio::time::interval(RESUME_CHECK_INTERVAL);
        resume_check.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Scheduler started with {} activit{}",
            self.activities.len(),
            if self.activities.len() == 1 { "y" } else { "ies" }
        );

        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    info!("Shutdown requested, stopping scheduler");
                    break;
                }

                Some(id) = ticks.recv() => self.handle_tick(&id).await,

                _ = pause_check.tick(), if self.behavior.pause_when_user_is_active => {
                    if !self.pause_state().is_paused() && self.watcher.is_user_active() {
                        self.pause();
                    }
                }

                _ = resume_check.tick(), if self.behavior.resume_after_inactivity => {
                    self.check_resume();
                }
            }
        }

        tasks_cancel.cancel();
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                warn!("Background task ended abnormally: {}", e);
            }
        }
        debug!("All background tasks joined");
    }

    /// Apply the dispatch policy to one activity tick.
    async fn handle_tick(&self, id: &ActivityId) {
        let Some(activity) = self.activities.get(id) else {
            return;
        };

        if self.pause_state().is_paused() {
            debug!("Paused, dropping tick for '{}'", id);
            return;
        }

        if self.watcher.is_user_active() {
            if self.behavior.pause_when_user_is_active {
                self.pause();
            }
            debug!("User is active, dropping tick for '{}'", id);
            return;
        }

        if let Some(ref schedule) = activity.schedule
            && !schedule.contains(chrono::Local::now().naive_local())
        {
            debug!("Activity '{}' runs outside its advisory schedule", id);
        }

        self.dispatch(id, activity.action).await;
    }

    async fn dispatch(&self, id: &ActivityId, action: Action) {
        let result = match action {
            Action::Move(pattern) => self.executor.perform(pattern).await,
            Action::TapKey => self.executor.tap_key().await,
        };

        match result {
            Ok(()) => match action {
                Action::Move(pattern) => info!("Activity '{}' traced a {}", id, pattern),
                Action::TapKey => info!("Activity '{}' tapped a key", id),
            },
            Err(e) if e.is_user_contention() => info!("Activity '{}' skipped: {}", id, e),
            Err(e) => error!("Activity '{}' failed: {}", id, e),
        }

        // Whatever the outcome, the injected input is not the user's.
        self.watcher.rebase();
    }

    fn pause(&self) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.pause(Instant::now()) {
            info!("User is active, pausing");
        }
    }

    fn check_resume(&self) {
        let user_active = self.watcher.is_user_active();
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);

        match state.try_resume(Instant::now(), self.behavior.idle_timeout(), user_active) {
            ResumeDecision::Resumed => info!(
                "No user activity for {:?}, resuming",
                self.behavior.idle_timeout()
            ),
            ResumeDecision::WindowReset => debug!("User still active, idle window restarted"),
            ResumeDecision::NotPaused | ResumeDecision::Waiting => {}
        }
    }
}

/// Forward one tick per `interval` for `id`, the first one interval from now.
async fn forward_ticks(
    id: ActivityId,
    interval: Duration,
    tx: mpsc::Sender<ActivityId>,
    cancel: CancellationToken,
) {
    let mut timer = tokio::time::interval_at(Instant::now() + interval, interval);
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            () = cancel.cancelled() => return,
            _ = timer.tick() => {}
        }

        tokio::select! {
            () = cancel.cancelled() => return,
            sent = tx.send(id.clone()) => {
                if sent.is_err() {
                    return;
                }
            }
        }
    }
}
