//! Per-condition waiters
//!
//! A waiter re-evaluates its condition on the feeds it cares about. While the
//! condition holds a stable-period timer runs; any violation cancels it and any
//! further satisfying event restarts it. An independent deadline timer, armed
//! once at construction, turns the waiter into `TimedOut` if the stable period
//! never completes.
//!
//! Every transition into a terminal phase happens under the waiter's own lock,
//! and the outcome sender is taken out of the state at that moment, so a timer
//! that fires after the waiter resolved or stopped finds nothing to do.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use log::{debug, trace, warn};
use regex::Regex;

use super::condition::WaitCondition;
use super::timer::{Timer, TimerHandle};
use super::{Feed, ListenerRegistry, SessionListener, SessionView};
use crate::error::{RteError, RteResult};
use crate::position::{Area, Position};

/// Where a waiter is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaiterPhase {
    /// Condition does not hold
    Pending,
    /// Condition holds, stable timer running
    StableCounting,
    Satisfied,
    TimedOut,
    /// Evaluation fault or session failure
    Failed,
    Stopped,
}

impl WaiterPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WaiterPhase::Satisfied | WaiterPhase::TimedOut | WaiterPhase::Failed | WaiterPhase::Stopped
        )
    }
}

/// Compiled form of a condition's predicate
#[derive(Debug)]
enum Predicate {
    KeyboardUnlocked,
    Quiet,
    CursorAt(Position),
    TextMatches { regex: Regex, area: Area },
}

impl Predicate {
    fn from_condition(condition: &WaitCondition) -> RteResult<Self> {
        match condition {
            WaitCondition::Sync(_) => Ok(Predicate::KeyboardUnlocked),
            WaitCondition::Silent(_) => Ok(Predicate::Quiet),
            WaitCondition::Cursor(c) => Ok(Predicate::CursorAt(c.position)),
            WaitCondition::Text(c) => Ok(Predicate::TextMatches {
                regex: c.regex.clone(),
                area: c.area,
            }),
            WaitCondition::Custom(c) => Err(RteError::UnsupportedOperation {
                operation: format!("wait condition '{}'", c.description),
            }),
        }
    }

    fn feeds(&self, feed: Feed) -> bool {
        match self {
            Predicate::KeyboardUnlocked => feed == Feed::Keyboard,
            Predicate::Quiet => matches!(feed, Feed::Screen | Feed::Cursor),
            Predicate::CursorAt(_) => feed == Feed::Cursor,
            Predicate::TextMatches { .. } => feed == Feed::Screen,
        }
    }

    fn holds(&self, view: &SessionView<'_>) -> RteResult<bool> {
        match self {
            Predicate::KeyboardUnlocked => Ok(!view.keyboard_locked),
            // Every update restarts the stable period, so quiet always holds
            Predicate::Quiet => Ok(true),
            Predicate::CursorAt(target) => Ok(view.cursor == Some(*target)),
            Predicate::TextMatches { regex, area } => {
                let text = view.screen.text_in(area)?;
                Ok(regex.is_match(&text))
            }
        }
    }
}

struct WaiterState {
    phase: WaiterPhase,
    /// Bumped on every stable timer (re)start; stale timers compare unequal
    generation: u64,
    stable_timer: Option<Timer>,
    deadline: Option<Timer>,
    outcome: Option<Sender<RteResult<()>>>,
}

impl WaiterState {
    fn cancel_timers(&mut self) {
        if let Some(timer) = self.stable_timer.take() {
            timer.cancel();
        }
        if let Some(timer) = self.deadline.take() {
            timer.cancel();
        }
    }
}

/// The listener half of a waiter, shared with the session and the timers
pub(crate) struct WaiterCore {
    id: u64,
    description: String,
    timeout_millis: u64,
    stable_timeout_millis: u64,
    predicate: Predicate,
    timers: TimerHandle,
    state: Mutex<WaiterState>,
    this: Weak<WaiterCore>,
}

impl WaiterCore {
    pub(crate) fn new(
        id: u64,
        condition: &WaitCondition,
        timers: TimerHandle,
        outcome: Sender<RteResult<()>>,
    ) -> RteResult<Arc<Self>> {
        let predicate = Predicate::from_condition(condition)?;
        Ok(Arc::new_cyclic(|this| Self {
            id,
            description: condition.description(),
            timeout_millis: condition.timeout_millis(),
            stable_timeout_millis: condition.stable_timeout_millis(),
            predicate,
            timers,
            state: Mutex::new(WaiterState {
                phase: WaiterPhase::Pending,
                generation: 0,
                stable_timer: None,
                deadline: None,
                outcome: Some(outcome),
            }),
            this: this.clone(),
        }))
    }

    fn lock(&self) -> MutexGuard<'_, WaiterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn phase(&self) -> WaiterPhase {
        self.lock().phase
    }

    /// Start the overall deadline. It is never extended afterwards.
    pub(crate) fn arm_deadline(&self) {
        let mut state = self.lock();
        if state.phase.is_terminal() || state.deadline.is_some() {
            return;
        }
        let this = self.this.clone();
        let timer = self
            .timers
            .schedule(Duration::from_millis(self.timeout_millis), move || {
                if let Some(core) = this.upgrade() {
                    core.on_deadline();
                }
            });
        state.deadline = Some(timer);
    }

    /// Move to `Stopped` from any phase, dropping timers and the outcome
    /// sender. Safe to call repeatedly and from any thread.
    pub(crate) fn stop(&self) {
        let mut state = self.lock();
        if state.phase != WaiterPhase::Stopped {
            trace!("waiter {} stopped in phase {:?}", self.id, state.phase);
        }
        state.phase = WaiterPhase::Stopped;
        state.cancel_timers();
        state.outcome = None;
    }

    fn evaluate(&self, view: &SessionView<'_>) {
        let verdict = match catch_unwind(AssertUnwindSafe(|| self.predicate.holds(view))) {
            Ok(Ok(holds)) => Ok(holds),
            Ok(Err(error)) => Err(RteError::InternalFault {
                context: self.description.clone(),
                message: error.to_string(),
            }),
            Err(payload) => Err(RteError::InternalFault {
                context: self.description.clone(),
                message: panic_message(payload.as_ref()),
            }),
        };

        let mut state = self.lock();
        if state.phase.is_terminal() {
            return;
        }
        match verdict {
            Ok(true) => self.restart_stable_timer(&mut state),
            Ok(false) => {
                if let Some(timer) = state.stable_timer.take() {
                    timer.cancel();
                }
                if state.phase == WaiterPhase::StableCounting {
                    trace!("waiter {} back to pending", self.id);
                }
                state.phase = WaiterPhase::Pending;
            }
            Err(error) => {
                warn!("failed evaluating '{}': {}", self.description, error);
                Self::resolve(&mut state, WaiterPhase::Failed, Err(error));
            }
        }
    }

    fn restart_stable_timer(&self, state: &mut WaiterState) {
        if let Some(timer) = state.stable_timer.take() {
            timer.cancel();
        }
        state.generation += 1;
        state.phase = WaiterPhase::StableCounting;

        let generation = state.generation;
        let this = self.this.clone();
        let timer = self
            .timers
            .schedule(Duration::from_millis(self.stable_timeout_millis), move || {
                if let Some(core) = this.upgrade() {
                    core.on_stable_period(generation);
                }
            });
        state.stable_timer = Some(timer);
    }

    fn on_stable_period(&self, generation: u64) {
        let mut state = self.lock();
        if state.phase != WaiterPhase::StableCounting || state.generation != generation {
            return;
        }
        debug!("'{}' satisfied", self.description);
        Self::resolve(&mut state, WaiterPhase::Satisfied, Ok(()));
    }

    fn on_deadline(&self) {
        let mut state = self.lock();
        if state.phase.is_terminal() {
            return;
        }
        debug!("'{}' timed out after {}ms", self.description, self.timeout_millis);
        let error = RteError::Timeout {
            condition: self.description.clone(),
            timeout_millis: self.timeout_millis,
        };
        Self::resolve(&mut state, WaiterPhase::TimedOut, Err(error));
    }

    fn resolve(state: &mut WaiterState, phase: WaiterPhase, result: RteResult<()>) {
        state.phase = phase;
        state.cancel_timers();
        if let Some(outcome) = state.outcome.take() {
            // The receiver is gone once the await returned
            let _ = outcome.send(result);
        }
    }
}

impl SessionListener for WaiterCore {
    fn id(&self) -> u64 {
        self.id
    }

    fn interested_in(&self, feed: Feed) -> bool {
        self.predicate.feeds(feed)
    }

    fn on_registered(&self, view: &SessionView<'_>) {
        self.evaluate(view);
    }

    fn on_event(&self, _feed: Feed, view: &SessionView<'_>) {
        self.evaluate(view);
    }

    fn on_failure(&self, error: &RteError) {
        let mut state = self.lock();
        if state.phase.is_terminal() {
            return;
        }
        debug!("'{}' failed: {}", self.description, error);
        Self::resolve(&mut state, WaiterPhase::Failed, Err(error.clone()));
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic while evaluating condition".to_string()
    }
}

/// A live waiter registered with a session
///
/// Dropping it stops the waiter and unregisters it.
pub(crate) struct ConditionWaiter<'a> {
    core: Arc<WaiterCore>,
    registry: &'a dyn ListenerRegistry,
}

impl<'a> ConditionWaiter<'a> {
    /// Build the waiter for `condition`, arm its deadline and register it.
    /// Registration runs the first evaluation against the current state.
    pub(crate) fn start(
        condition: &WaitCondition,
        registry: &'a dyn ListenerRegistry,
        timers: &TimerHandle,
        outcome: Sender<RteResult<()>>,
    ) -> RteResult<Self> {
        let id = registry.next_listener_id();
        let core = WaiterCore::new(id, condition, timers.clone(), outcome)?;
        core.arm_deadline();

        let listener: Arc<dyn SessionListener> = core.clone();
        if let Err(error) = registry.register(listener) {
            core.stop();
            return Err(error);
        }
        trace!("waiter {} started for '{}'", id, core.description);
        Ok(Self { core, registry })
    }

    pub(crate) fn phase(&self) -> WaiterPhase {
        self.core.phase()
    }

    /// Unregister from the session, then stop
    pub(crate) fn stop(&self) {
        self.registry.unregister(self.core.id);
        self.core.stop();
    }
}

impl Drop for ConditionWaiter<'_> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConnectionError;
    use crate::wait::condition::{
        CursorWaitCondition, CustomWaitCondition, SilentWaitCondition, SyncWaitCondition,
        TextWaitCondition,
    };
    use crate::wait::testing::{screen_with, FakeSession};
    use crate::wait::timer::TimerService;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Instant;

    fn text_condition(pattern: &str, timeout: u64, stable: u64) -> WaitCondition {
        TextWaitCondition::from_pattern(pattern, Area::from_top_left_bottom_right(1, 1, 5, 80), timeout, stable)
            .unwrap()
            .into()
    }

    #[test]
    fn test_cursor_already_in_place_needs_no_event() {
        let service = TimerService::new().unwrap();
        let session = FakeSession::new(screen_with("Sign On"));
        session.move_cursor(Position::new(6, 53));
        let (tx, rx) = mpsc::channel();
        let condition = CursorWaitCondition::new(Position::new(6, 53), 2000, 100).into();

        let started = Instant::now();
        let waiter = ConditionWaiter::start(&condition, &session, &service.handle(), tx).unwrap();
        assert_eq!(waiter.phase(), WaiterPhase::StableCounting);
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), Ok(()));
        assert!(started.elapsed() >= Duration::from_millis(100));
        assert_eq!(waiter.phase(), WaiterPhase::Satisfied);
    }

    #[test]
    fn test_non_matching_text_times_out() {
        let service = TimerService::new().unwrap();
        let session = FakeSession::new(screen_with("Sign On"));
        let (tx, rx) = mpsc::channel();
        let condition = text_condition("MAIN MENU", 150, 50);

        let started = Instant::now();
        let waiter = ConditionWaiter::start(&condition, &session, &service.handle(), tx).unwrap();
        let result = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(started.elapsed() >= Duration::from_millis(150));
        assert!(matches!(result, Err(RteError::Timeout { timeout_millis: 150, .. })));

        // Late matches do not revive the waiter
        session.set_screen(screen_with("MAIN MENU"));
        assert_eq!(waiter.phase(), WaiterPhase::TimedOut);
    }

    #[test]
    fn test_violation_cancels_stable_period() {
        let service = TimerService::new().unwrap();
        let session = FakeSession::new(screen_with("READY"));
        let (tx, rx) = mpsc::channel();
        let condition = text_condition("READY", 2000, 150);

        let waiter = ConditionWaiter::start(&condition, &session, &service.handle(), tx).unwrap();
        assert_eq!(waiter.phase(), WaiterPhase::StableCounting);
        session.set_screen(screen_with("BUSY"));
        assert_eq!(waiter.phase(), WaiterPhase::Pending);
        assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());

        session.set_screen(screen_with("READY"));
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), Ok(()));
    }

    #[test]
    fn test_sync_waits_for_keyboard_unlock() {
        let service = TimerService::new().unwrap();
        let session = FakeSession::new(screen_with(""));
        let (tx, rx) = mpsc::channel();
        let condition = SyncWaitCondition::new(2000, 50).into();

        let waiter = ConditionWaiter::start(&condition, &session, &service.handle(), tx).unwrap();
        assert_eq!(waiter.phase(), WaiterPhase::Pending);
        // Screen updates are not a sync signal
        session.set_screen(screen_with("X"));
        assert_eq!(waiter.phase(), WaiterPhase::Pending);
        session.set_keyboard_locked(false);
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), Ok(()));
    }

    #[test]
    fn test_chatty_screen_keeps_silent_from_settling() {
        let service = TimerService::new().unwrap();
        let session = FakeSession::new(screen_with(""));
        let (tx, rx) = mpsc::channel();
        let condition = SilentWaitCondition::new(300, 100).into();

        let _waiter = ConditionWaiter::start(&condition, &session, &service.handle(), tx).unwrap();
        let started = Instant::now();
        while started.elapsed() < Duration::from_millis(500) {
            session.set_screen(screen_with("tick"));
            thread::sleep(Duration::from_millis(20));
        }
        let result = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert!(matches!(result, Err(RteError::Timeout { .. })));
    }

    #[test]
    fn test_evaluation_fault_is_relayed() {
        let service = TimerService::new().unwrap();
        let session = FakeSession::new(screen_with(""));
        let (tx, rx) = mpsc::channel();
        // Row 30 does not exist on a 24 row screen
        let condition: WaitCondition =
            TextWaitCondition::from_pattern("x", Area::from_top_left_bottom_right(30, 1, 30, 10), 2000, 10)
                .unwrap()
                .into();

        let waiter = ConditionWaiter::start(&condition, &session, &service.handle(), tx).unwrap();
        assert_eq!(waiter.phase(), WaiterPhase::Failed);
        match rx.recv_timeout(Duration::from_secs(1)).unwrap() {
            Err(RteError::InternalFault { context, .. }) => assert_eq!(context, condition.description()),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_session_failure_resolves_waiter() {
        let service = TimerService::new().unwrap();
        let session = FakeSession::new(screen_with(""));
        let (tx, rx) = mpsc::channel();
        let condition = SyncWaitCondition::new(5000, 10).into();

        let waiter = ConditionWaiter::start(&condition, &session, &service.handle(), tx).unwrap();
        session.drop_connection();
        let result = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert!(matches!(result, Err(RteError::Connection(ConnectionError::Closed { .. }))));
        assert_eq!(waiter.phase(), WaiterPhase::Failed);
    }

    #[test]
    fn test_stop_is_idempotent_and_unregisters() {
        let service = TimerService::new().unwrap();
        let session = FakeSession::new(screen_with("READY"));
        let (tx, rx) = mpsc::channel();
        let condition = text_condition("READY", 2000, 100);

        let waiter = ConditionWaiter::start(&condition, &session, &service.handle(), tx).unwrap();
        assert_eq!(session.listener_count(), 1);
        waiter.stop();
        waiter.stop();
        assert_eq!(session.listener_count(), 0);
        assert_eq!(waiter.phase(), WaiterPhase::Stopped);
        // Sender dropped without an outcome
        assert!(matches!(
            rx.recv_timeout(Duration::from_millis(300)),
            Err(mpsc::RecvTimeoutError::Disconnected)
        ));
        drop(waiter);
        assert_eq!(session.listener_count(), 0);
    }

    #[test]
    fn test_custom_condition_is_unsupported() {
        let service = TimerService::new().unwrap();
        let session = FakeSession::new(screen_with(""));
        let (tx, _rx) = mpsc::channel();
        let condition = CustomWaitCondition::new("test", 1000, 100).into();

        let result = ConditionWaiter::start(&condition, &session, &service.handle(), tx);
        assert!(matches!(result, Err(RteError::UnsupportedOperation { .. })));
        assert_eq!(session.listener_count(), 0);
    }

    #[test]
    fn test_register_on_closed_session_fails() {
        let service = TimerService::new().unwrap();
        let session = FakeSession::new(screen_with(""));
        session.drop_connection();
        let (tx, _rx) = mpsc::channel();
        let condition = SyncWaitCondition::new(1000, 10).into();

        let result = ConditionWaiter::start(&condition, &session, &service.handle(), tx);
        assert!(matches!(result, Err(RteError::Connection(ConnectionError::NotConnected))));
    }
}
