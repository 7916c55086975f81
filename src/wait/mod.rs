//! Wait-condition synchronization
//!
//! `await` turns the asynchronous stream of screen, cursor and keyboard
//! changes into a blocking call. Each condition gets a waiter that registers
//! with the session as a [`SessionListener`], re-evaluates its predicate on the
//! feeds it cares about and only reports success once the predicate has held
//! for the condition's stable period. The orchestrator collects one outcome
//! per waiter and stops them all before returning.

mod condition;
mod orchestrator;
mod timer;
mod waiter;

use std::sync::Arc;

pub use condition::{
    CursorWaitCondition, CustomWaitCondition, SilentWaitCondition, SyncWaitCondition,
    TextWaitCondition, WaitCondition,
};
pub use timer::{Timer, TimerHandle, TimerService};
pub use waiter::WaiterPhase;

pub(crate) use orchestrator::await_all;

use crate::error::{RteError, RteResult};
use crate::position::Position;
use crate::screen::Screen;

/// Notification feeds a session delivers to its listeners
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feed {
    Screen,
    Cursor,
    Keyboard,
}

/// Session state as seen by a listener, consistent with the event being
/// delivered
#[derive(Debug, Clone, Copy)]
pub struct SessionView<'a> {
    pub screen: &'a Screen,
    pub cursor: Option<Position>,
    pub keyboard_locked: bool,
}

/// Something registered for session notifications
///
/// Callbacks run on the session's I/O thread with the session state locked,
/// one event at a time, in registration order.
pub trait SessionListener: Send + Sync {
    fn id(&self) -> u64;

    fn interested_in(&self, feed: Feed) -> bool;

    /// Called once, right after registration, with the current state
    fn on_registered(&self, view: &SessionView<'_>);

    fn on_event(&self, feed: Feed, view: &SessionView<'_>);

    /// The session hit an error the listener can no longer wait past
    fn on_failure(&self, error: &RteError);
}

/// Where listeners are registered
pub trait ListenerRegistry {
    /// Add `listener` and run its registration check against the current
    /// state; fails when the session is not connected
    fn register(&self, listener: Arc<dyn SessionListener>) -> RteResult<()>;

    /// Remove the listener with `id`; unknown ids are ignored
    fn unregister(&self, id: u64);

    fn next_listener_id(&self) -> u64;
}
