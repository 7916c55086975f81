//! Blocking await over a set of conditions
//!
//! All waiters share one channel. The first error received wins; success needs
//! one `Ok` per waiter. Whatever the outcome, every waiter of the call is
//! stopped before returning.

use std::sync::mpsc;

use log::{debug, trace};

use super::condition::WaitCondition;
use super::timer::TimerHandle;
use super::waiter::ConditionWaiter;
use super::ListenerRegistry;
use crate::error::{RteError, RteResult};

pub(crate) fn await_all(
    conditions: &[WaitCondition],
    registry: &dyn ListenerRegistry,
    timers: &TimerHandle,
) -> RteResult<()> {
    if conditions.is_empty() {
        return Ok(());
    }
    debug!("awaiting {} condition(s)", conditions.len());

    let (tx, rx) = mpsc::channel();
    let mut waiters = Vec::with_capacity(conditions.len());
    for condition in conditions {
        // On error the waiters started so far are dropped, which stops them
        waiters.push(ConditionWaiter::start(condition, registry, timers, tx.clone())?);
    }
    drop(tx);

    let mut outcome = Ok(());
    for _ in 0..waiters.len() {
        match rx.recv() {
            Ok(Ok(())) => continue,
            Ok(Err(error)) => {
                outcome = Err(error);
                break;
            }
            Err(mpsc::RecvError) => {
                outcome = Err(RteError::InternalFault {
                    context: "await".to_string(),
                    message: "waiters stopped without an outcome".to_string(),
                });
                break;
            }
        }
    }

    for waiter in &waiters {
        trace!("stopping waiter in phase {:?}", waiter.phase());
        waiter.stop();
    }
    outcome
}
