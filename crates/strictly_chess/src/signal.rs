//! Resettable single-consumer completion signal.
//!
//! A [`CompletionSignal`] is a oneshot that can be re-armed. Each arming
//! starts a new epoch; at most one waiter may claim an epoch, and the first
//! `complete`/`fail` of an epoch is the only one that takes effect.

use futures::future::FusedFuture;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, Waker};
use tracing::{debug, error, trace};

/// Error produced by a [`CompletionSignal`] or one of its waiters.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum SignalError {
    /// The signal was settled with a failure.
    #[display("Signal failed: {}", _0)]
    Faulted(String),

    /// A second waiter tried to claim the same arming.
    #[display("Signal already has a waiter for this arming")]
    AlreadyAwaited,

    /// The signal was re-armed before the waiter observed a result.
    #[display("Signal was re-armed before the waiter observed it")]
    Detached,

    /// `complete` or `fail` was called on an already satisfied signal.
    #[display("Signal was already satisfied; completion not applied")]
    DoubleCompletion,
}

impl std::error::Error for SignalError {}

enum SlotState<T> {
    Armed,
    Satisfied(Result<T, SignalError>),
    Consumed,
}

struct Slot<T> {
    epoch: u64,
    state: SlotState<T>,
    waker: Option<Waker>,
    claimed: bool,
}

fn lock<T>(slot: &Mutex<Slot<T>>) -> MutexGuard<'_, Slot<T>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Resettable, single-consumer future.
///
/// Cloning yields another handle to the same signal.
pub struct CompletionSignal<T> {
    slot: Arc<Mutex<Slot<T>>>,
}

impl<T> Clone for CompletionSignal<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T> std::fmt::Debug for CompletionSignal<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let slot = lock(&self.slot);
        let state = match slot.state {
            SlotState::Armed => "armed",
            SlotState::Satisfied(Ok(_)) => "satisfied",
            SlotState::Satisfied(Err(_)) => "faulted",
            SlotState::Consumed => "consumed",
        };
        f.debug_struct("CompletionSignal")
            .field("epoch", &slot.epoch)
            .field("state", &state)
            .field("claimed", &slot.claimed)
            .finish()
    }
}

impl<T> Default for CompletionSignal<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> CompletionSignal<T> {
    /// Creates an armed signal.
    pub fn new() -> Self {
        Self::with_state(SlotState::Armed)
    }

    /// Creates a signal that is already satisfied with `value`.
    pub fn satisfied(value: T) -> Self {
        Self::with_state(SlotState::Satisfied(Ok(value)))
    }

    fn with_state(state: SlotState<T>) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Slot {
                epoch: 0,
                state,
                waker: None,
                claimed: false,
            })),
        }
    }

    /// Resets to armed, discarding any stored result.
    ///
    /// A waiter attached to the previous arming is woken and resolves with
    /// [`SignalError::Detached`].
    pub fn arm(&self) {
        let waker = {
            let mut slot = lock(&self.slot);
            slot.epoch += 1;
            slot.state = SlotState::Armed;
            slot.claimed = false;
            trace!(epoch = slot.epoch, "Signal armed");
            slot.waker.take()
        };
        if let Some(waker) = waker {
            waker.wake();
        }
    }

    /// Claims this arming and returns a future for its result.
    ///
    /// # Errors
    ///
    /// Returns [`SignalError::AlreadyAwaited`] if another waiter already
    /// claimed the current arming.
    pub fn wait(&self) -> Result<SignalWait<T>, SignalError> {
        let mut slot = lock(&self.slot);
        if slot.claimed {
            error!(epoch = slot.epoch, "Second waiter on a single-consumer signal");
            return Err(SignalError::AlreadyAwaited);
        }
        slot.claimed = true;
        Ok(SignalWait {
            slot: Arc::clone(&self.slot),
            epoch: slot.epoch,
            done: false,
        })
    }

    /// Satisfies the current arming with `value`.
    ///
    /// # Errors
    ///
    /// Returns [`SignalError::DoubleCompletion`] if the signal was already
    /// satisfied. Nothing is changed in that case.
    pub fn complete(&self, value: T) -> Result<(), SignalError> {
        self.settle(Ok(value))
    }

    /// Satisfies the current arming with a failure.
    ///
    /// # Errors
    ///
    /// Returns [`SignalError::DoubleCompletion`] if the signal was already
    /// satisfied.
    pub fn fail(&self, reason: impl Into<String>) -> Result<(), SignalError> {
        self.settle(Err(SignalError::Faulted(reason.into())))
    }

    fn settle(&self, result: Result<T, SignalError>) -> Result<(), SignalError> {
        let waker = {
            let mut slot = lock(&self.slot);
            if !matches!(slot.state, SlotState::Armed) {
                error!(epoch = slot.epoch, "Signal settled twice; completion not applied");
                return Err(SignalError::DoubleCompletion);
            }
            debug!(epoch = slot.epoch, ok = result.is_ok(), "Signal satisfied");
            slot.state = SlotState::Satisfied(result);
            slot.waker.take()
        };
        if let Some(waker) = waker {
            waker.wake();
        }
        Ok(())
    }

    /// Takes a stored result without awaiting.
    ///
    /// Counts as the consumer of the current arming. Returns `None` if the
    /// signal is still armed, already consumed, or claimed by a waiter.
    pub fn try_take(&self) -> Option<Result<T, SignalError>> {
        let mut slot = lock(&self.slot);
        if slot.claimed {
            return None;
        }
        match std::mem::replace(&mut slot.state, SlotState::Consumed) {
            SlotState::Satisfied(result) => {
                slot.claimed = true;
                Some(result)
            }
            other => {
                slot.state = other;
                None
            }
        }
    }

    /// Whether the current arming has been satisfied (consumed or not).
    pub fn is_satisfied(&self) -> bool {
        !matches!(lock(&self.slot).state, SlotState::Armed)
    }

    /// Number of times the signal has been re-armed.
    pub fn epoch(&self) -> u64 {
        lock(&self.slot).epoch
    }
}

/// Future returned by [`CompletionSignal::wait`].
///
/// Dropping it before it resolves releases the claim on its arming.
#[must_use = "futures do nothing unless polled"]
pub struct SignalWait<T> {
    slot: Arc<Mutex<Slot<T>>>,
    epoch: u64,
    done: bool,
}

impl<T> Future for SignalWait<T> {
    type Output = Result<T, SignalError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(Err(SignalError::AlreadyAwaited));
        }

        let mut slot = lock(&this.slot);
        if slot.epoch != this.epoch {
            this.done = true;
            return Poll::Ready(Err(SignalError::Detached));
        }

        match std::mem::replace(&mut slot.state, SlotState::Consumed) {
            SlotState::Satisfied(result) => {
                slot.waker = None;
                this.done = true;
                Poll::Ready(result)
            }
            SlotState::Armed => {
                slot.state = SlotState::Armed;
                match &slot.waker {
                    Some(waker) if waker.will_wake(cx.waker()) => {}
                    _ => slot.waker = Some(cx.waker().clone()),
                }
                Poll::Pending
            }
            SlotState::Consumed => {
                this.done = true;
                Poll::Ready(Err(SignalError::AlreadyAwaited))
            }
        }
    }
}

impl<T> FusedFuture for SignalWait<T> {
    fn is_terminated(&self) -> bool {
        self.done
    }
}

impl<T> Drop for SignalWait<T> {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        let mut slot = lock(&self.slot);
        if slot.epoch == self.epoch {
            slot.claimed = false;
            slot.waker = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::time::Duration;

    #[test]
    fn test_complete_then_wait_observes_value() {
        let signal = CompletionSignal::new();
        signal.complete(7).unwrap();
        let value = signal.wait().unwrap().now_or_never();
        assert_eq!(value, Some(Ok(7)));
    }

    #[test]
    fn test_pending_until_completed() {
        let signal = CompletionSignal::<u8>::new();
        let mut wait = signal.wait().unwrap();
        assert!((&mut wait).now_or_never().is_none());
        signal.complete(3).unwrap();
        assert_eq!(wait.now_or_never(), Some(Ok(3)));
    }

    #[test]
    fn test_second_completion_is_not_applied() {
        let signal = CompletionSignal::new();
        assert!(signal.complete("first").is_ok());
        assert_eq!(signal.complete("second"), Err(SignalError::DoubleCompletion));
        assert_eq!(signal.fail("late"), Err(SignalError::DoubleCompletion));
        assert_eq!(signal.wait().unwrap().now_or_never(), Some(Ok("first")));
    }

    #[test]
    fn test_second_waiter_fails_fast() {
        let signal = CompletionSignal::<()>::new();
        let _first = signal.wait().unwrap();
        assert!(matches!(signal.wait(), Err(SignalError::AlreadyAwaited)));
    }

    #[test]
    fn test_dropped_waiter_releases_claim() {
        let signal = CompletionSignal::<()>::new();
        drop(signal.wait().unwrap());
        assert!(signal.wait().is_ok());
    }

    #[test]
    fn test_arm_discards_result_and_detaches_waiter() {
        let signal = CompletionSignal::new();
        let mut stale = signal.wait().unwrap();
        assert!((&mut stale).now_or_never().is_none());

        signal.arm();
        assert!(!signal.is_satisfied());
        assert_eq!(stale.now_or_never(), Some(Err(SignalError::Detached)));

        let mut fresh = signal.wait().unwrap();
        assert!((&mut fresh).now_or_never().is_none());
        signal.complete(1).unwrap();
        assert_eq!(fresh.now_or_never(), Some(Ok(1)));
        assert_eq!(signal.epoch(), 1);
    }

    #[test]
    fn test_rearm_allows_new_completion() {
        let signal = CompletionSignal::satisfied(0);
        assert_eq!(signal.try_take(), Some(Ok(0)));
        assert_eq!(signal.try_take(), None);

        signal.arm();
        signal.complete(5).unwrap();
        assert_eq!(signal.try_take(), Some(Ok(5)));
    }

    #[test]
    fn test_fail_delivers_fault() {
        let signal = CompletionSignal::<()>::new();
        signal.fail("animation crashed").unwrap();
        assert_eq!(
            signal.wait().unwrap().now_or_never(),
            Some(Err(SignalError::Faulted("animation crashed".to_string())))
        );
    }

    #[tokio::test]
    async fn test_completion_from_another_task_wakes_waiter() {
        let signal = CompletionSignal::new();
        let completer = signal.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            completer.complete("done").unwrap();
        });

        let value = signal.wait().unwrap().await;
        assert_eq!(value, Ok("done"));
        handle.await.unwrap();
    }
}
