//! Animation barrier.
//!
//! [`AnimationSynchronizer`] plays [`AnimationTask`]s one at a time in the
//! order they were enqueued and lets the turn loop wait until every queued
//! task has finished.

use crate::oracle::BoardChange;
use crate::signal::{CompletionSignal, SignalError};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, error, instrument, trace, warn};

/// Sequence number assigned to a task at enqueue time.
pub type TaskId = u64;

/// An opaque unit of visual work.
///
/// The synchronizer calls [`start`](Self::start) exactly once, when the task
/// reaches the front of the queue. The task reports the end of its work
/// through the [`TaskCompletion`] it is handed, from any thread.
pub trait AnimationTask: Send + 'static {
    /// Begins the work.
    fn start(self: Box<Self>, done: TaskCompletion);
}

impl<F> AnimationTask for F
where
    F: FnOnce(TaskCompletion) + Send + 'static,
{
    fn start(self: Box<Self>, done: TaskCompletion) {
        (*self)(done)
    }
}

/// Translates one board change into one animation task.
pub trait Animator: Send + Sync {
    /// Builds the task animating `change`.
    fn animate(&self, change: &BoardChange) -> Box<dyn AnimationTask>;
}

/// Animator whose tasks finish as soon as they start.
///
/// Useful for headless sessions where nothing is rendered.
#[derive(Debug, Clone, Copy, Default)]
pub struct InstantAnimator;

impl Animator for InstantAnimator {
    fn animate(&self, change: &BoardChange) -> Box<dyn AnimationTask> {
        let change = *change;
        Box::new(move |done: TaskCompletion| {
            trace!(?change, "Instant animation");
            done.finish();
        })
    }
}

/// Animator whose tasks each take a fixed time on the tokio runtime.
///
/// Must be used from within a tokio runtime.
#[derive(Debug, Clone, Copy)]
pub struct TimedAnimator {
    duration: Duration,
}

impl TimedAnimator {
    /// Creates an animator whose tasks last `duration`.
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }
}

impl Animator for TimedAnimator {
    fn animate(&self, change: &BoardChange) -> Box<dyn AnimationTask> {
        let change = *change;
        let duration = self.duration;
        Box::new(move |done: TaskCompletion| {
            tokio::spawn(async move {
                tokio::time::sleep(duration).await;
                trace!(?change, task_id = done.id(), "Timed animation finished");
                done.finish();
            });
        })
    }
}

struct Queued {
    id: TaskId,
    task: Box<dyn AnimationTask>,
}

struct QueueState {
    current: Option<TaskId>,
    pending: VecDeque<Queued>,
    idle: CompletionSignal<()>,
    next_id: TaskId,
    /// Failure not yet reported by [`AnimationSynchronizer::wait_until_idle`].
    fault: Option<SignalError>,
    /// Some caller is inside [`AnimationSynchronizer::drive`].
    driving: bool,
    /// Next task to start, handed to the caller that is driving.
    handoff: Option<Queued>,
}

impl QueueState {
    fn is_idle(&self) -> bool {
        self.current.is_none() && self.pending.is_empty()
    }

    /// Claims the right to start `task`, or hands it to the active driver.
    fn dispatch(&mut self, task: Queued) -> Option<Queued> {
        if self.driving {
            self.handoff = Some(task);
            None
        } else {
            self.driving = true;
            Some(task)
        }
    }
}

/// FIFO barrier over animation tasks.
///
/// Cloning yields another handle to the same queue.
#[derive(Clone)]
pub struct AnimationSynchronizer {
    state: Arc<Mutex<QueueState>>,
}

impl std::fmt::Debug for AnimationSynchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("AnimationSynchronizer")
            .field("current", &state.current)
            .field("pending", &state.pending.len())
            .field("idle", &state.idle)
            .field("fault", &state.fault)
            .finish()
    }
}

impl Default for AnimationSynchronizer {
    fn default() -> Self {
        Self::new()
    }
}

impl AnimationSynchronizer {
    /// Creates an idle synchronizer.
    #[instrument]
    pub fn new() -> Self {
        debug!("Creating animation synchronizer");
        Self {
            state: Arc::new(Mutex::new(QueueState {
                current: None,
                pending: VecDeque::new(),
                idle: CompletionSignal::satisfied(()),
                next_id: 0,
                fault: None,
                driving: false,
                handoff: None,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queues a task, starting it at once if nothing is playing.
    ///
    /// Re-arms the idle signal when the queue goes from idle to busy. While a
    /// failure is waiting to be reported by
    /// [`wait_until_idle`](Self::wait_until_idle), new tasks are dropped
    /// without being started.
    pub fn enqueue(&self, task: Box<dyn AnimationTask>) -> TaskId {
        let (id, start_now, dropped) = {
            let mut state = self.lock();
            let id = state.next_id;
            state.next_id += 1;

            if state.fault.is_some() {
                debug!(task_id = id, "Queue faulted; dropping animation");
                (id, None, Some(task))
            } else if state.current.is_none() {
                state.idle.arm();
                state.current = Some(id);
                (id, state.dispatch(Queued { id, task }), None)
            } else {
                state.pending.push_back(Queued { id, task });
                trace!(task_id = id, pending = state.pending.len(), "Animation queued");
                (id, None, None)
            }
        };
        drop(dropped);

        if let Some(first) = start_now {
            self.drive(first);
        }
        id
    }

    /// Starts `first`, then every task handed off while a start was running.
    ///
    /// Tasks that finish inside `start` hand their successor back here
    /// instead of starting it themselves, so the stack stays flat.
    fn drive(&self, first: Queued) {
        let mut next = Some(first);
        while let Some(Queued { id, task }) = next {
            debug!(task_id = id, "Starting animation");
            task.start(TaskCompletion {
                synchronizer: self.clone(),
                id,
                settled: false,
            });

            let mut state = self.lock();
            next = state.handoff.take();
            if next.is_none() {
                state.driving = false;
            }
        }
    }

    fn on_task_finished(&self, id: TaskId, outcome: Result<(), String>) {
        let mut discarded = VecDeque::new();
        let next = {
            let mut state = self.lock();
            if state.current != Some(id) {
                error!(task_id = id, current = ?state.current, "Completion from a task that is not playing");
                return;
            }

            match outcome {
                Ok(()) => match state.pending.pop_front() {
                    Some(next) => {
                        state.current = Some(next.id);
                        state.dispatch(next)
                    }
                    None => {
                        state.current = None;
                        if let Err(e) = state.idle.complete(()) {
                            error!(task_id = id, error = %e, "Idle signal was already satisfied");
                        }
                        debug!(task_id = id, "Animation queue drained");
                        None
                    }
                },
                Err(reason) => {
                    std::mem::swap(&mut discarded, &mut state.pending);
                    state.current = None;
                    warn!(
                        task_id = id,
                        discarded = discarded.len(),
                        reason = %reason,
                        "Animation failed; dropping queued animations"
                    );
                    state.fault = Some(SignalError::Faulted(reason));
                    // Wakes a parked waiter, which then reports the fault.
                    if let Err(e) = state.idle.complete(()) {
                        error!(task_id = id, error = %e, "Idle signal was already satisfied");
                    }
                    None
                }
            }
        };
        drop(discarded);

        if let Some(next) = next {
            self.drive(next);
        }
    }

    /// Waits until no task is playing and none are queued.
    ///
    /// Resolves immediately when already idle.
    ///
    /// # Errors
    ///
    /// Returns [`SignalError::Faulted`] if an animation failed since the
    /// last call, or [`SignalError::AlreadyAwaited`] if another caller is
    /// already waiting.
    pub async fn wait_until_idle(&self) -> Result<(), SignalError> {
        loop {
            let wait = {
                let mut state = self.lock();
                if let Some(fault) = state.fault.take() {
                    return Err(fault);
                }
                if state.is_idle() {
                    return match state.idle.try_take() {
                        Some(Err(e)) => Err(e),
                        _ => Ok(()),
                    };
                }
                state.idle.wait()?
            };

            match wait.await {
                Err(SignalError::Detached) => {
                    debug!("Idle signal re-armed before it was observed; waiting again");
                }
                Ok(()) => {
                    return match self.lock().fault.take() {
                        Some(fault) => Err(fault),
                        None => Ok(()),
                    };
                }
                other => return other,
            }
        }
    }

    /// Whether nothing is playing or queued.
    pub fn is_idle(&self) -> bool {
        self.lock().is_idle()
    }

    /// Number of tasks waiting behind the current one.
    pub fn pending_len(&self) -> usize {
        self.lock().pending.len()
    }

    /// The task currently playing, if any.
    pub fn current(&self) -> Option<TaskId> {
        self.lock().current
    }
}

/// Completion handle given to a started [`AnimationTask`].
///
/// Dropping it without calling [`finish`](Self::finish) or
/// [`fail`](Self::fail) counts as a failure, so a lost handle cannot stall
/// the queue forever.
#[must_use = "an animation that never reports completion fails the queue"]
pub struct TaskCompletion {
    synchronizer: AnimationSynchronizer,
    id: TaskId,
    settled: bool,
}

impl std::fmt::Debug for TaskCompletion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskCompletion").field("id", &self.id).finish()
    }
}

impl TaskCompletion {
    /// Id of the task this handle belongs to.
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Reports that the task finished; starts the next queued task.
    pub fn finish(mut self) {
        self.settled = true;
        self.synchronizer.on_task_finished(self.id, Ok(()));
    }

    /// Reports that the task failed.
    pub fn fail(mut self, reason: impl Into<String>) {
        self.settled = true;
        self.synchronizer.on_task_finished(self.id, Err(reason.into()));
    }
}

impl Drop for TaskCompletion {
    fn drop(&mut self) {
        if !self.settled {
            self.settled = true;
            self.synchronizer.on_task_finished(
                self.id,
                Err(format!("animation task {} dropped before finishing", self.id)),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;

    /// Collects start order and parks completions for the test to release.
    #[derive(Clone, Default)]
    struct Harness {
        started: Arc<Mutex<Vec<usize>>>,
        parked: Arc<Mutex<VecDeque<TaskCompletion>>>,
    }

    impl Harness {
        fn task(&self, label: usize) -> Box<dyn AnimationTask> {
            let harness = self.clone();
            Box::new(move |done: TaskCompletion| {
                harness.started.lock().unwrap().push(label);
                harness.parked.lock().unwrap().push_back(done);
            })
        }

        fn finish_current(&self) {
            let done = self.parked.lock().unwrap().pop_front().unwrap();
            done.finish();
        }

        fn started(&self) -> Vec<usize> {
            self.started.lock().unwrap().clone()
        }
    }

    #[test]
    fn test_fifo_barrier_scenario() {
        let sync = AnimationSynchronizer::new();
        let harness = Harness::default();

        sync.enqueue(harness.task(1));
        sync.enqueue(harness.task(2));
        sync.enqueue(harness.task(3));
        assert_eq!(harness.started(), vec![1]);
        assert_eq!(sync.pending_len(), 2);

        let mut idle = Box::pin(sync.wait_until_idle());
        assert!((&mut idle).now_or_never().is_none());

        harness.finish_current();
        assert_eq!(harness.started(), vec![1, 2]);
        harness.finish_current();
        assert_eq!(harness.started(), vec![1, 2, 3]);
        assert!(!sync.is_idle());

        harness.finish_current();
        assert!(sync.is_idle());
        assert_eq!(idle.now_or_never(), Some(Ok(())));
    }

    #[test]
    fn test_wait_resolves_immediately_when_idle() {
        let sync = AnimationSynchronizer::new();
        assert_eq!(sync.wait_until_idle().now_or_never(), Some(Ok(())));
        assert_eq!(sync.wait_until_idle().now_or_never(), Some(Ok(())));
    }

    #[test]
    fn test_enqueue_rearms_idle_after_consumed_signal() {
        let sync = AnimationSynchronizer::new();
        let harness = Harness::default();

        sync.enqueue(harness.task(1));
        harness.finish_current();
        assert_eq!(sync.wait_until_idle().now_or_never(), Some(Ok(())));

        sync.enqueue(harness.task(2));
        let mut idle = Box::pin(sync.wait_until_idle());
        assert!((&mut idle).now_or_never().is_none());
        harness.finish_current();
        assert_eq!(idle.now_or_never(), Some(Ok(())));
    }

    #[test]
    fn test_synchronous_completion_runs_whole_queue() {
        let sync = AnimationSynchronizer::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for label in 0..5 {
            let order = Arc::clone(&order);
            sync.enqueue(Box::new(move |done: TaskCompletion| {
                order.lock().unwrap().push(label);
                done.finish();
            }));
        }
        assert!(sync.is_idle());
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_failed_task_faults_waiter_and_discards_queue() {
        let sync = AnimationSynchronizer::new();
        let harness = Harness::default();

        sync.enqueue(Box::new(|done: TaskCompletion| done.fail("tween aborted")));
        assert!(sync.is_idle());
        assert_eq!(
            sync.wait_until_idle().now_or_never(),
            Some(Err(SignalError::Faulted("tween aborted".to_string())))
        );

        sync.enqueue(harness.task(1));
        sync.enqueue(harness.task(2));
        let parked = harness.parked.lock().unwrap().pop_front().unwrap();
        parked.fail("second failure");
        assert!(sync.is_idle());
        assert_eq!(harness.started(), vec![1]);
        assert!(matches!(
            sync.wait_until_idle().now_or_never(),
            Some(Err(SignalError::Faulted(_)))
        ));
        assert_eq!(sync.wait_until_idle().now_or_never(), Some(Ok(())));
    }

    #[test]
    fn test_fault_survives_later_enqueues() {
        let sync = AnimationSynchronizer::new();
        let harness = Harness::default();

        sync.enqueue(Box::new(|done: TaskCompletion| done.fail("tween aborted")));
        sync.enqueue(Box::new(|done: TaskCompletion| done.finish()));
        sync.enqueue(harness.task(1));

        assert!(harness.started().is_empty());
        assert!(sync.is_idle());
        assert_eq!(
            sync.wait_until_idle().now_or_never(),
            Some(Err(SignalError::Faulted("tween aborted".to_string())))
        );

        sync.enqueue(harness.task(2));
        assert_eq!(harness.started(), vec![2]);
    }

    #[test]
    fn test_parked_waiter_sees_fault_from_queued_task() {
        let sync = AnimationSynchronizer::new();
        let harness = Harness::default();

        sync.enqueue(harness.task(1));
        sync.enqueue(Box::new(|done: TaskCompletion| done.fail("sprite missing")));
        sync.enqueue(harness.task(3));

        let mut idle = Box::pin(sync.wait_until_idle());
        assert!((&mut idle).now_or_never().is_none());

        harness.finish_current();
        assert_eq!(
            idle.now_or_never(),
            Some(Err(SignalError::Faulted("sprite missing".to_string())))
        );
        assert_eq!(harness.started(), vec![1]);
        assert_eq!(sync.wait_until_idle().now_or_never(), Some(Ok(())));
    }

    #[test]
    fn test_long_synchronous_chain_behind_parked_task() {
        let sync = AnimationSynchronizer::new();
        let harness = Harness::default();
        let finished = Arc::new(std::sync::atomic::AtomicUsize::new(0));

        sync.enqueue(harness.task(0));
        for _ in 0..50_000 {
            let finished = Arc::clone(&finished);
            sync.enqueue(Box::new(move |done: TaskCompletion| {
                finished.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                done.finish();
            }));
        }
        assert_eq!(sync.pending_len(), 50_000);

        harness.finish_current();
        assert_eq!(finished.load(std::sync::atomic::Ordering::SeqCst), 50_000);
        assert!(sync.is_idle());
        assert_eq!(sync.wait_until_idle().now_or_never(), Some(Ok(())));
    }

    #[test]
    fn test_dropped_completion_counts_as_failure() {
        let sync = AnimationSynchronizer::new();
        sync.enqueue(Box::new(|done: TaskCompletion| drop(done)));
        assert!(matches!(
            sync.wait_until_idle().now_or_never(),
            Some(Err(SignalError::Faulted(_)))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_fifo_order_with_completions_from_other_threads() {
        let sync = AnimationSynchronizer::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let active = Arc::new(std::sync::atomic::AtomicUsize::new(0));

        for label in 0..64usize {
            let order = Arc::clone(&order);
            let active = Arc::clone(&active);
            sync.enqueue(Box::new(move |done: TaskCompletion| {
                let playing = active.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                assert_eq!(playing, 0, "two animations playing at once");
                order.lock().unwrap().push(label);
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_micros((label % 7) as u64 * 50)).await;
                    active.fetch_sub(1, std::sync::atomic::Ordering::SeqCst);
                    done.finish();
                });
            }));
            if label % 5 == 0 {
                tokio::task::yield_now().await;
            }
        }

        sync.wait_until_idle().await.unwrap();
        assert_eq!(*order.lock().unwrap(), (0..64).collect::<Vec<_>>());
    }
}
