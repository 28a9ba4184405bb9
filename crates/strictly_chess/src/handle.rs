//! Handle the presentation layer uses to observe and steer a running game.

use crate::agents::{MoveSubmitter, SubmitError};
use crate::orchestrator::{GamePhase, TerminalReport};
use crate::types::{Move, Side};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

/// Read-only view of the session for rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameSnapshot {
    /// Notation of the current position; empty before initialization.
    pub position: String,
    /// Side whose turn it is.
    pub side_to_move: Side,
    /// Moves applied so far in this session.
    pub moves_played: usize,
    /// Most recently applied move.
    pub last_move: Option<Move>,
    /// Where the state machine is.
    pub phase: GamePhase,
}

impl Default for GameSnapshot {
    fn default() -> Self {
        Self {
            position: String::new(),
            side_to_move: Side::White,
            moves_played: 0,
            last_move: None,
            phase: GamePhase::Initializing,
        }
    }
}

type TerminalCallback = Box<dyn FnOnce(&TerminalReport) + Send>;

#[derive(Default)]
struct TerminalHooks {
    report: Option<TerminalReport>,
    callbacks: Vec<TerminalCallback>,
}

/// State shared between the orchestrator and its handles.
pub(crate) struct SessionShared {
    snapshot: watch::Sender<GameSnapshot>,
    hooks: Mutex<TerminalHooks>,
    submitters: Vec<MoveSubmitter>,
}

impl SessionShared {
    pub(crate) fn new(submitters: Vec<MoveSubmitter>) -> Self {
        let (snapshot, _) = watch::channel(GameSnapshot::default());
        Self {
            snapshot,
            hooks: Mutex::new(TerminalHooks::default()),
            submitters,
        }
    }

    fn hooks(&self) -> MutexGuard<'_, TerminalHooks> {
        self.hooks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn publish(&self, snapshot: GameSnapshot) {
        self.snapshot.send_replace(snapshot);
    }

    pub(crate) fn deliver_terminal(&self, report: &TerminalReport) {
        let callbacks = {
            let mut hooks = self.hooks();
            hooks.report = Some(report.clone());
            std::mem::take(&mut hooks.callbacks)
        };
        debug!(callbacks = callbacks.len(), "Delivering terminal report");
        for callback in callbacks {
            callback(report);
        }
    }
}

/// Cloneable handle to a game driven by a
/// [`GameOrchestrator`](crate::GameOrchestrator).
#[derive(Clone)]
pub struct GameHandle {
    shared: Arc<SessionShared>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for GameHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameHandle")
            .field("snapshot", &*self.shared.snapshot.borrow())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl GameHandle {
    pub(crate) fn new(shared: Arc<SessionShared>, cancel: CancellationToken) -> Self {
        Self { shared, cancel }
    }

    /// Asks the turn loop to stop at its next turn boundary.
    ///
    /// A move request or animation wait already in progress is not
    /// interrupted.
    #[instrument(skip(self))]
    pub fn request_cancel(&self) {
        info!("Cancellation requested");
        self.cancel.cancel();
    }

    /// Whether cancellation has been requested.
    pub fn is_cancel_requested(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Routes a candidate move to the interactive agent that is waiting
    /// for one.
    ///
    /// # Errors
    ///
    /// [`SubmitError::NoInteractiveAgent`] if neither side is interactive,
    /// [`SubmitError::NoPendingRequest`] if no interactive agent is waiting,
    /// or whatever the agent answered.
    #[instrument(skip(self))]
    pub async fn submit_human_move(&self, candidate: Move) -> Result<(), SubmitError> {
        if self.shared.submitters.is_empty() {
            return Err(SubmitError::NoInteractiveAgent);
        }
        match self.shared.submitters.iter().find(|s| s.is_awaiting()) {
            Some(submitter) => submitter.submit(candidate).await,
            None => Err(SubmitError::NoPendingRequest),
        }
    }

    /// Registers a callback for the terminal report.
    ///
    /// Runs immediately if the game has already ended.
    pub fn on_terminal(&self, callback: impl FnOnce(&TerminalReport) + Send + 'static) {
        let ready = {
            let mut hooks = self.shared.hooks();
            if hooks.report.is_none() {
                hooks.callbacks.push(Box::new(callback));
                return;
            }
            hooks.report.clone()
        };
        if let Some(report) = ready {
            callback(&report);
        }
    }

    /// The terminal report, once the game has ended.
    pub fn terminal_report(&self) -> Option<TerminalReport> {
        self.shared.hooks().report.clone()
    }

    /// Latest snapshot of the session.
    pub fn current_state(&self) -> GameSnapshot {
        self.shared.snapshot.borrow().clone()
    }

    /// Receiver notified on every snapshot change.
    pub fn subscribe(&self) -> watch::Receiver<GameSnapshot> {
        self.shared.snapshot.subscribe()
    }
}
