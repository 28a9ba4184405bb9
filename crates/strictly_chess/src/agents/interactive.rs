//! Human player whose moves are submitted from outside the turn loop.

use super::{Agent, AgentError};
use crate::oracle::RulesOracle;
use crate::types::Move;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, instrument, warn};

/// Why a submitted move was not accepted.
///
/// All variants are local to the submitter; none of them ends the session.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum SubmitError {
    /// The move is illegal in the current position. Submit another.
    #[display("Illegal move {}", _0)]
    IllegalMove(Move),

    /// The agent is not waiting for a move right now.
    #[display("No move is being requested")]
    NoPendingRequest,

    /// No interactive agent takes part in this session.
    #[display("No interactive agent in this session")]
    NoInteractiveAgent,

    /// The agent was dropped.
    #[display("Interactive agent is gone")]
    AgentGone,
}

impl std::error::Error for SubmitError {}

struct Submission {
    candidate: Move,
    reply: oneshot::Sender<Result<(), SubmitError>>,
}

/// Whether a request is open. Submissions are sent while holding this lock,
/// and a request closes by clearing it and draining the channel under it.
type AwaitingFlag = Arc<Mutex<bool>>;

fn lock_flag(flag: &Mutex<bool>) -> MutexGuard<'_, bool> {
    flag.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Cloneable handle for submitting moves to an [`InteractiveAgent`].
#[derive(Clone)]
pub struct MoveSubmitter {
    agent: Arc<str>,
    tx: mpsc::UnboundedSender<Submission>,
    awaiting: AwaitingFlag,
}

impl std::fmt::Debug for MoveSubmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MoveSubmitter")
            .field("agent", &self.agent)
            .field("awaiting", &self.is_awaiting())
            .finish()
    }
}

impl MoveSubmitter {
    /// Whether the agent is currently waiting for a move.
    pub fn is_awaiting(&self) -> bool {
        *lock_flag(&self.awaiting)
    }

    /// Name of the agent this handle submits to.
    pub fn agent_name(&self) -> &str {
        &self.agent
    }

    /// Submits a candidate move.
    ///
    /// Resolves once the agent has checked the move against the current
    /// position.
    ///
    /// # Errors
    ///
    /// [`SubmitError::IllegalMove`] leaves the request pending so the caller
    /// can try again.
    #[instrument(skip(self), fields(agent = %self.agent))]
    pub async fn submit(&self, candidate: Move) -> Result<(), SubmitError> {
        let (reply, response) = oneshot::channel();
        {
            let awaiting = lock_flag(&self.awaiting);
            if !*awaiting {
                debug!("Submission while no move is requested");
                return Err(SubmitError::NoPendingRequest);
            }
            self.tx
                .send(Submission { candidate, reply })
                .map_err(|_| SubmitError::AgentGone)?;
        }
        response.await.map_err(|_| SubmitError::AgentGone)?
    }
}

/// Clears the awaiting flag when a request ends, however it ends.
struct AwaitingGuard<'a>(&'a Mutex<bool>);

impl<'a> AwaitingGuard<'a> {
    fn raise(flag: &'a Mutex<bool>) -> Self {
        *lock_flag(flag) = true;
        Self(flag)
    }
}

impl Drop for AwaitingGuard<'_> {
    fn drop(&mut self) {
        *lock_flag(self.0) = false;
    }
}

/// Human player. Each request waits until a legal move is submitted.
pub struct InteractiveAgent {
    name: Arc<str>,
    rx: mpsc::UnboundedReceiver<Submission>,
    tx: mpsc::WeakUnboundedSender<Submission>,
    awaiting: AwaitingFlag,
}

impl InteractiveAgent {
    /// Creates an interactive agent and the handle used to feed it moves.
    ///
    /// The agent does not keep its own submitter alive: once every
    /// [`MoveSubmitter`] is dropped, a pending request fails with
    /// [`AgentError::Disconnected`].
    pub fn new(name: impl Into<String>) -> (Self, MoveSubmitter) {
        let name: Arc<str> = Arc::from(name.into());
        info!(agent = %name, "Creating interactive agent");

        let (tx, rx) = mpsc::unbounded_channel();
        let awaiting: AwaitingFlag = Arc::new(Mutex::new(false));
        let submitter = MoveSubmitter {
            agent: Arc::clone(&name),
            tx: tx.clone(),
            awaiting: Arc::clone(&awaiting),
        };

        let agent = Self {
            name,
            rx,
            tx: tx.downgrade(),
            awaiting,
        };
        (agent, submitter)
    }

    /// Answers every queued submission with [`SubmitError::NoPendingRequest`].
    ///
    /// Called once the awaiting flag is down, so nothing can be queued
    /// behind the drain.
    fn reject_stale(&mut self) {
        let _closed = lock_flag(&self.awaiting);
        while let Ok(stale) = self.rx.try_recv() {
            debug!(agent = %self.name, candidate = %stale.candidate, "Dropping stale submission");
            let _ = stale.reply.send(Err(SubmitError::NoPendingRequest));
        }
    }
}

/// Answers submissions until a legal one arrives; `None` once every sender
/// is gone.
async fn await_legal(
    rx: &mut mpsc::UnboundedReceiver<Submission>,
    state: &dyn RulesOracle,
) -> Option<Move> {
    while let Some(submission) = rx.recv().await {
        let candidate = submission.candidate;
        if state.is_legal(&candidate) {
            info!(%candidate, "Human move accepted");
            let _ = submission.reply.send(Ok(()));
            return Some(candidate);
        }
        warn!(%candidate, "Illegal move submitted");
        let _ = submission.reply.send(Err(SubmitError::IllegalMove(candidate)));
    }
    None
}

#[async_trait::async_trait]
impl Agent for InteractiveAgent {
    #[instrument(skip(self, state), fields(agent = %self.name))]
    async fn request_move(&mut self, state: &dyn RulesOracle) -> Result<Move, AgentError> {
        self.reject_stale();
        let outcome = {
            let _awaiting = AwaitingGuard::raise(&self.awaiting);
            info!(side = %state.side_to_move(), "Waiting for human move");
            await_legal(&mut self.rx, state).await
        };
        // Submissions that raced the end of the request are answered now.
        self.reject_stale();
        outcome.ok_or_else(|| AgentError::Disconnected(self.name.to_string()))
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn submitter(&self) -> Option<MoveSubmitter> {
        self.tx.upgrade().map(|tx| MoveSubmitter {
            agent: Arc::clone(&self.name),
            tx,
            awaiting: Arc::clone(&self.awaiting),
        })
    }
}
