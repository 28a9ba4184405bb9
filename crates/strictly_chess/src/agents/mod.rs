//! Agent trait and implementations.
//!
//! An agent produces one move per request. The orchestrator owns one agent
//! per side for the whole session.

mod engine;
mod interactive;
mod scripted;

pub use engine::{EngineAgent, EngineError, EngineProcess};
pub use interactive::{InteractiveAgent, MoveSubmitter, SubmitError};
pub use scripted::ScriptedAgent;

use crate::oracle::RulesOracle;
use crate::types::{Move, MoveParseError};

/// Trait for anything that can produce moves.
#[async_trait::async_trait]
pub trait Agent: Send {
    /// Produces the next move for the side to move in `state`.
    async fn request_move(&mut self, state: &dyn RulesOracle) -> Result<Move, AgentError>;

    /// Returns the agent's display name.
    fn name(&self) -> &str;

    /// Handle for submitting candidate moves from outside, if this agent
    /// accepts them.
    fn submitter(&self) -> Option<MoveSubmitter> {
        None
    }
}

/// Error that ends an agent's attempt to produce a move.
///
/// Every variant is fatal to the session.
#[derive(Debug, Clone, derive_more::Display)]
pub enum AgentError {
    /// A scripted agent was asked for more moves than it holds.
    #[display("Scripted agent out of moves: requested move {} of {}", requested, available)]
    OutOfMoves {
        /// One-based number of the move that was requested.
        requested: usize,
        /// Number of moves in the script.
        available: usize,
    },

    /// The engine collaborator failed.
    #[display("{}", _0)]
    Engine(EngineError),

    /// The engine answered with something that is not a move.
    #[display("Engine returned unparseable move '{}': {}", text, reason)]
    UnparseableMove {
        /// Raw engine output.
        text: String,
        /// Why it did not parse.
        reason: MoveParseError,
    },

    /// Every submitter of an interactive agent was dropped mid-request.
    #[display("Interactive agent '{}' has no submitters left", _0)]
    Disconnected(String),
}

impl std::error::Error for AgentError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AgentError::Engine(e) => Some(e),
            AgentError::UnparseableMove { reason, .. } => Some(reason),
            _ => None,
        }
    }
}

impl From<EngineError> for AgentError {
    fn from(err: EngineError) -> Self {
        AgentError::Engine(err)
    }
}
