//! Agent backed by an external engine process.

use super::{Agent, AgentError};
use crate::oracle::RulesOracle;
use crate::types::Move;
use derive_more::{Display, Error};
use tracing::{debug, info, instrument};

/// Engine-process collaborator.
///
/// How these calls reach the engine (pipes, protocol framing, timeouts) is
/// entirely up to the implementation.
#[async_trait::async_trait]
pub trait EngineProcess: Send {
    /// Launches the process and completes the handshake.
    async fn start(&mut self) -> Result<(), EngineError>;

    /// Tells the engine a new game is starting.
    async fn new_game(&mut self) -> Result<(), EngineError> {
        Ok(())
    }

    /// Sets the position to search from.
    async fn set_position(&mut self, notation: &str) -> Result<(), EngineError>;

    /// Waits until the engine has processed every prior command.
    async fn wait_ready(&mut self) -> Result<(), EngineError>;

    /// Searches and returns the best move in coordinate notation.
    async fn go(&mut self) -> Result<String, EngineError>;
}

/// Engine communication failure.
#[derive(Debug, Clone, Display, Error)]
#[display("Engine error: {} at {}:{}", message, file, line)]
pub struct EngineError {
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl EngineError {
    /// Creates a new engine error with caller location tracking.
    #[track_caller]
    #[instrument(skip(message))]
    pub fn new(message: impl Into<String>) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            message: message.into(),
            line: loc.line(),
            file: loc.file(),
        }
    }
}

/// Agent that asks an engine for every move.
///
/// The engine is started lazily on the first request. `&mut self` on
/// [`Agent::request_move`] keeps at most one request in flight.
pub struct EngineAgent<E> {
    name: String,
    engine: E,
    initialized: bool,
}

impl<E: EngineProcess> EngineAgent<E> {
    /// Wraps an engine that has not been started yet.
    pub fn new(name: impl Into<String>, engine: E) -> Self {
        let name = name.into();
        info!(agent = %name, "Creating engine agent");
        Self {
            name,
            engine,
            initialized: false,
        }
    }

    /// Whether the engine has been started.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// The wrapped engine.
    pub fn engine(&self) -> &E {
        &self.engine
    }

    async fn initialize(&mut self) -> Result<(), EngineError> {
        info!(agent = %self.name, "Starting engine");
        self.engine.start().await?;
        self.engine.new_game().await?;
        self.engine.wait_ready().await?;
        self.initialized = true;
        info!(agent = %self.name, "Engine ready");
        Ok(())
    }
}

#[async_trait::async_trait]
impl<E: EngineProcess> Agent for EngineAgent<E> {
    #[instrument(skip(self, state), fields(agent = %self.name))]
    async fn request_move(&mut self, state: &dyn RulesOracle) -> Result<Move, AgentError> {
        if !self.initialized {
            self.initialize().await?;
        }

        let notation = state.position_notation();
        debug!(position = %notation, "Setting engine position");
        self.engine.set_position(&notation).await?;
        self.engine.wait_ready().await?;
        let best = self.engine.go().await?;
        debug!(best = %best, "Engine answered");

        best.parse::<Move>()
            .map_err(|reason| AgentError::UnparseableMove { text: best, reason })
    }

    fn name(&self) -> &str {
        &self.name
    }
}
