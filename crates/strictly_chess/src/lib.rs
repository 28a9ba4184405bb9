//! Strictly Chess - turn orchestration for animated chess sessions
//!
//! This library drives a chess game between two agents while keeping a
//! visual pipeline in lockstep with the game state.
//!
//! # Architecture
//!
//! - **Signal**: resettable single-consumer completion future
//! - **Animation**: FIFO barrier that plays animations one at a time
//! - **Agents**: interactive (human), engine-backed, and scripted move sources
//! - **Orchestrator**: the turn loop, terminal detection, cancellation, faults
//! - **Record**: game records and their JSON persistence
//!
//! The rules oracle, rendering, and engine wire protocol are supplied by the
//! embedding application through the [`RulesOracle`], [`Animator`] and
//! [`EngineProcess`] traits.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use strictly_chess::{
//!     GameMode, GameOrchestrator, InstantAnimator, InteractiveAgent, JsonRecordStore,
//!     RulesOracle, ScriptedAgent,
//! };
//!
//! # async fn example<O: RulesOracle + 'static>() -> anyhow::Result<()> {
//! let (human, _submitter) = InteractiveAgent::new("Human");
//! let script = ScriptedAgent::new("Script", Vec::new());
//! let mut game = GameOrchestrator::<O>::new(
//!     Box::new(human),
//!     Box::new(script),
//!     Arc::new(InstantAnimator),
//!     Arc::new(JsonRecordStore::new("records", "jcr")),
//! );
//! game.initialize(GameMode::NewGame)?;
//! let report = game.run().await?;
//! println!("{}", report);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Private module declarations
mod agents;
mod animation;
mod config;
mod handle;
mod oracle;
mod orchestrator;
mod record;
mod signal;
mod types;

// Crate-level exports - Completion signal
pub use signal::{CompletionSignal, SignalError, SignalWait};

// Crate-level exports - Animation barrier
pub use animation::{
    AnimationSynchronizer, AnimationTask, Animator, InstantAnimator, TaskCompletion, TaskId,
    TimedAnimator,
};

// Crate-level exports - Agents
pub use agents::{
    Agent, AgentError, EngineAgent, EngineError, EngineProcess, InteractiveAgent, MoveSubmitter,
    ScriptedAgent, SubmitError,
};

// Crate-level exports - Orchestration
pub use handle::{GameHandle, GameSnapshot};
pub use orchestrator::{
    Classification, GameError, GameMode, GameOrchestrator, GamePhase, TerminalReport,
};

// Crate-level exports - Rules oracle seam
pub use oracle::{BoardChange, ChangeListener, RulesError, RulesOracle, STARTING_FEN};

// Crate-level exports - Records and configuration
pub use config::{ChessConfig, ConfigError, RECORD_DIR_ENV};
pub use record::{GameRecord, JsonRecordStore, RecordError, RecordStore};

// Crate-level exports - Chess value types
pub use types::{Move, MoveParseError, Piece, PieceKind, Side, Square};
