//! Turn loop driving one chess session.
//!
//! The orchestrator asks the agent whose turn it is for a move, applies it
//! through the rules oracle, turns every structural change into an animation,
//! and waits for the animations to finish before the next turn.

use crate::agents::{Agent, AgentError, ScriptedAgent};
use crate::animation::{AnimationSynchronizer, Animator};
use crate::handle::{GameHandle, GameSnapshot, SessionShared};
use crate::oracle::{BoardChange, ChangeListener, RulesError, RulesOracle};
use crate::record::{GameRecord, RecordError, RecordStore};
use crate::signal::SignalError;
use crate::types::{Move, Side};
use derive_new::new;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace, warn};

/// How a session is set up.
#[derive(Debug, Clone)]
pub enum GameMode {
    /// Fresh game from the starting position.
    NewGame,
    /// Play back a finished record from its start position.
    Replay(GameRecord),
    /// Continue from a record's end position, recording new moves.
    Resume(GameRecord),
}

impl GameMode {
    fn label(&self) -> &'static str {
        match self {
            GameMode::NewGame => "new_game",
            GameMode::Replay(_) => "replay",
            GameMode::Resume(_) => "resume",
        }
    }
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum Classification {
    /// The side to move was mated.
    Checkmate,
    /// The side to move had no legal move and was not in check.
    Stalemate,
    /// The oracle's draw policy applied.
    Draw,
    /// Cancellation was requested, or a replay ran out of moves before the
    /// game was decided.
    Cancelled,
    /// An error ended the session.
    Fault,
}

/// State machine phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum GamePhase {
    /// Created, possibly initialized, turn loop not started.
    #[display("initializing")]
    Initializing,
    /// Turn loop running.
    #[display("playing")]
    Playing,
    /// Finished.
    #[display("ended ({})", _0)]
    Ended(Classification),
}

/// Outcome handed to the caller and to every terminal callback.
#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct TerminalReport {
    /// How the game ended.
    pub classification: Classification,
    /// Winner, only for checkmate.
    pub victor: Option<Side>,
    /// Moves applied in this session.
    pub moves_played: usize,
}

impl fmt::Display for TerminalReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.classification, self.victor) {
            (classification, Some(victor)) => write!(f, "{} wins by {}!", victor, classification),
            (Classification::Cancelled, None) => write!(f, "Game cancelled"),
            (Classification::Fault, None) => write!(f, "Game aborted by an error"),
            (classification, None) => write!(f, "Draw by {}", classification),
        }
    }
}

/// Error that ended a session or rejected an orchestrator call.
#[derive(Debug, derive_more::Display, derive_more::From)]
pub enum GameError {
    /// The call is not valid in the current phase.
    #[display("Orchestrator is {}; cannot {}", phase, operation)]
    InvalidPhase {
        /// Phase at the time of the call.
        phase: GamePhase,
        /// What was attempted.
        operation: &'static str,
    },

    /// The rules oracle rejected a position or move.
    #[from]
    #[display("{}", _0)]
    Rules(RulesError),

    /// An agent failed to produce a move.
    #[from]
    #[display("{}", _0)]
    Agent(AgentError),

    /// The animation barrier failed.
    #[from]
    #[display("Animation barrier failed: {}", _0)]
    Animation(SignalError),

    /// The record could not be persisted.
    #[from]
    #[display("{}", _0)]
    Record(RecordError),
}

impl std::error::Error for GameError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GameError::InvalidPhase { .. } => None,
            GameError::Rules(e) => Some(e),
            GameError::Agent(e) => Some(e),
            GameError::Animation(e) => Some(e),
            GameError::Record(e) => Some(e),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Ending {
    classification: Classification,
    victor: Option<Side>,
}

impl Ending {
    fn cancelled() -> Self {
        Self {
            classification: Classification::Cancelled,
            victor: None,
        }
    }

    fn classify(oracle: &dyn RulesOracle) -> Option<Self> {
        if oracle.is_checkmate() {
            Some(Self {
                classification: Classification::Checkmate,
                victor: Some(oracle.side_to_move().opponent()),
            })
        } else if oracle.is_stalemate() {
            Some(Self {
                classification: Classification::Stalemate,
                victor: None,
            })
        } else if oracle.is_draw() {
            Some(Self {
                classification: Classification::Draw,
                victor: None,
            })
        } else {
            None
        }
    }
}

struct Session<O> {
    oracle: O,
    record: GameRecord,
    recording: bool,
    script: Option<ScriptedAgent>,
    moves_played: usize,
    last_move: Option<Move>,
}

impl<O> Session<O> {
    fn new(oracle: O, record: GameRecord, recording: bool, script: Option<ScriptedAgent>) -> Self {
        Self {
            oracle,
            record,
            recording,
            script,
            moves_played: 0,
            last_move: None,
        }
    }
}

/// Enqueues one animation per structural change, in the order raised.
struct AnimationListener<'a> {
    synchronizer: &'a AnimationSynchronizer,
    animator: &'a dyn Animator,
    enqueued: usize,
}

impl ChangeListener for AnimationListener<'_> {
    fn on_change(&mut self, change: BoardChange) {
        let task = self.animator.animate(&change);
        let id = self.synchronizer.enqueue(task);
        trace!(task_id = id, ?change, "Board change queued for animation");
        self.enqueued += 1;
    }
}

/// Drives one game between two agents.
pub struct GameOrchestrator<O: RulesOracle + 'static> {
    white: Box<dyn Agent>,
    black: Box<dyn Agent>,
    animator: Arc<dyn Animator>,
    store: Arc<dyn RecordStore>,
    synchronizer: AnimationSynchronizer,
    cancel: CancellationToken,
    shared: Arc<SessionShared>,
    phase: GamePhase,
    session: Option<Session<O>>,
}

impl<O: RulesOracle + 'static> GameOrchestrator<O> {
    /// Creates an orchestrator for `white` and `black`.
    ///
    /// Interactive agents among them become reachable through
    /// [`GameHandle::submit_human_move`].
    #[instrument(skip_all, fields(white = %white.name(), black = %black.name()))]
    pub fn new(
        white: Box<dyn Agent>,
        black: Box<dyn Agent>,
        animator: Arc<dyn Animator>,
        store: Arc<dyn RecordStore>,
    ) -> Self {
        info!("Creating game orchestrator");
        let submitters = [white.submitter(), black.submitter()]
            .into_iter()
            .flatten()
            .collect();

        Self {
            white,
            black,
            animator,
            store,
            synchronizer: AnimationSynchronizer::new(),
            cancel: CancellationToken::new(),
            shared: Arc::new(SessionShared::new(submitters)),
            phase: GamePhase::Initializing,
            session: None,
        }
    }

    /// Uses `token` for cancellation instead of a private one.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Handle for observing and steering the game from other tasks.
    pub fn handle(&self) -> GameHandle {
        GameHandle::new(Arc::clone(&self.shared), self.cancel.clone())
    }

    /// Asks the loop to stop at the next turn boundary.
    pub fn request_cancel(&self) {
        self.handle().request_cancel();
    }

    /// Current phase.
    pub fn phase(&self) -> GamePhase {
        self.phase
    }

    /// The session's record, once initialized.
    ///
    /// Unavailable while [`run`](Self::run) is in progress.
    pub fn record(&self) -> Option<&GameRecord> {
        self.session.as_ref().map(|s| &s.record)
    }

    /// The game state, once initialized.
    pub fn state(&self) -> Option<&O> {
        self.session.as_ref().map(|s| &s.oracle)
    }

    /// Latest snapshot.
    pub fn current_state(&self) -> GameSnapshot {
        self.handle().current_state()
    }

    /// The animation barrier this orchestrator feeds.
    pub fn synchronizer(&self) -> &AnimationSynchronizer {
        &self.synchronizer
    }

    /// Sets up the game state and record for `mode`.
    ///
    /// # Errors
    ///
    /// [`GameError::InvalidPhase`] if already initialized, or
    /// [`GameError::Rules`] if the oracle cannot load the position.
    #[instrument(skip(self, mode), fields(mode = mode.label()))]
    pub fn initialize(&mut self, mode: GameMode) -> Result<(), GameError> {
        if self.phase != GamePhase::Initializing || self.session.is_some() {
            return Err(GameError::InvalidPhase {
                phase: self.phase,
                operation: "initialize",
            });
        }

        let session = match mode {
            GameMode::NewGame => {
                let start = O::starting_notation();
                let oracle = O::from_notation(&start)?;
                Session::new(oracle, GameRecord::new(start), true, None)
            }
            GameMode::Replay(record) => {
                let oracle = O::from_notation(&record.start_position)?;
                let script = ScriptedAgent::from_record("replay", &record);
                info!(moves = record.moves.len(), "Replaying record");
                Session::new(oracle, record, false, Some(script))
            }
            GameMode::Resume(record) => {
                let oracle = O::from_notation(&record.end_position)?;
                info!(previous_moves = record.moves.len(), "Resuming record");
                Session::new(oracle, GameRecord::new(record.start_position), true, None)
            }
        };

        info!(position = %session.oracle.position_notation(), "Game initialized");
        self.publish(&session);
        self.session = Some(session);
        Ok(())
    }

    /// Runs the turn loop to completion.
    ///
    /// Whatever the outcome, the record is finalized and persisted (except
    /// for replays) and every terminal callback receives the report.
    ///
    /// # Errors
    ///
    /// Any agent, oracle, animation or persistence failure ends the session
    /// as [`Classification::Fault`] and is returned here.
    #[instrument(skip(self))]
    pub async fn run(&mut self) -> Result<TerminalReport, GameError> {
        let mut session = match self.session.take() {
            Some(session) if self.phase == GamePhase::Initializing => session,
            other => {
                self.session = other;
                return Err(GameError::InvalidPhase {
                    phase: self.phase,
                    operation: "run",
                });
            }
        };

        self.phase = GamePhase::Playing;
        self.publish(&session);
        info!("Game started");

        let outcome = self.play(&mut session).await;
        let drained = self.synchronizer.wait_until_idle().await;
        let outcome = match (outcome, drained) {
            (Ok(ending), Ok(())) => Ok(ending),
            (Ok(_), Err(e)) => Err(GameError::from(e)),
            (Err(e), Err(drain)) => {
                warn!(error = %drain, "Animation drain also failed");
                Err(e)
            }
            (Err(e), Ok(())) => Err(e),
        };

        self.finish(session, outcome).await
    }

    async fn play(&mut self, session: &mut Session<O>) -> Result<Ending, GameError> {
        loop {
            match &session.script {
                Some(script) if script.remaining() == 0 => {
                    return Ok(match Ending::classify(&session.oracle) {
                        Some(ending) => {
                            info!(
                                moves = session.moves_played,
                                classification = %ending.classification,
                                "Replay finished in a terminal position"
                            );
                            ending
                        }
                        None => {
                            info!(
                                moves = session.moves_played,
                                "Replay finished in an undecided position; reporting as cancelled"
                            );
                            Ending::cancelled()
                        }
                    });
                }
                Some(_) => {}
                None => {
                    if let Some(ending) = Ending::classify(&session.oracle) {
                        return Ok(ending);
                    }
                }
            }

            if self.cancel.is_cancelled() {
                info!(moves = session.moves_played, "Cancelled at turn boundary");
                return Ok(Ending::cancelled());
            }

            let side = session.oracle.side_to_move();
            let agent: &mut (dyn Agent + 'static) = match session.script.as_mut() {
                Some(script) => script,
                None => match side {
                    Side::White => self.white.as_mut(),
                    Side::Black => self.black.as_mut(),
                },
            };
            debug!(%side, agent = %agent.name(), "Requesting move");
            let mv = agent.request_move(&session.oracle).await?;

            let mut listener = AnimationListener {
                synchronizer: &self.synchronizer,
                animator: self.animator.as_ref(),
                enqueued: 0,
            };
            session.oracle.apply(&mv, &mut listener)?;
            let animations = listener.enqueued;

            if session.recording {
                session.record.moves.push(mv);
            }
            session.moves_played += 1;
            session.last_move = Some(mv);
            info!(
                turn = session.moves_played,
                %side,
                %mv,
                animations,
                "Move applied"
            );
            self.publish(session);

            self.synchronizer.wait_until_idle().await?;
        }
    }

    async fn finish(
        &mut self,
        mut session: Session<O>,
        mut outcome: Result<Ending, GameError>,
    ) -> Result<TerminalReport, GameError> {
        if session.recording {
            session.record.end_position = session.oracle.position_notation();
            match self.store.save(&session.record).await {
                Ok(location) => info!(%location, "Record persisted"),
                Err(e) => {
                    error!(error = %e, "Failed to persist record");
                    if outcome.is_ok() {
                        outcome = Err(e.into());
                    }
                }
            }
        }

        let report = match &outcome {
            Ok(ending) => {
                TerminalReport::new(ending.classification, ending.victor, session.moves_played)
            }
            Err(e) => {
                error!(error = %e, moves = session.moves_played, "Game ended by fault");
                TerminalReport::new(Classification::Fault, None, session.moves_played)
            }
        };

        self.phase = GamePhase::Ended(report.classification);
        self.publish(&session);
        self.session = Some(session);
        info!(report = %report, "Game over");
        self.shared.deliver_terminal(&report);

        outcome.map(|_| report)
    }

    fn publish(&self, session: &Session<O>) {
        self.shared.publish(GameSnapshot {
            position: session.oracle.position_notation(),
            side_to_move: session.oracle.side_to_move(),
            moves_played: session.moves_played,
            last_move: session.last_move,
            phase: self.phase,
        });
    }
}
