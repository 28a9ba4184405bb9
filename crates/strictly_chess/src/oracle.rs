//! Seam to the external rules oracle.
//!
//! Move legality, move generation and mate detection belong to the oracle.
//! The orchestrator only needs the queries below and the ordered stream of
//! structural changes raised while a move is applied.

use crate::types::{Move, Piece, Side, Square};
use derive_more::{Display, Error};
use tracing::instrument;

/// Standard starting position in FEN.
pub const STARTING_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// One structural change to the board, raised during [`RulesOracle::apply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardChange {
    /// A piece appeared on a square (promotion, setup).
    Added {
        /// Square the piece appeared on.
        square: Square,
        /// The new piece.
        piece: Piece,
    },
    /// A piece moved between squares.
    Moved {
        /// Square the piece left.
        from: Square,
        /// Square the piece arrived on.
        to: Square,
        /// The moving piece.
        piece: Piece,
    },
    /// A piece left the board (capture, promotion).
    Removed {
        /// Square that was emptied.
        square: Square,
        /// The removed piece.
        piece: Piece,
    },
}

/// Receives structural changes in the order the oracle raises them.
pub trait ChangeListener {
    /// Called synchronously, once per change.
    fn on_change(&mut self, change: BoardChange);
}

impl<F: FnMut(BoardChange)> ChangeListener for F {
    fn on_change(&mut self, change: BoardChange) {
        self(change)
    }
}

/// The rules oracle: the game state plus its legality and terminal queries.
///
/// The orchestrator is the only writer. Every notification for a move must be
/// delivered to `listener` before `apply` returns.
pub trait RulesOracle: Send + Sync {
    /// Reconstructs a position from its exported notation.
    fn from_notation(notation: &str) -> Result<Self, RulesError>
    where
        Self: Sized;

    /// Notation of the position a new game starts from.
    fn starting_notation() -> String
    where
        Self: Sized,
    {
        STARTING_FEN.to_string()
    }

    /// Applies `mv`, reporting each structural change to `listener` in order.
    fn apply(&mut self, mv: &Move, listener: &mut dyn ChangeListener) -> Result<(), RulesError>;

    /// Whether `mv` is legal in the current position.
    fn is_legal(&self, mv: &Move) -> bool;

    /// Whether the side to move is checkmated.
    fn is_checkmate(&self) -> bool;

    /// Whether the side to move is stalemated.
    ///
    /// Oracles that fold stalemate into [`is_draw`](Self::is_draw) can keep
    /// the default.
    fn is_stalemate(&self) -> bool {
        false
    }

    /// Whether the position is drawn under the oracle's draw policy.
    fn is_draw(&self) -> bool;

    /// Side whose turn it is.
    fn side_to_move(&self) -> Side;

    /// Exportable notation for the current position.
    fn position_notation(&self) -> String;
}

/// Error raised by a rules oracle.
#[derive(Debug, Clone, Display, Error)]
#[display("Rules error: {} at {}:{}", message, file, line)]
pub struct RulesError {
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl RulesError {
    /// Creates a new rules error with caller location tracking.
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
