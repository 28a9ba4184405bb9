//! Agent that replays a fixed list of moves.

use super::{Agent, AgentError};
use crate::oracle::RulesOracle;
use crate::record::GameRecord;
use crate::types::Move;
use tracing::{debug, error, instrument};

/// Plays back recorded moves in order.
///
/// Asking for more moves than the script holds is a caller bug and fails
/// with [`AgentError::OutOfMoves`].
#[derive(Debug, Clone)]
pub struct ScriptedAgent {
    name: String,
    moves: Vec<Move>,
    cursor: usize,
}

impl ScriptedAgent {
    /// Creates a scripted agent over `moves`.
    #[instrument(skip(name, moves), fields(name = %name.as_ref(), moves = moves.len()))]
    pub fn new(name: impl AsRef<str>, moves: Vec<Move>) -> Self {
        Self {
            name: name.as_ref().to_string(),
            moves,
            cursor: 0,
        }
    }

    /// Creates a scripted agent playing every move of `record`.
    pub fn from_record(name: impl AsRef<str>, record: &GameRecord) -> Self {
        Self::new(name, record.moves.clone())
    }

    /// Number of moves handed out so far.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Number of moves still to be played.
    pub fn remaining(&self) -> usize {
        self.moves.len() - self.cursor
    }
}

#[async_trait::async_trait]
impl Agent for ScriptedAgent {
    async fn request_move(&mut self, _state: &dyn RulesOracle) -> Result<Move, AgentError> {
        match self.moves.get(self.cursor) {
            Some(mv) => {
                self.cursor += 1;
                debug!(agent = %self.name, cursor = self.cursor, %mv, "Scripted move");
                Ok(*mv)
            }
            None => {
                error!(agent = %self.name, available = self.moves.len(), "Script exhausted");
                Err(AgentError::OutOfMoves {
                    requested: self.cursor + 1,
                    available: self.moves.len(),
                })
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
