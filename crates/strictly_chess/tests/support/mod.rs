//! Shared fakes for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use strictly_chess::{
    Agent, AnimationTask, Animator, BoardChange, ChangeListener, GameRecord, Move, Piece,
    PieceKind, RecordError, RecordStore, RulesError, RulesOracle, ScriptedAgent, Side, Square,
    TaskCompletion,
};
use tracing_subscriber::EnvFilter;

/// Installs a test-writer subscriber honoring `RUST_LOG`; repeat calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Parses coordinate notation, panicking on bad test input.
pub fn mv(text: &str) -> Move {
    text.parse().expect("valid test move")
}

/// Boxed scripted agent over `moves`.
pub fn scripted(name: &str, moves: &[&str]) -> Box<dyn Agent> {
    Box::new(ScriptedAgent::new(name, moves.iter().map(|m| mv(m)).collect()))
}

/// Board with deliberately loose rules.
///
/// A move is legal when the origin holds a piece of the side to move, the
/// destination holds no piece of that side, and a promotion is only asked
/// of a pawn. Losing the king is checkmate. Two bare kings are a draw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeBoard {
    squares: [Option<Piece>; 64],
    side: Side,
}

impl FakeBoard {
    pub fn piece_at(&self, square: &str) -> Option<Piece> {
        let square: Square = square.parse().expect("valid test square");
        self.squares[square.index() as usize]
    }

    fn has_king(&self, side: Side) -> bool {
        self.squares
            .iter()
            .flatten()
            .any(|p| p.side == side && p.kind == PieceKind::King)
    }

    /// Notation after applying `moves` to `notation`.
    pub fn after(notation: &str, moves: &[&str]) -> String {
        let mut board = FakeBoard::from_notation(notation).expect("valid test position");
        for text in moves {
            board
                .apply(&mv(text), &mut |_change: BoardChange| {})
                .expect("legal test move");
        }
        board.position_notation()
    }
}

impl RulesOracle for FakeBoard {
    fn from_notation(notation: &str) -> Result<Self, RulesError> {
        let mut fields = notation.split_whitespace();
        let placement = fields
            .next()
            .ok_or_else(|| RulesError::new("Empty position"))?;
        let side = match fields.next() {
            None | Some("w") => Side::White,
            Some("b") => Side::Black,
            Some(other) => return Err(RulesError::new(format!("Bad side '{}'", other))),
        };

        let ranks: Vec<&str> = placement.split('/').collect();
        if ranks.len() != 8 {
            return Err(RulesError::new(format!("Bad placement '{}'", placement)));
        }

        let mut squares = [None; 64];
        for (row, text) in ranks.iter().enumerate() {
            let rank = 7 - row as u8;
            let mut file = 0u8;
            for c in text.chars() {
                if let Some(skip) = c.to_digit(10) {
                    file += skip as u8;
                    continue;
                }
                let kind = PieceKind::from_symbol(c)
                    .ok_or_else(|| RulesError::new(format!("Bad piece '{}'", c)))?;
                let owner = if c.is_ascii_uppercase() {
                    Side::White
                } else {
                    Side::Black
                };
                let square = Square::new(file, rank)
                    .ok_or_else(|| RulesError::new(format!("Rank '{}' too long", text)))?;
                squares[square.index() as usize] = Some(Piece::new(owner, kind));
                file += 1;
            }
            if file != 8 {
                return Err(RulesError::new(format!("Rank '{}' has {} files", text, file)));
            }
        }

        Ok(Self { squares, side })
    }

    fn apply(&mut self, mv: &Move, listener: &mut dyn ChangeListener) -> Result<(), RulesError> {
        if !self.is_legal(mv) {
            return Err(RulesError::new(format!("Illegal move {}", mv)));
        }
        let from = mv.from.index() as usize;
        let to = mv.to.index() as usize;
        let piece = self.squares[from]
            .take()
            .ok_or_else(|| RulesError::new("Empty origin"))?;

        if let Some(captured) = self.squares[to] {
            listener.on_change(BoardChange::Removed {
                square: mv.to,
                piece: captured,
            });
        }
        listener.on_change(BoardChange::Moved {
            from: mv.from,
            to: mv.to,
            piece,
        });

        let placed = match mv.promotion {
            Some(kind) => {
                let promoted = Piece::new(piece.side, kind);
                listener.on_change(BoardChange::Removed {
                    square: mv.to,
                    piece,
                });
                listener.on_change(BoardChange::Added {
                    square: mv.to,
                    piece: promoted,
                });
                promoted
            }
            None => piece,
        };
        self.squares[to] = Some(placed);
        self.side = self.side.opponent();
        Ok(())
    }

    fn is_legal(&self, mv: &Move) -> bool {
        if mv.from == mv.to {
            return false;
        }
        let Some(piece) = self.squares[mv.from.index() as usize] else {
            return false;
        };
        if piece.side != self.side {
            return false;
        }
        if let Some(target) = self.squares[mv.to.index() as usize]
            && target.side == self.side
        {
            return false;
        }
        mv.promotion.is_none() || piece.kind == PieceKind::Pawn
    }

    fn is_checkmate(&self) -> bool {
        !self.has_king(self.side)
    }

    fn is_draw(&self) -> bool {
        self.has_king(Side::White)
            && self.has_king(Side::Black)
            && self.squares.iter().flatten().count() == 2
    }

    fn side_to_move(&self) -> Side {
        self.side
    }

    fn position_notation(&self) -> String {
        let mut rows = Vec::with_capacity(8);
        for rank in (0..8u8).rev() {
            let mut row = String::new();
            let mut empty = 0;
            for file in 0..8u8 {
                let index = (rank * 8 + file) as usize;
                match self.squares[index] {
                    Some(piece) => {
                        if empty > 0 {
                            row.push_str(&empty.to_string());
                            empty = 0;
                        }
                        let symbol = piece.kind.symbol();
                        row.push(match piece.side {
                            Side::White => symbol.to_ascii_uppercase(),
                            Side::Black => symbol,
                        });
                    }
                    None => empty += 1,
                }
            }
            if empty > 0 {
                row.push_str(&empty.to_string());
            }
            rows.push(row);
        }
        let side = match self.side {
            Side::White => "w",
            Side::Black => "b",
        };
        format!("{} {}", rows.join("/"), side)
    }
}

/// Animator that logs every change it animates and tracks overlap.
#[derive(Debug, Clone, Default)]
pub struct RecordingAnimator {
    changes: Arc<Mutex<Vec<BoardChange>>>,
    active: Arc<AtomicUsize>,
    max_active: Arc<AtomicUsize>,
    delay: Option<Duration>,
}

impl RecordingAnimator {
    /// Animator whose tasks finish inside `start`.
    pub fn instant() -> Self {
        Self::default()
    }

    /// Animator whose tasks finish after `delay` on the runtime.
    pub fn delayed(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn changes(&self) -> Vec<BoardChange> {
        self.changes.lock().expect("changes lock").clone()
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

impl Animator for RecordingAnimator {
    fn animate(&self, change: &BoardChange) -> Box<dyn AnimationTask> {
        let change = *change;
        let this = self.clone();
        Box::new(move |done: TaskCompletion| {
            let now = this.active.fetch_add(1, Ordering::SeqCst) + 1;
            this.max_active.fetch_max(now, Ordering::SeqCst);
            this.changes.lock().expect("changes lock").push(change);

            let delay = this.delay;
            match delay {
                Some(delay) => {
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        this.active.fetch_sub(1, Ordering::SeqCst);
                        done.finish();
                    });
                }
                None => {
                    this.active.fetch_sub(1, Ordering::SeqCst);
                    done.finish();
                }
            }
        })
    }
}

/// Store that keeps saved records in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    saved: Mutex<Vec<GameRecord>>,
}

impl MemoryStore {
    pub fn saved(&self) -> Vec<GameRecord> {
        self.saved.lock().expect("store lock").clone()
    }
}

#[async_trait::async_trait]
impl RecordStore for MemoryStore {
    async fn save(&self, record: &GameRecord) -> Result<String, RecordError> {
        let mut saved = self.saved.lock().expect("store lock");
        saved.push(record.clone());
        Ok(format!("memory:{}", saved.len() - 1))
    }
}

/// Store whose every save fails.
#[derive(Debug, Default)]
pub struct FailingStore;

#[async_trait::async_trait]
impl RecordStore for FailingStore {
    async fn save(&self, _record: &GameRecord) -> Result<String, RecordError> {
        Err(RecordError::new("disk full"))
    }
}

/// Animator that fails every removal and finishes everything else,
/// logging each change it was asked to start.
#[derive(Debug, Clone, Default)]
pub struct FailingRemovalAnimator {
    started: Arc<Mutex<Vec<BoardChange>>>,
}

impl FailingRemovalAnimator {
    pub fn started(&self) -> Vec<BoardChange> {
        self.started.lock().expect("started lock").clone()
    }
}

impl Animator for FailingRemovalAnimator {
    fn animate(&self, change: &BoardChange) -> Box<dyn AnimationTask> {
        let change = *change;
        let started = Arc::clone(&self.started);
        Box::new(move |done: TaskCompletion| {
            started.lock().expect("started lock").push(change);
            match change {
                BoardChange::Removed { square, .. } => {
                    done.fail(format!("no fade-out sprite for {}", square))
                }
                _ => done.finish(),
            }
        })
    }
}
