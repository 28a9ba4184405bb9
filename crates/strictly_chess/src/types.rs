//! Core chess value types shared by agents, the oracle seam, and records.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use strum::IntoEnumIterator;
use tracing::instrument;

/// A side in the game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::EnumIter)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// White (moves first from the standard starting position).
    White,
    /// Black.
    Black,
}

impl Side {
    /// Returns the opposing side.
    pub fn opponent(self) -> Self {
        match self {
            Side::White => Side::Black,
            Side::Black => Side::White,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::White => write!(f, "White"),
            Side::Black => write!(f, "Black"),
        }
    }
}

/// Kind of chess piece.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::EnumIter)]
#[serde(rename_all = "lowercase")]
pub enum PieceKind {
    /// Pawn.
    Pawn,
    /// Knight.
    Knight,
    /// Bishop.
    Bishop,
    /// Rook.
    Rook,
    /// Queen.
    Queen,
    /// King.
    King,
}

impl PieceKind {
    /// Lowercase letter used in coordinate notation and FEN.
    pub fn symbol(self) -> char {
        match self {
            PieceKind::Pawn => 'p',
            PieceKind::Knight => 'n',
            PieceKind::Bishop => 'b',
            PieceKind::Rook => 'r',
            PieceKind::Queen => 'q',
            PieceKind::King => 'k',
        }
    }

    /// Looks up a piece kind by its letter, ignoring case.
    pub fn from_symbol(symbol: char) -> Option<Self> {
        let lower = symbol.to_ascii_lowercase();
        PieceKind::iter().find(|kind| kind.symbol() == lower)
    }

    /// Whether a pawn may promote to this kind.
    pub fn is_promotion_target(self) -> bool {
        matches!(
            self,
            PieceKind::Knight | PieceKind::Bishop | PieceKind::Rook | PieceKind::Queen
        )
    }
}

/// A piece of a given side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Piece {
    /// Owner of the piece.
    pub side: Side,
    /// What the piece is.
    pub kind: PieceKind,
}

impl Piece {
    /// Creates a piece.
    pub fn new(side: Side, kind: PieceKind) -> Self {
        Self { side, kind }
    }
}

/// A square on the board, `a1` through `h8`.
///
/// Serialized as its coordinate string so records stay human-readable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Square {
    index: u8,
}

impl Square {
    /// Creates a square from zero-based file and rank (0..8 each).
    pub fn new(file: u8, rank: u8) -> Option<Self> {
        (file < 8 && rank < 8).then(|| Self {
            index: rank * 8 + file,
        })
    }

    /// Creates a square from its 0..64 index (`a1` = 0, `h8` = 63).
    pub fn from_index(index: u8) -> Option<Self> {
        (index < 64).then_some(Self { index })
    }

    /// Zero-based file (`a` = 0).
    pub fn file(self) -> u8 {
        self.index % 8
    }

    /// Zero-based rank (`1` = 0).
    pub fn rank(self) -> u8 {
        self.index / 8
    }

    /// Index in 0..64.
    pub fn index(self) -> u8 {
        self.index
    }
}

impl fmt::Display for Square {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let file = (b'a' + self.file()) as char;
        let rank = (b'1' + self.rank()) as char;
        write!(f, "{}{}", file, rank)
    }
}

impl FromStr for Square {
    type Err = MoveParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.as_bytes();
        if bytes.len() != 2 {
            return Err(MoveParseError::InvalidSquare(s.to_string()));
        }
        let file = bytes[0].wrapping_sub(b'a');
        let rank = bytes[1].wrapping_sub(b'1');
        Square::new(file, rank).ok_or_else(|| MoveParseError::InvalidSquare(s.to_string()))
    }
}

impl TryFrom<String> for Square {
    type Error = MoveParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Square> for String {
    fn from(square: Square) -> Self {
        square.to_string()
    }
}

/// A move from one square to another, with an optional promotion.
///
/// Moves are plain values. Legality is the rules oracle's concern; a `Move`
/// only guarantees it names two valid squares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Move {
    /// Origin square.
    pub from: Square,
    /// Destination square.
    pub to: Square,
    /// Piece a pawn promotes to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promotion: Option<PieceKind>,
}

impl Move {
    /// Creates a non-promoting move.
    pub fn new(from: Square, to: Square) -> Self {
        Self {
            from,
            to,
            promotion: None,
        }
    }

    /// Creates a promoting move.
    pub fn with_promotion(from: Square, to: Square, promotion: PieceKind) -> Self {
        Self {
            from,
            to,
            promotion: Some(promotion),
        }
    }

    /// Parses coordinate notation as returned by an engine (`e2e4`, `e7e8q`).
    #[instrument(level = "trace")]
    pub fn from_coordinate(text: &str) -> Result<Self, MoveParseError> {
        text.parse()
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.from, self.to)?;
        if let Some(kind) = self.promotion {
            write!(f, "{}", kind.symbol())?;
        }
        Ok(())
    }
}

impl FromStr for Move {
    type Err = MoveParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        if !text.is_ascii() || !(text.len() == 4 || text.len() == 5) {
            return Err(MoveParseError::InvalidLength(text.to_string()));
        }

        let from: Square = text[0..2].parse()?;
        let to: Square = text[2..4].parse()?;
        let promotion = match text[4..].chars().next() {
            None => None,
            Some(c) => match PieceKind::from_symbol(c) {
                Some(kind) if kind.is_promotion_target() => Some(kind),
                _ => return Err(MoveParseError::InvalidPromotion(c)),
            },
        };

        Ok(Self {
            from,
            to,
            promotion,
        })
    }
}

/// Error parsing a square or a move in coordinate notation.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum MoveParseError {
    /// Move text is not four or five characters long.
    #[display("Move '{}' must be 4 or 5 characters of coordinate notation", _0)]
    InvalidLength(String),

    /// Square text does not name a board square.
    #[display("'{}' is not a square", _0)]
    InvalidSquare(String),

    /// Promotion suffix is not n, b, r or q.
    #[display("'{}' is not a promotion piece", _0)]
    InvalidPromotion(char),
}

impl std::error::Error for MoveParseError {}
