//! Position evaluation values and the material-count fallback

use std::str::FromStr;

use chess::{Board, Color, Piece};
use serde::{Deserialize, Serialize};

/// Centipawn magnitude used for mate scores
pub const MATE_SCORE: i32 = 10_000;

/// A score from one side's point of view. Exactly one form is authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Score {
    Cp(i32),
    /// Positive = the side to move mates in n. `Mate(0)`: already checkmated.
    Mate(i32),
}

impl Score {
    /// Centipawn value with mates saturated near +/-10000, shrinking per move to mate.
    pub fn centipawns(self) -> i32 {
        match self {
            Score::Cp(cp) => cp,
            Score::Mate(m) if m > 0 => MATE_SCORE - m * 10,
            Score::Mate(m) => -MATE_SCORE - m * 10,
        }
    }

    pub fn negate(self) -> Score {
        match self {
            Score::Cp(cp) => Score::Cp(-cp),
            Score::Mate(m) => Score::Mate(-m),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvalSource {
    #[serde(rename = "stockfish")]
    Engine,
    #[serde(rename = "lichess_cloud")]
    Cloud,
    #[serde(rename = "heuristic")]
    Heuristic,
}

impl EvalSource {
    /// Label used in reports
    pub fn label(self) -> &'static str {
        match self {
            EvalSource::Engine => "stockfish",
            EvalSource::Cloud => "lichess_cloud",
            EvalSource::Heuristic => "heuristic",
        }
    }
}

/// Whose point of view a score is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Perspective {
    SideToMove,
    White,
}

/// Result of analysing one position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub score: Score,
    /// Best move in UCI notation
    pub best_move: Option<String>,
    pub second_best_move: Option<String>,
    /// Score of the second principal variation, when one was computed
    pub second_best: Option<Score>,
    pub source: EvalSource,
    pub depth: u32,
    pub perspective: Perspective,
}

impl Evaluation {
    pub fn centipawns(&self) -> i32 {
        self.score.centipawns()
    }

    pub fn is_mate(&self) -> bool {
        matches!(self.score, Score::Mate(_))
    }

    pub fn mate_in(&self) -> Option<i32> {
        match self.score {
            Score::Mate(m) => Some(m),
            Score::Cp(_) => None,
        }
    }

    pub fn second_best_centipawns(&self) -> Option<i32> {
        self.second_best.map(Score::centipawns)
    }

    /// Material count from the side to move's point of view.
    pub fn heuristic(fen: &str) -> Self {
        Self::heuristic_with(fen, Perspective::SideToMove)
    }

    /// Material count from White's point of view.
    pub fn heuristic_white(fen: &str) -> Self {
        Self::heuristic_with(fen, Perspective::White)
    }

    fn heuristic_with(fen: &str, perspective: Perspective) -> Self {
        Self {
            score: Score::Cp(material_heuristic(fen, perspective)),
            best_move: None,
            second_best_move: None,
            second_best: None,
            source: EvalSource::Heuristic,
            depth: 0,
            perspective,
        }
    }
}

/// Centipawn value of a piece for the material fallback
pub fn heuristic_piece_value(piece: Piece) -> i32 {
    match piece {
        Piece::Pawn => 100,
        Piece::Knight => 320,
        Piece::Bishop => 330,
        Piece::Rook => 500,
        Piece::Queen => 900,
        Piece::King => 0,
    }
}

/// White material minus Black material, flipped for Black to move when
/// `perspective` is `SideToMove`. An unparseable FEN scores 0.
pub fn material_heuristic(fen: &str, perspective: Perspective) -> i32 {
    let board = match Board::from_str(fen) {
        Ok(b) => b,
        Err(_) => return 0,
    };

    let side_total = |color: Color| -> i32 {
        let color_bb = *board.color_combined(color);
        chess::ALL_PIECES
            .iter()
            .map(|&piece| {
                (*board.pieces(piece) & color_bb).popcnt() as i32 * heuristic_piece_value(piece)
            })
            .sum()
    };

    let white_minus_black = side_total(Color::White) - side_total(Color::Black);
    match (perspective, board.side_to_move()) {
        (Perspective::SideToMove, Color::Black) => -white_minus_black,
        _ => white_minus_black,
    }
}
