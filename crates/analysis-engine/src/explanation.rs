//! Deterministic move narratives built from the board differential

use std::str::FromStr;

use chess::{BitBoard, Board, BoardStatus, ChessMove, Piece, Rank, Square, EMPTY};
use chess_core::replay::parse_uci_move;
use serde::{Deserialize, Serialize};

use crate::board_utils::{attacks, is_castling_move, king_square, piece_name, piece_value};
use crate::classification::Classification;

const CENTER: [&str; 4] = ["d4", "d5", "e4", "e5"];

/// Inputs for one move. Scores are from the mover's point of view.
#[derive(Debug, Clone, Copy)]
pub struct ExplainInput<'a> {
    pub fen_before: &'a str,
    pub fen_after: &'a str,
    pub san: &'a str,
    pub uci: &'a str,
    pub classification: Classification,
    pub eval_before: i32,
    pub eval_after: i32,
    pub best_move: Option<&'a str>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Explanation {
    pub simple: String,
    pub advanced: String,
    pub tactical_motifs: Vec<String>,
    pub positional_factors: Vec<String>,
}

/// What the move did on the board
#[derive(Debug, Default)]
struct MoveSignals {
    piece_moved: Option<Piece>,
    piece_captured: Option<Piece>,
    is_castling: bool,
    kingside_castle: bool,
    controls_center: bool,
    develops_piece: bool,
    tactics: Vec<String>,
    positional: Vec<String>,
}

impl MoveSignals {
    fn has(&self, tactic: &str) -> bool {
        self.tactics.iter().any(|t| t == tactic)
    }

    fn has_positional(&self, factor: &str) -> bool {
        self.positional.iter().any(|p| p == factor)
    }

    fn moved_name(&self) -> &'static str {
        self.piece_moved.map(piece_name).unwrap_or("piece")
    }

    fn captured_name(&self) -> &'static str {
        self.piece_captured.map(piece_name).unwrap_or("piece")
    }
}

/// Narrate one move. The same input always yields the same text.
pub fn explain(input: &ExplainInput<'_>) -> Explanation {
    let parsed = (
        Board::from_str(input.fen_before),
        Board::from_str(input.fen_after),
        parse_uci_move(input.uci),
    );
    let (before, after, chess_move) = match parsed {
        (Ok(before), Ok(after), Some(m)) => (before, after, m),
        _ => {
            return Explanation {
                simple: format!("Move {} played.", input.san),
                advanced: format!("The move {} was played in this position.", input.san),
                ..Default::default()
            }
        }
    };

    let signals = detect_signals(&before, &after, chess_move, input.classification);
    let loss_pawns = f64::from(input.eval_before - input.eval_after).abs() / 100.0;
    let (simple, advanced) = narrate(&signals, input, loss_pawns);

    Explanation {
        simple,
        advanced,
        tactical_motifs: signals.tactics,
        positional_factors: signals.positional,
    }
}

fn detect_signals(
    before: &Board,
    after: &Board,
    m: ChessMove,
    classification: Classification,
) -> MoveSignals {
    let mut s = MoveSignals {
        piece_moved: before.piece_on(m.get_source()),
        piece_captured: before.piece_on(m.get_dest()),
        ..Default::default()
    };
    let mover = before.side_to_move();
    let dest = m.get_dest();

    if let (Some(moved), Some(captured)) = (s.piece_moved, s.piece_captured) {
        let gained = piece_value(captured);
        let lost = piece_value(moved);
        if gained > lost {
            s.tactics.push("winning_exchange".into());
        } else if gained < lost
            && !matches!(
                classification,
                Classification::Brilliant | Classification::Great | Classification::Best
            )
        {
            s.tactics.push("losing_exchange".into());
        }
    }

    if after.checkers().popcnt() > 0 {
        s.tactics.push("check".into());
        if after.status() == BoardStatus::Checkmate {
            s.tactics.push("checkmate".into());
        }
    }

    if is_castling_move(before, m) {
        s.is_castling = true;
        s.kingside_castle = dest.get_file().to_index() == 6;
        s.positional.push("castling".into());
        s.positional.push(
            if s.kingside_castle { "kingside_castle" } else { "queenside_castle" }.into(),
        );
    }

    if let Some(promoted) = m.get_promotion() {
        s.tactics.push(format!("promotion_to_{}", piece_name(promoted)));
    }

    if CENTER.contains(&dest.to_string().as_str()) {
        s.controls_center = true;
        s.positional.push("center_control".into());
    }

    let on_back_rank = |sq: Square| matches!(sq.get_rank(), Rank::First | Rank::Eighth);
    if matches!(s.piece_moved, Some(Piece::Knight | Piece::Bishop))
        && on_back_rank(m.get_source())
        && !on_back_rank(dest)
    {
        s.develops_piece = true;
        s.positional.push("development".into());
    }

    let dest_attacks = attacks(after, dest);
    let enemy_king = king_square(after, !mover);

    if let Some(king) = enemy_king {
        let zone = chess::get_king_moves(king) | BitBoard::from_square(king);
        if (zone & BitBoard::from_square(dest)) != EMPTY || (zone & dest_attacks) != EMPTY {
            s.tactics.push("king_attack".into());
        }
    }

    if matches!(s.piece_moved, Some(Piece::Knight | Piece::Pawn | Piece::Queen)) {
        let targets = dest_attacks
            .filter(|&sq| {
                after.color_on(sq) == Some(!mover)
                    && matches!(after.piece_on(sq), Some(Piece::Queen | Piece::Rook | Piece::King))
            })
            .count();
        if targets >= 2 {
            s.tactics.push("fork".into());
        }
    }

    if let (Some(Piece::Bishop | Piece::Rook | Piece::Queen), Some(king)) = (s.piece_moved, enemy_king) {
        if chess::line(dest, king) != EMPTY {
            let screened = chess::between(dest, king) & *after.color_combined(!mover);
            if screened.popcnt() == 1 {
                s.tactics.push("pin".into());
            }
        }
    }

    if classification == Classification::Brilliant {
        s.tactics.push("sacrifice".into());
    }

    s
}

fn narrate(s: &MoveSignals, input: &ExplainInput<'_>, loss: f64) -> (String, String) {
    let san = input.san;
    let best = input.best_move;
    let piece = s.moved_name();

    match input.classification {
        Classification::Brilliant => {
            let simple = if s.has("sacrifice") {
                format!(
                    "Brilliant sacrifice! Giving up the {piece} creates a winning attack that's hard to see."
                )
            } else {
                format!("Brilliant! {san} is an exceptional move finding a hidden winning idea.")
            };
            let mut parts = vec![format!("The move {san} demonstrates deep calculation.")];
            if s.has("sacrifice") {
                parts.push("Material is sacrificed for a decisive attack.".into());
            }
            if s.has("king_attack") {
                parts.push("The enemy king becomes exposed to dangerous threats.".into());
            }
            if s.has("fork") {
                parts.push("Creates a powerful fork winning material back with interest.".into());
            }
            (simple, parts.join(" "))
        }

        Classification::Great => {
            let simple = if s.has("check") {
                format!("Great move! {san} delivers check while creating strong threats.")
            } else if s.piece_captured.is_some() {
                format!(
                    "Excellent capture! Taking the {} is the best response.",
                    s.captured_name()
                )
            } else {
                format!("Great find! {san} is significantly stronger than alternatives.")
            };
            let mut parts = vec![format!("{san} stands out as clearly the best move.")];
            if s.has("check") {
                parts.push("The check forces the opponent into a defensive position.".into());
            }
            if s.has("fork") {
                parts.push("Multiple pieces are attacked simultaneously.".into());
            }
            if s.has("pin") {
                parts.push("A piece is pinned to a more valuable target.".into());
            }
            parts.push("Alternative moves are significantly weaker.".into());
            (simple, parts.join(" "))
        }

        Classification::Best => {
            let simple = if s.is_castling {
                let side = if s.kingside_castle { "kingside" } else { "queenside" };
                format!("Excellent! Castling {side} protects your king and connects your rooks.")
            } else if s.has("checkmate") {
                format!("Checkmate! {san} ends the game.")
            } else if s.piece_captured.is_some() {
                format!(
                    "Best move! Capturing the {} is objectively strongest.",
                    s.captured_name()
                )
            } else if s.develops_piece {
                format!("Perfect development! The {piece} finds its ideal square.")
            } else {
                "This is the engine's top choice - the strongest move in the position.".to_string()
            };
            let mut parts = vec![format!("{san} is the objectively strongest continuation.")];
            if s.has_positional("center_control") {
                parts.push("It establishes powerful central control.".into());
            }
            if s.has_positional("development") {
                parts.push("Piece development is prioritized effectively.".into());
            }
            if s.has_positional("castling") {
                parts.push("King safety is secured while activating the rook.".into());
            }
            if s.has("check") {
                parts.push("The check disrupts opponent's coordination.".into());
            }
            if s.tactics.is_empty() && s.positional.is_empty() {
                parts.push("This move maintains optimal piece activity and limits counterplay.".into());
            }
            (simple, parts.join(" "))
        }

        Classification::Excellent => {
            let simple = format!("Excellent {piece} move! This finds a strong continuation.");
            let mut parts =
                vec![format!("{san} is a very strong move, nearly matching the engine's top choice.")];
            if s.piece_captured.is_some() {
                parts.push(format!(
                    "The {} capture simplifies favorably.",
                    s.captured_name()
                ));
            }
            if s.has_positional("center_control") {
                parts.push("Central influence is expanded.".into());
            }
            (simple, parts.join(" "))
        }

        Classification::Good => {
            let simple = if s.develops_piece {
                format!("Good development! The {piece} moves to an active square.")
            } else if s.controls_center {
                "Solid move! Controls important central squares.".to_string()
            } else if s.piece_captured.is_some() {
                format!(
                    "Reasonable capture. Taking the {} is sensible.",
                    s.captured_name()
                )
            } else {
                format!("A solid {piece} move that maintains the position.")
            };
            let mut parts = vec![format!("{san} is a reasonable move with no significant drawbacks.")];
            if s.has_positional("center_control") {
                parts.push("Central squares remain under influence.".into());
            }
            if s.has_positional("development") {
                parts.push("Piece activity is improved.".into());
            }
            if s.positional.is_empty() {
                parts.push("The position remains balanced with opportunities for both sides.".into());
            }
            (simple, parts.join(" "))
        }

        Classification::Book => (
            "Standard opening move following established theory.".to_string(),
            "This is a well-known theoretical move. Opening preparation helps navigate familiar positions efficiently."
                .to_string(),
        ),

        Classification::Forced => (
            "This was the only legal move available.".to_string(),
            format!("With only one legal option, {san} was forced. The position left no alternatives."),
        ),

        Classification::Inaccuracy => {
            let simple = match best {
                Some(best) => format!(
                    "Small inaccuracy losing ~{loss:.1} pawns of advantage. {best} was more accurate."
                ),
                None => format!(
                    "A slight inaccuracy costing about {loss:.1} pawns. A more precise move existed."
                ),
            };
            let mut parts = vec![format!("{san} gives up approximately {loss:.1} pawns worth of advantage.")];
            if let Some(best) = best {
                parts.push(format!(
                    "The engine prefers {best} which maintains better piece coordination."
                ));
            }
            parts.push(
                "While not a serious error, precision at this level matters for converting advantages."
                    .into(),
            );
            (simple, parts.join(" "))
        }

        Classification::Mistake => {
            let simple = match best {
                Some(best) => format!("Mistake! This loses about {loss:.1} pawns. {best} was much better."),
                None => format!("A significant mistake losing approximately {loss:.1} pawns of advantage."),
            };
            let mut parts = vec![format!("{san} is a clear mistake, dropping about {loss:.1} pawns.")];
            if let Some(best) = best {
                parts.push(format!("The correct move was {best}."));
            }
            if s.piece_captured.is_some() {
                parts.push("This capture loses material or allows a strong response.".into());
            } else {
                parts.push("This move overlooks a tactical opportunity or creates a weakness.".into());
            }
            (simple, parts.join(" "))
        }

        Classification::Blunder => {
            let alternative = best.unwrap_or("Another move");
            let simple = if s.has("checkmate") {
                format!("Blunder! This move allows checkmate. {alternative} was necessary for survival.")
            } else if loss >= 5.0 {
                format!("Major blunder losing over {loss:.0} pawns! {alternative} was critical.")
            } else if let Some(best) = best {
                format!("Blunder losing {loss:.1} pawns! {best} was essential to hold the position.")
            } else {
                format!("Serious blunder! Approximately {loss:.1} pawns are lost.")
            };
            let mut parts = vec![format!("{san} is a serious error losing approximately {loss:.1} pawns.")];
            if let Some(best) = best {
                parts.push(format!("The saving move was {best}."));
            }
            if s.has("fork") {
                parts.push("This allows a devastating fork.".into());
            }
            if s.has("pin") {
                parts.push("A crucial pin is created against your pieces.".into());
            }
            parts.push("This type of mistake often decides games at any level.".into());
            (simple, parts.join(" "))
        }
    }
}
