//! Move classification: dynamic loss thresholds plus sacrifice, great-move
//! and mate handling. Pure functions only.

use std::fmt;
use std::str::FromStr;

use chess::{Board, Color, Piece, Square, ALL_SQUARES};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::board_utils::{attacker_pieces, king_value, parse_square};

/// Second-best score at which the mover was winning anyway
const WINNING_ANYWAY: i32 = 700;
/// Lowest resulting score a sacrifice may leave
const SACRIFICE_FLOOR: i32 = -50;
/// Gap to the second-best move that makes the best move "great"
const GREAT_GAP: i32 = 150;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Brilliant,
    Great,
    Best,
    Excellent,
    Good,
    Book,
    Forced,
    Inaccuracy,
    Mistake,
    Blunder,
}

impl Classification {
    pub const ALL: [Classification; 10] = [
        Classification::Brilliant,
        Classification::Great,
        Classification::Best,
        Classification::Excellent,
        Classification::Good,
        Classification::Book,
        Classification::Forced,
        Classification::Inaccuracy,
        Classification::Mistake,
        Classification::Blunder,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Classification::Brilliant => "brilliant",
            Classification::Great => "great",
            Classification::Best => "best",
            Classification::Excellent => "excellent",
            Classification::Good => "good",
            Classification::Book => "book",
            Classification::Forced => "forced",
            Classification::Inaccuracy => "inaccuracy",
            Classification::Mistake => "mistake",
            Classification::Blunder => "blunder",
        }
    }

    /// Display rank, lower sorts first: top moves, then book/forced, then errors.
    pub fn tier(self) -> u8 {
        match self {
            Classification::Brilliant
            | Classification::Great
            | Classification::Best
            | Classification::Excellent
            | Classification::Good => 0,
            Classification::Book | Classification::Forced => 1,
            Classification::Inaccuracy => 2,
            Classification::Mistake => 3,
            Classification::Blunder => 4,
        }
    }

    /// Weight used for accuracy (0..=1)
    pub fn accuracy_value(self) -> f64 {
        match self {
            Classification::Blunder => 0.0,
            Classification::Mistake => 0.2,
            Classification::Inaccuracy => 0.4,
            Classification::Good => 0.65,
            Classification::Excellent => 0.9,
            Classification::Best
            | Classification::Great
            | Classification::Brilliant
            | Classification::Book
            | Classification::Forced => 1.0,
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything `classify` looks at. Scores are from the mover's point of view.
#[derive(Debug, Clone, PartialEq)]
pub struct MoveContext {
    pub eval_before: i32,
    pub eval_after: i32,
    pub best_move: Option<String>,
    pub played_move: String,
    pub second_best_eval: Option<i32>,
    pub is_mate_before: bool,
    pub is_mate_after: bool,
    /// Positive = mover mates
    pub mate_in_before: Option<i32>,
    pub mate_in_after: Option<i32>,
    pub move_number: u32,
    pub is_forced: bool,
    pub fen_before: String,
    pub fen_after: String,
}

impl MoveContext {
    pub fn eval_loss(&self) -> i32 {
        self.eval_before - self.eval_after
    }

    fn is_best_move(&self) -> bool {
        self.best_move.as_deref() == Some(self.played_move.as_str())
    }
}

/// Maximum centipawn loss still earning `classification`, given the score
/// before the move. Grows with |eval_before|.
pub fn loss_threshold(classification: Classification, eval_before: i32) -> f64 {
    let x = f64::from(eval_before).abs();
    let threshold = match classification {
        Classification::Best => 0.0001 * x * x + 0.0236 * x + 10.0,
        Classification::Excellent => 0.0002 * x * x + 0.1231 * x + 27.5455,
        Classification::Good => 0.0002 * x * x + 0.2643 * x + 60.5455,
        Classification::Inaccuracy => 0.0002 * x * x + 0.3624 * x + 108.0909,
        Classification::Mistake => 0.0003 * x * x + 0.4027 * x + 225.8182,
        _ => f64::INFINITY,
    };
    threshold.max(0.0)
}

/// Classify one move.
pub fn classify(ctx: &MoveContext) -> Classification {
    if ctx.is_forced {
        return Classification::Forced;
    }

    let (board_before, board_after) =
        match (Board::from_str(&ctx.fen_before), Board::from_str(&ctx.fen_after)) {
            (Ok(before), Ok(after)) => (before, after),
            _ => {
                warn!(
                    fen_before = %ctx.fen_before,
                    fen_after = %ctx.fen_after,
                    "Cannot classify move on unreadable position"
                );
                return Classification::Good;
            }
        };

    let loss = f64::from(ctx.eval_loss());

    if ctx.move_number <= 5 && loss <= loss_threshold(Classification::Good, ctx.eval_before) {
        return Classification::Book;
    }

    let mut classification = base_classification(ctx, loss);

    if classification == Classification::Best
        && !ctx.is_mate_before
        && is_sacrifice(ctx, &board_before, &board_after)
    {
        classification = Classification::Brilliant;
    }

    if classification == Classification::Best
        && !ctx.is_mate_before
        && !ctx.is_mate_after
        && is_clearly_only_move(ctx, &board_before, &board_after)
    {
        classification = Classification::Great;
    }

    apply_clamps(ctx, classification)
}

fn base_classification(ctx: &MoveContext, loss: f64) -> Classification {
    let best = ctx.is_best_move();

    match (ctx.is_mate_before, ctx.is_mate_after) {
        (false, false) => {
            if best {
                return Classification::Best;
            }
            [
                Classification::Best,
                Classification::Excellent,
                Classification::Good,
                Classification::Inaccuracy,
                Classification::Mistake,
            ]
            .into_iter()
            .find(|c| loss <= loss_threshold(*c, ctx.eval_before))
            .unwrap_or(Classification::Blunder)
        }

        // Walked into (or found) a mate
        (false, true) => match ctx.mate_in_after {
            _ if best => Classification::Best,
            // 0 means the mover just delivered mate
            Some(m) if m >= 0 => Classification::Best,
            Some(m) if m >= -2 => Classification::Blunder,
            Some(m) if m >= -5 => Classification::Mistake,
            _ => Classification::Inaccuracy,
        },

        // Mate on the board before, gone after
        (true, false) => {
            if best {
                Classification::Best
            } else if ctx.mate_in_before.is_some_and(|m| m < 0) {
                if ctx.eval_after >= 0 {
                    Classification::Best
                } else {
                    Classification::Good
                }
            } else if ctx.eval_after >= 400 {
                Classification::Good
            } else if ctx.eval_after >= 150 {
                Classification::Inaccuracy
            } else if ctx.eval_after >= -100 {
                Classification::Mistake
            } else {
                Classification::Blunder
            }
        }

        (true, true) => {
            if best {
                return Classification::Best;
            }
            match (ctx.mate_in_before, ctx.mate_in_after) {
                (Some(before), after) if before > 0 => match after {
                    Some(a) if a <= -4 => Classification::Mistake,
                    Some(a) if a < 0 => Classification::Blunder,
                    // Includes Some(0): the mate was delivered
                    Some(a) if a <= before => Classification::Best,
                    Some(a) if a <= before + 2 => Classification::Excellent,
                    _ => Classification::Good,
                },
                (before, after) => {
                    if before == after {
                        Classification::Best
                    } else {
                        Classification::Good
                    }
                }
            }
        }
    }
}

/// The best move left one of the mover's pieces en prise in a position
/// that still holds.
fn is_sacrifice(ctx: &MoveContext, board_before: &Board, board_after: &Board) -> bool {
    if ctx
        .second_best_eval
        .is_some_and(|second| second >= WINNING_ANYWAY)
    {
        return false;
    }
    if ctx.eval_after < SACRIFICE_FLOOR {
        return false;
    }
    if board_before.checkers().popcnt() > 0 {
        return false;
    }

    let Some(to_square) = ctx.played_move.get(2..4).and_then(parse_square) else {
        return false;
    };

    let mover = board_before.side_to_move();
    let captured = board_before.piece_on(to_square);

    ALL_SQUARES.iter().any(|&square| {
        let Some(piece) = board_after.piece_on(square) else {
            return false;
        };
        if board_after.color_on(square) != Some(mover)
            || matches!(piece, Piece::King | Piece::Pawn)
        {
            return false;
        }
        // Recapturing something at least as valuable is a trade
        if square == to_square
            && captured.is_some_and(|c| king_value(c) >= king_value(piece))
        {
            return false;
        }
        is_piece_hanging(board_before, board_after, square)
    })
}

/// Best move that clearly beats the runner-up and does not hang the moved piece.
fn is_clearly_only_move(ctx: &MoveContext, board_before: &Board, board_after: &Board) -> bool {
    let Some(second) = ctx.second_best_eval else {
        return false;
    };
    if ctx.eval_before - second < GREAT_GAP {
        return false;
    }
    match ctx.played_move.get(2..4).and_then(parse_square) {
        Some(dest) => !is_piece_hanging(board_before, board_after, dest),
        // Unreadable destination: keep the upgrade
        None => true,
    }
}

/// Can the piece on `square` (after the move) be taken for profit?
pub fn is_piece_hanging(board_before: &Board, board_after: &Board, square: Square) -> bool {
    let (piece, color) = match (board_after.piece_on(square), board_after.color_on(square)) {
        (Some(p), Some(c)) => (p, c),
        _ => return false,
    };

    let attackers = attacker_pieces(board_after, !color, square);
    if attackers.is_empty() {
        return false;
    }
    let defenders = attacker_pieces(board_after, color, square);

    // Just traded for something of equal or greater value
    if let (Some(last), Some(last_color)) =
        (board_before.piece_on(square), board_before.color_on(square))
    {
        if last_color != color && king_value(last) >= king_value(piece) {
            return false;
        }
    }

    let value = king_value(piece);

    if attackers.iter().any(|&a| king_value(a) <= value) {
        return true;
    }

    if attackers.len() > defenders.len() {
        let cheapest_attacker = attackers
            .iter()
            .map(|&a| king_value(a))
            .min()
            .unwrap_or(i32::MAX);

        if value < cheapest_attacker
            && defenders.iter().any(|&d| king_value(d) < cheapest_attacker)
        {
            return false;
        }
        if defenders.contains(&Piece::Pawn) {
            return false;
        }
        return true;
    }

    false
}

fn apply_clamps(ctx: &MoveContext, mut classification: Classification) -> Classification {
    // Still completely winning
    if classification == Classification::Blunder && ctx.eval_after >= 600 {
        classification = Classification::Inaccuracy;
    }
    // Already completely lost
    if classification == Classification::Blunder
        && ctx.eval_before <= -600
        && !ctx.is_mate_before
        && !ctx.is_mate_after
    {
        classification = Classification::Inaccuracy;
    }
    if classification == Classification::Inaccuracy && ctx.eval_after >= 500 {
        classification = Classification::Good;
    }
    classification
}

/// Mean accuracy value as a percentage. An empty list scores 0.
pub fn accuracy(classifications: &[Classification]) -> f64 {
    if classifications.is_empty() {
        return 0.0;
    }
    let total: f64 = classifications.iter().map(|c| c.accuracy_value()).sum();
    total / classifications.len() as f64 * 100.0
}

/// Accuracy for each side, split by mover color
pub fn accuracy_by_color(moves: &[(Color, Classification)]) -> (f64, f64) {
    let side = |color: Color| -> Vec<Classification> {
        moves
            .iter()
            .filter(|(c, _)| *c == color)
            .map(|(_, class)| *class)
            .collect()
    };
    (accuracy(&side(Color::White)), accuracy(&side(Color::Black)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const START: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";
    const AFTER_E4: &str = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1";

    fn quiet_move(eval_before: i32, eval_after: i32) -> MoveContext {
        MoveContext {
            eval_before,
            eval_after,
            best_move: Some("d2d4".into()),
            played_move: "e2e4".into(),
            second_best_eval: None,
            is_mate_before: false,
            is_mate_after: false,
            mate_in_before: None,
            mate_in_after: None,
            move_number: 20,
            is_forced: false,
            fen_before: START.into(),
            fen_after: AFTER_E4.into(),
        }
    }

    #[test]
    fn test_thresholds_at_zero() {
        assert!((loss_threshold(Classification::Best, 0) - 10.0).abs() < 1e-9);
        assert!((loss_threshold(Classification::Mistake, 0) - 225.8182).abs() < 1e-9);
        assert_eq!(loss_threshold(Classification::Blunder, 0), f64::INFINITY);
    }

    #[test]
    fn test_thresholds_grow_with_magnitude() {
        for class in [
            Classification::Best,
            Classification::Excellent,
            Classification::Good,
            Classification::Inaccuracy,
            Classification::Mistake,
        ] {
            let mut last = loss_threshold(class, 0);
            for x in (50..3000).step_by(50) {
                let t = loss_threshold(class, x);
                assert!(t > last, "{class} threshold not increasing at {x}");
                assert_eq!(t, loss_threshold(class, -x));
                last = t;
            }
        }
    }

    #[test]
    fn test_loss_ladder() {
        assert_eq!(classify(&quiet_move(0, -5)), Classification::Best);
        assert_eq!(classify(&quiet_move(0, -20)), Classification::Excellent);
        assert_eq!(classify(&quiet_move(0, -50)), Classification::Good);
        assert_eq!(classify(&quiet_move(0, -100)), Classification::Inaccuracy);
        assert_eq!(classify(&quiet_move(0, -200)), Classification::Mistake);
        assert_eq!(classify(&quiet_move(0, -350)), Classification::Blunder);
    }

    #[test]
    fn test_forced_wins_over_everything() {
        let mut ctx = quiet_move(0, -900);
        ctx.is_forced = true;
        ctx.fen_before = "garbage".into();
        assert_eq!(classify(&ctx), Classification::Forced);
    }

    #[test]
    fn test_unreadable_board_is_good() {
        let mut ctx = quiet_move(0, -900);
        ctx.fen_after = "garbage".into();
        assert_eq!(classify(&ctx), Classification::Good);
    }

    #[test]
    fn test_book_in_opening() {
        let mut ctx = quiet_move(30, 0);
        ctx.move_number = 3;
        assert_eq!(classify(&ctx), Classification::Book);

        // Too costly to count as theory
        ctx.eval_after = -200;
        assert_eq!(classify(&ctx), Classification::Mistake);
    }

    #[test]
    fn test_best_move_without_second_best_is_best() {
        let mut ctx = quiet_move(40, 40);
        ctx.best_move = Some("e2e4".into());
        assert_eq!(classify(&ctx), Classification::Best);
    }

    #[test]
    fn test_great_when_runner_up_is_far_behind() {
        let mut ctx = quiet_move(100, 100);
        ctx.best_move = Some("e2e4".into());
        ctx.second_best_eval = Some(-100);
        assert_eq!(classify(&ctx), Classification::Great);

        ctx.second_best_eval = Some(0);
        assert_eq!(classify(&ctx), Classification::Best);
    }

    #[test]
    fn test_brilliant_when_piece_left_en_prise() {
        // 1. e4 e5 2. Nf3 d6 3. Nxe5: the knight can be taken by the d6 pawn
        let mut ctx = quiet_move(50, 40);
        ctx.fen_before = "rnbqkbnr/ppp2ppp/3p4/4p3/4P3/5N2/PPPP1PPP/RNBQKB1R w KQkq - 0 3".into();
        ctx.fen_after = "rnbqkbnr/ppp2ppp/3p4/4N3/4P3/8/PPPP1PPP/RNBQKB1R b KQkq - 0 3".into();
        ctx.played_move = "f3e5".into();
        ctx.best_move = Some("f3e5".into());
        assert_eq!(classify(&ctx), Classification::Brilliant);

        // Not when the mover was winning anyway
        ctx.second_best_eval = Some(800);
        assert_eq!(classify(&ctx), Classification::Best);

        // Not when the resulting position is bad
        ctx.second_best_eval = None;
        ctx.eval_after = -120;
        ctx.eval_before = -110;
        assert_eq!(classify(&ctx), Classification::Best);
    }

    #[test]
    fn test_hanging_piece_rules() {
        // White knight on e5 attacked by the d6 pawn
        let before = "rnbqkb1r/ppp2ppp/3p1n2/8/4P3/5N2/PPPP1PPP/RNBQKB1R w KQkq - 0 4";
        let after = "rnbqkb1r/ppp2ppp/3p1n2/4N3/4P3/8/PPPP1PPP/RNBQKB1R b KQkq - 1 4";
        let b = Board::from_str(before).unwrap();
        let a = Board::from_str(after).unwrap();
        let e5 = parse_square("e5").unwrap();
        assert!(is_piece_hanging(&b, &a, e5));

        // Unattacked piece is never hanging
        let f1 = parse_square("f1").unwrap();
        assert!(!is_piece_hanging(&b, &a, f1));

        // Empty square
        assert!(!is_piece_hanging(&b, &a, parse_square("e6").unwrap()));
    }

    #[test]
    fn test_equal_trade_is_not_hanging() {
        // Bxc6: bishop took a knight and can be retaken by the b7 pawn
        let before = "r1bqkbnr/pppp1ppp/2n5/1B2p3/4P3/5N2/PPPP1PPP/RNBQK2R w KQkq - 2 3";
        let after = "r1bqkbnr/pppp1ppp/2B5/4p3/4P3/5N2/PPPP1PPP/RNBQK2R b KQkq - 0 3";
        let b = Board::from_str(before).unwrap();
        let a = Board::from_str(after).unwrap();
        assert!(!is_piece_hanging(&b, &a, parse_square("c6").unwrap()));
    }

    #[test]
    fn test_mate_after_branches() {
        let mut ctx = quiet_move(100, -9980);
        ctx.is_mate_after = true;

        ctx.mate_in_after = Some(-2);
        assert_eq!(classify(&ctx), Classification::Blunder);
        ctx.mate_in_after = Some(-4);
        assert_eq!(classify(&ctx), Classification::Mistake);
        ctx.mate_in_after = Some(-8);
        assert_eq!(classify(&ctx), Classification::Inaccuracy);

        // Mover found a mate of their own
        ctx.eval_after = 9970;
        ctx.mate_in_after = Some(3);
        assert_eq!(classify(&ctx), Classification::Best);
    }

    #[test]
    fn test_mate_before_lost() {
        let mut ctx = quiet_move(9970, 450);
        ctx.is_mate_before = true;
        ctx.mate_in_before = Some(3);
        assert_eq!(classify(&ctx), Classification::Good);
        ctx.eval_after = 200;
        // Inaccuracy, not softened since eval_after < 500
        assert_eq!(classify(&ctx), Classification::Inaccuracy);
        ctx.eval_after = 0;
        assert_eq!(classify(&ctx), Classification::Mistake);
        ctx.eval_after = -300;
        assert_eq!(classify(&ctx), Classification::Blunder);

        // Escaped a mate against
        ctx.mate_in_before = Some(-3);
        ctx.eval_before = -9970;
        ctx.eval_after = 10;
        assert_eq!(classify(&ctx), Classification::Best);
        ctx.eval_after = -200;
        assert_eq!(classify(&ctx), Classification::Good);
    }

    #[test]
    fn test_mate_before_and_after() {
        let mut ctx = quiet_move(9970, 9960);
        ctx.is_mate_before = true;
        ctx.is_mate_after = true;
        ctx.mate_in_before = Some(3);

        ctx.mate_in_after = Some(3);
        assert_eq!(classify(&ctx), Classification::Best);
        ctx.mate_in_after = Some(5);
        assert_eq!(classify(&ctx), Classification::Excellent);
        ctx.mate_in_after = Some(7);
        assert_eq!(classify(&ctx), Classification::Good);
        ctx.mate_in_after = Some(-2);
        ctx.eval_after = -9980;
        assert_eq!(classify(&ctx), Classification::Blunder);
        ctx.mate_in_after = Some(-4);
        assert_eq!(classify(&ctx), Classification::Mistake);

        // Being mated: same distance is best
        ctx.mate_in_before = Some(-3);
        ctx.mate_in_after = Some(-3);
        assert_eq!(classify(&ctx), Classification::Best);
        ctx.mate_in_after = Some(-2);
        assert_eq!(classify(&ctx), Classification::Good);
    }

    #[test]
    fn test_clamps() {
        // Already lost: a big loss is only an inaccuracy
        assert_eq!(classify(&quiet_move(-700, -1400)), Classification::Inaccuracy);

        // Inaccuracy softened while still winning big
        assert_eq!(classify(&quiet_move(1200, 500)), Classification::Good);

        // Allowing a mate while the score still reads as crushing
        let mut ctx = quiet_move(800, 700);
        ctx.is_mate_after = true;
        ctx.mate_in_after = Some(-1);
        assert_ne!(classify(&ctx), Classification::Blunder);
    }

    #[test]
    fn test_clamp_boundaries() {
        // Clamps chain: a blunder that leaves +600 ends up Good
        let winning = quiet_move(3000, 650);
        assert_eq!(apply_clamps(&winning, Classification::Blunder), Classification::Good);
        assert_eq!(classify(&winning), Classification::Good);

        // Exactly -600 before counts as already lost
        assert_eq!(classify(&quiet_move(-600, -1200)), Classification::Inaccuracy);
        assert_eq!(classify(&quiet_move(-500, -1200)), Classification::Blunder);

        // Mate involved: no softening for a lost position
        let mut mated = quiet_move(-700, -1400);
        mated.is_mate_after = true;
        mated.mate_in_after = Some(-1);
        assert_eq!(classify(&mated), Classification::Blunder);
    }

    #[test]
    fn test_accuracy() {
        assert_eq!(accuracy(&[]), 0.0);
        assert_eq!(accuracy(&[Classification::Best; 4]), 100.0);
        assert_eq!(accuracy(&[Classification::Blunder; 4]), 0.0);
        let mixed = accuracy(&[Classification::Good, Classification::Mistake]);
        assert!((mixed - 42.5).abs() < 1e-9);

        let (white, black) = accuracy_by_color(&[
            (Color::White, Classification::Best),
            (Color::Black, Classification::Inaccuracy),
        ]);
        assert_eq!(white, 100.0);
        assert!((black - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_tiers_order_display() {
        assert!(Classification::Brilliant.tier() < Classification::Forced.tier());
        assert!(Classification::Book.tier() < Classification::Inaccuracy.tier());
        assert!(Classification::Mistake.tier() < Classification::Blunder.tier());
        assert_eq!(
            serde_json::to_string(&Classification::Inaccuracy).unwrap(),
            "\"inaccuracy\""
        );
    }
}
