//! Replays a SAN move list from the initial position into analysable plies.

use chess::{Board, ChessMove, File, MoveGen, Piece, Rank, Square};
use thiserror::Error;

use crate::game_data::{GameMetadata, Ply, Side};
use crate::pgn;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReplayError {
    #[error("PGN could not be parsed")]
    InvalidPgn,

    #[error("Illegal or unreadable move {san:?} at ply {index}: {reason}")]
    IllegalMove {
        index: usize,
        san: String,
        reason: String,
    },
}

/// A game replayed as far as its moves were legal.
#[derive(Debug, Clone)]
pub struct ReplayedGame {
    pub metadata: GameMetadata,
    pub plies: Vec<Ply>,
    /// Set when replay stopped early on an unreadable move
    pub stopped_at: Option<ReplayError>,
}

/// Parse PGN text and replay its mainline.
///
/// Replay stops at the first move that does not parse or is illegal; the
/// plies before it are kept.
pub fn replay_pgn(pgn_text: &str) -> Result<ReplayedGame, ReplayError> {
    let game = pgn::parse_pgn(pgn_text).ok_or(ReplayError::InvalidPgn)?;
    let (plies, stopped_at) = replay_until_error(&game.moves);
    Ok(ReplayedGame {
        metadata: game.metadata,
        plies,
        stopped_at,
    })
}

/// Replay SAN moves strictly: any bad move is an error.
pub fn replay_san<S: AsRef<str>>(san_moves: &[S]) -> Result<Vec<Ply>, ReplayError> {
    match replay_until_error(san_moves) {
        (plies, None) => Ok(plies),
        (_, Some(err)) => Err(err),
    }
}

fn replay_until_error<S: AsRef<str>>(san_moves: &[S]) -> (Vec<Ply>, Option<ReplayError>) {
    let mut board = Board::default();
    let mut plies = Vec::with_capacity(san_moves.len());

    for (index, san) in san_moves.iter().enumerate() {
        let san = san.as_ref();
        let legal_count = MoveGen::new_legal(&board).len();

        let chess_move = match find_san_move(&board, san) {
            Ok(m) => m,
            Err(reason) => {
                return (
                    plies,
                    Some(ReplayError::IllegalMove {
                        index,
                        san: san.to_string(),
                        reason,
                    }),
                )
            }
        };

        let fen_before = board.to_string();
        let color = Side::from(board.side_to_move());
        board = board.make_move_new(chess_move);

        plies.push(Ply {
            index,
            move_number: (index / 2) as u32 + 1,
            color,
            san: san.to_string(),
            uci: uci_string(chess_move),
            fen_before,
            fen_after: board.to_string(),
            forced: legal_count == 1,
        });
    }

    (plies, None)
}

/// Format a move in UCI long algebraic notation (e.g. `e7e8q`).
pub fn uci_string(chess_move: ChessMove) -> String {
    format!(
        "{}{}{}",
        chess_move.get_source(),
        chess_move.get_dest(),
        chess_move
            .get_promotion()
            .map(|p| match p {
                Piece::Queen => "q",
                Piece::Rook => "r",
                Piece::Bishop => "b",
                Piece::Knight => "n",
                _ => "",
            })
            .unwrap_or("")
    )
}

/// Parse a UCI move string (no legality check).
pub fn parse_uci_move(uci: &str) -> Option<ChessMove> {
    let bytes = uci.as_bytes();
    if bytes.len() < 4 {
        return None;
    }

    let from = parse_square(bytes[0], bytes[1])?;
    let to = parse_square(bytes[2], bytes[3])?;

    let promotion = match bytes.get(4) {
        Some(b'q' | b'Q') => Some(Piece::Queen),
        Some(b'r' | b'R') => Some(Piece::Rook),
        Some(b'b' | b'B') => Some(Piece::Bishop),
        Some(b'n' | b'N') => Some(Piece::Knight),
        _ => None,
    };

    Some(ChessMove::new(from, to, promotion))
}

fn parse_square(file: u8, rank: u8) -> Option<Square> {
    if !(b'a'..=b'h').contains(&file) || !(b'1'..=b'8').contains(&rank) {
        return None;
    }
    Some(Square::make_square(
        Rank::from_index((rank - b'1') as usize),
        File::from_index((file - b'a') as usize),
    ))
}

/// Find the legal move matching a SAN string
fn find_san_move(board: &Board, san: &str) -> Result<ChessMove, String> {
    let clean = san.trim_end_matches(|c: char| c == '+' || c == '#' || c == '!' || c == '?');

    let legal_moves: Vec<ChessMove> = MoveGen::new_legal(board).collect();

    if clean == "O-O" || clean == "0-0" || clean == "O-O-O" || clean == "0-0-0" {
        let kingside = clean.len() == 3;
        return legal_moves
            .iter()
            .copied()
            .find(|m| {
                if board.piece_on(m.get_source()) != Some(Piece::King) {
                    return false;
                }
                let src_file = m.get_source().get_file().to_index() as i32;
                let dst_file = m.get_dest().get_file().to_index() as i32;
                if kingside {
                    dst_file - src_file == 2
                } else {
                    src_file - dst_file == 2
                }
            })
            .ok_or_else(|| format!("no castling move available for {san}"));
    }

    let bytes = clean.as_bytes();
    if bytes.is_empty() {
        return Err("empty SAN move".to_string());
    }

    let (piece, rest) = if bytes[0].is_ascii_uppercase() {
        let p = match bytes[0] {
            b'K' => Piece::King,
            b'Q' => Piece::Queen,
            b'R' => Piece::Rook,
            b'B' => Piece::Bishop,
            b'N' => Piece::Knight,
            other => return Err(format!("unknown piece {}", other as char)),
        };
        (p, &clean[1..])
    } else {
        (Piece::Pawn, clean)
    };

    let (rest, promotion) = if let Some(eq_pos) = rest.find('=') {
        let promo_piece = match rest.as_bytes().get(eq_pos + 1) {
            Some(b'Q') => Some(Piece::Queen),
            Some(b'R') => Some(Piece::Rook),
            Some(b'B') => Some(Piece::Bishop),
            Some(b'N') => Some(Piece::Knight),
            _ => None,
        };
        (&rest[..eq_pos], promo_piece)
    } else {
        (rest, None)
    };

    let rest = rest.replace('x', "");
    let rest_bytes = rest.as_bytes();
    if rest_bytes.len() < 2 {
        return Err(format!("SAN too short: {san}"));
    }

    let dest = parse_square(
        rest_bytes[rest_bytes.len() - 2],
        rest_bytes[rest_bytes.len() - 1],
    )
    .ok_or_else(|| format!("invalid destination in {san}"))?;

    let disambig = &rest_bytes[..rest_bytes.len() - 2];

    let candidates: Vec<ChessMove> = legal_moves
        .into_iter()
        .filter(|m| {
            m.get_dest() == dest
                && board.piece_on(m.get_source()) == Some(piece)
                && m.get_promotion() == promotion
        })
        .filter(|m| {
            let src = m.get_source();
            disambig.iter().all(|&b| match b {
                b'a'..=b'h' => src.get_file().to_index() == (b - b'a') as usize,
                b'1'..=b'8' => src.get_rank().to_index() == (b - b'1') as usize,
                _ => true,
            })
        })
        .collect();

    match candidates.len() {
        1 => Ok(candidates[0]),
        0 => Err(format!("no legal move matches {san}")),
        n => Err(format!("ambiguous SAN {san} ({n} candidates)")),
    }
}
