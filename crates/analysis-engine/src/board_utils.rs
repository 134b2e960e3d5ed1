/// Board utility functions shared by classification and explanation

use chess::{BitBoard, Board, ChessMove, Color, File, Piece, Rank, Square, EMPTY};

// Piece values for exchange arithmetic
pub const PAWN_VALUE: i32 = 1;
pub const KNIGHT_VALUE: i32 = 3;
pub const BISHOP_VALUE: i32 = 3;
pub const ROOK_VALUE: i32 = 5;
pub const QUEEN_VALUE: i32 = 9;
pub const KING_VALUE: i32 = 99;

/// Piece value (no king)
pub fn piece_value(piece: Piece) -> i32 {
    match piece {
        Piece::Pawn => PAWN_VALUE,
        Piece::Knight => KNIGHT_VALUE,
        Piece::Bishop => BISHOP_VALUE,
        Piece::Rook => ROOK_VALUE,
        Piece::Queen => QUEEN_VALUE,
        Piece::King => 0,
    }
}

/// Piece value including king (a king outranks everything)
pub fn king_value(piece: Piece) -> i32 {
    match piece {
        Piece::King => KING_VALUE,
        other => piece_value(other),
    }
}

pub fn piece_name(piece: Piece) -> &'static str {
    match piece {
        Piece::Pawn => "pawn",
        Piece::Knight => "knight",
        Piece::Bishop => "bishop",
        Piece::Rook => "rook",
        Piece::Queen => "queen",
        Piece::King => "king",
    }
}

/// Squares attacked by the piece on `square`
pub fn attacks(board: &Board, square: Square) -> BitBoard {
    let (piece, color) = match (board.piece_on(square), board.color_on(square)) {
        (Some(p), Some(c)) => (p, c),
        _ => return EMPTY,
    };

    match piece {
        Piece::Pawn => pawn_attacks(square, color),
        Piece::Knight => chess::get_knight_moves(square),
        Piece::King => chess::get_king_moves(square),
        Piece::Bishop => chess::get_bishop_moves(square, *board.combined()),
        Piece::Rook => chess::get_rook_moves(square, *board.combined()),
        Piece::Queen => {
            chess::get_bishop_moves(square, *board.combined())
                | chess::get_rook_moves(square, *board.combined())
        }
    }
}

/// Pawn attack squares (just the diagonal attacks, not pushes)
pub fn pawn_attacks(square: Square, color: Color) -> BitBoard {
    let file = square.get_file().to_index();
    let rank = square.get_rank().to_index();

    let target_rank = match color {
        Color::White if rank < 7 => rank + 1,
        Color::Black if rank > 0 => rank - 1,
        _ => return EMPTY,
    };

    let mut result = EMPTY;
    for target_file in [file.checked_sub(1), Some(file + 1).filter(|f| *f < 8)]
        .into_iter()
        .flatten()
    {
        result |= BitBoard::from_square(Square::make_square(
            Rank::from_index(target_rank),
            File::from_index(target_file),
        ));
    }
    result
}

/// All pieces of `color` attacking `square`
pub fn attackers(board: &Board, color: Color, square: Square) -> BitBoard {
    let occupied = *board.combined();
    let color_pieces = *board.color_combined(color);

    let mut result = EMPTY;

    // Pawns: reverse lookup from the target with the opposite color
    result |= pawn_attacks(square, !color) & *board.pieces(Piece::Pawn) & color_pieces;
    result |= chess::get_knight_moves(square) & *board.pieces(Piece::Knight) & color_pieces;
    result |= chess::get_king_moves(square) & *board.pieces(Piece::King) & color_pieces;

    let diagonal = *board.pieces(Piece::Bishop) | *board.pieces(Piece::Queen);
    result |= chess::get_bishop_moves(square, occupied) & diagonal & color_pieces;

    let straight = *board.pieces(Piece::Rook) | *board.pieces(Piece::Queen);
    result |= chess::get_rook_moves(square, occupied) & straight & color_pieces;

    result
}

/// Piece types of every `color` attacker of `square`
pub fn attacker_pieces(board: &Board, color: Color, square: Square) -> Vec<Piece> {
    attackers(board, color, square)
        .filter_map(|sq| board.piece_on(sq))
        .collect()
}

/// King square for a color (None on malformed boards)
pub fn king_square(board: &Board, color: Color) -> Option<Square> {
    let king_bb = *board.pieces(Piece::King) & *board.color_combined(color);
    (king_bb.popcnt() == 1).then(|| king_bb.to_square())
}

/// Is a move castling?
pub fn is_castling_move(board: &Board, m: ChessMove) -> bool {
    if board.piece_on(m.get_source()) != Some(Piece::King) {
        return false;
    }
    let from_file = m.get_source().get_file().to_index() as i32;
    let to_file = m.get_dest().get_file().to_index() as i32;
    (from_file - to_file).abs() > 1
}

/// Parse a square name such as `e4`
pub fn parse_square(name: &str) -> Option<Square> {
    let bytes = name.as_bytes();
    if bytes.len() != 2 {
        return None;
    }
    let (file, rank) = (bytes[0], bytes[1]);
    if !(b'a'..=b'h').contains(&file) || !(b'1'..=b'8').contains(&rank) {
        return None;
    }
    Some(Square::make_square(
        Rank::from_index((rank - b'1') as usize),
        File::from_index((file - b'a') as usize),
    ))
}
