//! Per-move records and game-level aggregation

use chess_core::{GameMetadata, Side};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::classification::{self, Classification};
use crate::evaluation::EvalSource;

/// Which evaluation tier analysed the game
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisTier {
    Pool,
    Cloud,
    Heuristic,
}

/// Everything reported about one move.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveRecord {
    pub move_number: u32,
    pub color: Side,
    pub san: String,
    pub uci: String,
    pub fen_before: String,
    pub fen_after: String,
    /// Centipawns as produced by the evaluation tier
    pub evaluation_before: i32,
    pub evaluation_after: i32,
    /// Centipawns from the mover's point of view
    pub mover_eval_before: i32,
    pub mover_eval_after: i32,
    pub evaluation_loss: i32,
    pub best_move: Option<String>,
    pub second_best_move: Option<String>,
    pub second_best_eval: Option<i32>,
    pub classification: Classification,
    pub explanation: String,
    pub explanation_advanced: String,
    pub tactical_motifs: Vec<String>,
    pub positional_factors: Vec<String>,
    pub source: EvalSource,
    pub depth: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationCounts {
    pub brilliant: u32,
    pub great: u32,
    pub best: u32,
    pub excellent: u32,
    pub good: u32,
    pub book: u32,
    pub forced: u32,
    pub inaccuracy: u32,
    pub mistake: u32,
    pub blunder: u32,
}

impl ClassificationCounts {
    fn slot(&mut self, classification: Classification) -> &mut u32 {
        match classification {
            Classification::Brilliant => &mut self.brilliant,
            Classification::Great => &mut self.great,
            Classification::Best => &mut self.best,
            Classification::Excellent => &mut self.excellent,
            Classification::Good => &mut self.good,
            Classification::Book => &mut self.book,
            Classification::Forced => &mut self.forced,
            Classification::Inaccuracy => &mut self.inaccuracy,
            Classification::Mistake => &mut self.mistake,
            Classification::Blunder => &mut self.blunder,
        }
    }

    pub fn record(&mut self, classification: Classification) {
        *self.slot(classification) += 1;
    }

    pub fn get(&self, classification: Classification) -> u32 {
        let mut copy = *self;
        *copy.slot(classification)
    }

    pub fn total(&self) -> u32 {
        Classification::ALL.iter().map(|&c| self.get(c)).sum()
    }
}

/// The finished analysis of one game.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<GameMetadata>,
    pub total_moves: usize,
    pub counts: ClassificationCounts,
    pub accuracy: f64,
    pub accuracy_white: f64,
    pub accuracy_black: f64,
    /// Majority evaluation source across moves
    pub source: EvalSource,
    pub tier: AnalysisTier,
    pub depth: u32,
    pub elapsed_ms: u64,
    pub analyzed_at: DateTime<Utc>,
    pub moves: Vec<MoveRecord>,
}

impl GameReport {
    pub fn new(moves: Vec<MoveRecord>, tier: AnalysisTier, depth: u32, elapsed_ms: u64) -> Self {
        let mut counts = ClassificationCounts::default();
        for record in &moves {
            counts.record(record.classification);
        }

        let all: Vec<Classification> = moves.iter().map(|m| m.classification).collect();
        let by_color: Vec<_> = moves
            .iter()
            .map(|m| (chess::Color::from(m.color), m.classification))
            .collect();
        let (white, black) = classification::accuracy_by_color(&by_color);

        Self {
            metadata: None,
            total_moves: moves.len(),
            counts,
            accuracy: round1(classification::accuracy(&all)),
            accuracy_white: round1(white),
            accuracy_black: round1(black),
            source: majority_source(&moves),
            tier,
            depth,
            elapsed_ms,
            analyzed_at: Utc::now(),
            moves,
        }
    }

    pub fn with_metadata(mut self, metadata: GameMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Most frequent per-move source. Ties go to engine, then cloud.
fn majority_source(moves: &[MoveRecord]) -> EvalSource {
    let count = |source: EvalSource| moves.iter().filter(|m| m.source == source).count();
    [EvalSource::Engine, EvalSource::Cloud, EvalSource::Heuristic]
        .into_iter()
        .fold((EvalSource::Heuristic, 0), |(best, best_count), source| {
            let n = count(source);
            if n > best_count {
                (source, n)
            } else {
                (best, best_count)
            }
        })
        .0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(color: Side, classification: Classification, source: EvalSource) -> MoveRecord {
        MoveRecord {
            move_number: 1,
            color,
            san: "e4".into(),
            uci: "e2e4".into(),
            fen_before: String::new(),
            fen_after: String::new(),
            evaluation_before: 0,
            evaluation_after: 0,
            mover_eval_before: 0,
            mover_eval_after: 0,
            evaluation_loss: 0,
            best_move: None,
            second_best_move: None,
            second_best_eval: None,
            classification,
            explanation: String::new(),
            explanation_advanced: String::new(),
            tactical_motifs: vec![],
            positional_factors: vec![],
            source,
            depth: 0,
        }
    }

    #[test]
    fn test_counts_and_accuracy() {
        let moves = vec![
            record(Side::White, Classification::Best, EvalSource::Engine),
            record(Side::Black, Classification::Blunder, EvalSource::Engine),
            record(Side::White, Classification::Good, EvalSource::Engine),
        ];
        let report = GameReport::new(moves, AnalysisTier::Pool, 18, 5);

        assert_eq!(report.total_moves, 3);
        assert_eq!(report.counts.best, 1);
        assert_eq!(report.counts.blunder, 1);
        assert_eq!(report.counts.good, 1);
        assert_eq!(report.counts.total(), 3);
        assert_eq!(report.accuracy, 55.0);
        assert_eq!(report.accuracy_white, 82.5);
        assert_eq!(report.accuracy_black, 0.0);
        assert_eq!(report.source, EvalSource::Engine);
    }

    #[test]
    fn test_majority_source_and_ties() {
        let mixed = vec![
            record(Side::White, Classification::Good, EvalSource::Heuristic),
            record(Side::Black, Classification::Good, EvalSource::Cloud),
            record(Side::White, Classification::Good, EvalSource::Heuristic),
        ];
        assert_eq!(majority_source(&mixed), EvalSource::Heuristic);

        let tied = vec![
            record(Side::White, Classification::Good, EvalSource::Heuristic),
            record(Side::Black, Classification::Good, EvalSource::Cloud),
        ];
        assert_eq!(majority_source(&tied), EvalSource::Cloud);
    }

    #[test]
    fn test_report_serializes_labels() {
        let report = GameReport::new(
            vec![record(Side::White, Classification::Forced, EvalSource::Cloud)],
            AnalysisTier::Cloud,
            30,
            1,
        );
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["source"], "lichess_cloud");
        assert_eq!(json["tier"], "cloud");
        assert_eq!(json["moves"][0]["classification"], "forced");
        assert_eq!(json["moves"][0]["color"], "w");
        assert!(json.get("metadata").is_none());
    }
}
