//! Game analysis: evaluate every position, then classify and explain each move
//!
//! Positions go to the engine pool first. When the pool is empty or produced
//! nothing usable, the cloud cache is tried in paced batches, and as a last
//! resort every position is scored by material count.

use std::time::Instant;

use chess_core::{replay_pgn, Ply, Side};
use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::classification::{self, MoveContext};
use crate::cloud::{CloudEvalSource, LichessCloudClient};
use crate::config::EngineConfig;
use crate::evaluation::{EvalSource, Evaluation, Perspective};
use crate::explanation::{self, ExplainInput};
use crate::pool::EnginePool;
use crate::report::{AnalysisTier, GameReport, MoveRecord};
use crate::stockfish::{StockfishEngine, UciEngine};

/// Cloud scores at or beyond this magnitude are treated as mate
const CLOUD_MATE_THRESHOLD: i32 = 9000;

#[derive(Debug, Clone)]
pub enum AnalysisOutcome {
    Completed(GameReport),
    Failed { reason: String },
}

impl AnalysisOutcome {
    pub fn report(&self) -> Option<&GameReport> {
        match self {
            AnalysisOutcome::Completed(report) => Some(report),
            AnalysisOutcome::Failed { .. } => None,
        }
    }

    fn failed(reason: impl Into<String>) -> Self {
        AnalysisOutcome::Failed {
            reason: reason.into(),
        }
    }
}

/// Scores of one move from the mover's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MoverView {
    before: i32,
    after: i32,
    is_mate_before: bool,
    is_mate_after: bool,
    mate_in_before: Option<i32>,
    mate_in_after: Option<i32>,
    second_best: Option<i32>,
}

impl MoverView {
    fn new(before: &Evaluation, after: &Evaluation, mover: Side) -> Self {
        match before.perspective {
            // Side to move flips between the two positions
            Perspective::SideToMove => Self {
                before: before.centipawns(),
                after: -after.centipawns(),
                is_mate_before: before.is_mate(),
                is_mate_after: after.is_mate(),
                mate_in_before: before.mate_in(),
                mate_in_after: after.mate_in().map(|m| -m),
                second_best: before.second_best_centipawns(),
            },
            Perspective::White => {
                let sign = mover.sign();
                let (cp_before, cp_after) = (before.centipawns(), after.centipawns());
                let mate = |cp: i32| (cp.abs() >= CLOUD_MATE_THRESHOLD).then(|| cp.signum() * sign);
                Self {
                    before: cp_before * sign,
                    after: cp_after * sign,
                    is_mate_before: cp_before.abs() >= CLOUD_MATE_THRESHOLD,
                    is_mate_after: cp_after.abs() >= CLOUD_MATE_THRESHOLD,
                    mate_in_before: mate(cp_before),
                    mate_in_after: mate(cp_after),
                    second_best: before.second_best_centipawns().map(|cp| cp * sign),
                }
            }
        }
    }
}

pub struct GameAnalyzer<'a, E: UciEngine = StockfishEngine, C: CloudEvalSource = LichessCloudClient> {
    pool: &'a EnginePool<E>,
    cloud: &'a C,
    config: &'a EngineConfig,
}

impl<'a, E: UciEngine, C: CloudEvalSource> GameAnalyzer<'a, E, C> {
    pub fn new(pool: &'a EnginePool<E>, cloud: &'a C, config: &'a EngineConfig) -> Self {
        Self {
            pool,
            cloud,
            config,
        }
    }

    /// Replay PGN text and analyse its mainline. Moves after the first
    /// unreadable one are dropped.
    pub async fn analyze_pgn(&self, pgn: &str) -> AnalysisOutcome {
        let game = match replay_pgn(pgn) {
            Ok(game) => game,
            Err(e) => return AnalysisOutcome::failed(e.to_string()),
        };
        if let Some(err) = &game.stopped_at {
            warn!(error = %err, plies = game.plies.len(), "PGN replay stopped early");
        }

        match self.analyze(&game.plies).await {
            AnalysisOutcome::Completed(report) => {
                AnalysisOutcome::Completed(report.with_metadata(game.metadata))
            }
            failed => failed,
        }
    }

    pub async fn analyze(&self, plies: &[Ply]) -> AnalysisOutcome {
        let Some(first) = plies.first() else {
            return AnalysisOutcome::failed("game has no moves to analyse");
        };
        let started = Instant::now();

        let positions: Vec<&str> = std::iter::once(first.fen_before.as_str())
            .chain(plies.iter().map(|p| p.fen_after.as_str()))
            .collect();
        info!(positions = positions.len(), "Evaluating positions");

        let (tier, evals) = self.evaluate_positions(&positions).await;
        if evals.len() != positions.len() {
            return AnalysisOutcome::failed(format!(
                "expected {} evaluations, got {}",
                positions.len(),
                evals.len()
            ));
        }

        let moves: Vec<MoveRecord> = plies
            .iter()
            .zip(evals.windows(2))
            .map(|(ply, pair)| build_record(ply, &pair[0], &pair[1]))
            .collect();

        let depth = evals.iter().map(|e| e.depth).max().unwrap_or(0);
        let elapsed_ms = started.elapsed().as_millis() as u64;
        let report = GameReport::new(moves, tier, depth, elapsed_ms);
        info!(
            tier = ?tier,
            source = report.source.label(),
            moves = report.total_moves,
            accuracy = report.accuracy,
            elapsed_ms,
            "Analysis complete"
        );
        AnalysisOutcome::Completed(report)
    }

    async fn evaluate_positions(&self, positions: &[&str]) -> (AnalysisTier, Vec<Evaluation>) {
        if self.pool.is_available() {
            let evals = self.evaluate_with_pool(positions).await;
            if evals.iter().any(|e| e.source == EvalSource::Engine) {
                return (AnalysisTier::Pool, evals);
            }
            warn!("Engine pool produced no usable evaluations");
        }

        if self.config.cloud_fallback {
            return (AnalysisTier::Cloud, self.evaluate_with_cloud(positions).await);
        }

        info!("Falling back to material evaluation");
        let evals = positions.iter().map(|fen| Evaluation::heuristic(fen)).collect();
        (AnalysisTier::Heuristic, evals)
    }

    /// All positions at once; the pool bounds how many run.
    async fn evaluate_with_pool(&self, positions: &[&str]) -> Vec<Evaluation> {
        let outcomes = join_all(positions.iter().map(|fen| self.pool.evaluate(fen))).await;

        let degraded = outcomes.iter().filter(|o| o.is_degraded()).count();
        if degraded > 0 {
            warn!(degraded, positions = positions.len(), "Some positions fell back to material count");
        }
        outcomes.into_iter().map(|o| o.into_evaluation()).collect()
    }

    async fn evaluate_with_cloud(&self, positions: &[&str]) -> Vec<Evaluation> {
        let batch_size = self.config.cloud_batch_size.max(1);
        let delay = std::time::Duration::from_millis(self.config.cloud_batch_delay_ms);
        let mut evals = Vec::with_capacity(positions.len());

        for (batch_index, batch) in positions.chunks(batch_size).enumerate() {
            if batch_index > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let results = join_all(batch.iter().map(|&fen| async move {
                match self.cloud.lookup(fen, self.config.cloud_multi_pv).await {
                    Some(eval) => eval,
                    None => {
                        debug!(fen, "No cloud evaluation, using material count");
                        Evaluation::heuristic_white(fen)
                    }
                }
            }))
            .await;
            evals.extend(results);
        }

        let hits = evals.iter().filter(|e| e.source == EvalSource::Cloud).count();
        info!(hits, positions = positions.len(), "Cloud evaluation finished");
        evals
    }
}

fn build_record(ply: &Ply, before: &Evaluation, after: &Evaluation) -> MoveRecord {
    let view = MoverView::new(before, after, ply.color);

    let ctx = MoveContext {
        eval_before: view.before,
        eval_after: view.after,
        best_move: before.best_move.clone(),
        played_move: ply.uci.clone(),
        second_best_eval: view.second_best,
        is_mate_before: view.is_mate_before,
        is_mate_after: view.is_mate_after,
        mate_in_before: view.mate_in_before,
        mate_in_after: view.mate_in_after,
        move_number: ply.move_number,
        is_forced: ply.forced,
        fen_before: ply.fen_before.clone(),
        fen_after: ply.fen_after.clone(),
    };
    let classification = classification::classify(&ctx);

    let explanation = explanation::explain(&ExplainInput {
        fen_before: &ply.fen_before,
        fen_after: &ply.fen_after,
        san: &ply.san,
        uci: &ply.uci,
        classification,
        eval_before: view.before,
        eval_after: view.after,
        best_move: before.best_move.as_deref(),
    });

    MoveRecord {
        move_number: ply.move_number,
        color: ply.color,
        san: ply.san.clone(),
        uci: ply.uci.clone(),
        fen_before: ply.fen_before.clone(),
        fen_after: ply.fen_after.clone(),
        evaluation_before: before.centipawns(),
        evaluation_after: after.centipawns(),
        mover_eval_before: view.before,
        mover_eval_after: view.after,
        evaluation_loss: ctx.eval_loss(),
        best_move: before.best_move.clone(),
        second_best_move: before.second_best_move.clone(),
        second_best_eval: view.second_best,
        classification,
        explanation: explanation.simple,
        explanation_advanced: explanation.advanced,
        tactical_motifs: explanation.tactical_motifs,
        positional_factors: explanation.positional_factors,
        source: before.source,
        depth: before.depth,
    }
}
