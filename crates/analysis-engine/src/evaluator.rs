//! Drives one engine handle through one position analysis

use std::str::FromStr;
use std::time::Duration;

use chess::Board;
use tokio::time::timeout;
use tracing::{debug, error, warn};

use crate::config::EngineConfig;
use crate::evaluation::{EvalSource, Evaluation, Perspective, Score};
use crate::stockfish::{EngineAnalysis, PvLine, UciEngine};

/// Time allowed for an engine to acknowledge `stop` after a timeout
const STOP_GRACE: Duration = Duration::from_secs(2);

/// Search settings applied to every position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvalParams {
    pub depth: u32,
    pub multi_pv: u32,
    pub timeout: Duration,
}

impl EvalParams {
    pub fn new(depth: u32, multi_pv: u32) -> Self {
        Self {
            depth,
            multi_pv: multi_pv.max(1),
            timeout: Duration::from_secs(30),
        }
    }
}

impl From<&EngineConfig> for EvalParams {
    fn from(config: &EngineConfig) -> Self {
        Self {
            depth: config.depth,
            multi_pv: config.multi_pv.max(1),
            timeout: Duration::from_secs(config.eval_timeout_secs),
        }
    }
}

/// Why an evaluation fell back to material counting
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DegradeReason {
    NoEngine,
    Timeout,
    Protocol(String),
    NoScore,
    InvalidPosition,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EvalOutcome {
    Evaluated(Evaluation),
    Degraded {
        evaluation: Evaluation,
        reason: DegradeReason,
    },
}

impl EvalOutcome {
    pub fn evaluation(&self) -> &Evaluation {
        match self {
            EvalOutcome::Evaluated(evaluation) | EvalOutcome::Degraded { evaluation, .. } => {
                evaluation
            }
        }
    }

    pub fn into_evaluation(self) -> Evaluation {
        match self {
            EvalOutcome::Evaluated(evaluation) | EvalOutcome::Degraded { evaluation, .. } => {
                evaluation
            }
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, EvalOutcome::Degraded { .. })
    }

    fn degraded(fen: &str, reason: DegradeReason) -> Self {
        EvalOutcome::Degraded {
            evaluation: Evaluation::heuristic(fen),
            reason,
        }
    }
}

/// Evaluate one position. Never fails: every problem degrades to the
/// side-to-move material heuristic.
pub async fn evaluate<E: UciEngine>(
    engine: Option<&mut E>,
    fen: &str,
    params: EvalParams,
) -> EvalOutcome {
    let Some(engine) = engine else {
        return EvalOutcome::degraded(fen, DegradeReason::NoEngine);
    };

    if Board::from_str(fen).is_err() {
        warn!(fen, "Refusing to analyse invalid position");
        return EvalOutcome::degraded(fen, DegradeReason::InvalidPosition);
    }

    let result = timeout(
        params.timeout,
        engine.analyse(fen, params.depth, params.multi_pv),
    )
    .await;

    let mut force_restart = false;
    let outcome = match result {
        Ok(Ok(analysis)) => match to_evaluation(analysis, params.depth) {
            Some(evaluation) => return EvalOutcome::Evaluated(evaluation),
            None => {
                warn!(fen, "Engine returned no score");
                EvalOutcome::degraded(fen, DegradeReason::NoScore)
            }
        },
        Ok(Err(e)) => {
            warn!(fen, error = %e, "Engine analysis failed");
            EvalOutcome::degraded(fen, DegradeReason::Protocol(e.to_string()))
        }
        Err(_) => {
            warn!(fen, secs = params.timeout.as_secs(), "Engine analysis timed out");
            match timeout(STOP_GRACE, engine.stop_search()).await {
                Ok(Ok(())) => debug!("Engine stopped after timeout"),
                _ => {
                    // Unread search output would be taken for the next position's
                    warn!("Engine did not acknowledge stop; restarting it");
                    force_restart = true;
                }
            }
            EvalOutcome::degraded(fen, DegradeReason::Timeout)
        }
    };

    recover(engine, force_restart).await;
    outcome
}

/// Restart a process that died during a failed call, or whose output can no
/// longer be trusted.
async fn recover<E: UciEngine>(engine: &mut E, force: bool) {
    if !force && engine.is_alive() {
        return;
    }
    if let Err(e) = engine.restart().await {
        error!(error = %e, "Failed to restart engine; later calls will degrade");
    }
}

fn line_score(line: &PvLine) -> Option<Score> {
    match (line.mate, line.cp) {
        (Some(m), _) => Some(Score::Mate(m)),
        (None, Some(cp)) => Some(Score::Cp(cp)),
        (None, None) => None,
    }
}

fn to_evaluation(analysis: EngineAnalysis, requested_depth: u32) -> Option<Evaluation> {
    let mut lines = analysis.lines.into_iter();
    let first = lines.next()?;
    let score = line_score(&first)?;

    let best_move = first
        .pv
        .first()
        .cloned()
        .or(analysis.best_move);

    let (second_best, second_best_move) = match lines.next() {
        Some(second) => match line_score(&second) {
            Some(s) => (Some(s), second.pv.first().cloned()),
            None => (None, None),
        },
        None => (None, None),
    };

    Some(Evaluation {
        score,
        best_move,
        second_best_move,
        second_best,
        source: EvalSource::Engine,
        depth: if first.depth > 0 { first.depth } else { requested_depth },
        perspective: Perspective::SideToMove,
    })
}
