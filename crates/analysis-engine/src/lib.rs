pub use chess;

pub mod analyzer;
pub mod board_utils;
pub mod classification;
pub mod cloud;
pub mod config;
pub mod error;
pub mod evaluation;
pub mod evaluator;
pub mod explanation;
pub mod pool;
pub mod report;
pub mod stockfish;

#[cfg(test)]
mod test_support;

pub use analyzer::{AnalysisOutcome, GameAnalyzer};
pub use classification::{classify, Classification, MoveContext};
pub use cloud::{CloudEvalSource, LichessCloudClient};
pub use config::EngineConfig;
pub use error::{EngineError, PoolError};
pub use evaluation::{EvalSource, Evaluation, Perspective, Score};
pub use evaluator::{evaluate, DegradeReason, EvalOutcome, EvalParams};
pub use explanation::{explain, ExplainInput, Explanation};
pub use pool::{EnginePool, PooledEngine};
pub use report::{AnalysisTier, ClassificationCounts, GameReport, MoveRecord};
pub use stockfish::{EngineAnalysis, PvLine, StockfishEngine, UciEngine};
