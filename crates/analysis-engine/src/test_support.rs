//! Scripted engine and cloud cache used by unit tests in place of real services.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::cloud::CloudEvalSource;
use crate::error::EngineError;
use crate::evaluation::{EvalSource, Evaluation, Perspective, Score};
use crate::stockfish::{EngineAnalysis, PvLine, UciEngine};

type Script = dyn Fn(&str) -> Result<EngineAnalysis, EngineError> + Send + Sync;

#[derive(Default)]
pub struct EngineStats {
    calls: AtomicUsize,
    stops: AtomicUsize,
    restarts: AtomicUsize,
    quits: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl EngineStats {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
    pub fn restarts(&self) -> usize {
        self.restarts.load(Ordering::SeqCst)
    }
    pub fn quits(&self) -> usize {
        self.quits.load(Ordering::SeqCst)
    }
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

struct ActiveGuard(Arc<EngineStats>);

impl ActiveGuard {
    fn enter(stats: &Arc<EngineStats>) -> Self {
        let now = stats.active.fetch_add(1, Ordering::SeqCst) + 1;
        stats.max_active.fetch_max(now, Ordering::SeqCst);
        ActiveGuard(stats.clone())
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct ScriptedEngine {
    script: Arc<Script>,
    delay: Duration,
    stop_delay: Duration,
    die_on_error: bool,
    alive: bool,
    stats: Arc<EngineStats>,
}

impl ScriptedEngine {
    pub fn new(
        script: impl Fn(&str) -> Result<EngineAnalysis, EngineError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            script: Arc::new(script),
            delay: Duration::ZERO,
            stop_delay: Duration::ZERO,
            die_on_error: false,
            alive: true,
            stats: Arc::new(EngineStats::default()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Time taken to acknowledge `stop`
    pub fn with_stop_delay(mut self, delay: Duration) -> Self {
        self.stop_delay = delay;
        self
    }

    pub fn with_stats(mut self, stats: Arc<EngineStats>) -> Self {
        self.stats = stats;
        self
    }

    pub fn dies_on_error(mut self) -> Self {
        self.die_on_error = true;
        self
    }

    pub fn stats(&self) -> Arc<EngineStats> {
        self.stats.clone()
    }
}

impl UciEngine for ScriptedEngine {
    async fn analyse(
        &mut self,
        fen: &str,
        _depth: u32,
        _multi_pv: u32,
    ) -> Result<EngineAnalysis, EngineError> {
        self.stats.calls.fetch_add(1, Ordering::SeqCst);
        let _active = ActiveGuard::enter(&self.stats);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let result = (self.script)(fen);
        if result.is_err() && self.die_on_error {
            self.alive = false;
        }
        result
    }

    async fn stop_search(&mut self) -> Result<(), EngineError> {
        self.stats.stops.fetch_add(1, Ordering::SeqCst);
        if !self.stop_delay.is_zero() {
            tokio::time::sleep(self.stop_delay).await;
        }
        Ok(())
    }

    fn is_alive(&mut self) -> bool {
        self.alive
    }

    async fn restart(&mut self) -> Result<(), EngineError> {
        self.stats.restarts.fetch_add(1, Ordering::SeqCst);
        self.alive = true;
        Ok(())
    }

    async fn quit(&mut self) {
        self.stats.quits.fetch_add(1, Ordering::SeqCst);
        self.alive = false;
    }
}

pub fn cp_line(cp: i32, mv: &str) -> PvLine {
    PvLine {
        pv: vec![mv.to_string()],
        cp: Some(cp),
        mate: None,
        depth: 0,
    }
}

pub fn mate_line(mate: i32, mv: &str) -> PvLine {
    PvLine {
        pv: vec![mv.to_string()],
        cp: None,
        mate: Some(mate),
        depth: 0,
    }
}

/// Engine that answers every position with the same single line
pub fn constant_engine(cp: i32, mv: &'static str) -> ScriptedEngine {
    ScriptedEngine::new(move |_| {
        Ok(EngineAnalysis {
            lines: vec![cp_line(cp, mv)],
            best_move: Some(mv.to_string()),
        })
    })
}

type CloudScript = dyn Fn(&str) -> Option<Evaluation> + Send + Sync;

/// Cloud cache answering from a closure
pub struct FakeCloud {
    script: Box<CloudScript>,
    delay: Duration,
    stats: Arc<EngineStats>,
}

impl FakeCloud {
    pub fn new(script: impl Fn(&str) -> Option<Evaluation> + Send + Sync + 'static) -> Self {
        Self {
            script: Box::new(script),
            delay: Duration::ZERO,
            stats: Arc::new(EngineStats::default()),
        }
    }

    /// Every lookup is a miss
    pub fn empty() -> Self {
        Self::new(|_| None)
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn stats(&self) -> Arc<EngineStats> {
        self.stats.clone()
    }
}

impl CloudEvalSource for FakeCloud {
    async fn lookup(&self, fen: &str, _multi_pv: u32) -> Option<Evaluation> {
        self.stats.calls.fetch_add(1, Ordering::SeqCst);
        let _active = ActiveGuard::enter(&self.stats);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        (self.script)(fen)
    }
}

/// White-relative cloud answer
pub fn cloud_eval(cp: i32, best_move: &str) -> Evaluation {
    Evaluation {
        score: Score::Cp(cp),
        best_move: Some(best_move.to_string()),
        second_best_move: None,
        second_best: None,
        source: EvalSource::Cloud,
        depth: 30,
        perspective: Perspective::White,
    }
}
