use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use analysis_engine::{EngineAnalysis, EngineError, PvLine, UciEngine};

/// Counters shared between a test and its fakes.
#[derive(Default)]
pub struct Calls {
    total: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl Calls {
    pub fn enter(&self) {
        self.total.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
    }

    pub fn leave(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn total(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }

    #[allow(dead_code)]
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

/// One scripted engine answer: side-to-move centipawns and move lines.
#[derive(Clone)]
pub struct Answer {
    pub cp: i32,
    pub best: &'static str,
    pub second: Option<(i32, &'static str)>,
}

pub fn answer(cp: i32, best: &'static str) -> Answer {
    Answer {
        cp,
        best,
        second: None,
    }
}

impl Answer {
    #[allow(dead_code)]
    pub fn with_second(mut self, cp: i32, mv: &'static str) -> Self {
        self.second = Some((cp, mv));
        self
    }

    fn to_analysis(&self) -> EngineAnalysis {
        let line = |cp: i32, mv: &str| PvLine {
            pv: vec![mv.to_string()],
            cp: Some(cp),
            mate: None,
            depth: 20,
        };
        let mut lines = vec![line(self.cp, self.best)];
        if let Some((cp, mv)) = self.second {
            lines.push(line(cp, mv));
        }
        EngineAnalysis {
            lines,
            best_move: Some(self.best.to_string()),
        }
    }
}

/// Engine answering from a FEN table; unknown positions get `fallback`,
/// or a protocol error when there is none.
pub struct FakeEngine {
    answers: Arc<HashMap<String, Answer>>,
    fallback: Option<Answer>,
    delay: Duration,
    calls: Arc<Calls>,
}

impl FakeEngine {
    pub fn new(answers: HashMap<String, Answer>, fallback: Option<Answer>) -> Self {
        Self {
            answers: Arc::new(answers),
            fallback,
            delay: Duration::ZERO,
            calls: Arc::new(Calls::default()),
        }
    }

    pub fn constant(cp: i32, best: &'static str) -> Self {
        Self::new(HashMap::new(), Some(answer(cp, best)))
    }

    #[allow(dead_code)]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    #[allow(dead_code)]
    pub fn with_calls(mut self, calls: Arc<Calls>) -> Self {
        self.calls = calls;
        self
    }
}

impl UciEngine for FakeEngine {
    async fn analyse(
        &mut self,
        fen: &str,
        _depth: u32,
        _multi_pv: u32,
    ) -> Result<EngineAnalysis, EngineError> {
        self.calls.enter();
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let result = self
            .answers
            .get(fen)
            .or(self.fallback.as_ref())
            .map(Answer::to_analysis)
            .ok_or_else(|| EngineError::Protocol(format!("no answer for {fen}")));
        self.calls.leave();
        result
    }

    async fn stop_search(&mut self) -> Result<(), EngineError> {
        Ok(())
    }

    fn is_alive(&mut self) -> bool {
        true
    }

    async fn restart(&mut self) -> Result<(), EngineError> {
        Ok(())
    }

    async fn quit(&mut self) {}
}
