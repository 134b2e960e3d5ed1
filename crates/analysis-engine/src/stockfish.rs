//! Stockfish engine wrapper using UCI protocol (async I/O)

use std::future::Future;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, warn};

use crate::error::EngineError;

/// Most PV lines requested from one search
pub const MAX_MULTI_PV: u32 = 5;

/// A single PV line from multi-PV analysis
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PvLine {
    /// Principal variation moves
    pub pv: Vec<String>,
    /// Centipawn score (side to move)
    pub cp: Option<i32>,
    /// Mate in N (side to move)
    pub mate: Option<i32>,
    /// Depth of the last info line seen for this PV
    pub depth: u32,
}

/// Everything a single `go` produced
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineAnalysis {
    /// PV lines, index 0 = best
    pub lines: Vec<PvLine>,
    /// Move from the `bestmove` line (None for `(none)`)
    pub best_move: Option<String>,
}

/// The operations the pool and evaluator need from an engine process.
pub trait UciEngine: Send + 'static {
    /// Search `fen` to a fixed depth, returning up to `multi_pv` lines.
    fn analyse(
        &mut self,
        fen: &str,
        depth: u32,
        multi_pv: u32,
    ) -> impl Future<Output = Result<EngineAnalysis, EngineError>> + Send;

    /// Abort a running search and consume its output.
    fn stop_search(&mut self) -> impl Future<Output = Result<(), EngineError>> + Send;

    fn is_alive(&mut self) -> bool;

    /// Replace a dead process with a fresh one.
    fn restart(&mut self) -> impl Future<Output = Result<(), EngineError>> + Send;

    fn quit(&mut self) -> impl Future<Output = ()> + Send;
}

/// Stockfish engine instance
pub struct StockfishEngine {
    path: String,
    hash_mb: u32,
    process: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    multi_pv: u32,
}

impl StockfishEngine {
    /// Spawn a new Stockfish process and initialize UCI
    pub async fn new(path: &str, hash_mb: u32) -> Result<Self, EngineError> {
        let mut process = Command::new(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| EngineError::Spawn {
                path: path.to_string(),
                source,
            })?;

        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| EngineError::Protocol("stdin not captured".into()))?;
        let stdout = process
            .stdout
            .take()
            .ok_or_else(|| EngineError::Protocol("stdout not captured".into()))?;

        let mut engine = Self {
            path: path.to_string(),
            hash_mb,
            process,
            stdin,
            stdout: BufReader::new(stdout),
            multi_pv: 1,
        };

        engine.send("uci").await?;
        engine.wait_for("uciok").await?;

        engine.send("setoption name Threads value 1").await?;
        engine
            .send(&format!("setoption name Hash value {hash_mb}"))
            .await?;
        engine.send("setoption name UCI_AnalyseMode value true").await?;
        engine.send("isready").await?;
        engine.wait_for("readyok").await?;

        Ok(engine)
    }

    /// Send a command to Stockfish
    async fn send(&mut self, cmd: &str) -> Result<(), EngineError> {
        debug!(cmd, "SF <");
        self.stdin.write_all(format!("{cmd}\n").as_bytes()).await?;
        self.stdin.flush().await?;
        Ok(())
    }

    /// Read one trimmed line; a closed pipe is a protocol error
    async fn read_line(&mut self, buf: &mut String) -> Result<(), EngineError> {
        buf.clear();
        let n = self.stdout.read_line(buf).await?;
        if n == 0 {
            return Err(EngineError::Protocol("engine closed its output".into()));
        }
        let trimmed_len = buf.trim_end().len();
        buf.truncate(trimmed_len);
        debug!(line = buf.as_str(), "SF >");
        Ok(())
    }

    /// Wait for a specific response line
    async fn wait_for(&mut self, expected: &str) -> Result<(), EngineError> {
        let mut line = String::new();
        loop {
            self.read_line(&mut line).await?;
            if line.trim() == expected {
                return Ok(());
            }
        }
    }
}

impl UciEngine for StockfishEngine {
    async fn analyse(
        &mut self,
        fen: &str,
        depth: u32,
        multi_pv: u32,
    ) -> Result<EngineAnalysis, EngineError> {
        let multi_pv = pv_line_count(multi_pv);
        if multi_pv != self.multi_pv {
            self.send(&format!("setoption name MultiPV value {multi_pv}"))
                .await?;
            self.multi_pv = multi_pv;
        }
        self.send(&format!("position fen {fen}")).await?;
        self.send(&format!("go depth {depth}")).await?;

        let mut lines = vec![PvLine::default(); multi_pv as usize];
        let mut line = String::new();

        loop {
            self.read_line(&mut line).await?;
            let trimmed = line.trim();

            if trimmed.starts_with("info") && trimmed.contains(" score ") {
                // Parse multipv index (1-based)
                let pv_idx = parse_multipv_index(trimmed).unwrap_or(1).max(1) - 1;
                if let Some(entry) = lines.get_mut(pv_idx as usize) {
                    entry.cp = parse_cp(trimmed);
                    entry.mate = parse_mate(trimmed);
                    entry.pv = parse_pv(trimmed);
                    entry.depth = parse_depth(trimmed).unwrap_or(entry.depth);
                }
            } else if let Some(rest) = trimmed.strip_prefix("bestmove") {
                let best_move = rest
                    .split_whitespace()
                    .next()
                    .filter(|m| *m != "(none)")
                    .map(str::to_string);
                return Ok(EngineAnalysis { lines, best_move });
            }
        }
    }

    async fn stop_search(&mut self) -> Result<(), EngineError> {
        self.send("stop").await?;
        let mut line = String::new();
        loop {
            self.read_line(&mut line).await?;
            if line.starts_with("bestmove") {
                return Ok(());
            }
        }
    }

    fn is_alive(&mut self) -> bool {
        matches!(self.process.try_wait(), Ok(None))
    }

    async fn restart(&mut self) -> Result<(), EngineError> {
        warn!(path = %self.path, "Restarting Stockfish process");
        let fresh = StockfishEngine::new(&self.path, self.hash_mb).await?;
        // Old process is killed when it drops
        *self = fresh;
        Ok(())
    }

    /// Send quit command and wait for process to exit
    async fn quit(&mut self) {
        let _ = self.send("quit").await;
        if tokio::time::timeout(Duration::from_secs(2), self.process.wait())
            .await
            .is_err()
        {
            let _ = self.process.start_kill();
        }
    }
}

impl Drop for StockfishEngine {
    fn drop(&mut self) {
        let _ = self.process.start_kill();
    }
}

fn pv_line_count(requested: u32) -> u32 {
    requested.clamp(1, MAX_MULTI_PV)
}

/// Value following `key` on a UCI info line
fn token_after<T: std::str::FromStr>(line: &str, key: &str) -> Option<T> {
    let mut parts = line.split_whitespace();
    while let Some(part) = parts.next() {
        if part == key {
            return parts.next()?.parse().ok();
        }
        // Everything after `pv` is moves
        if part == "pv" {
            return None;
        }
    }
    None
}

/// Parse centipawn score from info line
fn parse_cp(line: &str) -> Option<i32> {
    token_after(line, "cp")
}

/// Parse mate score from info line
fn parse_mate(line: &str) -> Option<i32> {
    token_after(line, "mate")
}

/// Parse multipv index from info line
fn parse_multipv_index(line: &str) -> Option<u32> {
    token_after(line, "multipv")
}

fn parse_depth(line: &str) -> Option<u32> {
    token_after(line, "depth")
}

/// Parse PV moves from info line
fn parse_pv(line: &str) -> Vec<String> {
    line.split_whitespace()
        .skip_while(|part| *part != "pv")
        .skip(1)
        .take_while(|part| !part.starts_with("bmc") && *part != "string")
        .map(str::to_string)
        .collect()
}
