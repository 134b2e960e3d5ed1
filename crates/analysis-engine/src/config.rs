//! Engine configuration from environment variables

use std::env;
use std::path::Path;

use tracing::{info, warn};

/// Install locations checked when `STOCKFISH_PATH` is not set
const COMMON_STOCKFISH_PATHS: &[&str] = &[
    "/usr/games/stockfish",
    "/usr/bin/stockfish",
    "/usr/local/bin/stockfish",
    "/opt/homebrew/bin/stockfish",
    "C:\\Program Files\\Stockfish\\stockfish.exe",
    "C:\\stockfish\\stockfish.exe",
];

pub const DEFAULT_CLOUD_EVAL_URL: &str = "https://lichess.org/api/cloud-eval";

#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Path to the Stockfish binary (None when none was found)
    pub stockfish_path: Option<String>,

    /// Number of engine processes kept in the pool
    pub pool_size: usize,

    /// Fixed search depth per position
    pub depth: u32,

    /// Principal variations requested per position
    pub multi_pv: u32,

    /// Engine hash table size in MB
    pub hash_mb: u32,

    /// Upper bound on a single position analysis
    pub eval_timeout_secs: u64,

    /// Try the cloud cache when the pool cannot serve a game
    pub cloud_fallback: bool,

    pub cloud_eval_url: String,
    pub cloud_multi_pv: u32,

    /// Lookups issued concurrently per batch
    pub cloud_batch_size: usize,

    /// Pause between batches, to stay under the remote rate limit
    pub cloud_batch_delay_ms: u64,

    pub cloud_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stockfish_path: None,
            pool_size: default_pool_size(),
            depth: 18,
            multi_pv: 2,
            hash_mb: 64,
            eval_timeout_secs: 30,
            cloud_fallback: true,
            cloud_eval_url: DEFAULT_CLOUD_EVAL_URL.to_string(),
            cloud_multi_pv: 1,
            cloud_batch_size: 5,
            cloud_batch_delay_ms: 100,
            cloud_timeout_secs: 10,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let stockfish_path = env::var("STOCKFISH_PATH")
            .ok()
            .filter(|p| !p.trim().is_empty())
            .or_else(discover_stockfish);

        match &stockfish_path {
            Some(path) => info!(stockfish_path = %path, "Using Stockfish binary"),
            None => warn!("No Stockfish binary found; analysis will use fallbacks"),
        }

        let cloud_fallback = env::var("CLOUD_FALLBACK")
            .ok()
            .map(|v| !matches!(v.trim().to_ascii_lowercase().as_str(), "0" | "false" | "no" | "off"))
            .unwrap_or(defaults.cloud_fallback);

        Self {
            stockfish_path,
            pool_size: env_or("STOCKFISH_POOL_SIZE", defaults.pool_size),
            depth: env_or("STOCKFISH_DEPTH", defaults.depth),
            multi_pv: env_or("STOCKFISH_MULTI_PV", defaults.multi_pv).max(1),
            hash_mb: env_or("STOCKFISH_HASH_MB", defaults.hash_mb),
            eval_timeout_secs: env_or("EVAL_TIMEOUT_SECS", defaults.eval_timeout_secs),
            cloud_fallback,
            cloud_eval_url: env::var("CLOUD_EVAL_URL").unwrap_or(defaults.cloud_eval_url),
            cloud_multi_pv: env_or("CLOUD_MULTI_PV", defaults.cloud_multi_pv).max(1),
            cloud_batch_size: env_or("CLOUD_BATCH_SIZE", defaults.cloud_batch_size).max(1),
            cloud_batch_delay_ms: env_or("CLOUD_BATCH_DELAY_MS", defaults.cloud_batch_delay_ms),
            cloud_timeout_secs: env_or("CLOUD_TIMEOUT_SECS", defaults.cloud_timeout_secs),
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// One process per core, capped at four.
fn default_pool_size() -> usize {
    num_cpus::get().clamp(1, 4)
}

/// Look for Stockfish in common install locations, then on `PATH`.
pub fn discover_stockfish() -> Option<String> {
    if let Some(found) = COMMON_STOCKFISH_PATHS
        .iter()
        .find(|p| Path::new(p).is_file())
    {
        return Some(found.to_string());
    }

    let exe = if cfg!(windows) { "stockfish.exe" } else { "stockfish" };
    env::var_os("PATH").and_then(|paths| {
        env::split_paths(&paths)
            .map(|dir| dir.join(exe))
            .find(|candidate| candidate.is_file())
            .map(|candidate| candidate.to_string_lossy().into_owned())
    })
}
