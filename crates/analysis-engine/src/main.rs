//! Game analysis CLI
//!
//! Reads a PGN file, analyses every move with the local Stockfish pool (or the
//! Lichess cloud cache when no engine is available) and prints the report as JSON.

use std::str::FromStr;

use analysis_engine::{AnalysisOutcome, EngineConfig, EnginePool, GameAnalyzer, LichessCloudClient};
use anyhow::{bail, Context};
use tracing::{error, info};

const USAGE: &str = "usage: analyze-game <file.pgn> [--depth N] [--pool-size N] [--no-cloud]";

#[derive(Debug, PartialEq)]
struct CliArgs {
    pgn_path: String,
    depth: Option<u32>,
    pool_size: Option<usize>,
    no_cloud: bool,
}

fn parse_number<T: FromStr>(value: Option<&String>, flag: &str) -> anyhow::Result<T> {
    value
        .and_then(|v| v.trim().parse().ok())
        .with_context(|| format!("{flag} expects a number\n{USAGE}"))
}

fn parse_args(args: &[String]) -> anyhow::Result<CliArgs> {
    let mut pgn_path = None;
    let mut depth = None;
    let mut pool_size = None;
    let mut no_cloud = false;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--depth" => depth = Some(parse_number(iter.next(), "--depth")?),
            "--pool-size" => pool_size = Some(parse_number(iter.next(), "--pool-size")?),
            "--no-cloud" => no_cloud = true,
            flag if flag.starts_with("--") => bail!("unknown flag {flag}\n{USAGE}"),
            path => pgn_path = Some(path.to_string()),
        }
    }

    let Some(pgn_path) = pgn_path else {
        bail!(USAGE);
    };
    Ok(CliArgs {
        pgn_path,
        depth,
        pool_size,
        no_cloud,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    // Load .env file for local dev
    let _ = dotenvy::dotenv();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let cli = parse_args(&args)?;

    let mut config = EngineConfig::from_env();
    if let Some(depth) = cli.depth {
        config.depth = depth;
    }
    if let Some(pool_size) = cli.pool_size {
        config.pool_size = pool_size;
    }
    if cli.no_cloud {
        config.cloud_fallback = false;
    }
    info!(
        stockfish_path = ?config.stockfish_path,
        depth = config.depth,
        pool_size = config.pool_size,
        cloud_fallback = config.cloud_fallback,
        "Config loaded"
    );

    let pgn = std::fs::read_to_string(&cli.pgn_path)
        .with_context(|| format!("Failed to read {}", cli.pgn_path))?;

    let pool = EnginePool::start(&config).await;
    let cloud = LichessCloudClient::new(&config)?;
    let analyzer = GameAnalyzer::new(&pool, &cloud, &config);

    let outcome = analyzer.analyze_pgn(&pgn).await;
    pool.shutdown().await;

    match outcome {
        AnalysisOutcome::Completed(report) => {
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        AnalysisOutcome::Failed { reason } => {
            error!(%reason, "Analysis failed");
            bail!("analysis failed: {reason}")
        }
    }
}
