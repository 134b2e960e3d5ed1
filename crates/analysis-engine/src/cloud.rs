//! Lichess cloud-eval lookups, used when no engine is available

use std::future::Future;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::evaluation::{EvalSource, Evaluation, Perspective, Score, MATE_SCORE};

const LOOKUP_ATTEMPTS: u32 = 2;
const RETRY_BACKOFF: Duration = Duration::from_millis(500);
/// The remote cache serves at most this many PVs
const MAX_CLOUD_PVS: u32 = 5;

/// A remote store of cached evaluations. `None` means "not cached", which
/// also covers every kind of failure.
pub trait CloudEvalSource: Sync {
    fn lookup(&self, fen: &str, multi_pv: u32) -> impl Future<Output = Option<Evaluation>> + Send;
}

#[derive(Debug, Deserialize)]
struct CloudEvalResponse {
    #[serde(default)]
    depth: u32,
    #[serde(default)]
    pvs: Vec<CloudPv>,
}

#[derive(Debug, Deserialize)]
struct CloudPv {
    #[serde(default)]
    moves: String,
    cp: Option<i32>,
    mate: Option<i32>,
}

impl CloudPv {
    /// White-relative score; mates are flattened to +/-10000
    fn score(&self) -> Option<Score> {
        match (self.mate, self.cp) {
            (Some(m), _) => Some(Score::Cp(if m > 0 { MATE_SCORE } else { -MATE_SCORE })),
            (None, Some(cp)) => Some(Score::Cp(cp)),
            (None, None) => None,
        }
    }

    fn first_move(&self) -> Option<String> {
        self.moves.split_whitespace().next().map(str::to_string)
    }
}

pub struct LichessCloudClient {
    client: Client,
    url: String,
}

impl LichessCloudClient {
    pub fn new(config: &EngineConfig) -> Result<Self, EngineError> {
        let client = Client::builder()
            .user_agent("ChessCoach/1.0")
            .timeout(Duration::from_secs(config.cloud_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            url: config.cloud_eval_url.clone(),
        })
    }

    /// One request. `Ok(None)` is a definite "not cached".
    async fn fetch(&self, fen: &str, multi_pv: u32) -> Result<Option<CloudEvalResponse>, EngineError> {
        let multi_pv = multi_pv.clamp(1, MAX_CLOUD_PVS).to_string();
        let resp = self
            .client
            .get(&self.url)
            .query(&[("fen", fen), ("multiPv", multi_pv.as_str())])
            .header("Accept", "application/json")
            .send()
            .await?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if resp.status() == StatusCode::TOO_MANY_REQUESTS || resp.status().is_server_error() {
            return Err(EngineError::Protocol(format!("HTTP {}", resp.status())));
        }
        if !resp.status().is_success() {
            debug!(status = %resp.status(), "Cloud eval rejected request");
            return Ok(None);
        }

        let body = resp.text().await?;
        Ok(Some(serde_json::from_str(&body)?))
    }
}

impl CloudEvalSource for LichessCloudClient {
    async fn lookup(&self, fen: &str, multi_pv: u32) -> Option<Evaluation> {
        for attempt in 1..=LOOKUP_ATTEMPTS {
            match self.fetch(fen, multi_pv).await {
                Ok(Some(response)) => return evaluation_from_response(response),
                Ok(None) => return None,
                Err(e) if attempt < LOOKUP_ATTEMPTS => {
                    debug!(fen, attempt, error = %e, "Cloud eval failed, retrying");
                    tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                }
                Err(e) => {
                    warn!(fen, error = %e, "Cloud eval failed");
                }
            }
        }
        None
    }
}

fn evaluation_from_response(response: CloudEvalResponse) -> Option<Evaluation> {
    let mut pvs = response.pvs.into_iter();
    let first = pvs.next()?;
    let score = first.score()?;

    let second = pvs.next();
    let second_best = second.as_ref().and_then(CloudPv::score);
    let second_best_move = second
        .as_ref()
        .filter(|_| second_best.is_some())
        .and_then(CloudPv::first_move);

    Some(Evaluation {
        score,
        best_move: first.first_move(),
        second_best_move,
        second_best,
        source: EvalSource::Cloud,
        depth: response.depth,
        perspective: Perspective::White,
    })
}
