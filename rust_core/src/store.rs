//! Persistence collaborators: running point totals and per-shot audit records.
//!
//! Writes are best-effort. The session applies deltas in memory first; these
//! stores only make them durable.

use crate::error::StoreError;
use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

#[async_trait]
pub trait PointsStore: Send + Sync {
    /// Add `delta` to the slot's running total and return the new total
    async fn increment(&self, session_id: &str, slot: u8, delta: i64) -> Result<i64, StoreError>;

    async fn get(&self, session_id: &str, slot: u8) -> Result<i64, StoreError>;
}

/// One participant's view of one resolved shot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShotRecord {
    #[serde(rename = "playerUserId")]
    pub participant_id: String,
    pub game_id: String,
    #[serde(rename = "gameSessionId")]
    pub session_id: Option<String>,
    pub made: bool,
    pub points: i64,
    pub shot_type_actual: Option<String>,
    pub shot_type_predicted: Option<String>,
    pub matched_gesture: Option<bool>,
    pub period: Option<String>,
    pub clock: Option<String>,
}

#[async_trait]
pub trait ShotRecordStore: Send + Sync {
    /// Returns how many records were stored
    async fn record_shots(&self, records: &[ShotRecord]) -> Result<usize, StoreError>;
}

// ============================================================================
// In-memory implementations
// ============================================================================

#[derive(Debug, Default)]
pub struct InMemoryPointsStore {
    totals: Mutex<HashMap<(String, u8), i64>>,
}

impl InMemoryPointsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PointsStore for InMemoryPointsStore {
    async fn increment(&self, session_id: &str, slot: u8, delta: i64) -> Result<i64, StoreError> {
        let mut totals = self.totals.lock();
        let total = totals.entry((session_id.to_string(), slot)).or_insert(0);
        *total += delta;
        Ok(*total)
    }

    async fn get(&self, session_id: &str, slot: u8) -> Result<i64, StoreError> {
        Ok(self
            .totals
            .lock()
            .get(&(session_id.to_string(), slot))
            .copied()
            .unwrap_or(0))
    }
}

#[derive(Debug, Default)]
pub struct InMemoryShotRecordStore {
    records: Mutex<Vec<ShotRecord>>,
}

impl InMemoryShotRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<ShotRecord> {
        self.records.lock().clone()
    }
}

#[async_trait]
impl ShotRecordStore for InMemoryShotRecordStore {
    async fn record_shots(&self, records: &[ShotRecord]) -> Result<usize, StoreError> {
        self.records.lock().extend_from_slice(records);
        Ok(records.len())
    }
}

// ============================================================================
// HTTP implementations
// ============================================================================

fn http_client() -> Client {
    Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap_or_else(|_| Client::new())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct IncrementRequest<'a> {
    game_session_id: &'a str,
    slot: u8,
    delta: i64,
}

#[derive(Debug, Deserialize)]
struct PointsResponse {
    #[serde(default)]
    points: i64,
}

/// Document-store backed totals at `{base}/api/session-points`
#[derive(Debug, Clone)]
pub struct HttpPointsStore {
    client: Client,
    base_url: String,
}

impl HttpPointsStore {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: http_client(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self) -> String {
        format!("{}/api/session-points", self.base_url)
    }
}

async fn rejected(resp: reqwest::Response) -> StoreError {
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    StoreError::Rejected { status, body }
}

#[async_trait]
impl PointsStore for HttpPointsStore {
    async fn increment(&self, session_id: &str, slot: u8, delta: i64) -> Result<i64, StoreError> {
        let resp = self
            .client
            .post(self.url())
            .json(&IncrementRequest {
                game_session_id: session_id,
                slot,
                delta,
            })
            .send()
            .await?;

        match resp.status() {
            s if s.is_success() => {
                let body: PointsResponse = resp.json().await?;
                debug!("Slot {} total now {}", slot, body.points);
                Ok(body.points)
            }
            StatusCode::NOT_FOUND => Err(StoreError::MissingAssignment {
                session_id: session_id.to_string(),
                slot,
            }),
            _ => Err(rejected(resp).await),
        }
    }

    async fn get(&self, session_id: &str, slot: u8) -> Result<i64, StoreError> {
        let slot_param = slot.to_string();
        let resp = self
            .client
            .get(self.url())
            .query(&[("gameSessionId", session_id), ("slot", slot_param.as_str())])
            .send()
            .await?;

        match resp.status() {
            s if s.is_success() => Ok(resp.json::<PointsResponse>().await?.points),
            StatusCode::NOT_FOUND => Err(StoreError::MissingAssignment {
                session_id: session_id.to_string(),
                slot,
            }),
            _ => Err(rejected(resp).await),
        }
    }
}

#[derive(Debug, Serialize)]
struct ShotBatch<'a> {
    shots: &'a [ShotRecord],
}

#[derive(Debug, Deserialize)]
struct ShotBatchResponse {
    #[serde(default)]
    count: usize,
}

/// Shot audit trail at `{base}/api/shots`
#[derive(Debug, Clone)]
pub struct HttpShotRecordStore {
    client: Client,
    base_url: String,
}

impl HttpShotRecordStore {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: http_client(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ShotRecordStore for HttpShotRecordStore {
    async fn record_shots(&self, records: &[ShotRecord]) -> Result<usize, StoreError> {
        if records.is_empty() {
            return Ok(0);
        }
        let resp = self
            .client
            .post(format!("{}/api/shots", self.base_url))
            .json(&ShotBatch { shots: records })
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(rejected(resp).await);
        }
        Ok(resp.json::<ShotBatchResponse>().await?.count)
    }
}
