//! # Job Queue Adapter
//!
//! Thin seam over the external durable task queue. The scheduler's only
//! responsibilities here are constructing a collision-resistant,
//! trigger-unique job key and treating the queue's dedup response as a
//! success. Metrics are layered on by explicit composition, not by
//! subclassing the adapter.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use metrics::{counter, histogram};
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};
use std::time::{Duration, Instant};
use url::Url;
use uuid::Uuid;

use crate::config::QueueConfig;
use crate::error::SchedulerError;

/// One job to hand to the worker runtime.
#[derive(Debug, Clone, Serialize)]
pub struct EnqueueJob {
    /// Idempotency key; the queue deduplicates on this
    pub job_key: String,
    /// Run ledger row doubling as the job correlation ID
    pub run_id: Uuid,
    pub schedule_id: Uuid,
    /// Target graph and its opaque input payload
    pub graph_id: String,
    pub input: JsonValue,
    /// Grant the worker presents to execute as the schedule's owner
    pub execution_grant_id: Uuid,
    /// Billing account charged for this run
    pub billing_account_id: String,
    /// Trigger instant this job corresponds to
    pub scheduled_for: DateTime<Utc>,
    /// Queue the job lands on
    pub queue: String,
}

/// Result of an enqueue attempt. A duplicate is a success: the trigger was
/// already handed off by an earlier attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Enqueued,
    Duplicate,
}

/// Port to the external durable task queue.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: EnqueueJob) -> Result<EnqueueOutcome, SchedulerError>;
}

/// Deterministic idempotency key for a logical trigger.
///
/// Trigger instants come out of the cron evaluator with whole-second
/// precision; fixing the rendering to microseconds keeps the key stable
/// across database round trips.
pub fn job_key(schedule_id: Uuid, scheduled_for: DateTime<Utc>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(schedule_id.as_bytes());
    hasher.update(b":");
    hasher.update(
        scheduled_for
            .to_rfc3339_opts(SecondsFormat::Micros, true)
            .as_bytes(),
    );
    hex::encode(hasher.finalize())
}

/// HTTP adapter posting jobs to the worker runtime's enqueue endpoint.
pub struct HttpJobQueue {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpJobQueue {
    /// Build the adapter from queue configuration. The client carries a
    /// bounded timeout so a wedged queue degrades to "retry next sweep"
    /// instead of stalling the reconciler.
    pub fn new(config: &QueueConfig) -> Result<Self, SchedulerError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|err| SchedulerError::QueueUnavailable {
                detail: format!("failed to build queue client: {}", err),
            })?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
        })
    }
}

#[async_trait]
impl JobQueue for HttpJobQueue {
    async fn enqueue(&self, job: EnqueueJob) -> Result<EnqueueOutcome, SchedulerError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&job)
            .send()
            .await
            .map_err(|err| SchedulerError::QueueUnavailable {
                detail: format!("enqueue request failed: {}", err),
            })?;

        match response.status() {
            status if status.is_success() => Ok(EnqueueOutcome::Enqueued),
            StatusCode::CONFLICT => Ok(EnqueueOutcome::Duplicate),
            status => Err(SchedulerError::QueueUnavailable {
                detail: format!("enqueue endpoint returned {}", status),
            }),
        }
    }
}

/// Metrics stage composed around any queue port.
pub struct MeteredQueue<Q> {
    inner: Q,
}

impl<Q> MeteredQueue<Q> {
    pub fn new(inner: Q) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<Q: JobQueue> JobQueue for MeteredQueue<Q> {
    async fn enqueue(&self, job: EnqueueJob) -> Result<EnqueueOutcome, SchedulerError> {
        let started = Instant::now();
        let result = self.inner.enqueue(job).await;
        histogram!("scheduler_enqueue_duration_ms")
            .record(started.elapsed().as_secs_f64() * 1_000.0);

        let outcome_label = match &result {
            Ok(EnqueueOutcome::Enqueued) => "enqueued",
            Ok(EnqueueOutcome::Duplicate) => "duplicate",
            Err(_) => "error",
        };
        counter!("scheduler_enqueue_total", "outcome" => outcome_label).increment(1);

        result
    }
}
