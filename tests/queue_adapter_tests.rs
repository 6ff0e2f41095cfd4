//! HTTP job-queue adapter tests against a mock worker runtime endpoint.

use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use serde_json::json;
use url::Url;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use cogni_scheduler::config::QueueConfig;
use cogni_scheduler::error::SchedulerError;
use cogni_scheduler::queue::{EnqueueJob, EnqueueOutcome, HttpJobQueue, JobQueue, job_key};

fn queue_config(server: &MockServer, timeout_ms: u64) -> QueueConfig {
    QueueConfig {
        endpoint: Url::parse(&format!("{}/internal/jobs", server.uri())).unwrap(),
        queue_name: "graph-runs".to_string(),
        timeout_ms,
    }
}

fn sample_job() -> EnqueueJob {
    let schedule_id = Uuid::new_v4();
    let scheduled_for = Utc::now();
    EnqueueJob {
        job_key: job_key(schedule_id, scheduled_for),
        run_id: Uuid::new_v4(),
        schedule_id,
        graph_id: "graph-digest".to_string(),
        input: json!({"prompt": "digest"}),
        execution_grant_id: Uuid::new_v4(),
        billing_account_id: "acct-1".to_string(),
        scheduled_for,
        queue: "graph-runs".to_string(),
    }
}

#[tokio::test]
async fn successful_enqueue_posts_the_job_payload() -> Result<()> {
    let server = MockServer::start().await;
    let job = sample_job();

    Mock::given(method("POST"))
        .and(path("/internal/jobs"))
        .and(body_partial_json(json!({
            "job_key": job.job_key,
            "graph_id": "graph-digest",
            "queue": "graph-runs"
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = HttpJobQueue::new(&queue_config(&server, 2000))?;
    let outcome = adapter.enqueue(job).await?;

    assert_eq!(outcome, EnqueueOutcome::Enqueued);

    Ok(())
}

#[tokio::test]
async fn conflict_response_is_reported_as_duplicate() -> Result<()> {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/internal/jobs"))
        .respond_with(ResponseTemplate::new(409))
        .mount(&server)
        .await;

    let adapter = HttpJobQueue::new(&queue_config(&server, 2000))?;
    let outcome = adapter.enqueue(sample_job()).await?;

    assert_eq!(outcome, EnqueueOutcome::Duplicate);

    Ok(())
}

#[tokio::test]
async fn server_error_surfaces_as_queue_unavailable() -> Result<()> {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/internal/jobs"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let adapter = HttpJobQueue::new(&queue_config(&server, 2000))?;
    let err = adapter.enqueue(sample_job()).await.unwrap_err();

    assert!(matches!(err, SchedulerError::QueueUnavailable { .. }));

    Ok(())
}

#[tokio::test]
async fn slow_endpoint_hits_the_bounded_timeout() -> Result<()> {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/internal/jobs"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(800)))
        .mount(&server)
        .await;

    let adapter = HttpJobQueue::new(&queue_config(&server, 150))?;
    let err = adapter.enqueue(sample_job()).await.unwrap_err();

    assert!(matches!(err, SchedulerError::QueueUnavailable { .. }));

    Ok(())
}
