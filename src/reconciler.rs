//! # Schedule Reconciler
//!
//! Background sweep that turns due schedules into enqueued jobs. Each tick
//! claims the sweep lease (single-flight across deployments), loads stale
//! schedules, and processes them independently: create the ledger row,
//! enqueue with a trigger-unique job key, advance the trigger time. A
//! failure on one schedule never aborts the sweep for the rest; the failed
//! schedule stays stale and is retried on the next tick.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use metrics::{counter, gauge, histogram};
use rand::Rng;
use sea_orm::{DatabaseConnection, TransactionTrait};
use tokio::time::{Duration as TokioDuration, Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::config::{AppConfig, SchedulerConfig};
use crate::cron::compute_next_cron_time;
use crate::error::{SchedulerError, is_unique_violation};
use crate::models::schedule::Model as ScheduleModel;
use crate::queue::{EnqueueJob, EnqueueOutcome, JobQueue, job_key};
use crate::repositories::grant::check_grant;
use crate::repositories::lease::RECONCILER_LEASE;
use crate::repositories::schedule::ScheduleChanges;
use crate::repositories::{GrantRepository, LeaseRepository, RunRepository, ScheduleRepository};

/// Background reconciliation service.
pub struct ScheduleReconciler {
    config: Arc<AppConfig>,
    db: DatabaseConnection,
    schedules: ScheduleRepository,
    grants: GrantRepository,
    runs: RunRepository,
    leases: LeaseRepository,
    queue: Arc<dyn JobQueue>,
    /// Lease identity of this process
    holder: Uuid,
}

#[derive(Debug, Default)]
struct SweepStats {
    schedules_polled: u64,
    jobs_enqueued: u64,
    jobs_deduped: u64,
    runs_skipped: u64,
    schedules_errored: u64,
}

impl ScheduleReconciler {
    /// Create a new reconciler over the given connection and queue port.
    pub fn new(
        config: Arc<AppConfig>,
        db: DatabaseConnection,
        queue: Arc<dyn JobQueue>,
    ) -> Self {
        Self {
            config,
            schedules: ScheduleRepository::new(db.clone()),
            grants: GrantRepository::new(db.clone()),
            runs: RunRepository::new(db.clone()),
            leases: LeaseRepository::new(db.clone()),
            db,
            queue,
            holder: Uuid::new_v4(),
        }
    }

    /// Run the sweep loop until the provided shutdown token fires.
    #[instrument(skip_all)]
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), SchedulerError> {
        info!(holder = %self.holder, "Starting schedule reconciler");

        loop {
            let pause = tick_pause(&self.config.scheduler, &mut rand::thread_rng());

            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Schedule reconciler shutdown requested");
                    break;
                }
                _ = sleep(pause) => {
                    let tick_started = Instant::now();
                    if let Err(err) = self.tick().await {
                        error!(error = ?err, "Reconciler sweep failed");
                    }
                    let elapsed = tick_started.elapsed();
                    histogram!("scheduler_sweep_duration_ms")
                        .record(elapsed.as_secs_f64() * 1_000.0);
                }
            }
        }

        let _ = self
            .leases
            .release(RECONCILER_LEASE, self.holder, Utc::now())
            .await;

        info!("Schedule reconciler stopped");
        Ok(())
    }

    /// One sweep: claim the lease, process every stale schedule, release.
    async fn tick(&self) -> Result<(), SchedulerError> {
        let now = Utc::now();

        let lease_ttl = Duration::seconds(self.config.scheduler.lease_ttl_seconds as i64);
        if !self
            .leases
            .try_acquire(RECONCILER_LEASE, self.holder, lease_ttl, now)
            .await?
        {
            counter!("scheduler_sweep_lease_misses_total").increment(1);
            debug!(holder = %self.holder, "Sweep lease held elsewhere; skipping tick");
            return Ok(());
        }

        let mut stats = SweepStats::default();

        let candidates = self
            .schedules
            .find_stale(now, self.config.scheduler.batch_size)
            .await?;
        gauge!("scheduler_sweep_backlog").set(candidates.len() as f64);

        for candidate in candidates {
            match self.process_schedule(candidate.id, now, &mut stats).await {
                Ok(()) => {}
                Err(err) => {
                    stats.schedules_errored += 1;
                    error!(
                        error = ?err,
                        schedule_id = %candidate.id,
                        "Failed to reconcile schedule; leaving stale for next sweep"
                    );
                }
            }
        }

        self.leases
            .release(RECONCILER_LEASE, self.holder, Utc::now())
            .await?;

        debug!(
            polled = stats.schedules_polled,
            enqueued = stats.jobs_enqueued,
            deduped = stats.jobs_deduped,
            skipped = stats.runs_skipped,
            errors = stats.schedules_errored,
            "Reconciler sweep completed"
        );

        Ok(())
    }

    async fn process_schedule(
        &self,
        schedule_id: Uuid,
        now: DateTime<Utc>,
        stats: &mut SweepStats,
    ) -> Result<(), SchedulerError> {
        let txn = self.db.begin().await?;

        // Re-load under a row lock; skip if another writer got here first or
        // the schedule is no longer stale (e.g. just disabled).
        let Some(schedule) = self.schedules.claim_stale(&txn, schedule_id, now).await? else {
            txn.rollback().await?;
            return Ok(());
        };

        stats.schedules_polled += 1;

        let Some(scheduled_for) = schedule.next_run_at.map(|dt| dt.with_timezone(&Utc)) else {
            // claim_stale filters null next_run_at; nothing to do either way
            txn.rollback().await?;
            return Ok(());
        };

        let grant = self
            .grants
            .find_grant_in(&txn, schedule.execution_grant_id)
            .await?
            .ok_or(SchedulerError::GrantNotFound {
                grant_id: schedule.execution_grant_id,
            });

        let grant_check = grant.and_then(|grant| check_grant(&grant, &schedule.graph_id, now));

        if let Err(reason) = grant_check {
            // An unusable grant degrades this schedule to a skipped run and
            // stops future firing attempts for this trigger; it must not
            // error the sweep.
            self.record_skip(&txn, &schedule, scheduled_for, now, &reason)
                .await?;
            txn.commit().await?;

            stats.runs_skipped += 1;
            counter!("scheduler_runs_skipped_total").increment(1);
            info!(
                schedule_id = %schedule.id,
                grant_id = %schedule.execution_grant_id,
                scheduled_for = %scheduled_for,
                reason = %reason,
                "Skipped schedule run; execution grant unusable"
            );
            return Ok(());
        }

        // Ledger row first, so every enqueued job is traceable even if the
        // worker never picks it up. A unique violation means an earlier
        // sweep already created the row for this trigger; reuse it.
        let run = match self
            .runs
            .create_pending_in(&txn, schedule.id, scheduled_for)
            .await
        {
            Ok(run) => run,
            Err(SchedulerError::Database(err)) if is_unique_violation(&err) => {
                let existing = self
                    .runs
                    .find_by_trigger(&txn, schedule.id, scheduled_for)
                    .await?;
                match existing {
                    Some(run) => run,
                    None => return Err(SchedulerError::Database(err)),
                }
            }
            Err(err) => return Err(err),
        };

        txn.commit().await?;

        // Enqueue outside the transaction: queue I/O must not hold row
        // locks. The job key and the unique run row make the crash window
        // between commit and enqueue safe to re-walk.
        let outcome = self
            .queue
            .enqueue(EnqueueJob {
                job_key: job_key(schedule.id, scheduled_for),
                run_id: run.id,
                schedule_id: schedule.id,
                graph_id: schedule.graph_id.clone(),
                input: schedule.input.clone(),
                execution_grant_id: schedule.execution_grant_id,
                billing_account_id: schedule.billing_account_id.clone(),
                scheduled_for,
                queue: self.config.queue.queue_name.clone(),
            })
            .await?;

        match outcome {
            EnqueueOutcome::Enqueued => {
                stats.jobs_enqueued += 1;
                counter!("scheduler_runs_enqueued_total").increment(1);
                info!(
                    schedule_id = %schedule.id,
                    run_id = %run.id,
                    graph_id = %schedule.graph_id,
                    scheduled_for = %scheduled_for,
                    "Enqueued schedule run"
                );
            }
            EnqueueOutcome::Duplicate => {
                stats.jobs_deduped += 1;
                debug!(
                    schedule_id = %schedule.id,
                    run_id = %run.id,
                    "Queue already holds this trigger; enqueue deduplicated"
                );
            }
        }

        self.advance_schedule(&schedule, scheduled_for, now).await
    }

    /// Record a skipped run and advance the trigger so the schedule does not
    /// stay stale forever while its grant is unusable. `last_run_at` is left
    /// untouched: nothing ran.
    async fn record_skip<C>(
        &self,
        conn: &C,
        schedule: &ScheduleModel,
        scheduled_for: DateTime<Utc>,
        now: DateTime<Utc>,
        reason: &SchedulerError,
    ) -> Result<(), SchedulerError>
    where
        C: sea_orm::ConnectionTrait,
    {
        match self
            .runs
            .create_skipped_in(conn, schedule.id, scheduled_for, &reason.to_string())
            .await
        {
            Ok(_) => {}
            Err(SchedulerError::Database(err)) if is_unique_violation(&err) => {
                debug!(
                    schedule_id = %schedule.id,
                    "Run row already exists for skipped trigger"
                );
            }
            Err(err) => return Err(err),
        }

        let next_run_at =
            compute_next_cron_time(&schedule.cron, &schedule.timezone, now)?;

        match self
            .schedules
            .update_guarded(
                conn,
                schedule,
                ScheduleChanges {
                    next_run_at: Some(Some(next_run_at)),
                    ..Default::default()
                },
            )
            .await
        {
            Ok(_) => Ok(()),
            Err(SchedulerError::UpdateConflict { .. }) => {
                warn!(
                    schedule_id = %schedule.id,
                    "Schedule changed while recording skip; leaving their write in place"
                );
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Advance next_run_at past `now` and record the trigger that fired. A
    /// version conflict means a user update landed mid-flight; their write
    /// already recomputed (or cleared) the trigger, so ours must not stomp
    /// it.
    async fn advance_schedule(
        &self,
        schedule: &ScheduleModel,
        scheduled_for: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), SchedulerError> {
        let next_run_at =
            compute_next_cron_time(&schedule.cron, &schedule.timezone, now)?;

        match self
            .schedules
            .update_guarded(
                &self.db,
                schedule,
                ScheduleChanges {
                    next_run_at: Some(Some(next_run_at)),
                    last_run_at: Some(scheduled_for),
                    ..Default::default()
                },
            )
            .await
        {
            Ok(_) => Ok(()),
            Err(SchedulerError::UpdateConflict { .. }) => {
                warn!(
                    schedule_id = %schedule.id,
                    "Schedule updated concurrently during sweep; not advancing"
                );
                Ok(())
            }
            Err(err) => Err(err),
        }
    }
}

/// Tick interval plus a random start jitter, so restarted replicas spread
/// their sweeps instead of stampeding together.
fn tick_pause<R: Rng + ?Sized>(config: &SchedulerConfig, rng: &mut R) -> TokioDuration {
    let base = config.tick_interval_seconds as f64;
    let max_pct = config.tick_jitter_pct_max.max(0.0);

    let jitter = if max_pct == 0.0 {
        0.0
    } else {
        base * rng.gen_range(0.0..=max_pct)
    };

    TokioDuration::from_secs_f64(base + jitter)
}
