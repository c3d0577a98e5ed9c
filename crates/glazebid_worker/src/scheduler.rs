//! Main loop: dual-priority poller, heartbeat, retry policy, graceful
//! shutdown.
//!
//! Render requests are claimed ahead of main jobs on every tick; a main
//! job is only attempted when the render queue was empty. Disk pressure
//! pauses claiming entirely. One tick at a time, no parallel stages
//! within a worker; sibling workers coordinate through the database.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info, warn};

use glazebid_db::models::Job;
use glazebid_db::{heartbeats, jobs, renders};
use glazebid_protocol::{JobStatus, WorkerStatus};

use crate::cleanup;
use crate::config::WorkerMode;
use crate::context::WorkerContext;
use crate::disk;
use crate::pipeline::{self, JobState, StageError};
use crate::renderer;

/// Retry backoff schedule in seconds, clamped to the last entry.
pub const BACKOFF_SECONDS: &[i64] = &[30, 120, 600];

/// How often the retention sweep runs.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Pressure pause, in poll intervals.
const PRESSURE_SLEEP_FACTOR: u32 = 5;

/// Error messages are truncated before landing on the job row.
const ERROR_MESSAGE_MAX: usize = 1000;

/// Stage chain to run for a claimed status.
pub fn stages_for(status: JobStatus) -> &'static [&'static str] {
    match status {
        JobStatus::Uploaded => &["index", "route", "extract"],
        JobStatus::Reviewed => &["price"],
        JobStatus::Priced => &["generate"],
        _ => &[],
    }
}

fn truncate_error(message: &str) -> String {
    if message.len() <= ERROR_MESSAGE_MAX {
        return message.to_string();
    }
    let mut end = ERROR_MESSAGE_MAX;
    while !message.is_char_boundary(end) {
        end -= 1;
    }
    message[..end].to_string()
}

enum Tick {
    Worked,
    Idle,
    Pressure,
}

pub struct Scheduler {
    ctx: WorkerContext,
    shutdown: Arc<AtomicBool>,
    last_cleanup: Option<Instant>,
}

impl Scheduler {
    pub fn new(ctx: WorkerContext) -> Self {
        Scheduler {
            ctx,
            shutdown: Arc::new(AtomicBool::new(false)),
            last_cleanup: None,
        }
    }

    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    /// SIGTERM/SIGINT set the shutdown flag; the loop finishes its
    /// current work unit and exits.
    pub fn install_signal_handlers(&self) {
        let flag = self.shutdown.clone();
        tokio::spawn(async move {
            let mut sigterm = match signal(SignalKind::terminate()) {
                Ok(s) => s,
                Err(e) => {
                    error!("Could not install SIGTERM handler: {}", e);
                    return;
                }
            };
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
            info!("Received signal, shutting down gracefully");
            flag.store(true, Ordering::SeqCst);
        });
    }

    /// Startup tasks: temp root, buckets, orphan temp dirs, first
    /// heartbeat. Everything here is best-effort except the temp root.
    pub async fn startup(&self) -> anyhow::Result<()> {
        let config = &self.ctx.config;
        info!(
            "Worker starting: id={} mode={:?} poll={}s",
            config.worker_id,
            config.worker_mode,
            config.poll_interval.as_secs()
        );

        std::fs::create_dir_all(&config.temp_dir)?;

        if let Err(e) = self.ctx.store.ensure_buckets().await {
            warn!("Could not ensure buckets (object store may not be ready): {}", e);
        }

        match jobs::locked_job_ids(&self.ctx.pool).await {
            Ok(ids) => {
                let locked = ids.into_iter().collect();
                disk::cleanup_orphan_temp_dirs(&config.temp_dir, &locked);
            }
            Err(e) => warn!("Could not clean orphan temps: {}", e),
        }

        if let Err(e) = heartbeats::upsert_heartbeat(
            &self.ctx.pool,
            &config.worker_id,
            WorkerStatus::Idle,
            None,
            None,
            None,
        )
        .await
        {
            warn!("Could not write initial heartbeat: {}", e);
        }

        Ok(())
    }

    /// Poll until shutdown.
    pub async fn run(&mut self) {
        while !self.shutdown.load(Ordering::SeqCst) {
            let sleep = match self.tick().await {
                Ok(Tick::Pressure) => self.ctx.config.poll_interval * PRESSURE_SLEEP_FACTOR,
                Ok(_) => self.ctx.config.poll_interval,
                Err(e) => {
                    // Transient infra errors never reach job state; sleep
                    // and try again.
                    error!("Poll loop error: {}", e);
                    self.ctx.config.poll_interval
                }
            };
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(sleep).await;
        }
        info!("Worker shut down cleanly");
    }

    async fn tick(&mut self) -> Result<Tick, glazebid_db::DbError> {
        let config = self.ctx.config.clone();
        let memory_mb = disk::memory_usage_mb();
        let disk_pct = disk::usage_pct(&config.temp_dir);

        heartbeats::upsert_heartbeat(
            &self.ctx.pool,
            &config.worker_id,
            WorkerStatus::Idle,
            None,
            Some(memory_mb),
            Some(disk_pct),
        )
        .await?;

        if disk::is_pressure(&config.temp_dir, config.disk_pressure_threshold_pct) {
            warn!("Skipping poll cycle due to disk pressure");
            return Ok(Tick::Pressure);
        }

        // Loop A: render requests, both modes, every tick.
        let mut worked = false;
        if let Some(request) = renders::claim_render_request(&self.ctx.pool, &config.worker_id).await? {
            worked = true;
            heartbeats::upsert_heartbeat(
                &self.ctx.pool,
                &config.worker_id,
                WorkerStatus::Processing,
                None,
                Some(memory_mb),
                Some(disk_pct),
            )
            .await?;
            renderer::process_render_request(&self.ctx, &request).await;
        }

        // Loop B: main jobs, only when the render queue was empty.
        if config.worker_mode == WorkerMode::Full && !worked {
            if let Some(job) = jobs::claim_main_job(&self.ctx.pool, &config.worker_id).await? {
                worked = true;
                heartbeats::upsert_heartbeat(
                    &self.ctx.pool,
                    &config.worker_id,
                    WorkerStatus::Processing,
                    Some(&job.id),
                    Some(memory_mb),
                    Some(disk_pct),
                )
                .await?;
                self.process_main_job(job).await;
            }
        }

        let cleanup_due = self
            .last_cleanup
            .map_or(true, |at| at.elapsed() >= CLEANUP_INTERVAL);
        if cleanup_due {
            cleanup::run_daily_cleanup(&self.ctx).await;
            self.last_cleanup = Some(Instant::now());
        }

        Ok(if worked { Tick::Worked } else { Tick::Idle })
    }

    /// Drive a claimed job through its stage chain, with retry/backoff
    /// on failure and temp cleanup always.
    pub async fn process_main_job(&self, row: Job) {
        let job_id = row.id.clone();
        let retry_count = row.retry_count;
        let max_retries = row.max_retries;
        let entry_status: Option<JobStatus> = row.status.parse().ok();

        info!("Processing main job {} ({})", job_id, row.status);
        if let Err(e) = self.drive_stages(row).await {
            error!("Job {} processing failed: {}", job_id, e);
            if retry_count < max_retries {
                // Rewind to the claimed status so the retry is claimable,
                // then schedule the backoff. A crash between the two
                // leaves a stale lock, which ages out.
                if let Some(status) = entry_status {
                    if let Err(e) = jobs::update_job_status(
                        &self.ctx.pool,
                        &job_id,
                        status,
                        jobs::StatusUpdate::keeping_lock(),
                    )
                    .await
                    {
                        error!("Could not rewind job {} for retry: {}", job_id, e);
                    }
                }
                let backoff_index = (retry_count as usize).min(BACKOFF_SECONDS.len() - 1);
                let backoff = BACKOFF_SECONDS[backoff_index];
                if let Err(e) = jobs::increment_retry(&self.ctx.pool, &job_id, backoff).await {
                    error!("Could not schedule retry for {}: {}", job_id, e);
                }
            } else {
                let message = truncate_error(&e.to_string());
                if let Err(e) =
                    jobs::mark_job_failed(&self.ctx.pool, &job_id, &message, e.code()).await
                {
                    error!("Could not mark job {} failed: {}", job_id, e);
                }
                error!("Job {} permanently failed", job_id);
            }
        }

        disk::cleanup_job_temp(&self.ctx.config.temp_dir, &job_id);
    }

    async fn drive_stages(&self, row: Job) -> Result<(), StageError> {
        let mut job = JobState::from_row(&row)?;
        let stages = stages_for(job.status);
        if stages.is_empty() {
            warn!("No stages for job {} in status {}", job.id, job.status);
            return Ok(());
        }

        for stage in stages {
            if self.shutdown.load(Ordering::SeqCst) {
                info!("Shutdown requested, releasing job {}", job.id);
                jobs::update_job_status(&self.ctx.pool, &job.id, job.status, Default::default())
                    .await?;
                return Ok(());
            }

            match *stage {
                "index" => pipeline::index::run_indexing(&self.ctx, &mut job).await?,
                "route" => pipeline::route::run_routing(&self.ctx, &mut job).await?,
                "extract" => pipeline::extract::run_extraction(&self.ctx, &mut job).await?,
                "price" => pipeline::price::run_pricing(&self.ctx, &mut job).await?,
                "generate" => pipeline::generate::run_generation(&self.ctx, &mut job).await?,
                other => {
                    warn!("Unknown stage '{}' for job {}", other, job.id);
                    return Ok(());
                }
            }

            // Stages persist to the row; reload before deciding what is
            // next.
            match jobs::refresh_job(&self.ctx.pool, &job.id).await? {
                Some((status, ssot)) => job.refresh(&status, &ssot)?,
                None => {
                    warn!("Job {} disappeared mid-chain", job.id);
                    return Ok(());
                }
            }

            if job.status == JobStatus::NeedsReview {
                info!("Job {} needs review, pausing", job.id);
                return Ok(());
            }
        }

        Ok(())
    }
}
