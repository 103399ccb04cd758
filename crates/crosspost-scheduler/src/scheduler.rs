//! Scheduler Core: the job table and the lifecycle of the background jobs.
//!
//! One [`Scheduler`] is built by the server's composition root and handed to
//! whoever needs to schedule, cancel or inspect deliveries. The job table maps
//! each post id to at most one pending one-shot Delivery Job; a recurring
//! Watch Job is registered on [`Scheduler::start`].

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use crosspost_core::has_collision;
use crosspost_telegram::Messenger;
use serde::Serialize;
use tokio::sync::{Mutex, Semaphore};
use tokio_cron_scheduler::{Job, JobScheduler};
use uuid::Uuid;

use crate::delivery::run_delivery;
use crate::error::SchedulerError;
use crate::settings::SchedulerSettings;
use crate::store::PipelineStore;
use crate::watch::{force_refresh, run_watch, WatchReport};

/// A pending Delivery Job as reported by [`Scheduler::pending_jobs`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PendingDelivery {
    pub post_id: i64,
    pub run_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
struct TableEntry {
    job_id: Uuid,
    run_at: DateTime<Utc>,
}

type JobTable = Arc<Mutex<HashMap<i64, TableEntry>>>;

/// Everything a job body needs, shared by every registered job.
struct JobContext {
    store: Arc<dyn PipelineStore>,
    messenger: Arc<dyn Messenger>,
    settings: SchedulerSettings,
    workers: Semaphore,
    /// Held for the whole of a watch run; at most one runs at a time.
    watch_gate: Mutex<()>,
}

/// Handle to the background scheduler. Clones share the same job table.
#[derive(Clone)]
pub struct Scheduler {
    jobs: JobScheduler,
    table: JobTable,
    ctx: Arc<JobContext>,
    started: Arc<AtomicBool>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("settings", &self.ctx.settings)
            .field("started", &self.started.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

/// When the Delivery Job for a post due at `delivery_at` should fire.
///
/// `delivery_at - lead`, but never earlier than one second after `now`.
#[must_use]
pub fn compute_run_time(
    delivery_at: DateTime<Utc>,
    lead: Duration,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    let floor = now + chrono::Duration::seconds(1);
    let lead = chrono::Duration::from_std(lead).unwrap_or(chrono::Duration::MAX);
    let run_at = delivery_at
        .checked_sub_signed(lead)
        .unwrap_or(DateTime::<Utc>::MIN_UTC);
    run_at.max(floor)
}

/// Collision check for `post_id` against every post sharing one of its
/// channels. A post without targets or without a delivery instant never
/// collides.
///
/// # Errors
///
/// Returns [`SchedulerError::Db`] if the schedules cannot be loaded.
pub async fn check_collision(
    store: &dyn PipelineStore,
    post_id: i64,
    window: chrono::Duration,
) -> Result<bool, SchedulerError> {
    let schedules = store.channel_schedules(post_id).await?;
    let (candidate, others): (Vec<_>, Vec<_>) =
        schedules.into_iter().partition(|s| s.post_id == post_id);

    Ok(candidate
        .first()
        .is_some_and(|candidate| has_collision(candidate, &others, window)))
}

impl Scheduler {
    /// Builds a stopped scheduler. Nothing fires until [`Scheduler::start`].
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Schedule`] if the underlying job scheduler
    /// cannot be initialised.
    pub async fn new(
        store: Arc<dyn PipelineStore>,
        messenger: Arc<dyn Messenger>,
        settings: SchedulerSettings,
    ) -> Result<Self, SchedulerError> {
        let jobs = JobScheduler::new().await?;
        let workers = Semaphore::new(settings.workers);

        Ok(Self {
            jobs,
            table: Arc::new(Mutex::new(HashMap::new())),
            ctx: Arc::new(JobContext {
                store,
                messenger,
                settings,
                workers,
                watch_gate: Mutex::new(()),
            }),
            started: Arc::new(AtomicBool::new(false)),
        })
    }

    #[must_use]
    pub fn settings(&self) -> &SchedulerSettings {
        &self.ctx.settings
    }

    #[must_use]
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Registers the Watch Job, restores persisted deliveries and starts
    /// ticking.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::AlreadyStarted`] on a second call, or the
    /// first failure while registering jobs or reading the persisted table.
    pub async fn start(&self) -> Result<(), SchedulerError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(SchedulerError::AlreadyStarted);
        }

        self.jobs.add(self.watch_job()?).await?;
        let restored = self.restore().await?;
        self.jobs.start().await?;

        tracing::info!(
            restored,
            watch_cron = %self.ctx.settings.watch_cron,
            workers = self.ctx.settings.workers,
            "scheduler: started"
        );
        Ok(())
    }

    /// Stops firing jobs. Jobs already executing run to completion.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Schedule`] if the shutdown fails.
    pub async fn stop(&self) -> Result<(), SchedulerError> {
        let mut jobs = self.jobs.clone();
        jobs.shutdown().await?;
        tracing::info!("scheduler: stopped");
        Ok(())
    }

    /// Registers (or replaces) the Delivery Job of `post_id` and returns its
    /// run time.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::NotScheduled`] if the post has no delivery
    /// instant, [`SchedulerError::Db`] if it cannot be loaded or the job
    /// cannot be persisted (the post is then left without a live job), or [`SchedulerError::Schedule`] if the job
    /// scheduler rejects the job.
    pub async fn schedule(&self, post_id: i64) -> Result<DateTime<Utc>, SchedulerError> {
        let post = self.ctx.store.get_post(post_id).await?;
        let delivery_at = post
            .schedule_time
            .ok_or(SchedulerError::NotScheduled(post_id))?;
        let run_at = compute_run_time(delivery_at, self.ctx.settings.delivery_lead, Utc::now());

        let mut table = self.table.lock().await;
        self.register(&mut table, post_id, run_at).await?;
        if let Err(e) = self.ctx.store.save_job(post_id, run_at).await {
            self.discard(&mut table, post_id).await;
            return Err(e.into());
        }

        tracing::info!(post_id, %run_at, %delivery_at, "scheduler: delivery scheduled");
        Ok(run_at)
    }

    /// Cancels the pending Delivery Job of `post_id`. Returns `false` when
    /// there was nothing to cancel.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Schedule`] if the job cannot be removed, or
    /// [`SchedulerError::Db`] if the persisted entry cannot be deleted.
    pub async fn unschedule(&self, post_id: i64) -> Result<bool, SchedulerError> {
        let mut table = self.table.lock().await;
        let live = match table.get(&post_id).map(|entry| entry.job_id) {
            Some(job_id) => {
                self.jobs.remove(&job_id).await?;
                table.remove(&post_id);
                true
            }
            None => false,
        };
        let persisted = self.ctx.store.delete_job(post_id).await?;

        if live || persisted {
            tracing::info!(post_id, "scheduler: delivery unscheduled");
        }
        Ok(live || persisted)
    }

    /// Pending deliveries, earliest first.
    pub async fn pending_jobs(&self) -> Vec<PendingDelivery> {
        let table = self.table.lock().await;
        let mut pending: Vec<PendingDelivery> = table
            .iter()
            .map(|(&post_id, entry)| PendingDelivery {
                post_id,
                run_at: entry.run_at,
            })
            .collect();
        pending.sort_by_key(|p| (p.run_at, p.post_id));
        pending
    }

    /// Whether another post on one of `post_id`'s channels is due within the
    /// safe-zone window of its delivery instant. Advisory only.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Db`] if the schedules cannot be loaded.
    pub async fn has_collision(&self, post_id: i64) -> Result<bool, SchedulerError> {
        check_collision(
            self.ctx.store.as_ref(),
            post_id,
            self.ctx.settings.collision_window,
        )
        .await
    }

    /// Polls one post's channels now, outside the Watch Job's cycle. Waits
    /// for a watch run in progress to finish first.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Db`] if the purge or the post's channel
    /// lookup fails.
    pub async fn refresh(&self, post_id: i64) -> Result<WatchReport, SchedulerError> {
        let _running = self.ctx.watch_gate.lock().await;
        force_refresh(
            self.ctx.store.as_ref(),
            self.ctx.messenger.as_ref(),
            &self.ctx.settings,
            post_id,
        )
        .await
    }

    /// Runs one Watch Job cycle now, on a worker. Returns `None` without
    /// polling when another watch run is still in progress, or when the run
    /// panicked.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Db`] if the purge or the channel lookup fails.
    pub async fn watch_now(&self) -> Result<Option<WatchReport>, SchedulerError> {
        guarded_watch(Arc::clone(&self.ctx)).await.transpose()
    }

    /// Drops the live job of `post_id` after a failed schedule, so nothing
    /// fires that the persisted table does not know about.
    async fn discard(&self, table: &mut HashMap<i64, TableEntry>, post_id: i64) {
        if let Some(entry) = table.remove(&post_id) {
            if let Err(e) = self.jobs.remove(&entry.job_id).await {
                tracing::error!(post_id, error = %e, "scheduler: failed to drop unsaved job");
            }
        }
    }

    /// Replaces the live entry for `post_id`. The caller holds the table lock
    /// for the whole remove-then-add, so one post never has two live jobs.
    async fn register(
        &self,
        table: &mut HashMap<i64, TableEntry>,
        post_id: i64,
        run_at: DateTime<Utc>,
    ) -> Result<(), SchedulerError> {
        if let Some(previous) = table.get(&post_id).map(|entry| entry.job_id) {
            self.jobs.remove(&previous).await?;
            table.remove(&post_id);
            tracing::debug!(post_id, "scheduler: replaced pending delivery");
        }

        let delay = (run_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        let job_id = self.jobs.add(self.delivery_job(post_id, delay)?).await?;
        table.insert(post_id, TableEntry { job_id, run_at });
        Ok(())
    }

    /// Re-registers persisted deliveries. Past-due ones fire one second from
    /// now; posts already in the live table keep their entry.
    async fn restore(&self) -> Result<usize, SchedulerError> {
        let saved = self.ctx.store.saved_jobs().await?;
        let floor = Utc::now() + chrono::Duration::seconds(1);

        let mut table = self.table.lock().await;
        let mut restored = 0;
        for (post_id, run_at) in saved {
            if table.contains_key(&post_id) {
                continue;
            }
            self.register(&mut table, post_id, run_at.max(floor)).await?;
            restored += 1;
        }
        Ok(restored)
    }

    fn delivery_job(&self, post_id: i64, delay: Duration) -> Result<Job, SchedulerError> {
        let table = Arc::clone(&self.table);
        let ctx = Arc::clone(&self.ctx);

        let job = Job::new_one_shot_async(delay, move |job_id, _lock| {
            let table = Arc::clone(&table);
            let ctx = Arc::clone(&ctx);

            Box::pin(async move {
                fire_delivery(ctx, table, post_id, job_id).await;
            })
        })?;
        Ok(job)
    }

    fn watch_job(&self) -> Result<Job, SchedulerError> {
        let ctx = Arc::clone(&self.ctx);

        let job = Job::new_async(self.ctx.settings.watch_cron.as_str(), move |_uuid, _lock| {
            let ctx = Arc::clone(&ctx);

            Box::pin(async move {
                if let Some(Err(e)) = guarded_watch(ctx).await {
                    tracing::error!(error = %e, "scheduler: watch run failed");
                }
            })
        })?;
        Ok(job)
    }
}

/// One Watch Job run, skipped when another is still in progress.
async fn guarded_watch(ctx: Arc<JobContext>) -> Option<Result<WatchReport, SchedulerError>> {
    let Ok(_running) = ctx.watch_gate.try_lock() else {
        tracing::warn!("scheduler: previous watch run still in progress; skipping");
        return None;
    };

    tracing::info!("scheduler: starting watch run");
    let task_ctx = Arc::clone(&ctx);
    let outcome = run_in_worker(&ctx.workers, "watch", async move {
        run_watch(
            task_ctx.store.as_ref(),
            task_ctx.messenger.as_ref(),
            &task_ctx.settings,
        )
        .await
    })
    .await;
    outcome
}

/// Body of a one-shot Delivery Job.
///
/// Claims the table entry first: if it now belongs to a newer job the firing
/// is stale and does nothing. The persisted row is cleared under the same
/// lock, so a concurrent reschedule's row survives.
async fn fire_delivery(ctx: Arc<JobContext>, table: JobTable, post_id: i64, job_id: Uuid) {
    {
        let mut table = table.lock().await;
        match table.get(&post_id) {
            Some(entry) if entry.job_id == job_id => {
                table.remove(&post_id);
            }
            _ => {
                tracing::debug!(post_id, %job_id, "scheduler: stale delivery job; skipping");
                return;
            }
        }

        if let Err(e) = ctx.store.delete_job(post_id).await {
            tracing::warn!(post_id, error = %e, "scheduler: failed to clear persisted job");
        }
    }

    tracing::info!(post_id, "scheduler: starting delivery");
    let task_ctx = Arc::clone(&ctx);
    let outcome = run_in_worker(&ctx.workers, "delivery", async move {
        run_delivery(
            task_ctx.store.as_ref(),
            task_ctx.messenger.as_ref(),
            &task_ctx.settings,
            post_id,
        )
        .await
    })
    .await;
    if let Some(Err(e)) = outcome {
        tracing::error!(post_id, error = %e, "scheduler: delivery failed");
    }
}

/// Runs `task` on its own tokio task while holding one worker permit.
///
/// A panic inside `task` is logged and yields `None`.
async fn run_in_worker<F>(workers: &Semaphore, job: &'static str, task: F) -> Option<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    let Ok(_permit) = workers.acquire().await else {
        tracing::warn!(job, "scheduler: worker pool closed; dropping run");
        return None;
    };

    match tokio::spawn(task).await {
        Ok(output) => Some(output),
        Err(e) => {
            tracing::error!(job, error = %e, "scheduler: job panicked");
            None
        }
    }
}
