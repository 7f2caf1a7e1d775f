//! Background job scheduler.
//!
//! Initialises a [`JobScheduler`] at server startup and registers the
//! recurring sync-queue dispatcher job.

use std::sync::Arc;

use syncq_dispatch::Dispatcher;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

/// Builds and starts the background job scheduler.
///
/// Returns the running [`JobScheduler`] handle, which must be kept alive for
/// the lifetime of the process. Dropping it shuts down all jobs.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the scheduler cannot be initialised,
/// the cron expression is invalid, or the scheduler fails to start.
pub async fn build_scheduler(
    dispatcher: Arc<Dispatcher>,
    cron: &str,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;

    register_dispatch_job(&scheduler, dispatcher, cron).await?;

    scheduler.start().await?;
    Ok(scheduler)
}

/// Register the dispatcher job on `cron` (six-field, seconds first).
///
/// A tick that fires while the previous run is still going is skipped.
async fn register_dispatch_job(
    scheduler: &JobScheduler,
    dispatcher: Arc<Dispatcher>,
    cron: &str,
) -> Result<(), JobSchedulerError> {
    let running = Arc::new(Mutex::new(()));

    let job = Job::new_async(cron, move |_uuid, _lock| {
        let dispatcher = Arc::clone(&dispatcher);
        let running = Arc::clone(&running);

        Box::pin(async move {
            let Ok(_guard) = running.try_lock() else {
                tracing::warn!("scheduler: previous sync queue run still in progress; skipping tick");
                return;
            };
            run_dispatch_job(&dispatcher).await;
        })
    })?;

    scheduler.add(job).await?;
    tracing::info!(cron, "scheduler: sync queue dispatcher registered");
    Ok(())
}

async fn run_dispatch_job(dispatcher: &Dispatcher) {
    tracing::debug!("scheduler: starting sync queue run");
    match dispatcher.process_queue().await {
        Ok(report) if report.processed > 0 => tracing::info!(
            processed = report.processed,
            succeeded = report.succeeded,
            failed = report.failed,
            "scheduler: sync queue run complete"
        ),
        Ok(_) => tracing::debug!("scheduler: sync queue run found no due rows"),
        Err(e) => tracing::error!(error = %e, "scheduler: sync queue run failed"),
    }
}
