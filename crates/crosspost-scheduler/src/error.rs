use crosspost_db::DbError;
use crosspost_telegram::TelegramError;
use thiserror::Error;
use tokio_cron_scheduler::JobSchedulerError;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Messaging(#[from] TelegramError),
    #[error("job scheduler error: {0}")]
    Schedule(#[from] JobSchedulerError),
    #[error("post {0} has no delivery instant")]
    NotScheduled(i64),
    #[error("scheduler already started")]
    AlreadyStarted,
}
