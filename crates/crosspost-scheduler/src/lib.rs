//! Background delivery and metric polling for scheduled posts.
//!
//! [`Scheduler`] owns the job table. [`run_delivery`] and [`run_watch`] are
//! the job bodies and can also be driven directly, as the CLI does.

pub mod delivery;
pub mod error;
pub mod scheduler;
pub mod settings;
pub mod store;
pub mod watch;

pub use delivery::{run_delivery, DeliveryReport};
pub use error::SchedulerError;
pub use scheduler::{check_collision, compute_run_time, PendingDelivery, Scheduler};
pub use settings::SchedulerSettings;
pub use store::{PgStore, PipelineStore, PollScope};
pub use watch::{force_refresh, run_watch, WatchReport};
