//! Background job execution.
//!
//! Tiles request their data through a [`JobScheduler`], a priority-ordered
//! pool of worker threads. Every dispatch returns a [`JobFuture`] that the
//! caller stores in a tile slot and polls each frame:
//!
//! ```text
//!   dispatch(options, job) ──► queue ──► worker picks highest priority
//!          │                                   │
//!          ▼                                   ▼
//!     JobFuture (slot) ◄──── Promise::resolve(value) / abandon
//! ```
//!
//! Priorities are evaluated when a worker picks its next job, not at dispatch,
//! so a tile that moved closer to the camera since it was queued gets
//! promoted. Jobs of equal priority run in dispatch order.

mod config;
mod future;
mod scheduler;

pub use config::{
    default_worker_count, SchedulerConfig, DEFAULT_MAX_WORKERS, DEFAULT_SCHEDULER_NAME,
};
pub use future::{JobFuture, Promise, SlotState};
pub use scheduler::{DispatchOptions, JobScheduler, PriorityFn, SchedulerStats};
