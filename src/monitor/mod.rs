//! Client-side lifecycle monitor for one remote migration job.
//!
//! # Components
//!
//! - [`JobController`]: owns the job state machine and orchestrates
//!   submit / stop / reset
//! - [`poller`]: the status poll loop and the lifetime guard, both bound to a
//!   [`PollCycle`](poller::PollCycle)
//! - [`LogBuffer`]: deduplicated, capacity-bounded log accumulation
//! - [`events`]: the subscription feed presentation layers consume
//!
//! # State Machine
//!
//! ```text
//! Idle --submit--> Running --FINISHED--> Succeeded --reset--> Idle
//!                  Running --FAILED/CANCELED--> Failed --reset--> Idle
//!                  Running --stop--> Idle
//! ```
//!
//! When the lifetime guard fires the job stays `Running` but is no longer
//! polled.

pub mod clock;
pub mod controller;
pub mod events;
pub mod job;
pub mod logs;
pub mod poller;

pub use clock::{Clock, FixedClock, SystemClock};
pub use controller::{JobController, MonitorSnapshot, StopAck};
pub use events::MonitorEvent;
pub use job::{JobHandle, JobState};
pub use logs::{LogBuffer, LogEntry, LogLevel};
