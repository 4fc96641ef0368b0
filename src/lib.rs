//! CostBar - AWS Cost Tracker
//!
//! Polls month-to-date AWS spend, ranks the most expensive services, and hands
//! snapshots to a desktop widget. Runs on simulated data when live numbers are
//! unavailable.

pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod period;
pub mod scheduler;
pub mod sources;
pub mod storage;

pub use config::{LiveSource, WidgetSettings};
pub use error::{CostError, Result};
pub use scheduler::{PollScheduler, SnapshotSink};
pub use sources::{CostSnapshot, CostSource, ServiceCost, SourceKind};
