//! Broadcast stations: carrier sense, per-station workers, and the
//! reconciliation registry that keeps the pool matching the feed.

pub mod monitor;
pub mod registry;
pub mod worker;

pub use monitor::OccupancyMonitor;
pub use registry::{run_poll_loop, ReconcileSummary, StationRegistry};
pub use worker::{ConnectionState, StationEvent, StationHandle};
