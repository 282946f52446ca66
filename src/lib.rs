//! tenant-gate - multi-tenant admission control for HTTP services
//!
//! Bounds how many requests each tenant may have executing and queued, and
//! how many requests the whole process holds, rejecting the rest with 429.

pub mod cli;
pub mod config;
pub mod config_validator;
pub mod http_server;
pub mod middleware;
pub mod panic_handler;
pub mod queue_wait;
pub mod slot_queue;
pub mod tenant;
pub mod throttle;

pub use middleware::{ThrottleLayer, ThrottleService};
pub use queue_wait::QueueWait;
pub use tenant::TenantId;
pub use throttle::{Admission, Rejection, Throttle, ThrottleConfig, ThrottleStats};
