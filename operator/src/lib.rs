//! Provides API for the deployment servicer and related tooling.
#![warn(missing_docs)]

/// Configuration built at startup.
pub mod config;
/// Errors produced while reconciling.
pub mod error;
/// Labels module for the predicate and managed resource labels.
pub mod labels;
/// Bounded retries.
pub mod retry;
/// Servicer module keeping services in step with deployments.
pub mod servicer;
/// Utils module for the shared context and cluster operations.
pub mod utils;
/// List and watch loops.
pub mod watch;

pub use config::Config;
pub use error::Error;

/// Field manager and managed-by label value of everything the servicer writes.
pub const CONTROLLER_NAME: &str = "deployment-servicer";
