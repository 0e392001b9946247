//! Provides types and functions common to the servicer binaries.
#![deny(missing_docs)]
pub mod telemetry;
