//! Provides types and functions that are common to the engine and the runner.
#![deny(missing_docs)]
#[cfg(feature = "telemetry")]
pub mod telemetry;
