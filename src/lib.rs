//! Demand-response digital twin for a wastewater treatment plant.
//!
//! A control loop pulls synthetic pump, aeration basin and grid readings,
//! lowers every device to its allowed power floor and publishes the result
//! to the configured sinks.

pub mod api;
pub mod config;
pub mod controller;
pub mod domain;
pub mod error;
pub mod optimizer;
pub mod simulation;
pub mod sinks;
pub mod telemetry;

pub use error::DrError;
