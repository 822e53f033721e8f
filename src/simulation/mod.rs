//! # Plant Telemetry Simulation
//!
//! Synthetic readings for the digital twin: pumps, aeration basins and the
//! grid connection. The control loop only sees the [`TelemetrySource`]
//! trait, so a recorded or live source can replace the generator.

pub mod generator;

pub use generator::{DeviceBase, SyntheticTelemetry, TelemetrySource};
