use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AerationBasin, DeviceKind, DeviceSetpoint, DeviceState, GridSnapshot, Pump, PumpStatus};
use crate::error::DrError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PumpReading {
    pub timestamp: DateTime<Utc>,
    pub pump_id: String,
    pub power: f64,
    pub status: PumpStatus,
    pub efficiency: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasinReading {
    pub timestamp: DateTime<Utc>,
    pub basin_id: String,
    pub power: f64,
    pub dissolved_oxygen: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridReading {
    pub timestamp: DateTime<Utc>,
    pub demand: f64,
    pub price: f64,
}

/// Rows returned by a telemetry source for a time window, one row per
/// timestamp per device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetryWindow {
    pub pumps: Vec<PumpReading>,
    pub basins: Vec<BasinReading>,
    pub grid: Vec<GridReading>,
}

impl TelemetryWindow {
    /// Most recent timestamp present in any row.
    pub fn latest_timestamp(&self) -> Option<DateTime<Utc>> {
        self.pumps
            .iter()
            .map(|r| r.timestamp)
            .chain(self.basins.iter().map(|r| r.timestamp))
            .chain(self.grid.iter().map(|r| r.timestamp))
            .max()
    }
}

/// Device and grid state for a single control tick.
///
/// Device order is significant: the optimizer maps its results back by
/// position, pumps first and then basins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlantSnapshot {
    pub timestamp: DateTime<Utc>,
    pub pumps: Vec<Pump>,
    pub aeration_basins: Vec<AerationBasin>,
    pub grid: GridSnapshot,
}

impl PlantSnapshot {
    /// Builds a validated snapshot from the latest rows of a telemetry window.
    pub fn from_window(window: &TelemetryWindow) -> Result<Self, DrError> {
        let timestamp = window
            .latest_timestamp()
            .ok_or_else(|| DrError::InvalidSnapshot("telemetry window is empty".into()))?;

        let pumps: Vec<Pump> = window
            .pumps
            .iter()
            .filter(|r| r.timestamp == timestamp)
            .map(|r| Pump::new(r.pump_id.clone(), r.power, r.efficiency, r.status))
            .collect();
        let aeration_basins: Vec<AerationBasin> = window
            .basins
            .iter()
            .filter(|r| r.timestamp == timestamp)
            .map(|r| AerationBasin::new(r.basin_id.clone(), r.power, r.dissolved_oxygen))
            .collect();
        let grid = window
            .grid
            .iter()
            .find(|r| r.timestamp == timestamp)
            .map(|r| GridSnapshot::new(r.demand, r.price))
            .ok_or_else(|| DrError::InvalidSnapshot(format!("no grid reading at {timestamp}")))?;

        let snapshot = Self {
            timestamp,
            pumps,
            aeration_basins,
            grid,
        };
        snapshot.validate()?;
        Ok(snapshot)
    }

    pub fn validate(&self) -> Result<(), DrError> {
        if self.pumps.is_empty() && self.aeration_basins.is_empty() {
            return Err(DrError::InvalidSnapshot("no device readings".into()));
        }
        if !self.grid.is_finite() {
            return Err(DrError::InvalidSnapshot("grid reading is not finite".into()));
        }

        let mut seen = HashSet::new();
        for device in self.device_states() {
            if !seen.insert((device.kind, device.id.clone())) {
                return Err(DrError::InvalidSnapshot(format!(
                    "duplicate {} id {}",
                    device.kind, device.id
                )));
            }
            if !device.power_kw.is_finite() || device.power_kw < 0.0 {
                return Err(DrError::InvalidSnapshot(format!(
                    "{} {} has invalid power {}",
                    device.kind, device.id, device.power_kw
                )));
            }
            if !device.dependent_attribute.is_finite() || device.dependent_attribute <= 0.0 {
                return Err(DrError::InvalidSnapshot(format!(
                    "{} {} has invalid {} {}",
                    device.kind,
                    device.id,
                    device.kind.dependent_attribute_name(),
                    device.dependent_attribute
                )));
            }
        }
        Ok(())
    }

    pub fn device_count(&self) -> usize {
        self.pumps.len() + self.aeration_basins.len()
    }

    /// Decision-variable order: pumps first, then basins, input order kept.
    pub fn device_states(&self) -> Vec<DeviceState> {
        self.pumps
            .iter()
            .map(Pump::state)
            .chain(self.aeration_basins.iter().map(AerationBasin::state))
            .collect()
    }

    /// Merges setpoints positionally into the optimized fields.
    pub fn apply_setpoints(&mut self, setpoints: &[DeviceSetpoint]) -> Result<(), DrError> {
        if setpoints.len() != self.device_count() {
            return Err(DrError::OptimizationFailed(format!(
                "expected {} setpoints, got {}",
                self.device_count(),
                setpoints.len()
            )));
        }

        // Check every pair before writing so a bad result leaves no partial update.
        for (device, setpoint) in self.device_states().iter().zip(setpoints) {
            if setpoint.kind != device.kind || setpoint.id != device.id {
                return Err(DrError::OptimizationFailed(format!(
                    "setpoint for {} {} does not line up with {} {}",
                    setpoint.kind, setpoint.id, device.kind, device.id
                )));
            }
        }

        let (pump_setpoints, basin_setpoints) = setpoints.split_at(self.pumps.len());
        for (pump, setpoint) in self.pumps.iter_mut().zip(pump_setpoints) {
            pump.apply(setpoint);
        }
        for (basin, setpoint) in self.aeration_basins.iter_mut().zip(basin_setpoints) {
            basin.apply(setpoint);
        }
        Ok(())
    }

    /// Fills optimized fields from a previous result, matched by kind and id.
    ///
    /// Devices without a previous setpoint keep `None`. Returns how many
    /// devices were filled.
    pub fn carry_over(&mut self, previous: &[DeviceSetpoint]) -> usize {
        let find = |kind: DeviceKind, id: &str| {
            previous
                .iter()
                .find(|s| s.kind == kind && s.id == id)
        };

        let mut filled = 0;
        for pump in &mut self.pumps {
            if let Some(setpoint) = find(DeviceKind::Pump, &pump.id) {
                pump.apply(setpoint);
                filled += 1;
            }
        }
        for basin in &mut self.aeration_basins {
            if let Some(setpoint) = find(DeviceKind::AerationBasin, &basin.id) {
                basin.apply(setpoint);
                filled += 1;
            }
        }
        filled
    }

    pub fn total_power_kw(&self) -> f64 {
        self.device_states().iter().map(|d| d.power_kw).sum()
    }

    /// Total optimized power, falling back to raw power for devices that
    /// have not been optimized.
    pub fn optimized_total_kw(&self) -> f64 {
        let pumps: f64 = self
            .pumps
            .iter()
            .map(|p| p.optimized_power_kw.unwrap_or(p.power_kw))
            .sum();
        let basins: f64 = self
            .aeration_basins
            .iter()
            .map(|b| b.optimized_power_kw.unwrap_or(b.power_kw))
            .sum();
        pumps + basins
    }
}
