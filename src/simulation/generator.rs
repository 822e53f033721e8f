use chrono::{DateTime, Duration, Local, Timelike, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::config::{GridConfig, PlantConfig};
use crate::domain::{BasinReading, GridReading, PumpReading, PumpStatus, TelemetryWindow};
use crate::error::DrError;

/// Relative standard deviations of the per-reading noise.
const PUMP_POWER_NOISE: f64 = 0.10;
const PUMP_EFFICIENCY_NOISE: f64 = 0.05;
const PUMP_IDLE_PROBABILITY: f64 = 0.05;
const BASIN_POWER_NOISE: f64 = 0.10;
const BASIN_OXYGEN_NOISE: f64 = 0.20;
const GRID_DEMAND_NOISE: f64 = 0.10;
const GRID_PRICE_NOISE: f64 = 0.05;

/// Floor for efficiency and dissolved oxygen, which must stay positive.
const MIN_ATTRIBUTE: f64 = 1e-3;

/// Source of device and grid readings for a time window.
#[cfg_attr(test, mockall::automock)]
pub trait TelemetrySource: Send + Sync {
    /// Returns one row per timestamp in `[start, end]` (spaced by `step`)
    /// for every pump, basin and the grid.
    fn readings(
        &mut self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        step: Duration,
    ) -> Result<TelemetryWindow, DrError>;
}

/// Nominal operating point of one simulated device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceBase {
    pub id: String,
    pub power_kw: f64,
    /// Efficiency for pumps, dissolved oxygen for basins.
    pub attribute: f64,
}

/// Seeded generator: base values are drawn once from the configured ranges,
/// every reading adds multiplicative Gaussian noise on top.
pub struct SyntheticTelemetry {
    pumps: Vec<DeviceBase>,
    basins: Vec<DeviceBase>,
    base_demand_kw: f64,
    base_price: f64,
    rng: StdRng,
}

impl SyntheticTelemetry {
    pub fn new(plant: &PlantConfig, grid: &GridConfig, random_seed: Option<u64>) -> Self {
        let mut rng = match random_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let pumps = (1..=plant.pump_count)
            .map(|n| DeviceBase {
                id: format!("pump{n:03}"),
                power_kw: rng.gen_range(plant.pump_power_range.min()..=plant.pump_power_range.max()),
                attribute: rng.gen_range(
                    plant.pump_efficiency_range.min()..=plant.pump_efficiency_range.max(),
                ),
            })
            .collect();
        let basins = (1..=plant.basin_count)
            .map(|n| DeviceBase {
                id: format!("basin{n:03}"),
                power_kw: rng.gen_range(plant.basin_power_range.min()..=plant.basin_power_range.max()),
                attribute: rng.gen_range(
                    plant.dissolved_oxygen_range.min()..=plant.dissolved_oxygen_range.max(),
                ),
            })
            .collect();
        let base_demand_kw = rng.gen_range(grid.demand_range.min()..=grid.demand_range.max());
        let base_price =
            rng.gen_range(grid.energy_price_range.min()..=grid.energy_price_range.max());

        Self::with_bases(pumps, basins, base_demand_kw, base_price, rng)
    }

    pub fn with_bases(
        pumps: Vec<DeviceBase>,
        basins: Vec<DeviceBase>,
        base_demand_kw: f64,
        base_price: f64,
        rng: StdRng,
    ) -> Self {
        Self {
            pumps,
            basins,
            base_demand_kw,
            base_price,
            rng,
        }
    }

    pub fn pumps(&self) -> &[DeviceBase] {
        &self.pumps
    }

    pub fn basins(&self) -> &[DeviceBase] {
        &self.basins
    }

    fn noise(&mut self, relative_std_dev: f64) -> f64 {
        let z: f64 = self.rng.sample(StandardNormal);
        1.0 + relative_std_dev * z
    }

    fn pump_reading(&mut self, index: usize, timestamp: DateTime<Utc>) -> PumpReading {
        let (id, power_kw, efficiency) = {
            let base = &self.pumps[index];
            (base.id.clone(), base.power_kw, base.attribute)
        };
        let power = (power_kw * self.noise(PUMP_POWER_NOISE)).max(0.0);
        let status = if self.rng.gen::<f64>() > PUMP_IDLE_PROBABILITY {
            PumpStatus::Running
        } else {
            PumpStatus::Idle
        };
        let efficiency = (efficiency * self.noise(PUMP_EFFICIENCY_NOISE)).max(MIN_ATTRIBUTE);
        PumpReading {
            timestamp,
            pump_id: id,
            power,
            status,
            efficiency,
        }
    }

    fn basin_reading(&mut self, index: usize, timestamp: DateTime<Utc>) -> BasinReading {
        let (id, power_kw, dissolved_oxygen) = {
            let base = &self.basins[index];
            (base.id.clone(), base.power_kw, base.attribute)
        };
        BasinReading {
            timestamp,
            basin_id: id,
            power: (power_kw * self.noise(BASIN_POWER_NOISE)).max(0.0),
            dissolved_oxygen: (dissolved_oxygen * self.noise(BASIN_OXYGEN_NOISE))
                .max(MIN_ATTRIBUTE),
        }
    }

    fn grid_reading(&mut self, timestamp: DateTime<Utc>) -> GridReading {
        let factor = daily_demand_factor(timestamp.with_timezone(&Local).hour());
        GridReading {
            timestamp,
            demand: (self.base_demand_kw * factor * self.noise(GRID_DEMAND_NOISE)).max(0.0),
            price: (self.base_price * factor * self.noise(GRID_PRICE_NOISE)).max(0.0),
        }
    }
}

/// Demand is higher during the day: `1 + 0.5 * sin(pi * hour / 12)`.
pub fn daily_demand_factor(hour: u32) -> f64 {
    1.0 + 0.5 * (PI * f64::from(hour) / 12.0).sin()
}

/// Timestamps from `start` to `end` inclusive. A non-positive step yields
/// only `start`.
fn timestamps(start: DateTime<Utc>, end: DateTime<Utc>, step: Duration) -> Vec<DateTime<Utc>> {
    if step <= Duration::zero() {
        return vec![start];
    }
    let mut out = Vec::new();
    let mut ts = start;
    while ts <= end {
        out.push(ts);
        ts += step;
    }
    out
}

impl TelemetrySource for SyntheticTelemetry {
    fn readings(
        &mut self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        step: Duration,
    ) -> Result<TelemetryWindow, DrError> {
        if end < start {
            return Err(DrError::InvalidSnapshot(format!(
                "window end {end} precedes start {start}"
            )));
        }

        let mut window = TelemetryWindow::default();
        for ts in timestamps(start, end, step) {
            for i in 0..self.pumps.len() {
                let row = self.pump_reading(i, ts);
                window.pumps.push(row);
            }
            for i in 0..self.basins.len() {
                let row = self.basin_reading(i, ts);
                window.basins.push(row);
            }
            let row = self.grid_reading(ts);
            window.grid.push(row);
        }
        Ok(window)
    }
}
