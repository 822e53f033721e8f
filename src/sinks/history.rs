//! Bounded, time-windowed history of published plant state.
//!
//! Rows older than the retention window are dropped on every insert and
//! each buffer is capped at `max_records` rows.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;

use super::{DashboardPayload, TelemetrySink};
use crate::config::HistoryConfig;
use crate::domain::PlantSnapshot;
use crate::error::DrError;

/// Ten years; far beyond any dashboard window.
const MAX_RETENTION_HOURS: i64 = 87_600;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PumpHistoryRow {
    pub timestamp: DateTime<Utc>,
    pub pump_id: String,
    pub power: f64,
    pub optimized_power: Option<f64>,
    pub efficiency: f64,
    pub optimized_efficiency: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasinHistoryRow {
    pub timestamp: DateTime<Utc>,
    pub basin_id: String,
    pub power: f64,
    pub optimized_power: Option<f64>,
    pub dissolved_oxygen: f64,
    pub optimized_dissolved_oxygen: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridHistoryRow {
    pub timestamp: DateTime<Utc>,
    pub demand: f64,
    pub price: f64,
}

/// Copy of the stored history, oldest rows first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub pump_data: Vec<PumpHistoryRow>,
    pub aeration_data: Vec<BasinHistoryRow>,
    pub grid_data: Vec<GridHistoryRow>,
}

#[derive(Debug, Default)]
struct Buffers {
    pumps: VecDeque<PumpHistoryRow>,
    basins: VecDeque<BasinHistoryRow>,
    grid: VecDeque<GridHistoryRow>,
}

pub struct HistoryStore {
    retention: Duration,
    max_records: usize,
    buffers: RwLock<Buffers>,
}

impl HistoryStore {
    pub fn new(retention: Duration, max_records: usize) -> Self {
        Self {
            retention,
            max_records: max_records.max(1),
            buffers: RwLock::new(Buffers::default()),
        }
    }

    pub fn from_config(cfg: &HistoryConfig) -> Self {
        let hours = i64::try_from(cfg.retention_hours).unwrap_or(MAX_RETENTION_HOURS);
        Self::new(Duration::hours(hours.min(MAX_RETENTION_HOURS)), cfg.max_records)
    }

    /// Appends one document stamped at `at`, then prunes.
    pub fn record(&self, payload: &DashboardPayload, at: DateTime<Utc>) {
        let mut buffers = self.buffers.write();
        for pump in &payload.pumps {
            buffers.pumps.push_back(PumpHistoryRow {
                timestamp: at,
                pump_id: pump.id.clone(),
                power: pump.power_kw,
                optimized_power: pump.optimized_power_kw,
                efficiency: pump.efficiency,
                optimized_efficiency: pump.optimized_efficiency,
            });
        }
        for basin in &payload.aeration_basins {
            buffers.basins.push_back(BasinHistoryRow {
                timestamp: at,
                basin_id: basin.id.clone(),
                power: basin.power_kw,
                optimized_power: basin.optimized_power_kw,
                dissolved_oxygen: basin.dissolved_oxygen,
                optimized_dissolved_oxygen: basin.optimized_dissolved_oxygen,
            });
        }
        buffers.grid.push_back(GridHistoryRow {
            timestamp: at,
            demand: payload.grid.demand_kw,
            price: payload.grid.price_per_kwh,
        });

        let cutoff = at - self.retention;
        prune(&mut buffers.pumps, cutoff, self.max_records, |r| r.timestamp);
        prune(&mut buffers.basins, cutoff, self.max_records, |r| r.timestamp);
        prune(&mut buffers.grid, cutoff, self.max_records, |r| r.timestamp);
    }

    pub fn snapshot(&self) -> HistoryRecord {
        let buffers = self.buffers.read();
        HistoryRecord {
            pump_data: buffers.pumps.iter().cloned().collect(),
            aeration_data: buffers.basins.iter().cloned().collect(),
            grid_data: buffers.grid.iter().cloned().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.buffers.read().grid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Keeps rows strictly newer than `cutoff`, then trims to `cap`.
fn prune<T>(
    rows: &mut VecDeque<T>,
    cutoff: DateTime<Utc>,
    cap: usize,
    timestamp: impl Fn(&T) -> DateTime<Utc>,
) {
    rows.retain(|r| timestamp(r) > cutoff);
    while rows.len() > cap {
        rows.pop_front();
    }
}

/// Feeds every published snapshot into a shared [`HistoryStore`].
#[derive(Clone)]
pub struct HistorySink {
    store: Arc<HistoryStore>,
}

impl HistorySink {
    pub fn new(store: Arc<HistoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl TelemetrySink for HistorySink {
    fn name(&self) -> &str {
        "history"
    }

    async fn publish(&self, snapshot: &PlantSnapshot) -> Result<(), DrError> {
        self.store
            .record(&DashboardPayload::from(snapshot), snapshot.timestamp);
        Ok(())
    }
}
