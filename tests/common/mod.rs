#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use wastewater_dr_twin::domain::{
    BasinReading, GridReading, PlantSnapshot, PumpReading, PumpStatus, TelemetryWindow,
};
use wastewater_dr_twin::optimizer::{LinearProgramSolver, ReductionProblem, ReductionSolver};
use wastewater_dr_twin::simulation::TelemetrySource;
use wastewater_dr_twin::sinks::TelemetrySink;
use wastewater_dr_twin::DrError;

/// Two running pumps (100 kW / 0.8 and 120 kW / 0.85) and one basin
/// (200 kW / 2.0 mg/L) at `at`.
pub fn plant_window(at: DateTime<Utc>) -> TelemetryWindow {
    TelemetryWindow {
        pumps: vec![
            PumpReading {
                timestamp: at,
                pump_id: "pump001".into(),
                power: 100.0,
                status: PumpStatus::Running,
                efficiency: 0.8,
            },
            PumpReading {
                timestamp: at,
                pump_id: "pump002".into(),
                power: 120.0,
                status: PumpStatus::Running,
                efficiency: 0.85,
            },
        ],
        basins: vec![BasinReading {
            timestamp: at,
            basin_id: "basin001".into(),
            power: 200.0,
            dissolved_oxygen: 2.0,
        }],
        grid: vec![GridReading {
            timestamp: at,
            demand: 5000.0,
            price: 0.1,
        }],
    }
}

/// Returns [`plant_window`] on every call except the listed ones, which
/// fail as invalid snapshots.
#[derive(Default)]
pub struct StubSource {
    calls: usize,
    failing_calls: HashSet<usize>,
}

impl StubSource {
    pub fn failing_on(calls: impl IntoIterator<Item = usize>) -> Self {
        Self {
            calls: 0,
            failing_calls: calls.into_iter().collect(),
        }
    }
}

impl TelemetrySource for StubSource {
    fn readings(
        &mut self,
        start: DateTime<Utc>,
        _end: DateTime<Utc>,
        _step: Duration,
    ) -> Result<TelemetryWindow, DrError> {
        let call = self.calls;
        self.calls += 1;
        if self.failing_calls.contains(&call) {
            return Err(DrError::InvalidSnapshot("generator returned no pumps".into()));
        }
        Ok(plant_window(start))
    }
}

/// Keeps every published snapshot; optionally fails each publish.
pub struct RecordingSink {
    name: String,
    fail: bool,
    pub published: Mutex<Vec<PlantSnapshot>>,
    pub disconnected: AtomicBool,
}

impl RecordingSink {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            fail: false,
            published: Mutex::new(Vec::new()),
            disconnected: AtomicBool::new(false),
        })
    }

    pub fn failing(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            fail: true,
            published: Mutex::new(Vec::new()),
            disconnected: AtomicBool::new(false),
        })
    }

    pub fn count(&self) -> usize {
        self.published.lock().len()
    }

    pub fn last(&self) -> Option<PlantSnapshot> {
        self.published.lock().last().cloned()
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TelemetrySink for RecordingSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn publish(&self, snapshot: &PlantSnapshot) -> Result<(), DrError> {
        if self.fail {
            return Err(DrError::sink(&self.name, "connection refused"));
        }
        self.published.lock().push(snapshot.clone());
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), DrError> {
        self.disconnected.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Linear-program solver that fails on the listed call indices.
pub struct FlakySolver {
    calls: AtomicUsize,
    failing_calls: HashSet<usize>,
}

impl FlakySolver {
    pub fn failing_on(calls: impl IntoIterator<Item = usize>) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            failing_calls: calls.into_iter().collect(),
        }
    }
}

impl ReductionSolver for FlakySolver {
    fn name(&self) -> &'static str {
        "flaky"
    }

    fn solve(&self, problem: &ReductionProblem) -> Result<Vec<f64>, DrError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_calls.contains(&call) {
            return Err(DrError::OptimizationFailed("solver did not converge".into()));
        }
        LinearProgramSolver.solve(problem)
    }
}

pub fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}
