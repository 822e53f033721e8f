use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::domain::{DeviceSetpoint, PlantSnapshot};
use crate::optimizer::DemandResponseEngine;
use crate::simulation::TelemetrySource;
use crate::sinks::TelemetrySink;

/// Last snapshot handed to the sinks, shared with the HTTP API.
pub type SharedPlantState = Arc<RwLock<Option<PlantSnapshot>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LoopPhase {
    Idle,
    Generating,
    Optimizing,
    Publishing,
    Sleeping,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TickOutcome {
    /// Fresh setpoints were computed and merged.
    Optimized,
    /// The optimizer failed; previous setpoints (or none) were used.
    CarriedOver,
    /// No usable snapshot; nothing was published.
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct TickReport {
    pub tick: u64,
    pub timestamp: DateTime<Utc>,
    pub outcome: TickOutcome,
    pub recommendations: Vec<String>,
    /// Names of sinks whose publish call failed.
    pub failed_sinks: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub ticks: u64,
    pub optimized: u64,
    pub carried_over: u64,
    pub skipped: u64,
}

impl RunSummary {
    fn record(&mut self, report: &TickReport) {
        self.ticks += 1;
        match report.outcome {
            TickOutcome::Optimized => self.optimized += 1,
            TickOutcome::CarriedOver => self.carried_over += 1,
            TickOutcome::Skipped => self.skipped += 1,
        }
    }
}

/// Periodic generate → optimize → publish cycle.
///
/// Owns the telemetry source and the last successful optimization result.
/// Ticks run strictly one after another; sinks within a tick run
/// concurrently and all see the same snapshot.
pub struct ControlLoop {
    source: Box<dyn TelemetrySource>,
    engine: DemandResponseEngine,
    sinks: Vec<Arc<dyn TelemetrySink>>,
    max_reduction: f64,
    update_interval: Duration,
    state: SharedPlantState,
    last_optimized: Option<Vec<DeviceSetpoint>>,
    phase: watch::Sender<LoopPhase>,
    tick_count: u64,
}

impl ControlLoop {
    pub fn new(
        source: Box<dyn TelemetrySource>,
        engine: DemandResponseEngine,
        max_reduction: f64,
        update_interval: Duration,
    ) -> Self {
        let (phase, _) = watch::channel(LoopPhase::Idle);
        Self {
            source,
            engine,
            sinks: Vec::new(),
            max_reduction,
            update_interval,
            state: Arc::new(RwLock::new(None)),
            last_optimized: None,
            phase,
            tick_count: 0,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Publishes into an existing shared state instead of a private one.
    pub fn with_state(mut self, state: SharedPlantState) -> Self {
        self.state = state;
        self
    }

    pub fn state(&self) -> SharedPlantState {
        self.state.clone()
    }

    pub fn phase(&self) -> LoopPhase {
        *self.phase.borrow()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<LoopPhase> {
        self.phase.subscribe()
    }

    pub fn max_reduction(&self) -> f64 {
        self.max_reduction
    }

    pub fn set_max_reduction(&mut self, max_reduction: f64) {
        self.max_reduction = max_reduction;
    }

    pub fn last_optimized(&self) -> Option<&[DeviceSetpoint]> {
        self.last_optimized.as_deref()
    }

    pub fn sink_names(&self) -> Vec<String> {
        self.sinks.iter().map(|s| s.name().to_string()).collect()
    }

    fn set_phase(&self, phase: LoopPhase) {
        self.phase.send_replace(phase);
    }

    /// Runs one generate → optimize → publish cycle for `now`.
    pub async fn tick(&mut self, now: DateTime<Utc>) -> TickReport {
        self.tick_count += 1;
        let tick = self.tick_count;

        self.set_phase(LoopPhase::Generating);
        let step = chrono::Duration::from_std(self.update_interval)
            .unwrap_or_else(|_| chrono::Duration::seconds(60));
        let snapshot = self
            .source
            .readings(now, now, step)
            .and_then(|window| PlantSnapshot::from_window(&window));
        let mut snapshot = match snapshot {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(
                    tick,
                    timestamp = %now,
                    component = e.component(),
                    error = %e,
                    "skipping tick"
                );
                return TickReport {
                    tick,
                    timestamp: now,
                    outcome: TickOutcome::Skipped,
                    recommendations: Vec::new(),
                    failed_sinks: Vec::new(),
                };
            }
        };

        self.set_phase(LoopPhase::Optimizing);
        let devices = snapshot.device_states();
        let optimized = self
            .engine
            .optimize(&devices, &snapshot.grid, self.max_reduction)
            .and_then(|result| {
                snapshot.apply_setpoints(&result.setpoints)?;
                Ok(result)
            });

        let (outcome, recommendations) = match optimized {
            Ok(result) => {
                info!(
                    tick,
                    component = "optimizer",
                    solver = self.engine.solver_name(),
                    baseline_kw = result.baseline_total_kw,
                    optimized_kw = result.optimized_total_kw,
                    reduction_pct = result.reduction_fraction * 100.0,
                    hourly_savings = snapshot.grid.hourly_cost(result.reduction_kw()),
                    "optimization applied"
                );
                for text in &result.recommendations {
                    info!(tick, component = "optimizer", recommendation = %text);
                }
                self.last_optimized = Some(result.setpoints);
                (TickOutcome::Optimized, result.recommendations)
            }
            Err(e) => {
                let carried = self
                    .last_optimized
                    .as_deref()
                    .map(|previous| snapshot.carry_over(previous))
                    .unwrap_or(0);
                warn!(
                    tick,
                    component = e.component(),
                    error = %e,
                    carried_devices = carried,
                    "optimization failed, publishing last known setpoints"
                );
                (TickOutcome::CarriedOver, Vec::new())
            }
        };

        self.set_phase(LoopPhase::Publishing);
        *self.state.write().await = Some(snapshot.clone());
        let failed_sinks = self.publish(&snapshot, tick, now).await;

        info!(
            tick,
            timestamp = %snapshot.timestamp,
            devices = snapshot.device_count(),
            total_kw = snapshot.total_power_kw(),
            optimized_total_kw = snapshot.optimized_total_kw(),
            failed_sinks = failed_sinks.len(),
            "control tick"
        );

        TickReport {
            tick,
            timestamp: snapshot.timestamp,
            outcome,
            recommendations,
            failed_sinks,
        }
    }

    async fn publish(
        &self,
        snapshot: &PlantSnapshot,
        tick: u64,
        now: DateTime<Utc>,
    ) -> Vec<String> {
        let results = join_all(self.sinks.iter().map(|sink| async move {
            (sink.name().to_string(), sink.publish(snapshot).await)
        }))
        .await;

        let mut failed = Vec::new();
        for (name, result) in results {
            if let Err(e) = result {
                error!(
                    tick,
                    timestamp = %now,
                    component = "sink",
                    sink = %name,
                    error = %e,
                    "publish failed"
                );
                failed.push(name);
            }
        }
        failed
    }

    /// Ticks every `update_interval` until `end_time` passes or `shutdown`
    /// fires, then disconnects all sinks.
    ///
    /// Both exit conditions are checked at tick boundaries only; a tick in
    /// progress always completes.
    pub async fn run(&mut self, end_time: DateTime<Utc>, shutdown: CancellationToken) -> RunSummary {
        info!(
            %end_time,
            interval_ms = self.update_interval.as_millis() as u64,
            max_reduction = self.max_reduction,
            sinks = ?self.sink_names(),
            "control loop started"
        );

        let mut interval = tokio::time::interval(self.update_interval.max(Duration::from_millis(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut summary = RunSummary::default();

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("shutdown requested, stopping control loop");
                    break;
                }
                _ = interval.tick() => {}
            }

            let now = Utc::now();
            if now >= end_time {
                info!(%end_time, "simulation window elapsed");
                break;
            }

            let report = self.tick(now).await;
            summary.record(&report);
            self.set_phase(LoopPhase::Sleeping);
        }

        self.disconnect().await;
        self.set_phase(LoopPhase::Stopped);
        info!(
            ticks = summary.ticks,
            optimized = summary.optimized,
            carried_over = summary.carried_over,
            skipped = summary.skipped,
            "control loop stopped"
        );
        summary
    }

    async fn disconnect(&self) {
        for sink in &self.sinks {
            if let Err(e) = sink.disconnect().await {
                warn!(component = "sink", sink = sink.name(), error = %e, "disconnect failed");
            }
        }
    }
}
