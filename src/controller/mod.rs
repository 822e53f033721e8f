pub mod control_loop;

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::Config;
use crate::optimizer::DemandResponseEngine;
use crate::simulation::SyntheticTelemetry;
use crate::sinks::{DashboardClient, HistorySink, HistoryStore, IotAgentPublisher, TelemetrySink};

pub use control_loop::{
    ControlLoop, LoopPhase, RunSummary, SharedPlantState, TickOutcome, TickReport,
};

/// State shared between the control task and the HTTP API.
#[derive(Clone)]
pub struct AppState {
    pub cfg: Config,
    pub plant: SharedPlantState,
    pub history: Arc<HistoryStore>,
    pub phase: watch::Receiver<LoopPhase>,
}

impl AppState {
    /// Builds the shared state and the control loop wired to it.
    ///
    /// The history sink is always attached; the IoT agent and dashboard
    /// sinks only when enabled in the configuration.
    pub fn new(cfg: Config) -> Result<(Self, ControlLoop)> {
        let history = Arc::new(HistoryStore::from_config(&cfg.sinks.history));
        let plant: SharedPlantState = Arc::new(RwLock::new(None));

        let source = SyntheticTelemetry::new(&cfg.plant, &cfg.grid, cfg.simulation.random_seed);
        let engine = DemandResponseEngine::from_config(&cfg.optimizer);
        let mut control = ControlLoop::new(
            Box::new(source),
            engine,
            cfg.optimizer.max_power_reduction,
            cfg.simulation.update_interval(),
        )
        .with_state(plant.clone());

        for sink in build_sinks(&cfg, history.clone())? {
            control = control.with_sink(sink);
        }

        let state = Self {
            phase: control.subscribe_phase(),
            cfg,
            plant,
            history,
        };
        Ok((state, control))
    }

    pub fn phase(&self) -> LoopPhase {
        *self.phase.borrow()
    }
}

fn build_sinks(cfg: &Config, history: Arc<HistoryStore>) -> Result<Vec<Arc<dyn TelemetrySink>>> {
    let mut sinks: Vec<Arc<dyn TelemetrySink>> = vec![Arc::new(HistorySink::new(history))];
    if cfg.sinks.iot_agent.enabled {
        sinks.push(Arc::new(IotAgentPublisher::new(&cfg.sinks.iot_agent)?));
    }
    if cfg.sinks.dashboard.enabled {
        sinks.push(Arc::new(DashboardClient::new(&cfg.sinks.dashboard)?));
    }
    Ok(sinks)
}

/// Runs the control loop on its own task until `end_time` or `shutdown`.
pub fn spawn_controller_tasks(
    mut control: ControlLoop,
    end_time: DateTime<Utc>,
    shutdown: CancellationToken,
) -> JoinHandle<RunSummary> {
    tokio::spawn(async move {
        let summary = control.run(end_time, shutdown.clone()).await;
        info!(ticks = summary.ticks, "controller task finished");
        // Let the API stop with the loop when the window runs out.
        shutdown.cancel();
        summary
    })
}
