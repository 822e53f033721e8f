use anyhow::Result;
use axum::Router;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use wastewater_dr_twin::{api, config, controller, telemetry};

use config::Config;
use telemetry::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cfg = Config::load()?;
    init_tracing(&cfg.logging)?;

    let (app_state, control) = controller::AppState::new(cfg.clone())?;

    let shutdown = CancellationToken::new();
    let end_time = Utc::now() + chrono::Duration::from_std(cfg.simulation.duration())?;
    info!(
        %end_time,
        solver = ?cfg.optimizer.solver,
        max_power_reduction = cfg.optimizer.max_power_reduction,
        "starting wastewater demand-response twin"
    );
    let controller_task = controller::spawn_controller_tasks(control, end_time, shutdown.clone());

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        telemetry::shutdown_signal().await;
        signal_token.cancel();
    });

    if cfg.server.enabled {
        let app: Router = api::router(app_state, &cfg);
        let addr = cfg.server.socket_addr()?;
        if cfg.server.host == "0.0.0.0" {
            warn!("server binding to 0.0.0.0 - the API will be reachable from the network");
        }
        info!(%addr, "starting HTTP API");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        let api_token = shutdown.clone();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { api_token.cancelled().await })
            .await?;
    }

    let summary = controller_task.await?;
    info!(
        ticks = summary.ticks,
        optimized = summary.optimized,
        carried_over = summary.carried_over,
        skipped = summary.skipped,
        "shutdown complete"
    );
    Ok(())
}
