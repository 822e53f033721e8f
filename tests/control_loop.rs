mod common;

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use common::{approx, FlakySolver, RecordingSink, StubSource};
use wastewater_dr_twin::controller::{ControlLoop, LoopPhase, TickOutcome};
use wastewater_dr_twin::domain::PumpStatus;
use wastewater_dr_twin::optimizer::DemandResponseEngine;

fn control_loop(source: StubSource, engine: DemandResponseEngine, interval: Duration) -> ControlLoop {
    ControlLoop::new(Box::new(source), engine, 0.3, interval)
}

#[tokio::test]
async fn every_sink_receives_the_optimized_snapshot() {
    let first = RecordingSink::new("first");
    let second = RecordingSink::new("second");
    let mut control = control_loop(
        StubSource::default(),
        DemandResponseEngine::default(),
        Duration::from_secs(60),
    )
    .with_sink(first.clone())
    .with_sink(second.clone());

    let report = control.tick(Utc::now()).await;

    assert_eq!(report.outcome, TickOutcome::Optimized);
    assert_eq!(report.recommendations.len(), 3);
    assert_eq!(
        report.recommendations[2],
        "Reduce power of Aeration Basin basin001 from 200.00 to 140.00"
    );
    assert!(report.failed_sinks.is_empty());

    let snapshot = first.last().unwrap();
    assert_eq!(Some(snapshot.clone()), second.last());
    assert!(approx(snapshot.pumps[0].optimized_power_kw.unwrap(), 70.0));
    assert!(approx(snapshot.pumps[0].optimized_efficiency.unwrap(), 0.56));
    assert!(approx(snapshot.pumps[1].optimized_power_kw.unwrap(), 84.0));
    assert!(approx(snapshot.pumps[1].optimized_efficiency.unwrap(), 0.595));
    assert_eq!(snapshot.pumps[1].optimized_status, Some(PumpStatus::Running));
    assert!(approx(snapshot.aeration_basins[0].optimized_dissolved_oxygen.unwrap(), 1.4));
    assert_eq!(snapshot.pumps[0].power_kw, 100.0);
}

#[tokio::test]
async fn failing_sink_does_not_abort_the_tick() {
    let broken = RecordingSink::failing("broken");
    let healthy = RecordingSink::new("healthy");
    let mut control = control_loop(
        StubSource::default(),
        DemandResponseEngine::default(),
        Duration::from_secs(60),
    )
    .with_sink(broken.clone())
    .with_sink(healthy.clone());

    let first = control.tick(Utc::now()).await;
    let second = control.tick(Utc::now()).await;

    assert_eq!(first.failed_sinks, vec!["broken"]);
    assert_eq!(second.outcome, TickOutcome::Optimized);
    assert_eq!(healthy.count(), 2);
    assert_eq!(broken.count(), 0);
}

#[tokio::test]
async fn solver_failure_carries_over_previous_setpoints() {
    let sink = RecordingSink::new("recorder");
    let engine = DemandResponseEngine::new(Box::new(FlakySolver::failing_on([1])));
    let mut control = control_loop(StubSource::default(), engine, Duration::from_secs(60))
        .with_sink(sink.clone());

    let first = control.tick(Utc::now()).await;
    let stored = control.last_optimized().map(<[_]>::to_vec);
    let second = control.tick(Utc::now()).await;

    assert_eq!(first.outcome, TickOutcome::Optimized);
    assert_eq!(second.outcome, TickOutcome::CarriedOver);
    assert!(second.recommendations.is_empty());
    assert_eq!(control.last_optimized().map(<[_]>::to_vec), stored);

    let published = sink.last().unwrap();
    assert!(approx(published.pumps[0].optimized_power_kw.unwrap(), 70.0));
    assert!(approx(published.pumps[1].optimized_efficiency.unwrap(), 0.595));
    assert!(approx(published.aeration_basins[0].optimized_power_kw.unwrap(), 140.0));
}

#[tokio::test]
async fn out_of_range_reduction_keeps_stored_result() {
    let sink = RecordingSink::new("recorder");
    let mut control = control_loop(
        StubSource::default(),
        DemandResponseEngine::default(),
        Duration::from_secs(60),
    )
    .with_sink(sink.clone());

    control.tick(Utc::now()).await;
    let stored = control.last_optimized().map(<[_]>::to_vec);

    control.set_max_reduction(1.5);
    let report = control.tick(Utc::now()).await;

    assert_eq!(report.outcome, TickOutcome::CarriedOver);
    assert_eq!(control.last_optimized().map(<[_]>::to_vec), stored);
    assert_eq!(sink.count(), 2);
    assert!(approx(sink.last().unwrap().pumps[0].optimized_power_kw.unwrap(), 70.0));
}

#[tokio::test]
async fn invalid_snapshot_is_skipped_without_publishing() {
    let sink = RecordingSink::new("recorder");
    let mut control = control_loop(
        StubSource::failing_on([0]),
        DemandResponseEngine::default(),
        Duration::from_secs(60),
    )
    .with_sink(sink.clone());

    let skipped = control.tick(Utc::now()).await;
    assert_eq!(skipped.outcome, TickOutcome::Skipped);
    assert_eq!(sink.count(), 0);
    assert!(control.state().read().await.is_none());

    let next = control.tick(Utc::now()).await;
    assert_eq!(next.outcome, TickOutcome::Optimized);
    assert_eq!(sink.count(), 1);
}

#[tokio::test]
async fn run_stops_at_end_time_and_disconnects_sinks() {
    let sink = RecordingSink::new("recorder");
    let mut control = control_loop(
        StubSource::default(),
        DemandResponseEngine::default(),
        Duration::from_millis(10),
    )
    .with_sink(sink.clone());
    let end_time = Utc::now() + chrono::Duration::milliseconds(60);

    let summary = tokio::time::timeout(
        Duration::from_secs(5),
        control.run(end_time, CancellationToken::new()),
    )
    .await
    .expect("loop should stop at end time");

    assert!(summary.ticks >= 1);
    assert_eq!(summary.ticks, summary.optimized);
    assert_eq!(sink.count() as u64, summary.ticks);
    assert!(sink.is_disconnected());
    assert!(Utc::now() >= end_time);
    assert_eq!(control.phase(), LoopPhase::Stopped);
}

#[tokio::test]
async fn run_stops_on_cancellation() {
    let sink = RecordingSink::new("recorder");
    let mut control = control_loop(
        StubSource::default(),
        DemandResponseEngine::default(),
        Duration::from_millis(10),
    )
    .with_sink(sink.clone());
    let phase = control.subscribe_phase();
    let shutdown = CancellationToken::new();

    let token = shutdown.clone();
    let handle = tokio::spawn(async move {
        let summary = control
            .run(Utc::now() + chrono::Duration::hours(1), token)
            .await;
        (control, summary)
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    shutdown.cancel();
    let (control, summary) = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("loop should observe cancellation")
        .unwrap();

    assert!(summary.ticks >= 1);
    assert!(sink.is_disconnected());
    assert_eq!(*phase.borrow(), LoopPhase::Stopped);
    assert!(control.state().read().await.is_some());
}

#[tokio::test]
async fn state_is_shared_with_readers() {
    let mut control = control_loop(
        StubSource::default(),
        DemandResponseEngine::default(),
        Duration::from_secs(60),
    );
    let reader = control.state();

    control.tick(Utc::now()).await;

    let snapshot = reader.read().await.clone().unwrap();
    assert!(approx(snapshot.optimized_total_kw(), 294.0));
    assert_eq!(Arc::strong_count(&reader), 2);
}
