// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Ecology Engine - Control Cadence Runtime
//
// Drives a FeedbackLoop on a fixed tokio interval. Observations arrive over a
// watch channel, so a burst between ticks collapses to its latest value.
// Each tick snapshots a request, solves it on the blocking pool under a hard
// timeout, then commits; an expired solve is cancelled and the step holds.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::MissedTickBehavior;

use crate::controller::{Cancellation, SolveError};
use crate::driver::{DecisionSink, DriverError, FeedbackLoop, StepReport};
use crate::types::{Diagnostics, Observation};

/// Publisher side of the observation channel.
#[derive(Debug, Clone)]
pub struct ObservationFeed {
    tx: Arc<watch::Sender<Option<Observation>>>,
}

impl ObservationFeed {
    /// Replace the latest observation. Returns `false` once the loop is gone.
    pub fn publish(&self, price_differential: f64, at_ms: u64) -> bool {
        self.tx.send(Some(Observation { price_differential, at_ms })).is_ok()
    }
}

/// Owner handle of a running control loop.
pub struct ControlLoopHandle<S: DecisionSink> {
    feed: ObservationFeed,
    diagnostics: watch::Receiver<Diagnostics>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<FeedbackLoop<S>>,
}

impl<S: DecisionSink> ControlLoopHandle<S> {
    pub fn feed(&self) -> ObservationFeed {
        self.feed.clone()
    }

    /// Snapshot published after every committed step.
    pub fn diagnostics(&self) -> watch::Receiver<Diagnostics> {
        self.diagnostics.clone()
    }

    /// Stop at the next scheduling point and hand back the loop.
    pub async fn shutdown(self) -> Result<FeedbackLoop<S>, JoinError> {
        let _ = self.shutdown.send(true);
        self.task.await
    }
}

/// Spawn `control` onto the current tokio runtime at its configured cadence.
///
/// The task exits on shutdown or on a fatal driver error; in both cases the
/// loop is returned through [`ControlLoopHandle::shutdown`].
pub fn spawn_control_loop<S>(mut control: FeedbackLoop<S>) -> ControlLoopHandle<S>
where
    S: DecisionSink + Send + 'static,
{
    let (obs_tx, mut obs_rx) = watch::channel(None::<Observation>);
    let (stop_tx, mut stop_rx) = watch::channel(false);
    let (diag_tx, diag_rx) = watch::channel(control.diagnostics());

    let cadence = Duration::from_millis(control.settings().cadence_ms);
    let budget = Duration::from_millis(control.controller().settings().solve_timeout_ms);

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(cadence);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut feed_open = true;

        tracing::info!(cadence_ms = cadence.as_millis() as u64, "control loop started");
        loop {
            tokio::select! {
                changed = stop_rx.changed() => {
                    if changed.is_err() || *stop_rx.borrow() {
                        break;
                    }
                }
                changed = obs_rx.changed(), if feed_open => {
                    match changed {
                        Ok(()) => {
                            let latest = *obs_rx.borrow_and_update();
                            if let Some(o) = latest {
                                if let Err(e) = control.observe_price_differential(o.price_differential, o.at_ms) {
                                    tracing::debug!(error = %e, "observation recorded as invalid");
                                }
                            }
                        }
                        Err(_) => feed_open = false,
                    }
                }
                _ = ticker.tick() => {
                    let outcome = run_tick(&mut control, budget).await;
                    let _ = diag_tx.send(control.diagnostics());
                    if let Err(e) = outcome {
                        tracing::error!(error = %e, "control loop stopped");
                        break;
                    }
                }
            }
        }
        tracing::info!(step = control.diagnostics().step, "control loop exited");
        control
    });

    ControlLoopHandle {
        feed: ObservationFeed { tx: Arc::new(obs_tx) },
        diagnostics: diag_rx,
        shutdown: stop_tx,
        task,
    }
}

/// One step with the solve moved to the blocking pool.
async fn run_tick<S: DecisionSink>(control: &mut FeedbackLoop<S>, budget: Duration) -> Result<StepReport, DriverError> {
    let prepared = control.begin_step()?;

    let outcome = match prepared.request().cloned() {
        None => None,
        Some(request) => {
            let controller = control.controller();
            let cancel = Cancellation::with_timeout(budget);
            let worker = cancel.clone();
            let solve = tokio::task::spawn_blocking(move || controller.solve(&request, &worker));

            match tokio::time::timeout(budget, solve).await {
                Ok(Ok(result)) => Some(result),
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "solve task aborted");
                    None
                }
                Err(_) => {
                    cancel.cancel();
                    Some(Err(SolveError::Timeout { evaluated: 0 }))
                }
            }
        }
    };

    control.commit_step(prepared, outcome)
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::driver::DecisionLog;
    use crate::types::DecisionSource;

    fn fast_config() -> EngineConfig {
        let mut cfg = EngineConfig::default();
        cfg.driver.cadence_ms = 10;
        cfg.controller.horizon_steps = 4;
        cfg.controller.solve_timeout_ms = 2_000;
        cfg
    }

    async fn wait_for_step(rx: &mut watch::Receiver<Diagnostics>, step: u64) {
        tokio::time::timeout(Duration::from_secs(10), async {
            while rx.borrow_and_update().step < step {
                if rx.changed().await.is_err() {
                    break;
                }
            }
        })
        .await
        .expect("test: loop made progress");
    }

    #[tokio::test]
    async fn runs_at_cadence_and_returns_loop_on_shutdown() {
        let control = FeedbackLoop::new(fast_config(), DecisionLog::new(128)).expect("test: config");
        let handle = spawn_control_loop(control);
        let feed = handle.feed();
        let mut diag = handle.diagnostics();

        assert!(feed.publish(0.01, 1));
        wait_for_step(&mut diag, 3).await;

        let control = handle.shutdown().await.expect("test: task joined");
        let log = control.sink();
        assert!(log.emitted() >= 3);
        let steps: Vec<u64> = log.entries().map(|d| d.step).collect();
        assert!(steps.windows(2).all(|w| w[1] == w[0] + 1), "one decision per step");
    }

    #[tokio::test]
    async fn burst_of_observations_coalesces_to_latest() {
        let mut cfg = fast_config();
        cfg.driver.cadence_ms = 50;
        let control = FeedbackLoop::new(cfg, DecisionLog::new(16)).expect("test: config");
        let handle = spawn_control_loop(control);
        let feed = handle.feed();
        let mut diag = handle.diagnostics();

        wait_for_step(&mut diag, 1).await;
        for i in 0..100u64 {
            feed.publish(0.0004 * i as f64, 10 + i);
        }
        let target = diag.borrow().step + 2;
        wait_for_step(&mut diag, target).await;
        assert!((diag.borrow().last_price_differential - 0.0396).abs() < 1e-12);

        handle.shutdown().await.expect("test: task joined");
    }

    #[tokio::test]
    async fn expired_budget_degrades_to_hold() {
        let mut cfg = fast_config();
        cfg.controller.horizon_steps = 120;
        cfg.controller.max_horizon_steps = 120;
        cfg.controller.grid_levels = 25;
        cfg.controller.solve_timeout_ms = 1;
        let control = FeedbackLoop::new(cfg, DecisionLog::new(16)).expect("test: config");
        let handle = spawn_control_loop(control);
        let mut diag = handle.diagnostics();
        wait_for_step(&mut diag, 2).await;

        let control = handle.shutdown().await.expect("test: task joined");
        let first = control.sink().entries().next().copied().expect("test: decision");
        assert_eq!(first.source, DecisionSource::HeldTimeout);
        assert_eq!(first.signal, Default::default());
    }
}
