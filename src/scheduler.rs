//! Background scheduler with a single-flight guard.
//!
//! One wall-clock timer drives scheduled runs. Manual runs share the same
//! guard, so at most one run is active at a time: a scheduled tick that
//! finds the guard taken is skipped, a manual run gets `RunInProgress`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, Notify, OwnedMutexGuard};
use tracing::{error, info, warn};

use crate::app::{FreshetError, Result};
use crate::config::Schedule;
use crate::domain::{CumulativeStats, RunResult};
use crate::pipeline::{Pipeline, RunOptions};
use crate::store::Store;

/// The single-flight flag. The guard is released on drop, panics included.
#[derive(Clone, Default)]
pub struct SchedulerState {
    lock: Arc<Mutex<()>>,
}

impl SchedulerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the run slot, or `None` when a run is active.
    pub fn try_begin(&self) -> Option<OwnedMutexGuard<()>> {
        self.lock.clone().try_lock_owned().ok()
    }

    pub fn is_running(&self) -> bool {
        self.lock.try_lock().is_err()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub enabled: bool,
    pub running: bool,
    pub schedule: Schedule,
    pub next_run_at: Option<DateTime<Utc>>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub cumulative: CumulativeStats,
}

/// Why the armed loop stopped waiting.
enum Wake {
    Rearm,
    Stop,
}

pub struct Scheduler<S: Store> {
    pipeline: Arc<Pipeline<S>>,
    state: SchedulerState,
    rearm: Notify,
    shutdown: Notify,
}

impl<S: Store + Send + Sync + 'static> Scheduler<S> {
    pub fn new(pipeline: Arc<Pipeline<S>>) -> Self {
        Self {
            pipeline,
            state: SchedulerState::new(),
            rearm: Notify::new(),
            shutdown: Notify::new(),
        }
    }

    pub fn state(&self) -> &SchedulerState {
        &self.state
    }

    /// Manual run. Fails with `RunInProgress` when another run is active.
    pub async fn run_once(&self, options: RunOptions) -> Result<RunResult> {
        let Some(_guard) = self.state.try_begin() else {
            return Err(FreshetError::RunInProgress);
        };
        self.pipeline.run(options).await
    }

    /// Scheduled run. A no-op while another run is active or while the
    /// parser is disabled.
    pub async fn trigger(&self) -> Option<RunResult> {
        match self.pipeline.settings().load() {
            Ok(settings) if !settings.parser.enabled => {
                info!("Parser disabled, skipping scheduled run");
                return None;
            }
            Err(e) => warn!("Could not reload settings: {}", e),
            Ok(_) => {}
        }

        let Some(_guard) = self.state.try_begin() else {
            info!("Run already in progress, skipping scheduled run");
            return None;
        };

        match self.pipeline.run(RunOptions::default()).await {
            Ok(run) => {
                info!(
                    "Scheduled run finished: {}/{} succeeded",
                    run.succeeded, run.processed
                );
                Some(run)
            }
            Err(e) => {
                error!("Scheduled run failed: {}", e);
                None
            }
        }
    }

    /// Re-read the schedule and restart the timer.
    pub fn rearm(&self) {
        self.rearm.notify_one();
    }

    /// Stop the loop once it is back in its select.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }

    pub fn status(&self) -> Result<SchedulerStatus> {
        let settings = self
            .pipeline
            .settings()
            .load()
            .map_err(|e| FreshetError::Config(e.to_string()))?;
        let store = self.pipeline.store();
        let cumulative = store.cumulative_stats()?;

        Ok(SchedulerStatus {
            enabled: settings.parser.enabled,
            running: self.state.is_running(),
            schedule: settings.parser.schedule,
            next_run_at: store.next_run_at()?,
            last_run_at: cumulative.last_run_at,
            cumulative,
        })
    }

    /// Next scheduled run as recorded by whichever process runs the loop.
    pub fn next_run_at(&self) -> Option<DateTime<Utc>> {
        match self.pipeline.store().next_run_at() {
            Ok(at) => at,
            Err(e) => {
                warn!("Could not read next run time: {}", e);
                None
            }
        }
    }

    fn set_next_run_at(&self, at: Option<DateTime<Utc>>) {
        if let Err(e) = self.pipeline.store().set_next_run_at(at) {
            warn!("Could not record next run time: {}", e);
        }
    }

    /// Run the timer loop until shutdown or until scheduling is disabled.
    pub async fn run_forever(&self) -> Result<()> {
        loop {
            let settings = self
                .pipeline
                .settings()
                .load()
                .map_err(|e| FreshetError::Config(e.to_string()))?;
            if !settings.parser.enabled {
                info!("Scheduler disabled, stopping");
                self.set_next_run_at(None);
                return Ok(());
            }

            match self.armed(settings.parser.schedule).await {
                Wake::Rearm => continue,
                Wake::Stop => {
                    self.set_next_run_at(None);
                    return Ok(());
                }
            }
        }
    }

    async fn armed(&self, schedule: Schedule) -> Wake {
        info!("Scheduler armed: every {}", schedule);

        loop {
            let Some(next) = schedule.next_after(Utc::now()) else {
                error!("Schedule {} has no upcoming run", schedule);
                return Wake::Stop;
            };
            self.set_next_run_at(Some(next));
            let wait = (next - Utc::now()).to_std().unwrap_or_default();

            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    self.trigger().await;

                    match self.pipeline.settings().load() {
                        Ok(s) if !s.parser.enabled => {
                            info!("Scheduler disabled, stopping");
                            return Wake::Stop;
                        }
                        Ok(s) if s.parser.schedule != schedule => {
                            info!("Schedule changed to {}, re-arming", s.parser.schedule);
                            return Wake::Rearm;
                        }
                        Ok(_) => {}
                        Err(e) => warn!("Could not reload settings: {}", e),
                    }
                }
                _ = self.rearm.notified() => return Wake::Rearm,
                _ = self.shutdown.notified() => {
                    info!("Scheduler shutting down");
                    return Wake::Stop;
                }
            }
        }
    }
}

/// Resolve once SIGINT or SIGTERM arrives.
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => {},
                    _ = sigint.recv() => {},
                }
            }
            _ => {
                warn!("Could not install signal handlers, falling back to ctrl-c");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
