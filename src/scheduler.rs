//! Periodic refresh of the selected cost source

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::MAX_REFRESH_INTERVAL_SECS;
use crate::error::{CostError, Result};
use crate::sources::{CostSnapshot, CostSource};

/// Display target for refreshed snapshots
pub trait SnapshotSink: Send + Sync {
    fn deliver(&self, snapshot: &CostSnapshot);

    /// Called when a tick fails; the previous snapshot stays on display
    fn report_error(&self, _error: &CostError) {}
}

enum State {
    Idle,
    Running(JoinHandle<()>),
    Stopped,
}

/// Invokes a source on a fixed interval, one invocation at a time.
///
/// The first tick fires immediately after [`start`](Self::start). Ticks that
/// come due while an invocation is still running are skipped.
pub struct PollScheduler {
    source: Arc<dyn CostSource>,
    sink: Arc<dyn SnapshotSink>,
    interval: Duration,
    latest: Arc<RwLock<Option<CostSnapshot>>>,
    initial: Option<CostSnapshot>,
    cancel: CancellationToken,
    state: State,
}

impl PollScheduler {
    pub fn new(
        source: Arc<dyn CostSource>,
        sink: Arc<dyn SnapshotSink>,
        interval: Duration,
    ) -> Result<Self> {
        if interval.is_zero() || interval > Duration::from_secs(MAX_REFRESH_INTERVAL_SECS) {
            return Err(CostError::Config(format!(
                "refresh interval must be between 1 and {MAX_REFRESH_INTERVAL_SECS} seconds"
            )));
        }
        Ok(Self {
            source,
            sink,
            interval,
            latest: Arc::new(RwLock::new(None)),
            initial: None,
            cancel: CancellationToken::new(),
            state: State::Idle,
        })
    }

    /// Seed with an already fetched snapshot (the selector's probe). It is
    /// delivered on start and the first fetch waits one full interval.
    pub fn with_initial_snapshot(mut self, snapshot: CostSnapshot) -> Self {
        self.latest = Arc::new(RwLock::new(Some(snapshot.clone())));
        self.initial = Some(snapshot);
        self
    }

    pub fn start(&mut self) -> Result<()> {
        match self.state {
            State::Running(_) => return Err(CostError::Scheduler("already running".into())),
            State::Stopped => return Err(CostError::Scheduler("scheduler was stopped".into())),
            State::Idle => {}
        }

        tracing::info!(
            source = self.source.kind().as_str(),
            interval_secs = self.interval.as_secs_f64(),
            "Starting refresh loop"
        );

        let now = Instant::now();
        let first_tick = match &self.initial {
            Some(_) => now.checked_add(self.interval).ok_or_else(|| {
                CostError::Config("refresh interval overflows the clock".into())
            })?,
            None => now,
        };
        if let Some(snapshot) = self.initial.take() {
            self.sink.deliver(&snapshot);
        }
        let handle = tokio::spawn(run_loop(
            self.source.clone(),
            self.sink.clone(),
            self.latest.clone(),
            first_tick,
            self.interval,
            self.cancel.clone(),
        ));
        self.state = State::Running(handle);
        Ok(())
    }

    /// Stop polling. An invocation still in flight is dropped and its
    /// result never reaches the sink.
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        if let State::Running(handle) = std::mem::replace(&mut self.state, State::Stopped) {
            if let Err(e) = handle.await {
                tracing::warn!("Refresh loop ended abnormally: {}", e);
            }
            tracing::info!("Refresh loop stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, State::Running(_))
    }

    /// Most recent successful snapshot
    pub async fn latest(&self) -> Option<CostSnapshot> {
        self.latest.read().await.clone()
    }
}

impl Drop for PollScheduler {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_loop(
    source: Arc<dyn CostSource>,
    sink: Arc<dyn SnapshotSink>,
    latest: Arc<RwLock<Option<CostSnapshot>>>,
    first_tick: Instant,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(first_tick, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        // Awaited inline: the next tick cannot fire until this one finishes
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = source.fetch() => result,
        };

        match result {
            Ok(snapshot) => {
                tracing::debug!(
                    total = snapshot.month_to_date_total(),
                    services = snapshot.top_services().len(),
                    "Refreshed costs"
                );
                *latest.write().await = Some(snapshot.clone());
                sink.deliver(&snapshot);
            }
            Err(e) => {
                tracing::warn!("Refresh failed for {}: {}", source.kind().as_str(), e);
                sink.report_error(&e);
            }
        }
    }
}
