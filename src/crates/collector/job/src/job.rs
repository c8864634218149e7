//! A single collection job: auto-detection, the tick-driven run loop and
//! orderly shutdown.

use crate::config::ResolvedJobConfig;
use crate::module::{Module, ModuleContext, guarded, guarded_sync};
use collector_charts::{ChartHandle, ChartSync, Charts, Metrics, SyncIdentity, check_charts};
use collector_error::Result;
use collector_protocol::OutputSink;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tokio::sync::mpsc::error::TrySendError;
use tracing::{Instrument, Span, debug, error, info, warn};

/// Consecutive failures per penalty step
const PENALTY_STEP: u64 = 5;
/// Upper bound of the penalty, in ticks
const MAX_PENALTY: u64 = 600;

/// Extra ticks a job waits between runs after `retries` consecutive
/// unsuccessful cycles: grows every [`PENALTY_STEP`] failures, capped at
/// [`MAX_PENALTY`].
pub fn penalty(retries: u64, update_every: u64) -> u64 {
    let steps = retries / PENALTY_STEP * PENALTY_STEP;
    (steps.saturating_mul(update_every) / 2).min(MAX_PENALTY)
}

/// How many more failed checks auto-detection may absorb.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryBudget {
    Unlimited,
    Remaining(u64),
}

impl RetryBudget {
    /// Negative counts mean unlimited.
    pub fn from_tries(tries: i64) -> Self {
        u64::try_from(tries).map_or(Self::Unlimited, Self::Remaining)
    }

    fn consume(&mut self) {
        if let Self::Remaining(n) = self {
            *n = n.saturating_sub(1);
        }
    }

    fn allows_retry(self) -> bool {
        match self {
            Self::Unlimited => true,
            Self::Remaining(n) => n > 0,
        }
    }
}

/// Cloneable control surface of a [`Job`], usable while the job's loop runs
/// in another task.
#[derive(Debug, Clone)]
pub struct JobHandle {
    full_name: Arc<str>,
    tick_tx: mpsc::Sender<u64>,
    stop_tx: mpsc::Sender<oneshot::Sender<()>>,
    running: Arc<AtomicBool>,
}

impl JobHandle {
    /// Deliver a tick without blocking. At most one tick waits while a run
    /// is in progress; further ticks are dropped.
    pub fn tick(&self, clock: u64) {
        match self.tick_tx.try_send(clock) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                debug!(
                    job = %self.full_name,
                    clock, "skip the tick due to previous run hasn't been finished"
                );
            }
            Err(TrySendError::Closed(_)) => {}
        }
    }

    /// Ask the loop to stop and wait until shutdown has fully completed:
    /// module cleanup done and every chart retired.
    ///
    /// A request made before the loop starts is handled as soon as it does.
    /// Returns immediately once the loop has finished or the job was dropped.
    pub async fn stop(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.stop_tx.send(ack_tx).await.is_err() {
            return;
        }
        let _ = ack_rx.await;
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn full_name(&self) -> &str {
        &self.full_name
    }
}

/// Drives one configured [`Module`].
///
/// Call [`Job::auto_detection`] until it succeeds or
/// [`Job::retry_auto_detection`] turns false, then run [`Job::start`] in its
/// own task and feed it through a [`JobHandle`]:
///
/// ```ignore
/// let handle = job.handle();
/// let task = tokio::spawn(async move {
///     job.start().await;
///     job
/// });
/// handle.tick(0);
/// handle.stop().await;
/// ```
pub struct Job {
    config: ResolvedJobConfig,
    full_name: String,

    module: Box<dyn Module>,
    charts: ChartHandle<Charts>,
    sync: ChartSync,
    sink: OutputSink,
    span: Span,

    initialized: bool,
    panicked: bool,
    retries: u64,
    prev_run: Option<Instant>,
    autodetection_every: u64,
    autodetection_budget: RetryBudget,

    handle: JobHandle,
    tick_rx: mpsc::Receiver<u64>,
    stop_rx: mpsc::Receiver<oneshot::Sender<()>>,
}

impl Job {
    pub fn new(config: ResolvedJobConfig, module: Box<dyn Module>, sink: OutputSink) -> Self {
        let full_name = config.full_name();
        let span = tracing::info_span!(
            "job",
            plugin = %config.plugin_name,
            module = %config.module,
            job = %config.name,
        );
        let sync = ChartSync::new(
            SyncIdentity {
                plugin_name: config.plugin_name.clone(),
                module_name: config.module.clone(),
                full_name: full_name.clone(),
                update_every: config.update_every,
            },
            config.priority,
        );

        let (tick_tx, tick_rx) = mpsc::channel(1);
        let (stop_tx, stop_rx) = mpsc::channel(1);
        let handle = JobHandle {
            full_name: Arc::from(full_name.as_str()),
            tick_tx,
            stop_tx,
            running: Arc::new(AtomicBool::new(false)),
        };

        Self {
            autodetection_every: config.autodetection_retry,
            autodetection_budget: RetryBudget::from_tries(config.autodetection_tries),
            config,
            full_name,
            module,
            charts: ChartHandle::default(),
            sync,
            sink,
            span,
            initialized: false,
            panicked: false,
            retries: 0,
            prev_run: None,
            handle,
            tick_rx,
            stop_rx,
        }
    }

    pub fn handle(&self) -> JobHandle {
        self.handle.clone()
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn module_name(&self) -> &str {
        &self.config.module
    }

    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn plugin_name(&self) -> &str {
        &self.config.plugin_name
    }

    pub fn update_every(&self) -> u64 {
        self.config.update_every
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Whether the last collection cycle, auto-detection or cleanup panicked
    pub fn panicked(&self) -> bool {
        self.panicked
    }

    /// Consecutive unsuccessful cycles
    pub fn retries(&self) -> u64 {
        self.retries
    }

    /// Seconds to wait before the next auto-detection attempt
    pub fn auto_detection_every(&self) -> u64 {
        self.autodetection_every
    }

    pub fn retry_auto_detection(&self) -> bool {
        self.autodetection_every > 0 && self.autodetection_budget.allows_retry()
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_running()
    }

    /// Current penalty in ticks
    pub fn penalty(&self) -> u64 {
        penalty(self.retries, self.config.update_every)
    }

    /// Run init (once), check and the chart sanity check. On any failure the
    /// module is cleaned up; whether another attempt makes sense is reported
    /// by [`Job::retry_auto_detection`].
    pub async fn auto_detection(&mut self) -> bool {
        let span = self.span.clone();
        async {
            let ok = match self.detect().await {
                Ok(ok) => ok,
                Err(err) => {
                    error!(error = %err, "auto-detection aborted");
                    self.panicked = true;
                    self.disable_auto_detection();
                    false
                }
            };
            if !ok {
                self.cleanup_module().await;
            }
            ok
        }
        .instrument(span)
        .await
    }

    async fn detect(&mut self) -> Result<bool> {
        if !self.init().await? {
            error!("init failed");
            self.disable_auto_detection();
            return Ok(false);
        }

        if !self.check().await? {
            error!("check failed");
            return Ok(false);
        }
        info!("check success");

        if !self.post_check()? {
            error!("charts check failed");
            self.disable_auto_detection();
            return Ok(false);
        }

        Ok(true)
    }

    async fn init(&mut self) -> Result<bool> {
        if self.initialized {
            return Ok(true);
        }
        let ctx = ModuleContext {
            logger: self.span.clone(),
            job_name: self.config.name.clone(),
            full_name: self.full_name.clone(),
        };
        self.initialized = guarded(self.module.init(&ctx)).await?;
        Ok(self.initialized)
    }

    async fn check(&mut self) -> Result<bool> {
        let ok = guarded(self.module.check()).await?;
        if !ok {
            self.autodetection_budget.consume();
        }
        Ok(ok)
    }

    fn post_check(&mut self) -> Result<bool> {
        let Some(charts) = guarded_sync(|| self.module.charts())? else {
            error!("module returned no charts");
            return Ok(false);
        };
        if let Err(err) = check_charts(&charts.read()) {
            error!(error = %err, "invalid charts");
            return Ok(false);
        }
        self.charts = charts;
        Ok(true)
    }

    fn disable_auto_detection(&mut self) {
        self.autodetection_every = 0;
    }

    /// The run loop. Returns after a stop request has been fully handled;
    /// a job's loop runs once.
    pub async fn start(&mut self) {
        let span = self.span.clone();
        async {
            self.handle.running.store(true, Ordering::SeqCst);
            info!(
                update_every = self.config.update_every,
                "started, data collection interval {}s", self.config.update_every
            );

            let ack = loop {
                tokio::select! {
                    biased;
                    ack = self.stop_rx.recv() => break ack,
                    Some(clock) = self.tick_rx.recv() => {
                        if clock % (self.config.update_every + self.penalty()) == 0 {
                            self.run_once().await;
                        }
                    }
                }
            };

            self.cleanup_module().await;
            self.retire_charts().await;
            self.handle.running.store(false, Ordering::SeqCst);
            info!("stopped");

            if let Some(ack) = ack {
                let _ = ack.send(());
            }
            // Late stop requests would otherwise wait forever.
            self.stop_rx.close();
            while let Ok(ack) = self.stop_rx.try_recv() {
                let _ = ack.send(());
            }
        }
        .instrument(span)
        .await
    }

    async fn run_once(&mut self) {
        let started = Instant::now();
        let since_last_run = self
            .prev_run
            .map_or(Duration::ZERO, |prev| started.duration_since(prev));
        self.prev_run = Some(started);
        self.panicked = false;

        let metrics: Metrics = match guarded(self.module.collect()).await {
            Ok(metrics) => metrics,
            Err(err) => {
                error!(error = %err, "collect aborted");
                self.panicked = true;
                return;
            }
        };

        let updated = {
            let mut charts = self.charts.write();
            self.sync.process(&mut charts, &metrics, started, since_last_run)
        };

        if updated {
            self.retries = 0;
        } else {
            self.retries += 1;
            debug!(retries = self.retries, "no chart was updated");
        }

        self.flush().await;
    }

    async fn cleanup_module(&mut self) {
        if let Err(err) = guarded(self.module.cleanup()).await {
            error!(error = %err, "cleanup aborted");
            self.panicked = true;
        }
    }

    async fn retire_charts(&mut self) {
        {
            let mut charts = self.charts.write();
            self.sync.retire(Some(&mut charts));
        }
        self.flush().await;
    }

    async fn flush(&mut self) {
        if let Err(err) = self.sink.write_block(self.sync.output()).await {
            warn!(error = %err, "failed to write chart data");
        }
        self.sync.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_penalty_grows_in_steps() {
        assert_eq!(penalty(0, 1), 0);
        assert_eq!(penalty(4, 1), 0);
        assert_eq!(penalty(5, 1), 2);
        assert_eq!(penalty(9, 1), 2);
        assert_eq!(penalty(10, 1), 5);
        assert_eq!(penalty(10, 10), 50);
    }

    #[test]
    fn test_penalty_is_monotonic_and_capped() {
        let mut last = 0;
        for retries in 0..10_000 {
            let p = penalty(retries, 3);
            assert!(p >= last);
            assert!(p <= MAX_PENALTY);
            last = p;
        }
        assert_eq!(penalty(10_000, 1), MAX_PENALTY);
        assert_eq!(penalty(u64::MAX, u64::MAX), MAX_PENALTY);
    }

    #[test]
    fn test_retry_budget() {
        assert_eq!(RetryBudget::from_tries(-1), RetryBudget::Unlimited);
        assert_eq!(RetryBudget::from_tries(2), RetryBudget::Remaining(2));

        let mut budget = RetryBudget::Remaining(1);
        assert!(budget.allows_retry());
        budget.consume();
        assert!(!budget.allows_retry());
        budget.consume();
        assert_eq!(budget, RetryBudget::Remaining(0));

        let mut unlimited = RetryBudget::Unlimited;
        unlimited.consume();
        assert!(unlimited.allows_retry());
    }
}
