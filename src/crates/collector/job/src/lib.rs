//! Job scheduling for collector plugins.
//!
//! A [`Job`] binds one configured [`Module`] to the shared [`OutputSink`].
//! It runs auto-detection, then a loop driven by the plugin-wide [`Ticker`]:
//! on every tick it decides whether to run (honoring the failure penalty),
//! collects metrics, reconciles them with the module's charts and flushes
//! the resulting protocol block. Stopping a job retires every chart it
//! published.
//!
//! # Example
//!
//! ```no_run
//! use collector_job::{JobConfig, Registry, Ticker, init_tracing};
//! use collector_protocol::OutputSink;
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run(registry: Registry) -> collector_error::Result<()> {
//! init_tracing("info");
//!
//! let sink = OutputSink::stdout();
//! let mut job = registry.build_job(JobConfig::from_yaml_str("module: cpu")?, sink)?;
//! if !job.auto_detection().await {
//!     return Ok(());
//! }
//!
//! let handle = job.handle();
//! let runner = tokio::spawn(async move { job.start().await });
//!
//! let cancel = CancellationToken::new();
//! let ticker = tokio::spawn(
//!     Ticker::new(Duration::from_secs(1)).fan_out(vec![handle.clone()], cancel.clone()),
//! );
//!
//! tokio::time::sleep(Duration::from_secs(10)).await;
//! cancel.cancel();
//! handle.stop().await;
//! let _ = tokio::join!(runner, ticker);
//! # Ok(())
//! # }
//! ```

mod config;
mod job;
mod module;
mod registry;
mod ticker;
mod tracing_setup;

pub use collector_charts::Metrics;
pub use collector_protocol::OutputSink;
pub use config::{DEFAULT_PLUGIN_NAME, JobConfig, ModuleDefaults, ResolvedJobConfig};
pub use job::{Job, JobHandle, RetryBudget, penalty};
pub use module::{Module, ModuleContext};
pub use registry::{CreateFn, Creator, Registry};
pub use ticker::Ticker;
pub use tracing_setup::{JOURNAL_PATH_ENV, LogOutput, init_tracing};
