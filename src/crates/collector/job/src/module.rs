//! The capability every collector implements, and the fault boundary the
//! job wraps around it.

use async_trait::async_trait;
use collector_charts::{ChartHandle, Charts, Metrics};
use collector_error::{CollectorError, Result};
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tracing::Span;

/// What a module learns about the job running it.
#[derive(Debug, Clone)]
pub struct ModuleContext {
    /// The job's logging span; enter it (or use `Instrument`) for module logs
    pub logger: Span,
    pub job_name: String,
    pub full_name: String,
}

/// A collector implementation driven by a [`Job`](crate::Job).
///
/// Every call is made from the job's run loop, one at a time. A panic in any
/// of them is caught by the job and treated as a failure.
///
/// # Example
///
/// ```ignore
/// struct Uptime {
///     charts: ChartHandle<Charts>,
/// }
///
/// #[async_trait]
/// impl Module for Uptime {
///     async fn init(&mut self, _ctx: &ModuleContext) -> bool {
///         true
///     }
///
///     async fn check(&mut self) -> bool {
///         true
///     }
///
///     fn charts(&self) -> Option<ChartHandle<Charts>> {
///         Some(self.charts.clone())
///     }
///
///     async fn collect(&mut self) -> Metrics {
///         Metrics::from([("uptime".to_string(), read_uptime())])
///     }
///
///     async fn cleanup(&mut self) {}
/// }
/// ```
#[async_trait]
pub trait Module: Send + 'static {
    /// Acquire resources and validate configuration. A failure here is permanent.
    async fn init(&mut self, ctx: &ModuleContext) -> bool;

    /// Cheap reachability probe. A failure here is retried.
    async fn check(&mut self) -> bool;

    /// The chart collection, shared with the job for the job's lifetime.
    /// `None` fails auto-detection.
    fn charts(&self) -> Option<ChartHandle<Charts>>;

    /// Collect this cycle's metrics. Missing keys mean "no value".
    async fn collect(&mut self) -> Metrics;

    /// Release resources.
    async fn cleanup(&mut self);
}

/// Run a module future, turning a panic into [`CollectorError::ModuleFault`].
pub(crate) async fn guarded<F, T>(fut: F) -> Result<T>
where
    F: Future<Output = T>,
{
    AssertUnwindSafe(fut)
        .catch_unwind()
        .await
        .map_err(|payload| CollectorError::ModuleFault {
            message: panic_message(payload.as_ref()),
        })
}

/// Synchronous counterpart of [`guarded`].
pub(crate) fn guarded_sync<F, T>(f: F) -> Result<T>
where
    F: FnOnce() -> T,
{
    std::panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| {
        CollectorError::ModuleFault {
            message: panic_message(payload.as_ref()),
        }
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        String::from("unknown panic payload")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_guarded_passes_values_through() {
        assert_eq!(guarded(async { 42 }).await.unwrap(), 42);
        assert_eq!(guarded_sync(|| "ok").unwrap(), "ok");
    }

    #[tokio::test]
    async fn test_guarded_catches_panics() {
        let err = guarded(async {
            panic!("collector exploded");
        })
        .await
        .map(|()| ())
        .unwrap_err();
        assert!(matches!(
            err,
            CollectorError::ModuleFault { ref message } if message == "collector exploded"
        ));

        let value = 7;
        let err = guarded_sync(|| -> u32 { panic!("bad value {value}") }).unwrap_err();
        assert_eq!(err.to_string(), "module fault: bad value 7");
    }
}
