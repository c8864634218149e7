//! Chart/dimension model of a collection job and the engine that keeps the
//! receiving agent's view of it in sync.
//!
//! Modules declare [`Charts`] and mutate them through a shared
//! [`ChartHandle`]; every cycle the job hands the collected [`Metrics`] to a
//! [`ChartSync`], which emits only the protocol deltas the receiver needs:
//!
//! - definitions for charts it has not seen yet (or asked to be redefined),
//! - one obsolete definition for every chart or dimension marked for removal,
//! - `BEGIN`/`SET`/`END` blocks for every live chart.

mod chart;
mod collection;
mod handle;
mod sync;

pub use chart::{
    Algorithm, Chart, ChartOptions, ChartType, Dim, DimOptions, Label, LabelSource, Var,
};
pub use collection::{Charts, check_chart, check_charts};
pub use handle::ChartHandle;
pub use sync::{ChartSync, Metrics, SyncIdentity};
