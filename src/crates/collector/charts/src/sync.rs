//! Per-cycle reconciliation of the chart model with a metrics snapshot.

use super::chart::{Chart, Dim};
use super::collection::Charts;
use collector_protocol::{
    ChartDefinition, DimensionDefinition, MAX_CHART_ID_LENGTH, ProtocolWriter,
};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Metric key to value, produced fresh by a module every cycle.
pub type Metrics = HashMap<String, i64>;

/// Priority of the self-monitoring execution time chart
const RUNTIME_CHART_PRIORITY: i64 = 145000;
/// Dimension of the execution time chart, fed the collection time in ms
const RUNTIME_CHART_DIM: &str = "time";

/// Names under which a job publishes its charts.
#[derive(Debug, Clone)]
pub struct SyncIdentity {
    pub plugin_name: String,
    pub module_name: String,
    /// Default chart type, `module` or `module_job`
    pub full_name: String,
    /// Collection frequency in seconds, announced in every chart definition
    pub update_every: u64,
}

/// Emits the protocol deltas that keep the receiver's view of a job's charts
/// in step with the job's model.
///
/// Output accumulates in an internal buffer, in order: definitions, then
/// updates, then the execution time chart's update. The owner flushes
/// [`ChartSync::output`] and calls [`ChartSync::clear`].
pub struct ChartSync {
    identity: SyncIdentity,
    next_priority: i64,
    runtime_chart: Chart,
    writer: ProtocolWriter,
}

impl ChartSync {
    /// `priority` is assigned to the first chart declared without one and
    /// incremented for each following one.
    pub fn new(identity: SyncIdentity, priority: i64) -> Self {
        let runtime_chart = runtime_chart(&identity.plugin_name, &identity.full_name);
        Self {
            identity,
            next_priority: priority,
            runtime_chart,
            writer: ProtocolWriter::new(),
        }
    }

    /// Run one synchronization cycle.
    ///
    /// `started` is when collection began, `since_last_run` the time since
    /// the previous cycle (zero on the first). Returns `true` iff at least
    /// one chart had a dimension refreshed.
    pub fn process(
        &mut self,
        charts: &mut Charts,
        metrics: &Metrics,
        started: Instant,
        since_last_run: Duration,
    ) -> bool {
        if !self.runtime_chart.created {
            let mut runtime = std::mem::take(&mut self.runtime_chart);
            self.create_chart(&mut runtime);
            self.runtime_chart = runtime;
        }

        for chart in charts.iter_mut() {
            if chart.needs_definition() {
                self.create_chart(chart);
            }
        }

        let mut updated = 0;
        for chart in charts.iter_mut() {
            if chart.remove || chart.options.obsolete || metrics.is_empty() {
                continue;
            }
            if self.update_chart(chart, metrics, since_last_run) {
                updated += 1;
            }
        }

        charts.retain(|chart| !chart.remove);

        if updated == 0 {
            return false;
        }

        let elapsed = started.elapsed().as_millis() as i64;
        let runtime_metrics = Metrics::from([(RUNTIME_CHART_DIM.to_string(), elapsed)]);
        let mut runtime = std::mem::take(&mut self.runtime_chart);
        self.update_chart(&mut runtime, &runtime_metrics, since_last_run);
        self.runtime_chart = runtime;

        true
    }

    /// Retire everything this job ever published, including the execution
    /// time chart. Each created chart gets exactly one obsolete definition.
    pub fn retire(&mut self, charts: Option<&mut Charts>) {
        if self.runtime_chart.created {
            let mut runtime = std::mem::take(&mut self.runtime_chart);
            runtime.mark_remove();
            self.create_chart(&mut runtime);
            self.runtime_chart = runtime;
        }

        let Some(charts) = charts else {
            return;
        };

        for chart in charts.iter_mut() {
            if chart.created {
                chart.mark_remove();
                self.create_chart(chart);
            }
        }
        charts.retain(|chart| !chart.remove);
    }

    /// Protocol output accumulated since the last [`ChartSync::clear`]
    pub fn output(&self) -> &[u8] {
        self.writer.buffer()
    }

    pub fn clear(&mut self) {
        self.writer.clear();
    }

    /// The self-monitoring execution time chart
    pub fn runtime_chart(&self) -> &Chart {
        &self.runtime_chart
    }

    fn type_id<'a>(&'a self, chart: &'a Chart) -> &'a str {
        chart.type_id.as_deref().unwrap_or(&self.identity.full_name)
    }

    fn create_chart(&mut self, chart: &mut Chart) {
        let was_created = chart.created;
        chart.created = true;
        chart.redefine = false;

        if !was_created {
            let qualified_len = self.type_id(chart).len() + 1 + chart.id.len();
            if qualified_len >= MAX_CHART_ID_LENGTH {
                warn!(
                    chart = %chart.id,
                    length = qualified_len,
                    max = MAX_CHART_ID_LENGTH,
                    "chart 'type.id' length exceeds the maximum allowed, the chart is ignored"
                );
                chart.ignore = true;
            }
        }

        if chart.ignore {
            return;
        }
        if chart.remove && !was_created {
            debug!(chart = %chart.id, "dropping chart removed before it was created");
            return;
        }

        if chart.priority == 0 {
            chart.priority = self.next_priority;
            self.next_priority += 1;
        }

        let type_id = self.type_id(chart).to_string();
        let options = chart.options.to_string();
        self.writer.chart(&ChartDefinition {
            type_id: &type_id,
            id: &chart.id,
            name: &chart.name,
            title: &chart.title,
            units: &chart.units,
            family: &chart.family,
            context: &chart.context,
            chart_type: chart.chart_type.as_str(),
            priority: chart.priority,
            update_every: self.identity.update_every,
            options: &options,
            plugin: &self.identity.plugin_name,
            module: &self.identity.module_name,
        });

        if chart.options.obsolete {
            self.writer.empty_line();
            return;
        }

        if !chart.labels.is_empty() {
            for label in &chart.labels {
                self.writer
                    .clabel(&label.key, &label.value, label.source.as_u8());
            }
            self.writer.clabel_commit();
        }

        for dim in &chart.dims {
            write_dimension(&mut self.writer, dim);
        }
        for var in &chart.vars {
            self.writer.variable(&var.id, var.value);
        }
        self.writer.empty_line();
    }

    fn update_chart(&mut self, chart: &mut Chart, metrics: &Metrics, since_last_run: Duration) -> bool {
        chart.dims.retain(|dim| !dim.remove);

        if chart.ignore {
            return false;
        }

        // no extrapolation on a chart's first active cycle
        let since_last = if chart.updated {
            since_last_run
        } else {
            Duration::ZERO
        };

        let type_id = self.type_id(chart).to_string();
        self.writer.begin(&type_id, &chart.id, since_last);

        let mut refreshed = 0;
        for dim in &chart.dims {
            match metrics.get(&dim.id) {
                Some(value) => {
                    self.writer.set(&dim.id, *value);
                    refreshed += 1;
                }
                None => self.writer.set_empty(&dim.id),
            }
        }
        for var in &chart.vars {
            if let Some(value) = metrics.get(&var.id) {
                self.writer.variable(&var.id, *value);
            }
        }
        self.writer.end();

        chart.updated = refreshed > 0;
        if chart.updated {
            chart.retries = 0;
        } else {
            chart.retries += 1;
        }
        chart.updated
    }
}

fn write_dimension(writer: &mut ProtocolWriter, dim: &Dim) {
    let options = dim.options.to_string();
    writer.dimension(&DimensionDefinition {
        id: &dim.id,
        name: &dim.name,
        algorithm: dim.algorithm.as_str(),
        multiplier: dim.multiplier,
        divisor: dim.divisor,
        options: &options,
    });
}

fn runtime_chart(plugin_name: &str, full_name: &str) -> Chart {
    let ctx = match plugin_name {
        "go.d" => "go",
        other => other,
    }
    .replace('.', "_");

    let mut chart = Chart::new(format!("execution_time_of_{full_name}"))
        .with_title(format!("Execution Time for {full_name}"))
        .with_units("ms")
        .with_family(plugin_name)
        .with_context(format!("netdata.{ctx}_plugin_execution_time"))
        .with_priority(RUNTIME_CHART_PRIORITY)
        .with_dim(Dim::new(RUNTIME_CHART_DIM));
    chart.type_id = Some("netdata".to_string());
    chart
}
