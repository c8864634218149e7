//! Chart, dimension and variable model.

use collector_error::{CollectorError, Result};
use std::fmt;

/// Chart type supported by the agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChartType {
    #[default]
    Line,
    Area,
    Stacked,
    Heatmap,
}

impl ChartType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChartType::Line => "line",
            ChartType::Area => "area",
            ChartType::Stacked => "stacked",
            ChartType::Heatmap => "heatmap",
        }
    }
}

/// Dimension algorithm for value processing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Algorithm {
    /// Store the value as-is
    #[default]
    Absolute,
    /// Calculate difference from previous value (for counters)
    Incremental,
    /// Calculate percentage of dimension relative to row total
    PercentageOfAbsoluteRow,
    /// Calculate percentage of dimension relative to incremental row
    PercentageOfIncrementalRow,
}

impl Algorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Absolute => "absolute",
            Algorithm::Incremental => "incremental",
            Algorithm::PercentageOfAbsoluteRow => "percentage-of-absolute-row",
            Algorithm::PercentageOfIncrementalRow => "percentage-of-incremental-row",
        }
    }
}

/// Chart options emitted in the CHART command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChartOptions {
    pub obsolete: bool,
    pub detail: bool,
    pub store_first: bool,
    pub hidden: bool,
}

impl fmt::Display for ChartOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_flags(
            f,
            &[
                (self.obsolete, "obsolete"),
                (self.detail, "detail"),
                (self.store_first, "store_first"),
                (self.hidden, "hidden"),
            ],
        )
    }
}

/// Dimension options emitted in the DIMENSION command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DimOptions {
    pub obsolete: bool,
    pub hidden: bool,
    pub no_reset: bool,
    pub no_overflow: bool,
}

impl fmt::Display for DimOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_flags(
            f,
            &[
                (self.obsolete, "obsolete"),
                (self.hidden, "hidden"),
                (self.no_reset, "noreset"),
                (self.no_overflow, "nooverflow"),
            ],
        )
    }
}

fn write_flags(f: &mut fmt::Formatter<'_>, flags: &[(bool, &str)]) -> fmt::Result {
    let mut first = true;
    for (_, name) in flags.iter().filter(|(set, _)| *set) {
        if !first {
            f.write_str(" ")?;
        }
        f.write_str(name)?;
        first = false;
    }
    Ok(())
}

/// Where a chart label came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LabelSource {
    #[default]
    Auto,
    Conf,
    K8s,
}

impl LabelSource {
    pub fn as_u8(&self) -> u8 {
        match self {
            LabelSource::Auto => 1,
            LabelSource::Conf => 2,
            LabelSource::K8s => 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
    pub key: String,
    pub value: String,
    pub source: LabelSource,
}

/// One numeric series within a chart
#[derive(Debug, Clone, PartialEq)]
pub struct Dim {
    /// Dimension ID, also the metric key looked up in each snapshot
    pub id: String,
    /// Display name (shown in UI)
    pub name: String,
    pub algorithm: Algorithm,
    /// Zero is emitted as 1
    pub multiplier: i64,
    /// Zero is emitted as 1
    pub divisor: i64,
    pub options: DimOptions,
    pub(crate) remove: bool,
}

impl Dim {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            algorithm: Algorithm::default(),
            multiplier: 1,
            divisor: 1,
            options: DimOptions::default(),
            remove: false,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn with_multiplier(mut self, multiplier: i64) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn with_divisor(mut self, divisor: i64) -> Self {
        self.divisor = divisor;
        self
    }

    /// Whether the dimension waits for its one-time removal emission
    pub fn is_removed(&self) -> bool {
        self.remove
    }
}

/// Chart-scoped variable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Var {
    /// Variable ID, also the metric key looked up in each snapshot
    pub id: String,
    /// Value announced with the chart definition
    pub value: i64,
}

impl Var {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            value: 0,
        }
    }
}

/// A named, typed group of related metric series.
///
/// Public fields describe the chart; the lifecycle flags are owned by the
/// synchronization engine and only change through the `mark_*` methods.
#[derive(Debug, Clone, Default)]
pub struct Chart {
    pub id: String,
    /// Overrides the chart type part of `type.id` (defaults to the job's full name)
    pub type_id: Option<String>,
    /// Optional display name override
    pub name: String,
    pub title: String,
    pub units: String,
    pub family: String,
    pub context: String,
    pub chart_type: ChartType,
    /// Zero means "assign the next job priority on creation"
    pub priority: i64,
    pub options: ChartOptions,
    pub labels: Vec<Label>,
    pub dims: Vec<Dim>,
    pub vars: Vec<Var>,

    pub(crate) created: bool,
    pub(crate) redefine: bool,
    pub(crate) ignore: bool,
    pub(crate) remove: bool,
    pub(crate) updated: bool,
    pub(crate) retries: u64,
}

impl Chart {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_units(mut self, units: impl Into<String>) -> Self {
        self.units = units.into();
        self
    }

    pub fn with_family(mut self, family: impl Into<String>) -> Self {
        self.family = family.into();
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    pub fn with_type(mut self, chart_type: ChartType) -> Self {
        self.chart_type = chart_type;
        self
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_dim(mut self, dim: Dim) -> Self {
        self.dims.push(dim);
        self
    }

    pub fn with_var(mut self, var: Var) -> Self {
        self.vars.push(var);
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.push(Label {
            key: key.into(),
            value: value.into(),
            source: LabelSource::Auto,
        });
        self
    }

    /// Add a dimension. On an already created chart this requests a
    /// re-emission of the definition so the receiver learns about it.
    pub fn add_dim(&mut self, dim: Dim) -> Result<()> {
        check_id(&dim.id).map_err(|e| CollectorError::chart(format!("dim: {e}")))?;
        if self.has_dim(&dim.id) {
            return Err(CollectorError::chart(format!(
                "chart '{}': dim '{}' already exists",
                self.id, dim.id
            )));
        }
        self.dims.push(dim);
        if self.created {
            self.redefine = true;
        }
        Ok(())
    }

    /// Add a variable. Same redefinition rule as [`Chart::add_dim`].
    pub fn add_var(&mut self, var: Var) -> Result<()> {
        check_id(&var.id).map_err(|e| CollectorError::chart(format!("var: {e}")))?;
        if self.vars.iter().any(|v| v.id == var.id) {
            return Err(CollectorError::chart(format!(
                "chart '{}': var '{}' already exists",
                self.id, var.id
            )));
        }
        self.vars.push(var);
        if self.created {
            self.redefine = true;
        }
        Ok(())
    }

    pub fn get_dim(&self, id: &str) -> Option<&Dim> {
        self.dims.iter().find(|d| d.id == id)
    }

    pub fn has_dim(&self, id: &str) -> bool {
        self.get_dim(id).is_some()
    }

    /// Retire a dimension: it is announced as obsolete once, then pruned.
    pub fn mark_dim_remove(&mut self, id: &str, hide: bool) -> Result<()> {
        let Some(dim) = self.dims.iter_mut().find(|d| d.id == id) else {
            return Err(CollectorError::chart(format!(
                "chart '{}': dim '{}' not found",
                self.id, id
            )));
        };
        dim.options.obsolete = true;
        dim.options.hidden = hide;
        dim.remove = true;
        self.redefine = true;
        Ok(())
    }

    /// Retire the whole chart: it is announced as obsolete once, then
    /// dropped from the collection.
    pub fn mark_remove(&mut self) {
        self.options.obsolete = true;
        self.remove = true;
        self.redefine = true;
    }

    /// Ask for the chart definition to be emitted again on the next cycle.
    pub fn mark_redefine(&mut self) {
        self.redefine = true;
    }

    /// Whether the receiver has been told about this chart (sticky)
    pub fn is_created(&self) -> bool {
        self.created
    }

    /// Whether the chart was permanently excluded (e.g. id too long)
    pub fn is_ignored(&self) -> bool {
        self.ignore
    }

    /// Whether the chart is waiting for its one-time removal emission
    pub fn is_removed(&self) -> bool {
        self.remove
    }

    /// Whether the last update refreshed at least one dimension
    pub fn is_updated(&self) -> bool {
        self.updated
    }

    /// Consecutive updates that refreshed no dimension
    pub fn retries(&self) -> u64 {
        self.retries
    }

    /// Whether the next creation pass has to emit this chart's definition
    pub(crate) fn needs_definition(&self) -> bool {
        !self.created || self.redefine
    }

    /// Deep copy with every lifecycle flag reset, for use as a template.
    pub fn copy(&self) -> Self {
        Self {
            id: self.id.clone(),
            type_id: self.type_id.clone(),
            name: self.name.clone(),
            title: self.title.clone(),
            units: self.units.clone(),
            family: self.family.clone(),
            context: self.context.clone(),
            chart_type: self.chart_type,
            priority: self.priority,
            options: self.options,
            labels: self.labels.clone(),
            dims: self
                .dims
                .iter()
                .map(|d| Dim {
                    remove: false,
                    ..d.clone()
                })
                .collect(),
            vars: self.vars.clone(),
            ..Default::default()
        }
    }
}

/// Ids become single-quoted protocol fields and metric keys.
pub(crate) fn check_id(id: &str) -> std::result::Result<(), String> {
    if id.is_empty() {
        return Err("empty id".to_string());
    }
    if let Some(c) = id.chars().find(|c| c.is_whitespace() || *c == '\'') {
        return Err(format!("unacceptable symbol in id '{id}': {c:?}"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cpu_chart() -> Chart {
        Chart::new("cpu")
            .with_title("CPU")
            .with_units("percentage")
            .with_dim(Dim::new("user"))
            .with_dim(Dim::new("system"))
    }

    #[test]
    fn test_options_display() {
        assert_eq!(ChartOptions::default().to_string(), "");
        let opts = ChartOptions {
            obsolete: true,
            hidden: true,
            ..Default::default()
        };
        assert_eq!(opts.to_string(), "obsolete hidden");

        let dim_opts = DimOptions {
            hidden: true,
            no_reset: true,
            ..Default::default()
        };
        assert_eq!(dim_opts.to_string(), "hidden noreset");
    }

    #[test]
    fn test_add_dim_rejects_duplicates_and_bad_ids() {
        let mut chart = cpu_chart();
        assert!(chart.add_dim(Dim::new("user")).is_err());
        assert!(chart.add_dim(Dim::new("bad id")).is_err());
        assert!(chart.add_dim(Dim::new("it's")).is_err());
        assert!(chart.add_dim(Dim::new("")).is_err());
        assert!(chart.add_dim(Dim::new("idle")).is_ok());
        assert_eq!(chart.dims.len(), 3);
    }

    #[test]
    fn test_add_dim_to_created_chart_requests_redefinition() {
        let mut chart = cpu_chart();
        chart.add_dim(Dim::new("idle")).unwrap();
        assert!(!chart.redefine);

        chart.created = true;
        chart.add_dim(Dim::new("iowait")).unwrap();
        assert!(chart.redefine);
        assert!(chart.needs_definition());
    }

    #[test]
    fn test_mark_dim_remove() {
        let mut chart = cpu_chart();
        chart.created = true;
        assert!(chart.mark_dim_remove("missing", false).is_err());

        chart.mark_dim_remove("system", true).unwrap();
        let dim = chart.get_dim("system").unwrap();
        assert!(dim.is_removed());
        assert!(dim.options.obsolete);
        assert!(dim.options.hidden);
        assert!(chart.needs_definition());
    }

    #[test]
    fn test_mark_remove() {
        let mut chart = cpu_chart();
        chart.created = true;
        chart.mark_remove();
        assert!(chart.is_removed());
        assert!(chart.options.obsolete);
        assert!(chart.needs_definition());
    }

    #[test]
    fn test_copy_resets_lifecycle() {
        let mut chart = cpu_chart();
        chart.created = true;
        chart.updated = true;
        chart.retries = 3;
        chart.mark_dim_remove("user", false).unwrap();

        let copy = chart.copy();
        assert!(!copy.is_created());
        assert!(!copy.is_updated());
        assert_eq!(copy.retries(), 0);
        assert!(!copy.get_dim("user").unwrap().is_removed());
        assert_eq!(copy.dims.len(), 2);
    }
}
