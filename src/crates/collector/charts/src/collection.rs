//! Ordered chart collection and its validation rules.

use super::chart::{Chart, check_id};
use collector_error::{CollectorError, Result};
use std::collections::HashSet;

/// The charts a module declares, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct Charts {
    charts: Vec<Chart>,
}

impl Charts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add charts after validating them. Fails on the first invalid or
    /// duplicate chart; charts before it are kept.
    pub fn add(&mut self, charts: impl IntoIterator<Item = Chart>) -> Result<()> {
        for chart in charts {
            check_chart(&chart)?;
            if self.has(&chart.id) {
                return Err(CollectorError::chart(format!(
                    "chart '{}' already exists",
                    chart.id
                )));
            }
            self.charts.push(chart);
        }
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Chart> {
        self.charts.iter().find(|c| c.id == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Chart> {
        self.charts.iter_mut().find(|c| c.id == id)
    }

    pub fn has(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.charts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.charts.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Chart> {
        self.charts.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Chart> {
        self.charts.iter_mut()
    }

    /// Deep copy with lifecycle flags reset, for modules that keep chart templates.
    pub fn copy(&self) -> Self {
        Self {
            charts: self.charts.iter().map(Chart::copy).collect(),
        }
    }

    pub(crate) fn retain(&mut self, f: impl FnMut(&Chart) -> bool) {
        self.charts.retain(f);
    }
}

impl FromIterator<Chart> for Charts {
    /// Collects without validation; run [`check_charts`] before use.
    fn from_iter<I: IntoIterator<Item = Chart>>(iter: I) -> Self {
        Self {
            charts: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Charts {
    type Item = &'a Chart;
    type IntoIter = std::slice::Iter<'a, Chart>;

    fn into_iter(self) -> Self::IntoIter {
        self.charts.iter()
    }
}

/// Validate a single chart definition.
pub fn check_chart(chart: &Chart) -> Result<()> {
    check_id(&chart.id).map_err(|e| CollectorError::chart(format!("chart: {e}")))?;
    if chart.title.is_empty() {
        return Err(CollectorError::chart(format!(
            "chart '{}': empty title",
            chart.id
        )));
    }
    if chart.units.is_empty() {
        return Err(CollectorError::chart(format!(
            "chart '{}': empty units",
            chart.id
        )));
    }

    let mut seen = HashSet::new();
    for dim in &chart.dims {
        check_id(&dim.id)
            .map_err(|e| CollectorError::chart(format!("chart '{}': dim: {e}", chart.id)))?;
        if !seen.insert(dim.id.as_str()) {
            return Err(CollectorError::chart(format!(
                "chart '{}': duplicate dim '{}'",
                chart.id, dim.id
            )));
        }
    }

    seen.clear();
    for var in &chart.vars {
        check_id(&var.id)
            .map_err(|e| CollectorError::chart(format!("chart '{}': var: {e}", chart.id)))?;
        if !seen.insert(var.id.as_str()) {
            return Err(CollectorError::chart(format!(
                "chart '{}': duplicate var '{}'",
                chart.id, var.id
            )));
        }
    }

    Ok(())
}

/// Validate a whole collection: every chart valid, chart ids unique.
pub fn check_charts(charts: &Charts) -> Result<()> {
    let mut seen = HashSet::new();
    for chart in charts {
        check_chart(chart)?;
        if !seen.insert(chart.id.as_str()) {
            return Err(CollectorError::chart(format!(
                "duplicate chart '{}'",
                chart.id
            )));
        }
    }
    Ok(())
}
