//! Per-channel report assembly.
//!
//! Rows arrive one per epoch; the report is their transpose: one row per
//! metric, one column per event label, so each experimental condition sits
//! in its own spreadsheet column / chart bar.
use ndarray::{Array2, ArrayView1};
use serde::ser::{SerializeStruct, Serializer};
use serde::Serialize;

use crate::aggregate::AnalysisRow;
use crate::error::{PipelineError, Result};

/// Metrics × labels table for one channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub channel: String,
    /// Row axis.
    pub metrics: Vec<String>,
    /// Column axis.
    pub labels: Vec<String>,
    /// `[metrics, labels]`; NaN where an epoch did not produce a metric.
    pub values: Array2<f64>,
}

/// Concatenate `rows` and transpose so labels become columns.
///
/// Metric rows follow first-appearance order across the input rows; a metric
/// missing from some epoch is NaN there.
///
/// # Errors
///
/// [`PipelineError::EmptyReport`] when `rows` is empty.
pub fn assemble(channel: &str, rows: Vec<AnalysisRow>) -> Result<Report> {
    if rows.is_empty() {
        return Err(PipelineError::EmptyReport(channel.to_string()));
    }

    let mut metrics: Vec<String> = Vec::new();
    for row in &rows {
        for (name, _) in &row.metrics {
            if !metrics.contains(name) {
                metrics.push(name.clone());
            }
        }
    }

    let labels: Vec<String> = rows.iter().map(|r| r.label.clone()).collect();
    let mut values = Array2::from_elem((metrics.len(), rows.len()), f64::NAN);
    for (col, row) in rows.iter().enumerate() {
        for (name, v) in &row.metrics {
            if let Some(m) = metrics.iter().position(|x| x == name) {
                values[[m, col]] = *v;
            }
        }
    }

    Ok(Report { channel: channel.to_string(), metrics, labels, values })
}

impl Report {
    pub fn metric_row(&self, metric: &str) -> Option<ArrayView1<'_, f64>> {
        let idx = self.metrics.iter().position(|m| m == metric)?;
        Some(self.values.row(idx))
    }

    pub fn value(&self, metric: &str, label: &str) -> Option<f64> {
        let col = self.labels.iter().position(|l| l == label)?;
        self.metric_row(metric).map(|row| row[col])
    }

    /// Keep only the listed metric rows, in the order given.  Unknown names
    /// are ignored; an empty list keeps everything.
    pub fn select<S: AsRef<str>>(&self, wanted: &[S]) -> Report {
        if wanted.is_empty() {
            return self.clone();
        }
        let idx: Vec<usize> = wanted
            .iter()
            .filter_map(|w| self.metrics.iter().position(|m| m == w.as_ref()))
            .collect();
        let mut values = Array2::from_elem((idx.len(), self.labels.len()), f64::NAN);
        for (dst, &src) in idx.iter().enumerate() {
            values.row_mut(dst).assign(&self.values.row(src));
        }
        Report {
            channel: self.channel.clone(),
            metrics: idx.iter().map(|&i| self.metrics[i].clone()).collect(),
            labels: self.labels.clone(),
            values,
        }
    }
}

impl Serialize for Report {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        // NaN is not valid JSON; missing cells serialize as null.
        let rows: Vec<Vec<Option<f64>>> = self
            .values
            .rows()
            .into_iter()
            .map(|r| r.iter().map(|&v| v.is_finite().then_some(v)).collect())
            .collect();
        let mut st = serializer.serialize_struct("Report", 4)?;
        st.serialize_field("channel", &self.channel)?;
        st.serialize_field("metrics", &self.metrics)?;
        st.serialize_field("labels", &self.labels)?;
        st.serialize_field("values", &rows)?;
        st.end()
    }
}
