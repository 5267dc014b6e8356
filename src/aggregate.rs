//! Per-epoch aggregation.
//!
//! For each epoch the aggregator slices the processed table, hands the slice
//! to an [`EpochAnalysis`] and tags the returned row with the epoch label.
//! Empty slices are skipped with a [`DegenerateEpochWarning`]; analysis
//! failures abort with [`PipelineError::AnalysisFailure`].
use serde::Serialize;

use crate::epoch::EpochBounds;
use crate::error::{PipelineError, Result};
use crate::signal::{EpochSlice, SignalTable};

/// Named scalar metrics computed over one epoch.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct AnalysisRow {
    /// Epoch label; set by the aggregator.
    pub label: String,
    /// Metric name → value, in the order the analysis produced them.
    pub metrics: Vec<(String, f64)>,
}

impl AnalysisRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, value: f64) {
        self.metrics.push((name.into(), value));
    }

    pub fn with(mut self, name: impl Into<String>, value: f64) -> Self {
        self.push(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.metrics.iter().find(|(n, _)| n == name).map(|(_, v)| *v)
    }
}

/// An analysis run over one epoch slice, e.g. interval-related ECG metrics.
///
/// Implementations come from an external signal-processing library or the
/// built-ins in [`crate::processing`].  Errors are reported back as
/// [`PipelineError::AnalysisFailure`] tagged with the epoch label.
pub trait EpochAnalysis: Send + Sync {
    fn analyze(&self, epoch: &EpochSlice<'_>, sampling_rate: u32) -> anyhow::Result<AnalysisRow>;
}

impl<F> EpochAnalysis for F
where
    F: Fn(&EpochSlice<'_>, u32) -> anyhow::Result<AnalysisRow> + Send + Sync,
{
    fn analyze(&self, epoch: &EpochSlice<'_>, sampling_rate: u32) -> anyhow::Result<AnalysisRow> {
        self(epoch, sampling_rate)
    }
}

/// Diagnostic for an epoch that produced no samples.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DegenerateEpochWarning {
    pub channel: String,
    pub label: String,
    pub onset: usize,
    pub offset: usize,
}

/// Rows of every analysed epoch plus the skipped ones.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Aggregation {
    pub rows: Vec<AnalysisRow>,
    pub skipped: Vec<DegenerateEpochWarning>,
}

/// Run `analysis` over every epoch of `table`.
///
/// Epochs must already be filtered for excluded labels (see
/// [`Segmenter`](crate::epoch::Segmenter)).
pub fn aggregate(
    table: &SignalTable,
    epochs: &[EpochBounds],
    analysis: &dyn EpochAnalysis,
    sampling_rate: u32,
) -> Result<Aggregation> {
    let mut out = Aggregation::default();

    for epoch in epochs {
        let slice = table.slice(epoch.onset, epoch.offset);
        if slice.is_empty() {
            log::warn!(
                "{}: empty epoch {} [{}, {}), skipped",
                table.name, epoch.label, epoch.onset, epoch.offset
            );
            out.skipped.push(DegenerateEpochWarning {
                channel: table.name.clone(),
                label: epoch.label.clone(),
                onset: epoch.onset,
                offset: epoch.offset,
            });
            continue;
        }

        let mut row = analysis.analyze(&slice, sampling_rate).map_err(|e| {
            PipelineError::AnalysisFailure {
                channel: table.name.clone(),
                label: epoch.label.clone(),
                reason: format!("{e:#}"),
            }
        })?;
        row.label = epoch.label.clone();
        log::info!(
            "{}: epoch {} [{}, {}) → {} metrics",
            table.name, epoch.label, epoch.onset, epoch.offset, row.metrics.len()
        );
        out.rows.push(row);
    }

    Ok(out)
}
