//! Signal processors and per-epoch analyses.
//!
//! Both are seams for an external signal-processing library: R-peak
//! detection, phasic/tonic decomposition and the like are not implemented
//! here.  The built-ins keep a run self-contained:
//!
//! - [`RawPassthrough`] exposes the raw samples as a one-column table named
//!   `<PREFIX>_Raw`.
//! - [`IntervalSummary`] reports mean, SD, min and max of every column plus
//!   the epoch duration.
use anyhow::{bail, Result};
use ndarray::Array2;
use std::collections::BTreeMap;

use crate::aggregate::{AnalysisRow, EpochAnalysis};
use crate::config::SignalKind;
use crate::signal::{Channel, EpochSlice, SignalTable};

/// Turns one raw channel into a processed table.
pub trait SignalProcessor: Send + Sync {
    fn process(&self, raw: &Channel, sampling_rate: u32) -> Result<SignalTable>;
}

/// Copies the raw samples into a single `<PREFIX>_Raw` column.
#[derive(Debug, Clone, Copy)]
pub struct RawPassthrough {
    pub kind: SignalKind,
}

impl SignalProcessor for RawPassthrough {
    fn process(&self, raw: &Channel, sampling_rate: u32) -> Result<SignalTable> {
        if raw.is_empty() {
            bail!("{} channel '{}' has no samples", self.kind, raw.column_id());
        }
        let data = Array2::from_shape_vec((1, raw.len()), raw.samples.to_vec())?;
        let table = SignalTable::new(
            self.kind.prefix(),
            vec![format!("{}_Raw", self.kind.prefix())],
            data,
            sampling_rate,
        )?;
        Ok(table)
    }
}

/// Processor per signal kind; kinds without an entry fall back to
/// [`RawPassthrough`].
#[derive(Default)]
pub struct ProcessorSet {
    processors: BTreeMap<SignalKind, Box<dyn SignalProcessor>>,
}

impl ProcessorSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, kind: SignalKind, processor: impl SignalProcessor + 'static) -> Self {
        self.processors.insert(kind, Box::new(processor));
        self
    }

    pub fn process(&self, kind: SignalKind, raw: &Channel, sampling_rate: u32) -> Result<SignalTable> {
        match self.processors.get(&kind) {
            Some(p) => p.process(raw, sampling_rate),
            None => RawPassthrough { kind }.process(raw, sampling_rate),
        }
    }
}

// ── Interval summary ────────────────────────────────────────────────────────

/// Descriptive statistics over an epoch.
///
/// Produces `Epoch_Duration_s`, then `<col>_Mean`, `<col>_SD` (population),
/// `<col>_Min` and `<col>_Max` for every column.
#[derive(Debug, Clone, Copy)]
pub struct IntervalSummary {
    /// Fewest samples accepted; shorter epochs fail the analysis.
    pub min_samples: usize,
}

impl Default for IntervalSummary {
    fn default() -> Self {
        Self { min_samples: 2 }
    }
}

impl EpochAnalysis for IntervalSummary {
    fn analyze(&self, epoch: &EpochSlice<'_>, sampling_rate: u32) -> Result<AnalysisRow> {
        let n = epoch.len();
        if n < self.min_samples.max(1) {
            bail!("epoch has {n} samples, at least {} required", self.min_samples.max(1));
        }
        if sampling_rate == 0 {
            bail!("sampling rate must be positive");
        }

        let mut row = AnalysisRow::new().with("Epoch_Duration_s", n as f64 / sampling_rate as f64);
        for (name, col) in epoch.columns.iter().zip(epoch.data.rows()) {
            let len = col.len() as f64;
            let mean = col.sum() / len;
            let var = col.iter().map(|&v| (v - mean) * (v - mean)).sum::<f64>() / len;
            let (min, max) = col
                .iter()
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
            row.push(format!("{name}_Mean"), mean);
            row.push(format!("{name}_SD"), var.sqrt());
            row.push(format!("{name}_Min"), min);
            row.push(format!("{name}_Max"), max);
        }
        Ok(row)
    }
}
