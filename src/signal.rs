//! Sampled signal containers.
//!
//! - [`Channel`]: one raw column from the acquisition export.
//! - [`Recording`]: every raw column of one session, columns named
//!   `"<signal name> (<unit>)"`.
//! - [`SignalTable`]: a processed signal, several named columns sharing a
//!   sampling rate, stored `[C, T]`.
//! - [`EpochSlice`]: a borrowed `[C, onset..offset]` window of a table.
use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2, Axis};

use crate::error::{PipelineError, Result};

/// One raw, named, sampled time series.
#[derive(Debug, Clone)]
pub struct Channel {
    pub name: String,
    pub unit: String,
    pub samples: Array1<f64>,
    pub sampling_rate: u32,
}

impl Channel {
    /// Column identifier as written by the loader: `"<name> (<unit>)"`.
    pub fn column_id(&self) -> String {
        column_id(&self.name, &self.unit)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// `"<name> (<unit>)"`, or just `name` when the unit is blank.
pub fn column_id(name: &str, unit: &str) -> String {
    if unit.trim().is_empty() {
        name.to_string()
    } else {
        format!("{name} ({unit})")
    }
}

/// Split `"ECG100C (mV)"` into `("ECG100C", "mV")`.  Only a trailing
/// parenthesised group is treated as the unit.
pub fn split_column_id(id: &str) -> (String, String) {
    let id = id.trim();
    if let Some(stripped) = id.strip_suffix(')') {
        if let Some(open) = stripped.rfind(" (") {
            return (stripped[..open].to_string(), stripped[open + 2..].to_string());
        }
    }
    (id.to_string(), String::new())
}

// ── Recording ───────────────────────────────────────────────────────────────

/// All raw channels of one session.
#[derive(Debug, Clone)]
pub struct Recording {
    channels: Vec<Channel>,
    sampling_rate: u32,
}

impl Recording {
    /// Build from `[C, T]` data and per-row column identifiers.
    pub fn from_array(data: Array2<f64>, column_ids: &[String], sampling_rate: u32) -> Result<Self> {
        if column_ids.len() != data.nrows() {
            return Err(PipelineError::Configuration(format!(
                "{} column names for {} channels",
                column_ids.len(),
                data.nrows()
            )));
        }
        let channels = column_ids
            .iter()
            .zip(data.rows())
            .map(|(id, row)| {
                let (name, unit) = split_column_id(id);
                Channel { name, unit, samples: row.to_owned(), sampling_rate }
            })
            .collect();
        Ok(Self { channels, sampling_rate })
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn sampling_rate(&self) -> u32 {
        self.sampling_rate
    }

    /// Number of samples per channel.
    pub fn len(&self) -> usize {
        self.channels.first().map_or(0, Channel::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn column_ids(&self) -> Vec<String> {
        self.channels.iter().map(Channel::column_id).collect()
    }

    pub fn channel(&self, column_id: &str) -> Option<&Channel> {
        self.channels.iter().find(|c| c.column_id() == column_id)
    }
}

// ── Processed tables ────────────────────────────────────────────────────────

/// A processed signal: named columns over a common time axis, `[C, T]`.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalTable {
    /// Channel name used in logs, errors and report sheet titles.
    pub name: String,
    pub columns: Vec<String>,
    pub data: Array2<f64>,
    pub sampling_rate: u32,
}

impl SignalTable {
    pub fn new(
        name: impl Into<String>,
        columns: Vec<String>,
        data: Array2<f64>,
        sampling_rate: u32,
    ) -> Result<Self> {
        if columns.len() != data.nrows() {
            return Err(PipelineError::Configuration(format!(
                "{} column names for a table with {} rows",
                columns.len(),
                data.nrows()
            )));
        }
        Ok(Self { name: name.into(), columns, data, sampling_rate })
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.data.ncols()
    }

    pub fn is_empty(&self) -> bool {
        self.data.ncols() == 0
    }

    pub fn column(&self, name: &str) -> Option<ArrayView1<'_, f64>> {
        let idx = self.columns.iter().position(|c| c == name)?;
        Some(self.data.row(idx))
    }

    /// Borrow samples `[onset, offset)`, clipped to the table length.  A
    /// degenerate or out-of-range request yields an empty slice.
    pub fn slice(&self, onset: usize, offset: usize) -> EpochSlice<'_> {
        let n = self.len();
        let start = onset.min(n);
        let end = offset.min(n).max(start);
        EpochSlice {
            columns: &self.columns,
            data: self.data.slice(s![.., start..end]),
        }
    }
}

/// Borrowed window of a [`SignalTable`].
#[derive(Debug, Clone, Copy)]
pub struct EpochSlice<'a> {
    pub columns: &'a [String],
    pub data: ArrayView2<'a, f64>,
}

impl<'a> EpochSlice<'a> {
    /// Number of samples in the window.
    pub fn len(&self) -> usize {
        self.data.ncols()
    }

    pub fn is_empty(&self) -> bool {
        self.data.ncols() == 0
    }

    pub fn column(&self, name: &str) -> Option<ArrayView1<'a, f64>> {
        let idx = self.columns.iter().position(|c| c == name)?;
        Some(self.data.index_axis_move(Axis(0), idx))
    }
}
