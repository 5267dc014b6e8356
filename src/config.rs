//! Pipeline configuration.
//!
//! [`PipelineConfig`] holds every tunable parameter of a run.  All fields have
//! defaults that match the acquisition setup the pipeline was written for
//! (2 kHz BIOPAC export, next-onset epochs, `"pci"` events excluded), and the
//! whole struct can be loaded from JSON with missing keys falling back to
//! those defaults.
//!
//! [`Timeline`] is the per-session event timing file: onsets in seconds and
//! the matching condition labels.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::{PipelineError, Result};

// ── Signal kinds and column mapping ─────────────────────────────────────────

/// The physiological signals a recording may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalKind {
    Ecg,
    Rsp,
    Eda,
    Ppg,
    Slider,
}

impl SignalKind {
    pub const ALL: [SignalKind; 5] = [
        SignalKind::Ecg,
        SignalKind::Rsp,
        SignalKind::Eda,
        SignalKind::Ppg,
        SignalKind::Slider,
    ];

    /// Column prefix used for processed tables and metric names (`ECG_Raw`, …).
    pub fn prefix(self) -> &'static str {
        match self {
            SignalKind::Ecg => "ECG",
            SignalKind::Rsp => "RSP",
            SignalKind::Eda => "EDA",
            SignalKind::Ppg => "PPG",
            SignalKind::Slider => "Slider",
        }
    }

    /// Spreadsheet sheet name for this signal's report.
    pub fn sheet_name(self) -> String {
        format!("{}_Analysis", self.prefix())
    }

    /// Column identifier written by the BIOPAC export for this signal.
    pub fn default_column(self) -> &'static str {
        match self {
            SignalKind::Ecg => "ECG100C (mV)",
            SignalKind::Rsp => "RSP100C (Volts)",
            SignalKind::Eda => "EDA100C (microsiemens)",
            SignalKind::Ppg => "Status, OXY100C (Status)",
            SignalKind::Slider => {
                "Slider - TSD115 - Psychological assessment, AMI / HLT - A15 (number)"
            }
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

impl FromStr for SignalKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ecg" => Ok(SignalKind::Ecg),
            "rsp" => Ok(SignalKind::Rsp),
            "eda" => Ok(SignalKind::Eda),
            "ppg" => Ok(SignalKind::Ppg),
            "slider" => Ok(SignalKind::Slider),
            other => Err(format!(
                "unknown signal '{other}' (expected ecg, rsp, eda, ppg or slider)"
            )),
        }
    }
}

/// `signal kind → column identifier` in the loaded recording.
///
/// A JSON map only needs the kinds it remaps; the others keep their
/// [`SignalKind::default_column`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ChannelMap(pub BTreeMap<SignalKind, String>);

impl<'de> Deserialize<'de> for ChannelMap {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let remapped = BTreeMap::<SignalKind, String>::deserialize(deserializer)?;
        let mut map = ChannelMap::default();
        map.0.extend(remapped);
        Ok(map)
    }
}

impl Default for ChannelMap {
    fn default() -> Self {
        Self(
            SignalKind::ALL
                .iter()
                .map(|&k| (k, k.default_column().to_string()))
                .collect(),
        )
    }
}

impl ChannelMap {
    pub fn column(&self, kind: SignalKind) -> Option<&str> {
        self.0.get(&kind).map(String::as_str)
    }

    /// Check that every kind in `enabled` is mapped and that its column exists
    /// in `available`.
    pub fn validate(&self, enabled: &[SignalKind], available: &[String]) -> Result<()> {
        for &kind in enabled {
            let column = self.column(kind).ok_or_else(|| {
                PipelineError::Configuration(format!("no column mapped for {kind} signal"))
            })?;
            if !available.iter().any(|c| c == column) {
                return Err(PipelineError::MissingColumn {
                    kind,
                    column: column.to_string(),
                });
            }
        }
        Ok(())
    }
}

// ── Epoch boundary rule ─────────────────────────────────────────────────────

/// A fixed epoch length applied to labels containing `contains`
/// (case-insensitive).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DurationOverride {
    pub contains: String,
    pub seconds: f64,
}

/// How the end of each epoch is derived.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum BoundaryRule {
    /// Each epoch ends where the next one starts; the last one ends at the
    /// end of the recording.
    #[default]
    NextOnset,
    /// Each epoch lasts a fixed number of seconds from its onset, clamped to
    /// the end of the recording.  The first matching override wins.
    FixedDuration {
        default_s: f64,
        #[serde(default)]
        overrides: Vec<DurationOverride>,
    },
}

impl BoundaryRule {
    /// Fixed-length epochs of `default_s` seconds, no overrides.
    pub fn fixed(default_s: f64) -> Self {
        BoundaryRule::FixedDuration { default_s, overrides: vec![] }
    }

    /// Add an override; no-op under [`BoundaryRule::NextOnset`].
    pub fn with_override(self, needle: &str, seconds: f64) -> Self {
        match self {
            BoundaryRule::FixedDuration { default_s, mut overrides } => {
                overrides.push(DurationOverride { contains: needle.to_string(), seconds });
                BoundaryRule::FixedDuration { default_s, overrides }
            }
            other => other,
        }
    }

    /// Epoch length in seconds for `label`, or `None` under [`BoundaryRule::NextOnset`].
    pub fn duration_for(&self, label: &str) -> Option<f64> {
        match self {
            BoundaryRule::NextOnset => None,
            BoundaryRule::FixedDuration { default_s, overrides } => {
                let lower = label.to_lowercase();
                let secs = overrides
                    .iter()
                    .find(|o| lower.contains(&o.contains.to_lowercase()))
                    .map(|o| o.seconds)
                    .unwrap_or(*default_s);
                Some(secs)
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if let BoundaryRule::FixedDuration { default_s, overrides } = self {
            let bad = std::iter::once(*default_s)
                .chain(overrides.iter().map(|o| o.seconds))
                .any(|s| !s.is_finite() || s <= 0.0);
            if bad {
                return Err(PipelineError::Configuration(
                    "fixed epoch durations must be positive".into(),
                ));
            }
        }
        Ok(())
    }
}

// ── Pipeline configuration ──────────────────────────────────────────────────

/// Configuration for a full run.
///
/// All fields are `pub` so you can construct one with struct-update syntax:
///
/// ```
/// use physio_epochs::{PipelineConfig, SignalKind};
///
/// let cfg = PipelineConfig {
///     sampling_rate: 1000,
///     signals: vec![SignalKind::Ecg, SignalKind::Eda],
///     ..PipelineConfig::default()
/// };
/// assert!(cfg.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Sampling rate of the recording in Hz.
    ///
    /// Default: `2000`.
    pub sampling_rate: u32,

    /// Epoch boundary rule.
    ///
    /// Default: [`BoundaryRule::NextOnset`].
    pub boundary: BoundaryRule,

    /// Events whose label contains any of these strings (case-insensitive)
    /// are left out of every report.
    ///
    /// Default: `["pci"]`.
    pub excluded_labels: Vec<String>,

    /// Column identifier of each signal in the recording.
    pub channels: ChannelMap,

    /// Signals to analyse, in report order.
    ///
    /// Default: ECG, RSP, EDA, PPG.
    pub signals: Vec<SignalKind>,

    /// Fewest samples the built-in interval summary accepts per epoch.
    ///
    /// Default: `2`.
    pub min_epoch_samples: usize,

    /// Tag used in output file names (`processed_data_<feature_type>_…`).
    ///
    /// Default: `"interval_related"`.
    pub feature_type: String,

    /// Metric rows to chart.  Empty charts every metric.
    pub chart_metrics: Vec<String>,

    /// Analyse channels on the rayon pool instead of one after another.
    ///
    /// Default: `false`.
    pub parallel: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sampling_rate: 2000,
            boundary: BoundaryRule::NextOnset,
            excluded_labels: vec!["pci".to_string()],
            channels: ChannelMap::default(),
            signals: vec![SignalKind::Ecg, SignalKind::Rsp, SignalKind::Eda, SignalKind::Ppg],
            min_epoch_samples: 2,
            feature_type: "interval_related".to_string(),
            chart_metrics: vec![],
            parallel: false,
        }
    }
}

impl PipelineConfig {
    /// Read a JSON config file; absent keys take their default.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
        let cfg: Self = serde_json::from_str(&text).map_err(|e| {
            PipelineError::Configuration(format!("{}: {e}", path.display()))
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sampling_rate == 0 {
            return Err(PipelineError::Configuration(
                "sampling rate must be a positive integer".into(),
            ));
        }
        if self.signals.is_empty() {
            return Err(PipelineError::Configuration("no signals selected".into()));
        }
        if self.feature_type.trim().is_empty() {
            return Err(PipelineError::Configuration("feature_type is empty".into()));
        }
        self.boundary.validate()
    }
}

// ── Timeline ────────────────────────────────────────────────────────────────

/// Event timing of one recording session.
///
/// ```json
/// { "onsets_s": [0, 420, 600], "labels": ["Absorptive", "Silence", "PCI"] }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    pub onsets_s: Vec<f64>,
    pub labels: Vec<String>,
}

impl Timeline {
    pub fn new(onsets_s: Vec<f64>, labels: Vec<String>) -> Self {
        Self { onsets_s, labels }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
        serde_json::from_str(&text)
            .map_err(|e| PipelineError::Configuration(format!("{}: {e}", path.display())))
    }
}
