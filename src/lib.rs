//! # physio-epochs: epoch segmentation and per-condition reports for biosignals
//!
//! `physio-epochs` cuts a continuous physiological recording (ECG,
//! respiration, EDA, PPG, slider ratings) into labelled experimental epochs,
//! runs a per-epoch analysis on every processed signal and assembles one
//! metrics × condition table per signal, ready for a spreadsheet or a chart.
//!
//! ## Pipeline overview
//!
//! ```text
//! recording.mat / .csv / .safetensors   timeline.json
//!   │                                     │
//!   ├─ io::load_recording()               ├─ EventTable::from_timeline()
//!   │    Recording: raw columns [C, T]    │    onsets (samples) + "<label>_<i>"
//!   │                                     │
//!   ├─ ProcessorSet::process()            └─ Segmenter::segment()
//!   │    per signal → SignalTable              [onset, offset) per event,
//!   │                                          excluded labels removed
//!   ├─ aggregate()  ◄──────────────────────────┘
//!   │    EpochAnalysis on every epoch slice
//!   ├─ assemble()
//!   │    Report: metrics × labels
//!   └─ write_outputs()
//!        XlsxSink (one sheet per signal) + BarChartRenderer (one PNG per metric)
//! ```
//!
//! ## Quick start
//!
//! ```no_run
//! use physio_epochs::{analyze_recording, load_recording, write_outputs};
//! use physio_epochs::{BarChartRenderer, ChartRenderer, EventTable, IntervalSummary, OutputLayout};
//! use physio_epochs::{PipelineConfig, ProcessorSet, Timeline, XlsxSink};
//! use std::path::Path;
//!
//! let cfg = PipelineConfig::default();
//! let rec = load_recording(Path::new("session.csv"), cfg.sampling_rate).unwrap();
//! let timeline = Timeline::load(Path::new("timeline.json")).unwrap();
//! let events = EventTable::from_timeline(&timeline, cfg.sampling_rate).unwrap();
//!
//! let run = analyze_recording(&rec, &events, &cfg, &ProcessorSet::new(), &IntervalSummary::default())
//!     .unwrap();
//!
//! let layout = OutputLayout::today("results", "P01", "AB");
//! let renderer: &dyn ChartRenderer = &BarChartRenderer::default();
//! let written = write_outputs(&run, &layout, &cfg, &XlsxSink, Some(renderer)).unwrap();
//! println!("{} files written", written.len());
//! ```
//!
//! ## Running individual steps
//!
//! ```
//! use physio_epochs::{aggregate, assemble, EventTable, IntervalSummary};
//! use physio_epochs::epoch::segment;
//! use physio_epochs::signal::SignalTable;
//! use ndarray::Array2;
//!
//! let labels = vec!["Absorptive".to_string(), "Silence".to_string()];
//! let events = EventTable::build(&[0.0, 1.0], &labels, 10).unwrap();
//! let epochs = segment(&events, 30);
//!
//! let data = Array2::from_shape_fn((1, 30), |(_, t)| t as f64);
//! let table = SignalTable::new("EDA", vec!["EDA_Raw".into()], data, 10).unwrap();
//! let agg = aggregate(&table, &epochs, &IntervalSummary::default(), 10).unwrap();
//! let report = assemble("EDA", agg.rows).unwrap();
//! assert_eq!(report.labels, vec!["Absorptive_1", "Silence_2"]);
//! assert_eq!(report.value("Epoch_Duration_s", "Silence_2"), Some(2.0));
//! ```

pub mod aggregate;
pub mod chart;
pub mod config;
pub mod epoch;
pub mod error;
pub mod events;
pub mod io;
pub mod processing;
pub mod report;
pub mod signal;
pub mod sink;

use rayon::prelude::*;
use std::path::PathBuf;

// ── Crate-root re-exports ─────────────────────────────────────────────────

// config
pub use config::{BoundaryRule, ChannelMap, DurationOverride, PipelineConfig, SignalKind, Timeline};

// error
pub use error::{PipelineError, Result};

// events + segmentation
pub use events::{Event, EventTable};
pub use epoch::{EpochBounds, LabelFilter, Segmentation, Segmenter};

// signals
pub use signal::{Channel, EpochSlice, Recording, SignalTable};
pub use io::{load_recording, write_recording};

// analysis
pub use aggregate::{aggregate, Aggregation, AnalysisRow, DegenerateEpochWarning, EpochAnalysis};
pub use processing::{IntervalSummary, ProcessorSet, RawPassthrough, SignalProcessor};
pub use report::{assemble, Report};

// output
pub use chart::{render_timeline, BarChartRenderer, ChartRenderer, ChartStyle};
pub use sink::{OutputLayout, SpreadsheetSink, XlsxSink};

/// Everything one run produced, in the order of [`PipelineConfig::signals`].
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub segmentation: Segmentation,
    /// Processed table of every analysed signal.
    pub tables: Vec<(SignalKind, SignalTable)>,
    /// One report per signal that kept at least one epoch.
    pub reports: Vec<(SignalKind, Report)>,
    /// Epochs skipped for having no samples, across all signals.
    pub skipped: Vec<DegenerateEpochWarning>,
    /// Signals whose every epoch was skipped.
    pub empty_channels: Vec<SignalKind>,
}

struct ChannelResult {
    kind: SignalKind,
    table: SignalTable,
    report: Option<Report>,
    skipped: Vec<DegenerateEpochWarning>,
}

/// Run the **segmentation and aggregation pipeline** on one recording.
///
/// # Pipeline steps
///
/// 1. Validate `cfg` and check that every enabled signal's column exists in
///    the recording.
/// 2. Segment `events` over the recording length with
///    [`Segmenter::from_config`]; excluded labels are dropped here.
/// 3. For every signal in [`PipelineConfig::signals`]: process the raw column,
///    aggregate `analysis` over the epochs and assemble the report.
///
/// With [`PipelineConfig::parallel`] step 3 runs on the rayon pool; the
/// result is identical to the sequential run.
///
/// # Errors
///
/// * [`PipelineError::Configuration`] for an invalid config or a recording
///   whose sampling rate differs from `cfg.sampling_rate`.
/// * [`PipelineError::MissingColumn`] when a signal's column is absent.
/// * [`PipelineError::Processing`] when a processor rejects a channel.
/// * [`PipelineError::AnalysisFailure`] when the analysis rejects an epoch.
///
/// A signal left with no epochs is not an error: it is logged and listed in
/// [`RunOutput::empty_channels`].
pub fn analyze_recording(
    recording: &Recording,
    events: &EventTable,
    cfg: &PipelineConfig,
    processors: &ProcessorSet,
    analysis: &dyn EpochAnalysis,
) -> Result<RunOutput> {
    // 1. Startup checks.
    cfg.validate()?;
    if recording.sampling_rate() != cfg.sampling_rate {
        return Err(PipelineError::Configuration(format!(
            "recording is sampled at {} Hz, config says {} Hz",
            recording.sampling_rate(),
            cfg.sampling_rate
        )));
    }
    cfg.channels.validate(&cfg.signals, &recording.column_ids())?;

    // 2. Segment once; every signal shares the epochs.
    let segmentation = Segmenter::from_config(cfg).segment(events, recording.len());
    log::info!(
        "{} epochs ({} excluded) over {} samples",
        segmentation.epochs.len(),
        segmentation.excluded.len(),
        recording.len()
    );

    // 3. Per-signal chain.
    let run_one = |kind: SignalKind| -> Result<ChannelResult> {
        let column = cfg.channels.column(kind).unwrap_or(kind.default_column());
        let raw = recording.channel(column).ok_or_else(|| PipelineError::MissingColumn {
            kind,
            column: column.to_string(),
        })?;
        let table = processors
            .process(kind, raw, cfg.sampling_rate)
            .map_err(|e| PipelineError::Processing { kind, reason: format!("{e:#}") })?;
        log::info!("{kind}: processed {} columns", table.columns.len());

        let agg = aggregate(&table, &segmentation.epochs, analysis, cfg.sampling_rate)?;
        let report = match assemble(kind.prefix(), agg.rows) {
            Ok(report) => Some(report),
            Err(PipelineError::EmptyReport(channel)) => {
                log::warn!("{channel}: every epoch was empty, no report");
                None
            }
            Err(e) => return Err(e),
        };
        Ok(ChannelResult { kind, table, report, skipped: agg.skipped })
    };

    let results: Vec<Result<ChannelResult>> = if cfg.parallel {
        cfg.signals.par_iter().map(|&k| run_one(k)).collect()
    } else {
        cfg.signals.iter().map(|&k| run_one(k)).collect()
    };

    let mut out = RunOutput {
        segmentation,
        tables: Vec::with_capacity(results.len()),
        reports: Vec::with_capacity(results.len()),
        skipped: Vec::new(),
        empty_channels: Vec::new(),
    };
    for result in results {
        let ch = result?;
        match ch.report {
            Some(report) => out.reports.push((ch.kind, report)),
            None => out.empty_channels.push(ch.kind),
        }
        out.skipped.extend(ch.skipped);
        out.tables.push((ch.kind, ch.table));
    }
    Ok(out)
}

/// Write the spreadsheet and, when a renderer is given, the charts of `run`.
///
/// The spreadsheet holds one `<PREFIX>_Analysis` sheet per report; charts
/// cover the rows listed in [`PipelineConfig::chart_metrics`] (all rows when
/// empty).  Returns every path written.
///
/// # Errors
///
/// [`PipelineError::EmptyReport`] when `run` has no reports, plus any I/O or
/// export failure.
pub fn write_outputs(
    run: &RunOutput,
    layout: &OutputLayout,
    cfg: &PipelineConfig,
    sink: &dyn SpreadsheetSink,
    renderer: Option<&dyn ChartRenderer>,
) -> Result<Vec<PathBuf>> {
    if run.reports.is_empty() {
        return Err(PipelineError::EmptyReport("every signal".into()));
    }
    layout.create_run_dir()?;

    let sheets: Vec<(String, &Report)> = run
        .reports
        .iter()
        .map(|(kind, report)| (kind.sheet_name(), report))
        .collect();
    let report_path = layout.report_path(&cfg.feature_type);
    sink.write(&sheets, &report_path)?;
    let mut written = vec![report_path];

    if let Some(renderer) = renderer {
        for (_, report) in &run.reports {
            let subset = report.select(&cfg.chart_metrics);
            written.extend(renderer.render(&subset, &cfg.feature_type, layout)?);
        }
    }
    Ok(written)
}
