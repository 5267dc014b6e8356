//! PNG charts of report rows and processed signals.
//!
//! Text (captions, tick labels) needs a font registered through
//! [`register_font_file`]; without one the charts are drawn bare, bars and
//! lines only.
use ndarray::ArrayView1;
use plotters::coord::ranged1d::SegmentValue;
use plotters::prelude::*;
use plotters::style::FontStyle;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{PipelineError, Result};
use crate::events::EventTable;
use crate::report::Report;
use crate::sink::OutputLayout;

type DrawResult = std::result::Result<(), Box<dyn std::error::Error>>;

#[derive(Clone, Debug)]
pub struct ChartStyle {
    pub width: u32,
    pub height: u32,
    /// Draw captions and axis labels; needs a registered font.
    pub labels: bool,
    pub bar_color: RGBColor,
    pub line_color: RGBColor,
    pub marker_color: RGBColor,
}

impl Default for ChartStyle {
    fn default() -> Self {
        Self {
            width: 900,
            height: 500,
            labels: false,
            bar_color: RGBColor(70, 130, 180),
            line_color: RGBColor(0, 160, 160),
            marker_color: RED,
        }
    }
}

/// Load a TTF/OTF file and register it as the `sans-serif` family.
///
/// The font bytes live for the rest of the process.
pub fn register_font_file(path: &Path) -> Result<()> {
    let bytes = std::fs::read(path).map_err(|e| PipelineError::io(path, e))?;
    let leaked: &'static [u8] = Box::leak(bytes.into_boxed_slice());
    plotters::style::register_font("sans-serif", FontStyle::Normal, leaked)
        .map_err(|_| PipelineError::load(path, "not a usable font file"))?;
    log::info!("registered chart font {}", path.display());
    Ok(())
}

/// Renders a report as image files.
pub trait ChartRenderer {
    /// Returns the paths written.
    fn render(&self, report: &Report, feature_type: &str, layout: &OutputLayout) -> Result<Vec<PathBuf>>;
}

/// One bar chart per metric row, one bar per event label.
///
/// Files are named after the metric, prefixed with the report channel unless
/// the metric already starts with it.
#[derive(Clone, Debug, Default)]
pub struct BarChartRenderer {
    pub style: ChartStyle,
}

impl ChartRenderer for BarChartRenderer {
    fn render(&self, report: &Report, feature_type: &str, layout: &OutputLayout) -> Result<Vec<PathBuf>> {
        // Metrics shared across signals (e.g. epoch duration) get the
        // channel prefix so their files do not collide.
        let paths: Vec<PathBuf> = report
            .metrics
            .iter()
            .map(|metric| {
                if metric.starts_with(&report.channel) {
                    layout.chart_path(metric, feature_type)
                } else {
                    layout.chart_path(&format!("{}_{}", report.channel, metric), feature_type)
                }
            })
            .collect();

        // Names differing only in characters the file system rejects would
        // overwrite each other.
        let mut claimed: HashMap<&Path, &str> = HashMap::new();
        for (path, metric) in paths.iter().zip(&report.metrics) {
            if let Some(first) = claimed.insert(path.as_path(), metric.as_str()) {
                return Err(PipelineError::export(
                    path,
                    format!("metrics '{first}' and '{metric}' map to the same chart file"),
                ));
            }
        }

        for (i, (path, metric)) in paths.iter().zip(&report.metrics).enumerate() {
            let values: Vec<f64> = report.values.row(i).to_vec();
            draw_bars(path, metric, &report.labels, &values, &self.style)
                .map_err(|e| PipelineError::export(path, e))?;
            log::debug!("chart {}", path.display());
        }
        Ok(paths)
    }
}

fn value_range(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let (lo, hi) = values
        .filter(|v| v.is_finite())
        .fold((0.0f64, 0.0f64), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if (hi - lo).abs() < f64::EPSILON {
        (lo - 1.0, hi + 1.0)
    } else {
        let pad = (hi - lo) * 0.05;
        (lo - if lo < 0.0 { pad } else { 0.0 }, hi + pad)
    }
}

fn draw_bars(path: &Path, metric: &str, labels: &[String], values: &[f64], style: &ChartStyle) -> DrawResult {
    let root = BitMapBackend::new(path, (style.width, style.height)).into_drawing_area();
    root.fill(&WHITE)?;

    let n = labels.len().max(1);
    let (y_lo, y_hi) = value_range(values.iter().copied());

    let mut builder = ChartBuilder::on(&root);
    builder.margin(15);
    if style.labels {
        builder
            .caption(metric, ("sans-serif", 22))
            .set_label_area_size(LabelAreaPosition::Left, 60)
            .set_label_area_size(LabelAreaPosition::Bottom, 50);
    }
    let mut chart = builder.build_cartesian_2d((0..n).into_segmented(), y_lo..y_hi)?;

    if style.labels {
        let label_of = |v: &SegmentValue<usize>| match v {
            SegmentValue::Exact(i) | SegmentValue::CenterOf(i) => {
                labels.get(*i).cloned().unwrap_or_default()
            }
            SegmentValue::Last => String::new(),
        };
        chart
            .configure_mesh()
            .disable_x_mesh()
            .x_labels(n)
            .x_label_formatter(&label_of)
            .y_desc(metric)
            .draw()?;
    }

    chart.draw_series(values.iter().enumerate().filter(|(_, v)| v.is_finite()).map(|(i, &v)| {
        let mut bar = Rectangle::new(
            [(SegmentValue::Exact(i), 0.0), (SegmentValue::Exact(i + 1), v)],
            style.bar_color.filled(),
        );
        bar.set_margin(0, 0, 10, 10);
        bar
    }))?;

    root.present()?;
    Ok(())
}

// ── Rates and events ─────────────────────────────────────────────────────────

/// Plot one processed column over time (minutes) with a vertical marker at
/// every event onset.
pub fn render_timeline(
    column: ArrayView1<'_, f64>,
    sampling_rate: u32,
    events: &EventTable,
    title: &str,
    path: &Path,
    style: &ChartStyle,
) -> Result<()> {
    if column.is_empty() {
        return Err(PipelineError::export(path, "column has no samples"));
    }
    if sampling_rate == 0 {
        return Err(PipelineError::Configuration("sampling rate must be positive".into()));
    }
    draw_timeline(column, sampling_rate, events, title, path, style)
        .map_err(|e| PipelineError::export(path, e))?;
    log::debug!("timeline {}", path.display());
    Ok(())
}

fn draw_timeline(
    column: ArrayView1<'_, f64>,
    sampling_rate: u32,
    events: &EventTable,
    title: &str,
    path: &Path,
    style: &ChartStyle,
) -> DrawResult {
    let to_min = |i: usize| i as f64 / sampling_rate as f64 / 60.0;
    let t_end = to_min(column.len()).max(f64::EPSILON);

    // about two points per pixel column
    let step = (column.len() / (2 * style.width.max(1) as usize)).max(1);
    let points: Vec<(f64, f64)> = column
        .iter()
        .enumerate()
        .step_by(step)
        .filter(|(_, v)| v.is_finite())
        .map(|(i, &v)| (to_min(i), v))
        .collect();
    let (lo, hi) = points
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &(_, v)| (lo.min(v), hi.max(v)));
    let (y_lo, y_hi) = if !lo.is_finite() || (hi - lo).abs() < f64::EPSILON {
        (lo.min(0.0) - 1.0, hi.max(0.0) + 1.0)
    } else {
        let pad = (hi - lo) * 0.05;
        (lo - pad, hi + pad)
    };

    let root = BitMapBackend::new(path, (style.width, style.height)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut builder = ChartBuilder::on(&root);
    builder.margin(15);
    if style.labels {
        builder
            .caption(title, ("sans-serif", 22))
            .set_label_area_size(LabelAreaPosition::Left, 60)
            .set_label_area_size(LabelAreaPosition::Bottom, 40);
    }
    let mut chart = builder.build_cartesian_2d(0f64..t_end, y_lo..y_hi)?;
    if style.labels {
        chart.configure_mesh().x_desc("time (min)").draw()?;
    }

    chart.draw_series(LineSeries::new(points, &style.line_color))?;

    let marker = style.marker_color.mix(0.7);
    for event in events.events() {
        let x = to_min(event.onset);
        if x > t_end {
            continue;
        }
        chart.draw_series(std::iter::once(PathElement::new(vec![(x, y_lo), (x, y_hi)], &marker)))?;
        if style.labels {
            chart.draw_series(std::iter::once(Text::new(
                event.label.clone(),
                (x, y_hi),
                ("sans-serif", 12).into_font().color(&style.marker_color),
            )))?;
        }
    }

    root.present()?;
    Ok(())
}
