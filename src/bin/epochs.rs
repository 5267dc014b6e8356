use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use std::path::PathBuf;

use physio_epochs::{
    analyze_recording, chart, load_recording, render_timeline, write_outputs, write_recording,
    BarChartRenderer, ChartRenderer, ChartStyle, EventTable, IntervalSummary, OutputLayout,
    PipelineConfig, ProcessorSet, SignalKind, Timeline, XlsxSink,
};

#[derive(Parser)]
#[command(name = "epochs", about = "Segment a physiological recording into labelled epochs and report per-condition metrics")]
struct Args {
    /// Recording exported from the acquisition software (.mat, .csv or .safetensors)
    #[arg(long)]
    recording: PathBuf,

    /// Timeline JSON: {"onsets_s": [...], "labels": [...]}
    #[arg(long)]
    timeline: PathBuf,

    /// Pipeline config JSON; absent keys take their default
    #[arg(long)]
    config: Option<PathBuf>,

    /// Sampling rate in Hz (overrides the config)
    #[arg(long)]
    sampling_rate: Option<u32>,

    /// Participant identifier, used in folder and file names
    #[arg(long)]
    participant: String,

    /// Researcher initials, used in folder and file names
    #[arg(long)]
    initials: String,

    /// Root folder for the run directory
    #[arg(long, default_value = "results")]
    output_dir: PathBuf,

    /// Run date as YYYY-MM-DD (default: today)
    #[arg(long)]
    date: Option<NaiveDate>,

    /// Excluded label substrings, comma-separated (overrides the config)
    #[arg(long)]
    exclude: Option<String>,

    /// Signals to analyse, comma-separated: ecg,rsp,eda,ppg,slider
    #[arg(long)]
    signals: Option<String>,

    /// Write one bar chart per metric
    #[arg(long)]
    charts: bool,

    /// Metrics to chart, comma-separated (default: all)
    #[arg(long)]
    chart_metrics: Option<String>,

    /// TTF/OTF font for chart captions and axis labels
    #[arg(long)]
    font: Option<PathBuf>,

    /// Plot each processed column over time with event markers
    #[arg(long)]
    timeline_plots: bool,

    /// Copy the raw recording into the run directory as CSV
    #[arg(long)]
    save_raw: bool,

    /// Also dump reports and diagnostics as JSON to this path
    #[arg(long)]
    json: Option<PathBuf>,

    /// Analyse signals in parallel
    #[arg(long)]
    parallel: bool,

    /// Verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|x| !x.is_empty())
        .map(str::to_string)
        .collect()
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = match args.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp(None)
        .init();

    // ── Config: file, then flag overrides ────────────────────────────────
    let mut cfg = match &args.config {
        Some(path) => PipelineConfig::from_json_file(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(sr) = args.sampling_rate {
        cfg.sampling_rate = sr;
    }
    if let Some(ex) = &args.exclude {
        cfg.excluded_labels = split_list(ex);
    }
    if let Some(list) = &args.signals {
        cfg.signals = split_list(list)
            .iter()
            .map(|s| s.parse::<SignalKind>())
            .collect::<std::result::Result<Vec<_>, String>>()
            .map_err(anyhow::Error::msg)?;
    }
    if let Some(list) = &args.chart_metrics {
        cfg.chart_metrics = split_list(list);
    }
    cfg.parallel |= args.parallel;
    cfg.validate()?;

    if args.participant.trim().is_empty() || args.initials.trim().is_empty() {
        bail!("participant and initials must not be empty");
    }

    // ── Inputs ───────────────────────────────────────────────────────────
    let recording = load_recording(&args.recording, cfg.sampling_rate)
        .with_context(|| format!("loading {}", args.recording.display()))?;
    println!(
        "Loaded {} ch × {} samples @ {} Hz",
        recording.channels().len(),
        recording.len(),
        recording.sampling_rate()
    );

    let timeline = Timeline::load(&args.timeline)?;
    let events = EventTable::from_timeline(&timeline, cfg.sampling_rate)?;
    println!("{} events", events.len());

    // ── Run ──────────────────────────────────────────────────────────────
    let analysis = IntervalSummary { min_samples: cfg.min_epoch_samples };
    let run = analyze_recording(&recording, &events, &cfg, &ProcessorSet::new(), &analysis)?;
    println!(
        "{} epochs analysed, {} excluded, {} skipped as empty",
        run.segmentation.epochs.len(),
        run.segmentation.excluded.len(),
        run.skipped.len()
    );
    for kind in &run.empty_channels {
        eprintln!("warning: no report for {kind}, every epoch was empty");
    }

    // ── Outputs ──────────────────────────────────────────────────────────
    let layout = match args.date {
        Some(date) => OutputLayout::new(&args.output_dir, &args.participant, &args.initials, date),
        None => OutputLayout::today(&args.output_dir, &args.participant, &args.initials),
    };

    let mut style = ChartStyle::default();
    if let Some(font) = &args.font {
        chart::register_font_file(font)?;
        style.labels = true;
    }
    let renderer = BarChartRenderer { style: style.clone() };
    let renderer: Option<&dyn ChartRenderer> = args.charts.then_some(&renderer as &dyn ChartRenderer);

    let written = write_outputs(&run, &layout, &cfg, &XlsxSink, renderer)?;
    for path in &written {
        println!("Written → {}", path.display());
    }

    if args.timeline_plots {
        for (kind, table) in &run.tables {
            for (name, column) in table.columns.iter().zip(table.data.rows()) {
                let path = layout.timeline_path(name);
                render_timeline(column, table.sampling_rate, &events, &format!("{kind}: {name}"), &path, &style)?;
                println!("Written → {}", path.display());
            }
        }
    }

    if args.save_raw {
        let path = layout.raw_data_path();
        write_recording(&recording, &path)?;
        println!("Written → {}", path.display());
    }

    if let Some(path) = &args.json {
        let summary = serde_json::json!({
            "reports": run.reports.iter().map(|(_, r)| r).collect::<Vec<_>>(),
            "epochs": run.segmentation.epochs,
            "excluded": run.segmentation.excluded,
            "skipped": run.skipped,
            "empty_channels": run.empty_channels,
        });
        std::fs::write(path, serde_json::to_string_pretty(&summary)?)
            .with_context(|| format!("writing {}", path.display()))?;
        println!("Written → {}", path.display());
    }

    Ok(())
}
