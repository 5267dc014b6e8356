/// segment: print the epoch table a timeline produces, before running the
/// full analysis.
///
/// One line per event: label, sample bounds, duration in seconds, and flags
/// for degenerate (empty) and excluded epochs.  `--json` prints the same
/// table as JSON.
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use physio_epochs::{
    load_recording, EpochBounds, EventTable, PipelineConfig, Segmenter, Timeline,
};

#[derive(Parser, Debug)]
#[command(name = "segment")]
struct Args {
    /// Timeline JSON.
    #[arg(long)]
    timeline: PathBuf,

    /// Pipeline config JSON (boundary rule, exclusions, sampling rate).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Recording whose length bounds the last epoch.
    #[arg(long, conflicts_with = "total_samples")]
    recording: Option<PathBuf>,

    /// Recording length in samples, when no recording is given.
    #[arg(long)]
    total_samples: Option<usize>,

    /// Sampling rate in Hz (overrides the config).
    #[arg(long)]
    sampling_rate: Option<u32>,

    /// Print JSON instead of a table.
    #[arg(long)]
    json: bool,

    /// Verbosity (-v info, -vv debug).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(serde::Serialize)]
struct Row<'a> {
    label: &'a str,
    onset: usize,
    offset: usize,
    duration_s: f64,
    degenerate: bool,
    excluded: bool,
}

fn row(e: &EpochBounds, excluded: bool, sr: u32) -> Row<'_> {
    Row {
        label: &e.label,
        onset: e.onset,
        offset: e.offset,
        duration_s: e.len() as f64 / sr as f64,
        degenerate: e.is_degenerate(),
        excluded,
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(match args.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .format_timestamp(None)
        .init();

    let mut cfg = match &args.config {
        Some(path) => PipelineConfig::from_json_file(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(sr) = args.sampling_rate {
        cfg.sampling_rate = sr;
    }
    cfg.validate()?;

    let timeline = Timeline::load(&args.timeline)?;
    let events = EventTable::from_timeline(&timeline, cfg.sampling_rate)?;

    let total = match (&args.recording, args.total_samples) {
        (Some(path), _) => load_recording(path, cfg.sampling_rate)
            .with_context(|| format!("loading {}", path.display()))?
            .len(),
        (None, Some(n)) => n,
        (None, None) => anyhow::bail!("pass --recording or --total-samples"),
    };

    let seg = Segmenter::from_config(&cfg).segment(&events, total);

    // Back in timeline order.
    let mut rows: Vec<Row<'_>> = seg
        .epochs
        .iter()
        .map(|e| row(e, false, cfg.sampling_rate))
        .chain(seg.excluded.iter().map(|e| row(e, true, cfg.sampling_rate)))
        .collect();
    let order: Vec<&str> = events.events().iter().map(|e| e.label.as_str()).collect();
    rows.sort_by_key(|r| order.iter().position(|l| *l == r.label).unwrap_or(usize::MAX));

    if args.json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    println!("{:<28} {:>12} {:>12} {:>10}  flags", "label", "onset", "offset", "dur (s)");
    for r in &rows {
        let mut flags = Vec::new();
        if r.degenerate {
            flags.push("EMPTY");
        }
        if r.excluded {
            flags.push("excluded");
        }
        println!(
            "{:<28} {:>12} {:>12} {:>10.2}  {}",
            r.label,
            r.onset,
            r.offset,
            r.duration_s,
            flags.join(",")
        );
    }
    println!(
        "{} epochs, {} excluded, {} samples @ {} Hz",
        seg.epochs.len(),
        seg.excluded.len(),
        total,
        cfg.sampling_rate
    );
    Ok(())
}
