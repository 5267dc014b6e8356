mod common;

use approx::assert_abs_diff_eq;
use chrono::NaiveDate;
use common::{
    mat_double, mat_text_rows, protocol_events, ramp_recording, strings, synthetic_recording,
    write_mat,
};
use physio_epochs::{
    analyze_recording, load_recording, write_outputs, write_recording, BarChartRenderer,
    ChartRenderer, Channel, EventTable, IntervalSummary, OutputLayout, PipelineConfig,
    PipelineError, ProcessorSet, SignalKind, SignalProcessor, SignalTable, XlsxSink,
};

const SR: u32 = 10;

fn config(signals: &[SignalKind]) -> PipelineConfig {
    PipelineConfig {
        sampling_rate: SR,
        signals: signals.to_vec(),
        ..PipelineConfig::default()
    }
}

#[test]
fn one_report_per_signal_with_one_column_per_condition() {
    let kinds = [SignalKind::Ecg, SignalKind::Eda];
    let rec = synthetic_recording(&kinds, SR as usize * 1800, SR);
    let run = analyze_recording(
        &rec,
        &protocol_events(SR),
        &config(&kinds),
        &ProcessorSet::new(),
        &IntervalSummary::default(),
    )
    .unwrap();

    assert_eq!(run.reports.len(), 2);
    let (kind, ecg) = &run.reports[0];
    assert_eq!(*kind, SignalKind::Ecg);
    assert_eq!(ecg.channel, "ECG");
    assert_eq!(ecg.labels.len(), 6);
    assert_eq!(ecg.labels[0], "Absorptive_1");
    assert_eq!(ecg.metrics[0], "Epoch_Duration_s");
    assert_abs_diff_eq!(ecg.value("Epoch_Duration_s", "Absorptive_1").unwrap(), 420.0);
    assert_abs_diff_eq!(ecg.value("Epoch_Duration_s", "Silence_6").unwrap(), 180.0);

    let (_, eda) = &run.reports[1];
    // EDA is row 1 of the synthetic recording: offset by 100.
    assert!(eda.value("EDA_Raw_Mean", "Silence_2").unwrap() > 98.0);
    assert!(run.skipped.is_empty());
    assert!(run.empty_channels.is_empty());
}

#[test]
fn excluded_labels_never_reach_a_report() {
    let rec = synthetic_recording(&[SignalKind::Ecg], SR as usize * 100, SR);
    let events = EventTable::build(
        &[0.0, 20.0, 30.0, 60.0],
        &strings(&["Absorptive", "PCI", "Silence", "pci check"]),
        SR,
    )
    .unwrap();
    let run = analyze_recording(
        &rec,
        &events,
        &config(&[SignalKind::Ecg]),
        &ProcessorSet::new(),
        &IntervalSummary::default(),
    )
    .unwrap();

    let report = &run.reports[0].1;
    assert_eq!(report.labels, vec!["Absorptive_1", "Silence_3"]);
    assert!(report.labels.iter().all(|l| !l.to_lowercase().contains("pci")));
    assert_eq!(run.segmentation.excluded.len(), 2);
    // the epoch before PCI still ends at PCI's onset
    assert_abs_diff_eq!(report.value("Epoch_Duration_s", "Absorptive_1").unwrap(), 20.0);
}

#[test]
fn repeated_onset_is_skipped_not_fatal() {
    let rec = ramp_recording(SignalKind::Eda, 500, 1);
    let events = EventTable::build(&[100.0, 100.0, 300.0], &strings(&["A", "B", "C"]), 1).unwrap();
    let cfg = PipelineConfig { sampling_rate: 1, ..config(&[SignalKind::Eda]) };
    let run = analyze_recording(&rec, &events, &cfg, &ProcessorSet::new(), &IntervalSummary::default())
        .unwrap();

    assert_eq!(run.skipped.len(), 1);
    assert_eq!(run.skipped[0].label, "A_1");
    let report = &run.reports[0].1;
    assert_eq!(report.labels, vec!["B_2", "C_3"]);
    // ramp: mean of [100, 300) is 199.5
    assert_abs_diff_eq!(report.value("EDA_Raw_Mean", "B_2").unwrap(), 199.5);
    assert_abs_diff_eq!(report.value("EDA_Raw_Min", "C_3").unwrap(), 300.0);
}

#[test]
fn signal_with_only_empty_epochs_is_reported_as_empty() {
    let rec = ramp_recording(SignalKind::Ecg, 50, 1);
    let events = EventTable::build(&[80.0], &strings(&["Late"]), 1).unwrap();
    let cfg = PipelineConfig { sampling_rate: 1, ..config(&[SignalKind::Ecg]) };
    let run = analyze_recording(&rec, &events, &cfg, &ProcessorSet::new(), &IntervalSummary::default())
        .unwrap();

    assert!(run.reports.is_empty());
    assert_eq!(run.empty_channels, vec![SignalKind::Ecg]);

    let dir = tempfile::tempdir().unwrap();
    let layout = OutputLayout::new(dir.path(), "P1", "AB", NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
    let r = write_outputs(&run, &layout, &cfg, &XlsxSink, None);
    assert!(matches!(r, Err(PipelineError::EmptyReport(_))));
}

#[test]
fn parallel_matches_sequential() {
    let kinds = [SignalKind::Ecg, SignalKind::Rsp, SignalKind::Eda, SignalKind::Ppg];
    let rec = synthetic_recording(&kinds, SR as usize * 1800, SR);
    let events = protocol_events(SR);
    let seq_cfg = config(&kinds);
    let par_cfg = PipelineConfig { parallel: true, ..seq_cfg.clone() };

    let a = analyze_recording(&rec, &events, &seq_cfg, &ProcessorSet::new(), &IntervalSummary::default())
        .unwrap();
    let b = analyze_recording(&rec, &events, &par_cfg, &ProcessorSet::new(), &IntervalSummary::default())
        .unwrap();

    assert_eq!(a.reports, b.reports);
    let order: Vec<SignalKind> = b.reports.iter().map(|(k, _)| *k).collect();
    assert_eq!(order, kinds);
}

#[test]
fn missing_column_stops_the_run() {
    let rec = synthetic_recording(&[SignalKind::Ecg], 100, SR);
    let r = analyze_recording(
        &rec,
        &protocol_events(SR),
        &config(&[SignalKind::Ecg, SignalKind::Rsp]),
        &ProcessorSet::new(),
        &IntervalSummary::default(),
    );
    match r {
        Err(PipelineError::MissingColumn { kind, column }) => {
            assert_eq!(kind, SignalKind::Rsp);
            assert_eq!(column, "RSP100C (Volts)");
        }
        other => panic!("expected MissingColumn, got {other:?}"),
    }
}

#[test]
fn sampling_rate_mismatch_is_a_configuration_error() {
    let rec = synthetic_recording(&[SignalKind::Ecg], 100, 2000);
    let r = analyze_recording(
        &rec,
        &protocol_events(SR),
        &config(&[SignalKind::Ecg]),
        &ProcessorSet::new(),
        &IntervalSummary::default(),
    );
    assert!(matches!(r, Err(PipelineError::Configuration(_))));
}

#[test]
fn processor_failure_names_the_signal() {
    struct Broken;
    impl SignalProcessor for Broken {
        fn process(&self, _raw: &Channel, _sr: u32) -> anyhow::Result<SignalTable> {
            anyhow::bail!("no R-peaks found")
        }
    }
    let kinds = [SignalKind::Ecg, SignalKind::Eda];
    let rec = synthetic_recording(&kinds, SR as usize * 1800, SR);
    let processors = ProcessorSet::new().with(SignalKind::Eda, Broken);
    let r = analyze_recording(&rec, &protocol_events(SR), &config(&kinds), &processors, &IntervalSummary::default());
    match r {
        Err(PipelineError::Processing { kind, reason }) => {
            assert_eq!(kind, SignalKind::Eda);
            assert!(reason.contains("R-peaks"));
        }
        other => panic!("expected Processing, got {other:?}"),
    }
}

#[test]
fn analysis_failure_aborts_the_run() {
    let rec = synthetic_recording(&[SignalKind::Ecg], SR as usize * 1800, SR);
    let picky = IntervalSummary { min_samples: 5000 };
    let r = analyze_recording(&rec, &protocol_events(SR), &config(&[SignalKind::Ecg]), &ProcessorSet::new(), &picky);
    match r {
        Err(PipelineError::AnalysisFailure { channel, label, .. }) => {
            assert_eq!(channel, "ECG");
            assert_eq!(label, "Absorptive_1");
        }
        other => panic!("expected AnalysisFailure, got {other:?}"),
    }
}

#[test]
fn outputs_are_written_into_the_run_folder() {
    let kinds = [SignalKind::Ecg, SignalKind::Eda];
    let rec = synthetic_recording(&kinds, SR as usize * 1800, SR);
    let cfg = PipelineConfig {
        chart_metrics: strings(&["Epoch_Duration_s", "ECG_Raw_Mean"]),
        ..config(&kinds)
    };
    let run = analyze_recording(&rec, &protocol_events(SR), &cfg, &ProcessorSet::new(), &IntervalSummary::default())
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let layout = OutputLayout::new(dir.path(), "P07", "JD", NaiveDate::from_ymd_opt(2024, 3, 9).unwrap());
    let renderer: &dyn ChartRenderer = &BarChartRenderer::default();
    let written = write_outputs(&run, &layout, &cfg, &XlsxSink, Some(renderer)).unwrap();

    let run_dir = dir.path().join("P07_JD_2024_03_09");
    assert_eq!(
        written[0],
        run_dir.join("processed_data_interval_related_P07_JD_2024_03_09.xlsx")
    );
    // ECG: both metrics; EDA: only the duration (ECG_Raw_Mean is not an EDA row).
    assert_eq!(written.len(), 1 + 2 + 1);
    assert!(written.iter().all(|p| p.exists()));
    assert!(run_dir.join("ECG_Raw_Mean_interval_related_P07_JD.png").exists());
    assert!(run_dir.join("ECG_Epoch_Duration_s_interval_related_P07_JD.png").exists());
    assert!(run_dir.join("EDA_Epoch_Duration_s_interval_related_P07_JD.png").exists());
}

#[test]
fn recordings_survive_a_csv_and_safetensors_trip() {
    let kinds = [SignalKind::Ecg, SignalKind::Ppg];
    let rec = synthetic_recording(&kinds, 40, SR);
    let dir = tempfile::tempdir().unwrap();

    for name in ["rec.csv", "rec.safetensors"] {
        let path = dir.path().join(name);
        write_recording(&rec, &path).unwrap();
        let back = load_recording(&path, SR).unwrap();
        assert_eq!(back.column_ids(), rec.column_ids());
        assert_eq!(back.len(), 40);
        for (a, b) in rec.channels().iter().zip(back.channels()) {
            for (x, y) in a.samples.iter().zip(b.samples.iter()) {
                assert_abs_diff_eq!(*x, *y, epsilon = 1e-12);
            }
        }
    }
}

#[test]
fn mat_export_is_transposed_and_named_by_label_and_unit() {
    let t = 40;
    // [T, C] in column-major order: the ECG column, then the EDA column.
    let stored: Vec<f64> = (0..t).map(|i| i as f64).chain((0..t).map(|i| 100.0 + i as f64)).collect();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("8_OG_pilot.mat");
    write_mat(
        &path,
        &[
            mat_double("data", t, 2, &stored),
            mat_text_rows("labels", &["ECG100C", "EDA100C"]),
            mat_text_rows("units", &["mV", "microsiemens"]),
        ],
    );

    let rec = load_recording(&path, SR).unwrap();
    assert_eq!(rec.column_ids(), vec!["ECG100C (mV)", "EDA100C (microsiemens)"]);
    assert_eq!(rec.len(), t);
    assert_eq!(rec.channels()[0].samples[7], 7.0);
    assert_eq!(rec.channels()[1].samples[7], 107.0);

    let events = EventTable::build(&[0.0, 2.0], &strings(&["Absorptive", "Silence"]), SR).unwrap();
    let cfg = config(&[SignalKind::Ecg, SignalKind::Eda]);
    let run = analyze_recording(&rec, &events, &cfg, &ProcessorSet::new(), &IntervalSummary::default())
        .unwrap();
    let (_, eda) = &run.reports[1];
    assert_eq!(eda.value("EDA_Raw_Min", "Absorptive_1"), Some(100.0));
    assert_eq!(eda.value("EDA_Raw_Max", "Silence_2"), Some(139.0));
}

#[test]
fn mat_without_data_matrix_is_a_load_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rec.mat");
    write_mat(&path, &[mat_text_rows("labels", &["ECG100C"])]);
    assert!(matches!(load_recording(&path, SR), Err(PipelineError::Load { .. })));
}

#[test]
fn unsupported_extension_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rec.acq");
    std::fs::write(&path, b"\0\0").unwrap();
    assert!(matches!(load_recording(&path, SR), Err(PipelineError::Load { .. })));
}
