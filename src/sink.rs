//! Run output: folder layout and the spreadsheet writer.
use chrono::NaiveDate;
use rust_xlsxwriter::{Format, Workbook};
use std::path::{Path, PathBuf};

use crate::error::{PipelineError, Result};
use crate::report::Report;

/// Where one run writes its files.
///
/// Everything lands in `<root>/<participant>_<initials>_<YYYY_MM_DD>/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    pub root: PathBuf,
    pub participant_id: String,
    pub researcher_initials: String,
    pub date: NaiveDate,
}

impl OutputLayout {
    pub fn new(
        root: impl Into<PathBuf>,
        participant_id: impl Into<String>,
        researcher_initials: impl Into<String>,
        date: NaiveDate,
    ) -> Self {
        Self {
            root: root.into(),
            participant_id: participant_id.into(),
            researcher_initials: researcher_initials.into(),
            date,
        }
    }

    /// Layout dated today (local time).
    pub fn today(
        root: impl Into<PathBuf>,
        participant_id: impl Into<String>,
        researcher_initials: impl Into<String>,
    ) -> Self {
        Self::new(root, participant_id, researcher_initials, chrono::Local::now().date_naive())
    }

    pub fn date_stamp(&self) -> String {
        self.date.format("%Y_%m_%d").to_string()
    }

    pub fn run_dir(&self) -> PathBuf {
        self.root.join(format!(
            "{}_{}_{}",
            self.participant_id,
            self.researcher_initials,
            self.date_stamp()
        ))
    }

    /// `processed_data_<feature_type>_<participant>_<initials>_<date>.xlsx`
    pub fn report_path(&self, feature_type: &str) -> PathBuf {
        self.run_dir().join(format!(
            "processed_data_{}_{}_{}_{}.xlsx",
            feature_type,
            self.participant_id,
            self.researcher_initials,
            self.date_stamp()
        ))
    }

    /// `<metric>_<feature_type>_<participant>_<initials>.png`
    pub fn chart_path(&self, metric: &str, feature_type: &str) -> PathBuf {
        self.run_dir().join(format!(
            "{}_{}_{}_{}.png",
            file_safe(metric),
            feature_type,
            self.participant_id,
            self.researcher_initials
        ))
    }

    /// `<column>_timeline_<participant>_<initials>.png`
    pub fn timeline_path(&self, column: &str) -> PathBuf {
        self.run_dir().join(format!(
            "{}_timeline_{}_{}.png",
            file_safe(column),
            self.participant_id,
            self.researcher_initials
        ))
    }

    /// Copy of the raw recording, `raw_data_<participant>_<initials>_<date>.csv`.
    pub fn raw_data_path(&self) -> PathBuf {
        self.run_dir().join(format!(
            "raw_data_{}_{}_{}.csv",
            self.participant_id,
            self.researcher_initials,
            self.date_stamp()
        ))
    }

    pub fn create_run_dir(&self) -> Result<PathBuf> {
        let dir = self.run_dir();
        std::fs::create_dir_all(&dir).map_err(|e| PipelineError::io(&dir, e))?;
        Ok(dir)
    }
}

fn file_safe(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') { c } else { '_' })
        .collect()
}

// ── Spreadsheet ──────────────────────────────────────────────────────────────

/// Persists named reports as sheets of one document.
pub trait SpreadsheetSink {
    fn write(&self, sheets: &[(String, &Report)], path: &Path) -> Result<()>;
}

/// `.xlsx` workbook, one worksheet per report.
///
/// Sheet layout: labels across the first row, metric names down the first
/// column.  Non-finite values are left blank.
#[derive(Debug, Clone, Copy, Default)]
pub struct XlsxSink;

/// Excel caps sheet names at 31 characters and forbids `[]:*?/\`.
fn sheet_title(name: &str) -> String {
    name.chars()
        .map(|c| if matches!(c, '[' | ']' | ':' | '*' | '?' | '/' | '\\') { '_' } else { c })
        .take(31)
        .collect()
}

impl SpreadsheetSink for XlsxSink {
    fn write(&self, sheets: &[(String, &Report)], path: &Path) -> Result<()> {
        if sheets.is_empty() {
            return Err(PipelineError::export(path, "no reports to write"));
        }
        let err = |e: rust_xlsxwriter::XlsxError| PipelineError::export(path, e);

        let mut workbook = Workbook::new();
        let bold = Format::new().set_bold();
        for (name, report) in sheets {
            let sheet = workbook.add_worksheet();
            sheet.set_name(sheet_title(name)).map_err(err)?;

            for (j, label) in report.labels.iter().enumerate() {
                sheet.write_string_with_format(0, col(j + 1), label, &bold).map_err(err)?;
            }
            for (i, metric) in report.metrics.iter().enumerate() {
                let row = (i + 1) as u32;
                sheet.write_string_with_format(row, 0, metric, &bold).map_err(err)?;
                for (j, &v) in report.values.row(i).iter().enumerate() {
                    if v.is_finite() {
                        sheet.write_number(row, col(j + 1), v).map_err(err)?;
                    }
                }
            }
            log::debug!("sheet {name}: {} metrics × {} labels", report.metrics.len(), report.labels.len());
        }

        workbook.save(path).map_err(err)?;
        log::info!("wrote {} sheets to {}", sheets.len(), path.display());
        Ok(())
    }
}

fn col(j: usize) -> u16 {
    u16::try_from(j).unwrap_or(u16::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::AnalysisRow;
    use crate::report::assemble;

    fn layout(root: &Path) -> OutputLayout {
        OutputLayout::new(root, "P07", "JD", NaiveDate::from_ymd_opt(2024, 3, 9).unwrap())
    }

    #[test]
    fn layout_names() {
        let l = layout(Path::new("/out"));
        assert_eq!(l.run_dir(), PathBuf::from("/out/P07_JD_2024_03_09"));
        assert_eq!(
            l.report_path("interval_related"),
            PathBuf::from("/out/P07_JD_2024_03_09/processed_data_interval_related_P07_JD_2024_03_09.xlsx")
        );
        assert_eq!(
            l.chart_path("ECG_Rate_Mean", "interval_related"),
            PathBuf::from("/out/P07_JD_2024_03_09/ECG_Rate_Mean_interval_related_P07_JD.png")
        );
        assert_eq!(
            l.chart_path("HRV/LF", "x").file_name().unwrap().to_str().unwrap(),
            "HRV_LF_x_P07_JD.png"
        );
    }

    #[test]
    fn sheet_titles_are_sanitised() {
        assert_eq!(sheet_title("ECG_Analysis"), "ECG_Analysis");
        assert_eq!(sheet_title("a/b"), "a_b");
        assert_eq!(sheet_title(&"x".repeat(40)).len(), 31);
    }

    #[test]
    fn writes_workbook() {
        let dir = tempfile::tempdir().unwrap();
        let l = layout(dir.path());
        l.create_run_dir().unwrap();
        let mut row = AnalysisRow::new().with("x", 1.0).with("y", f64::NAN);
        row.label = "Absorptive_1".into();
        let rep = assemble("ECG", vec![row]).unwrap();
        let path = l.report_path("interval_related");
        XlsxSink.write(&[("ECG_Analysis".to_string(), &rep)], &path).unwrap();
        assert!(std::fs::metadata(&path).unwrap().len() > 0);
    }

    #[test]
    fn empty_sheet_list_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let r = XlsxSink.write(&[], &dir.path().join("x.xlsx"));
        assert!(matches!(r, Err(PipelineError::Export { .. })));
    }
}
