//! Recording I/O.
//!
//! Three on-disk layouts are understood, picked by file extension:
//!
//! - **MAT** (`.mat`, level 5): the acquisition export. A numeric `data`
//!   matrix stored `[T, C]`, plus `labels` and `units` with one row per
//!   channel. Columns are named `"<label> (<unit>)"`.
//! - **CSV** (`.csv`, `.txt`): a header row of column identifiers
//!   (`"ECG100C (mV)"`, …) and one row per sample.  A blank first header
//!   (a pandas index column) is skipped.
//! - **safetensors** (`.safetensors`): a `data` tensor `[C, T]` (F32 or F64),
//!   newline-joined `labels` and optional `units` as U8 tensors, and an
//!   optional `sfreq` scalar checked against the declared rate.
use matfile::{MatFile, NumericData};
use ndarray::Array2;
use std::collections::HashMap;
use std::path::Path;

use crate::error::{PipelineError, Result};
use crate::signal::{column_id, Recording};

/// Load a recording sampled at `sampling_rate` Hz.
pub fn load_recording(path: &Path, sampling_rate: u32) -> Result<Recording> {
    if !path.exists() {
        return Err(PipelineError::io(
            path,
            std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"),
        ));
    }
    let rec = match extension(path).as_str() {
        "mat" => read_mat(path, sampling_rate)?,
        "csv" | "txt" => read_csv(path, sampling_rate)?,
        "safetensors" => read_safetensors(path, sampling_rate)?,
        other => {
            return Err(PipelineError::load(
                path,
                format!("unsupported extension '{other}' (expected mat, csv, txt or safetensors)"),
            ))
        }
    };
    log::info!(
        "loaded {} channels × {} samples @ {} Hz from {}",
        rec.channels().len(),
        rec.len(),
        sampling_rate,
        path.display()
    );
    Ok(rec)
}

/// Write `recording` as CSV or safetensors, by extension.
pub fn write_recording(recording: &Recording, path: &Path) -> Result<()> {
    match extension(path).as_str() {
        "csv" | "txt" => write_csv(recording, path),
        "safetensors" => {
            let flat: Vec<f64> = recording
                .channels()
                .iter()
                .flat_map(|c| c.samples.iter().copied())
                .collect();
            let (labels, units): (Vec<&str>, Vec<&str>) = recording
                .channels()
                .iter()
                .map(|c| (c.name.as_str(), c.unit.as_str()))
                .unzip();
            let mut w = StWriter::new();
            w.add_f64("data", &flat, &[recording.channels().len(), recording.len()]);
            w.add_text("labels", &labels.join("\n"));
            w.add_text("units", &units.join("\n"));
            w.add_f64("sfreq", &[f64::from(recording.sampling_rate())], &[1]);
            w.write(path)
        }
        other => Err(PipelineError::export(path, format!("unsupported extension '{other}'"))),
    }
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase()
}

// ── MAT ───────────────────────────────────────────────────────────────────────

fn read_mat(path: &Path, sampling_rate: u32) -> Result<Recording> {
    let file = std::fs::File::open(path).map_err(|e| PipelineError::io(path, e))?;
    let mat = MatFile::parse(std::io::BufReader::new(file))
        .map_err(|e| PipelineError::load(path, format!("not a MAT file: {e:?}")))?;

    let data = mat
        .find_by_name("data")
        .ok_or_else(|| PipelineError::load(path, "missing numeric 'data' matrix"))?;
    let (t, c) = match data.size()[..] {
        [t, c] => (t, c),
        ref dims => {
            return Err(PipelineError::load(
                path,
                format!("'data' must be 2-D [samples, channels], got {dims:?}"),
            ))
        }
    };
    let values = numeric_values(data.data());
    if values.len() != t * c {
        return Err(PipelineError::load(
            path,
            format!("'data' holds {} values for {t} × {c}", values.len()),
        ));
    }
    // Column-major [T, C] is row-major [C, T].
    let table = Array2::from_shape_vec((c, t), values).map_err(|e| PipelineError::load(path, e))?;

    let labels = match mat.find_by_name("labels") {
        Some(a) => char_rows(a),
        None => {
            log::warn!("{}: no numeric 'labels', naming channels CH1..CH{c}", path.display());
            (1..=c).map(|i| format!("CH{i}")).collect()
        }
    };
    let units = match mat.find_by_name("units") {
        Some(a) => char_rows(a),
        None => vec![String::new(); c],
    };
    if labels.len() != c || units.len() != c {
        return Err(PipelineError::load(
            path,
            format!("{} labels / {} units for {c} channels", labels.len(), units.len()),
        ));
    }

    let ids: Vec<String> = labels.iter().zip(&units).map(|(l, u)| column_id(l, u)).collect();
    Recording::from_array(table, &ids, sampling_rate)
}

fn numeric_values(data: &NumericData) -> Vec<f64> {
    fn widen<T: Copy + Into<f64>>(v: &[T]) -> Vec<f64> {
        v.iter().map(|&x| x.into()).collect()
    }
    match data {
        NumericData::Double { real, .. } => real.clone(),
        NumericData::Single { real, .. } => widen(real),
        NumericData::Int8 { real, .. } => widen(real),
        NumericData::UInt8 { real, .. } => widen(real),
        NumericData::Int16 { real, .. } => widen(real),
        NumericData::UInt16 { real, .. } => widen(real),
        NumericData::Int32 { real, .. } => widen(real),
        NumericData::UInt32 { real, .. } => widen(real),
        NumericData::Int64 { real, .. } => real.iter().map(|&x| x as f64).collect(),
        NumericData::UInt64 { real, .. } => real.iter().map(|&x| x as f64).collect(),
    }
}

/// Decode a character-code matrix, one string per row, padding trimmed.
fn char_rows(array: &matfile::Array) -> Vec<String> {
    let codes = numeric_values(array.data());
    let (rows, cols) = match array.size()[..] {
        [r, c] => (r, c),
        _ => (1, codes.len()),
    };
    (0..rows)
        .map(|r| {
            (0..cols)
                .filter_map(|k| codes.get(k * rows + r))
                .filter_map(|&code| char::from_u32(code as u32))
                .collect::<String>()
                .trim_matches(|ch: char| ch.is_whitespace() || ch == '\0')
                .to_string()
        })
        .collect()
}

// ── CSV ───────────────────────────────────────────────────────────────────────

fn read_csv(path: &Path, sampling_rate: u32) -> Result<Recording> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| PipelineError::load(path, e))?;

    let headers = reader.headers().map_err(|e| PipelineError::load(path, e))?.clone();
    let skip_index = headers.get(0).is_some_and(|h| h.is_empty());
    let columns: Vec<String> = headers
        .iter()
        .skip(usize::from(skip_index))
        .map(str::to_string)
        .collect();
    if columns.is_empty() {
        return Err(PipelineError::load(path, "no data columns in header"));
    }

    let mut per_column: Vec<Vec<f64>> = vec![Vec::new(); columns.len()];
    for (line, record) in reader.records().enumerate() {
        let record = record.map_err(|e| PipelineError::load(path, e))?;
        let fields = record.iter().skip(usize::from(skip_index));
        let mut n = 0;
        for (c, field) in fields.enumerate() {
            let col = per_column.get_mut(c).ok_or_else(|| {
                PipelineError::load(path, format!("row {} has too many fields", line + 2))
            })?;
            let v = if field.is_empty() {
                f64::NAN
            } else {
                field.parse::<f64>().map_err(|_| {
                    PipelineError::load(path, format!("row {}: '{field}' is not a number", line + 2))
                })?
            };
            col.push(v);
            n += 1;
        }
        if n != columns.len() {
            return Err(PipelineError::load(
                path,
                format!("row {} has {n} fields, expected {}", line + 2, columns.len()),
            ));
        }
    }

    let t = per_column[0].len();
    let flat: Vec<f64> = per_column.into_iter().flatten().collect();
    let data = Array2::from_shape_vec((columns.len(), t), flat)
        .map_err(|e| PipelineError::load(path, e))?;
    Recording::from_array(data, &columns, sampling_rate)
}

fn write_csv(recording: &Recording, path: &Path) -> Result<()> {
    let mut w = csv::Writer::from_path(path).map_err(|e| PipelineError::export(path, e))?;
    w.write_record(recording.column_ids())
        .map_err(|e| PipelineError::export(path, e))?;
    for t in 0..recording.len() {
        let row = recording.channels().iter().map(|c| c.samples[t].to_string());
        w.write_record(row).map_err(|e| PipelineError::export(path, e))?;
    }
    w.flush().map_err(|e| PipelineError::io(path, e))
}

// ── safetensors ───────────────────────────────────────────────────────────────

fn parse_header(bytes: &[u8]) -> std::result::Result<(HashMap<String, serde_json::Value>, usize), String> {
    if bytes.len() < 8 {
        return Err("safetensors file too small".into());
    }
    let n = u64::from_le_bytes([
        bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
    ]) as usize;
    let end = 8usize.checked_add(n).filter(|&e| e <= bytes.len()).ok_or("header length out of range")?;
    let header: HashMap<String, serde_json::Value> = serde_json::from_slice(&bytes[8..end])
        .map_err(|e| format!("failed to parse safetensors header: {e}"))?;
    Ok((header, end))
}

struct TensorRef<'a> {
    dtype: &'a str,
    shape: Vec<usize>,
    raw: &'a [u8],
}

fn tensor<'a>(
    bytes: &'a [u8],
    data_start: usize,
    header: &'a HashMap<String, serde_json::Value>,
    key: &str,
) -> std::result::Result<Option<TensorRef<'a>>, String> {
    let Some(entry) = header.get(key) else {
        return Ok(None);
    };
    let dtype = entry["dtype"].as_str().ok_or_else(|| format!("'{key}': missing dtype"))?;
    let offsets = entry["data_offsets"]
        .as_array()
        .filter(|o| o.len() == 2)
        .ok_or_else(|| format!("'{key}': bad data_offsets"))?;
    let s = offsets[0].as_u64().unwrap_or(u64::MAX) as usize;
    let e = offsets[1].as_u64().unwrap_or(u64::MAX) as usize;
    let raw = data_start
        .checked_add(e)
        .filter(|&end| s <= e && end <= bytes.len())
        .map(|end| &bytes[data_start + s..end])
        .ok_or_else(|| format!("'{key}': data offsets out of range"))?;
    let shape = entry["shape"]
        .as_array()
        .map(|a| a.iter().filter_map(|v| v.as_u64().map(|x| x as usize)).collect())
        .unwrap_or_default();
    Ok(Some(TensorRef { dtype, shape, raw }))
}

fn as_f64(t: &TensorRef<'_>) -> std::result::Result<Vec<f64>, String> {
    match t.dtype {
        "F32" => Ok(t
            .raw
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64)
            .collect()),
        "F64" => Ok(t
            .raw
            .chunks_exact(8)
            .map(|b| f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
            .collect()),
        other => Err(format!("unsupported dtype {other}")),
    }
}

fn as_lines(t: &TensorRef<'_>) -> std::result::Result<Vec<String>, String> {
    let s = std::str::from_utf8(t.raw).map_err(|e| e.to_string())?;
    Ok(s.split('\n').map(String::from).collect())
}

fn read_safetensors(path: &Path, sampling_rate: u32) -> Result<Recording> {
    let bytes = std::fs::read(path).map_err(|e| PipelineError::io(path, e))?;
    let (header, data_start) = parse_header(&bytes).map_err(|e| PipelineError::load(path, e))?;
    let get = |key: &str| tensor(&bytes, data_start, &header, key).map_err(|e| PipelineError::load(path, e));

    let data_t = get("data")?.ok_or_else(|| PipelineError::load(path, "missing 'data' tensor"))?;
    if data_t.shape.len() != 2 {
        return Err(PipelineError::load(path, "'data' must be 2-D [channels, samples]"));
    }
    let values = as_f64(&data_t).map_err(|e| PipelineError::load(path, e))?;
    let data = Array2::from_shape_vec((data_t.shape[0], data_t.shape[1]), values)
        .map_err(|e| PipelineError::load(path, e))?;

    let labels = match get("labels")? {
        Some(t) => as_lines(&t).map_err(|e| PipelineError::load(path, e))?,
        None => return Err(PipelineError::load(path, "missing 'labels' tensor")),
    };
    let units = match get("units")? {
        Some(t) => as_lines(&t).map_err(|e| PipelineError::load(path, e))?,
        None => vec![String::new(); labels.len()],
    };
    if labels.len() != data.nrows() || units.len() != labels.len() {
        return Err(PipelineError::load(
            path,
            format!("{} labels / {} units for {} channels", labels.len(), units.len(), data.nrows()),
        ));
    }

    if let Some(t) = get("sfreq")? {
        let stored = as_f64(&t).map_err(|e| PipelineError::load(path, e))?;
        if let Some(&sf) = stored.first() {
            if (sf - sampling_rate as f64).abs() > 1e-6 {
                return Err(PipelineError::Configuration(format!(
                    "{} was recorded at {sf} Hz but {sampling_rate} Hz was declared",
                    path.display()
                )));
            }
        }
    }

    let ids: Vec<String> = labels.iter().zip(&units).map(|(l, u)| column_id(l, u)).collect();
    Recording::from_array(data, &ids, sampling_rate)
}

// ── safetensors writer ────────────────────────────────────────────────────────

struct StTensor {
    name: String,
    dtype: &'static str,
    shape: Vec<usize>,
    bytes: Vec<u8>,
}

/// Builds a safetensors file from F64 and U8 (text) tensors, in insertion
/// order.
///
/// ```rust,no_run
/// use physio_epochs::io::StWriter;
/// use std::path::Path;
/// let mut w = StWriter::new();
/// w.add_f64("data", &[1.0, 2.0, 3.0, 4.0], &[2, 2]);
/// w.add_text("labels", "ECG100C\nRSP100C");
/// w.write(Path::new("/tmp/rec.safetensors")).unwrap();
/// ```
#[derive(Default)]
pub struct StWriter {
    tensors: Vec<StTensor>,
}

impl StWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_f64(&mut self, name: &str, values: &[f64], shape: &[usize]) {
        self.tensors.push(StTensor {
            name: name.to_string(),
            dtype: "F64",
            shape: shape.to_vec(),
            bytes: values.iter().flat_map(|v| v.to_le_bytes()).collect(),
        });
    }

    pub fn add_text(&mut self, name: &str, text: &str) {
        self.tensors.push(StTensor {
            name: name.to_string(),
            dtype: "U8",
            shape: vec![text.len()],
            bytes: text.as_bytes().to_vec(),
        });
    }

    /// Length-prefixed JSON header, space-padded to 8 bytes, then the
    /// tensor payloads back to back.
    fn header(&self) -> serde_json::Result<Vec<u8>> {
        let mut entries = serde_json::Map::new();
        let mut start = 0;
        for t in &self.tensors {
            let end = start + t.bytes.len();
            entries.insert(
                t.name.clone(),
                serde_json::json!({ "dtype": t.dtype, "shape": t.shape, "data_offsets": [start, end] }),
            );
            start = end;
        }
        let mut json = serde_json::to_vec(&entries)?;
        json.resize(json.len().next_multiple_of(8), b' ');
        Ok(json)
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let header = self.header().map_err(|e| PipelineError::export(path, e))?;
        let payload: usize = self.tensors.iter().map(|t| t.bytes.len()).sum();
        let mut out = Vec::with_capacity(8 + header.len() + payload);
        out.extend_from_slice(&(header.len() as u64).to_le_bytes());
        out.extend_from_slice(&header);
        for t in &self.tensors {
            out.extend_from_slice(&t.bytes);
        }
        std::fs::write(path, out).map_err(|e| PipelineError::io(path, e))
    }
}
