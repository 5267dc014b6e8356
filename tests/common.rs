/// Shared helpers: synthetic recordings and timelines.
use ndarray::Array2;
use physio_epochs::{EventTable, Recording, SignalKind};

#[allow(unused)]
pub fn strings(v: &[&str]) -> Vec<String> {
    v.iter().map(|s| s.to_string()).collect()
}

#[allow(unused)]
/// The alternating Absorptive/Silence protocol: six conditions over 30 min.
pub fn protocol_events(sampling_rate: u32) -> EventTable {
    EventTable::build(
        &[0.0, 420.0, 600.0, 1020.0, 1200.0, 1620.0],
        &strings(&["Absorptive", "Silence", "Absorptive", "Silence", "Absorptive", "Silence"]),
        sampling_rate,
    )
    .unwrap()
}

#[allow(unused)]
/// Recording with one column per kind in `kinds`, named with the default
/// column identifiers.  Row `c` holds `c * 100 + sin(t)` so channels differ.
pub fn synthetic_recording(kinds: &[SignalKind], n_samples: usize, sampling_rate: u32) -> Recording {
    let data = Array2::from_shape_fn((kinds.len(), n_samples), |(c, t)| {
        c as f64 * 100.0 + (t as f64 / sampling_rate as f64).sin()
    });
    let ids: Vec<String> = kinds.iter().map(|k| k.default_column().to_string()).collect();
    Recording::from_array(data, &ids, sampling_rate).unwrap()
}

#[allow(unused)]
/// Recording whose samples equal their own index, for checking slice bounds.
pub fn ramp_recording(kind: SignalKind, n_samples: usize, sampling_rate: u32) -> Recording {
    let data = Array2::from_shape_fn((1, n_samples), |(_, t)| t as f64);
    Recording::from_array(data, &[kind.default_column().to_string()], sampling_rate).unwrap()
}

// ── MAT level 5 fixtures ─────────────────────────────────────────────────────

const MI_INT8: u32 = 1;
const MI_UINT16: u32 = 4;
const MI_INT32: u32 = 5;
const MI_UINT32: u32 = 6;
const MI_DOUBLE: u32 = 9;
const MI_MATRIX: u32 = 14;
const MX_DOUBLE_CLASS: u32 = 6;
const MX_UINT16_CLASS: u32 = 11;

fn tagged(data_type: u32, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&data_type.to_le_bytes());
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
    out.resize(out.len().next_multiple_of(8), 0);
    out
}

fn matrix(name: &str, class: u32, dims: [usize; 2], data_type: u32, real: &[u8]) -> Vec<u8> {
    let mut flags = class.to_le_bytes().to_vec();
    flags.extend_from_slice(&0u32.to_le_bytes());
    let dims: Vec<u8> = dims.iter().flat_map(|&d| (d as i32).to_le_bytes()).collect();
    let body = [
        tagged(MI_UINT32, &flags),
        tagged(MI_INT32, &dims),
        tagged(MI_INT8, name.as_bytes()),
        tagged(data_type, real),
    ]
    .concat();
    tagged(MI_MATRIX, &body)
}

#[allow(unused)]
/// Double matrix `rows × cols`; `column_major` is in MATLAB storage order.
pub fn mat_double(name: &str, rows: usize, cols: usize, column_major: &[f64]) -> Vec<u8> {
    let real: Vec<u8> = column_major.iter().flat_map(|v| v.to_le_bytes()).collect();
    matrix(name, MX_DOUBLE_CLASS, [rows, cols], MI_DOUBLE, &real)
}

#[allow(unused)]
/// Space-padded character-code matrix, one row per string.
pub fn mat_text_rows(name: &str, rows: &[&str]) -> Vec<u8> {
    let width = rows.iter().map(|r| r.len()).max().unwrap_or(0);
    let padded: Vec<Vec<u16>> = rows
        .iter()
        .map(|r| r.encode_utf16().chain(std::iter::repeat(b' ' as u16)).take(width).collect())
        .collect();
    let real: Vec<u8> = (0..width)
        .flat_map(|k| padded.iter().map(move |row| row[k]))
        .flat_map(|code| code.to_le_bytes())
        .collect();
    matrix(name, MX_UINT16_CLASS, [rows.len(), width], MI_UINT16, &real)
}

#[allow(unused)]
/// Header plus `elements`, little-endian, uncompressed.
pub fn write_mat(path: &std::path::Path, elements: &[Vec<u8>]) {
    let mut text = b"MATLAB 5.0 MAT-file, Platform: GLNXA64, Created by: physio-epochs tests".to_vec();
    text.resize(116, b' ');
    let mut out = text;
    out.extend_from_slice(&[0u8; 8]);
    out.extend_from_slice(&0x0100u16.to_le_bytes());
    out.extend_from_slice(b"IM");
    for e in elements {
        out.extend_from_slice(e);
    }
    std::fs::write(path, out).unwrap();
}
