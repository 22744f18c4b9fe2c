//! Array file I/O
//!
//! Little-endian layout:
//!
//! ```text
//! u32 rank | rank x u32 dims (fastest axis first) | samples
//! ```
//!
//! Samples are `f32` for real arrays and interleaved `f32` (re, im) pairs for
//! complex arrays. Gzip-compressed files are detected on read; paths ending in
//! `.gz` are compressed on write.

use std::fs::File;
use std::io::{BufReader, BufWriter, Cursor, Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use num_complex::Complex64;

use crate::volume::Volume;

/// Failure reading or writing an array file.
#[derive(Debug, thiserror::Error)]
pub enum ArrayIoError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed array file {path}: {detail}")]
    Format { path: PathBuf, detail: String },
}

/// Array of arbitrary rank as stored on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct NdArray<T> {
    pub dims: Vec<usize>,
    pub data: Vec<T>,
}

impl NdArray<Complex64> {
    /// Convert to a [`Volume`]; fails unless the array has rank 3.
    pub fn into_volume(self) -> crate::error::Result<Volume> {
        Volume::from_shape_vec(&self.dims, self.data)
    }
}

/// Check if bytes are gzip compressed
fn is_gzip(bytes: &[u8]) -> bool {
    bytes.len() >= 2 && bytes[0] == 0x1f && bytes[1] == 0x8b
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> ArrayIoError + '_ {
    move |source| ArrayIoError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn format_err(path: &Path, detail: impl Into<String>) -> ArrayIoError {
    ArrayIoError::Format {
        path: path.to_path_buf(),
        detail: detail.into(),
    }
}

fn read_bytes(path: &Path) -> Result<Vec<u8>, ArrayIoError> {
    let mut raw = Vec::new();
    BufReader::new(File::open(path).map_err(io_err(path))?)
        .read_to_end(&mut raw)
        .map_err(io_err(path))?;
    if !is_gzip(&raw) {
        return Ok(raw);
    }
    let mut decompressed = Vec::new();
    GzDecoder::new(Cursor::new(raw))
        .read_to_end(&mut decompressed)
        .map_err(io_err(path))?;
    Ok(decompressed)
}

/// Parse the header and return `(dims, sample bytes)`.
fn parse<'a>(
    path: &Path,
    bytes: &'a [u8],
    floats_per_sample: usize,
) -> Result<(Vec<usize>, &'a [u8]), ArrayIoError> {
    let mut words = bytes.chunks_exact(4).map(|w| u32::from_le_bytes([w[0], w[1], w[2], w[3]]));
    let rank = words
        .next()
        .ok_or_else(|| format_err(path, "missing rank"))? as usize;
    if rank == 0 {
        return Err(format_err(path, "rank is 0"));
    }
    let header_len = 4 * (1 + rank);
    if bytes.len() < header_len {
        return Err(format_err(
            path,
            format!("header of a rank-{rank} array needs {header_len} bytes, file has {}", bytes.len()),
        ));
    }
    let dims: Vec<usize> = words.take(rank).map(|d| d as usize).collect();

    let count = dims
        .iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .and_then(|n| n.checked_mul(4 * floats_per_sample))
        .ok_or_else(|| format_err(path, format!("dimensions {dims:?} overflow")))?;
    let payload = &bytes[header_len..];
    if payload.len() != count {
        return Err(format_err(
            path,
            format!(
                "dimensions {dims:?} need {count} data bytes, file has {}",
                payload.len()
            ),
        ));
    }
    Ok((dims, payload))
}

fn floats(payload: &[u8]) -> impl Iterator<Item = f64> + '_ {
    payload
        .chunks_exact(4)
        .map(|w| f32::from_le_bytes([w[0], w[1], w[2], w[3]]) as f64)
}

/// Read a complex (`.cplx`) array.
pub fn read_complex(path: impl AsRef<Path>) -> Result<NdArray<Complex64>, ArrayIoError> {
    let path = path.as_ref();
    let bytes = read_bytes(path)?;
    let (dims, payload) = parse(path, &bytes, 2)?;
    let values: Vec<f64> = floats(payload).collect();
    let data = values
        .chunks_exact(2)
        .map(|c| Complex64::new(c[0], c[1]))
        .collect();
    Ok(NdArray { dims, data })
}

/// Read a real (`.real`) array.
pub fn read_real(path: impl AsRef<Path>) -> Result<NdArray<f64>, ArrayIoError> {
    let path = path.as_ref();
    let bytes = read_bytes(path)?;
    let (dims, payload) = parse(path, &bytes, 1)?;
    Ok(NdArray {
        dims,
        data: floats(payload).collect(),
    })
}

fn write_with<F>(path: &Path, dims: &[usize], len: usize, per_sample: usize, body: F) -> Result<(), ArrayIoError>
where
    F: FnOnce(&mut Vec<u8>),
{
    let expected: usize = dims.iter().product();
    if dims.is_empty() || expected != len {
        return Err(format_err(
            path,
            format!("dimensions {dims:?} do not describe {len} samples"),
        ));
    }
    let mut buf = Vec::with_capacity(4 * (1 + dims.len() + per_sample * len));
    buf.extend_from_slice(&(dims.len() as u32).to_le_bytes());
    for &d in dims {
        let d = u32::try_from(d).map_err(|_| format_err(path, format!("dimension {d} exceeds u32")))?;
        buf.extend_from_slice(&d.to_le_bytes());
    }
    body(&mut buf);

    let file = File::create(path).map_err(io_err(path))?;
    let mut writer = BufWriter::new(file);
    if path.extension().is_some_and(|e| e == "gz") {
        let mut encoder = GzEncoder::new(writer, Compression::default());
        encoder.write_all(&buf).map_err(io_err(path))?;
        encoder.finish().map_err(io_err(path))?.flush().map_err(io_err(path))?;
    } else {
        writer.write_all(&buf).map_err(io_err(path))?;
        writer.flush().map_err(io_err(path))?;
    }
    Ok(())
}

/// Write a complex array; samples are narrowed to `f32`.
pub fn write_complex(path: impl AsRef<Path>, dims: &[usize], data: &[Complex64]) -> Result<(), ArrayIoError> {
    write_with(path.as_ref(), dims, data.len(), 2, |buf| {
        for c in data {
            buf.extend_from_slice(&(c.re as f32).to_le_bytes());
            buf.extend_from_slice(&(c.im as f32).to_le_bytes());
        }
    })
}

/// Write a real array; samples are narrowed to `f32`.
pub fn write_real(path: impl AsRef<Path>, dims: &[usize], data: &[f64]) -> Result<(), ArrayIoError> {
    write_with(path.as_ref(), dims, data.len(), 1, |buf| {
        for &v in data {
            buf.extend_from_slice(&(v as f32).to_le_bytes());
        }
    })
}

/// Write a [`Volume`] as a complex array.
pub fn write_volume(path: impl AsRef<Path>, volume: &Volume) -> Result<(), ArrayIoError> {
    write_complex(path, &volume.dims(), volume.as_slice())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complex_file_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.cplx");
        write_complex(&path, &[2, 1], &[Complex64::new(1.0, -2.0), Complex64::new(0.5, 0.0)]).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes.len(), 4 * 3 + 8 * 2);
        assert_eq!(&bytes[0..4], &2u32.to_le_bytes());
        assert_eq!(&bytes[4..8], &2u32.to_le_bytes());
        assert_eq!(&bytes[8..12], &1u32.to_le_bytes());
        assert_eq!(&bytes[12..16], &1.0f32.to_le_bytes());
        assert_eq!(&bytes[16..20], &(-2.0f32).to_le_bytes());
    }

    #[test]
    fn test_gzip_detected_on_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.real.gz");
        write_real(&path, &[3], &[1.0, 2.5, -4.0]).unwrap();
        assert!(is_gzip(&std::fs::read(&path).unwrap()));

        let array = read_real(&path).unwrap();
        assert_eq!(array.dims, vec![3]);
        assert_eq!(array.data, vec![1.0, 2.5, -4.0]);
    }

    #[test]
    fn test_truncated_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.cplx");
        let mut bytes = Vec::new();
        for w in [3u32, 2, 2, 2] {
            bytes.extend_from_slice(&w.to_le_bytes());
        }
        bytes.extend_from_slice(&[0u8; 8]);
        std::fs::write(&path, &bytes).unwrap();
        assert!(matches!(read_complex(&path), Err(ArrayIoError::Format { .. })));
    }

    #[test]
    fn test_rank_two_array_is_not_a_volume() {
        let array = NdArray {
            dims: vec![2, 2],
            data: vec![Complex64::new(0.0, 0.0); 4],
        };
        assert!(matches!(
            array.into_volume(),
            Err(crate::error::DeblurError::InputShape { .. })
        ));
    }

    #[test]
    fn test_dims_must_match_data() {
        let dir = tempfile::tempdir().unwrap();
        let err = write_real(dir.path().join("x.real"), &[2, 2], &[1.0]).unwrap_err();
        assert!(matches!(err, ArrayIoError::Format { .. }));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            read_complex("/nonexistent/blurred_image.cplx"),
            Err(ArrayIoError::Io { .. })
        ));
    }
}
