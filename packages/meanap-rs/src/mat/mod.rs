//! MATLAB result-file loading
//!
//! MEA-NAP output files come from several MATLAB versions and export paths
//! and do not say which container they use. [`StructReader`] runs an ordered
//! chain of [`ContainerDecoder`]s over the file. A decoder either decodes
//! the file, declines it as not its format (the next decoder is tried), or
//! reports it as its format but corrupt (loading stops with that error).

pub mod hdf5;
pub mod mat4;
pub mod mat5;
pub mod value;

pub use value::{
    CellArray, CharArray, Mapping, MatValue, NumericArray, NumericClass, StructArray,
};

use crate::error::{DecodeAttempt, MeaError, Result};
use crate::mmap_utils::FileBytes;
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// Container encoding a file was decoded from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerFormat {
    /// MATLAB Level 5 (v5, v6, v7 with compression)
    Mat5,
    /// MATLAB Level 4
    Mat4,
    /// MATLAB v7.3 (HDF5)
    Hdf5,
}

impl fmt::Display for ContainerFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerFormat::Mat5 => write!(f, "MATLAB Level 5"),
            ContainerFormat::Mat4 => write!(f, "MATLAB Level 4"),
            ContainerFormat::Hdf5 => write!(f, "MATLAB v7.3 (HDF5)"),
        }
    }
}

/// Outcome of one decoder on one file
#[derive(Debug)]
pub enum Decoded {
    Record(Mapping),
    /// The file is not in this decoder's format; try the next one
    NotMyFormat(String),
    /// The file is in this decoder's format but cannot be read
    Corrupt(String),
}

/// File handed to a decoder
pub struct Input<'a> {
    pub path: &'a Path,
    pub bytes: &'a [u8],
}

pub trait ContainerDecoder: Send + Sync {
    fn name(&self) -> &'static str;

    fn format(&self) -> ContainerFormat;

    fn decode(&self, input: &Input<'_>) -> Decoded;
}

/// Decoded contents of one result file
///
/// The top-level variables form a [`MatValue::Mapping`]; fields are read
/// through [`crate::fields`].
#[derive(Debug, Clone)]
pub struct RawRecord {
    path: PathBuf,
    format: ContainerFormat,
    root: MatValue,
}

impl RawRecord {
    pub fn new(path: &Path, format: ContainerFormat, variables: Mapping) -> Self {
        Self {
            path: path.to_path_buf(),
            format,
            root: MatValue::Mapping(variables),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> ContainerFormat {
        self.format
    }

    pub fn root(&self) -> &MatValue {
        &self.root
    }

    pub fn variable_names(&self) -> Vec<&str> {
        match &self.root {
            MatValue::Mapping(m) => m.names().collect(),
            _ => Vec::new(),
        }
    }
}

/// Ordered decoder chain
pub struct StructReader {
    decoders: Vec<Box<dyn ContainerDecoder>>,
}

impl Default for StructReader {
    fn default() -> Self {
        Self::new()
    }
}

impl StructReader {
    /// Level 5, then Level 4, then v7.3/HDF5.
    pub fn new() -> Self {
        Self::with_decoders(vec![
            Box::new(mat5::Mat5Decoder),
            Box::new(mat4::Mat4Decoder),
            Box::new(hdf5::Hdf5Decoder),
        ])
    }

    pub fn with_decoders(decoders: Vec<Box<dyn ContainerDecoder>>) -> Self {
        Self { decoders }
    }

    pub fn decoder_names(&self) -> Vec<&'static str> {
        self.decoders.iter().map(|d| d.name()).collect()
    }

    pub fn load(&self, path: &Path) -> Result<RawRecord> {
        let bytes = FileBytes::open(path)?;
        let input = Input {
            path,
            bytes: &bytes,
        };

        let mut attempts = Vec::new();
        for decoder in &self.decoders {
            match decoder.decode(&input) {
                Decoded::Record(variables) => {
                    log::debug!(
                        "Decoded {} as {} ({} variables)",
                        path.display(),
                        decoder.format(),
                        variables.len()
                    );
                    return Ok(RawRecord::new(path, decoder.format(), variables));
                }
                Decoded::NotMyFormat(message) => {
                    log::debug!("{} declined {}: {}", decoder.name(), path.display(), message);
                    attempts.push(DecodeAttempt {
                        decoder: decoder.name(),
                        message,
                    });
                }
                Decoded::Corrupt(reason) => {
                    return Err(MeaError::CorruptFile {
                        path: path.to_path_buf(),
                        decoder: decoder.name(),
                        reason,
                    });
                }
            }
        }

        Err(MeaError::FileFormatUnrecognized {
            path: path.to_path_buf(),
            attempts,
        })
    }
}

/// Load a result file with the default decoder chain.
pub fn load_mat_file(path: &Path) -> Result<RawRecord> {
    StructReader::new().load(path)
}

/// Byte order of a binary container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Endian {
    Little,
    Big,
}

impl Endian {
    pub(crate) fn u16(self, b: &[u8]) -> u16 {
        match self {
            Endian::Little => LittleEndian::read_u16(b),
            Endian::Big => BigEndian::read_u16(b),
        }
    }

    pub(crate) fn i16(self, b: &[u8]) -> i16 {
        match self {
            Endian::Little => LittleEndian::read_i16(b),
            Endian::Big => BigEndian::read_i16(b),
        }
    }

    pub(crate) fn u32(self, b: &[u8]) -> u32 {
        match self {
            Endian::Little => LittleEndian::read_u32(b),
            Endian::Big => BigEndian::read_u32(b),
        }
    }

    pub(crate) fn i32(self, b: &[u8]) -> i32 {
        match self {
            Endian::Little => LittleEndian::read_i32(b),
            Endian::Big => BigEndian::read_i32(b),
        }
    }

    pub(crate) fn u64(self, b: &[u8]) -> u64 {
        match self {
            Endian::Little => LittleEndian::read_u64(b),
            Endian::Big => BigEndian::read_u64(b),
        }
    }

    pub(crate) fn i64(self, b: &[u8]) -> i64 {
        match self {
            Endian::Little => LittleEndian::read_i64(b),
            Endian::Big => BigEndian::read_i64(b),
        }
    }

    pub(crate) fn f32(self, b: &[u8]) -> f32 {
        match self {
            Endian::Little => LittleEndian::read_f32(b),
            Endian::Big => BigEndian::read_f32(b),
        }
    }

    pub(crate) fn f64(self, b: &[u8]) -> f64 {
        match self {
            Endian::Little => LittleEndian::read_f64(b),
            Endian::Big => BigEndian::read_f64(b),
        }
    }
}

/// Decode fixed-width values into f64, rejecting ragged buffers.
pub(crate) fn decode_fixed(
    bytes: &[u8],
    width: usize,
    convert: impl Fn(&[u8]) -> f64,
) -> std::result::Result<Vec<f64>, String> {
    if bytes.len() % width != 0 {
        return Err(format!(
            "{} bytes is not a multiple of the {}-byte element width",
            bytes.len(),
            width
        ));
    }
    Ok(bytes.chunks_exact(width).map(convert).collect())
}
