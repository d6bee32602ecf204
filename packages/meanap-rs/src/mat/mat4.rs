//! MATLAB Level 4 MAT-file decoder
//!
//! A Level 4 file is a bare sequence of matrices, each preceded by a
//! 20-byte header of five 32-bit integers: type code `MOPT`, rows,
//! columns, imaginary flag and name length. There is no file signature, so
//! the first header must be plausible for the file to count as Level 4.

use super::value::{CharArray, MatValue, NumericArray, NumericClass};
use super::{decode_fixed, ContainerDecoder, ContainerFormat, Decoded, Endian, Input, Mapping};

const HEADER_LEN: usize = 20;
const MAX_NAME_LEN: usize = 4096;

type ParseResult<T> = std::result::Result<T, String>;

pub struct Mat4Decoder;

impl ContainerDecoder for Mat4Decoder {
    fn name(&self) -> &'static str {
        "mat4"
    }

    fn format(&self) -> ContainerFormat {
        ContainerFormat::Mat4
    }

    fn decode(&self, input: &Input<'_>) -> Decoded {
        let bytes = input.bytes;
        if bytes.len() < HEADER_LEN {
            return Decoded::NotMyFormat(format!(
                "{} bytes is shorter than a Level 4 matrix header",
                bytes.len()
            ));
        }

        let endian = match detect_endian(bytes) {
            Some(endian) => endian,
            None => {
                return Decoded::NotMyFormat(
                    "first matrix header is not a valid Level 4 header".to_string(),
                );
            }
        };
        if let Err(reason) = Header::read(bytes, endian) {
            return Decoded::NotMyFormat(reason);
        }

        match read_matrices(bytes, endian) {
            Ok(variables) => Decoded::Record(variables),
            Err(reason) => Decoded::Corrupt(reason),
        }
    }
}

/// Storage precision digit `P` of `MOPT`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Precision {
    Double,
    Single,
    Int32,
    Int16,
    UInt16,
    UInt8,
}

impl Precision {
    fn from_digit(p: i32) -> Option<Self> {
        match p {
            0 => Some(Precision::Double),
            1 => Some(Precision::Single),
            2 => Some(Precision::Int32),
            3 => Some(Precision::Int16),
            4 => Some(Precision::UInt16),
            5 => Some(Precision::UInt8),
            _ => None,
        }
    }

    fn width(self) -> usize {
        match self {
            Precision::Double => 8,
            Precision::Single | Precision::Int32 => 4,
            Precision::Int16 | Precision::UInt16 => 2,
            Precision::UInt8 => 1,
        }
    }

    fn class(self) -> NumericClass {
        match self {
            Precision::Double => NumericClass::Double,
            Precision::Single => NumericClass::Single,
            Precision::Int32 => NumericClass::Int32,
            Precision::Int16 => NumericClass::Int16,
            Precision::UInt16 => NumericClass::UInt16,
            Precision::UInt8 => NumericClass::UInt8,
        }
    }

    fn decode(self, endian: Endian, bytes: &[u8]) -> ParseResult<Vec<f64>> {
        match self {
            Precision::Double => decode_fixed(bytes, 8, |b| endian.f64(b)),
            Precision::Single => decode_fixed(bytes, 4, |b| endian.f32(b) as f64),
            Precision::Int32 => decode_fixed(bytes, 4, |b| endian.i32(b) as f64),
            Precision::Int16 => decode_fixed(bytes, 2, |b| endian.i16(b) as f64),
            Precision::UInt16 => decode_fixed(bytes, 2, |b| endian.u16(b) as f64),
            Precision::UInt8 => Ok(bytes.iter().map(|&b| b as f64).collect()),
        }
    }
}

/// Matrix type digit `T` of `MOPT`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MatrixType {
    Numeric,
    Text,
    Sparse,
}

#[derive(Debug)]
struct Header {
    precision: Precision,
    matrix_type: MatrixType,
    rows: usize,
    cols: usize,
    complex: bool,
    name_len: usize,
}

impl Header {
    fn read(bytes: &[u8], endian: Endian) -> ParseResult<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(format!("{} bytes left for a 20-byte header", bytes.len()));
        }
        let word = |i: usize| endian.i32(&bytes[i * 4..i * 4 + 4]);
        let (mopt, rows, cols, imagf, name_len) = (word(0), word(1), word(2), word(3), word(4));

        let (m, o, p, t) = split_mopt(mopt).ok_or_else(|| format!("invalid type code {}", mopt))?;
        let expected_m = match endian {
            Endian::Little => 0,
            Endian::Big => 1,
        };
        if m != expected_m || o != 0 {
            return Err(format!("type code {} does not match the byte order", mopt));
        }
        let precision =
            Precision::from_digit(p).ok_or_else(|| format!("invalid precision digit {}", p))?;
        let matrix_type = match t {
            0 => MatrixType::Numeric,
            1 => MatrixType::Text,
            2 => MatrixType::Sparse,
            other => return Err(format!("invalid matrix type digit {}", other)),
        };
        if rows < 0 || cols < 0 {
            return Err(format!("negative dimensions {}x{}", rows, cols));
        }
        if imagf != 0 && imagf != 1 {
            return Err(format!("invalid imaginary flag {}", imagf));
        }
        if name_len < 1 || name_len as usize > MAX_NAME_LEN {
            return Err(format!("invalid name length {}", name_len));
        }

        Ok(Self {
            precision,
            matrix_type,
            rows: rows as usize,
            cols: cols as usize,
            complex: imagf == 1,
            name_len: name_len as usize,
        })
    }

    fn data_len(&self) -> ParseResult<usize> {
        self.rows
            .checked_mul(self.cols)
            .and_then(|n| n.checked_mul(self.precision.width()))
            .ok_or_else(|| format!("matrix of {}x{} overflows", self.rows, self.cols))
    }
}

/// Split `MOPT` into its four decimal digits.
fn split_mopt(mopt: i32) -> Option<(i32, i32, i32, i32)> {
    if !(0..5000).contains(&mopt) {
        return None;
    }
    Some((mopt / 1000, (mopt / 100) % 10, (mopt / 10) % 10, mopt % 10))
}

fn detect_endian(bytes: &[u8]) -> Option<Endian> {
    [Endian::Little, Endian::Big]
        .into_iter()
        .find(|&endian| Header::read(bytes, endian).is_ok())
}

fn read_matrices(bytes: &[u8], endian: Endian) -> ParseResult<Mapping> {
    let mut variables = Mapping::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let header = Header::read(&bytes[pos..], endian)
            .map_err(|e| format!("matrix header at offset {}: {}", pos, e))?;
        pos += HEADER_LEN;

        let name_end = pos + header.name_len;
        let name_bytes = bytes
            .get(pos..name_end)
            .ok_or_else(|| format!("matrix name at offset {} is truncated", pos))?;
        let name = String::from_utf8_lossy(name_bytes)
            .trim_end_matches('\0')
            .to_string();
        pos = name_end;

        let data_len = header.data_len()?;
        let parts = if header.complex { 2 } else { 1 };
        let real = bytes
            .get(pos..pos + data_len)
            .ok_or_else(|| format!("data of '{}' is truncated", name))?;
        if pos + data_len * parts > bytes.len() {
            return Err(format!("imaginary part of '{}' is truncated", name));
        }
        pos += data_len * parts;

        let data = header.precision.decode(endian, real)?;
        let value = build_value(&header, data)?;
        variables.insert(name, value);
    }

    Ok(variables)
}

fn build_value(header: &Header, data: Vec<f64>) -> ParseResult<MatValue> {
    let dims = vec![header.rows, header.cols];
    match header.matrix_type {
        MatrixType::Numeric => Ok(MatValue::Numeric(NumericArray::new(
            header.precision.class(),
            dims,
            data,
        ))),
        MatrixType::Text => {
            let chars = data
                .into_iter()
                .map(|code| char::from_u32(code as u32).unwrap_or(char::REPLACEMENT_CHARACTER))
                .collect();
            Ok(MatValue::Char(CharArray { dims, data: chars }))
        }
        MatrixType::Sparse => densify(header.rows, header.cols, &data),
    }
}

/// Expand a Level 4 sparse matrix stored as `[row col value]` triplets,
/// whose last row carries the full dimensions.
fn densify(rows: usize, cols: usize, data: &[f64]) -> ParseResult<MatValue> {
    if rows == 0 || !(3..=4).contains(&cols) {
        return Err(format!("sparse matrix stored as {}x{}", rows, cols));
    }
    let column = |c: usize, r: usize| data[r + c * rows];
    let (nrows, ncols) = (column(0, rows - 1) as usize, column(1, rows - 1) as usize);
    let total = nrows
        .checked_mul(ncols)
        .filter(|&n| n <= 50_000_000)
        .ok_or_else(|| format!("sparse matrix of {}x{} is too large", nrows, ncols))?;

    let mut dense = vec![0.0; total];
    for r in 0..rows - 1 {
        let (i, j, v) = (column(0, r), column(1, r), column(2, r));
        if i < 1.0 || j < 1.0 || i as usize > nrows || j as usize > ncols {
            return Err(format!("sparse entry ({}, {}) out of range", i, j));
        }
        dense[(i as usize - 1) + (j as usize - 1) * nrows] = v;
    }
    Ok(MatValue::Numeric(NumericArray::new(
        NumericClass::Double,
        vec![nrows, ncols],
        dense,
    )))
}
