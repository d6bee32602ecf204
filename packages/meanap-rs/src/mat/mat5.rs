//! MATLAB Level 5 MAT-file decoder (v5, v6 and compressed v7 files)
//!
//! Layout: a 128-byte header (text, subsystem offset, version, endian
//! indicator) followed by tagged data elements. Each variable is a
//! `miMATRIX` element, optionally wrapped in a zlib `miCOMPRESSED` element.

use super::value::{numel, CellArray, CharArray, MatValue, NumericArray, NumericClass, StructArray};
use super::{decode_fixed, ContainerDecoder, ContainerFormat, Decoded, Endian, Input, Mapping};
use flate2::read::ZlibDecoder;
use std::io::Read;

const HEADER_LEN: usize = 128;
const VERSION_5: u16 = 0x0100;
const VERSION_73: u16 = 0x0200;

// Data element types
const MI_INT8: u32 = 1;
const MI_UINT8: u32 = 2;
const MI_INT16: u32 = 3;
const MI_UINT16: u32 = 4;
const MI_INT32: u32 = 5;
const MI_UINT32: u32 = 6;
const MI_SINGLE: u32 = 7;
const MI_DOUBLE: u32 = 9;
const MI_INT64: u32 = 12;
const MI_UINT64: u32 = 13;
const MI_MATRIX: u32 = 14;
const MI_COMPRESSED: u32 = 15;
const MI_UTF8: u32 = 16;
const MI_UTF16: u32 = 17;
const MI_UTF32: u32 = 18;

// Array classes
const MX_CELL: u32 = 1;
const MX_STRUCT: u32 = 2;
const MX_OBJECT: u32 = 3;
const MX_CHAR: u32 = 4;
const MX_SPARSE: u32 = 5;
/// MCOS objects (`string`, `datetime`, classdef instances)
const MX_OPAQUE: u32 = 17;

const FLAG_COMPLEX: u32 = 0x0800;
const FLAG_LOGICAL: u32 = 0x0200;

/// Largest sparse matrix expanded to dense storage
const MAX_DENSE_SPARSE: usize = 50_000_000;

type ParseResult<T> = std::result::Result<T, String>;

pub struct Mat5Decoder;

impl ContainerDecoder for Mat5Decoder {
    fn name(&self) -> &'static str {
        "mat5"
    }

    fn format(&self) -> ContainerFormat {
        ContainerFormat::Mat5
    }

    fn decode(&self, input: &Input<'_>) -> Decoded {
        let bytes = input.bytes;
        if bytes.len() < HEADER_LEN {
            return Decoded::NotMyFormat(format!(
                "{} bytes is shorter than the {}-byte Level 5 header",
                bytes.len(),
                HEADER_LEN
            ));
        }

        let endian = match &bytes[126..128] {
            b"IM" => Endian::Little,
            b"MI" => Endian::Big,
            _ => {
                return Decoded::NotMyFormat("no Level 5 endian indicator".to_string());
            }
        };

        match endian.u16(&bytes[124..126]) {
            VERSION_5 => {}
            VERSION_73 => {
                return Decoded::NotMyFormat(
                    "version 0x0200 marks a v7.3 (HDF5) container".to_string(),
                );
            }
            other => {
                return Decoded::NotMyFormat(format!("unknown Level 5 version 0x{:04x}", other));
            }
        }

        let parser = Parser { endian };
        match parser.parse_variables(&bytes[HEADER_LEN..]) {
            Ok(variables) => Decoded::Record(variables),
            Err(reason) => Decoded::Corrupt(reason),
        }
    }
}

struct Element<'a> {
    data_type: u32,
    data: &'a [u8],
}

/// Sequential reader over tagged data elements
struct Elements<'a> {
    endian: Endian,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Elements<'a> {
    fn new(endian: Endian, bytes: &'a [u8]) -> Self {
        Self {
            endian,
            bytes,
            pos: 0,
        }
    }

    fn next_element(&mut self) -> ParseResult<Option<Element<'a>>> {
        if self.pos >= self.bytes.len() {
            return Ok(None);
        }
        let rest = &self.bytes[self.pos..];
        if rest.len() < 8 {
            // Trailing zero padding is not an element
            if rest.iter().all(|&b| b == 0) {
                return Ok(None);
            }
            return Err(format!("truncated element tag at offset {}", self.pos));
        }

        let first = self.endian.u32(&rest[0..4]);
        if first >> 16 != 0 {
            // Small data element: type and size share the first word
            let data_type = first & 0xFFFF;
            let nbytes = (first >> 16) as usize;
            if nbytes > 4 {
                return Err(format!(
                    "small element at offset {} claims {} bytes",
                    self.pos, nbytes
                ));
            }
            self.pos += 8;
            return Ok(Some(Element {
                data_type,
                data: &rest[4..4 + nbytes],
            }));
        }

        let data_type = first;
        let nbytes = self.endian.u32(&rest[4..8]) as usize;
        let end = 8usize
            .checked_add(nbytes)
            .filter(|&end| end <= rest.len())
            .ok_or_else(|| {
                format!(
                    "element of {} bytes at offset {} overruns its container",
                    nbytes, self.pos
                )
            })?;

        self.pos += if data_type == MI_COMPRESSED {
            end
        } else {
            align8(end)
        };
        Ok(Some(Element {
            data_type,
            data: &rest[8..end],
        }))
    }

    fn require(&mut self, what: &str) -> ParseResult<Element<'a>> {
        self.next_element()?
            .ok_or_else(|| format!("missing {}", what))
    }
}

/// Element data as text, without trailing NUL padding
fn element_text(element: &Element<'_>) -> String {
    String::from_utf8_lossy(element.data)
        .trim_end_matches('\0')
        .to_string()
}

fn align8(n: usize) -> usize {
    (n + 7) & !7
}

struct Parser {
    endian: Endian,
}

impl Parser {
    fn parse_variables(&self, body: &[u8]) -> ParseResult<Mapping> {
        let mut variables = Mapping::new();
        self.collect_variables(body, &mut variables, true)?;
        Ok(variables)
    }

    fn collect_variables(
        &self,
        body: &[u8],
        variables: &mut Mapping,
        allow_compressed: bool,
    ) -> ParseResult<()> {
        let mut elements = Elements::new(self.endian, body);
        while let Some(element) = elements.next_element()? {
            match element.data_type {
                MI_MATRIX => {
                    let (name, value) = self.parse_matrix(element.data)?;
                    // Unnamed top-level elements carry subsystem data
                    if !name.is_empty() {
                        variables.insert(name, value);
                    }
                }
                MI_COMPRESSED if allow_compressed => {
                    let inflated = inflate(element.data)?;
                    self.collect_variables(&inflated, variables, false)?;
                }
                other => {
                    log::debug!("Skipping top-level element of type {}", other);
                }
            }
        }
        Ok(())
    }

    /// Parse the body of a `miMATRIX` element into its name and value.
    fn parse_matrix(&self, body: &[u8]) -> ParseResult<(String, MatValue)> {
        if body.is_empty() {
            return Ok((String::new(), MatValue::Empty));
        }

        let mut sub = Elements::new(self.endian, body);
        let flags = sub.require("array flags")?;
        if flags.data.len() < 8 {
            return Err(format!("array flags hold {} bytes, expected 8", flags.data.len()));
        }
        let flag_word = self.endian.u32(&flags.data[0..4]);
        let class = flag_word & 0xFF;

        if class == MX_OPAQUE {
            // Name, type name, class name and payload follow, with no dimensions
            let name = element_text(&sub.require("array name")?);
            log::debug!("Variable '{}' is an opaque MCOS object; decoded as empty", name);
            return Ok((name, MatValue::Empty));
        }

        let dims_element = sub.require("dimensions")?;
        let dims = self
            .numbers(dims_element.data_type, dims_element.data)?
            .into_iter()
            .map(|d| {
                if d < 0.0 || d.fract() != 0.0 {
                    Err(format!("invalid dimension {}", d))
                } else {
                    Ok(d as usize)
                }
            })
            .collect::<ParseResult<Vec<usize>>>()?;
        checked_numel(&dims)?;

        let name = element_text(&sub.require("array name")?);

        let value = match class {
            MX_CELL => self.parse_cell(&mut sub, dims)?,
            MX_STRUCT => self.parse_struct(&mut sub, dims, None)?,
            MX_OBJECT => {
                let class_name = element_text(&sub.require("object class name")?);
                self.parse_struct(&mut sub, dims, Some(class_name))?
            }
            MX_CHAR => self.parse_char(&mut sub, dims)?,
            MX_SPARSE => {
                self.parse_sparse(&mut sub, dims, flag_word & FLAG_LOGICAL != 0)?
            }
            6..=15 => self.parse_numeric(&mut sub, dims, class, flag_word)?,
            other => {
                log::debug!("Variable '{}' has unsupported array class {}", name, other);
                MatValue::Empty
            }
        };

        Ok((name, value))
    }

    fn parse_numeric(
        &self,
        sub: &mut Elements<'_>,
        dims: Vec<usize>,
        class: u32,
        flag_word: u32,
    ) -> ParseResult<MatValue> {
        let real = sub.require("real part")?;
        let data = self.numbers(real.data_type, real.data)?;
        let expected = numel(&dims);
        if data.len() != expected {
            return Err(format!(
                "real part holds {} values, dimensions need {}",
                data.len(),
                expected
            ));
        }
        if flag_word & FLAG_COMPLEX != 0 {
            // Imaginary parts are read past and dropped
            sub.require("imaginary part")?;
        }

        let class = if flag_word & FLAG_LOGICAL != 0 {
            NumericClass::Logical
        } else {
            numeric_class(class)
        };
        Ok(MatValue::Numeric(NumericArray::new(class, dims, data)))
    }

    fn parse_char(&self, sub: &mut Elements<'_>, dims: Vec<usize>) -> ParseResult<MatValue> {
        let data = match sub.next_element()? {
            None => Vec::new(),
            Some(element) => self.chars(element.data_type, element.data)?,
        };
        if data.len() != numel(&dims) {
            log::debug!(
                "Char array has {} characters for dimensions {:?}",
                data.len(),
                dims
            );
        }
        Ok(MatValue::Char(CharArray { dims, data }))
    }

    fn parse_cell(&self, sub: &mut Elements<'_>, dims: Vec<usize>) -> ParseResult<MatValue> {
        let count = numel(&dims);
        if count > sub.bytes.len() / 8 {
            return Err(format!("cell of {} elements does not fit its container", count));
        }
        let mut elements = Vec::with_capacity(count);
        for i in 0..count {
            let element = sub.require("cell element")?;
            if element.data_type != MI_MATRIX {
                return Err(format!(
                    "cell element {} has data type {}, expected miMATRIX",
                    i, element.data_type
                ));
            }
            let (_, value) = self.parse_matrix(element.data)?;
            elements.push(value);
        }
        Ok(MatValue::Cell(CellArray { dims, elements }))
    }

    fn parse_struct(
        &self,
        sub: &mut Elements<'_>,
        dims: Vec<usize>,
        class_name: Option<String>,
    ) -> ParseResult<MatValue> {
        let len_element = sub.require("field name length")?;
        let name_len = self
            .numbers(len_element.data_type, len_element.data)?
            .first()
            .copied()
            .unwrap_or(0.0) as usize;
        let names_element = sub.require("field names")?;

        let field_names: Vec<String> = if name_len == 0 {
            Vec::new()
        } else {
            names_element
                .data
                .chunks(name_len)
                .map(|chunk| {
                    String::from_utf8_lossy(chunk)
                        .trim_end_matches('\0')
                        .to_string()
                })
                .collect()
        };

        let count = numel(&dims);
        let needed = count.saturating_mul(field_names.len());
        if needed > sub.bytes.len() / 8 || (field_names.is_empty() && count > 1 << 24) {
            return Err(format!(
                "struct of {} elements with {} fields does not fit its container",
                count,
                field_names.len()
            ));
        }

        let mut elements = Vec::with_capacity(count);
        for _ in 0..count {
            let mut row = Vec::with_capacity(field_names.len());
            for field in &field_names {
                let element = sub.require("struct field")?;
                if element.data_type != MI_MATRIX {
                    return Err(format!(
                        "field '{}' has data type {}, expected miMATRIX",
                        field, element.data_type
                    ));
                }
                let (_, value) = self.parse_matrix(element.data)?;
                row.push(value);
            }
            elements.push(row);
        }

        Ok(MatValue::Struct(StructArray {
            dims,
            class_name,
            field_names,
            elements,
        }))
    }

    fn parse_sparse(
        &self,
        sub: &mut Elements<'_>,
        dims: Vec<usize>,
        logical: bool,
    ) -> ParseResult<MatValue> {
        let ir_element = sub.require("sparse row indices")?;
        let jc_element = sub.require("sparse column pointers")?;
        let ir = self.numbers(ir_element.data_type, ir_element.data)?;
        let jc = self.numbers(jc_element.data_type, jc_element.data)?;
        let pr = match sub.next_element()? {
            Some(element) => self.numbers(element.data_type, element.data)?,
            // Logical sparse arrays may omit the values; every stored entry is true
            None => vec![1.0; ir.len()],
        };

        let (rows, cols) = match dims.as_slice() {
            [r, c] => (*r, *c),
            _ => return Err(format!("sparse array with dimensions {:?}", dims)),
        };
        let total = rows.saturating_mul(cols);
        if total > MAX_DENSE_SPARSE {
            log::warn!("Sparse array of {}x{} is too large to densify; skipped", rows, cols);
            return Ok(MatValue::Empty);
        }
        if jc.len() < cols + 1 {
            return Err(format!(
                "sparse column pointers hold {} entries for {} columns",
                jc.len(),
                cols
            ));
        }

        let mut dense = vec![0.0; total];
        for col in 0..cols {
            let (start, end) = (jc[col] as usize, jc[col + 1] as usize);
            for k in start..end {
                let (row, value) = match (ir.get(k), pr.get(k)) {
                    (Some(&row), Some(&value)) => (row as usize, value),
                    _ => return Err(format!("sparse entry {} out of range", k)),
                };
                if row >= rows {
                    return Err(format!("sparse row index {} exceeds {} rows", row, rows));
                }
                dense[row + col * rows] = value;
            }
        }

        let class = if logical {
            NumericClass::Logical
        } else {
            NumericClass::Double
        };
        Ok(MatValue::Numeric(NumericArray::new(class, dims, dense)))
    }

    fn numbers(&self, data_type: u32, bytes: &[u8]) -> ParseResult<Vec<f64>> {
        let e = self.endian;
        match data_type {
            MI_INT8 => Ok(bytes.iter().map(|&b| b as i8 as f64).collect()),
            MI_UINT8 | MI_UTF8 => Ok(bytes.iter().map(|&b| b as f64).collect()),
            MI_INT16 => decode_fixed(bytes, 2, |b| e.i16(b) as f64),
            MI_UINT16 | MI_UTF16 => decode_fixed(bytes, 2, |b| e.u16(b) as f64),
            MI_INT32 => decode_fixed(bytes, 4, |b| e.i32(b) as f64),
            MI_UINT32 | MI_UTF32 => decode_fixed(bytes, 4, |b| e.u32(b) as f64),
            MI_SINGLE => decode_fixed(bytes, 4, |b| e.f32(b) as f64),
            MI_DOUBLE => decode_fixed(bytes, 8, |b| e.f64(b)),
            MI_INT64 => decode_fixed(bytes, 8, |b| e.i64(b) as f64),
            MI_UINT64 => decode_fixed(bytes, 8, |b| e.u64(b) as f64),
            other => Err(format!("data type {} cannot hold numbers", other)),
        }
    }

    fn chars(&self, data_type: u32, bytes: &[u8]) -> ParseResult<Vec<char>> {
        match data_type {
            MI_UTF8 | MI_INT8 | MI_UINT8 => Ok(String::from_utf8_lossy(bytes).chars().collect()),
            _ => Ok(self
                .numbers(data_type, bytes)?
                .into_iter()
                .map(|code| char::from_u32(code as u32).unwrap_or(char::REPLACEMENT_CHARACTER))
                .collect()),
        }
    }
}

fn numeric_class(class: u32) -> NumericClass {
    match class {
        7 => NumericClass::Single,
        8 => NumericClass::Int8,
        9 => NumericClass::UInt8,
        10 => NumericClass::Int16,
        11 => NumericClass::UInt16,
        12 => NumericClass::Int32,
        13 => NumericClass::UInt32,
        14 => NumericClass::Int64,
        15 => NumericClass::UInt64,
        _ => NumericClass::Double,
    }
}

fn checked_numel(dims: &[usize]) -> ParseResult<usize> {
    dims.iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .ok_or_else(|| format!("dimensions {:?} overflow", dims))
}

fn inflate(data: &[u8]) -> ParseResult<Vec<u8>> {
    let mut inflated = Vec::new();
    ZlibDecoder::new(data)
        .read_to_end(&mut inflated)
        .map_err(|e| format!("compressed element: {}", e))?;
    Ok(inflated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn header(endian_marker: &[u8; 2], version: [u8; 2]) -> Vec<u8> {
        let mut h = vec![b' '; 116];
        h[..10].copy_from_slice(b"MATLAB 5.0");
        h.extend_from_slice(&[0u8; 8]);
        h.extend_from_slice(&version);
        h.extend_from_slice(endian_marker);
        h
    }

    fn tag(data_type: u32, data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&data_type.to_le_bytes());
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(data);
        while out.len() % 8 != 0 {
            out.push(0);
        }
        out
    }

    /// Little-endian 1x1 double named `x`
    fn scalar_matrix(name: &str, value: f64) -> Vec<u8> {
        let mut body = Vec::new();
        let mut flags = Vec::new();
        flags.extend_from_slice(&6u32.to_le_bytes());
        flags.extend_from_slice(&0u32.to_le_bytes());
        body.extend(tag(MI_UINT32, &flags));
        let mut dims = Vec::new();
        dims.extend_from_slice(&1i32.to_le_bytes());
        dims.extend_from_slice(&1i32.to_le_bytes());
        body.extend(tag(MI_INT32, &dims));
        body.extend(tag(MI_INT8, name.as_bytes()));
        body.extend(tag(MI_DOUBLE, &value.to_le_bytes()));
        tag(MI_MATRIX, &body)
    }

    fn decode(bytes: &[u8]) -> Decoded {
        Mat5Decoder.decode(&Input {
            path: Path::new("test.mat"),
            bytes,
        })
    }

    #[test]
    fn test_decodes_scalar_double() {
        let mut file = header(b"IM", [0x00, 0x01]);
        file.extend(scalar_matrix("FRmean", 2.5));
        match decode(&file) {
            Decoded::Record(vars) => {
                assert_eq!(vars.get("FRmean"), Some(&MatValue::from(2.5)));
            }
            other => panic!("expected record, got {:?}", other),
        }
    }

    #[test]
    fn test_v73_header_is_not_mine() {
        let file = header(b"IM", [0x00, 0x02]);
        assert!(matches!(decode(&file), Decoded::NotMyFormat(_)));
    }

    #[test]
    fn test_short_file_is_not_mine() {
        assert!(matches!(decode(b"MATLAB"), Decoded::NotMyFormat(_)));
    }

    #[test]
    fn test_truncated_body_is_corrupt() {
        let mut file = header(b"IM", [0x00, 0x01]);
        let matrix = scalar_matrix("x", 1.0);
        file.extend_from_slice(&matrix[..matrix.len() - 12]);
        assert!(matches!(decode(&file), Decoded::Corrupt(_)));
    }

    #[test]
    fn test_small_element_name() {
        // Names of up to four bytes are packed into the tag
        let mut body = Vec::new();
        let mut flags = Vec::new();
        flags.extend_from_slice(&6u32.to_le_bytes());
        flags.extend_from_slice(&0u32.to_le_bytes());
        body.extend(tag(MI_UINT32, &flags));
        let mut dims = Vec::new();
        dims.extend_from_slice(&1i32.to_le_bytes());
        dims.extend_from_slice(&1i32.to_le_bytes());
        body.extend(tag(MI_INT32, &dims));
        let small = (2u32 << 16) | MI_INT8;
        body.extend_from_slice(&small.to_le_bytes());
        body.extend_from_slice(b"ND\0\0");
        body.extend(tag(MI_DOUBLE, &4.0f64.to_le_bytes()));

        let mut file = header(b"IM", [0x00, 0x01]);
        file.extend(tag(MI_MATRIX, &body));
        match decode(&file) {
            Decoded::Record(vars) => assert_eq!(vars.get("ND"), Some(&MatValue::from(4.0))),
            other => panic!("expected record, got {:?}", other),
        }
    }

    fn words_i32(values: &[i32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    #[test]
    fn test_mcos_object_decodes_to_empty() {
        // `string` variables are stored as opaque MCOS objects with no dimensions
        let mut body = Vec::new();
        let mut flags = Vec::new();
        flags.extend_from_slice(&MX_OPAQUE.to_le_bytes());
        flags.extend_from_slice(&0u32.to_le_bytes());
        body.extend(tag(MI_UINT32, &flags));
        body.extend(tag(MI_INT8, b"cartographyRoles"));
        body.extend(tag(MI_INT8, b"MCOS"));
        body.extend(tag(MI_INT8, b"string"));
        body.extend(scalar_matrix("", 0.0));

        let mut file = header(b"IM", [0x00, 0x01]);
        file.extend(tag(MI_MATRIX, &body));
        file.extend(scalar_matrix("ND", 4.0));
        match decode(&file) {
            Decoded::Record(vars) => {
                assert_eq!(vars.get("cartographyRoles"), Some(&MatValue::Empty));
                assert_eq!(vars.get("ND"), Some(&MatValue::from(4.0)));
                assert!(vars.get("MCOS").is_none());
            }
            other => panic!("expected record, got {:?}", other),
        }
    }

    #[test]
    fn test_logical_sparse_without_values_ignores_nzmax() {
        let mut body = Vec::new();
        let mut flags = Vec::new();
        flags.extend_from_slice(&(MX_SPARSE | FLAG_LOGICAL).to_le_bytes());
        flags.extend_from_slice(&u32::MAX.to_le_bytes());
        body.extend(tag(MI_UINT32, &flags));
        body.extend(tag(MI_INT32, &words_i32(&[2, 2])));
        body.extend(tag(MI_INT8, b"mask"));
        body.extend(tag(MI_INT32, &words_i32(&[0, 1])));
        body.extend(tag(MI_INT32, &words_i32(&[0, 1, 2])));

        let mut file = header(b"IM", [0x00, 0x01]);
        file.extend(tag(MI_MATRIX, &body));
        match decode(&file) {
            Decoded::Record(vars) => match vars.get("mask") {
                Some(MatValue::Numeric(arr)) => {
                    assert_eq!(arr.class, NumericClass::Logical);
                    assert_eq!(arr.data, vec![1.0, 0.0, 0.0, 1.0]);
                }
                other => panic!("unexpected value {:?}", other),
            },
            other => panic!("expected record, got {:?}", other),
        }
    }

    #[test]
    fn test_align8() {
        assert_eq!(align8(0), 0);
        assert_eq!(align8(1), 8);
        assert_eq!(align8(8), 8);
        assert_eq!(align8(13), 16);
    }
}
