//! Fixture writers for MATLAB result files
#![allow(dead_code)]

use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

const MI_INT8: u32 = 1;
const MI_UINT16: u32 = 4;
const MI_INT32: u32 = 5;
const MI_UINT32: u32 = 6;
const MI_DOUBLE: u32 = 9;
const MI_MATRIX: u32 = 14;
const MI_COMPRESSED: u32 = 15;

const MX_CELL: u32 = 1;
const MX_STRUCT: u32 = 2;
const MX_CHAR: u32 = 4;
const MX_DOUBLE: u32 = 6;
const FLAG_LOGICAL: u32 = 0x0200;

/// A MATLAB value as written by the fixture writer
#[derive(Debug, Clone)]
pub enum Var {
    Double { dims: Vec<usize>, data: Vec<f64> },
    Logical { dims: Vec<usize>, data: Vec<bool> },
    Text(String),
    Cell { dims: Vec<usize>, elements: Vec<Var> },
    Struct { dims: Vec<usize>, fields: Vec<String>, elements: Vec<Vec<Var>> },
}

pub fn scalar(value: f64) -> Var {
    Var::Double {
        dims: vec![1, 1],
        data: vec![value],
    }
}

pub fn row(values: &[f64]) -> Var {
    Var::Double {
        dims: vec![1, values.len()],
        data: values.to_vec(),
    }
}

pub fn column(values: &[f64]) -> Var {
    Var::Double {
        dims: vec![values.len(), 1],
        data: values.to_vec(),
    }
}

pub fn text(s: &str) -> Var {
    Var::Text(s.to_string())
}

/// Column cell of strings, the usual shape of a role list
pub fn cellstr(items: &[&str]) -> Var {
    Var::Cell {
        dims: vec![items.len(), 1],
        elements: items.iter().map(|s| text(s)).collect(),
    }
}

pub fn cell(elements: Vec<Var>) -> Var {
    Var::Cell {
        dims: vec![1, elements.len()],
        elements,
    }
}

/// 1x1 struct
pub fn structure(fields: Vec<(&str, Var)>) -> Var {
    let (names, values): (Vec<String>, Vec<Var>) =
        fields.into_iter().map(|(k, v)| (k.to_string(), v)).unzip();
    Var::Struct {
        dims: vec![1, 1],
        fields: names,
        elements: vec![values],
    }
}

/// 1xN struct array; every element lists the same fields in order
pub fn struct_array(fields: &[&str], elements: Vec<Vec<Var>>) -> Var {
    Var::Struct {
        dims: vec![1, elements.len()],
        fields: fields.iter().map(|f| f.to_string()).collect(),
        elements,
    }
}

fn tag(data_type: u32, data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + 16);
    out.extend_from_slice(&data_type.to_le_bytes());
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    out.extend_from_slice(data);
    while out.len() % 8 != 0 {
        out.push(0);
    }
    out
}

fn dims_element(dims: &[usize]) -> Vec<u8> {
    let bytes: Vec<u8> = dims
        .iter()
        .flat_map(|&d| (d as i32).to_le_bytes())
        .collect();
    tag(MI_INT32, &bytes)
}

fn flags_element(class: u32, flags: u32) -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&(class | flags).to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());
    tag(MI_UINT32, &bytes)
}

fn matrix(name: &str, var: &Var) -> Vec<u8> {
    let mut body = Vec::new();
    match var {
        Var::Double { dims, data } => {
            body.extend(flags_element(MX_DOUBLE, 0));
            body.extend(dims_element(dims));
            body.extend(tag(MI_INT8, name.as_bytes()));
            let bytes: Vec<u8> = data.iter().flat_map(|v| v.to_le_bytes()).collect();
            body.extend(tag(MI_DOUBLE, &bytes));
        }
        Var::Logical { dims, data } => {
            body.extend(flags_element(9, FLAG_LOGICAL));
            body.extend(dims_element(dims));
            body.extend(tag(MI_INT8, name.as_bytes()));
            let bytes: Vec<u8> = data.iter().map(|&b| b as u8).collect();
            body.extend(tag(2, &bytes));
        }
        Var::Text(s) => {
            let units: Vec<u16> = s.encode_utf16().collect();
            body.extend(flags_element(MX_CHAR, 0));
            body.extend(dims_element(&[1, units.len()]));
            body.extend(tag(MI_INT8, name.as_bytes()));
            let bytes: Vec<u8> = units.iter().flat_map(|u| u.to_le_bytes()).collect();
            body.extend(tag(MI_UINT16, &bytes));
        }
        Var::Cell { dims, elements } => {
            body.extend(flags_element(MX_CELL, 0));
            body.extend(dims_element(dims));
            body.extend(tag(MI_INT8, name.as_bytes()));
            for element in elements {
                body.extend(matrix("", element));
            }
        }
        Var::Struct {
            dims,
            fields,
            elements,
        } => {
            const NAME_LEN: usize = 32;
            body.extend(flags_element(MX_STRUCT, 0));
            body.extend(dims_element(dims));
            body.extend(tag(MI_INT8, name.as_bytes()));
            body.extend(tag(MI_INT32, &(NAME_LEN as i32).to_le_bytes()));
            let mut names = Vec::with_capacity(fields.len() * NAME_LEN);
            for field in fields {
                let mut padded = field.as_bytes().to_vec();
                padded.resize(NAME_LEN, 0);
                names.extend(padded);
            }
            body.extend(tag(MI_INT8, &names));
            for element in elements {
                for value in element {
                    body.extend(matrix("", value));
                }
            }
        }
    }
    tag(MI_MATRIX, &body)
}

fn level5_header() -> Vec<u8> {
    let mut header = vec![b' '; 116];
    let text = b"MATLAB 5.0 MAT-file, written by meanap-rs tests";
    header[..text.len()].copy_from_slice(text);
    header.extend_from_slice(&[0u8; 8]);
    header.extend_from_slice(&0x0100u16.to_le_bytes());
    header.extend_from_slice(b"IM");
    header
}

/// Little-endian Level 5 file with uncompressed variables
pub fn mat5_bytes(vars: &[(&str, Var)]) -> Vec<u8> {
    let mut file = level5_header();
    for (name, var) in vars {
        file.extend(matrix(name, var));
    }
    file
}

/// Level 5 file with each variable in its own zlib element, as MATLAB v7 writes it
pub fn mat5_compressed_bytes(vars: &[(&str, Var)]) -> Vec<u8> {
    let mut file = level5_header();
    for (name, var) in vars {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&matrix(name, var)).unwrap();
        let compressed = encoder.finish().unwrap();
        file.extend_from_slice(&MI_COMPRESSED.to_le_bytes());
        file.extend_from_slice(&(compressed.len() as u32).to_le_bytes());
        file.extend(compressed);
    }
    file
}

/// Little-endian Level 4 file of double matrices
pub fn mat4_bytes(vars: &[(&str, usize, usize, &[f64])]) -> Vec<u8> {
    let mut file = Vec::new();
    for (name, rows, cols, data) in vars {
        assert_eq!(rows * cols, data.len());
        for word in [0i32, *rows as i32, *cols as i32, 0, name.len() as i32 + 1] {
            file.extend_from_slice(&word.to_le_bytes());
        }
        file.extend_from_slice(name.as_bytes());
        file.push(0);
        for v in data.iter() {
            file.extend_from_slice(&v.to_le_bytes());
        }
    }
    file
}

pub fn write_file(path: &Path, bytes: &[u8]) -> PathBuf {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, bytes).unwrap();
    path.to_path_buf()
}

/// Write `root/<group>/<experiment>/<experiment>_<suffix>.mat`.
pub fn write_result(
    root: &Path,
    group: &str,
    experiment: &str,
    suffix: &str,
    vars: &[(&str, Var)],
) -> PathBuf {
    let path = root
        .join(group)
        .join(experiment)
        .join(format!("{}_{}.mat", experiment, suffix));
    write_file(&path, &mat5_bytes(vars))
}

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}
