//! MATLAB v7.3 decoder
//!
//! v7.3 MAT-files are HDF5 files with a 512-byte MATLAB user block. Groups
//! become structs (or plain mappings), datasets become arrays. Reading needs
//! the `hdf5` feature and the HDF5 system library; without it the decoder
//! still recognizes the container and declines it with a clear message.

use super::{ContainerDecoder, ContainerFormat, Decoded, Input};

const SIGNATURE: &[u8; 8] = b"\x89HDF\r\n\x1a\n";

pub struct Hdf5Decoder;

/// Locate the HDF5 superblock signature (offset 0, 512, 1024, ...).
pub(crate) fn find_signature(bytes: &[u8]) -> Option<usize> {
    let mut offset = 0usize;
    while offset + SIGNATURE.len() <= bytes.len() {
        if &bytes[offset..offset + SIGNATURE.len()] == SIGNATURE {
            return Some(offset);
        }
        offset = if offset == 0 { 512 } else { offset * 2 };
    }
    None
}

impl ContainerDecoder for Hdf5Decoder {
    fn name(&self) -> &'static str {
        "hdf5"
    }

    fn format(&self) -> ContainerFormat {
        ContainerFormat::Hdf5
    }

    fn decode(&self, input: &Input<'_>) -> Decoded {
        if find_signature(input.bytes).is_none() {
            return Decoded::NotMyFormat("no HDF5 superblock signature".to_string());
        }
        decode_hdf5(input)
    }
}

#[cfg(not(feature = "hdf5"))]
fn decode_hdf5(input: &Input<'_>) -> Decoded {
    log::warn!(
        "{} is a v7.3 (HDF5) MAT-file; rebuild with the `hdf5` feature to read it",
        input.path.display()
    );
    Decoded::NotMyFormat("v7.3 (HDF5) support not compiled in".to_string())
}

#[cfg(feature = "hdf5")]
fn decode_hdf5(input: &Input<'_>) -> Decoded {
    match reader::read_file(input.path) {
        Ok(variables) => Decoded::Record(variables),
        Err(e) => Decoded::Corrupt(e.to_string()),
    }
}

#[cfg(feature = "hdf5")]
mod reader {
    use crate::mat::value::{CharArray, MatValue, NumericArray, NumericClass, StructArray};
    use crate::mat::Mapping;
    use ::hdf5::types::{FixedAscii, VarLenAscii};
    use ::hdf5::{Dataset, File as H5File, Group, Location};
    use std::path::Path;

    pub(super) fn read_file(path: &Path) -> ::hdf5::Result<Mapping> {
        let file = H5File::open(path)?;
        read_members(&file)
    }

    fn read_members(group: &Group) -> ::hdf5::Result<Mapping> {
        let mut members = Mapping::new();
        for name in group.member_names()? {
            // MATLAB bookkeeping groups
            if name.starts_with('#') {
                continue;
            }
            if let Ok(child) = group.group(&name) {
                members.insert(name, read_group(&child)?);
            } else if let Ok(dataset) = group.dataset(&name) {
                members.insert(name, read_dataset(&dataset)?);
            }
        }
        Ok(members)
    }

    fn read_group(group: &Group) -> ::hdf5::Result<MatValue> {
        let members = read_members(group)?;
        if matlab_class(group).as_deref() == Some("struct") {
            let fields: Vec<(String, MatValue)> = members
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect();
            return Ok(MatValue::Struct(StructArray::scalar(fields)));
        }
        Ok(MatValue::Mapping(members))
    }

    fn read_dataset(dataset: &Dataset) -> ::hdf5::Result<MatValue> {
        if dataset.attr("MATLAB_empty").is_ok() {
            return Ok(MatValue::Empty);
        }
        // HDF5 stores the transposed array, so its row-major data is
        // MATLAB's column-major data under reversed dimensions.
        let dims: Vec<usize> = dataset.shape().into_iter().rev().collect();
        let class = matlab_class(dataset).unwrap_or_default();

        match class.as_str() {
            "cell" => {
                log::debug!("Skipping object-reference cell dataset {}", dataset.name());
                Ok(MatValue::Empty)
            }
            "char" => {
                let codes = dataset.read_raw::<u16>()?;
                let data = codes
                    .into_iter()
                    .map(|c| char::from_u32(c as u32).unwrap_or(char::REPLACEMENT_CHARACTER))
                    .collect();
                Ok(MatValue::Char(CharArray { dims, data }))
            }
            _ => {
                let data = dataset.read_raw::<f64>()?;
                let numeric_class = match class.as_str() {
                    "logical" => NumericClass::Logical,
                    "single" => NumericClass::Single,
                    "int8" => NumericClass::Int8,
                    "uint8" => NumericClass::UInt8,
                    "int16" => NumericClass::Int16,
                    "uint16" => NumericClass::UInt16,
                    "int32" => NumericClass::Int32,
                    "uint32" => NumericClass::UInt32,
                    "int64" => NumericClass::Int64,
                    "uint64" => NumericClass::UInt64,
                    _ => NumericClass::Double,
                };
                Ok(MatValue::Numeric(NumericArray::new(numeric_class, dims, data)))
            }
        }
    }

    fn matlab_class(location: &Location) -> Option<String> {
        let attr = location.attr("MATLAB_class").ok()?;
        attr.read_scalar::<FixedAscii<32>>()
            .map(|s| s.as_str().to_string())
            .or_else(|_| attr.read_scalar::<VarLenAscii>().map(|s| s.as_str().to_string()))
            .ok()
    }
}
