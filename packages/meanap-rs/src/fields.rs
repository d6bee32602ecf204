//! Field lookup over decoded records
//!
//! The same metric can live in a top-level variable, a column of a struct
//! array, a field of a scalar struct or object, or inside a struct wrapped
//! in a one-element cell, depending on which pipeline version wrote the
//! file. [`get_field`] tries each representation in a fixed order and the
//! first one holding the field wins.

use crate::mat::{CellArray, MatValue, RawRecord};
use std::borrow::Cow;

/// Record representation a field was found in, in lookup order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Representation {
    /// Name → value mapping (top-level variables, HDF5 groups)
    Mapping,
    /// Struct array with more than one element; yields the whole column
    RecordArray,
    /// Scalar struct or object
    Attribute,
    /// Struct record wrapped in a one-element cell
    RecordElement,
}

/// Outcome of one representation: `Ok(None)` means the field is absent
/// there, `Err` that the value did not have the expected layout.
type Attempt<'a> = std::result::Result<Option<Cow<'a, MatValue>>, String>;

type Strategy = for<'a> fn(&'a MatValue, &str) -> Attempt<'a>;

const STRATEGIES: [(Representation, Strategy); 4] = [
    (Representation::Mapping, from_mapping),
    (Representation::RecordArray, from_record_array),
    (Representation::Attribute, from_attribute),
    (Representation::RecordElement, from_record_element),
];

fn from_mapping<'a>(value: &'a MatValue, name: &str) -> Attempt<'a> {
    match value {
        MatValue::Mapping(m) => Ok(m.get(name).map(Cow::Borrowed)),
        _ => Ok(None),
    }
}

fn from_record_array<'a>(value: &'a MatValue, name: &str) -> Attempt<'a> {
    let s = match value {
        MatValue::Struct(s) if !s.is_scalar() => s,
        _ => return Ok(None),
    };
    let idx = match s.field_index(name) {
        Some(idx) => idx,
        None => return Ok(None),
    };
    if s.elements.len() != s.numel() {
        return Err(format!(
            "struct array holds {} elements for dimensions {:?}",
            s.elements.len(),
            s.dims
        ));
    }

    let column = s
        .elements
        .iter()
        .map(|element| {
            element
                .get(idx)
                .cloned()
                .ok_or_else(|| format!("element is missing field '{}'", name))
        })
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(Some(Cow::Owned(MatValue::Cell(CellArray {
        dims: s.dims.clone(),
        elements: column,
    }))))
}

fn from_attribute<'a>(value: &'a MatValue, name: &str) -> Attempt<'a> {
    match value {
        MatValue::Struct(s) if s.is_scalar() => Ok(s.field(0, name).map(Cow::Borrowed)),
        _ => Ok(None),
    }
}

fn from_record_element<'a>(value: &'a MatValue, name: &str) -> Attempt<'a> {
    let cell = match value {
        MatValue::Cell(c) if c.elements.len() == 1 => c,
        _ => return Ok(None),
    };
    if cell.dims.iter().product::<usize>() != 1 {
        return Err(format!("one-element cell has dimensions {:?}", cell.dims));
    }
    match &cell.elements[0] {
        MatValue::Struct(s) => {
            if s.field_index(name).is_some() && s.elements.is_empty() {
                return Err(format!("record holding '{}' has no elements", name));
            }
            Ok(s.field(0, name).map(Cow::Borrowed))
        }
        _ => Ok(None),
    }
}

/// Find `name` in `value` and report which representation held it.
pub fn locate<'a>(value: &'a MatValue, name: &str) -> Option<(Representation, Cow<'a, MatValue>)> {
    for (representation, strategy) in STRATEGIES {
        match strategy(value, name) {
            Ok(Some(found)) => return Some((representation, found)),
            Ok(None) => {}
            Err(e) => {
                log::debug!("Field '{}' unreadable as {:?}: {}", name, representation, e);
            }
        }
    }
    None
}

pub fn get_field<'a>(value: &'a MatValue, name: &str) -> Option<Cow<'a, MatValue>> {
    locate(value, name).map(|(_, found)| found)
}

/// Field value, or `default` when no representation holds it.
pub fn get_or<'a>(value: &'a MatValue, name: &str, default: MatValue) -> Cow<'a, MatValue> {
    get_field(value, name).unwrap_or(Cow::Owned(default))
}

/// First of several alternative names that is present, with the name used.
pub fn get_any<'a, 'n>(
    value: &'a MatValue,
    names: &[&'n str],
) -> Option<(&'n str, Cow<'a, MatValue>)> {
    names
        .iter()
        .find_map(|&name| get_field(value, name).map(|found| (name, found)))
}

impl RawRecord {
    pub fn field(&self, name: &str) -> Option<Cow<'_, MatValue>> {
        get_field(self.root(), name)
    }

    /// The struct stored under `wrapper`, or the top-level variables when
    /// the file has no such wrapper.
    pub fn section(&self, wrapper: &str) -> Cow<'_, MatValue> {
        match get_field(self.root(), wrapper) {
            Some(section) => section,
            None => {
                log::debug!(
                    "{} has no '{}' struct; reading top-level variables",
                    self.path().display(),
                    wrapper
                );
                Cow::Borrowed(self.root())
            }
        }
    }
}
