//! Format-independent representation of decoded MATLAB data
//!
//! All containers (Level 5, Level 4, v7.3/HDF5) decode into [`MatValue`].
//! Arrays keep MATLAB's column-major storage order together with their
//! dimensions; [`row_major_order`] gives the element order used when an
//! array is flattened.

use crate::types::Scalar;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericClass {
    Double,
    Single,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Logical,
}

/// Numeric or logical array, real part only, stored column-major.
#[derive(Debug, Clone, PartialEq)]
pub struct NumericArray {
    pub class: NumericClass,
    pub dims: Vec<usize>,
    pub data: Vec<f64>,
}

impl NumericArray {
    pub fn new(class: NumericClass, dims: Vec<usize>, data: Vec<f64>) -> Self {
        Self { class, dims, data }
    }

    pub fn scalar(value: f64) -> Self {
        Self::new(NumericClass::Double, vec![1, 1], vec![value])
    }

    /// 1×N double row vector
    pub fn row(values: Vec<f64>) -> Self {
        Self::new(NumericClass::Double, vec![1, values.len()], values)
    }

    pub fn numel(&self) -> usize {
        numel(&self.dims)
    }

    /// Data in C (row-major) order, or `None` if the dimensions do not
    /// describe the stored data.
    pub fn row_major(&self) -> Option<Vec<f64>> {
        if self.numel() != self.data.len() {
            return None;
        }
        Some(
            row_major_order(&self.dims)
                .into_iter()
                .map(|i| self.data[i])
                .collect(),
        )
    }
}

/// Character array stored column-major; each row is one string.
#[derive(Debug, Clone, PartialEq)]
pub struct CharArray {
    pub dims: Vec<usize>,
    pub data: Vec<char>,
}

impl CharArray {
    pub fn from_text(text: &str) -> Self {
        let data: Vec<char> = text.chars().collect();
        Self {
            dims: vec![1, data.len()],
            data,
        }
    }

    pub fn rows(&self) -> Vec<String> {
        let nrows = self.dims.first().copied().unwrap_or(0);
        if nrows == 0 || self.data.is_empty() {
            return Vec::new();
        }
        let ncols = self.data.len() / nrows;
        (0..nrows)
            .map(|r| {
                (0..ncols)
                    .filter_map(|c| self.data.get(r + c * nrows))
                    .collect()
            })
            .collect()
    }

    /// Single-row arrays as one string; multi-row arrays joined by newline.
    pub fn text(&self) -> String {
        self.rows().join("\n")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CellArray {
    pub dims: Vec<usize>,
    pub elements: Vec<MatValue>,
}

/// Struct (or object) array. `elements[i][j]` is field `field_names[j]` of
/// element `i`, elements in column-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct StructArray {
    pub dims: Vec<usize>,
    pub class_name: Option<String>,
    pub field_names: Vec<String>,
    pub elements: Vec<Vec<MatValue>>,
}

impl StructArray {
    /// 1×1 struct from `(name, value)` pairs
    pub fn scalar<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = (S, MatValue)>,
        S: Into<String>,
    {
        let (field_names, values): (Vec<String>, Vec<MatValue>) =
            fields.into_iter().map(|(k, v)| (k.into(), v)).unzip();
        Self {
            dims: vec![1, 1],
            class_name: None,
            field_names,
            elements: vec![values],
        }
    }

    pub fn numel(&self) -> usize {
        numel(&self.dims)
    }

    pub fn is_scalar(&self) -> bool {
        self.numel() == 1 && self.elements.len() == 1
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.field_names.iter().position(|f| f == name)
    }

    pub fn field(&self, element: usize, name: &str) -> Option<&MatValue> {
        let idx = self.field_index(name)?;
        self.elements.get(element)?.get(idx)
    }
}

/// Ordered name → value mapping (a file's top-level variables, or an HDF5 group)
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Mapping {
    entries: Vec<(String, MatValue)>,
}

impl Mapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace; replacement keeps the original position.
    pub fn insert(&mut self, name: impl Into<String>, value: MatValue) {
        let name = name.into();
        match self.entries.iter_mut().find(|(k, _)| *k == name) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&MatValue> {
        self.entries.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MatValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, MatValue)> for Mapping {
    fn from_iter<T: IntoIterator<Item = (S, MatValue)>>(iter: T) -> Self {
        let mut mapping = Mapping::new();
        for (k, v) in iter {
            mapping.insert(k, v);
        }
        mapping
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MatValue {
    /// `[]`, an empty cell slot, or a class this crate does not decode
    Empty,
    Numeric(NumericArray),
    Char(CharArray),
    Cell(CellArray),
    Struct(StructArray),
    Mapping(Mapping),
    /// Values that were already flattened
    List(Vec<Scalar>),
}

impl MatValue {
    pub fn kind(&self) -> &'static str {
        match self {
            MatValue::Empty => "empty",
            MatValue::Numeric(_) => "numeric",
            MatValue::Char(_) => "char",
            MatValue::Cell(_) => "cell",
            MatValue::Struct(s) if s.class_name.is_some() => "object",
            MatValue::Struct(_) => "struct",
            MatValue::Mapping(_) => "mapping",
            MatValue::List(_) => "list",
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, MatValue::Empty)
    }

    /// Text content of a char array, unwrapping singleton cells.
    pub fn as_text(&self) -> Option<String> {
        match self {
            MatValue::Char(c) => Some(c.text()),
            MatValue::Cell(c) if c.elements.len() == 1 => c.elements[0].as_text(),
            _ => None,
        }
    }
}

impl From<f64> for MatValue {
    fn from(v: f64) -> Self {
        MatValue::Numeric(NumericArray::scalar(v))
    }
}

impl From<Vec<f64>> for MatValue {
    fn from(values: Vec<f64>) -> Self {
        MatValue::Numeric(NumericArray::row(values))
    }
}

impl From<&str> for MatValue {
    fn from(text: &str) -> Self {
        MatValue::Char(CharArray::from_text(text))
    }
}

impl From<StructArray> for MatValue {
    fn from(s: StructArray) -> Self {
        MatValue::Struct(s)
    }
}

impl From<Vec<Scalar>> for MatValue {
    fn from(values: Vec<Scalar>) -> Self {
        MatValue::List(values)
    }
}

/// Product of dimensions (`[]` counts as a scalar, like MATLAB).
pub fn numel(dims: &[usize]) -> usize {
    dims.iter().product()
}

/// Column-major storage indices listed in row-major (C) order.
pub fn row_major_order(dims: &[usize]) -> Vec<usize> {
    let total = numel(dims);
    if dims.len() <= 1 || total == 0 {
        return (0..total).collect();
    }

    let mut strides = Vec::with_capacity(dims.len());
    let mut acc = 1;
    for &d in dims {
        strides.push(acc);
        acc *= d;
    }

    let mut order = Vec::with_capacity(total);
    let mut index = vec![0usize; dims.len()];
    for _ in 0..total {
        order.push(index.iter().zip(&strides).map(|(i, s)| i * s).sum());
        // Increment the multi-index with the last axis fastest
        for axis in (0..dims.len()).rev() {
            index[axis] += 1;
            if index[axis] < dims[axis] {
                break;
            }
            index[axis] = 0;
        }
    }
    order
}
