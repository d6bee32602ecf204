//! Flattening of decoded arrays into ordered scalar sequences
//!
//! Every value is first classified into a [`Shape`]; each shape has exactly
//! one flattening rule. Values no shape describes (mappings, arrays whose
//! dimensions disagree with their data) fall back to a single opaque entry
//! and a warning, so nothing is dropped silently.

use crate::mat::value::row_major_order;
use crate::mat::{MatValue, NumericArray, NumericClass, StructArray};
use crate::types::Scalar;
use std::borrow::Cow;

#[derive(Debug)]
pub enum Shape<'a> {
    Empty,
    /// Struct or object array; elements flatten field by field
    Structured(&'a StructArray),
    /// Numeric or logical array with more than one element
    Numeric(&'a NumericArray),
    /// Cell array entries or the rows of a multi-row char array
    ObjectLike(Vec<Cow<'a, MatValue>>),
    AlreadyFlat(&'a [Scalar]),
    Scalar(Scalar),
}

impl<'a> Shape<'a> {
    /// `None` when the value fits no shape.
    pub fn classify(value: &'a MatValue) -> Option<Self> {
        let shape = match value {
            MatValue::Empty => Shape::Empty,
            MatValue::List(items) => Shape::AlreadyFlat(items),
            MatValue::Struct(s) => {
                if s.elements.len() != s.numel() {
                    return None;
                }
                Shape::Structured(s)
            }
            MatValue::Numeric(arr) => {
                if arr.data.len() != arr.numel() {
                    return None;
                }
                match arr.data.as_slice() {
                    [] => Shape::Empty,
                    [single] => Shape::Scalar(numeric_scalar(arr.class, *single)),
                    _ => Shape::Numeric(arr),
                }
            }
            MatValue::Char(chars) => {
                let rows = chars.rows();
                if rows.len() <= 1 {
                    Shape::Scalar(Scalar::Text(rows.into_iter().next().unwrap_or_default()))
                } else {
                    Shape::ObjectLike(
                        rows.iter()
                            .map(|row| Cow::Owned(MatValue::from(row.as_str())))
                            .collect(),
                    )
                }
            }
            MatValue::Cell(cell) => {
                if cell.elements.len() != cell.dims.iter().product::<usize>() {
                    return None;
                }
                Shape::ObjectLike(
                    row_major_order(&cell.dims)
                        .into_iter()
                        .map(|i| Cow::Borrowed(&cell.elements[i]))
                        .collect(),
                )
            }
            MatValue::Mapping(_) => return None,
        };
        Some(shape)
    }
}

fn numeric_scalar(class: NumericClass, value: f64) -> Scalar {
    match class {
        NumericClass::Logical => Scalar::Bool(value != 0.0),
        _ => Scalar::Number(value),
    }
}

/// Flatten `value` into scalars in row-major element order.
///
/// Struct elements contribute all their fields in declaration order; empty
/// cell entries contribute nothing; an already flat list is returned as is.
pub fn flatten(value: &MatValue) -> Vec<Scalar> {
    let mut out = Vec::new();
    flatten_into(value, &mut out);
    out
}

fn flatten_into(value: &MatValue, out: &mut Vec<Scalar>) {
    let shape = match Shape::classify(value) {
        Some(shape) => shape,
        None => {
            log::warn!(
                "Cannot flatten {} value; keeping it as a single opaque entry",
                value.kind()
            );
            out.push(Scalar::Opaque(describe(value)));
            return;
        }
    };

    match shape {
        Shape::Empty => {}
        Shape::Scalar(s) => out.push(s),
        Shape::AlreadyFlat(items) => out.extend_from_slice(items),
        Shape::Numeric(arr) => {
            // classify() already checked the dimensions
            let values = arr.row_major().unwrap_or_default();
            out.extend(values.into_iter().map(|v| numeric_scalar(arr.class, v)));
        }
        Shape::ObjectLike(items) => {
            for item in &items {
                flatten_into(item, out);
            }
        }
        Shape::Structured(s) => {
            for i in row_major_order(&s.dims) {
                for field in &s.elements[i] {
                    flatten_into(field, out);
                }
            }
        }
    }
}

fn describe(value: &MatValue) -> String {
    match value {
        MatValue::Mapping(m) => format!("<mapping with {} entries>", m.len()),
        MatValue::Numeric(arr) => format!(
            "<numeric {:?} holding {} values>",
            arr.dims,
            arr.data.len()
        ),
        MatValue::Struct(s) => {
            format!("<struct {:?} holding {} elements>", s.dims, s.elements.len())
        }
        MatValue::Cell(c) => format!("<cell {:?} holding {} elements>", c.dims, c.elements.len()),
        other => format!("<{}>", other.kind()),
    }
}

/// Flattened numeric view; entries with no numeric meaning become NaN so
/// positions stay aligned with the source array.
pub fn flatten_f64(value: &MatValue) -> Vec<f64> {
    flatten(value)
        .iter()
        .map(|s| s.as_f64().unwrap_or(f64::NAN))
        .collect()
}

/// Flattened values as labels (role names, channel ids).
pub fn flatten_labels(value: &MatValue) -> Vec<String> {
    flatten(value).iter().map(Scalar::to_label).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mat::{CellArray, CharArray, Mapping};

    #[test]
    fn test_empty_and_scalar() {
        assert!(flatten(&MatValue::Empty).is_empty());
        assert_eq!(flatten(&MatValue::from(2.5)), vec![Scalar::Number(2.5)]);
        assert_eq!(flatten(&MatValue::from("Peripheral")), vec![Scalar::from("Peripheral")]);
    }

    #[test]
    fn test_numeric_matrix_is_row_major() {
        let value = MatValue::Numeric(NumericArray::new(
            NumericClass::Double,
            vec![2, 2],
            vec![1.0, 3.0, 2.0, 4.0],
        ));
        assert_eq!(flatten_f64(&value), vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_logical_becomes_bool() {
        let value = MatValue::Numeric(NumericArray::new(
            NumericClass::Logical,
            vec![1, 2],
            vec![1.0, 0.0],
        ));
        assert_eq!(flatten(&value), vec![Scalar::Bool(true), Scalar::Bool(false)]);
    }

    #[test]
    fn test_cell_drops_empty_entries() {
        let value = MatValue::Cell(CellArray {
            dims: vec![1, 3],
            elements: vec![
                MatValue::from("Peripheral"),
                MatValue::Empty,
                MatValue::from("Kinless hub"),
            ],
        });
        assert_eq!(
            flatten_labels(&value),
            vec!["Peripheral".to_string(), "Kinless hub".to_string()]
        );
    }

    #[test]
    fn test_struct_elements_concatenate_fields() {
        let value = MatValue::Struct(StructArray {
            dims: vec![1, 2],
            class_name: None,
            field_names: vec!["a".into(), "b".into()],
            elements: vec![
                vec![MatValue::from(1.0), MatValue::from(vec![2.0, 3.0])],
                vec![MatValue::from(4.0), MatValue::Empty],
            ],
        });
        assert_eq!(flatten_f64(&value), vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_multi_row_char_gives_one_entry_per_row() {
        let value = MatValue::Char(CharArray {
            dims: vec![2, 2],
            data: vec!['a', 'c', 'b', 'd'],
        });
        assert_eq!(flatten_labels(&value), vec!["ab".to_string(), "cd".to_string()]);
    }

    #[test]
    fn test_flatten_is_idempotent() {
        let value = MatValue::from(vec![1.0, f64::INFINITY, 3.0]);
        let once = flatten(&value);
        let twice = flatten(&MatValue::List(once.clone()));
        assert_eq!(once, twice);
    }

    #[test]
    fn test_mapping_falls_back_to_opaque() {
        let value = MatValue::Mapping(Mapping::new());
        match flatten(&value).as_slice() {
            [Scalar::Opaque(desc)] => assert!(desc.contains("mapping")),
            other => panic!("expected one opaque entry, got {:?}", other),
        }
    }

    #[test]
    fn test_inconsistent_dims_fall_back() {
        let array = NumericArray::new(NumericClass::Double, vec![3, 1], vec![1.0]);
        let value = MatValue::Numeric(array);
        assert!(matches!(flatten(&value).as_slice(), [Scalar::Opaque(_)]));
    }
}
