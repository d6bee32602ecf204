use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;

/// Developmental age parsed from an experiment name.
///
/// Names normally end in a day count (`DIV14`); anything else is kept as the
/// raw label so that callers still see the experiment grouped somewhere.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Age {
    Days(u64),
    Label(String),
}

impl Age {
    pub fn days(&self) -> Option<u64> {
        match self {
            Age::Days(d) => Some(*d),
            Age::Label(_) => None,
        }
    }
}

impl Ord for Age {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Age::Days(a), Age::Days(b)) => a.cmp(b),
            (Age::Days(_), Age::Label(_)) => Ordering::Less,
            (Age::Label(_), Age::Days(_)) => Ordering::Greater,
            (Age::Label(a), Age::Label(b)) => a.cmp(b),
        }
    }
}

impl PartialOrd for Age {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Age {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Age::Days(d) => write!(f, "{}", d),
            Age::Label(s) => f.write_str(s),
        }
    }
}

impl From<u64> for Age {
    fn from(days: u64) -> Self {
        Age::Days(days)
    }
}

impl From<&str> for Age {
    fn from(label: &str) -> Self {
        Age::Label(label.to_string())
    }
}

// Integer ages serialize as numbers (or numeric map keys), labels as strings.
impl Serialize for Age {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Age::Days(d) => serializer.serialize_u64(*d),
            Age::Label(s) => serializer.serialize_str(s),
        }
    }
}

/// A single flattened value as handed to the aggregation views
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Scalar {
    Number(f64),
    Bool(bool),
    Text(String),
    /// Placeholder for a value the normalizer could not break down
    Opaque(String),
}

impl Scalar {
    /// Numeric view; logical values count as 0/1, text never converts.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Number(v) => Some(*v),
            Scalar::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Scalar::Text(_) | Scalar::Opaque(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Scalar::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Text coercion used for categorical matching (role labels).
    pub fn to_label(&self) -> String {
        match self {
            Scalar::Number(v) => format!("{}", v),
            Scalar::Bool(b) => b.to_string(),
            Scalar::Text(s) | Scalar::Opaque(s) => s.clone(),
        }
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Scalar::Number(v)
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::Text(s.to_string())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Scalar::Text(s)
    }
}

/// Finite numeric values of a flattened sequence, in order.
pub fn finite_numbers(values: &[Scalar]) -> Vec<f64> {
    values
        .iter()
        .filter_map(Scalar::as_f64)
        .filter(|v| v.is_finite())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_age_ordering_puts_days_first() {
        let mut ages = vec![Age::from("x"), Age::Days(50), Age::Days(7), Age::from("a")];
        ages.sort();
        assert_eq!(
            ages,
            vec![Age::Days(7), Age::Days(50), Age::from("a"), Age::from("x")]
        );
    }

    #[test]
    fn test_age_serializes_untagged() {
        assert_eq!(serde_json::to_string(&Age::Days(14)).unwrap(), "14");
        assert_eq!(serde_json::to_string(&Age::from("-noage")).unwrap(), "\"-noage\"");
    }

    #[test]
    fn test_finite_numbers_skips_text_and_nan() {
        let values = vec![
            Scalar::Number(1.0),
            Scalar::Number(f64::NAN),
            Scalar::from("Peripheral"),
            Scalar::Bool(true),
        ];
        assert_eq!(finite_numbers(&values), vec![1.0, 1.0]);
    }
}
