use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

/// A single field value carried by a fact.
///
/// Values are dynamically typed; the engine never interprets them beyond the
/// comparison and hashing semantics defined here. Cross-numeric comparison
/// (`Integer` vs `Float`) is supported; all other cross-type comparisons are
/// unordered.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum FactValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Array(Vec<FactValue>),
    Object(HashMap<String, FactValue>),
    Date(DateTime<Utc>),
    Null,
}

impl Eq for FactValue {}

impl std::hash::Hash for FactValue {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        match self {
            FactValue::String(s) => {
                0u8.hash(state);
                s.hash(state);
            }
            FactValue::Integer(i) => {
                1u8.hash(state);
                i.hash(state);
            }
            FactValue::Float(f) => {
                2u8.hash(state);
                // Bit representation keeps hashing consistent with Eq
                f.to_bits().hash(state);
            }
            FactValue::Boolean(b) => {
                3u8.hash(state);
                b.hash(state);
            }
            FactValue::Array(items) => {
                4u8.hash(state);
                items.hash(state);
            }
            FactValue::Object(map) => {
                5u8.hash(state);
                let mut entries: Vec<_> = map.iter().collect();
                entries.sort_by_key(|(k, _)| *k);
                for (key, value) in entries {
                    key.hash(state);
                    value.hash(state);
                }
            }
            FactValue::Date(dt) => {
                6u8.hash(state);
                dt.timestamp_nanos_opt().unwrap_or(0).hash(state);
            }
            FactValue::Null => {
                7u8.hash(state);
            }
        }
    }
}

impl PartialOrd for FactValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        use FactValue::*;
        match (self, other) {
            (String(a), String(b)) => a.partial_cmp(b),
            (Integer(a), Integer(b)) => a.partial_cmp(b),
            (Float(a), Float(b)) => a.partial_cmp(b),
            (Boolean(a), Boolean(b)) => a.partial_cmp(b),
            (Date(a), Date(b)) => a.partial_cmp(b),
            (Null, Null) => Some(Ordering::Equal),
            (Integer(a), Float(b)) => (*a as f64).partial_cmp(b),
            (Float(a), Integer(b)) => a.partial_cmp(&(*b as f64)),
            _ => None,
        }
    }
}

impl fmt::Display for FactValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FactValue::String(s) => write!(f, "{s}"),
            FactValue::Integer(i) => write!(f, "{i}"),
            FactValue::Float(fl) => write!(f, "{fl}"),
            FactValue::Boolean(b) => write!(f, "{b}"),
            FactValue::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            FactValue::Object(map) => {
                write!(f, "{{")?;
                let mut entries: Vec<_> = map.iter().collect();
                entries.sort_by_key(|(k, _)| *k);
                for (i, (key, value)) in entries.into_iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                write!(f, "}}")
            }
            FactValue::Date(dt) => write!(f, "{}", dt.to_rfc3339()),
            FactValue::Null => write!(f, "null"),
        }
    }
}

impl FactValue {
    /// Runtime type tag, used in error context and snapshots.
    pub fn type_name(&self) -> &'static str {
        match self {
            FactValue::String(_) => "string",
            FactValue::Integer(_) => "integer",
            FactValue::Float(_) => "float",
            FactValue::Boolean(_) => "boolean",
            FactValue::Array(_) => "array",
            FactValue::Object(_) => "object",
            FactValue::Date(_) => "date",
            FactValue::Null => "null",
        }
    }

    /// Numeric view of the value, if it is `Integer` or `Float`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FactValue::Integer(i) => Some(*i as f64),
            FactValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Integer view of the value, truncating floats.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FactValue::Integer(i) => Some(*i),
            FactValue::Float(f) => Some(*f as i64),
            _ => None,
        }
    }

    /// Truthiness for conditional logic: empty/zero/null are false.
    pub fn is_truthy(&self) -> bool {
        match self {
            FactValue::Boolean(b) => *b,
            FactValue::Integer(i) => *i != 0,
            FactValue::Float(f) => *f != 0.0,
            FactValue::String(s) => !s.is_empty(),
            FactValue::Array(items) => !items.is_empty(),
            FactValue::Object(map) => !map.is_empty(),
            FactValue::Date(_) => true,
            FactValue::Null => false,
        }
    }
}

impl From<FactValue> for serde_json::Value {
    fn from(value: FactValue) -> Self {
        match value {
            FactValue::String(s) => serde_json::Value::String(s),
            FactValue::Integer(i) => serde_json::Value::Number(i.into()),
            FactValue::Float(f) => serde_json::Number::from_f64(f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            FactValue::Boolean(b) => serde_json::Value::Bool(b),
            FactValue::Array(items) => {
                serde_json::Value::Array(items.into_iter().map(Into::into).collect())
            }
            FactValue::Object(map) => serde_json::Value::Object(
                map.into_iter().map(|(k, v)| (k, v.into())).collect(),
            ),
            FactValue::Date(dt) => serde_json::Value::String(dt.to_rfc3339()),
            FactValue::Null => serde_json::Value::Null,
        }
    }
}

impl TryFrom<&serde_json::Value> for FactValue {
    type Error = anyhow::Error;

    fn try_from(value: &serde_json::Value) -> Result<Self, Self::Error> {
        Ok(match value {
            serde_json::Value::String(s) => FactValue::String(s.clone()),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    FactValue::Integer(i)
                } else if let Some(f) = n.as_f64() {
                    FactValue::Float(f)
                } else {
                    return Err(anyhow::anyhow!("unsupported number value: {n}"));
                }
            }
            serde_json::Value::Bool(b) => FactValue::Boolean(*b),
            serde_json::Value::Array(items) => FactValue::Array(
                items.iter().map(FactValue::try_from).collect::<Result<Vec<_>, _>>()?,
            ),
            serde_json::Value::Object(map) => {
                let mut fields = HashMap::with_capacity(map.len());
                for (k, v) in map {
                    fields.insert(k.clone(), FactValue::try_from(v)?);
                }
                FactValue::Object(fields)
            }
            serde_json::Value::Null => FactValue::Null,
        })
    }
}

/// Comparison operators available to compiled single-fact conditions and
/// join tests.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Operator {
    Equal,
    NotEqual,
    GreaterThan,
    LessThan,
    GreaterThanOrEqual,
    LessThanOrEqual,
    Contains,
}

impl Operator {
    /// Test `left <op> right`.
    ///
    /// Float equality uses an epsilon; `Integer`/`Float` operands are
    /// compared numerically; `Contains` applies to strings (substring) and
    /// arrays (membership). Incomparable operand types test false.
    pub fn test(&self, left: &FactValue, right: &FactValue) -> bool {
        use FactValue::*;
        match (left, right) {
            (Float(a), Float(b)) => self.test_floats(*a, *b),
            (Integer(a), Float(b)) => self.test_floats(*a as f64, *b),
            (Float(a), Integer(b)) => self.test_floats(*a, *b as f64),
            (String(a), String(b)) if *self == Operator::Contains => a.contains(b.as_str()),
            (Array(items), needle) if *self == Operator::Contains => items.contains(needle),
            _ => match self {
                Operator::Equal => left == right,
                Operator::NotEqual => left != right,
                Operator::Contains => false,
                Operator::GreaterThan => left.partial_cmp(right) == Some(Ordering::Greater),
                Operator::LessThan => left.partial_cmp(right) == Some(Ordering::Less),
                Operator::GreaterThanOrEqual => {
                    matches!(left.partial_cmp(right), Some(Ordering::Greater | Ordering::Equal))
                }
                Operator::LessThanOrEqual => {
                    matches!(left.partial_cmp(right), Some(Ordering::Less | Ordering::Equal))
                }
            },
        }
    }

    fn test_floats(&self, a: f64, b: f64) -> bool {
        match self {
            Operator::Equal => (a - b).abs() < f64::EPSILON,
            Operator::NotEqual => (a - b).abs() >= f64::EPSILON,
            Operator::GreaterThan => a > b,
            Operator::LessThan => a < b,
            Operator::GreaterThanOrEqual => a >= b,
            Operator::LessThanOrEqual => a <= b,
            Operator::Contains => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_comparison_crosses_types() {
        assert!(Operator::GreaterThan.test(&FactValue::Integer(25), &FactValue::Float(24.5)));
        assert!(Operator::LessThanOrEqual.test(&FactValue::Float(25.0), &FactValue::Integer(25)));
        assert!(!Operator::Equal.test(&FactValue::Integer(1), &FactValue::String("1".into())));
    }

    #[test]
    fn contains_on_strings_and_arrays() {
        assert!(Operator::Contains.test(
            &FactValue::String("hello world".into()),
            &FactValue::String("world".into())
        ));
        assert!(Operator::Contains.test(
            &FactValue::Array(vec![FactValue::Integer(1), FactValue::Integer(2)]),
            &FactValue::Integer(2)
        ));
        assert!(!Operator::Contains.test(&FactValue::Integer(12), &FactValue::Integer(1)));
    }

    #[test]
    fn hash_is_stable_for_equal_floats() {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut h1 = DefaultHasher::new();
        let mut h2 = DefaultHasher::new();
        FactValue::Float(2.5).hash(&mut h1);
        FactValue::Float(2.5).hash(&mut h2);
        assert_eq!(h1.finish(), h2.finish());
    }

    #[test]
    fn json_round_trip() {
        let value = FactValue::Object(HashMap::from([
            ("amount".to_string(), FactValue::Float(12.5)),
            ("tags".to_string(), FactValue::Array(vec![FactValue::String("a".into())])),
        ]));
        let json: serde_json::Value = value.clone().into();
        assert_eq!(FactValue::try_from(&json).unwrap(), value);
    }
}
