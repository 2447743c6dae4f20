use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Type carried by a node socket.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// Accepts or produces any value.
    #[default]
    Any,
    Float,
    Int,
    Bool,
    String,
    FloatArray,
}

impl DataType {
    /// Whether an output of type `source` may feed an input of this type.
    pub fn accepts(&self, source: &DataType) -> bool {
        match (self, source) {
            (DataType::Any, _) | (_, DataType::Any) => true,
            (DataType::Float, DataType::Int) => true,
            (dst, src) => dst == src,
        }
    }
}

/// Serializable parameter value stored on a node.
#[derive(Clone, Default, Debug, Serialize, Deserialize)]
pub enum StaticValue {
    #[default]
    Null,
    Float(f64),
    Int(i64),
    Bool(bool),
    String(String),
    FloatArray(Vec<f64>),
}

impl PartialEq for StaticValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (StaticValue::Null, StaticValue::Null) => true,
            (StaticValue::Float(left), StaticValue::Float(right)) => {
                left.to_bits() == right.to_bits()
            }
            (StaticValue::Int(left), StaticValue::Int(right)) => left == right,
            (StaticValue::Bool(left), StaticValue::Bool(right)) => left == right,
            (StaticValue::String(left), StaticValue::String(right)) => left == right,
            (StaticValue::FloatArray(left), StaticValue::FloatArray(right)) => {
                left.len() == right.len()
                    && left
                        .iter()
                        .zip(right.iter())
                        .all(|(l, r)| l.to_bits() == r.to_bits())
            }
            _ => false,
        }
    }
}

impl StaticValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            StaticValue::Float(value) => Some(*value),
            StaticValue::Int(value) => Some(*value as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            StaticValue::Int(value) => Some(*value),
            StaticValue::Float(value) => Some(*value as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            StaticValue::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_floats(&self) -> Option<&[f64]> {
        match self {
            StaticValue::FloatArray(values) => Some(values),
            _ => None,
        }
    }
}

impl From<f64> for StaticValue {
    fn from(value: f64) -> Self {
        StaticValue::Float(value)
    }
}

impl From<i64> for StaticValue {
    fn from(value: i64) -> Self {
        StaticValue::Int(value)
    }
}

impl From<bool> for StaticValue {
    fn from(value: bool) -> Self {
        StaticValue::Bool(value)
    }
}

impl From<&str> for StaticValue {
    fn from(value: &str) -> Self {
        StaticValue::String(value.to_string())
    }
}

impl From<Vec<f64>> for StaticValue {
    fn from(values: Vec<f64>) -> Self {
        StaticValue::FloatArray(values)
    }
}

/// Runtime value flowing along links. Arrays are shared, not copied, when an
/// input is handed to a downstream node.
#[derive(Clone, Default, Debug, PartialEq)]
pub enum DynamicValue {
    #[default]
    None,
    Float(f64),
    Int(i64),
    Bool(bool),
    String(String),
    FloatArray(Arc<Vec<f64>>),
}

impl DynamicValue {
    pub fn is_none(&self) -> bool {
        matches!(self, DynamicValue::None)
    }

    pub fn data_type(&self) -> DataType {
        match self {
            DynamicValue::None => DataType::Any,
            DynamicValue::Float(_) => DataType::Float,
            DynamicValue::Int(_) => DataType::Int,
            DynamicValue::Bool(_) => DataType::Bool,
            DynamicValue::String(_) => DataType::String,
            DynamicValue::FloatArray(_) => DataType::FloatArray,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            DynamicValue::Float(value) => Some(*value),
            DynamicValue::Int(value) => Some(*value as f64),
            DynamicValue::Bool(value) => Some(*value as i64 as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            DynamicValue::Int(value) => Some(*value),
            DynamicValue::Float(value) => Some(*value as i64),
            DynamicValue::Bool(value) => Some(*value as i64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            DynamicValue::Bool(value) => Some(*value),
            DynamicValue::Int(value) => Some(*value != 0),
            DynamicValue::Float(value) => Some(value.abs() > f64::EPSILON),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&str> {
        match self {
            DynamicValue::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_floats(&self) -> Option<&Arc<Vec<f64>>> {
        match self {
            DynamicValue::FloatArray(values) => Some(values),
            _ => None,
        }
    }
}

impl From<&StaticValue> for DynamicValue {
    fn from(value: &StaticValue) -> Self {
        match value {
            StaticValue::Null => DynamicValue::None,
            StaticValue::Float(value) => DynamicValue::Float(*value),
            StaticValue::Int(value) => DynamicValue::Int(*value),
            StaticValue::Bool(value) => DynamicValue::Bool(*value),
            StaticValue::String(value) => DynamicValue::String(value.clone()),
            StaticValue::FloatArray(values) => DynamicValue::FloatArray(Arc::new(values.clone())),
        }
    }
}

impl From<f64> for DynamicValue {
    fn from(value: f64) -> Self {
        DynamicValue::Float(value)
    }
}

impl From<i64> for DynamicValue {
    fn from(value: i64) -> Self {
        DynamicValue::Int(value)
    }
}

impl From<bool> for DynamicValue {
    fn from(value: bool) -> Self {
        DynamicValue::Bool(value)
    }
}

impl From<Vec<f64>> for DynamicValue {
    fn from(values: Vec<f64>) -> Self {
        DynamicValue::FloatArray(Arc::new(values))
    }
}

#[cfg(test)]
mod tests {
    use common::{SerdeFormat, deserialize, serialize};

    use super::*;

    #[test]
    fn socket_compatibility() {
        assert!(DataType::Float.accepts(&DataType::Int));
        assert!(!DataType::Int.accepts(&DataType::Float));
        assert!(DataType::Any.accepts(&DataType::FloatArray));
        assert!(DataType::String.accepts(&DataType::Any));
        assert!(!DataType::Bool.accepts(&DataType::String));
    }

    #[test]
    fn static_value_serde() -> anyhow::Result<()> {
        let values = vec![
            StaticValue::Float(1.5),
            StaticValue::Int(3),
            StaticValue::String("A".to_string()),
            StaticValue::FloatArray(vec![0.0, 1.0, 10.0, 2.0]),
        ];

        for format in [SerdeFormat::Yaml, SerdeFormat::Json] {
            let text = serialize(&values, format)?;
            let restored: Vec<StaticValue> = deserialize(&text, format)?;
            assert_eq!(restored, values);
        }

        Ok(())
    }

    #[test]
    fn dynamic_conversions() {
        assert_eq!(DynamicValue::Int(4).as_f64(), Some(4.0));
        assert_eq!(DynamicValue::Float(2.9).as_i64(), Some(2));
        assert_eq!(DynamicValue::from(&StaticValue::Null), DynamicValue::None);

        let array = DynamicValue::from(vec![1.0, 2.0]);
        let shared = array.clone();
        assert!(Arc::ptr_eq(
            array.as_floats().unwrap(),
            shared.as_floats().unwrap()
        ));
    }
}
