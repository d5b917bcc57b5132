use crate::error::QuamError;
use crate::node::{NodeId, Value};
use crate::quam::Quam;
use crate::reference;
use std::marker::PhantomData;

pub trait FromValue: Sized {
    const EXPECTED: &'static str;

    fn from_value(value: Value) -> Option<Self>;
}

impl FromValue for Value {
    const EXPECTED: &'static str = "any";

    fn from_value(value: Value) -> Option<Self> {
        Some(value)
    }
}

impl FromValue for bool {
    const EXPECTED: &'static str = "bool";

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Bool(v) => Some(v),
            _ => None,
        }
    }
}

impl FromValue for i64 {
    const EXPECTED: &'static str = "int";

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Int(v) => Some(v),
            _ => None,
        }
    }
}

impl FromValue for f64 {
    const EXPECTED: &'static str = "float";

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Float(v) => Some(v),
            Value::Int(v) => Some(v as f64),
            _ => None,
        }
    }
}

impl FromValue for String {
    const EXPECTED: &'static str = "str";

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Str(v) => Some(v),
            _ => None,
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    const EXPECTED: &'static str = T::EXPECTED;

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Null => Some(None),
            other => T::from_value(other).map(Some),
        }
    }
}

/// Typed handle for one named field. Reads resolve references, writes keep the
/// node's reference table in sync.
///
/// ```ignore
/// const FREQUENCY: Field<f64> = Field::new("frequency");
/// let f = FREQUENCY.get(&quam, qubit)?;
/// ```
#[derive(Debug)]
pub struct Field<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Field<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Field<T> {}

impl<T> Field<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn raw(&self, quam: &Quam, node: NodeId) -> Result<Value, QuamError> {
        quam.get_raw(node, self.name)
    }

    pub fn is_reference(&self, quam: &Quam, node: NodeId) -> Result<bool, QuamError> {
        quam.is_reference_field(node, self.name)
    }

    pub fn set_reference(&self, quam: &mut Quam, node: NodeId, target: &str) -> Result<(), QuamError> {
        if !reference::is_reference(target) {
            return Err(QuamError::invalid_reference(target, "not a reference"));
        }
        quam.set(node, self.name, Value::Str(target.to_string()))
    }
}

impl<T: FromValue> Field<T> {
    pub fn get(&self, quam: &Quam, node: NodeId) -> Result<T, QuamError> {
        let value = quam.get(node, self.name)?;
        let found = value.type_name();
        T::from_value(value).ok_or_else(|| QuamError::TypeMismatch {
            field: self.name.to_string(),
            expected: T::EXPECTED.to_string(),
            found: found.to_string(),
        })
    }
}

impl<T: Into<Value>> Field<T> {
    pub fn set(&self, quam: &mut Quam, node: NodeId, value: T) -> Result<(), QuamError> {
        quam.set(node, self.name, value.into())
    }
}
