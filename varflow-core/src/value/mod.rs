//! Values
//!
//! A [`Value`] is what a node caches: a dense [`Array`] tagged with a
//! physical [`Unit`]. Shapes follow NumPy broadcasting rules.

mod array;
mod shape;
mod unit;

pub use array::Array;
pub use shape::Shape;
pub use unit::Unit;

use std::fmt;

use serde::{Deserialize, Serialize};

/// An array tagged with a physical unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Value {
    pub array: Array,
    #[serde(default)]
    pub unit: Unit,
}

impl Value {
    pub fn new(array: Array, unit: Unit) -> Self {
        Self { array, unit }
    }

    pub fn dimensionless(array: Array) -> Self {
        Self::new(array, Unit::dimensionless())
    }

    pub fn shape(&self) -> &Shape {
        self.array.shape()
    }

    pub fn as_slice(&self) -> &[f64] {
        self.array.as_slice()
    }

    pub fn to_scalar(&self) -> Option<f64> {
        self.array.to_scalar()
    }

    /// Units must match; values are compared with [`Array::all_close`].
    pub fn all_close(&self, other: &Value, rtol: f64, atol: f64) -> bool {
        self.unit == other.unit && self.array.all_close(&other.array, rtol, atol)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::dimensionless(Array::scalar(value))
    }
}

impl From<Vec<f64>> for Value {
    fn from(data: Vec<f64>) -> Self {
        Value::dimensionless(Array::from_vec(data))
    }
}

impl<const N: usize> From<[f64; N]> for Value {
    fn from(data: [f64; N]) -> Self {
        Value::dimensionless(Array::from(data))
    }
}

impl From<Array> for Value {
    fn from(array: Array) -> Self {
        Value::dimensionless(array)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.unit.is_dimensionless() {
            write!(f, "{}", self.array)
        } else {
            write!(f, "{} {}", self.array, self.unit)
        }
    }
}
