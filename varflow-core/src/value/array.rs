//! Dense `f64` arrays with broadcasting.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::shape::Shape;
use crate::error::{Result, VarError};

/// Row-major array of `f64` with a [`Shape`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawArray")]
pub struct Array {
    shape: Shape,
    data: Vec<f64>,
}

/// Unchecked wire form; decoding goes through [`Array::new`].
#[derive(Deserialize)]
struct RawArray {
    shape: Shape,
    data: Vec<f64>,
}

impl TryFrom<RawArray> for Array {
    type Error = VarError;

    fn try_from(raw: RawArray) -> Result<Self> {
        Array::new(raw.shape, raw.data)
    }
}

impl Array {
    /// Build an array, checking that `data` fills `shape` exactly.
    pub fn new(shape: Shape, data: Vec<f64>) -> Result<Self> {
        if shape.numel() != data.len() {
            return Err(VarError::InvalidArray(format!(
                "{} elements do not fill shape {}",
                data.len(),
                shape
            )));
        }
        Ok(Self { shape, data })
    }

    pub fn scalar(value: f64) -> Self {
        Self {
            shape: Shape::scalar(),
            data: vec![value],
        }
    }

    pub fn from_vec(data: Vec<f64>) -> Self {
        Self {
            shape: Shape::vector(data.len()),
            data,
        }
    }

    pub fn filled(shape: Shape, value: f64) -> Self {
        let data = vec![value; shape.numel()];
        Self { shape, data }
    }

    pub fn zeros(shape: Shape) -> Self {
        Self::filled(shape, 0.0)
    }

    /// A 0/1 mask array, for use with [`Array::select`].
    pub fn mask(bits: &[bool]) -> Self {
        Self::from_vec(bits.iter().map(|&b| if b { 1.0 } else { 0.0 }).collect())
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<f64> {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The single element of a one-element array.
    pub fn to_scalar(&self) -> Option<f64> {
        match self.data.as_slice() {
            [v] => Some(*v),
            _ => None,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|v| v.is_finite())
    }

    /// Apply `f` to every element.
    pub fn map(&self, f: impl Fn(f64) -> f64) -> Array {
        Array {
            shape: self.shape.clone(),
            data: self.data.iter().map(|&v| f(v)).collect(),
        }
    }

    /// Stretch to `target`. Returns `None` if `self` does not broadcast to it.
    pub fn broadcast_to(&self, target: &Shape) -> Option<Array> {
        if &self.shape == target {
            return Some(self.clone());
        }
        if !self.shape.broadcasts_to(target) {
            return None;
        }
        let strides = self.shape.broadcast_strides(target);
        let dims = target.dims();
        let mut data = Vec::with_capacity(target.numel());
        for flat in 0..target.numel() {
            let mut rem = flat;
            let mut src = 0;
            for axis in (0..dims.len()).rev() {
                src += (rem % dims[axis]) * strides[axis];
                rem /= dims[axis];
            }
            data.push(self.data[src]);
        }
        Some(Array {
            shape: target.clone(),
            data,
        })
    }

    /// Combine element-wise after broadcasting both operands to a common shape.
    pub fn zip_with(&self, other: &Array, f: impl Fn(f64, f64) -> f64) -> Result<Array> {
        let mismatch = || VarError::ShapeMismatch {
            left: self.shape.clone(),
            right: other.shape.clone(),
        };
        let shape = Shape::broadcast(&self.shape, &other.shape).ok_or_else(mismatch)?;
        let (Some(a), Some(b)) = (self.broadcast_to(&shape), other.broadcast_to(&shape)) else {
            return Err(mismatch());
        };
        let data = a.data.iter().zip(&b.data).map(|(&x, &y)| f(x, y)).collect();
        Ok(Array { shape, data })
    }

    /// Element-wise `where`: take `other` where `mask` is nonzero, `self`
    /// elsewhere. `mask` and `other` must broadcast to `self`'s shape.
    pub fn select(&self, mask: &Array, other: &Array) -> Result<Array> {
        let mask = mask
            .broadcast_to(&self.shape)
            .ok_or_else(|| VarError::ShapeMismatch {
                left: self.shape.clone(),
                right: mask.shape.clone(),
            })?;
        let other = other
            .broadcast_to(&self.shape)
            .ok_or_else(|| VarError::ShapeMismatch {
                left: self.shape.clone(),
                right: other.shape.clone(),
            })?;
        let data = self
            .data
            .iter()
            .zip(&mask.data)
            .zip(&other.data)
            .map(|((&old, &m), &new)| if m != 0.0 { new } else { old })
            .collect();
        Ok(Array {
            shape: self.shape.clone(),
            data,
        })
    }

    /// Overwrite the elements at the given flat indices.
    pub fn put(&mut self, indices: &[usize], values: &[f64]) -> Result<()> {
        if values.len() != indices.len() && values.len() != 1 {
            return Err(VarError::InvalidArray(format!(
                "{} values for {} indices",
                values.len(),
                indices.len()
            )));
        }
        if let Some(&bad) = indices.iter().find(|&&i| i >= self.data.len()) {
            return Err(VarError::InvalidArray(format!(
                "index {} out of range for shape {}",
                bad, self.shape
            )));
        }
        for (k, &i) in indices.iter().enumerate() {
            self.data[i] = if values.len() == 1 { values[0] } else { values[k] };
        }
        Ok(())
    }

    pub fn sum(&self) -> f64 {
        self.data.iter().sum()
    }

    pub fn mean(&self) -> f64 {
        self.sum() / self.data.len() as f64
    }

    pub fn max(&self) -> f64 {
        self.data.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }

    pub fn min(&self) -> f64 {
        self.data.iter().copied().fold(f64::INFINITY, f64::min)
    }

    /// Reduce along `axis`, folding each lane with `f` from `init`.
    pub fn fold_axis(&self, axis: usize, init: f64, f: impl Fn(f64, f64) -> f64) -> Result<Array> {
        let shape = self
            .shape
            .without_axis(axis)
            .ok_or_else(|| VarError::ShapeMismatch {
                left: self.shape.clone(),
                right: Shape::new(&vec![1; axis + 1]),
            })?;
        let dims = self.shape.dims();
        let len = dims[axis];
        let outer: usize = dims[..axis].iter().product();
        let inner: usize = dims[axis + 1..].iter().product();

        let mut data = vec![init; outer * inner];
        for o in 0..outer {
            for j in 0..len {
                let lane = (o * len + j) * inner;
                for i in 0..inner {
                    let acc = &mut data[o * inner + i];
                    *acc = f(*acc, self.data[lane + i]);
                }
            }
        }
        Ok(Array { shape, data })
    }

    pub fn sum_axis(&self, axis: usize) -> Result<Array> {
        self.fold_axis(axis, 0.0, |a, b| a + b)
    }

    pub fn mean_axis(&self, axis: usize) -> Result<Array> {
        let sum = self.sum_axis(axis)?;
        let len = self.shape.dims()[axis] as f64;
        Ok(sum.map(|v| v / len))
    }

    pub fn max_axis(&self, axis: usize) -> Result<Array> {
        self.fold_axis(axis, f64::NEG_INFINITY, f64::max)
    }

    pub fn min_axis(&self, axis: usize) -> Result<Array> {
        self.fold_axis(axis, f64::INFINITY, f64::min)
    }

    /// Same data, new shape. The element count must not change.
    pub fn reshape(&self, shape: &Shape) -> Result<Array> {
        Array::new(shape.clone(), self.data.clone())
    }

    /// Gather elements by flat index into a vector.
    pub fn take(&self, indices: &[usize]) -> Result<Array> {
        let data = indices
            .iter()
            .map(|&i| {
                self.data.get(i).copied().ok_or_else(|| {
                    VarError::InvalidArray(format!("index {} out of range for shape {}", i, self.shape))
                })
            })
            .collect::<Result<Vec<f64>>>()?;
        Ok(Array::from_vec(data))
    }

    /// `|a - b| <= atol + rtol * |b|` for every broadcast pair.
    pub fn all_close(&self, other: &Array, rtol: f64, atol: f64) -> bool {
        self.zip_with(other, |a, b| {
            if (a - b).abs() <= atol + rtol * b.abs() {
                1.0
            } else {
                0.0
            }
        })
        .map(|flags| flags.data.iter().all(|&f| f == 1.0))
        .unwrap_or(false)
    }
}

impl From<f64> for Array {
    fn from(value: f64) -> Self {
        Array::scalar(value)
    }
}

impl From<Vec<f64>> for Array {
    fn from(data: Vec<f64>) -> Self {
        Array::from_vec(data)
    }
}

impl From<&[f64]> for Array {
    fn from(data: &[f64]) -> Self {
        Array::from_vec(data.to_vec())
    }
}

impl<const N: usize> From<[f64; N]> for Array {
    fn from(data: [f64; N]) -> Self {
        Array::from_vec(data.to_vec())
    }
}

impl fmt::Display for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.shape.is_scalar() {
            return write!(f, "{}", self.data[0]);
        }
        write!(f, "[")?;
        for (i, v) in self.data.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{}", v)?;
        }
        write!(f, "]")
    }
}
