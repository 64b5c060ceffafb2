//! Array shapes and broadcasting.

use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::error::{Result, VarError};

/// N-dimensional shape descriptor. The empty shape `()` is a scalar.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Shape {
    dims: SmallVec<[usize; 4]>,
}

impl Shape {
    pub fn new(dims: &[usize]) -> Self {
        Self {
            dims: SmallVec::from_slice(dims),
        }
    }

    pub fn scalar() -> Self {
        Self::default()
    }

    /// One-dimensional shape `(len,)`.
    pub fn vector(len: usize) -> Self {
        Self::new(&[len])
    }

    pub fn ndim(&self) -> usize {
        self.dims.len()
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn is_scalar(&self) -> bool {
        self.dims.is_empty()
    }

    /// Number of elements. A scalar holds one.
    pub fn numel(&self) -> usize {
        self.dims.iter().product()
    }

    /// Shape left after reducing along `axis`. `None` if the axis is out of range.
    pub fn without_axis(&self, axis: usize) -> Option<Shape> {
        if axis >= self.ndim() {
            return None;
        }
        let mut dims = self.dims.clone();
        dims.remove(axis);
        Some(Shape { dims })
    }

    /// Resolve a reshape request. At most one dimension may be `-1`; it is
    /// inferred from the element count.
    pub fn reshaped(&self, request: &[isize]) -> Result<Shape> {
        let mut inferred = None;
        let mut dims: SmallVec<[usize; 4]> = SmallVec::with_capacity(request.len());
        for (i, &d) in request.iter().enumerate() {
            if d == -1 {
                if inferred.replace(i).is_some() {
                    return Err(VarError::InvalidArray(
                        "can only infer one dimension of a reshape".to_string(),
                    ));
                }
                dims.push(1);
                continue;
            }
            let d = usize::try_from(d)
                .map_err(|_| VarError::InvalidArray(format!("invalid reshape dimension {}", d)))?;
            dims.push(d);
        }

        let numel = self.numel();
        let known: usize = dims.iter().product();
        if let Some(i) = inferred {
            if known != 0 && numel % known == 0 {
                dims[i] = numel / known;
            }
        }
        let shape = Shape { dims };
        if shape.numel() != numel {
            return Err(VarError::ShapeMismatch {
                left: self.clone(),
                right: shape,
            });
        }
        Ok(shape)
    }

    /// Broadcast two shapes: dimensions are compared right-aligned, missing
    /// leading dimensions count as 1, and a 1 stretches to its peer.
    /// Returns `None` if the shapes are incompatible.
    pub fn broadcast(a: &Shape, b: &Shape) -> Option<Shape> {
        let n = a.ndim().max(b.ndim());
        let mut dims = SmallVec::with_capacity(n);
        for i in 0..n {
            let da = if i < n - a.ndim() { 1 } else { a.dims[i - (n - a.ndim())] };
            let db = if i < n - b.ndim() { 1 } else { b.dims[i - (n - b.ndim())] };
            if da == db || db == 1 {
                dims.push(da);
            } else if da == 1 {
                dims.push(db);
            } else {
                return None;
            }
        }
        Some(Shape { dims })
    }

    /// Whether `self` can be stretched to `target` without changing `target`.
    pub fn broadcasts_to(&self, target: &Shape) -> bool {
        Shape::broadcast(self, target).as_ref() == Some(target)
    }

    /// Row-major strides of `self` laid out inside `target`, with zero
    /// strides on broadcast dimensions. `self` must broadcast to `target`.
    pub(crate) fn broadcast_strides(&self, target: &Shape) -> SmallVec<[usize; 4]> {
        let offset = target.ndim() - self.ndim();
        let mut strides: SmallVec<[usize; 4]> = SmallVec::from_elem(0, target.ndim());
        let mut step = 1;
        for i in (0..self.ndim()).rev() {
            if self.dims[i] != 1 {
                strides[i + offset] = step;
            }
            step *= self.dims[i];
        }
        strides
    }
}

impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Self {
        Self::new(dims)
    }
}

impl<const N: usize> From<[usize; N]> for Shape {
    fn from(dims: [usize; N]) -> Self {
        Self::new(&dims)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.dims.as_slice() {
            [] => write!(f, "()"),
            [d] => write!(f, "({},)", d),
            dims => {
                write!(f, "(")?;
                for (i, d) in dims.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", d)?;
                }
                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_basics() {
        let s = Shape::new(&[2, 3, 4]);
        assert_eq!(s.ndim(), 3);
        assert_eq!(s.numel(), 24);
        assert_eq!(Shape::scalar().numel(), 1);
        assert!(Shape::scalar().is_scalar());
    }

    #[test]
    fn broadcast_rules() {
        let a = Shape::new(&[3, 1]);
        let b = Shape::new(&[1, 4]);
        assert_eq!(Shape::broadcast(&a, &b), Some(Shape::new(&[3, 4])));

        let a = Shape::new(&[2, 3]);
        let b = Shape::new(&[3]);
        assert_eq!(Shape::broadcast(&a, &b), Some(Shape::new(&[2, 3])));

        assert_eq!(
            Shape::broadcast(&Shape::vector(3), &Shape::scalar()),
            Some(Shape::vector(3))
        );
        assert_eq!(Shape::broadcast(&Shape::vector(3), &Shape::vector(4)), None);
    }

    #[test]
    fn broadcasts_to_is_one_directional() {
        assert!(Shape::scalar().broadcasts_to(&Shape::vector(3)));
        assert!(!Shape::vector(3).broadcasts_to(&Shape::scalar()));
        assert!(Shape::new(&[1, 3]).broadcasts_to(&Shape::new(&[2, 3])));
    }

    #[test]
    fn strides_zero_on_broadcast_dims() {
        let s = Shape::new(&[3, 1]);
        let t = Shape::new(&[2, 3, 4]);
        assert_eq!(s.broadcast_strides(&t).as_slice(), &[0, 1, 0]);
    }

    #[test]
    fn reduced_shape_drops_axis() {
        let s = Shape::new(&[2, 3, 4]);
        assert_eq!(s.without_axis(0), Some(Shape::new(&[3, 4])));
        assert_eq!(s.without_axis(2), Some(Shape::new(&[2, 3])));
        assert_eq!(s.without_axis(3), None);
        assert_eq!(Shape::vector(5).without_axis(0), Some(Shape::scalar()));
        assert_eq!(Shape::scalar().without_axis(0), None);
    }

    #[test]
    fn reshape_infers_one_dimension() {
        let s = Shape::new(&[2, 6]);
        assert_eq!(s.reshaped(&[3, 4]).unwrap(), Shape::new(&[3, 4]));
        assert_eq!(s.reshaped(&[-1, 3]).unwrap(), Shape::new(&[4, 3]));
        assert_eq!(s.reshaped(&[-1]).unwrap(), Shape::vector(12));
        assert_eq!(Shape::vector(1).reshaped(&[]).unwrap(), Shape::scalar());

        assert!(matches!(s.reshaped(&[5, 2]), Err(VarError::ShapeMismatch { .. })));
        assert!(matches!(s.reshaped(&[-1, 5]), Err(VarError::ShapeMismatch { .. })));
        assert!(matches!(s.reshaped(&[-1, -1]), Err(VarError::InvalidArray(_))));
        assert!(matches!(s.reshaped(&[-2, -6]), Err(VarError::InvalidArray(_))));
    }

    #[test]
    fn display_matches_tuple_notation() {
        assert_eq!(Shape::scalar().to_string(), "()");
        assert_eq!(Shape::vector(3).to_string(), "(3,)");
        assert_eq!(Shape::new(&[2, 3]).to_string(), "(2, 3)");
    }
}
