//! Python Bindings
//!
//! Exposes `Graph` and `Variable` to Python. Values cross the boundary as
//! floats (scalars) or flat lists of floats.

use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;

use crate::config::EngineConfig;
use crate::error::{Result, VarError};
use crate::ops::{self, Operand};
use crate::value::{Array, Unit, Value};
use crate::variable::{Graph, Variable};

impl From<VarError> for PyErr {
    fn from(err: VarError) -> PyErr {
        match err {
            VarError::ShapeMismatch { .. }
            | VarError::UnitMismatch { .. }
            | VarError::AmbiguousCombination { .. }
            | VarError::InvalidUnit(_)
            | VarError::InvalidArray(_)
            | VarError::NotALeaf(_)
            | VarError::Config(_) => PyValueError::new_err(err.to_string()),
            _ => PyRuntimeError::new_err(err.to_string()),
        }
    }
}

/// A float or a flat list of floats.
#[derive(FromPyObject)]
enum ArrayLike {
    Scalar(f64),
    Vector(Vec<f64>),
}

impl From<ArrayLike> for Value {
    fn from(value: ArrayLike) -> Self {
        match value {
            ArrayLike::Scalar(v) => Value::from(v),
            ArrayLike::Vector(v) => Value::from(Array::from_vec(v)),
        }
    }
}

#[derive(FromPyObject)]
enum PyOperand<'py> {
    Variable(PyRef<'py, PyVariable>),
    Raw(ArrayLike),
}

fn parse_unit(unit: Option<&str>) -> Result<Unit> {
    unit.map(str::parse).transpose().map(Option::unwrap_or_default)
}

fn value_to_py(py: Python<'_>, value: &Value) -> PyObject {
    match value.to_scalar() {
        Some(v) => v.into_py(py),
        None => value.as_slice().to_vec().into_py(py),
    }
}

/// Python-exposed dependency graph.
#[pyclass(name = "Graph")]
pub struct PyGraph {
    graph: Graph,
}

#[pymethods]
impl PyGraph {
    /// Create a graph, optionally configured from a JSON string.
    #[new]
    #[pyo3(signature = (config=None))]
    fn new(config: Option<&str>) -> PyResult<Self> {
        let graph = match config {
            Some(json) => Graph::with_config(EngineConfig::from_json(json)?),
            None => Graph::new(),
        };
        Ok(Self { graph })
    }

    /// Create a leaf variable.
    #[pyo3(signature = (value, unit=None, name=None))]
    fn leaf(&self, value: ArrayLike, unit: Option<&str>, name: Option<String>) -> PyResult<PyVariable> {
        let var = self
            .graph
            .leaf(value)
            .unit(parse_unit(unit)?)
            .name(name.unwrap_or_default())
            .build()?;
        Ok(PyVariable { var })
    }

    /// Reclaim unreachable nodes. Returns how many were removed.
    fn collect(&self) -> usize {
        self.graph.collect()
    }

    fn __len__(&self) -> usize {
        self.graph.node_count()
    }

    fn __repr__(&self) -> String {
        format!("Graph(nodes={})", self.graph.node_count())
    }
}

/// Python-exposed variable handle.
#[pyclass(name = "Variable")]
pub struct PyVariable {
    var: Variable,
}

type Build = for<'a> fn(&Variable, Operand<'a>) -> Result<Variable>;
type Reduce = fn(&Variable) -> Result<Variable>;
type ReduceAxis = fn(&Variable, usize) -> Result<Variable>;

impl PyVariable {
    fn binary(&self, other: PyOperand<'_>, build: Build) -> PyResult<Self> {
        let var = match other {
            PyOperand::Variable(v) => build(&self.var, Operand::Node(&v.var))?,
            PyOperand::Raw(raw) => build(&self.var, Operand::Constant(raw.into()))?,
        };
        Ok(Self { var })
    }

    fn reduce(&self, axis: Option<usize>, whole: Reduce, along: ReduceAxis) -> PyResult<Self> {
        let var = match axis {
            Some(axis) => along(&self.var, axis)?,
            None => whole(&self.var)?,
        };
        Ok(Self { var })
    }
}

#[pymethods]
impl PyVariable {
    /// Current value; evaluates if stale.
    #[getter]
    fn value(&self, py: Python<'_>) -> PyResult<PyObject> {
        Ok(value_to_py(py, &self.var.value()?))
    }

    fn set_value(&self, value: ArrayLike) -> PyResult<()> {
        Ok(self.var.set_value(value)?)
    }

    #[getter]
    fn dirty(&self) -> bool {
        self.var.is_dirty()
    }

    #[getter]
    fn unit(&self) -> String {
        self.var.unit().to_string()
    }

    #[getter]
    fn shape(&self) -> Vec<usize> {
        self.var.shape().dims().to_vec()
    }

    #[getter]
    fn name(&self) -> String {
        self.var.name()
    }

    #[setter]
    fn set_name(&self, name: String) {
        self.var.set_name(name);
    }

    #[pyo3(signature = (enabled, recursive=false))]
    fn set_caching(&self, enabled: bool, recursive: bool) {
        self.var.set_caching(enabled, recursive);
    }

    #[pyo3(signature = (axis=None))]
    fn sum(&self, axis: Option<usize>) -> PyResult<Self> {
        self.reduce(axis, ops::sum, ops::sum_axis)
    }

    #[pyo3(signature = (axis=None))]
    fn mean(&self, axis: Option<usize>) -> PyResult<Self> {
        self.reduce(axis, ops::mean, ops::mean_axis)
    }

    #[pyo3(signature = (axis=None))]
    fn max(&self, axis: Option<usize>) -> PyResult<Self> {
        self.reduce(axis, ops::max, ops::max_axis)
    }

    #[pyo3(signature = (axis=None))]
    fn min(&self, axis: Option<usize>) -> PyResult<Self> {
        self.reduce(axis, ops::min, ops::min_axis)
    }

    fn reshape(&self, shape: Vec<isize>) -> PyResult<Self> {
        Ok(Self {
            var: ops::reshape(&self.var, &shape)?,
        })
    }

    fn take(&self, indices: Vec<usize>) -> PyResult<Self> {
        Ok(Self {
            var: ops::take(&self.var, &indices)?,
        })
    }

    fn __add__(&self, other: PyOperand<'_>) -> PyResult<Self> {
        self.binary(other, |a, b| ops::add(a, b))
    }

    fn __radd__(&self, other: PyOperand<'_>) -> PyResult<Self> {
        self.binary(other, |a, b| ops::add(a, b))
    }

    fn __sub__(&self, other: PyOperand<'_>) -> PyResult<Self> {
        self.binary(other, |a, b| ops::subtract(a, b))
    }

    fn __rsub__(&self, other: ArrayLike) -> PyResult<Self> {
        Ok(Self {
            var: ops::reverse_subtract(&self.var, other)?,
        })
    }

    fn __mul__(&self, other: PyOperand<'_>) -> PyResult<Self> {
        self.binary(other, |a, b| ops::multiply(a, b))
    }

    fn __rmul__(&self, other: PyOperand<'_>) -> PyResult<Self> {
        self.binary(other, |a, b| ops::multiply(a, b))
    }

    fn __truediv__(&self, other: PyOperand<'_>) -> PyResult<Self> {
        self.binary(other, |a, b| ops::divide(a, b))
    }

    fn __rtruediv__(&self, other: ArrayLike) -> PyResult<Self> {
        Ok(Self {
            var: ops::reverse_divide(&self.var, other)?,
        })
    }

    fn __pow__(&self, other: PyOperand<'_>, _modulo: Option<PyObject>) -> PyResult<Self> {
        self.binary(other, |a, b| ops::power(a, b))
    }

    fn __neg__(&self) -> PyResult<Self> {
        Ok(Self {
            var: ops::negate(&self.var)?,
        })
    }

    fn __str__(&self) -> String {
        self.var.to_string()
    }

    fn __repr__(&self) -> String {
        format!(
            "Variable({}, shape={}, unit={}, dirty={})",
            self.var,
            self.var.shape(),
            self.var.unit(),
            self.var.is_dirty()
        )
    }
}
