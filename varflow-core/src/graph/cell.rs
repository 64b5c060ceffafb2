//! Value Cell
//!
//! The cached value of a node and its dirty flag. Writing a cell never
//! propagates anything: invalidating dependents is the propagator's job, so
//! callers can batch writes and propagate once.

use crate::value::Value;

/// Cached value plus dirty flag.
#[derive(Debug, Clone, Default)]
pub struct ValueCell {
    value: Option<Value>,
    dirty: bool,
}

impl ValueCell {
    /// A fresh cell holding `value`.
    pub fn fresh(value: Value) -> Self {
        Self {
            value: Some(value),
            dirty: false,
        }
    }

    /// An empty dirty cell.
    pub fn dirty() -> Self {
        Self {
            value: None,
            dirty: true,
        }
    }

    pub fn read(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    pub fn write(&mut self, value: Value) {
        self.value = Some(value);
    }

    /// Drop the cached value.
    pub fn clear(&mut self) {
        self.value = None;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn mark_fresh(&mut self) {
        self.dirty = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_does_not_touch_flag() {
        let mut cell = ValueCell::dirty();
        cell.write(Value::from(1.0));
        assert!(cell.is_dirty());
        assert_eq!(cell.read(), Some(&Value::from(1.0)));

        cell.mark_fresh();
        assert!(!cell.is_dirty());
        cell.write(Value::from(2.0));
        assert!(!cell.is_dirty());
    }

    #[test]
    fn dirty_state_transitions() {
        let mut cell = ValueCell::fresh(Value::from(1.0));
        assert!(!cell.is_dirty());

        cell.mark_dirty();
        assert!(cell.is_dirty());

        cell.mark_fresh();
        assert!(!cell.is_dirty());

        cell.clear();
        assert!(cell.read().is_none());
    }
}
