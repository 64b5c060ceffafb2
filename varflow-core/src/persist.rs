//! Leaf Snapshots
//!
//! Only leaves can be persisted: an expression is defined by the closures
//! of its operators, which have no serialized form. A snapshot carries a
//! leaf's value, unit, and name, and restoring it always builds a new,
//! independent leaf.

use serde::{Deserialize, Serialize};

use crate::error::{Result, VarError};
use crate::value::{Array, Unit, Value};
use crate::variable::{Graph, Variable};

/// Serializable state of a leaf variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeafSnapshot {
    pub value: Array,
    #[serde(default)]
    pub unit: Unit,
    #[serde(default)]
    pub name: String,
}

impl LeafSnapshot {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| VarError::Persistence(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| VarError::Persistence(e.to_string()))
    }

    /// Encode as MessagePack, with field names.
    pub fn to_msgpack(&self) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(self)?)
    }

    pub fn from_msgpack(bytes: &[u8]) -> Result<Self> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}

impl Variable {
    /// Capture a leaf's value, unit, and name.
    pub fn snapshot(&self) -> Result<LeafSnapshot> {
        let arena = self.graph().lock();
        let node = arena
            .get(self.id())
            .ok_or(VarError::DanglingReference(self.id()))?;
        if !node.is_leaf() {
            return Err(VarError::NotALeaf(self.id()));
        }
        let value = node
            .cached()
            .ok_or(VarError::DanglingReference(self.id()))?;
        Ok(LeafSnapshot {
            value: value.array.clone(),
            unit: value.unit,
            name: node.name().to_string(),
        })
    }
}

impl Graph {
    /// Build a new leaf from a snapshot.
    pub fn restore(&self, snapshot: &LeafSnapshot) -> Result<Variable> {
        self.leaf(Value::new(snapshot.value.clone(), snapshot.unit))
            .name(snapshot.name.clone())
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_round_trip() {
        let graph = Graph::new();
        let v = graph
            .leaf(vec![1.0, 2.5])
            .unit("kg*m/s^2".parse().unwrap())
            .name("force")
            .build()
            .unwrap();

        let json = v.snapshot().unwrap().to_json().unwrap();
        assert!(json.contains("\"force\""));
        let restored = graph.restore(&LeafSnapshot::from_json(&json).unwrap()).unwrap();

        assert!(!restored.is_same(&v));
        assert_eq!(restored.name(), "force");
        assert_eq!(restored.value().unwrap(), v.value().unwrap());
        assert!(!restored.is_dirty());
    }

    #[test]
    fn msgpack_round_trip() {
        let graph = Graph::new();
        let v = graph.leaf(3.0).unit(Unit::second()).build().unwrap();
        let bytes = v.snapshot().unwrap().to_msgpack().unwrap();
        let snapshot = LeafSnapshot::from_msgpack(&bytes).unwrap();
        assert_eq!(snapshot, v.snapshot().unwrap());
    }

    #[test]
    fn expressions_cannot_be_snapshotted() {
        let graph = Graph::new();
        let a = graph.scalar(1.0);
        let b = (&a + 1.0).unwrap();
        assert!(matches!(b.snapshot(), Err(VarError::NotALeaf(_))));
    }

    #[test]
    fn malformed_input_is_a_persistence_error() {
        assert!(matches!(
            LeafSnapshot::from_json("{\"value\": 3}"),
            Err(VarError::Persistence(_))
        ));
        assert!(matches!(
            LeafSnapshot::from_msgpack(&[0xc1]),
            Err(VarError::Persistence(_))
        ));
    }

    #[test]
    fn snapshot_data_must_fill_its_shape() {
        let short = r#"{"value": {"shape": [3], "data": []}, "unit": "m"}"#;
        assert!(matches!(
            LeafSnapshot::from_json(short),
            Err(VarError::Persistence(_))
        ));

        let bytes = rmp_serde::to_vec_named(&serde_json::json!({
            "value": {"shape": [2, 2], "data": [1.0, 2.0]},
        }))
        .unwrap();
        assert!(matches!(
            LeafSnapshot::from_msgpack(&bytes),
            Err(VarError::Persistence(_))
        ));

        assert!(serde_json::from_str::<Value>(r#"{"array": {"shape": [], "data": []}}"#).is_err());
    }
}
