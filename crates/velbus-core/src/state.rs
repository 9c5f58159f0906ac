// ── Mirrored state tree ──
//
// The local copy of the gateway's state. Only the dispatcher mutates it,
// one patch operation at a time.

use serde_json::{Map, Value};

use crate::patch::{self, PatchError, PatchOperation};

/// The local mirror of the remote state tree.
///
/// Always rooted at an object; leaves are arbitrary JSON values.
#[derive(Debug, Clone, PartialEq)]
pub struct StateTree {
    root: Value,
}

impl StateTree {
    pub fn new() -> Self {
        Self {
            root: Value::Object(Map::new()),
        }
    }

    /// Apply one operation. A failed operation leaves the tree unchanged.
    ///
    /// Operations that replace the whole tree must leave an object behind.
    pub fn apply(&mut self, op: &PatchOperation) -> Result<(), PatchError> {
        if !op.path().is_root() || matches!(op, PatchOperation::Test { .. }) {
            return patch::apply(&mut self.root, op);
        }

        let mut next = self.root.clone();
        patch::apply(&mut next, op)?;
        if !next.is_object() {
            return Err(PatchError::InvalidTarget(op.path().to_string()));
        }
        self.root = next;
        Ok(())
    }

    /// The substate rooted at `path`, or `None` if it does not exist.
    pub fn get(&self, path: &[String]) -> Option<&Value> {
        patch::resolve(&self.root, path)
    }

    /// Drop everything, back to an empty object.
    pub fn reset(&mut self) {
        self.root = Value::Object(Map::new());
    }

    pub fn as_value(&self) -> &Value {
        &self.root
    }

    pub fn is_empty(&self) -> bool {
        self.root.as_object().is_some_and(Map::is_empty)
    }
}

impl Default for StateTree {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn add(path: &str, value: Value) -> PatchOperation {
        PatchOperation::from_value(json!({"op": "add", "path": path, "value": value})).unwrap()
    }

    fn path(components: &[&str]) -> Vec<String> {
        components.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn starts_empty() {
        let tree = StateTree::new();
        assert!(tree.is_empty());
        assert_eq!(tree.as_value(), &json!({}));
    }

    #[test]
    fn get_descends_objects_only() {
        let mut tree = StateTree::new();
        tree.apply(&add("/0b", json!({"1": {"relay": true}, "name": "kitchen"})))
            .unwrap();

        assert_eq!(tree.get(&path(&["0b", "1", "relay"])), Some(&json!(true)));
        assert_eq!(tree.get(&path(&[])), Some(tree.as_value()));
        assert_eq!(tree.get(&path(&["0b", "2"])), None);
        assert_eq!(tree.get(&path(&["0b", "name", "x"])), None);
    }

    #[test]
    fn failed_apply_leaves_tree_unchanged() {
        let mut tree = StateTree::new();
        tree.apply(&add("/a", json!(1))).unwrap();
        let before = tree.clone();

        assert!(tree.apply(&add("/missing/b", json!(2))).is_err());
        assert_eq!(tree, before);
    }

    #[test]
    fn root_must_stay_an_object() {
        let mut tree = StateTree::new();
        tree.apply(&add("", json!({"a": 1}))).unwrap();
        assert_eq!(tree.as_value(), &json!({"a": 1}));

        let err = tree.apply(&add("", json!(42))).unwrap_err();
        assert_eq!(err, PatchError::InvalidTarget(String::new()));
        assert_eq!(tree.as_value(), &json!({"a": 1}));
    }

    #[test]
    fn reset_clears_everything() {
        let mut tree = StateTree::new();
        tree.apply(&add("/a", json!({"b": 1}))).unwrap();
        tree.reset();
        assert!(tree.is_empty());
    }
}
