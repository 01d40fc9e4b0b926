//! Skeleton documents: the mutable tree a run fills in.
//!
//! [`SkeletonBuilder`] instantiates an [`AnnotationSchema`] plus a turn list
//! into a [`SkeletonDocument`] whose every leaf starts [`SlotState::Unfilled`].
//! The typed sentinel makes "is this slot filled?" an O(1) state check rather
//! than a content heuristic, and is distinguishable from every legitimate
//! value including the empty string, zero, and the empty list.

use crate::interview::Turn;
use crate::schema::AnnotationSchema;
use serde_json::{json, Value};
use std::collections::HashMap;

/// The state of one slot node.
#[derive(Debug, Clone, PartialEq)]
pub enum SlotState {
    /// No fill attempt has covered this slot yet.
    Unfilled,
    /// The slot holds a candidate value (validation may still reject it).
    Value(Value),
    /// A fill attempt produced something unusable for this slot.
    Invalid {
        /// What the provider sent.
        value: Value,
        /// Why it was rejected.
        reason: String,
    },
}

impl SlotState {
    /// Whether the slot holds a candidate value.
    pub fn is_filled(&self) -> bool {
        matches!(self, SlotState::Value(_))
    }

    /// The candidate value, if any.
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            SlotState::Value(v) => Some(v),
            _ => None,
        }
    }
}

/// One leaf node of a skeleton document.
#[derive(Debug, Clone)]
pub struct SlotNode {
    /// Full slot path, e.g. `"summary"` or `"turns[2].emotion"`.
    pub path: String,
    /// The turn this node belongs to, for per-turn slots.
    pub turn_index: Option<usize>,
    /// Whether the schema marks this slot required.
    pub required: bool,
    /// Current state.
    pub state: SlotState,
}

/// The mutable document tree one annotation run fills.
///
/// Exclusively owned by its run; never shared across runs. Nodes are stored
/// in schema order (interview leaves first, then each turn's leaves in turn
/// order) with an index for O(1) path lookup.
#[derive(Debug, Clone)]
pub struct SkeletonDocument {
    schema_name: String,
    turn_count: usize,
    nodes: Vec<SlotNode>,
    by_path: HashMap<String, usize>,
}

impl SkeletonDocument {
    /// Name of the schema this document was built from.
    pub fn schema_name(&self) -> &str {
        &self.schema_name
    }

    /// Number of turns the document was instantiated over.
    pub fn turn_count(&self) -> usize {
        self.turn_count
    }

    /// All nodes in schema order.
    pub fn nodes(&self) -> &[SlotNode] {
        &self.nodes
    }

    /// Look up a node by path.
    pub fn get(&self, path: &str) -> Option<&SlotNode> {
        self.by_path.get(path).map(|&i| &self.nodes[i])
    }

    /// Set a slot to a candidate value. Returns `false` for unknown paths,
    /// which callers treat as a provider drifting off-schema, not a bug.
    pub fn set_value(&mut self, path: &str, value: Value) -> bool {
        match self.by_path.get(path) {
            Some(&i) => {
                self.nodes[i].state = SlotState::Value(value);
                true
            }
            None => false,
        }
    }

    /// Mark a slot invalid, keeping what the provider sent for diagnostics.
    pub fn mark_invalid(&mut self, path: &str, value: Value, reason: impl Into<String>) -> bool {
        match self.by_path.get(path) {
            Some(&i) => {
                self.nodes[i].state = SlotState::Invalid {
                    value,
                    reason: reason.into(),
                };
                true
            }
            None => false,
        }
    }

    /// Apply a flat `{path: value}` object, e.g. a progressive fill-task
    /// response or a correction response. Returns the paths actually applied.
    pub fn apply_flat(&mut self, object: &Value) -> Vec<String> {
        let mut applied = Vec::new();
        if let Some(map) = object.as_object() {
            for (path, value) in map {
                if value.is_null() {
                    continue;
                }
                if self.set_value(path, value.clone()) {
                    applied.push(path.clone());
                }
            }
        }
        applied
    }

    /// Apply a nested document tree mirroring the schema (a monolithic fill
    /// response). Walks every known path and takes whatever the tree holds at
    /// it; missing or null entries leave the slot untouched, so partial
    /// responses yield partial coverage rather than errors.
    pub fn apply_tree(&mut self, tree: &Value) -> Vec<String> {
        let paths: Vec<String> = self.nodes.iter().map(|n| n.path.clone()).collect();
        let mut applied = Vec::new();
        for path in paths {
            if let Some(value) = lookup_path(tree, &path) {
                if !value.is_null() && self.set_value(&path, value.clone()) {
                    applied.push(path);
                }
            }
        }
        applied
    }

    /// Paths of required slots not currently holding a value.
    pub fn unfilled_required(&self) -> Vec<&str> {
        self.nodes
            .iter()
            .filter(|n| n.required && !n.state.is_filled())
            .map(|n| n.path.as_str())
            .collect()
    }

    /// Fraction of required slots holding a candidate value (validation may
    /// still reject some). 1.0 for a schema with no required slots.
    pub fn filled_fraction(&self) -> f64 {
        let required: Vec<_> = self.nodes.iter().filter(|n| n.required).collect();
        if required.is_empty() {
            return 1.0;
        }
        let filled = required.iter().filter(|n| n.state.is_filled()).count();
        filled as f64 / required.len() as f64
    }

    /// Render the document as a nested JSON tree mirroring the schema.
    /// Unfilled and invalid slots render as `null`; fill prompts tell the
    /// model that `null` means "not yet filled". No legitimate slot value is
    /// ever `null`, so the completed tree contains none.
    pub fn to_value(&self) -> Value {
        let mut root = json!({});
        let mut turns: Vec<Value> = vec![json!({}); self.turn_count];
        for node in &self.nodes {
            let value = node.state.as_value().cloned().unwrap_or(Value::Null);
            match node.turn_index {
                None => insert_path(&mut root, &node.path, value),
                Some(turn) => {
                    let rel = node
                        .path
                        .split_once("].")
                        .map(|(_, rest)| rest)
                        .unwrap_or(node.path.as_str());
                    insert_path(&mut turns[turn - 1], rel, value);
                }
            }
        }
        if self.turn_count > 0 {
            root["turns"] = Value::Array(turns);
        }
        root
    }
}

/// Look up a path like `"context.setting"` or `"turns[2].emotion"` in a
/// nested tree. Turn indices are 1-based in paths, 0-based in the array.
fn lookup_path<'a>(tree: &'a Value, path: &str) -> Option<&'a Value> {
    let (mut current, rest) = if let Some(after) = path.strip_prefix("turns[") {
        let (index, rest) = after.split_once("].")?;
        let index: usize = index.parse().ok()?;
        let turn = tree.get("turns")?.get(index.checked_sub(1)?)?;
        (turn, rest)
    } else {
        (tree, path)
    };
    for segment in rest.split('.') {
        current = current.get(segment)?;
    }
    Some(current)
}

/// Insert a value at a dot path inside a JSON object, creating intermediate
/// objects as needed.
fn insert_path(root: &mut Value, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            root[path] = value;
        }
        Some((head, rest)) => {
            if root.get(head).map(|v| v.is_object()) != Some(true) {
                root[head] = json!({});
            }
            insert_path(&mut root[head], rest, value);
        }
    }
}

/// Instantiates a schema and turn list into an all-unfilled document.
pub struct SkeletonBuilder;

impl SkeletonBuilder {
    /// Build the skeleton: interview-level leaves once, turn-level leaves
    /// once per turn in transcript order, every node unfilled.
    pub fn build(schema: &AnnotationSchema, turns: &[Turn]) -> SkeletonDocument {
        let mut nodes = Vec::new();
        for leaf in schema.interview_leaves() {
            nodes.push(SlotNode {
                path: leaf.path,
                turn_index: None,
                required: leaf.spec.required,
                state: SlotState::Unfilled,
            });
        }
        for turn in turns {
            for leaf in schema.turn_leaves(turn.index) {
                nodes.push(SlotNode {
                    path: leaf.path,
                    turn_index: Some(turn.index),
                    required: leaf.spec.required,
                    state: SlotState::Unfilled,
                });
            }
        }
        let by_path = nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.path.clone(), i))
            .collect();
        SkeletonDocument {
            schema_name: schema.name.clone(),
            turn_count: turns.len(),
            nodes,
            by_path,
        }
    }
}
