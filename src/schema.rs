//! Declarative annotation schema.
//!
//! [`AnnotationSchema`] describes every slot of the target structured
//! document: interview-level slots filled once, and turn-level slots
//! instantiated once per segmented turn. Loaded once at startup (from JSON,
//! or YAML behind the `yaml` feature), immutable, and shared read-only
//! across concurrent runs.

use crate::error::{AnnotateError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;

fn default_true() -> bool {
    true
}

/// The value shape of one slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SlotKind {
    /// Free text. The empty string is a legitimate value.
    Text,
    /// A number, optionally bounded (e.g. confidence in `[0, 1]`).
    Number {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<f64>,
    },
    /// True/false.
    Boolean,
    /// One of a closed set of string members.
    Enum {
        /// Allowed members, checked verbatim.
        allowed: Vec<String>,
    },
    /// A list of strings. An empty list is a legitimate *filled* value
    /// meaning "mentioned, no items".
    List {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min_items: Option<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_items: Option<usize>,
    },
    /// Exactly `count` items of `{label, rank}` whose ranks form a
    /// permutation of `1..=count`.
    RankedList {
        /// Number of ranked items required.
        count: usize,
    },
    /// A nested group of named slots. Structs are not leaves; their fields
    /// flatten into dot-separated paths.
    Struct {
        /// The nested slot specs.
        fields: Vec<SlotSpec>,
    },
}

impl SlotKind {
    /// One-line human statement of the slot's rule, used in fill
    /// instructions and correction prompts.
    pub fn describe(&self) -> String {
        match self {
            SlotKind::Text => "free text".to_string(),
            SlotKind::Number { min, max } => match (min, max) {
                (Some(lo), Some(hi)) => format!("number in [{}, {}]", lo, hi),
                (Some(lo), None) => format!("number >= {}", lo),
                (None, Some(hi)) => format!("number <= {}", hi),
                (None, None) => "number".to_string(),
            },
            SlotKind::Boolean => "true or false".to_string(),
            SlotKind::Enum { allowed } => format!("one of: {}", allowed.join(" | ")),
            SlotKind::List {
                min_items,
                max_items,
            } => match (min_items, max_items) {
                (Some(lo), Some(hi)) => format!("list of strings ({}-{} items)", lo, hi),
                (Some(lo), None) => format!("list of strings (at least {} items)", lo),
                (None, Some(hi)) => format!("list of strings (at most {} items)", hi),
                (None, None) => "list of strings (may be empty)".to_string(),
            },
            SlotKind::RankedList { count } => format!(
                "exactly {} items of {{label, rank}} with ranks a permutation of 1..={}",
                count, count
            ),
            SlotKind::Struct { .. } => "nested group".to_string(),
        }
    }
}

/// One slot of the annotation schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotSpec {
    /// Path segment for this slot. Must not contain `.` or `[`.
    pub name: String,
    /// Whether the slot must be filled for the annotation to complete.
    #[serde(default = "default_true")]
    pub required: bool,
    /// Fill instruction shown to the model.
    #[serde(default)]
    pub description: String,
    /// The value shape.
    #[serde(flatten)]
    pub kind: SlotKind,
}

impl SlotSpec {
    /// Shorthand constructor used heavily in tests and builders.
    pub fn new(name: impl Into<String>, kind: SlotKind) -> Self {
        Self {
            name: name.into(),
            required: true,
            description: String::new(),
            kind,
        }
    }

    /// Mark the slot optional.
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Set the fill instruction.
    pub fn describe_as(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// A flattened leaf of the schema: its full dot path and its spec.
#[derive(Debug, Clone)]
pub struct LeafSlot<'a> {
    /// Full path, e.g. `"context.setting"` or `"turns[3].emotion"`.
    pub path: String,
    /// The leaf's spec.
    pub spec: &'a SlotSpec,
}

/// The full declarative schema: interview-level slots plus the slot group
/// repeated once per turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnotationSchema {
    /// Schema name, recorded on every document built from it.
    pub name: String,
    /// Slots instantiated once per interview.
    #[serde(default)]
    pub interview_slots: Vec<SlotSpec>,
    /// Slots instantiated once per segmented turn, order-preserving.
    #[serde(default)]
    pub turn_slots: Vec<SlotSpec>,
}

impl AnnotationSchema {
    /// Parse a schema from its declarative JSON form and validate it.
    pub fn from_json(text: &str) -> Result<Self> {
        let schema: AnnotationSchema = serde_json::from_str(text)?;
        schema.validate_definition()?;
        Ok(schema)
    }

    /// Parse a schema from its declarative YAML form and validate it.
    #[cfg(feature = "yaml")]
    pub fn from_yaml(text: &str) -> Result<Self> {
        let schema: AnnotationSchema = serde_yaml::from_str(text)
            .map_err(|e| AnnotateError::Schema(format!("YAML parse failed: {}", e)))?;
        schema.validate_definition()?;
        Ok(schema)
    }

    /// Check the definition itself: unique, path-safe names at every level,
    /// non-empty enums, sane cardinalities.
    pub fn validate_definition(&self) -> Result<()> {
        check_slots("interview", &self.interview_slots)?;
        check_slots("turn", &self.turn_slots)?;
        Ok(())
    }

    /// Flattened interview-level leaves, in declaration order.
    pub fn interview_leaves(&self) -> Vec<LeafSlot<'_>> {
        let mut out = Vec::new();
        flatten("", &self.interview_slots, &mut out);
        out
    }

    /// Flattened turn-level leaves for one turn (1-based index).
    pub fn turn_leaves(&self, turn_index: usize) -> Vec<LeafSlot<'_>> {
        let mut out = Vec::new();
        flatten(&format!("turns[{}]", turn_index), &self.turn_slots, &mut out);
        out
    }

    /// Leaf count for a single turn (used by cost projection).
    pub fn turn_leaf_count(&self) -> usize {
        self.turn_leaves(1).len()
    }

    /// JSON Schema shape hint for structured-output gateways: the full
    /// document tree for a transcript with `turn_count` turns.
    pub fn response_shape(&self, turn_count: usize) -> Value {
        let mut root = object_schema(&self.interview_slots);
        if !self.turn_slots.is_empty() {
            if let Some(props) = root
                .get_mut("properties")
                .and_then(|p| p.as_object_mut())
            {
                props.insert(
                    "turns".to_string(),
                    json!({
                        "type": "array",
                        "items": object_schema(&self.turn_slots),
                        "minItems": turn_count,
                        "maxItems": turn_count,
                    }),
                );
            }
            if let Some(required) = root.get_mut("required").and_then(|r| r.as_array_mut()) {
                required.push(json!("turns"));
            }
        }
        root
    }
}

fn check_slots(level: &str, slots: &[SlotSpec]) -> Result<()> {
    let mut seen = HashSet::new();
    for slot in slots {
        if slot.name.is_empty() || slot.name.contains('.') || slot.name.contains('[') {
            return Err(AnnotateError::Schema(format!(
                "{} slot name '{}' is not path-safe",
                level, slot.name
            )));
        }
        if !seen.insert(slot.name.as_str()) {
            return Err(AnnotateError::Schema(format!(
                "duplicate {} slot name '{}'",
                level, slot.name
            )));
        }
        match &slot.kind {
            SlotKind::Enum { allowed } if allowed.is_empty() => {
                return Err(AnnotateError::Schema(format!(
                    "enum slot '{}' has no allowed values",
                    slot.name
                )));
            }
            SlotKind::RankedList { count } if *count == 0 => {
                return Err(AnnotateError::Schema(format!(
                    "ranked list slot '{}' has count 0",
                    slot.name
                )));
            }
            SlotKind::List {
                min_items: Some(lo),
                max_items: Some(hi),
            } if lo > hi => {
                return Err(AnnotateError::Schema(format!(
                    "list slot '{}' has min_items > max_items",
                    slot.name
                )));
            }
            SlotKind::Struct { fields } => {
                if fields.is_empty() {
                    return Err(AnnotateError::Schema(format!(
                        "struct slot '{}' has no fields",
                        slot.name
                    )));
                }
                check_slots(&slot.name, fields)?;
            }
            _ => {}
        }
    }
    Ok(())
}

fn flatten<'a>(prefix: &str, slots: &'a [SlotSpec], out: &mut Vec<LeafSlot<'a>>) {
    for slot in slots {
        let path = if prefix.is_empty() {
            slot.name.clone()
        } else {
            format!("{}.{}", prefix, slot.name)
        };
        match &slot.kind {
            SlotKind::Struct { fields } => flatten(&path, fields, out),
            _ => out.push(LeafSlot { path, spec: slot }),
        }
    }
}

fn leaf_schema(kind: &SlotKind) -> Value {
    match kind {
        SlotKind::Text => json!({"type": "string"}),
        SlotKind::Number { min, max } => {
            let mut v = json!({"type": "number"});
            if let Some(lo) = min {
                v["minimum"] = json!(lo);
            }
            if let Some(hi) = max {
                v["maximum"] = json!(hi);
            }
            v
        }
        SlotKind::Boolean => json!({"type": "boolean"}),
        SlotKind::Enum { allowed } => json!({"type": "string", "enum": allowed}),
        SlotKind::List {
            min_items,
            max_items,
        } => {
            let mut v = json!({"type": "array", "items": {"type": "string"}});
            if let Some(lo) = min_items {
                v["minItems"] = json!(lo);
            }
            if let Some(hi) = max_items {
                v["maxItems"] = json!(hi);
            }
            v
        }
        SlotKind::RankedList { count } => json!({
            "type": "array",
            "items": {
                "type": "object",
                "properties": {
                    "label": {"type": "string"},
                    "rank": {"type": "integer", "minimum": 1, "maximum": count},
                },
                "required": ["label", "rank"],
            },
            "minItems": count,
            "maxItems": count,
        }),
        SlotKind::Struct { fields } => object_schema(fields),
    }
}

fn object_schema(slots: &[SlotSpec]) -> Value {
    let mut props = serde_json::Map::new();
    let mut required = Vec::new();
    for slot in slots {
        props.insert(slot.name.clone(), leaf_schema(&slot.kind));
        if slot.required {
            required.push(json!(slot.name));
        }
    }
    json!({
        "type": "object",
        "properties": Value::Object(props),
        "required": required,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::testutil::study_schema;

    #[test]
    fn test_interview_leaves_flatten_structs() {
        let schema = study_schema();
        let leaves = schema.interview_leaves();
        let paths: Vec<_> = leaves.iter().map(|l| l.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "summary",
                "overall_sentiment",
                "confidence",
                "priorities",
                "context.setting",
                "context.rapport",
            ]
        );
    }

    #[test]
    fn test_turn_leaves_carry_turn_prefix() {
        let schema = study_schema();
        let leaves = schema.turn_leaves(3);
        let paths: Vec<_> = leaves.iter().map(|l| l.path.as_str()).collect();
        assert_eq!(paths, vec!["turns[3].emotion", "turns[3].evidence"]);
    }

    #[test]
    fn test_from_json_roundtrip() {
        let text = r#"{
            "name": "mini",
            "interview_slots": [
                {"name": "summary", "type": "text"},
                {"name": "mood", "type": "enum", "allowed": ["up", "down"], "required": false}
            ],
            "turn_slots": [
                {"name": "topic", "type": "text"}
            ]
        }"#;
        let schema = AnnotationSchema::from_json(text).unwrap();
        assert_eq!(schema.name, "mini");
        assert_eq!(schema.interview_slots.len(), 2);
        assert!(!schema.interview_slots[1].required);
        assert_eq!(schema.turn_leaf_count(), 1);
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let text = r#"{
            "name": "dup",
            "interview_slots": [
                {"name": "a", "type": "text"},
                {"name": "a", "type": "boolean"}
            ]
        }"#;
        assert!(AnnotationSchema::from_json(text).is_err());
    }

    #[test]
    fn test_empty_enum_rejected() {
        let text = r#"{
            "name": "bad",
            "interview_slots": [{"name": "mood", "type": "enum", "allowed": []}]
        }"#;
        assert!(AnnotationSchema::from_json(text).is_err());
    }

    #[test]
    fn test_path_unsafe_name_rejected() {
        let text = r#"{
            "name": "bad",
            "interview_slots": [{"name": "a.b", "type": "text"}]
        }"#;
        assert!(AnnotationSchema::from_json(text).is_err());
    }

    #[test]
    fn test_response_shape_includes_turns() {
        let schema = study_schema();
        let shape = schema.response_shape(4);
        assert_eq!(shape["type"], "object");
        assert_eq!(shape["properties"]["turns"]["minItems"], 4);
        assert_eq!(shape["properties"]["turns"]["maxItems"], 4);
        assert!(shape["properties"]["summary"].is_object());
        let required: Vec<_> = shape["required"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap())
            .collect();
        assert!(required.contains(&"turns"));
        assert!(required.contains(&"summary"));
    }

    #[test]
    fn test_kind_describe() {
        assert_eq!(
            SlotKind::Number {
                min: Some(0.0),
                max: Some(1.0)
            }
            .describe(),
            "number in [0, 1]"
        );
        assert!(SlotKind::RankedList { count: 3 }.describe().contains("1..=3"));
    }
}
