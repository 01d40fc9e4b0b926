//! Structural and value validation of a filled document.
//!
//! [`ValidationEngine::validate`] is pure and deterministic: the same
//! (document, schema) pair always yields the same error list, and an empty
//! list means every required slot is schema-conformant. Errors accumulate
//! across slots rather than short-circuiting, so one corrective call can
//! address everything at once.

use crate::schema::{AnnotationSchema, LeafSlot, SlotKind};
use crate::skeleton::{SkeletonDocument, SlotState};
use serde_json::Value;
use std::collections::HashSet;

/// The rule a slot value violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationKind {
    /// A required slot holds no value.
    RequiredUnfilled,
    /// The value's JSON type does not match the slot kind.
    TypeMismatch,
    /// A string value is not a member of the slot's enum.
    NotInEnum,
    /// A number falls outside the slot's declared range.
    OutOfRange,
    /// A list violates its length or rank-permutation constraint.
    Cardinality,
    /// A fill attempt produced something unusable (kept from the provider).
    Malformed,
}

impl ViolationKind {
    /// Stable name used in correction prompts and failure reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationKind::RequiredUnfilled => "required slot unfilled",
            ViolationKind::TypeMismatch => "type mismatch",
            ViolationKind::NotInEnum => "value not in enum",
            ViolationKind::OutOfRange => "number out of range",
            ViolationKind::Cardinality => "cardinality violation",
            ViolationKind::Malformed => "malformed value",
        }
    }
}

/// One violation found by the engine. Ephemeral: consumed by the corrector
/// or reported on a partial result, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    /// Full path of the offending slot.
    pub slot_path: String,
    /// Which rule was violated.
    pub kind: ViolationKind,
    /// Human-readable detail including the violated rule.
    pub message: String,
}

/// Validates a skeleton document against its schema.
pub struct ValidationEngine;

impl ValidationEngine {
    /// Check every expected leaf of `doc` against `schema`, accumulating
    /// violations. An empty result means the document is valid.
    pub fn validate(doc: &SkeletonDocument, schema: &AnnotationSchema) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        for leaf in schema.interview_leaves() {
            check_leaf(doc, &leaf, &mut errors);
        }
        for turn in 1..=doc.turn_count() {
            for leaf in schema.turn_leaves(turn) {
                check_leaf(doc, &leaf, &mut errors);
            }
        }
        errors
    }
}

fn check_leaf(doc: &SkeletonDocument, leaf: &LeafSlot<'_>, errors: &mut Vec<ValidationError>) {
    let node = match doc.get(&leaf.path) {
        Some(node) => node,
        None => return,
    };
    match &node.state {
        SlotState::Unfilled => {
            if leaf.spec.required {
                errors.push(ValidationError {
                    slot_path: leaf.path.clone(),
                    kind: ViolationKind::RequiredUnfilled,
                    message: format!("expected {}", leaf.spec.kind.describe()),
                });
            }
        }
        SlotState::Invalid { reason, .. } => {
            errors.push(ValidationError {
                slot_path: leaf.path.clone(),
                kind: ViolationKind::Malformed,
                message: reason.clone(),
            });
        }
        SlotState::Value(value) => {
            if let Some((kind, message)) = check_value(value, &leaf.spec.kind) {
                errors.push(ValidationError {
                    slot_path: leaf.path.clone(),
                    kind,
                    message,
                });
            }
        }
    }
}

/// Check a candidate value against a slot kind. Returns the violation, if any.
fn check_value(value: &Value, kind: &SlotKind) -> Option<(ViolationKind, String)> {
    match kind {
        SlotKind::Text => {
            if !value.is_string() {
                return Some((
                    ViolationKind::TypeMismatch,
                    format!("expected free text, got {}", type_name(value)),
                ));
            }
            None
        }
        SlotKind::Boolean => {
            if !value.is_boolean() {
                return Some((
                    ViolationKind::TypeMismatch,
                    format!("expected true or false, got {}", type_name(value)),
                ));
            }
            None
        }
        SlotKind::Number { min, max } => {
            let n = match value.as_f64() {
                Some(n) => n,
                None => {
                    return Some((
                        ViolationKind::TypeMismatch,
                        format!("expected a number, got {}", type_name(value)),
                    ));
                }
            };
            if min.is_some_and(|lo| n < lo) || max.is_some_and(|hi| n > hi) {
                return Some((
                    ViolationKind::OutOfRange,
                    format!("{} violates {}", n, kind.describe()),
                ));
            }
            None
        }
        SlotKind::Enum { allowed } => {
            let s = match value.as_str() {
                Some(s) => s,
                None => {
                    return Some((
                        ViolationKind::TypeMismatch,
                        format!("expected an enum string, got {}", type_name(value)),
                    ));
                }
            };
            if !allowed.iter().any(|a| a == s) {
                return Some((
                    ViolationKind::NotInEnum,
                    format!("'{}' is not {}", s, kind.describe()),
                ));
            }
            None
        }
        SlotKind::List {
            min_items,
            max_items,
        } => {
            let items = match value.as_array() {
                Some(items) => items,
                None => {
                    return Some((
                        ViolationKind::TypeMismatch,
                        format!("expected a list of strings, got {}", type_name(value)),
                    ));
                }
            };
            if let Some(bad) = items.iter().find(|i| !i.is_string()) {
                return Some((
                    ViolationKind::TypeMismatch,
                    format!("list items must be strings, got {}", type_name(bad)),
                ));
            }
            if min_items.is_some_and(|lo| items.len() < lo)
                || max_items.is_some_and(|hi| items.len() > hi)
            {
                return Some((
                    ViolationKind::Cardinality,
                    format!("{} items violates {}", items.len(), kind.describe()),
                ));
            }
            None
        }
        SlotKind::RankedList { count } => check_ranked_list(value, *count, kind),
        // Structs flatten to leaves before validation; a struct kind on a
        // leaf would be a schema-definition bug caught at load time.
        SlotKind::Struct { .. } => None,
    }
}

fn check_ranked_list(
    value: &Value,
    count: usize,
    kind: &SlotKind,
) -> Option<(ViolationKind, String)> {
    let items = match value.as_array() {
        Some(items) => items,
        None => {
            return Some((
                ViolationKind::TypeMismatch,
                format!("expected a ranked list, got {}", type_name(value)),
            ));
        }
    };
    if items.len() != count {
        return Some((
            ViolationKind::Cardinality,
            format!("{} items violates {}", items.len(), kind.describe()),
        ));
    }
    let mut ranks = HashSet::new();
    for item in items {
        let label_ok = item.get("label").is_some_and(|l| l.is_string());
        let rank = item.get("rank").and_then(|r| r.as_u64());
        let rank = match (label_ok, rank) {
            (true, Some(rank)) => rank,
            _ => {
                return Some((
                    ViolationKind::TypeMismatch,
                    "ranked items must be {label: string, rank: integer}".to_string(),
                ));
            }
        };
        if rank < 1 || rank > count as u64 || !ranks.insert(rank) {
            return Some((
                ViolationKind::Cardinality,
                format!("ranks must be a permutation of 1..={} with no duplicates", count),
            ));
        }
    }
    None
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::SkeletonBuilder;
    use crate::testutil::{complete_fill, study_schema, three_turns};
    use serde_json::json;

    fn filled_doc() -> SkeletonDocument {
        let mut doc = SkeletonBuilder::build(&study_schema(), &three_turns());
        for (path, value) in complete_fill() {
            doc.set_value(&path, value);
        }
        doc
    }

    #[test]
    fn test_complete_document_is_valid() {
        let errors = ValidationEngine::validate(&filled_doc(), &study_schema());
        assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
    }

    #[test]
    fn test_missing_enum_slot_yields_exactly_one_error() {
        let schema = study_schema();
        let mut doc = filled_doc();
        // Re-build with one slot left unfilled.
        doc = {
            let mut fresh = SkeletonBuilder::build(&schema, &three_turns());
            for (path, value) in complete_fill() {
                if path != "overall_sentiment" {
                    fresh.set_value(&path, value);
                }
            }
            fresh
        };
        let errors = ValidationEngine::validate(&doc, &schema);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].slot_path, "overall_sentiment");
        assert_eq!(errors[0].kind, ViolationKind::RequiredUnfilled);
    }

    #[test]
    fn test_optional_unfilled_is_not_an_error() {
        let schema = study_schema();
        let mut doc = SkeletonBuilder::build(&schema, &three_turns());
        for (path, value) in complete_fill() {
            if path != "context.rapport" {
                doc.set_value(&path, value);
            }
        }
        let errors = ValidationEngine::validate(&doc, &schema);
        assert!(errors.is_empty());
    }

    #[test]
    fn test_enum_membership_checked() {
        let mut doc = filled_doc();
        doc.set_value("overall_sentiment", json!("ecstatic"));
        let errors = ValidationEngine::validate(&doc, &study_schema());
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, ViolationKind::NotInEnum);
        assert!(errors[0].message.contains("ecstatic"));
    }

    #[test]
    fn test_number_range_checked() {
        let mut doc = filled_doc();
        doc.set_value("confidence", json!(1.4));
        let errors = ValidationEngine::validate(&doc, &study_schema());
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, ViolationKind::OutOfRange);
    }

    #[test]
    fn test_type_mismatch_checked() {
        let mut doc = filled_doc();
        doc.set_value("confidence", json!("quite sure"));
        doc.set_value("summary", json!(17));
        let errors = ValidationEngine::validate(&doc, &study_schema());
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|e| e.kind == ViolationKind::TypeMismatch));
    }

    #[test]
    fn test_ranked_list_duplicate_ranks_rejected() {
        let mut doc = filled_doc();
        doc.set_value(
            "priorities",
            json!([
                {"label": "family", "rank": 1},
                {"label": "work", "rank": 1},
                {"label": "land", "rank": 3},
            ]),
        );
        let errors = ValidationEngine::validate(&doc, &study_schema());
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, ViolationKind::Cardinality);
        assert!(errors[0].message.contains("permutation"));
    }

    #[test]
    fn test_ranked_list_wrong_count_rejected() {
        let mut doc = filled_doc();
        doc.set_value("priorities", json!([{"label": "family", "rank": 1}]));
        let errors = ValidationEngine::validate(&doc, &study_schema());
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, ViolationKind::Cardinality);
    }

    #[test]
    fn test_empty_list_is_valid() {
        let mut doc = filled_doc();
        doc.set_value("turns[2].evidence", json!([]));
        let errors = ValidationEngine::validate(&doc, &study_schema());
        assert!(errors.is_empty());
    }

    #[test]
    fn test_list_item_type_and_cardinality() {
        let mut doc = filled_doc();
        doc.set_value("turns[1].evidence", json!(["a", 2]));
        doc.set_value("turns[2].evidence", json!(["a", "b", "c", "d"]));
        let errors = ValidationEngine::validate(&doc, &study_schema());
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].kind, ViolationKind::TypeMismatch);
        assert_eq!(errors[1].kind, ViolationKind::Cardinality);
    }

    #[test]
    fn test_invalid_state_reported_as_malformed() {
        let mut doc = filled_doc();
        doc.mark_invalid("summary", json!("<garbled>"), "unparseable fill output");
        let errors = ValidationEngine::validate(&doc, &study_schema());
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, ViolationKind::Malformed);
    }

    #[test]
    fn test_validation_is_deterministic() {
        let mut doc = filled_doc();
        doc.set_value("confidence", json!(7));
        doc.set_value("overall_sentiment", json!("odd"));
        let schema = study_schema();
        let a = ValidationEngine::validate(&doc, &schema);
        let b = ValidationEngine::validate(&doc, &schema);
        assert_eq!(a, b);
        // Accumulates across slots in schema order.
        assert_eq!(a.len(), 2);
        assert_eq!(a[0].slot_path, "overall_sentiment");
        assert_eq!(a[1].slot_path, "confidence");
    }
}
