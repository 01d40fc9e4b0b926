//! Flattening a completed annotation into relational records.
//!
//! Pure transformation: one parent [`InterviewRecord`] plus child
//! collections ([`TurnRecord`]s and [`ThemeRecord`]s). Theme classification
//! is a best-effort side lookup from free text onto a fixed taxonomy; it
//! never fails the extraction — unclassifiable input lands in the explicit
//! `"other"` bucket.

use crate::interview::{InterviewDocument, Turn};
use crate::strategy::CompletedAnnotation;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// The parent record: interview-level slot values, one row per interview.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterviewRecord {
    /// Interview id, the join key for every child collection.
    pub interview_id: String,
    /// Interview date, passed through from ingestion.
    pub date: Option<String>,
    /// Interview location, passed through from ingestion.
    pub location: Option<String>,
    /// Interview-level slot values keyed by slot path.
    pub fields: BTreeMap<String, Value>,
}

/// One row per turn: the turn's own annotation slot values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRecord {
    /// Parent interview id.
    pub interview_id: String,
    /// 1-based turn index.
    pub turn_index: usize,
    /// Speaker role of the turn.
    pub speaker_role: String,
    /// Word count of the turn text.
    pub word_count: usize,
    /// Turn-level slot values keyed by slot name (turn prefix stripped).
    pub fields: BTreeMap<String, Value>,
}

/// One row per classified theme mention.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThemeRecord {
    /// Parent interview id.
    pub interview_id: String,
    /// The slot path the mention came from.
    pub source_path: String,
    /// The free text as the model produced it.
    pub raw: String,
    /// The taxonomy category, or `"other"`.
    pub category: String,
}

/// Everything extraction produces for one interview.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedRecords {
    /// The parent row.
    pub interview: InterviewRecord,
    /// One row per turn.
    pub turns: Vec<TurnRecord>,
    /// One row per classified theme mention.
    pub themes: Vec<ThemeRecord>,
}

/// One taxonomy category with its match keywords.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxonomyCategory {
    /// Category name emitted on matching records.
    pub name: String,
    /// Lowercase keywords; a mention containing any of them matches.
    pub keywords: Vec<String>,
}

/// A fixed free-text-to-category taxonomy. Categories are tried in order;
/// the first keyword hit wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThemeTaxonomy {
    /// Categories in priority order.
    pub categories: Vec<TaxonomyCategory>,
}

/// The explicit bucket for mentions no category claims.
pub const OTHER_BUCKET: &str = "other";

impl ThemeTaxonomy {
    /// Classify free text onto the taxonomy. Total: anything unmatched
    /// returns [`OTHER_BUCKET`].
    pub fn classify(&self, text: &str) -> &str {
        let lower = text.to_lowercase();
        for category in &self.categories {
            if category.keywords.iter().any(|k| lower.contains(k.as_str())) {
                return &category.name;
            }
        }
        OTHER_BUCKET
    }
}

impl Default for ThemeTaxonomy {
    fn default() -> Self {
        let cat = |name: &str, keywords: &[&str]| TaxonomyCategory {
            name: name.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        };
        Self {
            categories: vec![
                cat("housing", &["house", "home", "rent", "shelter", "housing"]),
                cat("livelihood", &["work", "job", "income", "farm", "money", "wage"]),
                cat("family", &["family", "mother", "father", "child", "parent", "wife", "husband"]),
                cat("health", &["health", "sick", "illness", "hospital", "clinic"]),
                cat("environment", &["flood", "drought", "river", "land", "weather", "rain"]),
            ],
        }
    }
}

/// Converts a validated document into flat relational records.
#[derive(Debug, Clone)]
pub struct ExtractionAdapter {
    taxonomy: ThemeTaxonomy,
    /// Slot names (last path segment) whose list items get classified.
    theme_slots: Vec<String>,
}

impl ExtractionAdapter {
    /// Create an adapter over a taxonomy, with no theme slots configured.
    pub fn new(taxonomy: ThemeTaxonomy) -> Self {
        Self {
            taxonomy,
            theme_slots: Vec::new(),
        }
    }

    /// Classify the list items of every slot with this name.
    pub fn with_theme_slot(mut self, slot_name: impl Into<String>) -> Self {
        self.theme_slots.push(slot_name.into());
        self
    }

    /// Flatten a completed annotation. Pure; never fails.
    pub fn extract(
        &self,
        completed: &CompletedAnnotation,
        interview: &InterviewDocument,
        turns: &[Turn],
    ) -> ExtractedRecords {
        let mut interview_fields = BTreeMap::new();
        let mut turn_fields: BTreeMap<usize, BTreeMap<String, Value>> = BTreeMap::new();
        let mut themes = Vec::new();

        for node in completed.document.nodes() {
            let value = match node.state.as_value() {
                Some(v) => v.clone(),
                None => continue,
            };
            let slot_name = node.path.rsplit('.').next().unwrap_or(&node.path);
            if self.theme_slots.iter().any(|s| s == slot_name) {
                self.classify_items(&completed.interview_id, &node.path, &value, &mut themes);
            }
            match node.turn_index {
                None => {
                    interview_fields.insert(node.path.clone(), value);
                }
                Some(turn) => {
                    let rel = node
                        .path
                        .split_once("].")
                        .map(|(_, rest)| rest.to_string())
                        .unwrap_or_else(|| node.path.clone());
                    turn_fields.entry(turn).or_default().insert(rel, value);
                }
            }
        }

        let turn_records = turns
            .iter()
            .map(|t| TurnRecord {
                interview_id: completed.interview_id.clone(),
                turn_index: t.index,
                speaker_role: t.role.as_str().to_string(),
                word_count: t.word_count,
                fields: turn_fields.remove(&t.index).unwrap_or_default(),
            })
            .collect();

        ExtractedRecords {
            interview: InterviewRecord {
                interview_id: completed.interview_id.clone(),
                date: interview.date.clone(),
                location: interview.location.clone(),
                fields: interview_fields,
            },
            turns: turn_records,
            themes,
        }
    }

    /// Classify each string item (or `{label, rank}` label) of a list value.
    fn classify_items(
        &self,
        interview_id: &str,
        path: &str,
        value: &Value,
        themes: &mut Vec<ThemeRecord>,
    ) {
        let items = match value.as_array() {
            Some(items) => items,
            None => return,
        };
        for item in items {
            let raw = item
                .as_str()
                .or_else(|| item.get("label").and_then(|l| l.as_str()));
            if let Some(raw) = raw {
                themes.push(ThemeRecord {
                    interview_id: interview_id.to_string(),
                    source_path: path.to_string(),
                    raw: raw.to_string(),
                    category: self.taxonomy.classify(raw).to_string(),
                });
            }
        }
    }
}
