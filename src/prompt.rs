//! Prompt construction for fill and correction calls.
//!
//! The shared context (schema instructions + transcript) is built once per
//! run and reused verbatim across every progressive call so provider-side
//! context caching can discount it. Task prompts stay small: one instruction
//! plus the current document snapshot.

use crate::interview::Turn;
use crate::schema::{AnnotationSchema, SlotKind};
use crate::skeleton::SkeletonDocument;
use std::collections::HashMap;

/// Build a prompt string with variable substitution.
///
/// Replaces `{key}` placeholders in the template with values from `vars`.
/// Use `{{` to insert a literal `{` and `}}` to insert a literal `}`.
pub fn render(template: &str, vars: &HashMap<String, String>) -> String {
    const OPEN: &str = "\x00LBRACE\x00";
    const CLOSE: &str = "\x00RBRACE\x00";

    let mut rendered = template.replace("{{", OPEN).replace("}}", CLOSE);
    for (key, value) in vars {
        let placeholder = format!("{{{}}}", key);
        rendered = rendered.replace(&placeholder, value);
    }
    rendered.replace(OPEN, "{").replace(CLOSE, "}")
}

/// Create a numbered list from items (1-indexed).
pub fn numbered_list(items: &[String]) -> String {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| format!("{}. {}", i + 1, item))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Wrap text in a labeled section for structured prompts.
pub fn section(label: &str, content: &str) -> String {
    format!("## {}\n{}", label, content)
}

/// Render the transcript as one block, one line header per turn.
pub fn transcript_block(turns: &[Turn]) -> String {
    if turns.is_empty() {
        return "(no recognizable speaker turns)".to_string();
    }
    turns
        .iter()
        .map(|t| format!("Turn {} ({}): {}", t.index, t.role.as_str(), t.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Enumerate every slot with its path, rule, and fill instruction.
fn slot_lines(schema: &AnnotationSchema, turn_count: usize) -> Vec<String> {
    let mut lines = Vec::new();
    for leaf in schema.interview_leaves() {
        lines.push(slot_line(&leaf.path, leaf.spec.required, &leaf.spec.kind, &leaf.spec.description));
    }
    if turn_count > 0 && !schema.turn_slots.is_empty() {
        lines.push(format!(
            "For each of the {} turns, fill these slots (shown for turn N):",
            turn_count
        ));
        for leaf in schema.turn_leaves(1) {
            let generic = leaf.path.replace("turns[1]", "turns[N]");
            lines.push(slot_line(&generic, leaf.spec.required, &leaf.spec.kind, &leaf.spec.description));
        }
    }
    lines
}

fn slot_line(path: &str, required: bool, kind: &SlotKind, description: &str) -> String {
    let req = if required { "required" } else { "optional" };
    if description.is_empty() {
        format!("- `{}` ({}): {}", path, req, kind.describe())
    } else {
        format!("- `{}` ({}): {}. {}", path, req, kind.describe(), description)
    }
}

/// The large shared context: schema instructions plus the full transcript.
/// Byte-identical across every call of one run, by construction.
pub fn shared_context(schema: &AnnotationSchema, turns: &[Turn]) -> String {
    let instructions = format!(
        "You annotate interview transcripts into a fixed document shape.\n\
         Slots and their rules:\n{}\n\n\
         Rules:\n\
         - Respond with JSON only, no prose.\n\
         - `null` in a document snapshot means the slot is not filled yet. Never write `null` yourself.\n\
         - If a topic is absent from the transcript, use the slot's explicit member for that \
           (e.g. `not_expressed`); an empty list means the topic came up but offered no items.\n\
         - Quote evidence verbatim from the transcript.",
        slot_lines(schema, turns.len()).join("\n")
    );
    format!(
        "{}\n\n{}",
        section("Annotation schema", &instructions),
        section("Transcript", &transcript_block(turns))
    )
}

/// User prompt for a monolithic fill: the whole snapshot, one call.
pub fn monolithic_prompt(doc: &SkeletonDocument) -> String {
    format!(
        "Fill every slot of this document in one pass. Respond with the complete \
         document as JSON, mirroring the snapshot's shape exactly.\n\n{}",
        section(
            "Current document",
            &serde_json::to_string_pretty(&doc.to_value()).unwrap_or_default()
        )
    )
}

/// User prompt for one progressive fill-task: a small instruction over the
/// named slot paths, plus the current snapshot so later tasks can read
/// earlier fills.
pub fn task_prompt(task_name: &str, paths: &[String], instruction: &str, doc: &SkeletonDocument) -> String {
    let path_list = paths
        .iter()
        .map(|p| format!("`{}`", p))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "Task: {}.\n{}\nFill only these slots: {}.\n\
         Respond with a single JSON object mapping each slot path to its value.\n\n{}",
        task_name,
        instruction,
        path_list,
        section(
            "Current document",
            &serde_json::to_string_pretty(&doc.to_value()).unwrap_or_default()
        )
    )
}
