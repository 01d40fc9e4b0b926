//! Transcript segmentation into speaker turns.
//!
//! [`TurnSegmenter`] splits raw transcript text into ordered [`Turn`]s using
//! a prioritized list of label rules, an alias table folding labels onto the
//! closed role set, and a list of exclusion patterns for metadata lines.
//! All three are data on [`SegmenterConfig`], not code.

use crate::error::{AnnotateError, Result};
use crate::interview::{SpeakerRole, Turn};
use regex::Regex;
use std::collections::HashMap;

/// One speaker-label rule. Rules are tried in order; the first whose pattern
/// matches the start of a line and whose captured label folds to a role
/// claims the line.
#[derive(Debug, Clone)]
pub struct LabelRule {
    pattern: Regex,
}

impl LabelRule {
    /// Compile a rule from a regex with exactly one capture group for the
    /// label token. The pattern is anchored at the start of the line if not
    /// already.
    pub fn new(pattern: &str) -> Result<Self> {
        let anchored = if pattern.starts_with('^') {
            pattern.to_string()
        } else {
            format!("^{}", pattern)
        };
        let pattern = Regex::new(&anchored)
            .map_err(|e| AnnotateError::InvalidConfig(format!("bad label rule: {}", e)))?;
        Ok(Self { pattern })
    }

    /// If the line opens with this rule's label, return the captured label
    /// token and the inline remainder after the match.
    fn split<'a>(&self, line: &'a str) -> Option<(String, &'a str)> {
        let caps = self.pattern.captures(line)?;
        let whole = caps.get(0)?;
        let label = caps.get(1)?.as_str().to_string();
        Some((label, &line[whole.end()..]))
    }
}

/// Segmentation configuration: prioritized label rules, the alias table that
/// folds label tokens onto [`SpeakerRole`]s, and exclusion patterns for
/// metadata lines dropped regardless of state.
#[derive(Debug, Clone)]
pub struct SegmenterConfig {
    /// Label rules, tried in order.
    pub rules: Vec<LabelRule>,
    /// Normalized label token to role. Lookup happens after
    /// [`normalize_label`].
    pub aliases: HashMap<String, SpeakerRole>,
    /// Lines matching any of these are dropped entirely.
    pub exclusions: Vec<Regex>,
}

impl SegmenterConfig {
    /// Add an alias, normalized the same way matching does.
    pub fn with_alias(mut self, label: &str, role: SpeakerRole) -> Self {
        self.aliases.insert(normalize_label(label), role);
        self
    }

    /// Add an exclusion pattern.
    pub fn with_exclusion(mut self, pattern: &str) -> Result<Self> {
        let re = Regex::new(pattern)
            .map_err(|e| AnnotateError::InvalidConfig(format!("bad exclusion: {}", e)))?;
        self.exclusions.push(re);
        Ok(self)
    }
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        // Rule order matters: bracketed forms are less ambiguous than bare
        // "Name:" lines, so they are tried first.
        let rules = vec![
            // [AB] or [Interviewer], optional trailing colon
            LabelRule::new(r"\[([A-Za-z][A-Za-z0-9 ._'-]{0,31})\]\s*:?\s*"),
            // Speaker 1: / Role 2:
            LabelRule::new(r"((?:Speaker|Role)\s*\d+)\s*:\s*"),
            // Name: (requires the colon to close the token)
            LabelRule::new(r"([A-Za-z][A-Za-z ._'-]{0,31}):\s*"),
        ]
        .into_iter()
        .collect::<Result<Vec<_>>>()
        .expect("default label rules must compile");

        let mut aliases = HashMap::new();
        for label in ["i", "int", "interviewer", "q", "moderator", "facilitator", "speaker 1", "role 1"] {
            aliases.insert(label.to_string(), SpeakerRole::Interviewer);
        }
        for label in [
            "p",
            "r",
            "a",
            "participant",
            "respondent",
            "interviewee",
            "subject",
            "speaker 2",
            "role 2",
        ] {
            aliases.insert(label.to_string(), SpeakerRole::Participant);
        }

        let exclusions = [
            r"(?i)^\s*\[?(recording|transcription|transcript)\b",
            r"(?i)^\s*page\s+\d+\s*$",
            r"^\s*\[?\d{1,2}:\d{2}(:\d{2})?\]?\s*$",
            r"(?i)^\s*\(?end of (interview|recording|transcript)\)?",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("default exclusion patterns must compile"))
        .collect();

        Self {
            rules,
            aliases,
            exclusions,
        }
    }
}

/// Normalize a label token for alias lookup: lowercase, strip dots and
/// surrounding brackets, collapse inner whitespace.
fn normalize_label(label: &str) -> String {
    let trimmed = label
        .trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .trim_end_matches(':')
        .replace('.', "");
    trimmed
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Splits raw transcript text into ordered speaker turns.
///
/// Pure function of its input: segmenting the same text twice yields the
/// same turns. Zero recognized labels is a valid degenerate case and yields
/// an empty list, not an error.
#[derive(Debug, Clone, Default)]
pub struct TurnSegmenter {
    config: SegmenterConfig,
}

impl TurnSegmenter {
    /// Create a segmenter with the given configuration.
    pub fn new(config: SegmenterConfig) -> Self {
        Self { config }
    }

    /// Segment a raw transcript into turns.
    ///
    /// A line matching a label rule (with a foldable label) opens a new turn,
    /// capturing any inline remainder. Non-matching, non-excluded lines append
    /// to the open turn. Consecutive lines with the same label continue the
    /// same turn. Lines before the first label are discarded.
    pub fn segment(&self, raw: &str) -> Vec<Turn> {
        let mut turns: Vec<(SpeakerRole, String, Vec<String>)> = Vec::new();

        for line in raw.lines() {
            let line = line.trim_end();
            if line.trim().is_empty() {
                continue;
            }
            if self.is_excluded(line) {
                continue;
            }

            match self.match_label(line) {
                Some((label, role, remainder)) => {
                    let remainder = remainder.trim();
                    match turns.last_mut() {
                        Some((_, last_label, lines)) if *last_label == label => {
                            if !remainder.is_empty() {
                                lines.push(remainder.to_string());
                            }
                        }
                        _ => {
                            let mut lines = Vec::new();
                            if !remainder.is_empty() {
                                lines.push(remainder.to_string());
                            }
                            turns.push((role, label, lines));
                        }
                    }
                }
                None => {
                    // Unattributed content: append to the open turn, discard
                    // anything before the first label.
                    if let Some(open) = turns.last_mut() {
                        open.2.push(line.trim().to_string());
                    }
                }
            }
        }

        turns
            .into_iter()
            .enumerate()
            .map(|(i, (role, _, lines))| Turn::new(i + 1, role, lines.join("\n")))
            .collect()
    }

    fn is_excluded(&self, line: &str) -> bool {
        self.config.exclusions.iter().any(|re| re.is_match(line))
    }

    /// Try each rule in order; a match only claims the line when its label
    /// folds to a role via the alias table. Unfoldable labels leave the line
    /// as ordinary content.
    fn match_label<'a>(&self, line: &'a str) -> Option<(String, SpeakerRole, &'a str)> {
        for rule in &self.config.rules {
            if let Some((label, remainder)) = rule.split(line) {
                let normalized = normalize_label(&label);
                if let Some(&role) = self.config.aliases.get(&normalized) {
                    return Some((normalized, role, remainder));
                }
            }
        }
        None
    }
}
