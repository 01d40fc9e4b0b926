//! Interview-side domain types.
//!
//! [`InterviewDocument`] is the pre-built input consumed from ingestion
//! (DOCX/TXT parsing happens upstream). [`Turn`] is one contiguous utterance
//! by a single speaker, immutable once segmented. [`ProcessingMetadata`]
//! records what a completed run cost and how it behaved.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A parsed interview handed to the annotator by the ingestion layer.
///
/// This crate never reads files itself; the caller supplies the raw text
/// plus whatever metadata ingestion extracted from the filename.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterviewDocument {
    /// Stable interview identifier.
    pub id: String,
    /// The raw transcript text, unsegmented.
    pub raw_text: String,
    /// Interview date, if ingestion extracted one.
    pub date: Option<String>,
    /// Interview location, if ingestion extracted one.
    pub location: Option<String>,
    /// Any further ingestion-supplied metadata, passed through untouched.
    #[serde(default)]
    pub extra: HashMap<String, String>,
}

impl InterviewDocument {
    /// Create a document from an id and raw transcript text.
    pub fn new(id: impl Into<String>, raw_text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            raw_text: raw_text.into(),
            date: None,
            location: None,
            extra: HashMap::new(),
        }
    }

    /// Set the interview date.
    pub fn with_date(mut self, date: impl Into<String>) -> Self {
        self.date = Some(date.into());
        self
    }

    /// Set the interview location.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

/// The closed set of speaker roles a label can fold to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeakerRole {
    /// The person asking the questions.
    Interviewer,
    /// The person being interviewed.
    Participant,
}

impl SpeakerRole {
    /// Stable lowercase name, used in record output and prompts.
    pub fn as_str(&self) -> &'static str {
        match self {
            SpeakerRole::Interviewer => "interviewer",
            SpeakerRole::Participant => "participant",
        }
    }
}

/// One contiguous utterance by a single speaker.
///
/// Immutable once segmented; `index` is 1-based and stable for the lifetime
/// of the interview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    /// 1-based position in the transcript.
    pub index: usize,
    /// Which speaker the label folded to.
    pub role: SpeakerRole,
    /// The utterance text (label stripped, excluded lines removed).
    pub text: String,
    /// Whitespace-delimited word count of `text`.
    pub word_count: usize,
}

impl Turn {
    /// Build a turn, computing the word count from the text.
    pub fn new(index: usize, role: SpeakerRole, text: impl Into<String>) -> Self {
        let text = text.into();
        let word_count = text.split_whitespace().count();
        Self {
            index,
            role,
            text,
            word_count,
        }
    }
}

/// Prompt/completion token counts reported by a provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens consumed by the prompt (system + user).
    pub prompt_tokens: u64,
    /// Tokens generated by the model.
    pub completion_tokens: u64,
}

impl TokenUsage {
    /// Create a usage record from prompt and completion counts.
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
        }
    }

    /// Total tokens, both directions.
    pub fn total(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }

    /// Fold another usage record into this one.
    pub fn absorb(&mut self, other: TokenUsage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
    }
}

/// Append-only record of how a completed run behaved.
///
/// Attached to every [`AnnotationRun`](crate::annotator::AnnotationRun) and
/// persisted alongside the completed annotation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingMetadata {
    /// Gateway name (e.g. `"ollama"`, `"openai"`, `"mock"`).
    pub provider: String,
    /// Model identifier the run used.
    pub model: String,
    /// Total provider call attempts, including transport retries.
    pub attempt_count: u32,
    /// Corrective calls issued by the retry loop.
    pub correction_count: u32,
    /// Wall-clock duration of the run in milliseconds.
    pub elapsed_ms: u64,
    /// Aggregated token usage across every call in the run.
    pub token_usage: TokenUsage,
    /// Pre-execution dollar projection for the chosen strategy.
    pub estimated_cost: f64,
    /// Confidence in the run's output, in `[0, 1]`.
    pub overall_confidence: f64,
    /// Slot paths whose values only arrived after correction.
    pub uncertain_slots: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turn_word_count() {
        let turn = Turn::new(1, SpeakerRole::Participant, "I grew up near the river.");
        assert_eq!(turn.word_count, 6);
        assert_eq!(turn.index, 1);
    }

    #[test]
    fn test_turn_empty_text() {
        let turn = Turn::new(2, SpeakerRole::Interviewer, "");
        assert_eq!(turn.word_count, 0);
    }

    #[test]
    fn test_token_usage_absorb() {
        let mut usage = TokenUsage::new(100, 20);
        usage.absorb(TokenUsage::new(50, 10));
        assert_eq!(usage.prompt_tokens, 150);
        assert_eq!(usage.completion_tokens, 30);
        assert_eq!(usage.total(), 180);
    }

    #[test]
    fn test_interview_document_builder() {
        let doc = InterviewDocument::new("int-01", "P: hello")
            .with_date("2024-03-11")
            .with_location("Harare");
        assert_eq!(doc.id, "int-01");
        assert_eq!(doc.date.as_deref(), Some("2024-03-11"));
        assert_eq!(doc.location.as_deref(), Some("Harare"));
    }

    #[test]
    fn test_speaker_role_names() {
        assert_eq!(SpeakerRole::Interviewer.as_str(), "interviewer");
        assert_eq!(SpeakerRole::Participant.as_str(), "participant");
    }
}
