//! Shared fixtures for unit tests.

use crate::interview::{SpeakerRole, Turn};
use crate::schema::{AnnotationSchema, SlotKind, SlotSpec};

/// A small but representative schema: scalars, an enum, a bounded number,
/// a ranked list, a nested struct, and two per-turn slots.
pub(crate) fn study_schema() -> AnnotationSchema {
    AnnotationSchema {
        name: "relocation-study".into(),
        interview_slots: vec![
            SlotSpec::new("summary", SlotKind::Text)
                .describe_as("Two-sentence summary of the interview"),
            SlotSpec::new(
                "overall_sentiment",
                SlotKind::Enum {
                    allowed: vec!["positive".into(), "neutral".into(), "negative".into()],
                },
            ),
            SlotSpec::new(
                "confidence",
                SlotKind::Number {
                    min: Some(0.0),
                    max: Some(1.0),
                },
            ),
            SlotSpec::new("priorities", SlotKind::RankedList { count: 3 })
                .describe_as("The participant's top three stated priorities"),
            SlotSpec::new(
                "context",
                SlotKind::Struct {
                    fields: vec![
                        SlotSpec::new("setting", SlotKind::Text),
                        SlotSpec::new(
                            "rapport",
                            SlotKind::Enum {
                                allowed: vec!["good".into(), "strained".into()],
                            },
                        )
                        .optional(),
                    ],
                },
            ),
        ],
        turn_slots: vec![
            SlotSpec::new(
                "emotion",
                SlotKind::Enum {
                    allowed: vec![
                        "calm".into(),
                        "distressed".into(),
                        "hopeful".into(),
                        "not_expressed".into(),
                    ],
                },
            ),
            SlotSpec::new(
                "evidence",
                SlotKind::List {
                    min_items: None,
                    max_items: Some(3),
                },
            )
            .describe_as("Verbatim quotes supporting the emotion, if any"),
        ],
    }
}

/// Three clean alternating turns.
pub(crate) fn three_turns() -> Vec<Turn> {
    vec![
        Turn::new(1, SpeakerRole::Interviewer, "How did you come to live here?"),
        Turn::new(2, SpeakerRole::Participant, "My family moved when I was six."),
        Turn::new(3, SpeakerRole::Interviewer, "What do you remember about that?"),
    ]
}

/// A complete, valid fill for [`study_schema`] over [`three_turns`],
/// keyed by flat slot path.
pub(crate) fn complete_fill() -> Vec<(String, serde_json::Value)> {
    use serde_json::json;
    let mut fill = vec![
        ("summary".to_string(), json!("Participant recalls moving as a child. The move shaped their ties to the area.")),
        ("overall_sentiment".to_string(), json!("positive")),
        ("confidence".to_string(), json!(0.9)),
        (
            "priorities".to_string(),
            json!([
                {"label": "family", "rank": 1},
                {"label": "stability", "rank": 2},
                {"label": "work", "rank": 3},
            ]),
        ),
        ("context.setting".to_string(), json!("participant's kitchen")),
        ("context.rapport".to_string(), json!("good")),
    ];
    for i in 1..=3 {
        fill.push((format!("turns[{}].emotion", i), json!("calm")));
        fill.push((format!("turns[{}].evidence", i), json!([])));
    }
    fill
}
