//! Internal-assessment score from raw marks.

use serde::{Deserialize, Serialize};

pub const MAX_INTERNALS: f64 = 30.0;

const BETTER_MID_WEIGHT: f64 = 0.8;
const WEAKER_MID_WEIGHT: f64 = 0.2;

/// Raw marks for one subject. Assignments are out of 10; 1-2 belong to the
/// first mid-term and 3-5 to the second.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AssessmentMarks {
    pub assignments: [f64; 5],
    pub mid1_descriptive: f64,
    pub mid1_short_questions: f64,
    pub mid2_descriptive: f64,
    pub mid2_short_questions: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InternalsBreakdown {
    pub first_mid: f64,
    pub second_mid: f64,
    pub final_internals: f64,
}

impl InternalsBreakdown {
    /// The score as the portal would show it, rounded up.
    pub fn rounded(&self) -> u32 {
        self.final_internals.ceil().max(0.0) as u32
    }
}

/// A subject's marks saved from the calculator under its subject name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preset {
    pub subject_name: String,
    pub marks: AssessmentMarks,
    // Absent in presets written before the score was stored alongside.
    #[serde(default)]
    pub final_internals: Option<f64>,
}

impl Preset {
    pub fn new(subject_name: impl Into<String>, marks: AssessmentMarks) -> Self {
        let final_internals = compute_internals(&marks).final_internals;
        Self {
            subject_name: subject_name.into(),
            marks,
            final_internals: Some(final_internals),
        }
    }

    /// The stored score, or one computed from the marks for older presets.
    pub fn final_internals(&self) -> f64 {
        self.final_internals
            .unwrap_or_else(|| compute_internals(&self.marks).final_internals)
    }
}

fn halved(mark: f64) -> f64 {
    (mark / 2.0).ceil()
}

fn average(marks: &[f64]) -> f64 {
    marks.iter().map(|mark| halved(*mark)).sum::<f64>() / marks.len() as f64
}

pub fn compute_internals(marks: &AssessmentMarks) -> InternalsBreakdown {
    let first_mid = marks.mid1_short_questions
        + average(&marks.assignments[..2])
        + marks.mid1_descriptive / 2.0;
    let second_mid = marks.mid2_short_questions
        + average(&marks.assignments[2..])
        + marks.mid2_descriptive / 2.0;

    let final_internals = first_mid.max(second_mid) * BETTER_MID_WEIGHT
        + first_mid.min(second_mid) * WEAKER_MID_WEIGHT;

    InternalsBreakdown {
        first_mid,
        second_mid,
        final_internals,
    }
}
