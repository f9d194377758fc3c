use crate::calc::ratio::parse_ratio_opt;
use serde::Serialize;

/// How far a student is through one book. Built once when a row is read,
/// so aggregation never has to re-parse or re-validate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Completion {
    /// `completed` is always within `0..=total` and `total >= 1`.
    Units { completed: u32, total: u32 },
    /// Older rows only carry a free-text ratio and a done flag.
    #[serde(rename_all = "camelCase")]
    Legacy { ratio: f64, is_done: bool },
}

impl Completion {
    pub fn units(completed: i64, total: i64) -> Self {
        let total = total.clamp(1, u32::MAX as i64) as u32;
        let completed = completed.clamp(0, total as i64) as u32;
        Completion::Units { completed, total }
    }

    /// Pick the completion path for a stored row. Unit counts win over the
    /// legacy text whenever either count is present.
    pub fn from_fields(
        completed_units: Option<i64>,
        total_units: Option<i64>,
        legacy_ratio_text: Option<&str>,
        is_done: bool,
    ) -> Self {
        if completed_units.is_some() || total_units.is_some() {
            return Completion::units(completed_units.unwrap_or(0), total_units.unwrap_or(1));
        }
        if legacy_ratio_text.is_some() || is_done {
            return Completion::Legacy {
                ratio: parse_ratio_opt(legacy_ratio_text),
                is_done,
            };
        }
        Completion::Units {
            completed: 0,
            total: 1,
        }
    }

    /// Fraction of the book finished, in [0,1].
    pub fn fraction(&self) -> f64 {
        match *self {
            Completion::Units { completed, total } => completed as f64 / total.max(1) as f64,
            Completion::Legacy { is_done: true, .. } => 1.0,
            Completion::Legacy { ratio, .. } => ratio.clamp(0.0, 1.0),
        }
    }

    pub fn is_complete(&self) -> bool {
        match *self {
            Completion::Units { completed, total } => completed >= total,
            Completion::Legacy { ratio, is_done } => is_done || ratio >= 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TextbookAssignment {
    pub id: String,
    pub subject: String,
    pub curriculum_level: String,
    pub book_name: String,
    /// Hours; non-finite or negative values contribute nothing.
    pub nominal_duration: f64,
    pub is_planned: bool,
    pub completion: Completion,
}

/// Read-only view of one student as of a single request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentSnapshot {
    pub id: String,
    pub name: String,
    pub school: String,
    pub grade: Option<String>,
    pub deviation_value: Option<f64>,
    pub assignments: Vec<TextbookAssignment>,
}
