use crate::config::CalcConfig;
use crate::model::StudentSnapshot;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelCount {
    pub level: String,
    pub count: usize,
}

/// Whether every planned book at `level` in `subject` is complete. A level
/// with no planned books is not reached.
pub fn has_reached_level(student: &StudentSnapshot, subject: &str, level: &str) -> bool {
    let mut planned = student
        .assignments
        .iter()
        .filter(|a| a.is_planned && a.subject == subject && a.curriculum_level == level)
        .peekable();
    if planned.peek().is_none() {
        return false;
    }
    planned.all(|a| a.completion.is_complete())
}

/// How many students in the cohort reached each configured level of
/// `subject`, in ascending difficulty order.
pub fn level_reach_counts(
    students: &[StudentSnapshot],
    subject: &str,
    cfg: &CalcConfig,
) -> Vec<LevelCount> {
    cfg.level_names()
        .map(|level| LevelCount {
            level: level.to_string(),
            count: students
                .iter()
                .filter(|s| has_reached_level(s, subject, level))
                .count(),
        })
        .collect()
}
