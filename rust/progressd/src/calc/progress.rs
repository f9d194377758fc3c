use super::duration::true_duration;
use crate::config::CalcConfig;
use crate::model::{StudentSnapshot, TextbookAssignment};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookBreakdown {
    pub assignment_id: String,
    pub subject: String,
    pub curriculum_level: String,
    pub book_name: String,
    pub true_duration: f64,
    pub achieved_duration: f64,
    /// Hours still to go: `true_duration - achieved_duration`, floored at 0.
    pub planned_duration: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectProgress {
    pub subject: String,
    pub planned_hours: f64,
    pub achieved_hours: f64,
    pub achievement_rate: f64,
    pub planned_books: usize,
    pub completed_books: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentProgress {
    pub student_id: String,
    pub deviation_value: Option<f64>,
    pub planned_hours: f64,
    pub achieved_hours: f64,
    pub achievement_rate: f64,
    pub subjects: Vec<SubjectProgress>,
    pub breakdown: Vec<BookBreakdown>,
}

fn assignment_true_duration(a: &TextbookAssignment, ability: Option<f64>, cfg: &CalcConfig) -> f64 {
    true_duration(a.nominal_duration, &a.curriculum_level, ability, cfg)
}

pub fn achieved_duration(a: &TextbookAssignment, ability: Option<f64>, cfg: &CalcConfig) -> f64 {
    let hours = assignment_true_duration(a, ability, cfg);
    let achieved = hours * a.completion.fraction();
    if achieved.is_finite() {
        achieved.max(0.0)
    } else {
        0.0
    }
}

fn planned_totals<'a, I>(assignments: I, ability: Option<f64>, cfg: &CalcConfig) -> (f64, f64)
where
    I: IntoIterator<Item = &'a TextbookAssignment>,
{
    let mut total = 0.0_f64;
    let mut achieved = 0.0_f64;
    for a in assignments.into_iter().filter(|a| a.is_planned) {
        total += assignment_true_duration(a, ability, cfg);
        achieved += achieved_duration(a, ability, cfg);
    }
    (total, achieved)
}

fn rate(total: f64, achieved: f64) -> f64 {
    if total <= 0.0 {
        return 0.0;
    }
    (100.0 * achieved / total).clamp(0.0, 100.0)
}

/// Percentage (0-100) of planned true-duration hours already achieved.
/// Unplanned rows are ignored; an empty plan reads as 0.
pub fn achievement_rate(
    assignments: &[TextbookAssignment],
    ability: Option<f64>,
    cfg: &CalcConfig,
) -> f64 {
    let (total, achieved) = planned_totals(assignments, ability, cfg);
    rate(total, achieved)
}

/// Per-book achieved/remaining split for the stacked progress chart.
pub fn stacked_breakdown(
    assignments: &[TextbookAssignment],
    ability: Option<f64>,
    cfg: &CalcConfig,
) -> Vec<BookBreakdown> {
    assignments
        .iter()
        .filter(|a| a.is_planned)
        .map(|a| {
            let hours = assignment_true_duration(a, ability, cfg);
            let achieved = achieved_duration(a, ability, cfg);
            BookBreakdown {
                assignment_id: a.id.clone(),
                subject: a.subject.clone(),
                curriculum_level: a.curriculum_level.clone(),
                book_name: a.book_name.clone(),
                true_duration: hours,
                achieved_duration: achieved,
                planned_duration: (hours - achieved).max(0.0),
            }
        })
        .collect()
}

/// Subject roll-ups in the order subjects first appear in `assignments`.
pub fn subject_progress(
    assignments: &[TextbookAssignment],
    ability: Option<f64>,
    cfg: &CalcConfig,
) -> Vec<SubjectProgress> {
    let mut subjects: Vec<&str> = Vec::new();
    for a in assignments {
        if !subjects.contains(&a.subject.as_str()) {
            subjects.push(&a.subject);
        }
    }

    subjects
        .into_iter()
        .map(|subject| {
            let rows: Vec<&TextbookAssignment> = assignments
                .iter()
                .filter(|a| a.subject == subject)
                .collect();
            let (total, achieved) = planned_totals(rows.iter().copied(), ability, cfg);
            let planned_books = rows.iter().filter(|a| a.is_planned).count();
            let completed_books = rows
                .iter()
                .filter(|a| a.is_planned && a.completion.is_complete())
                .count();
            SubjectProgress {
                subject: subject.to_string(),
                planned_hours: total,
                achieved_hours: achieved,
                achievement_rate: rate(total, achieved),
                planned_books,
                completed_books,
            }
        })
        .collect()
}

pub fn student_progress(student: &StudentSnapshot, cfg: &CalcConfig) -> StudentProgress {
    let ability = student.deviation_value;
    let (total, achieved) = planned_totals(&student.assignments, ability, cfg);
    StudentProgress {
        student_id: student.id.clone(),
        deviation_value: ability,
        planned_hours: total,
        achieved_hours: achieved,
        achievement_rate: rate(total, achieved),
        subjects: subject_progress(&student.assignments, ability, cfg),
        breakdown: stacked_breakdown(&student.assignments, ability, cfg),
    }
}
