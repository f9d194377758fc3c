//! Read-side repository: turns stored rows into request-scoped snapshots.
//!
//! Numeric coercion happens here, once. A row that cannot be decoded at all
//! is logged and skipped so it never takes the rest of a cohort down with it.

use crate::config::{self, CalcConfig, ConfigError};
use crate::db;
use crate::model::{Completion, StudentSnapshot, TextbookAssignment};
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, Row};
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("stored calc config is invalid: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to encode calc config: {0}")]
    Encode(#[from] serde_json::Error),
    #[error(transparent)]
    Sql(#[from] rusqlite::Error),
}

impl RepoError {
    pub fn code(&self) -> &'static str {
        match self {
            RepoError::NotFound(_) => "not_found",
            RepoError::Config(_) | RepoError::Encode(_) => "bad_config",
            RepoError::Sql(_) => "db_query_failed",
        }
    }
}

pub type RepoResult<T> = Result<T, RepoError>;

fn value_as_f64(v: Value) -> Option<f64> {
    match v {
        Value::Integer(i) => Some(i as f64),
        Value::Real(f) => Some(f),
        Value::Text(t) => t.trim().parse::<f64>().ok(),
        Value::Null | Value::Blob(_) => None,
    }
    .filter(|f| f.is_finite())
}

fn value_as_i64(v: Value) -> Option<i64> {
    match v {
        Value::Integer(i) => Some(i),
        Value::Real(f) if f.is_finite() => Some(f.trunc() as i64),
        Value::Text(t) => t.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn value_as_text(v: Value) -> Option<String> {
    match v {
        Value::Text(t) => Some(t),
        Value::Integer(i) => Some(i.to_string()),
        Value::Real(f) => Some(f.to_string()),
        Value::Null | Value::Blob(_) => None,
    }
}

const ASSIGNMENT_COLUMNS: &str = "id, subject, curriculum_level, book_name, nominal_duration,
    is_planned, completed_units, total_units, legacy_ratio_text, is_done";

fn assignment_from_row(r: &Row<'_>) -> rusqlite::Result<TextbookAssignment> {
    let completion = Completion::from_fields(
        value_as_i64(r.get(6)?),
        value_as_i64(r.get(7)?),
        value_as_text(r.get(8)?).as_deref(),
        value_as_i64(r.get(9)?).unwrap_or(0) != 0,
    );
    Ok(TextbookAssignment {
        id: r.get(0)?,
        subject: r.get(1)?,
        curriculum_level: r.get(2)?,
        book_name: r.get(3)?,
        nominal_duration: value_as_f64(r.get(4)?).unwrap_or(0.0),
        is_planned: value_as_i64(r.get(5)?).unwrap_or(0) != 0,
        completion,
    })
}

pub fn load_assignments(
    conn: &Connection,
    student_id: &str,
    subject: Option<&str>,
) -> RepoResult<Vec<TextbookAssignment>> {
    let sql = format!(
        "SELECT {}
         FROM assignments
         WHERE student_id = ?1 AND (?2 IS NULL OR subject = ?2)
         ORDER BY subject, curriculum_level, book_name",
        ASSIGNMENT_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map((student_id, subject), assignment_from_row)?;

    let mut out = Vec::new();
    for row in rows {
        match row {
            Ok(a) => out.push(a),
            Err(e) => warn!(student_id, error = %e, "skipping unreadable assignment row"),
        }
    }
    Ok(out)
}

/// One assignment plus the id of the student owning it.
pub fn load_assignment(
    conn: &Connection,
    assignment_id: &str,
) -> RepoResult<(String, TextbookAssignment)> {
    let sql = format!(
        "SELECT {}, student_id FROM assignments WHERE id = ?",
        ASSIGNMENT_COLUMNS
    );
    let row = conn
        .query_row(&sql, [assignment_id], |r| {
            Ok((r.get::<_, String>(10)?, assignment_from_row(r)?))
        })
        .optional()?;
    row.ok_or(RepoError::NotFound("assignment"))
}

pub fn student_ability(conn: &Connection, student_id: &str) -> RepoResult<Option<f64>> {
    let v: Option<Value> = conn
        .query_row(
            "SELECT deviation_value FROM students WHERE id = ?",
            [student_id],
            |r| r.get(0),
        )
        .optional()?;
    match v {
        Some(v) => Ok(value_as_f64(v)),
        None => Err(RepoError::NotFound("student")),
    }
}

struct StudentRow {
    id: String,
    name: String,
    school: String,
    grade: Option<String>,
    deviation_value: Option<f64>,
}

fn student_from_row(r: &Row<'_>) -> rusqlite::Result<StudentRow> {
    Ok(StudentRow {
        id: r.get(0)?,
        name: r.get(1)?,
        school: r.get(2)?,
        grade: value_as_text(r.get(3)?),
        deviation_value: value_as_f64(r.get(4)?),
    })
}

fn into_snapshot(conn: &Connection, s: StudentRow) -> RepoResult<StudentSnapshot> {
    let assignments = load_assignments(conn, &s.id, None)?;
    Ok(StudentSnapshot {
        id: s.id,
        name: s.name,
        school: s.school,
        grade: s.grade,
        deviation_value: s.deviation_value,
        assignments,
    })
}

pub fn load_student_snapshot(conn: &Connection, student_id: &str) -> RepoResult<StudentSnapshot> {
    let row = conn
        .query_row(
            "SELECT id, name, school, grade, deviation_value FROM students WHERE id = ?",
            [student_id],
            student_from_row,
        )
        .optional()?;
    let Some(row) = row else {
        return Err(RepoError::NotFound("student"));
    };
    into_snapshot(conn, row)
}

/// Active students of one school, optionally narrowed to a grade.
pub fn load_cohort_snapshots(
    conn: &Connection,
    school: &str,
    grade: Option<&str>,
) -> RepoResult<Vec<StudentSnapshot>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, school, grade, deviation_value
         FROM students
         WHERE active = 1 AND school = ?1 AND (?2 IS NULL OR grade = ?2)
         ORDER BY name, id",
    )?;
    let rows = stmt.query_map((school, grade), student_from_row)?;

    let mut out = Vec::new();
    for row in rows {
        match row {
            Ok(s) => out.push(into_snapshot(conn, s)?),
            Err(e) => warn!(school, error = %e, "skipping unreadable student row"),
        }
    }
    debug!(school, ?grade, students = out.len(), "loaded cohort");
    Ok(out)
}

/// The workspace's level table, or the built-in default when none is stored.
pub fn load_calc_config(conn: &Connection) -> RepoResult<CalcConfig> {
    let Some(raw) = db::settings_get_json(conn, config::SETTINGS_KEY)? else {
        return Ok(CalcConfig::default());
    };
    let cfg = match serde_json::from_value::<CalcConfig>(raw) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!(error = %e, "stored calc config does not parse; using defaults");
            return Ok(CalcConfig::default());
        }
    };
    if let Err(e) = cfg.validate() {
        warn!(error = %e, "stored calc config is invalid; using defaults");
        return Ok(CalcConfig::default());
    }
    Ok(cfg)
}

pub fn save_calc_config(conn: &Connection, cfg: &CalcConfig) -> RepoResult<()> {
    cfg.validate()?;
    let value = serde_json::to_value(cfg)?;
    db::settings_set_json(conn, config::SETTINGS_KEY, &value)?;
    Ok(())
}

pub fn has_stored_calc_config(conn: &Connection) -> RepoResult<bool> {
    Ok(db::settings_get_json(conn, config::SETTINGS_KEY)?.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir(prefix: &str) -> PathBuf {
        let p = std::env::temp_dir().join(format!(
            "{}-{}",
            prefix,
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ));
        std::fs::create_dir_all(&p).expect("create temp dir");
        p
    }

    fn seed_student(conn: &Connection, id: &str, school: &str, grade: &str, dev: Option<f64>) {
        conn.execute(
            "INSERT INTO students(id, name, school, grade, deviation_value, active, created_at)
             VALUES(?, ?, ?, ?, ?, 1, '2026-01-01T00:00:00Z')",
            (id, format!("Student {}", id), school, grade, dev),
        )
        .expect("insert student");
    }

    #[test]
    fn malformed_numbers_coerce_instead_of_failing() {
        let ws = temp_dir("progressd-repo-coerce");
        let conn = db::open_db(&ws).expect("open db");
        seed_student(&conn, "s1", "North", "10", Some(60.0));
        conn.execute(
            "INSERT INTO assignments(id, student_id, subject, curriculum_level, book_name,
                nominal_duration, is_planned, completed_units, total_units)
             VALUES('a1', 's1', 'Math', 'Tier-A', 'Algebra', 'ten', 1, 3, 0)",
            [],
        )
        .expect("insert bad row");
        conn.execute(
            "INSERT INTO assignments(id, student_id, subject, curriculum_level, book_name,
                nominal_duration, is_planned, legacy_ratio_text)
             VALUES('a2', 's1', 'Math', 'Tier-A', 'Geometry', 12, 1, '3/4')",
            [],
        )
        .expect("insert legacy row");

        let snap = load_student_snapshot(&conn, "s1").expect("snapshot");
        assert_eq!(snap.assignments.len(), 2);
        let algebra = &snap.assignments[0];
        assert_eq!(algebra.nominal_duration, 0.0);
        assert_eq!(
            algebra.completion,
            Completion::Units {
                completed: 1,
                total: 1
            }
        );
        let geometry = &snap.assignments[1];
        assert!((geometry.completion.fraction() - 0.75).abs() < 1e-12);
    }

    #[test]
    fn cohort_filters_by_school_grade_and_active() {
        let ws = temp_dir("progressd-repo-cohort");
        let conn = db::open_db(&ws).expect("open db");
        seed_student(&conn, "a", "North", "10", None);
        seed_student(&conn, "b", "North", "11", None);
        seed_student(&conn, "c", "South", "10", None);
        seed_student(&conn, "d", "North", "10", None);
        conn.execute("UPDATE students SET active = 0 WHERE id = 'd'", [])
            .expect("soft remove");

        let all_north = load_cohort_snapshots(&conn, "North", None).expect("cohort");
        assert_eq!(all_north.len(), 2);
        let grade10 = load_cohort_snapshots(&conn, "North", Some("10")).expect("cohort");
        assert_eq!(grade10.len(), 1);
        assert_eq!(grade10[0].id, "a");
    }

    #[test]
    fn missing_student_is_not_found() {
        let ws = temp_dir("progressd-repo-missing");
        let conn = db::open_db(&ws).expect("open db");
        let e = load_student_snapshot(&conn, "nope").expect_err("should fail");
        assert_eq!(e.code(), "not_found");
    }

    #[test]
    fn calc_config_defaults_then_persists() {
        let ws = temp_dir("progressd-repo-config");
        let conn = db::open_db(&ws).expect("open db");
        assert_eq!(load_calc_config(&conn).expect("load"), CalcConfig::default());
        assert!(!has_stored_calc_config(&conn).expect("has"));

        let mut cfg = CalcConfig::default();
        cfg.levels.truncate(2);
        save_calc_config(&conn, &cfg).expect("save");
        assert_eq!(load_calc_config(&conn).expect("load"), cfg);

        cfg.levels.clear();
        let e = save_calc_config(&conn, &cfg).expect_err("empty levels rejected");
        assert_eq!(e.code(), "bad_config");
    }

    #[test]
    fn invalid_or_unparseable_stored_config_reads_as_default() {
        let ws = temp_dir("progressd-repo-config-bad");
        let conn = db::open_db(&ws).expect("open db");

        let dup = serde_json::json!({
            "levels": [
                { "name": "Basic", "referenceAbility": 45.0 },
                { "name": "Basic", "referenceAbility": 50.0 }
            ]
        });
        db::settings_set_json(&conn, config::SETTINGS_KEY, &dup).expect("store invalid");
        assert_eq!(load_calc_config(&conn).expect("load"), CalcConfig::default());

        db::settings_set_json(&conn, config::SETTINGS_KEY, &serde_json::json!({ "levels": 3 }))
            .expect("store unparseable");
        assert_eq!(load_calc_config(&conn).expect("load"), CalcConfig::default());
    }
}
