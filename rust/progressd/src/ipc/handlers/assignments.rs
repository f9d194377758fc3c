use crate::calc;
use crate::db::now_ts;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    optional_bool, optional_i64, optional_str, repo_err, required_str, student_exists, user_conn,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{Completion, TextbookAssignment};
use crate::repo;
use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

fn assignment_json(
    a: &TextbookAssignment,
    ability: Option<f64>,
    cfg: &crate::config::CalcConfig,
) -> serde_json::Value {
    json!({
        "id": a.id,
        "subject": a.subject,
        "curriculumLevel": a.curriculum_level,
        "bookName": a.book_name,
        "nominalDuration": a.nominal_duration,
        "isPlanned": a.is_planned,
        "completion": a.completion,
        "fraction": a.completion.fraction(),
        "isComplete": a.completion.is_complete(),
        "trueDuration": calc::true_duration(a.nominal_duration, &a.curriculum_level, ability, cfg),
        "achievedDuration": calc::achieved_duration(a, ability, cfg),
    })
}

/// Normalize unit counts the way they are stored: total >= 1 and
/// completed within 0..=total. Returns whether anything had to be clamped.
fn normalize_units(completed: i64, total: i64) -> (i64, i64, bool) {
    let t = total.max(1);
    let c = completed.clamp(0, t);
    (c, t, c != completed || t != total)
}

fn handle_assignments_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match user_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let subject = match optional_str(req, "subject") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let loaded = repo::student_ability(conn, &student_id).and_then(|ability| {
        let cfg = repo::load_calc_config(conn)?;
        let rows = repo::load_assignments(conn, &student_id, subject.as_deref())?;
        Ok((ability, cfg, rows))
    });
    match loaded {
        Ok((ability, cfg, rows)) => {
            let assignments: Vec<serde_json::Value> = rows
                .iter()
                .map(|a| assignment_json(a, ability, &cfg))
                .collect();
            ok(&req.id, json!({ "assignments": assignments }))
        }
        Err(e) => repo_err(req, e),
    }
}

fn handle_assignments_upsert(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match user_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let subject = match required_str(req, "subject") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let level = match required_str(req, "curriculumLevel") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let book_name = match required_str(req, "bookName") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let nominal = match req.params.get("nominalDuration").and_then(|v| v.as_f64()) {
        Some(v) if v.is_finite() && v > 0.0 => v,
        _ => {
            return err(
                &req.id,
                "bad_params",
                "nominalDuration must be a positive number",
                None,
            )
        }
    };
    let is_planned = match optional_bool(req, "isPlanned") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let completed = match optional_i64(req, "completedUnits") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let total = match optional_i64(req, "totalUnits") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let (completed, total) = match (completed, total) {
        (None, None) => (None, None),
        (Some(_), None) => {
            return err(
                &req.id,
                "bad_params",
                "completedUnits requires totalUnits",
                None,
            )
        }
        (c, Some(t)) => {
            let (c, t, _) = normalize_units(c.unwrap_or(0), t);
            (Some(c), Some(t))
        }
    };

    if let Err(resp) = student_exists(conn, req, &student_id) {
        return resp;
    }

    let new_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO assignments(
           id, student_id, subject, curriculum_level, book_name,
           nominal_duration, is_planned, completed_units, total_units, updated_at)
         VALUES(?1, ?2, ?3, ?4, ?5, ?6, COALESCE(?7, 1), ?8, ?9, ?10)
         ON CONFLICT(student_id, subject, curriculum_level, book_name) DO UPDATE SET
           nominal_duration = excluded.nominal_duration,
           is_planned = COALESCE(?7, assignments.is_planned),
           completed_units = COALESCE(?8, assignments.completed_units),
           total_units = COALESCE(?9, assignments.total_units),
           updated_at = excluded.updated_at",
        (
            &new_id,
            &student_id,
            &subject,
            &level,
            &book_name,
            nominal,
            is_planned,
            completed,
            total,
            now_ts(),
        ),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "assignments" })),
        );
    }

    let assignment_id: Option<String> = match conn
        .query_row(
            "SELECT id FROM assignments
             WHERE student_id = ? AND subject = ? AND curriculum_level = ? AND book_name = ?",
            (&student_id, &subject, &level, &book_name),
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let Some(assignment_id) = assignment_id else {
        return err(&req.id, "not_found", "assignment vanished after upsert", None);
    };

    ok(
        &req.id,
        json!({ "assignmentId": assignment_id, "created": assignment_id == new_id }),
    )
}

/// What `assignments.setProgress` writes. `None` columns are left as stored.
#[derive(Debug, PartialEq)]
struct ProgressUpdate {
    units: Option<(i64, i64)>,
    is_done: Option<bool>,
    clamped: bool,
}

/// Resolve a progress edit against the row's current completion. Counts the
/// request leaves out keep their stored value; a legacy row switching to unit
/// counts carries its ratio over.
fn resolve_progress(
    current: &Completion,
    completed: Option<i64>,
    total: Option<i64>,
    is_done: Option<bool>,
) -> Result<ProgressUpdate, &'static str> {
    let (stored_completed, stored_total) = match *current {
        Completion::Units { completed, total } => (Some(completed as i64), Some(total as i64)),
        Completion::Legacy { .. } => (None, None),
    };
    let Some(total) = total.or(stored_total) else {
        if completed.is_some() {
            return Err("completedUnits requires totalUnits on a book without unit counts");
        }
        return Ok(ProgressUpdate {
            units: None,
            is_done,
            clamped: false,
        });
    };

    let completed = match (completed, is_done) {
        (Some(c), Some(true)) if c < total => {
            return Err("isDone conflicts with completedUnits below totalUnits")
        }
        (Some(c), _) => c,
        (None, Some(true)) => total.max(1),
        (None, Some(false)) => {
            return Err("send completedUnits to reopen a book tracked by unit counts")
        }
        (None, None) => match stored_completed {
            Some(c) => c,
            None => (current.fraction() * total.max(1) as f64).floor() as i64,
        },
    };
    let (c, t, clamped) = normalize_units(completed, total);
    Ok(ProgressUpdate {
        units: Some((c, t)),
        is_done: Some(c >= t),
        clamped,
    })
}

fn handle_assignments_set_progress(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match user_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let assignment_id = match required_str(req, "assignmentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let completed = match optional_i64(req, "completedUnits") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let total = match optional_i64(req, "totalUnits") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let is_done = match optional_bool(req, "isDone") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    if completed.is_none() && total.is_none() && is_done.is_none() {
        return err(
            &req.id,
            "bad_params",
            "provide completedUnits/totalUnits or isDone",
            None,
        );
    }

    let current = match repo::load_assignment(conn, &assignment_id) {
        Ok((_, a)) => a.completion,
        Err(e) => return repo_err(req, e),
    };
    let update = match resolve_progress(&current, completed, total, is_done) {
        Ok(u) => u,
        Err(msg) => {
            return err(
                &req.id,
                "bad_params",
                msg,
                Some(json!({ "completion": current })),
            )
        }
    };

    let (c, t) = match update.units {
        Some((c, t)) => (Some(c), Some(t)),
        None => (None, None),
    };
    if let Err(e) = conn.execute(
        "UPDATE assignments
         SET completed_units = COALESCE(?1, completed_units),
             total_units = COALESCE(?2, total_units),
             is_done = COALESCE(?3, is_done),
             updated_at = ?4
         WHERE id = ?5",
        (c, t, update.is_done, now_ts(), &assignment_id),
    ) {
        return err(
            &req.id,
            "db_update_failed",
            e.to_string(),
            Some(json!({ "table": "assignments" })),
        );
    }

    let loaded = repo::load_assignment(conn, &assignment_id).and_then(|(student_id, a)| {
        let ability = repo::student_ability(conn, &student_id)?;
        let cfg = repo::load_calc_config(conn)?;
        Ok(assignment_json(&a, ability, &cfg))
    });
    match loaded {
        Ok(assignment) => ok(
            &req.id,
            json!({ "assignment": assignment, "clamped": update.clamped }),
        ),
        Err(e) => repo_err(req, e),
    }
}

fn handle_assignments_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match user_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let assignment_id = match required_str(req, "assignmentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match conn.execute("DELETE FROM assignments WHERE id = ?", [&assignment_id]) {
        Ok(0) => err(&req.id, "not_found", "assignment not found", None),
        Ok(_) => ok(&req.id, json!({ "ok": true })),
        Err(e) => err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "assignments" })),
        ),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "assignments.list" => Some(handle_assignments_list(state, req)),
        "assignments.upsert" => Some(handle_assignments_upsert(state, req)),
        "assignments.setProgress" => Some(handle_assignments_set_progress(state, req)),
        "assignments.delete" => Some(handle_assignments_delete(state, req)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_units_coerces_and_reports() {
        assert_eq!(normalize_units(3, 10), (3, 10, false));
        assert_eq!(normalize_units(3, 0), (1, 1, true));
        assert_eq!(normalize_units(12, 10), (10, 10, true));
        assert_eq!(normalize_units(-1, 4), (0, 4, true));
    }

    fn units(c: i64, t: i64) -> Completion {
        Completion::units(c, t)
    }

    #[test]
    fn resizing_keeps_recorded_progress() {
        let u = resolve_progress(&units(5, 10), None, Some(20), None).expect("resize");
        assert_eq!(u.units, Some((5, 20)));
        assert!(!u.clamped);

        let u = resolve_progress(&units(8, 10), None, Some(4), None).expect("shrink");
        assert_eq!(u.units, Some((4, 4)));
        assert!(u.clamped);
        assert_eq!(u.is_done, Some(true));
    }

    #[test]
    fn legacy_rows_need_a_total_for_unit_counts() {
        let legacy = Completion::Legacy {
            ratio: 0.1,
            is_done: false,
        };
        assert!(resolve_progress(&legacy, Some(3), None, None).is_err());

        let u = resolve_progress(&legacy, Some(3), Some(10), None).expect("switch");
        assert_eq!(u.units, Some((3, 10)));

        // A bare total carries the ratio over.
        let u = resolve_progress(&legacy, None, Some(20), None).expect("carry");
        assert_eq!(u.units, Some((2, 20)));

        let u = resolve_progress(&legacy, None, None, Some(true)).expect("done flag");
        assert_eq!(u.units, None);
        assert_eq!(u.is_done, Some(true));
    }

    #[test]
    fn done_flag_fills_unit_counts() {
        let u = resolve_progress(&units(0, 20), None, None, Some(true)).expect("done");
        assert_eq!(u.units, Some((20, 20)));
        assert_eq!(u.is_done, Some(true));

        assert!(resolve_progress(&units(20, 20), None, None, Some(false)).is_err());
        assert!(resolve_progress(&units(0, 20), Some(3), None, Some(true)).is_err());

        let u = resolve_progress(&units(20, 20), Some(7), None, Some(false)).expect("reopen");
        assert_eq!(u.units, Some((7, 20)));
        assert_eq!(u.is_done, Some(false));
    }
}
