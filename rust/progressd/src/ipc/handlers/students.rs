use crate::db::now_ts;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    admin_conn, optional_bool, optional_f64, optional_str, required_str, student_exists,
    user_conn,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::types::Value;
use rusqlite::params_from_iter;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match user_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let school = match optional_str(req, "school") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let grade = match optional_str(req, "grade") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let include_removed = match optional_bool(req, "includeRemoved") {
        Ok(v) => v.unwrap_or(false),
        Err(resp) => return resp,
    };

    let mut stmt = match conn.prepare(
        "SELECT
           s.id, s.name, s.school, s.grade, s.deviation_value, s.active,
           (SELECT COUNT(*) FROM assignments a WHERE a.student_id = s.id AND a.is_planned = 1)
             AS planned_count
         FROM students s
         WHERE (?1 IS NULL OR s.school = ?1)
           AND (?2 IS NULL OR s.grade = ?2)
           AND (?3 = 1 OR s.active = 1)
         ORDER BY s.school, s.grade, s.name",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map((school.as_deref(), grade.as_deref(), include_removed), |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let school: String = row.get(2)?;
            let grade: Option<String> = row.get(3)?;
            let deviation_value: Option<f64> = row.get(4)?;
            let active: i64 = row.get(5)?;
            let planned_count: i64 = row.get(6)?;
            Ok(json!({
                "id": id,
                "name": name,
                "school": school,
                "grade": grade,
                "deviationValue": deviation_value,
                "active": active != 0,
                "plannedBookCount": planned_count
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(students) => ok(&req.id, json!({ "students": students })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_students_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match user_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let school = match required_str(req, "school") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let grade = match optional_str(req, "grade") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let deviation_value = match optional_f64(req, "deviationValue") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let student_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO students(id, name, school, grade, deviation_value, active, created_at)
         VALUES(?, ?, ?, ?, ?, 1, ?)",
        (&student_id, &name, &school, &grade, deviation_value, now_ts()),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "students" })),
        );
    }

    ok(&req.id, json!({ "studentId": student_id, "name": name }))
}

fn handle_students_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match user_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Some(patch) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "missing/invalid patch", None);
    };
    if let Err(resp) = student_exists(conn, req, &student_id) {
        return resp;
    }

    let mut set_parts: Vec<&str> = Vec::new();
    let mut bind_values: Vec<Value> = Vec::new();

    if let Some(v) = patch.get("name") {
        let Some(s) = v.as_str().map(str::trim).filter(|s| !s.is_empty()) else {
            return err(&req.id, "bad_params", "patch.name must be a non-empty string", None);
        };
        set_parts.push("name = ?");
        bind_values.push(Value::Text(s.to_string()));
    }
    if let Some(v) = patch.get("school") {
        let Some(s) = v.as_str().map(str::trim).filter(|s| !s.is_empty()) else {
            return err(&req.id, "bad_params", "patch.school must be a non-empty string", None);
        };
        set_parts.push("school = ?");
        bind_values.push(Value::Text(s.to_string()));
    }
    if let Some(v) = patch.get("grade") {
        if v.is_null() {
            set_parts.push("grade = NULL");
        } else if let Some(s) = v.as_str() {
            set_parts.push("grade = ?");
            bind_values.push(Value::Text(s.trim().to_string()));
        } else {
            return err(&req.id, "bad_params", "patch.grade must be a string or null", None);
        }
    }
    if let Some(v) = patch.get("deviationValue") {
        if v.is_null() {
            set_parts.push("deviation_value = NULL");
        } else if let Some(f) = v.as_f64().filter(|f| f.is_finite()) {
            set_parts.push("deviation_value = ?");
            bind_values.push(Value::Real(f));
        } else {
            return err(
                &req.id,
                "bad_params",
                "patch.deviationValue must be a number or null",
                None,
            );
        }
    }

    if set_parts.is_empty() {
        return err(
            &req.id,
            "bad_params",
            "patch must include at least one field",
            None,
        );
    }
    set_parts.push("updated_at = ?");
    bind_values.push(Value::Text(now_ts()));
    bind_values.push(Value::Text(student_id.clone()));

    let sql = format!("UPDATE students SET {} WHERE id = ?", set_parts.join(", "));
    if let Err(e) = conn.execute(&sql, params_from_iter(bind_values)) {
        return err(
            &req.id,
            "db_update_failed",
            e.to_string(),
            Some(json!({ "table": "students" })),
        );
    }

    ok(&req.id, json!({ "ok": true }))
}

fn set_active(state: &mut AppState, req: &Request, active: bool) -> serde_json::Value {
    let conn = match user_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match conn.execute(
        "UPDATE students SET active = ?, updated_at = ? WHERE id = ?",
        (active as i64, now_ts(), &student_id),
    ) {
        Ok(0) => err(&req.id, "not_found", "student not found", None),
        Ok(_) => ok(&req.id, json!({ "studentId": student_id, "active": active })),
        Err(e) => err(
            &req.id,
            "db_update_failed",
            e.to_string(),
            Some(json!({ "table": "students" })),
        ),
    }
}

/// Physical delete. Dependents go first; there is no ON DELETE CASCADE.
fn handle_students_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match admin_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    if let Err(resp) = student_exists(conn, req, &student_id) {
        return resp;
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };

    for table in ["assignments", "homework", "exam_results"] {
        let sql = format!("DELETE FROM {} WHERE student_id = ?", table);
        if let Err(e) = tx.execute(&sql, [&student_id]) {
            let _ = tx.rollback();
            return err(
                &req.id,
                "db_delete_failed",
                e.to_string(),
                Some(json!({ "table": table })),
            );
        }
    }
    if let Err(e) = tx.execute("DELETE FROM students WHERE id = ?", [&student_id]) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "students" })),
        );
    }

    if let Err(e) = tx.commit() {
        return err(&req.id, "db_tx_failed", e.to_string(), None);
    }
    info!(student_id = %student_id, "student deleted");
    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(handle_students_list(state, req)),
        "students.create" => Some(handle_students_create(state, req)),
        "students.update" => Some(handle_students_update(state, req)),
        "students.remove" => Some(set_active(state, req, false)),
        "students.restore" => Some(set_active(state, req, true)),
        "students.delete" => Some(handle_students_delete(state, req)),
        _ => None,
    }
}
