use crate::db::now_ts;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{optional_str, required_str, student_exists, user_conn, HandlerResult};
use crate::ipc::types::{AppState, Request};
use chrono::NaiveDate;
use serde_json::json;
use uuid::Uuid;

const STATUSES: [&str; 3] = ["assigned", "submitted", "done"];

fn parse_status(req: &Request, raw: &str) -> HandlerResult<&'static str> {
    STATUSES
        .iter()
        .copied()
        .find(|s| *s == raw)
        .ok_or_else(|| {
            err(
                &req.id,
                "bad_params",
                "status must be one of: assigned, submitted, done",
                Some(json!({ "status": raw })),
            )
        })
}

/// ISO calendar date; stored normalized as `YYYY-MM-DD`.
fn parse_due_date(req: &Request, raw: &str) -> HandlerResult<String> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map(|d| d.format("%Y-%m-%d").to_string())
        .map_err(|_| {
            err(
                &req.id,
                "bad_params",
                "dueDate must be YYYY-MM-DD",
                Some(json!({ "dueDate": raw })),
            )
        })
}

fn handle_homework_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match user_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let status = match optional_str(req, "status") {
        Ok(Some(s)) => match parse_status(req, &s) {
            Ok(s) => Some(s),
            Err(resp) => return resp,
        },
        Ok(None) => None,
        Err(resp) => return resp,
    };

    let mut stmt = match conn.prepare(
        "SELECT id, subject, title, due_date, status, created_at, updated_at
         FROM homework
         WHERE student_id = ?1 AND (?2 IS NULL OR status = ?2)
         ORDER BY due_date IS NULL, due_date, title",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map((&student_id, status), |r| {
            let id: String = r.get(0)?;
            let subject: String = r.get(1)?;
            let title: String = r.get(2)?;
            let due_date: Option<String> = r.get(3)?;
            let status: String = r.get(4)?;
            let created_at: String = r.get(5)?;
            let updated_at: Option<String> = r.get(6)?;
            Ok(json!({
                "id": id,
                "subject": subject,
                "title": title,
                "dueDate": due_date,
                "status": status,
                "createdAt": created_at,
                "updatedAt": updated_at
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(homework) => ok(&req.id, json!({ "homework": homework })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

/// Without `homeworkId` this inserts; with it, the row is overwritten.
fn handle_homework_upsert(state: &mut AppState, req: &Request) -> serde_json::Value {
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
    let title = match required_str(req, "title") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let due_date = match optional_str(req, "dueDate") {
        Ok(Some(raw)) => match parse_due_date(req, &raw) {
            Ok(d) => Some(d),
            Err(resp) => return resp,
        },
        Ok(None) => None,
        Err(resp) => return resp,
    };
    let status = match optional_str(req, "status") {
        Ok(Some(s)) => match parse_status(req, &s) {
            Ok(s) => s,
            Err(resp) => return resp,
        },
        Ok(None) => "assigned",
        Err(resp) => return resp,
    };
    let homework_id = match optional_str(req, "homeworkId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    if let Err(resp) = student_exists(conn, req, &student_id) {
        return resp;
    }

    let ts = now_ts();
    match homework_id {
        Some(id) => {
            match conn.execute(
                "UPDATE homework
                 SET subject = ?, title = ?, due_date = ?, status = ?, updated_at = ?
                 WHERE id = ? AND student_id = ?",
                (&subject, &title, &due_date, status, &ts, &id, &student_id),
            ) {
                Ok(0) => err(&req.id, "not_found", "homework not found", None),
                Ok(_) => ok(&req.id, json!({ "homeworkId": id, "created": false })),
                Err(e) => err(
                    &req.id,
                    "db_update_failed",
                    e.to_string(),
                    Some(json!({ "table": "homework" })),
                ),
            }
        }
        None => {
            let id = Uuid::new_v4().to_string();
            match conn.execute(
                "INSERT INTO homework(id, student_id, subject, title, due_date, status, created_at)
                 VALUES(?, ?, ?, ?, ?, ?, ?)",
                (&id, &student_id, &subject, &title, &due_date, status, &ts),
            ) {
                Ok(_) => ok(&req.id, json!({ "homeworkId": id, "created": true })),
                Err(e) => err(
                    &req.id,
                    "db_insert_failed",
                    e.to_string(),
                    Some(json!({ "table": "homework" })),
                ),
            }
        }
    }
}

fn handle_homework_set_status(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match user_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let homework_id = match required_str(req, "homeworkId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let status = match required_str(req, "status") {
        Ok(raw) => match parse_status(req, &raw) {
            Ok(s) => s,
            Err(resp) => return resp,
        },
        Err(resp) => return resp,
    };
    match conn.execute(
        "UPDATE homework SET status = ?, updated_at = ? WHERE id = ?",
        (status, now_ts(), &homework_id),
    ) {
        Ok(0) => err(&req.id, "not_found", "homework not found", None),
        Ok(_) => ok(
            &req.id,
            json!({ "homeworkId": homework_id, "status": status }),
        ),
        Err(e) => err(
            &req.id,
            "db_update_failed",
            e.to_string(),
            Some(json!({ "table": "homework" })),
        ),
    }
}

fn handle_homework_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match user_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let homework_id = match required_str(req, "homeworkId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match conn.execute("DELETE FROM homework WHERE id = ?", [&homework_id]) {
        Ok(0) => err(&req.id, "not_found", "homework not found", None),
        Ok(_) => ok(&req.id, json!({ "ok": true })),
        Err(e) => err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "homework" })),
        ),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "homework.list" => Some(handle_homework_list(state, req)),
        "homework.upsert" => Some(handle_homework_upsert(state, req)),
        "homework.setStatus" => Some(handle_homework_set_status(state, req)),
        "homework.delete" => Some(handle_homework_delete(state, req)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req() -> Request {
        Request {
            id: "t".into(),
            method: "homework.upsert".into(),
            params: json!({}),
        }
    }

    #[test]
    fn due_dates_must_be_real_calendar_days() {
        let r = req();
        assert_eq!(parse_due_date(&r, "2026-02-28").ok().as_deref(), Some("2026-02-28"));
        assert!(parse_due_date(&r, "2026-02-30").is_err());
        assert!(parse_due_date(&r, "28/02/2026").is_err());
    }

    #[test]
    fn status_is_a_closed_set() {
        let r = req();
        assert_eq!(parse_status(&r, "submitted").ok(), Some("submitted"));
        let e = parse_status(&r, "late").expect_err("unknown status");
        assert_eq!(e["error"]["code"], "bad_params");
    }
}
