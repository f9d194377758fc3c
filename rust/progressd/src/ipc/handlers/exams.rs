use crate::db::now_ts;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{optional_i64, optional_str, required_str, student_exists, user_conn};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use uuid::Uuid;

#[derive(Debug, PartialEq, thiserror::Error)]
enum ScoreError {
    #[error("score and maxScore must be finite numbers")]
    NotFinite,
    #[error("maxScore must be greater than 0")]
    BadMax,
    #[error("score must be between 0 and maxScore")]
    OutOfRange,
}

fn check_score(score: f64, max_score: f64) -> Result<(), ScoreError> {
    if !score.is_finite() || !max_score.is_finite() {
        return Err(ScoreError::NotFinite);
    }
    if max_score <= 0.0 {
        return Err(ScoreError::BadMax);
    }
    if !(0.0..=max_score).contains(&score) {
        return Err(ScoreError::OutOfRange);
    }
    Ok(())
}

fn handle_exams_list(state: &mut AppState, req: &Request) -> serde_json::Value {
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

    let mut stmt = match conn.prepare(
        "SELECT id, exam_name, exam_year, subject, score, max_score, created_at
         FROM exam_results
         WHERE student_id = ?1 AND (?2 IS NULL OR subject = ?2)
         ORDER BY exam_year DESC, exam_name, subject",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map((&student_id, subject.as_deref()), |r| {
            let id: String = r.get(0)?;
            let exam_name: String = r.get(1)?;
            let exam_year: Option<i64> = r.get(2)?;
            let subject: String = r.get(3)?;
            let score: f64 = r.get(4)?;
            let max_score: f64 = r.get(5)?;
            let created_at: String = r.get(6)?;
            let percent = if max_score > 0.0 {
                (100.0 * score / max_score).clamp(0.0, 100.0)
            } else {
                0.0
            };
            Ok(json!({
                "id": id,
                "examName": exam_name,
                "examYear": exam_year,
                "subject": subject,
                "score": score,
                "maxScore": max_score,
                "percent": percent,
                "createdAt": created_at
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(exams) => ok(&req.id, json!({ "exams": exams })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_exams_upsert(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match user_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let exam_name = match required_str(req, "examName") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let subject = match required_str(req, "subject") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let exam_year = match optional_i64(req, "examYear") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let (Some(score), Some(max_score)) = (
        req.params.get("score").and_then(|v| v.as_f64()),
        req.params.get("maxScore").and_then(|v| v.as_f64()),
    ) else {
        return err(&req.id, "bad_params", "missing score/maxScore", None);
    };
    if let Err(e) = check_score(score, max_score) {
        return err(
            &req.id,
            "bad_params",
            e.to_string(),
            Some(json!({ "score": score, "maxScore": max_score })),
        );
    }
    let exam_id = match optional_str(req, "examId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    if let Err(resp) = student_exists(conn, req, &student_id) {
        return resp;
    }

    match exam_id {
        Some(id) => match conn.execute(
            "UPDATE exam_results
             SET exam_name = ?, exam_year = ?, subject = ?, score = ?, max_score = ?
             WHERE id = ? AND student_id = ?",
            (&exam_name, exam_year, &subject, score, max_score, &id, &student_id),
        ) {
            Ok(0) => err(&req.id, "not_found", "exam result not found", None),
            Ok(_) => ok(&req.id, json!({ "examId": id, "created": false })),
            Err(e) => err(
                &req.id,
                "db_update_failed",
                e.to_string(),
                Some(json!({ "table": "exam_results" })),
            ),
        },
        None => {
            let id = Uuid::new_v4().to_string();
            match conn.execute(
                "INSERT INTO exam_results(
                   id, student_id, exam_name, exam_year, subject, score, max_score, created_at)
                 VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
                (
                    &id,
                    &student_id,
                    &exam_name,
                    exam_year,
                    &subject,
                    score,
                    max_score,
                    now_ts(),
                ),
            ) {
                Ok(_) => ok(&req.id, json!({ "examId": id, "created": true })),
                Err(e) => err(
                    &req.id,
                    "db_insert_failed",
                    e.to_string(),
                    Some(json!({ "table": "exam_results" })),
                ),
            }
        }
    }
}

fn handle_exams_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match user_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let exam_id = match required_str(req, "examId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match conn.execute("DELETE FROM exam_results WHERE id = ?", [&exam_id]) {
        Ok(0) => err(&req.id, "not_found", "exam result not found", None),
        Ok(_) => ok(&req.id, json!({ "ok": true })),
        Err(e) => err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "exam_results" })),
        ),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "exams.list" => Some(handle_exams_list(state, req)),
        "exams.upsert" => Some(handle_exams_upsert(state, req)),
        "exams.delete" => Some(handle_exams_delete(state, req)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_bounds() {
        assert_eq!(check_score(0.0, 100.0), Ok(()));
        assert_eq!(check_score(100.0, 100.0), Ok(()));
        assert_eq!(check_score(101.0, 100.0), Err(ScoreError::OutOfRange));
        assert_eq!(check_score(-1.0, 100.0), Err(ScoreError::OutOfRange));
        assert_eq!(check_score(5.0, 0.0), Err(ScoreError::BadMax));
        assert_eq!(check_score(f64::NAN, 100.0), Err(ScoreError::NotFinite));
    }

    #[test]
    fn score_errors_read_as_messages() {
        let e = check_score(5.0, -1.0).expect_err("negative max");
        assert_eq!(e.to_string(), "maxScore must be greater than 0");
        let e = check_score(f64::INFINITY, 10.0).expect_err("infinite score");
        assert_eq!(e.to_string(), "score and maxScore must be finite numbers");
    }
}
