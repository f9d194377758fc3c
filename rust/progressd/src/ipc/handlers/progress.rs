use crate::calc;
use crate::config::CalcConfig;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{admin_conn, optional_str, repo_err, required_str, user_conn};
use crate::ipc::types::{AppState, Request};
use crate::repo;
use serde_json::json;
use tracing::info;

fn handle_progress_student(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match user_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let loaded = repo::load_student_snapshot(conn, &student_id).and_then(|snap| {
        let cfg = repo::load_calc_config(conn)?;
        Ok((snap, cfg))
    });
    let (snap, cfg) = match loaded {
        Ok(v) => v,
        Err(e) => return repo_err(req, e),
    };

    let progress = calc::student_progress(&snap, &cfg);
    match serde_json::to_value(&progress) {
        Ok(mut v) => {
            if let Some(obj) = v.as_object_mut() {
                obj.insert("name".into(), json!(snap.name));
            }
            ok(&req.id, v)
        }
        Err(e) => err(&req.id, "bad_config", e.to_string(), None),
    }
}

fn handle_stats_level_reach(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match user_conn(state, req) {
        Ok(c) => c,
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
    let subject = match required_str(req, "subject") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let loaded = repo::load_cohort_snapshots(conn, &school, grade.as_deref()).and_then(|cohort| {
        let cfg = repo::load_calc_config(conn)?;
        Ok((cohort, cfg))
    });
    match loaded {
        Ok((cohort, cfg)) => {
            let levels = calc::level_reach_counts(&cohort, &subject, &cfg);
            ok(
                &req.id,
                json!({
                    "school": school,
                    "grade": grade,
                    "subject": subject,
                    "studentCount": cohort.len(),
                    "levels": levels,
                }),
            )
        }
        Err(e) => repo_err(req, e),
    }
}

fn handle_levels_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match user_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    match repo::load_calc_config(conn) {
        Ok(cfg) => ok(&req.id, json!({ "config": cfg })),
        Err(e) => repo_err(req, e),
    }
}

fn handle_levels_set(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match admin_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let Some(raw) = req.params.get("config") else {
        return err(&req.id, "bad_params", "missing config", None);
    };
    let cfg: CalcConfig = match serde_json::from_value(raw.clone()) {
        Ok(c) => c,
        Err(e) => return err(&req.id, "bad_config", e.to_string(), None),
    };

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    if let Err(e) = repo::save_calc_config(&tx, &cfg) {
        let _ = tx.rollback();
        return repo_err(req, e);
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_tx_failed", e.to_string(), None);
    }

    info!(levels = cfg.levels.len(), slope = cfg.ability_slope, "calc config saved");
    ok(&req.id, json!({ "config": cfg }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "progress.student" => Some(handle_progress_student(state, req)),
        "stats.levelReach" => Some(handle_stats_level_reach(state, req)),
        "levels.get" => Some(handle_levels_get(state, req)),
        "levels.set" => Some(handle_levels_set(state, req)),
        _ => None,
    }
}
