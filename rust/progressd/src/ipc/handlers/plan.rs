use crate::calc;
use crate::config::CalcConfig;
use crate::db::now_ts;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{repo_err, required_str, user_conn};
use crate::ipc::types::{AppState, Request};
use crate::model::TextbookAssignment;
use crate::repo;
use rusqlite::Connection;
use serde_json::json;
use std::collections::HashSet;
use tracing::info;

#[derive(Debug, Default, PartialEq)]
struct PlanDiff {
    to_plan: Vec<String>,
    to_unplan: Vec<String>,
    unchanged: Vec<String>,
}

/// Books named in `selected` end up planned; every other book in the subject
/// ends up unplanned.
fn plan_diff(rows: &[TextbookAssignment], selected: &HashSet<String>) -> PlanDiff {
    let mut diff = PlanDiff::default();
    for a in rows {
        let want = selected.contains(&a.id);
        match (a.is_planned, want) {
            (false, true) => diff.to_plan.push(a.id.clone()),
            (true, false) => diff.to_unplan.push(a.id.clone()),
            _ => diff.unchanged.push(a.id.clone()),
        }
    }
    diff
}

fn with_selection(rows: &[TextbookAssignment], selected: &HashSet<String>) -> Vec<TextbookAssignment> {
    rows.iter()
        .cloned()
        .map(|mut a| {
            a.is_planned = selected.contains(&a.id);
            a
        })
        .collect()
}

struct PlanInput {
    student_id: String,
    subject: String,
    selected: HashSet<String>,
}

fn read_plan_input(req: &Request) -> Result<PlanInput, serde_json::Value> {
    let student_id = required_str(req, "studentId")?;
    let subject = required_str(req, "subject")?;
    let Some(raw) = req.params.get("bookIds").and_then(|v| v.as_array()) else {
        return Err(err(&req.id, "bad_params", "missing bookIds[]", None));
    };
    let mut selected = HashSet::new();
    for v in raw {
        let Some(id) = v.as_str().map(str::trim).filter(|s| !s.is_empty()) else {
            return Err(err(
                &req.id,
                "bad_params",
                "bookIds must contain only non-empty strings",
                None,
            ));
        };
        selected.insert(id.to_string());
    }
    Ok(PlanInput {
        student_id,
        subject,
        selected,
    })
}

struct PlanContext {
    rows: Vec<TextbookAssignment>,
    ability: Option<f64>,
    cfg: CalcConfig,
}

fn load_plan_context(
    conn: &Connection,
    req: &Request,
    input: &PlanInput,
) -> Result<PlanContext, serde_json::Value> {
    let ability = repo::student_ability(conn, &input.student_id).map_err(|e| repo_err(req, e))?;
    let cfg = repo::load_calc_config(conn).map_err(|e| repo_err(req, e))?;
    let rows = repo::load_assignments(conn, &input.student_id, Some(&input.subject))
        .map_err(|e| repo_err(req, e))?;

    let known: HashSet<&str> = rows.iter().map(|a| a.id.as_str()).collect();
    let mut unknown: Vec<&str> = input
        .selected
        .iter()
        .map(String::as_str)
        .filter(|id| !known.contains(id))
        .collect();
    if !unknown.is_empty() {
        unknown.sort_unstable();
        return Err(err(
            &req.id,
            "not_found",
            "bookIds not found in this student's subject",
            Some(json!({ "bookIds": unknown })),
        ));
    }
    Ok(PlanContext { rows, ability, cfg })
}

fn handle_plan_preview(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match user_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let input = match read_plan_input(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let ctx = match load_plan_context(conn, req, &input) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let diff = plan_diff(&ctx.rows, &input.selected);
    let projected = with_selection(&ctx.rows, &input.selected);
    ok(
        &req.id,
        json!({
            "studentId": input.student_id,
            "subject": input.subject,
            "toPlan": diff.to_plan,
            "toUnplan": diff.to_unplan,
            "unchanged": diff.unchanged,
            "achievementRateBefore": calc::achievement_rate(&ctx.rows, ctx.ability, &ctx.cfg),
            "achievementRateAfter": calc::achievement_rate(&projected, ctx.ability, &ctx.cfg),
        }),
    )
}

fn handle_plan_apply(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match user_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let input = match read_plan_input(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let ctx = match load_plan_context(conn, req, &input) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let diff = plan_diff(&ctx.rows, &input.selected);

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    let ts = now_ts();
    for (ids, planned) in [(&diff.to_plan, true), (&diff.to_unplan, false)] {
        for id in ids {
            if let Err(e) = tx.execute(
                "UPDATE assignments SET is_planned = ?, updated_at = ? WHERE id = ?",
                (planned, &ts, id),
            ) {
                let _ = tx.rollback();
                return err(
                    &req.id,
                    "db_update_failed",
                    e.to_string(),
                    Some(json!({ "table": "assignments", "assignmentId": id })),
                );
            }
        }
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_tx_failed", e.to_string(), None);
    }

    info!(
        student_id = %input.student_id,
        subject = %input.subject,
        planned = diff.to_plan.len(),
        unplanned = diff.to_unplan.len(),
        "plan updated"
    );
    let applied = with_selection(&ctx.rows, &input.selected);
    ok(
        &req.id,
        json!({
            "planned": diff.to_plan.len(),
            "unplanned": diff.to_unplan.len(),
            "unchanged": diff.unchanged.len(),
            "achievementRate": calc::achievement_rate(&applied, ctx.ability, &ctx.cfg),
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "plan.preview" => Some(handle_plan_preview(state, req)),
        "plan.apply" => Some(handle_plan_apply(state, req)),
        _ => None,
    }
}
