use crate::config::CalcConfig;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{admin_conn, required_str};
use crate::ipc::types::{AppState, Request};
use crate::{backup, db, repo};
use rusqlite::Connection;
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const LEVELS_FILE: &str = "curriculum_levels.json";

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string())
        }),
    )
}

/// Best-effort: seed the level table from a `curriculum_levels.json` dropped
/// into the workspace folder. Never blocks the workspace from opening.
fn import_levels_file(conn: &Connection, workspace: &Path) {
    let path = workspace.join(LEVELS_FILE);
    if !path.is_file() {
        return;
    }
    match repo::has_stored_calc_config(conn) {
        Ok(false) => {}
        Ok(true) => return,
        Err(e) => {
            warn!(error = %e, "could not check stored calc config");
            return;
        }
    }
    let parsed = std::fs::read_to_string(&path)
        .map_err(anyhow::Error::from)
        .and_then(|text| CalcConfig::from_json_str(&text));
    match parsed {
        Ok(cfg) => match repo::save_calc_config(conn, &cfg) {
            Ok(()) => info!(levels = cfg.levels.len(), "imported {}", LEVELS_FILE),
            Err(e) => warn!(error = %e, "failed to store imported levels"),
        },
        Err(e) => warn!(error = %e, "ignoring unreadable {}", LEVELS_FILE),
    }
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let path = match required_str(req, "path") {
        Ok(v) => PathBuf::from(v),
        Err(resp) => return resp,
    };

    match db::open_db(&path) {
        Ok(conn) => {
            import_levels_file(&conn, &path);
            info!(workspace = %path.to_string_lossy(), "workspace opened");
            state.workspace = Some(path.clone());
            state.db = Some(conn);
            // Users live in the workspace database; a new workspace means a new login.
            state.session = None;
            ok(&req.id, json!({ "workspacePath": path.to_string_lossy() }))
        }
        Err(e) => err(&req.id, "db_open_failed", format!("{e:?}"), None),
    }
}

fn handle_export_bundle(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(resp) = admin_conn(state, req) {
        return resp;
    }
    let Some(workspace) = state.workspace.clone() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let out_path = match required_str(req, "outPath") {
        Ok(v) => PathBuf::from(v),
        Err(resp) => return resp,
    };

    match backup::export_workspace_bundle(&workspace, &out_path) {
        Ok(summary) => ok(
            &req.id,
            json!({
                "outPath": out_path.to_string_lossy(),
                "bundleFormat": summary.bundle_format,
                "entryCount": summary.entry_count,
                "dbSha256": summary.db_sha256,
            }),
        ),
        Err(e) => err(&req.id, "io_failed", format!("{e:#}"), None),
    }
}

fn handle_import_bundle(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(resp) = admin_conn(state, req) {
        return resp;
    }
    let Some(workspace) = state.workspace.clone() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let in_path = match required_str(req, "inPath") {
        Ok(v) => PathBuf::from(v),
        Err(resp) => return resp,
    };

    // Release the handle so the database file can be swapped.
    state.db = None;
    let imported = backup::import_workspace_bundle(&in_path, &workspace);
    let reopened = db::open_db(&workspace);

    match (imported, reopened) {
        (Ok(summary), Ok(conn)) => {
            info!(bundle = %in_path.to_string_lossy(), "workspace bundle imported");
            state.db = Some(conn);
            // The imported user table may not contain the current user.
            state.session = None;
            ok(
                &req.id,
                json!({
                    "workspacePath": workspace.to_string_lossy(),
                    "bundleFormatDetected": summary.bundle_format_detected,
                    "dbSha256": summary.db_sha256,
                }),
            )
        }
        (Err(e), Ok(conn)) => {
            state.db = Some(conn);
            err(&req.id, "io_failed", format!("{e:#}"), None)
        }
        (_, Err(e)) => {
            state.workspace = None;
            state.session = None;
            err(&req.id, "db_open_failed", format!("{e:#}"), None)
        }
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        "workspace.exportBundle" => Some(handle_export_bundle(state, req)),
        "workspace.importBundle" => Some(handle_import_bundle(state, req)),
        _ => None,
    }
}
