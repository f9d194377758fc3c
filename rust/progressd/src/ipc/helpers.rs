use crate::auth::{self, AuthError, SessionUser};
use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request};
use crate::repo::RepoError;
use rusqlite::Connection;

pub type HandlerResult<T> = Result<T, serde_json::Value>;

pub fn repo_err(req: &Request, e: RepoError) -> serde_json::Value {
    err(&req.id, e.code(), e.to_string(), None)
}

pub fn auth_err(req: &Request, e: AuthError) -> serde_json::Value {
    err(&req.id, e.code(), e.to_string(), None)
}

pub fn db_conn<'a>(state: &'a AppState, req: &Request) -> HandlerResult<&'a Connection> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

/// Open workspace plus any logged-in user.
pub fn user_conn<'a>(state: &'a AppState, req: &Request) -> HandlerResult<&'a Connection> {
    let conn = db_conn(state, req)?;
    auth::require_user(state.session.as_ref()).map_err(|e| auth_err(req, e))?;
    Ok(conn)
}

pub fn admin_conn<'a>(state: &'a AppState, req: &Request) -> HandlerResult<&'a Connection> {
    let conn = db_conn(state, req)?;
    auth::require_admin(state.session.as_ref()).map_err(|e| auth_err(req, e))?;
    Ok(conn)
}

pub fn session_user<'a>(state: &'a AppState, req: &Request) -> HandlerResult<&'a SessionUser> {
    auth::require_user(state.session.as_ref()).map_err(|e| auth_err(req, e))
}

/// Trimmed, non-empty string param.
pub fn required_str(req: &Request, key: &str) -> HandlerResult<String> {
    let Some(v) = req.params.get(key).and_then(|v| v.as_str()) else {
        return Err(err(&req.id, "bad_params", format!("missing {}", key), None));
    };
    let t = v.trim();
    if t.is_empty() {
        return Err(err(
            &req.id,
            "bad_params",
            format!("{} must not be empty", key),
            None,
        ));
    }
    Ok(t.to_string())
}

/// Absent or null reads as None; a blank string also reads as None.
pub fn optional_str(req: &Request, key: &str) -> HandlerResult<Option<String>> {
    match req.params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => match v.as_str() {
            Some(s) if s.trim().is_empty() => Ok(None),
            Some(s) => Ok(Some(s.trim().to_string())),
            None => Err(err(
                &req.id,
                "bad_params",
                format!("{} must be a string or null", key),
                None,
            )),
        },
    }
}

pub fn optional_f64(req: &Request, key: &str) -> HandlerResult<Option<f64>> {
    match req.params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => match v.as_f64() {
            Some(f) if f.is_finite() => Ok(Some(f)),
            _ => Err(err(
                &req.id,
                "bad_params",
                format!("{} must be a number or null", key),
                None,
            )),
        },
    }
}

pub fn optional_i64(req: &Request, key: &str) -> HandlerResult<Option<i64>> {
    match req.params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => v.as_i64().map(Some).ok_or_else(|| {
            err(
                &req.id,
                "bad_params",
                format!("{} must be an integer or null", key),
                None,
            )
        }),
    }
}

pub fn optional_bool(req: &Request, key: &str) -> HandlerResult<Option<bool>> {
    match req.params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => v.as_bool().map(Some).ok_or_else(|| {
            err(
                &req.id,
                "bad_params",
                format!("{} must be a boolean", key),
                None,
            )
        }),
    }
}

pub fn student_exists(conn: &Connection, req: &Request, student_id: &str) -> HandlerResult<()> {
    use rusqlite::OptionalExtension;
    let found: Option<i64> = conn
        .query_row("SELECT 1 FROM students WHERE id = ?", [student_id], |r| {
            r.get(0)
        })
        .optional()
        .map_err(|e| err(&req.id, "db_query_failed", e.to_string(), None))?;
    if found.is_none() {
        return Err(err(&req.id, "not_found", "student not found", None));
    }
    Ok(())
}
