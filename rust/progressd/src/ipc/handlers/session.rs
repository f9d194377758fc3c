use crate::auth::{self, Role};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{admin_conn, auth_err, db_conn, required_str, session_user};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use tracing::info;

fn handle_login(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let username = match required_str(req, "username") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Some(password) = req.params.get("password").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing password", None);
    };

    match auth::verify_login(conn, &username, password) {
        Ok(user) => {
            info!(username = %user.username, role = user.role.as_str(), "login");
            let result = json!({ "user": user });
            state.session = Some(user);
            ok(&req.id, result)
        }
        Err(e) => auth_err(req, e),
    }
}

fn handle_logout(state: &mut AppState, req: &Request) -> serde_json::Value {
    let was_logged_in = state.session.take().is_some();
    ok(&req.id, json!({ "loggedOut": was_logged_in }))
}

fn handle_whoami(state: &mut AppState, req: &Request) -> serde_json::Value {
    match session_user(state, req) {
        Ok(user) => ok(&req.id, json!({ "user": user })),
        Err(resp) => resp,
    }
}

/// The first account in a workspace can be created without a session and is
/// always an admin; after that only admins may add accounts.
fn handle_users_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let bootstrap = match auth::user_count(conn) {
        Ok(n) => n == 0,
        Err(e) => return auth_err(req, e),
    };
    if !bootstrap {
        if let Err(resp) = admin_conn(state, req) {
            return resp;
        }
    }

    let username = match required_str(req, "username") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let password = match req.params.get("password").and_then(|v| v.as_str()) {
        Some(p) if !p.is_empty() => p,
        _ => return err(&req.id, "bad_params", "password must not be empty", None),
    };
    let role = if bootstrap {
        Role::Admin
    } else {
        match req.params.get("role").and_then(|v| v.as_str()) {
            None => Role::User,
            Some(s) => match Role::parse(s) {
                Some(r) => r,
                None => {
                    return err(
                        &req.id,
                        "bad_params",
                        "role must be one of: admin, user",
                        Some(json!({ "role": s })),
                    )
                }
            },
        }
    };

    match auth::create_user(conn, &username, password, role) {
        Ok(user_id) => {
            info!(username = %username, role = role.as_str(), bootstrap, "user created");
            ok(
                &req.id,
                json!({ "userId": user_id, "username": username, "role": role }),
            )
        }
        Err(e) => auth_err(req, e),
    }
}

fn handle_users_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match admin_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let mut stmt = match conn.prepare(
        "SELECT id, username, role, created_at FROM users ORDER BY username",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([], |r| {
            let id: String = r.get(0)?;
            let username: String = r.get(1)?;
            let role: String = r.get(2)?;
            let created_at: String = r.get(3)?;
            Ok(json!({
                "id": id,
                "username": username,
                "role": role,
                "createdAt": created_at
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(users) => ok(&req.id, json!({ "users": users })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "session.login" => Some(handle_login(state, req)),
        "session.logout" => Some(handle_logout(state, req)),
        "session.whoami" => Some(handle_whoami(state, req)),
        "users.create" => Some(handle_users_create(state, req)),
        "users.list" => Some(handle_users_list(state, req)),
        _ => None,
    }
}
