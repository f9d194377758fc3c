use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "user" => Some(Role::User),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    pub user_id: String,
    pub username: String,
    pub role: Role,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("log in first")]
    Unauthenticated,
    #[error("admin role required")]
    Forbidden,
    #[error("invalid username or password")]
    BadCredentials,
    #[error("username already exists: {0}")]
    UsernameTaken(String),
    #[error(transparent)]
    Sql(#[from] rusqlite::Error),
}

impl AuthError {
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::Unauthenticated | AuthError::BadCredentials => "unauthenticated",
            AuthError::Forbidden => "forbidden",
            AuthError::UsernameTaken(_) => "conflict",
            AuthError::Sql(_) => "db_query_failed",
        }
    }
}

fn hash_password(salt: &str, password: &str) -> String {
    let mut h = Sha256::new();
    h.update(salt.as_bytes());
    h.update(b":");
    h.update(password.as_bytes());
    h.finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

pub fn user_count(conn: &Connection) -> Result<i64, AuthError> {
    Ok(conn.query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0))?)
}

pub fn create_user(
    conn: &Connection,
    username: &str,
    password: &str,
    role: Role,
) -> Result<String, AuthError> {
    let exists: Option<i64> = conn
        .query_row("SELECT 1 FROM users WHERE username = ?", [username], |r| {
            r.get(0)
        })
        .optional()?;
    if exists.is_some() {
        return Err(AuthError::UsernameTaken(username.to_string()));
    }

    let user_id = Uuid::new_v4().to_string();
    let salt = Uuid::new_v4().simple().to_string();
    conn.execute(
        "INSERT INTO users(id, username, role, password_hash, salt, created_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            &user_id,
            username,
            role.as_str(),
            hash_password(&salt, password),
            &salt,
            crate::db::now_ts(),
        ),
    )?;
    Ok(user_id)
}

pub fn verify_login(
    conn: &Connection,
    username: &str,
    password: &str,
) -> Result<SessionUser, AuthError> {
    let row: Option<(String, String, String, String)> = conn
        .query_row(
            "SELECT id, role, password_hash, salt FROM users WHERE username = ?",
            [username],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
        )
        .optional()?;
    let Some((user_id, role, stored_hash, salt)) = row else {
        return Err(AuthError::BadCredentials);
    };
    if hash_password(&salt, password) != stored_hash {
        return Err(AuthError::BadCredentials);
    }
    Ok(SessionUser {
        user_id,
        username: username.to_string(),
        role: Role::parse(&role).unwrap_or(Role::User),
    })
}

pub fn require_user(session: Option<&SessionUser>) -> Result<&SessionUser, AuthError> {
    session.ok_or(AuthError::Unauthenticated)
}

pub fn require_admin(session: Option<&SessionUser>) -> Result<&SessionUser, AuthError> {
    let user = require_user(session)?;
    if user.role != Role::Admin {
        return Err(AuthError::Forbidden);
    }
    Ok(user)
}
