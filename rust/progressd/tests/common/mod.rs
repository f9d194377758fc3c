#![allow(dead_code)]

use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

/// A running `progressd` with its pipes.
pub struct Sidecar {
    child: Child,
    stdin: Option<ChildStdin>,
    reader: BufReader<ChildStdout>,
    next_id: u64,
}

impl Sidecar {
    pub fn spawn() -> Self {
        let exe = env!("CARGO_BIN_EXE_progressd");
        let mut child = Command::new(exe)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn progressd");
        let stdin = child.stdin.take().expect("child stdin");
        let stdout = child.stdout.take().expect("child stdout");
        Self {
            child,
            stdin: Some(stdin),
            reader: BufReader::new(stdout),
            next_id: 0,
        }
    }

    pub fn send_line(&mut self, line: &str) -> serde_json::Value {
        let stdin = self.stdin.as_mut().expect("stdin open");
        writeln!(stdin, "{}", line).expect("write request");
        stdin.flush().expect("flush request");

        let mut out = String::new();
        self.reader.read_line(&mut out).expect("read response line");
        assert!(!out.trim().is_empty(), "empty response for {}", line);
        serde_json::from_str(out.trim()).expect("parse response json")
    }

    /// Full envelope, ok or not.
    pub fn call(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        self.next_id += 1;
        let id = self.next_id.to_string();
        let payload = json!({ "id": id, "method": method, "params": params });
        let resp = self.send_line(&payload.to_string());
        assert_eq!(resp.get("id").and_then(|v| v.as_str()), Some(id.as_str()));
        resp
    }

    /// The `result` of a call that must succeed.
    pub fn ok(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        let resp = self.call(method, params);
        assert_eq!(
            resp.get("ok").and_then(|v| v.as_bool()),
            Some(true),
            "{} failed: {}",
            method,
            resp
        );
        resp.get("result").cloned().unwrap_or(serde_json::Value::Null)
    }

    /// The error code of a call that must fail.
    pub fn err_code(&mut self, method: &str, params: serde_json::Value) -> String {
        let resp = self.call(method, params);
        assert_eq!(
            resp.get("ok").and_then(|v| v.as_bool()),
            Some(false),
            "{} unexpectedly succeeded: {}",
            method,
            resp
        );
        resp.pointer("/error/code")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string()
    }

    /// Select `workspace`, bootstrap an admin and log in as it.
    pub fn open_as_admin(&mut self, workspace: &std::path::Path) {
        self.ok(
            "workspace.select",
            json!({ "path": workspace.to_string_lossy() }),
        );
        self.ok(
            "users.create",
            json!({ "username": "admin", "password": "admin-pass" }),
        );
        self.ok(
            "session.login",
            json!({ "username": "admin", "password": "admin-pass" }),
        );
    }

    pub fn create_student(&mut self, name: &str, school: &str, grade: &str, dev: f64) -> String {
        let res = self.ok(
            "students.create",
            json!({ "name": name, "school": school, "grade": grade, "deviationValue": dev }),
        );
        res["studentId"].as_str().expect("studentId").to_string()
    }

    pub fn upsert_book(&mut self, params: serde_json::Value) -> String {
        let res = self.ok("assignments.upsert", params);
        res["assignmentId"].as_str().expect("assignmentId").to_string()
    }
}

impl Drop for Sidecar {
    fn drop(&mut self) {
        drop(self.stdin.take());
        let _ = self.child.wait();
    }
}

pub fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-6
}
