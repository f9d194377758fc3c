mod common;

use common::{temp_dir, Sidecar};
use serde_json::json;

#[test]
fn first_user_bootstraps_as_admin_and_later_users_need_one() {
    let workspace = temp_dir("progressd-auth-bootstrap");
    let mut sc = Sidecar::spawn();
    sc.ok(
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    // Asking for "user" during bootstrap still yields an admin.
    let first = sc.ok(
        "users.create",
        json!({ "username": "owner", "password": "pw1", "role": "user" }),
    );
    assert_eq!(first["role"], "admin");

    assert_eq!(
        sc.err_code(
            "users.create",
            json!({ "username": "intruder", "password": "pw" })
        ),
        "unauthenticated"
    );

    assert_eq!(
        sc.err_code(
            "session.login",
            json!({ "username": "owner", "password": "wrong" })
        ),
        "unauthenticated"
    );
    let login = sc.ok(
        "session.login",
        json!({ "username": "owner", "password": "pw1" }),
    );
    assert_eq!(login["user"]["role"], "admin");

    let staff = sc.ok(
        "users.create",
        json!({ "username": "tutor", "password": "pw2" }),
    );
    assert_eq!(staff["role"], "user");
    assert_eq!(
        sc.err_code(
            "users.create",
            json!({ "username": "tutor", "password": "again" })
        ),
        "conflict"
    );
    assert_eq!(
        sc.err_code(
            "users.create",
            json!({ "username": "x", "password": "pw", "role": "root" })
        ),
        "bad_params"
    );

    let users = sc.ok("users.list", json!({}));
    assert_eq!(users["users"].as_array().map(|a| a.len()), Some(2));

    drop(sc);
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn regular_users_are_kept_out_of_admin_methods() {
    let workspace = temp_dir("progressd-auth-roles");
    let bundle = workspace.join("denied.zip");
    let mut sc = Sidecar::spawn();
    sc.open_as_admin(&workspace);
    sc.ok(
        "users.create",
        json!({ "username": "tutor", "password": "pw" }),
    );
    let sid = sc.create_student("Aoi", "North", "10", 60.0);

    let out = sc.ok("session.logout", json!({}));
    assert_eq!(out["loggedOut"], true);
    sc.ok(
        "session.login",
        json!({ "username": "tutor", "password": "pw" }),
    );
    let me = sc.ok("session.whoami", json!({}));
    assert_eq!(me["user"]["username"], "tutor");
    assert_eq!(me["user"]["role"], "user");

    // Day-to-day work is allowed.
    sc.ok("students.list", json!({}));
    sc.ok("students.remove", json!({ "studentId": sid }));
    sc.ok("levels.get", json!({}));

    let denied = [
        ("users.list", json!({})),
        (
            "users.create",
            json!({ "username": "other", "password": "pw" }),
        ),
        ("students.delete", json!({ "studentId": sid })),
        (
            "levels.set",
            json!({ "config": { "levels": [{ "name": "X", "referenceAbility": 50 }] } }),
        ),
        (
            "workspace.exportBundle",
            json!({ "outPath": bundle.to_string_lossy() }),
        ),
        (
            "workspace.importBundle",
            json!({ "inPath": bundle.to_string_lossy() }),
        ),
    ];
    for (method, params) in denied {
        assert_eq!(sc.err_code(method, params), "forbidden", "{}", method);
    }

    drop(sc);
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn switching_workspace_drops_the_session() {
    let first = temp_dir("progressd-auth-ws1");
    let second = temp_dir("progressd-auth-ws2");
    let mut sc = Sidecar::spawn();
    sc.open_as_admin(&first);
    sc.ok("session.whoami", json!({}));

    sc.ok(
        "workspace.select",
        json!({ "path": second.to_string_lossy() }),
    );
    assert_eq!(sc.err_code("session.whoami", json!({})), "unauthenticated");

    drop(sc);
    let _ = std::fs::remove_dir_all(first);
    let _ = std::fs::remove_dir_all(second);
}
