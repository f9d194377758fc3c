mod common;

use common::{approx, temp_dir, Sidecar};
use serde_json::json;

fn ids(v: &serde_json::Value) -> Vec<String> {
    let mut out: Vec<String> = v
        .as_array()
        .expect("id array")
        .iter()
        .filter_map(|x| x.as_str().map(str::to_string))
        .collect();
    out.sort();
    out
}

#[test]
fn preview_is_read_only_and_apply_matches_it() {
    let workspace = temp_dir("progressd-plan");
    let mut sc = Sidecar::spawn();
    sc.open_as_admin(&workspace);
    let sid = sc.create_student("Aoi", "North", "10", 60.0);

    let done = sc.upsert_book(json!({
        "studentId": sid, "subject": "Math", "curriculumLevel": "Tier-A",
        "bookName": "Done", "nominalDuration": 10.0,
        "completedUnits": 10, "totalUnits": 10
    }));
    let fresh = sc.upsert_book(json!({
        "studentId": sid, "subject": "Math", "curriculumLevel": "Tier-A",
        "bookName": "Fresh", "nominalDuration": 10.0,
        "completedUnits": 0, "totalUnits": 10
    }));
    let spare = sc.upsert_book(json!({
        "studentId": sid, "subject": "Math", "curriculumLevel": "Tier-A",
        "bookName": "Spare", "nominalDuration": 10.0, "isPlanned": false,
        "completedUnits": 10, "totalUnits": 10
    }));
    let english = sc.upsert_book(json!({
        "studentId": sid, "subject": "English", "curriculumLevel": "Tier-A",
        "bookName": "Reader", "nominalDuration": 10.0,
        "completedUnits": 0, "totalUnits": 10
    }));

    // Plan becomes {done, spare}: fresh drops out, spare comes in.
    let selection = json!({ "studentId": sid, "subject": "Math", "bookIds": [done, spare] });
    let preview = sc.ok("plan.preview", selection.clone());
    assert_eq!(ids(&preview["toPlan"]), vec![spare.clone()]);
    assert_eq!(ids(&preview["toUnplan"]), vec![fresh.clone()]);
    assert_eq!(ids(&preview["unchanged"]), vec![done.clone()]);
    assert!(approx(preview["achievementRateBefore"].as_f64().unwrap(), 50.0));
    assert!(approx(preview["achievementRateAfter"].as_f64().unwrap(), 100.0));

    // Nothing was written by the preview.
    let again = sc.ok("plan.preview", selection.clone());
    assert_eq!(ids(&again["toPlan"]), vec![spare.clone()]);

    let applied = sc.ok("plan.apply", selection.clone());
    assert_eq!(applied["planned"], 1);
    assert_eq!(applied["unplanned"], 1);
    assert_eq!(applied["unchanged"], 1);
    assert!(approx(applied["achievementRate"].as_f64().unwrap(), 100.0));

    let list = sc.ok("assignments.list", json!({ "studentId": sid }));
    for row in list["assignments"].as_array().unwrap() {
        let id = row["id"].as_str().unwrap();
        let expect_planned = id == done || id == spare || id == english;
        assert_eq!(row["isPlanned"].as_bool(), Some(expect_planned), "{}", id);
    }

    let settled = sc.ok("plan.preview", selection);
    assert!(ids(&settled["toPlan"]).is_empty());
    assert!(ids(&settled["toUnplan"]).is_empty());

    drop(sc);
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn unknown_book_ids_reject_the_whole_plan() {
    let workspace = temp_dir("progressd-plan-unknown");
    let mut sc = Sidecar::spawn();
    sc.open_as_admin(&workspace);
    let sid = sc.create_student("Aoi", "North", "10", 60.0);
    let math = sc.upsert_book(json!({
        "studentId": sid, "subject": "Math", "curriculumLevel": "Tier-A",
        "bookName": "Algebra", "nominalDuration": 10.0, "isPlanned": false
    }));
    let english = sc.upsert_book(json!({
        "studentId": sid, "subject": "English", "curriculumLevel": "Tier-A",
        "bookName": "Reader", "nominalDuration": 10.0
    }));

    // A book from another subject counts as unknown here.
    let resp = sc.call(
        "plan.apply",
        json!({ "studentId": sid, "subject": "Math", "bookIds": [math, english, "ghost"] }),
    );
    assert_eq!(resp["ok"], false);
    assert_eq!(resp["error"]["code"], "not_found");
    let mut missing = ids(&resp["error"]["details"]["bookIds"]);
    missing.sort();
    let mut expected = vec![english.clone(), "ghost".to_string()];
    expected.sort();
    assert_eq!(missing, expected);

    let list = sc.ok(
        "assignments.list",
        json!({ "studentId": sid, "subject": "Math" }),
    );
    assert_eq!(list["assignments"][0]["isPlanned"], false);

    assert_eq!(
        sc.err_code(
            "plan.preview",
            json!({ "studentId": sid, "subject": "Math", "bookIds": "x" })
        ),
        "bad_params"
    );
    assert_eq!(
        sc.err_code(
            "plan.preview",
            json!({ "studentId": "nobody", "subject": "Math", "bookIds": [] })
        ),
        "not_found"
    );

    drop(sc);
    let _ = std::fs::remove_dir_all(workspace);
}
