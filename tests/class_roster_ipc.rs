use rusqlite::Connection;
use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}-{}",
        prefix,
        std::process::id(),
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_schoold");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn schoold");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_default()
}

fn open_workspace_db(workspace: &Path) -> Connection {
    Connection::open(workspace.join("school.sqlite3")).expect("open workspace db")
}

fn select_workspace(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    workspace: &Path,
) {
    request_ok(
        stdin,
        reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
}

fn new_pupil(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    email: &str,
) -> i64 {
    let created = request_ok(
        stdin,
        reader,
        id,
        "users.register",
        json!({
            "email": email,
            "passwordHash": "h",
            "name": "Мария",
            "surname": email,
            "role": "STUDENT",
        }),
    );
    created["pupilId"].as_i64().expect("pupil id")
}

fn ids_of(list: &serde_json::Value) -> Vec<i64> {
    let mut ids: Vec<i64> = list
        .as_array()
        .expect("array")
        .iter()
        .map(|p| p["id"].as_i64().expect("id"))
        .collect();
    ids.sort();
    ids
}

#[test]
fn roster_replacement_is_total() {
    let workspace = temp_dir("schoold-roster");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, &workspace);

    let p1 = new_pupil(&mut stdin, &mut reader, "1", "p1@school.ru");
    let p2 = new_pupil(&mut stdin, &mut reader, "2", "p2@school.ru");
    let p3 = new_pupil(&mut stdin, &mut reader, "3", "p3@school.ru");
    let class = request_ok(&mut stdin, &mut reader, "4", "classes.create", json!({ "name": "5B" }));
    let class_id = class["class"]["id"].as_i64().expect("class id");

    request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "classes.assignStudents",
        json!({ "classId": class_id, "pupilIds": [p1, p3] }),
    );
    let replaced = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "classes.assignStudents",
        json!({ "classId": class_id.to_string(), "pupilIds": [p1, p2.to_string()] }),
    );
    let mut expected = vec![p1, p2];
    expected.sort();
    assert_eq!(ids_of(&replaced["pupils"]), expected);

    let fetched = request_ok(&mut stdin, &mut reader, "7", "classes.get", json!({ "classId": class_id }));
    assert_eq!(ids_of(&fetched["class"]["pupils"]), expected);

    let db = open_workspace_db(&workspace);
    let p3_class: Option<i64> = db
        .query_row("SELECT class_id FROM pupils WHERE id = ?", [p3], |r| r.get(0))
        .expect("p3");
    assert_eq!(p3_class, None);

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn class_teacher_reference_and_patch_semantics() {
    let workspace = temp_dir("schoold-class-teacher");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, &workspace);

    let dangling = request(
        &mut stdin,
        &mut reader,
        "1",
        "classes.create",
        json!({ "name": "6A", "classTeacher": 999 }),
    );
    assert_eq!(dangling["error"]["code"], json!("not_found"));
    assert_eq!(dangling["error"]["details"]["entity"], json!("reference"));

    let teacher = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "users.register",
        json!({
            "email": "homeroom@school.ru",
            "passwordHash": "h",
            "name": "Olga",
            "surname": "Smirnova",
            "role": "TEACHER",
        }),
    );
    let teacher_id = teacher["teacherId"].as_i64().expect("teacher id");
    let class = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "classes.create",
        json!({ "name": "6A", "classTeacher": teacher_id }),
    );
    let class_id = class["class"]["id"].as_i64().expect("class id");
    assert_eq!(class["class"]["teacher"]["user"]["surname"], json!("Smirnova"));

    let renamed = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "classes.update",
        json!({ "classId": class_id, "patch": { "name": "6B" } }),
    );
    assert_eq!(renamed["class"]["name"], json!("6B"));
    assert_eq!(renamed["class"]["classTeacherId"].as_i64(), Some(teacher_id));

    let cleared = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "classes.update",
        json!({ "classId": class_id, "patch": { "classTeacher": null } }),
    );
    assert!(cleared["class"]["teacher"].is_null());

    request_ok(&mut stdin, &mut reader, "6", "classes.delete", json!({ "classId": class_id }));
    let gone = request(&mut stdin, &mut reader, "7", "classes.get", json!({ "classId": class_id }));
    assert_eq!(gone["error"]["code"], json!("not_found"));
    assert_eq!(gone["error"]["details"], json!({ "entity": "class", "id": class_id }));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn malformed_ids_are_rejected_before_the_store() {
    let workspace = temp_dir("schoold-bad-ids");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, &workspace);

    for (i, bad) in [json!("abc"), json!(0), json!(-4), json!(2.5), json!(null)].iter().enumerate() {
        let resp = request(
            &mut stdin,
            &mut reader,
            &format!("b{}", i),
            "classes.get",
            json!({ "classId": bad }),
        );
        assert_eq!(resp["error"]["code"], json!("bad_params"), "for {}", bad);
    }

    let resp = request(
        &mut stdin,
        &mut reader,
        "list",
        "classes.assignStudents",
        json!({ "classId": 1, "pupilIds": [1, "x"] }),
    );
    assert_eq!(resp["error"]["code"], json!("bad_params"));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn pupil_search_is_case_insensitive_for_cyrillic() {
    let workspace = temp_dir("schoold-pupil-search");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, &workspace);

    let p1 = new_pupil(&mut stdin, &mut reader, "1", "first@school.ru");
    let found = request_ok(&mut stdin, &mut reader, "2", "students.search", json!({ "q": "МАР" }));
    assert_eq!(ids_of(&found["pupils"]), vec![p1]);

    let blank = request(&mut stdin, &mut reader, "3", "students.search", json!({ "q": "  " }));
    assert_eq!(blank["error"]["code"], json!("bad_params"));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
