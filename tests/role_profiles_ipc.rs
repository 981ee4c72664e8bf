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

fn register(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    email: &str,
    role: &str,
) -> serde_json::Value {
    request_ok(
        stdin,
        reader,
        id,
        "users.register",
        json!({
            "email": email,
            "passwordHash": "$argon2id$stub",
            "name": "Ivan",
            "surname": "Petrov",
            "role": role,
        }),
    )
}

fn set_role(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    user_id: i64,
    role: &str,
) -> serde_json::Value {
    request_ok(
        stdin,
        reader,
        id,
        "users.update",
        json!({ "userId": user_id, "patch": { "role": role } }),
    )
}

fn active_profiles(conn: &Connection, user_id: i64) -> (i64, i64) {
    let teachers: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM teachers WHERE user_id = ? AND deleted_at IS NULL",
            [user_id],
            |r| r.get(0),
        )
        .expect("count teachers");
    let pupils: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM pupils WHERE user_id = ? AND deleted_at IS NULL",
            [user_id],
            |r| r.get(0),
        )
        .expect("count pupils");
    (teachers, pupils)
}

#[test]
fn profile_rows_track_every_role_change() {
    let workspace = temp_dir("schoold-role-profiles");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let created = register(&mut stdin, &mut reader, "2", "walker@school.ru", "ADMIN");
    let user_id = created["user"]["id"].as_i64().expect("user id");
    assert!(created["teacherId"].is_null());
    assert!(created["pupilId"].is_null());

    let sequence = [
        ("TEACHER", (1, 0)),
        ("STUDENT", (0, 1)),
        ("ADMIN", (0, 0)),
        ("TEACHER", (1, 0)),
        ("TEACHER", (1, 0)),
        ("STUDENT", (0, 1)),
        ("STUDENT", (0, 1)),
        ("ADMIN", (0, 0)),
    ];
    let db = open_workspace_db(&workspace);
    for (i, (role, expected)) in sequence.iter().enumerate() {
        let id = format!("r{}", i);
        let updated = set_role(&mut stdin, &mut reader, &id, user_id, role);
        assert_eq!(updated["user"]["role"], json!(role));
        assert_eq!(active_profiles(&db, user_id), *expected, "after {}", role);
    }

    let total: (i64, i64) = db
        .query_row(
            "SELECT (SELECT COUNT(*) FROM teachers WHERE user_id = ?1),
                    (SELECT COUNT(*) FROM pupils WHERE user_id = ?1)",
            [user_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .expect("row totals");
    assert_eq!(total, (1, 1), "profiles are restored, never duplicated");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn deleted_teacher_is_restored_with_same_id_and_classroom() {
    let workspace = temp_dir("schoold-restore-teacher");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let created = register(&mut stdin, &mut reader, "2", "teacher@school.ru", "TEACHER");
    let user_id = created["user"]["id"].as_i64().expect("user id");
    let teacher_id = created["teacherId"].as_i64().expect("teacher id");
    request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "teachers.setClassroom",
        json!({ "teacherId": teacher_id, "classroomNumber": "314" }),
    );

    request_ok(&mut stdin, &mut reader, "4", "users.delete", json!({ "userId": user_id }));
    let listed = request_ok(&mut stdin, &mut reader, "5", "teachers.list", json!({}));
    assert_eq!(listed["teachers"].as_array().map(|a| a.len()), Some(0));

    let restored = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "teachers.restore",
        json!({ "userId": user_id }),
    );
    assert_eq!(restored["restored"], json!(true));
    let again = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "teachers.restore",
        json!({ "userId": user_id }),
    );
    assert_eq!(again["restored"], json!(false));

    let listed = request_ok(&mut stdin, &mut reader, "8", "teachers.list", json!({}));
    let teachers = listed["teachers"].as_array().expect("teachers");
    assert_eq!(teachers.len(), 1);
    assert_eq!(teachers[0]["id"].as_i64(), Some(teacher_id));
    assert_eq!(teachers[0]["classroomNumber"], json!("314"));

    let db = open_workspace_db(&workspace);
    let rows: i64 = db
        .query_row("SELECT COUNT(*) FROM teachers", [], |r| r.get(0))
        .expect("count");
    assert_eq!(rows, 1);

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn pupil_turned_teacher_leaves_the_class_roster() {
    let workspace = temp_dir("schoold-example-scenario");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let created = register(&mut stdin, &mut reader, "2", "a@a.com", "STUDENT");
    let user_id = created["user"]["id"].as_i64().expect("user id");
    let pupil_id = created["pupilId"].as_i64().expect("pupil id");

    let db = open_workspace_db(&workspace);
    let class_of = |db: &Connection| -> Option<i64> {
        db.query_row("SELECT class_id FROM pupils WHERE id = ?", [pupil_id], |r| r.get(0))
            .expect("pupil row")
    };
    assert_eq!(class_of(&db), None);

    let class = request_ok(&mut stdin, &mut reader, "3", "classes.create", json!({ "name": "10A" }));
    let class_id = class["class"]["id"].as_i64().expect("class id");
    let members = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "classes.assignStudents",
        json!({ "classId": class_id, "pupilIds": [pupil_id] }),
    );
    assert_eq!(members["pupils"][0]["id"].as_i64(), Some(pupil_id));
    assert_eq!(class_of(&db), Some(class_id));

    let updated = set_role(&mut stdin, &mut reader, "5", user_id, "TEACHER");
    assert!(updated["pupilId"].is_null());
    assert!(updated["teacherId"].as_i64().is_some());
    assert_eq!(active_profiles(&db, user_id), (1, 0));

    let by_class = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "students.byClass",
        json!({ "classId": class_id }),
    );
    assert_eq!(by_class["pupils"], json!([]));
    assert_eq!(class_of(&db), Some(class_id), "soft-deleted pupil keeps classId");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn failed_role_change_rolls_back_profile_rows() {
    let workspace = temp_dir("schoold-role-rollback");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let created = register(&mut stdin, &mut reader, "2", "pupil@school.ru", "STUDENT");
    let user_id = created["user"]["id"].as_i64().expect("user id");
    register(&mut stdin, &mut reader, "3", "taken@school.ru", "ADMIN");

    let resp = request(
        &mut stdin,
        &mut reader,
        "4",
        "users.update",
        json!({ "userId": user_id, "patch": { "role": "TEACHER", "email": "taken@school.ru" } }),
    );
    assert_eq!(resp["ok"], json!(false));
    assert_eq!(resp["error"]["code"], json!("conflict"));

    let db = open_workspace_db(&workspace);
    assert_eq!(active_profiles(&db, user_id), (0, 1));
    let user = request_ok(&mut stdin, &mut reader, "5", "users.get", json!({ "userId": user_id }));
    assert_eq!(user["user"]["role"], json!("STUDENT"));

    let missing = request(
        &mut stdin,
        &mut reader,
        "6",
        "users.update",
        json!({ "userId": 4242, "patch": { "role": "TEACHER" } }),
    );
    assert_eq!(missing["error"]["code"], json!("not_found"));
    assert_eq!(missing["error"]["details"], json!({ "entity": "user", "id": 4242 }));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
