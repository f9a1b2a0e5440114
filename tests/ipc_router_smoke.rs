use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
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

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_studentd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn studentd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn read_response(reader: &mut BufReader<ChildStdout>) -> serde_json::Value {
    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    serde_json::from_str(line.trim()).expect("parse response json")
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

    let value = read_response(reader);
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    if value.get("ok").and_then(|v| v.as_bool()) == Some(false) {
        let code = value
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        assert_ne!(
            code, "not_implemented",
            "unexpected unknown method for {}",
            method
        );
    }
    value
}

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("studentd-router-smoke");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let health = request(&mut stdin, &mut reader, "1", "health", json!({}));
    assert!(health["result"]["workspacePath"].is_null());
    let _ = request(
        &mut stdin,
        &mut reader,
        "2",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let health = request(&mut stdin, &mut reader, "3", "health", json!({}));
    assert!(health["result"]["workspacePath"].is_string());

    let calls = [
        ("nationalId.decode", json!({ "nationalId": "29001010100012" })),
        ("nationalId.governorates", json!({})),
        ("age.onDate", json!({ "birthDate": "2010-01-01" })),
        ("grade.classify", json!({ "grade": "ثالث" })),
        ("settings.get", json!({})),
        ("settings.update", json!({ "patch": {} })),
        ("classrooms.list", json!({})),
        ("classrooms.create", json!({ "grade": "g1", "gender": "male" })),
        ("classrooms.update", json!({ "classroomId": "missing", "patch": {} })),
        ("classrooms.delete", json!({ "classroomId": "missing" })),
        ("classrooms.assign", json!({ "classroomId": "missing", "studentIds": [] })),
        ("classrooms.unassign", json!({ "classroomId": "missing", "studentIds": [] })),
        ("classrooms.candidates", json!({ "classroomId": "missing" })),
        ("students.list", json!({})),
        ("students.get", json!({ "studentId": "missing" })),
        ("students.create", json!({ "student": { "studentCode": "X", "name": "س" } })),
        ("students.update", json!({ "studentId": "missing", "patch": {} })),
        ("students.delete", json!({ "studentId": "missing" })),
        ("reports.gradeSection", json!({ "gender": "female", "grade": "second" })),
        ("reports.statistics", json!({})),
        ("reports.classroomFailed", json!({ "classroomId": "missing" })),
    ];
    for (i, (method, params)) in calls.into_iter().enumerate() {
        let _ = request(&mut stdin, &mut reader, &format!("c{}", i), method, params);
    }

    let payload = json!({ "id": "u", "method": "timetable.open", "params": {} });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");
    let unknown = read_response(&mut reader);
    assert_eq!(unknown["error"]["code"].as_str(), Some("not_implemented"));

    let _ = child.kill();
}

#[test]
fn malformed_lines_get_bad_json_and_the_loop_continues() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    writeln!(stdin, "{{not json").expect("write garbage");
    writeln!(stdin).expect("write blank line");
    stdin.flush().expect("flush");
    let resp = read_response(&mut reader);
    assert_eq!(resp["ok"].as_bool(), Some(false));
    assert_eq!(resp["error"]["code"].as_str(), Some("bad_json"));

    let health = request(&mut stdin, &mut reader, "h", "health", json!({}));
    assert_eq!(health["ok"].as_bool(), Some(true));

    let _ = child.kill();
}

#[test]
fn settings_round_trip_through_the_workspace() {
    let workspace = temp_dir("studentd-settings");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let defaults = request(&mut stdin, &mut reader, "2", "settings.get", json!({}));
    assert_eq!(
        defaults["result"]["settings"]["administration"].as_str(),
        Some("الإدارة التعليمية")
    );

    let resp = request(
        &mut stdin,
        &mut reader,
        "3",
        "settings.update",
        json!({ "patch": { "schoolName": "مدرسة الأمل", "schoolManager": "أ. سمير" } }),
    );
    assert_eq!(resp["result"]["settings"]["schoolName"].as_str(), Some("مدرسة الأمل"));

    let resp = request(
        &mut stdin,
        &mut reader,
        "4",
        "settings.update",
        json!({ "patch": { "logo": "x.png" } }),
    );
    assert_eq!(resp["error"]["code"].as_str(), Some("bad_params"));
    drop(stdin);
    let _ = child.wait();

    // A fresh process sees the saved values.
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let saved = request(&mut stdin, &mut reader, "2", "settings.get", json!({}));
    let s = &saved["result"]["settings"];
    assert_eq!(s["schoolName"].as_str(), Some("مدرسة الأمل"));
    assert_eq!(s["schoolManager"].as_str(), Some("أ. سمير"));
    let _ = child.kill();
}
