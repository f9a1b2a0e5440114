use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

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
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn error_code(resp: &serde_json::Value) -> Option<&str> {
    resp.get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
}

#[test]
fn decode_returns_birth_fields_without_a_workspace() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let resp = request(
        &mut stdin,
        &mut reader,
        "1",
        "nationalId.decode",
        json!({ "nationalId": "29001010100012", "today": "2024-06-15" }),
    );
    assert_eq!(resp.get("ok").and_then(|v| v.as_bool()), Some(true), "{}", resp);
    let result = &resp["result"];
    assert_eq!(result["birthDate"].as_str(), Some("1990-01-01"));
    assert_eq!(result["birthGovernorate"].as_str(), Some("القاهرة"));
    assert_eq!(result["gender"].as_str(), Some("male"));
    assert_eq!(result["age"].as_u64(), Some(34));

    let resp = request(
        &mut stdin,
        &mut reader,
        "2",
        "nationalId.decode",
        json!({ "nationalId": " 30507011234567 ", "today": "2024-06-15" }),
    );
    let result = &resp["result"];
    assert_eq!(result["birthDate"].as_str(), Some("2005-07-01"));
    assert_eq!(result["birthGovernorate"].as_str(), Some("الدقهلية"));
    assert_eq!(result["gender"].as_str(), Some("female"));
    assert_eq!(result["age"].as_u64(), Some(18));

    let _ = child.kill();
}

#[test]
fn decode_failures_carry_typed_codes() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let cases = [
        ("", "invalid_length"),
        ("2900101010001", "invalid_length"),
        ("290010101000123", "invalid_length"),
        ("2900101010001X", "invalid_format"),
        ("29013010100012", "invalid_birth_date"),
        ("29002310100012", "invalid_birth_date"),
    ];
    for (i, (raw, code)) in cases.iter().enumerate() {
        let resp = request(
            &mut stdin,
            &mut reader,
            &format!("d{}", i),
            "nationalId.decode",
            json!({ "nationalId": raw, "today": "2024-06-15" }),
        );
        assert_eq!(resp.get("ok").and_then(|v| v.as_bool()), Some(false), "{}", raw);
        assert_eq!(error_code(&resp), Some(*code), "{}", raw);
    }

    let resp = request(
        &mut stdin,
        &mut reader,
        "m1",
        "nationalId.decode",
        json!({ "today": "2024-06-15" }),
    );
    assert_eq!(error_code(&resp), Some("bad_params"));

    let resp = request(
        &mut stdin,
        &mut reader,
        "m2",
        "nationalId.decode",
        json!({ "nationalId": "29001010100012", "today": "15/06/2024" }),
    );
    assert_eq!(error_code(&resp), Some("bad_params"));

    let _ = child.kill();
}

#[test]
fn governorate_table_and_exam_age() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let resp = request(&mut stdin, &mut reader, "1", "nationalId.governorates", json!({}));
    let rows = resp["result"]["governorates"]
        .as_array()
        .cloned()
        .expect("governorates");
    assert!(rows.iter().any(|r| r["code"] == "01" && r["label"] == "القاهرة"));
    assert!(rows.iter().any(|r| r["code"] == "88" && r["label"] == "خارج الجمهورية"));

    // Exam ages are measured on October 1st of the academic year.
    let resp = request(
        &mut stdin,
        &mut reader,
        "2",
        "age.onDate",
        json!({ "birthDate": "2010-03-15", "academicYearStart": "2024/2025" }),
    );
    let result = &resp["result"];
    assert_eq!(result["referenceDate"].as_str(), Some("2024-10-01"));
    assert_eq!(result["years"].as_u64(), Some(14));
    assert_eq!(result["months"].as_u64(), Some(6));
    assert_eq!(result["days"].as_u64(), Some(16));

    let resp = request(
        &mut stdin,
        &mut reader,
        "3",
        "age.onDate",
        json!({ "birthDate": "2010-03-15", "referenceDate": "2024-03-14" }),
    );
    assert_eq!(resp["result"]["years"].as_u64(), Some(13));

    // February cannot hold the 30th, so the month is not completed.
    let resp = request(
        &mut stdin,
        &mut reader,
        "3b",
        "age.onDate",
        json!({ "birthDate": "2009-01-30", "referenceDate": "2023-03-01" }),
    );
    let result = &resp["result"];
    assert_eq!(result["years"].as_u64(), Some(14));
    assert_eq!(result["months"].as_u64(), Some(0));
    assert_eq!(result["days"].as_u64(), Some(30));

    let resp = request(
        &mut stdin,
        &mut reader,
        "4",
        "age.onDate",
        json!({ "birthDate": "2010-03-15", "academicYearStart": "next year" }),
    );
    assert_eq!(error_code(&resp), Some("bad_params"));

    let _ = child.kill();
}

#[test]
fn classify_maps_text_and_classroom_grade() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let cases = [
        (json!({ "grade": "" }), "first"),
        (json!({}), "first"),
        (json!({ "grade": "الصف الثاني الإعدادي" }), "second"),
        (json!({ "grade": "الصف الثالث" }), "third"),
        (json!({ "grade": "G2" }), "second"),
        (json!({ "grade": "", "classroomGrade": "g3" }), "third"),
        (json!({ "grade": "   ", "classroomGrade": "g2" }), "second"),
        // A g1 classroom is checked alongside the first-grade patterns.
        (json!({ "grade": "ثالث", "classroomGrade": "g1" }), "first"),
        (json!({ "grade": "unknown level" }), "first"),
    ];
    for (i, (params, expected)) in cases.into_iter().enumerate() {
        let resp = request(&mut stdin, &mut reader, &format!("c{}", i), "grade.classify", params.clone());
        assert_eq!(
            resp["result"]["bucket"].as_str(),
            Some(expected),
            "params {}",
            params
        );
    }

    let resp = request(
        &mut stdin,
        &mut reader,
        "bad",
        "grade.classify",
        json!({ "classroomGrade": "g4" }),
    );
    assert_eq!(error_code(&resp), Some("bad_params"));

    let _ = child.kill();
}
