use crate::db;
use crate::grade::{classify, GradeBucket};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{contains_folded, parse_iso_date, str_param, student_json, today_param};
use crate::ipc::types::{AppState, Request};
use crate::national_id::Gender;
use crate::settings;
use crate::stats::ClassroomIndex;
use crate::students::{apply_save_policy, DerivedFields, StudentRecord, INCLUSION_NONE};
use rusqlite::Connection;
use serde_json::{json, Map, Value};
use uuid::Uuid;

fn text_value(v: &Value, key: &str) -> Result<Option<String>, String> {
    match v {
        Value::Null => Ok(None),
        Value::String(s) => {
            let t = s.trim();
            Ok(if t.is_empty() { None } else { Some(t.to_string()) })
        }
        _ => Err(format!("{} must be a string or null", key)),
    }
}

fn required_text(v: &Value, key: &str) -> Result<String, String> {
    text_value(v, key)?.ok_or_else(|| format!("{} must not be empty", key))
}

fn age_value(v: &Value, key: &str) -> Result<Option<u32>, String> {
    match v {
        Value::Null => Ok(None),
        _ => v
            .as_u64()
            .filter(|n| (1..=100).contains(n))
            .map(|n| Some(n as u32))
            .ok_or_else(|| format!("{} must be an integer between 1 and 100", key)),
    }
}

fn bool_value(v: &Value, key: &str) -> Result<bool, String> {
    v.as_bool()
        .ok_or_else(|| format!("{} must be a boolean", key))
}

/// Applies a camelCase patch. Derived fields (age) and the classroom link
/// are not patchable here.
fn merge_student_patch(s: &mut StudentRecord, patch: &Map<String, Value>) -> Result<(), String> {
    for (k, v) in patch {
        match k.as_str() {
            "studentCode" => s.student_code = required_text(v, k)?,
            "name" => s.name = required_text(v, k)?,
            "nationalId" => s.national_id = text_value(v, k)?,
            "birthDate" => {
                s.birth_date = match text_value(v, k)? {
                    None => None,
                    Some(raw) => Some(
                        parse_iso_date(&raw)
                            .ok_or_else(|| format!("{} must be an ISO date", k))?,
                    ),
                }
            }
            "birthGovernorate" => s.birth_governorate = text_value(v, k)?,
            "gender" => {
                s.gender = match text_value(v, k)? {
                    None => None,
                    Some(raw) => Some(
                        Gender::parse(&raw)
                            .ok_or_else(|| "gender must be male or female".to_string())?,
                    ),
                }
            }
            "examAge" => s.exam_age = age_value(v, k)?,
            "religion" => s.religion = text_value(v, k)?,
            "nationality" => s.nationality = text_value(v, k)?,
            "registrationStatus" => s.registration_status = text_value(v, k)?,
            "registrationType" => s.registration_type = text_value(v, k)?,
            "section" => s.section = text_value(v, k)?,
            "inclusionStatus" => s.inclusion_status = text_value(v, k)?,
            "examRound" => s.exam_round = text_value(v, k)?,
            "grade" => s.grade = text_value(v, k)?,
            "academicYear" => s.academic_year = text_value(v, k)?,
            "school" => s.school = text_value(v, k)?,
            "guardianName" => s.guardian_name = text_value(v, k)?,
            "address" => s.address = text_value(v, k)?,
            "phone" => s.phone = text_value(v, k)?,
            "guardianPhone" => s.guardian_phone = text_value(v, k)?,
            "adminCode" => s.admin_code = text_value(v, k)?,
            "schoolSerial" => s.school_serial = text_value(v, k)?,
            "isWithdrawn" => s.is_withdrawn = bool_value(v, k)?,
            "isReturnee" => s.is_returnee = bool_value(v, k)?,
            _ => return Err(format!("unknown student field: {}", k)),
        }
    }
    Ok(())
}

fn derived_json(d: &DerivedFields) -> Value {
    match d {
        DerivedFields::Skipped => json!({ "status": "skipped" }),
        DerivedFields::Decoded => json!({ "status": "decoded" }),
        DerivedFields::Failed(e) => json!({
            "status": "failed",
            "code": e.code(),
            "message": e.to_string(),
        }),
    }
}

/// Rejects a student code or national id already held by another student.
fn check_unique(conn: &Connection, s: &StudentRecord, req: &Request) -> Option<Value> {
    let except = Some(s.id.as_str());
    match db::student_code_taken(conn, &s.student_code, except) {
        Ok(true) => {
            return Some(err(
                &req.id,
                "duplicate",
                "studentCode already exists",
                Some(json!({ "field": "studentCode" })),
            ))
        }
        Ok(false) => {}
        Err(e) => return Some(err(&req.id, "db_query_failed", e.to_string(), None)),
    }
    if let Some(nid) = s.national_id.as_deref() {
        match db::national_id_taken(conn, nid, except) {
            Ok(true) => {
                return Some(err(
                    &req.id,
                    "duplicate",
                    "nationalId already exists",
                    Some(json!({ "field": "nationalId" })),
                ))
            }
            Ok(false) => {}
            Err(e) => return Some(err(&req.id, "db_query_failed", e.to_string(), None)),
        }
    }
    None
}

fn load_classroom_for(
    conn: &Connection,
    s: &StudentRecord,
) -> anyhow::Result<Option<crate::students::Classroom>> {
    match s.classroom_id.as_deref() {
        Some(id) => db::get_classroom(conn, id),
        None => Ok(None),
    }
}

fn handle_students_list(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let gender = match str_param(&req.params, "gender") {
        None => None,
        Some(s) => match Gender::parse(s) {
            Some(g) => Some(g),
            None => return err(&req.id, "bad_params", "gender must be male or female", None),
        },
    };
    let bucket = match str_param(&req.params, "grade") {
        None => None,
        Some(s) => match GradeBucket::parse(s) {
            Some(b) => Some(b),
            None => return err(&req.id, "bad_params", "grade must be first, second or third", None),
        },
    };
    let classroom_filter = str_param(&req.params, "classroomId");
    let search = str_param(&req.params, "search").map(str::to_lowercase);

    let students = match db::list_students(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let classrooms = match db::list_classrooms(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let index = ClassroomIndex::new(&classrooms);

    let rows: Vec<Value> = students
        .iter()
        .filter(|s| gender.map(|g| s.gender == Some(g)).unwrap_or(true))
        .filter(|s| match classroom_filter {
            None => true,
            Some("none") => s.classroom_id.is_none(),
            Some(id) => s.classroom_id.as_deref() == Some(id),
        })
        .filter(|s| {
            search
                .as_deref()
                .map(|q| contains_folded(&s.name, q) || contains_folded(&s.student_code, q))
                .unwrap_or(true)
        })
        .filter(|s| {
            bucket
                .map(|b| classify(&s.grade_input(index.grade_of(s))) == b)
                .unwrap_or(true)
        })
        .map(|s| student_json(s, index.of(s)))
        .collect();
    ok(&req.id, json!({ "students": rows }))
}

fn handle_students_get(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(student_id) = str_param(&req.params, "studentId") else {
        return err(&req.id, "bad_params", "missing studentId", None);
    };
    let student = match db::get_student(conn, student_id) {
        Ok(Some(s)) => s,
        Ok(None) => return err(&req.id, "not_found", "student not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    match load_classroom_for(conn, &student) {
        Ok(c) => ok(&req.id, json!({ "student": student_json(&student, c.as_ref()) })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_students_create(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(fields) = req.params.get("student").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "student must be an object", None);
    };
    if !fields.contains_key("studentCode") || !fields.contains_key("name") {
        return err(&req.id, "bad_params", "missing studentCode/name", None);
    }
    let today = match today_param(&req.params, "today") {
        Ok(d) => d,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };

    let mut student = StudentRecord {
        id: Uuid::new_v4().to_string(),
        inclusion_status: Some(INCLUSION_NONE.to_string()),
        ..Default::default()
    };
    if let Err(msg) = merge_student_patch(&mut student, fields) {
        return err(&req.id, "bad_params", msg, None);
    }

    // Records carry the institution codes at creation time.
    let institution = match settings::load(conn) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if student.admin_code.is_none() {
        student.admin_code = institution.admin_code().map(String::from);
    }
    if student.school_serial.is_none() {
        student.school_serial = institution.school_serial().map(String::from);
    }

    let derived = apply_save_policy(&mut student, today);
    if let Some(resp) = check_unique(conn, &student, req) {
        return resp;
    }
    if let Err(e) = db::insert_student(conn, &student) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "students" })),
        );
    }
    log::info!("created student {}", student.student_code);

    ok(
        &req.id,
        json!({
            "studentId": student.id,
            "student": student_json(&student, None),
            "derived": derived_json(&derived),
        }),
    )
}

fn handle_students_update(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(student_id) = str_param(&req.params, "studentId") else {
        return err(&req.id, "bad_params", "missing studentId", None);
    };
    let Some(patch) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };
    let today = match today_param(&req.params, "today") {
        Ok(d) => d,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };

    let mut student = match db::get_student(conn, student_id) {
        Ok(Some(s)) => s,
        Ok(None) => return err(&req.id, "not_found", "student not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if let Err(msg) = merge_student_patch(&mut student, patch) {
        return err(&req.id, "bad_params", msg, None);
    }
    let derived = apply_save_policy(&mut student, today);

    let classroom = match load_classroom_for(conn, &student) {
        Ok(c) => c,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if let Some(c) = classroom.as_ref() {
        if student.gender != Some(c.gender) {
            return err(
                &req.id,
                "bad_params",
                "student gender does not match classroom",
                Some(json!({ "classroomId": c.id })),
            );
        }
    }
    if let Some(resp) = check_unique(conn, &student, req) {
        return resp;
    }
    if let Err(e) = db::update_student(conn, &student) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }

    ok(
        &req.id,
        json!({
            "student": student_json(&student, classroom.as_ref()),
            "derived": derived_json(&derived),
        }),
    )
}

fn handle_students_delete(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(student_id) = str_param(&req.params, "studentId") else {
        return err(&req.id, "bad_params", "missing studentId", None);
    };
    match db::delete_student(conn, student_id) {
        Ok(0) => err(&req.id, "not_found", "student not found", None),
        Ok(_) => ok(&req.id, json!({ "ok": true })),
        Err(e) => err(&req.id, "db_delete_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "students.list" => Some(handle_students_list(state, req)),
        "students.get" => Some(handle_students_get(state, req)),
        "students.create" => Some(handle_students_create(state, req)),
        "students.update" => Some(handle_students_update(state, req)),
        "students.delete" => Some(handle_students_delete(state, req)),
        _ => None,
    }
}
