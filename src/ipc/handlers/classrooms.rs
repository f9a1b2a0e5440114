use crate::db;
use crate::grade::{classify, ClassroomGrade};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    classroom_json, contains_folded, str_param, string_list_param, student_json,
};
use crate::ipc::types::{AppState, Request};
use crate::national_id::Gender;
use crate::students::Classroom;
use serde_json::{json, Map, Value};
use uuid::Uuid;

fn parse_u32_min(v: &Value, key: &str, min: u32) -> Result<u32, String> {
    v.as_u64()
        .and_then(|n| u32::try_from(n).ok())
        .filter(|n| *n >= min)
        .ok_or_else(|| format!("{} must be an integer >= {}", key, min))
}

fn merge_classroom_patch(c: &mut Classroom, patch: &Map<String, Value>) -> Result<(), String> {
    for (k, v) in patch {
        match k.as_str() {
            "grade" => {
                c.grade = v
                    .as_str()
                    .and_then(ClassroomGrade::parse)
                    .ok_or_else(|| "grade must be g1, g2 or g3".to_string())?
            }
            "gender" => {
                c.gender = v
                    .as_str()
                    .and_then(Gender::parse)
                    .ok_or_else(|| "gender must be male or female".to_string())?
            }
            "classNumber" => c.class_number = parse_u32_min(v, k, 1)?,
            "seatsCount" => c.seats_count = parse_u32_min(v, k, 1)?,
            "floor" => c.floor = parse_u32_min(v, k, 0)?,
            "name" => {
                c.name = match v {
                    Value::Null => None,
                    Value::String(s) if s.trim().is_empty() => None,
                    Value::String(s) => Some(s.trim().to_string()),
                    _ => return Err("name must be a string or null".into()),
                }
            }
            _ => return Err(format!("unknown classroom field: {}", k)),
        }
    }
    Ok(())
}

fn handle_classrooms_list(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "classrooms": [] }));
    };
    let classrooms = match db::list_classrooms(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let mut rows = Vec::with_capacity(classrooms.len());
    for c in &classrooms {
        let occupied = match db::classroom_occupancy(conn, &c.id) {
            Ok(n) => n,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        };
        rows.push(classroom_json(c, occupied));
    }
    ok(&req.id, json!({ "classrooms": rows }))
}

fn handle_classrooms_create(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(params) = req.params.as_object() else {
        return err(&req.id, "bad_params", "params must be an object", None);
    };
    if !params.contains_key("grade") || !params.contains_key("gender") {
        return err(&req.id, "bad_params", "missing grade/gender", None);
    }

    let mut classroom = Classroom {
        id: Uuid::new_v4().to_string(),
        grade: ClassroomGrade::G1,
        gender: Gender::Male,
        class_number: 1,
        seats_count: 30,
        floor: 1,
        name: None,
    };
    if let Err(msg) = merge_classroom_patch(&mut classroom, params) {
        return err(&req.id, "bad_params", msg, None);
    }

    match db::classroom_slot_taken(conn, &classroom) {
        Ok(true) => {
            return err(
                &req.id,
                "duplicate",
                format!("classroom {} already exists", classroom.display_name()),
                Some(json!({ "grade": classroom.grade.as_str(), "gender": classroom.gender.as_str() })),
            )
        }
        Ok(false) => {}
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }
    if let Err(e) = db::insert_classroom(conn, &classroom) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "classrooms" })),
        );
    }
    log::info!("created classroom {} ({})", classroom.display_name(), classroom.gender.as_str());
    ok(
        &req.id,
        json!({
            "classroomId": classroom.id,
            "classroom": classroom_json(&classroom, 0),
        }),
    )
}

fn handle_classrooms_update(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(classroom_id) = str_param(&req.params, "classroomId") else {
        return err(&req.id, "bad_params", "missing classroomId", None);
    };
    let Some(patch) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };

    let mut classroom = match db::get_classroom(conn, classroom_id) {
        Ok(Some(c)) => c,
        Ok(None) => return err(&req.id, "not_found", "classroom not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let previous_gender = classroom.gender;
    if let Err(msg) = merge_classroom_patch(&mut classroom, patch) {
        return err(&req.id, "bad_params", msg, None);
    }

    let occupied = match db::classroom_occupancy(conn, classroom_id) {
        Ok(n) => n,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if classroom.gender != previous_gender && occupied > 0 {
        return err(
            &req.id,
            "bad_params",
            "cannot change gender of a classroom with assigned students",
            Some(json!({ "studentCount": occupied })),
        );
    }
    match db::classroom_slot_taken(conn, &classroom) {
        Ok(true) => {
            return err(
                &req.id,
                "duplicate",
                format!("classroom {} already exists", classroom.display_name()),
                None,
            )
        }
        Ok(false) => {}
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }
    if let Err(e) = db::update_classroom(conn, &classroom) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "classroom": classroom_json(&classroom, occupied) }))
}

fn handle_classrooms_delete(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(classroom_id) = str_param(&req.params, "classroomId") else {
        return err(&req.id, "bad_params", "missing classroomId", None);
    };
    match db::delete_classroom(conn, classroom_id) {
        Ok(0) => err(&req.id, "not_found", "classroom not found", None),
        Ok(_) => ok(&req.id, json!({ "ok": true })),
        Err(e) => err(&req.id, "db_delete_failed", e.to_string(), None),
    }
}

fn handle_classrooms_assign(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(classroom_id) = str_param(&req.params, "classroomId") else {
        return err(&req.id, "bad_params", "missing classroomId", None);
    };
    let student_ids = match string_list_param(&req.params, "studentIds") {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };

    let classroom = match db::get_classroom(conn, classroom_id) {
        Ok(Some(c)) => c,
        Ok(None) => return err(&req.id, "not_found", "classroom not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let mut occupied = match db::classroom_occupancy(conn, classroom_id) {
        Ok(n) => n,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    let mut assigned = 0usize;
    for sid in &student_ids {
        let student = match db::get_student(&tx, sid) {
            Ok(Some(s)) => s,
            Ok(None) => {
                let _ = tx.rollback();
                return err(
                    &req.id,
                    "not_found",
                    "student not found",
                    Some(json!({ "studentId": sid })),
                );
            }
            Err(e) => {
                let _ = tx.rollback();
                return err(&req.id, "db_query_failed", e.to_string(), None);
            }
        };
        if student.classroom_id.as_deref() == Some(classroom_id) {
            continue;
        }
        if student.gender != Some(classroom.gender) {
            let _ = tx.rollback();
            return err(
                &req.id,
                "bad_params",
                "student gender does not match classroom",
                Some(json!({ "studentId": sid, "classroomGender": classroom.gender.as_str() })),
            );
        }
        if !classroom.has_capacity(occupied) {
            let _ = tx.rollback();
            return err(
                &req.id,
                "classroom_full",
                format!("classroom {} has no free seats", classroom.display_name()),
                Some(json!({ "seatsCount": classroom.seats_count, "studentId": sid })),
            );
        }
        if let Err(e) = db::set_student_classroom(&tx, sid, Some(classroom_id)) {
            let _ = tx.rollback();
            return err(&req.id, "db_update_failed", e.to_string(), None);
        }
        occupied += 1;
        assigned += 1;
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_tx_failed", e.to_string(), None);
    }

    ok(
        &req.id,
        json!({
            "assigned": assigned,
            "remainingSeats": classroom.remaining_seats(occupied),
        }),
    )
}

fn handle_classrooms_unassign(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(classroom_id) = str_param(&req.params, "classroomId") else {
        return err(&req.id, "bad_params", "missing classroomId", None);
    };
    let student_ids = match string_list_param(&req.params, "studentIds") {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    let mut removed = 0usize;
    for sid in &student_ids {
        match tx.execute(
            "UPDATE students SET classroom_id = NULL, updated_at = strftime('%Y-%m-%dT%H:%M:%SZ','now')
             WHERE id = ? AND classroom_id = ?",
            (sid, classroom_id),
        ) {
            Ok(n) => removed += n,
            Err(e) => {
                let _ = tx.rollback();
                return err(&req.id, "db_update_failed", e.to_string(), None);
            }
        }
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_tx_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "unassigned": removed }))
}

/// Unassigned students of the classroom's gender whose grade sorts into
/// the classroom's grade.
fn handle_classrooms_candidates(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(classroom_id) = str_param(&req.params, "classroomId") else {
        return err(&req.id, "bad_params", "missing classroomId", None);
    };
    let search = str_param(&req.params, "search").map(str::to_lowercase);

    let classroom = match db::get_classroom(conn, classroom_id) {
        Ok(Some(c)) => c,
        Ok(None) => return err(&req.id, "not_found", "classroom not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let students = match db::list_students(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let target = classroom.grade.bucket();
    let rows: Vec<Value> = students
        .iter()
        .filter(|s| s.classroom_id.is_none())
        .filter(|s| s.gender == Some(classroom.gender))
        .filter(|s| classify(&s.grade_input(None)) == target)
        .filter(|s| {
            search
                .as_deref()
                .map(|q| contains_folded(&s.name, q) || contains_folded(&s.student_code, q))
                .unwrap_or(true)
        })
        .map(|s| student_json(s, None))
        .collect();
    ok(&req.id, json!({ "students": rows }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "classrooms.list" => Some(handle_classrooms_list(state, req)),
        "classrooms.create" => Some(handle_classrooms_create(state, req)),
        "classrooms.update" => Some(handle_classrooms_update(state, req)),
        "classrooms.delete" => Some(handle_classrooms_delete(state, req)),
        "classrooms.assign" => Some(handle_classrooms_assign(state, req)),
        "classrooms.unassign" => Some(handle_classrooms_unassign(state, req)),
        "classrooms.candidates" => Some(handle_classrooms_candidates(state, req)),
        _ => None,
    }
}
