use crate::db;
use crate::grade::GradeBucket;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{classroom_json, str_param, student_json};
use crate::ipc::types::{AppState, Request};
use crate::national_id::Gender;
use crate::settings::{self, InstitutionSettings};
use crate::stats::{self, ClassroomIndex};
use crate::students::{Classroom, StudentRecord};
use rusqlite::Connection;
use serde_json::{json, Value};

fn load_all(conn: &Connection) -> anyhow::Result<(Vec<StudentRecord>, Vec<Classroom>)> {
    Ok((db::list_students(conn)?, db::list_classrooms(conn)?))
}

fn header_json(s: &InstitutionSettings) -> Value {
    json!({
        "schoolName": s.school_name,
        "administration": s.administration,
        "directorate": s.directorate,
        "schoolManager": s.school_manager,
        "studentAffairsDeputy": s.student_affairs_deputy,
    })
}

fn handle_grade_section(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(gender) = str_param(&req.params, "gender").and_then(Gender::parse) else {
        return err(&req.id, "bad_params", "gender must be male or female", None);
    };
    let Some(bucket) = str_param(&req.params, "grade").and_then(GradeBucket::parse) else {
        return err(&req.id, "bad_params", "grade must be first, second or third", None);
    };

    let (students, classrooms) = match load_all(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let header = match settings::load(conn) {
        Ok(s) => header_json(&s),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let index = ClassroomIndex::new(&classrooms);
    let rows: Vec<Value> = stats::grade_section(&students, &classrooms, gender, bucket)
        .into_iter()
        .map(|s| student_json(s, index.of(s)))
        .collect();

    ok(
        &req.id,
        json!({
            "label": format!("{} - {}", bucket.label(), gender.section_label()),
            "grade": bucket.as_str(),
            "gender": gender.as_str(),
            "count": rows.len(),
            "header": header,
            "students": rows,
        }),
    )
}

fn handle_statistics(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let (students, classrooms) = match load_all(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let summary = stats::system_statistics(&students, &classrooms);
    match serde_json::to_value(&summary) {
        Ok(v) => ok(&req.id, v),
        Err(e) => err(&req.id, "server_error", e.to_string(), None),
    }
}

fn handle_classroom_failed(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(classroom_id) = str_param(&req.params, "classroomId") else {
        return err(&req.id, "bad_params", "missing classroomId", None);
    };
    let (students, classrooms) = match load_all(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let Some(classroom) = classrooms.iter().find(|c| c.id == classroom_id) else {
        return err(&req.id, "not_found", "classroom not found", None);
    };
    let occupied = students
        .iter()
        .filter(|s| s.classroom_id.as_deref() == Some(classroom_id))
        .count() as u32;

    let rows: Vec<Value> = stats::classroom_failed(&students, classroom_id)
        .into_iter()
        .map(|s| student_json(s, Some(classroom)))
        .collect();
    ok(
        &req.id,
        json!({
            "classroom": classroom_json(classroom, occupied),
            "count": rows.len(),
            "students": rows,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "reports.gradeSection" => Some(handle_grade_section(state, req)),
        "reports.statistics" => Some(handle_statistics(state, req)),
        "reports.classroomFailed" => Some(handle_classroom_failed(state, req)),
        _ => None,
    }
}
