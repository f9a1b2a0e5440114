use crate::grade::{classify, ClassroomGrade, GradeInput};
use crate::ipc::error::{decode_err, err, ok};
use crate::ipc::helpers::{iso_date, parse_iso_date, str_param, today_param};
use crate::ipc::types::{AppState, Request};
use crate::national_id::{self, Gender, GOVERNORATES};
use serde_json::{json, Value};

fn handle_national_id_decode(req: &Request) -> Value {
    let Some(raw) = req.params.get("nationalId").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing nationalId", None);
    };
    let today = match today_param(&req.params, "today") {
        Ok(d) => d,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };

    match national_id::decode(raw, today) {
        Ok(d) => ok(
            &req.id,
            json!({
                "birthDate": iso_date(d.birth_date),
                "birthGovernorate": d.birth_governorate,
                "gender": d.gender.as_str(),
                "age": d.age_in_years,
            }),
        ),
        Err(e) => decode_err(&req.id, &e),
    }
}

fn handle_governorates(req: &Request) -> Value {
    let rows: Vec<Value> = GOVERNORATES
        .iter()
        .map(|(code, label)| json!({ "code": code, "label": label }))
        .collect();
    ok(&req.id, json!({ "governorates": rows }))
}

fn handle_age_on_date(req: &Request) -> Value {
    let Some(birth) = str_param(&req.params, "birthDate").and_then(parse_iso_date) else {
        return err(&req.id, "bad_params", "birthDate must be an ISO date", None);
    };

    // academicYearStart takes either a year or a label like "2024/2025".
    let reference = match req.params.get("academicYearStart") {
        None | Some(Value::Null) => match today_param(&req.params, "referenceDate") {
            Ok(d) => d,
            Err(msg) => return err(&req.id, "bad_params", msg, None),
        },
        Some(v) => {
            let start = match v {
                Value::Number(n) => n.as_i64().and_then(|y| i32::try_from(y).ok()),
                Value::String(s) => national_id::academic_year_start(s),
                _ => None,
            };
            match start.and_then(national_id::exam_reference_date) {
                Some(d) => d,
                None => {
                    return err(
                        &req.id,
                        "bad_params",
                        "academicYearStart must be a year or a label such as 2024/2025",
                        None,
                    )
                }
            }
        }
    };

    let b = national_id::age_breakdown(birth, reference);
    ok(
        &req.id,
        json!({
            "referenceDate": iso_date(reference),
            "years": b.years,
            "months": b.months,
            "days": b.days,
        }),
    )
}

fn handle_grade_classify(req: &Request) -> Value {
    let gender = match req.params.get("gender").and_then(|v| v.as_str()) {
        None => None,
        Some(s) => match Gender::parse(s) {
            Some(g) => Some(g),
            None => return err(&req.id, "bad_params", "gender must be male or female", None),
        },
    };
    let classroom_grade = match str_param(&req.params, "classroomGrade") {
        None => None,
        Some(s) => match ClassroomGrade::parse(s) {
            Some(g) => Some(g),
            None => return err(&req.id, "bad_params", "classroomGrade must be g1, g2 or g3", None),
        },
    };
    let input = GradeInput {
        grade_text: req.params.get("grade").and_then(|v| v.as_str()),
        gender,
        classroom_grade,
    };
    let bucket = classify(&input);
    ok(
        &req.id,
        json!({ "bucket": bucket.as_str(), "label": bucket.label() }),
    )
}

pub fn try_handle(_state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "nationalId.decode" => Some(handle_national_id_decode(req)),
        "nationalId.governorates" => Some(handle_governorates(req)),
        "age.onDate" => Some(handle_age_on_date(req)),
        "grade.classify" => Some(handle_grade_classify(req)),
        _ => None,
    }
}
