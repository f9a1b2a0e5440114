use crate::grade::classify;
use crate::students::{religion_display, Classroom, StudentRecord};
use chrono::NaiveDate;
use serde_json::{json, Value};

/// Trimmed, non-empty string param.
pub fn str_param<'a>(params: &'a Value, key: &str) -> Option<&'a str> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Case-insensitive substring match; `needle` must already be lowercase.
pub fn contains_folded(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(needle)
}

pub fn parse_iso_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()
}

pub fn iso_date(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

/// `params[key]` as an ISO date, or the local date when absent.
pub fn today_param(params: &Value, key: &str) -> Result<NaiveDate, String> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(chrono::Local::now().date_naive()),
        Some(Value::String(s)) => {
            parse_iso_date(s).ok_or_else(|| format!("{} must be an ISO date (YYYY-MM-DD)", key))
        }
        Some(_) => Err(format!("{} must be an ISO date (YYYY-MM-DD)", key)),
    }
}

pub fn string_list_param(params: &Value, key: &str) -> Result<Vec<String>, String> {
    let Some(arr) = params.get(key).and_then(|v| v.as_array()) else {
        return Err(format!("missing {}", key));
    };
    let mut out = Vec::with_capacity(arr.len());
    for v in arr {
        match v.as_str().map(str::trim) {
            Some(s) if !s.is_empty() => out.push(s.to_string()),
            _ => return Err(format!("{} must contain non-empty strings", key)),
        }
    }
    Ok(out)
}

pub fn classroom_json(c: &Classroom, occupied: u32) -> Value {
    json!({
        "id": c.id,
        "grade": c.grade.as_str(),
        "gradeLabel": c.grade.bucket().label(),
        "gender": c.gender.as_str(),
        "genderLabel": c.gender.section_label(),
        "classNumber": c.class_number,
        "seatsCount": c.seats_count,
        "floor": c.floor,
        "name": c.name,
        "displayName": c.display_name(),
        "studentCount": occupied,
        "remainingSeats": c.remaining_seats(occupied),
    })
}

pub fn student_json(s: &StudentRecord, classroom: Option<&Classroom>) -> Value {
    let bucket = classify(&s.grade_input(classroom.map(|c| c.grade)));
    json!({
        "id": s.id,
        "studentCode": s.student_code,
        "name": s.name,
        "nationalId": s.national_id,
        "birthDate": s.birth_date.map(iso_date),
        "birthGovernorate": s.birth_governorate,
        "gender": s.gender.map(|g| g.as_str()),
        "age": s.age,
        "examAge": s.exam_age,
        "religion": s.religion,
        "religionDisplay": religion_display(s.religion.as_deref(), s.gender),
        "nationality": s.nationality,
        "registrationStatus": s.registration_status,
        "registrationType": s.registration_type,
        "section": s.section,
        "inclusionStatus": s.inclusion_status,
        "examRound": s.exam_round,
        "grade": s.grade,
        "gradeBucket": bucket.as_str(),
        "academicYear": s.academic_year,
        "school": s.school,
        "guardianName": s.guardian_name,
        "address": s.address,
        "phone": s.phone,
        "guardianPhone": s.guardian_phone,
        "adminCode": s.admin_code,
        "schoolSerial": s.school_serial,
        "isWithdrawn": s.is_withdrawn,
        "isReturnee": s.is_returnee,
        "classroomId": s.classroom_id,
        "classroom": classroom.map(|c| c.display_name()),
    })
}
