use crate::grade::{ClassroomGrade, GradeInput};
use crate::national_id::{self, DecodeError, Gender, NATIONAL_ID_LEN};
use chrono::NaiveDate;

pub const EXAM_ROUND_FIRST: &str = "دور أول";
pub const EXAM_ROUND_SECOND: &str = "دور ثاني";
pub const EXAM_ROUND_REMAINING: &str = "باقي";
pub const EXAM_ROUND_WITHDRAWN: &str = "سحب";
pub const STATUS_PROMOTED: &str = "ناجح ومنقول";
pub const STATUS_FAILED: &str = "راسب وباق للإعادة";
pub const TYPE_REGULAR: &str = "نظامي";
pub const TYPE_WORKERS: &str = "عمال";
pub const RELIGION_MUSLIM: &str = "مسلمة";
pub const RELIGION_CHRISTIAN: &str = "مسيحية";
pub const INCLUSION_NONE: &str = "لا يوجد";
/// Inclusion statuses counted as a disability in statistics.
pub const INCLUSION_DISABILITIES: &[&str] = &["بصري", "سمعي", "حركي", "صعوبات تعلم", "أخرى"];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StudentRecord {
    pub id: String,
    pub student_code: String,
    pub name: String,
    pub national_id: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub birth_governorate: Option<String>,
    pub gender: Option<Gender>,
    pub age: Option<u32>,
    pub exam_age: Option<u32>,
    pub religion: Option<String>,
    pub nationality: Option<String>,
    pub registration_status: Option<String>,
    pub registration_type: Option<String>,
    pub section: Option<String>,
    pub inclusion_status: Option<String>,
    pub exam_round: Option<String>,
    pub grade: Option<String>,
    pub academic_year: Option<String>,
    pub school: Option<String>,
    pub guardian_name: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub guardian_phone: Option<String>,
    pub admin_code: Option<String>,
    pub school_serial: Option<String>,
    pub is_withdrawn: bool,
    pub is_returnee: bool,
    pub classroom_id: Option<String>,
}

impl StudentRecord {
    pub fn grade_input(&self, classroom_grade: Option<ClassroomGrade>) -> GradeInput<'_> {
        GradeInput {
            grade_text: self.grade.as_deref(),
            gender: self.gender,
            classroom_grade,
        }
    }

    pub fn has_disability(&self) -> bool {
        self.inclusion_status
            .as_deref()
            .map(|s| INCLUSION_DISABILITIES.contains(&s))
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Classroom {
    pub id: String,
    pub grade: ClassroomGrade,
    pub gender: Gender,
    pub class_number: u32,
    pub seats_count: u32,
    pub floor: u32,
    pub name: Option<String>,
}

impl Classroom {
    /// `"<grade digit>/<class number>"`, e.g. `2/4`.
    pub fn display_name(&self) -> String {
        format!("{}/{}", self.grade.digit(), self.class_number)
    }

    pub fn remaining_seats(&self, occupied: u32) -> u32 {
        self.seats_count.saturating_sub(occupied)
    }

    pub fn has_capacity(&self, occupied: u32) -> bool {
        occupied < self.seats_count
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DerivedFields {
    /// No national id, or one that is not 14 characters long.
    Skipped,
    Decoded,
    Failed(DecodeError),
}

/// Fills derived fields before a record is written.
///
/// A decodable national id overwrites birth date, governorate, gender and
/// age. A decode failure leaves those fields as they were. Age is then
/// recomputed from whatever birth date the record holds, and a withdrawn
/// exam round marks the record withdrawn.
pub fn apply_save_policy(record: &mut StudentRecord, today: NaiveDate) -> DerivedFields {
    let derived = match record.national_id.as_deref().map(str::trim) {
        Some(id) if id.chars().count() == NATIONAL_ID_LEN => {
            match national_id::decode(id, today) {
                Ok(d) => {
                    record.birth_date = Some(d.birth_date);
                    record.birth_governorate = Some(d.birth_governorate.to_string());
                    record.gender = Some(d.gender);
                    record.age = Some(d.age_in_years);
                    DerivedFields::Decoded
                }
                Err(e) => {
                    log::warn!(
                        "student {}: national id not decoded, keeping stored fields: {}",
                        record.student_code,
                        e
                    );
                    DerivedFields::Failed(e)
                }
            }
        }
        _ => DerivedFields::Skipped,
    };

    if let Some(birth) = record.birth_date {
        record.age = Some(national_id::age_on(birth, today));
    }
    if record.exam_round.as_deref() == Some(EXAM_ROUND_WITHDRAWN) {
        record.is_withdrawn = true;
    }
    derived
}

/// Religion label agreeing with the student's gender.
pub fn religion_display(religion: Option<&str>, gender: Option<Gender>) -> Option<String> {
    let religion = religion?;
    let male = gender == Some(Gender::Male);
    let label = match religion {
        RELIGION_MUSLIM if male => "مسلم",
        RELIGION_MUSLIM => RELIGION_MUSLIM,
        RELIGION_CHRISTIAN if male => "مسيحي",
        RELIGION_CHRISTIAN => RELIGION_CHRISTIAN,
        other => other,
    };
    Some(label.to_string())
}
