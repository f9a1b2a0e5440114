use chrono::{Datelike, Months, NaiveDate};

pub const UNSPECIFIED_GOVERNORATE: &str = "غير محدد";
pub const OUTSIDE_REPUBLIC_CODE: &str = "88";

/// Birth governorate codes (positions 8-9 of the national id).
pub const GOVERNORATES: &[(&str, &str)] = &[
    ("01", "القاهرة"),
    ("02", "الإسكندرية"),
    ("03", "بورسعيد"),
    ("04", "السويس"),
    ("11", "دمياط"),
    ("12", "الدقهلية"),
    ("13", "الشرقية"),
    ("14", "القليوبية"),
    ("15", "كفر الشيخ"),
    ("16", "الغربية"),
    ("17", "المنوفية"),
    ("18", "البحيرة"),
    ("19", "الإسماعيلية"),
    ("21", "الجيزة"),
    ("22", "بني سويف"),
    ("23", "الفيوم"),
    ("24", "المنيا"),
    ("25", "أسيوط"),
    ("26", "سوهاج"),
    ("27", "قنا"),
    ("28", "أسوان"),
    ("29", "الأقصر"),
    ("31", "البحر الأحمر"),
    ("32", "الوادي الجديد"),
    ("33", "مطروح"),
    ("34", "شمال سيناء"),
    ("35", "جنوب سيناء"),
    (OUTSIDE_REPUBLIC_CODE, "خارج الجمهورية"),
];

pub const NATIONAL_ID_LEN: usize = 14;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid length: {0}")]
    InvalidLength(String),

    #[error("invalid format: {0}")]
    InvalidFormat(String),

    #[error("invalid birth date: {0}")]
    InvalidBirthDate(String),
}

impl DecodeError {
    /// Wire error code used by the IPC layer.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidLength(_) => "invalid_length",
            Self::InvalidFormat(_) => "invalid_format",
            Self::InvalidBirthDate(_) => "invalid_birth_date",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub fn as_str(self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
        }
    }

    pub fn parse(s: &str) -> Option<Gender> {
        match s.trim().to_ascii_lowercase().as_str() {
            "male" => Some(Gender::Male),
            "female" => Some(Gender::Female),
            _ => None,
        }
    }

    pub fn all() -> [Gender; 2] {
        [Gender::Male, Gender::Female]
    }

    /// Section label used for classrooms and report headers.
    pub fn section_label(self) -> &'static str {
        match self {
            Gender::Male => "بنين",
            Gender::Female => "بنات",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedIdentity {
    pub birth_date: NaiveDate,
    pub birth_governorate: &'static str,
    pub gender: Gender,
    pub age_in_years: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgeBreakdown {
    pub years: u32,
    pub months: u32,
    pub days: u32,
}

pub fn governorate_label(code: &str) -> &'static str {
    GOVERNORATES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, label)| *label)
        .unwrap_or(UNSPECIFIED_GOVERNORATE)
}

/// Decodes an Egyptian national id relative to `today`.
///
/// Layout (1-indexed): century digit, `YYMMDD`, two-digit governorate code,
/// a serial whose last digit (position 13) carries the gender, and a check
/// digit. The check digit is not verified.
pub fn decode(identifier: &str, today: NaiveDate) -> Result<DecodedIdentity, DecodeError> {
    let id = identifier.trim();
    if id.is_empty() {
        return Err(DecodeError::InvalidLength(
            "national id must not be empty".into(),
        ));
    }
    let len = id.chars().count();
    if len != NATIONAL_ID_LEN {
        return Err(DecodeError::InvalidLength(format!(
            "national id must be exactly {} digits, got {}",
            NATIONAL_ID_LEN, len
        )));
    }
    if !id.bytes().all(|b| b.is_ascii_digit()) {
        return Err(DecodeError::InvalidFormat(
            "national id must contain digits only".into(),
        ));
    }

    let digits: Vec<u32> = id.bytes().map(|b| u32::from(b - b'0')).collect();

    // Anything but 2/3 falls back to the 1800s.
    let century = match digits[0] {
        2 => 1900,
        3 => 2000,
        _ => 1800,
    };
    let year = century + (digits[1] * 10 + digits[2]) as i32;
    let month = digits[3] * 10 + digits[4];
    let day = digits[5] * 10 + digits[6];

    let birth_date = NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| {
        DecodeError::InvalidBirthDate(format!(
            "{:04}-{:02}-{:02} is not a calendar date",
            year, month, day
        ))
    })?;

    let birth_governorate = governorate_label(&id[7..9]);
    let gender = if digits[12] % 2 == 1 {
        Gender::Male
    } else {
        Gender::Female
    };

    Ok(DecodedIdentity {
        birth_date,
        birth_governorate,
        gender,
        age_in_years: age_on(birth_date, today),
    })
}

/// Whole years between `birth` and `reference`, counting the anniversary.
/// A birth date after the reference yields 0.
pub fn age_on(birth: NaiveDate, reference: NaiveDate) -> u32 {
    let mut years = reference.year() - birth.year();
    if (reference.month(), reference.day()) < (birth.month(), birth.day()) {
        years -= 1;
    }
    years.max(0) as u32
}

/// Years, months and days elapsed from `birth` to `reference`.
///
/// A month counts once the birth day-of-month is reached. A month that is
/// too short to hold that day does not complete it, so the remainder is
/// counted in days from the last reached anniversary.
pub fn age_breakdown(birth: NaiveDate, reference: NaiveDate) -> AgeBreakdown {
    if reference <= birth {
        return AgeBreakdown {
            years: 0,
            months: 0,
            days: 0,
        };
    }

    let span = (reference.year() - birth.year()) * 12 + reference.month() as i32
        - birth.month() as i32;
    let mut months = span.max(0) as u32;
    let anchor = loop {
        match birth.checked_add_months(Months::new(months)) {
            Some(a) if a <= reference && a.day() == birth.day() => break a,
            _ if months == 0 => break birth,
            _ => months -= 1,
        }
    };

    AgeBreakdown {
        years: months / 12,
        months: months % 12,
        days: (reference - anchor).num_days() as u32,
    }
}

/// Age reference for exam records: October 1st of the academic year start.
pub fn exam_reference_date(academic_year_start: i32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(academic_year_start, 10, 1)
}

/// Parses the leading year of an academic year label such as `2024/2025`.
pub fn academic_year_start(label: &str) -> Option<i32> {
    let head: String = label
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    if head.len() != 4 {
        return None;
    }
    head.parse().ok()
}
