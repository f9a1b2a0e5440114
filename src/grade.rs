use crate::national_id::Gender;

const FIRST_PATTERNS: &[&str] = &["g1", "1", "الأول", "اول", "الصف الأول", "صف أول"];
const SECOND_PATTERNS: &[&str] = &["g2", "2", "الثاني", "ثاني", "الصف الثاني", "صف ثاني"];
const THIRD_PATTERNS: &[&str] = &["g3", "3", "الثالث", "ثالث", "الصف الثالث", "صف ثالث"];

/// Canonical grade code stored on a classroom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ClassroomGrade {
    G1,
    G2,
    G3,
}

impl ClassroomGrade {
    pub fn parse(s: &str) -> Option<ClassroomGrade> {
        match s.trim().to_ascii_lowercase().as_str() {
            "g1" => Some(ClassroomGrade::G1),
            "g2" => Some(ClassroomGrade::G2),
            "g3" => Some(ClassroomGrade::G3),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ClassroomGrade::G1 => "g1",
            ClassroomGrade::G2 => "g2",
            ClassroomGrade::G3 => "g3",
        }
    }

    pub fn digit(self) -> u8 {
        match self {
            ClassroomGrade::G1 => 1,
            ClassroomGrade::G2 => 2,
            ClassroomGrade::G3 => 3,
        }
    }

    pub fn bucket(self) -> GradeBucket {
        match self {
            ClassroomGrade::G1 => GradeBucket::First,
            ClassroomGrade::G2 => GradeBucket::Second,
            ClassroomGrade::G3 => GradeBucket::Third,
        }
    }

    pub fn all() -> [ClassroomGrade; 3] {
        [ClassroomGrade::G1, ClassroomGrade::G2, ClassroomGrade::G3]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GradeBucket {
    First,
    Second,
    Third,
}

impl GradeBucket {
    pub fn as_str(self) -> &'static str {
        match self {
            GradeBucket::First => "first",
            GradeBucket::Second => "second",
            GradeBucket::Third => "third",
        }
    }

    /// Accepts bucket names as well as classroom codes and bare digits.
    pub fn parse(s: &str) -> Option<GradeBucket> {
        match s.trim().to_ascii_lowercase().as_str() {
            "first" | "g1" | "1" => Some(GradeBucket::First),
            "second" | "g2" | "2" => Some(GradeBucket::Second),
            "third" | "g3" | "3" => Some(GradeBucket::Third),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            GradeBucket::First => "الصف الأول",
            GradeBucket::Second => "الصف الثاني",
            GradeBucket::Third => "الصف الثالث",
        }
    }

    pub fn classroom_grade(self) -> ClassroomGrade {
        match self {
            GradeBucket::First => ClassroomGrade::G1,
            GradeBucket::Second => ClassroomGrade::G2,
            GradeBucket::Third => ClassroomGrade::G3,
        }
    }

    pub fn all() -> [GradeBucket; 3] {
        [GradeBucket::First, GradeBucket::Second, GradeBucket::Third]
    }
}

/// The fields classification reads from a student and its linked classroom.
#[derive(Debug, Clone, Copy, Default)]
pub struct GradeInput<'a> {
    pub grade_text: Option<&'a str>,
    pub gender: Option<Gender>,
    pub classroom_grade: Option<ClassroomGrade>,
}

/// Buckets one student. Evaluated first, second, third; the first match
/// wins. Blank grade text with no g2/g3 classroom falls back to first, and
/// so does unrecognised text with no classroom.
pub fn classify(student: &GradeInput<'_>) -> GradeBucket {
    let text = student
        .grade_text
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase);
    let text_matches = |patterns: &[&str]| {
        text.as_deref()
            .map(|t| patterns.iter().any(|p| t.contains(p)))
            .unwrap_or(false)
    };

    if text_matches(FIRST_PATTERNS) || student.classroom_grade == Some(ClassroomGrade::G1) {
        return GradeBucket::First;
    }
    let second = text_matches(SECOND_PATTERNS) || student.classroom_grade == Some(ClassroomGrade::G2);
    let third = text_matches(THIRD_PATTERNS) || student.classroom_grade == Some(ClassroomGrade::G3);

    if second {
        GradeBucket::Second
    } else if third {
        GradeBucket::Third
    } else {
        // TODO: product owner to confirm whether ungraded, unassigned students
        // should stay in the first-grade sections.
        GradeBucket::First
    }
}

#[derive(Debug)]
pub struct GradePartition<'s, T> {
    pub first: Vec<&'s T>,
    pub second: Vec<&'s T>,
    pub third: Vec<&'s T>,
}

impl<'s, T> GradePartition<'s, T> {
    pub fn bucket(&self, bucket: GradeBucket) -> &[&'s T] {
        match bucket {
            GradeBucket::First => &self.first,
            GradeBucket::Second => &self.second,
            GradeBucket::Third => &self.third,
        }
    }
}

/// Splits the students of one gender into the three grade buckets.
/// Students whose gender differs (or is unknown) are left out.
pub fn partition<'s, T, F>(students: &'s [T], gender: Gender, input: F) -> GradePartition<'s, T>
where
    F: Fn(&'s T) -> GradeInput<'s>,
{
    let mut out = GradePartition {
        first: Vec::new(),
        second: Vec::new(),
        third: Vec::new(),
    };
    for s in students {
        let gi = input(s);
        if gi.gender != Some(gender) {
            continue;
        }
        match classify(&gi) {
            GradeBucket::First => out.first.push(s),
            GradeBucket::Second => out.second.push(s),
            GradeBucket::Third => out.third.push(s),
        }
    }
    out
}
