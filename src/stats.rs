use crate::grade::{self, ClassroomGrade, GradeBucket};
use crate::national_id::Gender;
use crate::students::{
    Classroom, StudentRecord, EXAM_ROUND_FIRST, EXAM_ROUND_REMAINING, EXAM_ROUND_SECOND,
    EXAM_ROUND_WITHDRAWN, RELIGION_CHRISTIAN, STATUS_FAILED, STATUS_PROMOTED, TYPE_REGULAR,
    TYPE_WORKERS,
};
use serde::Serialize;
use std::collections::HashMap;

/// Exam-age stages: (key, label, min, max), bounds inclusive.
const STAGES: &[(&str, &str, u32, u32)] = &[
    ("stage1", "المرحلة الأولى", 17, 100),
    ("stage2", "المرحلة الثانية", 15, 16),
    ("stage3", "المرحلة الثالثة", 0, 14),
];

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCounts {
    pub regular_new: usize,
    pub regular_repeat: usize,
    pub inclusion: usize,
    pub workers_new: usize,
    pub workers_repeat: usize,
    pub total: usize,
}

impl StatusCounts {
    fn add(&mut self, s: &StudentRecord) {
        let round = s.exam_round.as_deref();
        let new = round == Some(EXAM_ROUND_FIRST);
        let repeat = matches!(round, Some(EXAM_ROUND_SECOND) | Some(EXAM_ROUND_REMAINING));
        match s.registration_type.as_deref() {
            Some(TYPE_REGULAR) if new => self.regular_new += 1,
            Some(TYPE_REGULAR) if repeat => self.regular_repeat += 1,
            Some(TYPE_WORKERS) if new => self.workers_new += 1,
            Some(TYPE_WORKERS) if repeat => self.workers_repeat += 1,
            _ => {}
        }
        if s.has_disability() {
            self.inclusion += 1;
        }
        self.total += 1;
    }

    fn from_students<'a, I>(students: I) -> StatusCounts
    where
        I: IntoIterator<Item = &'a StudentRecord>,
    {
        let mut out = StatusCounts::default();
        for s in students {
            out.add(s);
        }
        out
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GenderTotals {
    pub male: usize,
    pub female: usize,
    pub total: usize,
}

impl GenderTotals {
    fn add(&mut self, gender: Option<Gender>) {
        match gender {
            Some(Gender::Male) => self.male += 1,
            Some(Gender::Female) => self.female += 1,
            None => {}
        }
        self.total += 1;
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenderStatus {
    pub gender: &'static str,
    pub label: &'static str,
    pub counts: StatusCounts,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassroomCountsByGrade {
    pub grade: &'static str,
    pub label: &'static str,
    pub counts: GenderTotals,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageCounts {
    pub stage: &'static str,
    pub label: &'static str,
    pub min_age: u32,
    pub max_age: u32,
    pub counts: GenderTotals,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRef {
    pub id: String,
    pub student_code: String,
    pub name: String,
    pub classroom: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedGroup {
    pub classroom_id: String,
    pub classroom: String,
    pub count: usize,
    pub students: Vec<StudentRef>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeTotals {
    pub grade: &'static str,
    pub label: &'static str,
    pub male: StatusCounts,
    pub female: StatusCounts,
    pub classrooms: GenderTotals,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStatistics {
    pub total_students: usize,
    pub promoted_students: usize,
    pub by_gender: Vec<GenderStatus>,
    pub classrooms_by_grade: Vec<ClassroomCountsByGrade>,
    pub christian: GenderTotals,
    pub withdrawn: Vec<StudentRef>,
    pub stages: Vec<StageCounts>,
    pub failed_by_classroom: Vec<FailedGroup>,
    pub grade_totals: Vec<GradeTotals>,
}

/// Resolves each student's classroom once for a reporting pass.
pub struct ClassroomIndex<'c> {
    by_id: HashMap<&'c str, &'c Classroom>,
}

impl<'c> ClassroomIndex<'c> {
    pub fn new(classrooms: &'c [Classroom]) -> Self {
        Self {
            by_id: classrooms.iter().map(|c| (c.id.as_str(), c)).collect(),
        }
    }

    pub fn of(&self, student: &StudentRecord) -> Option<&'c Classroom> {
        student
            .classroom_id
            .as_deref()
            .and_then(|id| self.by_id.get(id).copied())
    }

    pub fn grade_of(&self, student: &StudentRecord) -> Option<ClassroomGrade> {
        self.of(student).map(|c| c.grade)
    }

    fn student_ref(&self, s: &StudentRecord) -> StudentRef {
        StudentRef {
            id: s.id.clone(),
            student_code: s.student_code.clone(),
            name: s.name.clone(),
            classroom: self.of(s).map(Classroom::display_name),
        }
    }
}

pub fn system_statistics(students: &[StudentRecord], classrooms: &[Classroom]) -> SystemStatistics {
    let index = ClassroomIndex::new(classrooms);

    let by_gender = Gender::all()
        .into_iter()
        .map(|g| GenderStatus {
            gender: g.as_str(),
            label: g.section_label(),
            counts: StatusCounts::from_students(students.iter().filter(|s| s.gender == Some(g))),
        })
        .collect();

    let classrooms_by_grade = ClassroomGrade::all()
        .into_iter()
        .map(|grade| {
            let mut counts = GenderTotals::default();
            for c in classrooms.iter().filter(|c| c.grade == grade) {
                counts.add(Some(c.gender));
            }
            ClassroomCountsByGrade {
                grade: grade.as_str(),
                label: grade.bucket().label(),
                counts,
            }
        })
        .collect();

    let mut christian = GenderTotals::default();
    for s in students
        .iter()
        .filter(|s| s.religion.as_deref() == Some(RELIGION_CHRISTIAN))
    {
        christian.add(s.gender);
    }

    let mut withdrawn: Vec<&StudentRecord> = students
        .iter()
        .filter(|s| s.exam_round.as_deref() == Some(EXAM_ROUND_WITHDRAWN))
        .collect();
    withdrawn.sort_by(|a, b| a.student_code.cmp(&b.student_code));

    let stages = STAGES
        .iter()
        .map(|(key, label, min, max)| {
            let mut counts = GenderTotals::default();
            for s in students
                .iter()
                .filter(|s| s.exam_age.map(|a| a >= *min && a <= *max).unwrap_or(false))
            {
                counts.add(s.gender);
            }
            StageCounts {
                stage: *key,
                label: *label,
                min_age: *min,
                max_age: *max,
                counts,
            }
        })
        .collect();

    let failed_by_classroom = classrooms
        .iter()
        .filter_map(|c| {
            let failed = classroom_failed(students, &c.id);
            if failed.is_empty() {
                return None;
            }
            Some(FailedGroup {
                classroom_id: c.id.clone(),
                classroom: c.display_name(),
                count: failed.len(),
                students: failed.into_iter().map(|s| index.student_ref(s)).collect(),
            })
        })
        .collect();

    let male = grade::partition(students, Gender::Male, |s| s.grade_input(index.grade_of(s)));
    let female = grade::partition(students, Gender::Female, |s| s.grade_input(index.grade_of(s)));
    let grade_totals = GradeBucket::all()
        .into_iter()
        .map(|bucket| {
            let mut rooms = GenderTotals::default();
            for c in classrooms
                .iter()
                .filter(|c| c.grade == bucket.classroom_grade())
            {
                rooms.add(Some(c.gender));
            }
            GradeTotals {
                grade: bucket.as_str(),
                label: bucket.label(),
                male: StatusCounts::from_students(male.bucket(bucket).iter().copied()),
                female: StatusCounts::from_students(female.bucket(bucket).iter().copied()),
                classrooms: rooms,
            }
        })
        .collect();

    SystemStatistics {
        total_students: students.len(),
        promoted_students: students
            .iter()
            .filter(|s| s.registration_status.as_deref() == Some(STATUS_PROMOTED))
            .count(),
        by_gender,
        classrooms_by_grade,
        christian,
        withdrawn: withdrawn.into_iter().map(|s| index.student_ref(s)).collect(),
        stages,
        failed_by_classroom,
        grade_totals,
    }
}

/// Failed students in one classroom, ordered by name then code.
pub fn classroom_failed<'s>(students: &'s [StudentRecord], classroom_id: &str) -> Vec<&'s StudentRecord> {
    let mut out: Vec<&StudentRecord> = students
        .iter()
        .filter(|s| s.classroom_id.as_deref() == Some(classroom_id))
        .filter(|s| s.registration_status.as_deref() == Some(STATUS_FAILED))
        .collect();
    out.sort_by(|a, b| {
        a.name
            .cmp(&b.name)
            .then_with(|| a.student_code.cmp(&b.student_code))
    });
    out
}

/// One report section: students of `gender` classified into `bucket`.
/// Assigned students come first, by numeric class number, then by name.
pub fn grade_section<'s>(
    students: &'s [StudentRecord],
    classrooms: &[Classroom],
    gender: Gender,
    bucket: GradeBucket,
) -> Vec<&'s StudentRecord> {
    let index = ClassroomIndex::new(classrooms);
    let part = grade::partition(students, gender, |s| s.grade_input(index.grade_of(s)));
    let mut out = part.bucket(bucket).to_vec();
    out.sort_by_key(|s| {
        let room = index.of(s);
        (room.is_none(), room.map(|c| c.class_number), s.name.clone())
    });
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn student(code: &str, gender: Gender, grade: Option<&str>) -> StudentRecord {
        StudentRecord {
            id: format!("id-{code}"),
            student_code: code.into(),
            name: format!("name {code}"),
            gender: Some(gender),
            grade: grade.map(String::from),
            ..Default::default()
        }
    }

    fn room(id: &str, grade: ClassroomGrade, gender: Gender, n: u32) -> Classroom {
        Classroom {
            id: id.into(),
            grade,
            gender,
            class_number: n,
            seats_count: 30,
            floor: 1,
            name: None,
        }
    }

    #[test]
    fn grade_totals_sum_to_gender_population() {
        let classrooms = vec![
            room("m3", ClassroomGrade::G3, Gender::Male, 1),
            room("f2", ClassroomGrade::G2, Gender::Female, 1),
        ];
        let mut students = vec![
            student("1", Gender::Male, None),
            student("2", Gender::Male, Some("g2")),
            student("3", Gender::Male, Some("")),
            student("4", Gender::Female, Some("الصف الثالث")),
            student("5", Gender::Female, None),
            student("6", Gender::Female, Some("بدون")),
        ];
        students[2].classroom_id = Some("m3".into());
        students[4].classroom_id = Some("f2".into());

        let st = system_statistics(&students, &classrooms);
        let male: usize = st.grade_totals.iter().map(|g| g.male.total).sum();
        let female: usize = st.grade_totals.iter().map(|g| g.female.total).sum();
        assert_eq!(male, 3);
        assert_eq!(female, 3);

        let third = &st.grade_totals[2];
        assert_eq!(third.male.total, 1);
        assert_eq!(third.female.total, 1);
        assert_eq!(third.classrooms.male, 1);
        let second = &st.grade_totals[1];
        assert_eq!(second.male.total, 1);
        assert_eq!(second.female.total, 1);
    }

    #[test]
    fn status_counters_and_stages() {
        let mut a = student("1", Gender::Male, None);
        a.registration_type = Some(TYPE_REGULAR.into());
        a.exam_round = Some(EXAM_ROUND_FIRST.into());
        a.exam_age = Some(15);
        let mut b = student("2", Gender::Male, None);
        b.registration_type = Some(TYPE_WORKERS.into());
        b.exam_round = Some(EXAM_ROUND_REMAINING.into());
        b.inclusion_status = Some("سمعي".into());
        b.exam_age = Some(17);
        let mut c = student("3", Gender::Female, None);
        c.religion = Some(RELIGION_CHRISTIAN.into());
        c.exam_round = Some(EXAM_ROUND_WITHDRAWN.into());
        c.exam_age = Some(14);

        let st = system_statistics(&[c.clone(), a, b], &[]);
        let male = &st.by_gender[0].counts;
        assert_eq!(male.regular_new, 1);
        assert_eq!(male.workers_repeat, 1);
        assert_eq!(male.inclusion, 1);
        assert_eq!(male.total, 2);
        assert_eq!(st.christian.female, 1);
        assert_eq!(st.withdrawn.len(), 1);
        assert_eq!(st.withdrawn[0].student_code, "3");
        assert_eq!(st.stages[0].counts.male, 1);
        assert_eq!(st.stages[1].counts.male, 1);
        assert_eq!(st.stages[2].counts.female, 1);
    }

    #[test]
    fn failed_students_grouped_by_classroom() {
        let classrooms = vec![room("r1", ClassroomGrade::G1, Gender::Male, 2)];
        let mut a = student("2", Gender::Male, None);
        a.name = "ب".into();
        a.classroom_id = Some("r1".into());
        a.registration_status = Some(STATUS_FAILED.into());
        let mut b = a.clone();
        b.student_code = "1".into();
        b.name = "أ".into();
        let mut c = a.clone();
        c.registration_status = Some(STATUS_PROMOTED.into());

        let students = vec![a, b, c];
        let st = system_statistics(&students, &classrooms);
        assert_eq!(st.failed_by_classroom.len(), 1);
        assert_eq!(st.failed_by_classroom[0].count, 2);
        assert_eq!(st.failed_by_classroom[0].classroom, "1/2");
        assert_eq!(st.failed_by_classroom[0].students[0].name, "أ");
        assert_eq!(st.promoted_students, 1);
    }

    #[test]
    fn grade_section_orders_assigned_first() {
        let classrooms = vec![
            room("a", ClassroomGrade::G1, Gender::Female, 2),
            room("b", ClassroomGrade::G1, Gender::Female, 1),
        ];
        let mut s1 = student("1", Gender::Female, None);
        s1.name = "z".into();
        let mut s2 = student("2", Gender::Female, Some("1"));
        s2.classroom_id = Some("a".into());
        let mut s3 = student("3", Gender::Female, Some("g1"));
        s3.classroom_id = Some("b".into());
        let s4 = student("4", Gender::Male, None);
        let s5 = student("5", Gender::Female, Some("g2"));

        let students = vec![s1, s2, s3, s4, s5];
        let section = grade_section(&students, &classrooms, Gender::Female, GradeBucket::First);
        let codes: Vec<&str> = section.iter().map(|s| s.student_code.as_str()).collect();
        assert_eq!(codes, vec!["3", "2", "1"]);
    }

    #[test]
    fn grade_section_compares_class_numbers_numerically() {
        let classrooms = vec![
            room("a", ClassroomGrade::G1, Gender::Male, 10),
            room("b", ClassroomGrade::G1, Gender::Male, 2),
        ];
        let mut s1 = student("1", Gender::Male, Some("الصف الأول"));
        s1.classroom_id = Some("a".into());
        let mut s2 = student("2", Gender::Male, Some("الصف الأول"));
        s2.classroom_id = Some("b".into());

        let students = vec![s1, s2];
        let section = grade_section(&students, &classrooms, Gender::Male, GradeBucket::First);
        let codes: Vec<&str> = section.iter().map(|s| s.student_code.as_str()).collect();
        assert_eq!(codes, vec!["2", "1"]);
    }
}
