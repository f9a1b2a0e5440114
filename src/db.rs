use crate::grade::ClassroomGrade;
use crate::national_id::Gender;
use crate::students::{Classroom, StudentRecord};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

pub const DB_FILE: &str = "students.sqlite3";

const STUDENT_COLUMNS: &str = "id, student_code, name, national_id, birth_date, birth_governorate,
    gender, age, exam_age, religion, nationality, registration_status, registration_type,
    section, inclusion_status, exam_round, grade, academic_year, school, guardian_name,
    address, phone, guardian_phone, admin_code, school_serial, is_withdrawn, is_returnee,
    classroom_id";

const CLASSROOM_COLUMNS: &str = "id, grade, gender, class_number, seats_count, floor, name";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS workspace_settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classrooms(
            id TEXT PRIMARY KEY,
            grade TEXT NOT NULL CHECK(grade IN ('g1', 'g2', 'g3')),
            gender TEXT NOT NULL CHECK(gender IN ('male', 'female')),
            class_number INTEGER NOT NULL DEFAULT 1,
            seats_count INTEGER NOT NULL DEFAULT 30,
            floor INTEGER NOT NULL DEFAULT 1,
            name TEXT,
            created_at TEXT,
            updated_at TEXT,
            UNIQUE(grade, gender, class_number)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            student_code TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            national_id TEXT UNIQUE,
            birth_date TEXT,
            birth_governorate TEXT,
            gender TEXT,
            age INTEGER,
            exam_age INTEGER,
            religion TEXT,
            nationality TEXT,
            registration_status TEXT,
            registration_type TEXT,
            section TEXT,
            inclusion_status TEXT,
            grade TEXT,
            academic_year TEXT,
            school TEXT,
            guardian_name TEXT,
            address TEXT,
            phone TEXT,
            guardian_phone TEXT,
            admin_code TEXT,
            school_serial TEXT,
            classroom_id TEXT,
            created_at TEXT,
            updated_at TEXT,
            FOREIGN KEY(classroom_id) REFERENCES classrooms(id)
        )",
        [],
    )?;
    // Record-status columns arrived after the first schema.
    ensure_students_record_status(&conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_classroom ON students(classroom_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_gender ON students(gender)",
        [],
    )?;

    Ok(conn)
}

fn ensure_students_record_status(conn: &Connection) -> anyhow::Result<()> {
    if !table_has_column(conn, "students", "exam_round")? {
        conn.execute("ALTER TABLE students ADD COLUMN exam_round TEXT", [])?;
    }
    if !table_has_column(conn, "students", "is_withdrawn")? {
        conn.execute(
            "ALTER TABLE students ADD COLUMN is_withdrawn INTEGER NOT NULL DEFAULT 0",
            [],
        )?;
        // Older rows only carried the withdrawal in exam_round.
        conn.execute(
            "UPDATE students SET is_withdrawn = 1 WHERE exam_round = 'سحب'",
            [],
        )?;
    }
    if !table_has_column(conn, "students", "is_returnee")? {
        conn.execute(
            "ALTER TABLE students ADD COLUMN is_returnee INTEGER NOT NULL DEFAULT 0",
            [],
        )?;
    }
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM workspace_settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(conn: &Connection, key: &str, value: &serde_json::Value) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO workspace_settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

fn parse_date(s: Option<String>) -> Option<NaiveDate> {
    let raw = s?;
    match NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d") {
        Ok(d) => Some(d),
        Err(e) => {
            log::warn!("ignoring malformed stored birth_date {:?}: {}", raw, e);
            None
        }
    }
}

fn student_from_row(row: &Row<'_>) -> rusqlite::Result<StudentRecord> {
    let gender: Option<String> = row.get(6)?;
    Ok(StudentRecord {
        id: row.get(0)?,
        student_code: row.get(1)?,
        name: row.get(2)?,
        national_id: row.get(3)?,
        birth_date: parse_date(row.get(4)?),
        birth_governorate: row.get(5)?,
        gender: gender.as_deref().and_then(Gender::parse),
        age: row.get(7)?,
        exam_age: row.get(8)?,
        religion: row.get(9)?,
        nationality: row.get(10)?,
        registration_status: row.get(11)?,
        registration_type: row.get(12)?,
        section: row.get(13)?,
        inclusion_status: row.get(14)?,
        exam_round: row.get(15)?,
        grade: row.get(16)?,
        academic_year: row.get(17)?,
        school: row.get(18)?,
        guardian_name: row.get(19)?,
        address: row.get(20)?,
        phone: row.get(21)?,
        guardian_phone: row.get(22)?,
        admin_code: row.get(23)?,
        school_serial: row.get(24)?,
        is_withdrawn: row.get(25)?,
        is_returnee: row.get(26)?,
        classroom_id: row.get(27)?,
    })
}

fn classroom_from_row(row: &Row<'_>) -> rusqlite::Result<Classroom> {
    let grade: String = row.get(1)?;
    let gender: String = row.get(2)?;
    let grade = ClassroomGrade::parse(&grade).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            1,
            rusqlite::types::Type::Text,
            format!("unknown classroom grade: {grade}").into(),
        )
    })?;
    let gender = Gender::parse(&gender).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            rusqlite::types::Type::Text,
            format!("unknown classroom gender: {gender}").into(),
        )
    })?;
    Ok(Classroom {
        id: row.get(0)?,
        grade,
        gender,
        class_number: row.get(3)?,
        seats_count: row.get(4)?,
        floor: row.get(5)?,
        name: row.get(6)?,
    })
}

pub fn list_students(conn: &Connection) -> anyhow::Result<Vec<StudentRecord>> {
    let sql = format!("SELECT {STUDENT_COLUMNS} FROM students ORDER BY student_code");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], student_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn get_student(conn: &Connection, id: &str) -> anyhow::Result<Option<StudentRecord>> {
    let sql = format!("SELECT {STUDENT_COLUMNS} FROM students WHERE id = ?");
    Ok(conn.query_row(&sql, [id], student_from_row).optional()?)
}

pub fn student_code_taken(conn: &Connection, code: &str, except_id: Option<&str>) -> anyhow::Result<bool> {
    let found: Option<String> = conn
        .query_row(
            "SELECT id FROM students WHERE student_code = ?",
            [code],
            |r| r.get(0),
        )
        .optional()?;
    Ok(matches!(found, Some(id) if Some(id.as_str()) != except_id))
}

pub fn national_id_taken(conn: &Connection, national_id: &str, except_id: Option<&str>) -> anyhow::Result<bool> {
    let found: Option<String> = conn
        .query_row(
            "SELECT id FROM students WHERE national_id = ?",
            [national_id],
            |r| r.get(0),
        )
        .optional()?;
    Ok(matches!(found, Some(id) if Some(id.as_str()) != except_id))
}

pub fn insert_student(conn: &Connection, s: &StudentRecord) -> anyhow::Result<()> {
    let sql = format!(
        "INSERT INTO students({STUDENT_COLUMNS}, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?,
                strftime('%Y-%m-%dT%H:%M:%SZ','now'), strftime('%Y-%m-%dT%H:%M:%SZ','now'))"
    );
    conn.execute(
        &sql,
        params![
            s.id,
            s.student_code,
            s.name,
            s.national_id,
            s.birth_date.map(|d| d.format("%Y-%m-%d").to_string()),
            s.birth_governorate,
            s.gender.map(Gender::as_str),
            s.age,
            s.exam_age,
            s.religion,
            s.nationality,
            s.registration_status,
            s.registration_type,
            s.section,
            s.inclusion_status,
            s.exam_round,
            s.grade,
            s.academic_year,
            s.school,
            s.guardian_name,
            s.address,
            s.phone,
            s.guardian_phone,
            s.admin_code,
            s.school_serial,
            s.is_withdrawn,
            s.is_returnee,
            s.classroom_id,
        ],
    )?;
    Ok(())
}

pub fn update_student(conn: &Connection, s: &StudentRecord) -> anyhow::Result<usize> {
    let changed = conn.execute(
        "UPDATE students SET
           student_code = ?, name = ?, national_id = ?, birth_date = ?, birth_governorate = ?,
           gender = ?, age = ?, exam_age = ?, religion = ?, nationality = ?,
           registration_status = ?, registration_type = ?, section = ?, inclusion_status = ?,
           exam_round = ?, grade = ?, academic_year = ?, school = ?, guardian_name = ?,
           address = ?, phone = ?, guardian_phone = ?, admin_code = ?, school_serial = ?,
           is_withdrawn = ?, is_returnee = ?, classroom_id = ?,
           updated_at = strftime('%Y-%m-%dT%H:%M:%SZ','now')
         WHERE id = ?",
        params![
            s.student_code,
            s.name,
            s.national_id,
            s.birth_date.map(|d| d.format("%Y-%m-%d").to_string()),
            s.birth_governorate,
            s.gender.map(Gender::as_str),
            s.age,
            s.exam_age,
            s.religion,
            s.nationality,
            s.registration_status,
            s.registration_type,
            s.section,
            s.inclusion_status,
            s.exam_round,
            s.grade,
            s.academic_year,
            s.school,
            s.guardian_name,
            s.address,
            s.phone,
            s.guardian_phone,
            s.admin_code,
            s.school_serial,
            s.is_withdrawn,
            s.is_returnee,
            s.classroom_id,
            s.id,
        ],
    )?;
    Ok(changed)
}

pub fn delete_student(conn: &Connection, id: &str) -> anyhow::Result<usize> {
    Ok(conn.execute("DELETE FROM students WHERE id = ?", [id])?)
}

pub fn set_student_classroom(
    conn: &Connection,
    student_id: &str,
    classroom_id: Option<&str>,
) -> anyhow::Result<usize> {
    Ok(conn.execute(
        "UPDATE students
         SET classroom_id = ?, updated_at = strftime('%Y-%m-%dT%H:%M:%SZ','now')
         WHERE id = ?",
        (classroom_id, student_id),
    )?)
}

pub fn list_classrooms(conn: &Connection) -> anyhow::Result<Vec<Classroom>> {
    let sql = format!("SELECT {CLASSROOM_COLUMNS} FROM classrooms ORDER BY grade, gender, class_number");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], classroom_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn get_classroom(conn: &Connection, id: &str) -> anyhow::Result<Option<Classroom>> {
    let sql = format!("SELECT {CLASSROOM_COLUMNS} FROM classrooms WHERE id = ?");
    Ok(conn.query_row(&sql, [id], classroom_from_row).optional()?)
}

pub fn classroom_slot_taken(conn: &Connection, c: &Classroom) -> anyhow::Result<bool> {
    let found: Option<String> = conn
        .query_row(
            "SELECT id FROM classrooms WHERE grade = ? AND gender = ? AND class_number = ?",
            (c.grade.as_str(), c.gender.as_str(), c.class_number),
            |r| r.get(0),
        )
        .optional()?;
    Ok(matches!(found, Some(id) if id != c.id))
}

pub fn insert_classroom(conn: &Connection, c: &Classroom) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO classrooms(id, grade, gender, class_number, seats_count, floor, name, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, strftime('%Y-%m-%dT%H:%M:%SZ','now'), strftime('%Y-%m-%dT%H:%M:%SZ','now'))",
        params![
            c.id,
            c.grade.as_str(),
            c.gender.as_str(),
            c.class_number,
            c.seats_count,
            c.floor,
            c.name,
        ],
    )?;
    Ok(())
}

pub fn update_classroom(conn: &Connection, c: &Classroom) -> anyhow::Result<usize> {
    Ok(conn.execute(
        "UPDATE classrooms
         SET grade = ?, gender = ?, class_number = ?, seats_count = ?, floor = ?, name = ?,
             updated_at = strftime('%Y-%m-%dT%H:%M:%SZ','now')
         WHERE id = ?",
        params![
            c.grade.as_str(),
            c.gender.as_str(),
            c.class_number,
            c.seats_count,
            c.floor,
            c.name,
            c.id,
        ],
    )?)
}

/// Unlinks the classroom's students, then deletes it.
pub fn delete_classroom(conn: &Connection, id: &str) -> anyhow::Result<usize> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "UPDATE students SET classroom_id = NULL WHERE classroom_id = ?",
        [id],
    )?;
    let removed = tx.execute("DELETE FROM classrooms WHERE id = ?", [id])?;
    tx.commit()?;
    Ok(removed)
}

pub fn classroom_occupancy(conn: &Connection, id: &str) -> anyhow::Result<u32> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM students WHERE classroom_id = ?",
        [id],
        |r| r.get(0),
    )?)
}
