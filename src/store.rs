use crate::models::{
    Activity, ActivityRecord, Attendance, AttendanceRecord, AttendanceStatus, Course, CourseRecord, Grade,
    GradeRecord, Student, StudentRecord,
};
use crate::normalize::{GradeImportRecord, StudentImportRecord};
use crate::transfer::RecordStore;
use anyhow::Context;
use rusqlite::types::{Type, Value as SqlValue};
use rusqlite::{params_from_iter, Connection, OptionalExtension, Row};
use serde::de::DeserializeOwned;

const STUDENT_COLUMNS: &str = "id, first_name, last_name, email, phone, date_of_birth, address_json,
    emergency_contact, grade_level, enrollment_status, enrollment_date, parent_guardian_json,
    communication_history_json";
const COURSE_COLUMNS: &str = "id, course_name, course_code, teacher, credit_hours, semester, schedule_json";
const GRADE_COLUMNS: &str = "id, student_id, course_id, assignment_name, category, points, max_points,
    percentage, letter_grade, date_recorded, comments";
const ATTENDANCE_COLUMNS: &str = "id, student_id, course_id, date, status, recorded_by, notes";
const ACTIVITY_COLUMNS: &str = "id, kind, description, entity, entity_id, details_json, created_at";

fn json_col<T: DeserializeOwned>(r: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = r.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn student_from_row(r: &Row<'_>) -> rusqlite::Result<Student> {
    Ok(Student {
        id: r.get(0)?,
        record: StudentRecord {
            first_name: r.get(1)?,
            last_name: r.get(2)?,
            email: r.get(3)?,
            phone: r.get(4)?,
            date_of_birth: r.get(5)?,
            address: json_col(r, 6)?,
            emergency_contact: r.get(7)?,
            grade_level: r.get(8)?,
            enrollment_status: r.get(9)?,
            enrollment_date: r.get(10)?,
            parent_guardian: json_col(r, 11)?,
            communication_history: json_col(r, 12)?,
        },
    })
}

pub fn students_list(conn: &Connection) -> anyhow::Result<Vec<Student>> {
    let mut stmt = conn.prepare(&format!("SELECT {} FROM students ORDER BY id", STUDENT_COLUMNS))?;
    let rows = stmt
        .query_map([], student_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn student_get(conn: &Connection, id: i64) -> anyhow::Result<Option<Student>> {
    Ok(conn
        .query_row(
            &format!("SELECT {} FROM students WHERE id = ?", STUDENT_COLUMNS),
            [id],
            student_from_row,
        )
        .optional()?)
}

pub fn student_insert(conn: &Connection, s: &StudentRecord) -> anyhow::Result<i64> {
    conn.execute(
        "INSERT INTO students(
           first_name, last_name, email, phone, date_of_birth, address_json, emergency_contact,
           grade_level, enrollment_status, enrollment_date, parent_guardian_json,
           communication_history_json, updated_at
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, strftime('%Y-%m-%dT%H:%M:%SZ','now'))",
        (
            &s.first_name,
            &s.last_name,
            &s.email,
            &s.phone,
            &s.date_of_birth,
            serde_json::to_string(&s.address)?,
            &s.emergency_contact,
            &s.grade_level,
            &s.enrollment_status,
            &s.enrollment_date,
            serde_json::to_string(&s.parent_guardian)?,
            serde_json::to_string(&s.communication_history)?,
        ),
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn student_update(conn: &Connection, id: i64, s: &StudentRecord) -> anyhow::Result<bool> {
    let changed = conn.execute(
        "UPDATE students
         SET first_name = ?, last_name = ?, email = ?, phone = ?, date_of_birth = ?, address_json = ?,
             emergency_contact = ?, grade_level = ?, enrollment_status = ?, enrollment_date = ?,
             parent_guardian_json = ?, communication_history_json = ?,
             updated_at = strftime('%Y-%m-%dT%H:%M:%SZ','now')
         WHERE id = ?",
        (
            &s.first_name,
            &s.last_name,
            &s.email,
            &s.phone,
            &s.date_of_birth,
            serde_json::to_string(&s.address)?,
            &s.emergency_contact,
            &s.grade_level,
            &s.enrollment_status,
            &s.enrollment_date,
            serde_json::to_string(&s.parent_guardian)?,
            serde_json::to_string(&s.communication_history)?,
            id,
        ),
    )?;
    Ok(changed > 0)
}

pub fn student_delete(conn: &Connection, id: i64) -> anyhow::Result<bool> {
    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM course_enrollments WHERE student_id = ?", [id])?;
    let changed = tx.execute("DELETE FROM students WHERE id = ?", [id])?;
    tx.commit()?;
    Ok(changed > 0)
}

fn enrolled_students(conn: &Connection, course_id: i64) -> rusqlite::Result<Vec<i64>> {
    let mut stmt =
        conn.prepare("SELECT student_id FROM course_enrollments WHERE course_id = ? ORDER BY rowid")?;
    let ids = stmt
        .query_map([course_id], |r| r.get(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ids)
}

fn course_record_from_row(r: &Row<'_>) -> rusqlite::Result<(i64, CourseRecord)> {
    Ok((
        r.get(0)?,
        CourseRecord {
            course_name: r.get(1)?,
            course_code: r.get(2)?,
            teacher: r.get(3)?,
            credit_hours: r.get(4)?,
            semester: r.get(5)?,
            schedule: json_col(r, 6)?,
        },
    ))
}

pub fn courses_list(conn: &Connection) -> anyhow::Result<Vec<Course>> {
    let mut stmt = conn.prepare(&format!("SELECT {} FROM courses ORDER BY id", COURSE_COLUMNS))?;
    let rows = stmt
        .query_map([], course_record_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    let mut out = Vec::with_capacity(rows.len());
    for (id, record) in rows {
        out.push(Course {
            id,
            record,
            enrolled_students: enrolled_students(conn, id)?,
        });
    }
    Ok(out)
}

pub fn course_get(conn: &Connection, id: i64) -> anyhow::Result<Option<Course>> {
    let row = conn
        .query_row(
            &format!("SELECT {} FROM courses WHERE id = ?", COURSE_COLUMNS),
            [id],
            course_record_from_row,
        )
        .optional()?;
    let Some((id, record)) = row else {
        return Ok(None);
    };
    Ok(Some(Course {
        id,
        record,
        enrolled_students: enrolled_students(conn, id)?,
    }))
}

pub fn course_insert(conn: &Connection, c: &CourseRecord, enrolled: &[i64]) -> anyhow::Result<i64> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO courses(course_name, course_code, teacher, credit_hours, semester, schedule_json, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, strftime('%Y-%m-%dT%H:%M:%SZ','now'))",
        (
            &c.course_name,
            &c.course_code,
            &c.teacher,
            c.credit_hours,
            &c.semester,
            serde_json::to_string(&c.schedule)?,
        ),
    )?;
    let id = tx.last_insert_rowid();
    for student_id in enrolled {
        tx.execute(
            "INSERT OR IGNORE INTO course_enrollments(course_id, student_id) VALUES(?, ?)",
            (id, student_id),
        )?;
    }
    tx.commit()?;
    Ok(id)
}

pub fn course_update(conn: &Connection, id: i64, c: &CourseRecord) -> anyhow::Result<bool> {
    let changed = conn.execute(
        "UPDATE courses
         SET course_name = ?, course_code = ?, teacher = ?, credit_hours = ?, semester = ?, schedule_json = ?,
             updated_at = strftime('%Y-%m-%dT%H:%M:%SZ','now')
         WHERE id = ?",
        (
            &c.course_name,
            &c.course_code,
            &c.teacher,
            c.credit_hours,
            &c.semester,
            serde_json::to_string(&c.schedule)?,
            id,
        ),
    )?;
    Ok(changed > 0)
}

pub fn course_delete(conn: &Connection, id: i64) -> anyhow::Result<bool> {
    Ok(conn.execute("DELETE FROM courses WHERE id = ?", [id])? > 0)
}

pub fn course_enroll(conn: &Connection, course_id: i64, student_id: i64) -> anyhow::Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO course_enrollments(course_id, student_id) VALUES(?, ?)",
        (course_id, student_id),
    )?;
    Ok(())
}

pub fn course_unenroll(conn: &Connection, course_id: i64, student_id: i64) -> anyhow::Result<()> {
    conn.execute(
        "DELETE FROM course_enrollments WHERE course_id = ? AND student_id = ?",
        (course_id, student_id),
    )?;
    Ok(())
}

fn grade_from_row(r: &Row<'_>) -> rusqlite::Result<Grade> {
    Ok(Grade {
        id: r.get(0)?,
        record: GradeRecord {
            student_id: r.get(1)?,
            course_id: r.get(2)?,
            assignment_name: r.get(3)?,
            category: r.get(4)?,
            points: r.get(5)?,
            max_points: r.get(6)?,
            percentage: r.get(7)?,
            letter_grade: r.get(8)?,
            date_recorded: r.get(9)?,
            comments: r.get(10)?,
        },
    })
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GradeFilter {
    pub student_id: Option<i64>,
    pub course_id: Option<i64>,
}

pub fn grades_list(conn: &Connection, filter: GradeFilter) -> anyhow::Result<Vec<Grade>> {
    let mut clauses = Vec::new();
    let mut binds: Vec<SqlValue> = Vec::new();
    if let Some(v) = filter.student_id {
        clauses.push("student_id = ?");
        binds.push(SqlValue::Integer(v));
    }
    if let Some(v) = filter.course_id {
        clauses.push("course_id = ?");
        binds.push(SqlValue::Integer(v));
    }
    let sql = format!(
        "SELECT {} FROM grades{} ORDER BY id",
        GRADE_COLUMNS,
        where_sql(&clauses)
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(binds), grade_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn grade_get(conn: &Connection, id: i64) -> anyhow::Result<Option<Grade>> {
    Ok(conn
        .query_row(
            &format!("SELECT {} FROM grades WHERE id = ?", GRADE_COLUMNS),
            [id],
            grade_from_row,
        )
        .optional()?)
}

pub fn grade_insert(conn: &Connection, g: &GradeRecord) -> anyhow::Result<i64> {
    conn.execute(
        "INSERT INTO grades(
           student_id, course_id, assignment_name, category, points, max_points, percentage,
           letter_grade, date_recorded, comments, updated_at
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, strftime('%Y-%m-%dT%H:%M:%SZ','now'))",
        (
            g.student_id,
            g.course_id,
            &g.assignment_name,
            &g.category,
            g.points,
            g.max_points,
            g.percentage,
            &g.letter_grade,
            &g.date_recorded,
            &g.comments,
        ),
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn grade_update(conn: &Connection, id: i64, g: &GradeRecord) -> anyhow::Result<bool> {
    let changed = conn.execute(
        "UPDATE grades
         SET student_id = ?, course_id = ?, assignment_name = ?, category = ?, points = ?, max_points = ?,
             percentage = ?, letter_grade = ?, date_recorded = ?, comments = ?,
             updated_at = strftime('%Y-%m-%dT%H:%M:%SZ','now')
         WHERE id = ?",
        (
            g.student_id,
            g.course_id,
            &g.assignment_name,
            &g.category,
            g.points,
            g.max_points,
            g.percentage,
            &g.letter_grade,
            &g.date_recorded,
            &g.comments,
            id,
        ),
    )?;
    Ok(changed > 0)
}

pub fn grade_delete(conn: &Connection, id: i64) -> anyhow::Result<bool> {
    Ok(conn.execute("DELETE FROM grades WHERE id = ?", [id])? > 0)
}

fn attendance_from_row(r: &Row<'_>) -> rusqlite::Result<Attendance> {
    let status: String = r.get(4)?;
    let status = AttendanceStatus::parse(&status).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            Type::Text,
            format!("unknown attendance status: {}", status).into(),
        )
    })?;
    Ok(Attendance {
        id: r.get(0)?,
        record: AttendanceRecord {
            student_id: r.get(1)?,
            course_id: r.get(2)?,
            date: r.get(3)?,
            status,
            recorded_by: r.get(5)?,
            notes: r.get(6)?,
        },
    })
}

#[derive(Debug, Clone, Default)]
pub struct AttendanceFilter {
    pub student_id: Option<i64>,
    pub course_id: Option<i64>,
    pub date: Option<String>,
}

pub fn attendance_list(conn: &Connection, filter: &AttendanceFilter) -> anyhow::Result<Vec<Attendance>> {
    let mut clauses = Vec::new();
    let mut binds: Vec<SqlValue> = Vec::new();
    if let Some(v) = filter.student_id {
        clauses.push("student_id = ?");
        binds.push(SqlValue::Integer(v));
    }
    if let Some(v) = filter.course_id {
        clauses.push("course_id = ?");
        binds.push(SqlValue::Integer(v));
    }
    if let Some(v) = &filter.date {
        clauses.push("date = ?");
        binds.push(SqlValue::Text(v.clone()));
    }
    let sql = format!(
        "SELECT {} FROM attendance{} ORDER BY id",
        ATTENDANCE_COLUMNS,
        where_sql(&clauses)
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(binds), attendance_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn attendance_get(conn: &Connection, id: i64) -> anyhow::Result<Option<Attendance>> {
    Ok(conn
        .query_row(
            &format!("SELECT {} FROM attendance WHERE id = ?", ATTENDANCE_COLUMNS),
            [id],
            attendance_from_row,
        )
        .optional()?)
}

pub fn attendance_insert(conn: &Connection, a: &AttendanceRecord) -> anyhow::Result<i64> {
    conn.execute(
        "INSERT INTO attendance(student_id, course_id, date, status, recorded_by, notes)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            a.student_id,
            a.course_id,
            &a.date,
            a.status.as_str(),
            &a.recorded_by,
            &a.notes,
        ),
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn attendance_update(conn: &Connection, id: i64, a: &AttendanceRecord) -> anyhow::Result<bool> {
    let changed = conn.execute(
        "UPDATE attendance
         SET student_id = ?, course_id = ?, date = ?, status = ?, recorded_by = ?, notes = ?
         WHERE id = ?",
        (
            a.student_id,
            a.course_id,
            &a.date,
            a.status.as_str(),
            &a.recorded_by,
            &a.notes,
            id,
        ),
    )?;
    Ok(changed > 0)
}

pub fn attendance_delete(conn: &Connection, id: i64) -> anyhow::Result<bool> {
    Ok(conn.execute("DELETE FROM attendance WHERE id = ?", [id])? > 0)
}

fn activity_from_row(r: &Row<'_>) -> rusqlite::Result<Activity> {
    Ok(Activity {
        id: r.get(0)?,
        record: ActivityRecord {
            kind: r.get(1)?,
            description: r.get(2)?,
            entity: r.get(3)?,
            entity_id: r.get(4)?,
            details: json_col(r, 5)?,
            timestamp: r.get(6)?,
        },
    })
}

/// Newest first; ties on the timestamp fall back to insertion order, newest first.
pub fn activities_list(conn: &Connection, limit: Option<usize>) -> anyhow::Result<Vec<Activity>> {
    // SQLite treats a negative LIMIT as no limit.
    let limit = limit.map(|n| n as i64).unwrap_or(-1);
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM activities ORDER BY created_at DESC, id DESC LIMIT ?",
        ACTIVITY_COLUMNS
    ))?;
    let rows = stmt
        .query_map([limit], activity_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn activity_get(conn: &Connection, id: i64) -> anyhow::Result<Option<Activity>> {
    Ok(conn
        .query_row(
            &format!("SELECT {} FROM activities WHERE id = ?", ACTIVITY_COLUMNS),
            [id],
            activity_from_row,
        )
        .optional()?)
}

pub fn activity_insert(conn: &Connection, a: &ActivityRecord) -> anyhow::Result<i64> {
    conn.execute(
        "INSERT INTO activities(kind, description, entity, entity_id, details_json, created_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            &a.kind,
            &a.description,
            &a.entity,
            a.entity_id,
            serde_json::to_string(&a.details)?,
            &a.timestamp,
        ),
    )?;
    Ok(conn.last_insert_rowid())
}

fn where_sql(clauses: &[&str]) -> String {
    if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    }
}

/// Student repository seen by the CSV importer.
pub struct SqliteStudents<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteStudents<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl RecordStore<StudentImportRecord> for SqliteStudents<'_> {
    type Record = Student;

    fn get_all(&mut self) -> anyhow::Result<Vec<Student>> {
        students_list(self.conn)
    }

    fn create(&mut self, record: &StudentImportRecord) -> anyhow::Result<i64> {
        student_insert(self.conn, record)
    }
}

/// Grade repository seen by the CSV importer.
pub struct SqliteGrades<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteGrades<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl RecordStore<GradeImportRecord> for SqliteGrades<'_> {
    type Record = Grade;

    fn get_all(&mut self) -> anyhow::Result<Vec<Grade>> {
        grades_list(self.conn, GradeFilter::default())
    }

    fn create(&mut self, record: &GradeImportRecord) -> anyhow::Result<i64> {
        let record = record
            .to_record()
            .context("studentId and courseId must be numbers")?;
        grade_insert(self.conn, &record)
    }
}
