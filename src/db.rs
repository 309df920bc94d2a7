use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

pub const DB_FILE_NAME: &str = "schooldesk.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    // AUTOINCREMENT keeps ids of deleted rows from being handed out again.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            email TEXT NOT NULL,
            phone TEXT NOT NULL,
            date_of_birth TEXT NOT NULL,
            address_json TEXT NOT NULL,
            emergency_contact TEXT NOT NULL,
            grade_level TEXT NOT NULL,
            enrollment_status TEXT NOT NULL,
            enrollment_date TEXT NOT NULL,
            parent_guardian_json TEXT NOT NULL,
            communication_history_json TEXT NOT NULL,
            updated_at TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_email ON students(email)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS courses(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            course_name TEXT NOT NULL,
            course_code TEXT NOT NULL,
            teacher TEXT NOT NULL,
            credit_hours INTEGER NOT NULL,
            semester TEXT NOT NULL,
            schedule_json TEXT NOT NULL,
            updated_at TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS course_enrollments(
            course_id INTEGER NOT NULL,
            student_id INTEGER NOT NULL,
            PRIMARY KEY(course_id, student_id),
            FOREIGN KEY(course_id) REFERENCES courses(id) ON DELETE CASCADE
        )",
        [],
    )?;

    // Grades and attendance reference students/courses by id without a foreign key:
    // imported rows are accepted as long as the ids are positive integers.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS grades(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            student_id INTEGER NOT NULL,
            course_id INTEGER NOT NULL,
            assignment_name TEXT NOT NULL,
            category TEXT NOT NULL,
            points REAL NOT NULL,
            max_points REAL NOT NULL,
            percentage REAL NOT NULL,
            letter_grade TEXT NOT NULL,
            date_recorded TEXT NOT NULL,
            comments TEXT NOT NULL,
            updated_at TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grades_student ON grades(student_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grades_course ON grades(course_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            student_id INTEGER NOT NULL,
            course_id INTEGER NOT NULL,
            date TEXT NOT NULL,
            status TEXT NOT NULL,
            recorded_by TEXT NOT NULL,
            notes TEXT NOT NULL DEFAULT ''
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_student_date ON attendance(student_id, date)",
        [],
    )?;

    // created_at holds RFC 3339 UTC text, so string order is time order.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS activities(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            kind TEXT NOT NULL,
            description TEXT NOT NULL,
            entity TEXT,
            entity_id INTEGER,
            details_json TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_activities_created ON activities(created_at)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    Ok(conn)
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
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
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns(conn: &Connection, table: &str) -> Vec<String> {
        let mut stmt = conn
            .prepare(&format!("PRAGMA table_info({})", table))
            .expect("prepare");
        stmt.query_map([], |r| r.get::<_, String>(1))
            .expect("query")
            .collect::<Result<Vec<_>, _>>()
            .expect("columns")
    }

    #[test]
    fn open_db_creates_full_schema_and_reopens() {
        let dir = std::env::temp_dir().join(format!("schooldesk-db-{}", uuid::Uuid::new_v4()));
        let conn = open_db(&dir).expect("open");
        assert!(columns(&conn, "attendance").contains(&"notes".to_string()));
        assert!(columns(&conn, "activities").contains(&"created_at".to_string()));
        drop(conn);

        let conn = open_db(&dir).expect("reopen");
        settings_set_json(&conn, "k", &serde_json::json!({ "a": 1 })).expect("set");
        settings_set_json(&conn, "k", &serde_json::json!({ "a": 2 })).expect("overwrite");
        assert_eq!(
            settings_get_json(&conn, "k").expect("get"),
            Some(serde_json::json!({ "a": 2 }))
        );
        assert_eq!(settings_get_json(&conn, "missing").expect("get"), None);
        let _ = std::fs::remove_dir_all(dir);
    }
}
