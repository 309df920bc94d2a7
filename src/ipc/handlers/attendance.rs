use crate::ipc::helpers::{
    get_optional_id, get_optional_str, get_required_id, get_required_object, get_required_str, merge_patch,
    to_json, with_db, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::models::{default_recorded_by, Attendance, AttendanceRecord, AttendanceStatus};
use crate::store::{self, AttendanceFilter};
use rusqlite::Connection;
use serde_json::{json, Map, Value};

/// Course used by `attendance.mark` when the caller does not name one.
const DEFAULT_COURSE_ID: i64 = 1;

fn parse_status(raw: &str) -> Result<AttendanceStatus, HandlerErr> {
    AttendanceStatus::parse(raw).ok_or_else(|| {
        let allowed = AttendanceStatus::ALL.map(AttendanceStatus::as_str).join(", ");
        HandlerErr::bad_params(format!("status must be one of: {}", allowed))
    })
}

/// Accepts any letter case for `status` before handing the object to serde.
fn canonical_status(obj: &Map<String, Value>) -> Result<Map<String, Value>, HandlerErr> {
    let mut obj = obj.clone();
    if let Some(raw) = obj.get("status") {
        let raw = raw
            .as_str()
            .ok_or_else(|| HandlerErr::bad_params("status must be a string"))?;
        let status = parse_status(raw)?;
        obj.insert("status".into(), Value::String(status.as_str().to_string()));
    }
    Ok(obj)
}

fn load_attendance(conn: &Connection, id: i64) -> Result<Attendance, HandlerErr> {
    store::attendance_get(conn, id)
        .map_err(HandlerErr::db_query)?
        .ok_or_else(|| HandlerErr::not_found("Attendance record not found"))
}

fn attendance_list(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let filter = AttendanceFilter {
        student_id: get_optional_id(params, "studentId")?,
        course_id: get_optional_id(params, "courseId")?,
        date: get_optional_str(params, "date"),
    };
    let records = store::attendance_list(conn, &filter).map_err(HandlerErr::db_query)?;
    Ok(json!({ "attendance": to_json(&records)? }))
}

fn attendance_get(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let id = get_required_id(params, "id")?;
    Ok(json!({ "attendance": to_json(&load_attendance(conn, id)?)? }))
}

fn attendance_create(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let obj = canonical_status(get_required_object(params, "attendance")?)?;
    let record: AttendanceRecord = serde_json::from_value(Value::Object(obj))
        .map_err(|e| HandlerErr::bad_params(format!("invalid attendance: {}", e)))?;
    let id = store::attendance_insert(conn, &record).map_err(HandlerErr::db_update)?;
    Ok(json!({ "attendance": to_json(&Attendance { id, record })? }))
}

fn attendance_update(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let id = get_required_id(params, "id")?;
    let patch = canonical_status(get_required_object(params, "patch")?)?;
    let current = load_attendance(conn, id)?;
    let record: AttendanceRecord = merge_patch(&current.record, &patch, "attendance")?;
    store::attendance_update(conn, id, &record).map_err(HandlerErr::db_update)?;
    Ok(json!({ "attendance": to_json(&Attendance { id, record })? }))
}

fn attendance_delete(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let id = get_required_id(params, "id")?;
    if !store::attendance_delete(conn, id).map_err(HandlerErr::db_update)? {
        return Err(HandlerErr::not_found("Attendance record not found"));
    }
    Ok(json!({ "ok": true }))
}

/// Upsert keyed by (student, date) and, when given, course.
fn attendance_mark(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let student_id = get_required_id(params, "studentId")?;
    let date = get_required_str(params, "date")?.trim().to_string();
    if date.is_empty() {
        return Err(HandlerErr::bad_params("missing date"));
    }
    let status = parse_status(&get_required_str(params, "status")?)?;
    let course_id = get_optional_id(params, "courseId")?;

    let filter = AttendanceFilter {
        student_id: Some(student_id),
        course_id,
        date: Some(date.clone()),
    };
    let existing = store::attendance_list(conn, &filter)
        .map_err(HandlerErr::db_query)?
        .into_iter()
        .next();

    let saved = match existing {
        Some(mut found) => {
            found.record.status = status;
            store::attendance_update(conn, found.id, &found.record).map_err(HandlerErr::db_update)?;
            found
        }
        None => {
            let record = AttendanceRecord {
                student_id,
                course_id: course_id.unwrap_or(DEFAULT_COURSE_ID),
                date,
                status,
                recorded_by: default_recorded_by(),
                notes: String::new(),
            };
            let id = store::attendance_insert(conn, &record).map_err(HandlerErr::db_update)?;
            Attendance { id, record }
        }
    };
    Ok(json!({ "attendance": to_json(&saved)? }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "attendance.list" => Some(with_db(state, req, attendance_list)),
        "attendance.get" => Some(with_db(state, req, attendance_get)),
        "attendance.create" => Some(with_db(state, req, attendance_create)),
        "attendance.update" => Some(with_db(state, req, attendance_update)),
        "attendance.delete" => Some(with_db(state, req, attendance_delete)),
        "attendance.mark" => Some(with_db(state, req, attendance_mark)),
        _ => None,
    }
}
