use crate::ipc::helpers::{
    from_object, get_required_id, get_required_object, iso_today, merge_patch, to_json, with_db, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::models::{Student, StudentRecord};
use crate::store;
use rusqlite::Connection;
use serde_json::{json, Value};

fn load_student(conn: &Connection, id: i64) -> Result<Student, HandlerErr> {
    store::student_get(conn, id)
        .map_err(HandlerErr::db_query)?
        .ok_or_else(|| HandlerErr::not_found("Student not found"))
}

fn students_list(conn: &Connection, _params: &Value) -> Result<Value, HandlerErr> {
    let students = store::students_list(conn).map_err(HandlerErr::db_query)?;
    Ok(json!({ "students": to_json(&students)? }))
}

fn students_get(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let id = get_required_id(params, "id")?;
    Ok(json!({ "student": to_json(&load_student(conn, id)?)? }))
}

fn students_create(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let mut record: StudentRecord = from_object(get_required_object(params, "student")?, "student")?;
    if record.enrollment_date.trim().is_empty() {
        record.enrollment_date = iso_today();
    }
    if record.enrollment_status.trim().is_empty() {
        record.enrollment_status = "active".to_string();
    }
    let id = store::student_insert(conn, &record).map_err(HandlerErr::db_update)?;
    Ok(json!({ "student": to_json(&Student { id, record })? }))
}

fn students_update(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let id = get_required_id(params, "id")?;
    let patch = get_required_object(params, "patch")?;
    let current = load_student(conn, id)?;
    let record: StudentRecord = merge_patch(&current.record, patch, "student")?;
    store::student_update(conn, id, &record).map_err(HandlerErr::db_update)?;
    Ok(json!({ "student": to_json(&Student { id, record })? }))
}

fn students_delete(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let id = get_required_id(params, "id")?;
    if !store::student_delete(conn, id).map_err(HandlerErr::db_update)? {
        return Err(HandlerErr::not_found("Student not found"));
    }
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "students.list" => Some(with_db(state, req, students_list)),
        "students.get" => Some(with_db(state, req, students_get)),
        "students.create" => Some(with_db(state, req, students_create)),
        "students.update" => Some(with_db(state, req, students_update)),
        "students.delete" => Some(with_db(state, req, students_delete)),
        _ => None,
    }
}
