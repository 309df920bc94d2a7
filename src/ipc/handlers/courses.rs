use crate::ipc::helpers::{
    from_object, get_required_id, get_required_object, merge_patch, to_json, with_db, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::models::{Course, CourseRecord};
use crate::store;
use rusqlite::Connection;
use serde_json::{json, Value};

fn load_course(conn: &Connection, id: i64) -> Result<Course, HandlerErr> {
    store::course_get(conn, id)
        .map_err(HandlerErr::db_query)?
        .ok_or_else(|| HandlerErr::not_found("Course not found"))
}

fn courses_list(conn: &Connection, _params: &Value) -> Result<Value, HandlerErr> {
    let courses = store::courses_list(conn).map_err(HandlerErr::db_query)?;
    Ok(json!({ "courses": to_json(&courses)? }))
}

fn courses_get(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let id = get_required_id(params, "id")?;
    Ok(json!({ "course": to_json(&load_course(conn, id)?)? }))
}

fn courses_create(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let obj = get_required_object(params, "course")?;
    let record: CourseRecord = from_object(obj, "course")?;
    let enrolled: Vec<i64> = match obj.get("enrolledStudents") {
        None | Some(Value::Null) => Vec::new(),
        Some(v) => serde_json::from_value(v.clone())
            .map_err(|_| HandlerErr::bad_params("enrolledStudents must be an array of ids"))?,
    };
    let id = store::course_insert(conn, &record, &enrolled).map_err(HandlerErr::db_update)?;
    Ok(json!({ "course": to_json(&load_course(conn, id)?)? }))
}

fn courses_update(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let id = get_required_id(params, "id")?;
    let patch = get_required_object(params, "patch")?;
    let current = load_course(conn, id)?;
    let record: CourseRecord = merge_patch(&current.record, patch, "course")?;
    store::course_update(conn, id, &record).map_err(HandlerErr::db_update)?;
    Ok(json!({ "course": to_json(&load_course(conn, id)?)? }))
}

fn courses_delete(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let id = get_required_id(params, "id")?;
    if !store::course_delete(conn, id).map_err(HandlerErr::db_update)? {
        return Err(HandlerErr::not_found("Course not found"));
    }
    Ok(json!({ "ok": true }))
}

fn courses_enroll(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let course_id = get_required_id(params, "courseId")?;
    let student_id = get_required_id(params, "studentId")?;
    load_course(conn, course_id)?;
    if store::student_get(conn, student_id)
        .map_err(HandlerErr::db_query)?
        .is_none()
    {
        return Err(HandlerErr::not_found("Student not found"));
    }
    store::course_enroll(conn, course_id, student_id).map_err(HandlerErr::db_update)?;
    Ok(json!({ "course": to_json(&load_course(conn, course_id)?)? }))
}

fn courses_unenroll(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let course_id = get_required_id(params, "courseId")?;
    let student_id = get_required_id(params, "studentId")?;
    load_course(conn, course_id)?;
    store::course_unenroll(conn, course_id, student_id).map_err(HandlerErr::db_update)?;
    Ok(json!({ "course": to_json(&load_course(conn, course_id)?)? }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "courses.list" => Some(with_db(state, req, courses_list)),
        "courses.get" => Some(with_db(state, req, courses_get)),
        "courses.create" => Some(with_db(state, req, courses_create)),
        "courses.update" => Some(with_db(state, req, courses_update)),
        "courses.delete" => Some(with_db(state, req, courses_delete)),
        "courses.enroll" => Some(with_db(state, req, courses_enroll)),
        "courses.unenroll" => Some(with_db(state, req, courses_unenroll)),
        _ => None,
    }
}
