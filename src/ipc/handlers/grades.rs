use crate::grading;
use crate::ipc::helpers::{
    from_object, get_optional_id, get_required_id, get_required_object, iso_today, merge_patch, to_json,
    with_db, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::models::{Grade, GradeRecord};
use crate::store::{self, GradeFilter};
use rusqlite::Connection;
use serde_json::{json, Value};

/// Percentage and letter for a grade entered by hand (two decimals, coarse letters).
fn score_manual(record: &mut GradeRecord) -> Result<(), HandlerErr> {
    if record.points < 0.0 {
        return Err(HandlerErr::bad_params("points must be a non-negative number"));
    }
    let Some(raw) = grading::raw_percentage(record.points, record.max_points) else {
        return Err(HandlerErr::bad_params("maxPoints must be a positive number"));
    };
    if record.points > record.max_points {
        return Err(HandlerErr::bad_params("Points cannot exceed maximum points"));
    }
    record.percentage = grading::round_2_decimals(raw);
    record.letter_grade = grading::manual_letter_grade(record.percentage).to_string();
    Ok(())
}

fn load_grade(conn: &Connection, id: i64) -> Result<Grade, HandlerErr> {
    store::grade_get(conn, id)
        .map_err(HandlerErr::db_query)?
        .ok_or_else(|| HandlerErr::not_found("Grade not found"))
}

fn grades_list(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let filter = GradeFilter {
        student_id: get_optional_id(params, "studentId")?,
        course_id: get_optional_id(params, "courseId")?,
    };
    let grades = store::grades_list(conn, filter).map_err(HandlerErr::db_query)?;
    Ok(json!({ "grades": to_json(&grades)? }))
}

fn grades_get(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let id = get_required_id(params, "id")?;
    Ok(json!({ "grade": to_json(&load_grade(conn, id)?)? }))
}

fn grades_create(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let mut record: GradeRecord = from_object(get_required_object(params, "grade")?, "grade")?;
    if record.assignment_name.trim().is_empty() {
        return Err(HandlerErr::bad_params("Missing required field: assignmentName"));
    }
    score_manual(&mut record)?;
    if record.date_recorded.trim().is_empty() {
        record.date_recorded = iso_today();
    }
    let id = store::grade_insert(conn, &record).map_err(HandlerErr::db_update)?;
    Ok(json!({ "grade": to_json(&Grade { id, record })? }))
}

fn grades_update(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let id = get_required_id(params, "id")?;
    let patch = get_required_object(params, "patch")?;
    let current = load_grade(conn, id)?;
    let mut record: GradeRecord = merge_patch(&current.record, patch, "grade")?;
    if patch.contains_key("points") || patch.contains_key("maxPoints") {
        score_manual(&mut record)?;
    }
    store::grade_update(conn, id, &record).map_err(HandlerErr::db_update)?;
    Ok(json!({ "grade": to_json(&Grade { id, record })? }))
}

fn grades_delete(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let id = get_required_id(params, "id")?;
    if !store::grade_delete(conn, id).map_err(HandlerErr::db_update)? {
        return Err(HandlerErr::not_found("Grade not found"));
    }
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "grades.list" => Some(with_db(state, req, grades_list)),
        "grades.get" => Some(with_db(state, req, grades_get)),
        "grades.create" => Some(with_db(state, req, grades_create)),
        "grades.update" => Some(with_db(state, req, grades_update)),
        "grades.delete" => Some(with_db(state, req, grades_delete)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grade(points: f64, max_points: f64) -> GradeRecord {
        GradeRecord {
            student_id: 1,
            course_id: 1,
            assignment_name: "Quiz".into(),
            category: "Assignment".into(),
            points,
            max_points,
            percentage: 0.0,
            letter_grade: String::new(),
            date_recorded: String::new(),
            comments: String::new(),
        }
    }

    #[test]
    fn manual_scoring_uses_coarse_letters_and_two_decimals() {
        let mut g = grade(2.0, 3.0);
        assert!(score_manual(&mut g).is_ok());
        assert_eq!(g.percentage, 66.67);
        assert_eq!(g.letter_grade, "D");

        let mut g = grade(93.0, 100.0);
        assert!(score_manual(&mut g).is_ok());
        assert_eq!(g.letter_grade, "A");
    }

    #[test]
    fn manual_scoring_rejects_points_over_max() {
        let mut g = grade(11.0, 10.0);
        let e = score_manual(&mut g).err().expect("rejected");
        assert_eq!(e.code, "bad_params");
        assert_eq!(e.message, "Points cannot exceed maximum points");
    }

    #[test]
    fn manual_scoring_rejects_zero_max() {
        let mut g = grade(0.0, 0.0);
        let e = score_manual(&mut g).err().expect("rejected");
        assert_eq!(e.message, "maxPoints must be a positive number");
    }
}
