use crate::grading;
use crate::ipc::helpers::{get_optional_id, get_optional_str, get_required_id, now_rfc3339, to_json, with_db, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::models::{Attendance, AttendanceStatus, Grade};
use crate::store::{self, AttendanceFilter, GradeFilter};
use indexmap::{IndexMap, IndexSet};
use rusqlite::Connection;
use serde_json::{json, Value};

const UNKNOWN_COURSE: &str = "Unknown Course";

/// Letter counts seeded with every letter, best first, so absent letters show as 0.
fn letter_counts(grades: &[Grade]) -> IndexMap<String, usize> {
    let mut counts: IndexMap<String, usize> = grading::letters_best_first()
        .map(|letter| (letter.to_string(), 0))
        .collect();
    for g in grades {
        *counts.entry(g.record.letter_grade.clone()).or_insert(0) += 1;
    }
    counts
}

/// Whole-number share of `Present` records; 0 when there are none.
fn attendance_rate(records: &[Attendance]) -> u64 {
    if records.is_empty() {
        return 0;
    }
    let present = records
        .iter()
        .filter(|r| r.record.status == AttendanceStatus::Present)
        .count();
    whole_percent(present, records.len())
}

fn whole_percent(part: usize, total: usize) -> u64 {
    grading::round_half_up(part as f64 / total as f64 * 100.0) as u64
}

fn mean(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values.into_iter().fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

fn all_grades(conn: &Connection, filter: GradeFilter) -> Result<Vec<Grade>, HandlerErr> {
    store::grades_list(conn, filter).map_err(HandlerErr::db_query)
}

fn all_attendance(conn: &Connection, filter: AttendanceFilter) -> Result<Vec<Attendance>, HandlerErr> {
    store::attendance_list(conn, &filter).map_err(HandlerErr::db_query)
}

fn grade_distribution(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let course_id = get_optional_id(params, "courseId")?;
    let grades = store::grades_list(
        conn,
        GradeFilter {
            student_id: None,
            course_id,
        },
    )
    .map_err(HandlerErr::db_query)?;

    let counts = letter_counts(&grades);
    let average = if grades.is_empty() {
        None
    } else {
        let sum: f64 = grades.iter().map(|g| g.record.percentage).sum();
        Some(grading::round_2_decimals(sum / grades.len() as f64))
    };
    Ok(json!({
        "courseId": course_id,
        "total": grades.len(),
        "averagePercentage": average,
        "distribution": counts,
    }))
}

fn attendance_summary(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let filter = AttendanceFilter {
        student_id: None,
        course_id: get_optional_id(params, "courseId")?,
        date: get_optional_str(params, "date"),
    };
    let records = store::attendance_list(conn, &filter).map_err(HandlerErr::db_query)?;

    let mut counts: IndexMap<&'static str, usize> = AttendanceStatus::ALL
        .iter()
        .map(|s| (s.as_str(), 0))
        .collect();
    for r in &records {
        *counts.entry(r.record.status.as_str()).or_insert(0) += 1;
    }
    Ok(json!({
        "date": filter.date,
        "courseId": filter.course_id,
        "total": records.len(),
        "counts": counts,
    }))
}

fn overview(conn: &Connection, _params: &Value) -> Result<Value, HandlerErr> {
    let students = store::students_list(conn).map_err(HandlerErr::db_query)?;
    let courses = store::courses_list(conn).map_err(HandlerErr::db_query)?;
    let grades = all_grades(conn, GradeFilter::default())?;
    let attendance = all_attendance(conn, AttendanceFilter::default())?;

    let active = students
        .iter()
        .filter(|s| s.record.enrollment_status.eq_ignore_ascii_case("active"))
        .count();

    // Each student's mean percentage is mapped to grade points, then averaged across students.
    let mut by_student: IndexMap<i64, Vec<f64>> = IndexMap::new();
    for g in &grades {
        by_student.entry(g.record.student_id).or_default().push(g.record.percentage);
    }
    let average_gpa = mean(
        by_student
            .values()
            .filter_map(|pcts| mean(pcts.iter().copied()))
            .map(grading::grade_points),
    )
    .map(grading::round_2_decimals)
    .unwrap_or(0.0);

    Ok(json!({
        "summary": {
            "totalStudents": students.len(),
            "activeStudents": active,
            "totalCourses": courses.len(),
            "averageGpa": average_gpa,
            "attendanceRate": attendance_rate(&attendance),
            "totalGrades": grades.len(),
        },
        "gradeDistribution": letter_counts(&grades),
        "generatedAt": now_rfc3339(),
    }))
}

fn student_report(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let student_id = get_required_id(params, "studentId")?;
    let student = store::student_get(conn, student_id)
        .map_err(HandlerErr::db_query)?
        .ok_or_else(|| HandlerErr::not_found("Student not found"))?;
    let grades = all_grades(
        conn,
        GradeFilter {
            student_id: Some(student_id),
            course_id: None,
        },
    )?;
    let attendance = all_attendance(
        conn,
        AttendanceFilter {
            student_id: Some(student_id),
            ..AttendanceFilter::default()
        },
    )?;

    let course_names: IndexMap<i64, String> = store::courses_list(conn)
        .map_err(HandlerErr::db_query)?
        .into_iter()
        .map(|c| (c.id, c.record.course_name))
        .collect();
    let mut by_course: IndexMap<String, Vec<&Grade>> = IndexMap::new();
    for g in &grades {
        let name = course_names
            .get(&g.record.course_id)
            .map(String::as_str)
            .unwrap_or(UNKNOWN_COURSE);
        by_course.entry(name.to_string()).or_default().push(g);
    }
    let gpa = mean(grades.iter().map(|g| grading::grade_points(g.record.percentage)))
        .map(grading::round_2_decimals)
        .unwrap_or(0.0);

    Ok(json!({
        "student": to_json(&student)?,
        "summary": {
            "gpa": gpa,
            "attendanceRate": attendance_rate(&attendance),
            "totalGrades": grades.len(),
            "coursesEnrolled": by_course.len(),
        },
        "gradesByCourse": to_json(&by_course)?,
        "attendanceHistory": to_json(&attendance)?,
        "generatedAt": now_rfc3339(),
    }))
}

fn course_report(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let course_id = get_required_id(params, "courseId")?;
    let course = store::course_get(conn, course_id)
        .map_err(HandlerErr::db_query)?
        .ok_or_else(|| HandlerErr::not_found("Course not found"))?;
    let grades = all_grades(
        conn,
        GradeFilter {
            student_id: None,
            course_id: Some(course_id),
        },
    )?;
    let attendance = all_attendance(
        conn,
        AttendanceFilter {
            course_id: Some(course_id),
            ..AttendanceFilter::default()
        },
    )?;

    // Anyone graded in the course counts as enrolled, alongside the enrollment list.
    let mut member_ids: IndexSet<i64> = grades.iter().map(|g| g.record.student_id).collect();
    member_ids.extend(course.enrolled_students.iter().copied());
    let members: Vec<_> = store::students_list(conn)
        .map_err(HandlerErr::db_query)?
        .into_iter()
        .filter(|s| member_ids.contains(&s.id))
        .collect();

    let average = mean(grades.iter().map(|g| g.record.percentage))
        .map(grading::round_1_decimal)
        .unwrap_or(0.0);
    let pass_rate = if grades.is_empty() {
        0
    } else {
        let passed = grades
            .iter()
            .filter(|g| g.record.percentage >= grading::PASSING_PERCENTAGE)
            .count();
        whole_percent(passed, grades.len())
    };

    let mut performance = Vec::with_capacity(members.len());
    for student in &members {
        let own: Vec<f64> = grades
            .iter()
            .filter(|g| g.record.student_id == student.id)
            .map(|g| g.record.percentage)
            .collect();
        performance.push(json!({
            "student": to_json(student)?,
            "averageGrade": mean(own.iter().copied()).map(grading::round_1_decimal).unwrap_or(0.0),
            "totalAssignments": own.len(),
        }));
    }

    Ok(json!({
        "course": to_json(&course)?,
        "summary": {
            "enrolledStudents": members.len(),
            "averageGrade": average,
            "attendanceRate": attendance_rate(&attendance),
            "totalAssignments": grades.len(),
            "passRate": pass_rate,
        },
        "gradeDistribution": letter_counts(&grades),
        "studentPerformance": performance,
        "generatedAt": now_rfc3339(),
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "reports.gradeDistribution" => Some(with_db(state, req, grade_distribution)),
        "reports.attendanceSummary" => Some(with_db(state, req, attendance_summary)),
        "reports.overview" => Some(with_db(state, req, overview)),
        "reports.student" => Some(with_db(state, req, student_report)),
        "reports.course" => Some(with_db(state, req, course_report)),
        _ => None,
    }
}
