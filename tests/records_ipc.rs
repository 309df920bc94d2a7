mod test_support;

use serde_json::json;
use test_support::{request_err, request_ok, select_workspace, spawn_sidecar, temp_dir};

#[test]
fn students_crud_preserves_id_and_merges_patch() {
    let workspace = temp_dir("schooldesk-students-crud");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, &workspace);

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "students.create",
        json!({ "student": {
            "firstName": "Ada",
            "lastName": "Lovelace",
            "email": "ada@example.com",
            "parentGuardian": { "name": "Anne" }
        }}),
    );
    let student = &created["student"];
    let id = student["Id"].as_i64().expect("id");
    assert_eq!(student["enrollmentStatus"], "active");
    assert!(student["enrollmentDate"].as_str().is_some_and(|d| !d.is_empty()));
    assert_eq!(student["parentGuardian"]["relationship"], "Parent");

    let updated = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "students.update",
        json!({ "id": id, "patch": { "Id": 999, "phone": "555-0100" } }),
    );
    assert_eq!(updated["student"]["Id"], id);
    assert_eq!(updated["student"]["phone"], "555-0100");
    assert_eq!(updated["student"]["firstName"], "Ada");

    let got = request_ok(&mut stdin, &mut reader, "3", "students.get", json!({ "id": id }));
    assert_eq!(got["student"], updated["student"]);

    let _ = request_ok(&mut stdin, &mut reader, "4", "students.delete", json!({ "id": id }));
    let e = request_err(&mut stdin, &mut reader, "5", "students.get", json!({ "id": id }));
    assert_eq!(e["code"], "not_found");
    assert_eq!(e["message"], "Student not found");
    let e = request_err(&mut stdin, &mut reader, "6", "students.update", json!({ "id": id, "patch": {} }));
    assert_eq!(e["code"], "not_found");
}

#[test]
fn courses_enrollment_is_idempotent() {
    let workspace = temp_dir("schooldesk-courses");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, &workspace);

    let student = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "students.create",
        json!({ "student": { "firstName": "Alan", "lastName": "Turing", "email": "alan@example.com" } }),
    );
    let student_id = student["student"]["Id"].as_i64().expect("student id");

    let course = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "courses.create",
        json!({ "course": {
            "courseName": "Algebra I",
            "courseCode": "MATH101",
            "teacher": "Ms. Noether",
            "creditHours": 3,
            "semester": "Fall 2024",
            "schedule": { "days": ["Mon", "Wed"], "startTime": "09:00", "endTime": "10:00", "room": "B12" }
        }}),
    );
    let course_id = course["course"]["Id"].as_i64().expect("course id");
    assert_eq!(course["course"]["enrolledStudents"], json!([]));

    for id in ["3", "4"] {
        let enrolled = request_ok(
            &mut stdin,
            &mut reader,
            id,
            "courses.enroll",
            json!({ "courseId": course_id, "studentId": student_id }),
        );
        assert_eq!(enrolled["course"]["enrolledStudents"], json!([student_id]));
    }

    let e = request_err(
        &mut stdin,
        &mut reader,
        "5",
        "courses.enroll",
        json!({ "courseId": course_id, "studentId": 4242 }),
    );
    assert_eq!(e["code"], "not_found");

    let updated = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "courses.update",
        json!({ "id": course_id, "patch": { "teacher": "Dr. Noether" } }),
    );
    assert_eq!(updated["course"]["teacher"], "Dr. Noether");
    assert_eq!(updated["course"]["schedule"]["room"], "B12");
    assert_eq!(updated["course"]["enrolledStudents"], json!([student_id]));

    let unenrolled = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "courses.unenroll",
        json!({ "courseId": course_id, "studentId": student_id }),
    );
    assert_eq!(unenrolled["course"]["enrolledStudents"], json!([]));

    let _ = request_ok(&mut stdin, &mut reader, "8", "courses.delete", json!({ "id": course_id }));
    let listed = request_ok(&mut stdin, &mut reader, "9", "courses.list", json!({}));
    assert_eq!(listed["courses"], json!([]));
}

#[test]
fn attendance_mark_upserts_and_summarizes() {
    let workspace = temp_dir("schooldesk-attendance");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, &workspace);

    let first = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "attendance.mark",
        json!({ "studentId": 1, "date": "2024-01-15", "status": "present" }),
    );
    assert_eq!(first["attendance"]["status"], "Present");
    assert_eq!(first["attendance"]["courseId"], 1);
    assert_eq!(first["attendance"]["recordedBy"], "System");
    let id = first["attendance"]["Id"].as_i64().expect("id");

    let second = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "attendance.mark",
        json!({ "studentId": 1, "date": "2024-01-15", "status": "Late" }),
    );
    assert_eq!(second["attendance"]["Id"], id);
    assert_eq!(second["attendance"]["status"], "Late");

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "attendance.create",
        json!({ "attendance": { "studentId": 2, "courseId": 1, "date": "2024-01-15", "status": "ABSENT" } }),
    );

    let e = request_err(
        &mut stdin,
        &mut reader,
        "4",
        "attendance.mark",
        json!({ "studentId": 1, "date": "2024-01-16", "status": "Sick" }),
    );
    assert_eq!(e["code"], "bad_params");

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "attendance.list",
        json!({ "date": "2024-01-15" }),
    );
    assert_eq!(listed["attendance"].as_array().map(|a| a.len()), Some(2));

    let summary = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "reports.attendanceSummary",
        json!({ "date": "2024-01-15" }),
    );
    assert_eq!(summary["total"], 2);
    assert_eq!(summary["counts"], json!({ "Present": 0, "Absent": 1, "Late": 1, "Excused": 0 }));

    let updated = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "attendance.update",
        json!({ "id": id, "patch": { "notes": "bus delay" } }),
    );
    assert_eq!(updated["attendance"]["notes"], "bus delay");
    assert_eq!(updated["attendance"]["status"], "Late");

    let _ = request_ok(&mut stdin, &mut reader, "8", "attendance.delete", json!({ "id": id }));
    let e = request_err(&mut stdin, &mut reader, "9", "attendance.get", json!({ "id": id }));
    assert_eq!(e["code"], "not_found");
}
