mod test_support;

use serde_json::json;
use test_support::{request_err, request_ok, select_workspace, spawn_sidecar, temp_dir, write_file};

const ROSTER: &str = "firstName,lastName,email,phone,dateOfBirth,gradeLevel,addressStreet,addressCity\n\
Ada,Lovelace,ADA@example.com,555-0100,2005-01-15,10,1 Main St,Springfield\n\
Alan,Turing,alan@example.com,,2004-06-23,11,,\n\
Grace,Hopper,,,2005-12-09,10,,\n\
Ada,Again,ada@EXAMPLE.com,,2005-01-15,10,,\n";

#[test]
fn students_import_reports_every_row_once() {
    let workspace = temp_dir("schooldesk-students-import");
    let source = write_file(&workspace, "roster.csv", ROSTER);
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, &workspace);

    let result = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "students.import",
        json!({ "inPath": source.to_string_lossy() }),
    );
    assert_eq!(result["totalRows"], 4);
    assert_eq!(result["successCount"], 2);
    assert!(result["importId"].as_str().is_some_and(|s| s.len() == 36));

    let errors = result["errors"].as_array().expect("errors");
    assert_eq!(errors.len(), 2);
    assert_eq!(errors[0]["row"], 3);
    assert_eq!(errors[0]["errors"][0], "Missing required field: email");
    assert_eq!(errors[1]["row"], "duplicate_1");

    let duplicates = result["duplicates"].as_array().expect("duplicates");
    assert_eq!(duplicates.len(), 1);
    assert_eq!(duplicates[0]["row"], 4);
    assert_eq!(duplicates[0]["reason"], "duplicate");
    assert_eq!(
        duplicates[0]["message"],
        "Student with email ada@example.com already exists"
    );

    let listed = request_ok(&mut stdin, &mut reader, "2", "students.list", json!({}));
    let students = listed["students"].as_array().expect("students");
    assert_eq!(students.len(), 2);
    assert_eq!(students[0]["email"], "ada@example.com");
    assert_eq!(students[0]["address"]["city"], "Springfield");
    assert_eq!(students[1]["address"], "");
    assert_eq!(students[1]["enrollmentStatus"], "active");

    // A second run of the same file only finds duplicates and the invalid row.
    let again = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "students.import",
        json!({ "inPath": source.to_string_lossy() }),
    );
    assert_eq!(again["successCount"], 0);
    assert_eq!(again["duplicates"].as_array().map(|d| d.len()), Some(3));
}

#[test]
fn students_export_then_import_into_fresh_workspace() {
    let first = temp_dir("schooldesk-students-export-a");
    let second = temp_dir("schooldesk-students-export-b");
    let source = write_file(&first, "roster.csv", ROSTER);
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    select_workspace(&mut stdin, &mut reader, &first);
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "students.import",
        json!({ "inPath": source.to_string_lossy() }),
    );
    let out_dir = first.join("out");
    let export = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "students.export",
        json!({ "outDir": out_dir.to_string_lossy() }),
    );
    assert_eq!(export["success"], true);
    assert_eq!(export["count"], 2);
    let path = export["path"].as_str().expect("export path").to_string();
    assert!(path.contains("students-export-"));
    let before = request_ok(&mut stdin, &mut reader, "3", "students.list", json!({}));

    select_workspace(&mut stdin, &mut reader, &second);
    let result = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "students.import",
        json!({ "inPath": path }),
    );
    assert_eq!(result["successCount"], 2);
    assert_eq!(result["errors"].as_array().map(|e| e.len()), Some(0));
    let after = request_ok(&mut stdin, &mut reader, "5", "students.list", json!({}));
    assert_eq!(before, after);
}

#[test]
fn students_import_fatal_errors() {
    let workspace = temp_dir("schooldesk-students-fatal");
    let header_only = write_file(&workspace, "empty.csv", "firstName,lastName,email,dateOfBirth\n");
    let broken = write_file(&workspace, "broken.csv", "firstName,lastName\n\"Ada,Lovelace\n");
    let workbook = write_file(&workspace, "roster.xlsx", "PK");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, &workspace);

    let e = request_err(
        &mut stdin,
        &mut reader,
        "1",
        "students.import",
        json!({ "inPath": header_only.to_string_lossy() }),
    );
    assert_eq!(e["code"], "no_data");
    assert_eq!(e["message"], "No data found in the uploaded file");

    let e = request_err(
        &mut stdin,
        &mut reader,
        "2",
        "students.import",
        json!({ "inPath": broken.to_string_lossy() }),
    );
    assert_eq!(e["code"], "parse_failed");
    assert!(e["message"]
        .as_str()
        .is_some_and(|m| m.starts_with("CSV parsing errors:")));

    let e = request_err(
        &mut stdin,
        &mut reader,
        "3",
        "students.import",
        json!({ "inPath": workbook.to_string_lossy() }),
    );
    assert_eq!(e["code"], "unsupported_format");

    let listed = request_ok(&mut stdin, &mut reader, "4", "students.list", json!({}));
    assert_eq!(listed["students"].as_array().map(|s| s.len()), Some(0));
}

#[test]
fn empty_export_writes_no_file() {
    let workspace = temp_dir("schooldesk-students-empty-export");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, &workspace);
    let export = request_ok(&mut stdin, &mut reader, "1", "students.export", json!({}));
    assert_eq!(export["success"], true);
    assert_eq!(export["count"], 0);
    assert!(export["path"].is_null());
    assert!(!workspace.join("exports").exists());
}
