use crate::csv_codec::RawRow;
use crate::grading;
use crate::models::{default_category, Address, GradeRecord, ParentGuardian, PostalAddress, StudentRecord};
use chrono::NaiveDate;
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

static INT_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[+-]?\d+").expect("valid integer prefix pattern"));
static FLOAT_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[+-]?(\d+\.?\d*|\.\d+)([eE][+-]?\d+)?").expect("valid float prefix pattern")
});

/// Leading-integer parse: "12abc" -> 12, " 7" -> 7, "3.9" -> 3, "abc" -> None.
pub fn parse_int_prefix(s: &str) -> Option<i64> {
    let m = INT_PREFIX.find(s.trim_start())?;
    m.as_str().parse::<i64>().ok()
}

/// Leading-float parse: "85.5pts" -> 85.5, "1e2" -> 100, "abc" -> None.
pub fn parse_float_prefix(s: &str) -> Option<f64> {
    let t = s.trim_start();
    let unsigned = t.trim_start_matches(['+', '-']);
    if unsigned.starts_with("Infinity") {
        return Some(if t.starts_with('-') {
            f64::NEG_INFINITY
        } else {
            f64::INFINITY
        });
    }
    let m = FLOAT_PREFIX.find(t)?;
    m.as_str().parse::<f64>().ok()
}

/// Trimmed value of the first column present in `keys`; "" when none is.
fn field(row: &RawRow, keys: &[&str]) -> String {
    keys.iter()
        .find_map(|k| row.get(*k))
        .map(|v| v.trim().to_string())
        .unwrap_or_default()
}

fn field_lower(row: &RawRow, keys: &[&str]) -> String {
    field(row, keys).to_lowercase()
}

fn field_or(row: &RawRow, keys: &[&str], default: &str) -> String {
    let v = field(row, keys);
    if v.is_empty() {
        default.to_string()
    } else {
        v
    }
}

fn iso_date(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

pub type StudentImportRecord = StudentRecord;

pub fn normalize_students(rows: &[RawRow], today: NaiveDate) -> Vec<StudentImportRecord> {
    rows.iter().map(|row| normalize_student(row, today)).collect()
}

fn normalize_student(row: &RawRow, today: NaiveDate) -> StudentImportRecord {
    let address_text = field(row, &["address"]);
    let structured = PostalAddress {
        street: field(row, &["addressStreet"]),
        city: field(row, &["addressCity"]),
        state: field(row, &["addressState"]),
        zip_code: field(row, &["addressZipCode"]),
    };
    let address = if address_text.is_empty() && !structured.is_blank() {
        Address::Structured(structured)
    } else {
        Address::Text(address_text)
    };

    StudentRecord {
        first_name: field(row, &["firstName"]),
        last_name: field(row, &["lastName"]),
        email: field_lower(row, &["email"]),
        phone: field(row, &["phone"]),
        date_of_birth: field(row, &["dateOfBirth"]),
        address,
        emergency_contact: field(row, &["emergencyContact"]),
        grade_level: field(row, &["gradeLevel", "grade"]),
        enrollment_status: field_or(row, &["enrollmentStatus", "status"], "active").to_lowercase(),
        enrollment_date: field_or(row, &["enrollmentDate"], &iso_date(today)),
        parent_guardian: ParentGuardian {
            name: field(row, &["parentGuardianName"]),
            relationship: field_or(row, &["parentGuardianRelationship"], "Parent"),
            primary_phone: field(row, &["parentGuardianPhone", "parentGuardianPrimaryPhone"]),
            secondary_phone: field(row, &["parentGuardianSecondaryPhone"]),
            primary_email: field_lower(row, &["parentGuardianEmail", "parentGuardianPrimaryEmail"]),
            secondary_email: field_lower(row, &["parentGuardianSecondaryEmail"]),
            address: PostalAddress {
                street: field(row, &["parentGuardianAddressStreet"]),
                city: field(row, &["parentGuardianAddressCity"]),
                state: field(row, &["parentGuardianAddressState"]),
                zip_code: field(row, &["parentGuardianAddressZipCode"]),
            },
        },
        communication_history: Vec::new(),
    }
}

/// A grade row after type coercion. Ids that did not parse stay `None` so the
/// validator, not the normalizer, decides what to reject.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeImportRecord {
    pub student_id: Option<i64>,
    pub course_id: Option<i64>,
    pub assignment_name: String,
    pub category: String,
    pub points: f64,
    pub max_points: f64,
    pub percentage: f64,
    pub letter_grade: String,
    pub date_recorded: String,
    pub comments: String,
    /// Source cells, kept for presence checks during validation.
    #[serde(skip)]
    pub source: RawRow,
}

impl GradeImportRecord {
    /// Store shape; `None` while either id is not a number.
    pub fn to_record(&self) -> Option<GradeRecord> {
        Some(GradeRecord {
            student_id: self.student_id?,
            course_id: self.course_id?,
            assignment_name: self.assignment_name.clone(),
            category: self.category.clone(),
            points: self.points,
            max_points: self.max_points,
            percentage: self.percentage,
            letter_grade: self.letter_grade.clone(),
            date_recorded: self.date_recorded.clone(),
            comments: self.comments.clone(),
        })
    }
}

pub fn normalize_grades(rows: &[RawRow], today: NaiveDate) -> Vec<GradeImportRecord> {
    rows.iter().map(|row| normalize_grade(row, today)).collect()
}

fn normalize_grade(row: &RawRow, today: NaiveDate) -> GradeImportRecord {
    let points = parse_float_prefix(&field(row, &["points"])).unwrap_or(0.0);
    let max_points = parse_float_prefix(&field(row, &["maxPoints"])).unwrap_or(100.0);
    let percentage = grading::import_percentage(points, max_points);

    GradeImportRecord {
        student_id: parse_int_prefix(&field(row, &["studentId"])),
        course_id: parse_int_prefix(&field(row, &["courseId"])),
        assignment_name: field(row, &["assignmentName"]),
        category: field_or(row, &["category"], &default_category()),
        points,
        max_points,
        percentage,
        letter_grade: grading::import_letter_grade(percentage).to_string(),
        date_recorded: field_or(row, &["dateRecorded"], &iso_date(today)),
        comments: field(row, &["comments"]),
        source: row.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 15).expect("date")
    }

    fn row(pairs: &[(&str, &str)]) -> RawRow {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn numeric_prefix_parsing() {
        assert_eq!(parse_int_prefix("12abc"), Some(12));
        assert_eq!(parse_int_prefix("  7"), Some(7));
        assert_eq!(parse_int_prefix("3.9"), Some(3));
        assert_eq!(parse_int_prefix("-4"), Some(-4));
        assert_eq!(parse_int_prefix("abc"), None);
        assert_eq!(parse_int_prefix(""), None);

        assert_eq!(parse_float_prefix("85.5pts"), Some(85.5));
        assert_eq!(parse_float_prefix(".5"), Some(0.5));
        assert_eq!(parse_float_prefix("1e2"), Some(100.0));
        assert_eq!(parse_float_prefix("7."), Some(7.0));
        assert_eq!(parse_float_prefix("-Infinity"), Some(f64::NEG_INFINITY));
        assert_eq!(parse_float_prefix("n/a"), None);
    }

    #[test]
    fn students_are_trimmed_lowercased_and_defaulted() {
        let rows = vec![row(&[
            ("firstName", "  Ada "),
            ("lastName", "Lovelace"),
            ("email", " ADA@Example.COM "),
            ("dateOfBirth", "2005-01-15"),
            ("grade", "10"),
            ("parentGuardianEmail", "Parent@Example.com"),
        ])];
        let out = normalize_students(&rows, today());
        assert_eq!(out.len(), 1);
        let s = &out[0];
        assert_eq!(s.first_name, "Ada");
        assert_eq!(s.email, "ada@example.com");
        assert_eq!(s.grade_level, "10");
        assert_eq!(s.enrollment_status, "active");
        assert_eq!(s.enrollment_date, "2024-01-15");
        assert_eq!(s.phone, "");
        assert_eq!(s.address, Address::Text(String::new()));
        assert_eq!(s.parent_guardian.relationship, "Parent");
        assert_eq!(s.parent_guardian.primary_email, "parent@example.com");
        assert_eq!(s.parent_guardian.address, PostalAddress::default());
        assert!(s.communication_history.is_empty());
    }

    #[test]
    fn students_pick_structured_address_only_without_free_text() {
        let rows = vec![
            row(&[("addressStreet", "1 Main"), ("addressCity", "Springfield")]),
            row(&[("address", "2 Elm St"), ("addressCity", "Ignored")]),
        ];
        let out = normalize_students(&rows, today());
        assert_eq!(
            out[0].address,
            Address::Structured(PostalAddress {
                street: "1 Main".into(),
                city: "Springfield".into(),
                ..PostalAddress::default()
            })
        );
        assert_eq!(out[1].address, Address::Text("2 Elm St".into()));
    }

    #[test]
    fn grades_derive_percentage_and_letter() {
        let rows = vec![
            row(&[("studentId", "1"), ("courseId", "2"), ("assignmentName", " Quiz "), ("points", "97"), ("maxPoints", "100")]),
            row(&[("studentId", "1"), ("courseId", "2"), ("assignmentName", "Lab"), ("points", "59.9"), ("maxPoints", "100")]),
            row(&[("studentId", "1"), ("courseId", "2"), ("assignmentName", "Lab 2"), ("points", "59"), ("maxPoints", "100")]),
        ];
        let out = normalize_grades(&rows, today());
        assert_eq!(out[0].percentage, 97.0);
        assert_eq!(out[0].letter_grade, "A+");
        assert_eq!(out[0].assignment_name, "Quiz");
        assert_eq!(out[0].category, "Assignment");
        assert_eq!(out[0].date_recorded, "2024-01-15");
        assert_eq!(out[1].percentage, 60.0);
        assert_eq!(out[1].letter_grade, "D-");
        assert_eq!(out[2].letter_grade, "F");
    }

    #[test]
    fn grades_never_fail_on_garbage() {
        let rows = vec![row(&[("studentId", "abc"), ("points", "lots"), ("maxPoints", "")])];
        let out = normalize_grades(&rows, today());
        assert_eq!(out[0].student_id, None);
        assert_eq!(out[0].course_id, None);
        assert_eq!(out[0].points, 0.0);
        assert_eq!(out[0].max_points, 100.0);
        assert_eq!(out[0].letter_grade, "F");
        assert!(out[0].to_record().is_none());
    }

    #[test]
    fn grades_zero_max_points_gives_zero_percentage() {
        let rows = vec![row(&[("points", "5"), ("maxPoints", "0")])];
        let out = normalize_grades(&rows, today());
        assert_eq!(out[0].max_points, 0.0);
        assert_eq!(out[0].percentage, 0.0);
    }

    #[test]
    fn grade_normalization_is_deterministic() {
        let rows = vec![row(&[("studentId", "3"), ("courseId", "4"), ("points", "83"), ("maxPoints", "90")])];
        let a = normalize_grades(&rows, today());
        let b = normalize_grades(&rows, today());
        assert_eq!(a, b);
        assert_eq!(a[0].letter_grade, "A-");
    }
}
