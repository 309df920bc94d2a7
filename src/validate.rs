use crate::normalize::{parse_float_prefix, GradeImportRecord, StudentImportRecord};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::sync::LazyLock;

static EMAIL_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email pattern"));

const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%B %d, %Y"];
const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"];

/// Where a reported problem came from: an input data row, or the n-th duplicate.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RowRef {
    Line(usize),
    Tag(String),
}

impl RowRef {
    pub fn duplicate(n: usize) -> Self {
        RowRef::Tag(format!("duplicate_{}", n))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationErrorEntry {
    pub row: RowRef,
    pub errors: Vec<String>,
    pub data: Value,
}

fn entry(index: usize, errors: Vec<String>, record: &impl Serialize) -> ValidationErrorEntry {
    ValidationErrorEntry {
        row: RowRef::Line(index + 1),
        errors,
        data: serde_json::to_value(record).unwrap_or(Value::Null),
    }
}

pub fn is_valid_email(s: &str) -> bool {
    EMAIL_SHAPE.is_match(s)
}

pub fn is_calendar_date(s: &str) -> bool {
    let s = s.trim();
    DATE_FORMATS
        .iter()
        .any(|f| NaiveDate::parse_from_str(s, f).is_ok())
        || DATETIME_FORMATS
            .iter()
            .any(|f| NaiveDateTime::parse_from_str(s, f).is_ok())
        || DateTime::parse_from_rfc3339(s).is_ok()
}

pub fn validate_students(records: &[StudentImportRecord]) -> Vec<ValidationErrorEntry> {
    let mut out = Vec::new();
    for (i, r) in records.iter().enumerate() {
        let mut errors = Vec::new();
        for (name, value) in [
            ("firstName", &r.first_name),
            ("lastName", &r.last_name),
            ("email", &r.email),
            ("dateOfBirth", &r.date_of_birth),
        ] {
            if value.trim().is_empty() {
                errors.push(format!("Missing required field: {}", name));
            }
        }
        if !r.email.is_empty() && !is_valid_email(&r.email) {
            errors.push("Invalid email format".to_string());
        }
        if !r.date_of_birth.is_empty() && !is_calendar_date(&r.date_of_birth) {
            errors.push("Invalid date format for dateOfBirth".to_string());
        }
        if !errors.is_empty() {
            out.push(entry(i, errors, r));
        }
    }
    out
}

pub fn validate_grades(records: &[GradeImportRecord]) -> Vec<ValidationErrorEntry> {
    let mut out = Vec::new();
    for (i, r) in records.iter().enumerate() {
        let cell = |key: &str| {
            r.source
                .get(key)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
        };
        let mut errors = Vec::new();
        for name in ["studentId", "courseId", "assignmentName", "points", "maxPoints"] {
            if cell(name).is_none() {
                errors.push(format!("Missing required field: {}", name));
            }
        }

        if cell("studentId").is_some() && !r.student_id.is_some_and(|v| v > 0) {
            errors.push("studentId must be a positive integer".to_string());
        }
        if cell("courseId").is_some() && !r.course_id.is_some_and(|v| v > 0) {
            errors.push("courseId must be a positive integer".to_string());
        }

        let points = cell("points").map(parse_float_prefix);
        let max_points = cell("maxPoints").map(parse_float_prefix);
        if let Some(p) = points {
            if !p.is_some_and(|v| v >= 0.0) {
                errors.push("points must be a non-negative number".to_string());
            }
        }
        if let Some(m) = max_points {
            if !m.is_some_and(|v| v > 0.0) {
                errors.push("maxPoints must be a positive number".to_string());
            }
        }
        if let (Some(Some(p)), Some(Some(m))) = (points, max_points) {
            if p > m {
                errors.push("points cannot exceed maxPoints".to_string());
            }
        }

        if !errors.is_empty() {
            out.push(entry(i, errors, r));
        }
    }
    out
}
