use crate::csv_codec::{self, CsvError, RawRow};
use crate::models::{Address, Grade, Student};
use crate::normalize::{self, GradeImportRecord, StudentImportRecord};
use crate::validate::{self, RowRef, ValidationErrorEntry};
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, info_span, warn};

pub const NO_DATA_MESSAGE: &str = "No data found in the uploaded file";

#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("import file is not valid UTF-8 text")]
    NotText,
    #[error(transparent)]
    Csv(#[from] CsvError),
    #[error("{}", NO_DATA_MESSAGE)]
    NoData,
    #[error("failed to load existing {entity}: {cause:#}")]
    Store {
        entity: &'static str,
        cause: anyhow::Error,
    },
    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Stages of one import call. Import errors are only raised while `Parsing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportStage {
    Parsing,
    Normalizing,
    Validating,
    Persisting,
    Done,
}

/// Identity used for duplicate detection, shared by import rows and stored records.
pub trait NaturalKey {
    fn natural_key(&self) -> String;
}

pub trait ImportEntity: NaturalKey + Serialize + Sized {
    /// Plural entity name used in file names and log fields.
    const ENTITY: &'static str;

    fn normalize(rows: &[RawRow], today: NaiveDate) -> Vec<Self>;
    fn validate(records: &[Self]) -> Vec<ValidationErrorEntry>;
    fn duplicate_message(&self) -> String;
}

/// The only two store operations the importer relies on.
pub trait RecordStore<E: ImportEntity> {
    type Record: NaturalKey;

    fn get_all(&mut self) -> anyhow::Result<Vec<Self::Record>>;
    fn create(&mut self, record: &E) -> anyhow::Result<i64>;
}

/// Flat column view of a stored record for CSV export.
pub trait ExportRow {
    fn export_row(&self) -> RawRow;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateReason {
    Duplicate,
    PersistFailed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateEntry {
    pub row: usize,
    pub reason: DuplicateReason,
    pub key: String,
    pub message: String,
    pub data: Value,
}

/// What happened to a single input row.
#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    Created,
    Invalid(ValidationErrorEntry),
    Duplicate(DuplicateEntry),
    PersistFailed(DuplicateEntry),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResult {
    pub success_count: usize,
    pub total_rows: usize,
    pub errors: Vec<ValidationErrorEntry>,
    pub duplicates: Vec<DuplicateEntry>,
}

impl ImportResult {
    /// Folds per-row outcomes (in input order) into the caller-facing summary.
    pub fn fold(total_rows: usize, outcomes: Vec<RowOutcome>) -> Self {
        let mut success_count = 0usize;
        let mut errors = Vec::new();
        let mut duplicates = Vec::new();
        for outcome in outcomes {
            match outcome {
                RowOutcome::Created => success_count += 1,
                RowOutcome::Invalid(e) => errors.push(e),
                RowOutcome::Duplicate(d) | RowOutcome::PersistFailed(d) => duplicates.push(d),
            }
        }
        for (i, d) in duplicates.iter().enumerate() {
            errors.push(ValidationErrorEntry {
                row: RowRef::duplicate(i + 1),
                errors: vec![d.message.clone()],
                data: d.data.clone(),
            });
        }
        Self {
            success_count,
            total_rows,
            errors,
            duplicates,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportSummary {
    pub success: bool,
    pub count: usize,
    pub path: Option<PathBuf>,
}

/// Decodes raw file bytes to text; a leading byte-order mark is left for the codec.
pub fn decode_source(bytes: &[u8]) -> Result<String, TransferError> {
    String::from_utf8(bytes.to_vec()).map_err(|_| TransferError::NotText)
}

/// Parse, normalize, validate, de-duplicate and persist one CSV batch.
///
/// Only source-level problems fail the call. Once rows exist every row ends up in
/// exactly one bucket of the returned summary, and a failing `create` never stops
/// the rows after it. Log lines are tagged with `import_id`.
pub fn bulk_import<E, S>(
    import_id: uuid::Uuid,
    text: &str,
    store: &mut S,
    today: NaiveDate,
) -> Result<ImportResult, TransferError>
where
    E: ImportEntity,
    S: RecordStore<E>,
{
    let span = info_span!("import", entity = E::ENTITY, import_id = %import_id);
    let _guard = span.enter();

    debug!(stage = ?ImportStage::Parsing);
    let rows = csv_codec::parse(text)?;
    if rows.is_empty() {
        return Err(TransferError::NoData);
    }
    let existing = store.get_all().map_err(|cause| TransferError::Store {
        entity: E::ENTITY,
        cause,
    })?;
    let total_rows = rows.len();

    debug!(stage = ?ImportStage::Normalizing, rows = total_rows);
    let records = E::normalize(&rows, today);

    debug!(stage = ?ImportStage::Validating);
    let mut invalid = E::validate(&records)
        .into_iter()
        .filter_map(|e| match e.row {
            RowRef::Line(n) => Some((n - 1, e)),
            RowRef::Tag(_) => None,
        })
        .collect::<std::collections::HashMap<_, _>>();

    debug!(stage = ?ImportStage::Persisting, invalid = invalid.len());
    let mut seen = existing
        .iter()
        .map(NaturalKey::natural_key)
        .collect::<HashSet<_>>();
    let mut outcomes = Vec::with_capacity(total_rows);
    for (index, record) in records.iter().enumerate() {
        if let Some(e) = invalid.remove(&index) {
            outcomes.push(RowOutcome::Invalid(e));
            continue;
        }
        let row = index + 1;
        let key = record.natural_key();
        let data = serde_json::to_value(record).unwrap_or(Value::Null);
        if seen.contains(&key) {
            outcomes.push(RowOutcome::Duplicate(DuplicateEntry {
                row,
                reason: DuplicateReason::Duplicate,
                key,
                message: record.duplicate_message(),
                data,
            }));
            continue;
        }
        match store.create(record) {
            Ok(id) => {
                debug!(row, id, "row created");
                seen.insert(key);
                outcomes.push(RowOutcome::Created);
            }
            Err(e) => {
                warn!(row, error = %e, "row not persisted");
                outcomes.push(RowOutcome::PersistFailed(DuplicateEntry {
                    row,
                    reason: DuplicateReason::PersistFailed,
                    key,
                    message: format!("Failed to create record: {}", e),
                    data,
                }));
            }
        }
    }

    let result = ImportResult::fold(total_rows, outcomes);
    debug!(stage = ?ImportStage::Done);
    info!(
        total = result.total_rows,
        created = result.success_count,
        duplicates = result.duplicates.len(),
        errors = result.errors.len(),
        "import finished"
    );
    Ok(result)
}

/// Writes every stored record to `<out_dir>/<entity>-export-<date>.csv`.
pub fn bulk_export<E, S>(store: &mut S, out_dir: &Path, today: NaiveDate) -> Result<ExportSummary, TransferError>
where
    E: ImportEntity,
    S: RecordStore<E>,
    S::Record: ExportRow,
{
    let records = store.get_all().map_err(|cause| TransferError::Store {
        entity: E::ENTITY,
        cause,
    })?;
    let rows = records.iter().map(ExportRow::export_row).collect::<Vec<_>>();
    let Some(text) = csv_codec::serialize(&rows)? else {
        info!(entity = E::ENTITY, "nothing to export");
        return Ok(ExportSummary {
            success: true,
            count: 0,
            path: None,
        });
    };
    let path = out_dir.join(csv_codec::export_filename(E::ENTITY, today));
    write_text(&path, &text)?;
    info!(entity = E::ENTITY, count = rows.len(), path = %path.display(), "export written");
    Ok(ExportSummary {
        success: true,
        count: rows.len(),
        path: Some(path),
    })
}

pub fn write_text(path: &Path, text: &str) -> Result<(), TransferError> {
    let wrap = |source| TransferError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(wrap)?;
    }
    std::fs::write(path, text).map_err(wrap)
}

fn student_key(email: &str) -> String {
    email.trim().to_lowercase()
}

fn grade_key(student_id: Option<i64>, course_id: Option<i64>, assignment: &str) -> String {
    let id = |v: Option<i64>| v.map(|n| n.to_string()).unwrap_or_else(|| "NaN".to_string());
    format!("{}|{}|{}", id(student_id), id(course_id), assignment.trim().to_lowercase())
}

impl NaturalKey for StudentImportRecord {
    fn natural_key(&self) -> String {
        student_key(&self.email)
    }
}

impl NaturalKey for Student {
    fn natural_key(&self) -> String {
        student_key(&self.record.email)
    }
}

impl ImportEntity for StudentImportRecord {
    const ENTITY: &'static str = "students";

    fn normalize(rows: &[RawRow], today: NaiveDate) -> Vec<Self> {
        normalize::normalize_students(rows, today)
    }

    fn validate(records: &[Self]) -> Vec<ValidationErrorEntry> {
        validate::validate_students(records)
    }

    fn duplicate_message(&self) -> String {
        format!("Student with email {} already exists", self.email)
    }
}

impl NaturalKey for GradeImportRecord {
    fn natural_key(&self) -> String {
        grade_key(self.student_id, self.course_id, &self.assignment_name)
    }
}

impl NaturalKey for Grade {
    fn natural_key(&self) -> String {
        grade_key(
            Some(self.record.student_id),
            Some(self.record.course_id),
            &self.record.assignment_name,
        )
    }
}

impl ImportEntity for GradeImportRecord {
    const ENTITY: &'static str = "grades";

    fn normalize(rows: &[RawRow], today: NaiveDate) -> Vec<Self> {
        normalize::normalize_grades(rows, today)
    }

    fn validate(records: &[Self]) -> Vec<ValidationErrorEntry> {
        validate::validate_grades(records)
    }

    fn duplicate_message(&self) -> String {
        format!(
            "Grade for assignment \"{}\" already exists for student {} in course {}",
            self.assignment_name,
            self.student_id.unwrap_or_default(),
            self.course_id.unwrap_or_default()
        )
    }
}

fn put(row: &mut RawRow, key: &str, value: impl Into<String>) {
    row.insert(key.to_string(), value.into());
}

impl ExportRow for Student {
    fn export_row(&self) -> RawRow {
        let r = &self.record;
        let mut row = RawRow::new();
        put(&mut row, "Id", self.id.to_string());
        put(&mut row, "firstName", r.first_name.as_str());
        put(&mut row, "lastName", r.last_name.as_str());
        put(&mut row, "email", r.email.as_str());
        put(&mut row, "phone", r.phone.as_str());
        put(&mut row, "dateOfBirth", r.date_of_birth.as_str());
        let (text, parts) = match &r.address {
            Address::Text(t) => (t.clone(), Default::default()),
            Address::Structured(p) => (String::new(), p.clone()),
        };
        put(&mut row, "address", text);
        put(&mut row, "addressStreet", parts.street);
        put(&mut row, "addressCity", parts.city);
        put(&mut row, "addressState", parts.state);
        put(&mut row, "addressZipCode", parts.zip_code);
        put(&mut row, "emergencyContact", r.emergency_contact.as_str());
        put(&mut row, "gradeLevel", r.grade_level.as_str());
        put(&mut row, "enrollmentStatus", r.enrollment_status.as_str());
        put(&mut row, "enrollmentDate", r.enrollment_date.as_str());
        let pg = &r.parent_guardian;
        put(&mut row, "parentGuardianName", pg.name.as_str());
        put(&mut row, "parentGuardianRelationship", pg.relationship.as_str());
        put(&mut row, "parentGuardianPhone", pg.primary_phone.as_str());
        put(&mut row, "parentGuardianSecondaryPhone", pg.secondary_phone.as_str());
        put(&mut row, "parentGuardianEmail", pg.primary_email.as_str());
        put(&mut row, "parentGuardianSecondaryEmail", pg.secondary_email.as_str());
        put(&mut row, "parentGuardianAddressStreet", pg.address.street.as_str());
        put(&mut row, "parentGuardianAddressCity", pg.address.city.as_str());
        put(&mut row, "parentGuardianAddressState", pg.address.state.as_str());
        put(&mut row, "parentGuardianAddressZipCode", pg.address.zip_code.as_str());
        row
    }
}

impl ExportRow for Grade {
    fn export_row(&self) -> RawRow {
        let r = &self.record;
        let mut row = RawRow::new();
        put(&mut row, "Id", self.id.to_string());
        put(&mut row, "studentId", r.student_id.to_string());
        put(&mut row, "courseId", r.course_id.to_string());
        put(&mut row, "assignmentName", r.assignment_name.as_str());
        put(&mut row, "category", r.category.as_str());
        put(&mut row, "points", r.points.to_string());
        put(&mut row, "maxPoints", r.max_points.to_string());
        put(&mut row, "percentage", r.percentage.to_string());
        put(&mut row, "letterGrade", r.letter_grade.as_str());
        put(&mut row, "dateRecorded", r.date_recorded.as_str());
        put(&mut row, "comments", r.comments.as_str());
        row
    }
}

/// One sample row per importable entity, written by `templates.write`.
pub fn template_rows(entity: &str) -> Option<Vec<RawRow>> {
    let pairs: &[(&str, &str)] = match entity {
        "students" => &[
            ("firstName", "John"),
            ("lastName", "Doe"),
            ("email", "john.doe@email.com"),
            ("phone", "(555) 123-4567"),
            ("dateOfBirth", "2005-01-15"),
            ("address", "123 Main St, City, State 12345"),
            ("emergencyContact", "Jane Doe - (555) 987-6543"),
            ("gradeLevel", "10"),
            ("enrollmentStatus", "active"),
            ("enrollmentDate", "2024-01-15"),
            ("parentGuardianName", "Jane Doe"),
            ("parentGuardianRelationship", "Mother"),
            ("parentGuardianPhone", "(555) 987-6543"),
            ("parentGuardianEmail", "jane.doe@email.com"),
        ],
        "grades" => &[
            ("studentId", "1"),
            ("courseId", "1"),
            ("assignmentName", "Math Test 1"),
            ("category", "Test"),
            ("points", "85"),
            ("maxPoints", "100"),
            ("dateRecorded", "2024-01-15"),
            ("comments", "Good work"),
        ],
        _ => return None,
    };
    let row = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect::<RawRow>();
    Some(vec![row])
}
