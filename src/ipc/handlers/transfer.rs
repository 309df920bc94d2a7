use crate::csv_codec;
use crate::ipc::handlers::activities::record_activity;
use crate::ipc::handlers::setup::{import_export_config, ImportExportConfig};
use crate::ipc::helpers::{get_optional_str, get_required_str, to_json, today, with_workspace, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::models::ActivityRecord;
use crate::normalize::{GradeImportRecord, StudentImportRecord};
use crate::store::{SqliteGrades, SqliteStudents};
use crate::transfer::{self, ExportRow, ImportEntity, RecordStore, TransferError};
use rusqlite::Connection;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tracing::info;

impl From<TransferError> for HandlerErr {
    fn from(e: TransferError) -> Self {
        let code = match &e {
            TransferError::NotText | TransferError::Csv(_) => "parse_failed",
            TransferError::NoData => "no_data",
            TransferError::Store { .. } => "db_query_failed",
            TransferError::Write { .. } => "export_failed",
        };
        HandlerErr::new(code, e.to_string())
    }
}

fn load_config(conn: &Connection, workspace: &Path) -> Result<ImportExportConfig, HandlerErr> {
    import_export_config(conn, workspace).map_err(HandlerErr::db_query)
}

/// Reads an import source after the extension and size checks.
fn read_source(path: &Path, max_bytes: u64) -> Result<String, HandlerErr> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "csv" => {}
        "xlsx" | "xls" => {
            return Err(HandlerErr::new(
                "unsupported_format",
                "Excel workbooks are not supported; save the sheet as CSV and import that file",
            ))
        }
        _ => {
            return Err(HandlerErr::new(
                "unsupported_format",
                "Please upload a CSV or Excel file",
            )
            .with_details(json!({ "extension": ext })))
        }
    }

    let meta = std::fs::metadata(path).map_err(|e| {
        HandlerErr::new("parse_failed", format!("cannot read {}: {}", path.display(), e))
    })?;
    if meta.len() > max_bytes {
        return Err(HandlerErr::new(
            "file_too_large",
            format!("import file is {} bytes; the limit is {} bytes", meta.len(), max_bytes),
        )
        .with_details(json!({ "size": meta.len(), "limit": max_bytes })));
    }
    let bytes = std::fs::read(path).map_err(|e| {
        HandlerErr::new("parse_failed", format!("cannot read {}: {}", path.display(), e))
    })?;
    Ok(transfer::decode_source(&bytes)?)
}

fn run_import<E, S>(workspace: &Path, conn: &Connection, params: &Value, mut store: S) -> Result<Value, HandlerErr>
where
    E: ImportEntity,
    S: RecordStore<E>,
{
    let in_path = PathBuf::from(get_required_str(params, "inPath")?);
    let config = load_config(conn, workspace)?;
    let text = read_source(&in_path, config.max_import_bytes)?;
    let import_id = uuid::Uuid::new_v4();
    let result = transfer::bulk_import::<E, S>(import_id, &text, &mut store, today())?;

    let mut activity = ActivityRecord::new(
        "import",
        format!("Imported {} of {} {}", result.success_count, result.total_rows, E::ENTITY),
    );
    activity.entity = Some(E::ENTITY.to_string());
    activity.details = json!({
        "importId": import_id.to_string(),
        "successCount": result.success_count,
        "totalRows": result.total_rows,
        "errorCount": result.errors.len(),
        "duplicateCount": result.duplicates.len(),
    });
    record_activity(conn, activity);

    let mut out = to_json(&result)?;
    out["importId"] = Value::String(import_id.to_string());
    Ok(out)
}

fn export_dir(workspace: &Path, conn: &Connection, params: &Value) -> Result<PathBuf, HandlerErr> {
    match get_optional_str(params, "outDir") {
        Some(dir) => Ok(PathBuf::from(dir)),
        None => Ok(load_config(conn, workspace)?.export_dir),
    }
}

fn run_export<E, S>(workspace: &Path, conn: &Connection, params: &Value, mut store: S) -> Result<Value, HandlerErr>
where
    E: ImportEntity,
    S: RecordStore<E>,
    S::Record: ExportRow,
{
    let out_dir = export_dir(workspace, conn, params)?;
    let summary = transfer::bulk_export::<E, S>(&mut store, &out_dir, today())?;
    if let Some(path) = &summary.path {
        let mut activity = ActivityRecord::new("export", format!("Exported {} {}", summary.count, E::ENTITY));
        activity.entity = Some(E::ENTITY.to_string());
        activity.details = json!({ "count": summary.count, "path": path.to_string_lossy() });
        record_activity(conn, activity);
    }
    Ok(json!({
        "success": summary.success,
        "count": summary.count,
        "path": summary.path.map(|p| p.to_string_lossy().to_string()),
    }))
}

fn students_import(workspace: &Path, conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    run_import::<StudentImportRecord, _>(workspace, conn, params, SqliteStudents::new(conn))
}

fn grades_import(workspace: &Path, conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    run_import::<GradeImportRecord, _>(workspace, conn, params, SqliteGrades::new(conn))
}

fn students_export(workspace: &Path, conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    run_export::<StudentImportRecord, _>(workspace, conn, params, SqliteStudents::new(conn))
}

fn grades_export(workspace: &Path, conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    run_export::<GradeImportRecord, _>(workspace, conn, params, SqliteGrades::new(conn))
}

fn templates_write(workspace: &Path, conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let entity = get_required_str(params, "entity")?;
    let Some(rows) = transfer::template_rows(&entity) else {
        return Err(HandlerErr::bad_params("entity must be one of: students, grades"));
    };
    let text = csv_codec::serialize(&rows)
        .map_err(|e| HandlerErr::new("export_failed", e.to_string()))?
        .unwrap_or_default();
    let path = export_dir(workspace, conn, params)?.join(format!("{}-template.csv", entity));
    transfer::write_text(&path, &text)?;
    info!(entity = %entity, path = %path.display(), "template written");
    Ok(json!({ "path": path.to_string_lossy() }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "students.import" => Some(with_workspace(state, req, students_import)),
        "grades.import" => Some(with_workspace(state, req, grades_import)),
        "students.export" => Some(with_workspace(state, req, students_export)),
        "grades.export" => Some(with_workspace(state, req, grades_export)),
        "templates.write" => Some(with_workspace(state, req, templates_write)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_file(name: &str, contents: &[u8]) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("schooldesk-source-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).expect("create dir");
        let path = dir.join(name);
        std::fs::write(&path, contents).expect("write file");
        path
    }

    #[test]
    fn excel_sources_are_rejected_before_reading() {
        let e = read_source(Path::new("/nonexistent/roster.XLSX"), 1024).err().expect("rejected");
        assert_eq!(e.code, "unsupported_format");
        let e = read_source(Path::new("/nonexistent/roster.txt"), 1024).err().expect("rejected");
        assert_eq!(e.code, "unsupported_format");
    }

    #[test]
    fn oversized_sources_are_rejected() {
        let path = temp_file("big.csv", &[b'a'; 2048]);
        let e = read_source(&path, 1024).err().expect("rejected");
        assert_eq!(e.code, "file_too_large");
        assert_eq!(e.details.expect("details")["limit"], 1024);
    }

    #[test]
    fn non_utf8_sources_fail_to_parse() {
        let path = temp_file("latin1.csv", &[b'a', b'\n', 0xff, 0xfe, b'\n']);
        let e = read_source(&path, 1024).err().expect("rejected");
        assert_eq!(e.code, "parse_failed");
    }

    #[test]
    fn transfer_errors_map_to_ipc_codes() {
        assert_eq!(HandlerErr::from(TransferError::NoData).code, "no_data");
        let e = HandlerErr::from(TransferError::NoData);
        assert_eq!(e.message, "No data found in the uploaded file");
    }
}
