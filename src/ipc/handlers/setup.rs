use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};

pub const DEFAULT_MAX_IMPORT_BYTES: i64 = 10 * 1024 * 1024;
const MIN_IMPORT_BYTES: i64 = 1024;
const MAX_IMPORT_BYTES: i64 = 100 * 1024 * 1024;

#[derive(Clone, Copy)]
enum SetupSection {
    ImportExport,
}

impl SetupSection {
    const ALL: [SetupSection; 1] = [SetupSection::ImportExport];

    fn parse(s: &str) -> Option<Self> {
        match s {
            "importExport" => Some(Self::ImportExport),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::ImportExport => "importExport",
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::ImportExport => "setup.importExport",
        }
    }
}

fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::ImportExport => json!({
            "maxImportBytes": DEFAULT_MAX_IMPORT_BYTES,
            "exportDir": ""
        }),
    }
}

fn as_object_mut(value: &mut Value) -> Result<&mut Map<String, Value>, String> {
    value
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())
}

fn parse_i64_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let n = v
        .as_i64()
        .ok_or_else(|| format!("{} must be integer", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn parse_string_max(v: &Value, key: &str, max_len: usize) -> Result<String, String> {
    let s = v.as_str().ok_or_else(|| format!("{} must be string", key))?;
    let s = s.trim();
    if s.len() > max_len {
        return Err(format!("{} length must be <= {}", key, max_len));
    }
    Ok(s.to_string())
}

fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = as_object_mut(current)?;
    for (k, v) in patch {
        match section {
            SetupSection::ImportExport => match k.as_str() {
                "maxImportBytes" => {
                    let n = parse_i64_range(v, k, MIN_IMPORT_BYTES, MAX_IMPORT_BYTES)?;
                    obj.insert(k.clone(), Value::from(n));
                }
                "exportDir" => {
                    obj.insert(k.clone(), Value::String(parse_string_max(v, k, 1024)?));
                }
                _ => return Err(format!("unknown importExport field: {}", k)),
            },
        }
    }
    Ok(())
}

fn load_section(conn: &rusqlite::Connection, section: SetupSection) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            // Keys are applied one at a time; a saved key that no longer validates keeps its default.
            for (k, v) in saved_obj {
                let mut single = Map::new();
                single.insert(k.clone(), v.clone());
                if let Err(msg) = merge_section_patch(section, &mut current, &single) {
                    tracing::warn!(section = section.name(), error = %msg, "ignoring saved setting");
                }
            }
        }
    }
    Ok(current)
}

/// Effective import/export settings for a workspace.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportExportConfig {
    pub max_import_bytes: u64,
    pub export_dir: PathBuf,
}

pub fn import_export_config(conn: &rusqlite::Connection, workspace: &Path) -> anyhow::Result<ImportExportConfig> {
    let section = load_section(conn, SetupSection::ImportExport)?;
    let max_import_bytes = section
        .get("maxImportBytes")
        .and_then(|v| v.as_u64())
        .unwrap_or(DEFAULT_MAX_IMPORT_BYTES as u64);
    let export_dir = match section.get("exportDir").and_then(|v| v.as_str()) {
        Some(dir) if !dir.is_empty() => {
            let dir = PathBuf::from(dir);
            if dir.is_absolute() {
                dir
            } else {
                workspace.join(dir)
            }
        }
        _ => workspace.join("exports"),
    };
    Ok(ImportExportConfig {
        max_import_bytes,
        export_dir,
    })
}

fn handle_setup_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let mut out = Map::new();
    for section in SetupSection::ALL {
        match load_section(conn, section) {
            Ok(v) => {
                out.insert(section.name().to_string(), v);
            }
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        }
    }
    ok(&req.id, Value::Object(out))
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(section_raw) = req.params.get("section").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing section", None);
    };
    let Some(section) = SetupSection::parse(section_raw) else {
        return err(&req.id, "bad_params", "unknown section", None);
    };
    let Some(patch_obj) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };

    let mut current = match load_section(conn, section) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if let Err(msg) = merge_section_patch(section, &mut current, patch_obj) {
        return err(&req.id, "bad_params", msg, None);
    }
    if let Err(e) = db::settings_set_json(conn, section.key(), &current) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.update" => Some(handle_setup_update(state, req)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn import_export_patch_is_range_checked() {
        let mut current = default_section(SetupSection::ImportExport);
        let patch = json!({ "maxImportBytes": 2048, "exportDir": " out " });
        merge_section_patch(SetupSection::ImportExport, &mut current, patch.as_object().expect("obj"))
            .expect("valid patch");
        assert_eq!(current["maxImportBytes"], 2048);
        assert_eq!(current["exportDir"], "out");

        let too_small = json!({ "maxImportBytes": 10 });
        let e = merge_section_patch(SetupSection::ImportExport, &mut current, too_small.as_object().expect("obj"))
            .expect_err("rejected");
        assert!(e.contains("maxImportBytes"));

        let unknown = json!({ "color": "red" });
        assert!(merge_section_patch(SetupSection::ImportExport, &mut current, unknown.as_object().expect("obj")).is_err());
    }

    #[test]
    fn invalid_saved_key_keeps_default_without_dropping_valid_keys() {
        let conn = rusqlite::Connection::open_in_memory().expect("open");
        conn.execute_batch("CREATE TABLE settings(key TEXT PRIMARY KEY, value_json TEXT NOT NULL);")
            .expect("settings table");
        db::settings_set_json(
            &conn,
            SetupSection::ImportExport.key(),
            &json!({ "exportDir": "saved-out", "color": "red", "maxImportBytes": 5 }),
        )
        .expect("save");

        let section = load_section(&conn, SetupSection::ImportExport).expect("load");
        assert_eq!(section["exportDir"], "saved-out");
        assert_eq!(section["maxImportBytes"], DEFAULT_MAX_IMPORT_BYTES);
        assert!(section.get("color").is_none());
    }
}
