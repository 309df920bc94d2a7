use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use chrono::NaiveDate;
use rusqlite::Connection;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::Path;

#[derive(Debug)]
pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::new("bad_params", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("not_found", message)
    }

    pub fn db_query(e: impl std::fmt::Display) -> Self {
        Self::new("db_query_failed", e.to_string())
    }

    pub fn db_update(e: impl std::fmt::Display) -> Self {
        Self::new("db_update_failed", e.to_string())
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn response(self, id: &str) -> Value {
        err(id, self.code, self.message, self.details)
    }
}

/// Runs `f` against the open workspace database, answering `no_workspace` when none is selected.
pub fn with_db(
    state: &mut AppState,
    req: &Request,
    f: impl FnOnce(&Connection, &Value) -> Result<Value, HandlerErr>,
) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match f(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

/// Like [`with_db`] for handlers that also touch files under the workspace.
pub fn with_workspace(
    state: &mut AppState,
    req: &Request,
    f: impl FnOnce(&Path, &Connection, &Value) -> Result<Value, HandlerErr>,
) -> Value {
    let (Some(workspace), Some(conn)) = (state.workspace.as_deref(), state.db.as_ref()) else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match f(workspace, conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn get_required_str(params: &Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn get_optional_str(params: &Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn id_value(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// Integer id; numeric strings are accepted since ids also travel through CSV.
pub fn get_required_id(params: &Value, key: &str) -> Result<i64, HandlerErr> {
    let Some(v) = params.get(key).filter(|v| !v.is_null()) else {
        return Err(HandlerErr::bad_params(format!("missing {}", key)));
    };
    id_value(v).ok_or_else(|| HandlerErr::bad_params(format!("{} must be an integer", key)))
}

pub fn get_optional_id(params: &Value, key: &str) -> Result<Option<i64>, HandlerErr> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => id_value(v)
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be an integer", key))),
    }
}

pub fn get_required_object<'a>(params: &'a Value, key: &str) -> Result<&'a Map<String, Value>, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_object())
        .ok_or_else(|| HandlerErr::bad_params(format!("{} must be an object", key)))
}

pub fn from_object<T: DeserializeOwned>(obj: &Map<String, Value>, what: &str) -> Result<T, HandlerErr> {
    serde_json::from_value(Value::Object(obj.clone()))
        .map_err(|e| HandlerErr::bad_params(format!("invalid {}: {}", what, e)))
}

/// Shallow merge: top-level keys of `patch` replace those of `current`. `Id` is never patched.
pub fn merge_patch<T: Serialize + DeserializeOwned>(
    current: &T,
    patch: &Map<String, Value>,
    what: &str,
) -> Result<T, HandlerErr> {
    let mut value = serde_json::to_value(current).map_err(|e| HandlerErr::new("internal", e.to_string()))?;
    let Some(obj) = value.as_object_mut() else {
        return Err(HandlerErr::new("internal", format!("{} is not an object", what)));
    };
    for (k, v) in patch {
        if k == "Id" {
            continue;
        }
        obj.insert(k.clone(), v.clone());
    }
    serde_json::from_value(value).map_err(|e| HandlerErr::bad_params(format!("invalid {} patch: {}", what, e)))
}

pub fn to_json<T: Serialize>(value: &T) -> Result<Value, HandlerErr> {
    serde_json::to_value(value).map_err(|e| HandlerErr::new("internal", e.to_string()))
}

pub fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

pub fn iso_today() -> String {
    today().format("%Y-%m-%d").to_string()
}

/// UTC timestamp with millisecond precision, e.g. `2024-03-01T08:00:00.000Z`.
pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
