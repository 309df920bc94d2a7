use crate::ipc::helpers::{get_required_id, get_required_object, now_rfc3339, to_json, with_db, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::models::{Activity, ActivityRecord};
use crate::store;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Connection;
use serde_json::{json, Value};
use tracing::warn;

const DEFAULT_RECENT_LIMIT: usize = 10;

/// Logs an activity on behalf of another handler. A failed write is logged and otherwise ignored.
pub fn record_activity(conn: &Connection, mut record: ActivityRecord) {
    record.timestamp = now_rfc3339();
    if let Err(e) = store::activity_insert(conn, &record) {
        warn!(kind = %record.kind, error = %e, "failed to record activity");
    }
}

fn canonical_timestamp(raw: &str) -> Result<String, HandlerErr> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(now_rfc3339());
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc).to_rfc3339_opts(SecondsFormat::Millis, true))
        .map_err(|_| HandlerErr::bad_params("timestamp must be an RFC 3339 date-time"))
}

fn activities_list(conn: &Connection, _params: &Value) -> Result<Value, HandlerErr> {
    let rows = store::activities_list(conn, None).map_err(HandlerErr::db_query)?;
    Ok(json!({ "activities": to_json(&rows)? }))
}

fn activities_recent(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let limit = match params.get("limit") {
        None | Some(Value::Null) => DEFAULT_RECENT_LIMIT,
        Some(v) => v
            .as_u64()
            .map(|n| n as usize)
            .ok_or_else(|| HandlerErr::bad_params("limit must be a non-negative integer"))?,
    };
    let rows = store::activities_list(conn, Some(limit)).map_err(HandlerErr::db_query)?;
    Ok(json!({ "activities": to_json(&rows)? }))
}

fn activities_get(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let id = get_required_id(params, "id")?;
    let activity = store::activity_get(conn, id)
        .map_err(HandlerErr::db_query)?
        .ok_or_else(|| HandlerErr::not_found("Activity not found"))?;
    Ok(json!({ "activity": to_json(&activity)? }))
}

fn activities_create(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let obj = get_required_object(params, "activity")?;
    let mut record: ActivityRecord = serde_json::from_value(Value::Object(obj.clone()))
        .map_err(|e| HandlerErr::bad_params(format!("invalid activity: {}", e)))?;
    if record.kind.trim().is_empty() {
        return Err(HandlerErr::bad_params("type is required"));
    }
    if record.description.trim().is_empty() {
        return Err(HandlerErr::bad_params("description is required"));
    }
    record.timestamp = canonical_timestamp(&record.timestamp)?;
    let id = store::activity_insert(conn, &record).map_err(HandlerErr::db_update)?;
    Ok(json!({ "activity": to_json(&Activity { id, record })? }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "activities.list" => Some(with_db(state, req, activities_list)),
        "activities.recent" => Some(with_db(state, req, activities_recent)),
        "activities.get" => Some(with_db(state, req, activities_get)),
        "activities.create" => Some(with_db(state, req, activities_create)),
        _ => None,
    }
}
