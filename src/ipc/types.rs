use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

/// One JSON line read from stdin.
#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Everything the sidecar keeps between requests: the selected workspace and its database.
#[derive(Default)]
pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
}
