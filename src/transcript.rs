//! Append-only JSONL audit log of operator actions.
//!
//! The admin token is never written here.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub struct Transcript {
    pub path: PathBuf,
    session_id: String,
    file: File,
}

#[derive(Serialize)]
struct Event<'a> {
    ts: DateTime<Utc>,
    session_id: &'a str,
    #[serde(rename = "type")]
    event_type: &'a str,
    #[serde(flatten)]
    data: serde_json::Value,
}

impl Transcript {
    pub fn new(path: &Path, session_id: &str) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            session_id: session_id.to_string(),
            file,
        })
    }

    pub fn log(&mut self, event_type: &str, data: serde_json::Value) -> Result<()> {
        let event = Event {
            ts: Utc::now(),
            session_id: &self.session_id,
            event_type,
            data,
        };
        let line = serde_json::to_string(&event)?;
        writeln!(self.file, "{}", line)?;
        self.file.flush()?;
        Ok(())
    }

    pub fn login(&mut self) -> Result<()> {
        self.log("login", serde_json::json!({}))
    }

    pub fn logout(&mut self) -> Result<()> {
        self.log("logout", serde_json::json!({}))
    }

    /// Backend rejected the token and the session was ended
    pub fn auth_failure(&mut self) -> Result<()> {
        self.log("auth_failure", serde_json::json!({}))
    }

    pub fn search(&mut self, keyword: &str, count: usize) -> Result<()> {
        self.log(
            "search",
            serde_json::json!({ "keyword": keyword, "count": count }),
        )
    }

    pub fn admin_flag(&mut self, user_id: i64, is_admin: bool, ok: bool) -> Result<()> {
        self.log(
            "admin_flag",
            serde_json::json!({
                "user_id": user_id,
                "is_admin": is_admin,
                "ok": ok,
            }),
        )
    }

    pub fn config_load(&mut self, ok: bool) -> Result<()> {
        self.log("config_load", serde_json::json!({ "ok": ok }))
    }

    /// Log a config write attempt. `error` is set for local and remote failures.
    pub fn config_save(&mut self, ok: bool, error: Option<&str>) -> Result<()> {
        self.log(
            "config_save",
            serde_json::json!({
                "ok": ok,
                "error": error,
            }),
        )
    }
}
