use std::fs::{File, OpenOptions};
use std::io::Write;

use chrono::Utc;
use serde_json::{Value, json};
use tracing::warn;

use crate::diff::diff_json;

pub enum MessageLogMode {
    Full,
    Diffed,
}

/// Appends device traffic to a file as NDJSON.
pub(crate) struct MessageLogger {
    mode: MessageLogMode,
    file: File,
    previous_state: Option<Value>,
}

impl MessageLogger {
    pub fn new(mode: MessageLogMode, path: &str) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            mode,
            file,
            previous_state: None,
        })
    }

    pub fn log_request(&mut self, method: &str, path: &str) {
        self.write_line(entry("req", json!({ "method": method, "path": path })));
    }

    pub fn log_write(&mut self, commands: &[String], body: &Value) {
        self.write_line(entry("write", json!({ "commands": commands, "body": body })));
    }

    pub fn log_read(&mut self, body: &Value) {
        // mid-update payloads carry no state worth diffing against
        let mid_update = body
            .pointer("/system/myAppRev")
            .and_then(|v| v.as_str())
            .is_none_or(str::is_empty);
        if mid_update {
            self.write_line(entry("read", json!({ "midUpdate": true })));
            return;
        }

        let fields = match (&self.mode, self.previous_state.replace(body.clone())) {
            (MessageLogMode::Full, _) => json!({ "body": body }),
            (MessageLogMode::Diffed, None) => json!({ "full": true, "body": body }),
            (MessageLogMode::Diffed, Some(prev)) => {
                let mut changes = Vec::new();
                diff_json(&prev, body, "", &mut changes);
                let changes: Vec<Value> = changes
                    .into_iter()
                    .map(|(path, old, new)| json!({ "path": path, "old": old, "new": new }))
                    .collect();
                json!({ "changes": changes })
            }
        };
        self.write_line(entry("read", fields));
    }

    fn write_line(&mut self, entry: Value) {
        let result = serde_json::to_string(&entry)
            .map_err(std::io::Error::from)
            .and_then(|line| writeln!(self.file, "{line}"));
        if let Err(e) = result {
            warn!(error = %e, "failed to write message log entry");
        }
    }
}

/// Stamp `fields` with the time and traffic direction.
fn entry(dir: &str, mut fields: Value) -> Value {
    if let Value::Object(map) = &mut fields {
        map.insert("ts".to_string(), Value::from(Utc::now().to_rfc3339()));
        map.insert("dir".to_string(), Value::from(dir));
    }
    fields
}
