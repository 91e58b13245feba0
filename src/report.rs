// src/report.rs

//! Structured flow results and the end-of-run report

use crate::error::Result;
use chrono::{Local, SecondsFormat};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, warn};

/// Uniform result of every orchestrator entry point
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FlowOutcome {
    pub success: bool,
    pub details: Map<String, Value>,
}

impl FlowOutcome {
    pub fn new(success: bool) -> Self {
        Self {
            success,
            details: Map::new(),
        }
    }

    pub fn ok() -> Self {
        Self::new(true)
    }

    pub fn failed() -> Self {
        Self::new(false)
    }

    /// Attach a detail; values that cannot be encoded are stored as their error
    pub fn detail(mut self, key: &str, value: impl Serialize) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Serialize) {
        let value = serde_json::to_value(value).unwrap_or_else(|e| {
            warn!("Could not encode detail '{}': {}", key, e);
            Value::String(e.to_string())
        });
        self.details.insert(key.to_string(), value);
    }

    pub fn status(&self) -> RunStatus {
        if self.success {
            RunStatus::Success
        } else {
            RunStatus::Failed
        }
    }
}

/// Overall status of one invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum_macros::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RunStatus {
    Success,
    Failed,
    Aborted,
    Error,
    NoCommand,
}

/// What the binary prints at the end of a run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub timestamp: String,
    pub command: String,
    pub status: RunStatus,
    pub details: Map<String, Value>,
}

impl RunReport {
    pub fn new(command: impl Into<String>, status: RunStatus, details: Map<String, Value>) -> Self {
        Self {
            timestamp: timestamp(),
            command: command.into(),
            status,
            details,
        }
    }

    pub fn from_outcome(command: impl Into<String>, outcome: FlowOutcome) -> Self {
        let status = outcome.status();
        Self::new(command, status, outcome.details)
    }

    /// A report carrying only an error message
    pub fn error(command: impl Into<String>, status: RunStatus, message: impl Into<String>) -> Self {
        let mut details = Map::new();
        details.insert("error".to_string(), Value::String(message.into()));
        Self::new(command, status, details)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Local time in RFC 3339
pub fn timestamp() -> String {
    Local::now().to_rfc3339_opts(SecondsFormat::Secs, false)
}

/// Delete a marker left by a previous run
pub fn remove_completion_marker(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!("Removed old completion marker {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Record that an update run finished, whatever its status
pub fn write_completion_marker(path: &Path, status: RunStatus) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, format!("Completed at {} - Status: {}", timestamp(), status))?;
    Ok(())
}
