//! Append-only event log.
//!
//! Incidents, executed actions and KPI baselines share one ordered log. Every
//! record is normalized to a JSON object with a `type` tag and an RFC 3339
//! `timestamp` before it is appended.

use std::path::PathBuf;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{JsonArrayFile, StoreError};
use crate::detect::incident::Incident;
use crate::dispatch::ActionOutcome;
use crate::plan::PlanItem;

/// Typed variants of the records the pipeline writes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventRecord {
    Incident(Incident),
    ActionExecuted {
        #[serde(skip_serializing_if = "Option::is_none")]
        trace_id: Option<String>,
        action: PlanItem,
        summary: ActionOutcome,
    },
    KpiBaseline {
        kpi: String,
        value: f64,
    },
}

impl EventRecord {
    pub fn kind(&self) -> &'static str {
        match self {
            EventRecord::Incident(_) => "incident",
            EventRecord::ActionExecuted { .. } => "action_executed",
            EventRecord::KpiBaseline { .. } => "kpi_baseline",
        }
    }
}

/// Coerce an event into a portable JSON object with a timestamp.
pub fn normalize_event(event: Value) -> Result<Map<String, Value>, StoreError> {
    let mut obj = match event {
        Value::Object(obj) => obj,
        Value::Array(_) => return Err(StoreError::NotAnObject("array")),
        Value::String(_) => return Err(StoreError::NotAnObject("string")),
        Value::Number(_) => return Err(StoreError::NotAnObject("number")),
        Value::Bool(_) => return Err(StoreError::NotAnObject("bool")),
        Value::Null => return Err(StoreError::NotAnObject("null")),
    };
    obj.entry("timestamp")
        .or_insert_with(|| Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)));
    Ok(obj)
}

/// Storage seam for the event log; the file store is the default backend.
pub trait EventRepository: Send + Sync {
    /// Append one event and return the stored (normalized) form.
    fn append(&self, event: Value) -> Result<Value, StoreError>;

    /// The last `n` events in original order.
    fn query_recent(&self, n: usize) -> Result<Vec<Value>, StoreError>;

    /// Every event whose `type` equals `kind`, in original order.
    fn find_by_type(&self, kind: &str) -> Result<Vec<Value>, StoreError>;

    fn append_record(&self, record: &EventRecord) -> Result<Value, StoreError> {
        let value = serde_json::to_value(record).map_err(|source| StoreError::Serialize {
            what: "event record",
            source,
        })?;
        self.append(value)
    }

    fn set_kpi_baseline(&self, kpi: &str, value: f64) -> Result<Value, StoreError> {
        self.append_record(&EventRecord::KpiBaseline {
            kpi: kpi.to_string(),
            value,
        })
    }

    /// Most recent baseline recorded for `kpi`.
    fn latest_kpi(&self, kpi: &str) -> Result<Option<f64>, StoreError> {
        Ok(self
            .find_by_type("kpi_baseline")?
            .iter()
            .rev()
            .find(|e| e.get("kpi").and_then(Value::as_str) == Some(kpi))
            .and_then(|e| e.get("value"))
            .and_then(Value::as_f64))
    }
}

/// JSON-file event log with atomic replace and corruption quarantine.
pub struct EventStore {
    file: JsonArrayFile<Value>,
}

impl EventStore {
    /// Open (or create) the event log at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let file = JsonArrayFile::new(path);
        file.ensure()?;
        Ok(Self { file })
    }

    pub fn path(&self) -> &std::path::Path {
        self.file.path()
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(self.file.load()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }
}

impl EventRepository for EventStore {
    fn append(&self, event: Value) -> Result<Value, StoreError> {
        let stored = Value::Object(normalize_event(event)?);
        let out = stored.clone();
        self.file.update(move |records| records.push(stored))?;
        Ok(out)
    }

    fn query_recent(&self, n: usize) -> Result<Vec<Value>, StoreError> {
        let mut records = self.file.load()?;
        let skip = records.len().saturating_sub(n);
        Ok(records.split_off(skip))
    }

    fn find_by_type(&self, kind: &str) -> Result<Vec<Value>, StoreError> {
        Ok(self
            .file
            .load()?
            .into_iter()
            .filter(|e| e.get("type").and_then(Value::as_str) == Some(kind))
            .collect())
    }
}
