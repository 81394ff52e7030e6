//! Metric data sources and the collection/validation step.
//!
//! A [`DataSource`] hands back loosely-typed record sets; the
//! [`DataCollector`] checks required fields, decodes them into typed records,
//! and sorts them chronologically before anything is scored.

pub mod file;

pub use file::JsonFileSource;

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info};

pub const SALES_FIELDS: &[&str] = &["date", "lead_id", "stage", "owner", "amount", "source"];
pub const SUPPORT_FIELDS: &[&str] = &[
    "ticket_id",
    "created_at",
    "priority",
    "status",
    "subject",
    "escalated",
];
pub const MARKETING_FIELDS: &[&str] = &[
    "date",
    "campaign",
    "channel",
    "spend",
    "impressions",
    "clicks",
    "conversions",
    "conversion_rate",
];

/// Synthetic tickets injected in demo mode.
const DEMO_SPIKE_TICKETS: usize = 100;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("missing {dataset} fields: {}", fields.join(", "))]
    MissingFields {
        dataset: &'static str,
        fields: Vec<String>,
    },
    #[error("malformed {dataset} record #{index}: {reason}")]
    Malformed {
        dataset: &'static str,
        index: usize,
        reason: String,
    },
}

#[derive(Debug, Error)]
pub enum CollectError {
    #[error("data source unavailable: {0}")]
    Source(String),
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

pub type RawRecords = Vec<Map<String, Value>>;

/// Untyped record sets as fetched from a source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawDatasets {
    pub sales: RawRecords,
    pub marketing: RawRecords,
    pub support: RawRecords,
}

#[async_trait::async_trait]
pub trait DataSource: Send + Sync {
    /// Fetch every named record set for this cycle.
    async fn fetch_all(&self) -> Result<RawDatasets, CollectError>;
}

/// One sales lead; `stage == "SQL"` counts as a conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesLead {
    #[serde(with = "flex_datetime")]
    pub date: NaiveDateTime,
    pub stage: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SalesLead {
    pub fn is_conversion(&self) -> bool {
        self.stage == "SQL"
    }
}

/// One campaign/day row with a pre-computed conversion rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketingRow {
    #[serde(with = "flex_datetime")]
    pub date: NaiveDateTime,
    pub conversion_rate: f64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupportTicket {
    #[serde(with = "flex_datetime")]
    pub created_at: NaiveDateTime,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Validated, typed, date-ordered datasets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Datasets {
    pub sales: Vec<SalesLead>,
    pub marketing: Vec<MarketingRow>,
    pub support: Vec<SupportTicket>,
}

impl Datasets {
    pub fn record_count(&self) -> usize {
        self.sales.len() + self.marketing.len() + self.support.len()
    }

    /// Convert back to untyped record sets (useful for static sources).
    pub fn to_raw(&self) -> RawDatasets {
        fn raw<T: Serialize>(rows: &[T]) -> RawRecords {
            rows.iter()
                .filter_map(|r| match serde_json::to_value(r) {
                    Ok(Value::Object(map)) => Some(map),
                    _ => None,
                })
                .collect()
        }
        RawDatasets {
            sales: raw(&self.sales),
            marketing: raw(&self.marketing),
            support: raw(&self.support),
        }
    }

    pub fn sales_days(&self) -> impl Iterator<Item = (NaiveDate, bool)> + '_ {
        self.sales.iter().map(|l| (l.date.date(), l.is_conversion()))
    }

    pub fn marketing_days(&self) -> impl Iterator<Item = (NaiveDate, f64)> + '_ {
        self.marketing.iter().map(|m| (m.date.date(), m.conversion_rate))
    }

    pub fn support_days(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.support.iter().map(|t| t.created_at.date())
    }
}

/// In-memory source, mostly for tests and embedding.
pub struct StaticSource {
    data: RawDatasets,
}

impl StaticSource {
    pub fn new(data: RawDatasets) -> Self {
        Self { data }
    }

    pub fn from_datasets(data: &Datasets) -> Self {
        Self { data: data.to_raw() }
    }
}

#[async_trait::async_trait]
impl DataSource for StaticSource {
    async fn fetch_all(&self) -> Result<RawDatasets, CollectError> {
        Ok(self.data.clone())
    }
}

/// Fetches, validates and orders the cycle's datasets.
pub struct DataCollector {
    source: Arc<dyn DataSource>,
    demo_mode: bool,
}

impl DataCollector {
    pub fn new(source: Arc<dyn DataSource>) -> Self {
        Self {
            source,
            demo_mode: false,
        }
    }

    pub fn with_demo_mode(mut self, enabled: bool) -> Self {
        self.demo_mode = enabled;
        self
    }

    pub async fn collect(&self) -> Result<Datasets, CollectError> {
        let raw = self.source.fetch_all().await?;

        let mut sales: Vec<SalesLead> = decode("sales", SALES_FIELDS, raw.sales)?;
        let mut marketing: Vec<MarketingRow> = decode("marketing", MARKETING_FIELDS, raw.marketing)?;
        let mut support: Vec<SupportTicket> = decode("support", SUPPORT_FIELDS, raw.support)?;

        sales.sort_by_key(|r| r.date);
        marketing.sort_by_key(|r| r.date);
        support.sort_by_key(|r| r.created_at);

        if self.demo_mode {
            inject_demo_spike(&mut support);
        }

        let data = Datasets {
            sales,
            marketing,
            support,
        };
        info!(records = data.record_count(), "datasets collected");
        Ok(data)
    }
}

/// Check that every record carries `required` fields, then decode it.
pub fn validate_fields(
    dataset: &'static str,
    required: &[&str],
    records: &[Map<String, Value>],
) -> Result<(), ValidationError> {
    let mut missing: Vec<String> = Vec::new();
    for record in records {
        for field in required {
            if !record.contains_key(*field) && !missing.iter().any(|m| m == field) {
                missing.push((*field).to_string());
            }
        }
    }
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::MissingFields {
            dataset,
            fields: missing,
        })
    }
}

fn decode<T: DeserializeOwned>(
    dataset: &'static str,
    required: &[&str],
    records: RawRecords,
) -> Result<Vec<T>, ValidationError> {
    validate_fields(dataset, required, &records)?;
    records
        .into_iter()
        .enumerate()
        .map(|(index, record)| {
            serde_json::from_value(Value::Object(record)).map_err(|e| ValidationError::Malformed {
                dataset,
                index,
                reason: e.to_string(),
            })
        })
        .collect()
}

/// Expects `support` sorted by `created_at`. The spike lands on the day after
/// the newest real ticket so historical snapshots keep their baseline window.
fn inject_demo_spike(support: &mut Vec<SupportTicket>) {
    let at = support
        .last()
        .map(|t| t.created_at + chrono::Duration::days(1))
        .unwrap_or_else(|| Utc::now().naive_utc());
    for i in 0..DEMO_SPIKE_TICKETS {
        let mut extra = Map::new();
        extra.insert("ticket_id".into(), Value::String(format!("mock-{}", i)));
        extra.insert("priority".into(), Value::String("High".into()));
        extra.insert("status".into(), Value::String("New".into()));
        extra.insert("subject".into(), Value::String("login_failure".into()));
        extra.insert("escalated".into(), Value::Bool(false));
        support.push(SupportTicket {
            created_at: at,
            extra,
        });
    }
    debug!(count = DEMO_SPIKE_TICKETS, "demo support spike injected");
}

/// Accepts `YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS`, ISO 8601 without offset, and
/// RFC 3339 (converted to UTC, then made naive).
pub mod flex_datetime {
    use chrono::{DateTime, NaiveDate, NaiveDateTime};
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

    pub fn parse(s: &str) -> Option<NaiveDateTime> {
        let s = s.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Some(dt.naive_utc());
        }
        for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
                return Some(dt);
            }
        }
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
    }

    pub fn serialize<S: Serializer>(dt: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&dt.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(d)?;
        parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("unrecognized date: {}", raw)))
    }
}
