//! TOML configuration for aiocc.
//!
//! Layered model: compiled-in defaults, optionally overridden by a TOML file
//! (`AIOCC_CONFIG` or `./aiocc.toml`), then by a few environment variables.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Root configuration for the daemon and CLI.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub analysis: AnalysisConfig,
    pub integrations: IntegrationsConfig,
    pub refiner: RefinerConfig,
    pub schedule: ScheduleConfig,
    pub approval: ApprovalConfig,
    pub api: ApiConfig,
    pub logging: LoggingConfig,
    /// Inject a synthetic support spike into every collected snapshot.
    pub demo_mode: bool,
}

impl Config {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Try, in order: `AIOCC_CONFIG`, `./aiocc.toml`, compiled-in defaults.
    /// Environment overrides are applied last.
    pub fn load_or_default() -> Self {
        let mut cfg = Self::from_files();
        cfg.apply_env();
        cfg
    }

    fn from_files() -> Self {
        if let Ok(env_path) = std::env::var("AIOCC_CONFIG") {
            let path = Path::new(&env_path);
            match Self::load(path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "AIOCC_CONFIG set but file could not be loaded, trying fallback"
                    );
                }
            }
        }

        let local = Path::new("aiocc.toml");
        if local.exists() {
            match Self::load(local) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(error = %e, "aiocc.toml exists but could not be loaded, using defaults");
                }
            }
        }

        debug!("no config file found, using compiled-in defaults");
        Self::default()
    }

    /// Apply `AIOCC_TOOLS_URL`, `AIOCC_REASONER_URL` and `AIOCC_DEMO_MODE`.
    pub fn apply_env(&mut self) {
        if let Some(url) = non_empty_env("AIOCC_TOOLS_URL") {
            self.integrations.tools_base_url = Some(url);
        }
        if let Some(url) = non_empty_env("AIOCC_REASONER_URL") {
            self.refiner.endpoint = Some(url);
        }
        if let Some(flag) = non_empty_env("AIOCC_DEMO_MODE") {
            self.demo_mode = flag.eq_ignore_ascii_case("true") || flag == "1";
        }
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// Locations of every persisted artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// JSON snapshot with `sales`, `marketing` and `support` record arrays.
    pub snapshot_path: PathBuf,
    /// Append-only event log.
    pub events_path: PathBuf,
    pub sessions_path: PathBuf,
    /// Pending step-by-step checkpoint awaiting approval.
    pub checkpoint_path: PathBuf,
    pub notifications_log: PathBuf,
    pub tasks_log: PathBuf,
    pub emails_log: PathBuf,
    pub report_path: PathBuf,
    /// Local knowledge store of past incidents. Unset disables it.
    pub knowledge_path: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            snapshot_path: PathBuf::from("data/snapshot.json"),
            events_path: PathBuf::from("data/memory.json"),
            sessions_path: PathBuf::from("data/sessions.json"),
            checkpoint_path: PathBuf::from("data/checkpoint.json"),
            notifications_log: PathBuf::from("data/notifications.json"),
            tasks_log: PathBuf::from("data/tasks.json"),
            emails_log: PathBuf::from("data/emails.json"),
            report_path: PathBuf::from("data/report.txt"),
            knowledge_path: Some(PathBuf::from("data/knowledge.json")),
        }
    }
}

// ---------------------------------------------------------------------------
// Analysis
// ---------------------------------------------------------------------------

/// Anomaly scoring and signal thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Calendar days of history scored per stream.
    pub lookback_days: u32,
    pub min_samples: usize,
    pub z_threshold: f64,
    /// Sales percent change below this counts as a drop.
    pub sales_drop_threshold: f64,
    pub marketing_drop_threshold: f64,
    /// Support percent change above this counts as a spike.
    pub support_spike_threshold: f64,
    /// Matches requested from the knowledge store per query.
    pub similar_top_n: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            lookback_days: 14,
            min_samples: crate::detect::anomaly::MIN_SAMPLES,
            z_threshold: crate::detect::anomaly::Z_THRESHOLD,
            sales_drop_threshold: -0.05,
            marketing_drop_threshold: -0.05,
            support_spike_threshold: 0.5,
            similar_top_n: 3,
        }
    }
}

// ---------------------------------------------------------------------------
// Integrations
// ---------------------------------------------------------------------------

/// Side-effecting integrations used by the action dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegrationsConfig {
    /// Base URL of the remote tools API (`/openapi/slack`, `/openapi/task`, ...).
    pub tools_base_url: Option<String>,
    /// Enable the file-backed local notifier, task tracker and mailer.
    pub local_tools: bool,
    /// Escalation emails go to `<owner>@<email_domain>`.
    pub email_domain: String,
    pub from_email: String,
    pub ops_channel: String,
    pub request_timeout_secs: u64,
}

impl Default for IntegrationsConfig {
    fn default() -> Self {
        Self {
            tools_base_url: None,
            local_tools: true,
            email_domain: "example.com".to_string(),
            from_email: "noreply@example.com".to_string(),
            ops_channel: "ops".to_string(),
            request_timeout_secs: 15,
        }
    }
}

// ---------------------------------------------------------------------------
// Refiner
// ---------------------------------------------------------------------------

/// Optional reasoning backend that reorders and annotates plans.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefinerConfig {
    /// Completion endpoint. Unset disables refinement.
    pub endpoint: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub request_timeout_secs: u64,
}

impl Default for RefinerConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            model: "gemini-1.5-flash".to_string(),
            temperature: 0.2,
            request_timeout_secs: 60,
        }
    }
}

// ---------------------------------------------------------------------------
// Schedule / approval / api / logging
// ---------------------------------------------------------------------------

/// Periodic cycle driver used by `serve`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub enabled: bool,
    /// Six-field cron expression (seconds first).
    pub cron: String,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cron: "0 */15 * * * *".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApprovalConfig {
    /// Pending approvals older than this are auto-rejected on resume.
    /// Unset or 0 blocks indefinitely.
    pub ttl_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub bind: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum tracing level (`trace`, `debug`, `info`, `warn`, `error`).
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        let cfg = Config::default();

        assert_eq!(cfg.analysis.lookback_days, 14);
        assert_eq!(cfg.analysis.min_samples, 5);
        assert_eq!(cfg.analysis.z_threshold, 2.5);
        assert!(cfg.integrations.tools_base_url.is_none());
        assert!(cfg.integrations.local_tools);
        assert_eq!(cfg.integrations.ops_channel, "ops");
        assert!(cfg.refiner.endpoint.is_none());
        assert!(cfg.approval.ttl_secs.is_none());
        assert_eq!(cfg.logging.level, "info");
        assert!(!cfg.demo_mode);
    }

    #[test]
    fn test_parse_example_toml() {
        let toml_str = r#"
demo_mode = true

[storage]
events_path = "/var/lib/aiocc/memory.json"

[analysis]
lookback_days = 30
z_threshold = 3.0

[integrations]
tools_base_url = "http://tools.internal:8080"
local_tools = false
email_domain = "corp.example"

[refiner]
endpoint = "http://reasoner.internal/complete"
temperature = 0.0

[schedule]
cron = "0 0 * * * *"

[approval]
ttl_secs = 3600

[logging]
level = "debug"
json = true
"#;

        let cfg: Config = toml::from_str(toml_str).unwrap();

        assert!(cfg.demo_mode);
        assert_eq!(cfg.storage.events_path, PathBuf::from("/var/lib/aiocc/memory.json"));
        // untouched storage fields keep defaults
        assert_eq!(cfg.storage.sessions_path, PathBuf::from("data/sessions.json"));
        assert_eq!(cfg.analysis.lookback_days, 30);
        assert_eq!(cfg.analysis.min_samples, 5);
        assert_eq!(cfg.analysis.z_threshold, 3.0);
        assert_eq!(
            cfg.integrations.tools_base_url.as_deref(),
            Some("http://tools.internal:8080")
        );
        assert!(!cfg.integrations.local_tools);
        assert_eq!(cfg.integrations.email_domain, "corp.example");
        assert_eq!(cfg.refiner.temperature, 0.0);
        assert_eq!(cfg.refiner.model, "gemini-1.5-flash");
        assert_eq!(cfg.schedule.cron, "0 0 * * * *");
        assert_eq!(cfg.approval.ttl_secs, Some(3600));
        assert!(cfg.logging.json);
    }

    #[test]
    fn test_empty_toml_uses_all_defaults() {
        let cfg: Config = toml::from_str("").unwrap();
        let defaults = Config::default();
        assert_eq!(cfg.storage.events_path, defaults.storage.events_path);
        assert_eq!(cfg.schedule.cron, defaults.schedule.cron);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("aiocc.toml");
        std::fs::write(&path, "[api]\nbind = \"0.0.0.0:9999\"\n").unwrap();

        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.api.bind, "0.0.0.0:9999");
    }

    #[test]
    fn test_load_missing_file_errors() {
        assert!(Config::load(Path::new("/nonexistent/path/aiocc.toml")).is_err());
    }
}
