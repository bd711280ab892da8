use crate::error::ConfigError;
use directories::UserDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

// ── Top-level config ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Workspace directory - computed from home, not serialized
    #[serde(skip)]
    pub workspace_dir: PathBuf,
    /// Path to config.toml - computed from home, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Snapshot document filename, resolved relative to the workspace dir.
    #[serde(default = "default_snapshot_file")]
    pub snapshot_file: String,

    #[serde(default)]
    pub tracker: TrackerConfig,

    #[serde(default)]
    pub collections: CollectionsConfig,

    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub policy: PolicyConfig,
}

fn default_snapshot_file() -> String {
    "task_snapshots.json".into()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workspace_dir: PathBuf::new(),
            config_path: PathBuf::new(),
            snapshot_file: default_snapshot_file(),
            tracker: TrackerConfig::default(),
            collections: CollectionsConfig::default(),
            gateway: GatewayConfig::default(),
            policy: PolicyConfig::default(),
        }
    }
}

// ── Tracker API ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Tracker API base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Integration token (overridable via SPRINTGUARD_TOKEN)
    #[serde(default)]
    pub token: Option<String>,
    /// Pinned API version header value
    #[serde(default = "default_api_version")]
    pub api_version: String,
    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://api.notion.com/v1".into()
}

fn default_api_version() -> String {
    "2022-06-28".into()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token: None,
            api_version: default_api_version(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

// ── Monitored collections ────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CollectionsConfig {
    /// Tasks database id (the monitored collection)
    #[serde(default)]
    pub tasks: String,
    /// Sprints database id
    #[serde(default)]
    pub sprints: String,
    /// People database id (actor/assignee name resolution)
    #[serde(default)]
    pub people: String,
    /// Audit-log database id; audit writes are skipped when unset
    #[serde(default)]
    pub audit_log: Option<String>,
}

// ── Webhook gateway ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Gateway host (default: 127.0.0.1)
    #[serde(default = "default_gateway_host")]
    pub host: String,
    /// Gateway port (default: 5000)
    #[serde(default = "default_gateway_port")]
    pub port: u16,
    /// Shared secret for webhook HMAC verification (overridable via
    /// SPRINTGUARD_WEBHOOK_SECRET); signature checks are skipped when unset
    #[serde(default)]
    pub webhook_secret: Option<String>,
}

fn default_gateway_host() -> String {
    "127.0.0.1".into()
}

fn default_gateway_port() -> u16 {
    5000
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_gateway_host(),
            port: default_gateway_port(),
            webhook_secret: None,
        }
    }
}

// ── Policy thresholds ────────────────────────────────────────────

/// Edit-window and suppression thresholds.
///
/// The windows are heuristics tuned against one provider's notification
/// latency, not invariants — hence config fields rather than constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Days after sprint start during which edits are unrestricted
    #[serde(default = "default_block_threshold_days")]
    pub block_threshold_days: i64,
    /// Window for treating an observed edit as the system's own write
    #[serde(default = "default_self_write_window_secs")]
    pub self_write_window_secs: f64,
    /// Self-write markers further than this from the observed edit are purged
    #[serde(default = "default_self_write_cleanup_secs")]
    pub self_write_cleanup_secs: f64,
    /// Notifications for the same task inside this window are duplicates
    #[serde(default = "default_dup_window_secs")]
    pub dup_window_secs: f64,
    /// How recent user activity must be to attribute a deletion
    #[serde(default = "default_attribution_window_secs")]
    pub attribution_window_secs: u64,
    /// Activity entries older than this are purged
    #[serde(default = "default_attribution_ttl_secs")]
    pub attribution_ttl_secs: u64,
}

fn default_block_threshold_days() -> i64 {
    4
}

fn default_self_write_window_secs() -> f64 {
    3.0
}

fn default_self_write_cleanup_secs() -> f64 {
    10.0
}

fn default_dup_window_secs() -> f64 {
    2.0
}

fn default_attribution_window_secs() -> u64 {
    30
}

fn default_attribution_ttl_secs() -> u64 {
    300
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            block_threshold_days: default_block_threshold_days(),
            self_write_window_secs: default_self_write_window_secs(),
            self_write_cleanup_secs: default_self_write_cleanup_secs(),
            dup_window_secs: default_dup_window_secs(),
            attribution_window_secs: default_attribution_window_secs(),
            attribution_ttl_secs: default_attribution_ttl_secs(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl Config {
    /// Load `~/.sprintguard/config.toml`, writing a default file on first run.
    ///
    /// Secrets and collection ids may be supplied or overridden through the
    /// environment: `SPRINTGUARD_TOKEN`, `SPRINTGUARD_WEBHOOK_SECRET`,
    /// `SPRINTGUARD_TASKS_DB`, `SPRINTGUARD_SPRINTS_DB`,
    /// `SPRINTGUARD_PEOPLE_DB`, `SPRINTGUARD_AUDIT_DB`.
    pub fn load_or_init() -> Result<Self, ConfigError> {
        let user_dirs = UserDirs::new()
            .ok_or_else(|| ConfigError::Load("cannot determine home directory".into()))?;
        let workspace_dir = user_dirs.home_dir().join(".sprintguard");
        Self::load_from(workspace_dir)
    }

    /// Load from an explicit workspace directory (tests, alternate deployments).
    pub fn load_from(workspace_dir: PathBuf) -> Result<Self, ConfigError> {
        let config_path = workspace_dir.join("config.toml");

        let mut config: Config = if config_path.exists() {
            let raw = fs::read_to_string(&config_path)?;
            toml::from_str(&raw).map_err(|e| ConfigError::Load(e.to_string()))?
        } else {
            fs::create_dir_all(&workspace_dir)?;
            let default = Config::default();
            let raw = toml::to_string_pretty(&default)
                .map_err(|e| ConfigError::Load(e.to_string()))?;
            fs::write(&config_path, raw)?;
            default
        };

        config.workspace_dir = workspace_dir;
        config.config_path = config_path;
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(token) = std::env::var("SPRINTGUARD_TOKEN") {
            self.tracker.token = Some(token);
        }
        if let Ok(secret) = std::env::var("SPRINTGUARD_WEBHOOK_SECRET") {
            self.gateway.webhook_secret = Some(secret);
        }
        if let Ok(id) = std::env::var("SPRINTGUARD_TASKS_DB") {
            self.collections.tasks = id;
        }
        if let Ok(id) = std::env::var("SPRINTGUARD_SPRINTS_DB") {
            self.collections.sprints = id;
        }
        if let Ok(id) = std::env::var("SPRINTGUARD_PEOPLE_DB") {
            self.collections.people = id;
        }
        if let Ok(id) = std::env::var("SPRINTGUARD_AUDIT_DB") {
            self.collections.audit_log = Some(id);
        }
    }

    /// Validate the fields every runtime path depends on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tracker.token.as_deref().unwrap_or("").is_empty() {
            return Err(ConfigError::Validation(
                "tracker.token is not set (or SPRINTGUARD_TOKEN)".into(),
            ));
        }
        if self.collections.tasks.is_empty() {
            return Err(ConfigError::Validation("collections.tasks is not set".into()));
        }
        if self.collections.sprints.is_empty() {
            return Err(ConfigError::Validation(
                "collections.sprints is not set".into(),
            ));
        }
        Ok(())
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.workspace_dir.join(&self.snapshot_file)
    }
}
