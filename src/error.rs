use thiserror::Error;

// ─── Top-level error hierarchy ───────────────────────────────────────────────

/// Structured error hierarchy for `sprintguard`.
///
/// Each subsystem defines its own error variant. Library callers can match on
/// these to decide recovery strategy; internal code continues to use
/// `anyhow::Result` for ad-hoc context chains.
#[derive(Debug, Error)]
pub enum GuardError {
    // ── Config ───────────────────────────────────────────────────────────
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    // ── Tracker API ─────────────────────────────────────────────────────
    #[error("tracker: {0}")]
    Tracker(#[from] TrackerError),

    // ── Snapshot store ──────────────────────────────────────────────────
    #[error("snapshot: {0}")]
    Snapshot(#[from] SnapshotError),

    // ── Gateway ─────────────────────────────────────────────────────────
    #[error("gateway: {0}")]
    Gateway(#[from] GatewayError),

    // ── Generic fallthrough (wraps anyhow for interop) ──────────────────
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ─── Config errors ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load config: {0}")]
    Load(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

// ─── Tracker API errors ─────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("{op} request failed: {message}")]
    Request { op: String, message: String },

    #[error("{op} returned {status}: {body}")]
    Status {
        op: String,
        status: u16,
        body: String,
    },

    #[error("failed to decode {op} response: {message}")]
    Decode { op: String, message: String },
}

// ─── Snapshot store errors ──────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt snapshot file: {0}")]
    Codec(#[from] serde_json::Error),
}

// ─── Gateway errors ─────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("bind failed: {0}")]
    Bind(String),

    #[error("queue closed")]
    QueueClosed,
}

// ─── Convenience re-exports ─────────────────────────────────────────────────

/// Shorthand result type for the crate.
pub type Result<T> = std::result::Result<T, GuardError>;
