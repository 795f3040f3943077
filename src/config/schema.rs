//! Configuration schema for agentvault.toml.

use crate::amount::Nano;
use crate::fees::FeeSchedule;
use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    /// Human-readable platform instance name.
    pub name: String,

    /// Fixed fee debited to the treasury per agent deployment, in nanoTON.
    pub deployment_fee: Nano,

    /// Per-owner agent cap.
    pub max_agents_per_user: u32,

    /// Fee rates and revenue split shares.
    pub fees: FeeSchedule,

    /// Default timeout for chain submissions, in seconds.
    pub submit_timeout_secs: u64,

    /// Signing-session lifetime before garbage collection, in seconds.
    pub session_ttl_secs: u64,

    /// Event bus capacity.
    pub event_capacity: usize,

    /// Path to SQLite database.
    pub db_path: String,

    /// Log level (debug, info, warn, error).
    pub log_level: String,

    /// Config version.
    pub version: u32,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            name: "agentvault".into(),
            deployment_fee: Nano::new(100_000_000),
            max_agents_per_user: 3,
            fees: FeeSchedule::default(),
            submit_timeout_secs: 30,
            session_ttl_secs: 600,
            event_capacity: 256,
            db_path: "~/.agentvault/state.db".into(),
            log_level: "info".into(),
            version: 1,
        }
    }
}

impl PlatformConfig {
    /// Resolve a path that may contain `~` to an absolute path.
    pub fn resolve_path(&self, path: &str) -> String {
        shellexpand::tilde(path).into_owned()
    }

    /// Resolved database path.
    pub fn resolved_db_path(&self) -> String {
        self.resolve_path(&self.db_path)
    }
}
