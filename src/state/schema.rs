//! Database schema definitions and migrations.

/// Current schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// Full DDL for the agentvault state database. Aggregates are stored as
/// JSON documents keyed by their id, with the columns a reconciliation
/// query actually needs lifted out.
pub const CREATE_SCHEMA: &str = r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL
);

-- Key-value store for runtime state
CREATE TABLE IF NOT EXISTS kv (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- Agent deployments
CREATE TABLE IF NOT EXISTS deployments (
    agent_id      TEXT PRIMARY KEY,
    owner_address TEXT NOT NULL,
    record_json   TEXT NOT NULL,
    created_at    TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Wallet records (one per agent)
CREATE TABLE IF NOT EXISTS wallets (
    agent_id    TEXT PRIMARY KEY,
    status      TEXT NOT NULL DEFAULT 'active',
    record_json TEXT NOT NULL,
    updated_at  TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Strategy records
CREATE TABLE IF NOT EXISTS strategies (
    strategy_id TEXT PRIMARY KEY,
    agent_id    TEXT NOT NULL,
    status      TEXT NOT NULL DEFAULT 'pending',
    record_json TEXT NOT NULL,
    updated_at  TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Registry entries
CREATE TABLE IF NOT EXISTS registry_entries (
    agent_id      TEXT PRIMARY KEY,
    owner_address TEXT NOT NULL,
    record_json   TEXT NOT NULL,
    updated_at    TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Fee records
CREATE TABLE IF NOT EXISTS fee_records (
    fee_id      TEXT PRIMARY KEY,
    agent_id    TEXT NOT NULL,
    kind        TEXT NOT NULL,
    record_json TEXT NOT NULL,
    created_at  TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Upgrade proposals
CREATE TABLE IF NOT EXISTS proposals (
    proposal_id TEXT PRIMARY KEY,
    status      TEXT NOT NULL DEFAULT 'pending',
    record_json TEXT NOT NULL,
    updated_at  TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Raw on-chain events per contract
CREATE TABLE IF NOT EXISTS contract_events (
    id               TEXT PRIMARY KEY,
    contract_address TEXT NOT NULL,
    event_type       TEXT NOT NULL,
    payload_json     TEXT NOT NULL DEFAULT '{}',
    recorded_at      TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Indexes
CREATE INDEX IF NOT EXISTS idx_deployments_owner ON deployments(owner_address);
CREATE INDEX IF NOT EXISTS idx_strategies_agent ON strategies(agent_id);
CREATE INDEX IF NOT EXISTS idx_fee_records_agent ON fee_records(agent_id);
CREATE INDEX IF NOT EXISTS idx_contract_events_addr ON contract_events(contract_address);
"#;
