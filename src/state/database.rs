//! SQLite database wrapper with WAL mode and migration support.
//!
//! Aggregates are persisted as JSON documents. The engine mutates in-memory
//! state under per-aggregate locks and checkpoints here; a read immediately
//! after a save observes the saved record (read-your-writes per aggregate).

use crate::error::Result;
use crate::state::schema;
use crate::types::*;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use tracing::info;

/// The agentvault state database.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) the database at the given path and run migrations.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        // WAL mode for better concurrency
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let mut db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing).
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let mut db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Run schema creation and migrations.
    fn migrate(&mut self) -> Result<()> {
        let version = self.schema_version();

        if version == 0 {
            info!("Creating database schema v{}", schema::SCHEMA_VERSION);
            self.conn.execute_batch(schema::CREATE_SCHEMA)?;
            self.conn.execute(
                "INSERT INTO schema_version (version) VALUES (?1)",
                params![schema::SCHEMA_VERSION],
            )?;
        } else if version < schema::SCHEMA_VERSION {
            self.conn.execute(
                "UPDATE schema_version SET version = ?1",
                params![schema::SCHEMA_VERSION],
            )?;
        }

        Ok(())
    }

    /// Get the current schema version (0 if uninitialized).
    fn schema_version(&self) -> u32 {
        self.conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
                row.get(0)
            })
            .unwrap_or(0)
    }

    // -----------------------------------------------------------------------
    // Key-value store
    // -----------------------------------------------------------------------

    pub fn kv_get(&self, key: &str) -> Result<Option<String>> {
        let mut stmt = self.conn.prepare("SELECT value FROM kv WHERE key = ?1")?;
        let result = stmt.query_row(params![key], |row| row.get(0)).optional()?;
        Ok(result)
    }

    pub fn kv_set(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = ?2",
            params![key, value],
        )?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Deployments
    // -----------------------------------------------------------------------

    pub fn save_deployment(&self, deployment: &AgentDeployment) -> Result<()> {
        self.conn.execute(
            "INSERT INTO deployments (agent_id, owner_address, record_json, created_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(agent_id) DO UPDATE SET record_json = ?3",
            params![
                deployment.agent_id,
                deployment.owner_address,
                serde_json::to_string(deployment)?,
                deployment.deployed_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn load_deployment(&self, agent_id: &str) -> Result<Option<AgentDeployment>> {
        self.load_json(
            "SELECT record_json FROM deployments WHERE agent_id = ?1",
            agent_id,
        )
    }

    pub fn deployments_for_owner(&self, owner_address: &str) -> Result<Vec<AgentDeployment>> {
        let mut stmt = self.conn.prepare(
            "SELECT record_json FROM deployments WHERE owner_address = ?1 ORDER BY created_at",
        )?;
        let rows = stmt.query_map(params![owner_address], |row| row.get::<_, String>(0))?;

        let mut out = Vec::new();
        for row in rows {
            out.push(serde_json::from_str(&row?)?);
        }
        Ok(out)
    }

    pub fn deployment_count(&self) -> Result<u64> {
        let count: u64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM deployments", [], |row| row.get(0))?;
        Ok(count)
    }

    // -----------------------------------------------------------------------
    // Wallets
    // -----------------------------------------------------------------------

    pub fn save_wallet(&self, wallet: &WalletRecord) -> Result<()> {
        self.conn.execute(
            "INSERT INTO wallets (agent_id, status, record_json, updated_at)
             VALUES (?1, ?2, ?3, datetime('now'))
             ON CONFLICT(agent_id) DO UPDATE SET
                status = ?2, record_json = ?3, updated_at = datetime('now')",
            params![
                wallet.agent_id,
                wallet.status.to_string(),
                serde_json::to_string(wallet)?,
            ],
        )?;
        Ok(())
    }

    pub fn load_wallet(&self, agent_id: &str) -> Result<Option<WalletRecord>> {
        self.load_json("SELECT record_json FROM wallets WHERE agent_id = ?1", agent_id)
    }

    // -----------------------------------------------------------------------
    // Strategies
    // -----------------------------------------------------------------------

    pub fn save_strategy(&self, strategy: &StrategyRecord) -> Result<()> {
        self.conn.execute(
            "INSERT INTO strategies (strategy_id, agent_id, status, record_json, updated_at)
             VALUES (?1, ?2, ?3, ?4, datetime('now'))
             ON CONFLICT(strategy_id) DO UPDATE SET
                status = ?3, record_json = ?4, updated_at = datetime('now')",
            params![
                strategy.strategy_id,
                strategy.agent_id,
                strategy.status.to_string(),
                serde_json::to_string(strategy)?,
            ],
        )?;
        Ok(())
    }

    pub fn load_strategy(&self, strategy_id: &str) -> Result<Option<StrategyRecord>> {
        self.load_json(
            "SELECT record_json FROM strategies WHERE strategy_id = ?1",
            strategy_id,
        )
    }

    pub fn strategies_for_agent(&self, agent_id: &str) -> Result<Vec<StrategyRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT record_json FROM strategies WHERE agent_id = ?1 ORDER BY updated_at",
        )?;
        let rows = stmt.query_map(params![agent_id], |row| row.get::<_, String>(0))?;

        let mut out = Vec::new();
        for row in rows {
            out.push(serde_json::from_str(&row?)?);
        }
        Ok(out)
    }

    // -----------------------------------------------------------------------
    // Registry entries
    // -----------------------------------------------------------------------

    pub fn save_registry_entry(&self, entry: &RegistryEntry) -> Result<()> {
        self.conn.execute(
            "INSERT INTO registry_entries (agent_id, owner_address, record_json, updated_at)
             VALUES (?1, ?2, ?3, datetime('now'))
             ON CONFLICT(agent_id) DO UPDATE SET
                owner_address = ?2, record_json = ?3, updated_at = datetime('now')",
            params![
                entry.agent_id,
                entry.owner_address,
                serde_json::to_string(entry)?,
            ],
        )?;
        Ok(())
    }

    pub fn load_registry_entry(&self, agent_id: &str) -> Result<Option<RegistryEntry>> {
        self.load_json(
            "SELECT record_json FROM registry_entries WHERE agent_id = ?1",
            agent_id,
        )
    }

    // -----------------------------------------------------------------------
    // Fee records
    // -----------------------------------------------------------------------

    pub fn save_fee_record(&self, record: &FeeRecord) -> Result<()> {
        self.conn.execute(
            "INSERT INTO fee_records (fee_id, agent_id, kind, record_json, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(fee_id) DO UPDATE SET record_json = ?4",
            params![
                record.fee_id,
                record.agent_id,
                record.kind.to_string(),
                serde_json::to_string(record)?,
                record.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn fee_records_for_agent(&self, agent_id: &str) -> Result<Vec<FeeRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT record_json FROM fee_records WHERE agent_id = ?1 ORDER BY created_at",
        )?;
        let rows = stmt.query_map(params![agent_id], |row| row.get::<_, String>(0))?;

        let mut out = Vec::new();
        for row in rows {
            out.push(serde_json::from_str(&row?)?);
        }
        Ok(out)
    }

    // -----------------------------------------------------------------------
    // Proposals
    // -----------------------------------------------------------------------

    pub fn save_proposal(&self, proposal: &UpgradeProposal) -> Result<()> {
        self.conn.execute(
            "INSERT INTO proposals (proposal_id, status, record_json, updated_at)
             VALUES (?1, ?2, ?3, datetime('now'))
             ON CONFLICT(proposal_id) DO UPDATE SET
                status = ?2, record_json = ?3, updated_at = datetime('now')",
            params![
                proposal.proposal_id,
                match proposal.status {
                    ProposalStatus::Pending => "pending",
                    ProposalStatus::Executed => "executed",
                },
                serde_json::to_string(proposal)?,
            ],
        )?;
        Ok(())
    }

    pub fn load_proposal(&self, proposal_id: &str) -> Result<Option<UpgradeProposal>> {
        self.load_json(
            "SELECT record_json FROM proposals WHERE proposal_id = ?1",
            proposal_id,
        )
    }

    // -----------------------------------------------------------------------
    // Contract events
    // -----------------------------------------------------------------------

    pub fn save_contract_event(&self, event: &ContractEvent) -> Result<()> {
        self.conn.execute(
            "INSERT INTO contract_events (id, contract_address, event_type, payload_json, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                ulid::Ulid::new().to_string(),
                event.contract_address,
                event.event_type,
                event.payload.to_string(),
                event.at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn contract_events(&self, contract_address: &str) -> Result<Vec<(String, String)>> {
        let mut stmt = self.conn.prepare(
            "SELECT event_type, payload_json FROM contract_events
             WHERE contract_address = ?1 ORDER BY recorded_at",
        )?;
        let rows = stmt.query_map(params![contract_address], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn load_json<T: serde::de::DeserializeOwned>(
        &self,
        sql: &str,
        key: &str,
    ) -> Result<Option<T>> {
        let mut stmt = self.conn.prepare(sql)?;
        let json: Option<String> = stmt.query_row(params![key], |row| row.get(0)).optional()?;
        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }
}
