//! Agent registry — the authoritative directory.
//!
//! Maps each agent to its owner, custody contract, risk score and audit
//! history, and answers every cross-cutting query (by owner, by risk, by
//! telegram identity). Every mutation to status, risk score or performance
//! appends exactly one audit-trail entry; the trail itself is append-only.

use crate::error::{Result, VaultError};
use crate::events::{EventBus, EventKind};
use crate::types::{
    AgentStatus, AuditEntry, ContractEvent, PerformanceSnapshot, RegistryEntry,
};
use chrono::Utc;
use serde_json::json;
use sha3::{Digest, Keccak256};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

/// Maximum admissible risk score.
pub const MAX_RISK_SCORE: u32 = 1000;

/// Optional knobs for `register_agent`.
#[derive(Debug, Clone, Default)]
pub struct RegisterOptions {
    pub tags: Vec<String>,
    pub telegram_user_id: Option<i64>,
    /// Defaults to 500 (mid-scale) when unset.
    pub initial_risk_score: Option<u32>,
}

/// Composable query filter; unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct AgentFilter {
    pub owner_address: Option<String>,
    pub status: Option<AgentStatus>,
    pub max_risk_score: Option<u32>,
    /// Entry must carry every listed tag.
    pub tags: Vec<String>,
    pub limit: Option<usize>,
    pub offset: usize,
}

/// Telegram identity link. Repeated mappings accumulate agent ids.
#[derive(Debug, Clone)]
struct TelegramLink {
    wallet_address: String,
    agent_ids: Vec<String>,
}

/// The directory. Cloneable handle; per-entry state is serialized behind
/// its own lock, cross-agent indexes behind the outer map locks.
#[derive(Clone)]
pub struct AgentRegistry {
    entries: Arc<Mutex<HashMap<String, Arc<Mutex<RegistryEntry>>>>>,
    telegram: Arc<Mutex<HashMap<i64, TelegramLink>>>,
    contract_events: Arc<Mutex<HashMap<String, Vec<ContractEvent>>>>,
    events: EventBus,
}

impl AgentRegistry {
    pub fn new(events: EventBus) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            telegram: Arc::new(Mutex::new(HashMap::new())),
            contract_events: Arc::new(Mutex::new(HashMap::new())),
            events,
        }
    }

    // -----------------------------------------------------------------------
    // Registration & mutation
    // -----------------------------------------------------------------------

    /// Register an agent. Fails on duplicate agent id.
    pub async fn register_agent(
        &self,
        agent_id: &str,
        owner_address: &str,
        contract_address: &str,
        strategy_meta: Option<&serde_json::Value>,
        options: RegisterOptions,
    ) -> Result<RegistryEntry> {
        let mut entries = self.entries.lock().await;
        if entries.contains_key(agent_id) {
            return Err(VaultError::DuplicateAgent(agent_id.to_string()));
        }

        let now = Utc::now();
        let entry = RegistryEntry {
            agent_id: agent_id.to_string(),
            owner_address: owner_address.to_string(),
            contract_address: contract_address.to_string(),
            strategy_hash: strategy_hash(strategy_meta),
            status: AgentStatus::Active,
            risk_score: options.initial_risk_score.unwrap_or(500).min(MAX_RISK_SCORE),
            performance: PerformanceSnapshot::default(),
            telegram_user_id: options.telegram_user_id,
            tags: options.tags,
            audit_trail: vec![AuditEntry {
                actor: owner_address.to_string(),
                action: "registered".into(),
                at: now,
            }],
            registered_at: now,
        };

        entries.insert(
            agent_id.to_string(),
            Arc::new(Mutex::new(entry.clone())),
        );
        drop(entries);

        info!(agent_id, owner_address, "agent registered");
        self.events.emit(
            EventKind::AgentRegistered,
            agent_id,
            json!({ "owner": owner_address }),
        );
        Ok(entry)
    }

    pub async fn update_status(
        &self,
        agent_id: &str,
        status: AgentStatus,
        actor: &str,
    ) -> Result<RegistryEntry> {
        let handle = self.entry_handle(agent_id).await?;
        let mut entry = handle.lock().await;
        entry.status = status;
        entry.audit_trail.push(AuditEntry {
            actor: actor.to_string(),
            action: format!("status -> {status}"),
            at: Utc::now(),
        });
        let snapshot = entry.clone();
        drop(entry);
        self.emit_updated(agent_id, "status");
        Ok(snapshot)
    }

    /// Bounds-checked risk score update. An out-of-range score is rejected
    /// before any field or audit entry is touched.
    pub async fn update_risk_score(
        &self,
        agent_id: &str,
        risk_score: u32,
        actor: &str,
    ) -> Result<RegistryEntry> {
        if risk_score > MAX_RISK_SCORE {
            return Err(VaultError::RiskScoreOutOfRange(risk_score));
        }
        let handle = self.entry_handle(agent_id).await?;
        let mut entry = handle.lock().await;
        entry.risk_score = risk_score;
        entry.audit_trail.push(AuditEntry {
            actor: actor.to_string(),
            action: format!("risk_score -> {risk_score}"),
            at: Utc::now(),
        });
        let snapshot = entry.clone();
        drop(entry);
        self.emit_updated(agent_id, "risk_score");
        Ok(snapshot)
    }

    pub async fn update_performance(
        &self,
        agent_id: &str,
        performance: PerformanceSnapshot,
        actor: &str,
    ) -> Result<RegistryEntry> {
        let handle = self.entry_handle(agent_id).await?;
        let mut entry = handle.lock().await;
        entry.performance = performance;
        entry.audit_trail.push(AuditEntry {
            actor: actor.to_string(),
            action: "performance updated".into(),
            at: Utc::now(),
        });
        let snapshot = entry.clone();
        drop(entry);
        self.emit_updated(agent_id, "performance");
        Ok(snapshot)
    }

    // -----------------------------------------------------------------------
    // Telegram identity
    // -----------------------------------------------------------------------

    /// Link a telegram user to an agent. Additive: repeated calls for the
    /// same user accumulate agent ids rather than overwrite.
    pub async fn map_telegram_user(
        &self,
        user_id: i64,
        wallet_address: &str,
        agent_id: &str,
    ) -> Result<()> {
        let handle = self.entry_handle(agent_id).await?;
        {
            let mut entry = handle.lock().await;
            entry.telegram_user_id = Some(user_id);
        }

        let mut telegram = self.telegram.lock().await;
        let link = telegram.entry(user_id).or_insert_with(|| TelegramLink {
            wallet_address: wallet_address.to_string(),
            agent_ids: Vec::new(),
        });
        link.wallet_address = wallet_address.to_string();
        if !link.agent_ids.iter().any(|a| a == agent_id) {
            link.agent_ids.push(agent_id.to_string());
        }
        Ok(())
    }

    pub async fn get_agents_by_telegram_user(&self, user_id: i64) -> Vec<RegistryEntry> {
        let agent_ids = {
            let telegram = self.telegram.lock().await;
            match telegram.get(&user_id) {
                Some(link) => link.agent_ids.clone(),
                None => return Vec::new(),
            }
        };

        let mut out = Vec::new();
        for agent_id in agent_ids {
            if let Ok(handle) = self.entry_handle(&agent_id).await {
                out.push(handle.lock().await.clone());
            }
        }
        out
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub async fn get_agent(&self, agent_id: &str) -> Result<RegistryEntry> {
        let handle = self.entry_handle(agent_id).await?;
        let entry = handle.lock().await;
        Ok(entry.clone())
    }

    /// Composable filter query with stable ordering (registration time,
    /// then agent id) and limit/offset pagination.
    pub async fn query_agents(&self, filter: &AgentFilter) -> Vec<RegistryEntry> {
        let mut matches = Vec::new();
        for entry in self.snapshot_all().await {
            if let Some(owner) = &filter.owner_address {
                if &entry.owner_address != owner {
                    continue;
                }
            }
            if let Some(status) = filter.status {
                if entry.status != status {
                    continue;
                }
            }
            if let Some(max_risk) = filter.max_risk_score {
                if entry.risk_score > max_risk {
                    continue;
                }
            }
            if !filter.tags.iter().all(|t| entry.tags.contains(t)) {
                continue;
            }
            matches.push(entry);
        }

        matches.sort_by(|a, b| {
            a.registered_at
                .cmp(&b.registered_at)
                .then_with(|| a.agent_id.cmp(&b.agent_id))
        });

        matches
            .into_iter()
            .skip(filter.offset)
            .take(filter.limit.unwrap_or(usize::MAX))
            .collect()
    }

    /// Entries sorted by total profit, descending.
    pub async fn get_top_performers(&self, n: usize) -> Vec<RegistryEntry> {
        let mut entries = self.snapshot_all().await;
        entries.sort_by(|a, b| b.performance.total_profit.cmp(&a.performance.total_profit));
        entries.truncate(n);
        entries
    }

    // -----------------------------------------------------------------------
    // Raw contract events
    // -----------------------------------------------------------------------

    /// Append a raw on-chain event for later reconciliation.
    pub async fn record_contract_event(
        &self,
        contract_address: &str,
        event_type: &str,
        payload: serde_json::Value,
    ) {
        let mut log = self.contract_events.lock().await;
        log.entry(contract_address.to_string())
            .or_default()
            .push(ContractEvent {
                contract_address: contract_address.to_string(),
                event_type: event_type.to_string(),
                payload,
                at: Utc::now(),
            });
    }

    pub async fn get_contract_events(&self, contract_address: &str) -> Vec<ContractEvent> {
        let log = self.contract_events.lock().await;
        log.get(contract_address).cloned().unwrap_or_default()
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    async fn entry_handle(&self, agent_id: &str) -> Result<Arc<Mutex<RegistryEntry>>> {
        let entries = self.entries.lock().await;
        entries
            .get(agent_id)
            .cloned()
            .ok_or_else(|| VaultError::UnknownAgent(agent_id.to_string()))
    }

    async fn snapshot_all(&self) -> Vec<RegistryEntry> {
        let handles: Vec<_> = {
            let entries = self.entries.lock().await;
            entries.values().cloned().collect()
        };
        let mut out = Vec::with_capacity(handles.len());
        for handle in handles {
            out.push(handle.lock().await.clone());
        }
        out
    }

    fn emit_updated(&self, agent_id: &str, field: &str) {
        self.events.emit(
            EventKind::RegistryUpdated,
            agent_id,
            json!({ "field": field }),
        );
    }
}

/// Keccak hash of the strategy metadata an agent registers with.
fn strategy_hash(meta: Option<&serde_json::Value>) -> String {
    let bytes = meta
        .map(|m| m.to_string().into_bytes())
        .unwrap_or_default();
    format!("0x{}", hex::encode(Keccak256::digest(&bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amount::Nano;

    async fn registry_with(n: usize) -> AgentRegistry {
        let registry = AgentRegistry::new(EventBus::default());
        for i in 0..n {
            registry
                .register_agent(
                    &format!("agent-{i}"),
                    &format!("EQowner-{}", i % 2),
                    &format!("EQcontract-{i}"),
                    None,
                    RegisterOptions::default(),
                )
                .await
                .unwrap();
        }
        registry
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let registry = registry_with(1).await;
        let err = registry
            .register_agent("agent-0", "EQo", "EQc", None, RegisterOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::DuplicateAgent(_)));
    }

    #[tokio::test]
    async fn mutations_append_audit_entries() {
        let registry = registry_with(1).await;
        let entry = registry.get_agent("agent-0").await.unwrap();
        assert_eq!(entry.audit_trail.len(), 1);

        registry
            .update_status("agent-0", AgentStatus::Paused, "ops")
            .await
            .unwrap();
        registry
            .update_risk_score("agent-0", 750, "risk-bot")
            .await
            .unwrap();
        let entry = registry
            .update_performance(
                "agent-0",
                PerformanceSnapshot {
                    total_trades: 10,
                    total_profit: Nano::from_tons(4),
                    win_rate: 70,
                },
                "perf-bot",
            )
            .await
            .unwrap();
        assert_eq!(entry.audit_trail.len(), 4);
        assert_eq!(entry.audit_trail[2].action, "risk_score -> 750");
    }

    #[tokio::test]
    async fn out_of_range_risk_score_changes_nothing() {
        let registry = registry_with(1).await;
        let before = registry.get_agent("agent-0").await.unwrap();

        let err = registry
            .update_risk_score("agent-0", 1500, "risk-bot")
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::RiskScoreOutOfRange(1500)));

        let after = registry.get_agent("agent-0").await.unwrap();
        assert_eq!(after.risk_score, before.risk_score);
        assert_eq!(after.audit_trail.len(), before.audit_trail.len());
    }

    #[tokio::test]
    async fn telegram_mapping_is_additive() {
        let registry = registry_with(3).await;
        registry.map_telegram_user(42, "EQwallet", "agent-0").await.unwrap();
        registry.map_telegram_user(42, "EQwallet", "agent-1").await.unwrap();
        // Repeat does not duplicate.
        registry.map_telegram_user(42, "EQwallet", "agent-1").await.unwrap();

        let agents = registry.get_agents_by_telegram_user(42).await;
        assert_eq!(agents.len(), 2);
        assert!(registry.get_agents_by_telegram_user(7).await.is_empty());
    }

    #[tokio::test]
    async fn filters_compose_and_paginate() {
        let registry = registry_with(5).await;
        registry
            .update_status("agent-4", AgentStatus::Retired, "ops")
            .await
            .unwrap();
        registry.update_risk_score("agent-0", 900, "ops").await.unwrap();

        // Owner filter: owners alternate, EQowner-0 has agents 0, 2, 4.
        let by_owner = registry
            .query_agents(&AgentFilter {
                owner_address: Some("EQowner-0".into()),
                ..Default::default()
            })
            .await;
        assert_eq!(by_owner.len(), 3);

        let composed = registry
            .query_agents(&AgentFilter {
                owner_address: Some("EQowner-0".into()),
                status: Some(AgentStatus::Active),
                max_risk_score: Some(600),
                ..Default::default()
            })
            .await;
        // agent-4 retired, agent-0 too risky.
        assert_eq!(composed.len(), 1);
        assert_eq!(composed[0].agent_id, "agent-2");

        let page = registry
            .query_agents(&AgentFilter {
                limit: Some(2),
                offset: 2,
                ..Default::default()
            })
            .await;
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].agent_id, "agent-2");
    }

    #[tokio::test]
    async fn top_performers_sorted_by_profit() {
        let registry = registry_with(3).await;
        for (agent, profit) in [("agent-0", 5), ("agent-1", 20), ("agent-2", 10)] {
            registry
                .update_performance(
                    agent,
                    PerformanceSnapshot {
                        total_trades: 1,
                        total_profit: Nano::from_tons(profit),
                        win_rate: 100,
                    },
                    "perf-bot",
                )
                .await
                .unwrap();
        }

        let top = registry.get_top_performers(2).await;
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].agent_id, "agent-1");
        assert_eq!(top[1].agent_id, "agent-2");
    }

    #[tokio::test]
    async fn contract_events_accumulate_per_contract() {
        let registry = registry_with(1).await;
        registry
            .record_contract_event("EQcontract-0", "deposit", serde_json::json!({"n": 1}))
            .await;
        registry
            .record_contract_event("EQcontract-0", "withdraw", serde_json::json!({"n": 2}))
            .await;

        let events = registry.get_contract_events("EQcontract-0").await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, "deposit");
        assert!(registry.get_contract_events("EQnone").await.is_empty());
    }
}
