//! Agent factory — deterministic deployment plus governance gates.
//!
//! `deploy_agent` derives the contract address from `(owner, salt,
//! workchain)`, debits the fixed deployment fee to the treasury, registers
//! the wallet with custody and the agent with the registry, and tracks
//! per-owner caps. `deploy_strategy` requires the target agent to exist in
//! the factory's own records — a missing cross-reference is a distinct error
//! from "agent not found" elsewhere. Every entry point checks the emergency
//! switch first.

pub mod address;
pub mod governance;

pub use address::derive_address;
pub use governance::{Governance, UpgradeParams};

use crate::amount::Nano;
use crate::custody::WalletManager;
use crate::error::{Result, VaultError};
use crate::events::{EventBus, EventKind};
use crate::fees::FeeEngine;
use crate::registry::{AgentRegistry, RegisterOptions};
use crate::strategy::{CreateStrategyParams, StrategyEngine};
use crate::types::{AgentDeployment, CustodyConfig, FactoryStats, FeeKind, StrategyRecord};
use chrono::Utc;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

/// Current deployment layout version stamped on new agents.
pub const DEPLOYMENT_VERSION: u32 = 1;

/// Factory settings.
#[derive(Debug, Clone)]
pub struct FactoryConfig {
    /// Fixed fee debited to the treasury per agent deployment.
    pub deployment_fee: Nano,
    pub max_agents_per_user: u32,
}

impl Default for FactoryConfig {
    fn default() -> Self {
        Self {
            deployment_fee: Nano::new(100_000_000),
            max_agents_per_user: 3,
        }
    }
}

/// Request to deploy a new agent.
#[derive(Debug, Clone)]
pub struct DeployAgentRequest {
    pub owner_id: String,
    pub owner_address: String,
    pub custody: CustodyConfig,
    pub salt: String,
    pub workchain: i8,
}

/// Process-wide deployment counters, mutated under a single lock.
#[derive(Default)]
struct FactoryCore {
    deployments: HashMap<String, AgentDeployment>,
    agents_per_owner: HashMap<String, u32>,
    total_strategies: u64,
    total_fees_collected: Nano,
}

/// The factory. Cloneable handle; all clones share state.
#[derive(Clone)]
pub struct AgentFactory {
    config: FactoryConfig,
    core: Arc<Mutex<FactoryCore>>,
    governance: Governance,
    wallets: WalletManager,
    registry: AgentRegistry,
    strategies: StrategyEngine,
    fees: FeeEngine,
    events: EventBus,
}

impl AgentFactory {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: FactoryConfig,
        governance: Governance,
        wallets: WalletManager,
        registry: AgentRegistry,
        strategies: StrategyEngine,
        fees: FeeEngine,
        events: EventBus,
    ) -> Self {
        Self {
            config,
            core: Arc::new(Mutex::new(FactoryCore::default())),
            governance,
            wallets,
            registry,
            strategies,
            fees,
            events,
        }
    }

    /// Deploy a new agent: derive its address, create its wallet, register
    /// it, and collect the deployment fee.
    pub async fn deploy_agent(&self, request: DeployAgentRequest) -> Result<AgentDeployment> {
        self.governance.ensure_not_paused().await?;

        // Cap check and counter bump stay under one lock so concurrent
        // deployments for the same owner cannot both pass the cap.
        let mut core = self.core.lock().await;
        let count = core
            .agents_per_owner
            .get(&request.owner_address)
            .copied()
            .unwrap_or(0);
        if count >= self.config.max_agents_per_user {
            return Err(VaultError::MaxAgentsReached {
                owner: request.owner_address.clone(),
                count,
                max: self.config.max_agents_per_user,
            });
        }

        let agent_id = ulid::Ulid::new().to_string();
        let contract_address =
            derive_address(&request.owner_address, &request.salt, request.workchain);

        let deployment = AgentDeployment {
            agent_id: agent_id.clone(),
            owner_id: request.owner_id.clone(),
            owner_address: request.owner_address.clone(),
            contract_address: contract_address.clone(),
            custody_mode: request.custody.mode(),
            deployed_at: Utc::now(),
            version: DEPLOYMENT_VERSION,
        };
        core.deployments.insert(agent_id.clone(), deployment.clone());
        *core
            .agents_per_owner
            .entry(request.owner_address.clone())
            .or_insert(0) += 1;
        core.total_fees_collected = core
            .total_fees_collected
            .checked_add(self.config.deployment_fee)
            .ok_or(VaultError::AmountOverflow("deployment fees"))?;
        drop(core);

        // Wallet creation validates the mode-specific config; roll the
        // factory bookkeeping back if it is rejected.
        if let Err(e) = self
            .wallets
            .create_wallet(
                &agent_id,
                &contract_address,
                &request.owner_address,
                request.custody.clone(),
            )
            .await
        {
            let mut core = self.core.lock().await;
            core.deployments.remove(&agent_id);
            if let Some(n) = core.agents_per_owner.get_mut(&request.owner_address) {
                *n = n.saturating_sub(1);
            }
            core.total_fees_collected = core
                .total_fees_collected
                .checked_sub(self.config.deployment_fee)
                .unwrap_or(Nano::ZERO);
            return Err(e);
        }

        self.registry
            .register_agent(
                &agent_id,
                &request.owner_address,
                &contract_address,
                None,
                RegisterOptions::default(),
            )
            .await?;

        if self.config.deployment_fee.is_positive() {
            self.fees
                .record_fee(
                    FeeKind::Protocol,
                    &agent_id,
                    self.config.deployment_fee,
                    &self.fees.schedule().treasury_address.clone(),
                )
                .await?;
        }

        info!(agent_id, owner = %request.owner_address, %contract_address, "agent deployed");
        self.events.emit(
            EventKind::AgentDeployed,
            &agent_id,
            json!({
                "owner": request.owner_address,
                "contract": contract_address,
                "mode": deployment.custody_mode.to_string(),
            }),
        );
        Ok(deployment)
    }

    /// Deploy a strategy for an agent the factory itself deployed. An agent
    /// known elsewhere but not here fails with the cross-reference error.
    pub async fn deploy_strategy(
        &self,
        params: CreateStrategyParams,
    ) -> Result<StrategyRecord> {
        self.governance.ensure_not_paused().await?;

        {
            let core = self.core.lock().await;
            if !core.deployments.contains_key(&params.agent_id) {
                return Err(VaultError::AgentNotRegisteredWithFactory(
                    params.agent_id.clone(),
                ));
            }
        }

        let record = self.strategies.create_strategy(params).await?;
        let mut core = self.core.lock().await;
        core.total_strategies += 1;
        Ok(record)
    }

    pub async fn deployment(&self, agent_id: &str) -> Result<AgentDeployment> {
        let core = self.core.lock().await;
        core.deployments
            .get(agent_id)
            .cloned()
            .ok_or_else(|| VaultError::UnknownAgent(agent_id.to_string()))
    }

    pub async fn stats(&self) -> FactoryStats {
        let core = self.core.lock().await;
        FactoryStats {
            total_agents: core.deployments.len() as u64,
            total_strategies: core.total_strategies,
            total_fees_collected: core.total_fees_collected,
        }
    }

    pub fn governance(&self) -> &Governance {
        &self.governance
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::MockSubmitter;
    use crate::fees::FeeSchedule;
    use crate::types::{MpcConfig, NonCustodialConfig, RiskLevel, StopConditions};

    fn non_custodial() -> CustodyConfig {
        CustodyConfig::NonCustodial(NonCustodialConfig {
            owner_public_key: "0xabcd".into(),
            wallet_format: "v4r2".into(),
        })
    }

    fn factory() -> AgentFactory {
        let events = EventBus::default();
        AgentFactory::new(
            FactoryConfig::default(),
            Governance::new(events.clone()),
            WalletManager::new(Arc::new(MockSubmitter::new()), events.clone()),
            AgentRegistry::new(events.clone()),
            StrategyEngine::new(events.clone()),
            FeeEngine::new(FeeSchedule::default(), events.clone()),
            events,
        )
    }

    fn request(owner: &str, salt: &str) -> DeployAgentRequest {
        DeployAgentRequest {
            owner_id: "user-1".into(),
            owner_address: owner.into(),
            custody: non_custodial(),
            salt: salt.into(),
            workchain: 0,
        }
    }

    #[tokio::test]
    async fn max_agents_per_user_is_enforced_with_exact_stats() {
        let f = factory();
        for i in 0..3 {
            f.deploy_agent(request("EQowner", &format!("salt-{i}"))).await.unwrap();
        }

        let err = f.deploy_agent(request("EQowner", "salt-3")).await.unwrap_err();
        assert!(matches!(err, VaultError::MaxAgentsReached { count: 3, max: 3, .. }));

        let stats = f.stats().await;
        assert_eq!(stats.total_agents, 3);
        assert_eq!(stats.total_fees_collected, Nano::new(300_000_000));

        // A different owner is unaffected.
        assert!(f.deploy_agent(request("EQother", "salt-0")).await.is_ok());
    }

    #[tokio::test]
    async fn deployment_registers_wallet_and_registry_entry() {
        let f = factory();
        let d = f.deploy_agent(request("EQowner", "salt-1")).await.unwrap();

        assert_eq!(
            d.contract_address,
            derive_address("EQowner", "salt-1", 0)
        );
        assert!(f.wallets.wallet(&d.agent_id).await.is_ok());
        assert!(f.registry.get_agent(&d.agent_id).await.is_ok());
        assert_eq!(f.fees.fees_for_agent(&d.agent_id).await.len(), 1);
    }

    #[tokio::test]
    async fn invalid_custody_config_rolls_back_counters() {
        let f = factory();
        let mut req = request("EQowner", "salt-1");
        req.custody = CustodyConfig::Mpc(MpcConfig {
            threshold: 5,
            parties: 3,
            party_public_keys: vec!["0x00".into(), "0x01".into(), "0x02".into()],
        });

        assert!(f.deploy_agent(req).await.is_err());
        let stats = f.stats().await;
        assert_eq!(stats.total_agents, 0);
        assert_eq!(stats.total_fees_collected, Nano::ZERO);
        // Owner can still deploy a full quota.
        for i in 0..3 {
            f.deploy_agent(request("EQowner", &format!("ok-{i}"))).await.unwrap();
        }
    }

    #[tokio::test]
    async fn strategy_requires_factory_record() {
        let f = factory();
        let d = f.deploy_agent(request("EQowner", "salt-1")).await.unwrap();

        // Known to the registry but not the factory: distinct error.
        f.registry
            .register_agent("foreign", "EQo", "EQc", None, RegisterOptions::default())
            .await
            .unwrap();
        let err = f
            .deploy_strategy(CreateStrategyParams {
                agent_id: "foreign".into(),
                strategy_type: "dca".into(),
                risk_level: RiskLevel::Low,
                max_gas_budget: Nano::from_tons(1),
                stop_conditions: StopConditions::default(),
                schedule: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::AgentNotRegisteredWithFactory(_)));

        let record = f
            .deploy_strategy(CreateStrategyParams {
                agent_id: d.agent_id.clone(),
                strategy_type: "dca".into(),
                risk_level: RiskLevel::Low,
                max_gas_budget: Nano::from_tons(1),
                stop_conditions: StopConditions::default(),
                schedule: None,
            })
            .await
            .unwrap();
        assert_eq!(record.agent_id, d.agent_id);
        assert_eq!(f.stats().await.total_strategies, 1);
    }

    #[tokio::test]
    async fn pause_blocks_deployments_until_resolved() {
        let f = factory();
        f.governance().trigger_emergency("incident", "ops").await.unwrap();

        let err = f.deploy_agent(request("EQowner", "salt-1")).await.unwrap_err();
        assert!(err.is_governance_block());
        let err = f
            .deploy_strategy(CreateStrategyParams {
                agent_id: "any".into(),
                strategy_type: "dca".into(),
                risk_level: RiskLevel::Low,
                max_gas_budget: Nano::from_tons(1),
                stop_conditions: StopConditions::default(),
                schedule: None,
            })
            .await
            .unwrap_err();
        assert!(err.is_governance_block());

        f.governance().resolve_emergency("ops").await.unwrap();
        assert!(f.deploy_agent(request("EQowner", "salt-1")).await.is_ok());
    }

    #[tokio::test]
    async fn derived_addresses_differ_per_salt_and_owner() {
        let f = factory();
        let a = f.deploy_agent(request("EQowner", "salt-1")).await.unwrap();
        let b = f.deploy_agent(request("EQowner", "salt-2")).await.unwrap();
        let c = f.deploy_agent(request("EQother", "salt-1")).await.unwrap();
        assert_ne!(a.contract_address, b.contract_address);
        assert_ne!(a.contract_address, c.contract_address);
    }
}
