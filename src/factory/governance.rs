//! Emergency controls, role-based access and upgrade governance.
//!
//! All governance state — the emergency switch, role grants and upgrade
//! proposals — lives behind one lock so privileged operations are serialized
//! process-wide. Other components never read ambient pause flags; they call
//! [`Governance::ensure_not_paused`] and [`Governance::has_permission`]
//! explicitly.

use crate::error::{Result, VaultError};
use crate::events::{EventBus, EventKind};
use crate::types::{EmergencyState, ProposalStatus, RoleGrant, UpgradeProposal};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Parameters for a new upgrade proposal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpgradeParams {
    pub target_contract: String,
    pub new_code_hash: String,
    pub proposer: String,
    pub approvals_required: u32,
}

struct GovernanceState {
    emergency: EmergencyState,
    roles: HashMap<String, RoleGrant>,
    proposals: HashMap<String, UpgradeProposal>,
}

/// Governance component. Cloneable handle; one shared lock.
#[derive(Clone)]
pub struct Governance {
    state: Arc<Mutex<GovernanceState>>,
    events: EventBus,
}

impl Governance {
    pub fn new(events: EventBus) -> Self {
        Self {
            state: Arc::new(Mutex::new(GovernanceState {
                emergency: EmergencyState::default(),
                roles: HashMap::new(),
                proposals: HashMap::new(),
            })),
            events,
        }
    }

    // -----------------------------------------------------------------------
    // Emergency controls
    // -----------------------------------------------------------------------

    /// Pause the platform. Every deployment and execution entry point must
    /// fail fast until the emergency is resolved.
    pub async fn trigger_emergency(&self, reason: &str, by: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.emergency.is_paused {
            let current = state.emergency.reason.clone().unwrap_or_default();
            return Err(VaultError::FactoryPaused(current));
        }
        state.emergency = EmergencyState {
            is_paused: true,
            reason: Some(reason.to_string()),
            triggered_by: Some(by.to_string()),
        };
        drop(state);

        warn!(reason, by, "emergency triggered");
        self.events.emit(
            EventKind::EmergencyTriggered,
            "",
            json!({ "reason": reason, "by": by }),
        );
        Ok(())
    }

    /// Lift the pause. Fails if the platform is not currently paused.
    pub async fn resolve_emergency(&self, by: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        if !state.emergency.is_paused {
            return Err(VaultError::NotPaused);
        }
        state.emergency = EmergencyState::default();
        drop(state);

        info!(by, "emergency resolved");
        self.events
            .emit(EventKind::EmergencyResolved, "", json!({ "by": by }));
        Ok(())
    }

    /// Gate for privileged entry points. Returns the distinct
    /// `FactoryPaused` category while an emergency is active.
    pub async fn ensure_not_paused(&self) -> Result<()> {
        let state = self.state.lock().await;
        if state.emergency.is_paused {
            return Err(VaultError::FactoryPaused(
                state.emergency.reason.clone().unwrap_or_default(),
            ));
        }
        Ok(())
    }

    pub async fn emergency_state(&self) -> EmergencyState {
        self.state.lock().await.emergency.clone()
    }

    // -----------------------------------------------------------------------
    // Roles
    // -----------------------------------------------------------------------

    pub async fn grant_role(
        &self,
        role: &str,
        address: &str,
        permissions: Vec<String>,
        granted_by: &str,
    ) {
        let mut state = self.state.lock().await;
        state.roles.insert(
            address.to_string(),
            RoleGrant {
                role: role.to_string(),
                address: address.to_string(),
                permissions,
                granted_by: granted_by.to_string(),
                granted_at: Utc::now(),
            },
        );
        info!(role, address, granted_by, "role granted");
    }

    pub async fn revoke_role(&self, address: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state
            .roles
            .remove(address)
            .map(|_| ())
            .ok_or_else(|| VaultError::InvalidConfig(format!("no role granted to {address}")))
    }

    /// The single authorization check other components call before honoring
    /// a privileged request. `*` grants everything.
    pub async fn has_permission(&self, address: &str, permission: &str) -> bool {
        let state = self.state.lock().await;
        state
            .roles
            .get(address)
            .map(|grant| {
                grant
                    .permissions
                    .iter()
                    .any(|p| p == permission || p == "*")
            })
            .unwrap_or(false)
    }

    // -----------------------------------------------------------------------
    // Upgrade proposals
    // -----------------------------------------------------------------------

    /// Create a proposal with the proposer's own approval already recorded.
    /// A threshold of one therefore executes immediately.
    pub async fn propose_upgrade(&self, params: UpgradeParams) -> Result<UpgradeProposal> {
        if params.approvals_required == 0 {
            return Err(VaultError::InvalidConfig(
                "approvals_required must be at least 1".into(),
            ));
        }

        let mut approvals = BTreeSet::new();
        approvals.insert(params.proposer.clone());
        let mut proposal = UpgradeProposal {
            proposal_id: ulid::Ulid::new().to_string(),
            target_contract: params.target_contract,
            new_code_hash: params.new_code_hash,
            proposer: params.proposer,
            approvals_required: params.approvals_required,
            approvals,
            status: ProposalStatus::Pending,
            created_at: Utc::now(),
        };
        maybe_execute(&mut proposal);

        let mut state = self.state.lock().await;
        state
            .proposals
            .insert(proposal.proposal_id.clone(), proposal.clone());
        drop(state);

        self.events.emit(
            EventKind::UpgradeProposed,
            "",
            json!({ "proposal_id": proposal.proposal_id }),
        );
        if proposal.status == ProposalStatus::Executed {
            self.emit_executed(&proposal);
        }
        Ok(proposal)
    }

    /// Add an approval. Idempotent per address; transitions to `executed`
    /// the moment the threshold is met — there is no separate execute call.
    pub async fn approve_upgrade(
        &self,
        proposal_id: &str,
        approver: &str,
    ) -> Result<UpgradeProposal> {
        let mut state = self.state.lock().await;
        let proposal = state
            .proposals
            .get_mut(proposal_id)
            .ok_or_else(|| VaultError::UnknownProposal(proposal_id.to_string()))?;

        if proposal.status == ProposalStatus::Executed {
            return Err(VaultError::ProposalAlreadyExecuted(proposal_id.to_string()));
        }

        proposal.approvals.insert(approver.to_string());
        maybe_execute(proposal);
        let snapshot = proposal.clone();
        drop(state);

        if snapshot.status == ProposalStatus::Executed {
            self.emit_executed(&snapshot);
        }
        Ok(snapshot)
    }

    pub async fn proposal(&self, proposal_id: &str) -> Result<UpgradeProposal> {
        let state = self.state.lock().await;
        state
            .proposals
            .get(proposal_id)
            .cloned()
            .ok_or_else(|| VaultError::UnknownProposal(proposal_id.to_string()))
    }

    fn emit_executed(&self, proposal: &UpgradeProposal) {
        info!(
            proposal_id = %proposal.proposal_id,
            target = %proposal.target_contract,
            "upgrade executed"
        );
        self.events.emit(
            EventKind::UpgradeExecuted,
            "",
            json!({ "proposal_id": proposal.proposal_id }),
        );
    }
}

fn maybe_execute(proposal: &mut UpgradeProposal) {
    if proposal.approvals.len() as u32 >= proposal.approvals_required {
        proposal.status = ProposalStatus::Executed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn governance() -> Governance {
        Governance::new(EventBus::default())
    }

    fn params(required: u32) -> UpgradeParams {
        UpgradeParams {
            target_contract: "0:target".into(),
            new_code_hash: "0xcode".into(),
            proposer: "EQproposer".into(),
            approvals_required: required,
        }
    }

    #[tokio::test]
    async fn emergency_pause_and_resolve() {
        let g = governance();
        assert!(g.ensure_not_paused().await.is_ok());
        assert!(matches!(
            g.resolve_emergency("ops").await,
            Err(VaultError::NotPaused)
        ));

        g.trigger_emergency("exploit drill", "ops").await.unwrap();
        let err = g.ensure_not_paused().await.unwrap_err();
        assert!(err.is_governance_block());

        // Double-trigger is rejected.
        assert!(g.trigger_emergency("again", "ops").await.is_err());

        g.resolve_emergency("ops").await.unwrap();
        assert!(g.ensure_not_paused().await.is_ok());
    }

    #[tokio::test]
    async fn roles_gate_permissions() {
        let g = governance();
        assert!(!g.has_permission("EQops", "pause").await);

        g.grant_role("operator", "EQops", vec!["pause".into(), "upgrade".into()], "EQroot")
            .await;
        assert!(g.has_permission("EQops", "pause").await);
        assert!(!g.has_permission("EQops", "mint").await);

        g.grant_role("admin", "EQroot", vec!["*".into()], "EQroot").await;
        assert!(g.has_permission("EQroot", "anything").await);

        g.revoke_role("EQops").await.unwrap();
        assert!(!g.has_permission("EQops", "pause").await);
        assert!(g.revoke_role("EQops").await.is_err());
    }

    #[tokio::test]
    async fn proposal_executes_at_threshold() {
        let g = governance();
        let p = g.propose_upgrade(params(3)).await.unwrap();
        assert_eq!(p.status, ProposalStatus::Pending);
        assert_eq!(p.approvals.len(), 1);

        // Proposer re-approving is a no-op.
        let p = g.approve_upgrade(&p.proposal_id, "EQproposer").await.unwrap();
        assert_eq!(p.approvals.len(), 1);
        assert_eq!(p.status, ProposalStatus::Pending);

        let p = g.approve_upgrade(&p.proposal_id, "EQsigner2").await.unwrap();
        assert_eq!(p.status, ProposalStatus::Pending);

        let p = g.approve_upgrade(&p.proposal_id, "EQsigner3").await.unwrap();
        assert_eq!(p.status, ProposalStatus::Executed);

        // No approvals after execution.
        assert!(matches!(
            g.approve_upgrade(&p.proposal_id, "EQsigner4").await,
            Err(VaultError::ProposalAlreadyExecuted(_))
        ));
    }

    #[tokio::test]
    async fn threshold_of_one_executes_immediately() {
        let g = governance();
        let p = g.propose_upgrade(params(1)).await.unwrap();
        assert_eq!(p.status, ProposalStatus::Executed);
    }

    #[tokio::test]
    async fn unknown_proposal_is_a_hard_error() {
        let g = governance();
        assert!(matches!(
            g.approve_upgrade("missing", "EQa").await,
            Err(VaultError::UnknownProposal(_))
        ));
    }
}
