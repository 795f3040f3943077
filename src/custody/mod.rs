//! Agent wallet custody.
//!
//! One uniform transaction-execution contract over three custody providers:
//! non-custodial (owner device signs, platform relays), MPC threshold-signed
//! (session protocol in [`mpc`]) and policy-constrained smart-contract
//! wallets ([`smart_contract`]). Policy violations come back as typed
//! failures inside `TxResult`; hard errors are reserved for caller-contract
//! violations such as unknown wallets or invalid configuration.
//!
//! State transitions are serialized per agent: the manager keeps one lock
//! per wallet aggregate, so two concurrent spend-limit checks against the
//! same wallet cannot both pass a limit only one can satisfy, while distinct
//! agents proceed fully in parallel.

pub mod mpc;
pub mod non_custodial;
pub mod smart_contract;

pub use mpc::{SessionArena, SigningSession};

use crate::amount::Nano;
use crate::chain::{ChainSubmitter, Submitted};
use crate::error::{Result, VaultError};
use crate::events::{EventBus, EventKind};
use crate::types::{
    CustodyConfig, CustodyMode, TxFailure, TxRequest, TxResult, WalletRecord, WalletStatus,
};
use chrono::{Duration as ChronoDuration, Utc};
use serde_json::json;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Wallet plus the transient per-wallet state guarded by its lock.
struct WalletAggregate {
    record: WalletRecord,
    /// Distinct co-signer approvals per pending request id.
    approvals: HashMap<String, BTreeSet<String>>,
}

/// Custody front door. Cloneable handle; all clones share state.
#[derive(Clone)]
pub struct WalletManager {
    wallets: Arc<Mutex<HashMap<String, Arc<Mutex<WalletAggregate>>>>>,
    sessions: SessionArena,
    submitter: Arc<dyn ChainSubmitter>,
    events: EventBus,
}

impl WalletManager {
    pub fn new(submitter: Arc<dyn ChainSubmitter>, events: EventBus) -> Self {
        Self {
            wallets: Arc::new(Mutex::new(HashMap::new())),
            sessions: SessionArena::new(),
            submitter,
            events,
        }
    }

    /// The shared signing-session arena (exposed for the reaper task).
    pub fn sessions(&self) -> &SessionArena {
        &self.sessions
    }

    // -----------------------------------------------------------------------
    // Wallet lifecycle
    // -----------------------------------------------------------------------

    /// Create the wallet for an agent. Fails if the agent already has one or
    /// if the mode-specific configuration is invalid.
    pub async fn create_wallet(
        &self,
        agent_id: &str,
        contract_address: &str,
        owner_address: &str,
        config: CustodyConfig,
    ) -> Result<WalletRecord> {
        validate_custody_config(&config)?;

        let mut wallets = self.wallets.lock().await;
        if wallets.contains_key(agent_id) {
            return Err(VaultError::DuplicateWallet(agent_id.to_string()));
        }

        let now = Utc::now();
        let record = WalletRecord {
            agent_id: agent_id.to_string(),
            contract_address: contract_address.to_string(),
            owner_address: owner_address.to_string(),
            status: WalletStatus::Active,
            balance: Nano::ZERO,
            config,
            daily_spent: Nano::ZERO,
            daily_window_start: now,
            created_at: now,
        };

        wallets.insert(
            agent_id.to_string(),
            Arc::new(Mutex::new(WalletAggregate {
                record: record.clone(),
                approvals: HashMap::new(),
            })),
        );
        drop(wallets);

        info!(agent_id, mode = %record.config.mode(), "wallet created");
        self.events.emit(
            EventKind::WalletCreated,
            agent_id,
            json!({ "mode": record.config.mode().to_string() }),
        );
        Ok(record)
    }

    /// Snapshot of the current wallet record.
    pub async fn wallet(&self, agent_id: &str) -> Result<WalletRecord> {
        let aggregate = self.aggregate(agent_id).await?;
        let guard = aggregate.lock().await;
        Ok(guard.record.clone())
    }

    /// Credit a deposit. Returns the new balance.
    pub async fn credit(&self, agent_id: &str, amount: Nano) -> Result<Nano> {
        if !amount.is_positive() {
            return Err(VaultError::InvalidConfig(
                "credit amount must be positive".into(),
            ));
        }
        let aggregate = self.aggregate(agent_id).await?;
        let mut guard = aggregate.lock().await;
        guard.record.balance = guard
            .record
            .balance
            .checked_add(amount)
            .ok_or(VaultError::AmountOverflow("wallet credit"))?;
        Ok(guard.record.balance)
    }

    pub async fn pause_wallet(&self, agent_id: &str) -> Result<()> {
        self.transition(agent_id, WalletStatus::Active, WalletStatus::Paused)
            .await
    }

    pub async fn resume_wallet(&self, agent_id: &str) -> Result<()> {
        self.transition(agent_id, WalletStatus::Paused, WalletStatus::Active)
            .await
    }

    /// Terminal stop. A stopped wallet never executes again.
    pub async fn stop_wallet(&self, agent_id: &str) -> Result<()> {
        let aggregate = self.aggregate(agent_id).await?;
        let mut guard = aggregate.lock().await;
        if guard.record.status == WalletStatus::Stopped {
            return Err(VaultError::InvalidTransition {
                kind: "wallet",
                from: "stopped".into(),
                to: "stopped".into(),
            });
        }
        guard.record.status = WalletStatus::Stopped;
        drop(guard);
        self.events.emit(
            EventKind::WalletStatusChanged,
            agent_id,
            json!({ "status": "stopped" }),
        );
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Co-signer approvals (smart-contract mode)
    // -----------------------------------------------------------------------

    /// Record a co-signer's approval for a pending request. Idempotent per
    /// co-signer. Returns how many distinct approvals are now present.
    pub async fn approve_pending_tx(
        &self,
        agent_id: &str,
        request_id: &str,
        cosigner: &str,
    ) -> Result<u8> {
        let aggregate = self.aggregate(agent_id).await?;
        let mut guard = aggregate.lock().await;

        let co_signers = match &guard.record.config {
            CustodyConfig::SmartContract(cfg) => cfg.co_signers.clone(),
            other => {
                return Err(VaultError::InvalidConfig(format!(
                    "co-signer approval only applies to smart-contract wallets, not {}",
                    other.mode()
                )))
            }
        };
        if !co_signers.iter().any(|c| c == cosigner) {
            return Err(VaultError::PermissionDenied {
                address: cosigner.to_string(),
                permission: "cosign".into(),
            });
        }

        let set = guard
            .approvals
            .entry(request_id.to_string())
            .or_default();
        set.insert(cosigner.to_string());
        Ok(set.len() as u8)
    }

    // -----------------------------------------------------------------------
    // Execution
    // -----------------------------------------------------------------------

    /// Execute a transaction against a smart-contract or MPC wallet.
    ///
    /// For MPC wallets the request must already have a threshold-reached
    /// signing session (opened via [`Self::initiate_signing_session`]).
    pub async fn execute_transaction(
        &self,
        agent_id: &str,
        request: &TxRequest,
        timeout: Duration,
    ) -> Result<TxResult> {
        let aggregate = self.aggregate(agent_id).await?;
        let mode = {
            let guard = aggregate.lock().await;
            guard.record.config.mode()
        };

        match mode {
            CustodyMode::SmartContract => {
                self.execute_smart_contract(agent_id, &aggregate, request, timeout)
                    .await
            }
            CustodyMode::Mpc => {
                let session_id = self
                    .sessions
                    .find_ready_by_request(agent_id, &request.request_id)
                    .await
                    .ok_or_else(|| {
                        VaultError::ThresholdNotReached(request.request_id.clone())
                    })?;
                self.finalize_and_submit(&session_id, timeout).await
            }
            CustodyMode::NonCustodial => Err(VaultError::InvalidConfig(
                "non-custodial wallets execute via sign_and_submit".into(),
            )),
        }
    }

    /// Relay a pre-signed transaction for a non-custodial wallet.
    pub async fn sign_and_submit(
        &self,
        agent_id: &str,
        request: &TxRequest,
        timeout: Duration,
    ) -> Result<TxResult> {
        let aggregate = self.aggregate(agent_id).await?;
        let mut guard = aggregate.lock().await;

        let config = match &guard.record.config {
            CustodyConfig::NonCustodial(cfg) => cfg.clone(),
            other => {
                return Err(VaultError::InvalidConfig(format!(
                    "sign_and_submit only applies to non-custodial wallets, not {}",
                    other.mode()
                )))
            }
        };

        if guard.record.status != WalletStatus::Active {
            return self.reject(agent_id, request, TxFailure::WalletNotActive {
                status: guard.record.status,
            });
        }
        if request.amount > guard.record.balance {
            return self.reject(agent_id, request, TxFailure::InsufficientBalance {
                amount: request.amount,
                balance: guard.record.balance,
            });
        }

        let envelope = match non_custodial::check_signed_payload(&config, request) {
            Ok(bytes) => bytes,
            Err(failure) => return self.reject(agent_id, request, failure),
        };

        let submitted = self.submit_with_timeout(&envelope, timeout).await?;
        guard.record.balance = guard
            .record
            .balance
            .checked_sub(request.amount)
            .ok_or(VaultError::AmountOverflow("wallet debit"))?;
        drop(guard);

        self.emit_executed(agent_id, request, &submitted);
        Ok(TxResult::ok(submitted.tx_hash, submitted.gas_used))
    }

    /// Open a threshold-signing session for an MPC wallet.
    pub async fn initiate_signing_session(
        &self,
        agent_id: &str,
        request: TxRequest,
    ) -> Result<String> {
        let aggregate = self.aggregate(agent_id).await?;
        let guard = aggregate.lock().await;
        let (threshold, parties) = match &guard.record.config {
            CustodyConfig::Mpc(cfg) => (cfg.threshold, cfg.parties),
            other => {
                return Err(VaultError::InvalidConfig(format!(
                    "signing sessions only apply to mpc wallets, not {}",
                    other.mode()
                )))
            }
        };
        drop(guard);

        let session_id = self
            .sessions
            .initiate(agent_id, request, threshold, parties)
            .await;
        self.events.emit(
            EventKind::SigningSessionOpened,
            agent_id,
            json!({ "session_id": session_id }),
        );
        Ok(session_id)
    }

    /// Submit one party's share. Safe to call concurrently for distinct
    /// party indices; idempotent for a repeated index.
    pub async fn submit_share(
        &self,
        session_id: &str,
        party_index: u8,
        share: &str,
    ) -> Result<bool> {
        self.sessions.submit_share(session_id, party_index, share).await
    }

    /// Abandon a pending session without touching the wallet.
    pub async fn cancel_session(&self, session_id: &str) -> Result<()> {
        self.sessions.cancel(session_id).await?;
        self.events.emit(
            EventKind::SigningSessionCancelled,
            "",
            json!({ "session_id": session_id }),
        );
        Ok(())
    }

    /// Finalize a threshold-reached session and submit the transaction.
    /// Exactly-once: a second call for the same session fails with
    /// `UnknownSession`. On a transient submission failure the session is
    /// restored so the caller can retry.
    pub async fn finalize_and_submit(
        &self,
        session_id: &str,
        timeout: Duration,
    ) -> Result<TxResult> {
        let session = self.sessions.take_for_finalize(session_id).await?;
        let agent_id = session.agent_id.clone();
        let request = session.request.clone();

        let aggregate = self.aggregate(&agent_id).await?;
        let mut guard = aggregate.lock().await;

        if guard.record.status != WalletStatus::Active {
            return self.reject(&agent_id, &request, TxFailure::WalletNotActive {
                status: guard.record.status,
            });
        }
        if request.amount > guard.record.balance {
            return self.reject(&agent_id, &request, TxFailure::InsufficientBalance {
                amount: request.amount,
                balance: guard.record.balance,
            });
        }

        let envelope = mpc_envelope(&session)?;
        let submitted = match self.submit_with_timeout(&envelope, timeout).await {
            Ok(s) => s,
            Err(e) if e.is_retryable() => {
                // Put the session back so the caller can retry the finalize.
                self.sessions.restore(session).await;
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        guard.record.balance = guard
            .record
            .balance
            .checked_sub(request.amount)
            .ok_or(VaultError::AmountOverflow("wallet debit"))?;
        drop(guard);

        self.events.emit(
            EventKind::SigningSessionFinalized,
            &agent_id,
            json!({ "session_id": session_id }),
        );
        self.emit_executed(&agent_id, &request, &submitted);
        Ok(TxResult::ok(submitted.tx_hash, submitted.gas_used))
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    async fn execute_smart_contract(
        &self,
        agent_id: &str,
        aggregate: &Arc<Mutex<WalletAggregate>>,
        request: &TxRequest,
        timeout: Duration,
    ) -> Result<TxResult> {
        let mut guard = aggregate.lock().await;

        if guard.record.status != WalletStatus::Active {
            return self.reject(agent_id, request, TxFailure::WalletNotActive {
                status: guard.record.status,
            });
        }

        // Roll the daily spending window before evaluating the limit.
        let now = Utc::now();
        if now - guard.record.daily_window_start >= ChronoDuration::hours(24) {
            guard.record.daily_window_start = now;
            guard.record.daily_spent = Nano::ZERO;
        }

        let config = match &guard.record.config {
            CustodyConfig::SmartContract(cfg) => cfg.clone(),
            _ => unreachable!("dispatched on mode"),
        };
        let approvals = guard
            .approvals
            .get(&request.request_id)
            .map(|s| s.len() as u8)
            .unwrap_or(0);

        if let Some(failure) =
            smart_contract::check_policy(&config, request, guard.record.daily_spent, approvals)
        {
            return self.reject(agent_id, request, failure);
        }
        if request.amount > guard.record.balance {
            return self.reject(agent_id, request, TxFailure::InsufficientBalance {
                amount: request.amount,
                balance: guard.record.balance,
            });
        }

        let envelope = serde_json::to_vec(&json!({
            "agent_id": agent_id,
            "request": request,
        }))?;
        let submitted = self.submit_with_timeout(&envelope, timeout).await?;

        guard.record.balance = guard
            .record
            .balance
            .checked_sub(request.amount)
            .ok_or(VaultError::AmountOverflow("wallet debit"))?;
        guard.record.daily_spent = guard
            .record
            .daily_spent
            .checked_add(request.amount)
            .ok_or(VaultError::AmountOverflow("daily total"))?;
        // Approvals are consumed by execution.
        guard.approvals.remove(&request.request_id);
        drop(guard);

        self.emit_executed(agent_id, request, &submitted);
        Ok(TxResult::ok(submitted.tx_hash, submitted.gas_used))
    }

    async fn submit_with_timeout(
        &self,
        envelope: &[u8],
        timeout: Duration,
    ) -> Result<Submitted> {
        match tokio::time::timeout(timeout, self.submitter.submit(envelope)).await {
            Ok(result) => result,
            Err(_) => Err(VaultError::Timeout(timeout)),
        }
    }

    fn reject(
        &self,
        agent_id: &str,
        request: &TxRequest,
        failure: TxFailure,
    ) -> Result<TxResult> {
        warn!(agent_id, request_id = %request.request_id, %failure, "transaction rejected");
        self.events.emit(
            EventKind::TransactionRejected,
            agent_id,
            json!({ "request_id": request.request_id, "reason": failure.to_string() }),
        );
        Ok(TxResult::rejected(failure))
    }

    fn emit_executed(&self, agent_id: &str, request: &TxRequest, submitted: &Submitted) {
        info!(
            agent_id,
            request_id = %request.request_id,
            tx_hash = %submitted.tx_hash,
            "transaction executed"
        );
        self.events.emit(
            EventKind::TransactionExecuted,
            agent_id,
            json!({
                "request_id": request.request_id,
                "tx_hash": submitted.tx_hash,
                "amount": request.amount.raw().to_string(),
            }),
        );
    }

    async fn transition(
        &self,
        agent_id: &str,
        from: WalletStatus,
        to: WalletStatus,
    ) -> Result<()> {
        let aggregate = self.aggregate(agent_id).await?;
        let mut guard = aggregate.lock().await;
        if guard.record.status != from {
            return Err(VaultError::InvalidTransition {
                kind: "wallet",
                from: guard.record.status.to_string(),
                to: to.to_string(),
            });
        }
        guard.record.status = to;
        drop(guard);
        self.events.emit(
            EventKind::WalletStatusChanged,
            agent_id,
            json!({ "status": to.to_string() }),
        );
        Ok(())
    }

    async fn aggregate(&self, agent_id: &str) -> Result<Arc<Mutex<WalletAggregate>>> {
        let wallets = self.wallets.lock().await;
        wallets
            .get(agent_id)
            .cloned()
            .ok_or_else(|| VaultError::UnknownAgent(agent_id.to_string()))
    }
}

/// Validate mode-specific configuration at wallet creation.
fn validate_custody_config(config: &CustodyConfig) -> Result<()> {
    match config {
        CustodyConfig::NonCustodial(cfg) => non_custodial::validate_config(cfg),
        CustodyConfig::Mpc(cfg) => {
            if cfg.threshold == 0 || cfg.threshold > cfg.parties {
                return Err(VaultError::InvalidConfig(format!(
                    "mpc threshold {} must satisfy 1 <= threshold <= parties ({})",
                    cfg.threshold, cfg.parties
                )));
            }
            if cfg.party_public_keys.len() != usize::from(cfg.parties) {
                return Err(VaultError::InvalidConfig(format!(
                    "expected {} party public keys, got {}",
                    cfg.parties,
                    cfg.party_public_keys.len()
                )));
            }
            Ok(())
        }
        CustodyConfig::SmartContract(cfg) => {
            if cfg.per_tx_limit.is_negative() || cfg.daily_limit.is_negative() {
                return Err(VaultError::InvalidConfig(
                    "spending limits must be non-negative".into(),
                ));
            }
            if usize::from(cfg.required_cosigners) > cfg.co_signers.len() {
                return Err(VaultError::InvalidConfig(format!(
                    "{} co-signer approvals required but only {} co-signers configured",
                    cfg.required_cosigners,
                    cfg.co_signers.len()
                )));
            }
            Ok(())
        }
    }
}

/// Envelope handed to the chain layer for a finalized MPC session.
fn mpc_envelope(session: &SigningSession) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(&json!({
        "agent_id": session.agent_id,
        "request": session.request,
        "shares": session.shares.values().collect::<Vec<_>>(),
    }))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::MockSubmitter;
    use crate::types::{MpcConfig, NonCustodialConfig, ScWalletConfig, TxType};

    fn manager() -> WalletManager {
        WalletManager::new(Arc::new(MockSubmitter::new()), EventBus::default())
    }

    fn sc_config() -> CustodyConfig {
        CustodyConfig::SmartContract(ScWalletConfig {
            per_tx_limit: Nano::from_tons(10),
            daily_limit: Nano::from_tons(20),
            whitelist: vec![],
            allowed_tx_types: vec![TxType::TonTransfer, TxType::Swap],
            multisig_threshold: Nano::from_tons(100),
            required_cosigners: 0,
            co_signers: vec![],
        })
    }

    fn mpc_config(threshold: u8, parties: u8) -> CustodyConfig {
        CustodyConfig::Mpc(MpcConfig {
            threshold,
            parties,
            party_public_keys: (0..parties).map(|i| format!("0x{i:02x}")).collect(),
        })
    }

    fn request(id: &str, amount: Nano) -> TxRequest {
        TxRequest {
            request_id: id.into(),
            tx_type: TxType::TonTransfer,
            destination: "EQdest".into(),
            amount,
            payload: None,
            signed_payload: None,
        }
    }

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn duplicate_wallet_is_a_hard_error() {
        let m = manager();
        m.create_wallet("a1", "EQa1", "EQowner", sc_config()).await.unwrap();
        let err = m
            .create_wallet("a1", "EQa1", "EQowner", sc_config())
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::DuplicateWallet(_)));
    }

    #[tokio::test]
    async fn mpc_threshold_must_not_exceed_parties() {
        let m = manager();
        let err = m
            .create_wallet("a1", "EQa1", "EQowner", mpc_config(4, 3))
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn smart_contract_execution_debits_and_tracks_daily_total() {
        let m = manager();
        m.create_wallet("a1", "EQa1", "EQowner", sc_config()).await.unwrap();
        m.credit("a1", Nano::from_tons(50)).await.unwrap();

        let result = m
            .execute_transaction("a1", &request("r1", Nano::from_tons(8)), TIMEOUT)
            .await
            .unwrap();
        assert!(result.success);
        assert!(result.tx_hash.is_some());

        let wallet = m.wallet("a1").await.unwrap();
        assert_eq!(wallet.balance, Nano::from_tons(42));
        assert_eq!(wallet.daily_spent, Nano::from_tons(8));
    }

    #[tokio::test]
    async fn policy_violation_is_a_result_not_an_error() {
        let m = manager();
        m.create_wallet("a1", "EQa1", "EQowner", sc_config()).await.unwrap();
        m.credit("a1", Nano::from_tons(50)).await.unwrap();

        let result = m
            .execute_transaction("a1", &request("r1", Nano::from_tons(11)), TIMEOUT)
            .await
            .unwrap();
        assert!(!result.success);
        assert!(matches!(
            result.failure,
            Some(TxFailure::PerTxLimitExceeded { .. })
        ));
        // Nothing was debited.
        assert_eq!(m.wallet("a1").await.unwrap().balance, Nano::from_tons(50));
    }

    #[tokio::test]
    async fn paused_wallet_rejects_and_resumes() {
        let m = manager();
        m.create_wallet("a1", "EQa1", "EQowner", sc_config()).await.unwrap();
        m.credit("a1", Nano::from_tons(50)).await.unwrap();
        m.pause_wallet("a1").await.unwrap();

        let result = m
            .execute_transaction("a1", &request("r1", Nano::from_tons(1)), TIMEOUT)
            .await
            .unwrap();
        assert!(matches!(
            result.failure,
            Some(TxFailure::WalletNotActive { .. })
        ));

        m.resume_wallet("a1").await.unwrap();
        let result = m
            .execute_transaction("a1", &request("r2", Nano::from_tons(1)), TIMEOUT)
            .await
            .unwrap();
        assert!(result.success);
    }

    #[tokio::test]
    async fn stopped_wallet_is_terminal() {
        let m = manager();
        m.create_wallet("a1", "EQa1", "EQowner", sc_config()).await.unwrap();
        m.stop_wallet("a1").await.unwrap();
        assert!(m.resume_wallet("a1").await.is_err());
        assert!(m.stop_wallet("a1").await.is_err());
    }

    #[tokio::test]
    async fn mpc_session_flow_end_to_end() {
        let m = manager();
        m.create_wallet("a1", "EQa1", "EQowner", mpc_config(2, 3)).await.unwrap();
        m.credit("a1", Nano::from_tons(10)).await.unwrap();

        let req = request("r1", Nano::from_tons(3));
        let sid = m.initiate_signing_session("a1", req.clone()).await.unwrap();

        assert!(!m.submit_share(&sid, 0, "share-0").await.unwrap());
        assert!(m.submit_share(&sid, 1, "share-1").await.unwrap());

        let result = m.execute_transaction("a1", &req, TIMEOUT).await.unwrap();
        assert!(result.success);
        assert_eq!(m.wallet("a1").await.unwrap().balance, Nano::from_tons(7));

        // Session was consumed; a second finalize attempt fails hard.
        let err = m.finalize_and_submit(&sid, TIMEOUT).await.unwrap_err();
        assert!(matches!(err, VaultError::UnknownSession(_)));
    }

    #[tokio::test]
    async fn mpc_execute_without_threshold_fails() {
        let m = manager();
        m.create_wallet("a1", "EQa1", "EQowner", mpc_config(2, 3)).await.unwrap();
        m.credit("a1", Nano::from_tons(10)).await.unwrap();

        let req = request("r1", Nano::from_tons(3));
        let sid = m.initiate_signing_session("a1", req.clone()).await.unwrap();
        m.submit_share(&sid, 0, "share-0").await.unwrap();

        let err = m.execute_transaction("a1", &req, TIMEOUT).await.unwrap_err();
        assert!(matches!(err, VaultError::ThresholdNotReached(_)));

        // Abandoning the session leaves the wallet active.
        m.cancel_session(&sid).await.unwrap();
        assert_eq!(m.wallet("a1").await.unwrap().status, WalletStatus::Active);
    }

    #[tokio::test]
    async fn non_custodial_relays_presigned_payload() {
        let m = manager();
        m.create_wallet(
            "a1",
            "EQa1",
            "EQowner",
            CustodyConfig::NonCustodial(NonCustodialConfig {
                owner_public_key: "0xabcd".into(),
                wallet_format: "v4r2".into(),
            }),
        )
        .await
        .unwrap();
        m.credit("a1", Nano::from_tons(10)).await.unwrap();

        let mut req = request("r1", Nano::from_tons(2));
        let missing = m.sign_and_submit("a1", &req, TIMEOUT).await.unwrap();
        assert_eq!(missing.failure, Some(TxFailure::InvalidSignedPayload));

        req.signed_payload = Some("0xdeadbeef".into());
        let result = m.sign_and_submit("a1", &req, TIMEOUT).await.unwrap();
        assert!(result.success);
        assert_eq!(m.wallet("a1").await.unwrap().balance, Nano::from_tons(8));
    }

    #[tokio::test]
    async fn submission_timeout_is_retryable_and_leaves_state_alone() {
        let m = WalletManager::new(
            Arc::new(MockSubmitter::with_latency(Duration::from_secs(60))),
            EventBus::default(),
        );
        m.create_wallet("a1", "EQa1", "EQowner", sc_config()).await.unwrap();
        m.credit("a1", Nano::from_tons(50)).await.unwrap();

        let err = m
            .execute_transaction(
                "a1",
                &request("r1", Nano::from_tons(1)),
                Duration::from_millis(10),
            )
            .await
            .unwrap_err();
        assert!(err.is_retryable());

        let wallet = m.wallet("a1").await.unwrap();
        assert_eq!(wallet.balance, Nano::from_tons(50));
        assert_eq!(wallet.daily_spent, Nano::ZERO);
    }

    #[tokio::test]
    async fn transient_submit_failure_preserves_the_session() {
        let m = WalletManager::new(Arc::new(MockSubmitter::failing()), EventBus::default());
        m.create_wallet("a1", "EQa1", "EQowner", mpc_config(1, 2)).await.unwrap();
        m.credit("a1", Nano::from_tons(10)).await.unwrap();

        let req = request("r1", Nano::from_tons(3));
        let sid = m.initiate_signing_session("a1", req.clone()).await.unwrap();
        m.submit_share(&sid, 0, "share-0").await.unwrap();

        let err = m.finalize_and_submit(&sid, TIMEOUT).await.unwrap_err();
        assert!(err.is_retryable());

        // The session was put back, so a retry finds it; nothing was debited.
        assert_eq!(m.sessions().len().await, 1);
        assert_eq!(m.wallet("a1").await.unwrap().balance, Nano::from_tons(10));
    }

    #[tokio::test]
    async fn concurrent_spends_cannot_both_pass_one_slot_limit() {
        // Daily limit 20, two concurrent 15-TON spends: each passes the
        // per-tx check alone, but only one fits in the daily window.
        let m = manager();
        let config = CustodyConfig::SmartContract(ScWalletConfig {
            per_tx_limit: Nano::from_tons(15),
            daily_limit: Nano::from_tons(20),
            whitelist: vec![],
            allowed_tx_types: vec![TxType::TonTransfer],
            multisig_threshold: Nano::from_tons(100),
            required_cosigners: 0,
            co_signers: vec![],
        });
        m.create_wallet("a1", "EQa1", "EQowner", config).await.unwrap();
        m.credit("a1", Nano::from_tons(100)).await.unwrap();

        let m1 = m.clone();
        let m2 = m.clone();
        let h1 = tokio::spawn(async move {
            m1.execute_transaction("a1", &request("r1", Nano::from_tons(15)), TIMEOUT)
                .await
        });
        let h2 = tokio::spawn(async move {
            m2.execute_transaction("a1", &request("r2", Nano::from_tons(15)), TIMEOUT)
                .await
        });

        let r1 = h1.await.unwrap().unwrap();
        let r2 = h2.await.unwrap().unwrap();
        let successes = [&r1, &r2].iter().filter(|r| r.success).count();
        assert_eq!(successes, 1);
        assert!(m.wallet("a1").await.unwrap().daily_spent <= Nano::from_tons(20));
    }

    #[tokio::test]
    async fn cosigner_approvals_gate_large_transactions() {
        let m = manager();
        let config = CustodyConfig::SmartContract(ScWalletConfig {
            per_tx_limit: Nano::from_tons(50),
            daily_limit: Nano::from_tons(100),
            whitelist: vec![],
            allowed_tx_types: vec![TxType::TonTransfer],
            multisig_threshold: Nano::from_tons(10),
            required_cosigners: 2,
            co_signers: vec!["EQcs1".into(), "EQcs2".into()],
        });
        m.create_wallet("a1", "EQa1", "EQowner", config).await.unwrap();
        m.credit("a1", Nano::from_tons(100)).await.unwrap();

        let req = request("big", Nano::from_tons(20));
        let blocked = m.execute_transaction("a1", &req, TIMEOUT).await.unwrap();
        assert!(matches!(
            blocked.failure,
            Some(TxFailure::CosignersMissing { have: 0, need: 2 })
        ));

        m.approve_pending_tx("a1", "big", "EQcs1").await.unwrap();
        // Same co-signer twice does not double-count.
        assert_eq!(m.approve_pending_tx("a1", "big", "EQcs1").await.unwrap(), 1);
        m.approve_pending_tx("a1", "big", "EQcs2").await.unwrap();

        let result = m.execute_transaction("a1", &req, TIMEOUT).await.unwrap();
        assert!(result.success);

        // Outsiders cannot approve.
        let err = m.approve_pending_tx("a1", "r9", "EQmallory").await.unwrap_err();
        assert!(matches!(err, VaultError::PermissionDenied { .. }));
    }
}
