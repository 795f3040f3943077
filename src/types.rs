//! Shared types used across the agentvault engine.

use crate::amount::Nano;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

// ---------------------------------------------------------------------------
// Custody
// ---------------------------------------------------------------------------

/// Who can authorize spending from an agent's wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustodyMode {
    /// Owner device signs; the platform only validates and relays.
    NonCustodial,
    /// Threshold-of-parties signing sessions.
    Mpc,
    /// Policy-enforced smart-contract wallet.
    SmartContract,
}

impl fmt::Display for CustodyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NonCustodial => write!(f, "non_custodial"),
            Self::Mpc => write!(f, "mpc"),
            Self::SmartContract => write!(f, "smart_contract"),
        }
    }
}

/// Wallet lifecycle status. `Stopped` is terminal; `Active` and `Paused`
/// may flip back and forth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletStatus {
    Active,
    Paused,
    Stopped,
}

impl fmt::Display for WalletStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Paused => write!(f, "paused"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Configuration for a non-custodial wallet. The platform never holds a key;
/// it checks these fields against the pre-signed payload and relays.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NonCustodialConfig {
    /// Owner device public key, hex-encoded.
    pub owner_public_key: String,
    /// Wallet contract format tag (e.g. "v4r2", "v5r1").
    pub wallet_format: String,
}

/// Configuration for an MPC threshold-signed wallet.
/// Invariant: `1 <= threshold <= parties`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MpcConfig {
    pub threshold: u8,
    pub parties: u8,
    /// One hex-encoded public key per party, indexed by party number.
    pub party_public_keys: Vec<String>,
}

/// Spending policy for a smart-contract wallet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScWalletConfig {
    pub per_tx_limit: Nano,
    pub daily_limit: Nano,
    /// Allowed destinations. Empty means unrestricted.
    pub whitelist: Vec<String>,
    pub allowed_tx_types: Vec<TxType>,
    /// Amounts at or above this require co-signer approval.
    pub multisig_threshold: Nano,
    /// How many co-signer approvals an above-threshold transaction needs.
    pub required_cosigners: u8,
    pub co_signers: Vec<String>,
}

/// Mode-specific custody configuration, dispatched on the tagged mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CustodyConfig {
    NonCustodial(NonCustodialConfig),
    Mpc(MpcConfig),
    SmartContract(ScWalletConfig),
}

impl CustodyConfig {
    pub fn mode(&self) -> CustodyMode {
        match self {
            Self::NonCustodial(_) => CustodyMode::NonCustodial,
            Self::Mpc(_) => CustodyMode::Mpc,
            Self::SmartContract(_) => CustodyMode::SmartContract,
        }
    }
}

/// One wallet per agent. Owned by the custody component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletRecord {
    pub agent_id: String,
    pub contract_address: String,
    pub owner_address: String,
    pub status: WalletStatus,
    pub balance: Nano,
    pub config: CustodyConfig,
    /// Running total spent in the current day window (smart-contract mode).
    pub daily_spent: Nano,
    /// Start of the current day window.
    pub daily_window_start: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Transactions
// ---------------------------------------------------------------------------

/// Typed on-chain operations. Every variant goes through the same
/// authorization path — there is exactly one check sequence, not one per type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxType {
    TonTransfer,
    JettonTransfer,
    Swap,
    AddLiquidity,
    RemoveLiquidity,
    Stake,
    Unstake,
    NftTransfer,
    DaoVote,
}

impl fmt::Display for TxType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TonTransfer => write!(f, "ton_transfer"),
            Self::JettonTransfer => write!(f, "jetton_transfer"),
            Self::Swap => write!(f, "swap"),
            Self::AddLiquidity => write!(f, "add_liquidity"),
            Self::RemoveLiquidity => write!(f, "remove_liquidity"),
            Self::Stake => write!(f, "stake"),
            Self::Unstake => write!(f, "unstake"),
            Self::NftTransfer => write!(f, "nft_transfer"),
            Self::DaoVote => write!(f, "dao_vote"),
        }
    }
}

/// A fully-formed transaction request handed in by strategy logic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxRequest {
    /// Caller-supplied idempotency key.
    pub request_id: String,
    pub tx_type: TxType,
    pub destination: String,
    pub amount: Nano,
    /// Opaque operation payload forwarded to the chain layer.
    #[serde(default)]
    pub payload: Option<serde_json::Value>,
    /// Pre-signed envelope, required for non-custodial wallets.
    #[serde(default)]
    pub signed_payload: Option<String>,
}

/// Expected, typed policy violations. Returned inside [`TxResult`], never
/// raised as errors — callers decide retry policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum TxFailure {
    WalletNotActive { status: WalletStatus },
    TxTypeNotAllowed { tx_type: TxType },
    PerTxLimitExceeded { amount: Nano, limit: Nano },
    DailyLimitExceeded { would_total: Nano, limit: Nano },
    DestinationNotWhitelisted { destination: String },
    CosignersMissing { have: u8, need: u8 },
    InsufficientBalance { amount: Nano, balance: Nano },
    /// Non-custodial request arrived without a pre-signed envelope, or the
    /// envelope did not match the registered owner key.
    InvalidSignedPayload,
}

impl fmt::Display for TxFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WalletNotActive { status } => write!(f, "wallet not active ({status})"),
            Self::TxTypeNotAllowed { tx_type } => {
                write!(f, "transaction type {tx_type} not allowed")
            }
            Self::PerTxLimitExceeded { amount, limit } => {
                write!(f, "amount {amount} exceeds per-tx limit {limit}")
            }
            Self::DailyLimitExceeded { would_total, limit } => {
                write!(f, "daily total {would_total} would exceed limit {limit}")
            }
            Self::DestinationNotWhitelisted { destination } => {
                write!(f, "destination {destination} not whitelisted")
            }
            Self::CosignersMissing { have, need } => {
                write!(f, "{have}/{need} co-signer approvals present")
            }
            Self::InsufficientBalance { amount, balance } => {
                write!(f, "amount {amount} exceeds balance {balance}")
            }
            Self::InvalidSignedPayload => write!(f, "signed payload missing or invalid"),
        }
    }
}

/// Outcome of an execution attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxResult {
    pub success: bool,
    pub tx_hash: Option<String>,
    pub gas_used: Option<u64>,
    pub failure: Option<TxFailure>,
}

impl TxResult {
    pub fn ok(tx_hash: String, gas_used: u64) -> Self {
        Self {
            success: true,
            tx_hash: Some(tx_hash),
            gas_used: Some(gas_used),
            failure: None,
        }
    }

    pub fn rejected(failure: TxFailure) -> Self {
        Self {
            success: false,
            tx_hash: None,
            gas_used: None,
            failure: Some(failure),
        }
    }
}

// ---------------------------------------------------------------------------
// Deployment
// ---------------------------------------------------------------------------

/// Record of one deployed agent. Immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDeployment {
    pub agent_id: String,
    pub owner_id: String,
    pub owner_address: String,
    pub contract_address: String,
    pub custody_mode: CustodyMode,
    pub deployed_at: DateTime<Utc>,
    pub version: u32,
}

/// Aggregate counters reported by the factory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FactoryStats {
    pub total_agents: u64,
    pub total_strategies: u64,
    pub total_fees_collected: Nano,
}

// ---------------------------------------------------------------------------
// Strategy
// ---------------------------------------------------------------------------

/// Strategy lifecycle. Forward-only: `Pending -> Running -> Stopped`;
/// a stopped strategy can never restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyStatus {
    Pending,
    Running,
    Stopped,
}

impl fmt::Display for StrategyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// Conditions that stop a strategy automatically after an execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StopConditions {
    #[serde(default)]
    pub max_executions: Option<u64>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Accumulated execution outcomes for one strategy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StrategyPerformance {
    pub successful_executions: u64,
    pub failed_executions: u64,
    pub total_pnl: Nano,
    /// Percentage of successful executions, floored.
    pub win_rate: u32,
}

impl StrategyPerformance {
    pub fn total_executions(&self) -> u64 {
        self.successful_executions + self.failed_executions
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyRecord {
    pub strategy_id: String,
    pub agent_id: String,
    pub strategy_type: String,
    pub status: StrategyStatus,
    pub risk_level: RiskLevel,
    pub max_gas_budget: Nano,
    pub stop_conditions: StopConditions,
    pub performance: StrategyPerformance,
    /// Optional cron expression, validated at creation time.
    #[serde(default)]
    pub schedule: Option<String>,
    #[serde(default)]
    pub stop_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// One append-only audit trail entry. Every mutation to status, risk score
/// or performance appends exactly one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub actor: String,
    pub action: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Active,
    Paused,
    Retired,
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Paused => write!(f, "paused"),
            Self::Retired => write!(f, "retired"),
        }
    }
}

/// Performance snapshot kept by the registry for ranking queries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerformanceSnapshot {
    pub total_trades: u64,
    pub total_profit: Nano,
    pub win_rate: u32,
}

/// Directory entry for one agent; the registry is the single owner of
/// cross-agent indexes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub agent_id: String,
    pub owner_address: String,
    pub contract_address: String,
    /// Hash of the strategy metadata the agent was registered with.
    pub strategy_hash: String,
    pub status: AgentStatus,
    /// Bounded to 0..=1000.
    pub risk_score: u32,
    pub performance: PerformanceSnapshot,
    #[serde(default)]
    pub telegram_user_id: Option<i64>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub audit_trail: Vec<AuditEntry>,
    pub registered_at: DateTime<Utc>,
}

/// A raw on-chain event recorded for later reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractEvent {
    pub contract_address: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Fees & revenue
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeKind {
    Performance,
    Protocol,
    Marketplace,
    Referral,
}

impl fmt::Display for FeeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Performance => write!(f, "performance"),
            Self::Protocol => write!(f, "protocol"),
            Self::Marketplace => write!(f, "marketplace"),
            Self::Referral => write!(f, "referral"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeRecord {
    pub fee_id: String,
    pub kind: FeeKind,
    pub agent_id: String,
    /// Always positive; `record_fee` rejects anything else.
    pub amount: Nano,
    pub destination: String,
    pub collected: bool,
    #[serde(default)]
    pub tx_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// How one profit event was divided. Parts always sum exactly to `total_fee`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevenueSplit {
    pub agent_id: String,
    pub total_fee: Nano,
    pub protocol_share: Nano,
    pub treasury_share: Nano,
    pub creator_share: Nano,
    pub referral_share: Nano,
    #[serde(default)]
    pub referrer: Option<String>,
}

/// Accumulated earnings for one strategy creator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatorBalance {
    pub creator_address: String,
    pub total_earned: Nano,
    pub pending_payout: Nano,
    pub total_paid_out: Nano,
    #[serde(default)]
    pub last_payout_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Governance
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    Pending,
    Executed,
}

/// Multi-party upgrade proposal. Executes automatically the moment the
/// approval set reaches the required size.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpgradeProposal {
    pub proposal_id: String,
    pub target_contract: String,
    pub new_code_hash: String,
    pub proposer: String,
    pub approvals_required: u32,
    /// Set semantics make approval idempotent per address.
    pub approvals: BTreeSet<String>,
    pub status: ProposalStatus,
    pub created_at: DateTime<Utc>,
}

/// Global pause switch, one per factory instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmergencyState {
    pub is_paused: bool,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub triggered_by: Option<String>,
}

/// A granted governance role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleGrant {
    pub role: String,
    pub address: String,
    pub permissions: Vec<String>,
    pub granted_by: String,
    pub granted_at: DateTime<Utc>,
}
