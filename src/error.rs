//! Error taxonomy for the custody and governance engine.
//!
//! Three categories, per the propagation policy:
//! - policy violations (limit exceeded, not whitelisted, …) are *values*
//!   carried inside `TxResult` — see [`crate::types::TxFailure`];
//! - caller-contract violations (unknown IDs, duplicate registration, bad
//!   configuration) are hard errors raised here;
//! - transient infrastructure failures (timeouts, chain submission) are
//!   marked retryable so callers can re-issue with idempotent request IDs.

use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, VaultError>;

#[derive(Debug, Error)]
pub enum VaultError {
    // -- unknown aggregates -------------------------------------------------
    #[error("unknown agent: {0}")]
    UnknownAgent(String),

    #[error("unknown strategy: {0}")]
    UnknownStrategy(String),

    #[error("unknown upgrade proposal: {0}")]
    UnknownProposal(String),

    #[error("unknown signing session: {0}")]
    UnknownSession(String),

    #[error("unknown fee record: {0}")]
    UnknownFee(String),

    // -- duplicates ---------------------------------------------------------
    #[error("agent {0} already has a wallet")]
    DuplicateWallet(String),

    #[error("agent {0} is already registered")]
    DuplicateAgent(String),

    // -- configuration / contract violations --------------------------------
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("risk score {0} is out of range 0..=1000")]
    RiskScoreOutOfRange(u32),

    #[error("invalid {kind} transition: {from} -> {to}")]
    InvalidTransition {
        kind: &'static str,
        from: String,
        to: String,
    },

    #[error("fee amount must be positive")]
    NonPositiveFee,

    #[error("amount overflow during {0}")]
    AmountOverflow(&'static str),

    // -- factory & governance -----------------------------------------------
    #[error("agent {0} is not registered with this factory")]
    AgentNotRegisteredWithFactory(String),

    #[error("owner {owner} already has {count} agents (max {max})")]
    MaxAgentsReached {
        owner: String,
        count: u32,
        max: u32,
    },

    /// Distinct category so callers can tell "temporarily blocked by
    /// governance" from a permanently invalid request.
    #[error("factory is paused: {0}")]
    FactoryPaused(String),

    #[error("factory is not paused")]
    NotPaused,

    #[error("{address} lacks permission {permission}")]
    PermissionDenied { address: String, permission: String },

    #[error("upgrade proposal {0} is already executed")]
    ProposalAlreadyExecuted(String),

    // -- MPC sessions -------------------------------------------------------
    #[error("signing session {0} is already finalized")]
    SessionFinalized(String),

    #[error("signing session {0} has not reached its threshold")]
    ThresholdNotReached(String),

    #[error("party index {index} is out of range for {parties} parties")]
    PartyIndexOutOfRange { index: u8, parties: u8 },

    // -- transient infrastructure -------------------------------------------
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("chain submission failed: {0}")]
    ChainSubmission(String),

    // -- persistence --------------------------------------------------------
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl VaultError {
    /// Whether the caller may retry the same request (with the same
    /// idempotent request ID) and reasonably expect success.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::ChainSubmission(_))
    }

    /// Whether the failure was produced by governance pause rather than by
    /// the request itself.
    pub fn is_governance_block(&self) -> bool {
        matches!(self, Self::FactoryPaused(_))
    }
}
