//! Structured platform events for external observability.
//!
//! Every state transition in the engine can be emitted as a
//! [`PlatformEvent`]. Delivery is fire-and-forget over a broadcast channel:
//! a full or closed channel never rolls back the state change that produced
//! the event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;
use tracing::debug;

/// Event kinds mirror the engine's observable state transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    WalletCreated,
    WalletStatusChanged,
    TransactionExecuted,
    TransactionRejected,
    SigningSessionOpened,
    SigningSessionFinalized,
    SigningSessionCancelled,
    StrategyCreated,
    StrategyStarted,
    StrategyExecuted,
    StrategyStopped,
    AgentDeployed,
    AgentRegistered,
    RegistryUpdated,
    EmergencyTriggered,
    EmergencyResolved,
    UpgradeProposed,
    UpgradeExecuted,
    FeeRecorded,
    RevenueDistributed,
    PayoutProcessed,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WalletCreated => "wallet_created",
            Self::WalletStatusChanged => "wallet_status_changed",
            Self::TransactionExecuted => "transaction_executed",
            Self::TransactionRejected => "transaction_rejected",
            Self::SigningSessionOpened => "signing_session_opened",
            Self::SigningSessionFinalized => "signing_session_finalized",
            Self::SigningSessionCancelled => "signing_session_cancelled",
            Self::StrategyCreated => "strategy_created",
            Self::StrategyStarted => "strategy_started",
            Self::StrategyExecuted => "strategy_executed",
            Self::StrategyStopped => "strategy_stopped",
            Self::AgentDeployed => "agent_deployed",
            Self::AgentRegistered => "agent_registered",
            Self::RegistryUpdated => "registry_updated",
            Self::EmergencyTriggered => "emergency_triggered",
            Self::EmergencyResolved => "emergency_resolved",
            Self::UpgradeProposed => "upgrade_proposed",
            Self::UpgradeExecuted => "upgrade_executed",
            Self::FeeRecorded => "fee_recorded",
            Self::RevenueDistributed => "revenue_distributed",
            Self::PayoutProcessed => "payout_processed",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformEvent {
    pub kind: EventKind,
    pub agent_id: String,
    pub at: DateTime<Utc>,
    #[serde(default)]
    pub detail: serde_json::Value,
}

/// Broadcast fan-out of platform events. Cloneable handle.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PlatformEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlatformEvent> {
        self.tx.subscribe()
    }

    /// Emit an event. Send errors (no subscribers) are ignored — event
    /// delivery must never affect the underlying state change.
    pub fn emit(&self, kind: EventKind, agent_id: &str, detail: serde_json::Value) {
        let event = PlatformEvent {
            kind,
            agent_id: agent_id.to_string(),
            at: Utc::now(),
            detail,
        };
        debug!(kind = %event.kind, agent_id = %event.agent_id, "platform event");
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn emit_without_subscribers_is_silent() {
        let bus = EventBus::default();
        bus.emit(EventKind::WalletCreated, "agent-1", serde_json::json!({}));
    }

    #[tokio::test]
    async fn subscribers_receive_events_in_order() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        bus.emit(EventKind::StrategyStarted, "agent-1", serde_json::json!({}));
        bus.emit(EventKind::StrategyStopped, "agent-1", serde_json::json!({}));

        assert_eq!(rx.recv().await.unwrap().kind, EventKind::StrategyStarted);
        assert_eq!(rx.recv().await.unwrap().kind, EventKind::StrategyStopped);
    }
}
