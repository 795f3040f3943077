//! Strategy execution lifecycle.
//!
//! A strategy moves `pending -> running -> stopped` and never backwards:
//! stopping is terminal, whether manual or triggered by a stop condition.
//! Execution records one performance sample per call and then evaluates the
//! auto-stop conditions as a side effect of the same call — auto-stop is an
//! expected lifecycle event, not an error.

use crate::amount::Nano;
use crate::error::{Result, VaultError};
use crate::events::{EventBus, EventKind};
use crate::types::{
    RiskLevel, StopConditions, StrategyPerformance, StrategyRecord, StrategyStatus,
};
use chrono::Utc;
use serde_json::json;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

/// Parameters for creating a strategy.
#[derive(Debug, Clone)]
pub struct CreateStrategyParams {
    pub agent_id: String,
    pub strategy_type: String,
    pub risk_level: RiskLevel,
    pub max_gas_budget: Nano,
    pub stop_conditions: StopConditions,
    pub schedule: Option<String>,
}

/// One execution outcome reported by the strategy runner.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionSample {
    pub success: bool,
    pub pnl: Nano,
}

/// Result of `execute_strategy`: the updated record plus whether this
/// execution tripped a stop condition.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub record: StrategyRecord,
    pub auto_stopped: bool,
}

/// Lifecycle engine. Cloneable handle; per-strategy state is serialized
/// behind its own lock.
#[derive(Clone)]
pub struct StrategyEngine {
    strategies: Arc<Mutex<HashMap<String, Arc<Mutex<StrategyRecord>>>>>,
    events: EventBus,
}

impl StrategyEngine {
    pub fn new(events: EventBus) -> Self {
        Self {
            strategies: Arc::new(Mutex::new(HashMap::new())),
            events,
        }
    }

    /// Create a strategy in `pending`. The schedule, when present, must be a
    /// valid cron expression.
    pub async fn create_strategy(&self, params: CreateStrategyParams) -> Result<StrategyRecord> {
        if params.max_gas_budget.is_negative() {
            return Err(VaultError::InvalidConfig(
                "max gas budget must be non-negative".into(),
            ));
        }
        if let Some(schedule) = &params.schedule {
            cron::Schedule::from_str(schedule).map_err(|e| {
                VaultError::InvalidConfig(format!("invalid schedule '{schedule}': {e}"))
            })?;
        }

        let record = StrategyRecord {
            strategy_id: ulid::Ulid::new().to_string(),
            agent_id: params.agent_id.clone(),
            strategy_type: params.strategy_type,
            status: StrategyStatus::Pending,
            risk_level: params.risk_level,
            max_gas_budget: params.max_gas_budget,
            stop_conditions: params.stop_conditions,
            performance: StrategyPerformance::default(),
            schedule: params.schedule,
            stop_reason: None,
            created_at: Utc::now(),
        };

        let mut strategies = self.strategies.lock().await;
        strategies.insert(
            record.strategy_id.clone(),
            Arc::new(Mutex::new(record.clone())),
        );
        drop(strategies);

        info!(strategy_id = %record.strategy_id, agent_id = %params.agent_id, "strategy created");
        self.events.emit(
            EventKind::StrategyCreated,
            &params.agent_id,
            json!({ "strategy_id": record.strategy_id }),
        );
        Ok(record)
    }

    /// `pending -> running`. Rejected if already running or stopped.
    pub async fn start_strategy(&self, strategy_id: &str) -> Result<StrategyRecord> {
        let handle = self.handle(strategy_id).await?;
        let mut record = handle.lock().await;
        if record.status != StrategyStatus::Pending {
            return Err(VaultError::InvalidTransition {
                kind: "strategy",
                from: record.status.to_string(),
                to: "running".into(),
            });
        }
        record.status = StrategyStatus::Running;
        let snapshot = record.clone();
        drop(record);

        self.events.emit(
            EventKind::StrategyStarted,
            &snapshot.agent_id,
            json!({ "strategy_id": strategy_id }),
        );
        Ok(snapshot)
    }

    /// Record one execution sample, then evaluate stop conditions. Rejected
    /// if the strategy is not running.
    pub async fn execute_strategy(
        &self,
        strategy_id: &str,
        sample: ExecutionSample,
    ) -> Result<ExecutionOutcome> {
        let handle = self.handle(strategy_id).await?;
        let mut record = handle.lock().await;
        if record.status != StrategyStatus::Running {
            return Err(VaultError::InvalidTransition {
                kind: "strategy",
                from: record.status.to_string(),
                to: "running".into(),
            });
        }

        let perf = &mut record.performance;
        if sample.success {
            perf.successful_executions += 1;
        } else {
            perf.failed_executions += 1;
        }
        perf.total_pnl = perf
            .total_pnl
            .checked_add(sample.pnl)
            .ok_or(VaultError::AmountOverflow("strategy pnl"))?;
        let total = perf.total_executions();
        perf.win_rate = ((perf.successful_executions * 100) / total) as u32;

        // Auto-stop is applied inside the same call; it is not an error.
        let auto_stopped = match stop_reason(&record) {
            Some(reason) => {
                record.status = StrategyStatus::Stopped;
                record.stop_reason = Some(reason.clone());
                info!(strategy_id, reason, "strategy auto-stopped");
                true
            }
            None => false,
        };

        let snapshot = record.clone();
        drop(record);

        self.events.emit(
            EventKind::StrategyExecuted,
            &snapshot.agent_id,
            json!({
                "strategy_id": strategy_id,
                "success": sample.success,
                "pnl": sample.pnl.raw().to_string(),
            }),
        );
        if auto_stopped {
            self.events.emit(
                EventKind::StrategyStopped,
                &snapshot.agent_id,
                json!({ "strategy_id": strategy_id, "reason": snapshot.stop_reason }),
            );
        }

        Ok(ExecutionOutcome {
            record: snapshot,
            auto_stopped,
        })
    }

    /// Manual termination: `running -> stopped`, always terminal.
    pub async fn stop_strategy(
        &self,
        strategy_id: &str,
        reason: Option<String>,
    ) -> Result<StrategyRecord> {
        let handle = self.handle(strategy_id).await?;
        let mut record = handle.lock().await;
        if record.status != StrategyStatus::Running {
            return Err(VaultError::InvalidTransition {
                kind: "strategy",
                from: record.status.to_string(),
                to: "stopped".into(),
            });
        }
        record.status = StrategyStatus::Stopped;
        record.stop_reason = reason.or_else(|| Some("manual stop".into()));
        let snapshot = record.clone();
        drop(record);

        self.events.emit(
            EventKind::StrategyStopped,
            &snapshot.agent_id,
            json!({ "strategy_id": strategy_id, "reason": snapshot.stop_reason }),
        );
        Ok(snapshot)
    }

    pub async fn strategy(&self, strategy_id: &str) -> Result<StrategyRecord> {
        let handle = self.handle(strategy_id).await?;
        let record = handle.lock().await;
        Ok(record.clone())
    }

    /// All strategies for one agent, unordered.
    pub async fn strategies_for_agent(&self, agent_id: &str) -> Vec<StrategyRecord> {
        let strategies = self.strategies.lock().await;
        let handles: Vec<_> = strategies.values().cloned().collect();
        drop(strategies);

        let mut out = Vec::new();
        for handle in handles {
            let record = handle.lock().await;
            if record.agent_id == agent_id {
                out.push(record.clone());
            }
        }
        out
    }

    async fn handle(&self, strategy_id: &str) -> Result<Arc<Mutex<StrategyRecord>>> {
        let strategies = self.strategies.lock().await;
        strategies
            .get(strategy_id)
            .cloned()
            .ok_or_else(|| VaultError::UnknownStrategy(strategy_id.to_string()))
    }
}

/// Evaluate stop conditions after a sample has been recorded.
fn stop_reason(record: &StrategyRecord) -> Option<String> {
    let conditions = &record.stop_conditions;
    if let Some(max) = conditions.max_executions {
        if record.performance.total_executions() >= max {
            return Some(format!("max executions reached ({max})"));
        }
    }
    if let Some(expires_at) = conditions.expires_at {
        if Utc::now() >= expires_at {
            return Some("expired".into());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn params() -> CreateStrategyParams {
        CreateStrategyParams {
            agent_id: "agent-1".into(),
            strategy_type: "dca".into(),
            risk_level: RiskLevel::Low,
            max_gas_budget: Nano::from_tons(1),
            stop_conditions: StopConditions::default(),
            schedule: None,
        }
    }

    fn win(pnl: i64) -> ExecutionSample {
        ExecutionSample {
            success: true,
            pnl: Nano::from_tons(pnl),
        }
    }

    fn loss(pnl: i64) -> ExecutionSample {
        ExecutionSample {
            success: false,
            pnl: Nano::from_tons(pnl),
        }
    }

    #[tokio::test]
    async fn lifecycle_is_a_total_order() {
        let engine = StrategyEngine::new(EventBus::default());
        let s = engine.create_strategy(params()).await.unwrap();
        assert_eq!(s.status, StrategyStatus::Pending);

        // Cannot execute or stop while pending.
        assert!(engine.execute_strategy(&s.strategy_id, win(1)).await.is_err());
        assert!(engine.stop_strategy(&s.strategy_id, None).await.is_err());

        engine.start_strategy(&s.strategy_id).await.unwrap();
        // running -> running is rejected.
        assert!(engine.start_strategy(&s.strategy_id).await.is_err());

        engine.stop_strategy(&s.strategy_id, None).await.unwrap();
        // Stopped is permanent: no resume, no re-stop, no execution.
        assert!(engine.start_strategy(&s.strategy_id).await.is_err());
        assert!(engine.stop_strategy(&s.strategy_id, None).await.is_err());
        assert!(engine.execute_strategy(&s.strategy_id, win(1)).await.is_err());
    }

    #[tokio::test]
    async fn performance_aggregates_win_rate_and_pnl() {
        let engine = StrategyEngine::new(EventBus::default());
        let s = engine.create_strategy(params()).await.unwrap();
        engine.start_strategy(&s.strategy_id).await.unwrap();

        engine.execute_strategy(&s.strategy_id, win(5)).await.unwrap();
        engine.execute_strategy(&s.strategy_id, loss(-2)).await.unwrap();
        let outcome = engine.execute_strategy(&s.strategy_id, win(3)).await.unwrap();

        let perf = &outcome.record.performance;
        assert_eq!(perf.successful_executions, 2);
        assert_eq!(perf.failed_executions, 1);
        assert_eq!(perf.total_pnl, Nano::from_tons(6));
        // 2/3 floored.
        assert_eq!(perf.win_rate, 66);
    }

    #[tokio::test]
    async fn auto_stop_on_max_executions() {
        let engine = StrategyEngine::new(EventBus::default());
        let mut p = params();
        p.stop_conditions.max_executions = Some(2);
        let s = engine.create_strategy(p).await.unwrap();
        engine.start_strategy(&s.strategy_id).await.unwrap();

        let first = engine.execute_strategy(&s.strategy_id, win(1)).await.unwrap();
        assert!(!first.auto_stopped);

        let second = engine.execute_strategy(&s.strategy_id, win(1)).await.unwrap();
        assert!(second.auto_stopped);
        assert_eq!(second.record.status, StrategyStatus::Stopped);

        // Permanent even though the stop came from an auto condition.
        assert!(engine.start_strategy(&s.strategy_id).await.is_err());
    }

    #[tokio::test]
    async fn auto_stop_on_expiry() {
        let engine = StrategyEngine::new(EventBus::default());
        let mut p = params();
        p.stop_conditions.expires_at = Some(Utc::now() - ChronoDuration::seconds(1));
        let s = engine.create_strategy(p).await.unwrap();
        engine.start_strategy(&s.strategy_id).await.unwrap();

        let outcome = engine.execute_strategy(&s.strategy_id, win(1)).await.unwrap();
        assert!(outcome.auto_stopped);
        assert_eq!(outcome.record.stop_reason.as_deref(), Some("expired"));
    }

    #[tokio::test]
    async fn invalid_schedule_is_rejected_at_creation() {
        let engine = StrategyEngine::new(EventBus::default());
        let mut p = params();
        p.schedule = Some("not a cron line".into());
        assert!(matches!(
            engine.create_strategy(p).await.unwrap_err(),
            VaultError::InvalidConfig(_)
        ));

        let mut p = params();
        p.schedule = Some("0 0 * * * *".into());
        assert!(engine.create_strategy(p).await.is_ok());
    }

    #[tokio::test]
    async fn unknown_strategy_is_a_hard_error() {
        let engine = StrategyEngine::new(EventBus::default());
        assert!(matches!(
            engine.start_strategy("missing").await.unwrap_err(),
            VaultError::UnknownStrategy(_)
        ));
    }
}
