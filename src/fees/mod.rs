//! Fee computation and revenue distribution.
//!
//! All rates are basis points applied with floor rounding; a configured
//! minimum fee floor kicks in when the computed fee is smaller and the base
//! is positive. Zero or negative base yields zero fee — no fee on losses.
//! Revenue splits are exact: the treasury takes the remainder after the
//! protocol, creator and referral shares are floored, so the parts always
//! sum to the total with no silent leak.
//!
//! Fee bookkeeping is tracked independently of custody; nothing here touches
//! wallet balances.

use crate::amount::Nano;
use crate::error::{Result, VaultError};
use crate::events::{EventBus, EventKind};
use crate::types::{CreatorBalance, FeeKind, FeeRecord, RevenueSplit};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

/// Fee rates and split shares, all in basis points.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeeSchedule {
    pub performance_bps: u32,
    pub protocol_bps: u32,
    pub marketplace_bps: u32,
    pub referral_bps: u32,
    /// Floor applied when a computed fee on a positive base is smaller.
    pub minimum_fee: Nano,
    /// Shares of the total performance fee. The treasury takes whatever
    /// remains after these are floored.
    pub protocol_split_bps: u32,
    pub creator_split_bps: u32,
    pub referral_split_bps: u32,
    pub protocol_address: String,
    pub treasury_address: String,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            performance_bps: 1000,
            protocol_bps: 100,
            marketplace_bps: 250,
            referral_bps: 50,
            minimum_fee: Nano::new(1_000_000),
            protocol_split_bps: 3000,
            creator_split_bps: 5000,
            referral_split_bps: 1000,
            protocol_address: "EQprotocol".into(),
            treasury_address: "EQtreasury".into(),
        }
    }
}

impl FeeSchedule {
    fn rate_for(&self, kind: FeeKind) -> u32 {
        match kind {
            FeeKind::Performance => self.performance_bps,
            FeeKind::Protocol => self.protocol_bps,
            FeeKind::Marketplace => self.marketplace_bps,
            FeeKind::Referral => self.referral_bps,
        }
    }
}

/// Fee engine. Cloneable handle; all clones share state.
#[derive(Clone)]
pub struct FeeEngine {
    schedule: FeeSchedule,
    records: Arc<Mutex<Vec<FeeRecord>>>,
    creators: Arc<Mutex<HashMap<String, CreatorBalance>>>,
    /// agent id -> referrer address.
    referrers: Arc<Mutex<HashMap<String, String>>>,
    events: EventBus,
}

impl FeeEngine {
    pub fn new(schedule: FeeSchedule, events: EventBus) -> Self {
        Self {
            schedule,
            records: Arc::new(Mutex::new(Vec::new())),
            creators: Arc::new(Mutex::new(HashMap::new())),
            referrers: Arc::new(Mutex::new(HashMap::new())),
            events,
        }
    }

    pub fn schedule(&self) -> &FeeSchedule {
        &self.schedule
    }

    // -----------------------------------------------------------------------
    // Computation
    // -----------------------------------------------------------------------

    /// Compute a fee on `base`. Zero or negative base yields zero.
    pub fn compute_fee(&self, kind: FeeKind, base: Nano) -> Nano {
        if !base.is_positive() {
            return Nano::ZERO;
        }
        let fee = base.bps(self.schedule.rate_for(kind));
        fee.max(self.schedule.minimum_fee)
    }

    // -----------------------------------------------------------------------
    // Records
    // -----------------------------------------------------------------------

    /// Record a fee. Rejects non-positive amounts.
    pub async fn record_fee(
        &self,
        kind: FeeKind,
        agent_id: &str,
        amount: Nano,
        destination: &str,
    ) -> Result<FeeRecord> {
        if !amount.is_positive() {
            return Err(VaultError::NonPositiveFee);
        }
        let record = FeeRecord {
            fee_id: ulid::Ulid::new().to_string(),
            kind,
            agent_id: agent_id.to_string(),
            amount,
            destination: destination.to_string(),
            collected: false,
            tx_hash: None,
            created_at: Utc::now(),
        };
        self.records.lock().await.push(record.clone());
        self.events.emit(
            EventKind::FeeRecorded,
            agent_id,
            json!({ "kind": kind.to_string(), "amount": amount.raw().to_string() }),
        );
        Ok(record)
    }

    /// Mark a recorded fee as collected on-chain.
    pub async fn mark_collected(&self, fee_id: &str, tx_hash: &str) -> Result<FeeRecord> {
        let mut records = self.records.lock().await;
        let record = records
            .iter_mut()
            .find(|r| r.fee_id == fee_id)
            .ok_or_else(|| VaultError::UnknownFee(fee_id.to_string()))?;
        record.collected = true;
        record.tx_hash = Some(tx_hash.to_string());
        Ok(record.clone())
    }

    pub async fn fees_for_agent(&self, agent_id: &str) -> Vec<FeeRecord> {
        let records = self.records.lock().await;
        records
            .iter()
            .filter(|r| r.agent_id == agent_id)
            .cloned()
            .collect()
    }

    /// Sum of every recorded fee amount.
    pub async fn total_fees_recorded(&self) -> Nano {
        let records = self.records.lock().await;
        records
            .iter()
            .fold(Nano::ZERO, |acc, r| {
                acc.checked_add(r.amount).unwrap_or(acc)
            })
    }

    // -----------------------------------------------------------------------
    // Revenue distribution
    // -----------------------------------------------------------------------

    /// Register a referrer for an agent. Later distributions carve out the
    /// referral share for this address.
    pub async fn register_referrer(&self, agent_id: &str, referrer_address: &str) {
        self.referrers
            .lock()
            .await
            .insert(agent_id.to_string(), referrer_address.to_string());
    }

    /// Split realized profit into platform, treasury, creator and referral
    /// shares. The parts sum exactly to the total performance fee.
    pub async fn distribute_revenue(
        &self,
        agent_id: &str,
        profit: Nano,
        creator_address: &str,
    ) -> Result<RevenueSplit> {
        let referrer = self.referrers.lock().await.get(agent_id).cloned();
        let total_fee = self.compute_fee(FeeKind::Performance, profit);

        if total_fee.is_zero() {
            // No fee on losses or zero profit.
            return Ok(RevenueSplit {
                agent_id: agent_id.to_string(),
                total_fee: Nano::ZERO,
                protocol_share: Nano::ZERO,
                treasury_share: Nano::ZERO,
                creator_share: Nano::ZERO,
                referral_share: Nano::ZERO,
                referrer,
            });
        }

        let protocol_share = total_fee.bps(self.schedule.protocol_split_bps);
        let creator_share = total_fee.bps(self.schedule.creator_split_bps);
        let referral_share = if referrer.is_some() {
            total_fee.bps(self.schedule.referral_split_bps)
        } else {
            Nano::ZERO
        };
        // Treasury absorbs the flooring remainder so the parts sum exactly.
        let treasury_share = total_fee
            .checked_sub(protocol_share)
            .and_then(|n| n.checked_sub(creator_share))
            .and_then(|n| n.checked_sub(referral_share))
            .ok_or(VaultError::AmountOverflow("revenue split"))?;

        if protocol_share.is_positive() {
            self.record_fee(
                FeeKind::Protocol,
                agent_id,
                protocol_share,
                &self.schedule.protocol_address.clone(),
            )
            .await?;
        }
        if treasury_share.is_positive() {
            self.record_fee(
                FeeKind::Performance,
                agent_id,
                treasury_share,
                &self.schedule.treasury_address.clone(),
            )
            .await?;
        }
        if let (Some(referrer_address), true) = (&referrer, referral_share.is_positive()) {
            self.record_fee(FeeKind::Referral, agent_id, referral_share, referrer_address)
                .await?;
        }

        if creator_share.is_positive() {
            let mut creators = self.creators.lock().await;
            let balance = creators
                .entry(creator_address.to_string())
                .or_insert_with(|| CreatorBalance {
                    creator_address: creator_address.to_string(),
                    total_earned: Nano::ZERO,
                    pending_payout: Nano::ZERO,
                    total_paid_out: Nano::ZERO,
                    last_payout_at: None,
                });
            balance.total_earned = balance
                .total_earned
                .checked_add(creator_share)
                .ok_or(VaultError::AmountOverflow("creator earnings"))?;
            balance.pending_payout = balance
                .pending_payout
                .checked_add(creator_share)
                .ok_or(VaultError::AmountOverflow("creator pending"))?;
        }

        info!(agent_id, %total_fee, "revenue distributed");
        self.events.emit(
            EventKind::RevenueDistributed,
            agent_id,
            json!({ "total_fee": total_fee.raw().to_string() }),
        );

        Ok(RevenueSplit {
            agent_id: agent_id.to_string(),
            total_fee,
            protocol_share,
            treasury_share,
            creator_share,
            referral_share,
            referrer,
        })
    }

    // -----------------------------------------------------------------------
    // Creator payouts
    // -----------------------------------------------------------------------

    pub async fn creator_balance(&self, creator_address: &str) -> Option<CreatorBalance> {
        self.creators.lock().await.get(creator_address).cloned()
    }

    /// Move the full pending balance to paid-out and return the paid amount.
    /// A zero pending balance is a zero-value payout, not an error.
    pub async fn process_payout(&self, creator_address: &str) -> Result<Nano> {
        let mut creators = self.creators.lock().await;
        let balance = match creators.get_mut(creator_address) {
            Some(b) => b,
            None => return Ok(Nano::ZERO),
        };

        let paid = balance.pending_payout;
        balance.pending_payout = Nano::ZERO;
        balance.total_paid_out = balance
            .total_paid_out
            .checked_add(paid)
            .ok_or(VaultError::AmountOverflow("creator payout"))?;
        balance.last_payout_at = Some(Utc::now());
        drop(creators);

        self.events.emit(
            EventKind::PayoutProcessed,
            "",
            json!({ "creator": creator_address, "amount": paid.raw().to_string() }),
        );
        Ok(paid)
    }
}
