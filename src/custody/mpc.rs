//! Threshold-signing session arena.
//!
//! MPC signing is a session protocol: a session is opened for one
//! transaction, parties submit partial-signature shares independently and
//! concurrently, and once the threshold is reached the session may be
//! finalized exactly once. Sessions live in a short-lived arena keyed by
//! session id — never as mutable fields on the wallet — so concurrent
//! sessions for the same wallet cannot corrupt each other. Abandoned
//! sessions are garbage-collected on expiry.

use crate::error::{Result, VaultError};
use crate::types::TxRequest;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Default session lifetime before garbage collection.
pub const DEFAULT_SESSION_TTL_SECS: i64 = 600;

/// One in-flight threshold-signing session.
#[derive(Debug, Clone)]
pub struct SigningSession {
    pub session_id: String,
    pub agent_id: String,
    pub request: TxRequest,
    pub threshold: u8,
    pub parties: u8,
    /// Shares keyed by party index. Map semantics make re-submission from
    /// the same party a no-op, so a share never counts twice.
    pub shares: BTreeMap<u8, String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SigningSession {
    pub fn threshold_reached(&self) -> bool {
        self.shares.len() >= usize::from(self.threshold)
    }
}

/// Arena of in-flight sessions, shared across custody calls.
#[derive(Debug, Clone)]
pub struct SessionArena {
    sessions: Arc<Mutex<HashMap<String, SigningSession>>>,
    ttl: ChronoDuration,
}

impl SessionArena {
    pub fn new() -> Self {
        Self::with_ttl(ChronoDuration::seconds(DEFAULT_SESSION_TTL_SECS))
    }

    pub fn with_ttl(ttl: ChronoDuration) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            ttl,
        }
    }

    /// Open a session for one transaction request.
    pub async fn initiate(
        &self,
        agent_id: &str,
        request: TxRequest,
        threshold: u8,
        parties: u8,
    ) -> String {
        let session_id = ulid::Ulid::new().to_string();
        let now = Utc::now();
        let session = SigningSession {
            session_id: session_id.clone(),
            agent_id: agent_id.to_string(),
            request,
            threshold,
            parties,
            shares: BTreeMap::new(),
            created_at: now,
            expires_at: now + self.ttl,
        };

        self.sessions.lock().await.insert(session_id.clone(), session);
        debug!(session_id, agent_id, "signing session opened");
        session_id
    }

    /// Submit one party's share. Returns whether the threshold is now
    /// reached. Idempotent for a repeated party index.
    pub async fn submit_share(
        &self,
        session_id: &str,
        party_index: u8,
        share: &str,
    ) -> Result<bool> {
        let mut sessions = self.sessions.lock().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| VaultError::UnknownSession(session_id.to_string()))?;

        if party_index >= session.parties {
            return Err(VaultError::PartyIndexOutOfRange {
                index: party_index,
                parties: session.parties,
            });
        }

        session
            .shares
            .entry(party_index)
            .or_insert_with(|| share.to_string());
        Ok(session.threshold_reached())
    }

    /// Remove the session for finalization. Errors if the threshold has not
    /// been reached; a second take for the same id fails with
    /// `UnknownSession`, which is what makes finalization exactly-once.
    pub async fn take_for_finalize(&self, session_id: &str) -> Result<SigningSession> {
        let mut sessions = self.sessions.lock().await;
        let session = sessions
            .get(session_id)
            .ok_or_else(|| VaultError::UnknownSession(session_id.to_string()))?;

        if !session.threshold_reached() {
            return Err(VaultError::ThresholdNotReached(session_id.to_string()));
        }

        Ok(sessions
            .remove(session_id)
            .ok_or_else(|| VaultError::UnknownSession(session_id.to_string()))?)
    }

    /// Find a threshold-reached session by the request it was opened for.
    pub async fn find_ready_by_request(
        &self,
        agent_id: &str,
        request_id: &str,
    ) -> Option<String> {
        let sessions = self.sessions.lock().await;
        sessions
            .values()
            .find(|s| {
                s.agent_id == agent_id
                    && s.request.request_id == request_id
                    && s.threshold_reached()
            })
            .map(|s| s.session_id.clone())
    }

    /// Put a taken session back, used when submission failed transiently and
    /// the caller should be able to retry the finalize.
    pub async fn restore(&self, session: SigningSession) {
        let mut sessions = self.sessions.lock().await;
        sessions.insert(session.session_id.clone(), session);
    }

    /// Abandon a session. Discards shares; never touches wallet state.
    pub async fn cancel(&self, session_id: &str) -> Result<()> {
        let mut sessions = self.sessions.lock().await;
        sessions
            .remove(session_id)
            .ok_or_else(|| VaultError::UnknownSession(session_id.to_string()))?;
        debug!(session_id, "signing session cancelled");
        Ok(())
    }

    /// Drop all sessions past their expiry. Returns how many were collected.
    pub async fn gc_expired(&self) -> usize {
        let now = Utc::now();
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|_, s| s.expires_at > now);
        before - sessions.len()
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Background reaper for abandoned sessions. Exits cooperatively when
    /// `cancel` is triggered.
    pub async fn run_reaper(&self, cancel: CancellationToken) {
        let tick = tokio::time::Duration::from_secs(60);
        loop {
            tokio::select! {
                _ = tokio::time::sleep(tick) => {
                    let collected = self.gc_expired().await;
                    if collected > 0 {
                        info!(collected, "reaped expired signing sessions");
                    }
                }
                _ = cancel.cancelled() => {
                    debug!("session reaper shutting down");
                    return;
                }
            }
        }
    }
}

impl Default for SessionArena {
    fn default() -> Self {
        Self::new()
    }
}
