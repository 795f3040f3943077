//! Chain submission port.
//!
//! The engine never encodes chain-specific payloads; it hands a signed
//! envelope to a [`ChainSubmitter`] and gets back a hash and gas figure.
//! Production wires a real RPC adapter here; tests and the CLI demo use
//! [`MockSubmitter`], which produces a deterministic hash from the envelope.

use crate::error::{Result, VaultError};
use async_trait::async_trait;
use sha3::{Digest, Keccak256};
use std::time::Duration;

/// Receipt for a successfully submitted transaction.
#[derive(Debug, Clone)]
pub struct Submitted {
    pub tx_hash: String,
    pub gas_used: u64,
}

/// Capability interface: submit a signed transaction, return hash and gas.
#[async_trait]
pub trait ChainSubmitter: Send + Sync {
    async fn submit(&self, signed_envelope: &[u8]) -> Result<Submitted>;
}

/// Deterministic in-memory submitter used by tests and the demo CLI.
#[derive(Debug, Clone, Default)]
pub struct MockSubmitter {
    /// When set, every submission fails with a retryable chain error.
    pub fail: bool,
    /// Artificial latency, for exercising caller timeouts.
    pub latency: Option<Duration>,
}

impl MockSubmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            latency: None,
        }
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self {
            fail: false,
            latency: Some(latency),
        }
    }
}

#[async_trait]
impl ChainSubmitter for MockSubmitter {
    async fn submit(&self, signed_envelope: &[u8]) -> Result<Submitted> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.fail {
            return Err(VaultError::ChainSubmission("mock submitter failure".into()));
        }

        let hash = Keccak256::digest(signed_envelope);
        Ok(Submitted {
            tx_hash: format!("0x{}", hex::encode(hash)),
            gas_used: 10_000 + (signed_envelope.len() as u64) * 16,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_submitter_is_deterministic() {
        let s = MockSubmitter::new();
        let a = s.submit(b"envelope").await.unwrap();
        let b = s.submit(b"envelope").await.unwrap();
        assert_eq!(a.tx_hash, b.tx_hash);
        assert!(a.tx_hash.starts_with("0x"));
    }

    #[tokio::test]
    async fn failing_submitter_reports_retryable() {
        let s = MockSubmitter::failing();
        let err = s.submit(b"envelope").await.unwrap_err();
        assert!(err.is_retryable());
    }
}
