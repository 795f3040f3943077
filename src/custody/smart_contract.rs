//! Spending-policy checks for smart-contract wallets.
//!
//! Every typed operation routes through [`check_policy`] — one authorization
//! path, never one per operation type. Checks run in a fixed order: allowed
//! type, per-tx limit, daily limit, whitelist, multisig threshold.

use crate::amount::Nano;
use crate::types::{ScWalletConfig, TxFailure, TxRequest};

/// Evaluate the policy for one request. `daily_spent` is the running total
/// for the current day window; `approvals` is how many distinct co-signers
/// have approved this request id so far.
///
/// Returns the first violated rule, or `None` if the request may execute.
pub fn check_policy(
    config: &ScWalletConfig,
    request: &TxRequest,
    daily_spent: Nano,
    approvals: u8,
) -> Option<TxFailure> {
    if !config.allowed_tx_types.contains(&request.tx_type) {
        return Some(TxFailure::TxTypeNotAllowed {
            tx_type: request.tx_type,
        });
    }

    if request.amount > config.per_tx_limit {
        return Some(TxFailure::PerTxLimitExceeded {
            amount: request.amount,
            limit: config.per_tx_limit,
        });
    }

    let would_total = daily_spent
        .checked_add(request.amount)
        .unwrap_or(Nano::new(i128::MAX));
    if would_total > config.daily_limit {
        return Some(TxFailure::DailyLimitExceeded {
            would_total,
            limit: config.daily_limit,
        });
    }

    // Empty whitelist means unrestricted destinations.
    if !config.whitelist.is_empty()
        && !config.whitelist.iter().any(|d| d == &request.destination)
    {
        return Some(TxFailure::DestinationNotWhitelisted {
            destination: request.destination.clone(),
        });
    }

    if request.amount >= config.multisig_threshold && approvals < config.required_cosigners {
        return Some(TxFailure::CosignersMissing {
            have: approvals,
            need: config.required_cosigners,
        });
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TxType;

    fn config() -> ScWalletConfig {
        ScWalletConfig {
            per_tx_limit: Nano::from_tons(10),
            daily_limit: Nano::from_tons(100),
            whitelist: vec!["EQallowed".into()],
            allowed_tx_types: vec![TxType::TonTransfer, TxType::Swap],
            multisig_threshold: Nano::from_tons(5),
            required_cosigners: 2,
            co_signers: vec!["EQcs1".into(), "EQcs2".into()],
        }
    }

    fn request(amount: Nano, destination: &str, tx_type: TxType) -> TxRequest {
        TxRequest {
            request_id: "r1".into(),
            tx_type,
            destination: destination.into(),
            amount,
            payload: None,
            signed_payload: None,
        }
    }

    #[test]
    fn disallowed_type_rejected_first() {
        let failure = check_policy(
            &config(),
            &request(Nano::from_tons(999), "EQnowhere", TxType::DaoVote),
            Nano::ZERO,
            0,
        );
        assert!(matches!(failure, Some(TxFailure::TxTypeNotAllowed { .. })));
    }

    #[test]
    fn over_per_tx_limit_always_rejected() {
        let failure = check_policy(
            &config(),
            &request(Nano::from_tons(11), "EQallowed", TxType::TonTransfer),
            Nano::ZERO,
            2,
        );
        assert!(matches!(failure, Some(TxFailure::PerTxLimitExceeded { .. })));
    }

    #[test]
    fn daily_limit_counts_running_total() {
        let failure = check_policy(
            &config(),
            &request(Nano::from_tons(6), "EQallowed", TxType::TonTransfer),
            Nano::from_tons(95),
            2,
        );
        assert!(matches!(failure, Some(TxFailure::DailyLimitExceeded { .. })));
    }

    #[test]
    fn non_whitelisted_destination_rejected() {
        let failure = check_policy(
            &config(),
            &request(Nano::from_tons(1), "EQother", TxType::TonTransfer),
            Nano::ZERO,
            0,
        );
        assert!(matches!(
            failure,
            Some(TxFailure::DestinationNotWhitelisted { .. })
        ));
    }

    #[test]
    fn empty_whitelist_is_unrestricted() {
        let mut cfg = config();
        cfg.whitelist.clear();
        let failure = check_policy(
            &cfg,
            &request(Nano::from_tons(1), "EQanywhere", TxType::TonTransfer),
            Nano::ZERO,
            0,
        );
        assert_eq!(failure, None);
    }

    #[test]
    fn above_threshold_requires_cosigners() {
        let req = request(Nano::from_tons(5), "EQallowed", TxType::TonTransfer);
        assert!(matches!(
            check_policy(&config(), &req, Nano::ZERO, 1),
            Some(TxFailure::CosignersMissing { have: 1, need: 2 })
        ));
        assert_eq!(check_policy(&config(), &req, Nano::ZERO, 2), None);
    }

    #[test]
    fn within_all_limits_succeeds() {
        let failure = check_policy(
            &config(),
            &request(Nano::from_tons(2), "EQallowed", TxType::Swap),
            Nano::from_tons(50),
            0,
        );
        assert_eq!(failure, None);
    }
}
