//! Agentvault — custody, execution authorization and revenue distribution
//! for autonomous on-chain agents.
//!
//! The factory deploys agents behind three custody modes (non-custodial,
//! MPC threshold, policy-enforced smart-contract wallet), the registry is
//! the authoritative agent directory, and the fee engine divides realized
//! profit between protocol, treasury, creators and referrers.

pub mod amount;
pub mod chain;
pub mod config;
pub mod custody;
pub mod error;
pub mod events;
pub mod factory;
pub mod fees;
pub mod registry;
pub mod state;
pub mod strategy;
pub mod types;
