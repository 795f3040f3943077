//! Agentvault — operator CLI for the agent custody and revenue engine.
//!
//! Usage:
//!   agentvault init              Write a default config file
//!   agentvault status            Show platform config and stored state
//!   agentvault derive-address    Derive a deterministic agent address
//!   agentvault quote-fees        Quote the fee split for a profit amount
//!   agentvault demo              Run a full deploy/execute/distribute pass

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use agentvault::amount::Nano;
use agentvault::chain::MockSubmitter;
use agentvault::config;
use agentvault::custody::WalletManager;
use agentvault::events::EventBus;
use agentvault::factory::{address, AgentFactory, DeployAgentRequest, FactoryConfig, Governance};
use agentvault::fees::FeeEngine;
use agentvault::registry::AgentRegistry;
use agentvault::state::Database;
use agentvault::strategy::{CreateStrategyParams, ExecutionSample, StrategyEngine};
use agentvault::types::*;

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "agentvault")]
#[command(version = "0.1.0")]
#[command(about = "Custody and revenue engine for autonomous on-chain agents")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to agentvault home directory.
    #[arg(long, default_value = "~/.agentvault")]
    home: String,

    /// Log level (debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a default config file to the home directory.
    Init,

    /// Show platform configuration and stored state.
    Status,

    /// Derive the deterministic contract address for an owner and salt.
    DeriveAddress {
        /// Owner wallet address.
        owner: String,

        /// Deployment salt; random when omitted.
        #[arg(long)]
        salt: Option<String>,

        /// Target workchain.
        #[arg(long, default_value_t = 0)]
        workchain: i8,
    },

    /// Quote the revenue split for a given profit, in nanoTON.
    QuoteFees {
        /// Realized profit amount in nanoTON.
        profit: i64,
    },

    /// Deploy a demo agent, run one strategy execution and distribute fees.
    Demo,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    // Resolve home directory
    let home_dir = PathBuf::from(shellexpand::tilde(&cli.home).into_owned());

    match cli.command {
        Commands::Init => cmd_init(&home_dir),
        Commands::Status => cmd_status(&home_dir).await,
        Commands::DeriveAddress {
            owner,
            salt,
            workchain,
        } => cmd_derive_address(&owner, salt, workchain),
        Commands::QuoteFees { profit } => cmd_quote_fees(&home_dir, profit),
        Commands::Demo => cmd_demo(&home_dir).await,
    }
}

fn config_path(home_dir: &Path) -> PathBuf {
    home_dir.join("agentvault.toml")
}

// ---------------------------------------------------------------------------
// Command implementations
// ---------------------------------------------------------------------------

fn cmd_init(home_dir: &Path) -> Result<()> {
    let path = config_path(home_dir);
    if path.exists() {
        println!("Config already exists at {}", path.display());
        return Ok(());
    }
    let cfg = config::PlatformConfig::default();
    config::save_config(&cfg, &path)?;
    println!("{} Wrote default config to {}", ">>>".green().bold(), path.display());
    Ok(())
}

async fn cmd_status(home_dir: &Path) -> Result<()> {
    let cfg = config::load_config(&config_path(home_dir))?;
    let db = Database::open(Path::new(&cfg.resolved_db_path()))
        .context("Failed to open state database")?;

    let deployments = db.deployment_count()?;

    println!();
    println!("{}", "=== Agentvault Status ===".bold());
    println!();
    println!("  {}:  {}", "Platform".bold(), cfg.name);
    println!("  {}:", "Limits".bold());
    println!("    Deployment fee:  {}", cfg.deployment_fee);
    println!("    Agents per user: {}", cfg.max_agents_per_user);
    println!("  {}:", "Fees".bold());
    println!("    Performance: {} bps", cfg.fees.performance_bps);
    println!("    Protocol:    {} bps", cfg.fees.protocol_bps);
    println!("    Marketplace: {} bps", cfg.fees.marketplace_bps);
    println!("    Minimum fee: {}", cfg.fees.minimum_fee);
    println!("  {}:", "State".bold());
    println!("    Database:    {}", cfg.resolved_db_path());
    println!("    Deployments: {}", deployments);
    println!();

    Ok(())
}

fn cmd_derive_address(owner: &str, salt: Option<String>, workchain: i8) -> Result<()> {
    let salt = salt.unwrap_or_else(|| format!("{:016x}", rand::random::<u64>()));
    let derived = address::derive_address(owner, &salt, workchain);

    println!("  {}:    {}", "Owner".bold(), owner);
    println!("  {}:     {}", "Salt".bold(), salt);
    println!("  {}:  {}", "Address".bold(), derived.green());
    Ok(())
}

fn cmd_quote_fees(home_dir: &Path, profit: i64) -> Result<()> {
    let cfg = config::load_config(&config_path(home_dir))?;
    let profit = Nano::new(i128::from(profit));
    let schedule = cfg.fees;

    let total = if profit.is_positive() {
        profit.bps(schedule.performance_bps).max(schedule.minimum_fee)
    } else {
        Nano::ZERO
    };
    let protocol = total.bps(schedule.protocol_split_bps);
    let creator = total.bps(schedule.creator_split_bps);
    let referral = total.bps(schedule.referral_split_bps);
    let treasury = total
        .checked_sub(protocol)
        .and_then(|t| t.checked_sub(creator))
        .and_then(|t| t.checked_sub(referral))
        .unwrap_or(Nano::ZERO);

    println!("  {}:   {}", "Profit".bold(), profit);
    println!("  {}:  {}", "Fee".bold(), total);
    println!("    Protocol: {}", protocol);
    println!("    Treasury: {}", treasury);
    println!("    Creator:  {}", creator);
    println!("    Referral: {} (only when a referrer is registered)", referral);
    Ok(())
}

async fn cmd_demo(home_dir: &Path) -> Result<()> {
    let cfg = config::load_config(&config_path(home_dir))?;
    let db = Database::open(Path::new(&cfg.resolved_db_path()))
        .context("Failed to open state database")?;

    let events = EventBus::new(cfg.event_capacity);
    let submitter = Arc::new(MockSubmitter::new());
    let wallets = WalletManager::new(submitter, events.clone());
    let registry = AgentRegistry::new(events.clone());
    let strategies = StrategyEngine::new(events.clone());
    let fees = FeeEngine::new(cfg.fees.clone(), events.clone());
    let governance = Governance::new(events.clone());
    let factory = AgentFactory::new(
        FactoryConfig {
            deployment_fee: cfg.deployment_fee,
            max_agents_per_user: cfg.max_agents_per_user,
        },
        governance,
        wallets.clone(),
        registry.clone(),
        strategies.clone(),
        fees.clone(),
        events.clone(),
    );

    let owner = "EQdemo_owner";
    let salt = format!("{:016x}", rand::random::<u64>());

    println!("{} Deploying demo agent...", ">>>".green().bold());
    let deployment = factory
        .deploy_agent(DeployAgentRequest {
            owner_id: "demo-user".into(),
            owner_address: owner.into(),
            custody: CustodyConfig::SmartContract(ScWalletConfig {
                per_tx_limit: Nano::from_tons(10),
                daily_limit: Nano::from_tons(50),
                whitelist: vec![],
                allowed_tx_types: vec![TxType::TonTransfer, TxType::Swap],
                multisig_threshold: Nano::from_tons(100),
                required_cosigners: 0,
                co_signers: vec![],
            }),
            salt,
            workchain: 0,
        })
        .await?;
    db.save_deployment(&deployment)?;
    println!("    Agent:   {}", deployment.agent_id);
    println!("    Address: {}", deployment.contract_address.green());

    wallets.credit(&deployment.agent_id, Nano::from_tons(20)).await?;

    println!("{} Executing a transfer...", ">>>".green().bold());
    let result = wallets
        .execute_transaction(
            &deployment.agent_id,
            &TxRequest {
                request_id: ulid::Ulid::new().to_string(),
                tx_type: TxType::TonTransfer,
                destination: "EQcounterparty".into(),
                amount: Nano::from_tons(2),
                payload: None,
                signed_payload: None,
            },
            Duration::from_secs(cfg.submit_timeout_secs),
        )
        .await?;
    match (&result.tx_hash, &result.failure) {
        (Some(hash), _) => println!("    Submitted: {}", hash),
        (None, Some(failure)) => println!("    {}: {}", "Rejected".red().bold(), failure),
        _ => {}
    }
    db.save_wallet(&wallets.wallet(&deployment.agent_id).await?)?;

    println!("{} Running a strategy execution...", ">>>".green().bold());
    let strategy = factory
        .deploy_strategy(CreateStrategyParams {
            agent_id: deployment.agent_id.clone(),
            strategy_type: "dca".into(),
            risk_level: RiskLevel::Low,
            max_gas_budget: Nano::from_tons(1),
            stop_conditions: StopConditions::default(),
            schedule: None,
        })
        .await?;
    strategies.start_strategy(&strategy.strategy_id).await?;
    let outcome = strategies
        .execute_strategy(
            &strategy.strategy_id,
            ExecutionSample {
                success: true,
                pnl: Nano::from_tons(5),
            },
        )
        .await?;
    db.save_strategy(&outcome.record)?;
    println!(
        "    Strategy {} win rate {}%",
        outcome.record.strategy_id, outcome.record.performance.win_rate
    );

    println!("{} Distributing revenue...", ">>>".green().bold());
    let split = fees
        .distribute_revenue(&deployment.agent_id, Nano::from_tons(5), owner)
        .await?;
    println!("    Total fee: {}", split.total_fee);
    println!("    Protocol:  {}", split.protocol_share);
    println!("    Treasury:  {}", split.treasury_share);
    println!("    Creator:   {}", split.creator_share);

    for record in fees.fees_for_agent(&deployment.agent_id).await {
        db.save_fee_record(&record)?;
    }
    if let Ok(entry) = registry.get_agent(&deployment.agent_id).await {
        db.save_registry_entry(&entry)?;
    }

    info!("demo complete; state checkpointed to {}", cfg.resolved_db_path());
    println!("{} Demo complete.", ">>>".green().bold());
    Ok(())
}
