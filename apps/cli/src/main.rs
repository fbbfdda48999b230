//! MerkleDrop CLI
//!
//! Operator interface for publishing cumulative distributions, withdrawing
//! unclaimed tokens and inspecting ledger state, over the file-backed
//! dataset store and the local ledger snapshot.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use merkledrop_aggregator::{
    allocate, AllocationConfig, BalanceSource, Bonus, Distributor, ResidualPolicy, ScalingRule,
};
use merkledrop_core::{digest_to_hex, parse_amount, Address, Amount, BalanceMap};
use merkledrop_settings::Settings;
use merkledrop_settlement::{ClaimRequest, LedgerClient, LocalLedgerClient, Transition};
use merkledrop_store::FileStore;

/// MerkleDrop - cumulative Merkle token distributions
#[derive(Parser)]
#[command(name = "merkledrop")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Settings file
    #[arg(long, default_value = "merkledrop.json")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct AllocationArgs {
    /// Token the distribution pays out
    #[arg(short, long)]
    token: Address,

    /// Balance source: `name=path.json[@rule]`, rule is `raw`,
    /// `share:NUM/DEN` or `pool:AMOUNT`
    #[arg(short, long, required = true)]
    source: Vec<String>,

    /// Fixed bonus: `label:amount:addr1,addr2,...`
    #[arg(long)]
    bonus: Vec<String>,

    /// Rank bonus: `label:source:reward1,reward2,...`
    #[arg(long)]
    top: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Publish the first distribution for a token
    Generate(AllocationArgs),

    /// Add new allocations to an existing distribution
    Update(AllocationArgs),

    /// Pause a distribution and withdraw everything not yet claimed
    Withdraw {
        #[arg(short, long)]
        token: Address,
    },

    /// Print the claim bundle for a recipient
    Proof {
        #[arg(short, long)]
        token: Address,
        address: Address,
    },

    /// Claim on behalf of a recipient against the local ledger
    Claim {
        #[arg(short, long)]
        token: Address,
        address: Address,
    },

    /// Show distribution records
    Status {
        #[arg(short, long)]
        token: Option<Address>,
    },

    /// Show the claimed amount of a recipient
    Claimed {
        #[arg(short, long)]
        token: Address,
        address: Address,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = Settings::load_from(&cli.config)
        .with_context(|| format!("loading settings from {:?}", cli.config))?;
    if cli.verbose {
        merkledrop_logging::init_logging(true);
    } else {
        let _ = merkledrop_logging::try_init_with_filter(&settings.logging.filter);
    }

    let ledger = Arc::new(
        LocalLedgerClient::open(&settings.ledger.state_path)
            .await
            .with_context(|| format!("opening ledger {:?}", settings.ledger.state_path))?,
    );
    let store = Arc::new(FileStore::new(settings.store.dir.clone()));
    let distributor = Distributor::new(store, ledger.clone())
        .with_query_batch_size(settings.withdrawal.query_batch_size);

    match cli.command {
        Commands::Generate(args) => {
            if ledger.distribution(&args.token).await?.is_some() {
                bail!("distribution for {} already exists, use `update`", args.token);
            }
            publish(&distributor, &settings, args).await?;
        }
        Commands::Update(args) => {
            if ledger.distribution(&args.token).await?.is_none() {
                bail!("no distribution for {}, use `generate`", args.token);
            }
            publish(&distributor, &settings, args).await?;
        }
        Commands::Withdraw { token } => {
            let outcome = distributor.withdraw(token).await?;
            println!("Withdrawn:      {}", outcome.withdrawn);
            println!("Total claimed:  {}", outcome.total_claimed);
            println!("Recipients:     {}", outcome.recipients);
            println!("Root:           {}", digest_to_hex(&outcome.root));
            println!("Dataset:        {}", outcome.storage_pointer);
        }
        Commands::Proof { token, address } => {
            let bundle = distributor.claim_bundle(&token, &address).await?;
            println!("{}", serde_json::to_string_pretty(&bundle)?);
        }
        Commands::Claim { token, address } => {
            let bundle = distributor.claim_bundle(&token, &address).await?;
            let receipt = ledger
                .submit(Transition::Claim(ClaimRequest {
                    token,
                    index: bundle.index,
                    recipient: address,
                    amount: bundle.amount,
                    proof: bundle.proof,
                }))
                .await?;
            println!("Paid {} to {}", receipt.paid_to(&address), address);
        }
        Commands::Status { token } => {
            let snapshot = ledger.snapshot().await;
            let tokens: Vec<Address> = match token {
                Some(token) => vec![token],
                None => snapshot.tokens().copied().collect(),
            };
            if tokens.is_empty() {
                println!("No distributions");
            }
            for token in tokens {
                match snapshot.distribution(&token) {
                    Some(record) => {
                        println!("{}", serde_json::to_string_pretty(record)?);
                        println!("State: {:?}", snapshot.distribution_state(&token));
                    }
                    None => println!("{token}: unknown"),
                }
            }
        }
        Commands::Claimed { token, address } => {
            let claimed = ledger.claimed(&token, &address).await?;
            println!("{claimed}");
        }
    }

    Ok(())
}

async fn publish(
    distributor: &Distributor,
    settings: &Settings,
    args: AllocationArgs,
) -> Result<()> {
    let sources = args
        .source
        .iter()
        .map(|raw| load_source(raw))
        .collect::<Result<Vec<_>>>()?;
    let mut bonuses = args
        .bonus
        .iter()
        .map(|raw| parse_fixed_bonus(raw))
        .collect::<Result<Vec<_>>>()?;
    for raw in &args.top {
        bonuses.push(parse_top_bonus(raw)?);
    }

    let config = AllocationConfig {
        exclude: settings.allocation.exclude.iter().copied().collect::<HashSet<_>>(),
        bonuses,
        residual: settings
            .allocation
            .residual_sink
            .map_or(ResidualPolicy::Discard, ResidualPolicy::Sink),
    };
    let delta = allocate(&sources, &config)?;
    info!(
        "Allocated {} recipients (residual {})",
        delta.balances.len(),
        delta.residual
    );

    let published = distributor.distribute(args.token, &delta).await?;
    println!("Root:    {}", digest_to_hex(&published.root));
    println!("Dataset: {}", published.storage_pointer);
    println!("Total:   {}", published.total_amount);
    Ok(())
}

fn load_source(raw: &str) -> Result<BalanceSource> {
    let (name, rest) = raw
        .split_once('=')
        .with_context(|| format!("source {raw:?} is not name=path"))?;
    let (path, rule) = match rest.rsplit_once('@') {
        Some((path, rule)) => (path, parse_rule(rule)?),
        None => (rest, ScalingRule::Raw),
    };
    let content =
        std::fs::read_to_string(path).with_context(|| format!("reading balances {path}"))?;
    let balances =
        BalanceMap::from_json_str(&content).with_context(|| format!("parsing balances {path}"))?;
    Ok(BalanceSource::raw(name, balances).with_rule(rule))
}

fn parse_rule(rule: &str) -> Result<ScalingRule> {
    if rule == "raw" {
        return Ok(ScalingRule::Raw);
    }
    if let Some(share) = rule.strip_prefix("share:") {
        let (num, den) = share
            .split_once('/')
            .with_context(|| format!("share {share:?} is not NUM/DEN"))?;
        return Ok(ScalingRule::FlatShare {
            numerator: parse_amount(num)?,
            denominator: parse_amount(den)?,
        });
    }
    if let Some(pool) = rule.strip_prefix("pool:") {
        return Ok(ScalingRule::ProportionalPool {
            pool: parse_amount(pool)?,
        });
    }
    bail!("unknown scaling rule {rule:?}")
}

fn parse_fixed_bonus(raw: &str) -> Result<Bonus> {
    let mut parts = raw.splitn(3, ':');
    let (Some(label), Some(amount), Some(recipients)) = (parts.next(), parts.next(), parts.next())
    else {
        bail!("bonus {raw:?} is not label:amount:addr,...");
    };
    let recipients = recipients
        .split(',')
        .map(Address::parse)
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(Bonus::Fixed {
        label: label.to_string(),
        recipients,
        amount: parse_amount(amount)?,
    })
}

fn parse_top_bonus(raw: &str) -> Result<Bonus> {
    let mut parts = raw.splitn(3, ':');
    let (Some(label), Some(source), Some(rewards)) = (parts.next(), parts.next(), parts.next())
    else {
        bail!("top bonus {raw:?} is not label:source:reward,...");
    };
    let rewards = rewards
        .split(',')
        .map(parse_amount)
        .collect::<std::result::Result<Vec<Amount>, _>>()?;
    Ok(Bonus::TopRanked {
        label: label.to_string(),
        source: source.to_string(),
        rewards,
    })
}
