//! Cumulative allocation model.
//!
//! Turns raw balance snapshots into one recipient → amount delta. Sources
//! are processed in order and recipients keep first-seen order, so the
//! output order is deterministic for a given input.
//!
//! All arithmetic is 256-bit integer arithmetic. Proportional splits
//! compute `balance * pool / total` in 512 bits and truncate toward zero.
//! The truncation residue is reported and, under
//! [`ResidualPolicy::Sink`], credited to a designated recipient.

use std::collections::{BTreeMap, HashMap, HashSet};

use primitive_types::U512;
use tracing::{debug, info};

use merkledrop_core::{Address, Amount, BalanceMap, CoreError};

use crate::{AggregatorError, Result};

/// How one source's balances become allocations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScalingRule {
    /// Balances are allocated as-is
    Raw,
    /// Each balance scaled by `numerator / denominator`
    FlatShare { numerator: Amount, denominator: Amount },
    /// A fixed pool split pro rata over the source's balances
    ProportionalPool { pool: Amount },
}

/// One raw balance snapshot
#[derive(Debug, Clone)]
pub struct BalanceSource {
    /// Label used in per-entry breakdowns
    pub name: String,
    pub balances: BalanceMap,
    pub rule: ScalingRule,
}

impl BalanceSource {
    pub fn raw(name: impl Into<String>, balances: BalanceMap) -> Self {
        Self {
            name: name.into(),
            balances,
            rule: ScalingRule::Raw,
        }
    }

    pub fn with_rule(mut self, rule: ScalingRule) -> Self {
        self.rule = rule;
        self
    }
}

/// Extra amounts granted after scaling
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Bonus {
    /// Same fixed amount for each named recipient
    Fixed {
        label: String,
        recipients: Vec<Address>,
        amount: Amount,
    },
    /// `rewards[i]` to the holder ranked `i` by raw balance in `source`
    TopRanked {
        label: String,
        source: String,
        rewards: Vec<Amount>,
    },
}

/// What happens to proportional-split truncation residue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResidualPolicy {
    /// Leave it unallocated
    #[default]
    Discard,
    /// Credit it to this recipient, which must not be excluded
    Sink(Address),
}

#[derive(Debug, Clone, Default)]
pub struct AllocationConfig {
    /// Recipients dropped from every source and bonus
    pub exclude: HashSet<Address>,
    pub bonuses: Vec<Bonus>,
    pub residual: ResidualPolicy,
}

/// Breakdown label for residue credited to a sink
pub const RESIDUAL_LABEL: &str = "residual";

/// Output of the allocation model: the delta for the next update
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllocationOutcome {
    /// Non-zero amounts, first-seen order
    pub balances: BalanceMap,
    /// Per-recipient contribution of each source/bonus
    pub breakdown: HashMap<Address, BTreeMap<String, Amount>>,
    /// Total truncation residue of proportional splits
    pub residual: Amount,
}

impl AllocationOutcome {
    /// Delta taken verbatim from a balance map.
    pub fn from_balances(balances: BalanceMap) -> Self {
        let mut balances = balances;
        balances.retain(|_, amount| !amount.is_zero());
        Self {
            balances,
            breakdown: HashMap::new(),
            residual: Amount::zero(),
        }
    }

    pub fn total(&self) -> Result<Amount> {
        Ok(self.balances.total()?)
    }

    pub fn breakdown_of(&self, address: &Address) -> Option<&BTreeMap<String, Amount>> {
        self.breakdown.get(address)
    }

    fn credit(&mut self, address: Address, label: &str, amount: Amount) -> Result<()> {
        if amount.is_zero() {
            return Ok(());
        }
        self.balances.add(address, amount)?;
        let slot = self
            .breakdown
            .entry(address)
            .or_default()
            .entry(label.to_string())
            .or_default();
        *slot = slot.checked_add(amount).ok_or(CoreError::AmountOverflow)?;
        Ok(())
    }
}

/// `amount * numerator / denominator`, truncating, without intermediate
/// overflow.
pub fn mul_div(amount: Amount, numerator: Amount, denominator: Amount) -> Result<Amount> {
    if denominator.is_zero() {
        return Err(AggregatorError::DegenerateDistribution(
            "division by a zero denominator".to_string(),
        ));
    }
    let wide: U512 = amount.full_mul(numerator) / U512::from(denominator);
    Amount::try_from(wide).map_err(|_| AggregatorError::Core(CoreError::AmountOverflow))
}

/// Run the allocation model.
pub fn allocate(sources: &[BalanceSource], config: &AllocationConfig) -> Result<AllocationOutcome> {
    if let ResidualPolicy::Sink(sink) = config.residual {
        if config.exclude.contains(&sink) {
            return Err(AggregatorError::InvalidInputData(format!(
                "residual sink {} is also excluded",
                sink
            )));
        }
    }

    let mut outcome = AllocationOutcome::default();
    let mut filtered: HashMap<&str, BalanceMap> = HashMap::new();

    for source in sources {
        let mut balances = source.balances.clone();
        balances.retain(|address, _| !config.exclude.contains(address));
        let source_total = balances.total()?;

        match &source.rule {
            ScalingRule::Raw => {
                for (address, amount) in balances.iter() {
                    outcome.credit(*address, &source.name, *amount)?;
                }
            }
            ScalingRule::FlatShare {
                numerator,
                denominator,
            } => {
                if denominator.is_zero() {
                    return Err(AggregatorError::DegenerateDistribution(format!(
                        "source {} has a zero share denominator",
                        source.name
                    )));
                }
                for (address, amount) in balances.iter() {
                    let share = mul_div(*amount, *numerator, *denominator)?;
                    outcome.credit(*address, &source.name, share)?;
                }
            }
            ScalingRule::ProportionalPool { pool } => {
                if source_total.is_zero() {
                    return Err(AggregatorError::DegenerateDistribution(format!(
                        "source {} has zero total balance to split a pool of {}",
                        source.name, pool
                    )));
                }
                let mut distributed = Amount::zero();
                for (address, amount) in balances.iter() {
                    let share = mul_div(*amount, *pool, source_total)?;
                    distributed = distributed
                        .checked_add(share)
                        .ok_or(CoreError::AmountOverflow)?;
                    outcome.credit(*address, &source.name, share)?;
                }
                let residue = pool.saturating_sub(distributed);
                outcome.residual = outcome
                    .residual
                    .checked_add(residue)
                    .ok_or(CoreError::AmountOverflow)?;
                debug!(
                    "Source {}: pool {} split over {} holders, residue {}",
                    source.name,
                    pool,
                    balances.len(),
                    residue
                );
            }
        }
        filtered.insert(source.name.as_str(), balances);
    }

    for bonus in &config.bonuses {
        match bonus {
            Bonus::Fixed {
                label,
                recipients,
                amount,
            } => {
                for address in recipients.iter().filter(|a| !config.exclude.contains(*a)) {
                    outcome.credit(*address, label, *amount)?;
                }
            }
            Bonus::TopRanked {
                label,
                source,
                rewards,
            } => {
                let balances = filtered.get(source.as_str()).ok_or_else(|| {
                    AggregatorError::InvalidInputData(format!(
                        "bonus {label} ranks unknown source {source}"
                    ))
                })?;
                for ((address, _), reward) in rank(balances).into_iter().zip(rewards) {
                    outcome.credit(address, label, *reward)?;
                }
            }
        }
    }

    if let ResidualPolicy::Sink(sink) = config.residual {
        let residual = outcome.residual;
        outcome.credit(sink, RESIDUAL_LABEL, residual)?;
    }

    outcome.balances.retain(|_, amount| !amount.is_zero());

    info!(
        "Allocated {} across {} recipients from {} sources (residual {})",
        outcome.balances.total()?,
        outcome.balances.len(),
        sources.len(),
        outcome.residual,
    );
    Ok(outcome)
}

/// Holders by descending balance; ties keep first-seen order.
fn rank(balances: &BalanceMap) -> Vec<(Address, Amount)> {
    let mut ranked: Vec<(Address, Amount)> = balances
        .iter()
        .filter(|(_, amount)| !amount.is_zero())
        .map(|(a, b)| (*a, *b))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked
}
