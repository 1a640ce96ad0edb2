//! Session budget gate.
//!
//! The quota guard holds the only cross-request mutable state of a session:
//! cumulative tokens and cost. Counters only ever grow; a new session means a
//! new guard.

use crate::config::BudgetConfig;
use serde::Serialize;
use std::sync::{Mutex, PoisonError};
use tracing::{debug, warn};

/// Budget status snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BudgetStatus {
    /// Cost limit in USD (None if unlimited).
    pub cost_limit: Option<f64>,
    /// Token limit (None if unlimited).
    pub token_limit: Option<u64>,
    /// Cost recorded so far.
    pub spent: f64,
    /// Tokens recorded so far.
    pub tokens_used: u64,
    /// Remaining cost budget (None if unlimited).
    pub remaining: Option<f64>,
    /// Percentage of the cost limit used (0 if unlimited).
    pub percentage_used: f64,
}

#[derive(Debug, Default)]
struct Usage {
    spent: f64,
    tokens: u64,
    requests: u64,
    warned_at: Vec<u8>,
}

/// Tracks cumulative session usage and gates new work.
#[derive(Debug)]
pub struct QuotaGuard {
    config: BudgetConfig,
    usage: Mutex<Usage>,
}

impl QuotaGuard {
    /// Creates a guard with the given budget.
    #[must_use]
    pub fn new(config: BudgetConfig) -> Self {
        Self { config, usage: Mutex::new(Usage::default()) }
    }

    /// Creates a guard without limits.
    #[must_use]
    pub fn unlimited() -> Self {
        Self::new(BudgetConfig::default())
    }

    /// Creates a guard with a cost limit only.
    #[must_use]
    pub fn with_cost_limit(max_cost: f64) -> Self {
        Self::new(BudgetConfig::with_cost_limit(max_cost))
    }

    /// Whether the session has reached either limit.
    pub fn is_over_budget(&self) -> bool {
        let usage = self.usage.lock().unwrap_or_else(PoisonError::into_inner);
        let over_cost = self.config.max_cost.is_some_and(|limit| usage.spent >= limit);
        let over_tokens = self.config.max_tokens.is_some_and(|limit| usage.tokens >= limit);
        over_cost || over_tokens
    }

    /// Records the usage of one fully resolved request.
    pub fn record_usage(&self, tokens: u64, cost: f64) {
        let mut usage = self.usage.lock().unwrap_or_else(PoisonError::into_inner);
        usage.tokens += tokens;
        usage.spent += cost.max(0.0);
        usage.requests += 1;

        debug!(
            tokens = tokens,
            cost = cost,
            total_tokens = usage.tokens,
            total_cost = usage.spent,
            "Recorded session usage"
        );

        if let Some(limit) = self.config.max_cost {
            if limit > 0.0 {
                let percentage = (usage.spent / limit) * 100.0;
                for threshold in &self.config.warning_at_percent {
                    if percentage >= f64::from(*threshold) && !usage.warned_at.contains(threshold) {
                        usage.warned_at.push(*threshold);
                        warn!(
                            spent = usage.spent,
                            limit = limit,
                            threshold = threshold,
                            "Session budget warning: {:.1}% used",
                            percentage
                        );
                    }
                }
            }
        }
    }

    /// Cost recorded so far.
    pub fn spent(&self) -> f64 {
        self.usage.lock().unwrap_or_else(PoisonError::into_inner).spent
    }

    /// Tokens recorded so far.
    pub fn tokens_used(&self) -> u64 {
        self.usage.lock().unwrap_or_else(PoisonError::into_inner).tokens
    }

    /// Number of requests recorded so far.
    pub fn request_count(&self) -> u64 {
        self.usage.lock().unwrap_or_else(PoisonError::into_inner).requests
    }

    /// Current budget status.
    pub fn status(&self) -> BudgetStatus {
        let usage = self.usage.lock().unwrap_or_else(PoisonError::into_inner);
        let (remaining, percentage_used) = match self.config.max_cost {
            Some(limit) if limit > 0.0 => {
                (Some((limit - usage.spent).max(0.0)), (usage.spent / limit) * 100.0)
            }
            Some(_) => (Some(0.0), 100.0),
            None => (None, 0.0),
        };

        BudgetStatus {
            cost_limit: self.config.max_cost,
            token_limit: self.config.max_tokens,
            spent: usage.spent,
            tokens_used: usage.tokens,
            remaining,
            percentage_used,
        }
    }
}

impl Default for QuotaGuard {
    fn default() -> Self {
        Self::unlimited()
    }
}
