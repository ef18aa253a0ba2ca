//! Cost gate consulted before a research run starts.
//!
//! The pipeline asks `can_afford` once, with a pre-run estimate, and
//! reports actual spend through `record_spend` after a successful run.

use crate::config::BudgetConfig;
use std::sync::Mutex;
use tracing::{debug, warn};

/// Decides whether a run may start given its estimated cost.
pub trait CostGate: Send + Sync {
    fn can_afford(&self, estimated_usd: f64) -> bool;

    /// Record the actual cost of a finished run.
    fn record_spend(&self, amount_usd: f64);
}

/// Process-wide spend tracker with an optional session limit.
#[derive(Debug)]
pub struct CostTracker {
    session_limit_usd: f64,
    spent_usd: Mutex<f64>,
}

impl CostTracker {
    /// `session_limit_usd` of 0 means unlimited.
    pub fn new(session_limit_usd: f64) -> Self {
        Self {
            session_limit_usd,
            spent_usd: Mutex::new(0.0),
        }
    }

    pub fn from_config(config: &BudgetConfig) -> Self {
        Self::new(config.session_limit_usd)
    }

    /// Create a tracker that never denies a run.
    pub fn unlimited() -> Self {
        Self::new(0.0)
    }

    pub fn spent(&self) -> f64 {
        *self.spent_usd.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Remaining allowance, or `None` when unlimited.
    pub fn remaining(&self) -> Option<f64> {
        (self.session_limit_usd > 0.0).then(|| (self.session_limit_usd - self.spent()).max(0.0))
    }
}

impl CostGate for CostTracker {
    fn can_afford(&self, estimated_usd: f64) -> bool {
        match self.remaining() {
            None => true,
            Some(remaining) => {
                let ok = estimated_usd <= remaining;
                if !ok {
                    warn!(
                        estimated_usd,
                        remaining_usd = remaining,
                        limit_usd = self.session_limit_usd,
                        "Estimated cost exceeds remaining budget"
                    );
                }
                ok
            }
        }
    }

    fn record_spend(&self, amount_usd: f64) {
        if amount_usd <= 0.0 {
            return;
        }
        let mut spent = self.spent_usd.lock().unwrap_or_else(|e| e.into_inner());
        *spent += amount_usd;
        debug!(amount_usd, total_usd = *spent, "Recorded research spend");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unlimited_always_affords() {
        let tracker = CostTracker::unlimited();
        assert!(tracker.can_afford(1_000.0));
        assert_eq!(tracker.remaining(), None);
    }

    #[test]
    fn test_limit_enforced_after_spend() {
        let tracker = CostTracker::new(1.0);
        assert!(tracker.can_afford(0.8));
        tracker.record_spend(0.5);
        assert!(!tracker.can_afford(0.8));
        assert!(tracker.can_afford(0.4));
        assert!((tracker.spent() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_spend_is_monotonic() {
        let tracker = CostTracker::new(1.0);
        tracker.record_spend(0.2);
        tracker.record_spend(-5.0);
        assert!((tracker.spent() - 0.2).abs() < f64::EPSILON);
    }
}
