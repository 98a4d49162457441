// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// PEERLEASE (P2L) - SUPPLY TRACKER
//
// Global leased-coin supply plus the per-leaser balance map, and the two
// macro reward curves derived from them. Mutated only through inc/dec so
// the balance invariant (balance[k] == Σ active lease values for k,
// total == Σ balances) stays auditable from one code path.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use p2l_core::rewards::{height_epoch_pct, supply_tier_pct};
use std::collections::BTreeMap;

#[derive(Debug)]
pub struct SupplyTracker {
    /// Σ value of all active lease records
    total: u64,
    /// leaser identity → Σ value of its active lease records.
    /// BTreeMap for deterministic iteration; entries erased at exactly zero.
    balances: BTreeMap<String, u64>,
    /// Cached long-term emission curve value for the current tip
    height_epoch_pct: u64,
    /// Cached participation throttle for the current total
    supply_tier_pct: u64,
}

impl Default for SupplyTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl SupplyTracker {
    pub fn new() -> Self {
        Self {
            total: 0,
            balances: BTreeMap::new(),
            height_epoch_pct: height_epoch_pct(0),
            supply_tier_pct: supply_tier_pct(0),
        }
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn balance_of(&self, leaser: &str) -> u64 {
        self.balances.get(leaser).copied().unwrap_or(0)
    }

    pub fn height_epoch_pct(&self) -> u64 {
        self.height_epoch_pct
    }

    pub fn supply_tier_pct(&self) -> u64 {
        self.supply_tier_pct
    }

    /// Credit `amount` to `leaser`, then refresh the supply tier.
    pub fn inc(&mut self, leaser: &str, amount: u64) {
        if amount > 0 {
            *self.balances.entry(leaser.to_string()).or_insert(0) += amount;
            self.total += amount;
        }
        self.supply_tier_pct = supply_tier_pct(self.total);
    }

    /// Debit `amount` from `leaser`, then refresh the supply tier.
    ///
    /// An underflow means the balance invariant was already broken —
    /// logged loudly, then clamped so the tracker cannot wrap.
    pub fn dec(&mut self, leaser: &str, amount: u64) {
        let balance = self.balance_of(leaser);
        if amount > balance {
            eprintln!(
                "Leasing supply underflow for leaser {}: balance {} < debit {}",
                leaser, balance, amount
            );
        }
        let debit = amount.min(balance);
        if debit > 0 {
            let remaining = balance - debit;
            if remaining == 0 {
                self.balances.remove(leaser);
            } else {
                self.balances.insert(leaser.to_string(), remaining);
            }
            self.total = self.total.saturating_sub(debit);
        }
        self.supply_tier_pct = supply_tier_pct(self.total);
    }

    /// Refresh the height-epoch curve. Called once per connected block.
    pub fn recompute_height_epoch(&mut self, height: u64) {
        self.height_epoch_pct = height_epoch_pct(height);
    }

    /// (leaser, balance) pairs, deterministic order. Test/audit surface.
    pub fn balances(&self) -> impl Iterator<Item = (&str, u64)> {
        self.balances.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use p2l_core::COIN;

    #[test]
    fn test_inc_dec_balance_and_total() {
        let mut tracker = SupplyTracker::new();
        tracker.inc("LSR1", 100 * COIN);
        tracker.inc("LSR2", 50 * COIN);
        tracker.inc("LSR1", 25 * COIN);
        assert_eq!(tracker.balance_of("LSR1"), 125 * COIN);
        assert_eq!(tracker.balance_of("LSR2"), 50 * COIN);
        assert_eq!(tracker.total(), 175 * COIN);

        tracker.dec("LSR1", 25 * COIN);
        assert_eq!(tracker.balance_of("LSR1"), 100 * COIN);
        assert_eq!(tracker.total(), 150 * COIN);
    }

    #[test]
    fn test_zero_balance_entry_erased() {
        let mut tracker = SupplyTracker::new();
        tracker.inc("LSR1", 10 * COIN);
        tracker.dec("LSR1", 10 * COIN);
        assert_eq!(tracker.balance_of("LSR1"), 0);
        assert_eq!(tracker.balances().count(), 0, "zeroed entry must be erased");
    }

    #[test]
    fn test_underflow_clamped() {
        let mut tracker = SupplyTracker::new();
        tracker.inc("LSR1", 10 * COIN);
        tracker.dec("LSR1", 99 * COIN);
        assert_eq!(tracker.balance_of("LSR1"), 0);
        assert_eq!(tracker.total(), 0);
    }

    #[test]
    fn test_supply_tier_tracks_total() {
        let mut tracker = SupplyTracker::new();
        assert_eq!(tracker.supply_tier_pct(), 10_000);
        tracker.inc("LSR1", 1_000_000 * COIN);
        assert_eq!(tracker.supply_tier_pct(), 9_500);
        tracker.dec("LSR1", 1_000_000 * COIN);
        assert_eq!(tracker.supply_tier_pct(), 10_000);
    }

    #[test]
    fn test_height_epoch_recompute() {
        let mut tracker = SupplyTracker::new();
        assert_eq!(tracker.height_epoch_pct(), 1_500);
        tracker.recompute_height_epoch(1_000_000);
        assert_eq!(tracker.height_epoch_pct(), 1_300);
    }
}
