// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// PEERLEASE (P2L) - ACTIVE LEASE INDEX
//
// In-memory multi-key index over the active (unspent) lease set. One
// authoritative BTreeMap owns the records; the two auxiliary orderings
// store keys only, never record copies. Rebuilt from the store at startup.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use p2l_core::{LeaseRecord, OutPoint};
use std::collections::{BTreeMap, BTreeSet};

/// Three lookup paths over one record set:
/// - by outpoint (authoritative, unique)
/// - by (leaser, next_reward_height), ordered — "what is due for leaser L"
/// - by owner — "how much has owner O leased out"
#[derive(Debug, Default)]
pub struct LeasingOutputIndex {
    records: BTreeMap<OutPoint, LeaseRecord>,
    by_due: BTreeMap<(String, u64), BTreeSet<OutPoint>>,
    by_owner: BTreeMap<String, BTreeSet<OutPoint>>,
}

impl LeasingOutputIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, outpoint: &OutPoint) -> bool {
        self.records.contains_key(outpoint)
    }

    pub fn get(&self, outpoint: &OutPoint) -> Option<&LeaseRecord> {
        self.records.get(outpoint)
    }

    /// Insert an active record under all three paths.
    /// Returns false (and changes nothing) on a duplicate key.
    pub fn insert(&mut self, record: LeaseRecord) -> bool {
        let key = record.outpoint();
        if self.records.contains_key(&key) {
            return false;
        }
        self.by_due
            .entry((record.leaser.clone(), record.next_reward_height))
            .or_default()
            .insert(key.clone());
        self.by_owner
            .entry(record.owner.clone())
            .or_default()
            .insert(key.clone());
        self.records.insert(key, record);
        true
    }

    /// Remove a record from all three paths, returning it.
    pub fn remove(&mut self, outpoint: &OutPoint) -> Option<LeaseRecord> {
        let record = self.records.remove(outpoint)?;
        Self::detach(
            &mut self.by_due,
            (record.leaser.clone(), record.next_reward_height),
            outpoint,
        );
        Self::detach_owner(&mut self.by_owner, &record.owner, outpoint);
        Some(record)
    }

    /// Move a record's reward schedule, keeping the due ordering in sync.
    /// Returns false when the outpoint is not indexed.
    pub fn update_reward_heights(&mut self, outpoint: &OutPoint, last: u64, next: u64) -> bool {
        let Some(record) = self.records.get_mut(outpoint) else {
            return false;
        };
        let old_due = (record.leaser.clone(), record.next_reward_height);
        record.last_reward_height = last;
        record.next_reward_height = next;
        let new_due = (record.leaser.clone(), next);
        if old_due != new_due {
            Self::detach(&mut self.by_due, old_due, outpoint);
            self.by_due.entry(new_due).or_default().insert(outpoint.clone());
        }
        true
    }

    /// Outpoints of all active leases for `leaser` whose next reward is due
    /// at or before `max_height`, ordered by due height then outpoint.
    pub fn due_for(&self, leaser: &str, max_height: u64) -> Vec<OutPoint> {
        let lo = (leaser.to_string(), 0u64);
        let hi = (leaser.to_string(), max_height);
        self.by_due
            .range(lo..=hi)
            .flat_map(|(_, keys)| keys.iter().cloned())
            .collect()
    }

    /// Sum of active lease values owned by `owner`.
    pub fn total_owned_by(&self, owner: &str) -> u64 {
        let Some(keys) = self.by_owner.get(owner) else {
            return 0;
        };
        keys.iter()
            .filter_map(|key| self.records.get(key))
            .map(|record| record.value)
            .sum()
    }

    /// Iterate all active records (startup audits, tests).
    pub fn iter(&self) -> impl Iterator<Item = &LeaseRecord> {
        self.records.values()
    }

    fn detach(
        by_due: &mut BTreeMap<(String, u64), BTreeSet<OutPoint>>,
        due: (String, u64),
        outpoint: &OutPoint,
    ) {
        if let Some(keys) = by_due.get_mut(&due) {
            keys.remove(outpoint);
            if keys.is_empty() {
                by_due.remove(&due);
            }
        }
    }

    fn detach_owner(
        by_owner: &mut BTreeMap<String, BTreeSet<OutPoint>>,
        owner: &str,
        outpoint: &OutPoint,
    ) {
        if let Some(keys) = by_owner.get_mut(owner) {
            keys.remove(outpoint);
            if keys.is_empty() {
                by_owner.remove(owner);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use p2l_core::{script::lease_script, COIN, SPENT_HEIGHT_SENTINEL};

    fn record(txid_byte: &str, n: u32, leaser: &str, owner: &str, next: u64) -> LeaseRecord {
        LeaseRecord {
            txid: txid_byte.repeat(32),
            n,
            value: 10 * COIN,
            creation_height: 100,
            script: lease_script(leaser, owner),
            owner: owner.to_string(),
            leaser: leaser.to_string(),
            next_reward_height: next,
            last_reward_height: 200,
            spent_height: SPENT_HEIGHT_SENTINEL,
        }
    }

    #[test]
    fn test_insert_and_duplicate() {
        let mut index = LeasingOutputIndex::new();
        let rec = record("aa", 0, "LSR1", "OWN1", 500);
        assert!(index.insert(rec.clone()));
        assert!(!index.insert(rec.clone()), "duplicate key must be rejected");
        assert_eq!(index.len(), 1);
        assert_eq!(index.get(&rec.outpoint()), Some(&rec));
    }

    #[test]
    fn test_remove_detaches_all_paths() {
        let mut index = LeasingOutputIndex::new();
        let rec = record("aa", 0, "LSR1", "OWN1", 500);
        index.insert(rec.clone());
        assert_eq!(index.remove(&rec.outpoint()), Some(rec.clone()));
        assert!(index.is_empty());
        assert!(index.due_for("LSR1", u64::MAX).is_empty());
        assert_eq!(index.total_owned_by("OWN1"), 0);
        assert_eq!(index.remove(&rec.outpoint()), None);
    }

    #[test]
    fn test_due_for_orders_and_bounds() {
        let mut index = LeasingOutputIndex::new();
        index.insert(record("aa", 0, "LSR1", "OWN1", 900));
        index.insert(record("bb", 0, "LSR1", "OWN1", 300));
        index.insert(record("cc", 0, "LSR1", "OWN2", 600));
        index.insert(record("dd", 0, "LSR2", "OWN1", 100));

        let due = index.due_for("LSR1", 600);
        assert_eq!(due.len(), 2);
        assert_eq!(due[0].txid, "bb".repeat(32), "lowest due height first");
        assert_eq!(due[1].txid, "cc".repeat(32));
        assert!(index.due_for("LSR1", 299).is_empty());
    }

    #[test]
    fn test_update_reward_heights_reindexes() {
        let mut index = LeasingOutputIndex::new();
        let rec = record("aa", 0, "LSR1", "OWN1", 300);
        index.insert(rec.clone());
        assert!(index.update_reward_heights(&rec.outpoint(), 300, 900));

        assert!(index.due_for("LSR1", 300).is_empty(), "old due slot gone");
        let due = index.due_for("LSR1", 900);
        assert_eq!(due, vec![rec.outpoint()]);
        let updated = index.get(&rec.outpoint()).unwrap();
        assert_eq!(updated.last_reward_height, 300);
        assert_eq!(updated.next_reward_height, 900);

        assert!(!index.update_reward_heights(&OutPoint::new("ff".repeat(32), 9), 1, 2));
    }

    #[test]
    fn test_total_owned_by_sums_across_leasers() {
        let mut index = LeasingOutputIndex::new();
        index.insert(record("aa", 0, "LSR1", "OWN1", 500));
        index.insert(record("bb", 0, "LSR2", "OWN1", 700));
        index.insert(record("cc", 0, "LSR1", "OWN2", 500));
        assert_eq!(index.total_owned_by("OWN1"), 20 * COIN);
        assert_eq!(index.total_owned_by("OWN2"), 10 * COIN);
        assert_eq!(index.total_owned_by("OWN3"), 0);
    }
}
