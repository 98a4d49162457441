// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// PEERLEASE (P2L) - LEASING LEDGER
//
// The coin-leasing ledger: sled-backed durable log, in-memory active-lease
// index, supply tracker, and the chain connect/disconnect adapter, behind
// one mutex. All public operations hold the lock for their full duration;
// every call is synchronous (the chain manager invokes us under its own
// chain-wide lock, so there is nothing to overlap with).
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use p2l_core::rewards::{calc_aggregate_reward, calc_output_reward};
use p2l_core::{LeaseRecord, LeaserRole, OutPoint, Transaction, TxOut};

pub mod chain;
pub mod index;
pub mod store;
pub mod supply;

pub use chain::SyncDirection;
pub use store::{RewardAuditEntry, SpendAuditEntry};

use index::LeasingOutputIndex;
use store::LeaseStore;
use supply::SupplyTracker;

/// Everything the single ledger lock guards: the durable-store handle,
/// the active index, the tracker, and the chain tip.
pub(crate) struct LedgerInner {
    pub(crate) store: LeaseStore,
    pub(crate) index: LeasingOutputIndex,
    pub(crate) supply: SupplyTracker,
    pub(crate) height: u64,
    pub(crate) tip_hash: String,
}

/// Public handle to the leasing ledger. Cheap to share by reference;
/// every method locks internally.
pub struct LeasingLedger {
    inner: Mutex<LedgerInner>,
}

impl LeasingLedger {
    /// Open the ledger, rebuilding the in-memory index from the durable
    /// store. The index lives only in memory, so the full lease-record
    /// scan runs on every start; an unclean previous shutdown is logged
    /// but changes nothing about the rebuild. Only records still marked
    /// unspent re-enter the active set — a record retained after a spend
    /// stays out of the index until a reorg undo resurrects it.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let store = LeaseStore::open(path)?;
        if !store.was_clean_shutdown()? {
            eprintln!("Leasing store was not shut down cleanly — index rebuilt from durable log");
        }
        let (height, tip_hash) = store.get_tip()?.unwrap_or((0, String::new()));

        let mut index = LeasingOutputIndex::new();
        let mut supply = SupplyTracker::new();
        for record in store.scan_leases()? {
            if record.is_active() {
                supply.inc(&record.leaser, record.value);
                index.insert(record);
            }
        }
        supply.recompute_height_epoch(height);

        // Flag runs false while the process lives; shutdown() flips it back.
        store.set_clean_shutdown(false)?;
        store.flush()?;

        Ok(Self {
            inner: Mutex::new(LedgerInner {
                store,
                index,
                supply,
                height,
                tip_hash,
            }),
        })
    }

    /// Flush and mark the store cleanly shut down. Call exactly once,
    /// from the node's shutdown path.
    pub fn shutdown(&self) -> Result<(), String> {
        let inner = self.lock();
        inner.store.set_clean_shutdown(true)?;
        inner.store.flush()
    }

    // ── Chain notification interface ────────────────────────────────

    /// New chain tip connected. Sets the current height/hash, refreshes
    /// the height-epoch curve, and flushes the durable store.
    pub fn on_block_connected(&self, height: u64, hash: &str) -> Result<(), String> {
        self.lock().connect_block(height, hash)
    }

    /// One transaction touched by a block connect (`Forward`) or
    /// disconnect (`Backward`). `Ok(false)` reports a logical fault that
    /// consensus callers translate into rejecting the transaction/block.
    pub fn on_transaction(&self, tx: &Transaction, direction: SyncDirection) -> Result<bool, String> {
        self.lock().process_transaction(tx, direction)
    }

    // ── Consensus-facing queries ────────────────────────────────────

    /// The canonical reward output for `outpoint`. Validators reject any
    /// claimed output that is not byte-for-byte equal to this value.
    ///
    /// A null-hash outpoint selects the aggregate formula: its index is a
    /// role code and `owner` is the leaser whose tracked balance is
    /// rewarded. Anything unresolvable (vanished record, unknown role
    /// code) yields an empty zero-value output, not an error.
    pub fn calc_reward(&self, outpoint: &OutPoint, owner: &str) -> TxOut {
        let inner = self.lock();
        if outpoint.is_null() {
            return match LeaserRole::from_code(outpoint.n) {
                Some(role) => calc_aggregate_reward(role, owner, inner.supply.balance_of(owner)),
                None => TxOut::new(0, ""),
            };
        }
        match inner.index.get(outpoint) {
            Some(record) => calc_output_reward(
                record,
                inner.height,
                inner.supply.height_epoch_pct(),
                inner.supply.supply_tier_pct(),
            ),
            None => TxOut::new(0, ""),
        }
    }

    /// All rewards currently due to `leaser`: up to `limit` non-zero
    /// per-output rewards (due-height order), then one aggregate reward
    /// when the leaser holds a non-zero delegated balance. An empty
    /// result means no reward is due — block-template construction skips
    /// the claim transaction entirely.
    pub fn get_leasing_rewards(&self, role: LeaserRole, leaser: &str, limit: usize) -> Vec<TxOut> {
        let inner = self.lock();
        let mut rewards = Vec::new();
        for key in inner.index.due_for(leaser, inner.height) {
            if rewards.len() >= limit {
                break;
            }
            if let Some(record) = inner.index.get(&key) {
                let reward = calc_output_reward(
                    record,
                    inner.height,
                    inner.supply.height_epoch_pct(),
                    inner.supply.supply_tier_pct(),
                );
                if reward.value > 0 {
                    rewards.push(reward);
                }
            }
        }
        let balance = inner.supply.balance_of(leaser);
        if balance > 0 {
            rewards.push(calc_aggregate_reward(role, leaser, balance));
        }
        rewards
    }

    /// Total active amount leased out by `owner`. Gates validator and
    /// masternode candidacy (`MIN_LEASED_FOR_VALIDATOR`).
    pub fn get_all_amounts_leased_to(&self, owner: &str) -> u64 {
        self.lock().index.total_owned_by(owner)
    }

    // ── Inspection (tests, RPC surface) ─────────────────────────────

    /// Snapshot of one active lease record, if the outpoint is active.
    pub fn lease_record(&self, outpoint: &OutPoint) -> Option<LeaseRecord> {
        self.lock().index.get(outpoint).cloned()
    }

    /// The durably stored record, active or retained-after-spend.
    pub fn stored_lease(&self, outpoint: &OutPoint) -> Result<Option<LeaseRecord>, String> {
        self.lock().store.get_lease(outpoint)
    }

    pub fn tip_height(&self) -> u64 {
        self.lock().height
    }

    pub fn total_leased(&self) -> u64 {
        self.lock().supply.total()
    }

    pub fn leased_balance_of(&self, leaser: &str) -> u64 {
        self.lock().supply.balance_of(leaser)
    }

    pub fn active_lease_count(&self) -> usize {
        self.lock().index.len()
    }

    fn lock(&self) -> MutexGuard<'_, LedgerInner> {
        // Poisoning means a panic mid-mutation; the ledger state is no
        // longer trustworthy and the node must not keep validating.
        self.inner.lock().expect("leasing ledger lock poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use p2l_core::script::{lease_script, leasing_reward_script};
    use p2l_core::{TxIn, COIN, MATURITY_OFFSET, REWARD_PERIOD, SPENT_HEIGHT_SENTINEL};

    fn open_temp() -> (tempfile::TempDir, LeasingLedger) {
        let dir = tempfile::tempdir().expect("tempdir");
        let ledger = LeasingLedger::open(dir.path()).expect("open ledger");
        (dir, ledger)
    }

    fn lease_tx(value: u64, leaser: &str, owner: &str, salt: u64) -> Transaction {
        Transaction {
            inputs: vec![TxIn {
                // unique fake funding outpoint keeps txids distinct
                prevout: OutPoint::new(format!("{:064x}", salt + 1), 0),
            }],
            outputs: vec![TxOut::new(value, lease_script(leaser, owner))],
            is_coinbase: false,
            is_coinstake: false,
        }
    }

    fn spend_tx(target: &OutPoint) -> Transaction {
        Transaction {
            inputs: vec![TxIn {
                prevout: target.clone(),
            }],
            outputs: vec![TxOut::new(1, "P2PKH:somewhere".to_string())],
            is_coinbase: false,
            is_coinstake: false,
        }
    }

    fn reward_tx(target: &OutPoint, owner: &str, value: u64) -> Transaction {
        Transaction {
            inputs: vec![],
            outputs: vec![TxOut::new(value, leasing_reward_script(target, owner))],
            is_coinbase: false,
            is_coinstake: false,
        }
    }

    #[test]
    fn test_add_output_schedules_reward() {
        let (_dir, ledger) = open_temp();
        ledger.on_block_connected(1_000, &"01".repeat(32)).unwrap();
        let tx = lease_tx(10_000 * COIN, "LSR1", "OWN1", 7);
        assert!(ledger.on_transaction(&tx, SyncDirection::Forward).unwrap());

        let key = OutPoint::new(tx.txid(), 0);
        let record = ledger.lease_record(&key).expect("lease indexed");
        assert_eq!(record.creation_height, 1_000);
        assert_eq!(record.last_reward_height, 1_000 + MATURITY_OFFSET);
        assert_eq!(
            record.next_reward_height,
            1_000 + REWARD_PERIOD + MATURITY_OFFSET
        );
        assert_eq!(ledger.total_leased(), 10_000 * COIN);
        assert_eq!(ledger.leased_balance_of("LSR1"), 10_000 * COIN);
        assert_eq!(ledger.get_all_amounts_leased_to("OWN1"), 10_000 * COIN);
    }

    #[test]
    fn test_non_lease_and_coinbase_are_noops() {
        let (_dir, ledger) = open_temp();
        ledger.on_block_connected(10, &"01".repeat(32)).unwrap();

        let plain = Transaction {
            inputs: vec![],
            outputs: vec![TxOut::new(5 * COIN, "P2PKH:whatever".to_string())],
            is_coinbase: false,
            is_coinstake: false,
        };
        assert!(ledger.on_transaction(&plain, SyncDirection::Forward).unwrap());

        let coinbase = Transaction {
            outputs: vec![TxOut::new(5 * COIN, lease_script("LSR1", "OWN1"))],
            is_coinbase: true,
            ..plain.clone()
        };
        assert!(ledger.on_transaction(&coinbase, SyncDirection::Forward).unwrap());
        assert_eq!(ledger.active_lease_count(), 0);
        assert_eq!(ledger.total_leased(), 0);
    }

    #[test]
    fn test_duplicate_lease_fails() {
        let (_dir, ledger) = open_temp();
        ledger.on_block_connected(10, &"01".repeat(32)).unwrap();
        let tx = lease_tx(100 * COIN, "LSR1", "OWN1", 1);
        assert!(ledger.on_transaction(&tx, SyncDirection::Forward).unwrap());
        assert!(
            !ledger.on_transaction(&tx, SyncDirection::Forward).unwrap(),
            "second insert of the same outpoint must fail"
        );
        // the failed insert must not double-count supply
        assert_eq!(ledger.total_leased(), 100 * COIN);
    }

    #[test]
    fn test_unresolvable_identity_fails() {
        let (_dir, ledger) = open_temp();
        ledger.on_block_connected(10, &"01".repeat(32)).unwrap();
        let tx = Transaction {
            inputs: vec![],
            outputs: vec![TxOut::new(COIN, "P2L::OWN1".to_string())],
            is_coinbase: false,
            is_coinstake: false,
        };
        assert!(!ledger.on_transaction(&tx, SyncDirection::Forward).unwrap());
        assert_eq!(ledger.active_lease_count(), 0);
    }

    #[test]
    fn test_spend_then_unspend_restores_record_exactly() {
        let (_dir, ledger) = open_temp();
        ledger.on_block_connected(1_000, &"01".repeat(32)).unwrap();
        let tx = lease_tx(500 * COIN, "LSR1", "OWN1", 2);
        ledger.on_transaction(&tx, SyncDirection::Forward).unwrap();
        let key = OutPoint::new(tx.txid(), 0);
        let before = ledger.lease_record(&key).unwrap();

        ledger.on_block_connected(2_000, &"02".repeat(32)).unwrap();
        let spend = spend_tx(&key);
        assert!(ledger.on_transaction(&spend, SyncDirection::Forward).unwrap());

        // gone from the active index, retained durably with the real height
        assert_eq!(ledger.lease_record(&key), None);
        assert_eq!(ledger.leased_balance_of("LSR1"), 0);
        let retained = ledger.stored_lease(&key).unwrap().unwrap();
        assert_eq!(retained.spent_height, 2_000);

        // reorg undo: field-for-field identical to the pre-spend record
        assert!(ledger.on_transaction(&spend, SyncDirection::Backward).unwrap());
        assert_eq!(ledger.lease_record(&key).unwrap(), before);
        assert_eq!(ledger.leased_balance_of("LSR1"), 500 * COIN);

        // undoing an already-undone spend is a silent success
        assert!(ledger.on_transaction(&spend, SyncDirection::Backward).unwrap());
    }

    #[test]
    fn test_reward_advances_schedule_and_undo_restores_it() {
        let (_dir, ledger) = open_temp();
        ledger.on_block_connected(1_000, &"01".repeat(32)).unwrap();
        let tx = lease_tx(10_000 * COIN, "LSR1", "OWN1", 3);
        ledger.on_transaction(&tx, SyncDirection::Forward).unwrap();
        let key = OutPoint::new(tx.txid(), 0);
        let before = ledger.lease_record(&key).unwrap();

        let due = before.next_reward_height;
        ledger.on_block_connected(due, &"02".repeat(32)).unwrap();
        let claim = reward_tx(&key, "OWN1", 1_234);
        assert!(ledger.on_transaction(&claim, SyncDirection::Forward).unwrap());

        let after = ledger.lease_record(&key).unwrap();
        assert_eq!(after.last_reward_height, due);
        assert_eq!(
            after.next_reward_height,
            due + REWARD_PERIOD,
            "next reward height advances by exactly one period"
        );

        assert!(ledger.on_transaction(&claim, SyncDirection::Backward).unwrap());
        assert_eq!(ledger.lease_record(&key).unwrap(), before);

        // a second undo has no audit entry left — loud failure
        assert!(!ledger.on_transaction(&claim, SyncDirection::Backward).unwrap());
    }

    #[test]
    fn test_reward_then_spend_same_block_undoes_cleanly() {
        let (_dir, ledger) = open_temp();
        ledger.on_block_connected(1_000, &"01".repeat(32)).unwrap();
        let tx = lease_tx(1_000 * COIN, "LSR1", "OWN1", 8);
        ledger.on_transaction(&tx, SyncDirection::Forward).unwrap();
        let key = OutPoint::new(tx.txid(), 0);
        let before = ledger.lease_record(&key).unwrap();

        // one block claims the reward, then spends the lease
        let height = before.next_reward_height;
        ledger.on_block_connected(height, &"02".repeat(32)).unwrap();
        let claim = reward_tx(&key, "OWN1", 99);
        let spend = spend_tx(&key);
        assert!(ledger.on_transaction(&claim, SyncDirection::Forward).unwrap());
        assert!(ledger.on_transaction(&spend, SyncDirection::Forward).unwrap());
        assert_eq!(ledger.lease_record(&key), None);

        // disconnect replays the same per-tx order: the claim undo finds
        // the record only in the durable store (the spend evicted it)
        assert!(ledger.on_transaction(&claim, SyncDirection::Backward).unwrap());
        let retained = ledger.stored_lease(&key).unwrap().unwrap();
        assert_eq!(retained.last_reward_height, before.last_reward_height);
        assert_eq!(retained.next_reward_height, before.next_reward_height);
        assert_eq!(retained.spent_height, height, "still spent at this point");

        assert!(ledger.on_transaction(&spend, SyncDirection::Backward).unwrap());
        assert_eq!(ledger.lease_record(&key).unwrap(), before);
        assert_eq!(ledger.leased_balance_of("LSR1"), 1_000 * COIN);

        // the reward audit entry was consumed by the undo
        assert!(!ledger.on_transaction(&claim, SyncDirection::Backward).unwrap());
    }

    #[test]
    fn test_reward_for_unknown_lease_fails() {
        let (_dir, ledger) = open_temp();
        ledger.on_block_connected(50_000, &"01".repeat(32)).unwrap();
        let claim = reward_tx(&OutPoint::new("aa".repeat(32), 0), "OWN1", 10);
        assert!(!ledger.on_transaction(&claim, SyncDirection::Forward).unwrap());
    }

    #[test]
    fn test_reward_claim_exclusivity() {
        let (_dir, ledger) = open_temp();
        ledger.on_block_connected(1_000, &"01".repeat(32)).unwrap();
        let lease = lease_tx(100 * COIN, "LSR1", "OWN1", 4);
        ledger.on_transaction(&lease, SyncDirection::Forward).unwrap();
        let key = OutPoint::new(lease.txid(), 0);

        ledger
            .on_block_connected(1_000 + REWARD_PERIOD + MATURITY_OFFSET, &"02".repeat(32))
            .unwrap();
        // one claim output plus a lease-shaped output AND a lease-spending
        // input in the same transaction: only the claim may be processed
        let mixed = Transaction {
            inputs: vec![TxIn {
                prevout: key.clone(),
            }],
            outputs: vec![
                TxOut::new(10, leasing_reward_script(&key, "OWN1")),
                TxOut::new(50 * COIN, lease_script("LSR2", "OWN2")),
            ],
            is_coinbase: false,
            is_coinstake: false,
        };
        assert!(ledger.on_transaction(&mixed, SyncDirection::Forward).unwrap());

        // the lease output was NOT created and the input did NOT spend
        assert_eq!(ledger.lease_record(&OutPoint::new(mixed.txid(), 1)), None);
        assert!(ledger.lease_record(&key).is_some(), "lease must survive");
        assert_eq!(ledger.leased_balance_of("LSR2"), 0);
    }

    #[test]
    fn test_aggregate_reward_claims_are_noops_for_bookkeeping() {
        let (_dir, ledger) = open_temp();
        ledger.on_block_connected(10, &"01".repeat(32)).unwrap();
        let claim = reward_tx(
            &OutPoint::role_sentinel(LeaserRole::Masternode),
            "LSR1",
            55,
        );
        assert!(ledger.on_transaction(&claim, SyncDirection::Forward).unwrap());
        assert!(ledger.on_transaction(&claim, SyncDirection::Backward).unwrap());
    }

    #[test]
    fn test_calc_reward_matches_engine() {
        let (_dir, ledger) = open_temp();
        ledger.on_block_connected(1_000, &"01".repeat(32)).unwrap();
        let tx = lease_tx(10_000 * COIN, "LSR1", "OWN1", 5);
        ledger.on_transaction(&tx, SyncDirection::Forward).unwrap();
        let key = OutPoint::new(tx.txid(), 0);
        let record = ledger.lease_record(&key).unwrap();

        let tip = record.next_reward_height;
        ledger.on_block_connected(tip, &"02".repeat(32)).unwrap();
        let expected = calc_output_reward(&record, tip, 1_500, 10_000);
        assert_eq!(ledger.calc_reward(&key, "OWN1"), expected);
        assert!(expected.value > 0);

        // vanished record ⇒ empty zero output
        let missing = OutPoint::new("ee".repeat(32), 0);
        assert_eq!(ledger.calc_reward(&missing, "OWN1"), TxOut::new(0, ""));
    }

    #[test]
    fn test_calc_reward_null_outpoint_uses_aggregate() {
        let (_dir, ledger) = open_temp();
        ledger.on_block_connected(10, &"01".repeat(32)).unwrap();
        let tx = lease_tx(1_000 * COIN, "LSR1", "OWN1", 6);
        ledger.on_transaction(&tx, SyncDirection::Forward).unwrap();

        let sentinel = OutPoint::role_sentinel(LeaserRole::Validator);
        let out = ledger.calc_reward(&sentinel, "LSR1");
        assert_eq!(out.value, 1_000 * COIN / 5, "validator table: 20%");

        // unknown role code ⇒ empty zero output
        let bogus = OutPoint::new(p2l_core::NULL_TXID, 77);
        assert_eq!(ledger.calc_reward(&bogus, "LSR1"), TxOut::new(0, ""));
    }

    #[test]
    fn test_get_leasing_rewards_due_limit_and_aggregate() {
        let (_dir, ledger) = open_temp();
        ledger.on_block_connected(1_000, &"01".repeat(32)).unwrap();
        for salt in 0..3 {
            let tx = lease_tx((100 + salt) * COIN, "LSR1", "OWN1", salt);
            ledger.on_transaction(&tx, SyncDirection::Forward).unwrap();
        }

        // nothing due yet
        assert!(ledger
            .get_leasing_rewards(LeaserRole::Masternode, "LSR2", 10)
            .is_empty());
        let not_due = ledger.get_leasing_rewards(LeaserRole::Masternode, "LSR1", 10);
        assert_eq!(not_due.len(), 1, "only the aggregate entry before maturity");

        ledger
            .on_block_connected(1_000 + REWARD_PERIOD + MATURITY_OFFSET, &"02".repeat(32))
            .unwrap();
        let rewards = ledger.get_leasing_rewards(LeaserRole::Masternode, "LSR1", 10);
        assert_eq!(rewards.len(), 4, "three per-output rewards + aggregate");
        assert!(rewards.iter().take(3).all(|r| r.value > 0));

        let limited = ledger.get_leasing_rewards(LeaserRole::Masternode, "LSR1", 2);
        assert_eq!(limited.len(), 3, "two per-output rewards + aggregate");
    }

    #[test]
    fn test_restart_rebuilds_active_set() {
        let dir = tempfile::tempdir().expect("tempdir");
        let kept_tx = lease_tx(300 * COIN, "LSR1", "OWN1", 11);
        let spent_tx = lease_tx(200 * COIN, "LSR2", "OWN2", 12);
        {
            let ledger = LeasingLedger::open(dir.path()).unwrap();
            ledger.on_block_connected(1_000, &"01".repeat(32)).unwrap();
            ledger.on_transaction(&kept_tx, SyncDirection::Forward).unwrap();
            ledger.on_transaction(&spent_tx, SyncDirection::Forward).unwrap();
            ledger.on_block_connected(1_500, &"02".repeat(32)).unwrap();
            let spend = spend_tx(&OutPoint::new(spent_tx.txid(), 0));
            ledger.on_transaction(&spend, SyncDirection::Forward).unwrap();
            ledger.shutdown().unwrap();
        }

        let ledger = LeasingLedger::open(dir.path()).unwrap();
        assert_eq!(ledger.tip_height(), 1_500);
        assert_eq!(ledger.active_lease_count(), 1);
        assert_eq!(ledger.leased_balance_of("LSR1"), 300 * COIN);
        assert_eq!(ledger.leased_balance_of("LSR2"), 0);
        assert_eq!(ledger.total_leased(), 300 * COIN);
        let kept = ledger
            .lease_record(&OutPoint::new(kept_tx.txid(), 0))
            .unwrap();
        assert_eq!(kept.spent_height, SPENT_HEIGHT_SENTINEL);
        // the spent record is still durably retained for reorg undo
        let retained = ledger
            .stored_lease(&OutPoint::new(spent_tx.txid(), 0))
            .unwrap()
            .unwrap();
        assert_eq!(retained.spent_height, 1_500);
    }
}
