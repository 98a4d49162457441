// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// PEERLEASE (P2L) - CHAIN SYNC ADAPTER
//
// Drives the ledger from block connect/disconnect notifications. Every
// operation has a true inverse (add/remove pairs) so a reorg that replays
// the same transactions backward restores the exact prior state, including
// the audit-log bookkeeping for reward schedules.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use p2l_core::script::{classify_script, ScriptClass};
use p2l_core::{
    LeaseRecord, OutPoint, Transaction, TxOut, MATURITY_OFFSET, REWARD_PERIOD,
    SPENT_HEIGHT_SENTINEL,
};

use crate::store::{LeaseBatch, RewardAuditEntry, SpendAuditEntry};
use crate::LedgerInner;

/// Whether a transaction arrives from a connected block (apply) or a
/// disconnected block (undo). Backward walks outputs/inputs in the SAME
/// order as forward: each undo is keyed independently by (txid, position),
/// so only the branch choice (reward-claim vs ordinary) must agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDirection {
    Forward,
    Backward,
}

impl LedgerInner {
    /// New chain tip. Refreshes the height-epoch curve and flushes the
    /// durable store — the once-per-block flush point.
    pub(crate) fn connect_block(&mut self, height: u64, hash: &str) -> Result<(), String> {
        self.height = height;
        self.tip_hash = hash.to_string();
        self.supply.recompute_height_epoch(height);
        self.store.put_tip(height, hash)?;
        self.store.flush()
    }

    /// Route one transaction of a connected/disconnected block.
    ///
    /// `Ok(false)` flags a logical fault in at least one constituent
    /// operation (already logged); `Err` is a fatal storage fault.
    pub(crate) fn process_transaction(
        &mut self,
        tx: &Transaction,
        direction: SyncDirection,
    ) -> Result<bool, String> {
        if tx.is_coinbase || tx.is_coinstake {
            return Ok(true);
        }
        let txid = tx.txid();
        let mut ok = true;

        // Protocol invariant: a reward-claim transaction never also
        // creates or spends a lease, so its inputs/other outputs are not
        // scanned. Forward and backward MUST take the same branch.
        if tx.is_reward_claim() {
            for (n, output) in tx.outputs.iter().enumerate() {
                ok &= match direction {
                    SyncDirection::Forward => self.add_reward(&txid, output, n as u32)?,
                    SyncDirection::Backward => self.remove_reward(&txid, output, n as u32)?,
                };
            }
            return Ok(ok);
        }

        for (n, output) in tx.outputs.iter().enumerate() {
            ok &= match direction {
                SyncDirection::Forward => self.add_output(&txid, output, n as u32)?,
                SyncDirection::Backward => self.remove_output(&txid, n as u32)?,
            };
        }
        for (i, input) in tx.inputs.iter().enumerate() {
            ok &= match direction {
                SyncDirection::Forward => self.add_spend(&txid, &input.prevout, i as u32)?,
                SyncDirection::Backward => self.remove_spend(&txid, i as u32)?,
            };
        }
        Ok(ok)
    }

    /// Forward: a block output that may create a lease.
    fn add_output(&mut self, txid: &str, output: &TxOut, n: u32) -> Result<bool, String> {
        let (leaser, owner) = match classify_script(&output.script) {
            ScriptClass::Lease { leaser, owner } => (leaser, owner),
            _ => return Ok(true), // not a lease output
        };
        if leaser.is_empty() || owner.is_empty() {
            eprintln!(
                "Leasing: unresolvable identity in lease output {}:{} (leaser={:?} owner={:?})",
                txid, n, leaser, owner
            );
            return Ok(false);
        }
        let key = OutPoint::new(txid, n);
        if self.index.contains(&key) {
            eprintln!("Leasing: duplicate lease output {}:{}", txid, n);
            return Ok(false);
        }

        let record = LeaseRecord {
            txid: txid.to_string(),
            n,
            value: output.value,
            creation_height: self.height,
            script: output.script.clone(),
            owner,
            leaser,
            next_reward_height: self.height + REWARD_PERIOD + MATURITY_OFFSET,
            last_reward_height: self.height + MATURITY_OFFSET,
            spent_height: SPENT_HEIGHT_SENTINEL,
        };
        self.store.put_lease(&record)?;
        self.supply.inc(&record.leaser, record.value);
        self.index.insert(record);
        Ok(true)
    }

    /// Backward: undo of `add_output` — the creating block disconnected,
    /// so the record leaves the durable store permanently.
    fn remove_output(&mut self, txid: &str, n: u32) -> Result<bool, String> {
        let key = OutPoint::new(txid, n);
        let Some(record) = self.index.remove(&key) else {
            return Ok(true); // never added (not a lease) or already handled
        };
        self.store.delete_lease(&key)?;
        self.supply.dec(&record.leaser, record.value);
        Ok(true)
    }

    /// Forward: a block input that may consume a lease. The record is
    /// retained durably with the real spend height (reorg undo needs it),
    /// and only leaves the active in-memory index.
    fn add_spend(&mut self, txid: &str, prevout: &OutPoint, input_index: u32) -> Result<bool, String> {
        let Some(mut record) = self.index.remove(prevout) else {
            return Ok(true); // not spending a lease output
        };
        record.spent_height = self.height;

        let mut batch = LeaseBatch::default();
        batch.put_spend_audit(
            txid,
            input_index,
            &SpendAuditEntry {
                target: prevout.clone(),
            },
        )?;
        batch.put_lease(&record)?;
        self.store.apply(batch)?;

        self.supply.dec(&record.leaser, record.value);
        Ok(true)
    }

    /// Backward: undo of `add_spend`. A missing audit entry means the spend
    /// was never recorded (or already undone) — success. A recorded spend
    /// whose lease record is gone from the store is real corruption.
    fn remove_spend(&mut self, txid: &str, input_index: u32) -> Result<bool, String> {
        let Some(entry) = self.store.get_spend_audit(txid, input_index)? else {
            return Ok(true);
        };
        let Some(mut record) = self.store.get_lease(&entry.target)? else {
            eprintln!(
                "Leasing: spend audit {}:{} references missing lease {}:{} — store inconsistent",
                txid, input_index, entry.target.txid, entry.target.n
            );
            return Ok(false);
        };
        record.spent_height = SPENT_HEIGHT_SENTINEL;

        let mut batch = LeaseBatch::default();
        batch.put_lease(&record)?;
        batch.delete_spend_audit(txid, input_index);
        self.store.apply(batch)?;

        self.supply.inc(&record.leaser, record.value);
        self.index.insert(record);
        Ok(true)
    }

    /// Forward: one output of a reward-claim transaction. Advances the
    /// rewarded lease's schedule and records the prior schedule for undo.
    fn add_reward(&mut self, txid: &str, output: &TxOut, n: u32) -> Result<bool, String> {
        let outpoint = match classify_script(&output.script) {
            ScriptClass::LeasingReward { outpoint, .. } => outpoint,
            _ => return Ok(true), // change/fee output inside the claim tx
        };
        if outpoint.is_null() {
            // Aggregate claim: computed from the live balance, no
            // per-lease schedule to advance.
            return Ok(true);
        }
        let Some(record) = self.index.get(&outpoint) else {
            eprintln!(
                "Leasing: reward output {}:{} references unknown lease {}:{}",
                txid, n, outpoint.txid, outpoint.n
            );
            return Ok(false);
        };

        let audit = RewardAuditEntry {
            target: outpoint.clone(),
            prior_last_reward_height: record.last_reward_height,
            prior_next_reward_height: record.next_reward_height,
        };
        let mut updated = record.clone();
        updated.last_reward_height = self.height;
        updated.next_reward_height = self.height + REWARD_PERIOD;

        let mut batch = LeaseBatch::default();
        batch.put_reward_audit(txid, n, &audit)?;
        batch.put_lease(&updated)?;
        self.store.apply(batch)?;

        self.index.update_reward_heights(
            &outpoint,
            updated.last_reward_height,
            updated.next_reward_height,
        );
        Ok(true)
    }

    /// Backward: undo of `add_reward` — restore the audited schedule.
    /// Unlike spends, a missing audit entry here is a fault: forward
    /// processing of this same output must have written one.
    fn remove_reward(&mut self, txid: &str, output: &TxOut, n: u32) -> Result<bool, String> {
        let outpoint = match classify_script(&output.script) {
            ScriptClass::LeasingReward { outpoint, .. } => outpoint,
            _ => return Ok(true),
        };
        if outpoint.is_null() {
            return Ok(true);
        }
        let Some(audit) = self.store.get_reward_audit(txid, n)? else {
            eprintln!(
                "Leasing: no reward audit for {}:{} — cannot undo reward",
                txid, n
            );
            return Ok(false);
        };
        // Resolve through the durable store, not the active index: a later
        // transaction in the same block may have spent the rewarded lease,
        // and backward replay undoes the claim before the spend. The
        // retained record still holds the advanced schedule.
        let Some(mut restored) = self.store.get_lease(&audit.target)? else {
            eprintln!(
                "Leasing: reward audit {}:{} references missing lease {}:{}",
                txid, n, audit.target.txid, audit.target.n
            );
            return Ok(false);
        };
        restored.last_reward_height = audit.prior_last_reward_height;
        restored.next_reward_height = audit.prior_next_reward_height;

        let mut batch = LeaseBatch::default();
        batch.put_lease(&restored)?;
        batch.delete_reward_audit(txid, n);
        self.store.apply(batch)?;

        // No-op when the record is not currently active; the spend undo
        // that follows reads the restored schedule from the store.
        self.index.update_reward_heights(
            &audit.target,
            audit.prior_last_reward_height,
            audit.prior_next_reward_height,
        );
        Ok(true)
    }
}
