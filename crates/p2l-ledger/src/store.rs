// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// PEERLEASE (P2L) - PERSISTENT STORE
//
// sled-backed durable log for the leasing ledger. Every key carries a
// one-byte record-kind prefix, so one sled::Batch gives an atomic write
// across lease records and audit entries, and a prefix scan enumerates one
// kind for the startup rebuild. Values are bincode-encoded structs.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use p2l_core::{LeaseRecord, OutPoint};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Record-kind prefixes. Keeping kinds in one keyspace (instead of
/// separate trees) lets a single batch cover a cross-kind mutation.
const KIND_OUTPUT: u8 = b'o';
const KIND_REWARD: u8 = b'r';
const KIND_SPEND: u8 = b's';
const KIND_META: u8 = b'm';

/// Metadata key: was the previous shutdown clean?
const META_CLEAN_SHUTDOWN: &[u8] = b"clean_shutdown";
/// Metadata key: persisted chain tip (height LE || hash bytes)
const META_TIP: &[u8] = b"tip";

/// One emitted reward claim, retained purely so a reorg can restore the
/// rewarded record's prior schedule exactly.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RewardAuditEntry {
    /// The lease output this reward advanced
    pub target: OutPoint,
    /// last_reward_height before the reward was granted
    pub prior_last_reward_height: u64,
    /// next_reward_height before the reward was granted
    pub prior_next_reward_height: u64,
}

/// One recorded consumption of a lease output, keyed by the spending
/// transaction and input index, retained for reorg undo.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SpendAuditEntry {
    /// The lease output the input consumed
    pub target: OutPoint,
}

fn keyed(kind: u8, txid: &str, n: u32) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + txid.len() + 4);
    key.push(kind);
    key.extend_from_slice(txid.as_bytes());
    key.extend_from_slice(&n.to_be_bytes());
    key
}

fn meta_key(name: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + name.len());
    key.push(KIND_META);
    key.extend_from_slice(name);
    key
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, String> {
    bincode::serialize(value).map_err(|e| format!("Store Error: serialize failed: {}", e))
}

fn decode<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T, String> {
    bincode::deserialize(bytes).map_err(|e| format!("Store Error: corrupt record: {}", e))
}

/// Atomic multi-record write. Mutations accumulate in memory and hit sled
/// all-or-nothing on `LeaseStore::apply`.
#[derive(Default)]
pub struct LeaseBatch {
    inner: sled::Batch,
}

impl LeaseBatch {
    pub fn put_lease(&mut self, record: &LeaseRecord) -> Result<(), String> {
        self.inner
            .insert(keyed(KIND_OUTPUT, &record.txid, record.n), encode(record)?);
        Ok(())
    }

    pub fn delete_lease(&mut self, outpoint: &OutPoint) {
        self.inner.remove(keyed(KIND_OUTPUT, &outpoint.txid, outpoint.n));
    }

    pub fn put_reward_audit(
        &mut self,
        reward_txid: &str,
        n: u32,
        entry: &RewardAuditEntry,
    ) -> Result<(), String> {
        self.inner
            .insert(keyed(KIND_REWARD, reward_txid, n), encode(entry)?);
        Ok(())
    }

    pub fn delete_reward_audit(&mut self, reward_txid: &str, n: u32) {
        self.inner.remove(keyed(KIND_REWARD, reward_txid, n));
    }

    pub fn put_spend_audit(
        &mut self,
        spend_txid: &str,
        input_index: u32,
        entry: &SpendAuditEntry,
    ) -> Result<(), String> {
        self.inner
            .insert(keyed(KIND_SPEND, spend_txid, input_index), encode(entry)?);
        Ok(())
    }

    pub fn delete_spend_audit(&mut self, spend_txid: &str, input_index: u32) {
        self.inner.remove(keyed(KIND_SPEND, spend_txid, input_index));
    }
}

/// Durable store handle. Storage faults surface as `Err(String)` and are
/// fatal by node-wide convention — the ledger never tries to recover from
/// a failed write.
pub struct LeaseStore {
    db: sled::Db,
}

impl LeaseStore {
    /// Open or create the store.
    ///
    /// Retries a few times with backoff when the sled file lock is still
    /// held — common right after a supervisor restarts the node.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let path_ref = path.as_ref();
        let retry_delays_ms: [u64; 3] = [500, 1000, 2000];

        match sled::open(path_ref) {
            Ok(db) => return Ok(Self { db }),
            Err(e) if Self::is_lock_error(&e) => {
                eprintln!(
                    "Leasing store lock held at {} — retrying ({} attempts remain)",
                    path_ref.display(),
                    retry_delays_ms.len()
                );
            }
            Err(e) => return Err(format!("Store Error: failed to open leasing db: {}", e)),
        }

        for (i, delay_ms) in retry_delays_ms.iter().enumerate() {
            std::thread::sleep(std::time::Duration::from_millis(*delay_ms));
            match sled::open(path_ref) {
                Ok(db) => return Ok(Self { db }),
                Err(e) if Self::is_lock_error(&e) && i + 1 < retry_delays_ms.len() => continue,
                Err(e) => {
                    return Err(format!(
                        "Store Error: failed to open leasing db after {} retries: {}",
                        i + 1,
                        e
                    ))
                }
            }
        }

        unreachable!("retry loop returns in all branches")
    }

    /// sled wraps OS lock errors in IO errors; match by message.
    fn is_lock_error(e: &sled::Error) -> bool {
        let msg = e.to_string();
        msg.contains("Resource temporarily unavailable")
            || msg.contains("WouldBlock")
            || msg.contains("Would block")
            || msg.contains("lock")
            || msg.contains("EAGAIN")
    }

    // ── Lease records ───────────────────────────────────────────────

    pub fn put_lease(&self, record: &LeaseRecord) -> Result<(), String> {
        self.db
            .insert(keyed(KIND_OUTPUT, &record.txid, record.n), encode(record)?)
            .map_err(|e| format!("Store Error: put lease failed: {}", e))?;
        Ok(())
    }

    pub fn get_lease(&self, outpoint: &OutPoint) -> Result<Option<LeaseRecord>, String> {
        match self
            .db
            .get(keyed(KIND_OUTPUT, &outpoint.txid, outpoint.n))
            .map_err(|e| format!("Store Error: get lease failed: {}", e))?
        {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn delete_lease(&self, outpoint: &OutPoint) -> Result<(), String> {
        self.db
            .remove(keyed(KIND_OUTPUT, &outpoint.txid, outpoint.n))
            .map_err(|e| format!("Store Error: delete lease failed: {}", e))?;
        Ok(())
    }

    /// Full scan of all persisted lease records, in key order.
    /// Only called once, from the startup rebuild.
    pub fn scan_leases(&self) -> Result<Vec<LeaseRecord>, String> {
        let mut records = Vec::new();
        for item in self.db.scan_prefix([KIND_OUTPUT]) {
            let (_, bytes) = item.map_err(|e| format!("Store Error: lease scan failed: {}", e))?;
            records.push(decode(&bytes)?);
        }
        Ok(records)
    }

    // ── Audit entries ───────────────────────────────────────────────

    pub fn get_reward_audit(
        &self,
        reward_txid: &str,
        n: u32,
    ) -> Result<Option<RewardAuditEntry>, String> {
        match self
            .db
            .get(keyed(KIND_REWARD, reward_txid, n))
            .map_err(|e| format!("Store Error: get reward audit failed: {}", e))?
        {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn get_spend_audit(
        &self,
        spend_txid: &str,
        input_index: u32,
    ) -> Result<Option<SpendAuditEntry>, String> {
        match self
            .db
            .get(keyed(KIND_SPEND, spend_txid, input_index))
            .map_err(|e| format!("Store Error: get spend audit failed: {}", e))?
        {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    // ── Batched writes ──────────────────────────────────────────────

    pub fn apply(&self, batch: LeaseBatch) -> Result<(), String> {
        self.db
            .apply_batch(batch.inner)
            .map_err(|e| format!("Store Error: batch write failed: {}", e))
    }

    // ── Metadata ────────────────────────────────────────────────────

    /// Read the clean-shutdown flag. A missing flag (fresh database)
    /// counts as clean.
    pub fn was_clean_shutdown(&self) -> Result<bool, String> {
        match self
            .db
            .get(meta_key(META_CLEAN_SHUTDOWN))
            .map_err(|e| format!("Store Error: read shutdown flag failed: {}", e))?
        {
            Some(bytes) => Ok(bytes.as_ref() == [1u8]),
            None => Ok(true),
        }
    }

    pub fn set_clean_shutdown(&self, clean: bool) -> Result<(), String> {
        self.db
            .insert(meta_key(META_CLEAN_SHUTDOWN), &[clean as u8][..])
            .map_err(|e| format!("Store Error: write shutdown flag failed: {}", e))?;
        Ok(())
    }

    /// Persist the current chain tip so a restart resumes at the right
    /// height without waiting for the next block notification.
    pub fn put_tip(&self, height: u64, hash: &str) -> Result<(), String> {
        let mut value = Vec::with_capacity(8 + hash.len());
        value.extend_from_slice(&height.to_le_bytes());
        value.extend_from_slice(hash.as_bytes());
        self.db
            .insert(meta_key(META_TIP), value)
            .map_err(|e| format!("Store Error: write tip failed: {}", e))?;
        Ok(())
    }

    pub fn get_tip(&self) -> Result<Option<(u64, String)>, String> {
        match self
            .db
            .get(meta_key(META_TIP))
            .map_err(|e| format!("Store Error: read tip failed: {}", e))?
        {
            Some(bytes) if bytes.len() >= 8 => {
                let mut height_bytes = [0u8; 8];
                height_bytes.copy_from_slice(&bytes[..8]);
                let hash = String::from_utf8_lossy(&bytes[8..]).into_owned();
                Ok(Some((u64::from_le_bytes(height_bytes), hash)))
            }
            Some(_) => Err("Store Error: corrupt tip record".to_string()),
            None => Ok(None),
        }
    }

    /// Flush sled to disk. Called once per connected block and at
    /// shutdown — not on every write.
    pub fn flush(&self) -> Result<(), String> {
        self.db
            .flush()
            .map_err(|e| format!("Store Error: flush failed: {}", e))?;
        Ok(())
    }
}
