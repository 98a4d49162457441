// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// PEERLEASE (P2L) - CORE MODULE
//
// Consensus-critical primitives for the coin-leasing subsystem:
// transaction model, LeaseRecord, script wire format, and the reward engine.
// All financial arithmetic uses u64 satoshi units with u128 intermediates
// (no floating-point — reward values are compared byte-for-byte by peers).
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};

pub mod rewards;
pub mod script;

use crate::script::{classify_script, ScriptClass};

/// 1 coin = 100,000,000 atomic units (Bitcoin-style 10^8 precision)
pub const COIN: u64 = 100_000_000;

/// Fixed-point percentage scale: 10,000 = 100.00%.
/// Every reward curve in this crate is expressed in hundredths of a percent.
pub const PCT_SCALE: u64 = 10_000;

/// Blocks between successive rewards on one lease (~30 days at 1 block/min)
pub const REWARD_PERIOD: u64 = 43_200;

/// Blocks a freshly created lease waits before its first reward window
/// starts counting (coinbase-style maturity).
pub const MATURITY_OFFSET: u64 = 100;

/// Blocks per year at the 1 block ≈ 1 minute target (365 × 24 × 60).
/// The per-output reward formula pro-rates an annual rate by this divisor.
pub const BLOCKS_PER_YEAR: u64 = 525_600;

/// Sentinel spent-height meaning "this lease output has not been spent"
pub const SPENT_HEIGHT_SENTINEL: u64 = u64::MAX;

/// The all-zero transaction id. An outpoint with this hash is not a real
/// UTXO reference: its index carries a leaser role code and the outpoint
/// marks an aggregate (whole-balance) reward claim.
pub const NULL_TXID: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Minimum total amount leased to a candidate before it may register as a
/// validator or masternode (5,000 coins).
pub const MIN_LEASED_FOR_VALIDATOR: u64 = 5_000 * COIN;

/// Role of the party a balance is leased to, for aggregate reward claims.
///
/// The role code doubles as the outpoint index of the null-txid sentinel
/// outpoint, so one scan of the reward index recognizes both per-output
/// and aggregate claims.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaserRole {
    Masternode,
    Validator,
}

impl LeaserRole {
    /// Wire code used as the sentinel outpoint index.
    pub fn code(&self) -> u32 {
        match self {
            LeaserRole::Masternode => 1,
            LeaserRole::Validator => 2,
        }
    }

    /// Inverse of `code()`. Unknown codes yield None (treated as
    /// "no reward due" by callers, never an error).
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(LeaserRole::Masternode),
            2 => Some(LeaserRole::Validator),
            _ => None,
        }
    }
}

/// Reference to one transaction output: (txid, output index).
/// Hex-string txids, matching the node's wire/display convention.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OutPoint {
    pub txid: String,
    pub n: u32,
}

impl OutPoint {
    pub fn new(txid: impl Into<String>, n: u32) -> Self {
        Self {
            txid: txid.into(),
            n,
        }
    }

    /// Sentinel outpoint for an aggregate reward claim of the given role.
    pub fn role_sentinel(role: LeaserRole) -> Self {
        Self {
            txid: NULL_TXID.to_string(),
            n: role.code(),
        }
    }

    /// True for the null-txid sentinel form (aggregate claims).
    pub fn is_null(&self) -> bool {
        self.txid == NULL_TXID
    }
}

/// One transaction input: the outpoint it consumes.
/// Witness/scriptSig data is irrelevant to the leasing ledger and omitted.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TxIn {
    pub prevout: OutPoint,
}

/// One transaction output: amount plus the output script.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TxOut {
    pub value: u64,
    pub script: String,
}

impl TxOut {
    pub fn new(value: u64, script: impl Into<String>) -> Self {
        Self {
            value,
            script: script.into(),
        }
    }
}

/// The slice of a chain transaction the leasing ledger cares about.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub inputs: Vec<TxIn>,
    pub outputs: Vec<TxOut>,
    pub is_coinbase: bool,
    pub is_coinstake: bool,
}

impl Transaction {
    /// Deterministic transaction id: SHA3-256 over all inputs and outputs,
    /// hex-encoded. Every field is length-independent encoded (fixed-width
    /// integers little-endian, strings as raw bytes after their u64 length)
    /// so distinct transactions cannot collide by concatenation.
    pub fn txid(&self) -> String {
        let mut hasher = Sha3_256::new();
        hasher.update((self.inputs.len() as u64).to_le_bytes());
        for input in &self.inputs {
            hasher.update((input.prevout.txid.len() as u64).to_le_bytes());
            hasher.update(input.prevout.txid.as_bytes());
            hasher.update(input.prevout.n.to_le_bytes());
        }
        hasher.update((self.outputs.len() as u64).to_le_bytes());
        for output in &self.outputs {
            hasher.update(output.value.to_le_bytes());
            hasher.update((output.script.len() as u64).to_le_bytes());
            hasher.update(output.script.as_bytes());
        }
        hasher.update([self.is_coinbase as u8, self.is_coinstake as u8]);
        hex::encode(hasher.finalize())
    }

    /// A transaction is a reward-claim transaction iff any of its outputs
    /// carries a leasing-reward script. Protocol invariant: such a
    /// transaction never also creates or spends a lease, so the ledger
    /// scans either its reward outputs or its outputs+inputs — never both.
    pub fn is_reward_claim(&self) -> bool {
        self.outputs
            .iter()
            .any(|out| matches!(classify_script(&out.script), ScriptClass::LeasingReward { .. }))
    }
}

/// One active (or retained-after-spend) pay-to-leasing output.
///
/// Keyed by (txid, n). While active, `spent_height` is
/// `SPENT_HEIGHT_SENTINEL`; a spend replaces the sentinel with the real
/// height but keeps the record in the durable store so a reorg can undo it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LeaseRecord {
    /// Originating transaction id
    pub txid: String,
    /// Output index inside the originating transaction
    pub n: u32,
    /// Leased amount in atomic units
    pub value: u64,
    /// Height of the block that created this output
    pub creation_height: u64,
    /// The raw P2L output script
    pub script: String,
    /// Party that owns the coins and receives the reward
    pub owner: String,
    /// Party the coins are leased to (the staking operator)
    pub leaser: String,
    /// Height at which this lease next becomes reward-eligible
    pub next_reward_height: u64,
    /// Height the last reward was granted at (maturity-adjusted on creation)
    pub last_reward_height: u64,
    /// `SPENT_HEIGHT_SENTINEL` while unspent, else the spending height
    pub spent_height: u64,
}

impl LeaseRecord {
    pub fn outpoint(&self) -> OutPoint {
        OutPoint {
            txid: self.txid.clone(),
            n: self.n,
        }
    }

    pub fn is_active(&self) -> bool {
        self.spent_height == SPENT_HEIGHT_SENTINEL
    }
}
