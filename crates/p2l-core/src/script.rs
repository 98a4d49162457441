// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// PEERLEASE (P2L) - SCRIPT WIRE FORMAT
//
// Tagged-string output scripts, matching the node-wide link encoding:
//   "P2L:{leaser}:{owner}"       — pay-to-leasing output
//   "LRWD:{txid}:{n}:{owner}"    — leasing-reward claim output
// Anything else classifies as NotApplicable (never an error).
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::OutPoint;

/// Script tag for a pay-to-leasing output
pub const TAG_LEASE: &str = "P2L";
/// Script tag for a leasing-reward claim output
pub const TAG_LEASING_REWARD: &str = "LRWD";

/// Classification of one output script.
///
/// Identities are NOT validated here — an empty leaser/owner still
/// classifies as `Lease` so the ledger can log the unresolvable identity
/// as a failure instead of silently skipping the output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptClass {
    /// Coins leased by `owner` to staking operator `leaser`
    Lease { leaser: String, owner: String },
    /// Reward claim for `outpoint` (or a role sentinel), paying `owner`
    LeasingReward { outpoint: OutPoint, owner: String },
    /// Any other script shape — not this subsystem's business
    NotApplicable,
}

/// Build the canonical P2L output script.
pub fn lease_script(leaser: &str, owner: &str) -> String {
    format!("{}:{}:{}", TAG_LEASE, leaser, owner)
}

/// Build the canonical leasing-reward claim script.
///
/// Aggregate claims pass `OutPoint::role_sentinel(role)` and the leaser
/// identity as `owner` (aggregate rewards pay the leaser directly).
pub fn leasing_reward_script(outpoint: &OutPoint, owner: &str) -> String {
    format!(
        "{}:{}:{}:{}",
        TAG_LEASING_REWARD, outpoint.txid, outpoint.n, owner
    )
}

/// Classify an output script. Total function: malformed or unknown
/// scripts are `NotApplicable`, matching the consensus rule that an
/// unrecognized script is simply not a leasing script.
///
/// Identities are base58-style address strings and never contain ':',
/// so plain splitting is unambiguous.
pub fn classify_script(script: &str) -> ScriptClass {
    let mut parts = script.split(':');
    match parts.next() {
        Some(TAG_LEASE) => {
            let (leaser, owner) = match (parts.next(), parts.next(), parts.next()) {
                (Some(leaser), Some(owner), None) => (leaser, owner),
                _ => return ScriptClass::NotApplicable,
            };
            ScriptClass::Lease {
                leaser: leaser.to_string(),
                owner: owner.to_string(),
            }
        }
        Some(TAG_LEASING_REWARD) => {
            let (txid, n, owner) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
                (Some(txid), Some(n), Some(owner), None) => (txid, n, owner),
                _ => return ScriptClass::NotApplicable,
            };
            // txid must look like a 32-byte hex hash
            if txid.len() != 64 || !txid.bytes().all(|b| b.is_ascii_hexdigit()) {
                return ScriptClass::NotApplicable;
            }
            let n: u32 = match n.parse() {
                Ok(n) => n,
                Err(_) => return ScriptClass::NotApplicable,
            };
            ScriptClass::LeasingReward {
                outpoint: OutPoint {
                    txid: txid.to_string(),
                    n,
                },
                owner: owner.to_string(),
            }
        }
        _ => ScriptClass::NotApplicable,
    }
}
