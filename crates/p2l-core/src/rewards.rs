// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// PEERLEASE (P2L) - REWARD ENGINE
//
// Pure, deterministic reward formulas. Every percentage is fixed-point
// (10,000 = 100.00%) and every division truncates, in a fixed order —
// peers compare the resulting output byte-for-byte, so any deviation
// (including floating-point or a reordered division) is a chain split.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::script::leasing_reward_script;
use crate::{LeaseRecord, LeaserRole, OutPoint, TxOut, BLOCKS_PER_YEAR, COIN, PCT_SCALE};

/// Height-epoch length: the macro emission rate steps down every
/// 500,000 blocks.
pub const HEIGHT_EPOCH_BLOCKS: u64 = 500_000;

/// Supply-tier width: the participation throttle steps down every
/// 1,000,000 leased coins.
pub const SUPPLY_TIER_COINS: u64 = 1_000_000;

/// Per-output amount curve: (upper bound in whole coins, pct).
/// Upper-bound inclusive, descending from 100.00% to 50.00%.
/// Larger leases earn a lower base rate.
const AMOUNT_BUCKETS: [(u64, u64); 11] = [
    (10, 10_000),
    (100, 9_900),
    (500, 9_800),
    (1_000, 9_700),
    (2_500, 9_500),
    (5_000, 9_250),
    (10_000, 9_000),
    (25_000, 8_000),
    (50_000, 7_000),
    (100_000, 6_000),
    (u64::MAX, 5_000),
];

/// Per-output age curve: (minimum age in blocks, pct).
/// Lower-bound inclusive, ascending from 100.00% to 200.00%.
/// Long-standing leases earn up to double the base rate.
const AGE_BUCKETS: [(u64, u64); 11] = [
    (0, 10_000),
    (4_320, 11_000),
    (10_080, 12_000),
    (20_160, 13_000),
    (43_200, 14_000),
    (86_400, 15_000),
    (129_600, 16_000),
    (259_200, 17_000),
    (525_600, 18_000),
    (1_051_200, 19_000),
    (1_576_800, 20_000),
];

/// Aggregate bucket upper bounds (whole coins), shared by both role tables.
const AGGREGATE_BOUNDS: [u64; 10] = [
    1_000, 5_000, 10_000, 25_000, 50_000, 100_000, 250_000, 500_000, 1_000_000, u64::MAX,
];

/// Aggregate masternode rate per bucket: 10.00% down to 0%.
const MASTERNODE_PCTS: [u64; 10] = [1_000, 900, 800, 700, 600, 500, 400, 300, 200, 0];

/// Aggregate validator rate per bucket: 20.00% down to 0%.
const VALIDATOR_PCTS: [u64; 10] = [2_000, 1_800, 1_600, 1_400, 1_200, 1_000, 800, 600, 400, 0];

/// Amount percentage for a lease of `value` atomic units.
pub fn amount_pct(value: u64) -> u64 {
    let coins = value / COIN;
    for (bound, pct) in AMOUNT_BUCKETS {
        if coins <= bound {
            return pct;
        }
    }
    AMOUNT_BUCKETS[AMOUNT_BUCKETS.len() - 1].1
}

/// Age percentage for a lease that is `age` blocks old.
pub fn age_pct(age: u64) -> u64 {
    let mut pct = AGE_BUCKETS[0].1;
    for (min_age, bucket_pct) in AGE_BUCKETS {
        if age >= min_age {
            pct = bucket_pct;
        }
    }
    pct
}

/// Height-epoch percentage: 15.00% at genesis, stepping down 1.00% every
/// 500,000 blocks, floored at 1.00%. This is the long-term emission taper.
pub fn height_epoch_pct(height: u64) -> u64 {
    let step = (height / HEIGHT_EPOCH_BLOCKS).min(14);
    1_500 - 100 * step
}

/// Supply-tier percentage: 100.00% while under 1,000,000 leased coins,
/// stepping down 5.00% per additional 1,000,000, floored at 45.00%.
/// This is the participation throttle.
pub fn supply_tier_pct(total_leased: u64) -> u64 {
    let tier = (total_leased / COIN / SUPPLY_TIER_COINS).min(11);
    10_000 - 500 * tier
}

/// Per-output reward for one active lease.
///
/// `height` is the chain tip, `epoch_pct` / `tier_pct` are the tracker's
/// two macro curves. Total function: a lease that is not yet due simply
/// yields a zero-value output. Multiplication/division order is consensus.
pub fn calc_output_reward(record: &LeaseRecord, height: u64, epoch_pct: u64, tier_pct: u64) -> TxOut {
    let amount_pct = amount_pct(record.value) as u128;
    let age = height.saturating_sub(record.creation_height);
    let age_pct = age_pct(age) as u128;

    let global_pct = epoch_pct as u128 * tier_pct as u128 / PCT_SCALE as u128;
    let combined_pct = amount_pct * age_pct * global_pct / PCT_SCALE as u128 / PCT_SCALE as u128;
    let raw_annual = record.value as u128 * combined_pct / PCT_SCALE as u128;

    // Pro-rate the annual rate per elapsed block (1 block ≈ 1 minute).
    // last_reward_height can sit above the tip for immature leases —
    // saturating elapsed to zero makes the reward zero, not negative.
    let elapsed = height.saturating_sub(record.last_reward_height) as u128;
    let reward = raw_annual * elapsed / BLOCKS_PER_YEAR as u128;

    TxOut {
        // Saturating guard: unreachable within the coin supply × realistic
        // elapsed ranges, but the function must stay total and deterministic.
        value: reward.min(u64::MAX as u128) as u64,
        script: leasing_reward_script(&record.outpoint(), &record.owner),
    }
}

/// Aggregate reward on a leaser's whole delegated balance.
///
/// Used for amounts leased *to* a masternode or validator candidate rather
/// than to one P2L output. The claim script references the role sentinel
/// outpoint and pays the leaser directly.
pub fn calc_aggregate_reward(role: LeaserRole, leaser: &str, balance: u64) -> TxOut {
    let pcts = match role {
        LeaserRole::Masternode => &MASTERNODE_PCTS,
        LeaserRole::Validator => &VALIDATOR_PCTS,
    };
    let coins = balance / COIN;
    let mut pct = pcts[pcts.len() - 1];
    for (i, bound) in AGGREGATE_BOUNDS.iter().enumerate() {
        if coins <= *bound {
            pct = pcts[i];
            break;
        }
    }
    let reward = balance as u128 * pct as u128 / PCT_SCALE as u128;

    TxOut {
        value: reward as u64,
        script: leasing_reward_script(&OutPoint::role_sentinel(role), leaser),
    }
}
