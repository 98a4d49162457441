//! Fuzz target: reward engine totality
//!
//! Feeds structurally-valid-but-random lease records and curve values to
//! both reward formulas. Verifies they never panic (no overflow, no
//! division surprises) for the full input space — the formulas are called
//! during block validation on attacker-supplied transaction data.
//!
//! Run: cargo +nightly fuzz run fuzz_calc_reward

#![no_main]
use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use p2l_core::rewards::{calc_aggregate_reward, calc_output_reward};
use p2l_core::{LeaseRecord, LeaserRole};

#[derive(Arbitrary, Debug)]
struct FuzzRewardInput {
    value: u64,
    creation_height: u64,
    next_reward_height: u64,
    last_reward_height: u64,
    spent_height: u64,
    tip: u64,
    epoch_pct: u64,
    tier_pct: u64,
    balance: u64,
    role_is_validator: bool,
}

fuzz_target!(|input: FuzzRewardInput| {
    let record = LeaseRecord {
        txid: "ab".repeat(32),
        n: 0,
        value: input.value,
        creation_height: input.creation_height,
        script: String::new(),
        owner: "OWNfuzz".to_string(),
        leaser: "LSRfuzz".to_string(),
        next_reward_height: input.next_reward_height,
        last_reward_height: input.last_reward_height,
        spent_height: input.spent_height,
    };
    // Curve values are table-bounded in production (epoch 100..=1500,
    // tier 4500..=10000); keep the fuzz inside those contracts
    let epoch = 100 + input.epoch_pct % 1_401;
    let tier = 4_500 + input.tier_pct % 5_501;
    let out = calc_output_reward(&record, input.tip, epoch, tier);
    let again = calc_output_reward(&record, input.tip, epoch, tier);
    assert_eq!(out, again, "reward must be deterministic");

    let role = if input.role_is_validator {
        LeaserRole::Validator
    } else {
        LeaserRole::Masternode
    };
    let agg = calc_aggregate_reward(role, "LSRfuzz", input.balance);
    assert!(agg.value <= input.balance / 5 + 1);
});
