//! Deterministic PoS leader election (§4.6).

use num_bigint::BigUint;
use num_traits::Zero;

use crate::types::{Address, Hash256};

/// One entry of the validator set as seen by the selector: address and
/// stake (`stake > 0`, enforced by the caller).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Validator {
    pub address: Address,
    pub stake: u64,
}

/// Computes `score(v) = H(parent_hash || v.address) * v.stake` using
/// arbitrary-precision arithmetic (no truncation before multiply, per
/// spec.md §9).
fn score(parent_hash: &str, validator: &Validator) -> BigUint {
    let preimage = format!("{parent_hash}{}", validator.address.as_str());
    let h = Hash256::compute(preimage.as_bytes());
    let h_int = BigUint::from_bytes_be(h.as_bytes());
    h_int * BigUint::from(validator.stake)
}

/// Produces a deterministic priority ordering of `validators` for the
/// block following `parent_hash`: sorted by score descending, tiebroken by
/// address ascending.
///
/// `validators` must be non-empty and contain no duplicate addresses; the
/// caller (typically `State::validators`) is responsible for that
/// precondition.
pub fn rank(parent_hash: &str, validators: &[Validator]) -> Vec<Validator> {
    let mut scored: Vec<(BigUint, Validator)> = validators
        .iter()
        .map(|v| (score(parent_hash, v), v.clone()))
        .collect();
    scored.sort_by(|(score_a, a), (score_b, b)| {
        score_b.cmp(score_a).then_with(|| a.address.cmp(&b.address))
    });
    scored.into_iter().map(|(_, v)| v).collect()
}

/// Returns the leader for the block following `parent_hash`, i.e. the head
/// of [`rank`]'s output.
pub fn leader<'a>(parent_hash: &str, validators: &'a [Validator]) -> Option<&'a Validator> {
    validators
        .iter()
        .max_by(|a, b| {
            score(parent_hash, a)
                .cmp(&score(parent_hash, b))
                .then_with(|| b.address.cmp(&a.address))
        })
}

/// Alternate single-winner selection: draws an index via
/// `SHA256(parent_hash) mod total_stake` into the cumulative stake prefix
/// sum (§4.6).
pub fn weighted_random_selection(parent_hash: &str, validators: &[Validator]) -> Option<usize> {
    if validators.is_empty() {
        return None;
    }
    let total_stake: BigUint = validators
        .iter()
        .fold(BigUint::zero(), |acc, v| acc + BigUint::from(v.stake));
    if total_stake.is_zero() {
        return None;
    }

    let h = Hash256::compute(parent_hash.as_bytes());
    let h_int = BigUint::from_bytes_be(h.as_bytes());
    let draw = h_int % &total_stake;

    let mut cumulative = BigUint::zero();
    for (i, v) in validators.iter().enumerate() {
        cumulative += BigUint::from(v.stake);
        if draw < cumulative {
            return Some(i);
        }
    }
    Some(validators.len() - 1)
}
