//! Ballot casting under a pseudonym, the second cut-and-choose over the
//! retained tuples, and recovery of the identity behind a repeated vote.

use num_bigint::BigUint;
use num_traits::{One, Zero};

use crate::combiner::Combiner;
use crate::math::xor;
use crate::registration::SecretTuple;

pub mod client;
pub mod collector;

pub use client::{cast_vote, BallotResult};
pub use collector::{VoteCollector, VoteOutcome};

/// Number of challenge bits, one per retained tuple.
pub fn voting_challenge_size(k: usize) -> usize {
    k - k / 2
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Vote {
    No,
    Yes,
}

impl Vote {
    pub fn to_value(self) -> BigUint {
        match self {
            Vote::No => BigUint::zero(),
            Vote::Yes => BigUint::one(),
        }
    }

    /// Only 0 and 1 are ballots.
    pub fn from_value(value: &BigUint) -> Option<Vote> {
        if value.is_zero() {
            Some(Vote::No)
        } else if value.is_one() {
            Some(Vote::Yes)
        } else {
            None
        }
    }
}

/// The three values a voter reveals for one retained tuple.
///
/// Bit 0 reveals `(G(a, c), a ^ ID, d)`; bit 1 reveals `(a, c, G(a ^ ID, d))`.
/// Either way the collector can rebuild the tuple's binding without seeing both
/// `a` and `a ^ ID`.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Disclosure(pub BigUint, pub BigUint, pub BigUint);

impl Disclosure {
    pub fn new(tuple: &SecretTuple, id: &BigUint, bit: bool, combiner: &Combiner) -> Self {
        let masked = xor(&tuple.a, id);
        if bit {
            Disclosure(
                tuple.a.clone(),
                tuple.c.clone(),
                combiner.g(&masked, &tuple.d),
            )
        } else {
            Disclosure(combiner.g(&tuple.a, &tuple.c), masked, tuple.d.clone())
        }
    }

    /// Rebuilds `F(G(a, c), G(a ^ ID, d))` from whichever half was revealed.
    pub fn reconstruct(&self, bit: bool, combiner: &Combiner) -> BigUint {
        let Disclosure(v1, v2, v3) = self;
        if bit {
            combiner.f(&combiner.g(v1, v2), v3)
        } else {
            combiner.f(v1, &combiner.g(v2, v3))
        }
    }
}

/// What the collector keeps about the first accepted ballot of a pseudonym.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct RevealedInformation {
    pub vote: Vote,
    pub bits: Vec<bool>,
    pub disclosures: Vec<Disclosure>,
}

/// Product of the rebuilt bindings; equals `pseudonym^3 mod n` for an honest
/// ballot.
pub fn reconstruct_product(
    bits: &[bool],
    disclosures: &[Disclosure],
    combiner: &Combiner,
) -> BigUint {
    bits.iter()
        .zip(disclosures)
        .fold(BigUint::one(), |product, (&bit, disclosure)| {
            product * disclosure.reconstruct(bit, combiner) % &combiner.n
        })
}

/// Unmasks the identity from two attempts on the same pseudonym.
///
/// At the first index where the challenge bits differ one attempt revealed `a`
/// and the other `a ^ ID`. Returns `None` when the bit vectors are identical.
pub fn recover_identity(old: &RevealedInformation, new: &RevealedInformation) -> Option<BigUint> {
    let index = old
        .bits
        .iter()
        .zip(&new.bits)
        .position(|(old_bit, new_bit)| old_bit != new_bit)?;
    let (previous, current) = (&old.disclosures[index], &new.disclosures[index]);
    if old.bits[index] {
        Some(xor(&previous.0, &current.1))
    } else {
        Some(xor(&previous.1, &current.0))
    }
}

/// Running counts of accepted ballots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub yes: u64,
    pub no: u64,
}

impl Tally {
    pub fn add(&mut self, vote: Vote) {
        match vote {
            Vote::Yes => self.yes += 1,
            Vote::No => self.no += 1,
        }
    }

    pub fn remove(&mut self, vote: Vote) {
        match vote {
            Vote::Yes => self.yes = self.yes.saturating_sub(1),
            Vote::No => self.no = self.no.saturating_sub(1),
        }
    }
}
