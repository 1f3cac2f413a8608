use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{debug, info, warn};
use num_bigint::BigUint;
use rand::Rng;

use crate::combiner::Combiner;
use crate::error::{check_security_constant, Result};
use crate::hash::fingerprint;
use crate::rsa::{encrypt, KeyMaterial};
use crate::voting::{
    reconstruct_product, recover_identity, voting_challenge_size, Disclosure,
    RevealedInformation, Tally, Vote,
};
use crate::wire::{Channel, VoteStatus};

/// How a ballot was settled.
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum VoteOutcome {
    Accepted(Vote),
    /// The disclosure did not reproduce the pseudonym, or the vote was not 0/1.
    Invalid,
    /// A repeated pseudonym whose identity is known.
    Fraud(BigUint),
    /// A repeated pseudonym whose two challenges happened to coincide; the
    /// ballot is refused without attributing it.
    Unattributed,
}

impl VoteOutcome {
    fn status(&self) -> VoteStatus {
        match self {
            VoteOutcome::Accepted(_) => VoteStatus::Ok,
            VoteOutcome::Invalid | VoteOutcome::Unattributed => VoteStatus::Invalid,
            VoteOutcome::Fraud(_) => VoteStatus::Fraud,
        }
    }
}

#[derive(Default)]
struct Ledger {
    records: HashMap<BigUint, RevealedInformation>,
    fraud: HashMap<BigUint, BigUint>,
    tally: Tally,
}

/// Decrypts, checks and counts ballots; unmasks double voters.
pub struct VoteCollector {
    keys: KeyMaterial,
    combiner: Combiner,
    security_constant: usize,
    ledger: Mutex<Ledger>,
}

impl VoteCollector {
    pub fn new(keys: KeyMaterial, security_constant: usize) -> Result<Self> {
        let security_constant = check_security_constant(security_constant)?;
        Ok(VoteCollector {
            combiner: Combiner::new(keys.n.clone()),
            keys,
            security_constant,
            ledger: Mutex::new(Ledger::default()),
        })
    }

    fn ledger(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn tally(&self) -> Tally {
        self.ledger().tally
    }

    /// The identity unmasked for `pseudonym`, if it voted twice.
    pub fn fraudulent_identity(&self, pseudonym: &BigUint) -> Option<BigUint> {
        self.ledger().fraud.get(pseudonym).cloned()
    }

    pub fn fraud_count(&self) -> usize {
        self.ledger().fraud.len()
    }

    /// One fresh random bit per retained tuple.
    pub fn choose_bits<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<bool> {
        (0..voting_challenge_size(self.security_constant))
            .map(|_| rng.gen::<bool>())
            .collect()
    }

    /// A ballot is legitimate iff the rebuilt bindings multiply to the cube of
    /// the pseudonym.
    pub fn verify_ballot(
        &self,
        pseudonym: &BigUint,
        bits: &[bool],
        disclosures: &[Disclosure],
    ) -> bool {
        encrypt(pseudonym, &self.keys.n) == reconstruct_product(bits, disclosures, &self.combiner)
    }

    /// Records a verified ballot, or unmasks its author if the pseudonym was
    /// already used. Runs under a single lock acquisition.
    pub fn settle(&self, pseudonym: &BigUint, record: RevealedInformation) -> VoteOutcome {
        let mut ledger = self.ledger();

        if let Some(id) = ledger.fraud.get(pseudonym) {
            return VoteOutcome::Fraud(id.clone());
        }

        let previous = match ledger.records.get(pseudonym) {
            Some(previous) => previous.clone(),
            None => {
                let vote = record.vote;
                ledger.records.insert(pseudonym.clone(), record);
                ledger.tally.add(vote);
                return VoteOutcome::Accepted(vote);
            }
        };

        match recover_identity(&previous, &record) {
            Some(id) => {
                ledger.fraud.insert(pseudonym.clone(), id.clone());
                ledger.tally.remove(previous.vote);
                VoteOutcome::Fraud(id)
            }
            None => VoteOutcome::Unattributed,
        }
    }

    /// Runs one voting session to completion.
    pub fn serve<S, R>(&self, stream: S, rng: &mut R) -> Result<VoteOutcome>
    where
        S: Read + Write,
        R: Rng + ?Sized,
    {
        let mut channel = Channel::new(stream);
        channel.send_number(&self.keys.n);
        channel.send_u32(self.security_constant as u32);

        let pseudonym = self.keys.crypt_op(&channel.recv_number()?);
        let vote_value = self.keys.crypt_op(&channel.recv_number()?);
        let tag = fingerprint(&pseudonym);
        debug!("ballot received for pseudonym {}", tag);

        let bits = self.choose_bits(rng);
        for &bit in &bits {
            channel.send_u32(bit as u32);
        }

        let mut disclosures = Vec::with_capacity(bits.len());
        for _ in 0..bits.len() {
            disclosures.push(Disclosure(
                channel.recv_number()?,
                channel.recv_number()?,
                channel.recv_number()?,
            ));
        }

        let outcome = match Vote::from_value(&vote_value) {
            Some(vote) if self.verify_ballot(&pseudonym, &bits, &disclosures) => self.settle(
                &pseudonym,
                RevealedInformation {
                    vote,
                    bits,
                    disclosures,
                },
            ),
            _ => VoteOutcome::Invalid,
        };

        channel.send_status(outcome.status());
        if let VoteOutcome::Fraud(id) = &outcome {
            channel.send_number(id);
        }
        channel.flush()?;

        match &outcome {
            VoteOutcome::Accepted(vote) => info!("accepted {:?} ballot from {}", vote, tag),
            VoteOutcome::Invalid => warn!("invalid ballot from {}", tag),
            VoteOutcome::Fraud(id) => warn!("pseudonym {} voted again: identity {}", tag, id),
            VoteOutcome::Unattributed => {
                warn!("pseudonym {} voted again with identical challenge bits", tag)
            }
        }
        Ok(outcome)
    }
}
