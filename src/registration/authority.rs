use std::collections::HashSet;
use std::io::{Read, Write};
use std::sync::{Mutex, PoisonError};

use log::{debug, info, warn};
use num_bigint::BigUint;
use num_traits::One;
use rand::seq::index::sample;
use rand::Rng;
#[cfg(feature = "rayon")]
use rayon::prelude::*;

use crate::combiner::Combiner;
use crate::error::{check_security_constant, Result};
use crate::hash::fingerprint;
use crate::registration::{registration_challenge_size, SecretTuple};
use crate::rsa::KeyMaterial;
use crate::wire::{Channel, Feedback, IdStatus};

/// How a registration session ended.
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum RegistrationOutcome {
    IdInvalid,
    IdUsed,
    /// The opening failed at these indices; nothing was signed.
    Rejected { indices: Vec<usize> },
    Signed,
}

/// Issues one blind signature per eligible identity.
///
/// Shared by every connection handler; the used-identity set is the only
/// mutable state.
pub struct RegistrationAuthority {
    keys: KeyMaterial,
    combiner: Combiner,
    security_constant: usize,
    eligible: HashSet<BigUint>,
    used: Mutex<HashSet<BigUint>>,
}

impl RegistrationAuthority {
    pub fn new(
        keys: KeyMaterial,
        eligible: HashSet<BigUint>,
        security_constant: usize,
    ) -> Result<Self> {
        let security_constant = check_security_constant(security_constant)?;
        Ok(RegistrationAuthority {
            combiner: Combiner::new(keys.n.clone()),
            keys,
            security_constant,
            eligible,
            used: Mutex::new(HashSet::new()),
        })
    }

    pub fn modulus(&self) -> &BigUint {
        &self.keys.n
    }

    pub fn security_constant(&self) -> usize {
        self.security_constant
    }

    /// Checks eligibility and consumes the identity in one step.
    ///
    /// A consumed identity stays consumed whatever happens later in the session.
    pub fn admit(&self, id: &BigUint) -> IdStatus {
        if !self.eligible.contains(id) {
            return IdStatus::Invalid;
        }
        let mut used = self.used.lock().unwrap_or_else(PoisonError::into_inner);
        if used.insert(id.clone()) {
            IdStatus::Ok
        } else {
            IdStatus::Used
        }
    }

    /// Picks `k / 2` distinct indices uniformly at random.
    pub fn choose_challenge<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<bool> {
        let k = self.security_constant;
        let mut challenged = vec![false; k];
        for index in sample(rng, k, registration_challenge_size(k)).iter() {
            challenged[index] = true;
        }
        challenged
    }

    /// Re-derives every challenged commitment from its opening.
    ///
    /// `openings` follow the challenged indices in ascending order. Returns the
    /// indices whose opening does not reproduce the submitted commitment.
    pub fn verify_openings(
        &self,
        id: &BigUint,
        commitments: &[BigUint],
        challenged: &[bool],
        openings: &[SecretTuple],
    ) -> Vec<usize> {
        let indices = challenged
            .iter()
            .enumerate()
            .filter(|(_, &chosen)| chosen)
            .map(|(index, _)| index);

        indices
            .zip(openings)
            .filter(|(index, opening)| {
                opening.commitment(id, &self.combiner) != commitments[*index]
            })
            .map(|(index, _)| index)
            .collect()
    }

    /// Signs every commitment that escaped the challenge and multiplies the
    /// signatures together.
    #[cfg(feature = "rayon")]
    pub fn sign_remaining(&self, commitments: &[BigUint], challenged: &[bool]) -> BigUint {
        let n = &self.keys.n;
        commitments
            .par_iter()
            .zip(challenged)
            .filter(|(_, &chosen)| !chosen)
            .map(|(commitment, _)| self.keys.crypt_op(commitment))
            .reduce(BigUint::one, |left, right| left * right % n)
    }

    /// Signs every commitment that escaped the challenge and multiplies the
    /// signatures together.
    #[cfg(not(feature = "rayon"))]
    pub fn sign_remaining(&self, commitments: &[BigUint], challenged: &[bool]) -> BigUint {
        let n = &self.keys.n;
        commitments
            .iter()
            .zip(challenged)
            .filter(|(_, &chosen)| !chosen)
            .fold(BigUint::one(), |product, (commitment, _)| {
                product * self.keys.crypt_op(commitment) % n
            })
    }

    /// Runs one registration session to completion.
    pub fn serve<S, R>(&self, stream: S, rng: &mut R) -> Result<RegistrationOutcome>
    where
        S: Read + Write,
        R: Rng + ?Sized,
    {
        let k = self.security_constant;
        let mut channel = Channel::new(stream);
        channel.send_number(&self.keys.n);
        channel.send_u32(k as u32);

        let id = channel.recv_number()?;
        let status = self.admit(&id);
        let tag = fingerprint(&id);
        channel.send_status(status);
        match status {
            IdStatus::Invalid => {
                channel.flush()?;
                info!("registration refused: identity {} is not eligible", tag);
                return Ok(RegistrationOutcome::IdInvalid);
            }
            IdStatus::Used => {
                channel.flush()?;
                info!("registration refused: identity {} already registered", tag);
                return Ok(RegistrationOutcome::IdUsed);
            }
            IdStatus::Ok => debug!("identity {} admitted", tag),
        }

        let commitments = channel.recv_numbers(k)?;
        let challenged = self.choose_challenge(rng);
        for (index, &chosen) in challenged.iter().enumerate() {
            if chosen {
                channel.send_u32(index as u32);
            }
        }

        let mut openings = Vec::with_capacity(registration_challenge_size(k));
        for _ in 0..registration_challenge_size(k) {
            openings.push(SecretTuple {
                a: channel.recv_number()?,
                c: channel.recv_number()?,
                d: channel.recv_number()?,
                r: channel.recv_number()?,
            });
        }

        let rejected = self.verify_openings(&id, &commitments, &challenged, &openings);
        if !rejected.is_empty() {
            channel.send_status(Feedback::NotOk);
            channel.flush()?;
            warn!(
                "registration of {} rejected: openings at {:?} do not match",
                tag, rejected
            );
            return Ok(RegistrationOutcome::Rejected { indices: rejected });
        }

        channel.send_status(Feedback::Ok);
        channel.send_number(&self.sign_remaining(&commitments, &challenged));
        channel.flush()?;
        info!("issued blind signature to {}", tag);
        Ok(RegistrationOutcome::Signed)
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use log::{LevelFilter, Log, Metadata, Record};

    use crate::error::Error;
    use crate::registration::SecretPool;
    use crate::wire::Scripted;

    use super::*;

    /// Keeps every formatted log line for inspection.
    struct Capture(Mutex<Vec<String>>);

    impl Log for Capture {
        fn enabled(&self, _: &Metadata) -> bool {
            true
        }

        fn log(&self, record: &Record) {
            self.0
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(record.args().to_string());
        }

        fn flush(&self) {}
    }

    static CAPTURE: Capture = Capture(Mutex::new(Vec::new()));

    fn captured() -> Vec<String> {
        CAPTURE.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn authority(k: usize) -> (RegistrationAuthority, StdRng) {
        let mut rng = StdRng::seed_from_u64(17);
        let keys = KeyMaterial::generate(64, &mut rng).unwrap();
        let eligible = [1001u32, 1002, 1003].iter().map(|id| BigUint::from(*id)).collect();
        (RegistrationAuthority::new(keys, eligible, k).unwrap(), rng)
    }

    #[test]
    fn used_identity_stays_used() {
        let (authority, _) = authority(10);
        let id = BigUint::from(1002u32);
        assert_eq!(authority.admit(&id), IdStatus::Ok);
        for _ in 0..5 {
            assert_eq!(authority.admit(&id), IdStatus::Used);
        }
        assert_eq!(authority.admit(&BigUint::from(7u32)), IdStatus::Invalid);
    }

    #[test]
    fn refusals_log_fingerprints_not_identities() {
        let _ = log::set_logger(&CAPTURE);
        log::set_max_level(LevelFilter::Debug);
        let (authority, mut rng) = authority(10);

        let used = BigUint::from(1003u32);
        authority.admit(&used);
        let stranger = BigUint::from(987_654_321u32);
        for (id, outcome) in [
            (&stranger, RegistrationOutcome::IdInvalid),
            (&used, RegistrationOutcome::IdUsed),
        ]
        .iter()
        {
            let mut frames = Vec::new();
            let bytes = id.to_bytes_be();
            frames.extend_from_slice(&(bytes.len() as u64).to_le_bytes());
            frames.extend_from_slice(&bytes);
            let mut stream = Scripted::new(frames);
            assert_eq!(&authority.serve(&mut stream, &mut rng).unwrap(), outcome);
        }

        let lines = captured();
        for id in [&stranger, &used].iter() {
            let tag = fingerprint(id);
            assert!(lines.iter().any(|line| line.contains(&tag)), "{:?}", lines);
        }
        assert!(!lines.iter().any(|line| line.contains("987654321")));
    }

    #[test]
    fn challenge_covers_half() {
        let (authority, mut rng) = authority(11);
        for _ in 0..20 {
            let challenged = authority.choose_challenge(&mut rng);
            assert_eq!(challenged.len(), 11);
            assert_eq!(challenged.iter().filter(|&&chosen| chosen).count(), 5);
        }
    }

    #[test]
    fn honest_openings_verify() {
        let (authority, mut rng) = authority(10);
        let id = BigUint::from(1001u32);
        let pool = SecretPool::generate(10, authority.modulus(), &mut rng);
        let commitments = pool.commitments(&id, &authority.combiner);
        let challenged = authority.choose_challenge(&mut rng);
        let (openings, _) = pool.split(&challenged);

        assert!(authority
            .verify_openings(&id, &commitments, &challenged, &openings)
            .is_empty());
    }

    #[test]
    fn every_tampered_index_is_reported() {
        let (authority, mut rng) = authority(10);
        let id = BigUint::from(1001u32);
        let pool = SecretPool::generate(10, authority.modulus(), &mut rng);
        let commitments = pool.commitments(&id, &authority.combiner);
        let challenged = authority.choose_challenge(&mut rng);
        let challenged_indices: Vec<usize> = (0..10).filter(|&i| challenged[i]).collect();
        let (openings, _) = pool.split(&challenged);

        for position in 0..openings.len() {
            for field in 0..4 {
                let mut tampered = openings.clone();
                let target = &mut tampered[position];
                let value = match field {
                    0 => &mut target.a,
                    1 => &mut target.c,
                    2 => &mut target.d,
                    _ => &mut target.r,
                };
                *value += 1u32;
                let rejected =
                    authority.verify_openings(&id, &commitments, &challenged, &tampered);
                assert_eq!(rejected, vec![challenged_indices[position]]);
            }
        }
    }

    #[test]
    fn openings_bound_to_identity() {
        let (authority, mut rng) = authority(10);
        let pool = SecretPool::generate(10, authority.modulus(), &mut rng);
        let commitments = pool.commitments(&BigUint::from(1001u32), &authority.combiner);
        let challenged = authority.choose_challenge(&mut rng);
        let (openings, _) = pool.split(&challenged);

        let rejected = authority.verify_openings(
            &BigUint::from(1003u32),
            &commitments,
            &challenged,
            &openings,
        );
        assert_eq!(rejected.len(), 5);
    }

    #[test]
    fn signature_product_matches_plain_signing() {
        let (authority, mut rng) = authority(6);
        let id = BigUint::from(1001u32);
        let pool = SecretPool::generate(6, authority.modulus(), &mut rng);
        let commitments = pool.commitments(&id, &authority.combiner);
        let challenged = vec![true, false, true, false, false, true];

        let n = authority.modulus();
        let expected = [1usize, 3, 4].iter().fold(BigUint::one(), |product, &i| {
            product * commitments[i].modpow(&authority.keys.d, n) % n
        });
        assert_eq!(authority.sign_remaining(&commitments, &challenged), expected);
    }

    #[test]
    fn rejects_degenerate_security_constant() {
        let mut rng = StdRng::seed_from_u64(1);
        let keys = KeyMaterial::generate(16, &mut rng).unwrap();
        for k in 0..2 {
            assert!(matches!(
                RegistrationAuthority::new(keys.clone(), HashSet::new(), k),
                Err(Error::InvalidSecurityConstant(_))
            ));
        }
    }
}
