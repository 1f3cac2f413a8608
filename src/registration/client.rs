use std::io::{Read, Write};

use log::{debug, info, warn};
use num_bigint::BigUint;
use num_traits::One;
use rand::Rng;

use crate::combiner::Combiner;
use crate::error::{check_security_constant, Error, Result};
use crate::math::mod_div;
use crate::registration::{registration_challenge_size, Credential, SecretPool, SecretTuple};
use crate::rsa::encrypt;
use crate::wire::{Channel, Feedback, IdStatus};

/// What the voter walks away with.
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum RegistrationResult {
    IdInvalid,
    IdUsed,
    Rejected,
    Registered(Credential),
}

/// Removes the blinding factors of the retained tuples from the authority's
/// signature product.
pub fn unblind(product: &BigUint, retained: &[SecretTuple], n: &BigUint) -> Result<BigUint> {
    let noise = retained
        .iter()
        .fold(BigUint::one(), |noise, tuple| noise * &tuple.r % n);
    mod_div(product, &noise, n).ok_or(Error::NotInvertible)
}

/// Reads the authority's challenge: `k / 2` distinct indices below `k`.
fn read_challenge<S: Read + Write>(channel: &mut Channel<S>, k: usize) -> Result<Vec<bool>> {
    let mut challenged = vec![false; k];
    for _ in 0..registration_challenge_size(k) {
        let index = channel.recv_u32()? as usize;
        match challenged.get_mut(index) {
            Some(chosen) if !*chosen => *chosen = true,
            Some(_) => {
                return Err(Error::Protocol(format!(
                    "index {} challenged twice",
                    index
                )))
            }
            None => {
                return Err(Error::Protocol(format!(
                    "challenged index {} out of range for k = {}",
                    index, k
                )))
            }
        }
    }
    Ok(challenged)
}

/// Registers `id` with the authority on the other end of `stream`.
pub fn register<S, R>(stream: S, id: &BigUint, rng: &mut R) -> Result<RegistrationResult>
where
    S: Read + Write,
    R: Rng + ?Sized,
{
    let mut channel = Channel::new(stream);
    let n = channel.recv_number()?;
    let k = check_security_constant(channel.recv_u32()? as usize)?;
    debug!("authority announced k = {}, modulus of {} bits", k, n.bits());

    channel.send_number(id);
    match channel.recv_status::<IdStatus>()? {
        IdStatus::Ok => {}
        IdStatus::Invalid => return Ok(RegistrationResult::IdInvalid),
        IdStatus::Used => return Ok(RegistrationResult::IdUsed),
    }

    let combiner = Combiner::new(n.clone());
    let pool = SecretPool::generate(k, &n, rng);
    channel.send_numbers(&pool.commitments(id, &combiner));

    let challenged = read_challenge(&mut channel, k)?;
    for (tuple, _) in pool.0.iter().zip(&challenged).filter(|(_, &chosen)| chosen) {
        channel.send_numbers(vec![&tuple.a, &tuple.c, &tuple.d, &tuple.r]);
    }

    if channel.recv_status::<Feedback>()? == Feedback::NotOk {
        warn!("authority rejected the opening");
        return Ok(RegistrationResult::Rejected);
    }
    let product = channel.recv_number()?;

    let (disclosed, retained) = pool.split(&challenged);
    let pseudonym = unblind(&product, &retained, &n)?;

    let expected = retained
        .iter()
        .fold(BigUint::one(), |acc, tuple| acc * tuple.binding(id, &combiner) % &n);
    if encrypt(&pseudonym, &n) != expected {
        return Err(Error::Protocol(
            "authority returned a signature that does not verify".to_owned(),
        ));
    }

    info!("registration complete");
    Ok(RegistrationResult::Registered(Credential {
        pseudonym,
        disclosed,
        retained,
    }))
}
