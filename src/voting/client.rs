use std::io::{Read, Write};

use log::{debug, info, warn};
use num_bigint::BigUint;

use crate::combiner::Combiner;
use crate::error::{Error, Result};
use crate::registration::Credential;
use crate::rsa::encrypt;
use crate::voting::{voting_challenge_size, Disclosure, Vote};
use crate::wire::{Channel, VoteStatus};

/// The collector's verdict as seen by the voter.
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum BallotResult {
    Accepted,
    Invalid,
    /// The collector unmasked this identity.
    Fraud(BigUint),
}

/// Casts `vote` under the credential's pseudonym.
///
/// `id` must be the identity the credential was registered with; the masked
/// half of every disclosure depends on it.
pub fn cast_vote<S>(stream: S, credential: &Credential, id: &BigUint, vote: Vote) -> Result<BallotResult>
where
    S: Read + Write,
{
    let mut channel = Channel::new(stream);
    let n = channel.recv_number()?;
    let k = channel.recv_u32()? as usize;
    if k != credential.security_constant() || credential.retained.len() != voting_challenge_size(k) {
        return Err(Error::SecurityConstantMismatch {
            local: credential.security_constant(),
            remote: k,
        });
    }

    channel.send_number(&encrypt(&credential.pseudonym, &n));
    channel.send_number(&encrypt(&vote.to_value(), &n));

    let combiner = Combiner::new(n);
    for tuple in &credential.retained {
        let bit = match channel.recv_u32()? {
            0 => false,
            1 => true,
            other => {
                return Err(Error::Protocol(format!("challenge bit {} is not 0 or 1", other)))
            }
        };
        let Disclosure(v1, v2, v3) = Disclosure::new(tuple, id, bit, &combiner);
        channel.send_numbers(vec![&v1, &v2, &v3]);
    }
    debug!("answered {} challenge bits", credential.retained.len());

    let result = match channel.recv_status::<VoteStatus>()? {
        VoteStatus::Ok => BallotResult::Accepted,
        VoteStatus::Invalid => BallotResult::Invalid,
        VoteStatus::Fraud => BallotResult::Fraud(channel.recv_number()?),
    };
    match &result {
        BallotResult::Accepted => info!("ballot accepted"),
        BallotResult::Invalid => warn!("ballot refused as invalid"),
        BallotResult::Fraud(_) => warn!("ballot refused: pseudonym already used"),
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use num_traits::One;

    use crate::registration::SecretTuple;
    use crate::wire::Scripted;

    use super::*;

    fn credential(k: usize) -> Credential {
        let tuple = SecretTuple {
            a: BigUint::one(),
            c: BigUint::one(),
            d: BigUint::one(),
            r: BigUint::one(),
        };
        Credential {
            pseudonym: BigUint::from(5u32),
            disclosed: vec![tuple.clone(); k / 2],
            retained: vec![tuple; k - k / 2],
        }
    }

    fn setup_frames(n: u32, k: u32) -> Vec<u8> {
        let n = BigUint::from(n).to_bytes_be();
        let mut bytes = (n.len() as u64).to_le_bytes().to_vec();
        bytes.extend_from_slice(&n);
        bytes.extend_from_slice(&k.to_le_bytes());
        bytes
    }

    #[test]
    fn refuses_foreign_security_constant() {
        let stream = Scripted::new(setup_frames(3233, 6));
        let result = cast_vote(stream, &credential(10), &BigUint::from(9u32), Vote::Yes);
        assert!(matches!(
            result,
            Err(Error::SecurityConstantMismatch { local: 10, remote: 6 })
        ));
    }

    #[test]
    fn refuses_malformed_challenge_bit() {
        let mut frames = setup_frames(3233, 4);
        frames.extend_from_slice(&7u32.to_le_bytes());
        let mut stream = Scripted::new(frames);
        let result = cast_vote(&mut stream, &credential(4), &BigUint::from(9u32), Vote::No);
        assert!(matches!(result, Err(Error::Protocol(_))));
        // both encrypted values went out before the bad bit was read
        assert!(!stream.output.is_empty());
    }
}
