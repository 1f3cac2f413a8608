//! Credential issuance: the voter's secret pool, its blinded commitments and
//! the cut-and-choose exchange with the registration authority.

use num_bigint::BigUint;
use rand::Rng;

use crate::combiner::Combiner;
use crate::math::{random_below, random_unit, xor};

pub mod authority;
pub mod client;

pub use authority::{RegistrationAuthority, RegistrationOutcome};
pub use client::{register, unblind, RegistrationResult};

/// One secret tuple of a voter's pool.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct SecretTuple {
    pub a: BigUint,
    pub c: BigUint,
    pub d: BigUint,
    pub r: BigUint,
}

impl SecretTuple {
    /// Samples every component below `n`; the blinding factor is a unit so it
    /// can be divided out again.
    pub fn random<R: Rng + ?Sized>(n: &BigUint, rng: &mut R) -> Self {
        SecretTuple {
            a: random_below(n, rng),
            c: random_below(n, rng),
            d: random_below(n, rng),
            r: random_unit(n, rng),
        }
    }

    /// `F(G(a, c), G(a ^ id, d))`, the value the pseudonym ends up signing.
    pub fn binding(&self, id: &BigUint, combiner: &Combiner) -> BigUint {
        let x = combiner.g(&self.a, &self.c);
        let y = combiner.g(&xor(&self.a, id), &self.d);
        combiner.f(&x, &y)
    }

    /// `r^3 * binding mod n`, the blinded value sent to the authority.
    pub fn commitment(&self, id: &BigUint, combiner: &Combiner) -> BigUint {
        let n = &combiner.n;
        let r_cubed = &self.r * &self.r % n * &self.r % n;
        r_cubed * self.binding(id, combiner) % n
    }
}

/// A voter's ordered secret pool. Positions match commitment indices.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct SecretPool(pub Vec<SecretTuple>);

impl SecretPool {
    pub fn generate<R: Rng + ?Sized>(k: usize, n: &BigUint, rng: &mut R) -> Self {
        SecretPool((0..k).map(|_| SecretTuple::random(n, rng)).collect())
    }

    pub fn commitments(&self, id: &BigUint, combiner: &Combiner) -> Vec<BigUint> {
        self.0
            .iter()
            .map(|tuple| tuple.commitment(id, combiner))
            .collect()
    }

    /// Splits the pool by `challenged`, keeping index order on both sides.
    pub fn split(self, challenged: &[bool]) -> (Vec<SecretTuple>, Vec<SecretTuple>) {
        let mut disclosed = Vec::new();
        let mut retained = Vec::new();
        for (tuple, &chosen) in self.0.into_iter().zip(challenged) {
            if chosen {
                disclosed.push(tuple);
            } else {
                retained.push(tuple);
            }
        }
        (disclosed, retained)
    }
}

/// Everything a voter keeps after registration.
///
/// `retained` holds the tuples the authority never saw, in index order; they
/// answer the collector's challenge and must never be refreshed.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Credential {
    pub pseudonym: BigUint,
    pub disclosed: Vec<SecretTuple>,
    pub retained: Vec<SecretTuple>,
}

impl Credential {
    /// The security constant the credential was issued under.
    pub fn security_constant(&self) -> usize {
        self.disclosed.len() + self.retained.len()
    }
}

/// Number of indices opened during registration.
pub fn registration_challenge_size(k: usize) -> usize {
    k / 2
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use crate::math::mod_inverse;

    use super::*;

    #[test]
    fn commitment_blinds_binding_with_cube() {
        let mut rng = StdRng::seed_from_u64(9);
        let combiner = Combiner::new(BigUint::from(3233u32));
        let id = BigUint::from(1001u32);
        let tuple = SecretTuple::random(&combiner.n, &mut rng);

        let r_cubed = tuple.r.modpow(&BigUint::from(3u32), &combiner.n);
        let unblinded = tuple.commitment(&id, &combiner)
            * mod_inverse(&r_cubed, &combiner.n).unwrap()
            % &combiner.n;
        assert_eq!(unblinded, tuple.binding(&id, &combiner));
    }

    #[test]
    fn split_preserves_order() {
        let mut rng = StdRng::seed_from_u64(2);
        let pool = SecretPool::generate(6, &BigUint::from(3233u32), &mut rng);
        let copy = pool.0.clone();
        let challenged = [false, true, true, false, false, true];

        let (disclosed, retained) = pool.split(&challenged);
        assert_eq!(disclosed, vec![copy[1].clone(), copy[2].clone(), copy[5].clone()]);
        assert_eq!(retained, vec![copy[0].clone(), copy[3].clone(), copy[4].clone()]);
    }

    #[test]
    fn identity_changes_binding() {
        let mut rng = StdRng::seed_from_u64(4);
        let combiner = Combiner::new(BigUint::from(3233u32));
        let tuple = SecretTuple::random(&combiner.n, &mut rng);
        let bindings: Vec<_> = (1u32..20)
            .map(|id| tuple.binding(&BigUint::from(id), &combiner))
            .collect();
        assert!(bindings.windows(2).any(|pair| pair[0] != pair[1]));
    }
}
