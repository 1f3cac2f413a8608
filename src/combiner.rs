//! The two-argument combiners binding each secret tuple into a commitment.

use num_bigint::BigUint;

/// Generator used by both combiners unless a role is configured otherwise.
pub const DEFAULT_GENERATOR: u32 = 2;

/// `(generator^x mod n + generator^y mod n) mod n`
pub fn combine(x: &BigUint, y: &BigUint, generator: &BigUint, n: &BigUint) -> BigUint {
    (generator.modpow(x, n) + generator.modpow(y, n)) % n
}

/// Public parameters every role needs to evaluate F and G.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Combiner {
    pub generator: BigUint,
    pub n: BigUint,
}

impl Combiner {
    pub fn new(n: BigUint) -> Self {
        Combiner {
            generator: BigUint::from(DEFAULT_GENERATOR),
            n,
        }
    }

    /// Outer combiner.
    pub fn f(&self, x: &BigUint, y: &BigUint) -> BigUint {
        combine(x, y, &self.generator, &self.n)
    }

    /// Inner combiner.
    pub fn g(&self, x: &BigUint, y: &BigUint) -> BigUint {
        combine(x, y, &self.generator, &self.n)
    }
}
