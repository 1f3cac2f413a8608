use num_bigint::BigUint;
use num_integer::Integer;
use num_traits::One;
use rand::Rng;

use crate::error::{Error, Result};
use crate::math::{generate_prime, mod_inverse};

/// The public exponent shared by every role.
pub const PUBLIC_EXPONENT: u32 = 3;

/// RSA key material with the factorisation kept for CRT exponentiation.
///
/// Only `generate` and `from_parts` build one, so the CRT parameters always
/// match `d`, `p` and `q`.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct KeyMaterial {
    pub p: BigUint,
    pub q: BigUint,
    pub n: BigUint,
    pub d: BigUint,
    d_p: BigUint,
    d_q: BigUint,
    p_inverse: BigUint,
}

impl KeyMaterial {
    /// Generates two distinct `bits`-bit primes usable with `e = 3`.
    pub fn generate<R: Rng + ?Sized>(bits: u64, rng: &mut R) -> Result<Self> {
        if bits < 8 {
            return Err(Error::KeyGeneration(format!(
                "primes of {} bits are too small",
                bits
            )));
        }

        let p = Self::exponent_friendly_prime(bits, rng);
        let mut q = Self::exponent_friendly_prime(bits, rng);
        while q == p {
            q = Self::exponent_friendly_prime(bits, rng);
        }

        let n = &p * &q;
        let phi = (&p - 1u32) * (&q - 1u32);
        let d = mod_inverse(&BigUint::from(PUBLIC_EXPONENT), &phi).ok_or_else(|| {
            Error::KeyGeneration("public exponent is not invertible mod phi(n)".to_owned())
        })?;

        Self::assemble(d, n, p, q)
    }

    /// Rebuilds key material from its persisted parts.
    ///
    /// Rejects parts that do not form a key pair for `e = 3`.
    pub fn from_parts(d: BigUint, n: BigUint, p: BigUint, q: BigUint) -> Result<Self> {
        let keys = Self::assemble(d, n, p, q)?;
        let phi = (&keys.p - 1u32) * (&keys.q - 1u32);
        if !(&keys.d * PUBLIC_EXPONENT % &phi).is_one() {
            return Err(Error::parse("key material", "d is not the inverse of 3 mod phi(n)"));
        }
        Ok(keys)
    }

    /// Checks the factorisation and precomputes the CRT parameters, whatever
    /// the public exponent.
    fn assemble(d: BigUint, n: BigUint, p: BigUint, q: BigUint) -> Result<Self> {
        let two = BigUint::from(2u32);
        if p < two || q < two {
            return Err(Error::parse("key material", "factors must be at least 2"));
        }
        if p == q || &p * &q != n {
            return Err(Error::parse("key material", "n is not the product of two distinct factors"));
        }
        let p_inverse = mod_inverse(&p, &q)
            .ok_or_else(|| Error::parse("key material", "p has no inverse mod q"))?;

        Ok(KeyMaterial {
            d_p: &d % (&p - 1u32),
            d_q: &d % (&q - 1u32),
            p_inverse,
            p,
            q,
            n,
            d,
        })
    }

    fn exponent_friendly_prime<R: Rng + ?Sized>(bits: u64, rng: &mut R) -> BigUint {
        loop {
            let prime = generate_prime(bits, rng);
            if !(&prime - 1u32).is_multiple_of(&BigUint::from(PUBLIC_EXPONENT)) {
                return prime;
            }
        }
    }

    /// Computes `value^d mod n` using the Chinese Remainder Theorem.
    ///
    /// Signs a blinded commitment on the registration side and decrypts a
    /// cube-exponent submission on the voting side.
    pub fn crypt_op(&self, value: &BigUint) -> BigUint {
        let (p, q) = (&self.p, &self.q);

        let x1 = (value % p).modpow(&self.d_p, p);
        let x2 = (value % q).modpow(&self.d_q, q);

        // x1 + p * ((x2 - x1) * p^-1 mod q), kept non-negative
        let difference = (x2 + q - (&x1 % q)) % q;
        x1 + p * (difference * &self.p_inverse % q)
    }
}

/// The public cube-exponent operation.
pub fn encrypt(value: &BigUint, n: &BigUint) -> BigUint {
    value.modpow(&BigUint::from(PUBLIC_EXPONENT), n)
}

#[cfg(test)]
mod tests {
    use num_bigint::RandBigInt;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    fn parts(d: u32, n: u32, p: u32, q: u32) -> (BigUint, BigUint, BigUint, BigUint) {
        (BigUint::from(d), BigUint::from(n), BigUint::from(p), BigUint::from(q))
    }

    /// p = 61, q = 53 with e = 17; p - 1 is a multiple of 3, so only the
    /// unchecked constructor accepts it.
    fn textbook_keys() -> KeyMaterial {
        let (d, n, p, q) = parts(2753, 3233, 61, 53);
        KeyMaterial::assemble(d, n, p, q).unwrap()
    }

    #[test]
    fn textbook_crt_round_trip() {
        let keys = textbook_keys();
        let cipher_text = BigUint::from(65u32).modpow(&BigUint::from(17u32), &keys.n);
        assert_eq!(cipher_text, BigUint::from(2790u32));
        assert_eq!(keys.crypt_op(&cipher_text), BigUint::from(65u32));
    }

    #[test]
    fn crt_matches_plain_exponentiation() {
        let keys = textbook_keys();
        for value in (0u32..3233).step_by(97) {
            let value = BigUint::from(value);
            assert_eq!(keys.crypt_op(&value), value.modpow(&keys.d, &keys.n));
        }
    }

    #[test]
    fn generated_keys_satisfy_constraints() {
        let mut rng = StdRng::seed_from_u64(42);
        let keys = KeyMaterial::generate(64, &mut rng).unwrap();

        let three = BigUint::from(3u32);
        assert_ne!(keys.p, keys.q);
        assert_eq!(&keys.p * &keys.q, keys.n);
        assert!(!(&keys.p - 1u32).is_multiple_of(&three));
        assert!(!(&keys.q - 1u32).is_multiple_of(&three));

        let phi = (&keys.p - 1u32) * (&keys.q - 1u32);
        assert!((&keys.d * &three % &phi).is_one());
    }

    #[test]
    fn cube_then_crypt_op_is_identity() {
        let mut rng = StdRng::seed_from_u64(5);
        let keys = KeyMaterial::generate(64, &mut rng).unwrap();
        for _ in 0..50 {
            let x = rng.gen_biguint_below(&keys.n);
            assert_eq!(keys.crypt_op(&encrypt(&x, &keys.n)), x);
        }
        assert_eq!(keys.crypt_op(&encrypt(&keys.p, &keys.n)), keys.p);
    }

    #[test]
    fn rejects_tiny_primes() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(matches!(
            KeyMaterial::generate(4, &mut rng),
            Err(Error::KeyGeneration(_))
        ));
    }

    #[test]
    fn rejects_inconsistent_parts() {
        let (d, n, p, q) = parts(2753, 3234, 61, 53);
        assert!(matches!(
            KeyMaterial::from_parts(d, n, p, q),
            Err(Error::Parse { .. })
        ));
    }

    #[test]
    fn small_key_from_parts() {
        // p = 11, q = 17, phi = 160, 3 * 107 = 2 * 160 + 1
        let (d, n, p, q) = parts(107, 187, 11, 17);
        let keys = KeyMaterial::from_parts(d, n, p, q).unwrap();
        for value in 0u32..187 {
            let value = BigUint::from(value);
            assert_eq!(keys.crypt_op(&encrypt(&value, &keys.n)), value);
        }
    }

    #[test]
    fn rejects_wrong_private_exponent() {
        let (d, n, p, q) = parts(7, 187, 11, 17);
        assert!(matches!(
            KeyMaterial::from_parts(d, n, p, q),
            Err(Error::Parse { .. })
        ));
        // no d works when 3 divides p - 1
        let (d, n, p, q) = parts(7, 3233, 61, 53);
        assert!(KeyMaterial::from_parts(d, n, p, q).is_err());
    }

    #[test]
    fn rejects_trivial_factors() {
        let (d, n, p, q) = parts(3, 3233, 1, 3233);
        assert!(matches!(
            KeyMaterial::from_parts(d, n, p, q),
            Err(Error::Parse { .. })
        ));
        let (d, n, p, q) = parts(3, 0, 0, 5);
        assert!(KeyMaterial::from_parts(d, n, p, q).is_err());
    }

    #[test]
    fn rejects_factors_sharing_a_divisor() {
        let (d, n, p, q) = parts(5, 24, 6, 4);
        assert!(matches!(
            KeyMaterial::assemble(d, n, p, q),
            Err(Error::Parse { .. })
        ));
    }
}
