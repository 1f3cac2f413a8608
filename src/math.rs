use num_bigint::{BigInt, BigUint, RandBigInt, Sign};
use num_integer::Integer;
use num_traits::{One, Zero};
use rand::Rng;

const SMALL_PRIMES: [u32; 12] = [2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37];

///
/// Compute division in the multiplicative group mod `m` of `a/b`.
/// This equates to `a * mod_inverse(b, m)`.
pub fn mod_div(a: &BigUint, b: &BigUint, m: &BigUint) -> Option<BigUint> {
    mod_inverse(b, m).map(|inverse| a * inverse % m)
}

///
/// # Modular Inverse
///
/// Calculates the modular inverse `a^-1 mod m`, if `gcd(a, m) == 1`.
///
pub fn mod_inverse(a: &BigUint, m: &BigUint) -> Option<BigUint> {
    if m.is_zero() {
        return None;
    }
    let a = BigInt::from_biguint(Sign::Plus, a % m);
    let m = BigInt::from_biguint(Sign::Plus, m.clone());
    let (g, x) = extended_gcd(&a, &m);
    if !g.is_one() {
        return None;
    }
    // `mod_floor` keeps the representative non-negative, unlike `%`
    x.mod_floor(&m).to_biguint()
}

/// Returns `(gcd(a, b), x)` with `a*x + b*y == gcd(a, b)`.
fn extended_gcd(a: &BigInt, b: &BigInt) -> (BigInt, BigInt) {
    let (mut old_r, mut r) = (a.clone(), b.clone());
    let (mut old_x, mut x) = (BigInt::one(), BigInt::zero());

    while !r.is_zero() {
        let quotient = &old_r / &r;
        let next_r = &old_r - &quotient * &r;
        old_r = core::mem::replace(&mut r, next_r);
        let next_x = &old_x - &quotient * &x;
        old_x = core::mem::replace(&mut x, next_x);
    }
    (old_r, old_x)
}

/// Masks `value` with `mask` bit by bit.
pub fn xor(value: &BigUint, mask: &BigUint) -> BigUint {
    value ^ mask
}

/// Samples uniformly from `[0, bound)`.
pub fn random_below<R: Rng + ?Sized>(bound: &BigUint, rng: &mut R) -> BigUint {
    rng.gen_biguint_below(bound)
}

/// Samples uniformly from the units of `Z_bound`.
pub fn random_unit<R: Rng + ?Sized>(bound: &BigUint, rng: &mut R) -> BigUint {
    loop {
        let candidate = rng.gen_biguint_below(bound);
        if !candidate.is_zero() && candidate.gcd(bound).is_one() {
            return candidate;
        }
    }
}

/// Miller-Rabin primality test with `rounds` random witnesses.
pub fn is_probable_prime<R: Rng + ?Sized>(n: &BigUint, rounds: usize, rng: &mut R) -> bool {
    if *n < BigUint::from(2u32) {
        return false;
    }
    for small in SMALL_PRIMES.iter() {
        let small = BigUint::from(*small);
        if *n == small {
            return true;
        }
        if (n % &small).is_zero() {
            return false;
        }
    }

    let one = BigUint::one();
    let two = BigUint::from(2u32);
    let n_minus_one = n - &one;

    // n - 1 = d * 2^s with d odd
    let mut d = n_minus_one.clone();
    let mut s = 0u32;
    while d.is_even() {
        d >>= 1;
        s += 1;
    }

    'witness: for _ in 0..rounds {
        let a = rng.gen_biguint_range(&two, &n_minus_one);
        let mut x = a.modpow(&d, n);
        if x == one || x == n_minus_one {
            continue;
        }
        for _ in 1..s {
            x = x.modpow(&two, n);
            if x == n_minus_one {
                continue 'witness;
            }
        }
        return false;
    }
    true
}

/// Generates a random prime of exactly `bits` bits.
pub fn generate_prime<R: Rng + ?Sized>(bits: u64, rng: &mut R) -> BigUint {
    let top = BigUint::one() << (bits - 1) as usize;
    loop {
        let candidate = rng.gen_biguint(bits) | &top | BigUint::one();
        if is_probable_prime(&candidate, 32, rng) {
            return candidate;
        }
    }
}
