//! Minimal big-integer helpers RSA keygen needs that `num-bigint` doesn't
//! provide out of the box: modular inverse and probabilistic primality.

use num_bigint::{BigUint, RandBigInt};
use num_integer::Integer;
use num_traits::One;
use rand::RngCore;

/// Extended Euclidean algorithm over signed big integers, returning
/// `(gcd, x, y)` such that `a*x + b*y == gcd`.
fn extended_gcd(a: &BigUint, b: &BigUint) -> (BigUint, num_bigint::BigInt, num_bigint::BigInt) {
    use num_bigint::BigInt;
    let (mut old_r, mut r) = (BigInt::from(a.clone()), BigInt::from(b.clone()));
    let (mut old_s, mut s) = (BigInt::one(), BigInt::zero());
    let (mut old_t, mut t) = (BigInt::zero(), BigInt::one());

    while !r.is_zero() {
        let quotient = &old_r / &r;
        let new_r = &old_r - &quotient * &r;
        old_r = std::mem::replace(&mut r, new_r);
        let new_s = &old_s - &quotient * &s;
        old_s = std::mem::replace(&mut s, new_s);
        let new_t = &old_t - &quotient * &t;
        old_t = std::mem::replace(&mut t, new_t);
    }
    (old_r.to_biguint().expect("gcd is non-negative"), old_s, old_t)
}

/// Modular inverse of `a` mod `m`, assuming `gcd(a, m) == 1`.
pub fn mod_inverse(a: &BigUint, m: &BigUint) -> Option<BigUint> {
    let (g, x, _) = extended_gcd(&a.mod_floor(m), m);
    if g != BigUint::one() {
        return None;
    }
    let m_signed = num_bigint::BigInt::from(m.clone());
    let x = ((x % &m_signed) + &m_signed) % &m_signed;
    x.to_biguint()
}

/// Miller-Rabin primality test, deterministic-enough for freshly generated
/// candidates (not attacker-controlled input).
pub fn is_probably_prime(n: &BigUint, rounds: u32) -> bool {
    let one = BigUint::one();
    let two = &one + &one;

    if n < &two {
        return false;
    }
    if n == &two {
        return true;
    }
    if n.is_even() {
        return false;
    }

    let n_minus_1 = n - &one;
    let mut d = n_minus_1.clone();
    let mut r = 0u32;
    while d.is_even() {
        d >>= 1;
        r += 1;
    }

    let mut rng = rand::thread_rng();
    'witness: for _ in 0..rounds {
        let a = loop {
            let candidate = rng.gen_biguint_below(&n_minus_1);
            if candidate >= two {
                break candidate;
            }
        };
        let mut x = a.modpow(&d, n);
        if x == one || x == n_minus_1 {
            continue;
        }
        for _ in 0..r.saturating_sub(1) {
            x = x.modpow(&two, n);
            if x == n_minus_1 {
                continue 'witness;
            }
        }
        return false;
    }
    true
}

/// Generate a random probable prime of exactly `bits` bits (top bit set).
pub fn random_prime(bits: u64) -> BigUint {
    let mut rng = rand::thread_rng();
    loop {
        let mut candidate = rng.gen_biguint(bits);
        candidate.set_bit(bits - 1, true);
        candidate.set_bit(0, true); // odd
        if is_probably_prime(&candidate, 32) {
            return candidate;
        }
    }
}

/// Fill `buf` with cryptographically random bytes using the `rand` crate's
/// thread-local RNG (kept as a thin wrapper so callers don't need to depend
/// on `rand` directly for this one operation).
pub fn fill_random(buf: &mut [u8]) {
    rand::thread_rng().fill_bytes(buf);
}
