//! RSA as RDP uses it: little-endian integers, fixed public exponent 65537,
//! no padding scheme beyond what MS-RDPBCGR's Proprietary Certificate and
//! Security Exchange PDU already define at the framing layer.

use num_bigint::BigUint;
use num_traits::One;

use crate::bigint::{fill_random, mod_inverse, random_prime};

/// An RSA public key as carried in an RSA1 blob.
#[derive(Clone, Debug, PartialEq)]
pub struct PublicKey {
    pub modulus: BigUint,
    pub exponent: BigUint,
    /// Length in bytes of the *true* RSA modulus (excludes the 8 trailing
    /// zero padding bytes RDP always appends in the wire blob).
    pub modulus_bytes: usize,
}

/// An RSA key pair, used only for the forged server certificate.
#[derive(Clone, Debug)]
pub struct KeyPair {
    pub public: PublicKey,
    pub private_exponent: BigUint,
}

impl KeyPair {
    /// Generate a fresh key pair whose true modulus is `modulus_bytes`
    /// bytes long (`bit_len = 8 * modulus_bytes`, the `key_len` written
    /// into the wire blob is `modulus_bytes + 8`).
    pub fn generate(modulus_bytes: usize) -> Self {
        let bits = (modulus_bytes * 8) as u64;
        let half = bits / 2;
        let e = BigUint::from(65537u32);

        loop {
            let p = random_prime(half);
            let q = random_prime(bits - half);
            if p == q {
                continue;
            }
            let n = &p * &q;
            if n.bits() as u64 != bits {
                continue;
            }
            let one = BigUint::one();
            let phi = (&p - &one) * (&q - &one);
            let Some(d) = mod_inverse(&e, &phi) else {
                continue;
            };
            return KeyPair {
                public: PublicKey { modulus: n, exponent: e, modulus_bytes },
                private_exponent: d,
            };
        }
    }

}

/// Serialize `n` little-endian, zero-padded to `max_len` bytes, then strip
/// trailing (most-significant) zero bytes — RDP's wire convention for
/// integers, matching the reference implementation's
/// `int.to_bytes(N, "little").rstrip(b"\x00")`.
pub fn le_bytes_stripped(n: &BigUint, max_len: usize) -> Vec<u8> {
    let mut buf = n.to_bytes_le();
    if buf.len() < max_len {
        buf.resize(max_len, 0);
    }
    while buf.len() > 1 && *buf.last().unwrap() == 0 {
        buf.pop();
    }
    buf
}

/// RSA-encrypt `m` (little-endian plaintext bytes) against `key`.
pub fn encrypt(m: &[u8], key: &PublicKey) -> Vec<u8> {
    let r = BigUint::from_bytes_le(m);
    let c = r.modpow(&key.exponent, &key.modulus);
    le_bytes_stripped(&c, key.modulus_bytes + 8)
}

/// RSA-decrypt ciphertext `c` (little-endian bytes) using the private
/// exponent `d` against modulus `n`.
pub fn decrypt(c: &[u8], d: &BigUint, n: &BigUint, modulus_bytes: usize) -> Vec<u8> {
    let s = BigUint::from_bytes_le(c);
    let m = s.modpow(d, n);
    le_bytes_stripped(&m, modulus_bytes + 8)
}

/// Serialize the true modulus (no 8-byte padding) little-endian, zero
/// padded to exactly `modulus_bytes` — used when splicing a forged modulus
/// into a captured certificate blob.
pub fn modulus_to_wire_bytes(n: &BigUint, modulus_bytes: usize) -> Vec<u8> {
    let mut buf = n.to_bytes_le();
    buf.resize(modulus_bytes, 0);
    buf
}

/// Fill a caller-provided buffer with random bytes (used for RSA blinding
/// material / padding elsewhere in the crate).
pub fn random_bytes(buf: &mut [u8]) {
    fill_random(buf);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_small_key() {
        // 56-byte modulus ~ matches a forged key for a 64-byte server field.
        let kp = KeyPair::generate(56);
        assert_eq!(kp.public.modulus_bytes, 56);

        let mut plaintext = [0u8; 32];
        plaintext[0] = 1; // keep top byte non-zero so no precision is lost
        plaintext[31] = 0xAB;
        let ct = encrypt(&plaintext, &kp.public);
        let pt = decrypt(&ct, &kp.private_exponent, &kp.public.modulus, kp.public.modulus_bytes);

        assert_eq!(&pt[..32], &plaintext[..]);
    }

    #[test]
    fn forged_modulus_byte_length_invariant() {
        // spec.md: bit_len == 8*key_len - 64, i.e. true modulus bytes ==
        // wire key_len - 8.
        let wire_key_len = 64usize;
        let modulus_bytes = wire_key_len - 8;
        let kp = KeyPair::generate(modulus_bytes);
        let wire = modulus_to_wire_bytes(&kp.public.modulus, modulus_bytes);
        assert_eq!(wire.len(), modulus_bytes);
        assert_eq!(8 * modulus_bytes, 8 * wire_key_len - 64);
    }
}
