//! The well-known Microsoft "Terminal Services" RSA signing key.
//!
//! Published in [MS-RDPBCGR] §5.3.3.1.1. Its private exponent being public
//! is exactly what lets this proxy forge a Proprietary Certificate the
//! client will accept: any party can produce a signature the client
//! recognizes as "signed by Microsoft".

use num_bigint::BigUint;

use crate::md5;

/// 512-bit modulus, little-endian, as published in MS-RDPBCGR.
#[rustfmt::skip]
const MODULUS_LE: [u8; 64] = [
    0x3d, 0x3a, 0x5e, 0xbd, 0x72, 0x43, 0x3e, 0xc9, 0x4d, 0xbb, 0xc1,
    0x1e, 0x4a, 0xba, 0x5f, 0xcb, 0x3e, 0x88, 0x20, 0x87, 0xef, 0xf5,
    0xc1, 0xe2, 0xd7, 0xb7, 0x6b, 0x9a, 0xf2, 0x52, 0x45, 0x95, 0xce,
    0x63, 0x65, 0x6b, 0x58, 0x3a, 0xfe, 0xef, 0x7c, 0xe7, 0xbf, 0xfe,
    0x3d, 0xf6, 0x5c, 0x7d, 0x6c, 0x5e, 0x06, 0x09, 0x1a, 0xf5, 0x61,
    0xbb, 0x20, 0x93, 0x09, 0x5f, 0x05, 0x6d, 0xea, 0x87,
];

/// Private exponent, little-endian.
#[rustfmt::skip]
const PRIVATE_EXPONENT_LE: [u8; 64] = [
    0x87, 0xa7, 0x19, 0x32, 0xda, 0x11, 0x87, 0x55, 0x58, 0x00, 0x16,
    0x16, 0x25, 0x65, 0x68, 0xf8, 0x24, 0x3e, 0xe6, 0xfa, 0xe9, 0x67,
    0x49, 0x94, 0xcf, 0x92, 0xcc, 0x33, 0x99, 0xe8, 0x08, 0x60, 0x17,
    0x9a, 0x12, 0x9f, 0x24, 0xdd, 0xb1, 0x24, 0x99, 0xc7, 0x3a, 0xb8,
    0x0a, 0x7b, 0x0d, 0xdd, 0x35, 0x07, 0x79, 0x17, 0x0b, 0x51, 0x9b,
    0xb3, 0xc7, 0x10, 0x01, 0x13, 0xe7, 0x3f, 0xf3, 0x5f,
];

/// Public exponent, little-endian.
const PUBLIC_EXPONENT_LE: [u8; 4] = [0x5b, 0x7b, 0x88, 0xc0];

/// The fixed 512-bit Terminal Services key pair.
pub struct TerminalServicesKey;

impl TerminalServicesKey {
    pub fn modulus() -> BigUint {
        BigUint::from_bytes_le(&MODULUS_LE)
    }

    pub fn private_exponent() -> BigUint {
        BigUint::from_bytes_le(&PRIVATE_EXPONENT_LE)
    }

    pub fn public_exponent() -> BigUint {
        BigUint::from_bytes_le(&PUBLIC_EXPONENT_LE)
    }

    /// Sign `cert_bytes` (the first-5-fields header concatenated with the
    /// public key blob) and return a little-endian signature of exactly
    /// `sign_len` bytes.
    ///
    /// Padding layout (from the reference tool): `MD5(cert) || 0x00 ||
    /// 0xFF * 45 || 0x01`, interpreted as a little-endian integer and
    /// raised to `d` mod `n`.
    pub fn sign(cert_bytes: &[u8], sign_len: usize) -> Vec<u8> {
        let digest = md5!(cert_bytes);

        let mut padded = Vec::with_capacity(16 + 1 + 45 + 1);
        padded.extend_from_slice(&digest);
        padded.push(0x00);
        padded.extend(std::iter::repeat(0xFFu8).take(45));
        padded.push(0x01);

        let m = BigUint::from_bytes_le(&padded);
        let d = Self::private_exponent();
        let n = Self::modulus();
        let s = m.modpow(&d, &n);

        let mut out = s.to_bytes_le();
        out.resize(sign_len, 0);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modulus_is_512_bits() {
        let n = TerminalServicesKey::modulus();
        assert_eq!(n.bits(), 512);
    }

    #[test]
    fn sign_produces_requested_length() {
        let sig = TerminalServicesKey::sign(b"some certificate bytes", 64);
        assert_eq!(sig.len(), 64);
    }
}
