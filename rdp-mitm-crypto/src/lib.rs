//! Cryptographic primitives for RDP Standard Security.
//!
//! Provides:
//! - RC4 stream cipher with the Update-Session-Keys rekey procedure
//! - Big-integer RSA (little-endian, RDP's wire convention) + in-process keygen
//! - The hard-coded Terminal Services certificate-signing key
//! - The RDP session-key derivation ladder (SHA1/MD5 salted hashes)

#![forbid(unsafe_code)]

pub mod bigint;
mod hash;
pub mod rc4;
pub mod rsa;
pub mod session_keys;
pub mod ts_key;

pub use rc4::Rc4State;
pub use session_keys::SessionKeys;
pub use ts_key::TerminalServicesKey;
