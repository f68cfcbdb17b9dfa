//! Error types for the proto layer. Parse failures never panic: every
//! extractor and tamper rule returns a `Result` so a malformed or
//! attacker-controlled frame ends at most the current session.

use thiserror::Error;

/// Errors raised while pulling structured fields out of a PDU.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("frame too short: needed at least {needed} bytes, got {got}")]
    Truncated { needed: usize, got: usize },

    #[error("expected public-key blob marker `RSA1`, got {0:?}")]
    BadPublicKeyMarker([u8; 4]),

    #[error("RSA1 bit_len invariant violated: bit_len={bit_len}, key_len={key_len}")]
    BadBitLenInvariant { bit_len: u32, key_len: u32 },

    #[error("no `020c` server-security-data marker found in buffer")]
    NoServerCertMarker,

    #[error("no `RSA1` marker found in buffer")]
    NoPublicKeyBlobMarker,

    #[error("utf-16 field is not valid utf-16")]
    InvalidUtf16,
}

/// Errors raised while rewriting a frame in flight.
#[derive(Debug, Error)]
pub enum TamperError {
    #[error("certificate self-check failed: recomputed signature does not match the captured one")]
    SignatureMismatch,
}
