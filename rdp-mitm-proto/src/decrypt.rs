//! Packet decrypt wrapper: locates the encrypted tail of a Fast-Path or
//! Slow-Path frame and RC4-decrypts it in place, returning `header ||
//! cleartext`. Frames too short to carry a Slow-Path security header, or
//! frames from a session that hasn't derived keys yet, pass through
//! unchanged.

use crate::framer::is_fast_path;
use crate::session::Session;

const SEC_ENCRYPT: u16 = 0x0008;

/// Decrypt `bytes` (one direction's single frame) if standard-security
/// symmetric encryption is active for `session`, using the RC4 state for
/// whichever direction `from_client` indicates.
pub fn decrypt_frame(bytes: &[u8], from_client: bool, session: &mut Session) -> Vec<u8> {
    if !session.encryption_enabled() {
        return bytes.to_vec();
    }

    let (offset, encrypted) = if is_fast_path(bytes) {
        fast_path_payload_offset(bytes)
    } else {
        slow_path_payload_offset(bytes)
    };

    let Some(offset) = offset else { return bytes.to_vec() };
    if !encrypted || offset > bytes.len() {
        return bytes.to_vec();
    }

    let rc4 = if from_client { session.client_to_server.as_mut() } else { session.server_to_client.as_mut() };
    let Some(rc4) = rc4 else { return bytes.to_vec() };

    if rc4.packets_processed() >= rdp_mitm_crypto::rc4::REKEY_INTERVAL {
        tracing::trace!(from_client, "rekeying RC4 session key after {} packets", rdp_mitm_crypto::rc4::REKEY_INTERVAL);
    }

    let mut body = bytes[offset..].to_vec();
    rc4.decrypt(&mut body);

    let mut out = bytes[..offset].to_vec();
    out.extend_from_slice(&body);
    out
}

fn fast_path_payload_offset(bytes: &[u8]) -> (Option<usize>, bool) {
    if bytes.len() < 2 {
        return (None, false);
    }
    let is_encrypted = bytes[0] >> 7 == 1;
    let has_opt_length = bytes[1] >= 0x80;
    let mut offset = 2;
    if has_opt_length {
        offset += 1;
    }
    if is_encrypted {
        offset += 8;
    }
    (Some(offset), is_encrypted)
}

fn slow_path_payload_offset(bytes: &[u8]) -> (Option<usize>, bool) {
    if bytes.len() <= 15 {
        return (None, false);
    }
    let mut offset = 13;
    if bytes[offset] >= 0x80 {
        offset += 1;
    }
    offset += 1;
    if offset + 2 > bytes.len() {
        return (None, false);
    }
    let security_flags = u16::from_le_bytes([bytes[offset], bytes[offset + 1]]);
    let is_encrypted = security_flags & SEC_ENCRYPT != 0;
    if is_encrypted {
        offset += 12;
    }
    (Some(offset), is_encrypted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdp_mitm_crypto::Rc4State;

    #[test]
    fn passthrough_when_encryption_not_enabled() {
        let mut session = Session::new();
        let frame = b"\x03\x00\x00\x10untouched bytes".to_vec();
        assert_eq!(decrypt_frame(&frame, true, &mut session), frame);
    }

    #[test]
    fn fast_path_encrypted_body_is_decrypted() {
        let mut session = Session::new();
        session.crypto.client_rand = vec![1; 32];
        session.security = crate::session::SecurityState::Established;
        session.client_to_server = Some(Rc4State::new([0x42; 16]));
        session.server_to_client = Some(Rc4State::new([0x24; 16]));

        let plaintext = b"top secret payload".to_vec();
        let mut ciphertext = plaintext.clone();
        Rc4State::new([0x42; 16]).decrypt(&mut ciphertext);

        // header byte 0 % 4 == 0 with bit 7 set (encrypted), byte 1 small length, 8 MAC bytes, then ciphertext.
        let mut frame = vec![0x80u8, (2 + 8 + ciphertext.len()) as u8];
        frame.extend_from_slice(&[0u8; 8]);
        frame.extend_from_slice(&ciphertext);

        let out = decrypt_frame(&frame, true, &mut session);
        assert_eq!(&out[10..], &plaintext[..]);
    }
}
