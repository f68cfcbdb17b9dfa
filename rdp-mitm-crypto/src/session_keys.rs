//! RDP Standard Security (non-FIPS, 128-bit) session-key derivation.
//!
//! [MS-RDPBCGR] §5.3.5.1: a SHA1/MD5 salted-hash ladder over the client and
//! server randoms produces a master secret, then a session-key blob, from
//! which the MAC key and the four directional RC4 keys are sliced.

use crate::{md5, sha1};

/// The four symmetric keys derived from a client/server random pair, plus
/// the MAC key used for Slow-Path signature verification (not implemented
/// here — the proxy only needs to decrypt, not re-sign).
#[derive(Clone)]
pub struct SessionKeys {
    pub mac_key: [u8; 16],
    pub server_encrypt_key: [u8; 16],
    pub server_decrypt_key: [u8; 16],
    pub client_encrypt_key: [u8; 16],
    pub client_decrypt_key: [u8; 16],
}

fn salted_hash(s: &[u8], i: &[u8], client_rand: &[u8], server_rand: &[u8]) -> [u8; 16] {
    let sha = sha1!(i, s, client_rand, server_rand);
    md5!(s, &sha[..])
}

fn final_hash(k: &[u8], client_rand: &[u8], server_rand: &[u8]) -> [u8; 16] {
    md5!(k, client_rand, server_rand)
}

/// Derive session keys from the 32-byte client and server randoms.
///
/// Only the first 24 bytes of each random feed the pre-master secret, per
/// the spec; callers may pass longer randoms (the usual case) and this
/// function slices what it needs.
pub fn derive(client_rand: &[u8], server_rand: &[u8]) -> SessionKeys {
    let cr24 = &client_rand[..client_rand.len().min(24)];
    let sr24 = &server_rand[..server_rand.len().min(24)];

    let mut pre_master = Vec::with_capacity(48);
    pre_master.extend_from_slice(cr24);
    pre_master.extend_from_slice(sr24);

    let mut master_secret = Vec::with_capacity(48);
    master_secret.extend_from_slice(&salted_hash(&pre_master, b"A", client_rand, server_rand));
    master_secret.extend_from_slice(&salted_hash(&pre_master, b"BB", client_rand, server_rand));
    master_secret.extend_from_slice(&salted_hash(&pre_master, b"CCC", client_rand, server_rand));

    let mut session_key_blob = Vec::with_capacity(48);
    session_key_blob.extend_from_slice(&salted_hash(&master_secret, b"X", client_rand, server_rand));
    session_key_blob.extend_from_slice(&salted_hash(&master_secret, b"YY", client_rand, server_rand));
    session_key_blob.extend_from_slice(&salted_hash(&master_secret, b"ZZZ", client_rand, server_rand));

    let mut mac_key = [0u8; 16];
    mac_key.copy_from_slice(&session_key_blob[0..16]);

    let server_encrypt_key = final_hash(&session_key_blob[16..32], client_rand, server_rand);
    let server_decrypt_key = final_hash(&session_key_blob[32..48], client_rand, server_rand);

    SessionKeys {
        mac_key,
        server_encrypt_key,
        server_decrypt_key,
        client_encrypt_key: server_decrypt_key,
        client_decrypt_key: server_encrypt_key,
    }
}
