//! Per-connection state: security negotiation progress, the crypto material
//! recovered from the key exchange, and the credentials captured so far.
//!
//! A [`Session`] is owned exclusively by the connection's orchestrator task;
//! nothing here is global, matching the "no global mutable state" design
//! note — each accepted connection starts from [`Session::new`].

use rdp_mitm_crypto::rsa::{KeyPair, PublicKey};
use rdp_mitm_crypto::{Rc4State, SessionKeys};

/// Where a connection is in the security negotiation handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityState {
    /// Negotiation request/response not yet exchanged.
    Negotiating,
    /// Negotiation complete; holds the (possibly downgraded) protocol flags.
    Standard(u8),
    /// Session keys derived, RC4 states initialized; decrypting traffic.
    Established,
}

/// Crypto material accumulated over the course of one key exchange.
#[derive(Default)]
pub struct CryptoContext {
    pub server_modulus: Vec<u8>,
    pub server_pub_exponent: u32,
    pub server_data_len: u32,
    pub server_random: Vec<u8>,
    pub server_sign: Vec<u8>,
    pub server_first5fields: Vec<u8>,
    pub server_pubkey_blob: Vec<u8>,

    /// The server's real public key, parsed from `server_modulus` /
    /// `server_pub_exponent` once the certificate has been extracted.
    pub server_public_key: Option<PublicKey>,

    /// Freshly generated key pair this proxy substitutes for the server's.
    pub forged_key: Option<KeyPair>,

    /// Ciphertext the client produced against `forged_key`.
    pub enc_client_rand: Vec<u8>,
    /// Recovered plaintext client random.
    pub client_rand: Vec<u8>,

    pub session_keys: Option<SessionKeys>,
}

impl CryptoContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Session keys exist only once both randoms are known and the
    /// derivation has run; the client-random extractor gates on this.
    pub fn has_client_rand(&self) -> bool {
        !self.client_rand.is_empty()
    }

    pub fn has_server_cert(&self) -> bool {
        !self.server_pubkey_blob.is_empty()
    }
}

/// NTLMv2-relevant and keyboard artifacts captured during the session.
#[derive(Default)]
pub struct CapturedArtifacts {
    pub server_challenge: Option<[u8; 8]>,
    /// First 16 bytes of the NTLMv2 response blob (the HMAC-MD5 digest).
    pub nt_response: Option<[u8; 16]>,
    pub keyboard_info: Option<KeyboardInfo>,
    /// Protocol flags the client requested after the proxy's downgrade.
    pub rdp_protocol: Option<u8>,
    /// Protocol flags the client originally requested, before downgrade.
    pub rdp_protocol_old: Option<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyboardInfo {
    pub layout: u32,
    pub kind: u32,
    pub subtype: u32,
    pub funckey: u32,
}

/// All per-connection state, from accept to teardown.
pub struct Session {
    pub security: SecurityState,
    pub crypto: CryptoContext,
    pub captured: CapturedArtifacts,
    /// RC4 state decrypting client-to-server traffic (keyed with
    /// `server_decrypt_key`).
    pub client_to_server: Option<Rc4State>,
    /// RC4 state decrypting server-to-client traffic (keyed with
    /// `client_decrypt_key`).
    pub server_to_client: Option<Rc4State>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            security: SecurityState::Negotiating,
            crypto: CryptoContext::new(),
            captured: CapturedArtifacts::default(),
            client_to_server: None,
            server_to_client: None,
        }
    }

    /// `true` once standard-security symmetric encryption is live and
    /// inbound frames must be RC4-decrypted before extractors run.
    pub fn encryption_enabled(&self) -> bool {
        matches!(self.security, SecurityState::Established) && self.crypto.has_client_rand()
    }

    /// Derive session keys from the now-known client/server randoms and
    /// initialize both directional RC4 states. Moves the session into
    /// `Established`.
    pub fn establish(&mut self) {
        let keys = rdp_mitm_crypto::session_keys::derive(&self.crypto.client_rand, &self.crypto.server_random);
        self.client_to_server = Some(Rc4State::new(keys.server_decrypt_key));
        self.server_to_client = Some(Rc4State::new(keys.client_decrypt_key));
        self.crypto.session_keys = Some(keys);
        self.security = SecurityState::Established;
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
