//! RC4 stream cipher with the RDP Standard Security rekey discipline.
//!
//! Keyed S-box + PRGA, same structure as any textbook RC4 implementation,
//! plus the per-direction packet counter and Update-Session-Keys procedure
//! from [MS-RDPBCGR] §5.3.7.

use crate::{md5, sha1};

/// Number of packets encrypted/decrypted before a rekey is due.
pub const REKEY_INTERVAL: u32 = 4096;

/// One direction's RC4 state (client→server or server→client).
#[derive(Clone)]
pub struct Rc4State {
    sbox: [u8; 256],
    i: u8,
    j: u8,
    /// The key currently loaded into the S-box, kept around so a rekey can
    /// derive the next generation from it.
    current_key: [u8; 16],
    /// The original (first-generation) key, needed by the RDP key-update
    /// formula which always salts from `key0`, not from the previous
    /// generation.
    initial_key: [u8; 16],
    encrypted_packets: u32,
}

impl Rc4State {
    /// Initialize a fresh cipher state from a 16-byte RDP session key.
    pub fn new(key: [u8; 16]) -> Self {
        let mut state = Self {
            sbox: [0; 256],
            i: 0,
            j: 0,
            current_key: key,
            initial_key: key,
            encrypted_packets: 0,
        };
        state.init_sbox(&key);
        state
    }

    fn init_sbox(&mut self, key: &[u8; 16]) {
        for (i, b) in self.sbox.iter_mut().enumerate() {
            *b = i as u8;
        }
        let mut j: u8 = 0;
        for i in 0..256 {
            j = j.wrapping_add(self.sbox[i]).wrapping_add(key[i % key.len()]);
            self.sbox.swap(i, j as usize);
        }
        self.i = 0;
        self.j = 0;
    }

    fn prga_next(&mut self) -> u8 {
        self.i = self.i.wrapping_add(1);
        self.j = self.j.wrapping_add(self.sbox[self.i as usize]);
        self.sbox.swap(self.i as usize, self.j as usize);
        self.sbox[(self.sbox[self.i as usize].wrapping_add(self.sbox[self.j as usize])) as usize]
    }

    /// Decrypt (equivalently, encrypt — RC4 is symmetric) `data` in place,
    /// rekeying first if the packet counter has reached [`REKEY_INTERVAL`].
    pub fn decrypt(&mut self, data: &mut [u8]) {
        if self.encrypted_packets >= REKEY_INTERVAL {
            self.update_key();
        }
        for b in data.iter_mut() {
            *b ^= self.prga_next();
        }
        self.encrypted_packets += 1;
    }

    /// Perform RDP's Update-Session-Keys procedure ([MS-RDPBCGR] §5.3.7):
    ///
    /// ```text
    /// pad1 = 0x36 repeated 40 times
    /// pad2 = 0x5c repeated 48 times
    /// temp_key  = MD5(key0 || SHA1(key0 || pad1 || current_key))
    /// new_key   = RC4(temp_key, temp_key) (first 16 bytes of the keystream
    ///             generated from `temp_key` applied to itself)
    /// ```
    ///
    /// `key0` is always the first-generation key, never the previous one.
    pub fn update_key(&mut self) {
        const PAD1: [u8; 40] = [0x36; 40];
        const PAD2: [u8; 48] = [0x5c; 48];

        let sha = sha1!(&self.initial_key[..], &PAD1[..], &self.current_key[..]);
        let temp_key16 = md5!(&self.initial_key[..], &PAD2[..], &sha[..]);

        let mut new_key = temp_key16;
        let mut keystream_seed = Rc4State {
            sbox: [0; 256],
            i: 0,
            j: 0,
            current_key: temp_key16,
            initial_key: temp_key16,
            encrypted_packets: 0,
        };
        keystream_seed.init_sbox(&temp_key16);
        keystream_seed.decrypt(&mut new_key);

        self.current_key = new_key;
        self.init_sbox(&new_key);
        self.encrypted_packets = 0;
    }

    /// Number of packets processed since the last (re)key.
    pub fn packets_processed(&self) -> u32 {
        self.encrypted_packets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let key = [0x11u8; 16];
        let mut enc = Rc4State::new(key);
        let mut dec = Rc4State::new(key);

        let plain = b"the quick brown fox jumps over the lazy dog".to_vec();
        let mut buf = plain.clone();
        enc.decrypt(&mut buf);
        assert_ne!(buf, plain);
        dec.decrypt(&mut buf);
        assert_eq!(buf, plain);
    }

    #[test]
    fn keystream_is_deterministic_per_key() {
        let mut a = Rc4State::new([0xab; 16]);
        let mut b = Rc4State::new([0xab; 16]);
        let mut buf_a = [0u8; 32];
        let mut buf_b = [0u8; 32];
        a.decrypt(&mut buf_a);
        b.decrypt(&mut buf_b);
        assert_eq!(buf_a, buf_b);
    }

    #[test]
    fn rekeys_after_interval() {
        let key = [0x22u8; 16];
        let mut state = Rc4State::new(key);
        let before = state.current_key;
        for _ in 0..REKEY_INTERVAL {
            let mut buf = [0u8; 1];
            state.decrypt(&mut buf);
        }
        assert_eq!(state.packets_processed(), 0, "rekey resets the counter");
        assert_ne!(state.current_key, before, "rekey must change the loaded key");
    }
}
