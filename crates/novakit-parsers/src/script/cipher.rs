//! Keyed XOR stream used by encrypted script payloads
//!
//! The keystream comes from a 32-bit state seeded with a per-title key.
//! Each byte advances the state once; the state is never reset, so the
//! same key must be applied from the first byte of the body.
//!
//! ```text
//! encrypt:  plain ──xor──► reverse ──► "SCR\x01" + body
//! decrypt:  "SCR\x01" + body ──► reverse ──xor──► plain
//! ```

use serde::{Deserialize, Serialize};

use crate::traits::{ParseError, ParseResult};

/// Four byte header of an encrypted script
pub const SCRIPT_MAGIC: &[u8; 4] = b"SCR\x01";

/// Keystream seed for a game family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum GameKey {
    /// Joint Operations and the Delta Force Xtreme titles
    #[default]
    JointOps,
    Custom(u32),
}

impl GameKey {
    pub fn seed(self) -> u32 {
        match self {
            GameKey::JointOps => 0x2A5A_8EAD,
            GameKey::Custom(seed) => seed,
        }
    }
}

/// Running keystream state
#[derive(Debug, Clone)]
pub struct Keystream {
    state: u32,
}

impl Keystream {
    pub fn new(key: GameKey) -> Self {
        Self { state: key.seed() }
    }

    /// Advance once and return the next key byte
    pub fn next_byte(&mut self) -> u8 {
        let rotated = self.state.rotate_left(11);
        self.state = self.state.wrapping_add(rotated).rotate_left(4) ^ 1;
        self.state as u8
    }

    /// XOR `data` in place with the keystream
    pub fn apply(&mut self, data: &mut [u8]) {
        for byte in data {
            *byte ^= self.next_byte();
        }
    }
}

/// Whether `data` starts with the script header
pub fn is_script(data: &[u8]) -> bool {
    data.starts_with(SCRIPT_MAGIC)
}

/// Encrypt a plaintext script
pub fn encrypt(plain: &[u8], key: GameKey) -> Vec<u8> {
    let mut body = plain.to_vec();
    Keystream::new(key).apply(&mut body);
    body.reverse();

    let mut out = Vec::with_capacity(SCRIPT_MAGIC.len() + body.len());
    out.extend_from_slice(SCRIPT_MAGIC);
    out.extend_from_slice(&body);
    out
}

/// Decrypt an encrypted script, header included
pub fn decrypt(data: &[u8], key: GameKey) -> ParseResult<Vec<u8>> {
    if data.len() < SCRIPT_MAGIC.len() {
        return Err(ParseError::truncated(
            0,
            "script_magic",
            SCRIPT_MAGIC.len() as u64,
            data.len() as u64,
        ));
    }
    if !is_script(data) {
        return Err(ParseError::malformed(
            0,
            "script_magic",
            format!("expected SCR\\x01, found {:02X?}", &data[..SCRIPT_MAGIC.len()]),
        ));
    }

    let mut body = data[SCRIPT_MAGIC.len()..].to_vec();
    body.reverse();
    Keystream::new(key).apply(&mut body);
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::ErrorKind;

    #[test]
    fn test_keystream_first_bytes() {
        // state0 = 0x2A5A8EAD
        // rotl(state0, 11) = 0xD4756952, sum = 0xFECFF7FF
        // rotl(sum, 4) = 0xECFF7FFF, ^1 = 0xECFF7FFE
        let mut stream = Keystream::new(GameKey::JointOps);
        assert_eq!(stream.next_byte(), 0xFE);
        assert_eq!(stream.state, 0xECFF_7FFE);
    }

    #[test]
    fn test_state_carries_across_bytes() {
        let mut stream = Keystream::new(GameKey::JointOps);
        let first: Vec<u8> = (0..8).map(|_| stream.next_byte()).collect();
        let mut again = Keystream::new(GameKey::JointOps);
        let second: Vec<u8> = (0..8).map(|_| again.next_byte()).collect();
        assert_eq!(first, second);

        let mut zeros = [0u8; 8];
        Keystream::new(GameKey::JointOps).apply(&mut zeros);
        assert_eq!(zeros.to_vec(), first);
    }

    #[test]
    fn test_encrypt_layout() {
        let plain = b"AB";
        let encrypted = encrypt(plain, GameKey::JointOps);

        let mut stream = Keystream::new(GameKey::JointOps);
        let k0 = stream.next_byte();
        let k1 = stream.next_byte();

        assert_eq!(&encrypted[..4], SCRIPT_MAGIC);
        // body is reversed after the xor
        assert_eq!(encrypted[4], b'B' ^ k1);
        assert_eq!(encrypted[5], b'A' ^ k0);
    }

    #[test]
    fn test_decrypt_inverts_encrypt() {
        let plain = b"IF EVENT 3 THEN END MISSION";
        for key in [GameKey::JointOps, GameKey::Custom(0), GameKey::Custom(0xA55B_1EED)] {
            let encrypted = encrypt(plain, key);
            assert!(is_script(&encrypted));
            assert_eq!(decrypt(&encrypted, key).unwrap(), plain);
        }
    }

    #[test]
    fn test_header_only() {
        assert!(decrypt(SCRIPT_MAGIC, GameKey::JointOps).unwrap().is_empty());
    }

    #[test]
    fn test_short_and_bad_headers() {
        let err = decrypt(b"SC", GameKey::JointOps).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TruncatedData);

        let err = decrypt(b"SCR\x02data", GameKey::JointOps).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedHeader);
    }
}
