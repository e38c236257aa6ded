//! Encrypted script payloads (`.scr`)
//!
//! Scripts extracted from pack archives are stored as a four byte header
//! followed by the reversed, keystream-XORed text. See [`cipher`] for the
//! keystream itself.

pub mod cipher;

pub use cipher::{decrypt, encrypt, is_script, GameKey, Keystream, SCRIPT_MAGIC};

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::traits::{Decoded, HumanReadable, ParseOptions, ParseResult, Parser};
use crate::validation::ValidationReport;

/// A decrypted script
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptFile {
    pub key: GameKey,
    /// Plaintext bytes; usually ASCII but not guaranteed
    pub plain: Vec<u8>,
}

impl ScriptFile {
    pub fn new(plain: Vec<u8>, key: GameKey) -> Self {
        Self { key, plain }
    }

    /// Plaintext as text, replacing invalid UTF-8
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.plain).into_owned()
    }
}

impl HumanReadable for ScriptFile {
    fn to_readable_string(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Script ({:?}, {} bytes)", self.key, self.plain.len());
        out.push_str(&self.text());
        out
    }
}

/// Script cipher codec bound to one key
pub struct ScriptParser {
    key: GameKey,
}

impl ScriptParser {
    pub fn new() -> Self {
        Self::with_key(GameKey::default())
    }

    pub fn with_key(key: GameKey) -> Self {
        Self { key }
    }

    pub fn key(&self) -> GameKey {
        self.key
    }
}

impl Default for ScriptParser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser for ScriptParser {
    type Output = ScriptFile;

    fn extensions(&self) -> &[&str] {
        &["scr"]
    }

    fn magic_bytes(&self) -> Option<&[u8]> {
        Some(SCRIPT_MAGIC)
    }

    fn name(&self) -> &str {
        "SCR Script Cipher"
    }

    fn decode(&self, data: &[u8], _options: &ParseOptions) -> ParseResult<Decoded<ScriptFile>> {
        let plain = decrypt(data, self.key)?;
        tracing::debug!("Decrypted script: {} bytes", plain.len());
        Ok(Decoded::new(ScriptFile::new(plain, self.key), ValidationReport::default()))
    }

    fn serialize(&self, value: &ScriptFile) -> ParseResult<Vec<u8>> {
        Ok(encrypt(&value.plain, value.key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parser_round_trip() {
        let parser = ScriptParser::new();
        let encrypted = encrypt(b"SET VAR 1 = 0\n", GameKey::JointOps);

        let script = parser.parse(&encrypted).unwrap();
        assert_eq!(script.text(), "SET VAR 1 = 0\n");
        assert_eq!(parser.serialize(&script).unwrap(), encrypted);
    }

    #[test]
    fn test_wrong_key_garbles() {
        let encrypted = encrypt(b"plain text", GameKey::JointOps);
        let script = ScriptParser::with_key(GameKey::Custom(7)).parse(&encrypted).unwrap();
        assert_ne!(script.plain, b"plain text");
    }
}
