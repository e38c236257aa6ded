//! Script cipher properties

use novakit_parsers::script::{decrypt, encrypt, Keystream, SCRIPT_MAGIC};
use novakit_parsers::{ErrorKind, GameKey, Parser, ScriptParser};
use proptest::prelude::*;

fn any_key() -> impl Strategy<Value = GameKey> {
    prop_oneof![Just(GameKey::JointOps), any::<u32>().prop_map(GameKey::Custom)]
}

proptest! {
    #[test]
    fn decrypt_inverts_encrypt(plain in proptest::collection::vec(any::<u8>(), 0..512), key in any_key()) {
        let encrypted = encrypt(&plain, key);
        prop_assert_eq!(encrypted.len(), plain.len() + SCRIPT_MAGIC.len());
        prop_assert_eq!(&encrypted[..4], SCRIPT_MAGIC);
        prop_assert_eq!(decrypt(&encrypted, key).unwrap(), plain);
    }

    #[test]
    fn body_is_reversed_keystream(plain in proptest::collection::vec(any::<u8>(), 1..64), key in any_key()) {
        let encrypted = encrypt(&plain, key);
        let mut stream = Keystream::new(key);
        let mut expected: Vec<u8> = plain.iter().map(|b| b ^ stream.next_byte()).collect();
        expected.reverse();
        prop_assert_eq!(&encrypted[4..], expected.as_slice());
    }
}

#[test]
fn test_single_byte_script() {
    let encrypted = encrypt(b"X", GameKey::JointOps);
    assert_eq!(encrypted.len(), 5);
    assert_eq!(encrypted[4], b'X' ^ 0xFE);
}

#[test]
fn test_parser_rejects_short_input() {
    let parser = ScriptParser::new();
    assert_eq!(parser.parse(b"SC").unwrap_err().kind(), ErrorKind::TruncatedData);
    assert_eq!(parser.parse(b"SCR\x02abc").unwrap_err().kind(), ErrorKind::MalformedHeader);
    assert_eq!(parser.parse(&encrypt(b"", GameKey::JointOps)).unwrap().plain, b"");
}
