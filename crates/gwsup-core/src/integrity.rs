//! SHA-256 digests for release assets (hex form, as published next to each archive).

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{utils::io_error, GwsupError, Result};

pub const DIGEST_LEN: usize = 32;

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Sha256Digest([u8; DIGEST_LEN]);

impl Sha256Digest {
    /// All-zero digest used by unpublished placeholder releases.
    pub const PLACEHOLDER: Sha256Digest = Sha256Digest([0u8; DIGEST_LEN]);

    pub fn from_bytes(bytes: [u8; DIGEST_LEN]) -> Self {
        Self(bytes)
    }

    pub fn of_bytes(content: &[u8]) -> Self {
        Self(Sha256::digest(content).into())
    }

    /// Stream `reader` to the end and hash everything read.
    pub fn of_reader<R: Read>(mut reader: R) -> std::io::Result<Self> {
        let mut hasher = Sha256::new();
        let mut buf = [0u8; 64 * 1024];
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(Self(hasher.finalize().into()))
    }

    pub fn of_file(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| io_error("hash file", Some(path), e))?;
        Self::of_reader(file).map_err(|e| io_error("hash file", Some(path), e))
    }

    pub fn is_placeholder(&self) -> bool {
        self.0 == [0u8; DIGEST_LEN]
    }

    pub fn to_hex(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Sha256Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Sha256Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sha256Digest({})", self)
    }
}

impl FromStr for Sha256Digest {
    type Err = GwsupError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let s = s.strip_prefix("sha256:").unwrap_or(s);
        let invalid = |reason: &str| GwsupError::Formula {
            operation: "parse sha256".to_string(),
            source: format!("{}: {:?}", reason, s),
        };
        if s.len() != DIGEST_LEN * 2 {
            return Err(invalid("expected 64 hex characters"));
        }
        let mut out = [0u8; DIGEST_LEN];
        for (i, chunk) in s.as_bytes().chunks(2).enumerate() {
            let hi = hex_value(chunk[0]).ok_or_else(|| invalid("non-hex character"))?;
            let lo = hex_value(chunk[1]).ok_or_else(|| invalid("non-hex character"))?;
            out[i] = (hi << 4) | lo;
        }
        Ok(Self(out))
    }
}

fn hex_value(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

impl Serialize for Sha256Digest {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Sha256Digest {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Check `actual` against `expected`. A placeholder expected digest never verifies.
pub fn verify(expected: &Sha256Digest, actual: &Sha256Digest) -> bool {
    !expected.is_placeholder() && expected == actual
}

/// Like [`verify`], but returns an `Integrity` error describing the mismatch.
pub fn verify_or_err(url: &str, expected: &Sha256Digest, actual: &Sha256Digest) -> Result<()> {
    if verify(expected, actual) {
        return Ok(());
    }
    Err(GwsupError::Integrity {
        url: url.to_string(),
        expected: expected.to_hex(),
        actual: actual.to_hex(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_vector() {
        // sha256("abc")
        let d = Sha256Digest::of_bytes(b"abc");
        assert_eq!(
            d.to_hex(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        let parsed: Sha256Digest = "BA7816BF8F01CFEA414140DE5DAE2223B00361A396177A9CB410FF61F20015AD"
            .parse()
            .unwrap();
        assert_eq!(parsed, d);
    }

    #[test]
    fn test_rehash_is_deterministic() {
        let content = b"test content";
        assert_eq!(Sha256Digest::of_bytes(content), Sha256Digest::of_bytes(content));
        assert_eq!(
            Sha256Digest::of_reader(&content[..]).unwrap(),
            Sha256Digest::of_bytes(content)
        );
    }

    #[test]
    fn test_single_bit_flip_is_rejected() {
        let original = b"gws release archive bytes".to_vec();
        let expected = Sha256Digest::of_bytes(&original);
        let mut corrupted = original.clone();
        corrupted[3] ^= 0x01;
        let actual = Sha256Digest::of_bytes(&corrupted);
        assert!(verify(&expected, &Sha256Digest::of_bytes(&original)));
        assert!(!verify(&expected, &actual));
        assert!(matches!(
            verify_or_err("u", &expected, &actual),
            Err(GwsupError::Integrity { .. })
        ));
    }

    #[test]
    fn test_placeholder_never_verifies() {
        assert!(Sha256Digest::PLACEHOLDER.is_placeholder());
        let zero: Sha256Digest = "0".repeat(64).parse().unwrap();
        assert!(zero.is_placeholder());
        assert!(!verify(&zero, &Sha256Digest::of_bytes(b"anything")));
        // Even when the "actual" digest is also all zeros.
        assert!(!verify(&zero, &Sha256Digest::PLACEHOLDER));
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!("abc".parse::<Sha256Digest>().is_err());
        assert!("zz".repeat(32).parse::<Sha256Digest>().is_err());
        assert!("0".repeat(65).parse::<Sha256Digest>().is_err());
        assert!(format!("sha256:{}", "ab".repeat(32)).parse::<Sha256Digest>().is_ok());
    }
}
