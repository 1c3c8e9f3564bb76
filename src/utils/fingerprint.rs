use serde::{Deserialize, Serialize};
use sha2::digest::Update;
use sha2::{Digest, Sha256};
use std::fmt::{Debug, Display};

/// Content hash of the query parameters that shape a market graph.
///
/// Two requests with the same game, price band, category and source set map
/// to the same fingerprint and may share cached results. Stable and
/// reproducible so it can be compared across processes.
#[derive(Clone, Copy, Default, Eq, PartialEq, Hash)]
pub struct Fingerprint(pub [u8; 32]);

impl Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{}", encode_hex(&self.0))
    }
}

impl Debug for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Fingerprint(0x{})", encode_hex(&self.0))
    }
}

impl From<[u8; 32]> for Fingerprint {
    fn from(hash: [u8; 32]) -> Self {
        Fingerprint(hash)
    }
}

impl Serialize for Fingerprint {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&encode_hex(&self.0))
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = decode_hex(s.trim_start_matches("0x")).map_err(serde::de::Error::custom)?;
        if bytes.len() != 32 {
            return Err(serde::de::Error::custom(format!("expected 32 bytes, got {}", bytes.len())));
        }
        let mut hash = [0; 32];
        hash.copy_from_slice(&bytes);
        Ok(Fingerprint(hash))
    }
}

/// Hash an ordered sequence of byte parts into a fingerprint. Parts are
/// length-prefixed so that `["ab", "c"]` and `["a", "bc"]` never collide.
pub fn fingerprint_parts<I, P>(parts: I) -> Fingerprint
where
    I: IntoIterator<Item = P>,
    P: AsRef<[u8]>,
{
    let mut hasher = Sha256::new();

    for part in parts {
        let bytes = part.as_ref();
        Update::update(&mut hasher, &(bytes.len() as u64).to_le_bytes());
        Update::update(&mut hasher, bytes);
    }

    let hash_slice: [u8; 32] = hasher.finalize().into();
    Fingerprint(hash_slice)
}

fn encode_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

fn decode_hex(s: &str) -> Result<Vec<u8>, String> {
    if s.len() % 2 != 0 {
        return Err("odd-length hex string".to_string());
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).map_err(|e| e.to_string()))
        .collect()
}
