//! Serde helpers for opaque byte payloads.
//!
//! Content, nonce and signature travel as standard base64 strings. A JSON
//! `null` or a missing field decodes as an empty payload.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use serde::{Deserialize, Deserializer, Serializer, de};

pub fn serialize<T, S>(bytes: T, serializer: S) -> Result<S::Ok, S::Error>
where
    T: AsRef<[u8]>,
    S: Serializer,
{
    serializer.serialize_str(&B64.encode(bytes.as_ref()))
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(Vec::new()),
        Some(encoded) => B64.decode(encoded.as_bytes()).map_err(de::Error::custom),
    }
}
