// chain/src/types/codec.rs

//! Canonical byte encoding shared by hashing, signing and the wire.
//!
//! Serialization is done with **bincode 2** using the `serde` integration
//! (`bincode::serde::encode_to_vec`) and one explicit configuration:
//! fixed field order, big-endian integers, fixed-width integer encoding
//! and length-prefixed variable-width fields. Every call site that needs
//! "canonical bytes" goes through [`encode`] / [`decode`] so the format
//! cannot drift between subsystems.
//!
//! The format is bit-exact: for any value `x`, `decode(encode(x))`
//! equals `x` and re-encoding yields identical bytes, so content hashes
//! survive a decode/re-encode cycle unchanged.

use serde::Serialize;
use serde::de::DeserializeOwned;

use bincode::config::{BigEndian, Configuration, Fixint};

/// Errors raised by the canonical codec.
///
/// Encoding and decoding are fallible results rather than panics; event
/// loops log and drop on failure.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("encode failed: {0}")]
    Encode(#[from] bincode::error::EncodeError),
    #[error("decode failed: {0}")]
    Decode(#[from] bincode::error::DecodeError),
    /// Decoding succeeded but left unconsumed bytes behind.
    #[error("trailing bytes after decode: {0} left")]
    TrailingBytes(usize),
}

/// The one canonical bincode configuration.
fn config() -> Configuration<BigEndian, Fixint> {
    bincode::config::standard()
        .with_big_endian()
        .with_fixed_int_encoding()
}

/// Encodes `value` into its canonical byte representation.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    Ok(bincode::serde::encode_to_vec(value, config())?)
}

/// Decodes a value from canonical bytes, requiring full consumption.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    let (value, read): (T, usize) = bincode::serde::decode_from_slice(bytes, config())?;
    if read != bytes.len() {
        return Err(CodecError::TrailingBytes(bytes.len() - read));
    }
    Ok(value)
}
