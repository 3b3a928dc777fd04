//! Record encoding adapter.

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Converts records to and from stored bytes.
///
/// Implementations that tag their payloads should report a mismatched tag
/// as [`Error::InvalidType`].
pub trait Encoder<T>: Send + Sync {
    /// Encodes a record.
    fn marshal(&self, value: &T) -> Result<Vec<u8>>;

    /// Decodes a record.
    fn unmarshal(&self, bytes: &[u8]) -> Result<T>;
}

/// The default encoder: JSON via serde.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonEncoder;

impl<T> Encoder<T> for JsonEncoder
where
    T: Serialize + DeserializeOwned,
{
    fn marshal(&self, value: &T) -> Result<Vec<u8>> {
        serde_json::to_vec(value).map_err(Error::codec)
    }

    fn unmarshal(&self, bytes: &[u8]) -> Result<T> {
        serde_json::from_slice(bytes).map_err(Error::codec)
    }
}
