//! JSON framing for commands and replies.

use crate::error::MessengerError;
use serde::de::DeserializeOwned;
use serde::Serialize;

pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, MessengerError> {
    serde_json::to_vec(value).map_err(|e| MessengerError::Codec(e.to_string()))
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, MessengerError> {
    serde_json::from_slice(bytes).map_err(|e| MessengerError::Codec(e.to_string()))
}
