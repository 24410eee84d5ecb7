//! Payload codecs and the serializer registry.
//!
//! A payload codec turns user message types into the opaque bytes the wire
//! carries. Two codecs exist: JSON (code 1, the default) and protocol
//! buffers (code 2). Code 0 is reserved and never appears on the wire.
//!
//! Payload types implement both `prost::Message` and the serde traits, so a
//! single generic call path serves either encoding. Deriving both on one
//! struct is the usual pattern:
//!
//! ```ignore
//! #[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
//! pub struct GetByIdReq {
//!     #[prost(int64, tag = "1")]
//!     pub id: i64,
//! }
//! ```

use bytes::Bytes;
use prost::Message;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;

use crate::error::RpcError;

/// Marker for types that can travel as an RPC payload under any registered
/// codec. Blanket-implemented; never implement it by hand.
pub trait Payload: Message + Serialize + DeserializeOwned + Default + 'static {}

impl<T> Payload for T where T: Message + Serialize + DeserializeOwned + Default + 'static {}

/// A payload codec, identified on the wire by a one-byte code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Serializer {
    /// JSON via serde (code 1). The default for new clients.
    Json,
    /// Protocol buffers via prost (code 2).
    Proto,
}

impl Serializer {
    /// The one-byte code identifying this codec on the wire.
    pub fn code(self) -> u8 {
        match self {
            Serializer::Json => 1,
            Serializer::Proto => 2,
        }
    }

    /// Resolve a wire code. Code 0 is reserved and resolves to `None`.
    pub fn from_code(code: u8) -> Option<Serializer> {
        match code {
            1 => Some(Serializer::Json),
            2 => Some(Serializer::Proto),
            _ => None,
        }
    }

    /// Encode a payload value.
    pub fn encode<T: Payload>(self, value: &T) -> Result<Bytes, RpcError> {
        match self {
            Serializer::Json => serde_json::to_vec(value)
                .map(Bytes::from)
                .map_err(|e| RpcError::Encode(format!("JSON encoding failed: {e}"))),
            Serializer::Proto => Ok(Bytes::from(value.encode_to_vec())),
        }
    }

    /// Decode a payload value.
    pub fn decode<T: Payload>(self, data: &[u8]) -> Result<T, RpcError> {
        match self {
            Serializer::Json => serde_json::from_slice(data)
                .map_err(|e| RpcError::Decode(format!("JSON decoding failed: {e}"))),
            Serializer::Proto => T::decode(data)
                .map_err(|e| RpcError::Decode(format!("protobuf decoding failed: {e}"))),
        }
    }
}

/// The set of codecs an endpoint accepts, keyed by wire code.
///
/// A server pre-registers JSON and may additionally register the protobuf
/// codec; a request naming an unregistered code fails with
/// [`RpcError::UnknownSerializer`], reported to the caller through
/// `Response.error` rather than by dropping the connection.
#[derive(Debug, Clone, Default)]
pub struct SerializerRegistry {
    codecs: HashMap<u8, Serializer>,
}

impl SerializerRegistry {
    /// Create an empty registry.
    pub fn new() -> SerializerRegistry {
        SerializerRegistry::default()
    }

    /// Accept a codec, keyed by its own code.
    pub fn register(&mut self, serializer: Serializer) {
        self.codecs.insert(serializer.code(), serializer);
    }

    /// Look up an accepted codec by wire code.
    pub fn get(&self, code: u8) -> Result<Serializer, RpcError> {
        self.codecs
            .get(&code)
            .copied()
            .ok_or(RpcError::UnknownSerializer(code))
    }

    /// Whether a code is accepted.
    pub fn contains(&self, code: u8) -> bool {
        self.codecs.contains_key(&code)
    }
}
