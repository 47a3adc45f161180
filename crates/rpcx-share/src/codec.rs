use serde::{de::DeserializeOwned, Serialize};

use crate::error::Error;

/// Wire serialization format, keyed by the same small integer space rpcx uses
/// on the wire (`X-RPCX-SerializeType`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SerializeType {
    Json = 0,
    MsgPack = 1,
}

impl SerializeType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(SerializeType::Json),
            1 => Some(SerializeType::MsgPack),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Encodes `value` using this codec. Absent args (`()`) encode to an empty
    /// payload, matching the Go client skipping `codec.Encode` for nil args.
    pub fn encode<T: Serialize>(self, value: &T) -> Result<Vec<u8>, Error> {
        match self {
            SerializeType::Json => serde_json::to_vec(value).map_err(|_| Error::UnsupportedCodec),
            SerializeType::MsgPack => {
                rmp_serde::to_vec(value).map_err(|_| Error::UnsupportedCodec)
            }
        }
    }

    pub fn decode<T: DeserializeOwned>(self, data: &[u8]) -> Result<T, Error> {
        match self {
            SerializeType::Json => {
                serde_json::from_slice(data).map_err(|_| Error::UnsupportedCodec)
            }
            SerializeType::MsgPack => {
                rmp_serde::from_slice(data).map_err(|_| Error::UnsupportedCodec)
            }
        }
    }
}

/// Payload compression, applied by the framing codec when the encoded request
/// body exceeds the 1024-byte threshold (see `rpcx_client::connection::send`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressType {
    None = 0,
    Gzip = 1,
}

impl CompressType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => CompressType::Gzip,
            _ => CompressType::None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}
