#![forbid(unsafe_code)]
//! Shared wire-adjacent types for the rpcx-style governed RPC client.
//!
//! This crate has no networking of its own: it's the vocabulary the
//! connection client (`rpcx-client`) and the governance client
//! (`rpcx-governance`) both speak — the message envelope, serialize/compress
//! enums, endpoint-key and metadata-query-string parsing, the plugin hook
//! contract, and the error kinds common to both layers.

mod codec;
mod endpoint;
mod error;
mod message;
mod plugin;

pub use codec::{CompressType, SerializeType};
pub use endpoint::{filter_by_state_and_group, split_network_and_address, urlencode_metadata, EndpointMeta};
pub use error::Error;
pub use message::{
    free_msg, get_pooled_msg, Message, MessageStatusType, MessageType, Metadata, AUTH_KEY,
    SERVICE_ERROR_KEY,
};
pub use plugin::{NoopPluginContainer, PluginContainer};
