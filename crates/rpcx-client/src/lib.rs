#![forbid(unsafe_code)]
//! Single-connection, multiplexed RPC client.
//!
//! One [`ConnectionClient`] owns one TCP connection and demultiplexes
//! concurrent calls over it by sequence number. This crate has no discovery,
//! retry, or failover logic of its own — that's `rpcx-governance`, layered on
//! top of many of these.

mod breaker;
mod call;
mod connection;
mod error;
mod option;
mod raw;
mod selector;

pub use breaker::Breaker;
pub use call::Call;
pub use connection::ConnectionClient;
pub use error::ClientError;
pub use option::{ClientOption, ClientOptionBuilder};
pub use raw::RawResponse;
pub use selector::{
    ClosestSelector, ConsistentHashSelector, RandomSelector, RoundRobinSelector, Selector,
    UserDefinedSelector, WeightedRoundRobinSelector,
};
