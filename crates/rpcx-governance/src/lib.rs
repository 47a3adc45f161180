#![forbid(unsafe_code)]
//! Service-aware multi-endpoint RPC client.
//!
//! Layers discovery, endpoint selection, circuit breaking, retry/fail-over
//! policy, and cross-language dispatch on top of the single-connection
//! [`rpcx_client::ConnectionClient`]. One [`GovernanceClient`] owns a pool of
//! connections, one per discovered endpoint, dialed lazily and cached.

mod client;
mod cross_lang;
mod discovery;
mod error;
mod option;

pub use client::{CallContext, GovernanceClient};
pub use discovery::{Discovery, DiscoveryFilter, ServicePair, StaticDiscovery};
pub use error::GovernanceError;
pub use option::{FailMode, GovernanceOption, GovernanceOptionBuilder, SelectMode};

pub use rpcx_client::{
    ClosestSelector, ConsistentHashSelector, RandomSelector, RoundRobinSelector, Selector,
    UserDefinedSelector, WeightedRoundRobinSelector,
};
pub use rpcx_share::{Metadata, PluginContainer};
