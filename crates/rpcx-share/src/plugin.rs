//! The plugin hook contract.
//!
//! Plugin *behavior* (tracing carriers, metrics, auth checks) is out of scope
//! here — only the hook points they attach to are defined. Every method has a
//! no-op default so a caller can implement just the hooks it cares about.

use crate::message::Message;

pub trait PluginContainer: Send + Sync {
    /// Runs before a request message is encoded and written to the wire.
    fn pre_encode(&self, _msg: &mut Message) {}

    /// Runs after a response message is decoded off the wire.
    fn post_decode(&self, _msg: &Message) {}

    /// Runs before a governed call is dispatched to a selected connection.
    fn pre_call(&self, _service_path: &str, _service_method: &str) {}

    /// Runs after a governed call completes, successfully or not.
    fn post_call(&self, _service_path: &str, _service_method: &str, _error: Option<&str>) {}

    /// Runs exactly once when a connection is first established to `remote_addr`.
    fn connection_open(&self, _remote_addr: &str) {}

    /// Runs exactly once when a connection to `remote_addr` is torn down, from
    /// whichever of `Close`/reader-termination/eviction triggers it first
    /// (the `pluginClosed` guard lives in the connection client, not here).
    fn connection_close(&self, _remote_addr: &str) {}
}

/// A `PluginContainer` that does nothing; the default when no plugins are configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPluginContainer;

impl PluginContainer for NoopPluginContainer {}
