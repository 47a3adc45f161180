use std::time::Duration;

use rpcx_share::{CompressType, SerializeType};

/// Options governing one [`crate::ConnectionClient`].
///
/// Built via [`ClientOptionBuilder`], a consuming-`self` builder.
#[derive(Debug, Clone)]
pub struct ClientOption {
    pub(crate) retries: usize,
    pub(crate) connect_timeout: Duration,
    pub(crate) read_timeout: Option<Duration>,
    pub(crate) write_timeout: Option<Duration>,
    pub(crate) backup_latency: Duration,
    pub(crate) serialize_type: SerializeType,
    pub(crate) compress_type: CompressType,
    pub(crate) heartbeat: bool,
    pub(crate) heartbeat_interval: Duration,
    pub(crate) group: String,
    pub(crate) done_channel_capacity: usize,
}

impl Default for ClientOption {
    fn default() -> Self {
        ClientOption {
            retries: 3,
            connect_timeout: Duration::from_secs(10),
            read_timeout: None,
            write_timeout: None,
            backup_latency: Duration::from_millis(10),
            serialize_type: SerializeType::MsgPack,
            compress_type: CompressType::None,
            heartbeat: false,
            heartbeat_interval: Duration::from_secs(30),
            group: String::new(),
            done_channel_capacity: 10,
        }
    }
}

impl ClientOption {
    pub fn builder() -> ClientOptionBuilder {
        ClientOptionBuilder::new()
    }
}

#[derive(Debug, Clone)]
pub struct ClientOptionBuilder {
    option: ClientOption,
}

impl ClientOptionBuilder {
    pub fn new() -> Self {
        ClientOptionBuilder {
            option: ClientOption::default(),
        }
    }

    /// Number of retries for fail-modes that retry (`Failtry`/`Failover`);
    /// the connection client itself doesn't retry, the governance client does.
    pub fn retries(mut self, retries: usize) -> Self {
        self.option.retries = retries;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.option.connect_timeout = timeout;
        self
    }

    /// Deadline applied to each frame read by the reader loop. A read that
    /// doesn't complete in time is treated the same as any other decode
    /// error: the reader loop terminates and the connection is torn down
    /// (mirrors the Go client's per-read `SetReadDeadline`).
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.option.read_timeout = Some(timeout);
        self
    }

    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.option.write_timeout = Some(timeout);
        self
    }

    /// Used by the governance client's `Failbackup` mode (§4.4, scenario 5).
    pub fn backup_latency(mut self, latency: Duration) -> Self {
        self.option.backup_latency = latency;
        self
    }

    pub fn serialize_type(mut self, serialize_type: SerializeType) -> Self {
        self.option.serialize_type = serialize_type;
        self
    }

    pub fn compress_type(mut self, compress_type: CompressType) -> Self {
        self.option.compress_type = compress_type;
        self
    }

    /// Enables a periodic heartbeat `Call("", "", nil, nil)` (§4.1).
    pub fn heartbeat(mut self, enabled: bool, interval: Duration) -> Self {
        self.option.heartbeat = enabled;
        self.option.heartbeat_interval = interval;
        self
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.option.group = group.into();
        self
    }

    /// Capacity of the per-call completion channel (§5, §9 — "arbitrary, but
    /// drop-on-full must be preserved"). Raise this if callers legitimately
    /// burst many simultaneous calls through one `Go`/`done` channel.
    pub fn done_channel_capacity(mut self, capacity: usize) -> Self {
        self.option.done_channel_capacity = capacity.max(1);
        self
    }

    pub fn build(self) -> ClientOption {
        self.option
    }
}

impl Default for ClientOptionBuilder {
    fn default() -> Self {
        Self::new()
    }
}
