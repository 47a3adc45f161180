use std::time::Duration;

use rpcx_client::ClientOption;

/// Retry/fail-over/backup/broadcast/fork policy (§4.4, GLOSSARY).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailMode {
    /// Single attempt; evict on an uncovered error.
    Failfast,
    /// Up to `retries` retries against the *same* endpoint.
    Failtry,
    /// Up to `retries` retries, re-selecting an endpoint each attempt.
    Failover,
    /// Issue a backup call against a fresh endpoint if the primary hasn't
    /// completed within `backup_latency`; first to finish wins.
    Failbackup,
}

/// Endpoint-selection strategy (§4.2). `Closest` and `SelectByUser` bypass
/// the governance client's automatic selector construction (§9) — build the
/// client with [`crate::GovernanceClient::with_selector`] for those.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectMode {
    Random,
    RoundRobin,
    WeightedRoundRobin,
    ConsistentHash,
    Closest,
    SelectByUser,
}

/// Options governing one [`crate::GovernanceClient`].
///
/// Built via [`GovernanceOptionBuilder`], mirroring the consuming-`self`
/// builder pattern `rpcx_client::ClientOptionBuilder` uses.
#[derive(Debug, Clone)]
pub struct GovernanceOption {
    pub(crate) client_option: ClientOption,
    pub(crate) fail_mode: FailMode,
    pub(crate) select_mode: SelectMode,
    pub(crate) retries: usize,
    pub(crate) backup_latency: Duration,
    pub(crate) group: String,
    pub(crate) auth: String,
    pub(crate) breaker_threshold: f64,
    pub(crate) breaker_min_samples: usize,
    pub(crate) breaker_cooldown: Duration,
    pub(crate) breaker_enabled: bool,
}

impl Default for GovernanceOption {
    fn default() -> Self {
        GovernanceOption {
            client_option: ClientOption::default(),
            fail_mode: FailMode::Failfast,
            select_mode: SelectMode::RoundRobin,
            retries: 3,
            backup_latency: Duration::from_millis(50),
            group: String::new(),
            auth: String::new(),
            breaker_threshold: 0.95,
            breaker_min_samples: 100,
            breaker_cooldown: Duration::from_secs(10),
            breaker_enabled: true,
        }
    }
}

impl GovernanceOption {
    pub fn builder() -> GovernanceOptionBuilder {
        GovernanceOptionBuilder::new()
    }
}

#[derive(Debug, Clone)]
pub struct GovernanceOptionBuilder {
    option: GovernanceOption,
}

impl GovernanceOptionBuilder {
    pub fn new() -> Self {
        GovernanceOptionBuilder {
            option: GovernanceOption::default(),
        }
    }

    pub fn client_option(mut self, client_option: ClientOption) -> Self {
        self.option.client_option = client_option;
        self
    }

    pub fn fail_mode(mut self, fail_mode: FailMode) -> Self {
        self.option.fail_mode = fail_mode;
        self
    }

    pub fn select_mode(mut self, select_mode: SelectMode) -> Self {
        self.option.select_mode = select_mode;
        self
    }

    pub fn retries(mut self, retries: usize) -> Self {
        self.option.retries = retries;
        self
    }

    pub fn backup_latency(mut self, latency: Duration) -> Self {
        self.option.backup_latency = latency;
        self
    }

    /// Only endpoints whose metadata `group` matches this value survive
    /// `filterByStateAndGroup` (empty matches every group).
    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.option.group = group.into();
        self
    }

    /// Injected into request metadata under `__AUTH` on every call (§4.4).
    pub fn auth(mut self, auth: impl Into<String>) -> Self {
        self.option.auth = auth.into();
        self
    }

    pub fn breaker(mut self, threshold: f64, min_samples: usize, cooldown: Duration) -> Self {
        self.option.breaker_threshold = threshold;
        self.option.breaker_min_samples = min_samples;
        self.option.breaker_cooldown = cooldown;
        self
    }

    pub fn disable_breaker(mut self) -> Self {
        self.option.breaker_enabled = false;
        self
    }

    pub fn build(self) -> GovernanceOption {
        self.option
    }
}

impl Default for GovernanceOptionBuilder {
    fn default() -> Self {
        Self::new()
    }
}
