use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use dashmap::DashMap;
use rpcx_client::{
    Breaker, ConnectionClient, ConsistentHashSelector, RandomSelector, RoundRobinSelector,
    Selector, WeightedRoundRobinSelector,
};
use rpcx_share::{filter_by_state_and_group, split_network_and_address, EndpointMeta, Metadata, NoopPluginContainer, PluginContainer, AUTH_KEY};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::cross_lang;
use crate::discovery::{Discovery, ServicePair};
use crate::error::GovernanceError;
use crate::option::{FailMode, GovernanceOption, SelectMode};

/// Per-call context: request metadata plus an optional caller-driven
/// cancellation token. Dropping the governed call's future is itself a valid
/// cancellation in Rust; `cancellation` exists for callers who want to
/// trigger that cancellation from elsewhere (e.g. a shared deadline).
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    pub metadata: Metadata,
    pub cancellation: Option<CancellationToken>,
}

impl CallContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancellation(cancellation: CancellationToken) -> Self {
        CallContext {
            metadata: Metadata::new(),
            cancellation: Some(cancellation),
        }
    }
}

fn build_selector(mode: SelectMode, servers: &HashMap<String, EndpointMeta>) -> Box<dyn Selector> {
    let selector: Box<dyn Selector> = match mode {
        SelectMode::Random => Box::new(RandomSelector),
        SelectMode::RoundRobin => Box::new(RoundRobinSelector::default()),
        SelectMode::WeightedRoundRobin => Box::new(WeightedRoundRobinSelector::default()),
        SelectMode::ConsistentHash => Box::new(ConsistentHashSelector),
        SelectMode::Closest | SelectMode::SelectByUser => {
            unreachable!("Closest/SelectByUser must go through GovernanceClient::with_selector")
        }
    };
    selector.update_server(servers);
    selector
}

/// The service-aware multi-endpoint client (§4.4).
///
/// Composes discovery, a selector, per-endpoint breakers, and a cache of
/// [`ConnectionClient`]s; implements the retry/fail-over/backup/broadcast/
/// fork call modes and cross-language dispatch for non-native backends.
pub struct GovernanceClient {
    service_path: String,
    option: GovernanceOption,
    discovery: Arc<dyn Discovery>,
    servers: RwLock<HashMap<String, EndpointMeta>>,
    selector: RwLock<Box<dyn Selector>>,
    breakers: DashMap<String, Arc<Breaker>>,
    cached: RwLock<HashMap<String, Arc<ConnectionClient>>>,
    plugins: Arc<dyn PluginContainer>,
    shutdown: AtomicBool,
    non_native: RwLock<HashMap<String, EndpointMeta>>,
    watcher_task: StdMutex<Option<JoinHandle<()>>>,
}

impl GovernanceClient {
    /// Creates a governance client with an automatically constructed
    /// selector. Fails if `option.select_mode` is `Closest` or
    /// `SelectByUser` — those bypass automatic construction (§9); use
    /// [`Self::with_selector`] instead.
    pub async fn new(
        service_path: impl Into<String>,
        option: GovernanceOption,
        discovery: Arc<dyn Discovery>,
    ) -> Result<Arc<Self>, GovernanceError> {
        if matches!(option.select_mode, SelectMode::Closest | SelectMode::SelectByUser) {
            return Err(GovernanceError::Unavailable(
                "Closest/SelectByUser selectors must be supplied via GovernanceClient::with_selector".to_string(),
            ));
        }
        Self::new_inner(service_path, option, discovery, Arc::new(NoopPluginContainer), None).await
    }

    /// Like [`Self::new`] but with a caller-supplied plugin container, fired
    /// at the same connection-open/close/pre-call/post-call points as
    /// `rpcx-client`'s own hooks (§9).
    pub async fn new_with_plugins(
        service_path: impl Into<String>,
        option: GovernanceOption,
        discovery: Arc<dyn Discovery>,
        plugins: Arc<dyn PluginContainer>,
    ) -> Result<Arc<Self>, GovernanceError> {
        if matches!(option.select_mode, SelectMode::Closest | SelectMode::SelectByUser) {
            return Err(GovernanceError::Unavailable(
                "Closest/SelectByUser selectors must be supplied via GovernanceClient::with_selector".to_string(),
            ));
        }
        Self::new_inner(service_path, option, discovery, plugins, None).await
    }

    /// Creates a governance client with a caller-supplied selector (required
    /// for `Closest` geo-selection and `SelectByUser`). The automatic
    /// selector construction is skipped entirely; only the endpoint table is
    /// kept current on discovery updates (§9).
    pub async fn with_selector(
        service_path: impl Into<String>,
        option: GovernanceOption,
        discovery: Arc<dyn Discovery>,
        selector: Box<dyn Selector>,
    ) -> Result<Arc<Self>, GovernanceError> {
        Self::new_inner(service_path, option, discovery, Arc::new(NoopPluginContainer), Some(selector)).await
    }

    async fn new_inner(
        service_path: impl Into<String>,
        option: GovernanceOption,
        discovery: Arc<dyn Discovery>,
        plugins: Arc<dyn PluginContainer>,
        selector_override: Option<Box<dyn Selector>>,
    ) -> Result<Arc<Self>, GovernanceError> {
        let service_path = service_path.into();

        let (servers, non_native) = snapshot_to_maps(discovery.snapshot(), &option.group);
        let selector = match selector_override {
            Some(s) => {
                s.update_server(&servers);
                s
            }
            None => build_selector(option.select_mode, &servers),
        };

        let client = Arc::new(GovernanceClient {
            service_path,
            option,
            discovery,
            servers: RwLock::new(servers),
            selector: RwLock::new(selector),
            breakers: DashMap::new(),
            cached: RwLock::new(HashMap::new()),
            plugins,
            shutdown: AtomicBool::new(false),
            non_native: RwLock::new(non_native),
            watcher_task: StdMutex::new(None),
        });

        let watcher = {
            let client = client.clone();
            let mut rx = client.discovery.watch();
            let group = client.option.group.clone();
            tokio::spawn(async move {
                while let Some(snapshot) = rx.recv().await {
                    let (servers, non_native) = snapshot_to_maps(snapshot, &group);
                    *client.servers.write().await = servers.clone();
                    *client.non_native.write().await = non_native;
                    client.selector.read().await.update_server(&servers);
                }
            })
        };
        *client.watcher_task.lock().unwrap() = Some(watcher);

        Ok(client)
    }

    pub fn service_path(&self) -> &str {
        &self.service_path
    }

    /// Marks the client shut down, closes every cached connection, and stops
    /// the discovery watcher (§3 lifecycles).
    pub async fn close(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(task) = self.watcher_task.lock().unwrap().take() {
            task.abort();
        }
        self.discovery.close();
        let mut cached = self.cached.write().await;
        for (_, conn) in cached.drain() {
            conn.close().await;
        }
    }

    fn breaker_for(&self, key: &str) -> Arc<Breaker> {
        self.breakers
            .entry(key.to_string())
            .or_insert_with(|| {
                Arc::new(Breaker::new(
                    self.option.breaker_threshold,
                    self.option.breaker_min_samples,
                    self.option.breaker_cooldown,
                ))
            })
            .clone()
    }

    fn inject_auth(&self, ctx: &mut CallContext) {
        if !self.option.auth.is_empty() {
            ctx.metadata.insert(AUTH_KEY.to_string(), self.option.auth.clone());
        }
    }

    /// Selects an endpoint and returns (or dials) its cached connection
    /// (§4.4 "Endpoint selection for a call").
    /// Picks an endpoint key via the configured selector, honoring the
    /// per-endpoint breaker, without dialing it.
    async fn select_endpoint(
        self: &Arc<Self>,
        service_method: &str,
        args_repr: &str,
    ) -> Result<String, GovernanceError> {
        if self.shutdown.load(Ordering::SeqCst) {
            return Err(GovernanceError::Shutdown);
        }

        let key = {
            let keys: Vec<String> = self.servers.read().await.keys().cloned().collect();
            let selector = self.selector.read().await;
            selector.select(&self.service_path, service_method, args_repr, &keys)
        };
        let key = key.ok_or(GovernanceError::NoServer)?;

        if self.option.breaker_enabled {
            if let Some(breaker) = self.breakers.get(&key) {
                if !breaker.ready() {
                    return Err(GovernanceError::BreakerOpen);
                }
            }
        }

        Ok(key)
    }

    async fn select_and_acquire(
        self: &Arc<Self>,
        service_method: &str,
        args_repr: &str,
    ) -> Result<(String, Arc<ConnectionClient>), GovernanceError> {
        let key = self.select_endpoint(service_method, args_repr).await?;
        let conn = self.get_or_create_connection(&key).await?;
        Ok((key, conn))
    }

    /// Cache lookup-or-dial for one endpoint key. Releases the cache lock
    /// before firing the connection-open plugin (§9 plugin-under-lock
    /// hazard); reports `Fail()` to the breaker on dial failure.
    async fn get_or_create_connection(
        self: &Arc<Self>,
        key: &str,
    ) -> Result<Arc<ConnectionClient>, GovernanceError> {
        {
            let cached = self.cached.read().await;
            if let Some(conn) = cached.get(key) {
                if !conn.is_closing() && !conn.is_shutdown() {
                    return Ok(conn.clone());
                }
            }
        }

        let mut fire_open: Option<String> = None;
        let result = {
            let mut cached = self.cached.write().await;
            if let Some(existing) = cached.get(key) {
                if !existing.is_closing() && !existing.is_shutdown() {
                    return Ok(existing.clone());
                }
                cached.remove(key);
            }

            let (network, address) = split_network_and_address(key);
            if network == "inprocess" {
                return Err(GovernanceError::Unavailable(
                    "inprocess transport has no local implementation in this crate".to_string(),
                ));
            }

            match ConnectionClient::connect_with_plugins_deferred_open(
                network,
                address,
                self.option.client_option.clone(),
                self.plugins.clone(),
            )
            .await
            {
                Ok(conn) => {
                    conn.register_server_message_chan(SERVER_MESSAGE_CHANNEL_CAPACITY);
                    cached.insert(key.to_string(), conn.clone());
                    fire_open = Some(address.to_string());
                    Ok(conn)
                }
                Err(e) => Err(e),
            }
        };

        match result {
            Ok(conn) => {
                if let Some(addr) = fire_open {
                    self.plugins.connection_open(&addr);
                }
                Ok(conn)
            }
            Err(e) => {
                if self.option.breaker_enabled {
                    self.breaker_for(key).fail();
                }
                Err(GovernanceError::Client(e))
            }
        }
    }

    fn evict(self: &Arc<Self>, key: &str) {
        let client = self.clone();
        let key = key.to_string();
        tokio::spawn(async move {
            let removed = client.cached.write().await.remove(&key);
            if let Some(conn) = removed {
                conn.unregister_server_message_chan();
                conn.close().await;
            }
        });
    }

    fn record_outcome(&self, key: &str, error: Option<&GovernanceError>) {
        if !self.option.breaker_enabled {
            return;
        }
        let breaker = self.breaker_for(key);
        match error {
            None => breaker.success(),
            Some(e) if e.is_uncovered() => breaker.fail(),
            Some(_) => {}
        }
    }

    /// One attempt of a unary call against an already-selected connection.
    async fn attempt<A, R>(
        &self,
        conn: &Arc<ConnectionClient>,
        service_method: &str,
        ctx: &CallContext,
        args: &A,
    ) -> Result<(R, Metadata), GovernanceError>
    where
        A: Serialize,
        R: DeserializeOwned + Send + 'static,
    {
        self.plugins.pre_call(&self.service_path, service_method);
        let call = conn.call::<A, R>(&self.service_path, service_method, ctx.metadata.clone(), args);
        let result = match &ctx.cancellation {
            Some(token) => {
                tokio::select! {
                    res = call => res.map_err(GovernanceError::Client),
                    _ = token.cancelled() => Err(GovernanceError::Cancelled),
                }
            }
            None => call.await.map_err(GovernanceError::Client),
        };
        let error_text = result.as_ref().err().map(|e| e.to_string());
        self.plugins
            .post_call(&self.service_path, service_method, error_text.as_deref());
        result
    }

    /// Governed unary call (§4.4 "Call modes"). Behavior depends on
    /// `option.fail_mode`.
    pub async fn call<A, R>(
        self: &Arc<Self>,
        service_method: &str,
        mut ctx: CallContext,
        args: &A,
    ) -> Result<(R, Metadata), GovernanceError>
    where
        A: Serialize,
        R: DeserializeOwned + Send + 'static,
    {
        if self.shutdown.load(Ordering::SeqCst) {
            return Err(GovernanceError::Shutdown);
        }
        self.inject_auth(&mut ctx);

        let args_repr = stringify_args(args);
        match self.option.fail_mode {
            FailMode::Failfast => self.call_failfast(service_method, &ctx, args, &args_repr).await,
            FailMode::Failtry => self.call_failtry(service_method, &ctx, args, &args_repr).await,
            FailMode::Failover => self.call_failover(service_method, &ctx, args, &args_repr).await,
            FailMode::Failbackup => self.call_failbackup(service_method, &ctx, args, &args_repr).await,
        }
    }

    async fn call_failfast<A, R>(
        self: &Arc<Self>,
        service_method: &str,
        ctx: &CallContext,
        args: &A,
        args_repr: &str,
    ) -> Result<(R, Metadata), GovernanceError>
    where
        A: Serialize,
        R: DeserializeOwned + Send + 'static,
    {
        let (key, conn) = self.select_and_acquire(service_method, args_repr).await?;
        let result = self.attempt::<A, R>(&conn, service_method, ctx, args).await;
        self.record_outcome(&key, result.as_ref().err());
        if let Err(e) = &result {
            if e.is_uncovered() {
                self.evict(&key);
            }
        }
        result
    }

    async fn call_failtry<A, R>(
        self: &Arc<Self>,
        service_method: &str,
        ctx: &CallContext,
        args: &A,
        args_repr: &str,
    ) -> Result<(R, Metadata), GovernanceError>
    where
        A: Serialize,
        R: DeserializeOwned + Send + 'static,
    {
        let key = self.select_endpoint(service_method, args_repr).await?;
        let mut last_err = None;
        for attempt in 0..=self.option.retries {
            let conn = match self.get_or_create_connection(&key).await {
                Ok(conn) => conn,
                Err(e) => {
                    last_err = Some(e);
                    if attempt == self.option.retries {
                        break;
                    }
                    continue;
                }
            };
            let result = self.attempt::<A, R>(&conn, service_method, ctx, args).await;
            self.record_outcome(&key, result.as_ref().err());
            match result {
                Ok(v) => return Ok(v),
                Err(e) if e.is_service_error() || e.is_cancellation() => return Err(e),
                Err(e) => {
                    if e.is_uncovered() {
                        self.evict(&key);
                    }
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or(GovernanceError::NoServer))
    }

    async fn call_failover<A, R>(
        self: &Arc<Self>,
        service_method: &str,
        ctx: &CallContext,
        args: &A,
        args_repr: &str,
    ) -> Result<(R, Metadata), GovernanceError>
    where
        A: Serialize,
        R: DeserializeOwned + Send + 'static,
    {
        let mut last_err = None;
        for attempt in 0..=self.option.retries {
            let (key, conn) = match self.select_and_acquire(service_method, args_repr).await {
                Ok(pair) => pair,
                Err(e) => {
                    last_err = Some(e);
                    if attempt == self.option.retries {
                        break;
                    }
                    continue;
                }
            };
            let result = self.attempt::<A, R>(&conn, service_method, ctx, args).await;
            self.record_outcome(&key, result.as_ref().err());
            match result {
                Ok(v) => return Ok(v),
                Err(e) if e.is_service_error() || e.is_cancellation() => return Err(e),
                Err(e) => {
                    if e.is_uncovered() {
                        self.evict(&key);
                    }
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or(GovernanceError::NoServer))
    }

    async fn call_failbackup<A, R>(
        self: &Arc<Self>,
        service_method: &str,
        ctx: &CallContext,
        args: &A,
        args_repr: &str,
    ) -> Result<(R, Metadata), GovernanceError>
    where
        A: Serialize,
        R: DeserializeOwned + Send + 'static,
    {
        let (primary_key, primary_conn) = match self.select_and_acquire(service_method, args_repr).await {
            Ok(pair) => pair,
            Err(primary_err) => {
                // Couldn't even dial the primary: skip straight to a backup
                // attempt instead of failing the whole call on a single dial
                // error (§4.4 — Failbackup tolerates one dead endpoint).
                let (backup_key, backup_conn) = self.select_and_acquire(service_method, args_repr).await?;
                let result = self.attempt::<A, R>(&backup_conn, service_method, ctx, args).await;
                self.record_outcome(&backup_key, result.as_ref().err());
                if let Err(e) = &result {
                    if e.is_uncovered() {
                        self.evict(&backup_key);
                    }
                }
                return result.map_err(|backup_err| {
                    GovernanceError::Aggregate(2, 2, vec![primary_err, backup_err])
                });
            }
        };
        let primary = self.attempt::<A, R>(&primary_conn, service_method, ctx, args);
        tokio::pin!(primary);

        let sleep = tokio::time::sleep(self.option.backup_latency);
        tokio::pin!(sleep);

        tokio::select! {
            res = &mut primary => {
                self.record_outcome(&primary_key, res.as_ref().err());
                if let Err(e) = &res {
                    if e.is_uncovered() {
                        self.evict(&primary_key);
                    }
                }
                return res;
            }
            _ = &mut sleep => {}
        }

        // Backup latency elapsed without a primary response: race a fresh
        // selection against the still-in-flight primary.
        let backup_selection = self.select_and_acquire(service_method, args_repr).await;
        let Ok((backup_key, backup_conn)) = backup_selection else {
            // Couldn't even dial a backup endpoint; fall back to waiting on
            // the primary alone (mirrors the original only returning err1
            // when the backup dispatch itself fails).
            let res = primary.await;
            self.record_outcome(&primary_key, res.as_ref().err());
            if let Err(e) = &res {
                if e.is_uncovered() {
                    self.evict(&primary_key);
                }
            }
            return res;
        };

        let backup = self.attempt::<A, R>(&backup_conn, service_method, ctx, args);
        tokio::pin!(backup);

        tokio::select! {
            res = &mut primary => {
                self.record_outcome(&primary_key, res.as_ref().err());
                if let Err(e) = &res {
                    if e.is_uncovered() {
                        self.evict(&primary_key);
                    }
                }
                res
            }
            res = &mut backup => {
                self.record_outcome(&backup_key, res.as_ref().err());
                if let Err(e) = &res {
                    if e.is_uncovered() {
                        self.evict(&backup_key);
                    }
                }
                res
            }
        }
    }

    /// Issues one call to every cached endpoint in parallel; succeeds only if
    /// all succeed (§4.4). One-minute hard timeout.
    pub async fn broadcast<A, R>(
        self: &Arc<Self>,
        service_method: &str,
        mut ctx: CallContext,
        args: &A,
    ) -> Result<(), GovernanceError>
    where
        A: Serialize + Sync,
        R: DeserializeOwned + Send + 'static,
    {
        if self.shutdown.load(Ordering::SeqCst) {
            return Err(GovernanceError::Shutdown);
        }
        self.inject_auth(&mut ctx);

        let keys: Vec<String> = self.servers.read().await.keys().cloned().collect();
        if keys.is_empty() {
            return Err(GovernanceError::NoServer);
        }

        let total = keys.len();
        let fanout = async {
            let attempts = keys.into_iter().map(|key| async move {
                let conn = self.get_or_create_connection(&key).await?;
                let result = self.attempt::<A, R>(&conn, service_method, &ctx, args).await;
                self.record_outcome(&key, result.as_ref().err());
                if let Err(e) = &result {
                    if e.is_uncovered() {
                        self.evict(&key);
                    }
                }
                result.map(|_| ())
            });
            let outcomes = futures::future::join_all(attempts).await;

            let errors: Vec<GovernanceError> = outcomes.into_iter().filter_map(Result::err).collect();
            if errors.is_empty() {
                Ok(())
            } else {
                let failed = errors.len();
                Err(GovernanceError::Aggregate(failed, total, errors))
            }
        };

        tokio::time::timeout(Duration::from_secs(60), fanout)
            .await
            .unwrap_or_else(|_| Err(GovernanceError::Unavailable("broadcast timed out after 1 minute".to_string())))
    }

    /// Issues one call to every cached endpoint in parallel; succeeds as soon
    /// as any one succeeds (§4.4). One-minute hard timeout. On success, the
    /// winning reply is returned; `args`/`R` must be `Clone`-free since each
    /// attempt owns its own decode target.
    pub async fn fork<A, R>(
        self: &Arc<Self>,
        service_method: &str,
        mut ctx: CallContext,
        args: &A,
    ) -> Result<(R, Metadata), GovernanceError>
    where
        A: Serialize + Sync,
        R: DeserializeOwned + Send + 'static,
    {
        if self.shutdown.load(Ordering::SeqCst) {
            return Err(GovernanceError::Shutdown);
        }
        self.inject_auth(&mut ctx);

        let keys: Vec<String> = self.servers.read().await.keys().cloned().collect();
        if keys.is_empty() {
            return Err(GovernanceError::NoServer);
        }

        let total = keys.len();
        let fanout = async {
            use futures::stream::{FuturesUnordered, StreamExt};

            let mut attempts: FuturesUnordered<_> = keys
                .into_iter()
                .map(|key| async move {
                    let result: Result<(R, Metadata), GovernanceError> = async {
                        let conn = self.get_or_create_connection(&key).await?;
                        self.attempt::<A, R>(&conn, service_method, &ctx, args).await
                    }
                    .await;
                    self.record_outcome(&key, result.as_ref().err());
                    if let Err(e) = &result {
                        if e.is_uncovered() {
                            self.evict(&key);
                        }
                    }
                    result
                })
                .collect();

            let mut errors = Vec::new();
            while let Some(result) = attempts.next().await {
                match result {
                    Ok(v) => return Ok(v),
                    Err(e) => errors.push(e),
                }
            }
            let failed = errors.len();
            Err(GovernanceError::Aggregate(failed, total, errors))
        };

        tokio::time::timeout(Duration::from_secs(60), fanout)
            .await
            .unwrap_or_else(|_| Err(GovernanceError::Unavailable("fork timed out after 1 minute".to_string())))
    }

    /// Dispatches to a non-native backend (§4.4 `CallNotGo`, §6). Applies the
    /// configured selector to the non-native endpoint subset rather than
    /// always picking the first one (§9 open question, resolved).
    pub async fn call_not_go(
        self: &Arc<Self>,
        service_method: &str,
        param_keys: &[String],
        args: &HashMap<String, String>,
    ) -> Result<String, GovernanceError> {
        let non_native = self.non_native.read().await;
        if non_native.is_empty() {
            return Err(GovernanceError::NoServer);
        }
        let keys: Vec<String> = non_native.keys().cloned().collect();
        let args_repr = serde_json::to_string(args).unwrap_or_default();
        let selector = self.selector.read().await;
        let key = selector
            .select(&self.service_path, service_method, &args_repr, &keys)
            .ok_or(GovernanceError::NoServer)?;
        let meta = non_native.get(&key).cloned().unwrap_or_default();
        drop(non_native);
        drop(selector);

        let (_, address) = split_network_and_address(&key);
        match meta.non_native_kind() {
            Some("py") => cross_lang::call_py(address, &self.service_path, service_method).await,
            Some("rust") => cross_lang::call_rust_session(address, service_method, args, param_keys).await,
            _ => Err(GovernanceError::Unavailable(format!("endpoint {key} is not a recognized non-native backend"))),
        }
    }

    /// Whether this client currently has any non-native (cross-language)
    /// endpoints in its discovery snapshot.
    pub async fn has_non_native_endpoints(&self) -> bool {
        !self.non_native.read().await.is_empty()
    }
}

/// Capacity of the unsolicited server-message channel registered on every
/// cached connection (§5 — arbitrary, sized for a handful of in-flight
/// server-initiated pushes).
const SERVER_MESSAGE_CHANNEL_CAPACITY: usize = 16;

/// Renders call arguments to the string a hash-based selector keys off of
/// (§4.2 — "derived from servicePath + serviceMethod + stringified args").
/// Falls back to an empty string if `args` isn't representable as JSON,
/// degrading consistent-hash selection to a path+method-only key rather
/// than failing the call outright.
fn stringify_args<A: Serialize>(args: &A) -> String {
    serde_json::to_string(args).unwrap_or_default()
}

fn snapshot_to_maps(
    snapshot: Vec<ServicePair>,
    group: &str,
) -> (HashMap<String, EndpointMeta>, HashMap<String, EndpointMeta>) {
    let mut raw: HashMap<String, String> = snapshot.into_iter().collect();
    filter_by_state_and_group(group, &mut raw);

    let mut servers = HashMap::with_capacity(raw.len());
    let mut non_native = HashMap::new();
    for (key, query) in raw {
        let meta = EndpointMeta::parse(&query);
        if meta.non_native_kind().is_some() {
            non_native.insert(key, meta);
        } else {
            servers.insert(key, meta);
        }
    }
    (servers, non_native)
}
