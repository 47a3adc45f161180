use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use rpcx_share::{
    get_pooled_msg, Message, MessageStatusType, Metadata, NoopPluginContainer, PluginContainer,
    SerializeType, SERVICE_ERROR_KEY,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::call::{Call, ReplyTarget, TypedReplySlot};
use crate::error::ClientError;
use crate::option::ClientOption;
use crate::raw::RawResponse;

const COMPRESS_THRESHOLD: usize = 1024;

type PendingMap = StdMutex<HashMap<u64, Arc<Call>>>;

/// A single multiplexed connection to one endpoint.
///
/// Every call shares one TCP connection; responses are demultiplexed by
/// sequence number off a dedicated reader task. Registering a call in the
/// pending table always happens before its request reaches the wire, so the
/// reader can never observe a response for a sequence number it doesn't yet
/// know about.
pub struct ConnectionClient {
    option: ClientOption,
    writer: AsyncMutex<tokio::net::tcp::OwnedWriteHalf>,
    pending: PendingMap,
    seq: AtomicU64,
    closing: Arc<AtomicBool>,
    /// Set once the reader loop terminates on its own (peer EOF, decode
    /// error) rather than through an explicit `close()`. Distinct from
    /// `closing`, which only ever reflects a caller-initiated close.
    shut_down: AtomicBool,
    shutdown: CancellationToken,
    server_message_chan: StdMutex<Option<mpsc::Sender<Message>>>,
    plugins: Arc<dyn PluginContainer>,
    reader_task: AsyncMutex<Option<JoinHandle<()>>>,
    heartbeat_task: AsyncMutex<Option<JoinHandle<()>>>,
    remote_addr: String,
    /// Guards the connection-close plugin hook so it fires at most once
    /// across `close()`, reader termination, and repeated close attempts (§7).
    plugin_closed: AtomicBool,
}

impl ConnectionClient {
    pub async fn connect(
        network: &str,
        address: &str,
        option: ClientOption,
    ) -> Result<Arc<ConnectionClient>, ClientError> {
        Self::connect_with_plugins(network, address, option, Arc::new(NoopPluginContainer)).await
    }

    pub async fn connect_with_plugins(
        network: &str,
        address: &str,
        option: ClientOption,
        plugins: Arc<dyn PluginContainer>,
    ) -> Result<Arc<ConnectionClient>, ClientError> {
        Self::connect_inner(network, address, option, plugins, true).await
    }

    /// Like [`Self::connect_with_plugins`] but suppresses the `connection_open`
    /// hook; the caller fires it once the dial succeeds, after releasing
    /// whatever lock guarded the call (§9 — firing a plugin hook under a
    /// cache lock risks deadlocking a plugin that calls back in).
    pub async fn connect_with_plugins_deferred_open(
        network: &str,
        address: &str,
        option: ClientOption,
        plugins: Arc<dyn PluginContainer>,
    ) -> Result<Arc<ConnectionClient>, ClientError> {
        Self::connect_inner(network, address, option, plugins, false).await
    }

    async fn connect_inner(
        network: &str,
        address: &str,
        option: ClientOption,
        plugins: Arc<dyn PluginContainer>,
        fire_open_hook: bool,
    ) -> Result<Arc<ConnectionClient>, ClientError> {
        if network != "tcp" {
            return Err(ClientError::Shared(rpcx_share::Error::UnsupportedCodec));
        }
        let connect_fut = TcpStream::connect(address);
        let stream = tokio::time::timeout(option.connect_timeout, connect_fut)
            .await
            .map_err(|_| ClientError::Dial {
                network: network.to_string(),
                address: address.to_string(),
                source: std::io::Error::from(std::io::ErrorKind::TimedOut),
            })?
            .map_err(|source| ClientError::Dial {
                network: network.to_string(),
                address: address.to_string(),
                source,
            })?;
        let _ = stream.set_nodelay(true);
        if fire_open_hook {
            plugins.connection_open(address);
        }

        let (read_half, write_half) = stream.into_split();
        let client = Arc::new(ConnectionClient {
            option,
            writer: AsyncMutex::new(write_half),
            pending: StdMutex::new(HashMap::new()),
            seq: AtomicU64::new(0),
            closing: Arc::new(AtomicBool::new(false)),
            shut_down: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
            server_message_chan: StdMutex::new(None),
            plugins,
            reader_task: AsyncMutex::new(None),
            heartbeat_task: AsyncMutex::new(None),
            remote_addr: address.to_string(),
            plugin_closed: AtomicBool::new(false),
        });

        let reader = {
            let client = client.clone();
            tokio::spawn(async move {
                client.reader_loop(BufReader::new(read_half)).await;
            })
        };
        *client.reader_task.lock().await = Some(reader);

        if client.option.heartbeat {
            let heartbeat = {
                let client = client.clone();
                tokio::spawn(async move {
                    client.heartbeat_loop().await;
                })
            };
            *client.heartbeat_task.lock().await = Some(heartbeat);
        }

        Ok(client)
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    pub fn register_server_message_chan(&self, capacity: usize) -> mpsc::Receiver<Message> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        *self.server_message_chan.lock().unwrap() = Some(tx);
        rx
    }

    pub fn unregister_server_message_chan(&self) {
        *self.server_message_chan.lock().unwrap() = None;
    }

    /// Low-level async send: encodes `args`, registers the call (unless
    /// oneway), and writes the frame. Returns once the frame has been handed
    /// to the socket, not once a response arrives.
    async fn dispatch(
        self: &Arc<Self>,
        service_path: &str,
        service_method: &str,
        metadata: Metadata,
        args: &impl Serialize,
        reply: ReplyTarget,
        done_tx: mpsc::Sender<Arc<Call>>,
    ) -> Result<Arc<Call>, ClientError> {
        let oneway = matches!(&reply, ReplyTarget::None);
        let call = Call::new(service_path, service_method, metadata.clone(), reply, done_tx);

        let payload = self
            .option
            .serialize_type
            .encode(args)
            .map_err(|e| ClientError::Shared(e))?;

        let seq = self.next_seq();
        if !oneway {
            self.pending.lock().unwrap().insert(seq, call.clone());
        }

        let mut msg = get_pooled_msg();
        msg.seq = seq;
        msg.oneway = oneway;
        msg.serialize_type = self.option.serialize_type;
        msg.compress_type = if payload.len() > COMPRESS_THRESHOLD {
            self.option.compress_type
        } else {
            rpcx_share::CompressType::None
        };
        msg.service_path = service_path.to_string();
        msg.service_method = service_method.to_string();
        msg.metadata = metadata;
        msg.payload = payload;

        if let Err(err) = self.write_message(&mut msg).await {
            if !oneway {
                self.pending.lock().unwrap().remove(&seq);
            }
            call.fail(err.clone());
            return Err(err);
        }
        Ok(call)
    }

    /// Runs the pre-encode plugin hook, encodes, and writes one frame,
    /// applying the configured write deadline afterwards (§4.1 "send path").
    async fn write_message(&self, msg: &mut Message) -> Result<(), ClientError> {
        self.plugins.pre_encode(msg);
        let encoded = msg.encode();
        let mut guard = self.writer.lock().await;
        let write = guard.write_all(&encoded);
        let result = match self.option.write_timeout {
            Some(deadline) => tokio::time::timeout(deadline, write)
                .await
                .map_err(|_| std::io::Error::from(std::io::ErrorKind::TimedOut))
                .and_then(|r| r),
            None => write.await,
        };
        result.map_err(|e| ClientError::Shared(rpcx_share::Error::Transport(e)))
    }

    /// Fire-and-forget dispatch mirroring the Go client's `Go`: returns as
    /// soon as the call is registered and queued for write.
    pub async fn go<A, R>(
        self: &Arc<Self>,
        service_path: &str,
        service_method: &str,
        metadata: Metadata,
        args: &A,
    ) -> Result<(Arc<Call>, Arc<StdMutex<Option<R>>>), ClientError>
    where
        A: Serialize,
        R: DeserializeOwned + Send + 'static,
    {
        let slot = Arc::new(StdMutex::new(None));
        let (done_tx, _done_rx) = mpsc::channel(self.option.done_channel_capacity);
        let reply = ReplyTarget::Typed(Box::new(TypedReplySlot { slot: slot.clone() }));
        let call = self
            .dispatch(service_path, service_method, metadata, args, reply, done_tx)
            .await?;
        Ok((call, slot))
    }

    /// Synchronous unary call: dispatches, then awaits the call's completion
    /// signal directly rather than going through a `Go`-style channel.
    pub async fn call<A, R>(
        self: &Arc<Self>,
        service_path: &str,
        service_method: &str,
        metadata: Metadata,
        args: &A,
    ) -> Result<(R, Metadata), ClientError>
    where
        A: Serialize,
        R: DeserializeOwned + Send + 'static,
    {
        let slot: Arc<StdMutex<Option<R>>> = Arc::new(StdMutex::new(None));
        let (done_tx, mut done_rx) = mpsc::channel(1);
        let reply = ReplyTarget::Typed(Box::new(TypedReplySlot { slot: slot.clone() }));
        let call = self
            .dispatch(service_path, service_method, metadata, args, reply, done_tx)
            .await?;

        tokio::select! {
            _ = done_rx.recv() => {}
            _ = self.shutdown.cancelled() => {
                return Err(ClientError::Shared(rpcx_share::Error::Shutdown));
            }
        }

        if let Some(err) = call.take_error() {
            return Err(err);
        }
        let value = slot.lock().unwrap().take().ok_or(ClientError::Shared(rpcx_share::Error::ServiceError(
            "server responded without a payload".to_string(),
        )))?;
        Ok((value, call.response_metadata()))
    }

    pub async fn send_oneway(
        self: &Arc<Self>,
        service_path: &str,
        service_method: &str,
        metadata: Metadata,
        args: &impl Serialize,
    ) -> Result<(), ClientError> {
        let (done_tx, _rx) = mpsc::channel(1);
        self.dispatch(service_path, service_method, metadata, args, ReplyTarget::None, done_tx)
            .await?;
        Ok(())
    }

    /// Sends a pre-built raw frame whose sequence the caller has already set
    /// (§4.1 "SendRaw path"). Request metadata from `ctx_metadata` and from
    /// the message itself are merged, with the message's own entries winning
    /// on conflict, and the merged map is written back onto `msg` before it
    /// hits the wire. Blocks on either the completion signal or shutdown,
    /// except when `msg` is oneway, in which case it returns immediately.
    pub async fn send_raw(
        self: &Arc<Self>,
        ctx_metadata: Metadata,
        mut msg: Message,
    ) -> Result<RawResponse, ClientError> {
        let mut merged = ctx_metadata;
        for (k, v) in &msg.metadata {
            merged.insert(k.clone(), v.clone());
        }
        msg.metadata = merged;

        let oneway = msg.is_oneway();
        let seq = msg.seq();
        let (done_tx, mut done_rx) = mpsc::channel(1);
        let call = Call::new(&msg.service_path, &msg.service_method, msg.metadata.clone(), ReplyTarget::Raw, done_tx);

        if !oneway {
            self.pending.lock().unwrap().insert(seq, call.clone());
        }

        if let Err(err) = self.write_message(&mut msg).await {
            if !oneway {
                self.pending.lock().unwrap().remove(&seq);
            }
            call.fail(err.clone());
            return Err(err);
        }

        if oneway {
            return Ok(RawResponse::from_message(&msg, None));
        }

        tokio::select! {
            _ = done_rx.recv() => {}
            _ = self.shutdown.cancelled() => {
                return Err(ClientError::Shared(rpcx_share::Error::Shutdown));
            }
        }

        if let Some(err) = call.take_error() {
            if let Some(raw) = call.take_raw_response() {
                return Ok(raw);
            }
            return Err(err);
        }
        call.take_raw_response()
            .ok_or_else(|| ClientError::Shared(rpcx_share::Error::ServiceError("missing raw response".to_string())))
    }

    async fn heartbeat_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.option.heartbeat_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.shutdown.cancelled() => return,
            }
            let mut msg = get_pooled_msg();
            msg.seq = self.next_seq();
            msg.heartbeat = true;
            if let Err(err) = self.write_message(&mut msg).await {
                tracing::warn!(remote = %self.remote_addr, error = %err, "heartbeat failed");
                continue;
            }
        }
    }

    async fn reader_loop<R>(self: Arc<Self>, mut reader: R)
    where
        R: tokio::io::AsyncRead + Unpin,
    {
        loop {
            let decoded = match self.option.read_timeout {
                Some(deadline) => match tokio::time::timeout(deadline, Message::decode(&mut reader)).await {
                    Ok(result) => result,
                    Err(_) => Err(std::io::Error::from(std::io::ErrorKind::TimedOut)),
                },
                None => Message::decode(&mut reader).await,
            };
            match decoded {
                Ok(msg) => self.handle_incoming(msg),
                Err(err) => {
                    let expected = self.closing.load(Ordering::SeqCst);
                    let client_error = if expected {
                        ClientError::Shared(rpcx_share::Error::Shutdown)
                    } else {
                        ClientError::ConnectionClosed(err.to_string())
                    };
                    tracing::debug!(remote = %self.remote_addr, error = %err, "reader loop terminating");
                    self.shut_down.store(true, Ordering::SeqCst);
                    self.shutdown.cancel();
                    self.deliver_reader_termination_notice();
                    self.fail_all_pending(client_error);
                    break;
                }
            }
        }
        self.fire_connection_close_once();
    }

    /// On reader termination, synthesize a `Request`-type error message
    /// carrying the remote address and forward it to the server-message
    /// channel (if one is registered), so a caller watching that channel
    /// learns the connection is gone rather than just seeing it go silent.
    fn deliver_reader_termination_notice(self: &Arc<Self>) {
        if self.server_message_chan.lock().unwrap().is_none() {
            return;
        }
        let mut msg = get_pooled_msg();
        msg.message_type = rpcx_share::MessageType::Request;
        msg.status = MessageStatusType::Error;
        msg.service_path = self.remote_addr.clone();
        msg.metadata
            .insert(SERVICE_ERROR_KEY.to_string(), "connection closed".to_string());
        self.forward_server_message(msg);
    }

    /// Fires the connection-close plugin hook at most once, regardless of
    /// whether it's reached from reader termination, an explicit `close()`,
    /// or both racing each other.
    fn fire_connection_close_once(&self) {
        if self
            .plugin_closed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            self.plugins.connection_close(&self.remote_addr);
        }
    }

    fn handle_incoming(self: &Arc<Self>, msg: Message) {
        self.plugins.post_decode(&msg);

        let is_server_request =
            msg.message_type == rpcx_share::MessageType::Request && !msg.is_heartbeat() && msg.is_oneway();
        if is_server_request {
            self.forward_server_message(msg);
            return;
        }

        let call = self.pending.lock().unwrap().remove(&msg.seq());
        match call {
            Some(call) => match msg.status {
                MessageStatusType::Normal => call.complete_ok(&msg),
                MessageStatusType::Error => {
                    let text = msg
                        .metadata
                        .get(SERVICE_ERROR_KEY)
                        .cloned()
                        .unwrap_or_default();
                    call.complete_service_error(&msg, text);
                }
            },
            None => self.forward_server_message(msg),
        }
    }

    /// Delivers a server-initiated (oneway request) message to the
    /// registered server-message channel, if any, with a 5-second delivery
    /// timeout; expired deliveries are dropped with a warning (§5, §9).
    fn forward_server_message(self: &Arc<Self>, msg: Message) {
        let chan = self.server_message_chan.lock().unwrap().clone();
        let Some(tx) = chan else {
            tracing::trace!(seq = msg.seq(), "dropping unsolicited message: no listener registered");
            return;
        };
        let remote = self.remote_addr.clone();
        tokio::spawn(async move {
            if tokio::time::timeout(std::time::Duration::from_secs(5), tx.send(msg))
                .await
                .is_err()
            {
                tracing::warn!(remote = %remote, "dropping server-initiated message: channel delivery timed out");
            }
        });
    }

    fn fail_all_pending(&self, error: ClientError) {
        let pending: Vec<Arc<Call>> = {
            let mut guard = self.pending.lock().unwrap();
            guard.drain().map(|(_, call)| call).collect()
        };
        for call in pending {
            call.fail(error.clone());
        }
    }

    /// Gracefully closes the connection: marks the close as expected (so the
    /// reader loop reports `Shutdown` rather than `ConnectionClosed`), fails
    /// every pending call, and stops the heartbeat task.
    pub async fn close(&self) {
        self.closing.store(true, Ordering::SeqCst);
        self.shutdown.cancel();
        self.fail_all_pending(ClientError::Shared(rpcx_share::Error::Shutdown));
        let _ = self.writer.lock().await.shutdown().await;
        if let Some(task) = self.heartbeat_task.lock().await.take() {
            task.abort();
        }
        // Shutting down the write half only sends a FIN; the reader task is
        // still blocked on the read half until the peer closes too. Abort it
        // directly so the close plugin fires promptly instead of waiting on
        // a peer that may never hang up.
        if let Some(task) = self.reader_task.lock().await.take() {
            task.abort();
        }
        self.fire_connection_close_once();
    }

    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }

    /// True once the reader loop has terminated on its own (peer EOF, decode
    /// error), as opposed to through an explicit `close()`. Mirrors the Go
    /// client's `IsShutdown`; callers that cache connections should treat a
    /// connection as dead once either this or `is_closing()` is true.
    pub fn is_shutdown(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }
}
