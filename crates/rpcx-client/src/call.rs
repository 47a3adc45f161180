use std::sync::{Arc, Mutex as StdMutex};

use rpcx_share::{Message, Metadata, SerializeType};
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;

use crate::error::ClientError;
use crate::raw::RawResponse;

/// Where a call's response payload is written once decoded.
///
/// This is the Rust-idiomatic stand-in for the Go client's "decode into the
/// reply pointer" pattern: instead of reflecting into a caller-owned pointer,
/// the reader task fills a type-erased sink that the typed caller-side wrapper
/// created up front, then reads back out once the completion signal fires.
pub(crate) trait ReplySink: Send {
    fn fill(&mut self, serialize_type: SerializeType, payload: &[u8]) -> Result<(), ClientError>;
}

pub(crate) struct TypedReplySlot<T> {
    pub(crate) slot: Arc<StdMutex<Option<T>>>,
}

impl<T> ReplySink for TypedReplySlot<T>
where
    T: DeserializeOwned + Send + 'static,
{
    fn fill(&mut self, serialize_type: SerializeType, payload: &[u8]) -> Result<(), ClientError> {
        if payload.is_empty() {
            return Ok(());
        }
        let value: T = serialize_type.decode(payload)?;
        *self.slot.lock().unwrap() = Some(value);
        Ok(())
    }
}

pub(crate) enum ReplyTarget {
    /// Oneway: no response is expected at all.
    None,
    /// `Call.Raw == true`: deliver the un-decoded payload plus a header map (§6).
    Raw,
    /// Normal call: decode the payload through the configured codec.
    Typed(Box<dyn ReplySink>),
}

struct CallState {
    res_metadata: Metadata,
    error: Option<ClientError>,
    raw_response: Option<RawResponse>,
    done: bool,
}

/// One in-flight invocation (§3).
///
/// Exactly one completion signal is ever delivered (`signal` enforces this via
/// the `done` flag); after that, the call is immutable and ready for the
/// caller to read back through [`Call::take_error`] / the reply slot it
/// originally supplied.
pub struct Call {
    pub service_path: String,
    pub service_method: String,
    pub metadata: Metadata,
    pub raw: bool,
    state: StdMutex<CallState>,
    reply: StdMutex<ReplyTarget>,
    done_tx: mpsc::Sender<Arc<Call>>,
}

impl Call {
    pub(crate) fn new(
        service_path: impl Into<String>,
        service_method: impl Into<String>,
        metadata: Metadata,
        reply: ReplyTarget,
        done_tx: mpsc::Sender<Arc<Call>>,
    ) -> Arc<Call> {
        let raw = matches!(reply, ReplyTarget::Raw);
        Arc::new(Call {
            service_path: service_path.into(),
            service_method: service_method.into(),
            metadata,
            raw,
            state: StdMutex::new(CallState {
                res_metadata: Metadata::new(),
                error: None,
                raw_response: None,
                done: false,
            }),
            reply: StdMutex::new(reply),
            done_tx,
        })
    }

    pub(crate) fn is_oneway(&self) -> bool {
        matches!(&*self.reply.lock().unwrap(), ReplyTarget::None)
    }

    /// Fills this call's reply from a successful, decoded-or-raw response and
    /// signals completion. Called by the reader loop's "Normal" branch.
    pub(crate) fn complete_ok(self: &Arc<Self>, msg: &Message) {
        {
            let mut reply = self.reply.lock().unwrap();
            match &mut *reply {
                ReplyTarget::None => {}
                ReplyTarget::Raw => {
                    let mut state = self.state.lock().unwrap();
                    state.raw_response = Some(RawResponse::from_message(msg, None));
                }
                ReplyTarget::Typed(sink) => {
                    if let Err(err) = sink.fill(msg.serialize_type, &msg.payload) {
                        drop(reply);
                        self.fail(err);
                        return;
                    }
                }
            }
        }
        let mut state = self.state.lock().unwrap();
        if !msg.metadata.is_empty() {
            state.res_metadata = msg.metadata.clone();
        }
        drop(state);
        self.signal();
    }

    /// Completes this call from a server-reported error response (§4.1 reader
    /// loop, `Status=Error` branch). Converts to the raw header map (with
    /// `X-RPCX-ErrorMessage` injected) when `raw`.
    pub(crate) fn complete_service_error(self: &Arc<Self>, msg: &Message, error_text: String) {
        {
            let mut state = self.state.lock().unwrap();
            if !msg.metadata.is_empty() {
                state.res_metadata = msg.metadata.clone();
            }
            if self.raw {
                state.raw_response = Some(RawResponse::from_message(msg, Some(&error_text)));
            }
            state.error = Some(ClientError::Shared(rpcx_share::Error::ServiceError(error_text)));
        }
        self.signal();
    }

    /// Completes this call with a transport/shutdown/cancellation error.
    pub(crate) fn fail(self: &Arc<Self>, error: ClientError) {
        {
            let mut state = self.state.lock().unwrap();
            if state.done {
                return;
            }
            state.error = Some(error);
        }
        self.signal();
    }

    fn signal(self: &Arc<Self>) {
        let mut state = self.state.lock().unwrap();
        if state.done {
            return;
        }
        state.done = true;
        drop(state);

        // Mirrors the Go client's `select { case call.Done <- call: default: drop }`:
        // a caller that isn't ready to receive loses the notification rather than
        // stalling the reader loop.
        if self.done_tx.try_send(self.clone()).is_err() {
            tracing::debug!(
                service_path = %self.service_path,
                service_method = %self.service_method,
                "discarding call completion: done channel full or closed"
            );
        }
    }

    pub fn is_done(&self) -> bool {
        self.state.lock().unwrap().done
    }

    pub fn take_error(&self) -> Option<ClientError> {
        let mut state = self.state.lock().unwrap();
        match &state.error {
            Some(ClientError::Shared(rpcx_share::Error::ServiceError(msg))) => {
                Some(ClientError::Shared(rpcx_share::Error::ServiceError(msg.clone())))
            }
            Some(_) => state.error.take(),
            None => None,
        }
    }

    pub fn response_metadata(&self) -> Metadata {
        self.state.lock().unwrap().res_metadata.clone()
    }

    pub fn take_raw_response(&self) -> Option<RawResponse> {
        self.state.lock().unwrap().raw_response.take()
    }
}
