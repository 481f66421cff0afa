//! In-memory channel for tests.
//!
//! Every flushed request is decoded and answered from a queue of canned
//! replies, a responder function, or a bare `SUCCESS {}`.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::codec::Decoder;

use super::{Channel, ChannelConnector, Inbound, OpenedChannel};
use crate::bolt::message::tag;
use crate::bolt::{
    BoltCodec, BoltError, BoltResponse, BoltResult, BoltVersion, PackStreamStructure, SuccessMessage,
};
use crate::driver::config::ServerAddress;
use crate::driver::error::{DriverError, DriverResult};

pub(crate) type Responder = Arc<dyn Fn(&PackStreamStructure) -> Vec<BoltResponse> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimeoutCall {
    Set(Duration),
    Start,
    Stop,
}

struct ScriptState {
    pending: BytesMut,
    codec: BoltCodec,
    written: Vec<PackStreamStructure>,
    queued: VecDeque<Vec<BoltResponse>>,
    responder: Option<Responder>,
    auto_reply: bool,
    timeout_calls: Vec<TimeoutCall>,
}

pub(crate) struct ScriptedChannel {
    address: ServerAddress,
    inbound: Mutex<Option<mpsc::UnboundedSender<BoltResult<BoltResponse>>>>,
    state: Mutex<ScriptState>,
    open: AtomicBool,
}

impl ScriptedChannel {
    pub(crate) fn new(address: ServerAddress) -> (Arc<Self>, Inbound) {
        let (tx, rx) = mpsc::unbounded_channel();
        let channel = Arc::new(Self {
            address,
            inbound: Mutex::new(Some(tx)),
            state: Mutex::new(ScriptState {
                pending: BytesMut::new(),
                codec: BoltCodec::new(),
                written: Vec::new(),
                queued: VecDeque::new(),
                responder: None,
                auto_reply: true,
                timeout_calls: Vec::new(),
            }),
            open: AtomicBool::new(true),
        });
        (channel, rx)
    }

    /// Replies for the next request that expects an answer.
    pub(crate) fn reply_next(&self, responses: Vec<BoltResponse>) {
        self.state.lock().queued.push_back(responses);
    }

    pub(crate) fn set_responder(&self, responder: impl Fn(&PackStreamStructure) -> Vec<BoltResponse> + Send + Sync + 'static) {
        self.state.lock().responder = Some(Arc::new(responder));
    }

    /// Stop answering; tests push responses by hand.
    pub(crate) fn hold_replies(&self) {
        self.state.lock().auto_reply = false;
    }

    pub(crate) fn push(&self, response: BoltResponse) {
        if let Some(tx) = self.inbound.lock().as_ref() {
            let _ = tx.send(Ok(response));
        }
    }

    pub(crate) fn fail(&self, error: BoltError) {
        if let Some(tx) = self.inbound.lock().as_ref() {
            let _ = tx.send(Err(error));
        }
    }

    pub(crate) fn written(&self) -> Vec<PackStreamStructure> {
        self.state.lock().written.clone()
    }

    pub(crate) fn written_tags(&self) -> Vec<u8> {
        self.state.lock().written.iter().map(|s| s.tag).collect()
    }

    pub(crate) fn timeout_calls(&self) -> Vec<TimeoutCall> {
        self.state.lock().timeout_calls.clone()
    }

    fn on_flush(&self) {
        let replies = {
            let mut state = self.state.lock();
            let ScriptState {
                pending,
                codec,
                written,
                queued,
                responder,
                auto_reply,
                ..
            } = &mut *state;

            let mut replies = Vec::new();
            while let Ok(Some(value)) = codec.decode(pending) {
                let Some(structure) = value.as_structure() else {
                    continue;
                };
                written.push(structure.clone());
                if structure.tag == tag::GOODBYE || !*auto_reply {
                    continue;
                }
                let batch = match queued.pop_front() {
                    Some(batch) => batch,
                    None => match responder {
                        Some(responder) => responder(structure),
                        None => vec![BoltResponse::Success(SuccessMessage::default())],
                    },
                };
                replies.extend(batch);
            }
            replies
        };
        for reply in replies {
            self.push(reply);
        }
    }
}

#[async_trait]
impl Channel for ScriptedChannel {
    fn address(&self) -> &ServerAddress {
        &self.address
    }

    fn is_encrypted(&self) -> bool {
        false
    }

    async fn write(&self, bytes: Bytes, flush: bool) -> DriverResult<()> {
        if !self.is_open() {
            return Err(DriverError::service_unavailable("scripted channel closed"));
        }
        self.state.lock().pending.extend_from_slice(&bytes);
        if flush {
            self.on_flush();
        }
        Ok(())
    }

    fn set_receive_timeout(&self, timeout: Duration) {
        self.state.lock().timeout_calls.push(TimeoutCall::Set(timeout));
    }

    fn start_receive_timeout(&self) {
        self.state.lock().timeout_calls.push(TimeoutCall::Start);
    }

    fn stop_receive_timeout(&self) {
        self.state.lock().timeout_calls.push(TimeoutCall::Stop);
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    async fn close(&self) {
        if self.open.swap(false, Ordering::AcqRel) {
            self.on_flush();
            self.inbound.lock().take();
        }
    }
}

/// Opens scripted channels and keeps them for inspection.
pub(crate) struct ScriptedConnector {
    version: BoltVersion,
    setup: Option<Arc<dyn Fn(&ScriptedChannel) + Send + Sync>>,
    open_delay: Option<Duration>,
    channels: Mutex<Vec<Arc<ScriptedChannel>>>,
    unreachable: Mutex<HashSet<ServerAddress>>,
    opened: AtomicUsize,
}

impl ScriptedConnector {
    pub(crate) fn new(version: BoltVersion) -> Self {
        Self {
            version,
            setup: None,
            open_delay: None,
            channels: Mutex::new(Vec::new()),
            unreachable: Mutex::new(HashSet::new()),
            opened: AtomicUsize::new(0),
        }
    }

    pub(crate) fn with_setup(mut self, setup: impl Fn(&ScriptedChannel) + Send + Sync + 'static) -> Self {
        self.setup = Some(Arc::new(setup));
        self
    }

    pub(crate) fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = Some(delay);
        self
    }

    pub(crate) fn set_unreachable(&self, address: ServerAddress) {
        self.unreachable.lock().insert(address);
    }

    pub(crate) fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub(crate) fn channels(&self) -> Vec<Arc<ScriptedChannel>> {
        self.channels.lock().clone()
    }

    pub(crate) fn last_channel(&self) -> Option<Arc<ScriptedChannel>> {
        self.channels.lock().last().cloned()
    }
}

#[async_trait]
impl ChannelConnector for ScriptedConnector {
    async fn open(&self, address: &ServerAddress) -> DriverResult<OpenedChannel> {
        if let Some(delay) = self.open_delay {
            tokio::time::sleep(delay).await;
        }
        if self.unreachable.lock().contains(address) {
            return Err(DriverError::service_unavailable(format!("{} is unreachable", address)));
        }
        let (channel, inbound) = ScriptedChannel::new(address.clone());
        if let Some(setup) = &self.setup {
            setup(channel.as_ref());
        }
        self.channels.lock().push(channel.clone());
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(OpenedChannel {
            channel,
            version: self.version,
            inbound,
        })
    }
}
