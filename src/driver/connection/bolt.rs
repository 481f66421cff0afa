//! Client-side Bolt connection over a [`Channel`].
//!
//! Requests are encoded and written under a write lock so that observer
//! registration order always matches wire order. A dispatcher task consumes
//! the channel's inbound queue and feeds the [`ResponseHandler`]; any
//! transport or protocol failure closes the connection and fails every
//! pending observer.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::codec::Encoder;

use super::protocol::{protocol_for, BoltProtocol, RouteRequest};
use super::Connection;
use crate::bolt::{BoltRequest, BoltResponseCodec, BoltVersion, PackStreamValue, SuccessMessage};
use crate::driver::auth::AuthToken;
use crate::driver::channel::{Channel, Inbound, OpenedChannel};
use crate::driver::config::ServerAddress;
use crate::driver::error::{DriverError, DriverResult};
use crate::driver::logging::Logger;
use crate::driver::response_handler::{CollectedResponse, ResponseCollector, ResponseHandler, ResponseObserver};
use crate::driver::routing::RoutingTable;

/// HELLO hint: idle receive timeout in seconds
const RECV_TIMEOUT_HINT: &str = "connection.recv_timeout_seconds";
/// HELLO hint: server accepts TELEMETRY (5.4+)
const TELEMETRY_HINT: &str = "telemetry.enabled";

#[derive(Debug, Default)]
struct ConnectionState {
    initialized: bool,
    auth_token: Option<AuthToken>,
    server_agent: Option<String>,
    server_id: Option<String>,
    telemetry_enabled: bool,
    idle_since: Option<Instant>,
}

/// Client-side Bolt connection.
pub struct BoltConnection {
    id: u64,
    address: ServerAddress,
    channel: Arc<dyn Channel>,
    protocol: Box<dyn BoltProtocol>,
    handler: Mutex<ResponseHandler>,
    write_lock: tokio::sync::Mutex<()>,
    state: Mutex<ConnectionState>,
    open: AtomicBool,
    routing_context: Option<HashMap<String, String>>,
    created_at: Instant,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    logger: Logger,
}

impl BoltConnection {
    /// Wraps an opened channel and starts the dispatcher task.
    ///
    /// `routing_context` is sent in HELLO; pass it only for cluster members.
    pub fn new(
        id: u64,
        opened: OpenedChannel,
        routing_context: Option<HashMap<String, String>>,
        logger: Logger,
    ) -> Arc<Self> {
        let OpenedChannel {
            channel,
            version,
            inbound,
        } = opened;

        // Idle connections must never time out, so the timer only runs while
        // something is waiting for a reply.
        let timer = channel.clone();
        let handler = ResponseHandler::new().with_count_changed(move |pending| {
            if pending == 0 {
                timer.stop_receive_timeout();
            } else {
                timer.start_receive_timeout();
            }
        });

        let connection = Arc::new(Self {
            id,
            address: channel.address().clone(),
            channel,
            protocol: protocol_for(version),
            handler: Mutex::new(handler),
            write_lock: tokio::sync::Mutex::new(()),
            state: Mutex::new(ConnectionState::default()),
            open: AtomicBool::new(true),
            routing_context,
            created_at: Instant::now(),
            dispatcher: Mutex::new(None),
            logger,
        });

        let task = tokio::spawn(dispatch(Arc::downgrade(&connection), inbound));
        *connection.dispatcher.lock() = Some(task);
        connection.logger.debug(format!("{} created towards {}", connection.prefix(), connection.address));
        connection
    }

    fn prefix(&self) -> String {
        format!("[BoltConnection {}]", self.id)
    }

    pub fn protocol(&self) -> &dyn BoltProtocol {
        self.protocol.as_ref()
    }

    pub fn telemetry_enabled(&self) -> bool {
        self.state.lock().telemetry_enabled
    }

    /// Forgets the token so the next authentication re-runs LOGON.
    pub fn clear_auth_token(&self) {
        self.state.lock().auth_token = None;
    }

    pub fn mark_idle(&self) {
        self.state.lock().idle_since = Some(Instant::now());
    }

    /// Time since the connection was last returned to a pool.
    pub fn idle_time(&self) -> Duration {
        self.state
            .lock()
            .idle_since
            .map(|since| since.elapsed())
            .unwrap_or_default()
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Pending observers on this connection.
    pub fn pending_responses(&self) -> usize {
        self.handler.lock().pending()
    }

    /// Fetches a routing table with ROUTE or the routing procedure.
    pub async fn fetch_routing_table(&self, request: RouteRequest<'_>) -> DriverResult<RoutingTable> {
        let requests = self.protocol.route(&request)?;
        let responses = self.exchange(requests).await?;
        self.protocol.parse_route(responses, request.database)
    }

    /// Writes `requests` (flushing after the last) and waits for all replies.
    /// The first failure in wire order wins.
    async fn exchange(&self, requests: Vec<BoltRequest>) -> DriverResult<Vec<CollectedResponse>> {
        let count = requests.len();
        let mut pending = Vec::with_capacity(count);
        for (index, request) in requests.into_iter().enumerate() {
            let (observer, response) = ResponseCollector::boxed();
            self.write(request, observer, index + 1 == count).await?;
            pending.push(response);
        }

        let mut responses = Vec::with_capacity(count);
        let mut first_error = None;
        for response in pending {
            match response.wait().await {
                Ok(response) => responses.push(response),
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(responses),
        }
    }

    async fn reauthenticate(&self, token: &AuthToken) -> DriverResult<()> {
        let requests = self.protocol.reauthenticate(token)?;
        match self.exchange(requests).await {
            Ok(_) => {
                self.state.lock().auth_token = Some(token.clone());
                self.logger.debug(format!("{} re-authenticated", self.prefix()));
                Ok(())
            }
            Err(e) => {
                self.state.lock().auth_token = None;
                Err(e)
            }
        }
    }

    fn on_hello(&self, metadata: &SuccessMessage) {
        {
            let mut state = self.state.lock();
            state.server_agent = metadata.server().map(String::from);
            state.server_id = metadata.connection_id().map(String::from);
        }

        let Some(hints) = metadata.hints() else {
            return;
        };
        self.state.lock().telemetry_enabled = hints
            .get(TELEMETRY_HINT)
            .and_then(PackStreamValue::as_bool)
            .unwrap_or(false);

        match hints.get(RECV_TIMEOUT_HINT) {
            None | Some(PackStreamValue::Null) => {}
            Some(value) => match value.as_whole_number() {
                Some(seconds) if seconds > 0 => {
                    self.channel.set_receive_timeout(Duration::from_secs(seconds as u64));
                    self.logger.info(format!(
                        "{} server hinted {}={}, receive timeout set",
                        self.prefix(),
                        RECV_TIMEOUT_HINT,
                        seconds
                    ));
                }
                _ => self.logger.info(format!(
                    "{} server hinted an invalid {} ({}), ignoring",
                    self.prefix(),
                    RECV_TIMEOUT_HINT,
                    value.type_name()
                )),
            },
        }
    }

    /// Closes after a transport or protocol failure.
    async fn fail(&self, error: DriverError) {
        if self.open.swap(false, Ordering::AcqRel) {
            self.logger
                .error(format!("{} experienced a fatal error: {}", self.prefix(), error));
        }
        self.handler.lock().fail_all(error);
        self.channel.close().await;
    }
}

async fn dispatch(connection: Weak<BoltConnection>, mut inbound: Inbound) {
    while let Some(message) = inbound.recv().await {
        let Some(connection) = connection.upgrade() else {
            return;
        };
        let outcome = match message {
            Ok(response) => {
                connection
                    .logger
                    .debug(format!("{} S: {}", connection.prefix(), response.name()));
                connection.handler.lock().handle_response(response)
            }
            Err(e) => Err(DriverError::from(e)),
        };
        if let Err(error) = outcome {
            connection.fail(error).await;
            return;
        }
    }

    if let Some(connection) = connection.upgrade() {
        if connection.is_open() {
            connection
                .fail(DriverError::service_unavailable("Connection closed by the server"))
                .await;
        }
    }
}

#[async_trait]
impl Connection for BoltConnection {
    fn id(&self) -> u64 {
        self.id
    }

    fn server_id(&self) -> Option<String> {
        self.state.lock().server_id.clone()
    }

    fn address(&self) -> &ServerAddress {
        &self.address
    }

    fn protocol_version(&self) -> BoltVersion {
        self.protocol.version()
    }

    fn server_agent(&self) -> Option<String> {
        self.state.lock().server_agent.clone()
    }

    fn auth_token(&self) -> Option<AuthToken> {
        self.state.lock().auth_token.clone()
    }

    fn created_at(&self) -> Instant {
        self.created_at
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire) && self.channel.is_open()
    }

    fn supports_reauth(&self) -> bool {
        self.protocol.supports_reauth()
    }

    async fn connect(&self, user_agent: &str, token: &AuthToken) -> DriverResult<()> {
        let initialized = self.state.lock().initialized;
        if initialized {
            return self.reauthenticate(token).await;
        }

        let requests = self
            .protocol
            .initialize(user_agent, token, self.routing_context.as_ref());
        match self.exchange(requests).await {
            Ok(responses) => {
                if let Some(hello) = responses.first() {
                    self.on_hello(&hello.summary);
                }
                let mut state = self.state.lock();
                state.initialized = true;
                state.auth_token = Some(token.clone());
                Ok(())
            }
            Err(e) => {
                self.logger
                    .warn(format!("{} initialization failed: {}", self.prefix(), e));
                self.close().await;
                Err(e)
            }
        }
    }

    async fn write(
        &self,
        request: BoltRequest,
        mut observer: Box<dyn ResponseObserver>,
        flush: bool,
    ) -> DriverResult<()> {
        let _guard = self.write_lock.lock().await;
        if !self.is_open() {
            let error = DriverError::service_unavailable(format!(
                "{} cannot write {}, connection is closed",
                self.prefix(),
                request.name()
            ));
            observer.on_error(error.clone());
            return Err(error);
        }

        let mut bytes = BytesMut::new();
        if let Err(e) = BoltResponseCodec::new().encode(&request, &mut bytes) {
            let error = DriverError::from(e);
            observer.on_error(error.clone());
            return Err(error);
        }

        self.logger.debug(format!("{} C: {}", self.prefix(), request.name()));
        if request.expects_response() {
            self.handler.lock().enqueue(observer);
        } else {
            observer.on_completed(SuccessMessage::default());
        }

        if let Err(error) = self.channel.write(bytes.freeze(), flush).await {
            self.fail(error.clone()).await;
            return Err(error);
        }
        Ok(())
    }

    async fn reset_and_flush(&self) -> DriverResult<()> {
        self.exchange(vec![BoltRequest::Reset]).await.map(|_| ())
    }

    async fn close(&self) {
        if self.open.swap(false, Ordering::AcqRel) {
            self.logger.debug(format!("{} closing", self.prefix()));
            let _guard = self.write_lock.lock().await;
            let mut bytes = BytesMut::new();
            if BoltResponseCodec::new().encode(&BoltRequest::Goodbye, &mut bytes).is_ok() {
                // best effort; the server may already be gone
                let _ = self.channel.write(bytes.freeze(), true).await;
            }
        }
        self.channel.close().await;
        self.handler
            .lock()
            .fail_all(DriverError::service_unavailable("Connection closed"));
        if let Some(task) = self.dispatcher.lock().take() {
            task.abort();
        }
    }
}

impl Drop for BoltConnection {
    fn drop(&mut self) {
        if let Some(task) = self.dispatcher.get_mut().take() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for BoltConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoltConnection")
            .field("id", &self.id)
            .field("address", &self.address)
            .field("version", &self.protocol.version())
            .field("open", &self.open.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bolt::message::tag;
    use crate::bolt::{BoltError, BoltResponse, RecordMessage};
    use crate::driver::channel::testing::{ScriptedChannel, ScriptedConnector, TimeoutCall};
    use crate::driver::channel::ChannelConnector;

    async fn open(version: BoltVersion) -> (Arc<BoltConnection>, Arc<ScriptedChannel>) {
        let connector = ScriptedConnector::new(version);
        let opened = connector.open(&ServerAddress::new("localhost", 7687)).await.unwrap();
        let channel = connector.last_channel().unwrap();
        (BoltConnection::new(1, opened, None, Logger::none()), channel)
    }

    fn hello_reply(hints: Option<PackStreamValue>) -> BoltResponse {
        let mut entries = vec![
            ("server", PackStreamValue::from("Neo4j/5.13.0")),
            ("connection_id", PackStreamValue::from("bolt-42")),
        ];
        if let Some(hints) = hints {
            entries.push(("hints", hints));
        }
        BoltResponse::success(entries)
    }

    fn hints(value: PackStreamValue) -> PackStreamValue {
        let mut map = HashMap::new();
        map.insert(RECV_TIMEOUT_HINT.to_string(), value);
        PackStreamValue::Map(map)
    }

    fn set_calls(channel: &ScriptedChannel) -> Vec<TimeoutCall> {
        channel
            .timeout_calls()
            .into_iter()
            .filter(|call| matches!(call, TimeoutCall::Set(_)))
            .collect()
    }

    #[tokio::test]
    async fn test_connect_v51_sends_hello_and_logon() {
        let (connection, channel) = open(BoltVersion::V5_1).await;
        channel.reply_next(vec![hello_reply(None)]);
        let token = AuthToken::basic("neo4j", "pw");

        connection.connect("ua/1.0", &token).await.unwrap();

        assert_eq!(channel.written_tags(), vec![tag::HELLO, tag::LOGON]);
        assert_eq!(connection.auth_token(), Some(token));
        assert_eq!(connection.server_agent().as_deref(), Some("Neo4j/5.13.0"));
        assert_eq!(connection.server_id().as_deref(), Some("bolt-42"));
        assert_eq!(connection.protocol_version(), BoltVersion::V5_1);
    }

    #[tokio::test]
    async fn test_recv_timeout_hint_is_normalized() {
        let cases = [
            (PackStreamValue::Integer(42), Duration::from_millis(42_000)),
            (PackStreamValue::Float(21.0), Duration::from_millis(21_000)),
            (PackStreamValue::Integer(12), Duration::from_millis(12_000)),
        ];
        for (value, expected) in cases {
            let (connection, channel) = open(BoltVersion::V4_4).await;
            channel.reply_next(vec![hello_reply(Some(hints(value)))]);
            connection.connect("ua", &AuthToken::none()).await.unwrap();
            assert_eq!(set_calls(&channel), vec![TimeoutCall::Set(expected)]);
        }
    }

    #[tokio::test]
    async fn test_missing_or_invalid_hints_are_ignored() {
        let cases = vec![
            None,
            Some(PackStreamValue::Null),
            Some(PackStreamValue::Map(HashMap::new())),
            Some(hints(PackStreamValue::Null)),
            Some(hints(PackStreamValue::Map(HashMap::new()))),
            Some(hints(PackStreamValue::Integer(0))),
        ];
        for case in cases {
            let (connection, channel) = open(BoltVersion::V4_4).await;
            channel.reply_next(vec![hello_reply(case)]);
            connection.connect("ua", &AuthToken::none()).await.unwrap();
            assert!(set_calls(&channel).is_empty());
        }
    }

    #[tokio::test]
    async fn test_telemetry_hint() {
        let (connection, channel) = open(BoltVersion::V5_4).await;
        let mut map = HashMap::new();
        map.insert(TELEMETRY_HINT.to_string(), PackStreamValue::Boolean(true));
        channel.reply_next(vec![hello_reply(Some(PackStreamValue::Map(map)))]);
        connection.connect("ua", &AuthToken::none()).await.unwrap();
        assert!(connection.telemetry_enabled());
    }

    #[tokio::test]
    async fn test_receive_timer_follows_pending_requests() {
        let (connection, channel) = open(BoltVersion::V4_4).await;
        connection.connect("ua", &AuthToken::none()).await.unwrap();
        assert_eq!(channel.timeout_calls(), vec![TimeoutCall::Start, TimeoutCall::Stop]);
    }

    #[tokio::test]
    async fn test_failed_hello_closes_connection() {
        let (connection, channel) = open(BoltVersion::V4_4).await;
        channel.reply_next(vec![BoltResponse::failure(
            "Neo.ClientError.Security.Unauthorized",
            "bad credentials",
        )]);

        let err = connection.connect("ua", &AuthToken::basic("neo4j", "wrong")).await.unwrap_err();
        assert_eq!(err.code(), Some("Neo.ClientError.Security.Unauthorized"));
        assert!(!connection.is_open());
        assert_eq!(connection.auth_token(), None);
    }

    #[tokio::test]
    async fn test_reauthentication() {
        let (connection, channel) = open(BoltVersion::V5_1).await;
        connection.connect("ua", &AuthToken::basic("a", "1")).await.unwrap();
        connection.connect("ua", &AuthToken::basic("b", "2")).await.unwrap();
        assert_eq!(
            channel.written_tags(),
            vec![tag::HELLO, tag::LOGON, tag::LOGOFF, tag::LOGON]
        );
        assert_eq!(connection.auth_token(), Some(AuthToken::basic("b", "2")));

        let (old, _) = open(BoltVersion::V5_0).await;
        old.connect("ua", &AuthToken::basic("a", "1")).await.unwrap();
        let err = old.connect("ua", &AuthToken::basic("b", "2")).await.unwrap_err();
        assert!(matches!(err, DriverError::UnsupportedFeature(_)));
        assert_eq!(old.auth_token(), Some(AuthToken::basic("a", "1")));
    }

    #[tokio::test]
    async fn test_reset_and_flush() {
        let (connection, channel) = open(BoltVersion::V5_0).await;
        connection.reset_and_flush().await.unwrap();

        channel.reply_next(vec![BoltResponse::Ignored]);
        assert!(connection.reset_and_flush().await.is_err());
        assert_eq!(channel.written_tags(), vec![tag::RESET, tag::RESET]);
    }

    #[tokio::test]
    async fn test_transport_error_fails_pending_observers() {
        let (connection, channel) = open(BoltVersion::V5_0).await;
        channel.hold_replies();
        let (observer, pending) = ResponseCollector::boxed();
        connection.write(BoltRequest::Reset, observer, true).await.unwrap();

        channel.fail(BoltError::ReceiveTimeout { millis: 30_000 });
        let err = pending.wait().await.unwrap_err();
        assert!(matches!(err, DriverError::ServiceUnavailable(_)));
        assert!(!connection.is_open());

        let (observer, pending) = ResponseCollector::boxed();
        assert!(connection.write(BoltRequest::Reset, observer, true).await.is_err());
        assert!(pending.wait().await.is_err());
    }

    #[tokio::test]
    async fn test_unexpected_response_is_fatal() {
        let (connection, channel) = open(BoltVersion::V5_0).await;
        channel.push(BoltResponse::Record(RecordMessage { fields: vec![] }));
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;
        assert!(!connection.is_open());
    }

    #[tokio::test]
    async fn test_close_sends_goodbye_once() {
        let (connection, channel) = open(BoltVersion::V5_0).await;
        connection.close().await;
        connection.close().await;
        assert_eq!(channel.written_tags(), vec![tag::GOODBYE]);
        assert!(!connection.is_open());
    }

    #[tokio::test]
    async fn test_fetch_routing_table() {
        let (connection, channel) = open(BoltVersion::V4_4).await;
        channel.set_responder(|request| {
            assert_eq!(request.tag, tag::ROUTE);
            let mut server = HashMap::new();
            server.insert("role".to_string(), PackStreamValue::from("ROUTE"));
            server.insert("addresses".to_string(), PackStreamValue::from(vec!["core:7687".to_string()]));
            let mut rt = HashMap::new();
            rt.insert("ttl".to_string(), PackStreamValue::Integer(300));
            rt.insert("db".to_string(), PackStreamValue::from("neo4j"));
            rt.insert(
                "servers".to_string(),
                PackStreamValue::List(vec![PackStreamValue::Map(server)]),
            );
            vec![BoltResponse::success([("rt", PackStreamValue::Map(rt))])]
        });

        let context = HashMap::new();
        let table = connection
            .fetch_routing_table(RouteRequest {
                routing_context: &context,
                bookmarks: &[],
                database: None,
                impersonated_user: None,
            })
            .await
            .unwrap();
        assert_eq!(table.database.as_deref(), Some("neo4j"));
        assert_eq!(table.routers, vec![ServerAddress::new("core", 7687)]);
    }
}
