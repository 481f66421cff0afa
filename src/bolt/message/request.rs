//! Bolt request messages.
//!
//! Requests are only ever written by this client, so each message knows how
//! to become a [`PackStreamStructure`] and nothing more. Version-specific
//! field layouts are chosen by the protocol layer that builds them.

use std::collections::HashMap;
use std::time::Duration;

use super::tag;
use crate::bolt::packstream::{PackStreamStructure, PackStreamValue};

/// Access mode for transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AccessMode {
    #[default]
    Write,
    Read,
}

impl AccessMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessMode::Read => "r",
            AccessMode::Write => "w",
        }
    }
}

type Extra = HashMap<String, PackStreamValue>;

fn extra_map(extra: &Extra) -> PackStreamValue {
    PackStreamValue::Map(extra.clone())
}

/// All Bolt request messages.
#[derive(Debug, Clone, PartialEq)]
pub enum BoltRequest {
    Hello(HelloMessage),
    /// Credentials for a connection that already said HELLO (5.1+)
    Logon(LogonMessage),
    Logoff,
    Goodbye,
    Reset,
    Run(RunMessage),
    Pull(StreamMessage),
    Discard(StreamMessage),
    Begin(TransactionExtra),
    Commit,
    Rollback,
    Route(RouteMessage),
    /// API usage marker (5.4+)
    Telemetry(i64),
}

impl BoltRequest {
    pub fn tag(&self) -> u8 {
        match self {
            BoltRequest::Hello(_) => tag::HELLO,
            BoltRequest::Logon(_) => tag::LOGON,
            BoltRequest::Logoff => tag::LOGOFF,
            BoltRequest::Goodbye => tag::GOODBYE,
            BoltRequest::Reset => tag::RESET,
            BoltRequest::Run(_) => tag::RUN,
            BoltRequest::Pull(_) => tag::PULL,
            BoltRequest::Discard(_) => tag::DISCARD,
            BoltRequest::Begin(_) => tag::BEGIN,
            BoltRequest::Commit => tag::COMMIT,
            BoltRequest::Rollback => tag::ROLLBACK,
            BoltRequest::Route(_) => tag::ROUTE,
            BoltRequest::Telemetry(_) => tag::TELEMETRY,
        }
    }

    /// Message name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            BoltRequest::Hello(_) => "HELLO",
            BoltRequest::Logon(_) => "LOGON",
            BoltRequest::Logoff => "LOGOFF",
            BoltRequest::Goodbye => "GOODBYE",
            BoltRequest::Reset => "RESET",
            BoltRequest::Run(_) => "RUN",
            BoltRequest::Pull(_) => "PULL",
            BoltRequest::Discard(_) => "DISCARD",
            BoltRequest::Begin(_) => "BEGIN",
            BoltRequest::Commit => "COMMIT",
            BoltRequest::Rollback => "ROLLBACK",
            BoltRequest::Route(_) => "ROUTE",
            BoltRequest::Telemetry(_) => "TELEMETRY",
        }
    }

    /// Whether the server answers this message at all. GOODBYE gets no reply.
    pub fn expects_response(&self) -> bool {
        !matches!(self, BoltRequest::Goodbye)
    }

    pub fn to_structure(&self) -> PackStreamStructure {
        let fields = match self {
            BoltRequest::Hello(msg) => vec![extra_map(&msg.extra())],
            BoltRequest::Logon(msg) => vec![extra_map(&msg.auth)],
            BoltRequest::Run(msg) => vec![
                PackStreamValue::String(msg.query.clone()),
                extra_map(&msg.parameters),
                extra_map(&msg.extra.to_map()),
            ],
            BoltRequest::Pull(msg) | BoltRequest::Discard(msg) => vec![extra_map(&msg.to_map())],
            BoltRequest::Begin(extra) => vec![extra_map(&extra.to_map())],
            BoltRequest::Route(msg) => msg.fields(),
            BoltRequest::Telemetry(api) => vec![PackStreamValue::Integer(*api)],
            BoltRequest::Logoff
            | BoltRequest::Goodbye
            | BoltRequest::Reset
            | BoltRequest::Commit
            | BoltRequest::Rollback => Vec::new(),
        };
        PackStreamStructure::new(self.tag(), fields)
    }
}

/// HELLO: introduces the client, and on pre-5.1 servers authenticates it.
#[derive(Debug, Clone, PartialEq)]
pub struct HelloMessage {
    pub user_agent: String,
    /// Auth entries merged into HELLO (before 5.1 only)
    pub auth: Option<Extra>,
    /// Routing context; present only when talking to a cluster
    pub routing: Option<Extra>,
    /// Structured client description (5.3+)
    pub bolt_agent: Option<Extra>,
}

impl HelloMessage {
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
            auth: None,
            routing: None,
            bolt_agent: None,
        }
    }

    pub fn with_auth(mut self, auth: Extra) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn with_routing(mut self, routing: Extra) -> Self {
        self.routing = Some(routing);
        self
    }

    pub fn with_bolt_agent(mut self, agent: Extra) -> Self {
        self.bolt_agent = Some(agent);
        self
    }

    fn extra(&self) -> Extra {
        let mut extra = self.auth.clone().unwrap_or_default();
        extra.insert("user_agent".into(), self.user_agent.clone().into());
        if let Some(routing) = &self.routing {
            extra.insert("routing".into(), PackStreamValue::Map(routing.clone()));
        }
        if let Some(agent) = &self.bolt_agent {
            extra.insert("bolt_agent".into(), PackStreamValue::Map(agent.clone()));
        }
        extra
    }
}

/// LOGON: credentials as a flat map (`scheme`, `principal`, ...).
#[derive(Debug, Clone, PartialEq)]
pub struct LogonMessage {
    pub auth: Extra,
}

/// RUN: a query plus its transaction extras (auto-commit) or none (explicit tx).
#[derive(Debug, Clone, PartialEq)]
pub struct RunMessage {
    pub query: String,
    pub parameters: Extra,
    pub extra: TransactionExtra,
}

impl RunMessage {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            parameters: HashMap::new(),
            extra: TransactionExtra::default(),
        }
    }

    pub fn with_parameters(mut self, parameters: Extra) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_extra(mut self, extra: TransactionExtra) -> Self {
        self.extra = extra;
        self
    }
}

/// Shared by BEGIN and auto-commit RUN.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TransactionExtra {
    pub bookmarks: Vec<String>,
    pub tx_timeout: Option<Duration>,
    pub tx_metadata: Extra,
    pub mode: AccessMode,
    pub database: Option<String>,
    pub impersonated_user: Option<String>,
}

impl TransactionExtra {
    pub fn to_map(&self) -> Extra {
        let mut extra = HashMap::new();
        if !self.bookmarks.is_empty() {
            extra.insert("bookmarks".into(), self.bookmarks.clone().into());
        }
        if let Some(timeout) = self.tx_timeout {
            extra.insert("tx_timeout".into(), PackStreamValue::Integer(timeout.as_millis() as i64));
        }
        if !self.tx_metadata.is_empty() {
            extra.insert("tx_metadata".into(), PackStreamValue::Map(self.tx_metadata.clone()));
        }
        if self.mode == AccessMode::Read {
            extra.insert("mode".into(), "r".into());
        }
        if let Some(db) = &self.database {
            extra.insert("db".into(), db.clone().into());
        }
        if let Some(user) = &self.impersonated_user {
            extra.insert("imp_user".into(), user.clone().into());
        }
        extra
    }
}

/// PULL / DISCARD batch request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamMessage {
    /// Records to stream; -1 for all
    pub n: i64,
    pub qid: Option<i64>,
}

impl StreamMessage {
    pub fn all() -> Self {
        Self { n: -1, qid: None }
    }

    pub fn batch(n: i64) -> Self {
        Self { n, qid: None }
    }

    fn to_map(self) -> Extra {
        let mut extra = HashMap::new();
        extra.insert("n".into(), PackStreamValue::Integer(self.n));
        if let Some(qid) = self.qid {
            extra.insert("qid".into(), PackStreamValue::Integer(qid));
        }
        extra
    }
}

/// ROUTE (4.3+). Bolt 4.3 sends the database as a bare third field; 4.4
/// and later send a map that can also carry the impersonated user.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteMessage {
    pub routing: Extra,
    pub bookmarks: Vec<String>,
    pub database: Option<String>,
    pub impersonated_user: Option<String>,
    pub database_as_map: bool,
}

impl RouteMessage {
    fn fields(&self) -> Vec<PackStreamValue> {
        let third = if self.database_as_map {
            let mut extra = HashMap::new();
            if let Some(db) = &self.database {
                extra.insert("db".into(), db.clone().into());
            }
            if let Some(user) = &self.impersonated_user {
                extra.insert("imp_user".into(), user.clone().into());
            }
            PackStreamValue::Map(extra)
        } else {
            self.database.clone().into()
        };
        vec![
            PackStreamValue::Map(self.routing.clone()),
            self.bookmarks.clone().into(),
            third,
        ]
    }
}
