//! Per-version message building.
//!
//! One implementation per version family, picked from the negotiated
//! version once the handshake completes.

use std::collections::HashMap;

use crate::bolt::{
    BoltRequest, BoltVersion, HelloMessage, LogonMessage, PackStreamValue, RouteMessage, RunMessage,
    StreamMessage,
};
use crate::driver::auth::AuthToken;
use crate::driver::error::{DriverError, DriverResult};
use crate::driver::response_handler::CollectedResponse;
use crate::driver::routing::RoutingTable;

const ROUTING_PROCEDURE: &str = "CALL dbms.routing.getRoutingTable($context, $database)";
const SYSTEM_DATABASE: &str = "system";

/// Parameters of a routing table request.
#[derive(Debug, Clone, Copy)]
pub struct RouteRequest<'a> {
    pub routing_context: &'a HashMap<String, String>,
    pub bookmarks: &'a [String],
    pub database: Option<&'a str>,
    pub impersonated_user: Option<&'a str>,
}

/// What a negotiated protocol version can do and how its messages look.
pub trait BoltProtocol: Send + Sync {
    fn version(&self) -> BoltVersion;

    /// HELLO, plus LOGON where credentials travel separately.
    fn initialize(
        &self,
        user_agent: &str,
        auth: &AuthToken,
        routing_context: Option<&HashMap<String, String>>,
    ) -> Vec<BoltRequest>;

    /// Swap credentials on a live connection.
    fn reauthenticate(&self, auth: &AuthToken) -> DriverResult<Vec<BoltRequest>>;

    fn route(&self, request: &RouteRequest<'_>) -> DriverResult<Vec<BoltRequest>>;

    /// Turns the collected responses of [`BoltProtocol::route`] into a table.
    fn parse_route(&self, responses: Vec<CollectedResponse>, database: Option<&str>) -> DriverResult<RoutingTable>;

    fn supports_multi_db(&self) -> bool {
        true
    }

    fn supports_transaction_config(&self) -> bool {
        true
    }

    fn supports_user_impersonation(&self) -> bool {
        self.version().supports_impersonation()
    }

    fn supports_reauth(&self) -> bool {
        self.version().supports_logon()
    }
}

/// Picks the implementation for a negotiated version.
pub fn protocol_for(version: BoltVersion) -> Box<dyn BoltProtocol> {
    if version.major() >= 5 {
        Box::new(BoltProtocolV5 { version })
    } else {
        Box::new(BoltProtocolV4 { version })
    }
}

fn routing_map(context: &HashMap<String, String>) -> HashMap<String, PackStreamValue> {
    context
        .iter()
        .map(|(k, v)| (k.clone(), PackStreamValue::from(v.as_str())))
        .collect()
}

fn route_message(version: BoltVersion, request: &RouteRequest<'_>) -> BoltRequest {
    BoltRequest::Route(RouteMessage {
        routing: routing_map(request.routing_context),
        bookmarks: request.bookmarks.to_vec(),
        database: request.database.map(String::from),
        impersonated_user: request.impersonated_user.map(String::from),
        database_as_map: version.supports_impersonation(),
    })
}

fn parse_route_summary(responses: Vec<CollectedResponse>, database: Option<&str>) -> DriverResult<RoutingTable> {
    let summary = responses
        .into_iter()
        .last()
        .map(|r| r.summary)
        .ok_or_else(|| DriverError::protocol("No response to ROUTE"))?;
    let rt = summary
        .get("rt")
        .and_then(PackStreamValue::as_map)
        .ok_or_else(|| DriverError::protocol("ROUTE response has no routing table"))?;
    RoutingTable::from_metadata(rt, database)
}

/// Bolt 4.x
#[derive(Debug, Clone, Copy)]
pub struct BoltProtocolV4 {
    version: BoltVersion,
}

impl BoltProtocol for BoltProtocolV4 {
    fn version(&self) -> BoltVersion {
        self.version
    }

    fn initialize(
        &self,
        user_agent: &str,
        auth: &AuthToken,
        routing_context: Option<&HashMap<String, String>>,
    ) -> Vec<BoltRequest> {
        let mut hello = HelloMessage::new(user_agent).with_auth(auth.to_bolt_map());
        if let Some(context) = routing_context {
            hello = hello.with_routing(routing_map(context));
        }
        vec![BoltRequest::Hello(hello)]
    }

    fn reauthenticate(&self, _auth: &AuthToken) -> DriverResult<Vec<BoltRequest>> {
        Err(DriverError::unsupported(format!(
            "Re-authentication requires Bolt 5.1 or later, connection uses {}",
            self.version
        )))
    }

    fn route(&self, request: &RouteRequest<'_>) -> DriverResult<Vec<BoltRequest>> {
        if self.version.supports_route() {
            if request.impersonated_user.is_some() && !self.version.supports_impersonation() {
                return Err(DriverError::unsupported(format!(
                    "User impersonation requires Bolt 4.4 or later, connection uses {}",
                    self.version
                )));
            }
            return Ok(vec![route_message(self.version, request)]);
        }

        if request.impersonated_user.is_some() {
            return Err(DriverError::unsupported(format!(
                "User impersonation requires Bolt 4.4 or later, connection uses {}",
                self.version
            )));
        }
        let mut parameters = HashMap::new();
        parameters.insert("context".to_string(), PackStreamValue::Map(routing_map(request.routing_context)));
        parameters.insert("database".to_string(), request.database.map(String::from).into());
        let run = RunMessage::new(ROUTING_PROCEDURE)
            .with_parameters(parameters)
            .with_extra(crate::bolt::TransactionExtra {
                bookmarks: request.bookmarks.to_vec(),
                database: Some(SYSTEM_DATABASE.to_string()),
                ..Default::default()
            });
        Ok(vec![BoltRequest::Run(run), BoltRequest::Pull(StreamMessage::all())])
    }

    fn parse_route(&self, responses: Vec<CollectedResponse>, database: Option<&str>) -> DriverResult<RoutingTable> {
        if self.version.supports_route() {
            return parse_route_summary(responses, database);
        }

        // RUN summary carries the field names, PULL carries the single record
        let mut responses = responses.into_iter();
        let (Some(run), Some(pull)) = (responses.next(), responses.next()) else {
            return Err(DriverError::protocol("Incomplete routing procedure response"));
        };
        let fields = run.summary.fields();
        let record = pull
            .records
            .into_iter()
            .next()
            .ok_or_else(|| DriverError::protocol("Routing procedure returned no records"))?;
        let rt: HashMap<String, PackStreamValue> = fields.into_iter().zip(record).collect();
        RoutingTable::from_metadata(&rt, database)
    }
}

/// Bolt 5.x
#[derive(Debug, Clone, Copy)]
pub struct BoltProtocolV5 {
    version: BoltVersion,
}

impl BoltProtocolV5 {
    fn bolt_agent() -> HashMap<String, PackStreamValue> {
        let mut agent = HashMap::new();
        agent.insert(
            "product".to_string(),
            PackStreamValue::from(format!("zeta4g-driver-core/{}", env!("CARGO_PKG_VERSION"))),
        );
        agent.insert(
            "platform".to_string(),
            PackStreamValue::from(format!("{}; {}", std::env::consts::OS, std::env::consts::ARCH)),
        );
        agent.insert("language".to_string(), PackStreamValue::from("Rust"));
        agent
    }
}

impl BoltProtocol for BoltProtocolV5 {
    fn version(&self) -> BoltVersion {
        self.version
    }

    fn initialize(
        &self,
        user_agent: &str,
        auth: &AuthToken,
        routing_context: Option<&HashMap<String, String>>,
    ) -> Vec<BoltRequest> {
        let mut hello = HelloMessage::new(user_agent);
        if let Some(context) = routing_context {
            hello = hello.with_routing(routing_map(context));
        }
        if self.version.supports_bolt_agent() {
            hello = hello.with_bolt_agent(Self::bolt_agent());
        }

        if !self.version.supports_logon() {
            return vec![BoltRequest::Hello(hello.with_auth(auth.to_bolt_map()))];
        }
        vec![
            BoltRequest::Hello(hello),
            BoltRequest::Logon(LogonMessage { auth: auth.to_bolt_map() }),
        ]
    }

    fn reauthenticate(&self, auth: &AuthToken) -> DriverResult<Vec<BoltRequest>> {
        if !self.version.supports_logon() {
            return Err(DriverError::unsupported(format!(
                "Re-authentication requires Bolt 5.1 or later, connection uses {}",
                self.version
            )));
        }
        Ok(vec![
            BoltRequest::Logoff,
            BoltRequest::Logon(LogonMessage { auth: auth.to_bolt_map() }),
        ])
    }

    fn route(&self, request: &RouteRequest<'_>) -> DriverResult<Vec<BoltRequest>> {
        Ok(vec![route_message(self.version, request)])
    }

    fn parse_route(&self, responses: Vec<CollectedResponse>, database: Option<&str>) -> DriverResult<RoutingTable> {
        parse_route_summary(responses, database)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bolt::message::tag;
    use crate::bolt::{BoltResponse, SuccessMessage};

    fn v(major: u8, minor: u8) -> BoltVersion {
        BoltVersion::new(major, minor)
    }

    fn tags(requests: &[BoltRequest]) -> Vec<u8> {
        requests.iter().map(BoltRequest::tag).collect()
    }

    #[test]
    fn test_initialize_per_version() {
        let auth = AuthToken::basic("neo4j", "pw");

        let v44 = protocol_for(v(4, 4)).initialize("ua", &auth, None);
        assert_eq!(tags(&v44), vec![tag::HELLO]);
        let BoltRequest::Hello(hello) = &v44[0] else { panic!("expected HELLO") };
        assert!(hello.auth.is_some());

        let v50 = protocol_for(v(5, 0)).initialize("ua", &auth, None);
        assert_eq!(tags(&v50), vec![tag::HELLO]);

        let v51 = protocol_for(v(5, 1)).initialize("ua", &auth, None);
        assert_eq!(tags(&v51), vec![tag::HELLO, tag::LOGON]);
        let BoltRequest::Hello(hello) = &v51[0] else { panic!("expected HELLO") };
        assert!(hello.auth.is_none());
        assert!(hello.bolt_agent.is_none());

        let v54 = protocol_for(v(5, 4)).initialize("ua", &auth, None);
        let BoltRequest::Hello(hello) = &v54[0] else { panic!("expected HELLO") };
        assert!(hello.bolt_agent.is_some());
    }

    #[test]
    fn test_routing_context_in_hello() {
        let mut context = HashMap::new();
        context.insert("region".to_string(), "eu".to_string());
        let requests = protocol_for(v(5, 2)).initialize("ua", &AuthToken::none(), Some(&context));
        let BoltRequest::Hello(hello) = &requests[0] else { panic!("expected HELLO") };
        assert_eq!(hello.routing.as_ref().unwrap()["region"].as_str(), Some("eu"));
    }

    #[test]
    fn test_feature_flags() {
        assert!(!protocol_for(v(4, 3)).supports_user_impersonation());
        assert!(protocol_for(v(4, 4)).supports_user_impersonation());
        assert!(!protocol_for(v(5, 0)).supports_reauth());
        assert!(protocol_for(v(5, 1)).supports_reauth());
        assert!(protocol_for(v(4, 0)).supports_multi_db());
        assert!(protocol_for(v(4, 0)).supports_transaction_config());
    }

    #[test]
    fn test_reauthenticate() {
        let auth = AuthToken::bearer("t");
        assert!(matches!(
            protocol_for(v(4, 4)).reauthenticate(&auth),
            Err(DriverError::UnsupportedFeature(_))
        ));
        let requests = protocol_for(v(5, 3)).reauthenticate(&auth).unwrap();
        assert_eq!(tags(&requests), vec![tag::LOGOFF, tag::LOGON]);
    }

    #[test]
    fn test_route_request_shapes() {
        let context = HashMap::new();
        let request = RouteRequest {
            routing_context: &context,
            bookmarks: &[],
            database: Some("movies"),
            impersonated_user: None,
        };
        assert_eq!(tags(&protocol_for(v(4, 1)).route(&request).unwrap()), vec![tag::RUN, tag::PULL]);
        assert_eq!(tags(&protocol_for(v(4, 3)).route(&request).unwrap()), vec![tag::ROUTE]);
        assert_eq!(tags(&protocol_for(v(5, 0)).route(&request).unwrap()), vec![tag::ROUTE]);

        let impersonating = RouteRequest {
            impersonated_user: Some("bob"),
            ..request
        };
        assert!(protocol_for(v(4, 3)).route(&impersonating).is_err());
        assert!(protocol_for(v(4, 4)).route(&impersonating).is_ok());
    }

    fn rt_value() -> PackStreamValue {
        let mut server = HashMap::new();
        server.insert("role".to_string(), PackStreamValue::from("ROUTE"));
        server.insert("addresses".to_string(), PackStreamValue::from(vec!["core:7687".to_string()]));
        PackStreamValue::List(vec![PackStreamValue::Map(server)])
    }

    #[test]
    fn test_parse_route_summary() {
        let mut rt = HashMap::new();
        rt.insert("ttl".to_string(), PackStreamValue::Integer(30));
        rt.insert("servers".to_string(), rt_value());
        rt.insert("db".to_string(), PackStreamValue::from("neo4j"));
        let BoltResponse::Success(summary) = BoltResponse::success([("rt", PackStreamValue::Map(rt))]) else {
            unreachable!()
        };

        let table = protocol_for(v(5, 0))
            .parse_route(vec![CollectedResponse { records: vec![], summary }], None)
            .unwrap();
        assert_eq!(table.database.as_deref(), Some("neo4j"));
        assert_eq!(table.routers.len(), 1);
    }

    #[test]
    fn test_parse_routing_procedure() {
        let BoltResponse::Success(run_summary) = BoltResponse::success([(
            "fields",
            PackStreamValue::from(vec!["ttl".to_string(), "servers".to_string()]),
        )]) else {
            unreachable!()
        };
        let responses = vec![
            CollectedResponse {
                records: vec![],
                summary: run_summary,
            },
            CollectedResponse {
                records: vec![vec![PackStreamValue::Integer(300), rt_value()]],
                summary: SuccessMessage::default(),
            },
        ];
        let table = protocol_for(v(4, 1)).parse_route(responses, Some("movies")).unwrap();
        assert_eq!(table.database.as_deref(), Some("movies"));
        assert_eq!(table.ttl.as_secs(), 300);
    }
}
