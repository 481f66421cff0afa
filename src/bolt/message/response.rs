//! Bolt response messages.

use std::collections::HashMap;

use super::tag;
use crate::bolt::packstream::{PackStreamError, PackStreamStructure, PackStreamValue};

/// All Bolt response messages.
#[derive(Debug, Clone, PartialEq)]
pub enum BoltResponse {
    Success(SuccessMessage),
    Record(RecordMessage),
    Failure(FailureMessage),
    /// Request skipped because the connection is in a failed state
    Ignored,
}

impl BoltResponse {
    pub fn tag(&self) -> u8 {
        match self {
            BoltResponse::Success(_) => tag::SUCCESS,
            BoltResponse::Record(_) => tag::RECORD,
            BoltResponse::Failure(_) => tag::FAILURE,
            BoltResponse::Ignored => tag::IGNORED,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BoltResponse::Success(_) => "SUCCESS",
            BoltResponse::Record(_) => "RECORD",
            BoltResponse::Failure(_) => "FAILURE",
            BoltResponse::Ignored => "IGNORED",
        }
    }

    /// Every response but RECORD ends the exchange for its request.
    pub fn is_summary(&self) -> bool {
        !matches!(self, BoltResponse::Record(_))
    }

    /// Convenience for building SUCCESS from key/value pairs.
    pub fn success<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, PackStreamValue)>,
        K: Into<String>,
    {
        BoltResponse::Success(SuccessMessage {
            metadata: entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        })
    }

    pub fn failure(code: impl Into<String>, message: impl Into<String>) -> Self {
        BoltResponse::Failure(FailureMessage {
            code: code.into(),
            message: message.into(),
        })
    }

    pub fn to_structure(&self) -> PackStreamStructure {
        let fields = match self {
            BoltResponse::Success(msg) => vec![PackStreamValue::Map(msg.metadata.clone())],
            BoltResponse::Record(msg) => vec![PackStreamValue::List(msg.fields.clone())],
            BoltResponse::Failure(msg) => {
                let mut metadata = HashMap::new();
                metadata.insert("code".to_string(), PackStreamValue::from(msg.code.as_str()));
                metadata.insert("message".to_string(), PackStreamValue::from(msg.message.as_str()));
                vec![PackStreamValue::Map(metadata)]
            }
            BoltResponse::Ignored => Vec::new(),
        };
        PackStreamStructure::new(self.tag(), fields)
    }

    pub fn from_structure(s: &PackStreamStructure) -> Result<Self, PackStreamError> {
        let first_map = || s.field(0).and_then(|v| v.as_map()).cloned().unwrap_or_default();
        match s.tag {
            tag::SUCCESS => Ok(BoltResponse::Success(SuccessMessage { metadata: first_map() })),
            tag::RECORD => match s.field(0) {
                Some(PackStreamValue::List(fields)) => Ok(BoltResponse::Record(RecordMessage {
                    fields: fields.clone(),
                })),
                _ => Err(PackStreamError::InvalidStructure("RECORD fields must be a list".into())),
            },
            tag::FAILURE => FailureMessage::from_metadata(&first_map()).map(BoltResponse::Failure),
            tag::IGNORED => Ok(BoltResponse::Ignored),
            other => Err(PackStreamError::InvalidStructure(format!(
                "Unknown response message tag: 0x{:02X}",
                other
            ))),
        }
    }
}

/// SUCCESS metadata.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SuccessMessage {
    pub metadata: HashMap<String, PackStreamValue>,
}

impl SuccessMessage {
    pub fn get(&self, key: &str) -> Option<&PackStreamValue> {
        self.metadata.get(key)
    }

    /// Server agent, e.g. `Neo4j/5.13.0`.
    pub fn server(&self) -> Option<&str> {
        self.get("server").and_then(|v| v.as_str())
    }

    pub fn connection_id(&self) -> Option<&str> {
        self.get("connection_id").and_then(|v| v.as_str())
    }

    /// Configuration hints sent with the HELLO reply.
    pub fn hints(&self) -> Option<&HashMap<String, PackStreamValue>> {
        self.get("hints").and_then(|v| v.as_map())
    }

    pub fn db(&self) -> Option<&str> {
        self.get("db").and_then(|v| v.as_str())
    }

    pub fn fields(&self) -> Vec<String> {
        self.get("fields").map(PackStreamValue::string_list).unwrap_or_default()
    }

    pub fn has_more(&self) -> bool {
        self.get("has_more").and_then(|v| v.as_bool()).unwrap_or(false)
    }

    pub fn bookmark(&self) -> Option<&str> {
        self.get("bookmark").and_then(|v| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordMessage {
    pub fields: Vec<PackStreamValue>,
}

/// FAILURE as sent by the server, before any reclassification.
#[derive(Debug, Clone, PartialEq)]
pub struct FailureMessage {
    pub code: String,
    pub message: String,
}

impl FailureMessage {
    fn from_metadata(metadata: &HashMap<String, PackStreamValue>) -> Result<Self, PackStreamError> {
        let code = metadata
            .get("code")
            .or_else(|| metadata.get("neo4j_code"))
            .and_then(|v| v.as_str())
            .ok_or_else(|| PackStreamError::InvalidStructure("FAILURE requires code".into()))?;
        let message = metadata.get("message").and_then(|v| v.as_str()).unwrap_or_default();
        Ok(Self {
            code: code.to_string(),
            message: message.to_string(),
        })
    }
}

impl std::fmt::Display for FailureMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_accessors() {
        let mut hints = HashMap::new();
        hints.insert("connection.recv_timeout_seconds".to_string(), PackStreamValue::Integer(30));
        let response = BoltResponse::success([
            ("server", PackStreamValue::from("Neo4j/5.13.0")),
            ("connection_id", PackStreamValue::from("bolt-7")),
            ("hints", PackStreamValue::Map(hints)),
        ]);
        let parsed = BoltResponse::from_structure(&response.to_structure()).unwrap();
        let BoltResponse::Success(msg) = parsed else {
            panic!("expected SUCCESS");
        };
        assert_eq!(msg.server(), Some("Neo4j/5.13.0"));
        assert_eq!(msg.connection_id(), Some("bolt-7"));
        assert_eq!(
            msg.hints().and_then(|h| h.get("connection.recv_timeout_seconds")),
            Some(&PackStreamValue::Integer(30))
        );
        assert!(!msg.has_more());
    }

    #[test]
    fn test_failure_parse() {
        let response = BoltResponse::failure("Neo.ClientError.Statement.SyntaxError", "bad query");
        let parsed = BoltResponse::from_structure(&response.to_structure()).unwrap();
        assert_eq!(parsed, response);
        assert!(parsed.is_summary());
    }

    #[test]
    fn test_failure_without_code_is_malformed() {
        let s = PackStreamStructure::new(tag::FAILURE, vec![PackStreamValue::Map(HashMap::new())]);
        assert!(BoltResponse::from_structure(&s).is_err());
    }

    #[test]
    fn test_record_and_ignored() {
        let record = BoltResponse::Record(RecordMessage {
            fields: vec![PackStreamValue::Integer(1)],
        });
        assert!(!record.is_summary());
        assert_eq!(BoltResponse::from_structure(&record.to_structure()).unwrap(), record);
        let ignored = PackStreamStructure::new(tag::IGNORED, vec![]);
        assert_eq!(BoltResponse::from_structure(&ignored).unwrap(), BoltResponse::Ignored);
    }

    #[test]
    fn test_unknown_tag() {
        let s = PackStreamStructure::new(0x10, vec![]);
        assert!(BoltResponse::from_structure(&s).is_err());
    }
}
