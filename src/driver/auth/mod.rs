//! Authentication
//!
//! - [`AuthToken`] - 자격 증명
//! - [`AuthTokenHolder`] - 만료를 아는 단일 갱신(single-flight) 토큰 캐시
//! - [`AuthenticationProvider`] - 연결이 현재 토큰을 쓰도록 보장

mod provider;
mod token_holder;

pub use provider::AuthenticationProvider;
pub use token_holder::{
    AuthTokenHolder, AuthTokenProvider, FnAuthTokenProvider, RefreshHandle, RenewableAuthToken,
    StaticAuthTokenProvider,
};

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::bolt::PackStreamValue;

// ============================================================================
// AuthToken - 인증 토큰
// ============================================================================

/// 인증 토큰
#[derive(Clone, PartialEq, Eq, Default)]
pub enum AuthToken {
    /// 인증 없음
    #[default]
    None,
    /// Basic 인증 (사용자명/비밀번호)
    Basic {
        username: String,
        password: String,
        realm: Option<String>,
    },
    /// Bearer 토큰
    Bearer { token: String },
    /// Kerberos 인증
    Kerberos { ticket: String },
    /// 커스텀 인증
    Custom {
        principal: String,
        credentials: String,
        realm: String,
        scheme: String,
        parameters: Option<HashMap<String, String>>,
    },
}

impl AuthToken {
    /// Basic 인증 토큰 생성
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Basic {
            username: username.into(),
            password: password.into(),
            realm: None,
        }
    }

    /// Basic 인증 토큰 생성 (realm 포함)
    pub fn basic_with_realm(
        username: impl Into<String>,
        password: impl Into<String>,
        realm: impl Into<String>,
    ) -> Self {
        Self::Basic {
            username: username.into(),
            password: password.into(),
            realm: Some(realm.into()),
        }
    }

    /// Bearer 토큰 생성
    pub fn bearer(token: impl Into<String>) -> Self {
        Self::Bearer { token: token.into() }
    }

    /// Kerberos 토큰 생성
    pub fn kerberos(ticket: impl Into<String>) -> Self {
        Self::Kerberos { ticket: ticket.into() }
    }

    /// 인증 없음
    pub fn none() -> Self {
        Self::None
    }

    /// 인증 스킴
    pub fn scheme(&self) -> &str {
        match self {
            Self::None => "none",
            Self::Basic { .. } => "basic",
            Self::Bearer { .. } => "bearer",
            Self::Kerberos { .. } => "kerberos",
            Self::Custom { scheme, .. } => scheme,
        }
    }

    /// 주체 (없으면 빈 문자열)
    pub fn principal(&self) -> &str {
        match self {
            Self::Basic { username, .. } => username,
            Self::Custom { principal, .. } => principal,
            _ => "",
        }
    }

    /// HELLO / LOGON 에 실리는 맵
    pub fn to_bolt_map(&self) -> HashMap<String, PackStreamValue> {
        let mut map = HashMap::new();
        map.insert("scheme".to_string(), PackStreamValue::from(self.scheme()));
        match self {
            Self::None => {}
            Self::Basic { username, password, realm } => {
                map.insert("principal".into(), username.as_str().into());
                map.insert("credentials".into(), password.as_str().into());
                if let Some(realm) = realm {
                    map.insert("realm".into(), realm.as_str().into());
                }
            }
            Self::Bearer { token } => {
                map.insert("credentials".into(), token.as_str().into());
            }
            Self::Kerberos { ticket } => {
                map.insert("principal".into(), "".into());
                map.insert("credentials".into(), ticket.as_str().into());
            }
            Self::Custom {
                principal,
                credentials,
                realm,
                parameters,
                ..
            } => {
                map.insert("principal".into(), principal.as_str().into());
                map.insert("credentials".into(), credentials.as_str().into());
                if !realm.is_empty() {
                    map.insert("realm".into(), realm.as_str().into());
                }
                if let Some(parameters) = parameters {
                    let parameters = parameters
                        .iter()
                        .map(|(k, v)| (k.clone(), PackStreamValue::from(v.as_str())))
                        .collect();
                    map.insert("parameters".into(), PackStreamValue::Map(parameters));
                }
            }
        }
        map
    }
}

/// `Eq` 와 일치하는 해시; 파라미터 맵은 키 순서로 정렬해 해시
impl Hash for AuthToken {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::None => {}
            Self::Basic { username, password, realm } => {
                username.hash(state);
                password.hash(state);
                realm.hash(state);
            }
            Self::Bearer { token } => token.hash(state),
            Self::Kerberos { ticket } => ticket.hash(state),
            Self::Custom {
                principal,
                credentials,
                realm,
                scheme,
                parameters,
            } => {
                principal.hash(state);
                credentials.hash(state);
                realm.hash(state);
                scheme.hash(state);
                let sorted = parameters.as_ref().map(|p| p.iter().collect::<BTreeMap<_, _>>());
                sorted.hash(state);
            }
        }
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "AuthToken::None"),
            Self::Basic { username, realm, .. } => f
                .debug_struct("AuthToken::Basic")
                .field("username", username)
                .field("password", &"******")
                .field("realm", realm)
                .finish(),
            Self::Bearer { .. } => f.debug_struct("AuthToken::Bearer").field("token", &"******").finish(),
            Self::Kerberos { .. } => f.debug_struct("AuthToken::Kerberos").field("ticket", &"******").finish(),
            Self::Custom { principal, scheme, .. } => f
                .debug_struct("AuthToken::Custom")
                .field("scheme", scheme)
                .field("principal", principal)
                .field("credentials", &"******")
                .finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_bolt_map() {
        let map = AuthToken::basic_with_realm("neo4j", "secret", "native").to_bolt_map();
        assert_eq!(map["scheme"].as_str(), Some("basic"));
        assert_eq!(map["principal"].as_str(), Some("neo4j"));
        assert_eq!(map["credentials"].as_str(), Some("secret"));
        assert_eq!(map["realm"].as_str(), Some("native"));
    }

    #[test]
    fn test_none_and_bearer_maps() {
        let none = AuthToken::none().to_bolt_map();
        assert_eq!(none.len(), 1);
        assert_eq!(none["scheme"].as_str(), Some("none"));

        let bearer = AuthToken::bearer("jwt").to_bolt_map();
        assert_eq!(bearer["credentials"].as_str(), Some("jwt"));
        assert!(!bearer.contains_key("principal"));
    }

    #[test]
    fn test_custom_parameters() {
        let mut parameters = HashMap::new();
        parameters.insert("tenant".to_string(), "acme".to_string());
        let token = AuthToken::Custom {
            principal: "svc".into(),
            credentials: "key".into(),
            realm: String::new(),
            scheme: "acme-sso".into(),
            parameters: Some(parameters),
        };
        let map = token.to_bolt_map();
        assert_eq!(map["scheme"].as_str(), Some("acme-sso"));
        assert!(!map.contains_key("realm"));
        assert_eq!(map["parameters"].as_map().unwrap()["tenant"].as_str(), Some("acme"));
    }

    #[test]
    fn test_hash_agrees_with_eq() {
        use std::collections::HashSet;

        let custom = |pairs: &[(&str, &str)]| AuthToken::Custom {
            principal: "svc".into(),
            credentials: "key".into(),
            realm: String::new(),
            scheme: "acme-sso".into(),
            parameters: Some(pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()),
        };

        let mut set = HashSet::new();
        set.insert(AuthToken::basic("neo4j", "one"));
        set.insert(AuthToken::basic("neo4j", "two"));
        set.insert(AuthToken::basic("neo4j", "one"));
        set.insert(custom(&[("a", "1"), ("b", "2")]));
        set.insert(custom(&[("b", "2"), ("a", "1")]));
        set.insert(custom(&[("a", "1"), ("b", "3")]));
        assert_eq!(set.len(), 4);
        assert!(set.contains(&AuthToken::basic("neo4j", "two")));
        assert!(!set.contains(&AuthToken::bearer("one")));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let debug = format!("{:?}", AuthToken::basic("neo4j", "hunter2"));
        assert!(debug.contains("neo4j"));
        assert!(!debug.contains("hunter2"));
        assert!(!format!("{:?}", AuthToken::bearer("jwt-secret")).contains("jwt-secret"));
    }
}
