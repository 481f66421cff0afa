//! Bolt protocol version definitions.

use std::fmt;

/// A Bolt protocol version.
///
/// On the wire a version occupies four bytes `[0, range, minor, major]`.
/// `range` is only meaningful in client proposals: it offers `minor` and the
/// `range` minors below it in a single slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BoltVersion {
    major: u8,
    minor: u8,
}

impl BoltVersion {
    pub const V4_0: BoltVersion = BoltVersion::new(4, 0);
    pub const V4_1: BoltVersion = BoltVersion::new(4, 1);
    pub const V4_2: BoltVersion = BoltVersion::new(4, 2);
    /// Added ROUTE
    pub const V4_3: BoltVersion = BoltVersion::new(4, 3);
    /// Added impersonation
    pub const V4_4: BoltVersion = BoltVersion::new(4, 4);
    /// Element ids
    pub const V5_0: BoltVersion = BoltVersion::new(5, 0);
    /// LOGON/LOGOFF, re-authentication
    pub const V5_1: BoltVersion = BoltVersion::new(5, 1);
    /// Notification filters
    pub const V5_2: BoltVersion = BoltVersion::new(5, 2);
    /// bolt_agent in HELLO
    pub const V5_3: BoltVersion = BoltVersion::new(5, 3);
    /// TELEMETRY
    pub const V5_4: BoltVersion = BoltVersion::new(5, 4);

    /// Every version this client speaks, newest first.
    pub const ALL: [BoltVersion; 10] = [
        BoltVersion::V5_4,
        BoltVersion::V5_3,
        BoltVersion::V5_2,
        BoltVersion::V5_1,
        BoltVersion::V5_0,
        BoltVersion::V4_4,
        BoltVersion::V4_3,
        BoltVersion::V4_2,
        BoltVersion::V4_1,
        BoltVersion::V4_0,
    ];

    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }

    pub fn major(self) -> u8 {
        self.major
    }

    pub fn minor(self) -> u8 {
        self.minor
    }

    /// Whether this client can speak `self`.
    pub fn is_supported(self) -> bool {
        Self::ALL.contains(&self)
    }

    /// Proposal slot offering this version and `range` minors below it.
    pub fn to_proposal(self, range: u8) -> [u8; 4] {
        [0, range.min(self.minor), self.minor, self.major]
    }

    /// Read a server reply slot. The all-zero reply yields `None`.
    pub fn from_reply(bytes: [u8; 4]) -> Option<Self> {
        match bytes {
            [0, 0, 0, 0] => None,
            [_, _, minor, major] => Some(Self::new(major, minor)),
        }
    }

    pub fn supports_route(self) -> bool {
        self >= Self::V4_3
    }

    pub fn supports_impersonation(self) -> bool {
        self >= Self::V4_4
    }

    pub fn uses_element_ids(self) -> bool {
        self >= Self::V5_0
    }

    pub fn supports_logon(self) -> bool {
        self >= Self::V5_1
    }

    pub fn supports_bolt_agent(self) -> bool {
        self >= Self::V5_3
    }

    pub fn supports_telemetry(self) -> bool {
        self >= Self::V5_4
    }
}

impl fmt::Display for BoltVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}
