use std::collections::BTreeMap;

use serde::de::{self, IgnoredAny};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::codec::Envelope;

/// Challenge and salt the streamer must fold into its `identify` digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authentication {
    pub challenge: String,
    pub salt: String,
}

/// Outcome carried by `identified` and `response`.
///
/// On the wire each outcome is a single-key object with an empty payload,
/// e.g. `{"ok":{}}`. Kinds this crate does not know decode to
/// [`RequestResult::Unrecognized`] so the surrounding message survives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestResult {
    Ok,
    WrongPassword,
    UnknownRequest,
    NotIdentified,
    AlreadyIdentified,
    Unrecognized(String),
}

impl RequestResult {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }

    /// Wire name of the variant, for log and error messages.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Ok => "ok",
            Self::WrongPassword => "wrongPassword",
            Self::UnknownRequest => "unknownRequest",
            Self::NotIdentified => "notIdentified",
            Self::AlreadyIdentified => "alreadyIdentified",
            Self::Unrecognized(kind) => kind,
        }
    }

    fn from_kind(kind: String) -> Self {
        match kind.as_str() {
            "ok" => Self::Ok,
            "wrongPassword" => Self::WrongPassword,
            "unknownRequest" => Self::UnknownRequest,
            "notIdentified" => Self::NotIdentified,
            "alreadyIdentified" => Self::AlreadyIdentified,
            _ => Self::Unrecognized(kind),
        }
    }
}

impl Serialize for RequestResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(self.as_str(), &Map::new())?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for RequestResult {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tagged = BTreeMap::<String, IgnoredAny>::deserialize(deserializer)?;
        let mut kinds = tagged.into_keys();
        match (kinds.next(), kinds.next()) {
            (Some(kind), None) => Ok(Self::from_kind(kind)),
            _ => Err(de::Error::custom("result must have exactly one kind")),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Relay → streamer
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RelayMessage {
    /// First frame on every streamer connection.
    Hello {
        #[serde(rename = "apiVersion")]
        api_version: String,
        authentication: Authentication,
    },
    /// Sent once the streamer's `identify` digest checks out.
    Identified { result: RequestResult },
    /// A client request, tagged with the id its response must echo.
    Request { id: u64, data: Value },
}

impl Envelope for RelayMessage {
    const KINDS: &'static [&'static str] = &["hello", "identified", "request"];
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Streamer → relay
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StreamerMessage {
    Identify { authentication: String },
    /// Out-of-band notification. `data` is itself a tagged union, decoded
    /// with [`StreamerEvent`]; it is kept raw so unknown event kinds survive.
    Event { data: Value },
    Response {
        id: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<RequestResult>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
    },
}

impl StreamerMessage {
    /// A `log` event carrying `entry`.
    pub fn log(entry: impl Into<String>) -> Self {
        Self::Event {
            data: serde_json::json!({ "log": { "entry": entry.into() } }),
        }
    }
}

impl Envelope for StreamerMessage {
    const KINDS: &'static [&'static str] = &["identify", "event", "response"];
}

/// Event kinds the relay understands inside `event.data`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StreamerEvent {
    Log { entry: String },
}

impl Envelope for StreamerEvent {
    const KINDS: &'static [&'static str] = &["log"];
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Downstream clients
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    Request {
        #[serde(default)]
        data: Value,
    },
    Response {
        #[serde(default)]
        data: Value,
        /// Set when the relay could not obtain a streamer response.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}
