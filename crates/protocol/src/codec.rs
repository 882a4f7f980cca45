//! Text codec for envelopes.
//!
//! Encoding is plain `serde_json`. Decoding is lenient about kinds: every
//! top-level key the receiving role does not know is reported as
//! [`Decoded::Unrecognized`] instead of failing the whole frame, so older
//! relays keep working against newer streamers.

use rr_domain::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::ClientMessage;

/// A single-key tagged union with a closed set of kinds.
pub trait Envelope: Serialize + DeserializeOwned {
    /// Wire names of every variant.
    const KINDS: &'static [&'static str];
}

/// One decoded top-level entry of a frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded<M> {
    Message(M),
    Unrecognized(String),
}

/// Serialize a message to its wire text.
pub fn encode<M: Serialize>(msg: &M) -> Result<String> {
    Ok(serde_json::to_string(msg)?)
}

/// Decode a streamer-side frame.
pub fn decode<M: Envelope>(text: &str) -> Result<Vec<Decoded<M>>> {
    decode_value(serde_json::from_str(text)?)
}

/// Decode an already-parsed tagged union (e.g. `event.data`).
///
/// A malformed payload under a known kind is an error; unknown kinds are not.
pub fn decode_value<M: Envelope>(value: Value) -> Result<Vec<Decoded<M>>> {
    let map = match value {
        Value::Object(map) => map,
        other => {
            return Err(Error::Protocol(format!(
                "expected a JSON object envelope, got {}",
                type_name(&other)
            )))
        }
    };

    map.into_iter()
        .map(|(kind, payload)| {
            if !M::KINDS.contains(&kind.as_str()) {
                return Ok(Decoded::Unrecognized(kind));
            }
            let mut single = Map::with_capacity(1);
            single.insert(kind, payload);
            Ok(Decoded::Message(serde_json::from_value(Value::Object(single))?))
        })
        .collect()
}

/// Decode a downstream client frame (`{"type": ..., "data": ...}`).
pub fn decode_client(text: &str) -> Result<Decoded<ClientMessage>> {
    let value: Value = serde_json::from_str(text)?;
    let kind = match value.get("type").and_then(Value::as_str) {
        Some(kind) => kind.to_owned(),
        None => return Err(Error::Protocol("client frame has no \"type\"".into())),
    };

    match kind.as_str() {
        "request" | "response" => Ok(Decoded::Message(serde_json::from_value(value)?)),
        _ => Ok(Decoded::Unrecognized(kind)),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
