//! Remote control protocol: envelope types, the JSON codec, and the
//! challenge-response password digest.
//!
//! Three message families travel over WebSocket text frames:
//!
//! - [`RelayMessage`]: relay → streamer (`hello`, `identified`, `request`)
//! - [`StreamerMessage`]: streamer → relay (`identify`, `event`, `response`)
//! - [`ClientMessage`]: relay ↔ downstream clients (`{"type": ...}` frames)
//!
//! Streamer envelopes are single-key objects whose key is the message kind:
//!
//! ```text
//! {"request": {"id": 1, "data": {"getSettings": {}}}}
//! ```

pub mod auth;
pub mod codec;
mod messages;

pub use codec::{decode, decode_client, decode_value, encode, Decoded, Envelope};
pub use messages::*;

/// Protocol version this crate speaks, as announced in `hello.apiVersion`.
pub const API_VERSION: &str = "0.1";
