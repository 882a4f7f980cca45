//! Streamer/client relay: the broker state and both WebSocket endpoints.

pub mod broker;
pub mod challenge;
pub mod client;
pub mod correlator;
pub mod streamer;

pub use broker::{Broker, BrokerStatus, StreamerSink, StreamerStatus};
pub use challenge::Challenge;
pub use correlator::{CompletionSlot, Correlator, Reply};
