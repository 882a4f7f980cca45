//! One-shot client commands: connect to the client endpoint, make a single
//! request, and report the streamer's answer.

use anyhow::Context;
use futures_util::{SinkExt, StreamExt};
use rr_protocol::{codec, ClientMessage, Decoded};
use serde_json::{json, Value};
use tokio_tungstenite::tungstenite::Message;

/// Send `data` as one `request` and return the response payload.
///
/// A response carrying an `error` becomes an `Err`.
pub async fn round_trip(url: &str, data: Value) -> anyhow::Result<Value> {
    let (mut ws, _response) = tokio_tungstenite::connect_async(url)
        .await
        .with_context(|| format!("connecting to {url}"))?;

    let frame = codec::encode(&ClientMessage::Request { data })?;
    ws.send(Message::Text(frame)).await.context("sending request")?;

    while let Some(msg) = ws.next().await {
        let text = match msg.context("reading response")? {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        match codec::decode_client(&text)? {
            Decoded::Message(ClientMessage::Response { data, error }) => {
                let _ = ws.close(None).await;
                return match error {
                    Some(e) => Err(anyhow::anyhow!("relay: {e}")),
                    None => Ok(data),
                };
            }
            other => tracing::debug!(frame = ?other, "ignoring unexpected frame"),
        }
    }

    anyhow::bail!("relay closed the connection before responding")
}

/// `get_settings`: print the streamer's settings as pretty JSON.
pub async fn get_settings(url: &str) -> anyhow::Result<()> {
    let data = round_trip(url, json!({ "getSettings": {} })).await?;
    let settings = settings_from_response(&data);
    println!("{}", serde_json::to_string_pretty(settings)?);
    Ok(())
}

/// `set_zoom`
pub async fn set_zoom(url: &str, level: f32) -> anyhow::Result<()> {
    round_trip(url, json!({ "setZoom": { "x": level } })).await?;
    println!("zoom set to {level}");
    Ok(())
}

/// `set_scene`
pub async fn set_scene(url: &str, name: &str) -> anyhow::Result<()> {
    round_trip(url, json!({ "setScene": { "id": name } })).await?;
    println!("scene set to {name}");
    Ok(())
}

/// Streamers answer `getSettings` with `{"getSettings": {"data": ...}}`;
/// anything else is printed as-is.
fn settings_from_response(data: &Value) -> &Value {
    data.pointer("/getSettings/data").unwrap_or(data)
}
