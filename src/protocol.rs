//! Capture host <-> bridge messages over a length-delimited TCP stream.
//!
//! Payloads are JSON objects tagged by `"type"`; field names follow the
//! host's camelCase convention.

use bytes::Bytes;
use futures::{Sink, SinkExt, StreamExt};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

pub type FrameId = String;

// --- Depth correlation payloads ---

/// A gated landmark position the host should sample depth at
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DepthQuery {
    pub index: usize,
    /// Normalized, already clamped into [0, 1]
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepthSample {
    pub landmark_index: usize,
    pub depth_meters: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlAction {
    Start,
    Stop,
}

// --- Message types ---

/// Host → bridge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostEvent {
    #[serde(rename_all = "camelCase")]
    Frame {
        frame_id: FrameId,
        /// base64 JPEG, optionally as a data URL
        image: String,
        width: u32,
        height: u32,
    },
    #[serde(rename_all = "camelCase")]
    DepthResponse {
        frame_id: FrameId,
        #[serde(default)]
        depths: Vec<DepthSample>,
    },
}

/// Bridge → host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeCommand {
    #[serde(rename_all = "camelCase")]
    DepthRequest {
        frame_id: FrameId,
        landmarks: Vec<DepthQuery>,
    },
    Control {
        action: ControlAction,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<serde_json::Value>,
    },
    /// Serialized skeleton packet for the host to broadcast
    Packet { payload: String },
}

// --- TCP codec helpers ---

pub type MessageStream = Framed<TcpStream, LengthDelimitedCodec>;

/// Create a framed message stream with length-delimited framing.
pub fn message_stream(stream: TcpStream) -> MessageStream {
    let codec = LengthDelimitedCodec::builder()
        .max_frame_length(16 * 1024 * 1024) // 16MB
        .new_codec();
    Framed::new(stream, codec)
}

pub fn encode_message<T: Serialize>(msg: &T) -> serde_json::Result<Bytes> {
    Ok(Bytes::from(serde_json::to_vec(msg)?))
}

pub fn decode_message<T: DeserializeOwned>(bytes: &[u8]) -> serde_json::Result<T> {
    serde_json::from_slice(bytes)
}

/// Send a serializable message (JSON + length prefix).
pub async fn send_to_sink<S, T>(sink: &mut S, msg: &T) -> anyhow::Result<()>
where
    S: Sink<Bytes, Error = std::io::Error> + Unpin,
    T: Serialize,
{
    sink.send(encode_message(msg)?).await?;
    Ok(())
}

/// Receive and deserialize a message.
pub async fn recv_message<T: DeserializeOwned>(
    stream: &mut MessageStream,
) -> anyhow::Result<T> {
    match stream.next().await {
        Some(Ok(bytes)) => Ok(decode_message(&bytes)?),
        Some(Err(e)) => Err(e.into()),
        None => Err(anyhow::anyhow!("connection closed")),
    }
}
