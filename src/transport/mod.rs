pub mod backoff;
mod connection;
pub mod consumer;
pub mod direct;
pub mod endpoint;
pub mod forward;
pub mod latest;
pub mod state;

use std::sync::Arc;

pub use backoff::{Backoff, RetryPolicy};
pub use consumer::{ConsumerClient, ConsumerStatus};
pub use direct::DirectSocketTransport;
pub use forward::ForwardingTransport;
pub use latest::{LatestCell, PublishGate};
pub use state::TransportState;

use crate::bridge::Bridge;
use crate::config::{StreamConfig, StreamMode};
use crate::packet::SkeletonPacket;

/// Where finished packets go. Sending never blocks the frame pipeline.
pub trait PacketSink: Send + Sync {
    fn send(&self, packet: &SkeletonPacket);
}

/// Transport selected by the configured stream mode.
///
/// The direct socket is started here; its loop runs until the returned
/// handle is stopped or dropped.
pub enum Outbound {
    Forward(Arc<ForwardingTransport>),
    Direct(Arc<DirectSocketTransport>),
}

impl Outbound {
    pub fn from_config(stream: &StreamConfig, bridge: &Arc<Bridge>) -> Self {
        match stream.stream_mode {
            StreamMode::HostBroadcast => {
                Outbound::Forward(Arc::new(ForwardingTransport::new(Arc::clone(bridge))))
            }
            StreamMode::DirectSocket => {
                let direct = Arc::new(DirectSocketTransport::from_config(stream));
                log::info!("[stream] direct socket target {}", direct.url());
                direct.start();
                Outbound::Direct(direct)
            }
        }
    }

    pub fn sink(&self) -> Arc<dyn PacketSink> {
        match self {
            Outbound::Forward(t) => t.clone() as Arc<dyn PacketSink>,
            Outbound::Direct(t) => t.clone() as Arc<dyn PacketSink>,
        }
    }

    /// Close the direct socket, waiting for its close frame to go out.
    pub async fn shutdown(&self) {
        if let Outbound::Direct(t) = self {
            t.shutdown().await;
        }
    }
}
