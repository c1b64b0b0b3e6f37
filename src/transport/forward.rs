use std::sync::Arc;

use super::PacketSink;
use crate::bridge::Bridge;
use crate::packet::SkeletonPacket;

/// Hands packets to the capture host's own broadcast channel.
///
/// No socket, no retry: broadcast reliability belongs to the host.
pub struct ForwardingTransport {
    bridge: Arc<Bridge>,
}

impl ForwardingTransport {
    pub fn new(bridge: Arc<Bridge>) -> Self {
        Self { bridge }
    }
}

impl PacketSink for ForwardingTransport {
    fn send(&self, packet: &SkeletonPacket) {
        match packet.to_json() {
            Ok(payload) => self.bridge.send_packet(payload),
            Err(e) => log::error!("[forward] failed to serialize packet: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::DEPTH_TIMEOUT;
    use crate::protocol::BridgeCommand;

    #[tokio::test]
    async fn test_forwards_serialized_packet() {
        let (bridge, mut commands) = Bridge::new(DEPTH_TIMEOUT);
        let transport = ForwardingTransport::new(bridge);

        let packet = SkeletonPacket {
            device: "rgb_camera".into(),
            camera_width: 640,
            camera_height: 480,
            ..SkeletonPacket::default()
        };
        transport.send(&packet);

        match commands.recv().await.unwrap() {
            BridgeCommand::Packet { payload } => {
                let decoded: SkeletonPacket = serde_json::from_str(&payload).unwrap();
                assert_eq!(decoded, packet);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
