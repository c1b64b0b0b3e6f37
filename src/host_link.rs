//! TCP link to the capture host: length-delimited JSON both ways.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures::StreamExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::bridge::Bridge;
use crate::config::HostLinkConfig;
use crate::protocol::{self, BridgeCommand, ControlAction, HostEvent, MessageStream};

/// Keep the bridge connected to the host until `cancel` fires.
///
/// Announces `start` on every connect and `stop` on shutdown. Commands queued
/// while disconnected are discarded on reconnect.
pub async fn run_host_link(
    config: HostLinkConfig,
    bridge: Arc<Bridge>,
    mut commands: mpsc::UnboundedReceiver<BridgeCommand>,
    cancel: CancellationToken,
) {
    let retry = Duration::from_millis(config.reconnect_delay_ms);

    loop {
        log::info!("[host] connecting to {}...", config.addr);
        let attempt = tokio::select! {
            _ = cancel.cancelled() => break,
            attempt = TcpStream::connect(&config.addr) => attempt,
        };

        match attempt {
            Ok(tcp) => {
                if let Err(e) = tcp.set_nodelay(true) {
                    log::warn!("[host] set_nodelay failed: {e}");
                }
                log::info!("[host] connected");

                let mut stale = 0usize;
                while commands.try_recv().is_ok() {
                    stale += 1;
                }
                if stale > 0 {
                    log::debug!("[host] discarded {stale} stale commands");
                }

                let stream = protocol::message_stream(tcp);
                if let Err(e) = run_session(stream, &bridge, &mut commands, &cancel).await {
                    log::warn!("[host] session error: {e:#}");
                }
            }
            Err(e) => log::warn!("[host] connection failed: {e}"),
        }

        if cancel.is_cancelled() {
            break;
        }
        log::info!("[host] reconnecting in {}ms...", retry.as_millis());
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(retry) => {}
        }
    }
    log::info!("[host] link stopped");
}

async fn run_session(
    stream: MessageStream,
    bridge: &Bridge,
    commands: &mut mpsc::UnboundedReceiver<BridgeCommand>,
    cancel: &CancellationToken,
) -> Result<()> {
    let (mut writer, mut reader) = stream.split();

    protocol::send_to_sink(
        &mut writer,
        &BridgeCommand::Control {
            action: ControlAction::Start,
            value: None,
        },
    )
    .await?;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let stop = BridgeCommand::Control {
                    action: ControlAction::Stop,
                    value: None,
                };
                protocol::send_to_sink(&mut writer, &stop).await?;
                return Ok(());
            }
            command = commands.recv() => match command {
                Some(command) => protocol::send_to_sink(&mut writer, &command).await?,
                // Bridge dropped; nothing left to relay
                None => return Ok(()),
            },
            incoming = reader.next() => match incoming {
                Some(Ok(bytes)) => match protocol::decode_message::<HostEvent>(&bytes) {
                    Ok(event) => bridge.handle_event(event),
                    Err(e) => log::warn!("[host] unreadable event: {e}"),
                },
                Some(Err(e)) => return Err(e.into()),
                None => anyhow::bail!("host closed the connection"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::DEPTH_TIMEOUT;
    use futures::SinkExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::net::TcpListener;

    async fn next_command(stream: &mut MessageStream) -> BridgeCommand {
        protocol::recv_message(stream).await.unwrap()
    }

    #[tokio::test]
    async fn test_link_relays_both_ways() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (bridge, commands) = Bridge::new(DEPTH_TIMEOUT);
        let frames = Arc::new(AtomicUsize::new(0));
        let seen = frames.clone();
        let weak = Arc::downgrade(&bridge);
        // Answer each frame with a packet so ordering is observable
        bridge.on_frame(move |frame| {
            seen.fetch_add(1, Ordering::SeqCst);
            if let Some(bridge) = weak.upgrade() {
                bridge.send_packet(format!("{{\"frame\":\"{}\"}}", frame.id));
            }
        });

        let cancel = CancellationToken::new();
        let config = HostLinkConfig {
            addr: addr.to_string(),
            ..HostLinkConfig::default()
        };
        let link = tokio::spawn(run_host_link(
            config,
            Arc::clone(&bridge),
            commands,
            cancel.clone(),
        ));

        let (tcp, _) = listener.accept().await.unwrap();
        let mut host = protocol::message_stream(tcp);

        assert_eq!(
            next_command(&mut host).await,
            BridgeCommand::Control {
                action: ControlAction::Start,
                value: None
            }
        );

        let frame = HostEvent::Frame {
            frame_id: "f-1".into(),
            image: "AAAA".into(),
            width: 4,
            height: 4,
        };
        host.send(protocol::encode_message(&frame).unwrap()).await.unwrap();

        assert_eq!(
            next_command(&mut host).await,
            BridgeCommand::Packet {
                payload: r#"{"frame":"f-1"}"#.into()
            }
        );
        assert_eq!(frames.load(Ordering::SeqCst), 1);

        cancel.cancel();
        assert_eq!(
            next_command(&mut host).await,
            BridgeCommand::Control {
                action: ControlAction::Stop,
                value: None
            }
        );
        link.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_while_waiting_to_retry() {
        let addr = TcpListener::bind("127.0.0.1:0").await.unwrap().local_addr().unwrap();
        let (bridge, commands) = Bridge::new(DEPTH_TIMEOUT);
        let cancel = CancellationToken::new();
        let config = HostLinkConfig {
            addr: addr.to_string(),
            reconnect_delay_ms: 60_000,
            ..HostLinkConfig::default()
        };
        let link = tokio::spawn(run_host_link(config, bridge, commands, cancel.clone()));

        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();
        link.await.unwrap();
    }
}
