use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use medora_types::events::{ClientCommand, ServerEvent};

use crate::handler::CommandHandler;
use crate::presence::ParticipantKey;

/// Server pings every 15 seconds; two missed pongs drop the connection.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);
const MAX_MISSED_PONGS: u8 = 2;

/// Drive one consultation socket, authenticated as `identity`, until either
/// side goes away.
pub async fn handle_connection(socket: WebSocket, handler: CommandHandler, identity: ParticipantKey) {
    let (mut sender, mut receiver) = socket.split();
    let dispatcher = handler.dispatcher().clone();
    let (conn_id, mut events) = dispatcher.register_connection().await;
    dispatcher.announce(conn_id, identity.clone()).await;
    info!(
        "connection {} opened for {} {}",
        conn_id, identity.role, identity.participant_id
    );

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received;

    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed: u8 = 0;

        loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else { break };
                    let text = match serde_json::to_string(&event) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!("failed to encode {:?}: {}", event, e);
                            continue;
                        }
                    };
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed = 0;
                    } else {
                        missed += 1;
                        if missed >= MAX_MISSED_PONGS {
                            warn!("connection {} missed {} pongs, dropping", conn_id, missed);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Default::default())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    let recv_handler = handler.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<ClientCommand>(&text) {
                    Ok(command) => {
                        debug!("connection {} -> {}", conn_id, command.name());
                        recv_handler.dispatch(conn_id, command).await;
                    }
                    Err(e) => {
                        warn!(
                            "connection {} bad command: {} -- raw: {}",
                            conn_id,
                            e,
                            text.chars().take(200).collect::<String>()
                        );
                        recv_handler
                            .dispatcher()
                            .send_to(
                                conn_id,
                                ServerEvent::OperationError {
                                    reason: "bad-command".into(),
                                    message: e.to_string(),
                                },
                            )
                            .await;
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // The other task must have stopped before cleanup, or an in-flight join
    // could land after it
    let send_finished = tokio::select! {
        _ = &mut send_task => true,
        _ = &mut recv_task => false,
    };
    let remaining = if send_finished { recv_task } else { send_task };
    remaining.abort();
    let _ = remaining.await;

    handler.disconnect(conn_id).await;
    info!("connection {} closed", conn_id);
}
