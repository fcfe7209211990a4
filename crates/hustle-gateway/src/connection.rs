use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use hustle_types::events::GatewayCommand;

use crate::dispatcher::{BroadcastMessage, Dispatcher};

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Meme topics a client asked for. `None` means "everything".
type Subscriptions = Arc<RwLock<Option<HashSet<Uuid>>>>;

/// Serve one WebSocket client until either side goes away.
pub async fn handle_connection(socket: WebSocket, dispatcher: Dispatcher) {
    let conn_id = Uuid::new_v4();
    let _slot = dispatcher.register();
    info!(
        "Client {} connected to gateway ({} online)",
        conn_id,
        dispatcher.connection_count()
    );

    let (sender, receiver) = socket.split();
    let broadcast_rx = dispatcher.subscribe();

    let subscriptions: Subscriptions = Arc::new(RwLock::new(None));
    let pong_received = Arc::new(AtomicBool::new(true));

    let mut send_task = tokio::spawn(forward_events(
        sender,
        broadcast_rx,
        subscriptions.clone(),
        pong_received.clone(),
    ));
    let mut recv_task = tokio::spawn(read_commands(
        receiver,
        conn_id,
        subscriptions,
        pong_received,
    ));

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    info!("Client {} disconnected from gateway", conn_id);
}

/// Relay broadcasts to the client, with heartbeat.
async fn forward_events(
    mut sender: SplitSink<WebSocket, Message>,
    mut broadcast_rx: tokio::sync::broadcast::Receiver<BroadcastMessage>,
    subscriptions: Subscriptions,
    pong_received: Arc<AtomicBool>,
) {
    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.tick().await;
    let mut missed_heartbeats: u8 = 0;

    loop {
        tokio::select! {
            result = broadcast_rx.recv() => {
                let msg = match result {
                    Ok(msg) => msg,
                    Err(RecvError::Lagged(n)) => {
                        warn!("Broadcast receiver lagged by {} messages", n);
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };

                if !wants(&subscriptions, msg.meme_id) {
                    continue;
                }

                if sender.send(Message::Text(msg.json.to_string().into())).await.is_err() {
                    break;
                }
            }
            _ = heartbeat.tick() => {
                if pong_received.swap(false, Ordering::Acquire) {
                    missed_heartbeats = 0;
                } else {
                    missed_heartbeats += 1;
                    if missed_heartbeats >= 2 {
                        warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                        break;
                    }
                }
                if sender.send(Message::Ping(Vec::<u8>::new().into())).await.is_err() {
                    break;
                }
            }
        }
    }
}

/// Read client commands until the socket closes.
async fn read_commands(
    mut receiver: SplitStream<WebSocket>,
    conn_id: Uuid,
    subscriptions: Subscriptions,
    pong_received: Arc<AtomicBool>,
) {
    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                Ok(cmd) => apply_command(conn_id, cmd, &subscriptions),
                Err(e) => {
                    warn!(
                        "Client {} bad command: {} -- raw: {}",
                        conn_id,
                        e,
                        text.chars().take(200).collect::<String>()
                    );
                }
            },
            Message::Pong(_) => {
                pong_received.store(true, Ordering::Release);
            }
            Message::Close(_) => break,
            _ => {}
        }
    }
}

fn apply_command(conn_id: Uuid, cmd: GatewayCommand, subscriptions: &Subscriptions) {
    let mut subs = subscriptions
        .write()
        .unwrap_or_else(PoisonError::into_inner);

    match cmd {
        GatewayCommand::Subscribe { meme_ids } => {
            debug!("Client {} subscribing to {} memes", conn_id, meme_ids.len());
            *subs = Some(meme_ids.into_iter().collect());
        }
        GatewayCommand::Unsubscribe => {
            debug!("Client {} back to all events", conn_id);
            *subs = None;
        }
    }
}

/// Global events always pass; meme-scoped ones only if the client has not
/// narrowed its topics or asked for this meme.
fn wants(subscriptions: &RwLock<Option<HashSet<Uuid>>>, meme_id: Option<Uuid>) -> bool {
    let Some(meme_id) = meme_id else {
        return true;
    };
    let subs = subscriptions.read().unwrap_or_else(PoisonError::into_inner);
    subs.as_ref().is_none_or(|set| set.contains(&meme_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::Router;
    use axum::extract::{State, WebSocketUpgrade};
    use axum::response::IntoResponse;
    use axum::routing::get;
    use hustle_types::events::HustleEvent;
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::Message as ClientMessage;

    #[test]
    fn topic_filter() {
        let subs: Subscriptions = Arc::new(RwLock::new(None));
        let watched = Uuid::new_v4();
        let other = Uuid::new_v4();

        assert!(wants(&subs, Some(other)));

        apply_command(Uuid::nil(), GatewayCommand::Subscribe { meme_ids: vec![watched] }, &subs);
        assert!(wants(&subs, Some(watched)));
        assert!(!wants(&subs, Some(other)));
        assert!(wants(&subs, None));

        apply_command(Uuid::nil(), GatewayCommand::Unsubscribe, &subs);
        assert!(wants(&subs, Some(other)));
    }

    async fn ws_upgrade(State(dispatcher): State<Dispatcher>, ws: WebSocketUpgrade) -> impl IntoResponse {
        ws.on_upgrade(move |socket| handle_connection(socket, dispatcher))
    }

    async fn spawn_gateway() -> (Dispatcher, String) {
        let dispatcher = Dispatcher::new();
        let app = Router::new()
            .route("/ws", get(ws_upgrade))
            .with_state(dispatcher.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (dispatcher, format!("ws://{}/ws", addr))
    }

    async fn wait_for_connections(dispatcher: &Dispatcher, n: usize) {
        for _ in 0..100 {
            if dispatcher.connection_count() == n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {} connections, have {}", n, dispatcher.connection_count());
    }

    async fn next_event(
        client: &mut tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
    ) -> serde_json::Value {
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(5), client.next())
                .await
                .unwrap()
                .unwrap()
                .unwrap();
            if let ClientMessage::Text(text) = msg {
                return serde_json::from_str(text.as_str()).unwrap();
            }
        }
    }

    #[tokio::test]
    async fn events_fan_out_to_every_client() {
        let (dispatcher, url) = spawn_gateway().await;
        let (mut a, _) = tokio_tungstenite::connect_async(url.as_str()).await.unwrap();
        let (mut b, _) = tokio_tungstenite::connect_async(url.as_str()).await.unwrap();
        wait_for_connections(&dispatcher, 2).await;

        let meme_id = Uuid::new_v4();
        dispatcher.broadcast(HustleEvent::MemeDeleted { meme_id });

        for client in [&mut a, &mut b] {
            let event = next_event(client).await;
            assert_eq!(event["type"], "meme_deleted");
            assert_eq!(event["data"]["memeId"], meme_id.to_string());
        }

        drop(a);
        drop(b);
        wait_for_connections(&dispatcher, 0).await;
    }

    #[tokio::test]
    async fn subscribed_client_only_sees_its_memes() {
        let (dispatcher, url) = spawn_gateway().await;
        let (mut client, _) = tokio_tungstenite::connect_async(url.as_str()).await.unwrap();
        wait_for_connections(&dispatcher, 1).await;

        let watched = Uuid::new_v4();
        let command = serde_json::json!({ "type": "subscribe", "data": { "meme_ids": [watched] } });
        client
            .send(ClientMessage::Text(command.to_string().into()))
            .await
            .unwrap();
        // Give the server a moment to apply the subscription.
        tokio::time::sleep(Duration::from_millis(100)).await;

        dispatcher.broadcast(HustleEvent::MemeDeleted { meme_id: Uuid::new_v4() });
        dispatcher.broadcast(HustleEvent::MemeDeleted { meme_id: watched });

        let event = next_event(&mut client).await;
        assert_eq!(event["data"]["memeId"], watched.to_string());
    }
}
