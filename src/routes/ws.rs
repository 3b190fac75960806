//! WebSocket endpoint for the realtime relay.
//!
//! GET /ws?token=<JWT>; the token travels as a query parameter because
//! browsers cannot set headers on an upgrade request.
//!
//! Client to server commands (JSON, `event` + `data`):
//! - `subscribe {orderId?}` joins an order's channels, or the global one
//!   when `orderId` is omitted
//! - `unsubscribe {orderId?}`
//! - `updateDeliveryLocation {orderId, location: {latitude, longitude}}`
//! - `driverLocationUpdate {orderId, latitude, longitude}`
//!
//! Both location forms feed the same relay call. Server → client frames are
//! `{topic, event, data}` with the payloads defined in `realtime::events`.

use std::collections::HashMap;

use axum::{
    extract::{
        Query, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Duration;

use crate::{
    error::AppError,
    middleware::auth::{AuthUser, authenticate_token},
    models::GeoPoint,
    realtime::{OrderEvent, Topic},
    services::delivery_service,
    state::AppState,
};

/// Buffer between topic forwarders and the single socket writer.
const OUTBOUND_BUFFER: usize = 64;

#[derive(Deserialize)]
pub struct WsAuthQuery {
    token: String,
}

#[derive(Debug, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
enum ClientCommand {
    Subscribe {
        order_id: Option<i64>,
    },
    Unsubscribe {
        order_id: Option<i64>,
    },
    UpdateDeliveryLocation {
        order_id: i64,
        location: GeoPoint,
    },
    DriverLocationUpdate {
        order_id: i64,
        latitude: f64,
        longitude: f64,
    },
}

#[derive(Debug, Serialize)]
struct ServerEvent<'a> {
    topic: String,
    #[serde(flatten)]
    event: &'a OrderEvent,
}

#[derive(Debug, Serialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
enum ServerReply {
    Ack { order_id: i64 },
    Error { kind: String, message: String },
}

pub async fn realtime_ws(
    State(state): State<AppState>,
    Query(query): Query<WsAuthQuery>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, AppError> {
    let user = authenticate_token(&query.token)?;
    Ok(ws.on_upgrade(move |socket| ws_session(socket, state, user)))
}

async fn ws_session(socket: WebSocket, state: AppState, user: AuthUser) {
    let (mut sink, mut stream) = socket.split();

    tracing::info!(user_id = user.user_id, role = %user.role, "websocket connected");

    // Events from all subscribed topics funnel into one outbound channel so
    // the socket has a single writer.
    let (event_tx, mut event_rx) = mpsc::channel::<(Topic, OrderEvent)>(OUTBOUND_BUFFER);
    let mut forwarders: HashMap<Topic, JoinHandle<()>> = HashMap::new();

    let mut ping_interval = tokio::time::interval(Duration::from_secs(30));
    ping_interval.tick().await; // skip immediate

    loop {
        tokio::select! {
            _ = ping_interval.tick() => {
                if sink.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }

            forwarded = event_rx.recv() => {
                match forwarded {
                    Some((topic, event)) => {
                        let frame = ServerEvent {
                            topic: topic.to_string(),
                            event: &event,
                        };
                        match serde_json::to_string(&frame) {
                            Ok(json) => {
                                if sink.send(Message::Text(json.into())).await.is_err() {
                                    break;
                                }
                            }
                            Err(err) => {
                                tracing::warn!(error = %err, "event serialization failed");
                            }
                        }
                    }
                    None => break,
                }
            }

            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        handle_command(
                            &text,
                            &state,
                            &user,
                            &event_tx,
                            &mut forwarders,
                            &mut sink,
                        )
                        .await;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sink.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(err)) => {
                        tracing::warn!(error = %err, "websocket error");
                        break;
                    }
                    _ => {} // Binary, Pong: ignore
                }
            }
        }
    }

    // Dropping the forwarders is the implicit unsubscribe on disconnect.
    for handle in forwarders.into_values() {
        handle.abort();
    }
    let _ = sink.close().await;

    tracing::info!(user_id = user.user_id, "websocket disconnected");
}

async fn handle_command(
    text: &str,
    state: &AppState,
    user: &AuthUser,
    event_tx: &mpsc::Sender<(Topic, OrderEvent)>,
    forwarders: &mut HashMap<Topic, JoinHandle<()>>,
    sink: &mut SplitSink<WebSocket, Message>,
) {
    let command: ClientCommand = match serde_json::from_str(text) {
        Ok(c) => c,
        Err(err) => {
            send_reply(
                sink,
                &ServerReply::Error {
                    kind: "invalid_input".into(),
                    message: format!("unrecognized command: {err}"),
                },
            )
            .await;
            return;
        }
    };

    match command {
        ClientCommand::Subscribe { order_id } => {
            for topic in topics_for(order_id) {
                forwarders
                    .entry(topic)
                    .or_insert_with(|| spawn_forwarder(state, topic, event_tx.clone()));
            }
        }

        ClientCommand::Unsubscribe { order_id } => {
            for topic in topics_for(order_id) {
                if let Some(handle) = forwarders.remove(&topic) {
                    handle.abort();
                }
            }
        }

        ClientCommand::UpdateDeliveryLocation { order_id, location } => {
            report(state, user, order_id, location, sink).await;
        }

        // Same relay, legacy field layout.
        ClientCommand::DriverLocationUpdate {
            order_id,
            latitude,
            longitude,
        } => {
            report(state, user, order_id, GeoPoint::new(latitude, longitude), sink).await;
        }
    }
}

async fn report(
    state: &AppState,
    user: &AuthUser,
    order_id: i64,
    point: GeoPoint,
    sink: &mut SplitSink<WebSocket, Message>,
) {
    let reply = match delivery_service::report_location(state, user, order_id, point).await {
        Ok(_) => ServerReply::Ack { order_id },
        Err(err) => ServerReply::Error {
            kind: err.kind().to_string(),
            message: err.to_string(),
        },
    };
    send_reply(sink, &reply).await;
}

async fn send_reply(sink: &mut SplitSink<WebSocket, Message>, reply: &ServerReply) {
    if let Ok(json) = serde_json::to_string(reply) {
        let _ = sink.send(Message::Text(json.into())).await;
    }
}

fn topics_for(order_id: Option<i64>) -> Vec<Topic> {
    match order_id {
        Some(id) => vec![Topic::Delivery(id), Topic::OrderConfirmation(id)],
        None => vec![Topic::Orders],
    }
}

/// Pump one topic's broadcast receiver into the connection's outbound
/// channel. A lagged receiver logs the gap and keeps going; the stream stays
/// subscribed from its current position.
fn spawn_forwarder(
    state: &AppState,
    topic: Topic,
    event_tx: mpsc::Sender<(Topic, OrderEvent)>,
) -> JoinHandle<()> {
    let mut rx = state.hub.subscribe(topic);
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if event_tx.send((topic, event)).await.is_err() {
                        break; // connection gone
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(%topic, missed, "subscriber lagged, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
