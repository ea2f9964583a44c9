use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{
    sink::{Sink, SinkExt},
    stream::{Stream, StreamExt},
};
use std::{fmt::Display, time::Duration};
use tokio::sync::mpsc;

use crate::{
    error::{AppError, Result},
    notification::Registry,
    state::AppState,
    websocket::types::{ClientMessage, ErrorPayload, WsMessage},
};

use super::connection::{Connection, Role};

/// WebSocket upgrade handler for monitors
pub async fn ws_monitor_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, Role::Monitor, state))
}

/// WebSocket upgrade handler for displays
pub async fn ws_display_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, Role::Display, state))
}

/// Handle one WebSocket connection from accept to disconnect
async fn handle_socket(socket: WebSocket, role: Role, state: AppState) {
    let (sender, receiver) = socket.split();
    let (connection, rx) = Connection::new(role, state.config.ws_queue_capacity);
    serve_connection(
        sender,
        receiver,
        connection,
        rx,
        state.registry.clone(),
        state.config.ws_send_timeout,
    )
    .await;
}

/// Bind `connection`, pump its queue into `sender` and client frames from
/// `receiver` until either side ends or the registry closes the connection,
/// then unbind.
async fn serve_connection<S, R, E>(
    mut sender: S,
    mut receiver: R,
    connection: Connection,
    mut rx: mpsc::Receiver<WsMessage>,
    registry: Registry,
    send_timeout: Duration,
) where
    S: Sink<Message> + Unpin + Send + 'static,
    S::Error: Display + Send,
    R: Stream<Item = std::result::Result<Message, E>> + Unpin + Send + 'static,
    E: Display + Send + 'static,
{
    let role = connection.role();
    let connection_id = connection.id();

    // Spawn task to send queued events to the WebSocket
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let json = match serde_json::to_string(&msg) {
                Ok(json) => json,
                Err(e) => {
                    tracing::error!("Failed to serialize {:?}: {}", msg, e);
                    continue;
                }
            };
            if !write_with_timeout(&mut sender, json, send_timeout).await {
                break;
            }
        }
        let _ = sender.close().await;
    });

    // Register only after the writer is draining the queue
    registry.bind(connection.clone());

    // Spawn task to receive messages from the WebSocket
    let reader_registry = registry.clone();
    let reader_connection = connection.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(frame) = receiver.next().await {
            match frame {
                Ok(Message::Text(text)) => {
                    if let Err(e) =
                        process_client_message(&text, &reader_registry, &reader_connection)
                    {
                        tracing::debug!("Rejected message from {} {}: {}", role, connection_id, e);
                        let _ = reader_registry.connections().send_to(
                            &reader_connection,
                            WsMessage::Error(ErrorPayload {
                                message: e.to_string(),
                            }),
                        );
                    }
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!("WebSocket error on {} {}: {}", role, connection_id, e);
                    break;
                }
            }
        }
    });

    // Wait for either task to finish, or for the registry to drop us
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
        _ = connection.closed() => {
            tracing::debug!("{} {} evicted, closing socket", role, connection_id);
            recv_task.abort();
            send_task.abort();
        }
    }

    registry.unbind(&connection);
    tracing::info!("WebSocket connection closed for {} {}", role, connection_id);
}

async fn write_with_timeout<S>(sender: &mut S, json: String, limit: Duration) -> bool
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    match tokio::time::timeout(limit, sender.send(Message::Text(json))).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            tracing::debug!("WebSocket write failed: {}", e);
            false
        }
        Err(_) => {
            tracing::warn!("WebSocket write timed out after {:?}", limit);
            false
        }
    }
}

/// Process incoming client messages
fn process_client_message(text: &str, registry: &Registry, connection: &Connection) -> Result<()> {
    let client_msg: ClientMessage = serde_json::from_str(text)
        .map_err(|e| AppError::BadRequest(format!("Invalid message format: {}", e)))?;

    match client_msg {
        ClientMessage::MarkViewed { notification_id } => {
            if !registry.mark_viewed(&notification_id) {
                tracing::debug!(
                    "{} {} acknowledged non-pending notification {}",
                    connection.role(),
                    connection.id(),
                    notification_id
                );
            }
        }
        ClientMessage::Ping => {
            let _ = registry.connections().send_to(connection, WsMessage::Pong);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::notification_models::{NotificationStatus, Priority};
    use crate::websocket::connection::ConnectionState;
    use futures::channel::mpsc as futures_mpsc;

    #[tokio::test]
    async fn test_mark_viewed_from_client() {
        let registry = Registry::new(Duration::from_secs(60));
        let (display, _rx) = Connection::new(Role::Display, 8);
        registry.bind(display.clone());
        let n = registry.create("C1", Priority::Normal, None).unwrap();

        let text = format!(r#"{{"type":"mark_viewed","notification_id":"{}"}}"#, n.id);
        process_client_message(&text, &registry, &display).unwrap();

        assert_eq!(registry.get(&n.id).unwrap().status, NotificationStatus::Viewed);
    }

    #[test]
    fn test_ping_gets_pong() {
        let registry = Registry::default();
        let (monitor, mut rx) = Connection::new(Role::Monitor, 8);
        registry.bind(monitor.clone());
        while rx.try_recv().is_ok() {}

        process_client_message(r#"{"type":"ping"}"#, &registry, &monitor).unwrap();
        assert_eq!(rx.try_recv().unwrap(), WsMessage::Pong);
    }

    #[test]
    fn test_malformed_client_message() {
        let registry = Registry::default();
        let (monitor, _rx) = Connection::new(Role::Monitor, 8);
        let err = process_client_message("{not json", &registry, &monitor).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_write_fails_when_sink_closed() {
        let (mut tx, rx) = futures_mpsc::unbounded::<Message>();
        assert!(write_with_timeout(&mut tx, "{}".into(), Duration::from_secs(1)).await);
        drop(rx);
        assert!(!write_with_timeout(&mut tx, "{}".into(), Duration::from_secs(1)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_times_out_on_stalled_sink() {
        let mut stalled = stalled_sink();
        assert!(!write_with_timeout(&mut stalled, "{}".into(), Duration::from_secs(1)).await);
    }

    type Frame = std::result::Result<Message, axum::Error>;

    fn stalled_sink() -> impl Sink<Message, Error = std::io::Error> + Unpin + Send + 'static {
        Box::pin(futures::sink::unfold((), |_, _msg: Message| {
            futures::future::pending::<std::result::Result<(), std::io::Error>>()
        }))
    }

    fn monitor(registry: &Registry) -> mpsc::Receiver<WsMessage> {
        let (conn, mut rx) = Connection::new(Role::Monitor, 64);
        registry.bind(conn);
        while rx.try_recv().is_ok() {}
        rx
    }

    fn display_counts(rx: &mut mpsc::Receiver<WsMessage>) -> Vec<usize> {
        std::iter::from_fn(|| rx.try_recv().ok())
            .filter_map(|msg| match msg {
                WsMessage::ConnectionCount(counts) => Some(counts.displays),
                _ => None,
            })
            .collect()
    }

    async fn wait_for_displays(registry: &Registry, expected: usize) {
        for _ in 0..100 {
            if registry.connection_counts().displays == expected {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("display count never reached {}", expected);
    }

    #[tokio::test]
    async fn test_socket_bound_until_client_goes_away() {
        let registry = Registry::new(Duration::from_secs(60));
        let mut monitor_rx = monitor(&registry);
        registry.create("C1", Priority::Normal, None).unwrap();
        while monitor_rx.try_recv().is_ok() {}

        let (out_tx, mut out_rx) = futures_mpsc::unbounded::<Message>();
        let (in_tx, in_rx) = futures_mpsc::unbounded::<Frame>();
        let (display, rx) = Connection::new(Role::Display, 16);
        let task = tokio::spawn(serve_connection(
            out_tx,
            in_rx,
            display,
            rx,
            registry.clone(),
            Duration::from_secs(5),
        ));

        match out_rx.next().await {
            Some(Message::Text(text)) => {
                let event: serde_json::Value = serde_json::from_str(&text).unwrap();
                assert_eq!(event["type"], "new_notification");
            }
            other => panic!("expected pending notification, got {:?}", other),
        }
        assert_eq!(registry.connection_counts().displays, 1);

        drop(in_tx);
        task.await.unwrap();

        assert_eq!(registry.connection_counts().displays, 0);
        assert_eq!(display_counts(&mut monitor_rx), vec![1, 0]);
    }

    #[tokio::test]
    async fn test_close_frame_unbinds() {
        let registry = Registry::default();
        let mut monitor_rx = monitor(&registry);

        let (out_tx, mut out_rx) = futures_mpsc::unbounded::<Message>();
        let (in_tx, in_rx) = futures_mpsc::unbounded::<Frame>();
        let (display, rx) = Connection::new(Role::Display, 16);
        let task = tokio::spawn(serve_connection(
            out_tx,
            in_rx,
            display,
            rx,
            registry.clone(),
            Duration::from_secs(5),
        ));

        in_tx
            .unbounded_send(Ok(Message::Text(r#"{"type":"ping"}"#.into())))
            .unwrap();
        match out_rx.next().await {
            Some(Message::Text(text)) => assert_eq!(text, r#"{"type":"pong"}"#),
            other => panic!("expected pong, got {:?}", other),
        }

        in_tx.unbounded_send(Ok(Message::Close(None))).unwrap();
        task.await.unwrap();

        assert_eq!(registry.connection_counts().displays, 0);
        assert_eq!(display_counts(&mut monitor_rx), vec![1, 0]);
    }

    #[tokio::test]
    async fn test_evicted_socket_is_torn_down() {
        let registry = Registry::default();
        let mut monitor_rx = monitor(&registry);

        let (_in_tx, in_rx) = futures_mpsc::unbounded::<Frame>();
        let (display, rx) = Connection::new(Role::Display, 1);
        let handle = display.clone();
        let task = tokio::spawn(serve_connection(
            stalled_sink(),
            in_rx,
            display,
            rx,
            registry.clone(),
            Duration::from_secs(3600),
        ));
        wait_for_displays(&registry, 1).await;

        // The writer is stuck, so the one-slot queue fills and the display is evicted
        for i in 0..3 {
            registry.create(&format!("C{}", i), Priority::Normal, None).unwrap();
        }
        assert_eq!(handle.state(), ConnectionState::Closed);

        task.await.unwrap();
        assert_eq!(registry.connection_counts().displays, 0);
        assert_eq!(display_counts(&mut monitor_rx).last(), Some(&0));
    }
}
