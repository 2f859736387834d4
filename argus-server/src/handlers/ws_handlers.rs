//! Live task status over WebSocket.
//!
//! A client connects with a task id and receives the current snapshot
//! followed by every future transition, plus periodic heartbeats; a
//! missing heartbeat is its signal to fall back to polling. There is no
//! history replay. The stream and the poll endpoint both render the Task
//! Store's latest write, so they can only differ in latency.

use axum::{
    extract::{
        Path, State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use tracing::{debug, warn};
use uuid::Uuid;

use argus_core::store::Lookup;
use argus_model::{StreamMessage, TaskEvent, TaskId};

use crate::AppState;

/// Close code sent when the task id resolves to nothing.
const CLOSE_TASK_NOT_FOUND: u16 = 4404;

/// WS /ws/scan/{task_id}
pub async fn scan_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, TaskId::from(task_id)))
}

async fn handle_socket(socket: WebSocket, state: AppState, task_id: TaskId) {
    // Subscribe before the snapshot read: a transition landing between
    // the two is then delivered rather than lost.
    let mut events = state.notifier.subscribe(task_id);

    let snapshot = match state.store.lookup(&task_id) {
        Lookup::Found(view) => view,
        Lookup::Expired | Lookup::NeverExisted => {
            // The eager subscription created a channel for an id that
            // will never publish; drop it unless someone else is waiting.
            drop(events);
            if state.notifier.subscriber_count(&task_id) == 0 {
                state.notifier.forget(&task_id);
            }
            let mut socket = socket;
            let _ = socket
                .send(Message::Close(Some(CloseFrame {
                    code: CLOSE_TASK_NOT_FOUND,
                    reason: "task not found".into(),
                })))
                .await;
            return;
        }
    };

    let (mut ws_tx, mut ws_rx) = socket.split();

    let close_on_terminal = state.config.notifier.close_on_terminal;
    let mut terminal_seen = snapshot.status.is_terminal();

    if send_frame(&mut ws_tx, &StreamMessage::Event(TaskEvent::snapshot(snapshot)))
        .await
        .is_err()
    {
        return;
    }

    let mut heartbeat =
        tokio::time::interval(state.config.notifier.heartbeat_interval);
    // The first tick completes immediately; the snapshot covers it.
    heartbeat.tick().await;

    while !(terminal_seen && close_on_terminal) {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    terminal_seen = event.is_terminal();
                    if send_frame(&mut ws_tx, &StreamMessage::Event(event))
                        .await
                        .is_err()
                    {
                        return;
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                    // Terminal transition published and channel dropped;
                    // re-read the store so the client gets the final state
                    // even if it lagged past the terminal event.
                    if let Lookup::Found(view) = state.store.lookup(&task_id) {
                        let _ = send_frame(
                            &mut ws_tx,
                            &StreamMessage::Event(TaskEvent::snapshot(view)),
                        )
                        .await;
                    }
                    break;
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    // Snapshots make redelivery idempotent, so recover by
                    // sending the current state.
                    debug!(task_id = %task_id, skipped, "subscriber lagged");
                    if let Lookup::Found(view) = state.store.lookup(&task_id) {
                        terminal_seen = view.status.is_terminal();
                        if send_frame(
                            &mut ws_tx,
                            &StreamMessage::Event(TaskEvent::snapshot(view)),
                        )
                        .await
                        .is_err()
                        {
                            return;
                        }
                    }
                }
            },
            _ = heartbeat.tick() => {
                if send_frame(&mut ws_tx, &StreamMessage::heartbeat())
                    .await
                    .is_err()
                {
                    return;
                }
            },
            incoming = ws_rx.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    if text.as_str() == "ping" {
                        let _ = ws_tx.send(Message::Text("pong".into())).await;
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    debug!(task_id = %task_id, "client disconnected");
                    return;
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    warn!(task_id = %task_id, error = %err, "websocket error");
                    return;
                }
            },
        }
    }

    let _ = ws_tx
        .send(Message::Close(Some(CloseFrame {
            code: 1000,
            reason: "task reached a terminal state".into(),
        })))
        .await;
}

async fn send_frame(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    message: &StreamMessage,
) -> Result<(), axum::Error> {
    let Ok(payload) = serde_json::to_string(message) else {
        warn!("failed to serialize stream message");
        return Ok(());
    };
    ws_tx.send(Message::Text(payload.into())).await
}
