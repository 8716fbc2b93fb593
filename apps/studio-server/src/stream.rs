/// WebSocket push channel for streaming generation
///
/// Protocol: the client opens the socket and sends one start frame
/// (`{"requestId": "...", "type": "...", "params": {...}}`); the server
/// answers with a sequence of push frames and closes the exchange after
/// `end` or `error`:
///
///   {"event": "chunk",    "text": "..."}
///   {"event": "thinking", "text": "..."}
///   {"event": "end",      "fullText": "..."}
///   {"event": "error",    "message": "..."}
///
/// A client `{"event": "cancel"}` frame, or dropping the socket,
/// cancels the in-flight request; cancellation still ends with `end`
/// carrying the partial text.
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use generation::{GenerationKind, StreamEvent};

use crate::state::SharedState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartFrame {
    request_id: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    params: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct ClientFrame {
    event: String,
}

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<SharedState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: SharedState) {
    // The first text frame names the request; a malformed one gets an
    // error frame and the socket is dropped.
    let start = loop {
        match socket.recv().await {
            Some(Ok(Message::Text(text))) => match serde_json::from_str::<StartFrame>(&text) {
                Ok(frame) => break frame,
                Err(err) => {
                    warn!(%err, "malformed streaming start frame");
                    let _ = send_error(&mut socket, &format!("invalid start frame: {err}")).await;
                    return;
                }
            },
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
            _ => return,
        }
    };

    let kind = match GenerationKind::parse(&start.kind) {
        Ok(kind) => kind,
        Err(err) => {
            let _ = send_error(&mut socket, &err.to_string()).await;
            return;
        }
    };

    let (tx, mut rx) = mpsc::channel::<StreamEvent>(32);
    let config = state.relay_config().await;
    let relay_state = Arc::clone(&state);
    let request_id = start.request_id.clone();
    let params = start.params;
    tokio::spawn(async move {
        // Pre-flight failures come back as Err before anything is
        // registered; report them on the same channel as stream errors.
        if let Err(err) = relay_state
            .relay
            .generate_streaming(&config, kind, &params, &request_id, tx.clone())
            .await
        {
            let _ = tx.send(StreamEvent::Error(err.to_string())).await;
        }
    });

    loop {
        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else { break };
                let (frame, last) = match event {
                    StreamEvent::Chunk(text) => {
                        (json!({ "event": "chunk", "text": text }), false)
                    }
                    StreamEvent::Thinking(text) => {
                        (json!({ "event": "thinking", "text": text }), false)
                    }
                    StreamEvent::End(full_text) => {
                        (json!({ "event": "end", "fullText": full_text }), true)
                    }
                    StreamEvent::Error(message) => {
                        (json!({ "event": "error", "message": message }), true)
                    }
                };
                if socket.send(Message::Text(frame.to_string())).await.is_err() {
                    state.relay.cancel(&start.request_id);
                    break;
                }
                if last {
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if matches!(
                            serde_json::from_str::<ClientFrame>(&text),
                            Ok(frame) if frame.event == "cancel"
                        ) {
                            debug!(request_id = %start.request_id, "client cancelled stream");
                            state.relay.cancel(&start.request_id);
                            // Keep looping: the relay still delivers
                            // `end` with the partial text.
                        }
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                        debug!(request_id = %start.request_id, "socket gone, cancelling stream");
                        state.relay.cancel(&start.request_id);
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }
}

async fn send_error(socket: &mut WebSocket, message: &str) -> Result<(), axum::Error> {
    socket
        .send(Message::Text(
            json!({ "event": "error", "message": message }).to_string(),
        ))
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_frame_wire_shape() {
        let frame: StartFrame = serde_json::from_str(
            r#"{"requestId":"req-1","type":"character-gen","params":{"summary":"a tale"}}"#,
        )
        .unwrap();
        assert_eq!(frame.request_id, "req-1");
        assert_eq!(frame.kind, "character-gen");
        assert_eq!(frame.params["summary"], "a tale");
    }

    #[test]
    fn test_start_frame_params_default_to_empty() {
        let frame: StartFrame =
            serde_json::from_str(r#"{"requestId":"req-2","type":"scene-outline"}"#).unwrap();
        assert!(frame.params.is_empty());
    }

    #[test]
    fn test_cancel_frame_is_recognised() {
        let frame: ClientFrame = serde_json::from_str(r#"{"event":"cancel"}"#).unwrap();
        assert_eq!(frame.event, "cancel");
    }
}
