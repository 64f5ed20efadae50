use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;

use crate::protocol::SessionFrame;
use crate::session::SessionManager;

/// Pumps one socket: a writer task drains the session's outbound queue while
/// this task feeds inbound text frames to the manager. Either side closing
/// tears the session down.
pub async fn handle_socket(socket: WebSocket, manager: Arc<SessionManager>) {
    let (mut sender, mut receiver) = socket.split();
    let session = manager.open_session().await;
    let player_id = session.player_id;
    let mut outbound = session.outbound;

    let send_task = tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            match frame {
                SessionFrame::Text(text) => {
                    if sender.send(Message::Text(text)).await.is_err() {
                        return;
                    }
                }
                SessionFrame::Close { code, reason } => {
                    let _ = sender
                        .send(Message::Close(Some(CloseFrame {
                            code,
                            reason: reason.into(),
                        })))
                        .await;
                    return;
                }
            }
        }
    });

    while let Some(result) = receiver.next().await {
        let Ok(message) = result else { break };
        match message {
            Message::Text(text) => manager.handle_frame(&player_id, &text).await,
            Message::Close(_) => break,
            _ => {}
        }
    }

    manager.close_session(&player_id).await;
    send_task.abort();
}
