use axum::{
    debug_handler,
    extract::{ws::{Message, WebSocket}, State, WebSocketUpgrade},
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};

use crate::{session::Session, AppState};

#[debug_handler(state = crate::AppState)]
pub async fn room_ws(
    State(app_state): State<AppState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(async move |stream| serve_connection(app_state, stream).await)
}

async fn serve_connection(app_state: AppState, stream: WebSocket) {
    let (mut session, mut outbound) = Session::connect(app_state).await;
    let connection_id = session.id();
    let (mut sender, mut receiver) = stream.split();

    let mut writer = tokio::spawn(async move {
        while let Some(event) = outbound.recv().await {
            let frame = match event.to_json() {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::error!(connection = %connection_id, event = event.name(), error = %e, "failed to encode event");
                    continue;
                }
            };
            if sender.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    let mut writer_done = false;
    loop {
        tokio::select! {
            frame = receiver.next() => {
                let Some(Ok(frame)) = frame else {
                    break;
                };
                match frame {
                    Message::Text(text) => session.handle_frame(text.as_str()).await,
                    Message::Binary(bytes) => match std::str::from_utf8(&bytes) {
                        Ok(text) => session.handle_frame(text).await,
                        Err(_) => session.handle_frame("").await,
                    },
                    Message::Close(_) => break,
                    Message::Ping(_) | Message::Pong(_) => {}
                }
            }
            _ = &mut writer => {
                writer_done = true;
                break;
            }
        }
    }

    // dropping the outbox ends the writer once queued events are flushed
    session.disconnect().await;
    if !writer_done {
        let _ = writer.await;
    }
}
