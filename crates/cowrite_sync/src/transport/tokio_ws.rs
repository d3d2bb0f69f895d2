//! tokio-tungstenite socket connector.
//!
//! Native WebSocket implementation of [`SocketConnector`]. The session's
//! auth token travels as a `token` query parameter, matching what the sync
//! server's upgrade handler expects.

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use super::socket::{BoxFuture, SocketConnector, SocketEvent, SocketHandle};
use crate::error::{Result, SyncError};

/// WebSocket connector backed by tokio-tungstenite.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioConnector;

impl TokioConnector {
    pub fn new() -> Self {
        Self
    }
}

impl SocketConnector for TokioConnector {
    fn connect(&self, url: &str, auth_token: Option<&str>) -> BoxFuture<'_, Result<SocketHandle>> {
        let url = url.to_string();
        let auth_token = auth_token.map(String::from);
        Box::pin(async move {
            let mut parsed =
                url::Url::parse(&url).map_err(|e| SyncError::InvalidUrl(format!("{}: {}", url, e)))?;
            if let Some(token) = &auth_token {
                parsed.query_pairs_mut().append_pair("token", token);
            }

            let (ws_stream, _) = connect_async(parsed.as_str())
                .await
                .map_err(|e| SyncError::Transport(format!("WebSocket connection failed: {}", e)))?;

            log::info!("[Transport] Connected to {}", url);

            let (mut write, mut read) = ws_stream.split();
            let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
            let (in_tx, in_rx) = mpsc::unbounded_channel::<SocketEvent>();

            // Forward outbound frames until the session drops its sender
            tokio::spawn(async move {
                while let Some(frame) = out_rx.recv().await {
                    if let Err(e) = write.send(Message::Text(frame.into())).await {
                        log::error!("[Transport] Send error: {}", e);
                        break;
                    }
                }
                let _ = write.close().await;
            });

            // Forward inbound frames to the session
            tokio::spawn(async move {
                while let Some(msg) = read.next().await {
                    match msg {
                        Ok(Message::Text(text)) => {
                            if in_tx.send(SocketEvent::Frame(text.to_string())).is_err() {
                                break;
                            }
                        }
                        Ok(Message::Close(_)) => {
                            let _ = in_tx.send(SocketEvent::Closed);
                            return;
                        }
                        Ok(_) => {
                            // Binary frames, pings and pongs are not part of
                            // the protocol; tungstenite answers pings itself
                        }
                        Err(e) => {
                            let _ = in_tx.send(SocketEvent::Error(e.to_string()));
                            return;
                        }
                    }
                }
                let _ = in_tx.send(SocketEvent::Closed);
            });

            Ok(SocketHandle {
                outbound: out_tx,
                inbound: in_rx,
            })
        })
    }
}
