//! Signalling connection to a voice room.
//!
//! Audio is handled by the room service; the client keeps the room's
//! signalling socket open while the overlay is up and reports when it
//! connects or drops.

use futures::{SinkExt, StreamExt};
use log::{debug, info, warn};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use url::Url;

use crate::api::models::VoiceRoom;
use crate::error::{ApiError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceEvent {
    Connected,
    /// The socket closed. `None` when we closed it ourselves.
    Disconnected(Option<String>),
}

/// `<ws_url>/rtc?access_token=<token>`, with http(s) mapped to ws(s).
pub fn signal_url(ws_url: &str, token: &str) -> Result<Url> {
    let mut url = Url::parse(ws_url)?;
    let scheme = match url.scheme() {
        "http" => Some("ws"),
        "https" => Some("wss"),
        "ws" | "wss" => None,
        other => return Err(ApiError::Voice(format!("unsupported scheme {other}"))),
    };
    if let Some(s) = scheme {
        url.set_scheme(s)
            .map_err(|_| ApiError::Voice(format!("cannot use {s} for {ws_url}")))?;
    }
    let path = format!("{}/rtc", url.path().trim_end_matches('/'));
    url.set_path(&path);
    url.query_pairs_mut().clear().append_pair("access_token", token);
    Ok(url)
}

pub struct VoiceLink {
    room_name: String,
    close_tx: Option<oneshot::Sender<()>>,
}

impl VoiceLink {
    /// Opens the signalling socket. Events are sent on `events` until the
    /// socket closes; must be called from within the tokio runtime.
    pub async fn connect(room: &VoiceRoom, events: mpsc::UnboundedSender<VoiceEvent>) -> Result<Self> {
        let url = signal_url(&room.ws_url, &room.token)?;
        debug!("connecting to voice room {}", room.room_name);
        let (mut ws, _) = connect_async(url.as_str())
            .await
            .map_err(|e| ApiError::Voice(e.to_string()))?;
        info!("joined voice room {}", room.room_name);
        let _ = events.send(VoiceEvent::Connected);

        let (close_tx, mut close_rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    msg = ws.next() => match msg {
                        Some(Ok(WsMessage::Close(frame))) => {
                            let reason = frame.map(|f| f.reason.to_string()).unwrap_or_default();
                            let _ = events.send(VoiceEvent::Disconnected(Some(reason)));
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!("voice link error: {e}");
                            let _ = events.send(VoiceEvent::Disconnected(Some(e.to_string())));
                            break;
                        }
                        None => {
                            let _ = events.send(VoiceEvent::Disconnected(Some("connection lost".into())));
                            break;
                        }
                    },
                    _ = &mut close_rx => {
                        let _ = ws.send(WsMessage::Close(None)).await;
                        let _ = ws.close(None).await;
                        let _ = events.send(VoiceEvent::Disconnected(None));
                        break;
                    }
                }
            }
        });

        Ok(Self { room_name: room.room_name.clone(), close_tx: Some(close_tx) })
    }

    pub fn room_name(&self) -> &str {
        &self.room_name
    }

    pub fn close(&mut self) {
        if let Some(tx) = self.close_tx.take() {
            debug!("leaving voice room {}", self.room_name);
            let _ = tx.send(());
        }
    }
}

impl Drop for VoiceLink {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

    #[test]
    fn signal_url_maps_scheme_and_adds_token() {
        let url = signal_url("https://voice.test", "abc").unwrap();
        assert_eq!(url.as_str(), "wss://voice.test/rtc?access_token=abc");
        let url = signal_url("ws://127.0.0.1:7880/", "a b").unwrap();
        assert_eq!(url.as_str(), "ws://127.0.0.1:7880/rtc?access_token=a+b");
        assert!(signal_url("ftp://voice.test", "abc").is_err());
    }

    async fn room_server(close_from_server: bool) -> (String, Arc<Mutex<Option<String>>>, tokio::task::JoinHandle<bool>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let seen = Arc::new(Mutex::new(None));
        let seen_in_server = seen.clone();
        let handle = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_hdr_async(stream, |req: &Request, resp: Response| -> std::result::Result<Response, ErrorResponse> {
                *seen_in_server.lock().unwrap() = Some(req.uri().to_string());
                Ok(resp)
            })
            .await
            .unwrap();
            if close_from_server {
                ws.close(None).await.unwrap();
                return true;
            }
            // wait for the client's close frame
            while let Some(msg) = ws.next().await {
                if matches!(msg, Ok(WsMessage::Close(_)) | Err(_)) {
                    return true;
                }
            }
            true
        });
        (format!("http://{addr}"), seen, handle)
    }

    fn room(ws_url: String) -> VoiceRoom {
        VoiceRoom {
            room_name: "pernilla-1".into(),
            room_sid: "RM_1".into(),
            token: "jwt".into(),
            ws_url,
        }
    }

    #[tokio::test]
    async fn local_close_is_reported() {
        let (url, seen, server) = room_server(false).await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut link = VoiceLink::connect(&room(url), tx).await.unwrap();
        assert_eq!(rx.recv().await, Some(VoiceEvent::Connected));
        assert_eq!(seen.lock().unwrap().as_deref(), Some("/rtc?access_token=jwt"));

        link.close();
        assert_eq!(rx.recv().await, Some(VoiceEvent::Disconnected(None)));
        assert!(server.await.unwrap());
    }

    #[tokio::test]
    async fn remote_close_is_reported() {
        let (url, _seen, server) = room_server(true).await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _link = VoiceLink::connect(&room(url), tx).await.unwrap();
        assert_eq!(rx.recv().await, Some(VoiceEvent::Connected));
        assert!(matches!(rx.recv().await, Some(VoiceEvent::Disconnected(Some(_)))));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn unreachable_room_fails() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let err = VoiceLink::connect(&room("http://127.0.0.1:9".into()), tx).await.err().unwrap();
        assert!(matches!(err, ApiError::Voice(_)));
    }
}
