use crate::api::types::Post;
use crate::config::ServerConfig;
use crate::error::{ClientError, ClientResult};
use futures::StreamExt;
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

pub const EVENT_NEW_POST: &str = "new-post";
pub const EVENT_REACTION_UPDATED: &str = "post-reaction-updated";

/// A delta announced by the backend after the initial feed load.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    NewPost(Post),
    ReactionUpdated(Post),
}

#[derive(Deserialize)]
struct Frame {
    event: String,
    data: serde_json::Value,
}

/// Derives the delta channel endpoint from the HTTP base URL.
pub fn delta_channel_url(server: &ServerConfig) -> ClientResult<Url> {
    let base = Url::parse(&server.url)
        .map_err(|e| ClientError::BadRequest(format!("invalid server url: {e}")))?;
    let scheme = match base.scheme() {
        "http" => "ws",
        "https" => "wss",
        other => {
            return Err(ClientError::BadRequest(format!(
                "cannot derive a websocket url from scheme {other}"
            )))
        }
    };
    let mut url = base
        .join(&server.ws_path)
        .map_err(|e| ClientError::BadRequest(format!("invalid ws path: {e}")))?;
    url.set_scheme(scheme)
        .map_err(|_| ClientError::BadRequest(format!("cannot switch {url} to {scheme}")))?;
    Ok(url)
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Owned websocket subscription to the backend's post deltas.
///
/// Frames are JSON objects of the shape `{"event": ..., "data": ...}`.
/// Unknown event names and undecodable frames are skipped, they never
/// tear the channel down.
pub struct DeltaChannel {
    ws: WsStream,
}

impl DeltaChannel {
    pub async fn open(url: &Url) -> ClientResult<Self> {
        let (ws, _) = connect_async(url.as_str()).await?;
        info!(%url, "delta channel open");
        Ok(Self { ws })
    }

    /// Waits for the next decodable event. `None` means the server
    /// closed the channel.
    pub async fn next_event(&mut self) -> ClientResult<Option<FeedEvent>> {
        while let Some(msg) = self.ws.next().await {
            match msg? {
                Message::Text(text) => match parse_frame(&text) {
                    Ok(Some(event)) => return Ok(Some(event)),
                    Ok(None) => debug!("frame with unknown event name skipped"),
                    Err(e) => warn!(error = %e, "undecodable frame skipped"),
                },
                Message::Close(_) => return Ok(None),
                // Pings are answered by the protocol layer.
                _ => continue,
            }
        }
        Ok(None)
    }

    pub async fn close(&mut self) -> ClientResult<()> {
        self.ws.close(None).await?;
        Ok(())
    }
}

fn parse_frame(text: &str) -> ClientResult<Option<FeedEvent>> {
    let frame: Frame = serde_json::from_str(text)?;
    match frame.event.as_str() {
        EVENT_NEW_POST => Ok(Some(FeedEvent::NewPost(serde_json::from_value(
            frame.data,
        )?))),
        EVENT_REACTION_UPDATED => Ok(Some(FeedEvent::ReactionUpdated(
            serde_json::from_value(frame.data)?,
        ))),
        _ => Ok(None),
    }
}
