use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::warn;
use url::Url;

use crate::command::BridgeCommand;
use crate::message::{Envelope, FrameId, PluginContext, SurfaceKind};

#[derive(Debug, Error)]
pub enum PortError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The host side of the channel is gone (view torn down).
    #[error("frame `{0}` is detached from its host")]
    Detached(FrameId),
}

/// The plugin's end of a frame: what code running inside the frame can use
/// to talk to the host. It can post JSON and read what the host forwards to
/// it, nothing else.
#[derive(Debug)]
pub struct FramePort {
    frame: FrameId,
    kind: SurfaceKind,
    url: Url,
    origin: String,
    inbound: mpsc::UnboundedSender<Envelope>,
    outbox: mpsc::UnboundedReceiver<String>,
}

impl FramePort {
    pub fn new(
        frame: FrameId,
        kind: SurfaceKind,
        url: Url,
        inbound: mpsc::UnboundedSender<Envelope>,
        outbox: mpsc::UnboundedReceiver<String>,
    ) -> Self {
        let origin = url.origin().ascii_serialization();
        Self { frame, kind, url, origin, inbound, outbox }
    }

    pub fn id(&self) -> &FrameId {
        &self.frame
    }

    pub fn kind(&self) -> SurfaceKind {
        self.kind
    }

    /// The URL the frame was loaded with, context query included.
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn context(&self) -> Option<PluginContext> {
        PluginContext::from_url(&self.url)
    }

    /// Point the frame at another document. Later posts carry the new origin,
    /// exactly as a browser would report it.
    pub fn navigate(&mut self, url: Url) {
        self.origin = url.origin().ascii_serialization();
        self.url = url;
    }

    pub fn post<T: Serialize + ?Sized>(&self, payload: &T) -> Result<(), PortError> {
        let data = serde_json::to_string(payload)?;
        self.post_raw(data)
    }

    pub fn post_command(&self, command: &BridgeCommand) -> Result<(), PortError> {
        self.post(command)
    }

    /// Post already-serialized text. The host drops it if it is not JSON.
    pub fn post_raw(&self, data: impl Into<String>) -> Result<(), PortError> {
        let envelope = Envelope {
            frame: self.frame.clone(),
            origin: self.origin.clone(),
            data: data.into(),
            sent_at: Utc::now(),
        };
        self.inbound
            .send(envelope)
            .map_err(|_| PortError::Detached(self.frame.clone()))
    }

    /// Next message the host delivered to this frame; `None` once the host
    /// has destroyed the frame and everything queued has been read.
    pub async fn recv(&mut self) -> Option<Value> {
        loop {
            let text = self.outbox.recv().await?;
            match serde_json::from_str(&text) {
                Ok(value) => return Some(value),
                Err(err) => warn!(frame = %self.frame, "dropping undecodable host message: {err}"),
            }
        }
    }

    pub fn try_recv(&mut self) -> Option<Value> {
        while let Ok(text) = self.outbox.try_recv() {
            if let Ok(value) = serde_json::from_str(&text) {
                return Some(value);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn port(url: &str) -> (FramePort, mpsc::UnboundedReceiver<Envelope>, mpsc::UnboundedSender<String>) {
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let port = FramePort::new(FrameId::new(), SurfaceKind::Main, Url::parse(url).unwrap(), in_tx, out_rx);
        (port, in_rx, out_tx)
    }

    #[tokio::test]
    async fn post_wraps_payload_with_origin() {
        let (port, mut in_rx, _out) = port("http://plugin.test:3333/show?x=1");
        port.post(&json!({"hello": "host"})).unwrap();

        let env = in_rx.recv().await.unwrap();
        assert_eq!(env.frame, *port.id());
        assert_eq!(env.origin, "http://plugin.test:3333");
        assert_eq!(serde_json::from_str::<Value>(&env.data).unwrap(), json!({"hello": "host"}));
    }

    #[tokio::test]
    async fn navigate_changes_reported_origin() {
        let (mut port, mut in_rx, _out) = port("http://plugin.test:3333/show");
        port.navigate(Url::parse("http://evil.test/").unwrap());
        port.post(&json!(1)).unwrap();
        assert_eq!(in_rx.recv().await.unwrap().origin, "http://evil.test");
    }

    #[tokio::test]
    async fn recv_skips_garbage_and_ends_when_host_drops() {
        let (mut port, _in_rx, out_tx) = port("http://plugin.test/");
        out_tx.send("not json".into()).unwrap();
        out_tx.send("{\"a\":1}".into()).unwrap();
        drop(out_tx);

        assert_eq!(port.recv().await, Some(json!({"a": 1})));
        assert_eq!(port.recv().await, None);
    }

    #[tokio::test]
    async fn post_after_host_gone_is_detached() {
        let (port, in_rx, _out) = port("http://plugin.test/");
        drop(in_rx);
        assert!(matches!(port.post(&json!(null)), Err(PortError::Detached(_))));
    }
}
