use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, trace, warn};
use url::Url;
use view_plugin::message::{Envelope, FrameId, SurfaceKind};
use view_plugin::FramePort;

use crate::error::BridgeError;

/// A message that passed identity and origin checks.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub frame: FrameId,
    pub kind: SurfaceKind,
    pub payload: Value,
}

#[derive(Debug)]
struct FrameEndpoint {
    kind: SurfaceKind,
    origin: String,
    outbox: UnboundedSender<String>,
}

/// Host side of the frame transport for one view.
///
/// Every frame posts into the same unbounded queue, so messages from one
/// frame stay in send order while frames interleave by arrival.
#[derive(Debug)]
pub struct MessageChannel {
    frames: HashMap<FrameId, FrameEndpoint>,
    inbound: UnboundedSender<Envelope>,
}

impl MessageChannel {
    /// The receiver is the view's inbox; feed what it yields to [`Self::accept`].
    pub fn new() -> (Self, UnboundedReceiver<Envelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { frames: HashMap::new(), inbound: tx }, rx)
    }

    /// Register a frame loading `url` and hand back the plugin's end of it.
    /// Only messages from `url`'s origin will be accepted from this frame.
    pub fn open_frame(&mut self, kind: SurfaceKind, url: Url) -> FramePort {
        let frame = FrameId::new();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let origin = url.origin().ascii_serialization();
        debug!(%frame, %kind, %origin, "frame opened");
        self.frames.insert(frame.clone(), FrameEndpoint { kind, origin, outbox: out_tx });
        FramePort::new(frame, kind, url, self.inbound.clone(), out_rx)
    }

    /// Forget a frame. Its port's `recv` ends and later posts are dropped.
    pub fn close_frame(&mut self, frame: &FrameId) -> bool {
        let closed = self.frames.remove(frame).is_some();
        if closed {
            debug!(%frame, "frame closed");
        }
        closed
    }

    pub fn contains(&self, frame: &FrameId) -> bool {
        self.frames.contains_key(frame)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Fire-and-forget delivery. Failures are logged, never returned.
    pub fn send<T: Serialize + ?Sized>(&self, target: &FrameId, message: &T) {
        if let Err(err) = self.try_send(target, message) {
            warn!("{err}");
        }
    }

    fn try_send<T: Serialize + ?Sized>(&self, target: &FrameId, message: &T) -> Result<(), BridgeError> {
        let endpoint = self
            .frames
            .get(target)
            .ok_or_else(|| BridgeError::Transport(target.clone()))?;
        let data = serde_json::to_string(message)
            .map_err(|e| BridgeError::InvalidArgs(format!("unserializable message: {e}")))?;
        endpoint
            .outbox
            .send(data)
            .map_err(|_| BridgeError::Transport(target.clone()))
    }

    /// Check an envelope against the frame it claims to come from.
    pub fn accept(&self, envelope: Envelope) -> Option<InboundMessage> {
        let Some(endpoint) = self.frames.get(&envelope.frame) else {
            debug!(frame = %envelope.frame, "dropping message from a frame that no longer exists");
            return None;
        };
        if endpoint.origin != envelope.origin {
            warn!(
                frame = %envelope.frame,
                expected = %endpoint.origin,
                actual = %envelope.origin,
                "dropping message from unexpected origin"
            );
            return None;
        }
        match serde_json::from_str::<Value>(&envelope.data) {
            Ok(payload) => {
                trace!(frame = %envelope.frame, "accepted message");
                Some(InboundMessage { frame: envelope.frame, kind: endpoint.kind, payload })
            }
            Err(err) => {
                warn!(frame = %envelope.frame, "dropping undecodable message: {err}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn plugin_url() -> Url {
        Url::parse("http://plugin.test:3333/show").unwrap()
    }

    #[tokio::test]
    async fn accepts_messages_in_send_order() {
        let (mut channel, mut inbox) = MessageChannel::new();
        let port = channel.open_frame(SurfaceKind::Main, plugin_url());

        for i in 0..5 {
            port.post(&json!({ "n": i })).unwrap();
        }
        for i in 0..5 {
            let msg = channel.accept(inbox.recv().await.unwrap()).unwrap();
            assert_eq!(msg.kind, SurfaceKind::Main);
            assert_eq!(msg.payload, json!({ "n": i }));
        }
    }

    #[tokio::test]
    async fn drops_foreign_origin_and_closed_frames() {
        let (mut channel, mut inbox) = MessageChannel::new();
        let mut port = channel.open_frame(SurfaceKind::Modal, plugin_url());

        port.navigate(Url::parse("http://evil.test/").unwrap());
        port.post(&json!("hi")).unwrap();
        assert!(channel.accept(inbox.recv().await.unwrap()).is_none());

        port.navigate(plugin_url());
        let id = port.id().clone();
        assert!(channel.close_frame(&id));
        port.post(&json!("hi")).unwrap();
        assert!(channel.accept(inbox.recv().await.unwrap()).is_none());
    }

    #[tokio::test]
    async fn drops_text_that_is_not_json() {
        let (mut channel, mut inbox) = MessageChannel::new();
        let port = channel.open_frame(SurfaceKind::Main, plugin_url());
        port.post_raw("{not json").unwrap();
        assert!(channel.accept(inbox.recv().await.unwrap()).is_none());
    }

    #[tokio::test]
    async fn send_to_missing_frame_is_swallowed() {
        let (mut channel, _inbox) = MessageChannel::new();
        let mut port = channel.open_frame(SurfaceKind::Main, plugin_url());

        channel.send(port.id(), &json!({"This is": "a message"}));
        assert_eq!(port.recv().await, Some(json!({"This is": "a message"})));

        let id = port.id().clone();
        channel.close_frame(&id);
        channel.send(&id, &json!("lost"));
        assert_eq!(port.recv().await, None);
    }
}
