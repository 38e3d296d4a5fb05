//! Single-use duplex reply channel.
//!
//! [`ReplyChannel::open`] returns the end the worker keeps and a
//! [`ReplyPort`] that is transferred to the controlling client alongside
//! the request. The port can carry exactly one payload; posting consumes it.

use std::time::Duration;

use serde_json::Value;
use tokio::sync::oneshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    #[error("reply channel closed without a reply")]
    Closed,

    #[error("no reply within {0:?}")]
    TimedOut(Duration),
}

#[derive(Debug)]
pub struct ReplyChannel {
    rx: oneshot::Receiver<Value>,
}

#[derive(Debug)]
pub struct ReplyPort {
    tx: oneshot::Sender<Value>,
}

impl ReplyChannel {
    #[must_use]
    pub fn open() -> (Self, ReplyPort) {
        let (tx, rx) = oneshot::channel();
        (Self { rx }, ReplyPort { tx })
    }

    /// Wait for the single reply. `None` waits forever.
    pub async fn await_reply(self, timeout: Option<Duration>) -> Result<Value, ChannelError> {
        match timeout {
            Some(limit) => match tokio::time::timeout(limit, self.rx).await {
                Ok(Ok(payload)) => Ok(payload),
                Ok(Err(_)) => Err(ChannelError::Closed),
                Err(_) => Err(ChannelError::TimedOut(limit)),
            },
            None => self.rx.await.map_err(|_| ChannelError::Closed),
        }
    }
}

impl ReplyPort {
    /// Deliver the reply. Fails when the waiting end has gone away.
    pub fn post(self, payload: Value) -> Result<(), ChannelError> {
        self.tx.send(payload).map_err(|_| ChannelError::Closed)
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn delivers_one_reply() {
        let (channel, port) = ReplyChannel::open();
        port.post(json!({"ok": 1})).unwrap();
        let reply = channel.await_reply(None).await.unwrap();
        assert_eq!(reply, json!({"ok": 1}));
    }

    #[tokio::test]
    async fn dropped_port_closes_channel() {
        let (channel, port) = ReplyChannel::open();
        drop(port);
        assert_eq!(channel.await_reply(None).await, Err(ChannelError::Closed));
    }

    #[tokio::test(start_paused = true)]
    async fn silent_port_times_out() {
        let (channel, _port) = ReplyChannel::open();
        let limit = Duration::from_millis(250);
        assert_eq!(
            channel.await_reply(Some(limit)).await,
            Err(ChannelError::TimedOut(limit))
        );
    }

    #[tokio::test]
    async fn post_after_receiver_gone_fails() {
        let (channel, port) = ReplyChannel::open();
        drop(channel);
        assert!(port.is_closed());
        assert_eq!(port.post(Value::Null), Err(ChannelError::Closed));
    }
}
