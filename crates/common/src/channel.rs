//! Async channel adapter for inbound frames
//!
//! Listeners run synchronously inside the event source's delivery callback,
//! which may be a native reader thread. [`FrameStream`] moves frames onto an
//! `async_channel` so async code can `recv().await` them instead.

use crate::emitter::ListenerId;
use async_channel::{Receiver, TrySendError, bounded};
use bytes::Bytes;
use tracing::{trace, warn};

/// Build a `data` listener feeding a bounded channel
///
/// A full channel drops the newest frame rather than blocking the delivery
/// callback.
pub(crate) fn frame_listener(
    capacity: usize,
) -> (impl Fn(&Bytes) + Send + Sync + 'static, Receiver<Bytes>) {
    let (tx, rx) = bounded(capacity.max(1));

    let listener = move |frame: &Bytes| match tx.try_send(frame.clone()) {
        Ok(()) => {}
        Err(TrySendError::Full(frame)) => {
            warn!("Frame stream full, dropping {} byte frame", frame.len());
        }
        Err(TrySendError::Closed(_)) => {
            trace!("Frame stream receiver gone");
        }
    };

    (listener, rx)
}

/// Stream of decoded inbound frames
///
/// Ends once the backing listener is removed, either by the bridge's
/// `disconnect` or by dropping the stream.
pub struct FrameStream {
    id: ListenerId,
    rx: Receiver<Bytes>,
    detach: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl FrameStream {
    pub(crate) fn new(
        id: ListenerId,
        rx: Receiver<Bytes>,
        detach: Box<dyn FnOnce() + Send + Sync>,
    ) -> Self {
        Self {
            id,
            rx,
            detach: Some(detach),
        }
    }

    /// Wait for the next frame
    ///
    /// Buffered frames are still returned after the stream has ended; an
    /// error means the stream is both ended and empty.
    pub async fn recv(&self) -> crate::Result<Bytes> {
        self.rx
            .recv()
            .await
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Take a buffered frame without waiting
    pub fn try_recv(&self) -> Option<Bytes> {
        self.rx.try_recv().ok()
    }

    /// Number of frames waiting
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Whether the backing listener has been removed
    pub fn is_closed(&self) -> bool {
        self.rx.is_closed()
    }
}

impl Drop for FrameStream {
    fn drop(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl std::fmt::Debug for FrameStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameStream")
            .field("id", &self.id)
            .field("buffered", &self.rx.len())
            .field("closed", &self.rx.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emitter::EventEmitter;

    #[tokio::test]
    async fn test_listener_feeds_channel() {
        let (listener, rx) = frame_listener(4);
        listener(&Bytes::from_static(b"\x01\x02"));

        let frame = rx.recv().await.unwrap();
        assert_eq!(frame.as_ref(), &[1, 2]);
    }

    #[test]
    fn test_full_channel_drops_newest() {
        let (listener, rx) = frame_listener(1);
        listener(&Bytes::from_static(b"a"));
        listener(&Bytes::from_static(b"b"));

        assert_eq!(rx.len(), 1);
        assert_eq!(rx.try_recv().unwrap().as_ref(), b"a");
    }

    #[tokio::test]
    async fn test_stream_ends_when_listener_removed() {
        let emitter: EventEmitter<Bytes> = EventEmitter::new();
        let (listener, rx) = frame_listener(4);
        let id = emitter.on("data", listener);
        let stream = FrameStream::new(id, rx, Box::new(|| {}));

        emitter.emit("data", &Bytes::from_static(b"x"));
        emitter.remove_all_listeners();

        assert!(stream.is_closed());
        assert_eq!(stream.recv().await.unwrap().as_ref(), b"x");
        assert!(matches!(stream.recv().await, Err(crate::Error::Channel(_))));
    }
}
