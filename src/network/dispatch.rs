//! Network Dispatch
//!
//! The only concurrency boundary in the process. Background reader tasks
//! decode messages and push them into a bounded [`InboundQueue`]; the
//! simulation drains it once per tick and routes each message to a
//! [`MessageHandler`]. Outbound messages go through a [`MessageSender`],
//! fire-and-forget.

use tokio::sync::mpsc;
use tracing::warn;

use crate::network::protocol::{Message, ProtocolError};

/// Errors handing a message to a channel.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NetworkError {
    /// Channel at capacity
    #[error("Send queue full")]
    QueueFull,

    /// Receiving side dropped
    #[error("Channel closed")]
    Closed,
}

impl<T> From<mpsc::error::TrySendError<T>> for NetworkError {
    fn from(err: mpsc::error::TrySendError<T>) -> Self {
        match err {
            mpsc::error::TrySendError::Full(_) => NetworkError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => NetworkError::Closed,
        }
    }
}

// =============================================================================
// INBOUND
// =============================================================================

/// Bounded queue of decoded inbound messages, drained by the tick.
#[derive(Debug)]
pub struct InboundQueue {
    rx: mpsc::Receiver<Message>,
    tx: mpsc::Sender<Message>,
}

/// Producer side of an [`InboundQueue`], one clone per reader task.
#[derive(Debug, Clone)]
pub struct InboundHandle {
    tx: mpsc::Sender<Message>,
}

impl InboundQueue {
    /// Queue holding at most `capacity` undrained messages.
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self { rx, tx }
    }

    /// New producer handle.
    pub fn handle(&self) -> InboundHandle {
        InboundHandle { tx: self.tx.clone() }
    }

    /// Everything queued right now, without waiting.
    pub fn drain(&mut self) -> Vec<Message> {
        let mut out = Vec::new();
        while let Ok(message) = self.rx.try_recv() {
            out.push(message);
        }
        out
    }
}

impl InboundHandle {
    /// Enqueue without waiting.
    pub fn push(&self, message: Message) -> Result<(), NetworkError> {
        Ok(self.tx.try_send(message)?)
    }

    /// Enqueue, waiting for room.
    pub async fn send(&self, message: Message) -> Result<(), NetworkError> {
        self.tx.send(message).await.map_err(|_| NetworkError::Closed)
    }

    /// Decode a raw envelope and enqueue it. Malformed input is logged and
    /// dropped.
    pub fn push_bytes(&self, data: &[u8]) -> Result<(), NetworkError> {
        match Message::from_bytes(data) {
            Ok(message) => self.push(message),
            Err(e) => {
                warn!(error = %e, len = data.len(), "Dropping malformed message");
                Ok(())
            }
        }
    }
}

// =============================================================================
// OUTBOUND
// =============================================================================

/// The "send a message" capability the core is given.
pub trait MessageSender: Send + Sync {
    /// Hand `message` to the transport. Never retried by the caller.
    fn send(&self, message: Message) -> Result<(), NetworkError>;
}

/// [`MessageSender`] over a bounded tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelSender {
    tx: mpsc::Sender<Message>,
}

impl ChannelSender {
    /// Wrap a channel sender.
    pub fn new(tx: mpsc::Sender<Message>) -> Self {
        Self { tx }
    }
}

impl MessageSender for ChannelSender {
    fn send(&self, message: Message) -> Result<(), NetworkError> {
        Ok(self.tx.try_send(message)?)
    }
}

/// Forward straight into another endpoint's inbound queue.
impl MessageSender for InboundHandle {
    fn send(&self, message: Message) -> Result<(), NetworkError> {
        self.push(message)
    }
}

/// Send and log failure. Returns whether the transport accepted it.
pub fn send_logged(sender: &dyn MessageSender, message: Message) -> bool {
    let message_type = message.message_type;
    match sender.send(message) {
        Ok(()) => true,
        Err(e) => {
            warn!(?message_type, error = %e, "Send failed");
            false
        }
    }
}

// =============================================================================
// DISPATCH
// =============================================================================

/// Consumer of inbound messages.
pub trait MessageHandler {
    /// Handle one message.
    fn handle_message(&mut self, message: Message) -> Result<(), ProtocolError>;
}

/// Drain `queue` into `handler`. Handler errors are logged and the message
/// dropped. Returns how many messages were handled successfully.
pub fn dispatch_inbound<H: MessageHandler + ?Sized>(queue: &mut InboundQueue, handler: &mut H) -> usize {
    let mut handled = 0;
    for message in queue.drain() {
        let sender_id = message.sender_id;
        let message_type = message.message_type;
        match handler.handle_message(message) {
            Ok(()) => handled += 1,
            Err(e) => warn!(sender_id, ?message_type, error = %e, "Dropping message"),
        }
    }
    handled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::protocol::{MessageType, Ping};

    #[derive(Default)]
    struct Recorder {
        seen: Vec<(u32, MessageType)>,
    }

    impl MessageHandler for Recorder {
        fn handle_message(&mut self, message: Message) -> Result<(), ProtocolError> {
            if message.message_type != MessageType::Ping {
                return Err(ProtocolError::Unexpected(message.message_type));
            }
            message.decode::<Ping>()?;
            self.seen.push((message.sender_id, message.message_type));
            Ok(())
        }
    }

    fn ping(sender: u32) -> Message {
        Message::new(sender, 1, &Ping { sent_at_ms: 0 }).unwrap()
    }

    #[test]
    fn test_drain_preserves_order() {
        let mut queue = InboundQueue::new(8);
        let handle = queue.handle();
        for sender in 1..=3 {
            handle.push(ping(sender)).unwrap();
        }

        let drained = queue.drain();
        assert_eq!(drained.iter().map(|m| m.sender_id).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert!(queue.drain().is_empty());
    }

    #[test]
    fn test_bounded_queue_rejects_when_full() {
        let queue = InboundQueue::new(1);
        let handle = queue.handle();
        handle.push(ping(1)).unwrap();
        assert_eq!(handle.push(ping(2)), Err(NetworkError::QueueFull));
    }

    #[test]
    fn test_dispatch_drops_bad_messages() {
        let mut queue = InboundQueue::new(8);
        let handle = queue.handle();
        handle.push(ping(1)).unwrap();
        handle.push(Message::new(2, 1, &crate::network::protocol::CreatePlayer).unwrap()).unwrap();
        handle.push_bytes(&[0xde, 0xad]).unwrap();
        handle.push(ping(3)).unwrap();

        let mut recorder = Recorder::default();
        assert_eq!(dispatch_inbound(&mut queue, &mut recorder), 2);
        assert_eq!(recorder.seen, vec![(1, MessageType::Ping), (3, MessageType::Ping)]);
    }

    #[test]
    fn test_channel_sender_reports_closed() {
        let (tx, rx) = mpsc::channel(2);
        let sender = ChannelSender::new(tx);
        assert!(send_logged(&sender, ping(1)));
        drop(rx);
        assert_eq!(sender.send(ping(1)), Err(NetworkError::Closed));
        assert!(!send_logged(&sender, ping(1)));
    }

    #[tokio::test]
    async fn test_reader_task_feeds_queue() {
        let mut queue = InboundQueue::new(4);
        let handle = queue.handle();
        let reader = tokio::spawn(async move {
            for sender in 0..3 {
                let bytes = ping(sender).to_bytes().unwrap();
                handle.push_bytes(&bytes).unwrap();
            }
        });
        reader.await.unwrap();

        assert_eq!(queue.drain().len(), 3);
    }
}
