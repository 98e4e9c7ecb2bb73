//! The per-actor inbox: a FIFO queue fed by the transport's reader task,
//! with support for restoring an unmatched-message buffer to the head
//! (needed by `Actor::receive`'s selective-receive algorithm).
//!
//! Wraps a `flume::Sender`, dropping the generic parameter since this
//! runtime has exactly one message type, and adds a head-buffer that plain
//! arrival-order mailboxes never needed.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::timeout;

use crate::error::{Result, RuntimeError};
use crate::message::Message;

/// `None` is the terminator the transport's reader task sends exactly once,
/// after which the channel is dropped and no further value is ever sent.
pub(crate) type Envelope = Option<Message>;

/// Sending half, cloned into every connection-handler task.
pub type MailboxSender = flume::Sender<Envelope>;

pub fn channel() -> (MailboxSender, Mailbox) {
    let (tx, rx) = flume::unbounded();
    (tx, Mailbox::new(rx))
}

pub struct Mailbox {
    front: VecDeque<Message>,
    rx: flume::Receiver<Envelope>,
    closed: bool,
}

impl Mailbox {
    fn new(rx: flume::Receiver<Envelope>) -> Self {
        Mailbox {
            front: VecDeque::new(),
            rx,
            closed: false,
        }
    }

    /// Number of messages immediately available, without blocking.
    pub fn qsize(&self) -> usize {
        self.front.len() + self.rx.len()
    }

    /// Pop the next message.
    ///
    /// `poll_timeout = None` blocks until a message arrives or the mailbox
    /// closes. `Some(d)` blocks for at most `d`, returning `Ok(None)` on a
    /// plain poll timeout -- distinct from [`RuntimeError::MailboxClosed`],
    /// which means no further message will ever arrive.
    pub async fn next(&mut self, poll_timeout: Option<Duration>) -> Result<Option<Message>> {
        if let Some(msg) = self.front.pop_front() {
            return Ok(Some(msg));
        }
        if self.closed {
            return Err(RuntimeError::MailboxClosed);
        }
        let recv = self.rx.recv_async();
        let outcome = match poll_timeout {
            None => Ok(recv.await),
            Some(d) => match timeout(d, recv).await {
                Ok(r) => Ok(r),
                Err(_) => Err(()),
            },
        };
        match outcome {
            Err(()) => Ok(None),
            Ok(Ok(Some(msg))) => Ok(Some(msg)),
            Ok(Ok(None)) | Ok(Err(_)) => {
                self.closed = true;
                Err(RuntimeError::MailboxClosed)
            }
        }
    }

    /// Restore `items` to the head of the mailbox, in their original order,
    /// ahead of anything already buffered at the head.
    pub(crate) fn requeue_front(&mut self, mut items: VecDeque<Message>) {
        items.append(&mut self.front);
        self.front = items;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fifo_order_is_preserved() {
        let (tx, mut mbox) = channel();
        tx.send_async(Some(Message::new("a"))).await.unwrap();
        tx.send_async(Some(Message::new("b"))).await.unwrap();
        assert_eq!(mbox.next(None).await.unwrap().unwrap().tag(), "a");
        assert_eq!(mbox.next(None).await.unwrap().unwrap().tag(), "b");
    }

    #[tokio::test]
    async fn requeue_front_restores_order_ahead_of_channel_backlog() {
        let (tx, mut mbox) = channel();
        tx.send_async(Some(Message::new("late"))).await.unwrap();

        let mut unmatched = VecDeque::new();
        unmatched.push_back(Message::new("first"));
        unmatched.push_back(Message::new("second"));
        mbox.requeue_front(unmatched);

        assert_eq!(mbox.next(None).await.unwrap().unwrap().tag(), "first");
        assert_eq!(mbox.next(None).await.unwrap().unwrap().tag(), "second");
        assert_eq!(mbox.next(None).await.unwrap().unwrap().tag(), "late");
    }

    #[tokio::test]
    async fn poll_timeout_returns_none_not_closed() {
        let (_tx, mut mbox) = channel();
        let result = mbox.next(Some(Duration::from_millis(5))).await;
        assert!(matches!(result, Ok(None)));
    }

    #[tokio::test]
    async fn terminator_closes_mailbox_permanently() {
        let (tx, mut mbox) = channel();
        tx.send_async(None).await.unwrap();
        assert!(matches!(mbox.next(None).await, Err(RuntimeError::MailboxClosed)));
        assert!(matches!(mbox.next(None).await, Err(RuntimeError::MailboxClosed)));
    }

    #[test]
    fn qsize_counts_both_front_buffer_and_channel() {
        let (tx, mut mbox) = channel();
        tx.send(Some(Message::new("x"))).unwrap();
        let mut unmatched = VecDeque::new();
        unmatched.push_back(Message::new("y"));
        mbox.requeue_front(unmatched);
        assert_eq!(mbox.qsize(), 2);
    }
}
