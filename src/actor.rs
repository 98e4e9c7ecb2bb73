//! The actor kernel: selective receive over a bound [`Receiver`].
//!
//! `receive` drains the inbox looking for a tag with a registered pattern,
//! buffering anything that doesn't match and restoring that buffer to the
//! head of the inbox once a match is found (or the receive call times out).
//! The polling cadence polls the inbox under a bounded timeout rather than
//! blocking forever, so a shutdown signal can still be observed promptly.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::address::Address;
use crate::config::RuntimeConfig;
use crate::error::Result;
use crate::message::{self, Message};
use crate::transport::Receiver;

/// One (tag, handler) arm of a [`Receive`] call. `tag` is either a literal
/// message tag or [`message::WILDCARD`] / [`message::TIMED_OUT`].
pub struct Arm<'a> {
    tag: &'a str,
    handler: Box<dyn FnOnce(Message) + Send + 'a>,
}

/// A fluent description of which tags an `Actor::receive` call will accept,
/// built up as (tag, handler) arms instead of a `{tag: handler}` dict.
#[derive(Default)]
pub struct Receive<'a> {
    arms: Vec<Arm<'a>>,
}

impl<'a> Receive<'a> {
    pub fn new() -> Self {
        Receive { arms: Vec::new() }
    }

    pub fn on(mut self, tag: &'a str, handler: impl FnOnce(Message) + Send + 'a) -> Self {
        self.arms.push(Arm { tag, handler: Box::new(handler) });
        self
    }

    pub fn on_any(self, handler: impl FnOnce(Message) + Send + 'a) -> Self {
        self.on(message::WILDCARD, handler)
    }

    pub fn on_timeout(self, handler: impl FnOnce() + Send + 'a) -> Self {
        self.on(message::TIMED_OUT, move |_| handler())
    }
}

/// A running actor: a name, its bound transport endpoint, and the
/// selective-receive loop every handler is driven through.
pub struct Actor {
    address: Address,
    receiver: Receiver,
    inbox_polling_timeout: Duration,
}

impl Actor {
    pub fn new(receiver: Receiver, config: &RuntimeConfig) -> Self {
        Actor {
            address: receiver.address().clone(),
            receiver,
            inbox_polling_timeout: config.inbox_polling_timeout,
        }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn qsize(&self) -> usize {
        self.receiver.qsize()
    }

    /// Wait for a message whose tag matches one of `patterns`' arms,
    /// buffering and re-queuing anything that doesn't.
    ///
    /// `timeout = None` blocks indefinitely. `Some(d)` gives up after `d`
    /// and invokes the `timed_out` arm if one was registered, or does
    /// nothing otherwise.
    pub async fn receive(&mut self, patterns: Receive<'_>, timeout: Option<Duration>) -> Result<()> {
        let deadline = timeout.map(|d| Instant::now() + d);
        let starting_size = self.receiver.qsize();
        let mut checked = 0usize;
        let mut unmatched: VecDeque<Message> = VecDeque::new();
        let mut arms = patterns.arms;

        let outcome = loop {
            // The backlog present when `receive` was called is scanned in
            // full before the deadline can ever cut a scan short, so a
            // `timeout = Some(Duration::ZERO)` call still performs exactly
            // one non-blocking pass over pre-existing messages.
            let remaining = if checked < starting_size {
                Some(self.inbox_polling_timeout)
            } else {
                match deadline {
                    Some(dl) => {
                        let now = Instant::now();
                        if now >= dl {
                            break None;
                        }
                        Some((dl - now).min(self.inbox_polling_timeout))
                    }
                    None => Some(self.inbox_polling_timeout),
                }
            };

            let msg = match self.receiver.get(remaining).await? {
                Some(msg) => msg,
                None => continue, // plain poll timeout, keep waiting for the real deadline
            };
            checked += 1;

            let position = arms
                .iter()
                .position(|arm| arm.tag == msg.tag())
                .or_else(|| arms.iter().position(|arm| arm.tag == message::WILDCARD));

            match position {
                Some(idx) => break Some((idx, msg)),
                None => unmatched.push_back(msg),
            }
        };

        if !unmatched.is_empty() {
            self.receiver.mailbox_mut().requeue_front(unmatched);
        }

        match outcome {
            Some((idx, msg)) => {
                let arm = arms.remove(idx);
                (arm.handler)(msg);
            }
            None => {
                if let Some(idx) = arms.iter().position(|arm| arm.tag == message::TIMED_OUT) {
                    let arm = arms.remove(idx);
                    (arm.handler)(Message::new(message::TIMED_OUT));
                }
            }
        }
        Ok(())
    }

    pub async fn close(self) -> Result<()> {
        self.receiver.close().await
    }

    pub async fn close_confirming(self, confirm_to: Address, confirm_msg: Message) -> Result<()> {
        self.receiver.close_confirming(confirm_to, confirm_msg).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::NameBrokerServer;
    use crate::transport::Sender;
    use std::sync::{Arc, Mutex};

    async fn test_config() -> (tempfile::TempDir, RuntimeConfig) {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = RuntimeConfig::default();
        cfg.ipc_directory = dir.path().to_string_lossy().into_owned();
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        cfg.broker_port = listener.local_addr().unwrap().port();
        cfg.broker_host = "127.0.0.1".to_string();
        drop(listener);
        (dir, cfg)
    }

    #[tokio::test]
    async fn receive_matches_the_requested_tag() {
        let (_guard, config) = test_config().await;
        let broker = NameBrokerServer::bind(config.clone()).await.unwrap();
        let receiver = Receiver::bind("greeter", "localhost", config.clone()).await.unwrap();
        let mut actor = Actor::new(receiver, &config);

        let mut sender = Sender::connect(actor.address(), &config).await.unwrap();
        sender.put(Message::new("hello").field("from", "alice")).await.unwrap();

        let seen = Arc::new(Mutex::new(None));
        let seen_clone = seen.clone();
        actor
            .receive(
                Receive::new().on("hello", move |msg| {
                    *seen_clone.lock().unwrap() = Some(msg.get("from").unwrap().as_str().unwrap().to_string());
                }),
                Some(Duration::from_secs(1)),
            )
            .await
            .unwrap();

        assert_eq!(seen.lock().unwrap().as_deref(), Some("alice"));
        actor.close().await.unwrap();
        broker.stop().await;
    }

    #[tokio::test]
    async fn unmatched_messages_are_restored_ahead_of_a_later_match() {
        let (_guard, config) = test_config().await;
        let broker = NameBrokerServer::bind(config.clone()).await.unwrap();
        let receiver = Receiver::bind("selective", "localhost", config.clone()).await.unwrap();
        let mut actor = Actor::new(receiver, &config);

        let mut sender = Sender::connect(actor.address(), &config).await.unwrap();
        sender.put(Message::new("noise")).await.unwrap();
        sender.put(Message::new("signal")).await.unwrap();

        actor
            .receive(Receive::new().on("signal", |_| {}), Some(Duration::from_secs(1)))
            .await
            .unwrap();

        let order = Arc::new(Mutex::new(Vec::new()));
        let order_clone = order.clone();
        actor
            .receive(
                Receive::new().on_any(move |msg| order_clone.lock().unwrap().push(msg.tag().to_string())),
                Some(Duration::from_secs(1)),
            )
            .await
            .unwrap();

        assert_eq!(order.lock().unwrap().as_slice(), ["noise"]);
        actor.close().await.unwrap();
        broker.stop().await;
    }

    #[tokio::test]
    async fn timeout_invokes_the_timed_out_arm() {
        let (_guard, config) = test_config().await;
        let broker = NameBrokerServer::bind(config.clone()).await.unwrap();
        let receiver = Receiver::bind("patient", "localhost", config.clone()).await.unwrap();
        let mut actor = Actor::new(receiver, &config);

        let fired = Arc::new(Mutex::new(false));
        let fired_clone = fired.clone();
        actor
            .receive(
                Receive::new()
                    .on("never", |_| {})
                    .on_timeout(move || *fired_clone.lock().unwrap() = true),
                Some(Duration::from_millis(30)),
            )
            .await
            .unwrap();

        assert!(*fired.lock().unwrap());
        actor.close().await.unwrap();
        broker.stop().await;
    }

    #[tokio::test]
    async fn zero_timeout_still_scans_the_preexisting_backlog() {
        let (_guard, config) = test_config().await;
        let broker = NameBrokerServer::bind(config.clone()).await.unwrap();
        let receiver = Receiver::bind("scanner", "localhost", config.clone()).await.unwrap();
        let mut actor = Actor::new(receiver, &config);

        let mut sender = Sender::connect(actor.address(), &config).await.unwrap();
        sender.put(Message::new("bar")).await.unwrap();
        // Give the accept loop's reader task time to land the message in
        // the mailbox before we snapshot `qsize()` at `receive`'s entry.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let seen = Arc::new(Mutex::new(None));
        let seen_clone = seen.clone();
        actor
            .receive(
                Receive::new().on("bar", move |msg| *seen_clone.lock().unwrap() = Some(msg.tag().to_string())),
                Some(Duration::ZERO),
            )
            .await
            .unwrap();

        assert_eq!(seen.lock().unwrap().as_deref(), Some("bar"));
        actor.close().await.unwrap();
        broker.stop().await;
    }

    #[tokio::test]
    async fn zero_timeout_times_out_once_the_backlog_is_exhausted() {
        let (_guard, config) = test_config().await;
        let broker = NameBrokerServer::bind(config.clone()).await.unwrap();
        let receiver = Receiver::bind("drained", "localhost", config.clone()).await.unwrap();
        let mut actor = Actor::new(receiver, &config);

        let mut sender = Sender::connect(actor.address(), &config).await.unwrap();
        sender.put(Message::new("bar")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        // First call drains the one pre-existing message.
        actor
            .receive(Receive::new().on("bar", |_| {}), Some(Duration::ZERO))
            .await
            .unwrap();

        // Second call starts with an empty backlog, so the zero timeout
        // fires immediately without ever blocking for a new arrival.
        let fired = Arc::new(Mutex::new(false));
        let fired_clone = fired.clone();
        actor
            .receive(
                Receive::new()
                    .on("bar", |_| {})
                    .on_timeout(move || *fired_clone.lock().unwrap() = true),
                Some(Duration::ZERO),
            )
            .await
            .unwrap();

        assert!(*fired.lock().unwrap());
        actor.close().await.unwrap();
        broker.stop().await;
    }
}
