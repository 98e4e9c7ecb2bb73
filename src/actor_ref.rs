//! `ActorRef`: a cheap, cloneable handle used to send to an actor without
//! holding its `Receiver`.
//!
//! Rust has no attribute sugar for `ref.some_tag(x=1)`-style calls, so this
//! exposes an explicit builder instead:
//! `actor_ref.tag("some_tag").with("x", 1).send().await`.

use crate::address::{get_local_host, is_local_host, Address};
use crate::config::RuntimeConfig;
use crate::error::Result;
use crate::message::Message;
use crate::transport::Sender;

/// A location-transparent handle to an actor's inbox.
#[derive(Clone)]
pub struct ActorRef {
    address: Address,
    config: RuntimeConfig,
}

impl ActorRef {
    /// Build a ref to `address`, probing it with a low-level ping first.
    /// Fails with `ChannelDown` if the target doesn't answer, so a ref to a
    /// dead or never-registered actor never silently comes into existence.
    pub async fn new(address: Address, config: RuntimeConfig) -> Result<Self> {
        Sender::connect(&address, &config).await?;
        Ok(ActorRef { address, config })
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Begin building a message with the given tag.
    pub fn tag(&self, tag: impl Into<String>) -> MessageBuilder<'_> {
        MessageBuilder {
            target: self,
            message: Message::new(tag),
        }
    }

    /// Send a fully-built message directly, bypassing the builder.
    ///
    /// If `message` carries a `reply_to` whose host is local (as seen from
    /// this process), that host is rewritten to the address the *target*
    /// would need to reach it, so cross-host replies resolve correctly.
    pub async fn send(&self, mut message: Message) -> Result<()> {
        if let Some(reply_to) = message.get_reply_to() {
            if is_local_host(&reply_to.host) {
                if let Some(host) = get_local_host(&self.address.host) {
                    message.set_reply_to_host(host);
                }
            }
        }
        let mut sender = Sender::connect(&self.address, &self.config).await?;
        sender.put(message).await
    }

    /// Probe whether the actor at this address answers a low-level ping.
    pub async fn is_alive(&self) -> bool {
        Sender::connect(&self.address, &self.config).await.is_ok()
    }

    /// Ask the actor to shut down its transport. `reply_address` receives
    /// `reply_msg` once the shutdown completes, if given.
    pub async fn close_actor(&self, reply: Option<(&Address, Message)>) -> Result<()> {
        let mut sender = Sender::connect(&self.address, &self.config).await?;
        match reply {
            Some((to, msg)) => sender.close_receiver(Some(to), Some(msg)).await,
            None => sender.close_receiver(None, None).await,
        }
    }
}

/// Fluent builder returned by [`ActorRef::tag`].
pub struct MessageBuilder<'a> {
    target: &'a ActorRef,
    message: Message,
}

impl<'a> MessageBuilder<'a> {
    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.message = self.message.field(key, value);
        self
    }

    pub fn reply_to(mut self, address: &Address) -> Self {
        self.message = self.message.reply_to(address);
        self
    }

    pub async fn send(self) -> Result<()> {
        self.target.send(self.message).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::NameBrokerServer;
    use crate::transport::Receiver;

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
    async fn builder_send_lands_in_the_targets_mailbox() {
        let (_guard, config) = test_config().await;
        let broker = NameBrokerServer::bind(config.clone()).await.unwrap();
        let mut receiver = Receiver::bind("counter", "localhost", config.clone()).await.unwrap();
        let actor_ref = ActorRef::new(receiver.address().clone(), config.clone()).await.unwrap();

        actor_ref.tag("increment").with("by", 3).send().await.unwrap();

        let msg = receiver
            .get(Some(std::time::Duration::from_secs(1)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(msg.tag(), "increment");
        assert_eq!(msg.get("by").unwrap(), 3);

        receiver.close().await.unwrap();
        broker.stop().await;
    }

    #[tokio::test]
    async fn is_alive_is_false_once_closed() {
        let (_guard, config) = test_config().await;
        let broker = NameBrokerServer::bind(config.clone()).await.unwrap();
        let receiver = Receiver::bind("mortal", "localhost", config.clone()).await.unwrap();
        let actor_ref = ActorRef::new(receiver.address().clone(), config.clone()).await.unwrap();

        assert!(actor_ref.is_alive().await);
        receiver.close().await.unwrap();
        assert!(!actor_ref.is_alive().await);

        broker.stop().await;
    }

    #[tokio::test]
    async fn new_fails_construction_for_a_non_registered_name() {
        let (_guard, mut config) = test_config().await;
        config.liveness_probe_timeout = std::time::Duration::from_millis(100);
        let broker = NameBrokerServer::bind(config.clone()).await.unwrap();

        let result = ActorRef::new(Address::local("nobody-home"), config.clone()).await;
        assert!(matches!(result, Err(crate::error::RuntimeError::ChannelDown(_))));

        broker.stop().await;
    }
}
