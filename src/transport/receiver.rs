//! Inbound side of the transport: binds IPC and TCP endpoints for one
//! actor name, registers the TCP port with the name broker, and runs the
//! accept loop that fans incoming connections into a single mailbox.
//!
//! Unix/TCP sockets are connection-oriented, so one accept loop spawns a
//! reader per incoming connection; all of them funnel into the same
//! mailbox, preserving a single logical inbox per `Receiver`.

use std::path::PathBuf;
use std::time::Duration;

use serde_json::Value;
use tokio::io::BufReader;
use tokio::net::UnixListener;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::address::Address;
use crate::broker::NameBrokerClient;
use crate::config::RuntimeConfig;
use crate::error::{Result, RuntimeError};
use crate::mailbox::{self, Mailbox, MailboxSender};
use crate::message::{Message, TAG_ADDRESS, TAG_LOW_LEVEL_PING, TAG_PING, TAG_QUIT};

use super::conn::{accept_any, connect_uri, Conn, Listener};
use super::framing;
use super::sender::Sender;
use super::{bind_tcp_in_range, socket_path};

type QuitSignal = (Option<Address>, Option<Message>);

pub struct Receiver {
    address: Address,
    mailbox: Mailbox,
    quit_tx: Option<oneshot::Sender<QuitSignal>>,
    accept_handle: Option<JoinHandle<()>>,
}

impl Receiver {
    /// Bind IPC and TCP endpoints for `name` and register the TCP port
    /// with the broker so remote senders can look it up.
    pub async fn bind(name: &str, public_host: &str, config: RuntimeConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.ipc_directory)?;
        let sock_path = socket_path(&config, name);
        let _ = std::fs::remove_file(&sock_path);
        let unix_listener = UnixListener::bind(&sock_path)?;
        let tcp_listener = bind_tcp_in_range(&config).await?;
        let port = tcp_listener.local_addr()?.port();

        let broker = NameBrokerClient::new(&config);
        broker.register(name, port).await?;

        let (mailbox_tx, mailbox) = mailbox::channel();
        let (quit_tx, quit_rx) = oneshot::channel();
        let address = Address::new(name, public_host.to_string(), Some(port));

        let accept_handle = tokio::spawn(accept_loop(
            unix_listener,
            tcp_listener,
            mailbox_tx,
            sock_path,
            broker,
            name.to_string(),
            config,
            address.clone(),
            quit_rx,
        ));

        Ok(Receiver {
            address,
            mailbox,
            quit_tx: Some(quit_tx),
            accept_handle: Some(accept_handle),
        })
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn qsize(&self) -> usize {
        self.mailbox.qsize()
    }

    /// Pop the next message. `timeout = None` blocks indefinitely;
    /// `Some(d)` returns `Ok(None)` if nothing arrives within `d`.
    pub async fn get(&mut self, timeout: Option<Duration>) -> Result<Option<Message>> {
        self.mailbox.next(timeout).await
    }

    pub(crate) fn mailbox_mut(&mut self) -> &mut Mailbox {
        &mut self.mailbox
    }

    /// Shut the receiver down: stop accepting connections, remove the IPC
    /// socket file, unregister from the broker, and close the mailbox.
    pub async fn close(mut self) -> Result<()> {
        self.request_quit(None, None).await
    }

    /// As [`Receiver::close`], additionally sending `confirm_msg` to
    /// `confirm_to` once shutdown completes.
    pub async fn close_confirming(mut self, confirm_to: Address, confirm_msg: Message) -> Result<()> {
        self.request_quit(Some(confirm_to), Some(confirm_msg)).await
    }

    async fn request_quit(&mut self, confirm_to: Option<Address>, confirm_msg: Option<Message>) -> Result<()> {
        if let Some(tx) = self.quit_tx.take() {
            let _ = tx.send((confirm_to, confirm_msg));
        }
        if let Some(handle) = self.accept_handle.take() {
            handle.await.map_err(|e| RuntimeError::Other(e.into()))?;
        }
        Ok(())
    }
}

#[allow(clippy::too_many_arguments)]
async fn accept_loop(
    unix_listener: UnixListener,
    tcp_listener: tokio::net::TcpListener,
    mailbox_tx: MailboxSender,
    sock_path: PathBuf,
    broker: NameBrokerClient,
    name: String,
    config: RuntimeConfig,
    self_address: Address,
    mut quit_rx: oneshot::Receiver<QuitSignal>,
) {
    let unix = Listener::Unix(unix_listener);
    let tcp = Listener::Tcp(tcp_listener);
    let (conn_quit_tx, mut conn_quit_rx) = mpsc::unbounded_channel::<QuitSignal>();

    let (confirm_to, confirm_msg) = loop {
        tokio::select! {
            biased;
            res = &mut quit_rx => {
                break res.unwrap_or((None, None));
            }
            res = conn_quit_rx.recv() => {
                if let Some(signal) = res {
                    break signal;
                }
            }
            conn = accept_any(Some(&unix), Some(&tcp)) => {
                match conn {
                    Ok(conn) => {
                        tokio::spawn(handle_connection(
                            conn,
                            mailbox_tx.clone(),
                            self_address.clone(),
                            conn_quit_tx.clone(),
                            config.clone(),
                        ));
                    }
                    Err(e) => debug!("accept failed on receiver {name}: {e}"),
                }
            }
        }
    };

    drop(unix);
    drop(tcp);
    let _ = tokio::fs::remove_file(&sock_path).await;
    let _ = broker.unregister(&name).await;
    let _ = mailbox_tx.send_async(None).await;

    if let Some(to) = confirm_to {
        let msg = confirm_msg.unwrap_or_else(Message::closed);
        respond(&to, msg, &config).await;
    }
}

async fn handle_connection(
    conn: Conn,
    mailbox_tx: MailboxSender,
    self_address: Address,
    quit_tx: mpsc::UnboundedSender<QuitSignal>,
    config: RuntimeConfig,
) {
    let (read_half, write_half) = tokio::io::split(conn);
    let mut reader = BufReader::new(read_half);
    drop(write_half); // replies go out over a fresh connection to reply_to, not back down this one

    loop {
        let msg = match framing::read_message(&mut reader).await {
            Ok(Some(msg)) => msg,
            Ok(None) => return,
            Err(e) => {
                debug!("dropping malformed frame on receiver {}: {e}", self_address.name);
                continue;
            }
        };

        match msg.tag() {
            TAG_QUIT => {
                let confirm_to = msg.get("confirm_to").and_then(|v| serde_json::from_value(v.clone()).ok());
                let confirm_msg = msg.get("confirm_msg").cloned().and_then(Message::from_value);
                let _ = quit_tx.send((confirm_to, confirm_msg));
                return;
            }
            TAG_PING => {
                if let Some(reply_to) = msg.get_reply_to() {
                    respond(&reply_to, Message::pong(), &config).await;
                }
            }
            TAG_ADDRESS => {
                if let Some(reply_to) = msg.get_reply_to() {
                    let reply = Message::new(TAG_ADDRESS)
                        .field("name", self_address.name.clone())
                        .field("host", self_address.host.clone())
                        .field("port", self_address.port);
                    respond(&reply_to, reply, &config).await;
                }
            }
            TAG_LOW_LEVEL_PING => {
                if let Some(Value::String(uri)) = msg.get("reply_to").cloned() {
                    if let Ok(mut conn) = connect_uri(&uri).await {
                        let _ = framing::write_message(&mut conn, &Message::pong()).await;
                    }
                }
            }
            _ => {
                let _ = mailbox_tx.send_async(Some(msg)).await;
            }
        }
    }
}

async fn respond(to: &Address, msg: Message, config: &RuntimeConfig) {
    if let Ok(mut sender) = Sender::connect_no_probe(to, config).await {
        let _ = sender.put(msg).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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
    async fn bind_registers_with_broker_and_close_unregisters() {
        let (_guard, config) = test_config().await;
        let broker_server = crate::broker::NameBrokerServer::bind(config.clone()).await.unwrap();
        let client = NameBrokerClient::new(&config);

        let receiver = Receiver::bind("alpha", "localhost", config.clone()).await.unwrap();
        let port = receiver.address().port.unwrap();
        assert_eq!(client.get("alpha").await.unwrap(), Some(port));

        receiver.close().await.unwrap();
        assert_eq!(client.get("alpha").await.unwrap(), None);

        broker_server.stop().await;
    }

    #[tokio::test]
    async fn qsize_reflects_pending_messages() {
        let (_guard, config) = test_config().await;
        let broker_server = crate::broker::NameBrokerServer::bind(config.clone()).await.unwrap();

        let mut receiver = Receiver::bind("beta", "localhost", config.clone()).await.unwrap();
        let mut sender = Sender::connect(receiver.address(), &config).await.unwrap();
        sender.put(Message::new("one")).await.unwrap();
        sender.put(Message::new("two")).await.unwrap();

        // Allow the accept loop's reader task to drain both frames.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(receiver.qsize(), 2);

        receiver.close().await.unwrap();
        broker_server.stop().await;
    }
}
