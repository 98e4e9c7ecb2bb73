//! Outbound side of the transport: connects to a target [`Address`], probes
//! it with a low-level ping, and from then on is a plain framed writer.
//!
//! Immediately exchanges a `__low_level_ping__`/`__pong__` pair before
//! returning the sender to the caller, so a dead target fails fast at
//! construction instead of silently swallowing the first real message.

use std::future::Future;
use std::path::PathBuf;

use tokio::io::BufReader;
use tokio::net::{TcpListener, TcpStream, UnixListener, UnixStream};
use uuid::Uuid;

use crate::address::{get_local_host, Address};
use crate::config::RuntimeConfig;
use crate::error::{Result, RuntimeError};
use crate::message::{Message, TAG_PONG};

use super::conn::Conn;
use super::framing;
use super::socket_path;

pub struct Sender {
    conn: Conn,
    target: Address,
}

impl Sender {
    /// Connect to `target` and confirm it is alive before returning.
    pub async fn connect(target: &Address, config: &RuntimeConfig) -> Result<Self> {
        let mut sender = Self::connect_no_probe(target, config).await?;
        sender.probe(config).await?;
        Ok(sender)
    }

    /// Connect without the liveness probe. Used internally to reply to
    /// control messages (`__ping__`, `__address__`, `__low_level_ping__`),
    /// where probing the replier would recurse forever.
    pub(crate) async fn connect_no_probe(target: &Address, config: &RuntimeConfig) -> Result<Self> {
        let conn = if target.is_local() {
            let path = socket_path(config, &target.name);
            let stream = UnixStream::connect(&path)
                .await
                .map_err(|_| RuntimeError::ChannelDown(target.clone()))?;
            Conn::Unix(stream)
        } else {
            let port = match target.port {
                Some(p) => p,
                None => {
                    let broker = crate::broker::NameBrokerClient::new(config);
                    broker
                        .get(&target.name)
                        .await?
                        .ok_or_else(|| RuntimeError::ChannelDown(target.clone()))?
                }
            };
            let stream = TcpStream::connect((target.host.as_str(), port))
                .await
                .map_err(|_| RuntimeError::ChannelDown(target.clone()))?;
            Conn::Tcp(stream)
        };
        Ok(Sender {
            conn,
            target: target.clone(),
        })
    }

    async fn probe(&mut self, config: &RuntimeConfig) -> Result<()> {
        let (uri, wait_for_pong) = transient_listener(&self.target, config)
            .await
            .map_err(|_| RuntimeError::ChannelDown(self.target.clone()))?;
        framing::write_message(&mut self.conn, &Message::low_level_ping(&uri))
            .await
            .map_err(|_| RuntimeError::ChannelDown(self.target.clone()))?;
        match tokio::time::timeout(config.liveness_probe_timeout, wait_for_pong).await {
            Ok(Ok(msg)) if msg.tag() == TAG_PONG => Ok(()),
            _ => Err(RuntimeError::ChannelDown(self.target.clone())),
        }
    }

    pub async fn put(&mut self, msg: Message) -> Result<()> {
        framing::write_message(&mut self.conn, &msg)
            .await
            .map_err(|_| RuntimeError::ChannelDown(self.target.clone()))
    }

    /// Ask the receiver at the other end to shut down, optionally asking it
    /// to confirm back to `confirm_to` once its endpoints are closed.
    pub async fn close_receiver(&mut self, confirm_to: Option<&Address>, confirm_msg: Option<Message>) -> Result<()> {
        self.put(Message::quit(confirm_to, confirm_msg)).await
    }

    pub fn target(&self) -> &Address {
        &self.target
    }
}

/// Bind a one-shot endpoint to receive exactly one reply frame, returning
/// the bare URI to hand to the peer plus a future that resolves to that
/// frame.
async fn transient_listener(
    target: &Address,
    config: &RuntimeConfig,
) -> std::io::Result<(String, std::pin::Pin<Box<dyn Future<Output = std::io::Result<Message>> + Send>>)> {
    if target.is_local() {
        std::fs::create_dir_all(&config.ipc_directory)?;
        let path = PathBuf::from(&config.ipc_directory).join(format!(".probe-{}", Uuid::new_v4()));
        let listener = UnixListener::bind(&path)?;
        let uri = format!("unix:{}", path.display());
        let cleanup_path = path.clone();
        let fut = async move {
            let (stream, _) = listener.accept().await?;
            let mut reader = BufReader::new(stream);
            let msg = framing::read_message(&mut reader).await?.ok_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "probe connection closed early")
            });
            let _ = tokio::fs::remove_file(&cleanup_path).await;
            msg
        };
        Ok((uri, Box::pin(fut) as _))
    } else {
        let listener = TcpListener::bind(("0.0.0.0", 0)).await?;
        let port = listener.local_addr()?.port();
        let host = get_local_host(&target.host).unwrap_or_else(|| "0.0.0.0".to_string());
        let uri = format!("tcp:{}:{}", host, port);
        let fut = async move {
            let (stream, _) = listener.accept().await?;
            let mut reader = BufReader::new(stream);
            framing::read_message(&mut reader).await?.ok_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "probe connection closed early")
            })
        };
        Ok((uri, Box::pin(fut) as _))
    }
}
