//! The name broker: a per-host directory mapping actor names to TCP ports.
//!
//! One task owns all mutable state, so no additional locking is required.
//! Here the "inbox" is a TCP listener instead of a `flume` channel, since
//! the broker must be reachable from other
//! processes, but the shape -- accept one unit of work, handle it, loop --
//! is the same.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::RuntimeConfig;
use crate::error::{Result, RuntimeError};

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
enum Request {
    Register { name: String, port: u16 },
    Unregister { name: String },
    Get { name: String },
    List,
    Ping,
    #[serde(rename = "__quit__")]
    Quit,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct Response {
    #[serde(skip_serializing_if = "Option::is_none")]
    port: Option<Option<u16>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pong: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    names: Option<HashMap<String, u16>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    exception: Option<String>,
}

/// A running broker server. Dropping this does not stop the server; call
/// [`NameBrokerServer::stop`] to shut it down deterministically.
pub struct NameBrokerServer {
    handle: JoinHandle<()>,
}

impl NameBrokerServer {
    /// Bind the broker's fixed port and start serving.
    pub async fn bind(config: RuntimeConfig) -> std::io::Result<Self> {
        let listener = TcpListener::bind((config.broker_host.as_str(), config.broker_port)).await?;
        let handle = tokio::spawn(serve(listener));
        Ok(NameBrokerServer { handle })
    }

    /// Stop the server and wait for its task to finish.
    pub async fn stop(self) {
        self.handle.abort();
        let _ = self.handle.await;
    }
}

async fn serve(listener: TcpListener) {
    let mut names: HashMap<String, u16> = HashMap::new();
    loop {
        let (stream, _) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                warn!("name broker accept failed: {e}");
                continue;
            }
        };
        match serve_one(stream, &mut names).await {
            Ok(true) => continue,
            Ok(false) => {
                debug!("name broker asked to shut down");
                return;
            }
            Err(e) => {
                debug!("name broker connection error: {e}");
                continue;
            }
        }
    }
}

/// Handle exactly one request/response turn. Returns `Ok(false)` if the
/// request was `__quit__` and the server should stop.
async fn serve_one(stream: TcpStream, names: &mut HashMap<String, u16>) -> std::io::Result<bool> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut line = String::new();
    reader.read_line(&mut line).await?;
    if line.trim().is_empty() {
        return Ok(true);
    }
    let (response, keep_going) = match serde_json::from_str::<Request>(line.trim()) {
        Ok(req) => handle(req, names),
        Err(e) => (
            Response {
                exception: Some(e.to_string()),
                ..Default::default()
            },
            true,
        ),
    };
    let mut body = serde_json::to_string(&response).unwrap_or_else(|_| "{}".to_string());
    body.push('\n');
    write_half.write_all(body.as_bytes()).await?;
    Ok(keep_going)
}

fn handle(req: Request, names: &mut HashMap<String, u16>) -> (Response, bool) {
    match req {
        Request::Register { name, port } => {
            names.insert(name, port);
            (Response::default(), true)
        }
        Request::Unregister { name } => {
            names.remove(&name);
            (Response::default(), true)
        }
        Request::Get { name } => (
            Response {
                port: Some(names.get(&name).copied()),
                ..Default::default()
            },
            true,
        ),
        Request::List => (
            Response {
                names: Some(names.clone()),
                ..Default::default()
            },
            true,
        ),
        Request::Ping => (
            Response {
                pong: Some(true),
                ..Default::default()
            },
            true,
        ),
        Request::Quit => (Response::default(), false),
    }
}

/// Client for the name broker, used by every [`crate::transport::Receiver`]
/// and [`crate::transport::Sender`]. One short-lived TCP connection per RPC.
#[derive(Debug, Clone)]
pub struct NameBrokerClient {
    host: String,
    port: u16,
    timeout: Duration,
}

impl NameBrokerClient {
    pub fn new(config: &RuntimeConfig) -> Self {
        NameBrokerClient {
            host: config.broker_host.clone(),
            port: config.broker_port,
            timeout: config.broker_rpc_timeout,
        }
    }

    pub async fn register(&self, name: &str, port: u16) -> Result<()> {
        self.rpc(Request::Register {
            name: name.to_string(),
            port,
        })
        .await?;
        Ok(())
    }

    pub async fn unregister(&self, name: &str) -> Result<()> {
        self.rpc(Request::Unregister {
            name: name.to_string(),
        })
        .await?;
        Ok(())
    }

    pub async fn get(&self, name: &str) -> Result<Option<u16>> {
        let resp = self
            .rpc(Request::Get {
                name: name.to_string(),
            })
            .await?;
        Ok(resp.port.flatten())
    }

    pub async fn list(&self) -> Result<HashMap<String, u16>> {
        let resp = self.rpc(Request::List).await?;
        Ok(resp.names.unwrap_or_default())
    }

    pub async fn is_server_alive(&self) -> bool {
        self.rpc(Request::Ping).await.is_ok()
    }

    async fn rpc(&self, req: Request) -> Result<Response> {
        let addr_label = format!("{}:{}", self.host, self.port);
        let connect = TcpStream::connect((self.host.as_str(), self.port));
        let mut stream = timeout(self.timeout, connect)
            .await
            .map_err(|_| RuntimeError::BrokerUnavailable(addr_label.clone()))?
            .map_err(|_| RuntimeError::BrokerUnavailable(addr_label.clone()))?;
        let mut body = serde_json::to_string(&req).expect("Request always serializes");
        body.push('\n');
        let turn = async {
            stream.write_all(body.as_bytes()).await?;
            let (read_half, _) = stream.split();
            let mut reader = BufReader::new(read_half);
            let mut line = String::new();
            reader.read_line(&mut line).await?;
            std::io::Result::Ok(line)
        };
        let line = timeout(self.timeout, turn)
            .await
            .map_err(|_| RuntimeError::BrokerUnavailable(addr_label.clone()))?
            .map_err(|_| RuntimeError::BrokerUnavailable(addr_label.clone()))?;
        serde_json::from_str(line.trim())
            .map_err(|e| RuntimeError::MalformedMessage(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_config() -> RuntimeConfig {
        let mut cfg = RuntimeConfig::default();
        // Bind an ephemeral port for the test broker instead of the fixed
        // 5555, so tests can run concurrently.
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        cfg.broker_port = listener.local_addr().unwrap().port();
        cfg.broker_host = "127.0.0.1".to_string();
        drop(listener);
        cfg
    }

    #[tokio::test]
    async fn register_get_unregister_roundtrip() {
        let cfg = test_config().await;
        let server = NameBrokerServer::bind(cfg.clone()).await.unwrap();
        let client = NameBrokerClient::new(&cfg);

        assert!(client.is_server_alive().await);
        client.register("foo", 1234).await.unwrap();
        assert_eq!(client.get("foo").await.unwrap(), Some(1234));
        client.unregister("foo").await.unwrap();
        assert_eq!(client.get("foo").await.unwrap(), None);

        server.stop().await;
    }

    #[tokio::test]
    async fn register_overwrites_prior_entry() {
        let cfg = test_config().await;
        let server = NameBrokerServer::bind(cfg.clone()).await.unwrap();
        let client = NameBrokerClient::new(&cfg);

        client.register("foo", 1).await.unwrap();
        client.register("foo", 2).await.unwrap();
        assert_eq!(client.get("foo").await.unwrap(), Some(2));

        server.stop().await;
    }

    #[tokio::test]
    async fn get_on_unknown_name_is_null_and_pure() {
        let cfg = test_config().await;
        let server = NameBrokerServer::bind(cfg.clone()).await.unwrap();
        let client = NameBrokerClient::new(&cfg);

        assert_eq!(client.get("missing").await.unwrap(), None);
        assert!(client.list().await.unwrap().is_empty());

        server.stop().await;
    }

    #[tokio::test]
    async fn client_times_out_when_broker_absent() {
        let mut cfg = RuntimeConfig::default();
        cfg.broker_host = "127.0.0.1".to_string();
        cfg.broker_port = 1; // privileged/unused port, nothing listening
        cfg.broker_rpc_timeout = Duration::from_millis(200);
        let client = NameBrokerClient::new(&cfg);
        assert!(client.get("anything").await.is_err());
    }
}
