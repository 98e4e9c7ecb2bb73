use serde::{Deserialize, Serialize};

/// Location-transparent identity of an actor: `(name, host, port)`.
///
/// Two addresses are equal iff all three fields are equal. `localhost` and
/// `127.0.0.1` are the same *reachable* host (see [`is_local_host`]) but are
/// not structurally equal addresses.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    pub name: String,
    pub host: String,
    pub port: Option<u16>,
}

impl Address {
    pub fn new(name: impl Into<String>, host: impl Into<String>, port: Option<u16>) -> Self {
        Address {
            name: name.into(),
            host: host.into(),
            port,
        }
    }

    /// An address with no published port: reachable only over the local
    /// IPC endpoint for `name`.
    pub fn local(name: impl Into<String>) -> Self {
        Address::new(name, "localhost", None)
    }

    pub fn is_local(&self) -> bool {
        is_local_host(&self.host)
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.port {
            Some(port) => write!(f, "{}@{}:{}", self.name, self.host, port),
            None => write!(f, "{}@{}", self.name, self.host),
        }
    }
}

/// True for `localhost`, `127.0.0.1`, or any host that resolves to an
/// address assigned to this machine. Best-effort: a host we cannot resolve
/// is treated as non-local.
pub fn is_local_host(host: &str) -> bool {
    if host == "localhost" || host == "127.0.0.1" {
        return true;
    }
    get_local_host(host).map(|h| h == host).unwrap_or(false)
}

/// The local address that would be used to reach `target`, or `None` if the
/// system has no reachable interface for it.
///
/// Uses the UDP-connect trick: connecting a UDP socket does not send any
/// packet over the wire, it only asks the kernel to pick a route, so this
/// is cheap and side-effect free.
pub fn get_local_host(target: &str) -> Option<String> {
    use std::net::UdpSocket;
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect((target, 8000)).ok()?;
    let local_addr = socket.local_addr().ok()?;
    Some(local_addr.ip().to_string())
}
