//! Transport layer: JSON-framed IPC (Unix domain socket) and TCP channels,
//! plus a liveness-probe handshake.
//!
//! One task owns the inbound side for the lifetime of the endpoint,
//! draining frames into a channel that the rest of the runtime polls with
//! a timeout.

mod conn;
mod framing;
mod receiver;
mod sender;

pub use receiver::Receiver;
pub use sender::Sender;

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::net::TcpListener;

use crate::config::RuntimeConfig;

/// Filesystem path of the Unix domain socket for `name`.
pub fn socket_path(config: &RuntimeConfig, name: &str) -> PathBuf {
    PathBuf::from(&config.ipc_directory).join(name)
}

/// Bind a TCP listener on a pseudo-random port within the configured
/// range, trying each candidate in the range at most once starting from a
/// time-seeded offset. No `rand` dependency: this is a startup-time
/// best-effort pick, not a security-sensitive one.
pub(crate) async fn bind_tcp_in_range(config: &RuntimeConfig) -> std::io::Result<TcpListener> {
    let span = (config.tcp_port_max - config.tcp_port_min) as u32 + 1;
    let seed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    let start = seed % span;
    for offset in 0..span {
        let port = config.tcp_port_min + ((start + offset) % span) as u16;
        if let Ok(listener) = TcpListener::bind(("0.0.0.0", port)).await {
            return Ok(listener);
        }
    }
    Err(std::io::Error::new(
        std::io::ErrorKind::AddrNotAvailable,
        "no free port in configured range",
    ))
}
