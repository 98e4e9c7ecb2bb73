//! A duplex stream that is either a Unix domain socket or a TCP socket.
//!
//! The runtime picks between the two per [`crate::address::is_local_host`];
//! everything above this layer (framing, the reader loop) is transport
//! agnostic.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpStream, UnixStream};

pub enum Conn {
    Unix(UnixStream),
    Tcp(TcpStream),
}

impl AsyncRead for Conn {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Conn::Unix(s) => Pin::new(s).poll_read(cx, buf),
            Conn::Tcp(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Conn {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Conn::Unix(s) => Pin::new(s).poll_write(cx, buf),
            Conn::Tcp(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Conn::Unix(s) => Pin::new(s).poll_flush(cx),
            Conn::Tcp(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Conn::Unix(s) => Pin::new(s).poll_shutdown(cx),
            Conn::Tcp(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}

/// Either listener kind, bound at a `Receiver`'s two possible endpoints.
pub enum Listener {
    Unix(tokio::net::UnixListener),
    Tcp(tokio::net::TcpListener),
}

impl Listener {
    pub async fn accept(&self) -> io::Result<Conn> {
        match self {
            Listener::Unix(l) => l.accept().await.map(|(s, _)| Conn::Unix(s)),
            Listener::Tcp(l) => l.accept().await.map(|(s, _)| Conn::Tcp(s)),
        }
    }
}

/// Accept on whichever of the two listeners is present, preferring the
/// local one when both fire at once (biased select).
pub async fn accept_any(unix: Option<&Listener>, tcp: Option<&Listener>) -> io::Result<Conn> {
    match (unix, tcp) {
        (Some(u), Some(t)) => tokio::select! {
            biased;
            r = u.accept() => r,
            r = t.accept() => r,
        },
        (Some(u), None) => u.accept().await,
        (None, Some(t)) => t.accept().await,
        (None, None) => std::future::pending().await,
    }
}

/// Parse the bare-URI form used by `__low_level_ping__`'s `reply_to`
/// field: `unix:<path>` or `tcp:<host>:<port>`.
pub async fn connect_uri(uri: &str) -> io::Result<Conn> {
    if let Some(path) = uri.strip_prefix("unix:") {
        Ok(Conn::Unix(UnixStream::connect(path).await?))
    } else if let Some(rest) = uri.strip_prefix("tcp:") {
        let (host, port) = rest
            .rsplit_once(':')
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "malformed tcp uri"))?;
        let port: u16 = port
            .parse()
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "malformed tcp port"))?;
        Ok(Conn::Tcp(TcpStream::connect((host, port)).await?))
    } else {
        Err(io::Error::new(io::ErrorKind::InvalidInput, "unrecognized uri scheme"))
    }
}
