use thiserror::Error;

use crate::address::Address;

/// Failure modes raised by the runtime itself.
///
/// User handler code is free to return its own `anyhow::Error`; this enum
/// only covers the errors the transport, broker, and actor kernel raise on
/// their own behalf.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// A send target could not be reached: the broker had no port for it,
    /// the connect failed, or the low-level ping did not answer in time.
    #[error("channel to {0:?} is down")]
    ChannelDown(Address),

    /// A `receive` observed the mailbox terminator: the receiver is closed.
    #[error("mailbox closed")]
    MailboxClosed,

    /// Spawn did not observe `ok` or `finished_init` within its deadline.
    #[error("spawn timed out: {0}")]
    SpawnTimeout(String),

    /// A NameBroker RPC did not answer within its deadline.
    #[error("name broker unavailable at {0}")]
    BrokerUnavailable(String),

    /// A frame did not parse as JSON, or parsed but lacked a `tag`.
    ///
    /// Only constructed internally by the reader loop; it is logged and
    /// dropped there and should not normally escape to caller code.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// An I/O failure underneath the transport.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Anything else, surfaced from a handler or a dependency.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, RuntimeError>;
