//! An Erlang-style actor runtime: location-transparent addressing, JSON
//! framed IPC/TCP transport with liveness probing, a name broker, and an
//! actor kernel with selective receive.
//!
//! The mailbox/handle split, the polling receive loop, and the
//! `thiserror`-based error enum target a location-transparent, wire-addressed
//! actor rather than an in-process one.

pub mod actor;
pub mod actor_ref;
pub mod address;
pub mod broker;
pub mod config;
pub mod error;
pub mod host;
pub mod mailbox;
pub mod message;
pub mod registry;
pub mod transport;

pub use actor::{Actor, Receive};
pub use actor_ref::ActorRef;
pub use address::Address;
pub use config::RuntimeConfig;
pub use error::{Result, RuntimeError};
pub use message::Message;
