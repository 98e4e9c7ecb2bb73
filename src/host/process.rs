//! Process-hosted actors: a subprocess re-exec of the current binary,
//! synchronized with the parent through a two-step handshake on a
//! throwaway "wait" receiver.
//!
//! The parent launches a subprocess, which allocates its own address,
//! reports back `ok` with that address and its pid, then waits for an
//! `init` message before answering `finished_init` and handing control to
//! the actor's own loop.

use std::time::{Duration, Instant};

use tokio::process::Command;
use uuid::Uuid;

use crate::actor::{Actor, Receive};
use crate::actor_ref::ActorRef;
use crate::address::Address;
use crate::config::RuntimeConfig;
use crate::error::{Result, RuntimeError};
use crate::message::Message;
use crate::transport::{Receiver, Sender};

/// Spawn `kind` (a name previously registered with [`crate::registry`]) in
/// a child process and block until it has finished initializing.
///
/// `host` is the externally-reachable host the returned [`ActorRef`]
/// addresses the child as; the child itself always binds `localhost`
/// plus a TCP port registered with the broker.
pub async fn spawn_process_hosted(kind: &str, host: &str, config: RuntimeConfig) -> Result<ActorRef> {
    let wait_name = format!("__wait_{}__", Uuid::new_v4());
    let mut wait_receiver = Receiver::bind(&wait_name, "localhost", config.clone()).await?;

    // Re-exec whatever binary is running. Tests that drive this from a
    // harness binary other than `mischief-host` point this at the real
    // one via `MISCHIEF_HOST_BIN`.
    let exe = match std::env::var_os("MISCHIEF_HOST_BIN") {
        Some(path) => std::path::PathBuf::from(path),
        None => std::env::current_exe().map_err(RuntimeError::Io)?,
    };
    let mut child = Command::new(exe)
        .arg("--spawn-child")
        .arg(&wait_name)
        .arg(kind)
        .spawn()
        .map_err(RuntimeError::Io)?;

    let deadline = Instant::now() + config.spawn_timeout;
    let ok_msg = match wait_for_message(&mut wait_receiver, "ok", deadline).await {
        Ok(msg) => msg,
        Err(_) => {
            let _ = child.start_kill();
            let _ = wait_receiver.close().await;
            return Err(RuntimeError::SpawnTimeout(format!("{kind} did not acknowledge startup")));
        }
    };
    let child_address = address_from_ok(&ok_msg, host)?;

    let mut sender = Sender::connect(&child_address, &config).await?;
    sender.put(Message::new("init").reply_to(wait_receiver.address())).await?;

    let finished = wait_for_message(&mut wait_receiver, "finished_init", deadline).await;
    let _ = wait_receiver.close().await;
    if finished.is_err() {
        let _ = child.start_kill();
        return Err(RuntimeError::SpawnTimeout(format!("{kind} did not finish initialization")));
    }

    ActorRef::new(child_address, config).await
}

fn address_from_ok(msg: &Message, host: &str) -> Result<Address> {
    let name = msg
        .get("name")
        .and_then(|v| v.as_str())
        .ok_or_else(|| RuntimeError::MalformedMessage("ok message missing name".to_string()))?
        .to_string();
    let port = msg.get("port").and_then(|v| v.as_u64()).map(|p| p as u16);
    Ok(Address::new(name, host.to_string(), port))
}

async fn wait_for_message(receiver: &mut Receiver, tag: &str, deadline: Instant) -> Result<Message> {
    loop {
        let now = Instant::now();
        if now >= deadline {
            return Err(RuntimeError::SpawnTimeout(tag.to_string()));
        }
        match receiver.get(Some((deadline - now).min(Duration::from_millis(50)))).await? {
            Some(msg) if msg.tag() == tag => return Ok(msg),
            Some(_) | None => continue,
        }
    }
}

/// The child side of the handshake, called from `main()` when invoked as
/// `<binary> --spawn-child <wait_name> <kind>`.
pub async fn run_spawned_child(wait_name: &str, kind: &str, config: RuntimeConfig) -> Result<()> {
    let behavior = crate::registry::construct(kind)
        .await
        .ok_or_else(|| RuntimeError::SpawnTimeout(format!("unknown actor kind {kind}")))?;

    let name = format!("{kind}-{}", Uuid::new_v4());
    let receiver = Receiver::bind(&name, "localhost", config.clone()).await?;
    let address = receiver.address().clone();

    let wait_address = Address::local(wait_name);
    let mut ack_sender = Sender::connect(&wait_address, &config).await?;
    ack_sender
        .put(
            Message::new("ok")
                .field("name", address.name.clone())
                .field("host", address.host.clone())
                .field("port", address.port)
                .field("pid", std::process::id()),
        )
        .await?;

    let mut actor = Actor::new(receiver, &config);
    let mut timed_out = false;
    actor
        .receive(
            Receive::new()
                .on("init", |_| {})
                .on_timeout(|| timed_out = true),
            Some(config.spawn_timeout),
        )
        .await?;
    if timed_out {
        return Err(RuntimeError::SpawnTimeout(format!("{kind} never received init")));
    }
    ack_sender.put(Message::new("finished_init")).await?;
    drop(ack_sender);

    behavior.run(actor).await;
    Ok(())
}
