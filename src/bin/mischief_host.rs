//! The `mischief-host` binary serves two roles:
//!
//! * run with no arguments, it starts a standalone name broker;
//! * run as `mischief-host --spawn-child <wait-name> <kind> <actor-name>`,
//!   it is the re-exec target [`mischief_rt::host::spawn_process_hosted`]
//!   launches for a process-hosted actor, and performs the child side of
//!   the startup handshake before running the named actor kind.

use std::path::Path;

use async_trait::async_trait;
use mischief_rt::actor::{Actor, Receive};
use mischief_rt::broker::NameBrokerServer;
use mischief_rt::registry::{self, ActorBehavior};
use mischief_rt::RuntimeConfig;

/// A minimal built-in actor kind, registered so `--spawn-child` always has
/// at least one real kind to dispatch in tests and examples. Applications
/// embedding this runtime register their own kinds the same way before
/// calling `spawn_process_hosted`.
struct EchoActor;

#[async_trait]
impl ActorBehavior for EchoActor {
    async fn run(self: Box<Self>, mut actor: Actor) {
        loop {
            let mut stop = false;
            let result = actor
                .receive(
                    Receive::new().on("ping", |_| {}).on("stop", |_| stop = true),
                    Some(std::time::Duration::from_secs(30)),
                )
                .await;
            if result.is_err() || stop {
                break;
            }
        }
        let _ = actor.close().await;
    }
}

fn make_echo_actor() -> Box<dyn ActorBehavior> {
    Box::new(EchoActor)
}

async fn register_builtin_actors() {
    registry::register("echo", make_echo_actor as fn() -> Box<dyn ActorBehavior>).await;
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    register_builtin_actors().await;

    let config = RuntimeConfig::load_or_default(Path::new("mischief.toml"))?;
    let args: Vec<String> = std::env::args().collect();

    if args.get(1).map(String::as_str) == Some("--spawn-child") {
        let wait_name = args.get(2).expect("--spawn-child needs a wait-actor name");
        let kind = args.get(3).expect("--spawn-child needs an actor kind");
        mischief_rt::host::run_spawned_child(wait_name, kind, config).await?;
        return Ok(());
    }

    tracing::info!(host = %config.broker_host, port = config.broker_port, "starting name broker");
    let server = NameBrokerServer::bind(config).await?;
    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down name broker");
    server.stop().await;
    Ok(())
}
