//! Thread-hosted actors: run in a task on the current process, alongside
//! whatever spawned them. No handshake is needed, since the caller already
//! shares an executor with the actor it is starting.

use crate::actor::Actor;
use crate::actor_ref::ActorRef;
use crate::config::RuntimeConfig;
use crate::error::Result;
use crate::registry::ActorBehavior;
use crate::transport::Receiver;

pub async fn spawn_thread_hosted(
    name: &str,
    host: &str,
    config: RuntimeConfig,
    behavior: Box<dyn ActorBehavior>,
) -> Result<ActorRef> {
    let receiver = Receiver::bind(name, host, config.clone()).await?;
    let address = receiver.address().clone();
    let actor = Actor::new(receiver, &config);

    tokio::spawn(async move {
        behavior.run(actor).await;
    });

    ActorRef::new(address, config).await
}
