//! Process-hosted actors are re-exec'd as a fresh subprocess, which has no
//! access to the parent's local state. Rust has no reflection-based module
//! loader, so a spawnable actor instead registers a string kind and a
//! constructor fn once at startup, in both the parent and (since it's the
//! same binary) the re-exec'd child.

use std::collections::HashMap;
use std::sync::OnceLock;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::actor::Actor;

/// The behavior a process-hosted or thread-hosted actor runs once its
/// transport is bound.
#[async_trait]
pub trait ActorBehavior: Send + 'static {
    async fn run(self: Box<Self>, actor: Actor);
}

type Constructor = fn() -> Box<dyn ActorBehavior>;

static REGISTRY: OnceLock<Mutex<HashMap<String, Constructor>>> = OnceLock::new();

fn registry() -> &'static Mutex<HashMap<String, Constructor>> {
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Register `kind` so `--spawn-child` can later construct it by name.
pub async fn register(kind: impl Into<String>, constructor: Constructor) {
    registry().lock().await.insert(kind.into(), constructor);
}

pub async fn construct(kind: &str) -> Option<Box<dyn ActorBehavior>> {
    registry().lock().await.get(kind).map(|ctor| ctor())
}

pub async fn known_kinds() -> Vec<String> {
    registry().lock().await.keys().cloned().collect()
}
