//! The two actor hosting models described in spec §4.4: thread-hosted
//! (a task in the current process) and process-hosted (a subprocess
//! re-exec'ing this binary, synchronized with a handshake).

mod process;
mod thread;

pub use process::{run_spawned_child, spawn_process_hosted};
pub use thread::spawn_thread_hosted;
