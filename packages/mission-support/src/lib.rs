//! Ambient infrastructure shared by all three binaries: recorder sinks,
//! the SSH/container executor, and process/signal hygiene (§2).

pub mod hygiene;
pub mod recorder;
pub mod ssh;

pub use hygiene::{kill_process_tree, PidRegistry};
pub use recorder::Recorder;
pub use ssh::{SshError, SshExecutor};

use tracing_subscriber::EnvFilter;

/// Install a `tracing` subscriber with a per-module default filter,
/// mirroring `backend-rust/src/main.rs`'s `EnvFilter` setup.
pub fn init_tracing(module: &str) {
    let default_directive = format!("{module}=info");
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive)))
        .try_init();
}
