pub mod clock;
pub mod config;
pub mod logging;
pub mod protocol;
pub mod replication;
pub mod server;
pub mod store;

pub use config::StartupConfig;

/// Runs the server to completion on the current Tokio runtime. Intended to
/// be driven from a `current_thread`-flavored runtime so the whole process
/// is a single OS thread with no cross-connection locking.
pub async fn run(config: StartupConfig) -> anyhow::Result<()> {
    server::event_loop::run(config).await
}
