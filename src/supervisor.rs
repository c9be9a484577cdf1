//! Supervisor: constructs the queue, starts one Watcher per source kind,
//! starts the Worker, and runs until cancelled.

use kube::Client;
use tokio::task::JoinSet;

use crate::config::Config;
use crate::watcher;
use crate::worker;

/// Spawns the Watchers and the Worker and runs them on this `JoinSet` until
/// the caller drops it or one of the tasks panics. The tasks themselves loop
/// forever, so in practice this only resolves on an unexpected panic; the
/// caller races it against a shutdown signal.
pub fn spawn(client: Client, config: Config) -> JoinSet<()> {
    let mut tasks = JoinSet::new();

    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

    tasks.spawn(watcher::watch_configmaps(client.clone(), tx.clone()));
    tasks.spawn(watcher::watch_secrets(client.clone(), tx.clone()));
    tasks.spawn(worker::run(client, rx, tx, config));

    tasks
}
