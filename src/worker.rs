//! Worker: the debouncer + applier. One ingest task coalesces WorkItems
//! into the pending-updates map; one flush task periodically patches
//! expired entries.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use kube::Client;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

use crate::annotator;
use crate::config::Config;
use crate::dispatch;
use crate::model::{PendingUpdate, WorkItem};
use crate::ownership;

pub type WorkReceiver = UnboundedReceiver<WorkItem>;
pub type WorkSender = UnboundedSender<WorkItem>;

const FLUSH_INTERVAL: Duration = Duration::from_secs(5);
/// Brief pause before retrying a not-ready target, so a stuck rollout
/// doesn't spin the ingest loop hot.
const NOT_READY_RETRY_DELAY: Duration = Duration::from_millis(500);
/// Brief pause before retrying after a readiness-check failure, so a
/// persistent API error (apiserver down, RBAC denial) doesn't spin the
/// ingest loop hot re-issuing the same List calls.
const READINESS_ERROR_RETRY_DELAY: Duration = Duration::from_secs(1);

type PendingMap = Arc<Mutex<HashMap<String, PendingUpdate>>>;

pub async fn run(client: Client, rx: WorkReceiver, requeue_tx: WorkSender, config: Config) {
    let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));

    let ingest = tokio::spawn(ingest_loop(client.clone(), rx, requeue_tx, Arc::clone(&pending)));
    let flush = tokio::spawn(flush_loop(client, pending, config.update_resource_timeout));

    let _ = tokio::join!(ingest, flush);
}

async fn ingest_loop(client: Client, mut rx: WorkReceiver, requeue_tx: WorkSender, pending: PendingMap) {
    while let Some(item) = rx.recv().await {
        match ownership::is_ready(&client, &item.res_namespace, &item.res_name, item.res_kind).await {
            Ok(true) => coalesce(&pending, &item),
            Ok(false) => {
                tracing::info!(target = %item.target_key(), "target not ready, requeueing");
                requeue(&requeue_tx, item);
                tokio::time::sleep(NOT_READY_RETRY_DELAY).await;
            }
            Err(error) => {
                tracing::warn!(%error, target = %item.target_key(), "readiness check failed, requeueing");
                requeue(&requeue_tx, item);
                tokio::time::sleep(READINESS_ERROR_RETRY_DELAY).await;
            }
        }
    }
}

fn requeue(tx: &WorkSender, item: WorkItem) {
    if tx.send(item).is_err() {
        tracing::warn!("work queue closed, dropping item that needed requeueing");
    }
}

fn coalesce(pending: &PendingMap, item: &WorkItem) {
    let key = item.target_key();
    let ann_key = annotator::version_annotation_key(item.cfg_kind, &item.cfg_name);

    let mut map = pending.lock().expect("pending-updates lock poisoned");
    match map.get_mut(&key) {
        Some(existing) => existing.coalesce(ann_key, item.cfg_version.clone()),
        None => {
            map.insert(
                key,
                PendingUpdate::new(
                    item.res_kind,
                    item.res_namespace.clone(),
                    item.res_name.clone(),
                    ann_key,
                    item.cfg_version.clone(),
                ),
            );
        }
    }
}

async fn flush_loop(client: Client, pending: PendingMap, timeout: Duration) {
    let mut ticker = tokio::time::interval(FLUSH_INTERVAL);
    loop {
        ticker.tick().await;
        flush_tick(&client, &pending, timeout).await;
    }
}

/// Snapshots expired entries under the lock, releases it, performs the
/// patch I/O, then reacquires to delete — but only if `deadline_base` is
/// unchanged from the snapshot, so a coalesce that raced the flush isn't
/// silently dropped.
async fn flush_tick(client: &Client, pending: &PendingMap, timeout: Duration) {
    let due: Vec<(String, PendingUpdate)> = {
        let map = pending.lock().expect("pending-updates lock poisoned");
        map.iter()
            .filter(|(_, update)| update.is_expired(timeout))
            .map(|(key, update)| (key.clone(), update.clone()))
            .collect()
    };

    for (key, snapshot) in due {
        let body = annotator::build_patch(&snapshot.changes);
        match dispatch::patch(client, snapshot.kind, &snapshot.namespace, &snapshot.name, &body).await {
            Ok(()) => {
                dispatch::post_patch(snapshot.kind, &snapshot.namespace, &snapshot.name);
                let mut map = pending.lock().expect("pending-updates lock poisoned");
                match map.get(&key) {
                    Some(current) if current.deadline_base == snapshot.deadline_base => {
                        map.remove(&key);
                        tracing::info!(%key, "patched target, annotations now in sync");
                    }
                    Some(_) => {
                        tracing::debug!(%key, "entry coalesced again during flush, keeping newer changes");
                    }
                    None => {}
                }
            }
            Err(error) => {
                tracing::warn!(%key, %error, "patch failed, retaining entry for retry");
            }
        }
    }
}
