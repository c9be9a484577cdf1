//! Watcher: a long-lived watch stream per source kind (ConfigMap, Secret)
//! that resolves reverse dependencies on every event and enqueues
//! [`WorkItem`]s.

use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoffBuilder;
use futures::StreamExt;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{ConfigMap, ReplicationController, Secret};
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Api, Client, ResourceExt};

use crate::annotator;
use crate::model::{ConfigKind, WorkItem};
use crate::workload::{workload_matches, Workload};

pub type WorkSender = tokio::sync::mpsc::UnboundedSender<WorkItem>;

const MIN_RECONNECT_BACKOFF: Duration = Duration::from_secs(1);
const MAX_RECONNECT_BACKOFF: Duration = Duration::from_secs(30);

/// Runs the ConfigMap watcher forever. Only ever returns if the process is
/// shutting down (it isn't spawned that way; it loops until the task is
/// aborted).
pub async fn watch_configmaps(client: Client, tx: WorkSender) {
    run_reconnect_loop(ConfigKind::ConfigMap, || {
        let client = client.clone();
        let tx = tx.clone();
        async move { stream_configmaps(client, tx).await }
    })
    .await;
}

pub async fn watch_secrets(client: Client, tx: WorkSender) {
    run_reconnect_loop(ConfigKind::Secret, || {
        let client = client.clone();
        let tx = tx.clone();
        async move { stream_secrets(client, tx).await }
    })
    .await;
}

/// The reconnect state machine: streaming while the stream yields events,
/// reconnecting with a growing backoff whenever it terminates or errors.
/// Restart is unconditional — we never try to replay missed events, since
/// the watcher's own initial-list-on-reconnect plus the resolver's version
/// check is what makes a replayed event a no-op.
async fn run_reconnect_loop<F, Fut>(kind: ConfigKind, mut make_stream: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = kube::runtime::watcher::Result<()>>,
{
    let mut backoff = ExponentialBackoffBuilder::new()
        .with_initial_interval(MIN_RECONNECT_BACKOFF)
        .with_max_interval(MAX_RECONNECT_BACKOFF)
        .with_max_elapsed_time(None)
        .build();

    loop {
        tracing::info!(%kind, "watch stream connecting");
        match make_stream().await {
            Ok(()) => {
                tracing::warn!(%kind, "watch stream ended without error, reconnecting");
            }
            Err(error) => {
                tracing::warn!(%kind, %error, "watch stream failed, reconnecting");
            }
        }

        let wait = backoff.next_backoff().unwrap_or(MAX_RECONNECT_BACKOFF);
        tokio::time::sleep(wait).await;
    }
}

async fn stream_configmaps(client: Client, tx: WorkSender) -> kube::runtime::watcher::Result<()> {
    let api: Api<ConfigMap> = Api::all(client.clone());
    let mut stream = watcher(api, watcher::Config::default())
        .default_backoff()
        .touched_objects()
        .boxed();

    while let Some(event) = stream.next().await {
        let obj = event?;
        let namespace = obj.namespace().unwrap_or_default();
        let name = obj.name_any();
        let version = obj.resource_version().unwrap_or_default();
        let client = client.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            if let Err(error) =
                resolve_dependents(&client, ConfigKind::ConfigMap, &namespace, &name, &version, &tx).await
            {
                tracing::warn!(%error, %namespace, %name, "resolving ConfigMap dependents failed");
            }
        });
    }
    Ok(())
}

async fn stream_secrets(client: Client, tx: WorkSender) -> kube::runtime::watcher::Result<()> {
    let api: Api<Secret> = Api::all(client.clone());
    let mut stream = watcher(api, watcher::Config::default())
        .default_backoff()
        .touched_objects()
        .boxed();

    while let Some(event) = stream.next().await {
        let obj = event?;
        let namespace = obj.namespace().unwrap_or_default();
        let name = obj.name_any();
        let version = obj.resource_version().unwrap_or_default();
        let client = client.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            if let Err(error) =
                resolve_dependents(&client, ConfigKind::Secret, &namespace, &name, &version, &tx).await
            {
                tracing::warn!(%error, %namespace, %name, "resolving Secret dependents failed");
            }
        });
    }
    Ok(())
}

/// The resolution algorithm: list the candidate workload kinds in the
/// event's namespace, match by volume (and, for Secrets, by env), then gate
/// each candidate through the Annotator before enqueueing a [`WorkItem`].
async fn resolve_dependents(
    client: &Client,
    cfg_kind: ConfigKind,
    namespace: &str,
    cfg_name: &str,
    cfg_version: &str,
    tx: &WorkSender,
) -> Result<(), kube::Error> {
    let deployments: Api<Deployment> = Api::namespaced(client.clone(), namespace);
    let daemonsets: Api<DaemonSet> = Api::namespaced(client.clone(), namespace);
    let replication_controllers: Api<ReplicationController> = Api::namespaced(client.clone(), namespace);
    let statefulsets: Api<StatefulSet> = Api::namespaced(client.clone(), namespace);

    let list_params = kube::api::ListParams::default();
    scan_and_enqueue(
        deployments.list(&list_params).await?.items,
        cfg_kind,
        cfg_name,
        cfg_version,
        tx,
    );
    scan_and_enqueue(
        daemonsets.list(&list_params).await?.items,
        cfg_kind,
        cfg_name,
        cfg_version,
        tx,
    );
    scan_and_enqueue(
        replication_controllers.list(&list_params).await?.items,
        cfg_kind,
        cfg_name,
        cfg_version,
        tx,
    );
    scan_and_enqueue(
        statefulsets.list(&list_params).await?.items,
        cfg_kind,
        cfg_name,
        cfg_version,
        tx,
    );

    Ok(())
}

fn scan_and_enqueue<K: Workload>(items: Vec<K>, cfg_kind: ConfigKind, cfg_name: &str, cfg_version: &str, tx: &WorkSender) {
    for candidate in &items {
        if let Some(item) = candidate_to_work_item(candidate, cfg_kind, cfg_name, cfg_version) {
            if tx.send(item).is_err() {
                tracing::warn!("work queue receiver dropped, discarding resolved item");
            }
        }
    }
}

/// One match per `(workload, event)` suffices: this returns at most one
/// [`WorkItem`] per candidate.
pub fn candidate_to_work_item<K: Workload>(
    candidate: &K,
    cfg_kind: ConfigKind,
    cfg_name: &str,
    cfg_version: &str,
) -> Option<WorkItem> {
    let template = candidate.pod_template()?;
    if !workload_matches(template, cfg_kind, cfg_name) {
        return None;
    }

    if !annotator::has_signature(candidate.annotations()) {
        return None;
    }

    let template_annotations = template.metadata.as_ref().and_then(|m| m.annotations.as_ref());
    if annotator::current_version(template_annotations, cfg_kind, cfg_name).as_deref() == Some(cfg_version) {
        return None;
    }

    Some(WorkItem {
        res_kind: K::KIND,
        res_namespace: candidate.namespace()?.to_string(),
        res_name: candidate.name()?.to_string(),
        cfg_kind,
        cfg_name: cfg_name.to_string(),
        cfg_version: cfg_version.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::apps::v1::DeploymentSpec;
    use k8s_openapi::api::core::v1::{Container, PodSpec, PodTemplateSpec, Volume};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use std::collections::BTreeMap;

    fn signed_deployment(name: &str, template_annotations: BTreeMap<String, String>) -> Deployment {
        let mut top_annotations = BTreeMap::new();
        top_annotations.insert("opsguru.signature/should_update".to_string(), "True".to_string());

        Deployment {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("default".to_string()),
                annotations: Some(top_annotations),
                ..Default::default()
            },
            spec: Some(DeploymentSpec {
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        annotations: Some(template_annotations),
                        ..Default::default()
                    }),
                    spec: Some(PodSpec {
                        volumes: Some(vec![Volume {
                            name: "cfg".into(),
                            config_map: Some(k8s_openapi::api::core::v1::ConfigMapVolumeSource {
                                name: Some("app-cfg".into()),
                                ..Default::default()
                            }),
                            ..Default::default()
                        }]),
                        containers: vec![Container {
                            name: "app".into(),
                            ..Default::default()
                        }],
                        ..Default::default()
                    }),
                },
                ..Default::default()
            }),
            status: None,
        }
    }

    #[test]
    fn enqueues_when_signed_and_version_changed() {
        let deployment = signed_deployment("web", BTreeMap::new());
        let item = candidate_to_work_item(&deployment, ConfigKind::ConfigMap, "app-cfg", "42");
        assert!(item.is_some());
        let item = item.unwrap();
        assert_eq!(item.res_name, "web");
        assert_eq!(item.cfg_version, "42");
    }

    #[test]
    fn skips_when_version_already_matches() {
        let mut template_annotations = BTreeMap::new();
        template_annotations.insert("opsguru.signature/ConfigMap.app-cfg".to_string(), "42".to_string());
        let deployment = signed_deployment("web", template_annotations);
        let item = candidate_to_work_item(&deployment, ConfigKind::ConfigMap, "app-cfg", "42");
        assert!(item.is_none());
    }

    #[test]
    fn skips_unmatched_dependency_name() {
        let deployment = signed_deployment("web", BTreeMap::new());
        let item = candidate_to_work_item(&deployment, ConfigKind::ConfigMap, "other-cfg", "1");
        assert!(item.is_none());
    }

    #[test]
    fn skips_missing_opt_in() {
        let mut deployment = signed_deployment("web", BTreeMap::new());
        deployment.metadata.annotations = None;
        let item = candidate_to_work_item(&deployment, ConfigKind::ConfigMap, "app-cfg", "42");
        assert!(item.is_none());
    }
}
