//! Pod-ownership resolution used by the Worker's readiness gate.
//!
//! `kubernetes.io/created-by` is a deprecated legacy annotation; a production
//! rewrite should walk `ownerReferences` on the pod instead (see DESIGN.md).
//! It is kept here because it is what the reference implementation this was
//! ported from actually relies on.

use k8s_openapi::api::apps::v1::ReplicaSet;
use k8s_openapi::api::core::v1::Pod;
use kube::api::ListParams;
use kube::{Api, Client};

use crate::error::ControllerError;
use crate::model::ResourceKind;

const CREATED_BY_ANNOTATION: &str = "kubernetes.io/created-by";

/// The workload a pod should be attributed to for ownership matching.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Reference {
    kind: String,
    name: String,
}

/// Resolves which (kind, name) pods are attributed to for this target.
///
/// For Deployments this walks ReplicaSets first, since pods are owned by
/// the ReplicaSet, not the Deployment directly. Returns `Ok(None)` if more
/// than one ReplicaSet with `status.replicas > 0` claims the Deployment
/// (a rollout in progress) — the caller should treat that as not-ready.
async fn resolve_reference(
    client: &Client,
    namespace: &str,
    name: &str,
    kind: ResourceKind,
) -> Result<Option<Reference>, ControllerError> {
    if kind != ResourceKind::Deployment {
        return Ok(Some(Reference {
            kind: kind.to_string(),
            name: name.to_string(),
        }));
    }

    let replicasets: Api<ReplicaSet> = Api::namespaced(client.clone(), namespace);
    let list = replicasets.list(&ListParams::default()).await?;

    let mut matches = list.items.into_iter().filter(|rs| {
        let has_replicas = rs.status.as_ref().map(|s| s.replicas).unwrap_or(0) > 0;
        let owned_by_target = rs
            .metadata
            .owner_references
            .iter()
            .flatten()
            .any(|owner| owner.kind == "Deployment" && owner.name == name);
        has_replicas && owned_by_target
    });

    let first = matches.next();
    if matches.next().is_some() {
        tracing::warn!(%namespace, %name, "too many ReplicaSets own this Deployment, rollout in progress");
        return Ok(None);
    }

    Ok(first.and_then(|rs| rs.metadata.name).map(|rs_name| Reference {
        kind: "ReplicaSet".to_string(),
        name: rs_name,
    }))
}

fn created_by_reference(pod: &Pod) -> Option<Reference> {
    let raw = pod.metadata.annotations.as_ref()?.get(CREATED_BY_ANNOTATION)?;
    let value: serde_json::Value = serde_json::from_str(raw).ok()?;
    let reference = value.get("reference")?;
    Some(Reference {
        kind: reference.get("kind")?.as_str()?.to_string(),
        name: reference.get("name")?.as_str()?.to_string(),
    })
}

async fn owned_pods(client: &Client, namespace: &str, reference: &Reference) -> Result<Vec<Pod>, ControllerError> {
    let pods: Api<Pod> = Api::namespaced(client.clone(), namespace);
    let list = pods.list(&ListParams::default()).await?;
    Ok(list
        .items
        .into_iter()
        .filter(|pod| created_by_reference(pod).as_ref() == Some(reference))
        .collect())
}

fn is_running(pod: &Pod) -> bool {
    pod.status.as_ref().and_then(|s| s.phase.as_deref()) == Some("Running")
}

/// The readiness gate: all of the target's currently owned pods must be
/// Running, and it must own at least one pod.
pub async fn is_ready(
    client: &Client,
    namespace: &str,
    name: &str,
    kind: ResourceKind,
) -> Result<bool, ControllerError> {
    let Some(reference) = resolve_reference(client, namespace, name, kind).await? else {
        return Ok(false);
    };

    let pods = owned_pods(client, namespace, &reference).await?;
    if pods.is_empty() {
        return Ok(false);
    }
    Ok(pods.iter().all(is_running))
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use std::collections::BTreeMap;

    fn pod_with_created_by(kind: &str, name: &str, phase: &str) -> Pod {
        let created_by = format!(r#"{{"reference":{{"kind":"{kind}","name":"{name}"}}}}"#);
        let mut annotations = BTreeMap::new();
        annotations.insert(CREATED_BY_ANNOTATION.to_string(), created_by);
        Pod {
            metadata: ObjectMeta {
                annotations: Some(annotations),
                ..Default::default()
            },
            status: Some(k8s_openapi::api::core::v1::PodStatus {
                phase: Some(phase.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn created_by_reference_parses_legacy_blob() {
        let pod = pod_with_created_by("ReplicaSet", "web-abc123", "Running");
        let reference = created_by_reference(&pod).unwrap();
        assert_eq!(reference.kind, "ReplicaSet");
        assert_eq!(reference.name, "web-abc123");
    }

    #[test]
    fn created_by_reference_missing_annotation_is_none() {
        let pod = Pod::default();
        assert!(created_by_reference(&pod).is_none());
    }

    #[test]
    fn is_running_checks_phase() {
        assert!(is_running(&pod_with_created_by("ReplicaSet", "x", "Running")));
        assert!(!is_running(&pod_with_created_by("ReplicaSet", "x", "Pending")));
    }
}
