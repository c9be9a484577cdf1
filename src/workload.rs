//! A uniform view over the four workload kinds the controller patches, so
//! the resolver in `watcher.rs` can scan them without repeating itself per
//! kind.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{PodTemplateSpec, ReplicationController};

use crate::model::{ConfigKind, ResourceKind};

pub trait Workload {
    const KIND: ResourceKind;

    fn namespace(&self) -> Option<&str>;
    fn name(&self) -> Option<&str>;
    fn annotations(&self) -> Option<&BTreeMap<String, String>>;
    fn pod_template(&self) -> Option<&PodTemplateSpec>;
}

macro_rules! impl_workload_nested_template {
    ($ty:ty, $kind:expr) => {
        impl Workload for $ty {
            const KIND: ResourceKind = $kind;

            fn namespace(&self) -> Option<&str> {
                self.metadata.namespace.as_deref()
            }
            fn name(&self) -> Option<&str> {
                self.metadata.name.as_deref()
            }
            fn annotations(&self) -> Option<&BTreeMap<String, String>> {
                self.metadata.annotations.as_ref()
            }
            fn pod_template(&self) -> Option<&PodTemplateSpec> {
                self.spec.as_ref().map(|s| &s.template)
            }
        }
    };
}

impl_workload_nested_template!(Deployment, ResourceKind::Deployment);
impl_workload_nested_template!(DaemonSet, ResourceKind::DaemonSet);
impl_workload_nested_template!(StatefulSet, ResourceKind::StatefulSet);

impl Workload for ReplicationController {
    const KIND: ResourceKind = ResourceKind::ReplicationController;

    fn namespace(&self) -> Option<&str> {
        self.metadata.namespace.as_deref()
    }
    fn name(&self) -> Option<&str> {
        self.metadata.name.as_deref()
    }
    fn annotations(&self) -> Option<&BTreeMap<String, String>> {
        self.metadata.annotations.as_ref()
    }
    fn pod_template(&self) -> Option<&PodTemplateSpec> {
        self.spec.as_ref().and_then(|s| s.template.as_ref())
    }
}

/// `true` iff some volume on the pod template references `cfg_name` as the
/// given `cfg_kind` (ConfigMap volume, or Secret volume).
pub fn matches_volume(template: &PodTemplateSpec, cfg_kind: ConfigKind, cfg_name: &str) -> bool {
    let Some(spec) = &template.spec else {
        return false;
    };
    let Some(volumes) = &spec.volumes else {
        return false;
    };

    volumes.iter().any(|volume| match cfg_kind {
        ConfigKind::ConfigMap => volume
            .config_map
            .as_ref()
            .and_then(|cm| cm.name.as_deref())
            .is_some_and(|n| n == cfg_name),
        ConfigKind::Secret => volume
            .secret
            .as_ref()
            .and_then(|s| s.secret_name.as_deref())
            .is_some_and(|n| n == cfg_name),
    })
}

/// `true` iff some container env entry references `secret_name` via
/// `valueFrom.secretKeyRef`. ConfigMap env refs are intentionally not
/// resolved, matching the documented assumption that ConfigMaps are
/// consumed only as volumes.
pub fn matches_secret_env(template: &PodTemplateSpec, secret_name: &str) -> bool {
    let Some(spec) = &template.spec else {
        return false;
    };
    spec.containers.iter().any(|container| {
        container.env.iter().flatten().any(|env| {
            env.value_from
                .as_ref()
                .and_then(|vf| vf.secret_key_ref.as_ref())
                .and_then(|r| r.name.as_deref())
                .is_some_and(|n| n == secret_name)
        })
    })
}

/// The combined volume/env match predicate for a given dependency.
pub fn workload_matches(template: &PodTemplateSpec, cfg_kind: ConfigKind, cfg_name: &str) -> bool {
    matches_volume(template, cfg_kind, cfg_name)
        || (cfg_kind == ConfigKind::Secret && matches_secret_env(template, cfg_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{
        Container, EnvVar, EnvVarSource, PodSpec, SecretKeySelector, SecretVolumeSource, Volume,
    };
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn template_with_volumes(volumes: Vec<Volume>) -> PodTemplateSpec {
        PodTemplateSpec {
            metadata: Some(ObjectMeta::default()),
            spec: Some(PodSpec {
                volumes: Some(volumes),
                containers: vec![Container {
                    name: "app".into(),
                    ..Default::default()
                }],
                ..Default::default()
            }),
        }
    }

    #[test]
    fn matches_secret_volume() {
        let template = template_with_volumes(vec![Volume {
            name: "creds".into(),
            secret: Some(SecretVolumeSource {
                secret_name: Some("api-key".into()),
                ..Default::default()
            }),
            ..Default::default()
        }]);
        assert!(matches_volume(&template, ConfigKind::Secret, "api-key"));
        assert!(!matches_volume(&template, ConfigKind::ConfigMap, "api-key"));
    }

    #[test]
    fn matches_secret_env_ref() {
        let template = PodTemplateSpec {
            metadata: Some(ObjectMeta::default()),
            spec: Some(PodSpec {
                containers: vec![Container {
                    name: "app".into(),
                    env: Some(vec![EnvVar {
                        name: "API_KEY".into(),
                        value_from: Some(EnvVarSource {
                            secret_key_ref: Some(SecretKeySelector {
                                name: Some("api-key".into()),
                                ..Default::default()
                            }),
                            ..Default::default()
                        }),
                        ..Default::default()
                    }]),
                    ..Default::default()
                }],
                ..Default::default()
            }),
        };
        assert!(matches_secret_env(&template, "api-key"));
        assert!(!workload_matches(&template, ConfigKind::ConfigMap, "api-key"));
        assert!(workload_matches(&template, ConfigKind::Secret, "api-key"));
    }

    #[test]
    fn configmap_env_refs_are_not_resolved() {
        // matches_secret_env only ever looks at secretKeyRef, so a ConfigMap
        // env ref can never match regardless of cfg_kind.
        let template = template_with_volumes(vec![]);
        assert!(!workload_matches(&template, ConfigKind::ConfigMap, "app-cfg"));
    }
}
