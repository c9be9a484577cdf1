//! Pure helpers over the `opsguru.signature/` annotation schema. No I/O.

use std::collections::BTreeMap;

use crate::model::ConfigKind;
use serde_json::{Value, json};

const DOMAIN: &str = "opsguru.signature";
const SHOULD_UPDATE_KEY: &str = "opsguru.signature/should_update";
const SHOULD_UPDATE_VALUE: &str = "True";

/// `true` iff the workload's top-level annotations carry the opt-in signature.
pub fn has_signature(annotations: Option<&BTreeMap<String, String>>) -> bool {
    annotations
        .and_then(|ann| ann.get(SHOULD_UPDATE_KEY))
        .is_some_and(|v| v == SHOULD_UPDATE_VALUE)
}

/// `opsguru.signature/<cfg_kind>.<cfg_name>`.
pub fn version_annotation_key(cfg_kind: ConfigKind, cfg_name: &str) -> String {
    format!("{DOMAIN}/{cfg_kind}.{cfg_name}")
}

/// Reads the pod-template annotation recording the last-observed version of a dependency.
pub fn current_version(
    template_annotations: Option<&BTreeMap<String, String>>,
    cfg_kind: ConfigKind,
    cfg_name: &str,
) -> Option<String> {
    let key = version_annotation_key(cfg_kind, cfg_name);
    template_annotations.and_then(|ann| ann.get(&key).cloned())
}

/// Builds the strategic-merge patch body: `{spec:{template:{metadata:{annotations: changes}}}}`.
pub fn build_patch(changes: &BTreeMap<String, String>) -> Value {
    json!({
        "spec": {
            "template": {
                "metadata": {
                    "annotations": changes,
                }
            }
        }
    })
}
