// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

//! Reads container state out of Kubernetes API objects.

use std::collections::BTreeMap;

use serde_json::Value;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::adapters::kube::manifest::{
    GPU_RESOURCE, JOB_NAME_LABEL, KIND_LABEL, MAIN_CONTAINER, TENANT_LABEL,
};
use crate::app::container::{
    ContainerDetailsInfo, ContainerEventInfo, ContainerStatus, JobKind, NodeInfo,
};

const ERROR_REASONS: &[&str] = &[
    "ErrImagePull",
    "ImagePullBackOff",
    "InvalidImageName",
    "CreateContainerConfigError",
    "CreateContainerError",
    "CrashLoopBackOff",
];

static NULL: Value = Value::Null;

/// Node label keys the cluster reads back into `NodeInfo`.
#[derive(Debug, Clone)]
pub struct NodeLabelKeys {
    pub partition: String,
    pub tensorboard_enabled: String,
    pub notebook_enabled: String,
}

pub fn pod_status(pod: &Value) -> ContainerStatus {
    if waiting_reason(pod).is_some_and(|reason| ERROR_REASONS.contains(&reason)) {
        return ContainerStatus::Error;
    }
    match pod["status"]["phase"].as_str() {
        Some("Pending") => ContainerStatus::Pending,
        Some("Running") => ContainerStatus::Running,
        Some("Succeeded") => ContainerStatus::Completed,
        Some("Failed") => ContainerStatus::Failed,
        _ => ContainerStatus::Unknown,
    }
}

/// Status of a job whose pods are gone or not yet created.
pub fn job_status(job: &Value) -> ContainerStatus {
    let status = &job["status"];
    if status["succeeded"].as_u64().unwrap_or(0) > 0 {
        ContainerStatus::Completed
    } else if status["failed"].as_u64().unwrap_or(0) > 0 {
        ContainerStatus::Failed
    } else {
        ContainerStatus::Pending
    }
}

/// Combines the pods of one job; a job normally has exactly one.
pub fn pods_status(pods: &[Value]) -> Option<ContainerStatus> {
    match pods {
        [] => None,
        [pod] => Some(pod_status(pod)),
        _ => Some(ContainerStatus::Multiple),
    }
}

pub fn pod_details(pod: &Value) -> ContainerDetailsInfo {
    let metadata = &pod["metadata"];
    let labels = &metadata["labels"];
    let name = labels[JOB_NAME_LABEL]
        .as_str()
        .or_else(|| metadata["name"].as_str())
        .unwrap_or_default();
    let limits = main_container(pod)
        .map(|container| &container["resources"]["limits"])
        .unwrap_or(&NULL);

    let mut details = ContainerDetailsInfo::with_status(name, pod_status(pod));
    details.tenant_name = metadata["namespace"]
        .as_str()
        .or_else(|| labels[TENANT_LABEL].as_str())
        .map(str::to_string);
    details.kind = labels[KIND_LABEL].as_str().and_then(JobKind::parse);
    details.host = string(&pod["status"]["hostIP"]);
    details.node_name = string(&pod["spec"]["nodeName"]);
    details.created_at = timestamp(&metadata["creationTimestamp"]);
    details.cpu = quantity(&limits["cpu"]);
    details.memory = quantity(&limits["memory"]);
    details.gpu = quantity(&limits[GPU_RESOURCE]);
    details.message = status_message(pod);
    details
}

pub fn pod_host(pod: &Value) -> Option<String> {
    string(&pod["status"]["hostIP"])
}

/// `(port name, node port)` pairs of a NodePort service.
pub fn node_ports(service: &Value) -> Vec<(String, u16)> {
    service["spec"]["ports"]
        .as_array()
        .map(|ports| {
            ports
                .iter()
                .filter_map(|port| {
                    let name = port["name"].as_str()?;
                    let node_port = u16::try_from(port["nodePort"].as_u64()?).ok()?;
                    Some((name.to_string(), node_port))
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Events about a job or its pods, keyed by the job name.
pub fn event_info(event: &Value) -> Option<ContainerEventInfo> {
    let involved = &event["involvedObject"];
    let name = involved["name"].as_str()?;
    let container_name = match involved["kind"].as_str() {
        Some("Pod") => pod_owner_name(name),
        _ => name.to_string(),
    };
    Some(ContainerEventInfo {
        container_name,
        reason: string(&event["reason"]),
        message: string(&event["message"]),
        is_error: event["type"].as_str() == Some("Warning"),
        first_at: timestamp(&event["firstTimestamp"])
            .or_else(|| timestamp(&event["eventTime"])),
        last_at: timestamp(&event["lastTimestamp"]),
    })
}

pub fn node_info(node: &Value, keys: &NodeLabelKeys) -> Option<NodeInfo> {
    let name = node["metadata"]["name"].as_str()?;
    let labels: BTreeMap<String, String> = node["metadata"]["labels"]
        .as_object()
        .map(|labels| {
            labels
                .iter()
                .filter_map(|(key, value)| Some((key.clone(), value.as_str()?.to_string())))
                .collect()
        })
        .unwrap_or_default();
    let allocatable = &node["status"]["allocatable"];
    Some(NodeInfo {
        name: name.to_string(),
        partition: labels.get(&keys.partition).cloned(),
        cpu: quantity(&allocatable["cpu"]),
        memory: quantity(&allocatable["memory"]),
        gpu: quantity(&allocatable[GPU_RESOURCE]),
        tensorboard_enabled: labels
            .get(&keys.tensorboard_enabled)
            .is_some_and(|value| value == "true"),
        notebook_enabled: labels
            .get(&keys.notebook_enabled)
            .is_some_and(|value| value == "true"),
        labels,
    })
}

/// Items of a list response.
pub fn items(list: &Value) -> &[Value] {
    list["items"].as_array().map(Vec::as_slice).unwrap_or(&[])
}

/// Pod names generated by the job controller carry a random suffix.
fn pod_owner_name(pod_name: &str) -> String {
    match pod_name.rsplit_once('-') {
        Some((owner, suffix)) if suffix.len() == 5 => owner.to_string(),
        _ => pod_name.to_string(),
    }
}

fn main_container(pod: &Value) -> Option<&Value> {
    pod["spec"]["containers"].as_array().and_then(|containers| {
        containers
            .iter()
            .find(|c| c["name"].as_str() == Some(MAIN_CONTAINER))
            .or_else(|| containers.first())
    })
}

fn waiting_reason(pod: &Value) -> Option<&str> {
    pod["status"]["containerStatuses"]
        .as_array()?
        .iter()
        .find_map(|status| status["state"]["waiting"]["reason"].as_str())
}

fn status_message(pod: &Value) -> Option<String> {
    let statuses = pod["status"]["containerStatuses"].as_array();
    statuses
        .and_then(|statuses| {
            statuses.iter().find_map(|status| {
                let state = &status["state"];
                string(&state["waiting"]["message"]).or_else(|| {
                    state["terminated"]["reason"]
                        .as_str()
                        .map(|reason| match state["terminated"]["exitCode"].as_i64() {
                            Some(code) => format!("{reason} (exit code {code})"),
                            None => reason.to_string(),
                        })
                })
            })
        })
        .or_else(|| string(&pod["status"]["message"]))
}

fn string(value: &Value) -> Option<String> {
    value.as_str().filter(|s| !s.is_empty()).map(str::to_string)
}

fn quantity(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn timestamp(value: &Value) -> Option<OffsetDateTime> {
    value
        .as_str()
        .and_then(|raw| OffsetDateTime::parse(raw, &Rfc3339).ok())
}
