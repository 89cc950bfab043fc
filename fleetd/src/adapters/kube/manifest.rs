// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

//! Kubernetes object bodies for the calls the cluster client makes.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Map, Value, json};

use crate::app::container::{RegistryTokenSpec, RunRequest};

pub const KIND_LABEL: &str = "fleet.io/kind";
pub const TENANT_LABEL: &str = "fleet.io/tenant";
/// Label the job controller puts on every pod it creates.
pub const JOB_NAME_LABEL: &str = "job-name";
pub const QUOTA_NAME: &str = "fleet-quota";
pub const MAIN_CONTAINER: &str = "main";
pub const GPU_RESOURCE: &str = "nvidia.com/gpu";

const EXIT_CODE_FILE: &str = "/tmp/.fleet-exit-code";

/// A run-once batch job; failed pods are not retried.
pub fn job(request: &RunRequest) -> Value {
    let labels = labels(request);
    let mut pod_spec = json!({
        "restartPolicy": "Never",
        "containers": [main_container(request)],
        "volumes": volumes(request),
    });
    if let Some(affinity) = affinity(request) {
        pod_spec["affinity"] = affinity;
    }
    if let Some(secret) = &request.registry_token_name {
        pod_spec["imagePullSecrets"] = json!([{ "name": secret }]);
    }
    json!({
        "apiVersion": "batch/v1",
        "kind": "Job",
        "metadata": {
            "name": request.name,
            "namespace": request.tenant_name,
            "labels": labels,
        },
        "spec": {
            "backoffLimit": 0,
            "template": {
                "metadata": { "labels": labels },
                "spec": pod_spec,
            },
        },
    })
}

/// NodePort service exposing the request's ports, if it has any.
pub fn service(request: &RunRequest) -> Option<Value> {
    if request.ports.is_empty() {
        return None;
    }
    let ports: Vec<Value> = request
        .ports
        .iter()
        .map(|port| {
            json!({
                "name": port.name,
                "protocol": port.protocol,
                "port": port.port,
                "targetPort": port.target_port,
            })
        })
        .collect();
    Some(json!({
        "apiVersion": "v1",
        "kind": "Service",
        "metadata": {
            "name": request.name,
            "namespace": request.tenant_name,
            "labels": labels(request),
        },
        "spec": {
            "type": "NodePort",
            "selector": { JOB_NAME_LABEL: request.name },
            "ports": ports,
        },
    }))
}

/// The wrapped shell command; output is also appended to the log path.
pub fn entry_script(request: &RunRequest) -> String {
    match &request.log_path {
        Some(path) => format!(
            "mkdir -p \"$(dirname \"{path}\")\"; \
             ( ( {entry}; echo $? > {EXIT_CODE_FILE} ) 2>&1 | tee -a \"{path}\" ); \
             exit $(cat {EXIT_CODE_FILE})",
            entry = request.entry_point,
        ),
        None => request.entry_point.clone(),
    }
}

pub fn namespace(name: &str) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "Namespace",
        "metadata": { "name": name },
    })
}

/// Hard limits for the non-zero values; `None` when nothing is limited.
pub fn resource_quota(namespace: &str, cpu: u32, memory: u32, gpu: u32) -> Option<Value> {
    let mut hard = Map::new();
    if cpu > 0 {
        hard.insert("limits.cpu".into(), json!(cpu.to_string()));
    }
    if memory > 0 {
        hard.insert("limits.memory".into(), json!(format!("{memory}Gi")));
    }
    if gpu > 0 {
        hard.insert(format!("requests.{GPU_RESOURCE}"), json!(gpu.to_string()));
    }
    if hard.is_empty() {
        return None;
    }
    Some(json!({
        "apiVersion": "v1",
        "kind": "ResourceQuota",
        "metadata": { "name": QUOTA_NAME, "namespace": namespace },
        "spec": { "hard": hard },
    }))
}

pub fn service_account(namespace: &str, user: &str) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "ServiceAccount",
        "metadata": { "name": user, "namespace": namespace },
    })
}

/// Grants the built-in `edit` role inside the tenant namespace.
pub fn role_binding(namespace: &str, user: &str) -> Value {
    json!({
        "apiVersion": "rbac.authorization.k8s.io/v1",
        "kind": "RoleBinding",
        "metadata": { "name": format!("{user}-edit"), "namespace": namespace },
        "roleRef": {
            "apiGroup": "rbac.authorization.k8s.io",
            "kind": "ClusterRole",
            "name": "edit",
        },
        "subjects": [{ "kind": "ServiceAccount", "name": user, "namespace": namespace }],
    })
}

pub fn token_request(expiration_secs: u64) -> Value {
    json!({
        "apiVersion": "authentication.k8s.io/v1",
        "kind": "TokenRequest",
        "spec": { "expirationSeconds": expiration_secs },
    })
}

pub fn docker_secret(spec: &RegistryTokenSpec) -> Value {
    let config = json!({
        "auths": { spec.url.as_str(): { "auth": spec.docker_cfg_auth } },
    });
    json!({
        "apiVersion": "v1",
        "kind": "Secret",
        "type": "kubernetes.io/dockerconfigjson",
        "metadata": { "name": spec.token_name, "namespace": spec.tenant_name },
        "data": { ".dockerconfigjson": STANDARD.encode(config.to_string()) },
    })
}

/// Merge patch setting a node label; an empty value removes it.
pub fn label_patch(key: &str, value: &str) -> Value {
    let value = if value.is_empty() {
        Value::Null
    } else {
        json!(value)
    };
    let mut labels = Map::new();
    labels.insert(key.to_string(), value);
    json!({ "metadata": { "labels": labels } })
}

pub fn delete_options() -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "DeleteOptions",
        "propagationPolicy": "Background",
    })
}

fn labels(request: &RunRequest) -> Value {
    json!({
        KIND_LABEL: request.kind.as_str(),
        TENANT_LABEL: request.tenant_name,
        "fleet.io/script-type": request.script_type,
    })
}

fn main_container(request: &RunRequest) -> Value {
    let env: Vec<Value> = request
        .env
        .iter()
        .map(|(name, value)| json!({ "name": name, "value": value }))
        .collect();

    let mut limits = Map::new();
    limits.insert("cpu".into(), json!(request.cpu.to_string()));
    limits.insert("memory".into(), json!(format!("{}Gi", request.memory)));
    if request.gpu > 0 {
        limits.insert(GPU_RESOURCE.into(), json!(request.gpu.to_string()));
    }

    let mut mounts: Vec<Value> = request
        .mounts
        .iter()
        .map(|mount| {
            let mut value = json!({
                "name": mount.name,
                "mountPath": mount.mount_path,
                "readOnly": mount.read_only,
            });
            if let Some(sub_path) = &mount.sub_path {
                value["subPath"] = json!(sub_path);
            }
            value
        })
        .collect();
    for (key, path) in &request.shared_paths {
        mounts.push(json!({ "name": shared_volume_name(key), "mountPath": path }));
    }

    let ports: Vec<Value> = request
        .ports
        .iter()
        .map(|port| {
            json!({
                "name": port.name,
                "containerPort": port.target_port,
                "protocol": port.protocol,
            })
        })
        .collect();

    json!({
        "name": MAIN_CONTAINER,
        "image": request.image,
        "command": ["/bin/sh", "-c", entry_script(request)],
        "env": env,
        "resources": { "limits": limits.clone(), "requests": limits },
        "volumeMounts": mounts,
        "ports": ports,
        "tty": true,
        "stdin": true,
    })
}

fn volumes(request: &RunRequest) -> Vec<Value> {
    let mut volumes: Vec<Value> = request
        .mounts
        .iter()
        .map(|mount| {
            json!({
                "name": mount.name,
                "nfs": {
                    "server": mount.server,
                    "path": mount.server_path,
                    "readOnly": mount.read_only,
                },
            })
        })
        .collect();
    for key in request.shared_paths.keys() {
        volumes.push(json!({ "name": shared_volume_name(key), "emptyDir": {} }));
    }
    volumes
}

fn affinity(request: &RunRequest) -> Option<Value> {
    if request.constraints.is_empty() {
        return None;
    }
    let expressions: Vec<Value> = request
        .constraints
        .iter()
        .map(|(key, values)| json!({ "key": key, "operator": "In", "values": values }))
        .collect();
    Some(json!({
        "nodeAffinity": {
            "requiredDuringSchedulingIgnoredDuringExecution": {
                "nodeSelectorTerms": [{ "matchExpressions": expressions }],
            },
        },
    }))
}

fn shared_volume_name(key: &str) -> String {
    format!("shared-{key}")
}
