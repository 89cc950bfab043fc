// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::collections::BTreeMap;
use std::fmt;
use std::pin::Pin;

use bytes::Bytes;
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Container state as reported by a cluster or stored on a job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContainerStatus {
    /// No container exists.
    #[default]
    None,
    Pending,
    Running,
    Completed,
    Closed,
    Failed,
    Killed,
    UserCanceled,
    /// The credential was rejected.
    Forbidden,
    /// The cluster could not be queried.
    Error,
    Unknown,
    Multiple,
}

impl ContainerStatus {
    pub fn name(self) -> &'static str {
        match self {
            ContainerStatus::None => "None",
            ContainerStatus::Pending => "Pending",
            ContainerStatus::Running => "Running",
            ContainerStatus::Completed => "Completed",
            ContainerStatus::Closed => "Closed",
            ContainerStatus::Failed => "Failed",
            ContainerStatus::Killed => "Killed",
            ContainerStatus::UserCanceled => "UserCanceled",
            ContainerStatus::Forbidden => "Forbidden",
            ContainerStatus::Error => "Error",
            ContainerStatus::Unknown => "Unknown",
            ContainerStatus::Multiple => "Multiple",
        }
    }

    /// Unrecognised names map to `Unknown`.
    pub fn parse(value: &str) -> Self {
        match value {
            "None" => ContainerStatus::None,
            "Pending" => ContainerStatus::Pending,
            "Running" => ContainerStatus::Running,
            "Completed" => ContainerStatus::Completed,
            "Closed" => ContainerStatus::Closed,
            "Failed" => ContainerStatus::Failed,
            "Killed" => ContainerStatus::Killed,
            "UserCanceled" => ContainerStatus::UserCanceled,
            "Forbidden" => ContainerStatus::Forbidden,
            "Error" => ContainerStatus::Error,
            "Multiple" => ContainerStatus::Multiple,
            _ => ContainerStatus::Unknown,
        }
    }

    /// Whether a remote container may still be present.
    pub fn exists(self) -> bool {
        !matches!(
            self,
            ContainerStatus::None
                | ContainerStatus::Closed
                | ContainerStatus::Killed
                | ContainerStatus::UserCanceled
        )
    }
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobKind {
    Preprocess,
    Training,
    Inference,
    Notebook,
    TensorBoard,
}

impl JobKind {
    pub fn as_str(self) -> &'static str {
        match self {
            JobKind::Preprocess => "preprocess",
            JobKind::Training => "training",
            JobKind::Inference => "inference",
            JobKind::Notebook => "notebook",
            JobKind::TensorBoard => "tensorboard",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "preprocess" => Some(JobKind::Preprocess),
            "training" => Some(JobKind::Training),
            "inference" => Some(JobKind::Inference),
            "notebook" => Some(JobKind::Notebook),
            "tensorboard" => Some(JobKind::TensorBoard),
            _ => None,
        }
    }

    /// Tag the cluster side uses to pick the container scripts.
    pub fn script_type(self) -> &'static str {
        match self {
            JobKind::Preprocess => "preproc",
            other => other.as_str(),
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NfsVolumeMount {
    pub name: String,
    pub mount_path: String,
    pub sub_path: Option<String>,
    pub server: String,
    pub server_path: String,
    pub read_only: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortMapping {
    pub name: String,
    pub protocol: String,
    pub port: u16,
    pub target_port: u16,
    /// Assigned by the cluster once the service exists.
    pub node_port: Option<u16>,
}

impl PortMapping {
    pub fn tcp(name: &str, port: u16) -> Self {
        Self {
            name: name.to_string(),
            protocol: "TCP".to_string(),
            port,
            target_port: port,
            node_port: None,
        }
    }
}

/// Canonical container-run request handed to a cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRequest {
    pub name: String,
    pub tenant_name: String,
    pub kind: JobKind,
    pub image: String,
    pub registry_token_name: Option<String>,
    pub script_type: String,
    pub entry_point: String,
    pub cpu: u32,
    pub memory: u32,
    pub gpu: u32,
    pub env: BTreeMap<String, String>,
    pub mounts: Vec<NfsVolumeMount>,
    /// Node label key to the accepted values.
    pub constraints: BTreeMap<String, Vec<String>>,
    pub ports: Vec<PortMapping>,
    pub shared_paths: BTreeMap<String, String>,
    pub log_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub name: String,
    pub status: ContainerStatus,
    pub host: Option<String>,
    pub ports: Vec<PortMapping>,
    pub configuration: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInfo {
    pub name: String,
    pub status: ContainerStatus,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub configuration: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerDetailsInfo {
    pub name: String,
    pub tenant_name: Option<String>,
    pub kind: Option<JobKind>,
    pub status: ContainerStatus,
    pub host: Option<String>,
    pub node_name: Option<String>,
    pub created_at: Option<OffsetDateTime>,
    pub cpu: Option<String>,
    pub memory: Option<String>,
    pub gpu: Option<String>,
    pub message: Option<String>,
}

impl ContainerDetailsInfo {
    pub fn with_status(name: &str, status: ContainerStatus) -> Self {
        Self {
            name: name.to_string(),
            tenant_name: None,
            kind: None,
            status,
            host: None,
            node_name: None,
            created_at: None,
            cpu: None,
            memory: None,
            gpu: None,
            message: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndPointInfo {
    pub key: String,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerEndpointInfo {
    pub status: ContainerStatus,
    pub end_points: Vec<EndPointInfo>,
}

impl ContainerEndpointInfo {
    pub fn with_status(status: ContainerStatus) -> Self {
        Self {
            status,
            end_points: Vec::new(),
        }
    }

    pub fn end_point(&self, key: &str) -> Option<&EndPointInfo> {
        self.end_points.iter().find(|ep| ep.key == key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerEventInfo {
    pub container_name: String,
    pub reason: Option<String>,
    pub message: Option<String>,
    pub is_error: bool,
    pub first_at: Option<OffsetDateTime>,
    pub last_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInfo {
    pub name: String,
    pub partition: Option<String>,
    pub labels: BTreeMap<String, String>,
    pub cpu: Option<String>,
    pub memory: Option<String>,
    pub gpu: Option<String>,
    pub tensorboard_enabled: bool,
    pub notebook_enabled: bool,
}

/// Docker credentials pushed into a tenant namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryTokenSpec {
    pub tenant_name: String,
    pub token_name: String,
    pub docker_cfg_auth: String,
    pub url: String,
}

/// Connection target after credential resolution.
#[derive(Clone, PartialEq, Eq)]
pub struct ClusterTarget {
    pub base_url: String,
    pub token: String,
}

impl fmt::Debug for ClusterTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterTarget")
            .field("base_url", &self.base_url)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Exec channel parameters for one container.
#[derive(Clone)]
pub struct ExecRequest {
    pub uri: String,
    pub token: String,
    pub tenant_name: String,
    pub job_name: String,
}

pub type LogStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send>>;

/// Remote reads that report a container status instead of a value on failure.
pub type StatusResult<T> = Result<T, ContainerStatus>;
