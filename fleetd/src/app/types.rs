// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::app::container::{ContainerStatus, JobKind};
use crate::app::errors::{AppError, AppErrorKind, AppResult, codes};

/// Git id meaning "use the tenant's default repository server".
pub const DEFAULT_GIT_ID: i64 = -1;

/// An independently addressable orchestration endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    pub id: i64,
    pub display_name: String,
    pub host_name: String,
    pub port: u16,
    /// Shared bearer credential for admin-level calls.
    pub resource_manage_key: String,
    pub memo: Option<String>,
}

impl Cluster {
    pub fn service_base_url(&self) -> String {
        format!("https://{}:{}", self.host_name, self.port)
    }

    pub fn web_socket_uri(&self) -> String {
        format!("wss://{}:{}", self.host_name, self.port)
    }
}

/// Payload for creating or editing a cluster together with its tenant assignments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterInput {
    pub display_name: String,
    pub host_name: String,
    pub port: u16,
    pub resource_manage_key: String,
    pub memo: Option<String>,
    pub tenant_ids: Vec<i64>,
}

impl ClusterInput {
    pub fn validate(&self) -> AppResult<()> {
        if self.display_name.trim().is_empty() {
            return Err(AppError::with_message(
                AppErrorKind::InvalidArgument,
                codes::INVALID_ARGUMENT,
                "cluster display name must not be empty",
            ));
        }
        if self.host_name.trim().is_empty() {
            return Err(AppError::with_message(
                AppErrorKind::InvalidArgument,
                codes::INVALID_ARGUMENT,
                "cluster host name must not be empty",
            ));
        }
        if self.port == 0 {
            return Err(AppError::with_message(
                AppErrorKind::InvalidArgument,
                codes::INVALID_ARGUMENT,
                "cluster port must be between 1 and 65535",
            ));
        }
        let mut seen = BTreeSet::new();
        if let Some(duplicate) = self.tenant_ids.iter().find(|id| !seen.insert(**id)) {
            return Err(AppError::with_message(
                AppErrorKind::InvalidArgument,
                codes::INVALID_ARGUMENT,
                format!("tenant {duplicate} is assigned more than once"),
            ));
        }
        Ok(())
    }

    pub(crate) fn as_cluster(&self, id: i64) -> Cluster {
        Cluster {
            id,
            display_name: self.display_name.clone(),
            host_name: self.host_name.clone(),
            port: self.port,
            resource_manage_key: self.resource_manage_key.clone(),
            memo: self.memo.clone(),
        }
    }
}

/// NFS exports backing a tenant's job directories.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantStorage {
    pub nfs_server: String,
    pub training_output_path: String,
    pub training_attached_path: String,
    pub inference_output_path: String,
    pub inference_attached_path: String,
    pub notebook_output_path: String,
    pub notebook_attached_path: String,
    pub preprocess_attached_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: i64,
    pub name: String,
    pub display_name: String,
    /// Resource ceilings; `None` is unlimited.
    pub limit_cpu: Option<u32>,
    pub limit_memory: Option<u32>,
    pub limit_gpu: Option<u32>,
    pub default_git_id: Option<i64>,
    pub storage: TenantStorage,
}

/// Requested quota change for one tenant.
///
/// An omitted field keeps the stored ceiling; an explicit `0` clears it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QuotaInput {
    pub tenant_id: i64,
    pub cpu: Option<u32>,
    pub memory: Option<u32>,
    pub gpu: Option<u32>,
}

impl QuotaInput {
    pub(crate) fn apply(&self, tenant: &mut Tenant) {
        fn merge(current: Option<u32>, requested: Option<u32>) -> Option<u32> {
            match requested {
                None => current,
                Some(0) => None,
                Some(value) => Some(value),
            }
        }
        tenant.limit_cpu = merge(tenant.limit_cpu, self.cpu);
        tenant.limit_memory = merge(tenant.limit_memory, self.memory);
        tenant.limit_gpu = merge(tenant.limit_gpu, self.gpu);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
    pub id: i64,
    pub name: String,
    /// Stable name used when registering the user on a cluster.
    pub alias: Option<String>,
}

/// Caller identity passed explicitly into every operation.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub user: Option<UserIdentity>,
    pub tenant: Option<Tenant>,
}

impl RequestContext {
    /// Context for background work that only uses admin credentials.
    pub fn system() -> Self {
        Self::default()
    }

    pub fn for_user(user: UserIdentity, tenant: Tenant) -> Self {
        Self {
            user: Some(user),
            tenant: Some(tenant),
        }
    }

    pub fn user(&self) -> AppResult<&UserIdentity> {
        self.user
            .as_ref()
            .ok_or_else(|| AppError::access_denied("Access denied. No signed-in user."))
    }

    pub fn tenant(&self) -> AppResult<&Tenant> {
        self.tenant
            .as_ref()
            .ok_or_else(|| AppError::access_denied("Access denied. No tenant is selected."))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resources {
    pub cpu: u32,
    /// GiB
    pub memory: u32,
    pub gpu: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub registry_id: Option<i64>,
    pub image: String,
    pub tag: String,
}

impl ImageRef {
    pub fn literal(&self) -> String {
        format!("{}:{}", self.image, self.tag)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelRepository {
    /// `DEFAULT_GIT_ID` selects the tenant default.
    pub git_id: i64,
    pub name: String,
    pub owner: String,
    pub commit_id: Option<String>,
}

pub type JobOptions = BTreeMap<String, Option<String>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub id: i64,
    pub key: String,
    pub tenant_id: i64,
    pub image: ImageRef,
    pub model: ModelRepository,
    pub data_set_id: i64,
    pub parent_id: Option<i64>,
    pub entry_point: String,
    pub resources: Resources,
    pub partition: Option<String>,
    pub cluster_id: Option<i64>,
    pub options: JobOptions,
    pub zip: bool,
    pub status: ContainerStatus,
    pub started_at: Option<OffsetDateTime>,
    pub completed_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InferenceHistory {
    pub id: i64,
    pub key: String,
    pub tenant_id: i64,
    pub image: ImageRef,
    pub model: ModelRepository,
    pub data_set_id: i64,
    /// Training whose output is mounted read-only.
    pub parent_id: Option<i64>,
    pub entry_point: String,
    pub resources: Resources,
    pub partition: Option<String>,
    pub cluster_id: Option<i64>,
    pub options: JobOptions,
    pub zip: bool,
    pub status: ContainerStatus,
    pub started_at: Option<OffsetDateTime>,
    pub completed_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preprocessing {
    pub id: i64,
    pub name: String,
    pub image: ImageRef,
    pub model: Option<ModelRepository>,
    pub entry_point: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputData {
    pub id: i64,
    pub name: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreprocessHistory {
    pub id: i64,
    pub key: String,
    pub tenant_id: i64,
    pub preprocess: Preprocessing,
    pub input_data: InputData,
    pub resources: Resources,
    pub partition: Option<String>,
    pub cluster_id: Option<i64>,
    pub options: JobOptions,
    pub status: ContainerStatus,
    pub started_at: Option<OffsetDateTime>,
    pub completed_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotebookHistory {
    pub id: i64,
    pub key: String,
    pub tenant_id: i64,
    /// Without a registry the image is used as a literal `image:tag`.
    pub image: ImageRef,
    pub model: Option<ModelRepository>,
    pub data_set_id: Option<i64>,
    /// Hours; zero never expires.
    pub expires_in: u32,
    pub entry_point: String,
    pub resources: Resources,
    pub partition: Option<String>,
    pub cluster_id: Option<i64>,
    pub options: JobOptions,
    pub status: ContainerStatus,
    pub started_at: Option<OffsetDateTime>,
    pub completed_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TensorBoardContainer {
    pub id: i64,
    pub name: String,
    pub tenant_id: i64,
    pub tenant_name: String,
    pub training_history_id: i64,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub status: ContainerStatus,
    pub started_at: Option<OffsetDateTime>,
}

/// Borrowed view over the job histories that go through `run` and `exit_job`.
#[derive(Debug, Clone, Copy)]
pub enum JobRef<'a> {
    Preprocess(&'a PreprocessHistory),
    Training(&'a TrainingHistory),
    Inference(&'a InferenceHistory),
    Notebook(&'a NotebookHistory),
}

impl JobRef<'_> {
    pub fn kind(&self) -> JobKind {
        match self {
            JobRef::Preprocess(_) => JobKind::Preprocess,
            JobRef::Training(_) => JobKind::Training,
            JobRef::Inference(_) => JobKind::Inference,
            JobRef::Notebook(_) => JobKind::Notebook,
        }
    }

    pub fn id(&self) -> i64 {
        match self {
            JobRef::Preprocess(job) => job.id,
            JobRef::Training(job) => job.id,
            JobRef::Inference(job) => job.id,
            JobRef::Notebook(job) => job.id,
        }
    }

    pub fn key(&self) -> &str {
        match self {
            JobRef::Preprocess(job) => &job.key,
            JobRef::Training(job) => &job.key,
            JobRef::Inference(job) => &job.key,
            JobRef::Notebook(job) => &job.key,
        }
    }

    pub fn tenant_id(&self) -> i64 {
        match self {
            JobRef::Preprocess(job) => job.tenant_id,
            JobRef::Training(job) => job.tenant_id,
            JobRef::Inference(job) => job.tenant_id,
            JobRef::Notebook(job) => job.tenant_id,
        }
    }

    pub fn cluster_id(&self) -> Option<i64> {
        match self {
            JobRef::Preprocess(job) => job.cluster_id,
            JobRef::Training(job) => job.cluster_id,
            JobRef::Inference(job) => job.cluster_id,
            JobRef::Notebook(job) => job.cluster_id,
        }
    }

    pub fn status(&self) -> ContainerStatus {
        match self {
            JobRef::Preprocess(job) => job.status,
            JobRef::Training(job) => job.status,
            JobRef::Inference(job) => job.status,
            JobRef::Notebook(job) => job.status,
        }
    }
}

/// Where a container key lives, read from the persisted kind column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobLocator {
    pub kind: JobKind,
    pub id: i64,
    pub tenant_id: i64,
    pub cluster_id: Option<i64>,
}

/// Pull credentials resolved from a Git server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitEndpoint {
    /// Clone URL with credentials embedded.
    pub full_url: String,
    pub url: String,
    pub token: Option<String>,
}

/// A tenant's binding to a container registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryMap {
    pub registry_id: i64,
    pub tenant_id: i64,
    /// `host:port` of the registry; `None` for the public hub.
    pub registry_host: Option<String>,
    pub project: Option<String>,
    pub registry_token_name: String,
    pub user_name: Option<String>,
    pub password: Option<String>,
}

impl RegistryMap {
    pub fn image_path(&self, image: &str, tag: &str) -> String {
        match (&self.registry_host, &self.project) {
            (Some(host), Some(project)) => format!("{host}/{project}/{image}:{tag}"),
            (Some(host), None) => format!("{host}/{image}:{tag}"),
            (None, _) => format!("{image}:{tag}"),
        }
    }

    pub fn registry_url(&self) -> String {
        match &self.registry_host {
            Some(host) => format!("https://{host}"),
            None => "https://index.docker.io/v1/".to_string(),
        }
    }
}

/// Global settings for the default on-premise cluster and container contracts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSettings {
    pub service_base_url: String,
    pub kubernetes_host: String,
    pub kubernetes_port: u16,
    pub resource_manage_key: String,
    pub web_server_url: String,
    pub proxy: Option<String>,
    pub no_proxy: Option<String>,
    pub shell_columns: u32,
    pub cli_version: String,
    pub label_host_name: String,
    pub label_partition: String,
    pub label_tensorboard_enabled: String,
    pub label_notebook_enabled: String,
}

impl ContainerSettings {
    /// The configured on-prem control plane as a cluster record.
    pub fn default_cluster(&self) -> Cluster {
        Cluster {
            id: 0,
            display_name: "default".to_string(),
            host_name: self.kubernetes_host.clone(),
            port: self.kubernetes_port,
            resource_manage_key: self.resource_manage_key.clone(),
            memo: None,
        }
    }
}

impl Default for ContainerSettings {
    fn default() -> Self {
        Self {
            service_base_url: "https://localhost:6443".to_string(),
            kubernetes_host: "localhost".to_string(),
            kubernetes_port: 6443,
            resource_manage_key: String::new(),
            web_server_url: "http://localhost:5000".to_string(),
            proxy: None,
            no_proxy: None,
            shell_columns: 80,
            cli_version: "latest".to_string(),
            label_host_name: "kubernetes.io/hostname".to_string(),
            label_partition: "fleet.io/partition".to_string(),
            label_tensorboard_enabled: "fleet.io/tensorboard".to_string(),
            label_notebook_enabled: "fleet.io/notebook".to_string(),
        }
    }
}
