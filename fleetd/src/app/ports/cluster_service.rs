// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::collections::HashMap;

use async_trait::async_trait;

use crate::app::container::{
    ClusterTarget, ContainerDetailsInfo, ContainerEndpointInfo, ContainerEventInfo,
    ContainerStatus, ExecRequest, JobKind, LogStream, NodeInfo, RegistryTokenSpec, RunOutcome,
    RunRequest, StatusResult,
};
use crate::app::errors::AppResult;
use crate::app::ports::DuplexChannel;

/// Orchestration API of one cluster, addressed by a resolved target.
///
/// Lookups report failures as a `ContainerStatus` (`Forbidden`, `Error`) rather than
/// an error. Tenant, user and registry registration must be idempotent.
#[async_trait]
pub trait ClusterServicePort: Send + Sync {
    /// `Err` carries the remote error text.
    async fn run_container(
        &self,
        target: &ClusterTarget,
        request: &RunRequest,
    ) -> Result<RunOutcome, String>;

    async fn container_status(
        &self,
        target: &ClusterTarget,
        name: &str,
        tenant_name: &str,
    ) -> ContainerStatus;

    async fn container_details(
        &self,
        target: &ClusterTarget,
        name: &str,
        tenant_name: &str,
    ) -> ContainerDetailsInfo;

    async fn container_endpoint(
        &self,
        target: &ClusterTarget,
        name: &str,
        tenant_name: &str,
    ) -> ContainerEndpointInfo;

    /// All job containers; every namespace when `tenant_name` is `None`.
    async fn list_container_details(
        &self,
        target: &ClusterTarget,
        tenant_name: Option<&str>,
    ) -> StatusResult<Vec<ContainerDetailsInfo>>;

    async fn delete_container(
        &self,
        target: &ClusterTarget,
        kind: JobKind,
        name: &str,
        tenant_name: &str,
    ) -> bool;

    async fn download_log(
        &self,
        target: &ClusterTarget,
        name: &str,
        tenant_name: &str,
    ) -> StatusResult<LogStream>;

    async fn events(
        &self,
        target: &ClusterTarget,
        tenant_name: &str,
    ) -> StatusResult<Vec<ContainerEventInfo>>;

    async fn all_nodes(
        &self,
        target: &ClusterTarget,
        known_names: &[String],
    ) -> Result<Vec<NodeInfo>, String>;

    /// Node name to label value for the registered nodes carrying `label_key`.
    async fn node_label_map(
        &self,
        target: &ClusterTarget,
        label_key: &str,
        known_names: &[String],
    ) -> Result<HashMap<String, String>, String>;

    /// An empty value removes the label.
    async fn set_node_label(
        &self,
        target: &ClusterTarget,
        node: &str,
        key: &str,
        value: &str,
    ) -> bool;

    /// Zero means unlimited.
    async fn set_quota(
        &self,
        target: &ClusterTarget,
        tenant_name: &str,
        cpu: u32,
        memory: u32,
        gpu: u32,
    ) -> bool;

    async fn register_tenant(&self, target: &ClusterTarget, tenant_name: &str) -> bool;

    async fn erase_tenant(&self, target: &ClusterTarget, tenant_name: &str) -> bool;

    /// Returns the user's token, creating the account if needed.
    async fn register_user(
        &self,
        target: &ClusterTarget,
        tenant_name: &str,
        user_name: &str,
    ) -> Option<String>;

    async fn register_registry_token(
        &self,
        target: &ClusterTarget,
        spec: &RegistryTokenSpec,
    ) -> bool;

    async fn open_exec(&self, request: &ExecRequest) -> AppResult<DuplexChannel>;
}
