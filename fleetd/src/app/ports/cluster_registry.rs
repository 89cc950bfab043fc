// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use async_trait::async_trait;

use crate::app::errors::AppResult;
use crate::app::types::{Cluster, ClusterInput, Tenant};

/// Cluster records and their tenant assignments.
#[async_trait]
pub trait ClusterRegistryPort: Send + Sync {
    async fn get_cluster(&self, id: i64) -> AppResult<Option<Cluster>>;
    async fn list_clusters(&self) -> AppResult<Vec<Cluster>>;
    async fn accessible_clusters(&self, tenant_id: i64) -> AppResult<Vec<Cluster>>;
    async fn assigned_tenants(&self, cluster_id: i64) -> AppResult<Vec<Tenant>>;
    /// Inserts the cluster and its assignments in one transaction.
    async fn insert_cluster(&self, input: &ClusterInput) -> AppResult<i64>;
    /// Updates the row and replaces every assignment in one transaction.
    async fn update_cluster(&self, id: i64, input: &ClusterInput) -> AppResult<()>;
    async fn delete_cluster(&self, id: i64) -> AppResult<bool>;
}
