// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use async_trait::async_trait;

use crate::app::errors::AppResult;
use crate::app::types::Tenant;

#[async_trait]
pub trait TenantStorePort: Send + Sync {
    async fn get_tenant(&self, id: i64) -> AppResult<Option<Tenant>>;
    async fn list_tenants(&self) -> AppResult<Vec<Tenant>>;
    async fn update_limits(
        &self,
        id: i64,
        cpu: Option<u32>,
        memory: Option<u32>,
        gpu: Option<u32>,
    ) -> AppResult<()>;
}

/// Registered compute nodes and which tenants may schedule on them.
#[async_trait]
pub trait NodeStorePort: Send + Sync {
    async fn accessible_node_names(&self, tenant_id: i64) -> AppResult<Vec<String>>;
    async fn all_node_names(&self) -> AppResult<Vec<String>>;
}
