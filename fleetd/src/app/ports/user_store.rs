// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use async_trait::async_trait;

use crate::app::errors::AppResult;

/// Keyed store of per (user, tenant) cluster tokens plus user aliases.
#[async_trait]
pub trait UserStorePort: Send + Sync {
    async fn cluster_token(&self, user_id: i64, tenant_id: i64) -> AppResult<Option<String>>;
    async fn set_cluster_token(&self, user_id: i64, tenant_id: i64, token: &str) -> AppResult<()>;
    async fn clear_cluster_token(&self, user_id: i64, tenant_id: i64) -> AppResult<()>;
    async fn set_alias(&self, user_id: i64, alias: &str) -> AppResult<()>;
}
