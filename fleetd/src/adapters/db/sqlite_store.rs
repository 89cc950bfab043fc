// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::sync::Arc;

use async_trait::async_trait;

use crate::adapters::db::{FleetStore, FleetStoreError};
use crate::app::container::{ContainerStatus, JobKind};
use crate::app::errors::{AppError, AppErrorKind, AppResult, codes};
use crate::app::ports::{
    ClusterRegistryPort, JobHistoryPort, NodeStorePort, StatusUpdate, TenantStorePort,
    TensorBoardStorePort, UserStorePort,
};
use crate::app::types::{Cluster, ClusterInput, JobLocator, Tenant, TensorBoardContainer};

#[derive(Clone)]
pub struct SqliteStoreAdapter {
    store: Arc<FleetStore>,
}

impl SqliteStoreAdapter {
    pub fn new(store: FleetStore) -> Self {
        Self {
            store: Arc::new(store),
        }
    }

    pub fn store(&self) -> &FleetStore {
        &self.store
    }
}

/// Persistence errors become app errors here so the core never sees sqlx.
fn map_store_error(err: FleetStoreError) -> AppError {
    match err {
        FleetStoreError::EmptyName | FleetStoreError::EmptyKey => {
            AppError::new(AppErrorKind::InvalidArgument, codes::INVALID_ARGUMENT)
        }
        FleetStoreError::DuplicateKey(key) => AppError::with_message(
            AppErrorKind::AlreadyExists,
            codes::CONFLICT,
            format!("container key '{key}' is already used"),
        ),
        FleetStoreError::TenantNotFound(id) => AppError::with_message(
            AppErrorKind::NotFound,
            codes::NOT_FOUND,
            format!("tenant {id} not found"),
        ),
        FleetStoreError::UnknownKind(kind) => AppError::with_message(
            AppErrorKind::Internal,
            codes::INTERNAL_ERROR,
            format!("unknown job kind '{kind}' in store"),
        ),
        FleetStoreError::Sqlx(_) | FleetStoreError::Serde(_) | FleetStoreError::Timestamp(_) => {
            tracing::error!("store failure: {}", err);
            let message = match err {
                FleetStoreError::Sqlx(_) => "database query failed",
                FleetStoreError::Serde(_) => "stored job payload is unreadable",
                _ => "stored timestamp is unreadable",
            };
            AppError::with_message(AppErrorKind::Internal, codes::INTERNAL_ERROR, message)
        }
    }
}

#[async_trait]
impl ClusterRegistryPort for SqliteStoreAdapter {
    async fn get_cluster(&self, id: i64) -> AppResult<Option<Cluster>> {
        self.store.get_cluster(id).await.map_err(map_store_error)
    }

    async fn list_clusters(&self) -> AppResult<Vec<Cluster>> {
        self.store.list_clusters().await.map_err(map_store_error)
    }

    async fn accessible_clusters(&self, tenant_id: i64) -> AppResult<Vec<Cluster>> {
        self.store
            .accessible_clusters(tenant_id)
            .await
            .map_err(map_store_error)
    }

    async fn assigned_tenants(&self, cluster_id: i64) -> AppResult<Vec<Tenant>> {
        self.store
            .assigned_tenants(cluster_id)
            .await
            .map_err(map_store_error)
    }

    async fn insert_cluster(&self, input: &ClusterInput) -> AppResult<i64> {
        self.store
            .insert_cluster(input)
            .await
            .map_err(map_store_error)
    }

    async fn update_cluster(&self, id: i64, input: &ClusterInput) -> AppResult<()> {
        self.store
            .update_cluster(id, input)
            .await
            .map_err(map_store_error)
    }

    async fn delete_cluster(&self, id: i64) -> AppResult<bool> {
        self.store.delete_cluster(id).await.map_err(map_store_error)
    }
}

#[async_trait]
impl TenantStorePort for SqliteStoreAdapter {
    async fn get_tenant(&self, id: i64) -> AppResult<Option<Tenant>> {
        self.store.get_tenant(id).await.map_err(map_store_error)
    }

    async fn list_tenants(&self) -> AppResult<Vec<Tenant>> {
        self.store.list_tenants().await.map_err(map_store_error)
    }

    async fn update_limits(
        &self,
        id: i64,
        cpu: Option<u32>,
        memory: Option<u32>,
        gpu: Option<u32>,
    ) -> AppResult<()> {
        self.store
            .update_tenant_limits(id, cpu, memory, gpu)
            .await
            .map_err(map_store_error)
    }
}

#[async_trait]
impl NodeStorePort for SqliteStoreAdapter {
    async fn accessible_node_names(&self, tenant_id: i64) -> AppResult<Vec<String>> {
        self.store
            .accessible_node_names(tenant_id)
            .await
            .map_err(map_store_error)
    }

    async fn all_node_names(&self) -> AppResult<Vec<String>> {
        self.store.all_node_names().await.map_err(map_store_error)
    }
}

#[async_trait]
impl UserStorePort for SqliteStoreAdapter {
    async fn cluster_token(&self, user_id: i64, tenant_id: i64) -> AppResult<Option<String>> {
        self.store
            .cluster_token(user_id, tenant_id)
            .await
            .map_err(map_store_error)
    }

    async fn set_cluster_token(&self, user_id: i64, tenant_id: i64, token: &str) -> AppResult<()> {
        self.store
            .set_cluster_token(user_id, tenant_id, token)
            .await
            .map_err(map_store_error)
    }

    async fn clear_cluster_token(&self, user_id: i64, tenant_id: i64) -> AppResult<()> {
        self.store
            .clear_cluster_token(user_id, tenant_id)
            .await
            .map_err(map_store_error)
    }

    async fn set_alias(&self, user_id: i64, alias: &str) -> AppResult<()> {
        self.store
            .set_alias(user_id, alias)
            .await
            .map_err(map_store_error)
    }
}

#[async_trait]
impl JobHistoryPort for SqliteStoreAdapter {
    async fn locate(&self, key: &str) -> AppResult<Option<JobLocator>> {
        self.store.locate_job(key).await.map_err(map_store_error)
    }

    async fn update_status(
        &self,
        kind: JobKind,
        id: i64,
        tenant_id: i64,
        update: StatusUpdate,
        force: bool,
    ) -> AppResult<bool> {
        self.store
            .update_job_status(kind, id, tenant_id, update, force)
            .await
            .map_err(map_store_error)
    }
}

#[async_trait]
impl TensorBoardStorePort for SqliteStoreAdapter {
    async fn list_tensorboards(&self) -> AppResult<Vec<TensorBoardContainer>> {
        self.store.list_tensorboards().await.map_err(map_store_error)
    }

    async fn get_tensorboard(&self, id: i64) -> AppResult<Option<TensorBoardContainer>> {
        self.store.get_tensorboard(id).await.map_err(map_store_error)
    }

    async fn update_tensorboard_endpoint(
        &self,
        id: i64,
        host: &str,
        port: u16,
        status: ContainerStatus,
    ) -> AppResult<()> {
        self.store
            .update_tensorboard_endpoint(id, host, port, status)
            .await
            .map_err(map_store_error)
    }

    async fn update_tensorboard_status(
        &self,
        id: i64,
        tenant_id: i64,
        status: ContainerStatus,
        force: bool,
    ) -> AppResult<bool> {
        self.store
            .update_tensorboard_status(id, tenant_id, status, force)
            .await
            .map_err(map_store_error)
    }

    async fn delete_tensorboard(&self, id: i64) -> AppResult<bool> {
        self.store
            .delete_tensorboard(id)
            .await
            .map_err(map_store_error)
    }
}
