// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::app::container::{ContainerStatus, JobKind};
use crate::app::errors::AppResult;
use crate::app::types::{JobLocator, TensorBoardContainer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusUpdate {
    pub status: ContainerStatus,
    pub started_at: Option<OffsetDateTime>,
    pub completed_at: Option<OffsetDateTime>,
}

impl StatusUpdate {
    pub fn status_only(status: ContainerStatus) -> Self {
        Self {
            status,
            started_at: None,
            completed_at: None,
        }
    }
}

/// Job histories of every kind that runs through the orchestrator.
#[async_trait]
pub trait JobHistoryPort: Send + Sync {
    /// Looks a container key up by its persisted kind column.
    async fn locate(&self, key: &str) -> AppResult<Option<JobLocator>>;

    /// Returns false when no row matched. Without `force` the row must belong to `tenant_id`.
    async fn update_status(
        &self,
        kind: JobKind,
        id: i64,
        tenant_id: i64,
        update: StatusUpdate,
        force: bool,
    ) -> AppResult<bool>;
}

#[async_trait]
pub trait TensorBoardStorePort: Send + Sync {
    async fn list_tensorboards(&self) -> AppResult<Vec<TensorBoardContainer>>;
    async fn get_tensorboard(&self, id: i64) -> AppResult<Option<TensorBoardContainer>>;
    async fn update_tensorboard_endpoint(
        &self,
        id: i64,
        host: &str,
        port: u16,
        status: ContainerStatus,
    ) -> AppResult<()>;
    async fn update_tensorboard_status(
        &self,
        id: i64,
        tenant_id: i64,
        status: ContainerStatus,
        force: bool,
    ) -> AppResult<bool>;
    async fn delete_tensorboard(&self, id: i64) -> AppResult<bool>;
}
