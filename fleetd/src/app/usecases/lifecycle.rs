// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use crate::app::container::{ContainerStatus, JobKind};
use crate::app::errors::{AppError, AppErrorKind, AppResult, codes};
use crate::app::ports::{StatusUpdate, TelemetryEvent};
use crate::app::services::job_spec::TENSORBOARD_PORT_NAME;
use crate::app::types::{JobRef, RequestContext, TensorBoardContainer};

use super::UseCases;

impl UseCases {
    /// Moves a job to a terminal status and removes its container.
    ///
    /// The local update is committed before any delete is attempted; a failed delete is
    /// only logged. Returns whether the history row was updated.
    #[tracing::instrument(
        name = "exit_job",
        skip(self, ctx, job),
        fields(kind = %job.kind(), key = job.key(), status = %status)
    )]
    pub async fn exit_job(
        &self,
        ctx: &RequestContext,
        job: JobRef<'_>,
        status: ContainerStatus,
        force: bool,
    ) -> AppResult<bool> {
        let kind = job.kind();
        let tenant = self.require_tenant(job.tenant_id()).await?;

        if !job.status().exists() {
            return self
                .jobs
                .update_status(
                    kind,
                    job.id(),
                    tenant.id,
                    StatusUpdate::status_only(status),
                    force,
                )
                .await;
        }

        let cluster = match job.cluster_id() {
            Some(cluster_id) => {
                let cluster = self.clusters.get_cluster(cluster_id).await?;
                if cluster.is_none() {
                    tracing::warn!(
                        "cluster {} of {} is gone; using the default pool",
                        cluster_id,
                        job.key()
                    );
                }
                cluster
            }
            None => None,
        };

        let info = self
            .container_details(ctx, job.key(), &tenant.name, cluster.as_ref(), force)
            .await?;
        let updated = self
            .jobs
            .update_status(
                kind,
                job.id(),
                tenant.id,
                StatusUpdate {
                    status,
                    started_at: info.created_at,
                    completed_at: Some(self.clock.now_utc()),
                },
                force,
            )
            .await?;

        if info.status.exists() {
            match self
                .delete_container(ctx, kind, job.key(), &tenant.name, cluster.as_ref(), force)
                .await
            {
                Ok(true) => {}
                Ok(false) => tracing::warn!(
                    "container {} of tenant {} was not deleted; leaving it for cleanup",
                    job.key(),
                    tenant.name
                ),
                Err(err) => tracing::warn!(
                    "container {} of tenant {} was not deleted: {}",
                    job.key(),
                    tenant.name,
                    err
                ),
            }
        }

        self.telemetry.event(
            "job.exit",
            TelemetryEvent {
                tenant: Some(tenant.name.clone()),
                cluster: cluster.map(|c| c.display_name),
                job_kind: Some(kind.as_str()),
                job_id: Some(job.id()),
                container: Some(job.key().to_string()),
                status: Some(status.name().to_string()),
            },
        );
        Ok(updated)
    }

    /// Reconciles one TensorBoard record with its container.
    ///
    /// Returns the observed status, or `ContainerStatus::None` when the record disappeared
    /// meanwhile. Records whose container is gone are deleted.
    #[tracing::instrument(
        name = "tensorboard_sync",
        level = "debug",
        skip(self, ctx, container),
        fields(id = container.id, name = %container.name)
    )]
    pub async fn sync_tensorboard_status(
        &self,
        ctx: &RequestContext,
        container: &TensorBoardContainer,
        force: bool,
    ) -> AppResult<ContainerStatus> {
        if container.name.trim().is_empty() {
            return Err(AppError::with_message(
                AppErrorKind::InvalidArgument,
                codes::INVALID_ARGUMENT,
                format!("tensorboard container {} has no name", container.id),
            ));
        }

        let host_known = container
            .host
            .as_deref()
            .is_some_and(|host| !host.is_empty());
        if !host_known {
            let info = self
                .container_endpoint(ctx, &container.name, &container.tenant_name, None, force)
                .await?;
            if let Some(end_point) = info.end_point(TENSORBOARD_PORT_NAME) {
                self.tensorboards
                    .update_tensorboard_endpoint(
                        container.id,
                        &end_point.host,
                        end_point.port,
                        info.status,
                    )
                    .await?;
                return Ok(info.status);
            }
        }

        let status = self
            .container_status(ctx, &container.name, &container.tenant_name, None, force)
            .await?;
        if !status.exists() {
            tracing::info!(
                "tensorboard container {} of tenant {} is {}; deleting record",
                container.name,
                container.tenant_name,
                status
            );
            self.tensorboards.delete_tensorboard(container.id).await?;
            self.telemetry.event(
                "tensorboard.sync",
                TelemetryEvent {
                    tenant: Some(container.tenant_name.clone()),
                    job_kind: Some(JobKind::TensorBoard.as_str()),
                    job_id: Some(container.id),
                    container: Some(container.name.clone()),
                    status: Some("deleted".to_string()),
                    ..TelemetryEvent::default()
                },
            );
            return Ok(status);
        }

        let updated = self
            .tensorboards
            .update_tensorboard_status(container.id, container.tenant_id, status, true)
            .await?;
        if updated {
            Ok(status)
        } else {
            tracing::debug!("tensorboard record {} vanished during sync", container.id);
            Ok(ContainerStatus::None)
        }
    }

    /// Background pass over every TensorBoard record; returns how many synced.
    pub async fn sync_all_tensorboards(&self) -> AppResult<usize> {
        let ctx = RequestContext::system();
        let mut synced = 0;
        for container in self.tensorboards.list_tensorboards().await? {
            match self.sync_tensorboard_status(&ctx, &container, true).await {
                Ok(_) => synced += 1,
                Err(err) => tracing::warn!(
                    "failed to sync tensorboard {} of tenant {}: {}",
                    container.name,
                    container.tenant_name,
                    err
                ),
            }
        }
        Ok(synced)
    }

    /// Deletes every TensorBoard container and record; returns the number removed remotely.
    ///
    /// Records are dropped even when the remote delete fails; any failure makes the
    /// whole call report `Unavailable`.
    #[tracing::instrument(name = "tensorboard_teardown", skip(self))]
    pub async fn delete_all_tensorboards(&self) -> AppResult<usize> {
        let ctx = RequestContext::system();
        let mut deleted = 0usize;
        let mut failed = 0usize;
        for container in self.tensorboards.list_tensorboards().await? {
            match self
                .delete_container(
                    &ctx,
                    JobKind::TensorBoard,
                    &container.name,
                    &container.tenant_name,
                    None,
                    true,
                )
                .await
            {
                Ok(true) => deleted += 1,
                Ok(false) => {
                    failed += 1;
                    tracing::error!(
                        "failed to delete tensorboard container {} of tenant {}",
                        container.name,
                        container.tenant_name
                    );
                }
                Err(err) => {
                    failed += 1;
                    tracing::error!(
                        "failed to delete tensorboard container {} of tenant {}: {}",
                        container.name,
                        container.tenant_name,
                        err
                    );
                }
            }
            self.tensorboards.delete_tensorboard(container.id).await?;
        }

        if failed > 0 {
            return Err(AppError::unavailable(format!(
                "failed to delete some tensorboard containers. deleted: {deleted}"
            )));
        }
        Ok(deleted)
    }
}
