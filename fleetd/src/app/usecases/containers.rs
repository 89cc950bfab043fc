// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use crate::app::container::{
    ContainerDetailsInfo, ContainerEndpointInfo, ContainerEventInfo, ContainerStatus, JobKind,
    LogStream, StatusResult,
};
use crate::app::errors::AppResult;
use crate::app::ports::TelemetryEvent;
use crate::app::types::{Cluster, RequestContext};

use super::UseCases;

impl UseCases {
    pub async fn container_status(
        &self,
        ctx: &RequestContext,
        name: &str,
        tenant_name: &str,
        cluster: Option<&Cluster>,
        force: bool,
    ) -> AppResult<ContainerStatus> {
        let Some(resolved) = self.resolve_target(ctx, cluster, force).await? else {
            return Ok(ContainerStatus::Forbidden);
        };
        let status = self
            .remote
            .container_status(&resolved.target, name, tenant_name)
            .await;
        self.note_status(ctx, &resolved, status).await?;
        Ok(status)
    }

    pub async fn container_details(
        &self,
        ctx: &RequestContext,
        name: &str,
        tenant_name: &str,
        cluster: Option<&Cluster>,
        force: bool,
    ) -> AppResult<ContainerDetailsInfo> {
        let Some(resolved) = self.resolve_target(ctx, cluster, force).await? else {
            return Ok(ContainerDetailsInfo::with_status(
                name,
                ContainerStatus::Forbidden,
            ));
        };
        let info = self
            .remote
            .container_details(&resolved.target, name, tenant_name)
            .await;
        self.note_status(ctx, &resolved, info.status).await?;
        Ok(info)
    }

    pub async fn container_endpoint(
        &self,
        ctx: &RequestContext,
        name: &str,
        tenant_name: &str,
        cluster: Option<&Cluster>,
        force: bool,
    ) -> AppResult<ContainerEndpointInfo> {
        let Some(resolved) = self.resolve_target(ctx, cluster, force).await? else {
            return Ok(ContainerEndpointInfo::with_status(
                ContainerStatus::Forbidden,
            ));
        };
        let info = self
            .remote
            .container_endpoint(&resolved.target, name, tenant_name)
            .await;
        self.note_status(ctx, &resolved, info.status).await?;
        Ok(info)
    }

    /// `false` when no credential was available or the cluster refused.
    pub async fn delete_container(
        &self,
        ctx: &RequestContext,
        kind: JobKind,
        name: &str,
        tenant_name: &str,
        cluster: Option<&Cluster>,
        force: bool,
    ) -> AppResult<bool> {
        let Some(resolved) = self.resolve_target(ctx, cluster, force).await? else {
            return Ok(false);
        };
        let deleted = self
            .remote
            .delete_container(&resolved.target, kind, name, tenant_name)
            .await;
        self.telemetry.event(
            "container.delete",
            TelemetryEvent {
                tenant: Some(tenant_name.to_string()),
                cluster: cluster.map(|c| c.display_name.clone()),
                job_kind: Some(kind.as_str()),
                container: Some(name.to_string()),
                status: Some(if deleted { "deleted" } else { "failed" }.to_string()),
                ..TelemetryEvent::default()
            },
        );
        Ok(deleted)
    }

    pub async fn download_log(
        &self,
        ctx: &RequestContext,
        name: &str,
        tenant_name: &str,
        cluster: Option<&Cluster>,
        force: bool,
    ) -> AppResult<StatusResult<LogStream>> {
        let Some(resolved) = self.resolve_target(ctx, cluster, force).await? else {
            return Ok(Err(ContainerStatus::Forbidden));
        };
        let log = self
            .remote
            .download_log(&resolved.target, name, tenant_name)
            .await;
        if let Err(status) = &log {
            self.note_status(ctx, &resolved, *status).await?;
        }
        Ok(log)
    }

    pub async fn events(
        &self,
        ctx: &RequestContext,
        tenant_name: &str,
        cluster: Option<&Cluster>,
        force: bool,
    ) -> AppResult<StatusResult<Vec<ContainerEventInfo>>> {
        let Some(resolved) = self.resolve_target(ctx, cluster, force).await? else {
            return Ok(Err(ContainerStatus::Forbidden));
        };
        let events = self.remote.events(&resolved.target, tenant_name).await;
        if let Err(status) = &events {
            self.note_status(ctx, &resolved, *status).await?;
        }
        Ok(events)
    }

    /// Events of one container, optionally only the error ones.
    pub async fn container_events(
        &self,
        ctx: &RequestContext,
        name: &str,
        tenant_name: &str,
        cluster: Option<&Cluster>,
        force: bool,
        error_only: bool,
    ) -> AppResult<StatusResult<Vec<ContainerEventInfo>>> {
        let events = self.events(ctx, tenant_name, cluster, force).await?;
        Ok(events.map(|events| {
            events
                .into_iter()
                .filter(|event| event.container_name == name && (!error_only || event.is_error))
                .collect()
        }))
    }

    /// Every job container on a cluster, read with the admin key.
    pub async fn list_container_details(
        &self,
        cluster: Option<&Cluster>,
    ) -> StatusResult<Vec<ContainerDetailsInfo>> {
        let admin = self.admin_target(cluster);
        self.remote.list_container_details(&admin, None).await
    }

    /// Job containers of the caller's tenant on the default pool.
    pub async fn list_tenant_container_details(
        &self,
        ctx: &RequestContext,
    ) -> AppResult<StatusResult<Vec<ContainerDetailsInfo>>> {
        let tenant = ctx.tenant()?;
        let Some(resolved) = self.resolve_target(ctx, None, false).await? else {
            return Ok(Err(ContainerStatus::Forbidden));
        };
        let containers = self
            .remote
            .list_container_details(&resolved.target, Some(&tenant.name))
            .await;
        if let Err(status) = &containers {
            self.note_status(ctx, &resolved, *status).await?;
        }
        Ok(containers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::usecases::test_support::{Harness, event, user_ctx};

    #[tokio::test]
    async fn forbidden_status_clears_cached_user_token() {
        let h = Harness::new();
        h.users.tokens.lock().unwrap().insert((1, 4), "stale".into());
        h.remote
            .statuses
            .lock()
            .unwrap()
            .insert("nb-1".into(), ContainerStatus::Forbidden);
        let status = h
            .usecases()
            .container_status(&user_ctx(Some("alias")), "nb-1", "acme", None, false)
            .await
            .unwrap();
        assert_eq!(status, ContainerStatus::Forbidden);
        assert!(h.users.tokens.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn forced_status_uses_admin_key_and_keeps_cache() {
        let h = Harness::new();
        h.users.tokens.lock().unwrap().insert((1, 4), "cached".into());
        h.remote
            .statuses
            .lock()
            .unwrap()
            .insert("nb-1".into(), ContainerStatus::Forbidden);
        h.usecases()
            .container_status(&user_ctx(Some("alias")), "nb-1", "acme", None, true)
            .await
            .unwrap();
        assert_eq!(
            h.remote.calls(),
            vec!["status nb-1 acme admin-key".to_string()]
        );
        assert_eq!(h.users.tokens.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_token_yields_forbidden_results() {
        let h = Harness::new();
        *h.remote.register_user_result.lock().unwrap() = None;
        let uc = h.usecases();
        let ctx = user_ctx(Some("alias"));
        let details = uc
            .container_details(&ctx, "nb-1", "acme", None, false)
            .await
            .unwrap();
        assert_eq!(details.status, ContainerStatus::Forbidden);
        let events = uc.events(&ctx, "acme", None, false).await.unwrap();
        assert_eq!(events.unwrap_err(), ContainerStatus::Forbidden);
        let log = uc.download_log(&ctx, "nb-1", "acme", None, false).await.unwrap();
        assert!(matches!(log, Err(ContainerStatus::Forbidden)));
        assert!(
            !uc.delete_container(&ctx, JobKind::Notebook, "nb-1", "acme", None, false)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn container_events_filter_by_name_and_error() {
        let h = Harness::new();
        *h.remote.events.lock().unwrap() = vec![
            event("train-1", false),
            event("train-1", true),
            event("train-2", true),
        ];
        let uc = h.usecases();
        let ctx = user_ctx(Some("alias"));
        let all = uc
            .container_events(&ctx, "train-1", "acme", None, true, false)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(all.len(), 2);
        let errors = uc
            .container_events(&ctx, "train-1", "acme", None, true, true)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].is_error);
    }
}
