// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::sync::Arc;

use crate::app::container::ClusterTarget;
use crate::app::errors::{AppError, AppErrorKind, AppResult, codes};
use crate::app::ports::{
    AccessTokenIssuerPort, ClockPort, ClusterRegistryPort, ClusterServicePort, GitCredentialPort,
    JobHistoryPort, NodeStorePort, RegistryMapPort, TelemetryPort, TenantStorePort,
    TensorBoardStorePort, UserStorePort,
};
use crate::app::services::endpoint::{CredentialSource, resolve_endpoint};
use crate::app::types::{Cluster, ContainerSettings, RequestContext, Tenant};

mod clusters;
mod containers;
mod exec;
mod lifecycle;
mod nodes;
mod run;
mod tenancy;
mod tokens;

#[cfg(test)]
pub(crate) mod test_support;

pub use exec::BridgeOutcome;

#[derive(Clone)]
pub struct UseCases {
    pub(crate) clusters: Arc<dyn ClusterRegistryPort>,
    pub(crate) tenants: Arc<dyn TenantStorePort>,
    pub(crate) nodes: Arc<dyn NodeStorePort>,
    pub(crate) users: Arc<dyn UserStorePort>,
    pub(crate) jobs: Arc<dyn JobHistoryPort>,
    pub(crate) tensorboards: Arc<dyn TensorBoardStorePort>,
    pub(crate) remote: Arc<dyn ClusterServicePort>,
    pub(crate) git: Arc<dyn GitCredentialPort>,
    pub(crate) registries: Arc<dyn RegistryMapPort>,
    pub(crate) access_tokens: Arc<dyn AccessTokenIssuerPort>,
    pub(crate) clock: Arc<dyn ClockPort>,
    pub(crate) telemetry: Arc<dyn TelemetryPort>,
    pub(crate) settings: Arc<ContainerSettings>,
}

impl UseCases {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        clusters: Arc<dyn ClusterRegistryPort>,
        tenants: Arc<dyn TenantStorePort>,
        nodes: Arc<dyn NodeStorePort>,
        users: Arc<dyn UserStorePort>,
        jobs: Arc<dyn JobHistoryPort>,
        tensorboards: Arc<dyn TensorBoardStorePort>,
        remote: Arc<dyn ClusterServicePort>,
        git: Arc<dyn GitCredentialPort>,
        registries: Arc<dyn RegistryMapPort>,
        access_tokens: Arc<dyn AccessTokenIssuerPort>,
        clock: Arc<dyn ClockPort>,
        telemetry: Arc<dyn TelemetryPort>,
        settings: ContainerSettings,
    ) -> Self {
        Self {
            clusters,
            tenants,
            nodes,
            users,
            jobs,
            tensorboards,
            remote,
            git,
            registries,
            access_tokens,
            clock,
            telemetry,
            settings: Arc::new(settings),
        }
    }

    /// Target using the shared key: the cluster's own, or the on-prem admin key.
    pub(crate) fn admin_target(&self, cluster: Option<&Cluster>) -> ClusterTarget {
        let resolved = resolve_endpoint(cluster, &self.settings, true);
        let token = match resolved.credential {
            CredentialSource::ClusterKey(key) | CredentialSource::AdminKey(key) => key,
            CredentialSource::UserToken => self.settings.resource_manage_key.clone(),
        };
        ClusterTarget {
            base_url: resolved.base_url,
            token,
        }
    }

    /// Resolves the target for a call; `None` when no user token could be obtained.
    pub(crate) async fn resolve_target(
        &self,
        ctx: &RequestContext,
        cluster: Option<&Cluster>,
        force: bool,
    ) -> AppResult<Option<ResolvedTarget>> {
        let resolved = resolve_endpoint(cluster, &self.settings, force);
        match resolved.credential {
            CredentialSource::ClusterKey(token) | CredentialSource::AdminKey(token) => {
                Ok(Some(ResolvedTarget {
                    target: ClusterTarget {
                        base_url: resolved.base_url,
                        token,
                    },
                    user_scoped: false,
                }))
            }
            CredentialSource::UserToken => Ok(self
                .get_user_access_token(ctx, cluster)
                .await?
                .map(|token| ResolvedTarget {
                    target: ClusterTarget {
                        base_url: resolved.base_url,
                        token,
                    },
                    user_scoped: true,
                })),
        }
    }

    /// The cluster a job is pinned to, if the tenant may use it.
    pub(crate) async fn accessible_cluster(
        &self,
        tenant_id: i64,
        cluster_id: i64,
    ) -> AppResult<Cluster> {
        self.clusters
            .accessible_clusters(tenant_id)
            .await?
            .into_iter()
            .find(|cluster| cluster.id == cluster_id)
            .ok_or_else(|| {
                AppError::access_denied("Access denied. There is no cluster this tenant can use.")
            })
    }

    pub(crate) async fn require_tenant(&self, tenant_id: i64) -> AppResult<Tenant> {
        self.tenants.get_tenant(tenant_id).await?.ok_or_else(|| {
            AppError::with_message(
                AppErrorKind::NotFound,
                codes::NOT_FOUND,
                format!("tenant {tenant_id} not found"),
            )
        })
    }

    pub(crate) async fn require_cluster(&self, cluster_id: i64) -> AppResult<Cluster> {
        self.clusters.get_cluster(cluster_id).await?.ok_or_else(|| {
            AppError::with_message(
                AppErrorKind::NotFound,
                codes::NOT_FOUND,
                format!("cluster {cluster_id} not found"),
            )
        })
    }
}

pub(crate) struct ResolvedTarget {
    pub(crate) target: ClusterTarget,
    /// The token came from the per-user cache.
    pub(crate) user_scoped: bool,
}
