// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use crate::app::errors::{AppError, AppErrorKind, AppResult, codes};
use crate::app::ports::TelemetryEvent;
use crate::app::types::{Cluster, ClusterInput, Tenant};

use super::UseCases;

const NAMESPACE_FAILURE: &str = "Couldn't create cluster master namespace. Please check the configuration to the connect cluster manager service.";

impl UseCases {
    /// Provisions every requested tenant on the new cluster, then stores it.
    #[tracing::instrument(name = "create_cluster", skip(self, input), fields(host = %input.host_name))]
    pub async fn create_cluster(&self, input: &ClusterInput) -> AppResult<Cluster> {
        input.validate()?;
        let tenants = self.requested_tenants(input).await?;
        let candidate = input.as_cluster(0);
        for tenant in &tenants {
            if !self.register_tenant(&tenant.name, Some(&candidate)).await {
                return Err(AppError::unavailable(NAMESPACE_FAILURE));
            }
        }

        let id = self.clusters.insert_cluster(input).await?;
        tracing::info!("created cluster {} ({})", id, input.display_name);
        self.cluster_event("cluster.create", &input.display_name);
        Ok(input.as_cluster(id))
    }

    /// Replaces the cluster's connection and tenant assignments.
    ///
    /// Old tenants are erased with the old connection, new ones registered with the new
    /// one. If a registration or the stored update fails, the tenants registered so far are
    /// erased again, every old tenant is re-registered with the prior connection and the
    /// stored cluster stays untouched.
    #[tracing::instrument(name = "edit_cluster", skip(self, input))]
    pub async fn edit_cluster(&self, id: i64, input: &ClusterInput) -> AppResult<Cluster> {
        input.validate()?;
        let previous = self.require_cluster(id).await?;
        let requested = self.requested_tenants(input).await?;
        let old_tenants = self.clusters.assigned_tenants(id).await?;

        for tenant in &old_tenants {
            self.erase_tenant(&tenant.name, Some(&previous)).await;
        }

        let updated = input.as_cluster(id);
        let mut registered = Vec::with_capacity(requested.len());
        for tenant in &requested {
            if !self.register_tenant(&tenant.name, Some(&updated)).await {
                tracing::warn!(
                    "registering tenant {} on cluster {} failed; restoring previous assignments",
                    tenant.name,
                    id
                );
                self.restore_assignments(&registered, &updated, &old_tenants, &previous)
                    .await;
                return Err(AppError::unavailable(NAMESPACE_FAILURE));
            }
            registered.push(tenant);
        }

        if let Err(err) = self.clusters.update_cluster(id, input).await {
            tracing::warn!(
                "storing cluster {} failed: {}; restoring previous assignments",
                id,
                err
            );
            self.restore_assignments(&registered, &updated, &old_tenants, &previous)
                .await;
            return Err(AppError::unavailable(format!(
                "Couldn't update cluster {}: {}",
                previous.display_name,
                err.message()
            )));
        }
        self.cluster_event("cluster.edit", &input.display_name);
        Ok(updated)
    }

    async fn restore_assignments(
        &self,
        registered: &[&Tenant],
        updated: &Cluster,
        old_tenants: &[Tenant],
        previous: &Cluster,
    ) {
        for tenant in registered {
            self.erase_tenant(&tenant.name, Some(updated)).await;
        }
        for old in old_tenants {
            if !self.register_tenant(&old.name, Some(previous)).await {
                tracing::error!(
                    "failed to restore tenant {} on cluster {}",
                    old.name,
                    previous.display_name
                );
            }
        }
    }

    /// Deletes a cluster that no longer runs containers for its tenants.
    #[tracing::instrument(name = "delete_cluster", skip(self))]
    pub async fn delete_cluster(&self, id: i64) -> AppResult<()> {
        let cluster = self.require_cluster(id).await?;
        let tenants = self.clusters.assigned_tenants(id).await?;
        let admin = self.admin_target(Some(&cluster));

        let mut running = Vec::new();
        for tenant in &tenants {
            match self
                .remote
                .list_container_details(&admin, Some(&tenant.name))
                .await
            {
                Ok(containers) if !containers.is_empty() => running.push(format!(
                    "tenant name=[{}], running container count=[{}]",
                    tenant.name,
                    containers.len()
                )),
                Ok(_) => {}
                Err(status) => tracing::warn!(
                    "could not list containers of tenant {} on cluster {}: {}",
                    tenant.name,
                    cluster.display_name,
                    status
                ),
            }
        }
        if !running.is_empty() {
            return Err(AppError::with_message(
                AppErrorKind::Conflict,
                codes::CONFLICT,
                format!(
                    "Running containers exists deleting tenant. {}",
                    running.join(", ")
                ),
            ));
        }

        for tenant in &tenants {
            self.erase_tenant(&tenant.name, Some(&cluster)).await;
        }
        self.clusters.delete_cluster(id).await?;
        tracing::info!("deleted cluster {} ({})", id, cluster.display_name);
        self.cluster_event("cluster.delete", &cluster.display_name);
        Ok(())
    }

    async fn requested_tenants(&self, input: &ClusterInput) -> AppResult<Vec<Tenant>> {
        let mut tenants = Vec::with_capacity(input.tenant_ids.len());
        for tenant_id in &input.tenant_ids {
            tenants.push(self.require_tenant(*tenant_id).await?);
        }
        Ok(tenants)
    }

    fn cluster_event(&self, name: &'static str, display_name: &str) {
        self.telemetry.event(
            name,
            TelemetryEvent {
                cluster: Some(display_name.to_string()),
                ..TelemetryEvent::default()
            },
        );
    }
}
