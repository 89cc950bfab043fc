// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use crate::app::container::RegistryTokenSpec;
use crate::app::errors::{AppError, AppErrorKind, AppResult, codes};
use crate::app::ports::TelemetryEvent;
use crate::app::types::{Cluster, QuotaInput, RegistryMap, Tenant};

use super::UseCases;

impl UseCases {
    /// Creates the tenant namespace; succeeds when it already exists.
    pub async fn register_tenant(&self, tenant_name: &str, cluster: Option<&Cluster>) -> bool {
        let admin = self.admin_target(cluster);
        let registered = self.remote.register_tenant(&admin, tenant_name).await;
        if !registered {
            tracing::warn!(
                "failed to register tenant {} on {}",
                tenant_name,
                admin.base_url
            );
        }
        self.telemetry.event(
            "tenant.register",
            TelemetryEvent {
                tenant: Some(tenant_name.to_string()),
                cluster: Some(admin.base_url),
                status: Some(if registered { "ok" } else { "failed" }.to_string()),
                ..TelemetryEvent::default()
            },
        );
        registered
    }

    /// Removes the tenant namespace; succeeds when it is already gone.
    pub async fn erase_tenant(&self, tenant_name: &str, cluster: Option<&Cluster>) -> bool {
        let admin = self.admin_target(cluster);
        let erased = self.remote.erase_tenant(&admin, tenant_name).await;
        if !erased {
            tracing::warn!(
                "failed to erase tenant {} on {}",
                tenant_name,
                admin.base_url
            );
        }
        erased
    }

    /// Pushes the tenant's stored limits to the default pool; unset limits go out as 0.
    pub async fn set_quota(&self, tenant: &Tenant) -> bool {
        let admin = self.admin_target(None);
        let applied = self
            .remote
            .set_quota(
                &admin,
                &tenant.name,
                tenant.limit_cpu.unwrap_or(0),
                tenant.limit_memory.unwrap_or(0),
                tenant.limit_gpu.unwrap_or(0),
            )
            .await;
        self.telemetry.event(
            "tenant.quota",
            TelemetryEvent {
                tenant: Some(tenant.name.clone()),
                status: Some(if applied { "applied" } else { "failed" }.to_string()),
                ..TelemetryEvent::default()
            },
        );
        applied
    }

    /// Commits each tenant's new limits, then pushes them to the cluster.
    ///
    /// Local values stay committed when a push fails; the failure is reported as
    /// `Unavailable` after every input has been processed.
    #[tracing::instrument(name = "update_quotas", skip(self, inputs), fields(count = inputs.len()))]
    pub async fn update_quotas(&self, inputs: &[QuotaInput]) -> AppResult<Vec<Tenant>> {
        let mut updated = Vec::with_capacity(inputs.len());
        let mut failed = Vec::new();
        for input in inputs {
            Self::check_quota(input)?;
            let mut tenant = self.require_tenant(input.tenant_id).await?;
            input.apply(&mut tenant);
            self.tenants
                .update_limits(
                    tenant.id,
                    tenant.limit_cpu,
                    tenant.limit_memory,
                    tenant.limit_gpu,
                )
                .await?;
            if !self.set_quota(&tenant).await {
                tracing::warn!("failed to push quota of tenant {}", tenant.name);
                failed.push(tenant.name.clone());
            }
            updated.push(tenant);
        }

        if !failed.is_empty() {
            return Err(AppError::unavailable(format!(
                "failed to apply quota to the cluster. tenants=[{}]",
                failed.join(", ")
            )));
        }
        Ok(updated)
    }

    /// Installs the registry pull secret in the tenant namespace of the default pool.
    ///
    /// `true` without a remote call when the registry needs no credentials.
    pub async fn register_registry_to_tenant(
        &self,
        tenant_name: &str,
        registry_map: Option<&RegistryMap>,
    ) -> bool {
        let Some(map) = registry_map else {
            return false;
        };
        if map.password.as_deref().is_none_or(str::is_empty) {
            return true;
        }
        let Some(docker_cfg_auth) = self.registries.docker_cfg_auth(map) else {
            tracing::warn!(
                "registry {} of tenant {} has no usable credentials",
                map.registry_id,
                tenant_name
            );
            return false;
        };

        let spec = RegistryTokenSpec {
            tenant_name: tenant_name.to_string(),
            token_name: map.registry_token_name.clone(),
            docker_cfg_auth,
            url: map.registry_url(),
        };
        let admin = self.admin_target(None);
        self.remote.register_registry_token(&admin, &spec).await
    }

    /// Validates a quota before it reaches the store.
    pub fn check_quota(input: &QuotaInput) -> AppResult<()> {
        if input.tenant_id <= 0 {
            return Err(AppError::with_message(
                AppErrorKind::InvalidArgument,
                codes::INVALID_ARGUMENT,
                "tenant id is required",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::usecases::test_support::{Harness, cluster, registry_map};

    #[tokio::test]
    async fn tenant_registration_is_idempotent() {
        let h = Harness::new();
        let uc = h.usecases();
        assert!(uc.register_tenant("acme", None).await);
        assert!(uc.register_tenant("acme", None).await);
        assert_eq!(h.remote.namespaces_on("https://onprem:6443"), vec!["acme"]);
    }

    #[tokio::test]
    async fn erase_tolerates_absent_tenant() {
        let h = Harness::new();
        let east = cluster(7, "east");
        assert!(h.usecases().erase_tenant("ghost", Some(&east)).await);
        assert_eq!(
            h.remote.calls(),
            vec!["erase_tenant ghost https://east:6443 east-key".to_string()]
        );
    }

    #[tokio::test]
    async fn zero_and_unset_limits_push_as_unlimited() {
        let h = Harness::new();
        h.tenants.with_limits(4, Some(8), Some(32), Some(2));
        let updated = h
            .usecases()
            .update_quotas(&[QuotaInput {
                tenant_id: 4,
                cpu: Some(0),
                memory: None,
                gpu: Some(3),
            }])
            .await
            .unwrap();
        assert_eq!(updated[0].limit_cpu, None);
        assert_eq!(updated[0].limit_memory, Some(32));
        assert_eq!(updated[0].limit_gpu, Some(3));
        assert_eq!(
            h.remote.calls(),
            vec!["set_quota acme 0 32 3 https://onprem:6443 admin-key".to_string()]
        );

        let tenant = h.tenants.get(4).unwrap();
        assert_eq!(tenant.limit_cpu, None);
        assert_eq!(tenant.limit_gpu, Some(3));
    }

    #[tokio::test]
    async fn unset_quota_pushes_zero() {
        let h = Harness::new();
        let tenant = h.tenants.get(4).unwrap();
        assert!(h.usecases().set_quota(&tenant).await);
        assert_eq!(
            h.remote.calls(),
            vec!["set_quota acme 0 0 0 https://onprem:6443 admin-key".to_string()]
        );
    }

    #[tokio::test]
    async fn failed_push_keeps_local_commit() {
        let h = Harness::new();
        *h.remote.quota_ok.lock().unwrap() = false;
        let err = h
            .usecases()
            .update_quotas(&[QuotaInput {
                tenant_id: 4,
                cpu: Some(16),
                memory: None,
                gpu: None,
            }])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), AppErrorKind::Unavailable);
        assert_eq!(h.tenants.get(4).unwrap().limit_cpu, Some(16));
    }

    #[tokio::test]
    async fn unknown_tenant_quota_is_not_found() {
        let h = Harness::new();
        let err = h
            .usecases()
            .update_quotas(&[QuotaInput {
                tenant_id: 404,
                ..QuotaInput::default()
            }])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), AppErrorKind::NotFound);
        assert!(h.remote.calls().is_empty());
    }

    #[tokio::test]
    async fn registry_token_rules() {
        let h = Harness::new();
        let uc = h.usecases();
        assert!(!uc.register_registry_to_tenant("acme", None).await);

        let mut open = registry_map();
        open.password = Some(String::new());
        assert!(uc.register_registry_to_tenant("acme", Some(&open)).await);
        assert!(h.remote.calls().is_empty());

        assert!(
            uc.register_registry_to_tenant("acme", Some(&registry_map()))
                .await
        );
        assert_eq!(
            h.remote.calls(),
            vec!["registry_token acme acme-registry-1 https://onprem:6443 admin-key".to_string()]
        );

        let mut anonymous = registry_map();
        anonymous.user_name = None;
        assert!(!uc.register_registry_to_tenant("acme", Some(&anonymous)).await);
    }

    #[test]
    fn quota_requires_tenant() {
        assert!(UseCases::check_quota(&QuotaInput::default()).is_err());
        assert!(
            UseCases::check_quota(&QuotaInput {
                tenant_id: 4,
                ..QuotaInput::default()
            })
            .is_ok()
        );
    }
}
