// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use crate::app::container::ContainerStatus;
use crate::app::errors::AppResult;
use crate::app::ports::TelemetryEvent;
use crate::app::services::random::generate_user_alias;
use crate::app::types::{Cluster, RequestContext};

use super::{ResolvedTarget, UseCases};

impl UseCases {
    /// Returns the caller's cluster token, provisioning the user on first use.
    ///
    /// `Ok(None)` means the cluster refused the registration; callers treat it as access denied.
    #[tracing::instrument(
        name = "user_token",
        level = "debug",
        skip(self, ctx, cluster),
        fields(cluster = cluster.map(|c| c.id))
    )]
    pub async fn get_user_access_token(
        &self,
        ctx: &RequestContext,
        cluster: Option<&Cluster>,
    ) -> AppResult<Option<String>> {
        let user = ctx.user()?;
        let tenant = ctx.tenant()?;
        if let Some(token) = self.users.cluster_token(user.id, tenant.id).await? {
            return Ok(Some(token));
        }

        let alias = match user.alias.as_deref().filter(|alias| !alias.is_empty()) {
            Some(alias) => alias.to_string(),
            None => {
                // Kept even if registration below fails.
                let alias = generate_user_alias();
                self.users.set_alias(user.id, &alias).await?;
                tracing::info!("Set alias {} to user {}", alias, user.name);
                alias
            }
        };

        let admin = self.admin_target(cluster);
        match self
            .remote
            .register_user(&admin, &tenant.name, &alias)
            .await
        {
            Some(token) => {
                self.users
                    .set_cluster_token(user.id, tenant.id, &token)
                    .await?;
                self.telemetry.event(
                    "user.register",
                    TelemetryEvent {
                        tenant: Some(tenant.name.clone()),
                        cluster: cluster.map(|c| c.display_name.clone()),
                        ..TelemetryEvent::default()
                    },
                );
                Ok(Some(token))
            }
            None => {
                tracing::warn!(
                    "failed to register user {} on tenant {}",
                    alias,
                    tenant.name
                );
                Ok(None)
            }
        }
    }

    /// Drops a cached user token the cluster no longer accepts.
    pub(crate) async fn note_status(
        &self,
        ctx: &RequestContext,
        resolved: &ResolvedTarget,
        status: ContainerStatus,
    ) -> AppResult<()> {
        if status != ContainerStatus::Forbidden || !resolved.user_scoped {
            return Ok(());
        }
        if let (Ok(user), Ok(tenant)) = (ctx.user(), ctx.tenant()) {
            tracing::info!(
                "cluster rejected token of user {} on tenant {}; clearing cache",
                user.name,
                tenant.name
            );
            self.users.clear_cluster_token(user.id, tenant.id).await?;
        }
        Ok(())
    }
}
