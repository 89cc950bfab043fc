// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use crate::app::container::{ContainerInfo, RunRequest};
use crate::app::errors::{AppError, AppResult};
use crate::app::ports::TelemetryEvent;
use crate::app::services::job_spec::{
    SpecInputs, build_run_request, build_tensorboard_request, exposed_port_name,
};
use crate::app::services::random::tensorboard_container_name;
use crate::app::types::{
    Cluster, DEFAULT_GIT_ID, GitEndpoint, ImageRef, JobRef, ModelRepository, RegistryMap,
    RequestContext, Tenant, TrainingHistory,
};

use super::{ResolvedTarget, UseCases};

fn token_denied() -> AppError {
    AppError::access_denied(
        "Access denied. Failed to get token to access the cluster management system.",
    )
}

impl UseCases {
    /// Submits a job to its cluster, or to the default pool when it has none.
    #[tracing::instrument(
        name = "run",
        skip(self, ctx, job),
        fields(kind = %job.kind(), key = job.key(), cluster = job.cluster_id())
    )]
    pub async fn run(&self, ctx: &RequestContext, job: JobRef<'_>) -> AppResult<ContainerInfo> {
        let tenant = ctx.tenant()?;
        let cluster = match job.cluster_id() {
            Some(cluster_id) => Some(self.accessible_cluster(tenant.id, cluster_id).await?),
            None => None,
        };

        let (image, model) = match job {
            JobRef::Preprocess(job) => (&job.preprocess.image, job.preprocess.model.as_ref()),
            JobRef::Training(job) => (&job.image, Some(&job.model)),
            JobRef::Inference(job) => (&job.image, Some(&job.model)),
            JobRef::Notebook(job) => (&job.image, job.model.as_ref()),
        };
        let inputs = SpecInputs {
            nodes: self.nodes.accessible_node_names(tenant.id).await?,
            registry: self.resolve_registry(tenant, image).await?,
            git: self.resolve_git(tenant, model).await?,
            callback_token: self.access_tokens.generate_access_token(ctx),
        };
        let request = build_run_request(job, tenant, &self.settings, &inputs)?;

        let resolved = self
            .resolve_target(ctx, cluster.as_ref(), false)
            .await?
            .ok_or_else(token_denied)?;
        self.submit(&resolved, &request, cluster.as_ref()).await
    }

    /// Starts a TensorBoard over a training's output on the default pool.
    #[tracing::instrument(
        name = "run_tensorboard",
        skip(self, ctx, training),
        fields(training = training.id)
    )]
    pub async fn run_tensorboard(
        &self,
        ctx: &RequestContext,
        training: &TrainingHistory,
    ) -> AppResult<ContainerInfo> {
        let tenant = ctx.tenant()?;
        let name = tensorboard_container_name(tenant.id, training.id, self.clock.now_utc());
        let inputs = SpecInputs {
            nodes: self.nodes.accessible_node_names(tenant.id).await?,
            callback_token: self.access_tokens.generate_access_token(ctx),
            ..SpecInputs::default()
        };
        let request = build_tensorboard_request(training, &name, tenant, &self.settings, &inputs)?;

        let resolved = self
            .resolve_target(ctx, None, false)
            .await?
            .ok_or_else(token_denied)?;
        self.submit(&resolved, &request, None).await
    }

    async fn submit(
        &self,
        resolved: &ResolvedTarget,
        request: &RunRequest,
        cluster: Option<&Cluster>,
    ) -> AppResult<ContainerInfo> {
        let mut event = TelemetryEvent {
            tenant: Some(request.tenant_name.clone()),
            cluster: cluster.map(|c| c.display_name.clone()),
            job_kind: Some(request.kind.as_str()),
            container: Some(request.name.clone()),
            ..TelemetryEvent::default()
        };
        let outcome = match self.remote.run_container(&resolved.target, request).await {
            Ok(outcome) => outcome,
            Err(message) => {
                tracing::warn!("run of {} failed: {}", request.name, message);
                event.status = Some("error".to_string());
                self.telemetry.event("container.run", event);
                return Err(AppError::remote(message));
            }
        };
        event.status = Some(outcome.status.name().to_string());
        self.telemetry.event("container.run", event);

        let port = exposed_port_name(request.kind).and_then(|port_name| {
            outcome
                .ports
                .iter()
                .find(|mapping| mapping.name == port_name)
                .and_then(|mapping| mapping.node_port)
        });
        Ok(ContainerInfo {
            name: outcome.name,
            status: outcome.status,
            host: outcome.host,
            port,
            configuration: outcome.configuration,
        })
    }

    async fn resolve_registry(
        &self,
        tenant: &Tenant,
        image: &ImageRef,
    ) -> AppResult<Option<RegistryMap>> {
        match image.registry_id {
            Some(registry_id) => {
                self.registries
                    .current_registry_map(registry_id, tenant.id)
                    .await
            }
            None => Ok(None),
        }
    }

    /// `-1` selects the tenant's default Git server.
    async fn resolve_git(
        &self,
        tenant: &Tenant,
        model: Option<&ModelRepository>,
    ) -> AppResult<Option<GitEndpoint>> {
        let Some(model) = model else {
            return Ok(None);
        };
        let git_id = if model.git_id == DEFAULT_GIT_ID {
            match tenant.default_git_id {
                Some(id) => id,
                None => return Ok(None),
            }
        } else {
            model.git_id
        };
        self.git.pull_url(git_id, &model.name, &model.owner).await
    }
}
