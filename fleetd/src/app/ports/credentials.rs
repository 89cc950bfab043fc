// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use async_trait::async_trait;

use crate::app::errors::AppResult;
use crate::app::types::{GitEndpoint, RegistryMap, RequestContext};

#[async_trait]
pub trait GitCredentialPort: Send + Sync {
    /// `None` when the server is unknown or holds no usable credential.
    async fn pull_url(
        &self,
        git_id: i64,
        repository: &str,
        owner: &str,
    ) -> AppResult<Option<GitEndpoint>>;
}

#[async_trait]
pub trait RegistryMapPort: Send + Sync {
    async fn current_registry_map(
        &self,
        registry_id: i64,
        tenant_id: i64,
    ) -> AppResult<Option<RegistryMap>>;

    /// Base64 `user:password` for the registry, if credentials are set.
    fn docker_cfg_auth(&self, map: &RegistryMap) -> Option<String>;
}

/// Issues the short-lived token containers use to call back into the web server.
pub trait AccessTokenIssuerPort: Send + Sync {
    fn generate_access_token(&self, ctx: &RequestContext) -> String;
}
