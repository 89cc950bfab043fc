// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use crate::app::types::{Cluster, ContainerSettings};

/// Where the credential for a call comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    /// The cluster's shared resource-manage key.
    ClusterKey(String),
    /// The on-prem admin key, for system work.
    AdminKey(String),
    /// A per (user, tenant) token that still has to be provisioned or read from cache.
    UserToken,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEndpoint {
    pub base_url: String,
    pub credential: CredentialSource,
}

/// Picks the base URL and credential source for a call.
pub fn resolve_endpoint(
    cluster: Option<&Cluster>,
    settings: &ContainerSettings,
    force: bool,
) -> ResolvedEndpoint {
    match cluster {
        Some(cluster) => ResolvedEndpoint {
            base_url: cluster.service_base_url(),
            credential: CredentialSource::ClusterKey(cluster.resource_manage_key.clone()),
        },
        None if force => ResolvedEndpoint {
            base_url: settings.service_base_url.clone(),
            credential: CredentialSource::AdminKey(settings.resource_manage_key.clone()),
        },
        None => ResolvedEndpoint {
            base_url: settings.service_base_url.clone(),
            credential: CredentialSource::UserToken,
        },
    }
}
