// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::collections::HashMap;

use crate::app::container::NodeInfo;
use crate::app::errors::{AppError, AppResult};

use super::UseCases;

impl UseCases {
    /// Registered nodes as seen by the default pool.
    pub async fn all_nodes(&self) -> AppResult<Vec<NodeInfo>> {
        let known = self.nodes.all_node_names().await?;
        let admin = self.admin_target(None);
        self.remote
            .all_nodes(&admin, &known)
            .await
            .map_err(AppError::remote)
    }

    /// Node name to partition for registered nodes that carry one.
    pub async fn node_partition_map(&self) -> AppResult<HashMap<String, String>> {
        let known = self.nodes.all_node_names().await?;
        let admin = self.admin_target(None);
        self.remote
            .node_label_map(&admin, &self.settings.label_partition, &known)
            .await
            .map_err(AppError::remote)
    }

    /// An empty partition removes the label.
    pub async fn update_partition_label(&self, node: &str, partition: &str) -> bool {
        self.set_label(node, &self.settings.label_partition, partition)
            .await
    }

    pub async fn update_tensorboard_enabled_label(&self, node: &str, enabled: bool) -> bool {
        self.set_label(
            node,
            &self.settings.label_tensorboard_enabled,
            flag_value(enabled),
        )
        .await
    }

    pub async fn update_notebook_enabled_label(&self, node: &str, enabled: bool) -> bool {
        self.set_label(
            node,
            &self.settings.label_notebook_enabled,
            flag_value(enabled),
        )
        .await
    }

    async fn set_label(&self, node: &str, key: &str, value: &str) -> bool {
        let admin = self.admin_target(None);
        let ok = self.remote.set_node_label(&admin, node, key, value).await;
        if !ok {
            tracing::warn!("failed to set label {}={:?} on node {}", key, value, node);
        }
        ok
    }
}

fn flag_value(enabled: bool) -> &'static str {
    if enabled { "true" } else { "" }
}
