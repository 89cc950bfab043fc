// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use reqwest::StatusCode;
use thiserror::Error as ThisError;

use crate::app::container::ContainerStatus;
use crate::app::errors::AppError;

#[derive(Debug, ThisError)]
pub enum KubeError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{status}: {message}")]
    Api { status: StatusCode, message: String },
    #[error("unexpected response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("websocket: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("invalid uri {0}")]
    InvalidUri(String),
    #[error("no pod found for {0}")]
    NoPod(String),
}

impl KubeError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, KubeError::Api { status, .. } if *status == StatusCode::NOT_FOUND)
    }

    /// Status a failed lookup is reported as.
    pub fn as_status(&self) -> ContainerStatus {
        match self {
            KubeError::Api { status, .. }
                if *status == StatusCode::UNAUTHORIZED || *status == StatusCode::FORBIDDEN =>
            {
                ContainerStatus::Forbidden
            }
            KubeError::Api { status, .. } if *status == StatusCode::NOT_FOUND => {
                ContainerStatus::None
            }
            KubeError::NoPod(_) => ContainerStatus::None,
            _ => ContainerStatus::Error,
        }
    }

    /// Text handed back to callers; API failures keep the server's message.
    pub fn remote_message(&self) -> String {
        match self {
            KubeError::Api { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

pub fn map_kube_error(err: KubeError) -> AppError {
    AppError::remote(err.remote_message())
}
