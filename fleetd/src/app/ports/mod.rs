// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

pub mod clock;
pub mod cluster_registry;
pub mod cluster_service;
pub mod credentials;
pub mod exec_channel;
pub mod job_store;
pub mod telemetry;
pub mod tenant_store;
pub mod user_store;

pub use clock::ClockPort;
pub use cluster_registry::ClusterRegistryPort;
pub use cluster_service::ClusterServicePort;
pub use credentials::{AccessTokenIssuerPort, GitCredentialPort, RegistryMapPort};
pub use exec_channel::{
    CLOSE_INTERNAL_ERROR, CloseReason, DuplexChannel, ExecFrame, FrameSink, FrameSource,
};
pub use job_store::{JobHistoryPort, StatusUpdate, TensorBoardStorePort};
#[allow(unused_imports)]
pub use telemetry::{NoopTelemetry, TelemetryEvent, TelemetryPort};
pub use tenant_store::{NodeStorePort, TenantStorePort};
pub use user_store::UserStorePort;
