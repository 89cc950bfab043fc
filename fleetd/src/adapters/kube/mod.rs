// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

pub mod client;
pub mod error;
pub mod manifest;
pub mod status;

pub use client::{KubeClientOptions, KubeClusterClient};
pub use error::KubeError;
