// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

pub mod cli;
pub mod credentials;
pub mod db;
pub mod kube;
pub mod telemetry;
pub mod time;
pub mod ws;
