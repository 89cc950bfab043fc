// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

pub mod endpoint;
pub mod env;
pub mod job_spec;
pub mod random;
