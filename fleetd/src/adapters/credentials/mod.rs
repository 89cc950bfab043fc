// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

pub mod static_providers;
pub mod token;

pub use static_providers::{StaticGitCredentials, StaticRegistryMaps};
pub use token::SignedTokenIssuer;
