// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::collections::BTreeMap;

use crate::app::types::{ContainerSettings, JobOptions};

/// Three-tier container environment.
///
/// Editable defaults are overwritten by user options, which are overwritten by the
/// non-editable system set.
#[derive(Debug, Clone, Default)]
pub struct EnvLayers {
    editable: BTreeMap<String, String>,
    options: BTreeMap<String, String>,
    system: BTreeMap<String, String>,
}

impl EnvLayers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn editable(&mut self, key: &str, value: impl Into<String>) -> &mut Self {
        self.editable.insert(key.to_string(), value.into());
        self
    }

    /// Missing option values become empty strings.
    pub fn options(&mut self, options: &JobOptions) -> &mut Self {
        for (key, value) in options {
            self.options
                .insert(key.clone(), value.clone().unwrap_or_default());
        }
        self
    }

    pub fn system(&mut self, key: &str, value: impl Into<String>) -> &mut Self {
        self.system.insert(key.to_string(), value.into());
        self
    }

    pub fn merge(&self) -> BTreeMap<String, String> {
        let mut env = self.editable.clone();
        env.extend(self.options.clone());
        env.extend(self.system.clone());
        env
    }
}

/// Proxy variables in both spellings.
pub fn proxy_vars(settings: &ContainerSettings) -> Vec<(&'static str, String)> {
    let proxy = settings.proxy.clone().unwrap_or_default();
    let no_proxy = settings.no_proxy.clone().unwrap_or_default();
    vec![
        ("http_proxy", proxy.clone()),
        ("https_proxy", proxy.clone()),
        ("no_proxy", no_proxy.clone()),
        ("HTTP_PROXY", proxy.clone()),
        ("HTTPS_PROXY", proxy),
        ("NO_PROXY", no_proxy),
    ]
}

/// Variables every job gets and may not override.
pub fn common_system_vars(
    settings: &ContainerSettings,
    callback_token: &str,
) -> Vec<(&'static str, String)> {
    vec![
        ("FLEET_SERVER", settings.web_server_url.clone()),
        ("FLEET_TOKEN", callback_token.to_string()),
        ("PYTHONUNBUFFERED", "true".to_string()),
        ("LC_ALL", "C.UTF-8".to_string()),
        ("LANG", "C.UTF-8".to_string()),
    ]
}
