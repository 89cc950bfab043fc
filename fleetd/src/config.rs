// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use anyhow::{Context, Result};
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::app::types::ContainerSettings;

const APP_DIR_NAME: &str = "fleet";
const CONFIG_FILE_NAME: &str = "fleet.toml";
const CONFIG_ENV_VAR: &str = "FLEET_CONFIG_PATH";
const DATABASE_FILE_NAME: &str = "fleet.sqlite";
const DEFAULT_TENSORBOARD_SYNC_INTERVAL_SECS: u64 = 60;
const DEFAULT_PORT: u16 = 50070;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_TOKEN_TTL_SECS: u64 = 24 * 60 * 60;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    database_path: Option<String>,
    tensorboard_sync_interval_secs: Option<u64>,
    port: Option<u16>,
    verbose: Option<bool>,
    #[serde(default)]
    container: ContainerSection,
    #[serde(default)]
    token: TokenSection,
    #[serde(default)]
    git: Vec<GitServerConfig>,
    #[serde(default)]
    registry: Vec<RegistryConfig>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ContainerSection {
    service_base_url: Option<String>,
    kubernetes_host: Option<String>,
    kubernetes_port: Option<u16>,
    resource_manage_key: Option<String>,
    web_server_url: Option<String>,
    proxy: Option<String>,
    no_proxy: Option<String>,
    shell_columns: Option<u32>,
    cli_version: Option<String>,
    label_host_name: Option<String>,
    label_partition: Option<String>,
    label_tensorboard_enabled: Option<String>,
    label_notebook_enabled: Option<String>,
    accept_invalid_certs: Option<bool>,
    request_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TokenSection {
    secret: Option<String>,
    ttl_secs: Option<u64>,
}

/// A Git server jobs may pull model repositories from.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GitServerConfig {
    pub id: i64,
    /// Base URL such as `https://git.example.com`.
    pub url: String,
    pub user: Option<String>,
    pub token: Option<String>,
}

/// A container registry and the tenants bound to it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegistryConfig {
    pub id: i64,
    /// `host:port`; omitted for the public hub.
    pub host: Option<String>,
    pub project: Option<String>,
    pub tenant_ids: Vec<i64>,
    pub user_name: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug)]
pub struct Config {
    pub database_path: PathBuf,
    pub tensorboard_sync_interval_secs: u64,
    pub port: u16,
    pub verbose: bool,
    pub container: ContainerSettings,
    pub accept_invalid_certs: bool,
    pub request_timeout_secs: u64,
    /// `None` means a random secret is generated per process.
    pub token_secret: Option<String>,
    pub token_ttl_secs: u64,
    pub git: Vec<GitServerConfig>,
    pub registries: Vec<RegistryConfig>,
    #[allow(dead_code)]
    pub config_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    Override,
    Env,
    ConfigFile,
    Default,
}

impl ConfigSource {
    pub fn as_str(self) -> &'static str {
        match self {
            ConfigSource::Override => "override",
            ConfigSource::Env => "env",
            ConfigSource::ConfigFile => "config",
            ConfigSource::Default => "default",
        }
    }
}

#[derive(Debug)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

#[derive(Debug)]
pub struct ConfigReport {
    pub config_path: Option<PathBuf>,
    pub config_path_source: Option<ConfigSource>,
    pub config_file_present: bool,
    pub database_path: ConfigValue<PathBuf>,
    pub tensorboard_sync_interval_secs: ConfigValue<u64>,
    pub port: ConfigValue<u16>,
    pub verbose: ConfigValue<bool>,
    pub kubernetes_endpoint: String,
    pub git_servers: usize,
    pub registries: usize,
}

#[derive(Debug)]
pub struct LoadResult {
    pub config: Config,
    pub report: ConfigReport,
}

#[derive(Debug, Default)]
pub struct Overrides {
    pub database_path: Option<PathBuf>,
    pub tensorboard_sync_interval_secs: Option<u64>,
    pub port: Option<u16>,
    pub verbose: Option<bool>,
}

#[allow(dead_code)]
pub fn load(config_path_override: Option<PathBuf>, overrides: Overrides) -> Result<Config> {
    Ok(load_with_report(config_path_override, overrides)?.config)
}

pub fn load_with_report(
    config_path_override: Option<PathBuf>,
    overrides: Overrides,
) -> Result<LoadResult> {
    let (config_path, config_path_source, required) = match config_path_override {
        Some(path) => (Some(expand_path(path)), Some(ConfigSource::Override), true),
        None => match config_path_from_env()? {
            Some(path) => (Some(expand_path(path)), Some(ConfigSource::Env), true),
            None => match default_config_path().ok() {
                Some(path) => (Some(path), Some(ConfigSource::Default), false),
                None => (None, None, false),
            },
        },
    };
    let config_file_present = config_path
        .as_deref()
        .map(|path| path.exists())
        .unwrap_or(false);

    let file_config = match config_path.as_deref() {
        Some(path) => read_config_file(path, required)?,
        None => FileConfig::default(),
    };

    let (database_path, database_source) = match overrides.database_path {
        Some(path) => (expand_path(path), ConfigSource::Override),
        None => match file_config.database_path {
            Some(raw) => (
                resolve_path(
                    &raw,
                    config_path.as_deref().and_then(|path| path.parent()),
                ),
                ConfigSource::ConfigFile,
            ),
            None => (
                default_database_path().with_context(|| {
                    "failed to resolve default database path; specify --database-path or set database_path in the config file"
                })?,
                ConfigSource::Default,
            ),
        },
    };

    let (port, port_source) = match overrides.port {
        Some(port) => (port, ConfigSource::Override),
        None => match file_config.port {
            Some(port) => (port, ConfigSource::ConfigFile),
            None => (DEFAULT_PORT, ConfigSource::Default),
        },
    };
    if port == 0 {
        anyhow::bail!("port must be between 1 and 65535");
    }
    let (verbose, verbose_source) = match overrides.verbose {
        Some(verbose) => (verbose, ConfigSource::Override),
        None => match file_config.verbose {
            Some(verbose) => (verbose, ConfigSource::ConfigFile),
            None => (false, ConfigSource::Default),
        },
    };

    let (tensorboard_sync_interval_secs, sync_interval_source) =
        match overrides.tensorboard_sync_interval_secs {
            Some(secs) => (secs, ConfigSource::Override),
            None => match file_config.tensorboard_sync_interval_secs {
                Some(secs) => (secs, ConfigSource::ConfigFile),
                None => (DEFAULT_TENSORBOARD_SYNC_INTERVAL_SECS, ConfigSource::Default),
            },
        };
    if tensorboard_sync_interval_secs == 0 {
        anyhow::bail!("tensorboard_sync_interval_secs must be greater than zero");
    }

    let section = file_config.container;
    let accept_invalid_certs = section.accept_invalid_certs.unwrap_or(false);
    let request_timeout_secs = section
        .request_timeout_secs
        .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS);
    let container = container_settings(section)?;
    validate_credentials(&file_config.git, &file_config.registry)?;

    let config = Config {
        database_path,
        tensorboard_sync_interval_secs,
        port,
        verbose,
        accept_invalid_certs,
        request_timeout_secs,
        token_secret: file_config.token.secret.filter(|s| !s.is_empty()),
        token_ttl_secs: file_config.token.ttl_secs.unwrap_or(DEFAULT_TOKEN_TTL_SECS),
        git: file_config.git,
        registries: file_config.registry,
        container,
        config_path: config_path.clone(),
    };

    let report = ConfigReport {
        config_path,
        config_path_source,
        config_file_present,
        database_path: ConfigValue {
            value: config.database_path.clone(),
            source: database_source,
        },
        tensorboard_sync_interval_secs: ConfigValue {
            value: config.tensorboard_sync_interval_secs,
            source: sync_interval_source,
        },
        port: ConfigValue {
            value: config.port,
            source: port_source,
        },
        verbose: ConfigValue {
            value: config.verbose,
            source: verbose_source,
        },
        kubernetes_endpoint: config.container.service_base_url.clone(),
        git_servers: config.git.len(),
        registries: config.registries.len(),
    };

    Ok(LoadResult { config, report })
}

pub fn ensure_database_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create database directory {}", parent.display()))?;
    }
    Ok(())
}

/// Fills the container settings from the `[container]` section over the defaults.
fn container_settings(section: ContainerSection) -> Result<ContainerSettings> {
    let defaults = ContainerSettings::default();
    let kubernetes_host = section
        .kubernetes_host
        .unwrap_or(defaults.kubernetes_host);
    let kubernetes_port = section
        .kubernetes_port
        .unwrap_or(defaults.kubernetes_port);
    if kubernetes_port == 0 {
        anyhow::bail!("container.kubernetes_port must be between 1 and 65535");
    }
    let service_base_url = section
        .service_base_url
        .unwrap_or_else(|| format!("https://{kubernetes_host}:{kubernetes_port}"));
    Ok(ContainerSettings {
        service_base_url: service_base_url.trim_end_matches('/').to_string(),
        kubernetes_host,
        kubernetes_port,
        resource_manage_key: section
            .resource_manage_key
            .unwrap_or(defaults.resource_manage_key),
        web_server_url: section.web_server_url.unwrap_or(defaults.web_server_url),
        proxy: section.proxy.filter(|value| !value.is_empty()),
        no_proxy: section.no_proxy.filter(|value| !value.is_empty()),
        shell_columns: section.shell_columns.unwrap_or(defaults.shell_columns),
        cli_version: section.cli_version.unwrap_or(defaults.cli_version),
        label_host_name: section.label_host_name.unwrap_or(defaults.label_host_name),
        label_partition: section.label_partition.unwrap_or(defaults.label_partition),
        label_tensorboard_enabled: section
            .label_tensorboard_enabled
            .unwrap_or(defaults.label_tensorboard_enabled),
        label_notebook_enabled: section
            .label_notebook_enabled
            .unwrap_or(defaults.label_notebook_enabled),
    })
}

fn validate_credentials(git: &[GitServerConfig], registries: &[RegistryConfig]) -> Result<()> {
    let mut git_ids: Vec<i64> = git.iter().map(|server| server.id).collect();
    git_ids.sort_unstable();
    if let Some(pair) = git_ids.windows(2).find(|pair| pair[0] == pair[1]) {
        anyhow::bail!("duplicate git server id {}", pair[0]);
    }
    let mut registry_ids: Vec<i64> = registries.iter().map(|registry| registry.id).collect();
    registry_ids.sort_unstable();
    if let Some(pair) = registry_ids.windows(2).find(|pair| pair[0] == pair[1]) {
        anyhow::bail!("duplicate registry id {}", pair[0]);
    }
    Ok(())
}

fn read_config_file(path: &Path, required: bool) -> Result<FileConfig> {
    if !path.exists() {
        if required {
            anyhow::bail!("config file not found at {}", path.display());
        }
        return Ok(FileConfig::default());
    }

    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    toml::from_str(&contents)
        .with_context(|| format!("failed to parse config file {}", path.display()))
}

fn resolve_path(raw: &str, base_dir: Option<&Path>) -> PathBuf {
    let expanded = shellexpand::tilde(raw);
    let path = PathBuf::from(expanded.as_ref());
    if path.is_absolute() {
        return path;
    }
    match base_dir {
        Some(dir) => dir.join(path),
        None => path,
    }
}

fn expand_path(path: PathBuf) -> PathBuf {
    let path_string = path.to_string_lossy().to_string();
    let expanded = shellexpand::tilde(&path_string);
    PathBuf::from(expanded.as_ref())
}

fn config_path_from_env() -> Result<Option<PathBuf>> {
    match std::env::var_os(CONFIG_ENV_VAR) {
        Some(value) => {
            if value.is_empty() {
                anyhow::bail!("{CONFIG_ENV_VAR} is set but empty");
            }
            Ok(Some(PathBuf::from(value)))
        }
        None => Ok(None),
    }
}

fn default_config_path() -> Result<PathBuf> {
    Ok(default_config_dir()?.join(CONFIG_FILE_NAME))
}

fn default_database_path() -> Result<PathBuf> {
    Ok(default_data_dir()?.join(DATABASE_FILE_NAME))
}

fn default_config_dir() -> Result<PathBuf> {
    let base = dirs::config_dir().context("failed to resolve config directory")?;
    Ok(base.join(APP_DIR_NAME))
}

fn default_data_dir() -> Result<PathBuf> {
    let base = dirs::data_dir().context("failed to resolve data directory")?;
    Ok(base.join(APP_DIR_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    struct EnvVarGuard {
        key: &'static str,
        prev: Option<OsString>,
    }

    impl EnvVarGuard {
        fn set(key: &'static str, value: &str) -> Self {
            let prev = std::env::var_os(key);
            // SAFETY: tests serialize env mutations with ENV_LOCK.
            unsafe {
                std::env::set_var(key, value);
            }
            Self { key, prev }
        }

        fn clear(key: &'static str) -> Self {
            let prev = std::env::var_os(key);
            // SAFETY: tests serialize env mutations with ENV_LOCK.
            unsafe {
                std::env::remove_var(key);
            }
            Self { key, prev }
        }
    }

    impl Drop for EnvVarGuard {
        fn drop(&mut self) {
            match &self.prev {
                Some(value) => {
                    // SAFETY: tests serialize env mutations with ENV_LOCK.
                    unsafe {
                        std::env::set_var(self.key, value);
                    }
                }
                None => {
                    // SAFETY: tests serialize env mutations with ENV_LOCK.
                    unsafe {
                        std::env::remove_var(self.key);
                    }
                }
            }
        }
    }

    fn write_config(dir: &TempDir, contents: &str) -> PathBuf {
        let config_dir = dir.path().join("config");
        fs::create_dir_all(&config_dir).unwrap();
        let config_path = config_dir.join("fleet.toml");
        fs::write(&config_path, contents).unwrap();
        config_path
    }

    #[test]
    fn missing_optional_config_file_is_ok() {
        let dir = TempDir::new().unwrap();
        let cfg = read_config_file(&dir.path().join("missing.toml"), false).unwrap();
        assert!(cfg.database_path.is_none());
        assert!(cfg.git.is_empty());
    }

    #[test]
    fn missing_required_config_file_errors() {
        let dir = TempDir::new().unwrap();
        let err = read_config_file(&dir.path().join("missing.toml"), true).unwrap_err();
        assert!(err.to_string().contains("config file not found"));
    }

    #[test]
    fn resolves_relative_database_path_from_config_dir() {
        let dir = TempDir::new().unwrap();
        let config_path = write_config(
            &dir,
            "database_path = \"db/fleet.sqlite\"\ntensorboard_sync_interval_secs = 15\n",
        );
        let config = load(Some(config_path.clone()), Overrides::default()).unwrap();
        assert_eq!(
            config.database_path,
            dir.path().join("config").join("db").join("fleet.sqlite")
        );
        assert_eq!(config.tensorboard_sync_interval_secs, 15);
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.config_path, Some(config_path));
    }

    #[test]
    fn cli_overrides_take_precedence_over_file_config() {
        let dir = TempDir::new().unwrap();
        let config_path = write_config(
            &dir,
            "database_path = \"db/from_config.sqlite\"\nport = 6000\nverbose = false\n",
        );
        let LoadResult { config, report } = load_with_report(
            Some(config_path),
            Overrides {
                database_path: Some(PathBuf::from("from_flag.sqlite")),
                tensorboard_sync_interval_secs: None,
                port: None,
                verbose: Some(true),
            },
        )
        .unwrap();

        assert_eq!(config.database_path, PathBuf::from("from_flag.sqlite"));
        assert_eq!(report.database_path.source, ConfigSource::Override);
        assert_eq!(config.port, 6000);
        assert_eq!(report.port.source, ConfigSource::ConfigFile);
        assert!(config.verbose);
        assert_eq!(
            report.tensorboard_sync_interval_secs.source,
            ConfigSource::Default
        );
    }

    #[test]
    fn container_section_fills_settings() {
        let dir = TempDir::new().unwrap();
        let config_path = write_config(
            &dir,
            r#"
database_path = "fleet.sqlite"

[container]
kubernetes_host = "k8s.internal"
kubernetes_port = 8443
resource_manage_key = "admin-key"
proxy = "http://proxy:3128"
no_proxy = ""
label_partition = "example.com/partition"
accept_invalid_certs = true

[token]
secret = "s3cret"

[[git]]
id = 1
url = "https://git.internal"
user = "bot"
token = "tok"

[[registry]]
id = 3
host = "registry.internal:5000"
project = "ml"
tenant_ids = [4, 5]
user_name = "bot"
password = "pw"
"#,
        );
        let LoadResult { config, report } =
            load_with_report(Some(config_path), Overrides::default()).unwrap();
        let settings = &config.container;
        assert_eq!(settings.service_base_url, "https://k8s.internal:8443");
        assert_eq!(settings.resource_manage_key, "admin-key");
        assert_eq!(settings.proxy.as_deref(), Some("http://proxy:3128"));
        assert_eq!(settings.no_proxy, None);
        assert_eq!(settings.label_partition, "example.com/partition");
        assert_eq!(settings.label_host_name, "kubernetes.io/hostname");
        assert_eq!(settings.shell_columns, 80);
        assert!(config.accept_invalid_certs);
        assert_eq!(config.token_secret.as_deref(), Some("s3cret"));
        assert_eq!(config.token_ttl_secs, DEFAULT_TOKEN_TTL_SECS);
        assert_eq!(config.git[0].user.as_deref(), Some("bot"));
        assert_eq!(config.registries[0].tenant_ids, vec![4, 5]);
        assert_eq!(report.kubernetes_endpoint, "https://k8s.internal:8443");
        assert_eq!(report.registries, 1);
    }

    #[test]
    fn duplicate_git_ids_are_rejected() {
        let dir = TempDir::new().unwrap();
        let config_path = write_config(
            &dir,
            "[[git]]\nid = 1\nurl = \"https://a\"\n\n[[git]]\nid = 1\nurl = \"https://b\"\n",
        );
        let err = load(Some(config_path), Overrides::default()).unwrap_err();
        assert!(err.to_string().contains("duplicate git server id 1"));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let dir = TempDir::new().unwrap();
        let config_path = write_config(&dir, "[container]\nkube_host = \"typo\"\n");
        let err = load(Some(config_path), Overrides::default()).unwrap_err();
        assert!(err.to_string().contains("failed to parse config file"));
    }

    #[test]
    fn zero_port_is_rejected() {
        let dir = TempDir::new().unwrap();
        let config_path = write_config(&dir, "database_path = \"fleet.sqlite\"\nport = 0\n");
        let err = load(Some(config_path), Overrides::default()).unwrap_err();
        assert!(err.to_string().contains("port must be between 1 and 65535"));
    }

    #[test]
    fn env_config_path_is_used_when_flag_missing() {
        let _lock = ENV_LOCK.lock().unwrap();
        let dir = TempDir::new().unwrap();
        let config_path = write_config(&dir, "database_path = \"env.sqlite\"\nport = 6100\n");
        let _guard = EnvVarGuard::set(CONFIG_ENV_VAR, config_path.to_str().unwrap());

        let LoadResult { config, report } =
            load_with_report(None, Overrides::default()).unwrap();
        assert_eq!(config.port, 6100);
        assert_eq!(report.config_path_source, Some(ConfigSource::Env));
    }

    #[test]
    fn empty_env_config_path_errors() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvVarGuard::set(CONFIG_ENV_VAR, "");
        let err = load(None, Overrides::default()).unwrap_err();
        assert!(err.to_string().contains("is set but empty"));
    }

    #[test]
    fn missing_env_config_file_is_required() {
        let _lock = ENV_LOCK.lock().unwrap();
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope.toml");
        let _guard = EnvVarGuard::set(CONFIG_ENV_VAR, missing.to_str().unwrap());
        let err = load(None, Overrides::default()).unwrap_err();
        assert!(err.to_string().contains("config file not found"));
    }

    #[test]
    fn cleared_env_falls_back_to_default_location() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvVarGuard::clear(CONFIG_ENV_VAR);
        let dir = TempDir::new().unwrap();
        let result = load_with_report(
            None,
            Overrides {
                database_path: Some(dir.path().join("fleet.sqlite")),
                ..Overrides::default()
            },
        );
        // The default config file may or may not exist on the host.
        if let Ok(LoadResult { report, .. }) = result {
            assert_ne!(report.config_path_source, Some(ConfigSource::Env));
        }
    }

    #[test]
    fn ensure_database_dir_creates_parent() {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("nested").join("fleet.sqlite");
        ensure_database_dir(&db_path).unwrap();
        assert!(dir.path().join("nested").is_dir());
    }
}
