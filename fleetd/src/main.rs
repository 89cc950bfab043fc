// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::time::Duration;

use fleetd::adapters;
use fleetd::app;
use fleetd::app::ports::ClockPort;
use fleetd::config;
use fleetd::logging;

fn log_config_report(report: &config::ConfigReport) {
    match (&report.config_path, report.config_path_source) {
        (Some(path), Some(source)) => {
            log::info!(
                "config path: {} (source={}, present={})",
                path.display(),
                source.as_str(),
                report.config_file_present
            );
        }
        (Some(path), None) => {
            log::info!(
                "config path: {} (present={})",
                path.display(),
                report.config_file_present
            );
        }
        (None, _) => {
            log::info!("config path: (none)");
        }
    }
    log::info!(
        "config database_path: {} (source={})",
        report.database_path.value.display(),
        report.database_path.source.as_str()
    );
    log::info!(
        "config tensorboard_sync_interval_secs: {} (source={})",
        report.tensorboard_sync_interval_secs.value,
        report.tensorboard_sync_interval_secs.source.as_str()
    );
    log::info!(
        "config port: {} (source={})",
        report.port.value,
        report.port.source.as_str()
    );
    log::info!(
        "config verbose: {} (source={})",
        report.verbose.value,
        report.verbose.source.as_str()
    );
    log::info!(
        "config kubernetes: {} (git servers={}, registries={})",
        report.kubernetes_endpoint,
        report.git_servers,
        report.registries
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let parsed = adapters::cli::parse_opts();
    let opts = parsed.opts;
    let verbose_override = parsed.verbose_override;
    let config::LoadResult { config, report } = config::load_with_report(
        opts.config,
        config::Overrides {
            database_path: opts.database_path,
            tensorboard_sync_interval_secs: opts.tensorboard_sync_interval_secs,
            port: opts.port,
            verbose: verbose_override,
        },
    )?;
    logging::init(config.verbose);
    log_config_report(&report);
    config::ensure_database_dir(&config.database_path)?;
    let db = adapters::db::FleetStore::open(&config.database_path)
        .await
        .with_context(|| format!("failed to open {}", config.database_path.display()))?;
    let listen_addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.port));

    let store = Arc::new(adapters::db::SqliteStoreAdapter::new(db));
    let remote = Arc::new(adapters::kube::KubeClusterClient::new(
        &config.container,
        adapters::kube::KubeClientOptions {
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            accept_invalid_certs: config.accept_invalid_certs,
            user_token_ttl: Duration::from_secs(config.token_ttl_secs),
        },
    )?);
    let clock: Arc<dyn ClockPort> = Arc::new(adapters::time::SystemClock::new());
    let secret = match config.token_secret.clone() {
        Some(secret) => secret,
        None => {
            log::warn!("no [token] secret configured; callback tokens expire on restart");
            app::services::random::generate_secret()
        }
    };
    let access_tokens = Arc::new(adapters::credentials::SignedTokenIssuer::new(
        secret,
        Duration::from_secs(config.token_ttl_secs),
        clock.clone(),
    ));
    let git = Arc::new(adapters::credentials::StaticGitCredentials::new(
        config.git.clone(),
    ));
    let registries = Arc::new(adapters::credentials::StaticRegistryMaps::new(
        config.registries.clone(),
    ));
    let telemetry = Arc::new(adapters::telemetry::TracingTelemetry::new());

    let usecases = app::usecases::UseCases::new(
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        store,
        remote,
        git,
        registries,
        access_tokens,
        clock,
        telemetry,
        config.container.clone(),
    );

    let syncer = usecases.clone();
    let interval = Duration::from_secs(config.tensorboard_sync_interval_secs);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match syncer.sync_all_tensorboards().await {
                Ok(synced) => log::debug!("tensorboard sync touched {synced} containers"),
                Err(err) => log::warn!("tensorboard sync failed: {err}"),
            }
        }
    });

    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind {listen_addr}"))?;
    log::info!("exec listener on {}", listen_addr);
    tokio::select! {
        result = adapters::ws::serve(listener, usecases) => result?,
        _ = tokio::signal::ctrl_c() => log::info!("shutting down"),
    }
    Ok(())
}
