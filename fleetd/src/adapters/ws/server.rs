// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

//! Accepts client shells on `/exec?jobName=..&tenantName=..` and bridges them to clusters.

use std::net::SocketAddr;

use reqwest::Url;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::{StatusCode, Uri};

use crate::adapters::ws::frames;
use crate::app::usecases::UseCases;

pub const EXEC_PATH: &str = "/exec";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecParams {
    pub job_name: String,
    pub tenant_name: String,
}

/// Runs until the listener fails; every connection gets its own task.
pub async fn serve(listener: TcpListener, usecases: UseCases) -> std::io::Result<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        let usecases = usecases.clone();
        tokio::spawn(async move {
            handle_connection(usecases, stream, peer).await;
        });
    }
}

#[tracing::instrument(name = "exec_connection", skip(usecases, stream))]
async fn handle_connection(usecases: UseCases, stream: TcpStream, peer: SocketAddr) {
    let mut params = None;
    let callback = |request: &Request, response: Response| match exec_params(request.uri()) {
        Some(parsed) => {
            params = Some(parsed);
            Ok(response)
        }
        None => Err(reject(request.uri())),
    };
    let socket = match accept_hdr_async(stream, callback).await {
        Ok(socket) => socket,
        Err(err) => {
            tracing::debug!("websocket handshake failed: {}", err);
            return;
        }
    };
    let Some(ExecParams {
        job_name,
        tenant_name,
    }) = params
    else {
        return;
    };

    tracing::info!("exec session requested for {} in {}", job_name, tenant_name);
    match usecases
        .connect_exec_bridge(frames::duplex(socket), &job_name, &tenant_name)
        .await
    {
        Ok(outcome) => tracing::debug!("exec session for {} finished: {:?}", job_name, outcome),
        Err(err) => tracing::warn!("exec session for {} failed: {}", job_name, err),
    }
}

/// Both parameters are required and non-empty.
pub fn exec_params(uri: &Uri) -> Option<ExecParams> {
    if uri.path() != EXEC_PATH {
        return None;
    }
    let url = Url::parse(&format!("ws://localhost{uri}")).ok()?;
    let mut job_name = None;
    let mut tenant_name = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "jobName" => job_name = Some(value.into_owned()),
            "tenantName" => tenant_name = Some(value.into_owned()),
            _ => {}
        }
    }
    Some(ExecParams {
        job_name: job_name.filter(|name| !name.is_empty())?,
        tenant_name: tenant_name.filter(|name| !name.is_empty())?,
    })
}

fn reject(uri: &Uri) -> ErrorResponse {
    let (status, body) = if uri.path() == EXEC_PATH {
        (StatusCode::BAD_REQUEST, "jobName and tenantName are required")
    } else {
        (StatusCode::NOT_FOUND, "not found")
    };
    let mut response = ErrorResponse::new(Some(body.to_string()));
    *response.status_mut() = status;
    response
}
