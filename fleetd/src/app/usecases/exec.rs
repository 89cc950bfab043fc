// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use crate::app::container::{ExecRequest, JobKind};
use crate::app::errors::{AppError, AppResult};
use crate::app::ports::{
    CLOSE_INTERNAL_ERROR, CloseReason, DuplexChannel, ExecFrame, FrameSink, FrameSource,
    TelemetryEvent,
};
use crate::app::types::{Cluster, JobLocator};

use super::UseCases;

const STDIN_CHANNEL: u8 = 0;

/// How an exec session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeOutcome {
    /// The client sent a close frame; both ends were closed with its code.
    ClientClosed,
    /// The client vanished or failed a read; both ends were dropped.
    ClientDisconnected,
    /// The container side closed; both ends were closed with its reason.
    ClusterClosed,
    /// A frame could not be delivered; both ends were dropped.
    Aborted,
    /// No exec channel could be opened to the container.
    ClusterUnavailable,
}

impl BridgeOutcome {
    fn name(&self) -> &'static str {
        match self {
            BridgeOutcome::ClientClosed => "client_closed",
            BridgeOutcome::ClientDisconnected => "client_disconnected",
            BridgeOutcome::ClusterClosed => "cluster_closed",
            BridgeOutcome::Aborted => "aborted",
            BridgeOutcome::ClusterUnavailable => "cluster_unavailable",
        }
    }
}

/// Jobs that can host an interactive shell.
#[derive(Debug, Clone)]
enum ExecTarget {
    Training(JobLocator),
    Inference(JobLocator),
    Notebook(JobLocator),
}

impl ExecTarget {
    fn from_locator(locator: JobLocator) -> Option<Self> {
        match locator.kind {
            JobKind::Training => Some(Self::Training(locator)),
            JobKind::Inference => Some(Self::Inference(locator)),
            JobKind::Notebook => Some(Self::Notebook(locator)),
            JobKind::Preprocess | JobKind::TensorBoard => None,
        }
    }

    fn cluster_id(&self) -> Option<i64> {
        match self {
            Self::Training(locator) | Self::Inference(locator) | Self::Notebook(locator) => {
                locator.cluster_id
            }
        }
    }
}

impl UseCases {
    /// Relays an interactive shell between a client socket and the job's container.
    #[tracing::instrument(name = "exec_bridge", skip(self, client))]
    pub async fn connect_exec_bridge(
        &self,
        client: DuplexChannel,
        job_name: &str,
        tenant_name: &str,
    ) -> AppResult<BridgeOutcome> {
        let DuplexChannel { source, sink } = client;
        let mut client_sink = SocketGuard::new(sink);

        let cluster = match self.exec_cluster(job_name).await {
            Ok(cluster) => cluster,
            Err(err) => {
                client_sink
                    .close(Some(CloseReason::new(CLOSE_INTERNAL_ERROR, "Internal error")))
                    .await;
                return Err(err);
            }
        };
        let request = ExecRequest {
            uri: cluster.web_socket_uri(),
            token: cluster.resource_manage_key.clone(),
            tenant_name: tenant_name.to_string(),
            job_name: job_name.to_string(),
        };

        let outcome = match self.remote.open_exec(&request).await {
            Ok(channel) => relay(source, client_sink, channel).await,
            Err(err) => {
                tracing::warn!("failed to open exec channel to {}: {}", job_name, err);
                let notice = format!("\"{job_name}\" not found.\r\nConnection Closed.");
                if let Err(err) = client_sink.send(ExecFrame::Text(notice)).await {
                    tracing::debug!("client went away before the notice: {}", err);
                }
                client_sink
                    .close(Some(CloseReason::new(
                        CLOSE_INTERNAL_ERROR,
                        "Kubernetes error",
                    )))
                    .await;
                BridgeOutcome::ClusterUnavailable
            }
        };

        tracing::info!("exec session on {} ended: {:?}", job_name, outcome);
        self.telemetry.event(
            "exec.bridge",
            TelemetryEvent {
                tenant: Some(tenant_name.to_string()),
                cluster: Some(cluster.display_name),
                container: Some(job_name.to_string()),
                status: Some(outcome.name().to_string()),
                ..TelemetryEvent::default()
            },
        );
        Ok(outcome)
    }

    /// The cluster owning the job; the default pool when the job is not pinned.
    async fn exec_cluster(&self, job_name: &str) -> AppResult<Cluster> {
        let target = self
            .jobs
            .locate(job_name)
            .await?
            .and_then(ExecTarget::from_locator);
        let Some(cluster_id) = target.as_ref().and_then(ExecTarget::cluster_id) else {
            return Ok(self.settings.default_cluster());
        };
        match self.clusters.get_cluster(cluster_id).await? {
            Some(cluster) => Ok(cluster),
            None => {
                tracing::warn!(
                    "cluster {} of {} is gone; using the default pool",
                    cluster_id,
                    job_name
                );
                Ok(self.settings.default_cluster())
            }
        }
    }
}

/// Sink wrapper that performs at most one close or abort.
struct SocketGuard {
    sink: Box<dyn FrameSink>,
    closed: bool,
}

impl SocketGuard {
    fn new(sink: Box<dyn FrameSink>) -> Self {
        Self {
            sink,
            closed: false,
        }
    }

    async fn send(&mut self, frame: ExecFrame) -> AppResult<()> {
        if self.closed {
            return Err(AppError::unavailable("socket already closed"));
        }
        self.sink.send(frame).await
    }

    async fn close(&mut self, reason: Option<CloseReason>) {
        if std::mem::replace(&mut self.closed, true) {
            return;
        }
        if let Err(err) = self.sink.send(ExecFrame::Close(reason)).await {
            tracing::debug!("close handshake failed: {}", err);
            self.sink.abort().await;
        }
    }

    async fn abort(&mut self) {
        if std::mem::replace(&mut self.closed, true) {
            return;
        }
        self.sink.abort().await;
    }
}

enum PumpEnd {
    ClientClosed(Option<CloseReason>),
    ClientGone,
    ClusterClosed(Option<CloseReason>),
    Failed(AppError),
}

async fn relay(
    mut client_source: Box<dyn FrameSource>,
    mut client_sink: SocketGuard,
    cluster: DuplexChannel,
) -> BridgeOutcome {
    let DuplexChannel {
        source: mut cluster_source,
        sink,
    } = cluster;
    let mut cluster_sink = SocketGuard::new(sink);

    let end = {
        let upstream = pump_input(client_source.as_mut(), &mut cluster_sink);
        let downstream = pump_output(cluster_source.as_mut(), &mut client_sink);
        tokio::select! {
            biased;
            end = upstream => end,
            end = downstream => end,
        }
    };

    match end {
        PumpEnd::ClientClosed(reason) => {
            cluster_sink.close(reason.clone()).await;
            client_sink.close(reason).await;
            BridgeOutcome::ClientClosed
        }
        PumpEnd::ClusterClosed(reason) => {
            client_sink.close(reason.clone()).await;
            cluster_sink.close(reason).await;
            BridgeOutcome::ClusterClosed
        }
        PumpEnd::ClientGone => {
            client_sink.abort().await;
            cluster_sink.abort().await;
            BridgeOutcome::ClientDisconnected
        }
        PumpEnd::Failed(err) => {
            tracing::warn!("exec relay failed: {}", err);
            client_sink.abort().await;
            cluster_sink.abort().await;
            BridgeOutcome::Aborted
        }
    }
}

/// Client input to the container's stdin channel.
async fn pump_input(source: &mut dyn FrameSource, cluster: &mut SocketGuard) -> PumpEnd {
    loop {
        let data = match source.next_frame().await {
            Some(Ok(ExecFrame::Binary(data))) => data,
            Some(Ok(ExecFrame::Text(text))) => text.into_bytes(),
            Some(Ok(ExecFrame::Close(reason))) => return PumpEnd::ClientClosed(reason),
            Some(Err(err)) => {
                tracing::debug!("client read failed: {}", err);
                return PumpEnd::ClientGone;
            }
            None => return PumpEnd::ClientGone,
        };
        let mut frame = Vec::with_capacity(data.len() + 1);
        frame.push(STDIN_CHANNEL);
        frame.extend_from_slice(&data);
        if let Err(err) = cluster.send(ExecFrame::Binary(frame)).await {
            return PumpEnd::Failed(err);
        }
    }
}

/// Container output to the client as text.
async fn pump_output(source: &mut dyn FrameSource, client: &mut SocketGuard) -> PumpEnd {
    loop {
        let data = match source.next_frame().await {
            Some(Ok(ExecFrame::Binary(data))) => data,
            Some(Ok(ExecFrame::Text(text))) => text.into_bytes(),
            Some(Ok(ExecFrame::Close(reason))) => return PumpEnd::ClusterClosed(reason),
            Some(Err(err)) => return PumpEnd::Failed(err),
            None => return PumpEnd::ClusterClosed(None),
        };
        let Some(text) = strip_channel(&data) else {
            continue;
        };
        if let Err(err) = client.send(ExecFrame::Text(text)).await {
            return PumpEnd::Failed(err);
        }
    }
}

/// Drops the stream byte and embedded NULs; `None` when nothing printable is left.
fn strip_channel(data: &[u8]) -> Option<String> {
    let payload: Vec<u8> = data
        .iter()
        .skip(1)
        .copied()
        .filter(|byte| *byte != 0)
        .collect();
    if payload.is_empty() {
        return None;
    }
    Some(String::from_utf8_lossy(&payload).into_owned())
}
