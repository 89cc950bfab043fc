// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::TryStreamExt;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, RequestBuilder, Response};
use serde_json::Value;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{
    AUTHORIZATION, HeaderValue, SEC_WEBSOCKET_PROTOCOL,
};

use crate::adapters::kube::error::{KubeError, map_kube_error};
use crate::adapters::kube::manifest;
use crate::adapters::kube::status::{self, NodeLabelKeys};
use crate::adapters::ws::frames;
use crate::app::container::{
    ClusterTarget, ContainerDetailsInfo, ContainerEndpointInfo, ContainerEventInfo,
    ContainerStatus, EndPointInfo, ExecRequest, JobKind, LogStream, NodeInfo, RegistryTokenSpec,
    RunOutcome, RunRequest, StatusResult,
};
use crate::app::errors::AppResult;
use crate::app::ports::{ClusterServicePort, DuplexChannel};
use crate::app::services::job_spec::exposed_port_name;
use crate::app::types::ContainerSettings;

const FIELD_MANAGER: &str = "fleetd";
const APPLY_PATCH: &str = "application/apply-patch+yaml";
const MERGE_PATCH: &str = "application/merge-patch+json";
const EXEC_PROTOCOL: &str = "channel.k8s.io";

#[derive(Debug, Clone)]
pub struct KubeClientOptions {
    pub request_timeout: Duration,
    /// Skip TLS verification for clusters with self-signed certificates.
    pub accept_invalid_certs: bool,
    pub user_token_ttl: Duration,
}

impl Default for KubeClientOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            accept_invalid_certs: false,
            user_token_ttl: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Talks to the Kubernetes API of whichever cluster a target names.
#[derive(Clone)]
pub struct KubeClusterClient {
    http: reqwest::Client,
    labels: NodeLabelKeys,
    user_token_ttl: Duration,
}

impl KubeClusterClient {
    pub fn new(
        settings: &ContainerSettings,
        options: KubeClientOptions,
    ) -> Result<Self, KubeError> {
        let http = reqwest::Client::builder()
            .timeout(options.request_timeout)
            .danger_accept_invalid_certs(options.accept_invalid_certs)
            .build()?;
        Ok(Self {
            http,
            labels: NodeLabelKeys {
                partition: settings.label_partition.clone(),
                tensorboard_enabled: settings.label_tensorboard_enabled.clone(),
                notebook_enabled: settings.label_notebook_enabled.clone(),
            },
            user_token_ttl: options.user_token_ttl,
        })
    }

    fn request(&self, method: Method, target: &ClusterTarget, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", target.base_url, path))
            .bearer_auth(&target.token)
    }

    async fn get(&self, target: &ClusterTarget, path: &str) -> Result<Value, KubeError> {
        read_json(self.request(Method::GET, target, path).send().await?).await
    }

    async fn create(
        &self,
        target: &ClusterTarget,
        path: &str,
        body: &Value,
    ) -> Result<Value, KubeError> {
        read_json(self.request(Method::POST, target, path).json(body).send().await?).await
    }

    /// Server-side apply; creating or updating the named object.
    async fn apply(
        &self,
        target: &ClusterTarget,
        path: &str,
        body: &Value,
    ) -> Result<Value, KubeError> {
        let response = self
            .request(Method::PATCH, target, path)
            .query(&[("fieldManager", FIELD_MANAGER), ("force", "true")])
            .header(CONTENT_TYPE, APPLY_PATCH)
            .body(body.to_string())
            .send()
            .await?;
        read_json(response).await
    }

    /// Deleting an absent object succeeds.
    async fn delete(&self, target: &ClusterTarget, path: &str) -> Result<(), KubeError> {
        let response = self
            .request(Method::DELETE, target, path)
            .json(&manifest::delete_options())
            .send()
            .await?;
        match read_json(response).await {
            Ok(_) => Ok(()),
            Err(err) if err.is_not_found() => Ok(()),
            Err(err) => Err(err),
        }
    }

    async fn job_pods(
        &self,
        target: &ClusterTarget,
        name: &str,
        tenant_name: &str,
    ) -> Result<Vec<Value>, KubeError> {
        let response = self
            .request(Method::GET, target, &pods_path(tenant_name))
            .query(&[("labelSelector", format!("{}={name}", manifest::JOB_NAME_LABEL))])
            .send()
            .await?;
        let list = read_json(response).await?;
        Ok(status::items(&list).to_vec())
    }

    async fn lookup_status(
        &self,
        target: &ClusterTarget,
        name: &str,
        tenant_name: &str,
        pods: &[Value],
    ) -> Result<ContainerStatus, KubeError> {
        if let Some(status) = status::pods_status(pods) {
            return Ok(status);
        }
        let job = self.get(target, &job_path(tenant_name, name)).await?;
        Ok(status::job_status(&job))
    }

    async fn endpoint(
        &self,
        target: &ClusterTarget,
        name: &str,
        tenant_name: &str,
    ) -> Result<ContainerEndpointInfo, KubeError> {
        let pods = self.job_pods(target, name, tenant_name).await?;
        let container_status = self.lookup_status(target, name, tenant_name, &pods).await?;
        let mut info = ContainerEndpointInfo::with_status(container_status);
        let Some(host) = pods.first().and_then(status::pod_host) else {
            return Ok(info);
        };
        let service = match self.get(target, &service_path(tenant_name, name)).await {
            Ok(service) => service,
            Err(err) if err.is_not_found() => return Ok(info),
            Err(err) => return Err(err),
        };
        info.end_points = status::node_ports(&service)
            .into_iter()
            .map(|(key, port)| EndPointInfo {
                key,
                host: host.clone(),
                port,
            })
            .collect();
        Ok(info)
    }

    async fn nodes(
        &self,
        target: &ClusterTarget,
        known_names: &[String],
    ) -> Result<Vec<Value>, KubeError> {
        let list = self.get(target, "/api/v1/nodes").await?;
        Ok(status::items(&list)
            .iter()
            .filter(|node| {
                node["metadata"]["name"]
                    .as_str()
                    .is_some_and(|name| known_names.iter().any(|known| known == name))
            })
            .cloned()
            .collect())
    }

    async fn user_token(
        &self,
        target: &ClusterTarget,
        tenant_name: &str,
        user_name: &str,
    ) -> Result<String, KubeError> {
        let base = format!("/api/v1/namespaces/{tenant_name}/serviceaccounts/{user_name}");
        self.apply(target, &base, &manifest::service_account(tenant_name, user_name))
            .await?;
        self.apply(
            target,
            &format!(
                "/apis/rbac.authorization.k8s.io/v1/namespaces/{tenant_name}/rolebindings/{user_name}-edit"
            ),
            &manifest::role_binding(tenant_name, user_name),
        )
        .await?;
        let issued = self
            .create(
                target,
                &format!("{base}/token"),
                &manifest::token_request(self.user_token_ttl.as_secs()),
            )
            .await?;
        issued["status"]["token"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| KubeError::Api {
                status: reqwest::StatusCode::UNPROCESSABLE_ENTITY,
                message: "token request returned no token".to_string(),
            })
    }

    async fn connect_exec(&self, request: &ExecRequest) -> Result<DuplexChannel, KubeError> {
        let target = ClusterTarget {
            base_url: http_base(&request.uri)?,
            token: request.token.clone(),
        };
        let pods = self
            .job_pods(&target, &request.job_name, &request.tenant_name)
            .await?;
        let pod = pods
            .iter()
            .find(|pod| status::pod_status(pod) == ContainerStatus::Running)
            .and_then(|pod| pod["metadata"]["name"].as_str())
            .ok_or_else(|| KubeError::NoPod(request.job_name.clone()))?;

        let url = format!(
            "{}/api/v1/namespaces/{}/pods/{pod}/exec?container={}&command=%2Fbin%2Fbash&stdin=true&stdout=true&stderr=true&tty=true",
            request.uri.trim_end_matches('/'),
            request.tenant_name,
            manifest::MAIN_CONTAINER,
        );
        let mut ws_request = url.into_client_request()?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", request.token))
            .map_err(|_| KubeError::InvalidUri("token is not a valid header".to_string()))?;
        ws_request.headers_mut().insert(AUTHORIZATION, bearer);
        ws_request
            .headers_mut()
            .insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static(EXEC_PROTOCOL));
        let (stream, _) = connect_async(ws_request).await?;
        Ok(frames::duplex(stream))
    }
}

#[async_trait]
impl ClusterServicePort for KubeClusterClient {
    #[tracing::instrument(skip(self, request), fields(name = %request.name, tenant = %request.tenant_name))]
    async fn run_container(
        &self,
        target: &ClusterTarget,
        request: &RunRequest,
    ) -> Result<RunOutcome, String> {
        let job = manifest::job(request);
        self.create(target, &jobs_path(&request.tenant_name), &job)
            .await
            .map_err(|err| err.remote_message())?;

        let mut ports = request.ports.clone();
        if let Some(service) = manifest::service(request) {
            let created = match self
                .create(target, &services_path(&request.tenant_name), &service)
                .await
            {
                Ok(created) => created,
                Err(err) => {
                    tracing::warn!("failed to expose {}: {}", request.name, err);
                    if let Err(cleanup) = self
                        .delete(target, &job_path(&request.tenant_name, &request.name))
                        .await
                    {
                        tracing::warn!("failed to remove job {}: {}", request.name, cleanup);
                    }
                    return Err(err.remote_message());
                }
            };
            let assigned = status::node_ports(&created);
            for port in &mut ports {
                port.node_port = assigned
                    .iter()
                    .find(|(name, _)| *name == port.name)
                    .map(|(_, node_port)| *node_port);
            }
        }

        Ok(RunOutcome {
            name: request.name.clone(),
            status: ContainerStatus::Pending,
            host: None,
            ports,
            configuration: serde_json::to_string_pretty(&job).ok(),
        })
    }

    async fn container_status(
        &self,
        target: &ClusterTarget,
        name: &str,
        tenant_name: &str,
    ) -> ContainerStatus {
        let result: Result<ContainerStatus, KubeError> = async {
            let pods = self.job_pods(target, name, tenant_name).await?;
            self.lookup_status(target, name, tenant_name, &pods).await
        }
        .await;
        result.unwrap_or_else(|err| {
            tracing::debug!("status lookup for {} failed: {}", name, err);
            err.as_status()
        })
    }

    async fn container_details(
        &self,
        target: &ClusterTarget,
        name: &str,
        tenant_name: &str,
    ) -> ContainerDetailsInfo {
        let result: Result<ContainerDetailsInfo, KubeError> = async {
            let pods = self.job_pods(target, name, tenant_name).await?;
            match pods.as_slice() {
                [] => {
                    let status = self.lookup_status(target, name, tenant_name, &pods).await?;
                    Ok(ContainerDetailsInfo::with_status(name, status))
                }
                [pod] => Ok(status::pod_details(pod)),
                [first, ..] => {
                    let mut details = status::pod_details(first);
                    details.status = ContainerStatus::Multiple;
                    Ok(details)
                }
            }
        }
        .await;
        result.unwrap_or_else(|err| {
            tracing::debug!("details lookup for {} failed: {}", name, err);
            ContainerDetailsInfo::with_status(name, err.as_status())
        })
    }

    async fn container_endpoint(
        &self,
        target: &ClusterTarget,
        name: &str,
        tenant_name: &str,
    ) -> ContainerEndpointInfo {
        self.endpoint(target, name, tenant_name)
            .await
            .unwrap_or_else(|err| {
                tracing::debug!("endpoint lookup for {} failed: {}", name, err);
                ContainerEndpointInfo::with_status(err.as_status())
            })
    }

    async fn list_container_details(
        &self,
        target: &ClusterTarget,
        tenant_name: Option<&str>,
    ) -> StatusResult<Vec<ContainerDetailsInfo>> {
        let path = match tenant_name {
            Some(tenant_name) => pods_path(tenant_name),
            None => "/api/v1/pods".to_string(),
        };
        let result: Result<Value, KubeError> = async {
            let response = self
                .request(Method::GET, target, &path)
                .query(&[("labelSelector", manifest::KIND_LABEL)])
                .send()
                .await?;
            read_json(response).await
        }
        .await;
        match result {
            Ok(list) => Ok(status::items(&list).iter().map(status::pod_details).collect()),
            Err(err) => {
                tracing::warn!("failed to list containers: {}", err);
                Err(err.as_status())
            }
        }
    }

    #[tracing::instrument(skip(self))]
    async fn delete_container(
        &self,
        target: &ClusterTarget,
        kind: JobKind,
        name: &str,
        tenant_name: &str,
    ) -> bool {
        let mut deleted = true;
        if let Err(err) = self.delete(target, &job_path(tenant_name, name)).await {
            tracing::warn!("failed to delete job {}: {}", name, err);
            deleted = false;
        }
        if exposed_port_name(kind).is_some() {
            if let Err(err) = self.delete(target, &service_path(tenant_name, name)).await {
                tracing::warn!("failed to delete service {}: {}", name, err);
                deleted = false;
            }
        }
        deleted
    }

    async fn download_log(
        &self,
        target: &ClusterTarget,
        name: &str,
        tenant_name: &str,
    ) -> StatusResult<LogStream> {
        let pods = self
            .job_pods(target, name, tenant_name)
            .await
            .map_err(|err| err.as_status())?;
        let Some(pod) = pods.first().and_then(|pod| pod["metadata"]["name"].as_str()) else {
            return Err(ContainerStatus::None);
        };
        let response = self
            .request(
                Method::GET,
                target,
                &format!("/api/v1/namespaces/{tenant_name}/pods/{pod}/log"),
            )
            .query(&[("container", manifest::MAIN_CONTAINER)])
            .send()
            .await
            .map_err(|err| KubeError::from(err).as_status())?;
        let response = check_status(response)
            .await
            .map_err(|err| err.as_status())?;
        let stream = response.bytes_stream().map_err(std::io::Error::other);
        Ok(Box::pin(stream))
    }

    async fn events(
        &self,
        target: &ClusterTarget,
        tenant_name: &str,
    ) -> StatusResult<Vec<ContainerEventInfo>> {
        let list = self
            .get(target, &format!("/api/v1/namespaces/{tenant_name}/events"))
            .await
            .map_err(|err| err.as_status())?;
        Ok(status::items(&list)
            .iter()
            .filter_map(status::event_info)
            .collect())
    }

    async fn all_nodes(
        &self,
        target: &ClusterTarget,
        known_names: &[String],
    ) -> Result<Vec<NodeInfo>, String> {
        let nodes = self
            .nodes(target, known_names)
            .await
            .map_err(|err| err.remote_message())?;
        Ok(nodes
            .iter()
            .filter_map(|node| status::node_info(node, &self.labels))
            .collect())
    }

    async fn node_label_map(
        &self,
        target: &ClusterTarget,
        label_key: &str,
        known_names: &[String],
    ) -> Result<HashMap<String, String>, String> {
        let nodes = self
            .nodes(target, known_names)
            .await
            .map_err(|err| err.remote_message())?;
        Ok(nodes
            .iter()
            .filter_map(|node| {
                let metadata = &node["metadata"];
                let value = metadata["labels"][label_key].as_str()?;
                Some((metadata["name"].as_str()?.to_string(), value.to_string()))
            })
            .collect())
    }

    async fn set_node_label(
        &self,
        target: &ClusterTarget,
        node: &str,
        key: &str,
        value: &str,
    ) -> bool {
        let result: Result<Value, KubeError> = async {
            let response = self
                .request(Method::PATCH, target, &format!("/api/v1/nodes/{node}"))
                .header(CONTENT_TYPE, MERGE_PATCH)
                .body(manifest::label_patch(key, value).to_string())
                .send()
                .await?;
            read_json(response).await
        }
        .await;
        result
            .inspect_err(|err| tracing::warn!("failed to label node {}: {}", node, err))
            .is_ok()
    }

    async fn set_quota(
        &self,
        target: &ClusterTarget,
        tenant_name: &str,
        cpu: u32,
        memory: u32,
        gpu: u32,
    ) -> bool {
        let path = format!(
            "/api/v1/namespaces/{tenant_name}/resourcequotas/{}",
            manifest::QUOTA_NAME
        );
        let result = match manifest::resource_quota(tenant_name, cpu, memory, gpu) {
            Some(quota) => self.apply(target, &path, &quota).await.map(|_| ()),
            None => self.delete(target, &path).await,
        };
        result
            .inspect_err(|err| tracing::warn!("failed to set quota on {}: {}", tenant_name, err))
            .is_ok()
    }

    async fn register_tenant(&self, target: &ClusterTarget, tenant_name: &str) -> bool {
        self.apply(
            target,
            &format!("/api/v1/namespaces/{tenant_name}"),
            &manifest::namespace(tenant_name),
        )
        .await
        .inspect_err(|err| tracing::warn!("failed to register {}: {}", tenant_name, err))
        .is_ok()
    }

    async fn erase_tenant(&self, target: &ClusterTarget, tenant_name: &str) -> bool {
        self.delete(target, &format!("/api/v1/namespaces/{tenant_name}"))
            .await
            .inspect_err(|err| tracing::warn!("failed to erase {}: {}", tenant_name, err))
            .is_ok()
    }

    async fn register_user(
        &self,
        target: &ClusterTarget,
        tenant_name: &str,
        user_name: &str,
    ) -> Option<String> {
        self.user_token(target, tenant_name, user_name)
            .await
            .inspect_err(|err| {
                tracing::warn!(
                    "failed to register {} on {}: {}",
                    user_name,
                    tenant_name,
                    err
                )
            })
            .ok()
    }

    async fn register_registry_token(
        &self,
        target: &ClusterTarget,
        spec: &RegistryTokenSpec,
    ) -> bool {
        self.apply(
            target,
            &format!(
                "/api/v1/namespaces/{}/secrets/{}",
                spec.tenant_name, spec.token_name
            ),
            &manifest::docker_secret(spec),
        )
        .await
        .inspect_err(|err| tracing::warn!("failed to push {}: {}", spec.token_name, err))
        .is_ok()
    }

    async fn open_exec(&self, request: &ExecRequest) -> AppResult<DuplexChannel> {
        self.connect_exec(request).await.map_err(map_kube_error)
    }
}

async fn check_status(response: Response) -> Result<Response, KubeError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|value| value["message"].as_str().map(str::to_string))
        .unwrap_or(body);
    Err(KubeError::Api { status, message })
}

async fn read_json(response: Response) -> Result<Value, KubeError> {
    let body = check_status(response).await?.bytes().await?;
    if body.is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_slice(&body)?)
}

/// `wss://host:port` to the matching `https://` API base.
fn http_base(uri: &str) -> Result<String, KubeError> {
    let base = if let Some(rest) = uri.strip_prefix("wss://") {
        format!("https://{rest}")
    } else if let Some(rest) = uri.strip_prefix("ws://") {
        format!("http://{rest}")
    } else {
        return Err(KubeError::InvalidUri(uri.to_string()));
    };
    Ok(base.trim_end_matches('/').to_string())
}

fn jobs_path(tenant_name: &str) -> String {
    format!("/apis/batch/v1/namespaces/{tenant_name}/jobs")
}

fn job_path(tenant_name: &str, name: &str) -> String {
    format!("{}/{name}", jobs_path(tenant_name))
}

fn services_path(tenant_name: &str) -> String {
    format!("/api/v1/namespaces/{tenant_name}/services")
}

fn service_path(tenant_name: &str, name: &str) -> String {
    format!("{}/{name}", services_path(tenant_name))
}

fn pods_path(tenant_name: &str) -> String {
    format!("/api/v1/namespaces/{tenant_name}/pods")
}
