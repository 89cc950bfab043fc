// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

//! Builds cluster run requests from job histories.
//!
//! Everything here is pure: collaborator lookups (nodes, registry, Git, callback token)
//! are resolved by the caller into [`SpecInputs`].

use std::collections::BTreeMap;

use crate::app::container::{JobKind, NfsVolumeMount, PortMapping, RunRequest};
use crate::app::errors::{AppError, AppErrorKind, AppResult, codes};
use crate::app::services::env::{EnvLayers, common_system_vars, proxy_vars};
use crate::app::types::{
    ContainerSettings, GitEndpoint, ImageRef, InferenceHistory, JobRef,
    NotebookHistory, PreprocessHistory, RegistryMap, Resources, Tenant, TrainingHistory,
};

pub const TENSORBOARD_IMAGE: &str = "tensorflow/tensorflow:1.13.2";
pub const TENSORBOARD_PORT_NAME: &str = "tensorboard";
pub const TENSORBOARD_PORT: u16 = 6006;
pub const NOTEBOOK_PORT_NAME: &str = "notebook";
pub const NOTEBOOK_PORT: u16 = 8888;

const ATTACH_DIR: &str = "/fleet/attach";
const OUTPUT_DIR: &str = "/fleet/output";
const PARENT_DIR: &str = "/fleet/parent";

/// Collaborator lookups the builder needs.
#[derive(Debug, Clone, Default)]
pub struct SpecInputs {
    /// Nodes the tenant may schedule on.
    pub nodes: Vec<String>,
    pub registry: Option<RegistryMap>,
    /// Pull credentials for the model repository, if the job has one.
    pub git: Option<GitEndpoint>,
    pub callback_token: String,
}

pub fn build_run_request(
    job: JobRef<'_>,
    tenant: &Tenant,
    settings: &ContainerSettings,
    inputs: &SpecInputs,
) -> AppResult<RunRequest> {
    match job {
        JobRef::Preprocess(job) => build_preprocess_request(job, tenant, settings, inputs),
        JobRef::Training(job) => build_training_request(job, tenant, settings, inputs),
        JobRef::Inference(job) => build_inference_request(job, tenant, settings, inputs),
        JobRef::Notebook(job) => build_notebook_request(job, tenant, settings, inputs),
    }
}

pub fn build_preprocess_request(
    job: &PreprocessHistory,
    tenant: &Tenant,
    settings: &ContainerSettings,
    inputs: &SpecInputs,
) -> AppResult<RunRequest> {
    let constraints = node_constraints(settings, &inputs.nodes, job.partition.as_deref())?;
    let (image, registry_token_name) =
        resolve_image(&job.preprocess.image, inputs.registry.as_ref())?;

    let mut tags = format!("-t {}", job.preprocess.name);
    for tag in &job.input_data.tags {
        tags.push_str(&format!(" -t {tag}"));
    }

    let mut env = editable_defaults(settings);
    env.options(&job.options)
        .system("DATA_ID", job.input_data.id.to_string())
        .system("DATA_NAME", &job.input_data.name)
        .system("PREPROCESSING_ID", job.preprocess.id.to_string())
        .system("TAGS", tags)
        .system(
            "COMMIT_ID",
            job.preprocess
                .model
                .as_ref()
                .and_then(|model| model.commit_id.clone())
                .unwrap_or_default(),
        );
    if let Some(git) = &inputs.git {
        repository_vars(&mut env, git);
    }
    common_vars(&mut env, settings, inputs);

    let mut shared_paths = shared_paths();
    shared_paths.insert("output".to_string(), format!("{OUTPUT_DIR}/"));

    Ok(RunRequest {
        name: job.key.clone(),
        tenant_name: tenant.name.clone(),
        kind: JobKind::Preprocess,
        image,
        registry_token_name,
        script_type: JobKind::Preprocess.script_type().to_string(),
        entry_point: job.preprocess.entry_point.clone(),
        cpu: job.resources.cpu,
        memory: job.resources.memory,
        gpu: job.resources.gpu,
        env: env.merge(),
        mounts: vec![nfs_mount(
            "nfs-preproc-attach",
            ATTACH_DIR,
            Some(job.id),
            tenant,
            &tenant.storage.preprocess_attached_path,
            false,
        )],
        constraints,
        ports: Vec::new(),
        shared_paths,
        log_path: Some(format!(
            "{ATTACH_DIR}/preproc_stdout_stderr_${{PREPROCESSING_ID}}_${{DATA_ID}}.log"
        )),
    })
}

pub fn build_training_request(
    job: &TrainingHistory,
    tenant: &Tenant,
    settings: &ContainerSettings,
    inputs: &SpecInputs,
) -> AppResult<RunRequest> {
    let git = inputs.git.as_ref().ok_or_else(invalid_git_credential)?;
    let constraints = node_constraints(settings, &inputs.nodes, job.partition.as_deref())?;
    let (image, registry_token_name) = resolve_image(&job.image, inputs.registry.as_ref())?;

    let mut env = editable_defaults(settings);
    env.options(&job.options)
        .system("DATASET_ID", job.data_set_id.to_string())
        .system("TRAINING_ID", job.id.to_string())
        .system("PARENT_ID", optional_id(job.parent_id))
        .system("COMMIT_ID", job.model.commit_id.clone().unwrap_or_default())
        .system("ZIP_FILE_CREATED", job.zip.to_string());
    repository_vars(&mut env, git);
    common_vars(&mut env, settings, inputs);

    let storage = &tenant.storage;
    let mut mounts = vec![
        nfs_mount(
            "nfs-output",
            OUTPUT_DIR,
            Some(job.id),
            tenant,
            &storage.training_output_path,
            false,
        ),
        nfs_mount(
            "nfs-attach",
            ATTACH_DIR,
            Some(job.id),
            tenant,
            &storage.training_attached_path,
            false,
        ),
    ];
    if let Some(parent_id) = job.parent_id {
        mounts.push(parent_mount(parent_id, tenant));
    }

    Ok(RunRequest {
        name: job.key.clone(),
        tenant_name: tenant.name.clone(),
        kind: JobKind::Training,
        image,
        registry_token_name,
        script_type: JobKind::Training.script_type().to_string(),
        entry_point: job.entry_point.clone(),
        cpu: job.resources.cpu,
        memory: job.resources.memory,
        gpu: job.resources.gpu,
        env: env.merge(),
        mounts,
        constraints,
        ports: Vec::new(),
        shared_paths: shared_paths(),
        log_path: Some(format!(
            "{ATTACH_DIR}/training_stdout_stderr_${{TRAINING_ID}}.log"
        )),
    })
}

pub fn build_inference_request(
    job: &InferenceHistory,
    tenant: &Tenant,
    settings: &ContainerSettings,
    inputs: &SpecInputs,
) -> AppResult<RunRequest> {
    let git = inputs.git.as_ref().ok_or_else(invalid_git_credential)?;
    let constraints = node_constraints(settings, &inputs.nodes, job.partition.as_deref())?;
    let (image, registry_token_name) = resolve_image(&job.image, inputs.registry.as_ref())?;

    let mut env = editable_defaults(settings);
    env.options(&job.options)
        .system("DATASET_ID", job.data_set_id.to_string())
        .system("INFERENCE_ID", job.id.to_string())
        .system("PARENT_ID", optional_id(job.parent_id))
        .system("COMMIT_ID", job.model.commit_id.clone().unwrap_or_default())
        .system("ZIP_FILE_CREATED", job.zip.to_string());
    repository_vars(&mut env, git);
    common_vars(&mut env, settings, inputs);

    let storage = &tenant.storage;
    let mut mounts = vec![
        nfs_mount(
            "nfs-output",
            OUTPUT_DIR,
            Some(job.id),
            tenant,
            &storage.inference_output_path,
            false,
        ),
        nfs_mount(
            "nfs-attach",
            ATTACH_DIR,
            Some(job.id),
            tenant,
            &storage.inference_attached_path,
            false,
        ),
    ];
    // The parent of an inference is a training job.
    if let Some(parent_id) = job.parent_id {
        mounts.push(parent_mount(parent_id, tenant));
    }

    Ok(RunRequest {
        name: job.key.clone(),
        tenant_name: tenant.name.clone(),
        kind: JobKind::Inference,
        image,
        registry_token_name,
        script_type: JobKind::Inference.script_type().to_string(),
        entry_point: job.entry_point.clone(),
        cpu: job.resources.cpu,
        memory: job.resources.memory,
        gpu: job.resources.gpu,
        env: env.merge(),
        mounts,
        constraints,
        ports: Vec::new(),
        shared_paths: shared_paths(),
        log_path: Some(format!(
            "{ATTACH_DIR}/inference_stdout_stderr_${{INFERENCE_ID}}.log"
        )),
    })
}

pub fn build_notebook_request(
    job: &NotebookHistory,
    tenant: &Tenant,
    settings: &ContainerSettings,
    inputs: &SpecInputs,
) -> AppResult<RunRequest> {
    let mut constraints = node_constraints(settings, &inputs.nodes, job.partition.as_deref())?;
    constraints.insert(
        settings.label_notebook_enabled.clone(),
        vec!["true".to_string()],
    );
    let (image, registry_token_name) = match job.image.registry_id {
        Some(_) => resolve_image(&job.image, inputs.registry.as_ref())?,
        None => (job.image.literal(), None),
    };

    let expires_in = if job.expires_in != 0 {
        job.expires_in.to_string()
    } else {
        "infinity".to_string()
    };

    let mut env = editable_defaults(settings);
    env.options(&job.options)
        .system("DATASET_ID", optional_id(job.data_set_id))
        .system("NOTEBOOK_ID", job.id.to_string())
        .system(
            "COMMIT_ID",
            job.model
                .as_ref()
                .and_then(|model| model.commit_id.clone())
                .unwrap_or_default(),
        )
        .system("EXPIRES_IN", expires_in);
    if let Some(git) = &inputs.git {
        repository_vars(&mut env, git);
    }
    common_vars(&mut env, settings, inputs);

    let storage = &tenant.storage;
    Ok(RunRequest {
        name: job.key.clone(),
        tenant_name: tenant.name.clone(),
        kind: JobKind::Notebook,
        image,
        registry_token_name,
        script_type: JobKind::Notebook.script_type().to_string(),
        entry_point: job.entry_point.clone(),
        cpu: job.resources.cpu,
        memory: job.resources.memory,
        gpu: job.resources.gpu,
        env: env.merge(),
        mounts: vec![
            nfs_mount(
                "nfs-output",
                OUTPUT_DIR,
                Some(job.id),
                tenant,
                &storage.notebook_output_path,
                false,
            ),
            nfs_mount(
                "nfs-attach",
                ATTACH_DIR,
                Some(job.id),
                tenant,
                &storage.notebook_attached_path,
                false,
            ),
        ],
        constraints,
        ports: vec![PortMapping::tcp(NOTEBOOK_PORT_NAME, NOTEBOOK_PORT)],
        shared_paths: shared_paths(),
        log_path: Some(format!(
            "{ATTACH_DIR}/notebook_stdout_stderr_${{NOTEBOOK_ID}}.log"
        )),
    })
}

/// TensorBoard reads a training's output with a fixed image and footprint.
pub fn build_tensorboard_request(
    training: &TrainingHistory,
    name: &str,
    tenant: &Tenant,
    settings: &ContainerSettings,
    inputs: &SpecInputs,
) -> AppResult<RunRequest> {
    let mut constraints = node_constraints(settings, &inputs.nodes, None)?;
    constraints.insert(
        settings.label_tensorboard_enabled.clone(),
        vec!["true".to_string()],
    );

    // Nothing is user-editable here.
    let mut env = EnvLayers::new();
    for (key, value) in proxy_vars(settings) {
        env.system(key, value);
    }
    for (key, value) in common_system_vars(settings, &inputs.callback_token) {
        env.system(key, value);
    }

    let resources = Resources {
        cpu: 1,
        memory: 1,
        gpu: 0,
    };
    Ok(RunRequest {
        name: name.to_string(),
        tenant_name: tenant.name.clone(),
        kind: JobKind::TensorBoard,
        image: TENSORBOARD_IMAGE.to_string(),
        registry_token_name: None,
        script_type: JobKind::TensorBoard.script_type().to_string(),
        entry_point: format!(
            "tensorboard --logdir={OUTPUT_DIR} --port={TENSORBOARD_PORT} --host=0.0.0.0"
        ),
        cpu: resources.cpu,
        memory: resources.memory,
        gpu: resources.gpu,
        env: env.merge(),
        mounts: vec![nfs_mount(
            "nfs-output",
            OUTPUT_DIR,
            Some(training.id),
            tenant,
            &tenant.storage.training_output_path,
            false,
        )],
        constraints,
        ports: vec![PortMapping::tcp(TENSORBOARD_PORT_NAME, TENSORBOARD_PORT)],
        shared_paths: BTreeMap::new(),
        log_path: None,
    })
}

/// Named port the caller reports back for a kind, if any.
pub fn exposed_port_name(kind: JobKind) -> Option<&'static str> {
    match kind {
        JobKind::Notebook => Some(NOTEBOOK_PORT_NAME),
        JobKind::TensorBoard => Some(TENSORBOARD_PORT_NAME),
        _ => None,
    }
}

fn editable_defaults(settings: &ContainerSettings) -> EnvLayers {
    let mut env = EnvLayers::new();
    for (key, value) in proxy_vars(settings) {
        env.editable(key, value);
    }
    env.editable("COLUMNS", settings.shell_columns.to_string());
    env
}

fn common_vars(env: &mut EnvLayers, settings: &ContainerSettings, inputs: &SpecInputs) {
    for (key, value) in common_system_vars(settings, &inputs.callback_token) {
        env.system(key, value);
    }
}

fn repository_vars(env: &mut EnvLayers, git: &GitEndpoint) {
    env.system("MODEL_REPOSITORY", &git.full_url)
        .system("MODEL_REPOSITORY_URL", &git.url)
        .system(
            "MODEL_REPOSITORY_TOKEN",
            git.token.clone().unwrap_or_default(),
        );
}

fn node_constraints(
    settings: &ContainerSettings,
    nodes: &[String],
    partition: Option<&str>,
) -> AppResult<BTreeMap<String, Vec<String>>> {
    if nodes.is_empty() {
        return Err(AppError::access_denied(
            "Access denied. There is no node this tenant can use.",
        ));
    }
    let mut constraints = BTreeMap::new();
    constraints.insert(settings.label_host_name.clone(), nodes.to_vec());
    if let Some(partition) = partition.filter(|p| !p.trim().is_empty()) {
        constraints.insert(
            settings.label_partition.clone(),
            vec![partition.to_string()],
        );
    }
    Ok(constraints)
}

fn resolve_image(
    image: &ImageRef,
    registry: Option<&RegistryMap>,
) -> AppResult<(String, Option<String>)> {
    match (image.registry_id, registry) {
        (Some(_), Some(map)) => Ok((
            map.image_path(&image.image, &image.tag),
            Some(map.registry_token_name.clone()),
        )),
        (Some(id), None) => Err(AppError::with_message(
            AppErrorKind::FailedPrecondition,
            codes::INVALID_CREDENTIAL,
            format!("Container registry {id} is not available for this tenant."),
        )),
        (None, _) => Ok((image.literal(), None)),
    }
}

fn nfs_mount(
    name: &str,
    mount_path: &str,
    sub_id: Option<i64>,
    tenant: &Tenant,
    server_path: &str,
    read_only: bool,
) -> NfsVolumeMount {
    NfsVolumeMount {
        name: name.to_string(),
        mount_path: mount_path.to_string(),
        sub_path: sub_id.map(|id| id.to_string()),
        server: tenant.storage.nfs_server.clone(),
        server_path: server_path.to_string(),
        read_only,
    }
}

fn parent_mount(parent_id: i64, tenant: &Tenant) -> NfsVolumeMount {
    nfs_mount(
        "nfs-parent",
        PARENT_DIR,
        Some(parent_id),
        tenant,
        &tenant.storage.training_output_path,
        true,
    )
}

fn shared_paths() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("tmp".to_string(), "/fleet/tmp/".to_string()),
        ("input".to_string(), "/fleet/input/".to_string()),
        ("git".to_string(), "/fleet/git/".to_string()),
    ])
}

fn optional_id(id: Option<i64>) -> String {
    id.map(|id| id.to_string()).unwrap_or_default()
}

fn invalid_git_credential() -> AppError {
    AppError::with_message(
        AppErrorKind::FailedPrecondition,
        codes::INVALID_CREDENTIAL,
        "Git credential is not valid.",
    )
}
