// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use serde::{Serialize, de::DeserializeOwned};
use sqlx::{
    Row, SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
};
use std::{path::Path, str::FromStr, time::Duration};
use thiserror::Error;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use crate::app::container::{ContainerStatus, JobKind};
use crate::app::ports::StatusUpdate;
use crate::app::types::{
    Cluster, ClusterInput, JobLocator, Tenant, TenantStorage, TensorBoardContainer, UserIdentity,
};

#[derive(Debug, Error)]
pub enum FleetStoreError {
    #[error("sqlx error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("invalid timestamp: {0}")]
    Timestamp(#[from] time::error::Parse),
    #[error("empty name")]
    EmptyName,
    #[error("empty container key")]
    EmptyKey,
    #[error("unknown job kind '{0}'")]
    UnknownKind(String),
    #[error("container key '{0}' is already used")]
    DuplicateKey(String),
    #[error("tenant not found: {0}")]
    TenantNotFound(i64),
}

/// Who may schedule on a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeAccess {
    Disabled,
    /// Only tenants listed in `node_tenant_maps`.
    Private,
    Public,
}

impl NodeAccess {
    fn as_str(self) -> &'static str {
        match self {
            NodeAccess::Disabled => "disabled",
            NodeAccess::Private => "private",
            NodeAccess::Public => "public",
        }
    }
}

pub type Result<T> = std::result::Result<T, FleetStoreError>;

/// Async store for clusters, tenants, nodes, users and job histories.
#[derive(Clone)]
pub struct FleetStore {
    pool: SqlitePool,
}

impl FleetStore {
    /// Open (or create) a file-backed SQLite DB.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let url = format!("sqlite://{}", path_ref.to_string_lossy());
        let opts = SqliteConnectOptions::from_str(&url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(opts)
            .await?;
        let store = Self { pool };
        store.bootstrap().await?;
        Ok(store)
    }

    /// Open an in-memory store (handy for tests).
    #[allow(dead_code)]
    pub async fn open_memory() -> Result<Self> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;
        let store = Self { pool };
        store.bootstrap().await?;
        Ok(store)
    }

    async fn bootstrap(&self) -> Result<()> {
        // Improve concurrency for file DBs.
        let _ = sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&self.pool)
            .await;

        self.ensure_tenancy_tables().await?;
        self.ensure_node_tables().await?;
        self.ensure_user_tables().await?;
        self.ensure_job_tables().await?;
        Ok(())
    }

    async fn ensure_tenancy_tables(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tenants (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              name TEXT NOT NULL,
              display_name TEXT NOT NULL,
              limit_cpu INTEGER,
              limit_memory INTEGER,
              limit_gpu INTEGER,
              default_git_id INTEGER,
              storage TEXT NOT NULL,            -- JSON TenantStorage
              created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
              updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now'))
            );
            CREATE UNIQUE INDEX IF NOT EXISTS idx_tenants_name ON tenants(name);

            CREATE TABLE IF NOT EXISTS clusters (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              display_name TEXT NOT NULL,
              host_name TEXT NOT NULL,
              port INTEGER NOT NULL,
              resource_manage_key TEXT NOT NULL,
              memo TEXT,
              created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
              updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now'))
            );

            CREATE TABLE IF NOT EXISTS cluster_tenant_maps (
              cluster_id INTEGER NOT NULL REFERENCES clusters(id) ON DELETE CASCADE,
              tenant_id INTEGER NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
              UNIQUE(cluster_id, tenant_id)
            );
            CREATE INDEX IF NOT EXISTS idx_cluster_tenant_maps_tenant
              ON cluster_tenant_maps(tenant_id);
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn ensure_node_tables(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS nodes (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              name TEXT NOT NULL,
              partition TEXT,
              access_level TEXT NOT NULL DEFAULT 'public'
                CHECK (access_level IN ('disabled', 'private', 'public')),
              created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now'))
            );
            CREATE UNIQUE INDEX IF NOT EXISTS idx_nodes_name ON nodes(name);

            CREATE TABLE IF NOT EXISTS node_tenant_maps (
              node_id INTEGER NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
              tenant_id INTEGER NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
              UNIQUE(node_id, tenant_id)
            );
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn ensure_user_tables(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              name TEXT NOT NULL,
              alias TEXT,
              created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now'))
            );
            CREATE UNIQUE INDEX IF NOT EXISTS idx_users_name ON users(name);

            CREATE TABLE IF NOT EXISTS user_cluster_tokens (
              user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
              tenant_id INTEGER NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
              token TEXT NOT NULL,
              updated_at TEXT NOT NULL,
              UNIQUE(user_id, tenant_id)
            );
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn ensure_job_tables(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS job_histories (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              kind TEXT NOT NULL
                CHECK (kind IN ('preprocess', 'training', 'inference', 'notebook')),
              key TEXT NOT NULL,
              tenant_id INTEGER NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
              cluster_id INTEGER REFERENCES clusters(id) ON DELETE SET NULL,
              status TEXT NOT NULL DEFAULT 'None',
              started_at TEXT,
              completed_at TEXT,
              payload TEXT NOT NULL,            -- JSON job entity
              created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now'))
            );
            CREATE UNIQUE INDEX IF NOT EXISTS idx_job_histories_key ON job_histories(key);
            CREATE INDEX IF NOT EXISTS idx_job_histories_tenant ON job_histories(tenant_id);

            CREATE TABLE IF NOT EXISTS tensorboard_containers (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              name TEXT NOT NULL,
              tenant_id INTEGER NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
              training_history_id INTEGER NOT NULL
                REFERENCES job_histories(id) ON DELETE CASCADE,
              host TEXT,
              port INTEGER,
              status TEXT NOT NULL DEFAULT 'Pending',
              started_at TEXT NOT NULL
            );
            CREATE UNIQUE INDEX IF NOT EXISTS idx_tensorboard_containers_name
              ON tensorboard_containers(name);
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ---------- tenants ----------

    /// Inserts a tenant; `tenant.id` is ignored.
    pub async fn insert_tenant(&self, tenant: &Tenant) -> Result<i64> {
        if tenant.name.trim().is_empty() {
            return Err(FleetStoreError::EmptyName);
        }
        let storage = serde_json::to_string(&tenant.storage)?;
        let rec = sqlx::query(
            r#"
            INSERT INTO tenants(
              name, display_name, limit_cpu, limit_memory, limit_gpu, default_git_id, storage
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(&tenant.name)
        .bind(&tenant.display_name)
        .bind(tenant.limit_cpu)
        .bind(tenant.limit_memory)
        .bind(tenant.limit_gpu)
        .bind(tenant.default_git_id)
        .bind(storage)
        .fetch_one(&self.pool)
        .await?;
        Ok(rec.try_get::<i64, _>("id")?)
    }

    pub async fn get_tenant(&self, id: i64) -> Result<Option<Tenant>> {
        let row = sqlx::query("SELECT * FROM tenants WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(row_to_tenant).transpose()
    }

    pub async fn list_tenants(&self) -> Result<Vec<Tenant>> {
        let rows = sqlx::query("SELECT * FROM tenants ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(row_to_tenant).collect()
    }

    /// `None` stores "unlimited".
    pub async fn update_tenant_limits(
        &self,
        id: i64,
        cpu: Option<u32>,
        memory: Option<u32>,
        gpu: Option<u32>,
    ) -> Result<()> {
        let res = sqlx::query(
            r#"
            UPDATE tenants
               SET limit_cpu = ?, limit_memory = ?, limit_gpu = ?, updated_at = ?
             WHERE id = ?
            "#,
        )
        .bind(cpu)
        .bind(memory)
        .bind(gpu)
        .bind(now_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;
        if res.rows_affected() == 0 {
            return Err(FleetStoreError::TenantNotFound(id));
        }
        Ok(())
    }

    // ---------- clusters ----------

    pub async fn insert_cluster(&self, input: &ClusterInput) -> Result<i64> {
        let mut tx = self.pool.begin().await?;
        let rec = sqlx::query(
            r#"
            INSERT INTO clusters(display_name, host_name, port, resource_manage_key, memo)
            VALUES (?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(&input.display_name)
        .bind(&input.host_name)
        .bind(input.port)
        .bind(&input.resource_manage_key)
        .bind(&input.memo)
        .fetch_one(&mut *tx)
        .await?;
        let id = rec.try_get::<i64, _>("id")?;

        for tenant_id in &input.tenant_ids {
            sqlx::query("INSERT INTO cluster_tenant_maps(cluster_id, tenant_id) VALUES (?, ?)")
                .bind(id)
                .bind(tenant_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(id)
    }

    /// Overwrites every column and replaces the tenant assignments.
    pub async fn update_cluster(&self, id: i64, input: &ClusterInput) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            UPDATE clusters
               SET display_name = ?, host_name = ?, port = ?, resource_manage_key = ?,
                   memo = ?, updated_at = ?
             WHERE id = ?
            "#,
        )
        .bind(&input.display_name)
        .bind(&input.host_name)
        .bind(input.port)
        .bind(&input.resource_manage_key)
        .bind(&input.memo)
        .bind(now_rfc3339())
        .bind(id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM cluster_tenant_maps WHERE cluster_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        for tenant_id in &input.tenant_ids {
            sqlx::query("INSERT INTO cluster_tenant_maps(cluster_id, tenant_id) VALUES (?, ?)")
                .bind(id)
                .bind(tenant_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn delete_cluster(&self, id: i64) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM cluster_tenant_maps WHERE cluster_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let res = sqlx::query("DELETE FROM clusters WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn get_cluster(&self, id: i64) -> Result<Option<Cluster>> {
        let row = sqlx::query("SELECT * FROM clusters WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(row_to_cluster).transpose()
    }

    pub async fn list_clusters(&self) -> Result<Vec<Cluster>> {
        let rows = sqlx::query("SELECT * FROM clusters ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(row_to_cluster).collect()
    }

    pub async fn accessible_clusters(&self, tenant_id: i64) -> Result<Vec<Cluster>> {
        let rows = sqlx::query(
            r#"
            SELECT c.*
              FROM clusters c
              JOIN cluster_tenant_maps m ON m.cluster_id = c.id
             WHERE m.tenant_id = ?
             ORDER BY c.id
            "#,
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_cluster).collect()
    }

    pub async fn assigned_tenants(&self, cluster_id: i64) -> Result<Vec<Tenant>> {
        let rows = sqlx::query(
            r#"
            SELECT t.*
              FROM tenants t
              JOIN cluster_tenant_maps m ON m.tenant_id = t.id
             WHERE m.cluster_id = ?
             ORDER BY t.id
            "#,
        )
        .bind(cluster_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_tenant).collect()
    }

    // ---------- nodes ----------

    pub async fn insert_node(
        &self,
        name: &str,
        partition: Option<&str>,
        access: NodeAccess,
        tenant_ids: &[i64],
    ) -> Result<i64> {
        if name.trim().is_empty() {
            return Err(FleetStoreError::EmptyName);
        }
        let mut tx = self.pool.begin().await?;
        let rec = sqlx::query(
            "INSERT INTO nodes(name, partition, access_level) VALUES (?, ?, ?) RETURNING id",
        )
        .bind(name)
        .bind(partition)
        .bind(access.as_str())
        .fetch_one(&mut *tx)
        .await?;
        let id = rec.try_get::<i64, _>("id")?;
        for tenant_id in tenant_ids {
            sqlx::query("INSERT INTO node_tenant_maps(node_id, tenant_id) VALUES (?, ?)")
                .bind(id)
                .bind(tenant_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(id)
    }

    /// Public nodes plus private nodes assigned to the tenant.
    pub async fn accessible_node_names(&self, tenant_id: i64) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT n.name
              FROM nodes n
             WHERE n.access_level = 'public'
                OR (n.access_level = 'private' AND EXISTS (
                      SELECT 1 FROM node_tenant_maps m
                       WHERE m.node_id = n.id AND m.tenant_id = ?))
             ORDER BY n.name
            "#,
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|row| Ok(row.try_get::<String, _>("name")?))
            .collect()
    }

    pub async fn all_node_names(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT name FROM nodes ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(|row| Ok(row.try_get::<String, _>("name")?))
            .collect()
    }

    // ---------- users ----------

    pub async fn insert_user(&self, name: &str, alias: Option<&str>) -> Result<i64> {
        if name.trim().is_empty() {
            return Err(FleetStoreError::EmptyName);
        }
        let rec = sqlx::query("INSERT INTO users(name, alias) VALUES (?, ?) RETURNING id")
            .bind(name)
            .bind(alias)
            .fetch_one(&self.pool)
            .await?;
        Ok(rec.try_get::<i64, _>("id")?)
    }

    pub async fn get_user(&self, id: i64) -> Result<Option<UserIdentity>> {
        let row = sqlx::query("SELECT id, name, alias FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| {
            Ok(UserIdentity {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
                alias: row.try_get("alias")?,
            })
        })
        .transpose()
    }

    pub async fn set_alias(&self, user_id: i64, alias: &str) -> Result<()> {
        sqlx::query("UPDATE users SET alias = ? WHERE id = ?")
            .bind(alias)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn cluster_token(&self, user_id: i64, tenant_id: i64) -> Result<Option<String>> {
        let row = sqlx::query(
            "SELECT token FROM user_cluster_tokens WHERE user_id = ? AND tenant_id = ?",
        )
        .bind(user_id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row
            .map(|row| row.try_get::<String, _>("token"))
            .transpose()?)
    }

    pub async fn set_cluster_token(&self, user_id: i64, tenant_id: i64, token: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO user_cluster_tokens(user_id, tenant_id, token, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(user_id, tenant_id)
            DO UPDATE SET token = excluded.token, updated_at = excluded.updated_at
            "#,
        )
        .bind(user_id)
        .bind(tenant_id)
        .bind(token)
        .bind(now_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn clear_cluster_token(&self, user_id: i64, tenant_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM user_cluster_tokens WHERE user_id = ? AND tenant_id = ?")
            .bind(user_id)
            .bind(tenant_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ---------- job histories ----------

    /// Stores a job entity under its key; the row id becomes the entity id.
    pub async fn insert_job<T: Serialize>(
        &self,
        kind: JobKind,
        key: &str,
        tenant_id: i64,
        cluster_id: Option<i64>,
        job: &T,
    ) -> Result<i64> {
        if key.trim().is_empty() {
            return Err(FleetStoreError::EmptyKey);
        }
        if kind == JobKind::TensorBoard {
            return Err(FleetStoreError::UnknownKind(kind.as_str().to_string()));
        }
        let existing = sqlx::query("SELECT 1 FROM job_histories WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        if existing.is_some() {
            return Err(FleetStoreError::DuplicateKey(key.to_string()));
        }

        let payload = serde_json::to_string(job)?;
        let rec = sqlx::query(
            r#"
            INSERT INTO job_histories(kind, key, tenant_id, cluster_id, payload)
            VALUES (?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(kind.as_str())
        .bind(key)
        .bind(tenant_id)
        .bind(cluster_id)
        .bind(payload)
        .fetch_one(&self.pool)
        .await?;
        Ok(rec.try_get::<i64, _>("id")?)
    }

    /// Loads a job entity with its id, key, status and timestamps taken from the row.
    pub async fn get_job<T: DeserializeOwned>(&self, kind: JobKind, id: i64) -> Result<Option<T>> {
        let row = sqlx::query("SELECT * FROM job_histories WHERE kind = ? AND id = ?")
            .bind(kind.as_str())
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };

        let payload: String = row.try_get("payload")?;
        let mut value: serde_json::Value = serde_json::from_str(&payload)?;
        if let Some(fields) = value.as_object_mut() {
            fields.insert("id".into(), serde_json::to_value(id)?);
            fields.insert("key".into(), row.try_get::<String, _>("key")?.into());
            let status = ContainerStatus::parse(&row.try_get::<String, _>("status")?);
            fields.insert("status".into(), serde_json::to_value(status)?);
            let started_at = parse_time(row.try_get("started_at")?)?;
            fields.insert("started_at".into(), serde_json::to_value(started_at)?);
            let completed_at = parse_time(row.try_get("completed_at")?)?;
            fields.insert("completed_at".into(), serde_json::to_value(completed_at)?);
        }
        Ok(Some(serde_json::from_value(value)?))
    }

    pub async fn locate_job(&self, key: &str) -> Result<Option<JobLocator>> {
        let row = sqlx::query(
            "SELECT id, kind, tenant_id, cluster_id FROM job_histories WHERE key = ?",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let kind: String = row.try_get("kind")?;
        Ok(Some(JobLocator {
            kind: JobKind::parse(&kind).ok_or(FleetStoreError::UnknownKind(kind))?,
            id: row.try_get("id")?,
            tenant_id: row.try_get("tenant_id")?,
            cluster_id: row.try_get("cluster_id")?,
        }))
    }

    /// Timestamps left as `None` keep their stored values.
    pub async fn update_job_status(
        &self,
        kind: JobKind,
        id: i64,
        tenant_id: i64,
        update: StatusUpdate,
        force: bool,
    ) -> Result<bool> {
        let res = sqlx::query(
            r#"
            UPDATE job_histories
               SET status = ?,
                   started_at = COALESCE(?, started_at),
                   completed_at = COALESCE(?, completed_at)
             WHERE kind = ? AND id = ? AND (? OR tenant_id = ?)
            "#,
        )
        .bind(update.status.name())
        .bind(format_time(update.started_at))
        .bind(format_time(update.completed_at))
        .bind(kind.as_str())
        .bind(id)
        .bind(force)
        .bind(tenant_id)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    // ---------- tensorboards ----------

    pub async fn insert_tensorboard(
        &self,
        name: &str,
        tenant_id: i64,
        training_history_id: i64,
    ) -> Result<i64> {
        if name.trim().is_empty() {
            return Err(FleetStoreError::EmptyName);
        }
        let rec = sqlx::query(
            r#"
            INSERT INTO tensorboard_containers(name, tenant_id, training_history_id, started_at)
            VALUES (?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(name)
        .bind(tenant_id)
        .bind(training_history_id)
        .bind(now_rfc3339())
        .fetch_one(&self.pool)
        .await?;
        Ok(rec.try_get::<i64, _>("id")?)
    }

    pub async fn list_tensorboards(&self) -> Result<Vec<TensorBoardContainer>> {
        let rows = sqlx::query(
            r#"
            SELECT c.*, t.name AS tenant_name
              FROM tensorboard_containers c
              JOIN tenants t ON t.id = c.tenant_id
             ORDER BY c.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_tensorboard).collect()
    }

    pub async fn get_tensorboard(&self, id: i64) -> Result<Option<TensorBoardContainer>> {
        let row = sqlx::query(
            r#"
            SELECT c.*, t.name AS tenant_name
              FROM tensorboard_containers c
              JOIN tenants t ON t.id = c.tenant_id
             WHERE c.id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(row_to_tensorboard).transpose()
    }

    pub async fn update_tensorboard_endpoint(
        &self,
        id: i64,
        host: &str,
        port: u16,
        status: ContainerStatus,
    ) -> Result<()> {
        sqlx::query("UPDATE tensorboard_containers SET host = ?, port = ?, status = ? WHERE id = ?")
            .bind(host)
            .bind(port)
            .bind(status.name())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn update_tensorboard_status(
        &self,
        id: i64,
        tenant_id: i64,
        status: ContainerStatus,
        force: bool,
    ) -> Result<bool> {
        let res = sqlx::query(
            "UPDATE tensorboard_containers SET status = ? WHERE id = ? AND (? OR tenant_id = ?)",
        )
        .bind(status.name())
        .bind(id)
        .bind(force)
        .bind(tenant_id)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn delete_tensorboard(&self, id: i64) -> Result<bool> {
        let res = sqlx::query("DELETE FROM tensorboard_containers WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".into())
}

fn format_time(value: Option<OffsetDateTime>) -> Option<String> {
    value.and_then(|t| t.format(&Rfc3339).ok())
}

fn parse_time(value: Option<String>) -> Result<Option<OffsetDateTime>> {
    value
        .map(|s| OffsetDateTime::parse(&s, &Rfc3339))
        .transpose()
        .map_err(FleetStoreError::from)
}

fn row_to_cluster(row: SqliteRow) -> Result<Cluster> {
    Ok(Cluster {
        id: row.try_get("id")?,
        display_name: row.try_get("display_name")?,
        host_name: row.try_get("host_name")?,
        port: row.try_get("port")?,
        resource_manage_key: row.try_get("resource_manage_key")?,
        memo: row.try_get("memo")?,
    })
}

fn row_to_tenant(row: SqliteRow) -> Result<Tenant> {
    let storage: String = row.try_get("storage")?;
    let storage: TenantStorage = serde_json::from_str(&storage)?;
    Ok(Tenant {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        display_name: row.try_get("display_name")?,
        limit_cpu: row.try_get("limit_cpu")?,
        limit_memory: row.try_get("limit_memory")?,
        limit_gpu: row.try_get("limit_gpu")?,
        default_git_id: row.try_get("default_git_id")?,
        storage,
    })
}

fn row_to_tensorboard(row: SqliteRow) -> Result<TensorBoardContainer> {
    let status: String = row.try_get("status")?;
    let started_at: String = row.try_get("started_at")?;
    Ok(TensorBoardContainer {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        tenant_id: row.try_get("tenant_id")?,
        tenant_name: row.try_get("tenant_name")?,
        training_history_id: row.try_get("training_history_id")?,
        host: row.try_get("host")?,
        port: row.try_get("port")?,
        status: ContainerStatus::parse(&status),
        started_at: Some(OffsetDateTime::parse(&started_at, &Rfc3339)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::types::{ImageRef, JobOptions, ModelRepository, Resources, TrainingHistory};
    use time::macros::datetime;

    fn tenant(name: &str) -> Tenant {
        Tenant {
            id: 0,
            name: name.to_string(),
            display_name: name.to_uppercase(),
            limit_cpu: None,
            limit_memory: Some(64),
            limit_gpu: None,
            default_git_id: Some(1),
            storage: TenantStorage {
                nfs_server: "nfs.local".into(),
                training_output_path: format!("/exports/{name}/training/output"),
                ..TenantStorage::default()
            },
        }
    }

    fn cluster_input(host: &str, tenant_ids: &[i64]) -> ClusterInput {
        ClusterInput {
            display_name: host.to_uppercase(),
            host_name: host.to_string(),
            port: 6443,
            resource_manage_key: format!("{host}-key"),
            memo: Some("rack 4".into()),
            tenant_ids: tenant_ids.to_vec(),
        }
    }

    fn training(tenant_id: i64) -> TrainingHistory {
        TrainingHistory {
            id: 0,
            key: String::new(),
            tenant_id,
            image: ImageRef {
                registry_id: None,
                image: "pytorch/pytorch".into(),
                tag: "2.1".into(),
            },
            model: ModelRepository {
                git_id: -1,
                name: "model".into(),
                owner: "acme".into(),
                commit_id: None,
            },
            data_set_id: 5,
            parent_id: None,
            entry_point: "python train.py".into(),
            resources: Resources {
                cpu: 2,
                memory: 8,
                gpu: 1,
            },
            partition: None,
            cluster_id: None,
            options: JobOptions::new(),
            zip: true,
            status: ContainerStatus::None,
            started_at: None,
            completed_at: None,
        }
    }

    #[tokio::test]
    async fn tenant_roundtrip_and_limits() {
        let store = FleetStore::open_memory().await.unwrap();
        let id = store.insert_tenant(&tenant("acme")).await.unwrap();
        let loaded = store.get_tenant(id).await.unwrap().unwrap();
        assert_eq!(loaded.name, "acme");
        assert_eq!(loaded.limit_memory, Some(64));
        assert_eq!(loaded.storage.nfs_server, "nfs.local");

        store
            .update_tenant_limits(id, Some(8), None, Some(2))
            .await
            .unwrap();
        let loaded = store.get_tenant(id).await.unwrap().unwrap();
        assert_eq!(loaded.limit_cpu, Some(8));
        assert_eq!(loaded.limit_memory, None);
        assert_eq!(loaded.limit_gpu, Some(2));

        let err = store
            .update_tenant_limits(999, None, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, FleetStoreError::TenantNotFound(999)));
    }

    #[tokio::test]
    async fn empty_tenant_name_is_rejected() {
        let store = FleetStore::open_memory().await.unwrap();
        let err = store.insert_tenant(&tenant(" ")).await.unwrap_err();
        assert!(matches!(err, FleetStoreError::EmptyName));
    }

    #[tokio::test]
    async fn cluster_assignments_follow_updates() {
        let store = FleetStore::open_memory().await.unwrap();
        let acme = store.insert_tenant(&tenant("acme")).await.unwrap();
        let beta = store.insert_tenant(&tenant("beta")).await.unwrap();

        let id = store
            .insert_cluster(&cluster_input("east", &[acme]))
            .await
            .unwrap();
        let cluster = store.get_cluster(id).await.unwrap().unwrap();
        assert_eq!(cluster.service_base_url(), "https://east:6443");
        assert_eq!(cluster.memo.as_deref(), Some("rack 4"));
        assert_eq!(store.accessible_clusters(acme).await.unwrap().len(), 1);
        assert!(store.accessible_clusters(beta).await.unwrap().is_empty());

        store
            .update_cluster(id, &cluster_input("south", &[beta]))
            .await
            .unwrap();
        let names: Vec<_> = store
            .assigned_tenants(id)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, vec!["beta"]);
        assert_eq!(store.get_cluster(id).await.unwrap().unwrap().host_name, "south");

        assert!(store.delete_cluster(id).await.unwrap());
        assert!(!store.delete_cluster(id).await.unwrap());
        assert!(store.list_clusters().await.unwrap().is_empty());
        assert!(store.accessible_clusters(beta).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn duplicate_assignment_rolls_back_insert() {
        let store = FleetStore::open_memory().await.unwrap();
        let acme = store.insert_tenant(&tenant("acme")).await.unwrap();
        let err = store
            .insert_cluster(&cluster_input("east", &[acme, acme]))
            .await;
        assert!(err.is_err());
        assert!(store.list_clusters().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn node_access_levels() {
        let store = FleetStore::open_memory().await.unwrap();
        let acme = store.insert_tenant(&tenant("acme")).await.unwrap();
        let beta = store.insert_tenant(&tenant("beta")).await.unwrap();
        store
            .insert_node("node-a", None, NodeAccess::Public, &[])
            .await
            .unwrap();
        store
            .insert_node("node-b", Some("a100"), NodeAccess::Private, &[acme])
            .await
            .unwrap();
        store
            .insert_node("node-c", None, NodeAccess::Disabled, &[acme])
            .await
            .unwrap();

        assert_eq!(
            store.accessible_node_names(acme).await.unwrap(),
            vec!["node-a", "node-b"]
        );
        assert_eq!(store.accessible_node_names(beta).await.unwrap(), vec!["node-a"]);
        assert_eq!(store.all_node_names().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn cluster_tokens_upsert_and_clear() {
        let store = FleetStore::open_memory().await.unwrap();
        let acme = store.insert_tenant(&tenant("acme")).await.unwrap();
        let user = store.insert_user("alice", None).await.unwrap();

        assert_eq!(store.cluster_token(user, acme).await.unwrap(), None);
        store.set_cluster_token(user, acme, "t1").await.unwrap();
        store.set_cluster_token(user, acme, "t2").await.unwrap();
        assert_eq!(
            store.cluster_token(user, acme).await.unwrap().as_deref(),
            Some("t2")
        );
        store.clear_cluster_token(user, acme).await.unwrap();
        assert_eq!(store.cluster_token(user, acme).await.unwrap(), None);

        store.set_alias(user, "qwertyuiop").await.unwrap();
        let identity = store.get_user(user).await.unwrap().unwrap();
        assert_eq!(identity.alias.as_deref(), Some("qwertyuiop"));
    }

    #[tokio::test]
    async fn job_status_updates_respect_tenant_unless_forced() {
        let store = FleetStore::open_memory().await.unwrap();
        let acme = store.insert_tenant(&tenant("acme")).await.unwrap();
        let id = store
            .insert_job(JobKind::Training, "training-0001-1", acme, None, &training(acme))
            .await
            .unwrap();

        let locator = store.locate_job("training-0001-1").await.unwrap().unwrap();
        assert_eq!(locator.kind, JobKind::Training);
        assert_eq!(locator.id, id);
        assert_eq!(locator.cluster_id, None);
        assert!(store.locate_job("missing").await.unwrap().is_none());

        let started = datetime!(2026-01-01 10:00:00 UTC);
        let update = StatusUpdate {
            status: ContainerStatus::Running,
            started_at: Some(started),
            completed_at: None,
        };
        assert!(
            !store
                .update_job_status(JobKind::Training, id, acme + 1, update, false)
                .await
                .unwrap()
        );
        assert!(
            store
                .update_job_status(JobKind::Training, id, acme, update, false)
                .await
                .unwrap()
        );
        assert!(
            store
                .update_job_status(
                    JobKind::Training,
                    id,
                    acme + 1,
                    StatusUpdate::status_only(ContainerStatus::Killed),
                    true,
                )
                .await
                .unwrap()
        );

        let job: TrainingHistory = store
            .get_job(JobKind::Training, id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(job.id, id);
        assert_eq!(job.key, "training-0001-1");
        assert_eq!(job.status, ContainerStatus::Killed);
        assert_eq!(job.started_at, Some(started));
        assert_eq!(job.completed_at, None);
        assert!(
            store
                .get_job::<TrainingHistory>(JobKind::Inference, id)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn duplicate_job_key_is_rejected() {
        let store = FleetStore::open_memory().await.unwrap();
        let acme = store.insert_tenant(&tenant("acme")).await.unwrap();
        store
            .insert_job(JobKind::Training, "k", acme, None, &training(acme))
            .await
            .unwrap();
        let err = store
            .insert_job(JobKind::Notebook, "k", acme, None, &training(acme))
            .await
            .unwrap_err();
        assert!(matches!(err, FleetStoreError::DuplicateKey(_)));
    }

    #[tokio::test]
    async fn tensorboard_records() {
        let store = FleetStore::open_memory().await.unwrap();
        let acme = store.insert_tenant(&tenant("acme")).await.unwrap();
        let training_id = store
            .insert_job(JobKind::Training, "training-0001-1", acme, None, &training(acme))
            .await
            .unwrap();
        let id = store
            .insert_tensorboard("tensorboard-0001-1-x", acme, training_id)
            .await
            .unwrap();

        let listed = store.list_tensorboards().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].tenant_name, "acme");
        assert_eq!(listed[0].status, ContainerStatus::Pending);
        assert!(listed[0].host.is_none());

        store
            .update_tensorboard_endpoint(id, "10.0.0.5", 31006, ContainerStatus::Running)
            .await
            .unwrap();
        let tb = store.get_tensorboard(id).await.unwrap().unwrap();
        assert_eq!(tb.host.as_deref(), Some("10.0.0.5"));
        assert_eq!(tb.port, Some(31006));

        assert!(
            !store
                .update_tensorboard_status(id, acme + 1, ContainerStatus::Failed, false)
                .await
                .unwrap()
        );
        assert!(store.delete_tensorboard(id).await.unwrap());
        assert!(store.get_tensorboard(id).await.unwrap().is_none());
    }
}
