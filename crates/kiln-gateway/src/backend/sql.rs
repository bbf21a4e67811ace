use std::path::PathBuf;
use std::sync::{Arc, Mutex, OnceLock};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info, warn};

use crate::backend::{validate_key, GatewayKind, STORAGE_VERSION};
use crate::error::{GatewayError, GatewayResult};
use crate::naming::StoreName;
use crate::once::KeyedResolveOnce;
use crate::role::StoreRole;
use crate::traits::Gateway;
use crate::uri::{param, StoreUri};

/// Wrapped in a Mutex because `rusqlite::Connection` is `!Sync`.
type SqlConn = Arc<Mutex<Connection>>;

fn connections() -> &'static KeyedResolveOnce<SqlConn> {
    static CONNECTIONS: OnceLock<KeyedResolveOnce<SqlConn>> = OnceLock::new();
    CONNECTIONS.get_or_init(KeyedResolveOnce::new)
}

/// Relational gateway backed by SQLite.
///
/// One database file per logical store at `<path>/<name>.sqlite` (the name
/// as given by [`unique_store_name`](crate::unique_store_name)), one
/// table per [`StoreRole`] with `(key TEXT PRIMARY KEY, bytes BLOB)`.
pub struct SqlGateway;

impl SqlGateway {
    pub fn new() -> Self {
        Self
    }

    fn db_file(uri: &StoreUri) -> GatewayResult<PathBuf> {
        if uri.path().is_empty() {
            return Err(GatewayError::InvalidUri {
                uri: uri.to_string(),
                reason: "sql store needs a directory path".into(),
            });
        }
        let name = StoreName::from_uri(uri)?;
        Ok(PathBuf::from(uri.path()).join(format!("{}.sqlite", name.name)))
    }

    async fn connect(uri: &StoreUri) -> GatewayResult<SqlConn> {
        let file = Self::db_file(uri)?;
        let key = file.to_string_lossy().into_owned();
        connections()
            .get_or_try_init(&key, || async {
                let path = file.clone();
                let conn = tokio::task::spawn_blocking(move || open_database(path)).await??;
                info!(file = %file.display(), "sql store opened");
                Ok::<_, GatewayError>(Arc::new(Mutex::new(conn)))
            })
            .await
    }

    /// Run `f` against the connection and the URI's role table on the
    /// blocking pool.
    async fn with_table<T, F>(uri: &StoreUri, f: F) -> GatewayResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection, &'static str) -> rusqlite::Result<T> + Send + 'static,
    {
        let table = uri.store_role()?.as_str();
        let conn = Self::connect(uri).await?;
        let out = tokio::task::spawn_blocking(move || {
            let guard = conn.lock().expect("lock poisoned");
            f(&guard, table)
        })
        .await??;
        Ok(out)
    }
}

fn open_database(path: PathBuf) -> GatewayResult<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(&path)?;
    for role in StoreRole::ALL {
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {} (key TEXT PRIMARY KEY NOT NULL, bytes BLOB NOT NULL);",
            role.as_str()
        ))?;
    }
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS version (id INTEGER PRIMARY KEY CHECK (id = 1), version TEXT NOT NULL);",
    )?;
    let found: Option<String> = conn
        .query_row("SELECT version FROM version WHERE id = 1", [], |row| row.get(0))
        .optional()?;
    match found {
        None => {
            conn.execute(
                "INSERT INTO version (id, version) VALUES (1, ?1)",
                params![STORAGE_VERSION],
            )?;
        }
        Some(v) if v != STORAGE_VERSION => {
            warn!(file = %path.display(), found = %v, expected = STORAGE_VERSION, "sql store version mismatch");
        }
        Some(_) => {}
    }
    Ok(conn)
}

impl Default for SqlGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Gateway for SqlGateway {
    fn kind(&self) -> GatewayKind {
        GatewayKind::Sql
    }

    async fn start(&self, base: &StoreUri) -> GatewayResult<StoreUri> {
        base.store_role()?;
        Self::connect(base).await?;
        Ok(base.with_default_param(param::VERSION, STORAGE_VERSION))
    }

    async fn close(&self, _base: &StoreUri) -> GatewayResult<()> {
        Ok(())
    }

    async fn destroy(&self, base: &StoreUri) -> GatewayResult<()> {
        let removed = Self::with_table(base, |conn, table| {
            conn.execute(&format!("DELETE FROM {table}"), [])
        })
        .await?;
        debug!(removed, "destroyed sql store");
        Ok(())
    }

    async fn put(&self, uri: &StoreUri, bytes: &[u8]) -> GatewayResult<()> {
        let key = uri.key()?.to_string();
        validate_key(&key)?;
        let bytes = bytes.to_vec();
        Self::with_table(uri, move |conn, table| {
            conn.execute(
                &format!("INSERT OR REPLACE INTO {table} (key, bytes) VALUES (?1, ?2)"),
                params![key, bytes],
            )
        })
        .await?;
        Ok(())
    }

    async fn get(&self, uri: &StoreUri) -> GatewayResult<Vec<u8>> {
        let key = uri.key()?.to_string();
        validate_key(&key)?;
        let lookup = key.clone();
        let found = Self::with_table(uri, move |conn, table| {
            conn.query_row(
                &format!("SELECT bytes FROM {table} WHERE key = ?1"),
                params![lookup],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()
        })
        .await?;
        found.ok_or(GatewayError::NotFound { key })
    }

    async fn delete(&self, uri: &StoreUri) -> GatewayResult<()> {
        let key = uri.key()?.to_string();
        validate_key(&key)?;
        Self::with_table(uri, move |conn, table| {
            conn.execute(&format!("DELETE FROM {table} WHERE key = ?1"), params![key])
        })
        .await?;
        Ok(())
    }

    async fn keys(&self, base: &StoreUri) -> GatewayResult<Vec<String>> {
        Self::with_table(base, |conn, table| {
            let mut stmt = conn.prepare(&format!("SELECT key FROM {table} ORDER BY key"))?;
            let keys = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<String>>>()?;
            Ok(keys)
        })
        .await
    }
}

impl std::fmt::Debug for SqlGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlGateway").finish()
    }
}
