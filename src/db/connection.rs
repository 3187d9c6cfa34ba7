//! A single exclusively-owned database connection.
//!
//! Each session owns exactly one physical connection. The connection tracks
//! its own autocommit state, which is changed only through [`DbConnection::begin`],
//! [`DbConnection::commit`] and [`DbConnection::rollback`].

use crate::db::types::rows_to_json;
use crate::error::{DbError, DbResult};
use crate::models::{ConnectionInfo, DatabaseType, JsonRow};
use crate::with_backend;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlSslMode};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::{Column, Connection, Executor};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

/// Driver-specific physical connection.
#[derive(Debug)]
pub enum Backend {
    MySql(MySqlConnection),
    SQLite(SqliteConnection),
}

#[derive(Debug)]
pub struct DbConnection {
    backend: Backend,
    autocommit: bool,
}

impl DbConnection {
    /// Open a physical connection described by `info`.
    ///
    /// `context` prefixes the error message on failure.
    pub async fn open(info: &ConnectionInfo, timeout: Duration, context: &str) -> DbResult<Self> {
        let attempt = async {
            match info.db_type {
                DatabaseType::MySQL => {
                    let options = mysql_options(info);
                    MySqlConnection::connect_with(&options)
                        .await
                        .map(Backend::MySql)
                }
                DatabaseType::SQLite => match sqlite_options(info) {
                    Ok(options) => SqliteConnection::connect_with(&options)
                        .await
                        .map(Backend::SQLite),
                    Err(e) => Err(e),
                },
            }
        };

        let backend = match tokio::time::timeout(timeout, attempt).await {
            Ok(Ok(backend)) => backend,
            Ok(Err(e)) => {
                return Err(DbError::connection(
                    format!("{}: {}", context, e),
                    connection_suggestion(info.db_type, &e),
                ));
            }
            Err(_) => return Err(DbError::timeout("connect", timeout.as_secs())),
        };

        Ok(Self {
            backend,
            autocommit: true,
        })
    }

    /// Get the database type for this connection.
    pub fn db_type(&self) -> DatabaseType {
        match self.backend {
            Backend::MySql(_) => DatabaseType::MySQL,
            Backend::SQLite(_) => DatabaseType::SQLite,
        }
    }

    /// Mutable access to the driver connection for backend-specific queries.
    pub fn backend_mut(&mut self) -> &mut Backend {
        &mut self.backend
    }

    /// True unless an explicit transaction is open.
    pub fn is_autocommit(&self) -> bool {
        self.autocommit
    }

    /// Round-trip a ping to the server.
    pub async fn ping(&mut self) -> Result<(), sqlx::Error> {
        with_backend!(&mut self.backend, c => c.ping().await)
    }

    /// Close the connection, discarding any error.
    pub async fn close(self) {
        let result = with_backend!(self.backend, c => c.close().await);
        if let Err(e) = result {
            debug!(error = %e, "Error while closing connection (ignored)");
        }
    }

    /// Get the server version from the connected database.
    pub async fn server_version(&mut self) -> Option<String> {
        let sql = match self.backend {
            Backend::MySql(_) => "SELECT version()",
            Backend::SQLite(_) => "SELECT sqlite_version()",
        };
        let result: Result<String, sqlx::Error> = with_backend!(&mut self.backend, c => {
            sqlx::query_scalar(sql).fetch_one(&mut *c).await
        });
        match result {
            Ok(version) => Some(version),
            Err(e) => {
                warn!(error = %e, "Failed to get server version");
                None
            }
        }
    }

    /// Run a statement and decode all rows; columns come from the first row.
    pub async fn fetch_rows(
        &mut self,
        sql: &str,
    ) -> Result<(Vec<String>, Vec<JsonRow>), sqlx::Error> {
        with_backend!(&mut self.backend, c => {
            let rows = (&mut *c).fetch_all(sql).await?;
            Ok(rows_to_json(&rows))
        })
    }

    /// Column names of a statement's result set, from the prepared statement metadata.
    pub async fn describe_columns(&mut self, sql: &str) -> Result<Vec<String>, sqlx::Error> {
        with_backend!(&mut self.backend, c => {
            let describe = (&mut *c).describe(sql).await?;
            Ok(describe
                .columns()
                .iter()
                .map(|col| col.name().to_string())
                .collect())
        })
    }

    /// Run a `SELECT COUNT(*) ...` statement and return its single value.
    pub async fn count_rows(&mut self, sql: &str) -> Result<u64, sqlx::Error> {
        let count: i64 = with_backend!(&mut self.backend, c => {
            sqlx::query_scalar(sql).fetch_one(&mut *c).await?
        });
        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// Run a statement that returns no rows and report the affected row count.
    pub async fn execute(&mut self, sql: &str) -> Result<u64, sqlx::Error> {
        with_backend!(&mut self.backend, c => {
            Ok((&mut *c).execute(sql).await?.rows_affected())
        })
    }

    /// Leave autocommit mode. Re-entering while a transaction is open keeps it.
    pub async fn begin(&mut self) -> DbResult<()> {
        if !self.autocommit {
            debug!("Transaction already open; begin ignored");
            return Ok(());
        }
        let sql = match self.backend {
            Backend::MySql(_) => "SET autocommit = 0",
            Backend::SQLite(_) => "BEGIN",
        };
        self.execute(sql)
            .await
            .map_err(|e| DbError::driver("Failed to begin transaction", e))?;
        self.autocommit = false;
        Ok(())
    }

    /// Commit pending changes and return to autocommit.
    pub async fn commit(&mut self) -> DbResult<()> {
        self.finish("COMMIT", "Failed to commit transaction").await
    }

    /// Discard pending changes and return to autocommit.
    pub async fn rollback(&mut self) -> DbResult<()> {
        self.finish("ROLLBACK", "Failed to rollback transaction")
            .await
    }

    async fn finish(&mut self, statement: &str, operation: &str) -> DbResult<()> {
        if self.autocommit {
            // The driver may still hold a transaction opened outside begin()
            return match self.execute(statement).await {
                Ok(_) => Ok(()),
                Err(e) if is_no_active_transaction(&e) => {
                    debug!(statement, "No open transaction; nothing to finish");
                    Ok(())
                }
                Err(e) => Err(DbError::driver(operation, e)),
            };
        }

        let result = self.execute(statement).await;
        if result.is_err() {
            // Never leave pending changes behind a failed terminal statement
            if let Err(e) = self.execute("ROLLBACK").await {
                warn!(error = %e, "Rollback after failed {} also failed", statement);
            }
        }
        if let Backend::MySql(_) = self.backend {
            if let Err(e) = self.execute("SET autocommit = 1").await {
                warn!(error = %e, "Failed to restore autocommit");
            }
        }
        self.autocommit = true;

        result
            .map(|_| ())
            .map_err(|e| DbError::driver(operation, e))
    }
}

/// SQLite reports `cannot commit - no transaction is active` for a terminal
/// statement outside a transaction.
fn is_no_active_transaction(error: &sqlx::Error) -> bool {
    error
        .as_database_error()
        .is_some_and(|e| e.message().contains("no transaction is active"))
}

fn mysql_options(info: &ConnectionInfo) -> MySqlConnectOptions {
    let ssl_mode = if info.ssl_mode.is_required() {
        MySqlSslMode::Required
    } else {
        MySqlSslMode::Disabled
    };

    let mut options = MySqlConnectOptions::new()
        .host(&info.host)
        .port(info.port)
        .username(&info.username)
        .ssl_mode(ssl_mode)
        .charset("utf8mb4");

    if !info.password.is_empty() {
        options = options.password(&info.password);
    }
    if let Some(database) = info.database_name() {
        options = options.database(database);
    }
    options
}

fn sqlite_options(info: &ConnectionInfo) -> Result<SqliteConnectOptions, sqlx::Error> {
    match info.database_name() {
        Some(":memory:") | None => SqliteConnectOptions::from_str("sqlite::memory:"),
        Some(path) => Ok(SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)),
    }
}

/// Generate a helpful suggestion for connection errors.
fn connection_suggestion(db_type: DatabaseType, error: &sqlx::Error) -> String {
    let error_str = error.to_string().to_lowercase();

    if error_str.contains("connection refused") {
        return format!(
            "Check that the {} server is running and accessible",
            db_type
        );
    }

    if error_str.contains("access denied")
        || error_str.contains("authentication")
        || error_str.contains("password")
    {
        return "Verify the username and password".to_string();
    }

    if error_str.contains("unknown database") || error_str.contains("unable to open") {
        return "Check that the database exists".to_string();
    }

    if error_str.contains("tls") || error_str.contains("ssl") {
        return "Check the TLS mode or build with a TLS feature enabled".to_string();
    }

    match db_type {
        DatabaseType::MySQL => "Verify the host, port and credentials".to_string(),
        DatabaseType::SQLite => "Verify the file path exists and is writable".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory() -> ConnectionInfo {
        ConnectionInfo::sqlite(":memory:")
    }

    #[tokio::test]
    async fn test_open_memory_and_ping() {
        let mut conn = DbConnection::open(&memory(), Duration::from_secs(5), "Failed to connect")
            .await
            .unwrap();
        assert_eq!(conn.db_type(), DatabaseType::SQLite);
        assert!(conn.is_autocommit());
        assert!(conn.ping().await.is_ok());
        assert!(conn.server_version().await.is_some());
        conn.close().await;
    }

    #[tokio::test]
    async fn test_fetch_rows_preserves_column_order() {
        let mut conn = DbConnection::open(&memory(), Duration::from_secs(5), "Failed to connect")
            .await
            .unwrap();
        let (columns, rows) = conn
            .fetch_rows("SELECT 2 AS zeta, 'x' AS alpha")
            .await
            .unwrap();
        assert_eq!(columns, vec!["zeta", "alpha"]);
        let keys: Vec<_> = rows[0].keys().cloned().collect();
        assert_eq!(keys, vec!["zeta", "alpha"]);
        assert_eq!(rows[0]["zeta"], serde_json::json!(2));
    }

    #[tokio::test]
    async fn test_begin_is_idempotent_and_finish_restores_autocommit() {
        let mut conn = DbConnection::open(&memory(), Duration::from_secs(5), "Failed to connect")
            .await
            .unwrap();
        conn.begin().await.unwrap();
        assert!(!conn.is_autocommit());
        conn.begin().await.unwrap();
        assert!(!conn.is_autocommit());
        conn.rollback().await.unwrap();
        assert!(conn.is_autocommit());
        // Nothing open: commit and rollback are no-ops
        conn.commit().await.unwrap();
        conn.rollback().await.unwrap();
        assert!(conn.is_autocommit());
    }

    #[tokio::test]
    async fn test_commit_reaches_driver_for_untracked_transaction() {
        let mut conn = DbConnection::open(&memory(), Duration::from_secs(5), "Failed to connect")
            .await
            .unwrap();
        conn.execute("CREATE TABLE t (id INTEGER)").await.unwrap();
        // Opened behind the tracked state
        conn.execute("SAVEPOINT outer_sp").await.unwrap();
        conn.execute("INSERT INTO t VALUES (1)").await.unwrap();
        assert!(conn.is_autocommit());

        conn.commit().await.unwrap();
        // A second commit would fail if the first never reached the driver
        conn.execute("BEGIN").await.unwrap();
        conn.execute("COMMIT").await.unwrap();
        let (_, rows) = conn.fetch_rows("SELECT COUNT(*) AS n FROM t").await.unwrap();
        assert_eq!(rows[0]["n"], serde_json::json!(1));
    }

    #[tokio::test]
    async fn test_open_failure_uses_context_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("nested").join("db.sqlite");
        let info = ConnectionInfo::sqlite(path.to_string_lossy());
        let err = DbConnection::open(&info, Duration::from_secs(5), "Connection test failed")
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("Connection test failed: "));
    }
}
