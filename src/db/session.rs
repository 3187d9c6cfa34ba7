//! Session registry.
//!
//! Owns the mapping from an opaque session id to one live connection and the
//! [`ConnectionInfo`] it was opened with. Both live in the same [`Session`]
//! value, so they are always inserted and removed together.

use crate::db::connection::DbConnection;
use crate::error::{DbError, DbResult};
use crate::models::{ConnectionInfo, DatabaseType, SessionSummary};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Bound on the validity probe behind `is_valid`.
pub const VALIDITY_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Bound on the ping issued by `test_connection`.
pub const TEST_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// One registered session.
///
/// The connection slot is emptied when the session is closed; every access
/// goes through [`Session::connection`], which fails once the slot is empty.
#[derive(Debug)]
pub struct Session {
    id: String,
    db_type: DatabaseType,
    info: RwLock<ConnectionInfo>,
    connection: Mutex<Option<DbConnection>>,
    created_at: DateTime<Utc>,
    /// Registration order
    sequence: u64,
}

impl Session {
    fn new(id: String, sequence: u64, info: ConnectionInfo, connection: DbConnection) -> Self {
        Self {
            id,
            sequence,
            db_type: connection.db_type(),
            info: RwLock::new(info),
            connection: Mutex::new(Some(connection)),
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn db_type(&self) -> DatabaseType {
        self.db_type
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Exclusive access to the live connection.
    ///
    /// Waits for any statement already running on this session.
    pub async fn connection(&self) -> DbResult<MappedMutexGuard<'_, DbConnection>> {
        let guard = self.connection.lock().await;
        MutexGuard::try_map(guard, Option::as_mut)
            .map_err(|_| DbError::connection_not_found(&self.id))
    }

    /// Snapshot of the descriptor.
    pub async fn info(&self) -> ConnectionInfo {
        self.info.read().await.clone()
    }

    /// Record a new default database on the descriptor.
    pub async fn set_database(&self, database: impl Into<String>) {
        self.info.write().await.database = Some(database.into());
    }

    async fn summary(&self) -> SessionSummary {
        let info = self.info.read().await;
        SessionSummary {
            session_id: self.id().to_string(),
            name: info.name.clone(),
            host: info.host.clone(),
            port: info.port,
            database: info.database_name().map(str::to_string),
            db_type: self.db_type(),
            connected_at: self.created_at(),
        }
    }

    async fn close(&self) {
        let connection = self.connection.lock().await.take();
        if let Some(connection) = connection {
            connection.close().await;
        }
    }
}

/// Registry of open sessions, shared by all request handlers.
#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<String, Arc<Session>>>>,
    next_sequence: Arc<AtomicU64>,
    connect_timeout: Duration,
}

impl SessionRegistry {
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            next_sequence: Arc::new(AtomicU64::new(0)),
            connect_timeout,
        }
    }

    /// Open a connection and register it under a fresh session id.
    ///
    /// Nothing is registered when the connect attempt fails.
    pub async fn connect(&self, info: ConnectionInfo) -> DbResult<String> {
        info.validate()
            .map_err(|e| DbError::invalid_input(format!("Invalid connection: {}", e)))?;

        let mut connection =
            DbConnection::open(&info, self.connect_timeout, "Failed to connect").await?;

        if let Some(version) = connection.server_version().await {
            debug!(endpoint = %info.target(), version = %version, "Connected to server");
        }

        let session_id = Uuid::new_v4().to_string();
        let db_type = connection.db_type();
        let target = info.target();
        let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
        let session = Arc::new(Session::new(
            session_id.clone(),
            sequence,
            info,
            connection,
        ));

        self.sessions
            .write()
            .await
            .insert(session_id.clone(), session);

        info!(
            session_id = %session_id,
            db_type = %db_type,
            endpoint = %target,
            "Session opened"
        );

        Ok(session_id)
    }

    /// Open a short-lived connection, ping it, and close it again.
    ///
    /// A failed connect is an error; a failed or slow ping is `Ok(false)`.
    pub async fn test_connection(&self, info: &ConnectionInfo) -> DbResult<bool> {
        info.validate()
            .map_err(|e| DbError::invalid_input(format!("Invalid connection: {}", e)))?;

        let mut connection =
            DbConnection::open(info, self.connect_timeout, "Connection test failed").await?;

        let valid = matches!(
            tokio::time::timeout(TEST_PROBE_TIMEOUT, connection.ping()).await,
            Ok(Ok(()))
        );
        connection.close().await;

        debug!(endpoint = %info.target(), valid, "Connection test finished");
        Ok(valid)
    }

    /// Look up a session.
    pub async fn session(&self, session_id: &str) -> DbResult<Arc<Session>> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| DbError::connection_not_found(session_id))
    }

    /// Probe a session's connection. Never fails; unknown or closed sessions are invalid.
    pub async fn is_valid(&self, session_id: &str) -> bool {
        let Ok(session) = self.session(session_id).await else {
            return false;
        };

        let probe = async {
            match session.connection().await {
                Ok(mut connection) => connection.ping().await.is_ok(),
                Err(_) => false,
            }
        };

        match tokio::time::timeout(VALIDITY_PROBE_TIMEOUT, probe).await {
            Ok(valid) => valid,
            Err(_) => {
                warn!(session_id = %session_id, "Validity probe timed out");
                false
            }
        }
    }

    /// The descriptor of a session, without probing it.
    pub async fn get_info(&self, session_id: &str) -> Option<ConnectionInfo> {
        let session = self.sessions.read().await.get(session_id).cloned()?;
        Some(session.info().await)
    }

    /// Remove a session and close its connection.
    ///
    /// Idempotent. Returns whether the session existed.
    pub async fn close(&self, session_id: &str) -> bool {
        let removed = self.sessions.write().await.remove(session_id);
        match removed {
            Some(session) => {
                session.close().await;
                info!(session_id = %session_id, "Session closed");
                true
            }
            None => {
                debug!(session_id = %session_id, "Close requested for unknown session");
                false
            }
        }
    }

    /// Close every session (used at shutdown).
    pub async fn close_all(&self) {
        let drained: Vec<Arc<Session>> = {
            let mut sessions = self.sessions.write().await;
            sessions.drain().map(|(_, session)| session).collect()
        };

        let count = drained.len();
        for session in drained {
            session.close().await;
        }

        if count > 0 {
            info!(count, "Closed all sessions");
        }
    }

    /// Password-free summaries of all sessions, oldest first.
    pub async fn list_sessions(&self) -> Vec<SessionSummary> {
        let mut sessions: Vec<Arc<Session>> =
            self.sessions.read().await.values().cloned().collect();
        sessions.sort_by_key(|s| s.sequence);

        let mut summaries = Vec::with_capacity(sessions.len());
        for session in sessions {
            summaries.push(session.summary().await);
        }
        summaries
    }

    /// Number of registered sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}
