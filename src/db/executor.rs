//! Query execution engine.
//!
//! Resolves a session to its connection, classifies the statement and runs it:
//! - transaction-control statements toggle the session's autocommit state
//! - result-set statements are optionally counted and paged
//! - everything else runs as a mutation and reports affected rows
//!
//! Statements are never retried; driver failures are returned with the name
//! of the failed operation.

use crate::db::session::SessionRegistry;
use crate::db::statement::{self, StatementKind};
use crate::error::{DbError, DbResult};
use crate::models::{
    ExecuteOutcome, MutationResult, QueryResult, TransactionCommand, TransactionOutcome,
};
use std::time::Instant;
use tracing::debug;

/// Requested page of a result set (1-based page number).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

impl PageRequest {
    /// A page is applied only when both values are supplied and the size is positive.
    pub fn from_parts(page: Option<u32>, page_size: Option<u32>) -> Option<Self> {
        match (page, page_size) {
            (Some(page), Some(page_size)) if page_size > 0 => Some(Self { page, page_size }),
            _ => None,
        }
    }
}

/// Executes SQL against registered sessions.
#[derive(Clone)]
pub struct QueryEngine {
    registry: SessionRegistry,
}

impl QueryEngine {
    pub fn new(registry: SessionRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Classify and execute one statement.
    pub async fn execute(
        &self,
        session_id: &str,
        sql: &str,
        page: Option<PageRequest>,
    ) -> DbResult<ExecuteOutcome> {
        let sql = require_sql(sql)?;

        match statement::classify(sql) {
            StatementKind::Transaction(command) => self
                .transaction(session_id, command)
                .await
                .map(ExecuteOutcome::Transaction),
            StatementKind::ResultSet => self
                .result_set(session_id, sql, page)
                .await
                .map(ExecuteOutcome::ResultSet),
            StatementKind::Mutation => self
                .execute_update(session_id, sql)
                .await
                .map(ExecuteOutcome::Mutation),
        }
    }

    /// Run a statement and return every row, without counting or paging.
    ///
    /// Columns follow the result metadata even when no rows come back.
    pub async fn query(&self, session_id: &str, sql: &str) -> DbResult<QueryResult> {
        let sql = require_sql(sql)?;
        let session = self.registry.session(session_id).await?;
        let mut conn = session.connection().await?;

        debug!(session_id = %session_id, sql = %sql, "Executing query");
        let start = Instant::now();

        let (mut columns, rows) = conn
            .fetch_rows(sql)
            .await
            .map_err(|e| DbError::driver("Failed to execute query", e))?;

        if rows.is_empty() {
            // Statements that cannot be prepared simply have no known columns
            columns = conn.describe_columns(sql).await.unwrap_or_default();
        }

        Ok(QueryResult::from_rows(columns, rows, elapsed_ms(start)))
    }

    /// Run a mutating statement under the session's current autocommit state.
    pub async fn execute_update(&self, session_id: &str, sql: &str) -> DbResult<MutationResult> {
        let sql = require_sql(sql)?;
        let session = self.registry.session(session_id).await?;
        let mut conn = session.connection().await?;

        debug!(session_id = %session_id, sql = %sql, "Executing update");
        let start = Instant::now();

        let affected_rows = conn
            .execute(sql)
            .await
            .map_err(|e| DbError::driver("Failed to execute update", e))?;

        Ok(MutationResult {
            affected_rows,
            execution_time_ms: elapsed_ms(start),
        })
    }

    /// Apply a transaction-control command to the session.
    pub async fn transaction(
        &self,
        session_id: &str,
        command: TransactionCommand,
    ) -> DbResult<TransactionOutcome> {
        let session = self.registry.session(session_id).await?;
        let mut conn = session.connection().await?;

        match command {
            TransactionCommand::Begin => conn.begin().await?,
            TransactionCommand::Commit => conn.commit().await?,
            TransactionCommand::Rollback => conn.rollback().await?,
        }

        debug!(
            session_id = %session_id,
            command = %command,
            autocommit = conn.is_autocommit(),
            "Transaction command applied"
        );

        Ok(TransactionOutcome::new(command, conn.is_autocommit()))
    }

    async fn result_set(
        &self,
        session_id: &str,
        sql: &str,
        page: Option<PageRequest>,
    ) -> DbResult<QueryResult> {
        let session = self.registry.session(session_id).await?;
        let mut conn = session.connection().await?;
        let start = Instant::now();

        // Explicit LIMIT, or a statement that cannot be a derived table: run as-is
        if statement::has_row_limit(sql) || !statement::is_pageable(sql) {
            debug!(session_id = %session_id, sql = %sql, "Executing unpaged query");
            let (columns, rows) = conn
                .fetch_rows(sql)
                .await
                .map_err(|e| DbError::driver("Failed to execute query", e))?;
            return Ok(QueryResult::from_rows(columns, rows, elapsed_ms(start)));
        }

        let count_sql = statement::count_query(sql);
        debug!(session_id = %session_id, sql = %count_sql, "Counting rows");
        let total = conn
            .count_rows(&count_sql)
            .await
            .map_err(|e| DbError::driver("Failed to count rows", e))?;

        let Some(page) = page else {
            let (columns, rows) = conn
                .fetch_rows(sql)
                .await
                .map_err(|e| DbError::driver("Failed to execute query", e))?;
            return Ok(QueryResult::from_rows(columns, rows, elapsed_ms(start))
                .with_total_count(total));
        };

        let paged_sql = statement::paged_query(sql, page.page, page.page_size);
        debug!(
            session_id = %session_id,
            sql = %paged_sql,
            page = page.page,
            page_size = page.page_size,
            "Executing paged query"
        );
        let (columns, rows) = conn
            .fetch_rows(&paged_sql)
            .await
            .map_err(|e| DbError::driver("Failed to execute query", e))?;

        Ok(QueryResult::from_rows(columns, rows, elapsed_ms(start))
            .with_total_count(total)
            .with_page(page.page, page.page_size))
    }
}

fn require_sql(sql: &str) -> DbResult<&str> {
    let sql = sql.trim();
    if sql.is_empty() {
        return Err(DbError::invalid_input("sessionId and sql are required"));
    }
    Ok(sql)
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ConnectionInfo;

    async fn engine_with_rows(count: u32) -> (QueryEngine, String) {
        let engine = QueryEngine::new(SessionRegistry::default());
        let id = engine
            .registry()
            .connect(ConnectionInfo::sqlite(":memory:"))
            .await
            .unwrap();
        engine
            .execute_update(&id, "CREATE TABLE items (id INTEGER PRIMARY KEY, label TEXT)")
            .await
            .unwrap();
        for i in 1..=count {
            engine
                .execute_update(&id, &format!("INSERT INTO items VALUES ({i}, 'item {i}')"))
                .await
                .unwrap();
        }
        (engine, id)
    }

    #[test]
    fn test_page_request_requires_both_parts() {
        assert_eq!(
            PageRequest::from_parts(Some(2), Some(10)),
            Some(PageRequest {
                page: 2,
                page_size: 10
            })
        );
        assert_eq!(PageRequest::from_parts(Some(2), None), None);
        assert_eq!(PageRequest::from_parts(None, Some(10)), None);
        assert_eq!(PageRequest::from_parts(Some(1), Some(0)), None);
    }

    #[tokio::test]
    async fn test_paged_select_reports_true_total() {
        let (engine, id) = engine_with_rows(25).await;
        let outcome = engine
            .execute(
                &id,
                "SELECT * FROM items ORDER BY id",
                PageRequest::from_parts(Some(2), Some(10)),
            )
            .await
            .unwrap();

        let result = outcome.as_result_set().unwrap();
        assert_eq!(result.total_count, 25);
        assert_eq!(result.row_count(), 10);
        assert_eq!(result.data[0]["id"], serde_json::json!(11));
        assert_eq!(result.data[9]["id"], serde_json::json!(20));
        assert_eq!(result.current_page, Some(2));
        assert_eq!(result.page_size, Some(10));
        assert_eq!(result.columns, vec!["id", "label"]);
    }

    #[tokio::test]
    async fn test_explicit_limit_counts_returned_rows() {
        let (engine, id) = engine_with_rows(25).await;
        let outcome = engine
            .execute(
                &id,
                "select * from items limit 5",
                PageRequest::from_parts(Some(1), Some(10)),
            )
            .await
            .unwrap();
        let result = outcome.as_result_set().unwrap();
        assert_eq!(result.total_count, 5);
        assert_eq!(result.current_page, None);
    }

    #[tokio::test]
    async fn test_empty_sql_is_rejected() {
        let (engine, id) = engine_with_rows(0).await;
        let err = engine.execute(&id, "   ", None).await.unwrap_err();
        assert!(matches!(err, DbError::InvalidInput { .. }));
    }

    #[tokio::test]
    async fn test_query_columns_from_metadata_when_empty() {
        let (engine, id) = engine_with_rows(0).await;
        let result = engine.query(&id, "SELECT id, label FROM items").await.unwrap();
        assert_eq!(result.total_count, 0);
        assert_eq!(result.columns, vec!["id", "label"]);
    }

    #[tokio::test]
    async fn test_driver_error_is_prefixed() {
        let (engine, id) = engine_with_rows(0).await;
        let err = engine
            .execute(&id, "SELECT * FROM missing_table", None)
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("Failed to count rows: "));
    }

    #[tokio::test]
    async fn test_unknown_session_fails_before_execution() {
        let engine = QueryEngine::new(SessionRegistry::default());
        let err = engine.execute("missing", "SELECT 1", None).await.unwrap_err();
        assert_eq!(err.to_string(), "Connection not found or closed");
    }
}
