//! Query-related data models.
//!
//! This module defines the result shapes produced by statement execution.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// One result row; key order follows the column order of the result set.
pub type JsonRow = serde_json::Map<String, JsonValue>;

/// Tabular result of a result-set-producing statement.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub data: Vec<JsonRow>,
    pub columns: Vec<String>,
    /// True total when a count probe ran; otherwise the number of rows returned
    pub total_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u32>,
    pub execution_time_ms: u64,
}

impl QueryResult {
    /// Build an unpaged result whose total is the number of rows returned.
    pub fn from_rows(columns: Vec<String>, data: Vec<JsonRow>, execution_time_ms: u64) -> Self {
        let total_count = data.len() as u64;
        Self {
            data,
            columns,
            total_count,
            current_page: None,
            page_size: None,
            execution_time_ms,
        }
    }

    /// Override the total row count.
    pub fn with_total_count(mut self, total_count: u64) -> Self {
        self.total_count = total_count;
        self
    }

    /// Echo the requested page back to the caller.
    pub fn with_page(mut self, page: u32, page_size: u32) -> Self {
        self.current_page = Some(page);
        self.page_size = Some(page_size);
        self
    }

    /// Get the number of rows in the result.
    pub fn row_count(&self) -> usize {
        self.data.len()
    }
}

/// Result of a mutating statement.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationResult {
    pub affected_rows: u64,
    pub execution_time_ms: u64,
}

/// Transaction-control keyword recognised by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionCommand {
    Begin,
    Commit,
    Rollback,
}

impl std::fmt::Display for TransactionCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Begin => write!(f, "begin"),
            Self::Commit => write!(f, "commit"),
            Self::Rollback => write!(f, "rollback"),
        }
    }
}

/// Result of a transaction-control statement.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionOutcome {
    pub command: TransactionCommand,
    /// Autocommit state of the session after the command
    pub autocommit: bool,
    pub message: String,
}

impl TransactionOutcome {
    pub fn new(command: TransactionCommand, autocommit: bool) -> Self {
        let message = match command {
            TransactionCommand::Begin => "Transaction started",
            TransactionCommand::Commit => "Transaction committed",
            TransactionCommand::Rollback => "Transaction rolled back",
        };
        Self {
            command,
            autocommit,
            message: message.to_string(),
        }
    }
}

/// Outcome of `execute`, tagged by statement kind.
///
/// Serializes as `{"kind": "...", "payload": {...}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "lowercase")]
pub enum ExecuteOutcome {
    Transaction(TransactionOutcome),
    ResultSet(QueryResult),
    Mutation(MutationResult),
}

impl ExecuteOutcome {
    /// The result set, if this outcome carries one.
    pub fn as_result_set(&self) -> Option<&QueryResult> {
        match self {
            Self::ResultSet(result) => Some(result),
            _ => None,
        }
    }

    /// The affected row count, if this outcome is a mutation.
    pub fn affected_rows(&self) -> Option<u64> {
        match self {
            Self::Mutation(result) => Some(result.affected_rows),
            _ => None,
        }
    }
}
