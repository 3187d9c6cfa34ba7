//! Schema-related data models.
//!
//! This module defines types returned by table schema introspection.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSchema {
    pub table_name: String,
    /// Declaration order
    pub columns: Vec<ColumnDefinition>,
    pub indexes: Vec<IndexInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl TableSchema {
    /// Create a new table schema.
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            columns: Vec::new(),
            indexes: Vec::new(),
            comment: None,
        }
    }

    /// Set the column list.
    pub fn with_columns(mut self, columns: Vec<ColumnDefinition>) -> Self {
        self.columns = columns;
        self
    }

    /// Set the index list.
    pub fn with_indexes(mut self, indexes: Vec<IndexInfo>) -> Self {
        self.indexes = indexes;
        self
    }

    /// Set the table comment; empty comments are dropped.
    pub fn with_comment(mut self, comment: Option<String>) -> Self {
        self.comment = comment.filter(|c| !c.is_empty());
        self
    }

    /// Names of the primary key columns in declaration order.
    pub fn primary_key(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.key.as_deref() == Some("PRI"))
            .map(|c| c.name.as_str())
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDefinition {
    pub name: String,
    /// Full type (e.g., `varchar(30)`, `bigint unsigned`)
    pub data_type: String,
    pub nullable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    /// `PRI`, `UNI`, `MUL`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// e.g., `auto_increment`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u64>,
}

impl ColumnDefinition {
    /// Create a new column definition.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable,
            default_value: None,
            key: None,
            extra: None,
            comment: None,
            max_length: None,
        }
    }

    pub fn with_default(mut self, default_value: impl Into<String>) -> Self {
        self.default_value = Some(default_value.into());
        self
    }

    /// Set the key role; empty values are ignored.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        if !key.is_empty() {
            self.key = Some(key);
        }
        self
    }

    /// Set the extra attributes; empty values are ignored.
    pub fn with_extra(mut self, extra: impl Into<String>) -> Self {
        let extra = extra.into();
        if !extra.is_empty() {
            self.extra = Some(extra);
        }
        self
    }

    /// Set the column comment; empty values are ignored.
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        let comment = comment.into();
        if !comment.is_empty() {
            self.comment = Some(comment);
        }
        self
    }

    pub fn with_max_length(mut self, max_length: u64) -> Self {
        self.max_length = Some(max_length);
        self
    }
}

/// Index descriptor aggregated from one row per member column.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexInfo {
    pub name: String,
    /// Ordered by position within the index
    pub columns: Vec<String>,
    /// Inferred from the index name: every index not named `PRIMARY`
    pub unique: bool,
    pub primary: bool,
}

impl IndexInfo {
    pub const PRIMARY: &'static str = "PRIMARY";

    /// Create an index descriptor; uniqueness follows the name rule.
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        let name = name.into();
        let primary = name == Self::PRIMARY;
        Self {
            name,
            columns,
            unique: !primary,
            primary,
        }
    }
}

/// Group `(index name, column)` rows into descriptors, preserving first-seen order.
pub fn group_index_rows<I>(rows: I) -> Vec<IndexInfo>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut indexes: Vec<IndexInfo> = Vec::new();
    for (index_name, column) in rows {
        match indexes.iter_mut().find(|idx| idx.name == index_name) {
            Some(idx) => idx.columns.push(column),
            None => indexes.push(IndexInfo::new(index_name, vec![column])),
        }
    }
    indexes
}
