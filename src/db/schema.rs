//! Schema introspection module.
//!
//! Read-only metadata operations on a session's connection. Every operation
//! takes an optional database override and otherwise targets the session's
//! current database.
//!
//! # Architecture
//!
//! Catalog queries live in the `queries` submodule. Driver-specific
//! implementations are in the `mysql` and `sqlite` submodules, each providing
//! the same set of functions over a borrowed connection.

use crate::db::connection::Backend;
use crate::db::session::SessionRegistry;
use crate::error::{DbError, DbResult};
use crate::models::TableSchema;
use tracing::{debug, info};

/// Schemas created by the server itself, never listed as user databases.
pub const SYSTEM_DATABASES: &[&str] = &["information_schema", "performance_schema", "mysql", "sys"];

/// Schema inspector for database introspection.
#[derive(Clone)]
pub struct SchemaInspector {
    registry: SessionRegistry,
}

impl SchemaInspector {
    pub fn new(registry: SessionRegistry) -> Self {
        Self { registry }
    }

    /// List base tables.
    pub async fn list_tables(&self, session_id: &str, database: Option<&str>) -> DbResult<Vec<String>> {
        let session = self.registry.session(session_id).await?;
        let mut conn = session.connection().await?;
        let database = non_empty(database);
        let tables = match conn.backend_mut() {
            Backend::MySql(c) => mysql::list_tables(c, database, "BASE TABLE").await,
            Backend::SQLite(c) => sqlite::list_objects(c, database, "table").await,
        }
        .map_err(|e| DbError::driver("Failed to get tables", e))?;

        debug!(session_id = %session_id, count = tables.len(), "Listed tables");
        Ok(tables)
    }

    /// List views.
    pub async fn list_views(&self, session_id: &str, database: Option<&str>) -> DbResult<Vec<String>> {
        let session = self.registry.session(session_id).await?;
        let mut conn = session.connection().await?;
        let database = non_empty(database);
        let views = match conn.backend_mut() {
            Backend::MySql(c) => mysql::list_tables(c, database, "VIEW").await,
            Backend::SQLite(c) => sqlite::list_objects(c, database, "view").await,
        }
        .map_err(|e| DbError::driver("Failed to get views", e))?;
        Ok(views)
    }

    /// List stored procedures. SQLite has none.
    pub async fn list_procedures(
        &self,
        session_id: &str,
        database: Option<&str>,
    ) -> DbResult<Vec<String>> {
        let session = self.registry.session(session_id).await?;
        let mut conn = session.connection().await?;
        let database = non_empty(database);
        let procedures = match conn.backend_mut() {
            Backend::MySql(c) => mysql::list_procedures(c, database).await,
            Backend::SQLite(_) => Ok(Vec::new()),
        }
        .map_err(|e| DbError::driver("Failed to get procedures", e))?;
        Ok(procedures)
    }

    /// List user-defined functions. SQLite has none.
    pub async fn list_functions(
        &self,
        session_id: &str,
        database: Option<&str>,
    ) -> DbResult<Vec<String>> {
        let session = self.registry.session(session_id).await?;
        let mut conn = session.connection().await?;
        let database = non_empty(database);
        let functions = match conn.backend_mut() {
            Backend::MySql(c) => mysql::list_functions(c, database).await,
            Backend::SQLite(_) => Ok(Vec::new()),
        }
        .map_err(|e| DbError::driver("Failed to get functions", e))?;
        Ok(functions)
    }

    /// List databases, excluding the server's own schemas.
    pub async fn list_databases(&self, session_id: &str) -> DbResult<Vec<String>> {
        let session = self.registry.session(session_id).await?;
        let mut conn = session.connection().await?;
        let databases = match conn.backend_mut() {
            Backend::MySql(c) => mysql::list_databases(c).await,
            Backend::SQLite(c) => sqlite::list_databases(c).await,
        }
        .map_err(|e| DbError::driver("Failed to get databases", e))?;
        Ok(databases)
    }

    /// Make `database` the active schema and record it on the session descriptor.
    pub async fn switch_database(&self, session_id: &str, database: &str) -> DbResult<()> {
        let database = database.trim();
        if database.is_empty() {
            return Err(DbError::invalid_input("Database name is required"));
        }

        let session = self.registry.session(session_id).await?;
        let mut conn = session.connection().await?;
        match conn.backend_mut() {
            Backend::MySql(c) => mysql::use_database(c, database)
                .await
                .map_err(|e| DbError::driver("Failed to switch database", e))?,
            Backend::SQLite(_) => {
                return Err(DbError::invalid_input(
                    "Switching databases is not supported for SQLite",
                ));
            }
        }

        // Updated while the connection is still held so the two stay in step
        session.set_database(database).await;
        drop(conn);

        info!(session_id = %session_id, database = %database, "Switched database");
        Ok(())
    }

    /// The active schema, if any.
    pub async fn current_database(&self, session_id: &str) -> DbResult<Option<String>> {
        let session = self.registry.session(session_id).await?;
        let mut conn = session.connection().await?;
        let current = match conn.backend_mut() {
            Backend::MySql(c) => mysql::current_database(c)
                .await
                .map_err(|e| DbError::driver("Failed to get current database", e))?,
            Backend::SQLite(_) => Some(sqlite::MAIN_SCHEMA.to_string()),
        };
        Ok(current)
    }

    /// Columns, indexes and comment of one table.
    pub async fn table_schema(
        &self,
        session_id: &str,
        table_name: &str,
        database: Option<&str>,
    ) -> DbResult<TableSchema> {
        let table_name = table_name.trim();
        if table_name.is_empty() {
            return Err(DbError::invalid_input("Table name is required"));
        }

        let session = self.registry.session(session_id).await?;
        let mut conn = session.connection().await?;
        let database = non_empty(database);
        let schema = match conn.backend_mut() {
            Backend::MySql(c) => mysql::table_schema(c, table_name, database).await,
            Backend::SQLite(c) => sqlite::table_schema(c, table_name, database).await,
        }
        .map_err(|e| DbError::driver("Failed to get table schema", e))?;

        if schema.columns.is_empty() {
            return Err(DbError::schema(
                format!("Table '{}' not found", table_name),
                table_name,
            ));
        }

        debug!(
            session_id = %session_id,
            table = %table_name,
            columns = schema.columns.len(),
            indexes = schema.indexes.len(),
            "Described table"
        );
        Ok(schema)
    }
}

fn non_empty(database: Option<&str>) -> Option<&str> {
    database.map(str::trim).filter(|d| !d.is_empty())
}

/// SQL queries for schema introspection.
mod queries {
    pub mod mysql {
        pub const LIST_TABLES: &str = r#"
            SELECT CONVERT(TABLE_NAME USING utf8) AS TABLE_NAME
            FROM information_schema.TABLES
            WHERE TABLE_SCHEMA = COALESCE(?, DATABASE()) AND TABLE_TYPE = ?
            ORDER BY TABLE_NAME
        "#;

        pub const LIST_PROCEDURES: &str = r#"
            SELECT CONVERT(ROUTINE_NAME USING utf8) AS ROUTINE_NAME
            FROM information_schema.ROUTINES
            WHERE ROUTINE_SCHEMA = COALESCE(?, DATABASE()) AND ROUTINE_TYPE = 'PROCEDURE'
            ORDER BY ROUTINE_NAME
        "#;

        pub const LIST_DATABASES: &str = "SHOW DATABASES";

        pub const CURRENT_DATABASE: &str = "SELECT DATABASE()";

        pub const DESCRIBE_COLUMNS: &str = r#"
            SELECT
                CONVERT(COLUMN_NAME USING utf8) AS COLUMN_NAME,
                CONVERT(COLUMN_TYPE USING utf8) AS COLUMN_TYPE,
                CONVERT(IS_NULLABLE USING utf8) AS IS_NULLABLE,
                CONVERT(COLUMN_DEFAULT USING utf8) AS COLUMN_DEFAULT,
                CONVERT(COLUMN_KEY USING utf8) AS COLUMN_KEY,
                CONVERT(EXTRA USING utf8) AS EXTRA,
                CONVERT(COLUMN_COMMENT USING utf8) AS COLUMN_COMMENT,
                CHARACTER_MAXIMUM_LENGTH
            FROM information_schema.COLUMNS
            WHERE TABLE_SCHEMA = COALESCE(?, DATABASE()) AND TABLE_NAME = ?
            ORDER BY ORDINAL_POSITION
        "#;

        /// One row per index member, primary key first.
        pub const DESCRIBE_INDEXES: &str = r#"
            SELECT
                CONVERT(INDEX_NAME USING utf8) AS INDEX_NAME,
                CONVERT(COLUMN_NAME USING utf8) AS COLUMN_NAME
            FROM information_schema.STATISTICS
            WHERE TABLE_SCHEMA = COALESCE(?, DATABASE()) AND TABLE_NAME = ?
            ORDER BY INDEX_NAME <> 'PRIMARY', INDEX_NAME, SEQ_IN_INDEX
        "#;

        pub const TABLE_COMMENT: &str = r#"
            SELECT CONVERT(TABLE_COMMENT USING utf8) AS TABLE_COMMENT
            FROM information_schema.TABLES
            WHERE TABLE_SCHEMA = COALESCE(?, DATABASE()) AND TABLE_NAME = ?
        "#;
    }
}

mod mysql {
    use super::*;
    use crate::models::{ColumnDefinition, group_index_rows};
    use sqlx::mysql::{MySqlConnection, MySqlRow};
    use sqlx::{Executor, Row};

    /// Try to get a u64 value from a row, handling MySQL version differences.
    /// MySQL 5.x may return BIGINT (i64), MySQL 8.x returns BIGINT UNSIGNED (u64).
    fn try_get_u64(row: &MySqlRow, column: &str) -> Option<u64> {
        if let Ok(Some(v)) = row.try_get::<Option<u64>, _>(column) {
            return Some(v);
        }
        if let Ok(Some(v)) = row.try_get::<Option<i64>, _>(column) {
            return u64::try_from(v).ok();
        }
        None
    }

    /// Safely get a string from a MySQL row.
    /// MySQL may return VARBINARY instead of VARCHAR depending on charset configuration.
    fn get_string(row: &MySqlRow, column: &str) -> String {
        get_optional_string(row, column).unwrap_or_default()
    }

    fn get_optional_string(row: &MySqlRow, column: &str) -> Option<String> {
        row.try_get::<Option<String>, _>(column)
            .ok()
            .flatten()
            .or_else(|| {
                row.try_get::<Option<Vec<u8>>, _>(column)
                    .ok()
                    .flatten()
                    .and_then(|bytes| String::from_utf8(bytes).ok())
            })
    }

    fn get_string_by_index(row: &MySqlRow, index: usize) -> Option<String> {
        row.try_get::<String, _>(index).ok().or_else(|| {
            row.try_get::<Vec<u8>, _>(index)
                .ok()
                .and_then(|bytes| String::from_utf8(bytes).ok())
        })
    }

    /// Escape a value for use inside a single-quoted string literal.
    pub(super) fn quote_literal(value: &str) -> String {
        format!("'{}'", value.replace('\\', "\\\\").replace('\'', "''"))
    }

    /// Quote an identifier with backticks.
    pub(super) fn quote_identifier(name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }

    pub async fn list_tables(
        conn: &mut MySqlConnection,
        database: Option<&str>,
        table_type: &str,
    ) -> Result<Vec<String>, sqlx::Error> {
        let rows = sqlx::query(queries::mysql::LIST_TABLES)
            .bind(database)
            .bind(table_type)
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows.iter().map(|row| get_string(row, "TABLE_NAME")).collect())
    }

    pub async fn list_procedures(
        conn: &mut MySqlConnection,
        database: Option<&str>,
    ) -> Result<Vec<String>, sqlx::Error> {
        let rows = sqlx::query(queries::mysql::LIST_PROCEDURES)
            .bind(database)
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows
            .iter()
            .map(|row| get_string(row, "ROUTINE_NAME"))
            .collect())
    }

    /// `SHOW FUNCTION STATUS` cannot take bound parameters, so the schema is
    /// inlined as an escaped literal.
    pub async fn list_functions(
        conn: &mut MySqlConnection,
        database: Option<&str>,
    ) -> Result<Vec<String>, sqlx::Error> {
        let filter = match database {
            Some(db) => quote_literal(db),
            None => "DATABASE()".to_string(),
        };
        let sql = format!("SHOW FUNCTION STATUS WHERE Db = {}", filter);
        let rows = (&mut *conn).fetch_all(sql.as_str()).await?;
        Ok(rows.iter().map(|row| get_string(row, "Name")).collect())
    }

    pub async fn list_databases(conn: &mut MySqlConnection) -> Result<Vec<String>, sqlx::Error> {
        let rows = (&mut *conn)
            .fetch_all(queries::mysql::LIST_DATABASES)
            .await?;

        // SHOW DATABASES returns a single column "Database"
        Ok(rows
            .iter()
            .filter_map(|row| get_string_by_index(row, 0))
            .filter(|name| !SYSTEM_DATABASES.contains(&name.to_lowercase().as_str()))
            .collect())
    }

    pub async fn use_database(conn: &mut MySqlConnection, database: &str) -> Result<(), sqlx::Error> {
        let sql = format!("USE {}", quote_identifier(database));
        (&mut *conn).execute(sql.as_str()).await?;
        Ok(())
    }

    pub async fn current_database(
        conn: &mut MySqlConnection,
    ) -> Result<Option<String>, sqlx::Error> {
        let row = sqlx::query(queries::mysql::CURRENT_DATABASE)
            .fetch_one(&mut *conn)
            .await?;
        Ok(row.try_get::<Option<String>, _>(0).ok().flatten().or_else(|| {
            row.try_get::<Option<Vec<u8>>, _>(0)
                .ok()
                .flatten()
                .and_then(|bytes| String::from_utf8(bytes).ok())
        }))
    }

    pub async fn table_schema(
        conn: &mut MySqlConnection,
        table_name: &str,
        database: Option<&str>,
    ) -> Result<TableSchema, sqlx::Error> {
        let columns = fetch_columns(conn, table_name, database).await?;
        if columns.is_empty() {
            return Ok(TableSchema::new(table_name));
        }

        let index_rows = sqlx::query(queries::mysql::DESCRIBE_INDEXES)
            .bind(database)
            .bind(table_name)
            .fetch_all(&mut *conn)
            .await?;
        let indexes = group_index_rows(
            index_rows
                .iter()
                .map(|row| (get_string(row, "INDEX_NAME"), get_string(row, "COLUMN_NAME"))),
        );

        let comment = sqlx::query(queries::mysql::TABLE_COMMENT)
            .bind(database)
            .bind(table_name)
            .fetch_optional(&mut *conn)
            .await?
            .and_then(|row| get_optional_string(&row, "TABLE_COMMENT"));

        Ok(TableSchema::new(table_name)
            .with_columns(columns)
            .with_indexes(indexes)
            .with_comment(comment))
    }

    async fn fetch_columns(
        conn: &mut MySqlConnection,
        table_name: &str,
        database: Option<&str>,
    ) -> Result<Vec<ColumnDefinition>, sqlx::Error> {
        let rows = sqlx::query(queries::mysql::DESCRIBE_COLUMNS)
            .bind(database)
            .bind(table_name)
            .fetch_all(&mut *conn)
            .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let nullable = get_string(row, "IS_NULLABLE").eq_ignore_ascii_case("YES");
                let mut col = ColumnDefinition::new(
                    get_string(row, "COLUMN_NAME"),
                    get_string(row, "COLUMN_TYPE"),
                    nullable,
                )
                .with_key(get_string(row, "COLUMN_KEY"))
                .with_extra(get_string(row, "EXTRA"))
                .with_comment(get_string(row, "COLUMN_COMMENT"));

                if let Some(default) = get_optional_string(row, "COLUMN_DEFAULT") {
                    col = col.with_default(default);
                }
                if let Some(max_length) = try_get_u64(row, "CHARACTER_MAXIMUM_LENGTH") {
                    col = col.with_max_length(max_length);
                }
                col
            })
            .collect())
    }
}

mod sqlite {
    use super::*;
    use crate::models::{ColumnDefinition, IndexInfo};
    use sqlx::Row;
    use sqlx::sqlite::SqliteConnection;

    pub const MAIN_SCHEMA: &str = "main";

    /// Double-quote an identifier.
    pub(super) fn quote_identifier(name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    /// Declared length of types such as `VARCHAR(100)`.
    pub(super) fn declared_length(data_type: &str) -> Option<u64> {
        let open = data_type.find('(')?;
        let close = data_type[open..].find(')')? + open;
        data_type[open + 1..close].split(',').next()?.trim().parse().ok()
    }

    pub async fn list_objects(
        conn: &mut SqliteConnection,
        database: Option<&str>,
        object_type: &str,
    ) -> Result<Vec<String>, sqlx::Error> {
        let sql = format!(
            "SELECT name FROM {}.sqlite_master WHERE type = ? AND name NOT LIKE 'sqlite_%' ORDER BY name",
            quote_identifier(database.unwrap_or(MAIN_SCHEMA))
        );
        let rows = sqlx::query(&sql)
            .bind(object_type)
            .fetch_all(&mut *conn)
            .await?;
        rows.iter().map(|row| row.try_get::<String, _>("name")).collect()
    }

    pub async fn list_databases(conn: &mut SqliteConnection) -> Result<Vec<String>, sqlx::Error> {
        let rows = sqlx::query("PRAGMA database_list")
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows
            .iter()
            .filter_map(|row| row.try_get::<String, _>("name").ok())
            .filter(|name| name != "temp")
            .collect())
    }

    pub async fn table_schema(
        conn: &mut SqliteConnection,
        table_name: &str,
        database: Option<&str>,
    ) -> Result<TableSchema, sqlx::Error> {
        let schema = quote_identifier(database.unwrap_or(MAIN_SCHEMA));
        let table = quote_identifier(table_name);

        let column_rows = sqlx::query(&format!("PRAGMA {}.table_info({})", schema, table))
            .fetch_all(&mut *conn)
            .await?;
        if column_rows.is_empty() {
            return Ok(TableSchema::new(table_name));
        }

        let mut pk_columns: Vec<(i64, String)> = Vec::new();
        let mut columns = Vec::with_capacity(column_rows.len());
        for row in &column_rows {
            let name: String = row.try_get("name")?;
            let data_type: String = row.try_get("type").unwrap_or_default();
            let notnull: i64 = row.try_get("notnull").unwrap_or(0);
            let pk: i64 = row.try_get("pk").unwrap_or(0);
            let default_value: Option<String> = row.try_get("dflt_value").ok().flatten();

            let mut col = ColumnDefinition::new(&name, &data_type, notnull == 0 && pk == 0);
            if pk > 0 {
                col = col.with_key("PRI");
                pk_columns.push((pk, name.clone()));
            }
            if let Some(default) = default_value {
                col = col.with_default(default);
            }
            if let Some(max_length) = declared_length(&data_type) {
                col = col.with_max_length(max_length);
            }
            columns.push(col);
        }

        let index_rows = sqlx::query(&format!("PRAGMA {}.index_list({})", schema, table))
            .fetch_all(&mut *conn)
            .await?;

        let mut primary: Option<IndexInfo> = None;
        let mut secondary = Vec::new();
        for row in &index_rows {
            let name: String = row.try_get("name")?;
            let origin: String = row.try_get("origin").unwrap_or_default();

            let member_rows = sqlx::query(&format!(
                "PRAGMA {}.index_info({})",
                schema,
                quote_identifier(&name)
            ))
            .fetch_all(&mut *conn)
            .await?;
            let members: Vec<String> = member_rows
                .iter()
                .filter_map(|r| r.try_get::<Option<String>, _>("name").ok().flatten())
                .collect();

            if origin == "pk" {
                primary = Some(IndexInfo::new(IndexInfo::PRIMARY, members));
            } else {
                secondary.push(IndexInfo::new(name, members));
            }
        }

        // An INTEGER PRIMARY KEY aliases the rowid and has no index of its own
        if primary.is_none() && !pk_columns.is_empty() {
            pk_columns.sort_by_key(|(position, _)| *position);
            primary = Some(IndexInfo::new(
                IndexInfo::PRIMARY,
                pk_columns.into_iter().map(|(_, name)| name).collect(),
            ));
        }

        // index_list reports the newest index first
        secondary.reverse();
        let indexes = primary.into_iter().chain(secondary).collect();

        Ok(TableSchema::new(table_name)
            .with_columns(columns)
            .with_indexes(indexes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ConnectionInfo;

    #[test]
    fn test_mysql_quoting() {
        assert_eq!(mysql::quote_identifier("shop"), "`shop`");
        assert_eq!(mysql::quote_identifier("we`ird"), "`we``ird`");
        assert_eq!(mysql::quote_literal("o'neil"), "'o''neil'");
        assert_eq!(mysql::quote_literal(r"a\b"), r"'a\\b'");
    }

    #[test]
    fn test_sqlite_declared_length() {
        assert_eq!(sqlite::declared_length("VARCHAR(100)"), Some(100));
        assert_eq!(sqlite::declared_length("DECIMAL(10, 2)"), Some(10));
        assert_eq!(sqlite::declared_length("TEXT"), None);
    }

    async fn inspector() -> (SchemaInspector, String) {
        let registry = SessionRegistry::default();
        let id = registry
            .connect(ConnectionInfo::sqlite(":memory:"))
            .await
            .unwrap();
        {
            let session = registry.session(&id).await.unwrap();
            let mut conn = session.connection().await.unwrap();
            for sql in [
                "CREATE TABLE users (id INTEGER PRIMARY KEY, email VARCHAR(120) NOT NULL, nickname TEXT DEFAULT 'anon')",
                "CREATE INDEX idx_users_email ON users (email)",
                "CREATE VIEW active_users AS SELECT id FROM users",
            ] {
                conn.execute(sql).await.unwrap();
            }
        }
        (SchemaInspector::new(registry), id)
    }

    #[tokio::test]
    async fn test_sqlite_tables_and_views() {
        let (inspector, id) = inspector().await;
        assert_eq!(inspector.list_tables(&id, None).await.unwrap(), vec!["users"]);
        assert_eq!(
            inspector.list_views(&id, Some("")).await.unwrap(),
            vec!["active_users"]
        );
        assert!(inspector.list_procedures(&id, None).await.unwrap().is_empty());
        assert!(inspector.list_functions(&id, None).await.unwrap().is_empty());
        assert_eq!(inspector.list_databases(&id).await.unwrap(), vec!["main"]);
        assert_eq!(
            inspector.current_database(&id).await.unwrap().as_deref(),
            Some("main")
        );
    }

    #[tokio::test]
    async fn test_sqlite_table_schema() {
        let (inspector, id) = inspector().await;
        let schema = inspector.table_schema(&id, "users", None).await.unwrap();

        let names: Vec<_> = schema.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["id", "email", "nickname"]);
        assert_eq!(schema.primary_key(), vec!["id"]);
        assert!(!schema.columns[1].nullable);
        assert_eq!(schema.columns[1].max_length, Some(120));
        assert_eq!(schema.columns[2].default_value.as_deref(), Some("'anon'"));

        assert_eq!(schema.indexes.len(), 2);
        assert_eq!(schema.indexes[0].name, "PRIMARY");
        assert!(schema.indexes[0].primary);
        assert!(!schema.indexes[0].unique);
        assert_eq!(schema.indexes[1].name, "idx_users_email");
        assert!(schema.indexes[1].unique);
        assert_eq!(schema.indexes[1].columns, vec!["email"]);
    }

    #[tokio::test]
    async fn test_sqlite_missing_table() {
        let (inspector, id) = inspector().await;
        let err = inspector.table_schema(&id, "nope", None).await.unwrap_err();
        assert!(matches!(err, DbError::Schema { .. }));
    }

    #[tokio::test]
    async fn test_sqlite_switch_database_rejected() {
        let (inspector, id) = inspector().await;
        let err = inspector.switch_database(&id, "other").await.unwrap_err();
        assert!(matches!(err, DbError::InvalidInput { .. }));

        let err = inspector.switch_database(&id, "  ").await.unwrap_err();
        assert_eq!(err.to_string(), "Database name is required");
    }
}
