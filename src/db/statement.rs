//! Textual SQL statement classification.
//!
//! Classification is a prefix heuristic over the trimmed, upper-cased,
//! whitespace-collapsed statement text. It is not a parser: a statement that
//! starts with a comment (`-- ...` or `/* ... */`) is classified by the
//! comment text and therefore falls through to [`StatementKind::Mutation`].

use crate::models::TransactionCommand;

/// Leading keywords of statements that return a result set.
const RESULT_SET_KEYWORDS: &[&str] = &[
    "SELECT", "SHOW", "DESCRIBE", "DESC", "EXPLAIN", "WITH", "HELP", "CALL", "EXEC", "EXECUTE",
    "TABLE", "COLUMNS",
];

/// Leading keywords of statements that may be wrapped as a derived table.
const PAGEABLE_KEYWORDS: &[&str] = &["SELECT", "WITH"];

/// Kind of statement, deciding how it is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Transaction(TransactionCommand),
    ResultSet,
    Mutation,
}

/// Upper-case, collapse runs of whitespace, and drop trailing semicolons.
pub fn normalize(sql: &str) -> String {
    let collapsed = sql.split_whitespace().collect::<Vec<_>>().join(" ");
    trim_terminator(&collapsed).to_uppercase()
}

/// Strip surrounding whitespace and any trailing `;` terminators.
pub fn trim_terminator(sql: &str) -> &str {
    sql.trim().trim_end_matches(|c: char| c == ';' || c.is_whitespace())
}

/// The leading alphabetic keyword of a normalized statement.
fn leading_keyword(normalized: &str) -> &str {
    let end = normalized
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(normalized.len());
    &normalized[..end]
}

/// Transaction control by leading keywords, so modifiers such as
/// `BEGIN IMMEDIATE` or `START TRANSACTION READ ONLY` are recognised.
fn transaction_command(normalized: &str) -> Option<TransactionCommand> {
    let mut words = normalized.split(' ');
    let first = words.next()?;
    let second = words.next();
    match (first, second) {
        ("BEGIN", _) | ("START", Some("TRANSACTION")) => Some(TransactionCommand::Begin),
        ("COMMIT", _) | ("END", None | Some("TRANSACTION")) => Some(TransactionCommand::Commit),
        // ROLLBACK TO [SAVEPOINT] only unwinds part of the transaction
        ("ROLLBACK", _) if normalized.contains(" TO ") => None,
        ("ROLLBACK", _) => Some(TransactionCommand::Rollback),
        _ => None,
    }
}

/// Classify a statement.
pub fn classify(sql: &str) -> StatementKind {
    let normalized = normalize(sql);

    if let Some(command) = transaction_command(&normalized) {
        return StatementKind::Transaction(command);
    }

    if RESULT_SET_KEYWORDS.contains(&leading_keyword(&normalized)) {
        return StatementKind::ResultSet;
    }

    StatementKind::Mutation
}

/// Whether the statement text already carries a `LIMIT` clause.
pub fn has_row_limit(sql: &str) -> bool {
    format!(" {} ", normalize(sql)).contains(" LIMIT ")
}

/// Whether the statement can be wrapped in a count probe and paged.
pub fn is_pageable(sql: &str) -> bool {
    let normalized = normalize(sql);
    PAGEABLE_KEYWORDS.contains(&leading_keyword(&normalized))
}

/// `SELECT COUNT(*) FROM (<sql>) AS total_count`
///
/// The statement sits on its own lines so a trailing `--` comment cannot
/// swallow the closing parenthesis.
pub fn count_query(sql: &str) -> String {
    format!(
        "SELECT COUNT(*) FROM (\n{}\n) AS total_count",
        trim_terminator(sql)
    )
}

/// Append `LIMIT <page_size> OFFSET <(page-1)*page_size>` to the statement.
///
/// Page numbers are 1-based; page 0 is treated as page 1.
pub fn paged_query(sql: &str, page: u32, page_size: u32) -> String {
    let offset = u64::from(page.saturating_sub(1)) * u64::from(page_size);
    format!(
        "{}\nLIMIT {} OFFSET {}",
        trim_terminator(sql),
        page_size,
        offset
    )
}
