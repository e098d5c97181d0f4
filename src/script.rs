//! SQL script splitting and sequential execution.
//!
//! Statements end at `;` outside of string literals, quoted identifiers,
//! `$$` blocks and comments. Segments holding nothing but whitespace and
//! comments are dropped.

use crate::config::WarehouseConfig;
use crate::types::{FlightSyncError, Result};
use crate::warehouse::Warehouse;

use std::path::Path;
use tracing::{error, info};

/// Characters of a statement shown in log lines and errors.
pub const PREVIEW_CHARS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lexeme {
    Code,
    SingleQuoted,
    DoubleQuoted,
    Dollar,
    LineComment,
    BlockComment,
}

/// Split a script into executable statements, in order.
pub fn split_statements(script: &str) -> Vec<String> {
    let chars: Vec<char> = script.chars().collect();
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut has_code = false;
    let mut state = Lexeme::Code;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        match state {
            Lexeme::Code => match (c, next) {
                (';', _) => {
                    if has_code {
                        statements.push(current.trim().to_string());
                    }
                    current.clear();
                    has_code = false;
                    i += 1;
                    continue;
                }
                ('\'', _) => state = Lexeme::SingleQuoted,
                ('"', _) => state = Lexeme::DoubleQuoted,
                ('$', Some('$')) => {
                    state = Lexeme::Dollar;
                    current.push_str("$$");
                    has_code = true;
                    i += 2;
                    continue;
                }
                ('-', Some('-')) | ('/', Some('/')) => state = Lexeme::LineComment,
                ('/', Some('*')) => {
                    state = Lexeme::BlockComment;
                    current.push_str("/*");
                    i += 2;
                    continue;
                }
                _ => {}
            },
            Lexeme::SingleQuoted => match (c, next) {
                ('\\', Some(escaped)) => {
                    current.push(c);
                    current.push(escaped);
                    i += 2;
                    continue;
                }
                ('\'', Some('\'')) => {
                    current.push_str("''");
                    i += 2;
                    continue;
                }
                ('\'', _) => state = Lexeme::Code,
                _ => {}
            },
            Lexeme::DoubleQuoted => match (c, next) {
                ('"', Some('"')) => {
                    current.push_str("\"\"");
                    i += 2;
                    continue;
                }
                ('"', _) => state = Lexeme::Code,
                _ => {}
            },
            Lexeme::Dollar => {
                if c == '$' && next == Some('$') {
                    state = Lexeme::Code;
                    current.push_str("$$");
                    i += 2;
                    continue;
                }
            }
            Lexeme::LineComment => {
                if c == '\n' {
                    state = Lexeme::Code;
                }
            }
            Lexeme::BlockComment => {
                if c == '*' && next == Some('/') {
                    state = Lexeme::Code;
                    current.push_str("*/");
                    i += 2;
                    continue;
                }
            }
        }

        if matches!(state, Lexeme::Code | Lexeme::SingleQuoted | Lexeme::DoubleQuoted) && !c.is_whitespace() {
            has_code = true;
        }
        current.push(c);
        i += 1;
    }

    if has_code {
        statements.push(current.trim().to_string());
    }

    statements
}

/// First `PREVIEW_CHARS` characters of the trimmed statement.
pub fn statement_preview(statement: &str) -> String {
    statement.trim().chars().take(PREVIEW_CHARS).collect()
}

/// Read `path` and execute its statements one by one.
///
/// The first failing statement is logged with a preview and returned as
/// the error; the remaining statements are not run. Returns the number of
/// statements executed.
pub async fn execute_script(warehouse: &mut Warehouse, path: &Path) -> Result<usize> {
    let script = tokio::fs::read_to_string(path).await?;

    info!(path = %path.display(), "Executing SQL");

    let statements = split_statements(&script);
    for statement in &statements {
        let preview = statement_preview(statement);
        match warehouse.execute(statement).await {
            Ok(result) => {
                info!(
                    rows = ?result.num_rows,
                    handle = ?result.statement_handle,
                    "Command executed successfully: {}...",
                    preview
                );
            }
            Err(e) => {
                error!(error = %e, "Error executing command: {}...", preview);
                return Err(FlightSyncError::Statement {
                    preview,
                    source: Box::new(e),
                });
            }
        }
    }

    info!(count = statements.len(), "All SQL commands executed successfully.");
    Ok(statements.len())
}

/// Connect, run the script at `path`, and close the connection whatever
/// the outcome.
pub async fn run_sql_file(config: WarehouseConfig, path: &Path) -> Result<usize> {
    let mut warehouse = Warehouse::connect(config).await?;
    let outcome = execute_script(&mut warehouse, path).await;
    warehouse.close();
    outcome
}
