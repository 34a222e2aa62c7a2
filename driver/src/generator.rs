use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use sqlparser::ast::Statement;
use sqlparser::dialect::SQLiteDialect;
use sqlparser::parser::Parser;

use crate::error::GenerationError;
use crate::prompt::{build_prompt, SQL_MARKER};

/// Shown instead of a query when the model output has no [`SQL_MARKER`].
pub const UNPARSED_SENTINEL: &str = "I messed up, sorry!";

static ILIKE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bilike\b").expect("ilike pattern is valid"));

/// A text-to-text model, treated as a black box.
///
/// Implementations must be deterministic for a given prompt; the SQL
/// generator relies on that for reproducible answers.
pub trait Oracle {
    /// Complete `prompt`, returning the decoded text. The text may echo the
    /// prompt before the completion.
    fn complete(&self, prompt: &str) -> eyre::Result<String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Generated {
    /// A normalized statement ending in exactly one `;`.
    Sql(String),
    /// The model output did not contain the answer marker.
    Unparsed,
}

impl Generated {
    pub fn sql(&self) -> Option<&str> {
        match self {
            Self::Sql(sql) => Some(sql),
            Self::Unparsed => None,
        }
    }
}

impl fmt::Display for Generated {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sql(sql) => f.write_str(sql),
            Self::Unparsed => f.write_str(UNPARSED_SENTINEL),
        }
    }
}

pub struct SqlGenerator<O> {
    oracle: O,
}

impl<O: Oracle> SqlGenerator<O> {
    pub fn new(oracle: O) -> Self {
        Self { oracle }
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    /// Ask the oracle for a query answering `question` against `schema`.
    ///
    /// A missing answer marker is reported as [`Generated::Unparsed`], only
    /// failures of the oracle itself are errors.
    pub fn generate(&self, question: &str, schema: &str) -> Result<Generated, GenerationError> {
        let prompt = build_prompt(question, schema);

        tracing::debug!(prompt_len = prompt.len(), "built prompt");

        let output = self
            .oracle
            .complete(&prompt)
            .map_err(GenerationError::Oracle)?;

        let Some(sql) = self.extract_sql(&output) else {
            tracing::warn!(output_len = output.len(), "could not parse the model output");
            return Ok(Generated::Unparsed);
        };

        Ok(Generated::Sql(normalize(sql)))
    }

    /// The text between the first answer marker and the next one, if any.
    fn extract_sql<'o>(&self, output: &'o str) -> Option<&'o str> {
        output.split(SQL_MARKER).nth(1)
    }
}

/// Turn raw model text into a single runnable statement.
///
/// Code fences and surrounding whitespace go, trailing semicolons collapse
/// into exactly one and the postgres-only `ilike` operator becomes `LIKE`.
/// Applying it twice changes nothing.
pub fn normalize(raw: &str) -> String {
    let unfenced = raw.replace("```sql", "").replace("```", "");

    let body = unfenced
        .trim()
        .trim_end_matches(|c: char| c == ';' || c.is_whitespace());

    let sql = format!("{body};");

    ILIKE.replace_all(&sql, "LIKE").into_owned()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    /// Only read queries.
    Query,
    /// At least one insert, update or delete.
    Mutation,
    /// Parsed, but contains something else (DDL, pragmas, ...).
    Other,
    Unparseable,
}

/// Classify `sql` without executing it.
pub fn statement_kind(sql: &str) -> StatementKind {
    let Ok(statements) = Parser::parse_sql(&SQLiteDialect {}, sql) else {
        return StatementKind::Unparseable;
    };

    if statements.is_empty() {
        return StatementKind::Other;
    }

    let mut kind = StatementKind::Query;

    for statement in &statements {
        match statement {
            Statement::Query(_) => {}
            Statement::Insert(_) | Statement::Update { .. } | Statement::Delete(_) => {
                kind = StatementKind::Mutation;
            }
            _ if kind == StatementKind::Query => kind = StatementKind::Other,
            _ => {}
        }
    }

    kind
}
