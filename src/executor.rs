use std::fmt;

use rusqlite::types::ValueRef;
use rusqlite::{Batch, Connection};
use serde::Serialize;
use thiserror::Error;

use crate::schema::{SCHEMA, SEED};

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("model produced an empty statement")]
    Empty,

    /// Only one statement runs per question; nothing is executed otherwise.
    #[error("You can only execute one statement at a time.")]
    MultipleStatements,

    #[error("{0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// One result cell, typed the way sqlite stored it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl From<ValueRef<'_>> for Value {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => Self::Null,
            ValueRef::Integer(i) => Self::Integer(i),
            ValueRef::Real(r) => Self::Real(r),
            ValueRef::Text(t) => Self::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => Self::Blob(b.to_vec()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Real(r) => write!(f, "{r}"),
            Self::Text(t) => f.write_str(t),
            Self::Blob(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    /// Column names in projection order.
    pub columns: Vec<String>,
    /// Rows in the order the engine produced them.
    pub rows: Vec<Vec<Value>>,
}

impl QueryResult {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// In-memory sqlite database, seeded once and then queried per question.
///
/// Statements run verbatim. Nothing stops a statement from writing to the
/// database, there is no timeout and no row limit.
pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open_seeded(schema: &str, seed: &str) -> Result<Self, QueryError> {
        let conn = Connection::open_in_memory()?;

        conn.execute_batch(schema)?;
        conn.execute_batch(seed)?;

        tracing::debug!("seeded in-memory database");

        Ok(Self { conn })
    }

    /// The students/courses/enrollments demo database.
    pub fn demo() -> Result<Self, QueryError> {
        Self::open_seeded(SCHEMA, SEED)
    }

    pub fn execute(&self, sql: &str) -> Result<QueryResult, QueryError> {
        if sql
            .trim_matches(|c: char| c == ';' || c.is_whitespace())
            .is_empty()
        {
            return Err(QueryError::Empty);
        }

        let mut batch = Batch::new(&self.conn, sql);

        let Some(mut stmt) = batch.next()? else {
            return Err(QueryError::Empty);
        };

        // a trailing statement, even a malformed one, rejects the whole text
        if !matches!(batch.next(), Ok(None)) {
            return Err(QueryError::MultipleStatements);
        }

        let columns = stmt
            .column_names()
            .into_iter()
            .map(String::from)
            .collect::<Vec<_>>();

        let mut rows = stmt.query([])?;
        let mut collected = vec![];

        while let Some(row) = rows.next()? {
            let values = (0..columns.len())
                .map(|i| row.get_ref(i).map(Value::from))
                .collect::<Result<Vec<_>, _>>()?;

            collected.push(values);
        }

        tracing::debug!(rows = collected.len(), "query executed");

        Ok(QueryResult {
            columns,
            rows: collected,
        })
    }
}
