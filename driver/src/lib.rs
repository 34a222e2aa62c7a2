//! Model-independent half of the text-to-SQL pipeline.
//!
//! Everything here works on plain strings: building the prompt, handing it to
//! an [`Oracle`](generator::Oracle) and turning whatever comes back into a
//! single runnable SQL statement. Loading and running an actual model lives in
//! the `sqlcoder-chat` crate.

pub mod error;
pub mod generator;
pub mod prompt;

pub use error::GenerationError;
pub use generator::{
    normalize, statement_kind, Generated, Oracle, SqlGenerator, StatementKind, UNPARSED_SENTINEL,
};
pub use prompt::{build_prompt, SQL_MARKER};
