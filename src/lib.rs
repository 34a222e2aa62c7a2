//! Natural-language questions over a small demo database.
//!
//! A pretrained sqlcoder model turns each question into SQL, which then runs
//! against an in-memory sqlite database seeded with [`schema::SEED`].

pub mod config;
pub mod driver;
pub mod executor;
pub mod logging;
pub mod pipeline;
pub mod render;
pub mod schema;

pub use config::Config;
pub use driver::{Model, ModelLoader, ModelSource, PretrainedSource, TextGenerator};
pub use executor::{Database, QueryError, QueryResult, Value};
pub use pipeline::{Answer, Pipeline, PipelineError};
pub use schema::{SCHEMA, SEED};
