use sqlcoder_driver::{
    statement_kind, GenerationError, Generated, Oracle, SqlGenerator, StatementKind,
};
use thiserror::Error;
use uuid::Uuid;

use crate::executor::{Database, QueryError, QueryResult};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Please enter a question.")]
    EmptyQuestion,
}

/// Outcome of one question. Generation and execution are reported
/// separately, so a query that fails to run is still shown.
#[derive(Debug)]
pub struct Answer {
    pub request_id: Uuid,
    pub question: String,
    pub sql: Result<Generated, GenerationError>,
    /// `None` when no SQL was produced.
    pub result: Option<Result<QueryResult, QueryError>>,
}

impl Answer {
    pub fn generated_sql(&self) -> Option<&str> {
        self.sql.as_ref().ok().and_then(Generated::sql)
    }
}

/// Question in, SQL and rows out.
///
/// Built once at startup from an already loaded oracle and a seeded database,
/// then shared by every question.
pub struct Pipeline<O> {
    generator: SqlGenerator<O>,
    database: Database,
    schema: String,
}

impl<O: Oracle> Pipeline<O> {
    pub fn new(oracle: O, database: Database, schema: impl Into<String>) -> Self {
        Self {
            generator: SqlGenerator::new(oracle),
            database,
            schema: schema.into(),
        }
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn ask(&self, question: &str) -> Result<Answer, PipelineError> {
        if question.trim().is_empty() {
            return Err(PipelineError::EmptyQuestion);
        }

        let request_id = Uuid::new_v4();
        let span = tracing::info_span!("ask", %request_id);
        let _enter = span.enter();

        tracing::info!(question, "generating sql");

        let sql = self.generator.generate(question, &self.schema);

        let result = match &sql {
            Ok(Generated::Sql(sql)) => {
                match statement_kind(sql) {
                    StatementKind::Query => {}
                    kind => tracing::warn!(?kind, "generated statement is not a plain query"),
                }

                let result = self.database.execute(sql);

                if let Err(e) = &result {
                    tracing::warn!(error = %e, "query failed");
                }

                Some(result)
            }
            Ok(Generated::Unparsed) => None,
            Err(e) => {
                tracing::error!(error = %e, "generation failed");
                None
            }
        };

        Ok(Answer {
            request_id,
            question: question.to_string(),
            sql,
            result,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use sqlcoder_driver::{SQL_MARKER, UNPARSED_SENTINEL};

    use super::*;
    use crate::executor::Value;
    use crate::schema::SCHEMA;

    /// Replays completions in order, echoing the prompt like a causal model.
    struct Scripted {
        completions: Vec<&'static str>,
        calls: Cell<usize>,
    }

    impl Scripted {
        fn new(completions: &[&'static str]) -> Self {
            Self {
                completions: completions.to_vec(),
                calls: Cell::new(0),
            }
        }
    }

    impl Oracle for Scripted {
        fn complete(&self, prompt: &str) -> eyre::Result<String> {
            let n = self.calls.get();
            self.calls.set(n + 1);

            match self.completions.get(n) {
                Some(&"<fail>") => eyre::bail!("generation crashed"),
                Some(&"<garbage>") => Ok("no marker here".to_string()),
                Some(completion) => Ok(format!("{prompt}{completion}")),
                None => eyre::bail!("script exhausted"),
            }
        }
    }

    fn pipeline(completions: &[&'static str]) -> Pipeline<Scripted> {
        Pipeline::new(
            Scripted::new(completions),
            Database::demo().unwrap(),
            SCHEMA,
        )
    }

    #[test]
    fn test_ask_runs_generated_sql() {
        let pipeline = pipeline(&["SELECT name FROM students WHERE gpa > 3.7 ORDER BY name"]);

        let answer = pipeline.ask("Who has a gpa above 3.7?").unwrap();

        assert_eq!(
            answer.generated_sql(),
            Some("SELECT name FROM students WHERE gpa > 3.7 ORDER BY name;")
        );

        let result = answer.result.unwrap().unwrap();
        assert_eq!(
            result.rows,
            [
                [Value::Text("Alice".into())],
                [Value::Text("Charlie".into())]
            ]
        );
    }

    #[test]
    fn test_empty_question_is_rejected_before_generation() {
        let pipeline = pipeline(&[]);

        assert!(matches!(pipeline.ask(""), Err(PipelineError::EmptyQuestion)));
        assert!(matches!(pipeline.ask("  "), Err(PipelineError::EmptyQuestion)));
        assert_eq!(pipeline.generator.oracle().calls.get(), 0);
    }

    #[test]
    fn test_sql_error_keeps_generated_sql_and_pipeline_usable() {
        let pipeline = pipeline(&["SELECT * FROM nonexistent", "SELECT COUNT(*) FROM courses"]);

        let answer = pipeline.ask("show me everything").unwrap();
        assert_eq!(answer.generated_sql(), Some("SELECT * FROM nonexistent;"));
        assert!(matches!(answer.result, Some(Err(QueryError::Sqlite(_)))));

        let answer = pipeline.ask("how many courses?").unwrap();
        let result = answer.result.unwrap().unwrap();
        assert_eq!(result.rows, [[Value::Integer(3)]]);
    }

    #[test]
    fn test_multiple_statements_are_reported_with_the_sql() {
        let pipeline = pipeline(&[
            "SELECT name FROM students; DELETE FROM students",
            "SELECT COUNT(*) FROM students",
        ]);

        let answer = pipeline.ask("who are the students?").unwrap();
        assert_eq!(
            answer.generated_sql(),
            Some("SELECT name FROM students; DELETE FROM students;")
        );
        assert!(matches!(
            answer.result,
            Some(Err(QueryError::MultipleStatements))
        ));

        let answer = pipeline.ask("how many students?").unwrap();
        let result = answer.result.unwrap().unwrap();
        assert_eq!(result.rows, [[Value::Integer(3)]]);
    }

    #[test]
    fn test_unparsed_output_skips_execution() {
        let pipeline = pipeline(&["<garbage>", "SELECT 1"]);

        let answer = pipeline.ask("anything").unwrap();
        assert_eq!(answer.sql.as_ref().unwrap().to_string(), UNPARSED_SENTINEL);
        assert!(answer.result.is_none());

        let answer = pipeline.ask("anything else").unwrap();
        assert_eq!(answer.generated_sql(), Some("SELECT 1;"));
    }

    #[test]
    fn test_generation_failure_is_reported() {
        let pipeline = pipeline(&["<fail>", "SELECT 2"]);

        let answer = pipeline.ask("anything").unwrap();
        assert!(answer.sql.is_err());
        assert!(answer.result.is_none());

        let answer = pipeline.ask("again").unwrap();
        assert!(answer.result.unwrap().is_ok());
    }

    #[test]
    fn test_ilike_is_rewritten_before_execution() {
        let pipeline = pipeline(&["SELECT name FROM students WHERE name ilike 'a%'"]);

        let answer = pipeline.ask("students starting with a").unwrap();

        assert!(answer.generated_sql().unwrap().contains(" LIKE "));
        let result = answer.result.unwrap().unwrap();
        assert_eq!(result.rows, [[Value::Text("Alice".into())]]);
    }

    #[test]
    fn test_prompt_uses_pipeline_schema() {
        let pipeline = pipeline(&[]);

        assert_eq!(pipeline.schema(), SCHEMA);
        assert!(sqlcoder_driver::build_prompt("q", pipeline.schema())
            .trim_end()
            .ends_with(SQL_MARKER));
    }
}
