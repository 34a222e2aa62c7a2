//! Plain-text and JSON output for the terminal front end.

use std::fmt::Write;

use serde_json::json;

use crate::executor::QueryResult;
use crate::pipeline::Answer;

/// An aligned text table followed by a row count.
pub fn table(result: &QueryResult) -> String {
    let cells = result
        .rows
        .iter()
        .map(|row| row.iter().map(ToString::to_string).collect::<Vec<_>>())
        .collect::<Vec<_>>();

    let mut widths = result
        .columns
        .iter()
        .map(|c| c.chars().count())
        .collect::<Vec<_>>();

    for row in &cells {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();

    if !result.columns.is_empty() {
        push_row(&mut out, &result.columns, &widths);

        let rule = widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("-+-");
        out.push_str(&rule);
        out.push('\n');

        for row in &cells {
            push_row(&mut out, row, &widths);
        }
    }

    let n = result.rows.len();
    let _ = writeln!(out, "({n} row{})", if n == 1 { "" } else { "s" });

    out
}

fn push_row(out: &mut String, cells: &[String], widths: &[usize]) {
    let line = cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| format!("{cell:<width$}"))
        .collect::<Vec<_>>()
        .join(" | ");

    out.push_str(line.trim_end());
    out.push('\n');
}

/// The generated SQL, then the results or the error that replaced them.
pub fn answer(answer: &Answer) -> String {
    let mut out = String::from("Generated SQL\n");

    match &answer.sql {
        Ok(generated) => {
            let _ = writeln!(out, "{generated}");
        }
        Err(e) => {
            let _ = writeln!(out, "Generation Error: {e}");
        }
    }

    if let Some(result) = &answer.result {
        out.push_str("\nQuery Results\n");

        match result {
            Ok(result) => out.push_str(&table(result)),
            Err(e) => {
                let _ = writeln!(out, "SQL Error: {e}");
            }
        }
    }

    out
}

pub fn answer_json(answer: &Answer) -> serde_json::Value {
    let mut value = json!({
        "request_id": answer.request_id.to_string(),
        "question": answer.question,
    });

    match &answer.sql {
        Ok(generated) => {
            value["sql"] = json!(generated.to_string());
            value["parsed"] = json!(generated.sql().is_some());
        }
        Err(e) => value["generation_error"] = json!(e.to_string()),
    }

    match &answer.result {
        Some(Ok(result)) => value["result"] = json!(result),
        Some(Err(e)) => value["sql_error"] = json!(e.to_string()),
        None => {}
    }

    value
}

#[cfg(test)]
mod tests {
    use sqlcoder_driver::{GenerationError, Generated, UNPARSED_SENTINEL};
    use uuid::Uuid;

    use super::*;
    use crate::executor::{Database, QueryError, Value};

    fn answer_with(
        sql: Result<Generated, GenerationError>,
        result: Option<Result<QueryResult, QueryError>>,
    ) -> Answer {
        Answer {
            request_id: Uuid::nil(),
            question: "q".to_string(),
            sql,
            result,
        }
    }

    #[test]
    fn test_table_aligns_columns() {
        let result = QueryResult {
            columns: vec!["name".into(), "gpa".into()],
            rows: vec![
                vec![Value::Text("Alice".into()), Value::Real(3.8)],
                vec![Value::Text("Bo".into()), Value::Null],
            ],
        };

        assert_eq!(
            table(&result),
            "name  | gpa\n\
             ------+-----\n\
             Alice | 3.8\n\
             Bo    | NULL\n\
             (2 rows)\n"
        );
    }

    #[test]
    fn test_table_for_empty_result() {
        let result = QueryResult {
            columns: vec!["name".into()],
            rows: vec![],
        };

        assert_eq!(table(&result), "name\n----\n(0 rows)\n");
    }

    #[test]
    fn test_answer_shows_sql_even_when_execution_fails() {
        let db = Database::demo().unwrap();
        let err = db.execute("SELECT * FROM nonexistent;").unwrap_err();

        let text = answer(&answer_with(
            Ok(Generated::Sql("SELECT * FROM nonexistent;".into())),
            Some(Err(err)),
        ));

        assert!(text.starts_with("Generated SQL\nSELECT * FROM nonexistent;\n"));
        assert!(text.contains("SQL Error: no such table: nonexistent"), "{text}");
    }

    #[test]
    fn test_answer_shows_sentinel_without_results() {
        let text = answer(&answer_with(Ok(Generated::Unparsed), None));

        assert_eq!(text, format!("Generated SQL\n{UNPARSED_SENTINEL}\n"));
    }

    #[test]
    fn test_answer_json() {
        let result = QueryResult {
            columns: vec!["n".into()],
            rows: vec![vec![Value::Integer(3)]],
        };

        let value = answer_json(&answer_with(
            Ok(Generated::Sql("SELECT COUNT(*) AS n FROM students;".into())),
            Some(Ok(result)),
        ));

        assert_eq!(value["sql"], "SELECT COUNT(*) AS n FROM students;");
        assert_eq!(value["parsed"], true);
        assert_eq!(value["result"]["columns"][0], "n");
        assert_eq!(value["result"]["rows"][0][0], 3);
        assert!(value.get("sql_error").is_none());
    }
}
