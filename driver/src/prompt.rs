/// Opens the answer slot of the prompt. The model output is split on it.
pub const SQL_MARKER: &str = "[SQL]";

/// Fills the sqlcoder instruction template with a question and a schema.
///
/// The question is embedded verbatim, twice. Rejecting empty questions is up
/// to the caller.
pub fn build_prompt(question: &str, schema: &str) -> String {
    format!(
        r#"
### Task
Generate a SQL query to answer [QUESTION]{question}[/QUESTION]

### Database Schema
The query will run on a database with the following schema:
{schema}

### Answer
Given the database schema, here is the SQL query that [QUESTION]{question}[/QUESTION]
{SQL_MARKER}
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: &str = "CREATE TABLE users (id INT PRIMARY KEY, name TEXT);";

    #[test]
    fn test_prompt_embeds_question_twice() {
        let prompt = build_prompt("How many users are there?", SCHEMA);

        assert_eq!(
            prompt
                .matches("[QUESTION]How many users are there?[/QUESTION]")
                .count(),
            2
        );
        assert!(prompt.contains(SCHEMA));
    }

    #[test]
    fn test_prompt_ends_with_open_marker() {
        let prompt = build_prompt("list users", SCHEMA);

        assert!(prompt.starts_with("\n### Task\n"));
        assert!(prompt.ends_with("[SQL]\n"));
        assert_eq!(prompt.matches(SQL_MARKER).count(), 1);
    }

    #[test]
    fn test_prompt_is_deterministic() {
        assert_eq!(build_prompt("q", SCHEMA), build_prompt("q", SCHEMA));
    }

    #[test]
    fn test_empty_question_passes_through() {
        let prompt = build_prompt("", SCHEMA);

        assert!(prompt.contains("Generate a SQL query to answer [QUESTION][/QUESTION]\n"));
    }

    #[test]
    fn test_question_is_not_treated_as_template() {
        let prompt = build_prompt("what is {schema}?", SCHEMA);

        assert!(prompt.contains("[QUESTION]what is {schema}?[/QUESTION]"));
    }
}
