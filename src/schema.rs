//! The demo database: one DDL literal shared by the prompt and the engine.

/// Table definitions handed to the model and executed against the database.
pub const SCHEMA: &str = r#"
CREATE TABLE students (
  student_id INT PRIMARY KEY,
  name VARCHAR(100),
  major VARCHAR(50),
  gpa FLOAT
);

CREATE TABLE courses (
  course_id INT PRIMARY KEY,
  course_name VARCHAR(100),
  department VARCHAR(50)
);

CREATE TABLE enrollments (
  student_id INT,
  course_id INT,
  grade CHAR(1),
  FOREIGN KEY (student_id) REFERENCES students(student_id),
  FOREIGN KEY (course_id) REFERENCES courses(course_id)
);
"#;

/// Rows inserted once, right after [`SCHEMA`].
pub const SEED: &str = r#"
INSERT INTO students (student_id, name, major, gpa) VALUES
(1, 'Alice', 'Computer Science', 3.8),
(2, 'Bob', 'Physics', 3.5),
(3, 'Charlie', 'Math', 3.9);

INSERT INTO courses (course_id, course_name, department) VALUES
(101, 'Intro to CS', 'Computer Science'),
(102, 'Calculus I', 'Math'),
(103, 'Quantum Physics', 'Physics');

INSERT INTO enrollments (student_id, course_id, grade) VALUES
(1, 101, 'A'),
(1, 102, 'B'),
(2, 103, 'A'),
(3, 102, 'A');
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_defines_three_tables() {
        for table in ["students", "courses", "enrollments"] {
            assert!(SCHEMA.contains(&format!("CREATE TABLE {table} (")));
            assert!(SEED.contains(&format!("INSERT INTO {table} (")));
        }

        assert_eq!(SCHEMA.matches("CREATE TABLE").count(), 3);
    }
}
