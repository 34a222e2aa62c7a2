use std::io::{self, BufRead, Write};

use clap::Parser;
use eyre::{Context, Result};
use sqlcoder_chat::{
    logging, render, Config, Database, ModelLoader, Pipeline, TextGenerator, SCHEMA, SEED,
};
use sqlcoder_driver::Oracle;

fn main() -> Result<()> {
    let config = Config::parse();

    let _guard = logging::init(config.trace_chrome.as_deref())?;

    let mut stdout = io::stdout().lock();

    if !config.json {
        writeln!(stdout, "NLU Text-to-SQL Chatbot")?;
        writeln!(
            stdout,
            "Ask me questions about the database schema below, and I will generate and execute the SQL query."
        )?;
        writeln!(stdout, "\nDatabase Schema{SCHEMA}")?;
        stdout.flush()?;
    }

    // a model that cannot be loaded means no question can be answered
    let loader = ModelLoader::new(config.source());
    let model = loader
        .load()
        .wrap_err("failed to load the model, not serving any questions")?;

    let database =
        Database::open_seeded(SCHEMA, SEED).wrap_err("failed to set up the demo database")?;

    let pipeline = Pipeline::new(TextGenerator::new(model), database, SCHEMA);

    match &config.question {
        Some(question) => respond(&pipeline, question, config.json, &mut stdout)?,
        None => {
            let stdin = io::stdin().lock();

            prompt(&mut stdout, config.json)?;

            for line in stdin.lines() {
                let line = line?;

                if matches!(line.trim(), "quit" | "exit") {
                    break;
                }

                respond(&pipeline, &line, config.json, &mut stdout)?;
                prompt(&mut stdout, config.json)?;
            }
        }
    }

    Ok(())
}

fn prompt(out: &mut impl Write, json: bool) -> io::Result<()> {
    if !json {
        write!(out, "\nEnter your question here: ")?;
        out.flush()?;
    }
    Ok(())
}

fn respond<O: Oracle>(
    pipeline: &Pipeline<O>,
    question: &str,
    json: bool,
    out: &mut impl Write,
) -> io::Result<()> {
    match pipeline.ask(question) {
        Ok(answer) if json => {
            writeln!(out, "{}", render::answer_json(&answer))?;
        }
        Ok(answer) => {
            write!(out, "\n{}", render::answer(&answer))?;
        }
        Err(e) if json => {
            writeln!(out, "{}", serde_json::json!({ "error": e.to_string() }))?;
        }
        Err(e) => {
            writeln!(out, "{e}")?;
        }
    }

    out.flush()
}
