use std::path::PathBuf;

use clap::Parser;

use crate::driver::model::{
    PretrainedSource, DEFAULT_CACHE_DIR, DEFAULT_REPO_ID, DEFAULT_TOKENIZER_FILE,
    DEFAULT_WEIGHTS_FILE,
};

#[derive(Parser, Debug, Clone)]
#[command(name = "sqlchat")]
#[command(about = "Ask questions about the demo database in plain English", long_about = None)]
pub struct Config {
    /// Hub repository the model is fetched from on first run
    #[arg(long, env = "SQLCHAT_REPO_ID", default_value = DEFAULT_REPO_ID)]
    pub repo_id: String,

    /// GGUF weights file inside the repository
    #[arg(long, env = "SQLCHAT_WEIGHTS_FILE", default_value = DEFAULT_WEIGHTS_FILE)]
    pub weights_file: String,

    /// Tokenizer file inside the repository
    #[arg(long, env = "SQLCHAT_TOKENIZER_FILE", default_value = DEFAULT_TOKENIZER_FILE)]
    pub tokenizer_file: String,

    /// Directory the quantized model is saved to and loaded from
    #[arg(long, env = "SQLCHAT_CACHE_DIR", default_value = DEFAULT_CACHE_DIR)]
    pub cache_dir: PathBuf,

    /// Run on the CPU even if a GPU is available
    #[arg(long)]
    pub cpu: bool,

    /// Never contact the hub; fail if the cache directory is missing
    #[arg(long, env = "SQLCHAT_OFFLINE")]
    pub offline: bool,

    /// Answer a single question and exit instead of reading from stdin
    #[arg(short, long)]
    pub question: Option<String>,

    /// Print answers as JSON lines
    #[arg(long)]
    pub json: bool,

    /// Write a chrome trace of the run to this file
    #[arg(long, env = "SQLCHAT_TRACE_CHROME")]
    pub trace_chrome: Option<PathBuf>,
}

impl Config {
    pub fn source(&self) -> PretrainedSource {
        PretrainedSource {
            repo_id: self.repo_id.clone(),
            weights_file: self.weights_file.clone(),
            tokenizer_file: self.tokenizer_file.clone(),
            cache_dir: self.cache_dir.clone(),
            cpu: self.cpu,
            offline: self.offline,
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_command_is_well_formed() {
        Config::command().debug_assert();
    }

    #[test]
    fn test_flags_reach_the_source() {
        let config = Config::try_parse_from([
            "sqlchat",
            "--repo-id",
            "someone/sqlcoder",
            "--cache-dir",
            "/tmp/sqlcoder",
            "--cpu",
            "--offline",
            "-q",
            "how many students?",
        ])
        .unwrap();

        let source = config.source();

        assert_eq!(source.repo_id, "someone/sqlcoder");
        assert_eq!(source.cache_dir, PathBuf::from("/tmp/sqlcoder"));
        assert!(source.cpu);
        assert!(source.offline);
        assert_eq!(config.question.as_deref(), Some("how many students?"));
    }
}
