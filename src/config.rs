use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{BenchError, Result};
use crate::prompts::PromptSet;

/// Concurrency levels measured when no level argument is given
pub const DEFAULT_LEVELS: [usize; 5] = [1, 5, 10, 50, 100];

pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:8080/v1/chat/completions";
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

/// Chat completion load benchmark
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Run a single concurrency level instead of the default ladder
    #[arg(allow_hyphen_values = true, allow_negative_numbers = true)]
    pub level: Option<String>,

    /// Chat completions endpoint
    #[arg(long, env = "BENCH_URL", default_value = DEFAULT_ENDPOINT)]
    pub url: String,

    /// Response mode (buffered, streaming)
    #[arg(long, env = "BENCH_MODE", default_value = "streaming")]
    pub mode: String,

    /// Built-in prompt set (long, short)
    #[arg(long, env = "BENCH_PROMPTS", default_value = "long")]
    pub prompts: String,

    /// File with one prompt per line; overrides --prompts
    #[arg(long, env = "BENCH_PROMPT_FILE")]
    pub prompt_file: Option<PathBuf>,

    /// Rounds per concurrency level
    #[arg(long, env = "BENCH_REPETITIONS", default_value = "3")]
    pub repetitions: usize,

    /// Per-request timeout in seconds
    #[arg(long, env = "BENCH_TIMEOUT", default_value = "15000")]
    pub timeout: f64,

    /// max_tokens sent with every request
    #[arg(long, env = "BENCH_MAX_TOKENS", default_value = "4096")]
    pub max_tokens: u32,

    /// Sampling temperature sent with every request
    #[arg(long, env = "BENCH_TEMPERATURE", default_value = "0.1")]
    pub temperature: f32,

    /// Model name to include in the request body
    #[arg(long, env = "BENCH_MODEL")]
    pub model: Option<String>,

    /// Bearer token for the endpoint
    #[arg(long, env = "BENCH_API_KEY")]
    pub api_key: Option<String>,

    /// System message sent before every prompt
    #[arg(long, env = "BENCH_SYSTEM_PROMPT", default_value = DEFAULT_SYSTEM_PROMPT)]
    pub system_prompt: String,

    /// Append-only report log (empty to disable)
    #[arg(long, env = "BENCH_LOG_FILE", default_value = "benchmark.log")]
    pub log_file: String,

    /// Sample transcript written in streaming mode (empty to disable)
    #[arg(long, env = "BENCH_SAMPLE_FILE", default_value = "sample_output.txt")]
    pub sample_file: String,

    /// Report format (text, json)
    #[arg(long, env = "BENCH_FORMAT", default_value = "text")]
    pub format: String,

    /// Start a local mock chat server and benchmark it
    #[arg(long, env = "BENCH_STANDALONE")]
    pub standalone: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit diagnostics as JSON
    #[arg(long, env = "LOG_JSON")]
    pub log_json: bool,
}

/// How the endpoint is asked to answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Single JSON response, tokens read from `usage.total_tokens`
    Buffered,
    /// Server-sent events, tokens counted per content delta
    #[default]
    Streaming,
}

impl Mode {
    pub fn is_streaming(self) -> bool {
        matches!(self, Mode::Streaming)
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Buffered => write!(f, "buffered"),
            Mode::Streaming => write!(f, "streaming"),
        }
    }
}

impl std::str::FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "buffered" | "full" => Ok(Mode::Buffered),
            "streaming" | "stream" => Ok(Mode::Streaming),
            _ => Err(format!("Unknown mode: {}", s)),
        }
    }
}

/// Shape of the per-level report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(ReportFormat::Text),
            "json" => Ok(ReportFormat::Json),
            _ => Err(format!("Unknown report format: {}", s)),
        }
    }
}

/// Resolved benchmark settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchConfig {
    pub endpoint: String,
    pub mode: Mode,
    pub prompt_set: PromptSet,
    pub prompt_file: Option<PathBuf>,
    /// Concurrency levels, run in order
    pub levels: Vec<usize>,
    pub repetitions: usize,
    pub timeout: Duration,
    pub max_tokens: u32,
    pub temperature: f32,
    pub model: Option<String>,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub system_prompt: String,
    pub log_file: Option<PathBuf>,
    pub sample_file: Option<PathBuf>,
    pub format: ReportFormat,
    pub standalone: bool,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            mode: Mode::Streaming,
            prompt_set: PromptSet::LongForm,
            prompt_file: None,
            levels: DEFAULT_LEVELS.to_vec(),
            repetitions: 3,
            timeout: Duration::from_secs(15000),
            max_tokens: 4096,
            temperature: 0.1,
            model: None,
            api_key: None,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            log_file: Some(PathBuf::from("benchmark.log")),
            sample_file: Some(PathBuf::from("sample_output.txt")),
            format: ReportFormat::Text,
            standalone: false,
        }
    }
}

impl BenchConfig {
    /// Build configuration from parsed CLI arguments (CLI > ENV > defaults)
    pub fn from_args(args: &CliArgs) -> Result<Self> {
        let mode = args.mode.parse::<Mode>().map_err(BenchError::Config)?;
        let prompt_set = args.prompts.parse::<PromptSet>().map_err(BenchError::Config)?;
        let format = args.format.parse::<ReportFormat>().map_err(BenchError::Config)?;

        if !args.timeout.is_finite() || args.timeout <= 0.0 {
            return Err(BenchError::Config(format!(
                "timeout must be a positive number of seconds, got {}",
                args.timeout
            )));
        }

        let config = Self {
            endpoint: args.url.clone(),
            mode,
            prompt_set,
            prompt_file: args.prompt_file.clone(),
            levels: parse_levels(args.level.as_deref()),
            repetitions: args.repetitions,
            timeout: Duration::from_secs_f64(args.timeout),
            max_tokens: args.max_tokens,
            temperature: args.temperature,
            model: args.model.clone().filter(|m| !m.is_empty()),
            api_key: args.api_key.clone().filter(|k| !k.is_empty()),
            system_prompt: args.system_prompt.clone(),
            log_file: optional_path(&args.log_file),
            sample_file: optional_path(&args.sample_file),
            format,
            standalone: args.standalone,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        reqwest::Url::parse(&self.endpoint)
            .map_err(|e| BenchError::Config(format!("invalid endpoint {}: {}", self.endpoint, e)))?;

        if !self.temperature.is_finite() {
            return Err(BenchError::Config("temperature must be finite".to_string()));
        }

        Ok(())
    }
}

/// Resolve the positional level argument.
///
/// A value that parses as a non-negative integer replaces the default ladder;
/// anything else silently keeps the defaults.
pub fn parse_levels(arg: Option<&str>) -> Vec<usize> {
    match arg.map(|s| s.trim().parse::<usize>()) {
        Some(Ok(level)) => vec![level],
        Some(Err(_)) => {
            tracing::debug!(arg = ?arg, "Ignoring unparsable level argument");
            DEFAULT_LEVELS.to_vec()
        }
        None => DEFAULT_LEVELS.to_vec(),
    }
}

fn optional_path(s: &str) -> Option<PathBuf> {
    if s.trim().is_empty() {
        None
    } else {
        Some(PathBuf::from(s))
    }
}
