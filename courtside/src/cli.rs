//! CLI command definitions and subcommands

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

use crate::config::Config;

/// Courtside - critic-refined pre-game editorials
#[derive(Parser)]
#[command(
    name = "courtside",
    about = "Dependency-graph pipeline for critic-refined pre-game editorials",
    version
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the editorial pipeline for one game
    Run {
        /// Team whose fans the article is written for
        #[arg(value_name = "TEAM_A")]
        team_a: String,

        /// Opponent
        #[arg(value_name = "TEAM_B")]
        team_b: String,

        /// Game date (YYYY-MM-DD); defaults to today
        #[arg(short, long)]
        date: Option<NaiveDate>,

        /// Write the article to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Override refinement.max-iterations
        #[arg(short, long)]
        max_iterations: Option<u32>,
    },

    /// Show the task graph in dependency order
    Graph {
        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// List the tool categories the model can select
    Categories,

    /// Connect to the configured backends and list their tools
    Tools {
        /// Only tools tagged with this category
        #[arg(long)]
        category: Option<String>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },
}

/// Get the log file path
pub fn get_log_path() -> PathBuf {
    debug!("get_log_path: called");
    let path = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("courtside")
        .join("logs")
        .join("courtside.log");
    debug!(?path, "get_log_path: returning path");
    path
}

/// Generate the after_help text with credential and backend status
pub fn generate_after_help(config: &Config) -> String {
    debug!("generate_after_help: called");
    let mut help = String::new();

    help.push_str("Model:\n");
    let key_set = std::env::var(&config.llm.api_key_env).is_ok();
    let icon = if key_set { "\u{2705}" } else { "\u{274C}" };
    help.push_str(&format!("  {} {:<20} {}\n", icon, config.llm.api_key_env, config.llm.model));

    help.push('\n');
    help.push_str("Backends:\n");
    if config.backends.is_empty() {
        debug!("generate_after_help: no backends configured");
        help.push_str("  (none configured)\n");
    }
    for backend in &config.backends {
        help.push_str(&format!("  {:<10} {} {}\n", backend.name, backend.command, backend.args.join(" ")));
    }

    help.push('\n');
    help.push_str(&format!("Logs are written to: {}\n", get_log_path().display()));

    debug!("generate_after_help: returning help text");
    help
}

/// Output format for listing commands
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        debug!(%s, "OutputFormat::from_str: called");
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => {
                debug!(%s, "OutputFormat::from_str: unknown format");
                Err(format!("Unknown format: {}. Use text or json", s))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_run() {
        let cli = Cli::parse_from(["courtside", "run", "Celtics", "Knicks", "--date", "2025-01-15"]);
        match cli.command {
            Command::Run {
                team_a,
                team_b,
                date,
                output,
                max_iterations,
            } => {
                assert_eq!(team_a, "Celtics");
                assert_eq!(team_b, "Knicks");
                assert_eq!(date, NaiveDate::from_ymd_opt(2025, 1, 15));
                assert!(output.is_none());
                assert!(max_iterations.is_none());
            }
            other => panic!("Expected Run command, got {:?}", other),
        }
    }

    #[test]
    fn test_cli_rejects_bad_date() {
        assert!(Cli::try_parse_from(["courtside", "run", "A", "B", "--date", "15/01/2025"]).is_err());
    }

    #[test]
    fn test_cli_parse_tools_with_category() {
        let cli = Cli::parse_from(["courtside", "tools", "--category", "player", "-f", "json"]);
        assert!(matches!(
            cli.command,
            Command::Tools { category: Some(ref c), format: OutputFormat::Json } if c == "player"
        ));
    }

    #[test]
    fn test_cli_global_options() {
        let cli = Cli::parse_from(["courtside", "-c", "/path/to/config.yml", "graph", "-l", "debug"]);
        assert_eq!(cli.config, Some(PathBuf::from("/path/to/config.yml")));
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert!(matches!(cli.command, Command::Graph { .. }));
    }

    #[test]
    fn test_output_format_from_str() {
        assert!(matches!("text".parse::<OutputFormat>(), Ok(OutputFormat::Text)));
        assert!(matches!("JSON".parse::<OutputFormat>(), Ok(OutputFormat::Json)));
        assert!("table".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_after_help_lists_backends() {
        let mut config = Config::default();
        config.backends.push(crate::config::BackendConfig {
            name: "nba".to_string(),
            command: "uv".to_string(),
            args: vec!["run".to_string(), "nba_server.py".to_string()],
            env: Default::default(),
            always_visible: false,
            timeout_ms: 60_000,
        });
        let help = generate_after_help(&config);
        assert!(help.contains("nba"));
        assert!(help.contains("uv run nba_server.py"));
        assert!(help.contains("courtside.log"));
    }
}
