//! Courtside - critic-refined pre-game editorials
//!
//! CLI entry point for running the editorial pipeline and inspecting its
//! graph and tool catalogs.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{CommandFactory, FromArgMatches};
use colored::Colorize;
use eyre::{Context, Result};
use serde_json::json;
use tracing::{debug, info, warn};

use courtside::cli::{Cli, Command, OutputFormat, generate_after_help, get_log_path};
use courtside::config::Config;
use courtside::events::{create_event_bus, spawn_trace_logger, trace_path};
use courtside::graph::{Task, dependency_order, describe};
use courtside::llm::create_client;
use courtside::pipeline::{EditorialGraph, Pipeline};
use courtside::prompts::PromptLoader;
use courtside::tools::{BackendRegistry, CATEGORY_TOOL_NAME, ToolCategory, ToolRouter};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Note: Can't log params here since logging isn't initialized yet
    let log_path = get_log_path();
    if let Some(log_dir) = log_path.parent() {
        fs::create_dir_all(log_dir).context("Failed to create log directory")?;
    }

    // Determine log level with priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::File::create(&log_path).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Build command with after_help showing credentials and backends of the default config
    let help_config = Config::load(None).unwrap_or_default();
    let cmd = Cli::command().after_help(generate_after_help(&help_config));
    let cli = Cli::from_arg_matches(&cmd.get_matches())?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    setup_logging(cli.log_level.as_deref(), config.log_level.as_deref()).context("Failed to setup logging")?;
    info!(model = %config.llm.model, backends = config.backends.len(), "Courtside loaded config");

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Run {
            team_a,
            team_b,
            date,
            output,
            max_iterations,
        } => cmd_run(config, &team_a, &team_b, date, output, max_iterations).await,
        Command::Graph { format } => cmd_graph(&config, format),
        Command::Categories => cmd_categories(),
        Command::Tools { category, format } => cmd_tools(&config, category.as_deref(), format).await,
    }
}

/// Run the editorial pipeline for one game
async fn cmd_run(
    mut config: Config,
    team_a: &str,
    team_b: &str,
    date: Option<chrono::NaiveDate>,
    output: Option<PathBuf>,
    max_iterations: Option<u32>,
) -> Result<()> {
    debug!(%team_a, %team_b, ?date, ?output, ?max_iterations, "cmd_run: called");
    if let Some(max) = max_iterations {
        debug!(max, "cmd_run: overriding max_iterations");
        config.refinement.max_iterations = max;
    }
    config.validate()?;
    let game_date = date.unwrap_or_else(|| chrono::Local::now().date_naive());

    let llm = create_client(&config.llm).context("Failed to create LLM client")?;
    let registry = BackendRegistry::connect(&config.backends)
        .await
        .context("Failed to connect tool backends")?;
    let prompts = Arc::new(PromptLoader::new(std::env::current_dir()?));

    let bus = create_event_bus();
    let trace = config
        .trace
        .enabled
        .then(|| spawn_trace_logger(&bus, &config.trace.dir, true));

    let pipeline = Pipeline::editorial(&config, llm, registry, prompts, bus.clone())?;

    println!(
        "{} {} vs {} on {}",
        "Running".bold(),
        team_a.cyan(),
        team_b.cyan(),
        game_date.format("%Y-%m-%d")
    );
    let result = pipeline.run(team_a, team_b, game_date).await;

    if let Some(handle) = trace {
        if let Err(e) = handle.await {
            warn!(error = %e, "cmd_run: trace logger task failed");
        }
    }

    match result {
        Ok(report) => {
            let text = report.text();
            match &output {
                Some(path) => {
                    fs::write(path, &text).context(format!("Failed to write {}", path.display()))?;
                    println!("{} article written to {}", "\u{2713}".green(), path.display());
                }
                None => {
                    println!();
                    println!("{}", text);
                    println!();
                }
            }
            println!(
                "{} completed in {:.1}s (run {})",
                "\u{2713}".green(),
                report.duration_ms as f64 / 1000.0,
                report.run_id
            );
            if config.trace.enabled {
                println!("  Trace: {}", trace_path(&config.trace.dir, &report.run_id).display());
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("{} {}", "\u{2717}".red(), e);
            std::process::exit(1);
        }
    }
}

/// Print the editorial graph in dependency order
fn cmd_graph(config: &Config, format: OutputFormat) -> Result<()> {
    debug!(?format, "cmd_graph: called");
    let prompts = PromptLoader::new(std::env::current_dir()?);
    let root = EditorialGraph::new(config, &prompts, BackendRegistry::new()).build()?;
    let order = dependency_order(&root)?;

    match format {
        OutputFormat::Json => {
            let tasks: Vec<_> = order
                .iter()
                .map(|task| {
                    let dependencies: Vec<&str> = task.dependencies().iter().map(|d| d.name()).collect();
                    match task.as_ref() {
                        Task::Leaf(_) => json!({
                            "name": task.name(),
                            "kind": task.kind(),
                            "dependencies": dependencies,
                        }),
                        Task::Composite(c) => json!({
                            "name": task.name(),
                            "kind": task.kind(),
                            "dependencies": dependencies,
                            "critic": c.critic.name,
                            "tools": c.tool_backends,
                            "model": c.model.as_deref().unwrap_or(&config.llm.model),
                        }),
                    }
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&tasks)?);
        }
        OutputFormat::Text => {
            println!("Task graph (dependencies first):");
            println!();
            for task in &order {
                println!("  {}", describe(task));
            }
        }
    }
    Ok(())
}

/// Print the category taxonomy offered through the selection tool
fn cmd_categories() -> Result<()> {
    debug!("cmd_categories: called");
    println!("Selection tool: {}", CATEGORY_TOOL_NAME.bold());
    println!();
    println!("  {:<10} (always visible)", ToolCategory::Base.as_str().green());
    for category in ToolCategory::SELECTABLE {
        println!("  {}", category);
    }
    Ok(())
}

/// Connect to every configured backend and list its catalog
async fn cmd_tools(config: &Config, category: Option<&str>, format: OutputFormat) -> Result<()> {
    debug!(?category, ?format, "cmd_tools: called");
    let wanted: Option<ToolCategory> = category.map(str::parse).transpose()?;

    let registry = BackendRegistry::connect(&config.backends)
        .await
        .context("Failed to connect tool backends")?;
    let names: Vec<&str> = registry.names();
    let router = ToolRouter::new(registry.select(&names)?);

    let tools: Vec<_> = router
        .catalog()
        .into_iter()
        .filter(|tool| match wanted {
            Some(wanted) => tool
                .categories
                .iter()
                .any(|c| c.parse::<ToolCategory>().map(|c| c == wanted).unwrap_or(false)),
            None => true,
        })
        .collect();
    debug!(count = tools.len(), "cmd_tools: tools after filter");

    match format {
        OutputFormat::Json => {
            let listing: Vec<_> = tools
                .iter()
                .map(|tool| {
                    json!({
                        "name": tool.name,
                        "backend": router.owner(&tool.name),
                        "categories": tool.categories,
                        "description": tool.description,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&listing)?);
        }
        OutputFormat::Text => {
            if tools.is_empty() {
                println!("No tools found.");
                return Ok(());
            }
            for tool in &tools {
                let backend = router.owner(&tool.name).unwrap_or("?");
                println!("  {} [{}] {}", tool.name.bold(), backend, tool.categories.join(", "));
                if let Some(line) = tool.description.lines().next() {
                    println!("      {}", line);
                }
            }
        }
    }
    Ok(())
}
