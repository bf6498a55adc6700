//! Command-line harness
//!
//! Entry point for a test binary: parses arguments, merges configuration
//! (CLI, then environment, then config file, then defaults), runs or lists
//! the registered tests and returns the process exit code.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::cli::{Args, Command};
use crate::config::{print_env_help, EnvConfig, RunConfig};
use crate::engine::{Engine, EngineConfig};
use crate::executor::CancellationToken;
use crate::filter::TestFilter;
use crate::output::{write_summary_to_file, ConsoleSink, OutputFormat, ResultFormatter};
use crate::registry::TestRegistry;
use crate::sink::NullSink;
use crate::utils::{init_logger, LogLevel};

/// Parse the process arguments and run `registry`
pub async fn run(registry: TestRegistry) -> Result<i32> {
    run_with_args(registry, Args::parse()).await
}

/// Load the file configuration and apply environment overrides
fn load_config(args: &Args, env: &EnvConfig) -> Result<RunConfig> {
    let path = args
        .config
        .clone()
        .or_else(|| env.config_file.as_ref().map(PathBuf::from));

    let mut config = match path {
        Some(path) => RunConfig::load(&path)?,
        None => RunConfig::load_default()?,
    };
    if env.has_any() {
        debug!("Applying NEXTUNIT_* environment overrides");
        env.apply_to(&mut config);
    }
    if let Some(level) = &args.log_level {
        config.log_level = level.clone();
    }
    Ok(config)
}

pub async fn run_with_args(registry: TestRegistry, args: Args) -> Result<i32> {
    let env = EnvConfig::load();
    let mut config = load_config(&args, &env)?;

    match args.command {
        Command::Env => {
            print_env_help();
            Ok(0)
        }

        Command::List(list) => {
            list.filter.apply_to(&mut config.filter);
            config.validate()?;
            init_logger(LogLevel::from_str(&config.log_level).unwrap_or(LogLevel::Info));

            let filter = TestFilter::from_config(&config.filter)?;
            let discovery = Engine::new(Arc::new(NullSink))
                .list(&registry, &filter)
                .await;

            print!(
                "{}",
                ResultFormatter::default().format_listing(&discovery.cases, list.detailed)
            );
            for error in &discovery.errors {
                eprintln!(
                    "! {}: {}",
                    error.id,
                    error.message.as_deref().unwrap_or_default()
                );
            }
            Ok(if discovery.errors.is_empty() { 0 } else { 1 })
        }

        Command::Run(run) => {
            run.apply_to(&mut config);
            config.validate()?;
            init_logger(LogLevel::from_str(&config.log_level).unwrap_or(LogLevel::Info));

            let format = OutputFormat::from_str(&config.format)
                .with_context(|| format!("Unknown output format: {}", config.format))?;
            let filter = TestFilter::from_config(&config.filter)?;
            let engine = Engine::new(Arc::new(ConsoleSink::new(format))).with_config(EngineConfig {
                max_parallel: config.max_parallel,
                fail_fast: config.fail_fast,
            });

            let cancel = CancellationToken::new();
            let interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupted; cancelling run");
                    interrupt.cancel();
                }
            });

            let summary = engine.run(&registry, &filter, &cancel).await;
            println!("{}", ResultFormatter::new(format).format_summary(&summary));

            if let Some(path) = &run.output {
                write_summary_to_file(path, &summary, format)
                    .with_context(|| format!("Failed to save results to {path}"))?;
            }

            Ok(summary.exit_code())
        }
    }
}
