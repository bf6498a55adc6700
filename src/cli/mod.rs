//! CLI argument parsing
//!
//! Defines command-line interface using clap. Every option left unset falls
//! back to the environment, then the config file.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{FilterConfig, RunConfig};

/// Async test runner with dependency-aware parallel scheduling
#[derive(Parser, Debug)]
#[command(name = "nextunit")]
#[command(version)]
#[command(about = "Run the registered test suite")]
#[command(long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run tests
    Run(RunArgs),

    /// List the tests a run would execute
    List(ListArgs),

    /// Show supported environment variables
    Env,
}

/// Test selection options
#[derive(clap::Args, Debug, Default, Clone)]
pub struct FilterArgs {
    /// Only run tests in these categories
    #[arg(long = "category", value_delimiter = ',')]
    pub categories: Vec<String>,

    /// Skip tests in these categories
    #[arg(long = "exclude-category", value_delimiter = ',')]
    pub exclude_categories: Vec<String>,

    /// Only run tests with these tags
    #[arg(long = "tag", value_delimiter = ',')]
    pub tags: Vec<String>,

    /// Skip tests with these tags
    #[arg(long = "exclude-tag", value_delimiter = ',')]
    pub exclude_tags: Vec<String>,

    /// Test name wildcard (`*` and `?`), matched against Assembly.Class.Method
    #[arg(short, long = "filter")]
    pub filters: Vec<String>,

    /// Test name regex
    #[arg(long)]
    pub filter_regex: Option<String>,

    /// Include tests marked explicit
    #[arg(long)]
    pub explicit: bool,
}

impl FilterArgs {
    /// Override `config` with every option given on the command line
    pub fn apply_to(&self, config: &mut FilterConfig) {
        if !self.categories.is_empty() {
            config.categories = self.categories.clone();
        }
        if !self.exclude_categories.is_empty() {
            config.exclude_categories = self.exclude_categories.clone();
        }
        if !self.tags.is_empty() {
            config.tags = self.tags.clone();
        }
        if !self.exclude_tags.is_empty() {
            config.exclude_tags = self.exclude_tags.clone();
        }
        if !self.filters.is_empty() {
            config.name_filters = self.filters.clone();
        }
        if let Some(re) = &self.filter_regex {
            config.name_regex = Some(re.clone());
        }
        if self.explicit {
            config.include_explicit = true;
        }
    }
}

/// Arguments for run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub filter: FilterArgs,

    /// Maximum number of tests running at once
    #[arg(short = 'j', long)]
    pub max_parallel: Option<usize>,

    /// Stop scheduling new tests after the first failure
    #[arg(long)]
    pub fail_fast: bool,

    /// Output format (table, json, json-pretty, summary)
    #[arg(long)]
    pub format: Option<String>,

    /// Save the run summary to file
    #[arg(short, long)]
    pub output: Option<String>,
}

impl RunArgs {
    pub fn apply_to(&self, config: &mut RunConfig) {
        self.filter.apply_to(&mut config.filter);
        if let Some(n) = self.max_parallel {
            config.max_parallel = Some(n);
        }
        if self.fail_fast {
            config.fail_fast = true;
        }
        if let Some(format) = &self.format {
            config.format = format.clone();
        }
    }
}

/// Arguments for list command
#[derive(Parser, Debug)]
pub struct ListArgs {
    #[command(flatten)]
    pub filter: FilterArgs,

    /// Show categories, tags and dependencies
    #[arg(short, long)]
    pub detailed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run() {
        let args = Args::parse_from([
            "nextunit",
            "run",
            "--category",
            "db,api",
            "--exclude-tag",
            "slow",
            "-j",
            "4",
            "--fail-fast",
            "--format",
            "json",
        ]);

        match args.command {
            Command::Run(run) => {
                assert_eq!(run.filter.categories, vec!["db", "api"]);
                assert_eq!(run.filter.exclude_tags, vec!["slow"]);
                assert_eq!(run.max_parallel, Some(4));
                assert!(run.fail_fast);
                assert_eq!(run.format.as_deref(), Some("json"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_cli_overrides_config() {
        let args = Args::parse_from(["nextunit", "run", "--tag", "fast", "--explicit"]);
        let Command::Run(run) = args.command else {
            panic!("expected run");
        };

        let mut config = RunConfig::default();
        config.filter.tags = vec!["slow".to_string()];
        config.filter.categories = vec!["db".to_string()];
        run.apply_to(&mut config);

        assert_eq!(config.filter.tags, vec!["fast"]);
        assert_eq!(config.filter.categories, vec!["db"]);
        assert!(config.filter.include_explicit);
    }

    #[test]
    fn test_global_options() {
        let args = Args::parse_from(["nextunit", "list", "--detailed", "--log-level", "debug"]);
        assert_eq!(args.log_level.as_deref(), Some("debug"));
        assert!(matches!(args.command, Command::List(ListArgs { detailed: true, .. })));
    }
}
